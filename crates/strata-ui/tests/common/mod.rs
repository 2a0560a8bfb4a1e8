/// Render and handler errors can carry script values, which are not `Send`,
/// so they reach `anyhow` as their message.
pub trait OrBail<T> {
    fn or_bail(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> OrBail<T> for Result<T, E> {
    fn or_bail(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}
