/// Root names starting with this character are read-only to handlers
/// (`$item`, `$props`, `$routeParams`, ...).
pub const READ_ONLY_MARKER: char = '$';

/// Field used to index loader results by identity.
pub const ID_FIELD: &str = "$id";

/// Tunables of one engine instance.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Checkpoints without state changes after which an async handler yields
    /// to the host.
    pub yield_every: usize,
    /// Infix of convention-wired handlers: `<uid><infix><Event>`.
    pub convention_infix: &'static str,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            yield_every: 100,
            convention_infix: "_on",
        }
    }
}

impl EngineConfig {
    pub fn with_yield_every(mut self, n: usize) -> Self {
        self.yield_every = n.max(1);
        self
    }

    /// `btn` + `click` -> `btn_onClick`.
    pub fn convention_handler_name(&self, owner: &str, event: &str) -> String {
        let mut chars = event.chars();
        let capitalized = match chars.next() {
            Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        format!("{owner}{}{capitalized}", self.convention_infix)
    }
}

pub fn is_read_only_name(name: &str) -> bool {
    name.starts_with(READ_ONLY_MARKER)
}
