//! Per-application record of what the engine did: renders, commits, handler
//! failures and registration gaps. One handle is injected per run and cloned
//! into every container; tests call [`Diagnostics::reset`] between cases.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HandlerErrorRecord {
    pub owner: String,
    pub event: String,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub render_counts: IndexMap<String, usize>,
    pub handler_errors: Vec<HandlerErrorRecord>,
    pub skipped_loaders: Vec<String>,
    pub missing_renderers: Vec<String>,
    pub render_errors: Vec<String>,
    pub commits: usize,
    pub committed_changes: usize,
}

impl DiagnosticsSnapshot {
    pub fn total_renders(&self) -> usize {
        self.render_counts.values().sum()
    }
}

#[derive(Clone, Default)]
pub struct Diagnostics {
    inner: Arc<Mutex<DiagnosticsSnapshot>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_render(&self, container: &str) {
        *self
            .inner
            .lock()
            .render_counts
            .entry(container.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_commit(&self, changes: usize) {
        let mut inner = self.inner.lock();
        inner.commits += 1;
        inner.committed_changes += changes;
    }

    pub fn record_handler_error(&self, owner: &str, event: &str, message: &str) {
        log::error!("handler {owner}.{event} failed: {message}");
        self.inner.lock().handler_errors.push(HandlerErrorRecord {
            owner: owner.to_string(),
            event: event.to_string(),
            message: message.to_string(),
        });
    }

    pub fn record_skipped_loader(&self, kind: &str) {
        log::warn!("no loader renderer registered for '{kind}', skipping");
        self.inner.lock().skipped_loaders.push(kind.to_string());
    }

    pub fn record_missing_renderer(&self, kind: &str) {
        log::warn!("no renderer registered for '{kind}', rendering nothing");
        self.inner.lock().missing_renderers.push(kind.to_string());
    }

    /// A subtree failed and an error boundary rendered its fallback.
    pub fn record_render_error(&self, at: &str, message: &str) {
        log::error!("render of {at} failed: {message}");
        self.inner.lock().render_errors.push(format!("{at}: {message}"));
    }

    pub fn render_count(&self, container: &str) -> usize {
        self.inner
            .lock()
            .render_counts
            .get(container)
            .copied()
            .unwrap_or(0)
    }

    pub fn commits(&self) -> usize {
        self.inner.lock().commits
    }

    pub fn handler_errors(&self) -> Vec<HandlerErrorRecord> {
        self.inner.lock().handler_errors.clone()
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        self.inner.lock().clone()
    }

    pub fn reset(&self) {
        *self.inner.lock() = DiagnosticsSnapshot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_one_record() {
        let d = Diagnostics::new();
        let other = d.clone();
        other.record_render("root");
        other.record_render("root");
        d.record_commit(3);
        assert_eq!(d.render_count("root"), 2);
        assert_eq!(d.snapshot().committed_changes, 3);
        d.reset();
        assert_eq!(other.snapshot(), DiagnosticsSnapshot::default());
    }
}
