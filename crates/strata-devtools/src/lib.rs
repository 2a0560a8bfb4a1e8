//! Inspector HUD over an engine's [`Diagnostics`].
//!
//! The host calls [`Inspector::frame`] once per render pass and draws the
//! returned lines however it likes.

use web_time::{Duration, Instant};

use strata_core::{Diagnostics, DiagnosticsSnapshot};

/// How many containers the busiest-renders line lists.
const TOP_CONTAINERS: usize = 3;

pub struct Hud {
    pub inspector_enabled: bool,
    frame_count: u64,
    last_frame: Option<Instant>,
    fps_smooth: f32,
    pub metrics: Option<Metrics>,
}

impl Default for Hud {
    fn default() -> Self {
        Self::new()
    }
}

impl Hud {
    pub fn new() -> Self {
        Self {
            inspector_enabled: false,
            frame_count: 0,
            last_frame: None,
            fps_smooth: 0.0,
            metrics: None,
        }
    }

    pub fn toggle_inspector(&mut self) {
        self.inspector_enabled = !self.inspector_enabled;
        log::debug!("inspector enabled: {}", self.inspector_enabled);
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn fps(&self) -> f32 {
        self.fps_smooth
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub fn tick_at(&mut self, now: Instant) {
        self.frame_count += 1;
        if let Some(prev) = self.last_frame.replace(now) {
            let dt = now.saturating_duration_since(prev).as_secs_f32();
            if dt > 0.0 {
                let fps = 1.0 / dt;
                // simple EMA
                let a = 0.2;
                self.fps_smooth = if self.fps_smooth == 0.0 {
                    fps
                } else {
                    (1.0 - a) * self.fps_smooth + a * fps
                };
            }
        }
    }

    /// Runs one render pass and records how long it took.
    pub fn measure<T>(&mut self, pass: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = pass();
        self.record_pass(start.elapsed());
        out
    }

    pub fn record_pass(&mut self, took: Duration) {
        let m = self.metrics.get_or_insert_with(Metrics::default);
        m.pass_ms = took.as_secs_f32() * 1000.0;
        m.passes += 1;
    }

    pub fn status_line(&self) -> String {
        let mut parts = vec![
            format!("frame: {}", self.frame_count),
            format!("fps: {:.1}", self.fps_smooth),
        ];
        if let Some(m) = &self.metrics {
            parts.push(format!("pass: {:.2} ms", m.pass_ms));
        }
        parts.join("  |  ")
    }
}

#[derive(Clone, Debug, Default)]
pub struct Metrics {
    pub pass_ms: f32,
    pub passes: u64,
}

/// The HUD plus a per-frame report of what changed in the diagnostics.
pub struct Inspector {
    pub hud: Hud,
    previous: DiagnosticsSnapshot,
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new()
    }
}

impl Inspector {
    pub fn new() -> Self {
        Self {
            hud: Hud::new(),
            previous: DiagnosticsSnapshot::default(),
        }
    }

    /// Advances the HUD clock and returns the overlay lines, or nothing while
    /// the inspector is hidden.
    pub fn frame(&mut self, diagnostics: &Diagnostics) -> Vec<String> {
        self.hud.tick();
        let current = diagnostics.snapshot();
        let lines = if self.hud.inspector_enabled {
            let mut lines = vec![self.hud.status_line()];
            lines.extend(report(&self.previous, &current));
            lines
        } else {
            Vec::new()
        };
        self.previous = current;
        lines
    }

    /// The whole snapshot as JSON, for dumping next to a bug report.
    pub fn export(diagnostics: &Diagnostics) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&diagnostics.snapshot())
    }
}

/// Describes `current`, with the renders and commits since `previous`.
pub fn report(previous: &DiagnosticsSnapshot, current: &DiagnosticsSnapshot) -> Vec<String> {
    let mut lines = vec![format!(
        "renders: {} (+{})  commits: {} (+{}), {} changes",
        current.total_renders(),
        current.total_renders().saturating_sub(previous.total_renders()),
        current.commits,
        current.commits.saturating_sub(previous.commits),
        current.committed_changes,
    )];

    let mut busiest: Vec<_> = current.render_counts.iter().collect();
    busiest.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    if !busiest.is_empty() {
        let top: Vec<_> = busiest
            .iter()
            .take(TOP_CONTAINERS)
            .map(|(name, n)| format!("{name}={n}"))
            .collect();
        lines.push(format!("busiest: {}", top.join(" ")));
    }

    for e in current.handler_errors.iter().skip(previous.handler_errors.len()) {
        lines.push(format!("handler error: {}.{}: {}", e.owner, e.event, e.message));
    }
    for e in current.render_errors.iter().skip(previous.render_errors.len()) {
        lines.push(format!("render error: {e}"));
    }
    if !current.missing_renderers.is_empty() {
        lines.push(format!("no renderer: {}", dedup(&current.missing_renderers)));
    }
    if !current.skipped_loaders.is_empty() {
        lines.push(format!("skipped loaders: {}", dedup(&current.skipped_loaders)));
    }
    lines
}

fn dedup(kinds: &[String]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for k in kinds {
        if !seen.contains(&k.as_str()) {
            seen.push(k);
        }
    }
    seen.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy_diagnostics() -> Diagnostics {
        let d = Diagnostics::new();
        for _ in 0..3 {
            d.record_render("app");
        }
        d.record_render("list");
        d.record_render("row");
        d.record_render("footer");
        d.record_commit(2);
        d.record_missing_renderer("Chart");
        d.record_missing_renderer("Chart");
        d.record_skipped_loader("RestApi");
        d
    }

    #[test]
    fn fps_is_smoothed() {
        let mut hud = Hud::new();
        let t0 = Instant::now();
        hud.tick_at(t0);
        assert_eq!(hud.fps(), 0.0);
        hud.tick_at(t0 + Duration::from_millis(10));
        assert!((hud.fps() - 100.0).abs() < 0.5);
        hud.tick_at(t0 + Duration::from_millis(30));
        // 0.8 * 100 + 0.2 * 50
        assert!((hud.fps() - 90.0).abs() < 0.5);
        assert_eq!(hud.frame_count(), 3);
    }

    #[test]
    fn report_lists_totals_and_gaps() {
        let d = busy_diagnostics();
        insta::assert_debug_snapshot!(report(&DiagnosticsSnapshot::default(), &d.snapshot()), @r#"
        [
            "renders: 6 (+6)  commits: 1 (+1), 2 changes",
            "busiest: app=3 footer=1 list=1",
            "no renderer: Chart",
            "skipped loaders: RestApi",
        ]
        "#);
    }

    #[test]
    fn only_new_errors_are_reported() {
        let d = Diagnostics::new();
        d.record_handler_error("save", "click", "boom");
        let previous = d.snapshot();
        d.record_handler_error("save", "click", "again");
        d.record_render_error("root/0:", "bad script");
        d.record_render("app");
        insta::assert_debug_snapshot!(report(&previous, &d.snapshot()), @r#"
        [
            "renders: 1 (+1)  commits: 0 (+0), 0 changes",
            "busiest: app=1",
            "handler error: save.click: again",
            "render error: root/0:: bad script",
        ]
        "#);
    }

    #[test]
    fn hidden_inspector_still_tracks_frames() {
        let d = busy_diagnostics();
        let mut inspector = Inspector::new();
        assert!(inspector.frame(&d).is_empty());
        inspector.hud.toggle_inspector();
        d.record_render("app");
        let lines = inspector.frame(&d);
        assert!(lines[0].starts_with("frame: 2"));
        assert!(lines[1].starts_with("renders: 7 (+1)"));
    }

    #[test]
    fn measured_passes_show_in_the_status_line() {
        let mut hud = Hud::new();
        let n = hud.measure(|| 41 + 1);
        assert_eq!(n, 42);
        hud.record_pass(Duration::from_micros(1500));
        assert_eq!(hud.metrics.as_ref().map(|m| m.passes), Some(2));
        assert_eq!(hud.status_line(), "frame: 0  |  fps: 0.0  |  pass: 1.50 ms");
    }

    #[test]
    fn export_is_json() {
        let json = Inspector::export(&busy_diagnostics()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["commits"], 1);
        assert_eq!(parsed["render_counts"]["app"], 3);
    }
}
