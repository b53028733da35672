/// Reload status window state.
///
/// Owned by [`crate::state::AppState`]. Updated when a build report arrives
/// and advanced once per frame with [`ReloadStatus::tick`]. The window
/// slides in from the top edge and, after a clean successful build, closes
/// itself again.
use std::time::Duration;

/// How long a clean success stays on screen before closing itself.
pub const AUTO_CLOSE_AFTER: Duration = Duration::from_secs(3);

/// Length of the slide-in/slide-out animation in seconds.
pub const SLIDE_DURATION: f32 = 0.6;

/// How a build output line should be coloured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Plain,
    Error,
    Warning,
    Note,
}

impl LineKind {
    /// Error, warning and note lines are diagnostics; they keep the window open.
    pub fn is_diagnostic(self) -> bool {
        !matches!(self, LineKind::Plain)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLine {
    pub text: String,
    pub kind: LineKind,
}

/// Classify one line of build output.
///
/// Returns `None` for lines that only echo the build tool's own commands.
pub fn classify_build_line(line: &str) -> Option<BuildLine> {
    if line.starts_with("make[") || line.starts_with("g++ ") {
        return None;
    }
    let text = line.strip_prefix("./build/../").unwrap_or(line);

    let kind = if text.contains("error:") {
        LineKind::Error
    } else if text.contains("warning:") {
        LineKind::Warning
    } else if text.contains("note:") {
        LineKind::Note
    } else {
        LineKind::Plain
    };

    Some(BuildLine {
        text: text.to_owned(),
        kind,
    })
}

/// Classify every line of a build's output, dropping hidden lines.
pub fn classify_build_output(output: &str) -> Vec<BuildLine> {
    output.lines().filter_map(classify_build_line).collect()
}

/// Overshooting ease-out curve used for the slide-in.
pub fn ease_out_back(t: f32) -> f32 {
    const C1: f32 = 1.70158;
    const C3: f32 = C1 + 1.0;
    let t = t.clamp(0.0, 1.0) - 1.0;
    1.0 + C3 * t * t * t + C1 * t * t
}

/// State of the reload status window.
#[derive(Debug, Clone, Default)]
pub struct ReloadStatus {
    /// Where the animation is heading: shown or hidden.
    visible: bool,
    /// Linear animation progress, 0 = hidden, 1 = fully shown.
    anim: f32,
    /// Seconds since the current status was shown.
    time_visible: f32,
    auto_close: bool,
    success: bool,
    message: String,
    lines: Vec<BuildLine>,
}

impl ReloadStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show a successful build. Closes itself after [`AUTO_CLOSE_AFTER`]
    /// unless the output carries diagnostics.
    pub fn show_success(&mut self, message: impl Into<String>, output: &str) {
        let lines = classify_build_output(output);
        let auto_close = !lines.iter().any(|l| l.kind.is_diagnostic());
        self.show(true, message.into(), lines, auto_close);
    }

    /// Show a failed build or reload. Stays open until dismissed.
    pub fn show_failure(&mut self, message: impl Into<String>, output: &str) {
        self.show(false, message.into(), classify_build_output(output), false);
    }

    fn show(&mut self, success: bool, message: String, lines: Vec<BuildLine>, auto_close: bool) {
        self.visible = true;
        self.time_visible = 0.0;
        self.success = success;
        self.message = message;
        self.lines = lines;
        self.auto_close = auto_close;
    }

    /// Show the current status again after it was closed.
    pub fn reopen(&mut self) {
        if self.has_status() {
            self.visible = true;
            self.time_visible = 0.0;
        }
    }

    /// `true` once any status has been shown.
    pub fn has_status(&self) -> bool {
        !self.message.is_empty()
    }

    /// Start closing the window.
    pub fn dismiss(&mut self) {
        self.visible = false;
    }

    /// Advance the animation and the auto-close timer by `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        let step = dt.max(0.0) / SLIDE_DURATION;
        if self.visible {
            self.anim = (self.anim + step).min(1.0);
            self.time_visible += dt.max(0.0);
            if self.auto_close && self.time_visible >= AUTO_CLOSE_AFTER.as_secs_f32() {
                self.visible = false;
            }
        } else {
            self.anim = (self.anim - step).max(0.0);
        }
    }

    /// Whether the window should be drawn at all this frame.
    pub fn is_shown(&self) -> bool {
        self.visible || self.anim > 0.0
    }

    /// Whether the window is heading towards (or is at) fully shown.
    pub fn is_open(&self) -> bool {
        self.visible
    }

    /// `true` while the slide animation has not settled.
    pub fn is_animating(&self) -> bool {
        if self.visible {
            self.anim < 1.0 || self.auto_close
        } else {
            self.anim > 0.0
        }
    }

    /// Eased slide position, 0 = off screen, 1 = in place. May overshoot 1.
    pub fn slide(&self) -> f32 {
        ease_out_back(self.anim)
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn auto_close(&self) -> bool {
        self.auto_close
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn lines(&self) -> &[BuildLine] {
        &self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_hides_tool_echo() {
        assert_eq!(classify_build_line("make[1]: Entering directory '/x'"), None);
        assert_eq!(classify_build_line("g++ -O2 -c src/app.cpp"), None);
        assert!(classify_build_line("gcc -c foo.c").is_some());
    }

    #[test]
    fn test_classify_strips_build_prefix_and_tags() {
        let line = classify_build_line("./build/../src/app.cpp:10:5: error: expected ';'").unwrap();
        assert_eq!(line.text, "src/app.cpp:10:5: error: expected ';'");
        assert_eq!(line.kind, LineKind::Error);

        let line = classify_build_line("src/a.h:3:1: warning: unused variable").unwrap();
        assert_eq!(line.kind, LineKind::Warning);

        let line = classify_build_line("src/a.h:2:1: note: declared here").unwrap();
        assert_eq!(line.kind, LineKind::Note);

        let line = classify_build_line("Linking app.so").unwrap();
        assert_eq!(line.kind, LineKind::Plain);
        assert!(!line.kind.is_diagnostic());
    }

    #[test]
    fn test_classify_output_keeps_order() {
        let lines = classify_build_output("make[1]: x\na\ng++ y\nb: error: z\n");
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b: error: z"]);
    }

    #[test]
    fn test_ease_out_back_endpoints() {
        assert!(ease_out_back(0.0).abs() < 1e-6);
        assert!((ease_out_back(1.0) - 1.0).abs() < 1e-6);
        // Overshoots before settling.
        assert!(ease_out_back(0.8) > 1.0);
    }

    #[test]
    fn test_clean_success_auto_closes() {
        let mut status = ReloadStatus::new();
        status.show_success("Reloaded", "build ok");
        assert!(status.is_open());
        assert!(status.auto_close());

        status.tick(1.0);
        assert!(status.is_open());
        assert!((status.slide() - 1.0).abs() < 1e-6);

        status.tick(2.5);
        assert!(!status.is_open());
        assert!(status.is_shown(), "still sliding out");

        status.tick(1.0);
        assert!(!status.is_shown());
    }

    #[test]
    fn test_success_with_warnings_stays_open() {
        let mut status = ReloadStatus::new();
        status.show_success("Reloaded", "a.cpp:1:1: warning: shadowed");
        assert!(!status.auto_close());
        status.tick(10.0);
        assert!(status.is_open());
    }

    #[test]
    fn test_failure_stays_until_dismissed() {
        let mut status = ReloadStatus::new();
        status.show_failure("Build failed (exit 2)", "boom");
        assert!(!status.success());
        status.tick(60.0);
        assert!(status.is_open());
        assert_eq!(status.lines().len(), 1);

        status.dismiss();
        assert!(!status.is_open());
        status.tick(SLIDE_DURATION);
        assert!(!status.is_shown());
    }

    #[test]
    fn test_reopen_after_dismiss() {
        let mut status = ReloadStatus::new();
        status.reopen();
        assert!(!status.is_open(), "nothing to reopen yet");

        status.show_failure("Build failed (exit 1)", "x: error: y");
        status.dismiss();
        status.reopen();
        assert!(status.is_open());
        assert_eq!(status.lines()[0].kind, LineKind::Error);
    }

    #[test]
    fn test_new_report_restarts_timer() {
        let mut status = ReloadStatus::new();
        status.show_success("first", "");
        status.tick(2.0);
        status.show_success("second", "");
        status.tick(2.0);
        assert!(status.is_open());
        assert_eq!(status.message(), "second");
    }
}
