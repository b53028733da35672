/// Colour scheme and visual theme for Buschla.
///
/// All colour constants are defined here so the rest of the UI code
/// references semantically-named values rather than raw hex codes.
use crate::reload::LineKind;
use egui::{Color32, Stroke, Visuals};

/// Semantic colour palette.
pub struct BuschlaTheme {
    pub background: Color32,
    pub surface: Color32,
    pub text_primary: Color32,
    pub text_muted: Color32,
    pub accent: Color32,
    pub error: Color32,
    pub warning: Color32,
    pub note: Color32,
    pub success: Color32,
    pub separator: Color32,
}

impl BuschlaTheme {
    /// Dark theme: the default.
    pub fn dark() -> Self {
        Self {
            background: Color32::from_rgb(0x1e, 0x1e, 0x2e),
            surface: Color32::from_rgb(0x2a, 0x2a, 0x3c),
            text_primary: Color32::from_rgb(0xe4, 0xe4, 0xe8),
            text_muted: Color32::from_rgb(0x6c, 0x70, 0x86),
            accent: Color32::from_rgb(0x89, 0xb4, 0xfa),
            error: Color32::from_rgb(0xf3, 0x8b, 0xa8),
            warning: Color32::from_rgb(0xfa, 0xb3, 0x87),
            note: Color32::from_rgb(0x94, 0xe2, 0xd5),
            success: Color32::from_rgb(0xa6, 0xe3, 0xa1),
            separator: Color32::from_rgb(0x3a, 0x3a, 0x50),
        }
    }

    pub fn light() -> Self {
        Self {
            background: Color32::from_rgb(0xf5, 0xf5, 0xf5),
            surface: Color32::from_rgb(0xff, 0xff, 0xff),
            text_primary: Color32::from_rgb(0x1e, 0x1e, 0x2e),
            text_muted: Color32::from_rgb(0x8a, 0x8a, 0x9a),
            accent: Color32::from_rgb(0x3a, 0x6f, 0xd8),
            error: Color32::from_rgb(0xd0, 0x40, 0x50),
            warning: Color32::from_rgb(0xd0, 0x80, 0x20),
            note: Color32::from_rgb(0x20, 0x90, 0x90),
            success: Color32::from_rgb(0x30, 0x98, 0x30),
            separator: Color32::from_rgb(0xd0, 0xd0, 0xd8),
        }
    }

    pub fn for_mode(dark_mode: bool) -> Self {
        if dark_mode {
            Self::dark()
        } else {
            Self::light()
        }
    }

    /// Apply this theme to an egui context.
    pub fn apply(&self, ctx: &egui::Context, dark_mode: bool) {
        let mut visuals = if dark_mode {
            Visuals::dark()
        } else {
            Visuals::light()
        };

        visuals.panel_fill = self.background;
        visuals.window_fill = self.surface;
        visuals.extreme_bg_color = self.background;
        visuals.faint_bg_color = self.surface;
        visuals.hyperlink_color = self.accent;
        visuals.selection.stroke = Stroke::new(1.0, self.accent);
        visuals.widgets.noninteractive.fg_stroke = Stroke::new(1.0, self.text_primary);
        visuals.window_stroke = Stroke::new(1.0, self.separator);

        ctx.set_visuals(visuals);
    }

    /// Colour for one classified build output line.
    pub fn line_color(&self, kind: LineKind) -> Color32 {
        match kind {
            LineKind::Plain => self.text_primary,
            LineKind::Error => self.error,
            LineKind::Warning => self.warning,
            LineKind::Note => self.note,
        }
    }

    /// Colour for a build exit status.
    pub fn status_color(&self, exit_status: i32) -> Color32 {
        if exit_status == 0 {
            self.success
        } else {
            self.error
        }
    }
}
