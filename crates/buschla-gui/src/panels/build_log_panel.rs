/// Build log panel: the full captured output of the last build.
use crate::reload::classify_build_line;
use crate::state::AppState;
use crate::theme::BuschlaTheme;
use egui::Ui;

/// Draw the build log side panel contents.
pub fn build_log_panel(ui: &mut Ui, state: &AppState) {
    let theme = BuschlaTheme::for_mode(state.dark_mode);
    let muted = ui.visuals().weak_text_color();

    let report = match &state.last_report {
        Some(r) => r,
        None => {
            ui.label(
                egui::RichText::new("No build has run yet")
                    .color(muted)
                    .italics(),
            );
            return;
        }
    };

    ui.horizontal(|ui| {
        ui.label(
            egui::RichText::new(format!("Exit status {}", report.exit_status))
                .strong()
                .color(theme.status_color(report.exit_status)),
        );
        ui.label(
            egui::RichText::new(report.received.format("%H:%M:%S").to_string())
                .size(11.0)
                .color(muted),
        );
    });
    ui.separator();

    if report.output.is_empty() {
        ui.label(egui::RichText::new("(no output)").color(muted).italics());
        return;
    }

    // Unlike the reload window, the log keeps tool echo lines; they are
    // only dimmed.
    egui::ScrollArea::both()
        .auto_shrink([false, false])
        .stick_to_bottom(true)
        .show(ui, |ui| {
            for raw in report.output.lines() {
                let color = match classify_build_line(raw) {
                    Some(line) => theme.line_color(line.kind),
                    None => muted,
                };
                ui.label(egui::RichText::new(raw).monospace().size(11.0).color(color));
            }
        });
}
