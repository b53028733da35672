/// Bottom status bar: watcher health and the last build.
use crate::state::AppState;
use crate::theme::BuschlaTheme;
use egui::Ui;

/// Draw the status bar at the bottom of the window.
pub fn status_bar(ui: &mut Ui, state: &AppState) {
    let theme = BuschlaTheme::for_mode(state.dark_mode);
    let color_weak = ui.visuals().weak_text_color();
    let color_normal = ui.visuals().text_color();

    ui.horizontal(|ui| {
        if state.watcher_active() {
            ui.label(
                egui::RichText::new("● Watching")
                    .size(12.0)
                    .color(theme.success),
            );
        } else if let Some(err) = &state.watcher_error {
            ui.label(
                egui::RichText::new("⚠ Watcher not running")
                    .size(12.0)
                    .color(theme.warning),
            )
            .on_hover_text(err);
        } else if state.watcher.is_some() {
            ui.label(
                egui::RichText::new("⏹ Watcher stopped")
                    .size(12.0)
                    .color(theme.warning),
            );
        } else {
            ui.label(egui::RichText::new("Idle").size(12.0).color(color_weak));
        }

        ui.separator();

        let dirs = state.watched_dirs.len();
        let dir_label = ui.label(
            egui::RichText::new(format!(
                "{} {}",
                dirs,
                if dirs == 1 { "directory" } else { "directories" }
            ))
            .size(12.0)
            .color(color_normal),
        );
        if dirs > 0 {
            let list = state
                .watched_dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join("\n");
            dir_label.on_hover_text(list);
        }

        ui.separator();

        ui.label(
            egui::RichText::new(format!("{} files changed", state.watch_entries.len()))
                .size(12.0)
                .color(color_normal),
        );

        if let Some(report) = &state.last_report {
            ui.separator();
            let text = if report.exit_status == 0 {
                "\u{2713} Last build ok".to_owned()
            } else {
                format!("\u{2717} Last build failed ({})", report.exit_status)
            };
            ui.label(
                egui::RichText::new(text)
                    .size(12.0)
                    .color(theme.status_color(report.exit_status)),
            );
            ui.label(
                egui::RichText::new(format!(
                    "{} builds, last at {}",
                    state.reaction_count,
                    report.received.format("%H:%M:%S")
                ))
                .size(12.0)
                .color(color_weak),
            );
        }
    });
}
