/// Top action bar -- panel toggles, theme toggle, and branding.
use crate::state::AppState;
use egui::Ui;

/// Draw the toolbar.
pub fn toolbar(ui: &mut Ui, state: &mut AppState) {
    ui.horizontal(|ui| {
        ui.label(
            egui::RichText::new("🔨 Buschla")
                .size(18.0)
                .strong()
                .color(ui.visuals().hyperlink_color),
        );

        ui.separator();

        let watch_label = if state.watcher_active() {
            egui::RichText::new("👁 Watching").color(egui::Color32::from_rgb(0xa6, 0xe3, 0xa1))
        } else {
            egui::RichText::new("👁 Watch")
        };
        if ui
            .button(watch_label)
            .on_hover_text(if state.show_watch_panel {
                "Hide changed files"
            } else {
                "Show changed files"
            })
            .clicked()
        {
            state.show_watch_panel = !state.show_watch_panel;
        }

        let has_log = state.last_report.is_some();
        if ui
            .add_enabled(has_log, egui::Button::new("📜 Build log"))
            .on_hover_text(if has_log {
                "Show output of the last build"
            } else {
                "No build has run yet"
            })
            .clicked()
        {
            state.show_build_log = !state.show_build_log;
        }

        if state.reload.has_status()
            && !state.reload.is_open()
            && ui
                .button("🔁 Last reload")
                .on_hover_text("Show the last reload status again")
                .clicked()
        {
            state.reload.reopen();
        }

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.button("ℹ").on_hover_text("About Buschla").clicked() {
                state.show_about = true;
            }

            let theme_label = if state.dark_mode { "☀" } else { "🌙" };
            let theme_tip = if state.dark_mode {
                "Switch to light mode"
            } else {
                "Switch to dark mode"
            };
            if ui.button(theme_label).on_hover_text(theme_tip).clicked() {
                state.dark_mode = !state.dark_mode;
            }
        });
    });
}
