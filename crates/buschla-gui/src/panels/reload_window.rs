/// Reload status window.
///
/// A small window anchored to the top edge that slides in when a build
/// report arrives, shows the outcome and the classified build output, and
/// slides out when dismissed or when a clean success times out.
use crate::state::AppState;
use crate::theme::BuschlaTheme;

const WINDOW_WIDTH: f32 = 520.0;
/// Distance the window travels while sliding in.
const SLIDE_DISTANCE: f32 = 240.0;
const TOP_MARGIN: f32 = 48.0;

/// Draw the reload status window if it is (partly) visible.
pub fn reload_window(ctx: &egui::Context, state: &mut AppState) {
    if !state.reload.is_shown() {
        return;
    }

    let theme = BuschlaTheme::for_mode(state.dark_mode);
    let offset_y = TOP_MARGIN - SLIDE_DISTANCE * (1.0 - state.reload.slide());
    let mut dismiss = false;

    let (icon, color) = if state.reload.success() {
        ("\u{2713}", theme.success)
    } else {
        ("\u{2717}", theme.error)
    };

    egui::Window::new("Reload status")
        .title_bar(false)
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_TOP, [0.0, offset_y])
        .fixed_size([WINDOW_WIDTH, 0.0])
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.label(
                    egui::RichText::new(format!("{icon} {}", state.reload.message()))
                        .size(15.0)
                        .strong()
                        .color(color),
                );
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.small_button("✖").on_hover_text("Dismiss").clicked() {
                        dismiss = true;
                    }
                });
            });

            let lines = state.reload.lines();
            if lines.is_empty() {
                return;
            }

            ui.separator();
            egui::ScrollArea::vertical()
                .max_height(220.0)
                .auto_shrink([false, true])
                .show(ui, |ui| {
                    for line in lines {
                        ui.label(
                            egui::RichText::new(&line.text)
                                .monospace()
                                .size(11.0)
                                .color(theme.line_color(line.kind)),
                        );
                    }
                });
        });

    if dismiss {
        state.reload.dismiss();
    }
}
