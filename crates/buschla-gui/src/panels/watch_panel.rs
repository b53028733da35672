/// Changed files panel.
///
/// Displays a continuously-updated table of files the watcher reported as
/// closed after writing, most active first.
///
/// The panel is rendered as a bottom panel when `state.show_watch_panel`
/// is `true`.
use crate::state::AppState;
use egui::Ui;
use std::path::Path;

/// Rows drawn at most; the rest are summarised in one line.
const MAX_ROWS: usize = 200;

/// Draw the changed files panel.
pub fn watch_panel(ui: &mut Ui, state: &mut AppState) {
    ui.vertical(|ui| {
        // ── Header row ────────────────────────────────────────────────────
        ui.horizontal(|ui| {
            ui.label(
                egui::RichText::new("👁 Changed Files")
                    .strong()
                    .color(ui.visuals().hyperlink_color),
            );

            ui.separator();

            let summary = match state.watched_dirs.as_slice() {
                [] => "No directories configured".to_owned(),
                [one] => format!("Watching: {}", one.display()),
                [first, rest @ ..] => {
                    format!("Watching: {} (+{} more)", first.display(), rest.len())
                }
            };
            ui.label(
                egui::RichText::new(summary)
                    .size(11.0)
                    .color(ui.visuals().weak_text_color()),
            );

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui
                    .button("🗑 Clear")
                    .on_hover_text("Clear all recorded changes")
                    .clicked()
                {
                    state.watch_entries.clear();
                }
            });
        });

        ui.separator();

        // ── Content ──────────────────────────────────────────────────────
        if state.watch_entries.is_empty() {
            ui.centered_and_justified(|ui| {
                let msg = if state.watcher_active() {
                    "Waiting for file changes..."
                } else {
                    "The directory watcher is not running."
                };
                ui.label(
                    egui::RichText::new(msg)
                        .size(12.0)
                        .color(ui.visuals().weak_text_color()),
                );
            });
            return;
        }

        let sorted = state.sorted_entries();
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .show(ui, |ui| {
                let accent = ui.visuals().hyperlink_color;
                let muted = ui.visuals().weak_text_color();
                let text_col = ui.visuals().text_color();

                ui.horizontal(|ui| {
                    ui.add_sized(
                        [50.0, 16.0],
                        egui::Label::new(egui::RichText::new("Changes").size(11.0).color(accent)),
                    );
                    ui.add_sized(
                        [90.0, 16.0],
                        egui::Label::new(
                            egui::RichText::new("Last Seen").size(11.0).color(accent),
                        ),
                    );
                    ui.label(egui::RichText::new("File Path").size(11.0).color(accent));
                });

                ui.separator();

                for entry in sorted.iter().take(MAX_ROWS) {
                    ui.horizontal(|ui| {
                        ui.add_sized(
                            [50.0, 18.0],
                            egui::Label::new(
                                egui::RichText::new(entry.hit_count.to_string())
                                    .size(12.0)
                                    .strong()
                                    .color(text_col),
                            ),
                        );

                        let time_str = entry.last_seen.format("%H:%M:%S").to_string();
                        ui.add_sized(
                            [90.0, 18.0],
                            egui::Label::new(egui::RichText::new(time_str).size(11.0).color(muted)),
                        );

                        // Approximate 7 px per character at 12 px proportional size.
                        let avail_chars = (ui.available_width() / 7.0).max(20.0) as usize;
                        let full = entry.path.display().to_string();
                        ui.label(
                            egui::RichText::new(truncate_path_left(&entry.path, avail_chars))
                                .size(12.0)
                                .color(text_col),
                        )
                        .on_hover_text(full);
                    });
                }

                if sorted.len() > MAX_ROWS {
                    ui.label(
                        egui::RichText::new(format!(
                            "… and {} more files (showing top {} by activity)",
                            sorted.len() - MAX_ROWS,
                            MAX_ROWS
                        ))
                        .size(11.0)
                        .color(muted),
                    );
                }
            });
    });
}

/// Truncate a path from the left so it fits within `max_chars` characters,
/// keeping the file name visible.
///
/// Counts characters, not bytes, so multi-byte names never split.
fn truncate_path_left(path: &Path, max_chars: usize) -> String {
    let text = path.display().to_string();
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return text;
    }
    let keep = max_chars.saturating_sub(4);
    let skip = char_count.saturating_sub(keep);
    let byte_start = text
        .char_indices()
        .nth(skip)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    format!(".../{}", &text[byte_start..])
}
