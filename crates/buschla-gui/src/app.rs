/// Main `eframe::App` implementation for Buschla.
///
/// This is the top-level UI layout that composes all panels and widgets.
use crate::panels;
use crate::state::{AppState, LibraryReloader};
use crate::theme::BuschlaTheme;
use crate::widgets;
use buschla_core::watcher::{ReactionConfig, WatchConfig};
use std::path::Path;
use tracing::warn;

/// Pre-built application state.
///
/// Construct this **before** calling `eframe::run_native` so the watcher
/// worker is already running when the first frame is drawn.
pub struct BuschlaState {
    pub(crate) inner: AppState,
}

impl BuschlaState {
    /// Start watching the project around the running executable: its parent
    /// directory and that directory's `src`.
    pub fn build() -> Self {
        let mut state = AppState::new();
        match std::env::current_exe() {
            Ok(exe) => state.start_watcher(project_config(&exe)),
            Err(e) => {
                warn!("Cannot locate the running executable: {}", e);
                state.watcher_error = Some(e.to_string());
            }
        }
        Self { inner: state }
    }

    /// Install the hook run after every successful build.
    pub fn with_reloader(mut self, reloader: Box<dyn LibraryReloader>) -> Self {
        self.inner.set_reloader(reloader);
        self
    }
}

/// Watch config for the project an executable at `exe` was built from.
///
/// The build runs in the project directory.
pub fn project_config(exe: &Path) -> WatchConfig {
    let exe_dir = exe.parent().unwrap_or_else(|| Path::new("."));
    let project = exe_dir.join("..");

    let mut config = WatchConfig::new().with_reaction(ReactionConfig {
        working_dir: Some(project.clone()),
        ..ReactionConfig::default()
    });
    for dir in [project.clone(), project.join("src")] {
        if let Err(e) = config.append_directory(dir) {
            warn!("{}", e);
        }
    }
    config
}

/// The Buschla application.
pub struct BuschlaApp {
    state: AppState,
}

impl BuschlaApp {
    /// Create a new application instance from pre-built state.
    ///
    /// The state should have been constructed by [`BuschlaState::build()`]
    /// *before* `eframe::run_native` is called.
    pub fn with_state(cc: &eframe::CreationContext<'_>, state: BuschlaState) -> Self {
        BuschlaTheme::dark().apply(&cc.egui_ctx, true);
        Self { state: state.inner }
    }
}

impl eframe::App for BuschlaApp {
    /// Override the GPU clear colour to match the active theme background,
    /// preventing a colour mismatch flash between frames.
    fn clear_color(&self, visuals: &egui::Visuals) -> [f32; 4] {
        let [r, g, b, a] = visuals.panel_fill.to_array();
        [
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
            a as f32 / 255.0,
        ]
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // ── Apply theme ───────────────────────────────────────────────────
        BuschlaTheme::for_mode(self.state.dark_mode).apply(ctx, self.state.dark_mode);

        // ── Process watcher events ────────────────────────────────────────
        let changed = self.state.process_watcher_events();
        let dt = ctx.input(|i| i.stable_dt);
        self.state.reload.tick(dt);

        // The worker never wakes the UI, so keep polling while it runs.
        if changed || self.state.reload.is_animating() {
            ctx.request_repaint();
        } else if self.state.watcher_active() {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }

        // ── Top toolbar ───────────────────────────────────────────────────
        egui::TopBottomPanel::top("toolbar")
            .min_height(36.0)
            .show(ctx, |ui| {
                ui.add_space(4.0);
                widgets::toolbar::toolbar(ui, &mut self.state);
                ui.add_space(4.0);
            });

        // ── About dialog ──────────────────────────────────────────────────
        let mut show_about = self.state.show_about;
        egui::Window::new("About Buschla")
            .open(&mut show_about)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .fixed_size([340.0, 0.0])
            .show(ctx, |ui| {
                let accent = ui.visuals().hyperlink_color;
                let muted = ui.visuals().weak_text_color();
                let normal = ui.visuals().text_color();

                ui.vertical_centered(|ui| {
                    ui.add_space(8.0);
                    ui.label(
                        egui::RichText::new("🔨 Buschla")
                            .size(24.0)
                            .strong()
                            .color(accent),
                    );
                    ui.add_space(4.0);
                    ui.label(
                        egui::RichText::new(format!("v{}", env!("CARGO_PKG_VERSION")))
                            .size(13.0)
                            .color(muted),
                    );
                    ui.add_space(12.0);
                    ui.label(
                        egui::RichText::new(
                            "Log browser with a live rebuild loop.\n\
                             Saves in the project trigger a build\n\
                             and the result shows up here.",
                        )
                        .size(12.0)
                        .color(normal),
                    );
                    ui.add_space(8.0);
                    ui.label(
                        egui::RichText::new("Built with Rust & egui")
                            .size(11.0)
                            .color(muted),
                    );
                    ui.add_space(8.0);
                });
            });
        self.state.show_about = show_about;

        // ── Bottom status bar ─────────────────────────────────────────────
        egui::TopBottomPanel::bottom("status_bar")
            .min_height(24.0)
            .show(ctx, |ui| {
                ui.add_space(2.0);
                widgets::status_bar::status_bar(ui, &self.state);
                ui.add_space(2.0);
            });

        // ── Changed files panel (optional bottom panel) ───────────────────
        if self.state.show_watch_panel {
            egui::TopBottomPanel::bottom("watch_panel")
                .resizable(true)
                .default_height(200.0)
                .min_height(120.0)
                .max_height(500.0)
                .show(ctx, |ui| {
                    ui.add_space(4.0);
                    panels::watch_panel::watch_panel(ui, &mut self.state);
                    ui.add_space(4.0);
                });
        }

        // ── Build log (optional right panel) ──────────────────────────────
        if self.state.show_build_log {
            egui::SidePanel::right("build_log")
                .default_width(420.0)
                .min_width(240.0)
                .resizable(true)
                .show(ctx, |ui| {
                    panels::build_log_panel::build_log_panel(ui, &self.state);
                });
        }

        // ── Central panel ─────────────────────────────────────────────────
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.centered_and_justified(|ui| {
                ui.label(
                    egui::RichText::new("Open a log file to start browsing")
                        .size(14.0)
                        .color(ui.visuals().weak_text_color()),
                );
            });
        });

        // ── Reload status (drawn last so it floats on top) ────────────────
        panels::reload_window::reload_window(ctx, &mut self.state);
    }
}
