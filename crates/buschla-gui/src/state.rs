/// Application state management.
///
/// Centralises all mutable state that the UI reads and writes.
/// The watcher worker talks to us through its pipe; state updates happen
/// in `process_watcher_events()` which runs once per frame.
use crate::reload::ReloadStatus;
use buschla_core::watcher::{DirWatcher, WatchConfig, WatcherEvent};
use std::path::PathBuf;
use tracing::{info, warn};

/// Maximum number of unique changed files retained in the watch panel.
///
/// The entry seen least recently is evicted when this limit is reached.
pub const MAX_WATCH_ENTRIES: usize = 500;

/// One changed file as shown in the watch panel.
#[derive(Clone, Debug)]
pub struct WatchEntry {
    pub path: PathBuf,
    /// Number of change events observed for this file since startup.
    pub hit_count: u64,
    pub last_seen: chrono::DateTime<chrono::Local>,
}

/// The most recent build reaction.
#[derive(Clone, Debug)]
pub struct LastReport {
    pub exit_status: i32,
    pub output: String,
    pub received: chrono::DateTime<chrono::Local>,
}

/// Hook run after a successful build, typically swapping in the freshly
/// built application library.
pub trait LibraryReloader {
    fn reload(&mut self) -> anyhow::Result<()>;
}

/// All application state.
pub struct AppState {
    // ── Watcher ────────────────────────────────────────
    /// `None` if the watcher failed to start or was stopped.
    pub watcher: Option<DirWatcher>,
    pub watched_dirs: Vec<PathBuf>,
    /// Why the watcher is not running, if it failed to start.
    pub watcher_error: Option<String>,

    // ── Events ─────────────────────────────────────────
    /// Changed files, capped at [`MAX_WATCH_ENTRIES`].
    pub watch_entries: Vec<WatchEntry>,
    pub last_report: Option<LastReport>,
    pub reaction_count: u64,
    pub reload: ReloadStatus,
    reloader: Option<Box<dyn LibraryReloader>>,

    // ── UI state ───────────────────────────────────────
    pub show_watch_panel: bool,
    pub show_build_log: bool,
    pub show_about: bool,
    /// `true` = dark mode (default), `false` = light mode.
    pub dark_mode: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Create initial application state with no watcher attached.
    pub fn new() -> Self {
        Self {
            watcher: None,
            watched_dirs: Vec::new(),
            watcher_error: None,
            watch_entries: Vec::new(),
            last_report: None,
            reaction_count: 0,
            reload: ReloadStatus::new(),
            reloader: None,
            show_watch_panel: true,
            show_build_log: false,
            show_about: false,
            dark_mode: true,
        }
    }

    pub fn set_reloader(&mut self, reloader: Box<dyn LibraryReloader>) {
        self.reloader = Some(reloader);
    }

    /// Start a watcher for `config` using this executable as the worker.
    ///
    /// Stops any previously running watcher first. A failure is kept in
    /// `watcher_error` for display; the application keeps running.
    pub fn start_watcher(&mut self, config: WatchConfig) {
        self.stop_watcher();
        self.watched_dirs = config.directories().to_vec();
        match buschla_core::watcher::start_watcher(config) {
            Ok(watcher) => self.attach_watcher(watcher),
            Err(e) => {
                warn!("Could not start directory watcher: {}", e);
                self.watcher_error = Some(e.to_string());
            }
        }
    }

    /// Take ownership of an already spawned watcher.
    pub fn attach_watcher(&mut self, watcher: DirWatcher) {
        self.stop_watcher();
        self.watched_dirs = watcher.directories().to_vec();
        self.watcher_error = None;
        self.watcher = Some(watcher);
    }

    /// Shut the watcher down. Pending events are discarded.
    pub fn stop_watcher(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.shutdown();
        }
    }

    /// `true` while a watcher is attached and its channel is open.
    pub fn watcher_active(&self) -> bool {
        self.watcher.as_ref().is_some_and(|w| !w.is_closed())
    }

    /// Drain every pending watcher event. Called once per frame.
    ///
    /// Returns `true` if the UI should repaint.
    pub fn process_watcher_events(&mut self) -> bool {
        let mut repaint = false;
        loop {
            let event = match self.watcher.as_mut().and_then(DirWatcher::poll_event) {
                Some(event) => event,
                None => break,
            };
            repaint = true;
            self.handle_event(event);
        }
        repaint
    }

    /// Apply one decoded watcher event.
    pub fn handle_event(&mut self, event: WatcherEvent) {
        match event {
            WatcherEvent::FileChanged { paths } => {
                for path in paths {
                    self.record_change(path);
                }
            }
            WatcherEvent::ReactionReport {
                exit_status,
                output,
            } => self.apply_report(exit_status, output),
        }
    }

    fn record_change(&mut self, path: PathBuf) {
        let now = chrono::Local::now();
        if let Some(entry) = self.watch_entries.iter_mut().find(|e| e.path == path) {
            entry.hit_count += 1;
            entry.last_seen = now;
            return;
        }

        if self.watch_entries.len() >= MAX_WATCH_ENTRIES {
            if let Some(pos) = self
                .watch_entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(i, _)| i)
            {
                self.watch_entries.remove(pos);
            }
        }
        self.watch_entries.push(WatchEntry {
            path,
            hit_count: 1,
            last_seen: now,
        });
    }

    fn apply_report(&mut self, exit_status: i32, output: String) {
        self.reaction_count += 1;

        if exit_status == 0 {
            let reloaded = match self.reloader.as_mut() {
                Some(reloader) => reloader.reload(),
                None => Ok(()),
            };
            match reloaded {
                Ok(()) => {
                    info!("Build succeeded, reloaded");
                    self.reload.show_success("Build succeeded, reloaded", &output);
                }
                Err(e) => {
                    warn!("Build succeeded but reload failed: {:#}", e);
                    self.reload
                        .show_failure(format!("Reload failed: {e:#}"), &output);
                }
            }
        } else {
            warn!("Build failed with exit status {}", exit_status);
            self.reload
                .show_failure(format!("Build failed (exit {exit_status})"), &output);
        }

        self.last_report = Some(LastReport {
            exit_status,
            output,
            received: chrono::Local::now(),
        });
    }

    /// Entries ordered for display: most active first, then most recent.
    pub fn sorted_entries(&self) -> Vec<&WatchEntry> {
        let mut sorted: Vec<&WatchEntry> = self.watch_entries.iter().collect();
        sorted.sort_by(|a, b| {
            b.hit_count
                .cmp(&a.hit_count)
                .then(b.last_seen.cmp(&a.last_seen))
        });
        sorted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingReloader;

    impl LibraryReloader for FailingReloader {
        fn reload(&mut self) -> anyhow::Result<()> {
            anyhow::bail!("symbol app_update missing")
        }
    }

    fn changed(paths: &[&str]) -> WatcherEvent {
        WatcherEvent::FileChanged {
            paths: paths.iter().map(PathBuf::from).collect(),
        }
    }

    #[test]
    fn test_repeated_change_bumps_hit_count() {
        let mut state = AppState::new();
        state.handle_event(changed(&["/p/a.h", "/p/b.cpp"]));
        state.handle_event(changed(&["/p/a.h"]));

        assert_eq!(state.watch_entries.len(), 2);
        let sorted = state.sorted_entries();
        assert_eq!(sorted[0].path, PathBuf::from("/p/a.h"));
        assert_eq!(sorted[0].hit_count, 2);
    }

    #[test]
    fn test_entries_are_capped() {
        let mut state = AppState::new();
        for i in 0..MAX_WATCH_ENTRIES + 10 {
            state.handle_event(changed(&[&format!("/p/{i}.h")]));
        }
        assert_eq!(state.watch_entries.len(), MAX_WATCH_ENTRIES);
    }

    #[test]
    fn test_reload_error_is_a_failure() {
        let mut state = AppState::new();
        state.set_reloader(Box::new(FailingReloader));
        state.handle_event(WatcherEvent::ReactionReport {
            exit_status: 0,
            output: "build ok".into(),
        });

        assert!(state.reload.is_open());
        assert!(!state.reload.success());
        assert!(state.reload.message().contains("app_update"));
    }

    #[test]
    fn test_no_watcher_means_nothing_to_drain() {
        let mut state = AppState::new();
        assert!(!state.process_watcher_events());
        assert!(!state.watcher_active());
    }
}
