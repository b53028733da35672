/// Buschla GUI: egui-based desktop frontend.
///
/// This crate contains all UI code. The watcher pipeline lives in `buschla-core`.
pub mod app;
pub mod panels;
pub mod reload;
pub mod state;
pub mod theme;
pub mod widgets;

pub use app::{BuschlaApp, BuschlaState};
pub use state::{AppState, LibraryReloader};
