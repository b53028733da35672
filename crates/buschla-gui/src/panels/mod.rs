/// UI panels for Buschla.

pub mod build_log_panel;
pub mod reload_window;
pub mod watch_panel;
