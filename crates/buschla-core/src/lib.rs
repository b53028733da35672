/// Buschla Core: directory watching and build reactions.
///
/// This crate contains everything below the UI: the watcher worker
/// process, its wire protocol, and the controller handle the GUI polls.
///
/// # Modules
///
/// - [`watcher`]: Cross-process directory watcher and build reaction runner.
/// - [`error`]: Error types shared by the watcher modules.
pub mod error;
pub mod watcher;
