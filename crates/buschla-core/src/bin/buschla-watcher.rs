//! Standalone watcher worker.
//!
//! Same behaviour as running the `buschla` binary with
//! `--dir-watcher-worker`; useful for tests and for running the watcher
//! without the GUI in the same install.

fn main() {
    // stdout is the event channel; logs must go to stderr.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = buschla_core::watcher::worker::run_worker_process() {
        tracing::error!("Worker: exiting with error: {e}");
        std::process::exit(1);
    }
}
