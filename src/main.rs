//! Buschla: log browser with a live rebuild loop.
//!
//! Thin binary entry point. All logic lives in the `buschla-core`
//! and `buschla-gui` crates. The same binary doubles as the directory
//! watcher worker when started with `--dir-watcher-worker`.

use buschla_core::watcher::WORKER_ARG;

fn main() -> anyhow::Result<()> {
    if std::env::args_os().nth(1).is_some_and(|arg| arg == WORKER_ARG) {
        return run_worker();
    }

    // Initialise structured logging.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("Buschla starting");

    // Start the watcher *before* opening the window so the first change
    // after launch is never missed.
    let state = buschla_gui::BuschlaState::build();

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_title("Buschla")
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([800.0, 500.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Buschla",
        options,
        Box::new(|cc| Ok(Box::new(buschla_gui::BuschlaApp::with_state(cc, state)))),
    )
    .map_err(|e| anyhow::anyhow!("eframe error: {e}"))?;

    Ok(())
}

/// Worker mode: stdout carries events, so logs go to stderr.
fn run_worker() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    buschla_core::watcher::worker::run_worker_process()?;
    Ok(())
}
