//! Global tracing subscriber setup (SPEC_FULL.md §4.11).
//!
//! Grounded on the teacher's `telemetry::init_tracing`: a rolling file
//! writer via `logs-wheel`, wrapped in a `tracing_subscriber::fmt` layer
//! filtered by `EnvFilter::from_default_env()`.

use std::sync::Mutex;

use logs_wheel::LogFileInitializer;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    std::fs::create_dir_all("log").expect("failed to create log directory");

    let file_writer = LogFileInitializer {
        directory: "log".to_string(),
        filename: "orchestrator.log".to_string(),
        max_n_old_files: 2,
        preferred_max_file_size_mib: 1,
    }
    .init()
    .expect("failed to initialize rolling log file");

    let file_writer = Mutex::new(file_writer);

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(move || file_writer.lock().expect("log writer poisoned"))
        .with_ansi(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to install global tracing subscriber");
}
