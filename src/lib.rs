pub mod cli;
pub mod commands;
pub mod core;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::cli::Args;
use crate::core::state::settings::default_logs_dir;
use crate::core::state::{AppState, Settings};

const DEFAULT_LOG_FILTER: &str = "info,packsmith_lib=debug";

/// Console gets warnings unless `RUST_LOG` says otherwise; the daily log
/// file under `logs_dir` always records the default filter.
fn init_tracing(logs_dir: &Path) -> Option<WorkerGuard> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("packsmith")
        .filename_suffix("log")
        .build(logs_dir);

    match appender {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::new(DEFAULT_LOG_FILTER));
            tracing_subscriber::registry().with(console).with(file).init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry().with(console).init();
            tracing::warn!("File logging disabled ({:?}): {}", logs_dir, e);
            None
        }
    }
}

pub fn run() -> ExitCode {
    let args = Args::parse();
    // Before settings, so a corrupt file or bad override is logged.
    let _log_guard = init_tracing(&default_logs_dir());
    let settings = Settings::load();

    let state = match AppState::new(settings) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Packsmith {} starting", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: cannot start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::execute(args, state)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
