/// Logging setup for processes that embed a debug session
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::stdio::OriginalStderr;

/// Install a subscriber writing to the process' original stderr.
///
/// Log lines never reach the remote terminal, even while a command runs with
/// stdio redirected. `RUST_LOG` overrides `level`. Returns `None` when the
/// process already has a subscriber; otherwise keep the guard alive for as
/// long as logs should be flushed.
pub fn init_logging(level: &str) -> Option<WorkerGuard> {
    OriginalStderr::capture();
    let (writer, guard) = tracing_appender::non_blocking(OriginalStderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true)
                .with_target(true),
        )
        .try_init();

    match installed {
        Ok(()) => {
            tracing::info!("Logging initialized with level: {}", level);
            Some(guard)
        }
        Err(_) => None,
    }
}
