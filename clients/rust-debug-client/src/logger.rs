use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::Result;

/// Initialize logging to stderr; warnings only unless `debug` is set
pub fn init_logging(debug: bool) -> Result<()> {
    let level = if debug { LevelFilter::DEBUG } else { LevelFilter::WARN };

    let targets = Targets::new().with_default(level);

    // Raw mode is entered later, so lines written before it stay readable
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_thread_names(true)
                .with_level(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true),
        )
        .with(targets)
        .try_init()?;

    tracing::debug!("Logging initialized with level: {:?}", level);
    Ok(())
}
