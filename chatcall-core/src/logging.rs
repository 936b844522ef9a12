use std::sync::Arc;

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::LoggingConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured level when present, so a running
/// deployment can be re-leveled without touching its config file.
/// `format: "json"` selects machine-readable output for log collectors;
/// anything else renders the human-readable form. A `file_path` appends
/// to that file instead of writing to stderr.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let directive = level_directive(&config.level)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let sink = match &config.file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            Some(Arc::new(file))
        }
        None => None,
    };

    let layer: Box<dyn Layer<_> + Send + Sync> = match (config.format.as_str(), sink) {
        ("json", Some(file)) => fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(file)
            .boxed(),
        ("json", None) => fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        (_, Some(file)) => fmt::layer()
            .pretty()
            .with_target(true)
            .with_line_number(true)
            .with_writer(file)
            .boxed(),
        (_, None) => fmt::layer()
            .pretty()
            .with_target(true)
            .with_line_number(true)
            .boxed(),
    };

    tracing_subscriber::registry().with(filter).with(layer).init();
    Ok(())
}

/// Normalize a configured level into a directive `EnvFilter` accepts,
/// rejecting strings it would otherwise silently drop.
fn level_directive(level: &str) -> anyhow::Result<&'static str> {
    Ok(match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" => "error",
        other => anyhow::bail!("Unknown log level: {other}"),
    })
}
