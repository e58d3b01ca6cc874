use crate::config::LogFormat;

/// Initialize structured logging.
///
/// The library itself never installs a global subscriber on its own; embedders (the CLI, or a
/// host application) call this explicitly with the format they want. Defaults to `error` level
/// unless overridden by `STREAMWRIGHT_LOG`.
#[cfg(feature = "logging")]
pub fn init(format: LogFormat) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    if format == LogFormat::Off {
        return;
    }

    let filter = EnvFilter::builder()
        .with_env_var("STREAMWRIGHT_LOG")
        .with_default_directive(tracing::level_filters::LevelFilter::ERROR.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter);

    let result = if format == LogFormat::Json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    let _ = result;
}

/// Initialize logging when the `logging` feature is not enabled.
///
/// Kept as a no-op so library consumers can call `streamwright::logging::init(..)` without
/// needing to pull in `tracing-subscriber`.
#[cfg(not(feature = "logging"))]
pub fn init(_format: LogFormat) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init(LogFormat::Off);
        init(LogFormat::Off);
    }
}
