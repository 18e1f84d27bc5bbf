// src/logging.rs

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const QUIET_DEPENDENCIES: [&str; 3] = ["hyper=warn", "tower=warn", "tower_http=info"];

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
/// Calling it again is a no-op.
pub fn init_logging(config: &LoggingConfig) {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));
    for directive in QUIET_DEPENDENCIES {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.enable_json_output {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init()
    } else {
        let is_terminal = std::io::IsTerminal::is_terminal(&std::io::stdout());
        registry
            .with(fmt::layer().with_target(true).with_ansi(is_terminal))
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}
