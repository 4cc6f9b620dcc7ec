use std::sync::Once;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static LOG_INIT: Once = Once::new();

/// Initialize the global tracing subscriber once.
///
/// `RUST_LOG` takes precedence over `default_filter`. Safe to call from
/// every test; subsequent calls are no-ops.
pub fn log_init(default_filter: &str) {
    LOG_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        let format = tracing_subscriber::fmt::layer()
            .with_level(true)
            .with_target(true)
            .with_ansi(true)
            .compact();
        tracing_subscriber::registry().with(filter).with(format).init();
    });
}
