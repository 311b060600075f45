use tracing_subscriber::EnvFilter;

const FALLBACK_LEVEL: &str = "info";

/// Installs the global fmt subscriber. `RUST_LOG` takes precedence over the
/// configured level; an unparsable level falls back to `info`.
///
/// Returns `false` when a subscriber was already installed (tests, repeated init).
pub fn init(log_level: &str) -> bool {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level.trim())
            .unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
