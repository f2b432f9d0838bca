use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns `false` when the host already installed a global subscriber, in
/// which case the engine's events go to that one.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}
