use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    EnvFilter, filter::Targets, fmt, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

/// A valid `RUST_LOG` replaces the crate-level filter entirely, so it can
/// both raise and lower the level `verbose` would pick.
fn filters(verbose: bool, from_env: Option<EnvFilter>) -> (Option<Targets>, EnvFilter) {
    let (level_filter, level) = if verbose {
        (LevelFilter::DEBUG, "debug")
    } else {
        (LevelFilter::INFO, "info")
    };
    match from_env {
        Some(env_filter) => (None, env_filter),
        None => (
            Some(Targets::new().with_target("m2tracker", level_filter)),
            EnvFilter::new(level),
        ),
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `verbose`.
pub fn init_logging(verbose: bool) {
    let (app_filter, env_filter) = filters(verbose, EnvFilter::try_from_default_env().ok());

    tracing_subscriber::registry()
        .with(fmt::layer().pretty().without_time())
        .with(app_filter)
        .with(env_filter)
        .init();
}
