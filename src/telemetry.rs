//! Tracing setup for the host binary.
//!
//! LOG_LEVEL takes an EnvFilter directive string; when unset the engine
//! targets (`engine`, `selection`) run at debug and everything else at info.
//! LOG_FORMAT=json switches to one JSON object per line, anything else is the
//! human-readable formatter.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info,selection=debug,engine=debug,tower_http=info,axum=info";

fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

pub fn init_tracing() {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter_from_env())
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // The two formatters are different types, so each arm calls init itself.
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}
