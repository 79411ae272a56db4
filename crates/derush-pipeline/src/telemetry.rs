//! Tracing initialisation for binaries embedding the pipeline.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialise tracing: colored output for dev, JSON when
/// `LOG_FORMAT=json`. Also loads `.env`. Safe to call more than once;
/// later calls are no-ops.
pub fn init() {
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("derush=info".parse().expect("static directive parses"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .try_init()
            .ok();
    }
}
