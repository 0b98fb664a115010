//! Structured logging setup
//!
//! Thin wrapper over the `tracing` ecosystem. Initialization is guarded by a
//! `Once` so repeated calls (library embedding, tests) are harmless. The
//! level comes from `RUST_LOG` when set, otherwise `PACKBOX_LOG_LEVEL`.

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize logging from the environment. Safe to call more than once.
pub fn init_from_env() {
    let level_str = env::var("PACKBOX_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    init_with_level(parse_level(&level_str));
}

/// Initialize logging with an explicit level, unless `RUST_LOG` overrides it.
pub fn init_with_level(level: Level) {
    INIT.call_once(|| {
        let mut filter = EnvFilter::from_default_env();

        if env::var("RUST_LOG").is_err() {
            if let Ok(directive) = format!("packbox={}", level).parse() {
                filter = filter.add_directive(directive);
            }
        }

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    });
}

fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), Level::DEBUG);
        assert_eq!(parse_level("WARN"), Level::WARN);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }

    #[test]
    fn test_double_init_is_safe() {
        init_with_level(Level::ERROR);
        init_with_level(Level::DEBUG);
    }
}
