//! `tracing` subscriber initialisation for AegisDrive processes.
//!
//! Call [`init_tracing`] once at process startup, before constructing an
//! [`Orchestrator`][crate::Orchestrator] with the default
//! [`ConsoleSink`](aegis_types::ConsoleSink).
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `AEGIS_LOG_FORMAT=json` | Emit newline-delimited JSON logs. |

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialise the global `tracing` subscriber.
///
/// Chooses JSON or compact human-readable formatting based on
/// `AEGIS_LOG_FORMAT`. Safe to call from exactly one place per process;
/// a second call returns `false` and leaves the existing subscriber
/// untouched.
pub fn init_tracing(service_name: &str) -> bool {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let use_json = std::env::var("AEGIS_LOG_FORMAT").as_deref() == Ok("json");

    let result = if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init()
    };

    match result {
        Ok(()) => {
            tracing::info!(service = service_name, "tracing initialised");
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_false_instead_of_panicking() {
        let _ = init_tracing("aegis-test");
        // The global subscriber is already installed by now, whoever did it.
        assert!(!init_tracing("aegis-test"));
    }
}
