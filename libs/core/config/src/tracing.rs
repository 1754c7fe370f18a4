use crate::Environment;
use tracing::{debug, info};
use tracing_subscriber::{prelude::*, EnvFilter};

const PRODUCTION_FILTER: &str = "info,lapin=warn,sea_orm=warn,sqlx=warn";
const DEVELOPMENT_FILTER: &str = "debug,lapin=info,sea_orm=info,sqlx=info,handlebars=info";

/// Install color-eyre with a project-standard configuration.
///
/// Call this early in main() before any fallible operations to ensure
/// colored error output. Safe to call multiple times.
pub fn install_color_eyre() {
    let _ = color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install();
}

/// Initialize tracing for a service with environment-aware output.
///
/// - **Production** (`APP_ENV=production`): flattened JSON events, no module
///   targets, info level with broker and database chatter reduced to warnings.
/// - **Development** (default): pretty multi-line events at debug level.
///
/// Both variants carry a `tracing_error::ErrorLayer` so `eyre` reports include
/// span traces. `RUST_LOG` overrides the default filter.
///
/// Calling this more than once is harmless; later calls are ignored, which
/// keeps tests that share a process from fighting over the global subscriber.
pub fn init_tracing(environment: &Environment, service: &'static str) {
    let is_production = environment.is_production();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if is_production {
            PRODUCTION_FILTER
        } else {
            DEVELOPMENT_FILTER
        })
    });

    let result = if is_production {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .flatten_event(true),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false)
                    .pretty(),
            )
            .with(tracing_error::ErrorLayer::default())
            .with(filter)
            .try_init()
    };

    match result {
        Ok(_) => {
            info!(service, environment = ?environment, "Tracing initialized");
        }
        Err(_) => {
            debug!(service, "Tracing already initialized, skipping re-initialization");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_development() {
        init_tracing(&Environment::Development, "subtrack-test");
    }

    #[test]
    fn test_init_tracing_production() {
        init_tracing(&Environment::Production, "subtrack-test");
    }

    #[test]
    fn test_init_tracing_multiple_calls() {
        let env = Environment::Development;
        init_tracing(&env, "subtrack-test");
        init_tracing(&env, "subtrack-test");
    }

    #[test]
    fn test_init_tracing_with_rust_log_env() {
        temp_env::with_var("RUST_LOG", Some("warn,subtrack_sender=trace"), || {
            init_tracing(&Environment::Production, "subtrack-test");
        });
    }
}
