//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

/// Install a global `tracing` subscriber from the `[tracing]` config section
///
/// An invalid filter directive falls back to `info`. Calling this more than
/// once, or after the host installed its own subscriber, leaves the existing
/// subscriber in place.
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.tracing.log_level.clone();
    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if config.tracing.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::info!("Tracing initialized for session: {}", config.session.name);
    } else {
        tracing::debug!("Tracing subscriber already installed, keeping it");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_tolerated() {
        let config = Config::default();
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_ok());
    }

    #[test]
    fn test_invalid_filter_falls_back() {
        let mut config = Config::default();
        config.tracing.log_level = "not a [valid filter".to_string();
        config.tracing.json = true;
        assert!(init_tracing(&config).is_ok());
    }
}
