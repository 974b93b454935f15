//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, NetworkEntry, UltrosConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &UltrosConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_networks(&config.networks)?;
    Ok(())
}

fn validate_logging_config(config: &LoggingConfig) -> ConfigResult<()> {
    if config.output == LogOutput::File && config.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.output is 'file' but logging.file_path is not set",
        ));
    }
    Ok(())
}

fn validate_networks(networks: &[NetworkEntry]) -> ConfigResult<()> {
    let mut seen = HashSet::new();

    for network in networks {
        if network.name.trim().is_empty() {
            return Err(ConfigError::validation("Network name cannot be empty"));
        }
        if network.name.contains(['/', '\\']) {
            return Err(ConfigError::validation(format!(
                "Network name '{}' cannot contain path separators",
                network.name
            )));
        }
        if !seen.insert(network.name.as_str()) {
            return Err(ConfigError::DuplicateNetwork(network.name.clone()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_network_names_are_rejected() {
        let config = UltrosConfig {
            networks: vec![NetworkEntry::new("libera"), NetworkEntry::new("libera")],
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::DuplicateNetwork(name)) if name == "libera"
        ));
    }

    #[test]
    fn test_file_output_needs_a_path() {
        let mut config = UltrosConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("ultros.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_network_names_are_plain() {
        let config = UltrosConfig {
            networks: vec![NetworkEntry::new("../escape")],
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }
}
