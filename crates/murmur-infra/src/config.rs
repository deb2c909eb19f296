//! Relay configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.murmur/` in production)
//! and deserializes it into [`RelayConfig`]. Falls back to defaults when the
//! file is missing or malformed, then applies environment overrides.

use std::path::Path;

use murmur_types::config::RelayConfig;

/// Port override honored for compatibility with common hosting setups.
pub const PORT_ENV: &str = "PORT";

/// Load relay configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`RelayConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_relay_config(data_dir: &Path) -> RelayConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return RelayConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return RelayConfig::default();
        }
    };

    match toml::from_str::<RelayConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            RelayConfig::default()
        }
    }
}

/// Apply environment overrides on top of file configuration.
///
/// Only `PORT` is recognized. An unparsable value is logged and ignored.
pub fn apply_env_overrides(mut config: RelayConfig, port_var: Option<String>) -> RelayConfig {
    if let Some(raw) = port_var {
        match raw.parse::<u16>() {
            Ok(port) => config.port = port,
            Err(err) => tracing::warn!(value = %raw, "Ignoring invalid {PORT_ENV}: {err}"),
        }
    }
    config
}
