//! Broker client configuration.
//!
//! Properties are layered: built-in defaults, then connection settings
//! (bootstrap servers, SASL credentials), then `--config-file`, then
//! `--config`. Later layers win.

use crate::error::{Error, Result};
use rdkafka::config::ClientConfig;
use std::path::Path;

/// Connection settings shared by the produce and consume commands.
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    /// Comma-separated `host:port` list
    pub bootstrap: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// User-supplied librdkafka properties, in override order
    pub overrides: Vec<(String, String)>,
}

impl ClientSettings {
    pub fn validate(&self) -> Result<()> {
        if self.bootstrap.trim().is_empty() {
            return Err(Error::ConfigValidation(
                "no bootstrap servers: pass --bootstrap or set KAFKA_BOOTSTRAP".to_string(),
            ));
        }
        match (&self.api_key, &self.api_secret) {
            (Some(_), None) => Err(Error::ConfigValidation(
                "--api-key requires --api-secret".to_string(),
            )),
            (None, Some(_)) => Err(Error::ConfigValidation(
                "--api-secret requires --api-key".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Build a librdkafka config: `defaults`, then connection, then overrides.
    pub fn client_config(&self, defaults: &[(&str, &str)]) -> ClientConfig {
        let mut config = ClientConfig::new();
        for (key, value) in defaults {
            config.set(*key, *value);
        }

        config.set("bootstrap.servers", &self.bootstrap);
        if let (Some(key), Some(secret)) = (&self.api_key, &self.api_secret) {
            config
                .set("security.protocol", "SASL_SSL")
                .set("sasl.mechanisms", "PLAIN")
                .set("sasl.username", key)
                .set("sasl.password", secret);
        }

        for (key, value) in &self.overrides {
            config.set(key, value);
        }
        config
    }
}

/// Parse `--config` values: each is `key=value`, or several joined by commas.
pub fn parse_config_flags(values: &[String]) -> Result<Vec<(String, String)>> {
    let mut properties = Vec::new();
    for entry in values.iter().flat_map(|v| v.split(',')) {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            Error::ConfigValidation(format!(
                "invalid --config entry '{entry}': expected key=value"
            ))
        })?;
        properties.push((key.trim().to_string(), value.trim().to_string()));
    }
    Ok(properties)
}

/// Parse a Java-style properties file (`key=value` or `key: value`, with
/// `#` and `!` comments).
pub fn parse_properties(text: &str) -> Result<Vec<(String, String)>> {
    let mut properties = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let split = line
            .find(['=', ':'])
            .ok_or_else(|| {
                Error::ConfigValidation(format!(
                    "line {}: expected key=value, got '{line}'",
                    number + 1
                ))
            })?;
        let key = line[..split].trim();
        let value = line[split + 1..].trim();
        if key.is_empty() {
            return Err(Error::ConfigValidation(format!(
                "line {}: empty property name",
                number + 1
            )));
        }
        properties.push((key.to_string(), value.to_string()));
    }
    Ok(properties)
}

pub fn load_properties_file(path: &Path) -> Result<Vec<(String, String)>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::ConfigValidation(format!("cannot read config file {}: {e}", path.display()))
    })?;
    parse_properties(&text)
}
