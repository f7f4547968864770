//! Service configuration.
//!
//! Environment-driven settings for the HTTP server and for the
//! locations of the connection-settings file and the encrypted
//! credential file.

/// Default path of the host-managed encrypted credential file.
pub const DEFAULT_CREDENTIAL_FILE: &str = "/home/nxt/config";

/// Default path of the local JSON connection-settings file.
pub const DEFAULT_SETTINGS_FILE: &str = "dbviewer_settings.json";

/// Application configuration shared by all components.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Service name (used in response metadata and logs).
    pub service_name: String,
    /// Bind host for the HTTP server.
    pub host: String,
    /// Bind port for the HTTP server.
    pub port: u16,
    /// Database connect/acquire timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Path of the local JSON connection-settings file.
    pub settings_path: String,
    /// Path of the encrypted credential file.
    pub credential_path: String,
}

impl AppConfig {
    /// Loads configuration from the environment with defaults,
    /// tagging it with the given service name.
    pub fn load_with_service(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            host: env_or("SERVER_HOST", "0.0.0.0"),
            port: env_parse("SERVER_PORT", 8080),
            connect_timeout_secs: env_parse("CONNECT_TIMEOUT_SECS", 10),
            settings_path: env_or("VIEWER_SETTINGS_FILE", DEFAULT_SETTINGS_FILE),
            credential_path: env_or("VIEWER_CREDENTIAL_FILE", DEFAULT_CREDENTIAL_FILE),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_uses_defaults_when_env_is_unset() {
        let config = AppConfig::load_with_service("viewer-service");
        assert_eq!(config.service_name, "viewer-service");
        assert_eq!(config.credential_path, DEFAULT_CREDENTIAL_FILE);
        assert_eq!(config.connect_timeout_secs, 10);
    }
}
