//! Connection settings models.
//!
//! The static half of connection resolution: a JSON settings file
//! merged over built-in defaults. Decrypted credential-file contents
//! may overwrite a per-request copy later; nothing mutates the loaded
//! settings after a handle is resolved.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::{AppError, AppResult};

/// Default database port for this deployment.
pub const DEFAULT_PORT: u16 = 7999;

/// Handle kind discriminator.
///
/// Two supported statement styles over the same wire protocol: a
/// buffered text-protocol client and a prepared-statement client.
/// They differ in how statements are sent and in their
/// string-escaping rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Buffered text-protocol handle (backslash escaping).
    Buffered,
    /// Prepared-statement handle (quote-doubling escaping).
    Prepared,
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverKind::Buffered => write!(f, "buffered"),
            DriverKind::Prepared => write!(f, "prepared"),
        }
    }
}

/// Static connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ConnectionSettings {
    /// Handle kind to construct.
    pub driver: DriverKind,
    /// Database host.
    #[validate(length(max = 255, message = "host must be at most 255 characters"))]
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database username.
    #[validate(length(max = 128, message = "username must be at most 128 characters"))]
    pub username: String,
    /// Database password (never serialized back out).
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Database name; empty means "pick at browse time".
    pub database: String,
    /// Unix socket path; takes precedence over host:port when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub socket: Option<String>,
    /// Whether to try discovery providers before the manual fields.
    pub auto_detect: bool,
    /// Whether to consult the encrypted credential file.
    pub use_credential_file: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            driver: DriverKind::Buffered,
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            database: String::new(),
            socket: None,
            auto_detect: true,
            use_credential_file: true,
        }
    }
}

/// On-disk shape of the settings file; every field optional so a
/// partial file merges over defaults.
#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    driver: Option<DriverKind>,
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    database: Option<String>,
    socket: Option<String>,
    auto_detect: Option<bool>,
    use_credential_file: Option<bool>,
}

impl ConnectionSettings {
    /// Loads settings from a JSON file merged over defaults.
    /// A missing file yields the defaults; a malformed file is a
    /// validation error.
    pub fn load(path: &str) -> AppResult<Self> {
        let file = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str::<SettingsFile>(&content)
                .map_err(|e| AppError::Validation(format!("invalid settings file {path}: {e}")))?,
            Err(_) => {
                tracing::debug!(path = %path, "no settings file, using defaults");
                SettingsFile::default()
            }
        };
        let settings = Self::default().merged(file);
        settings
            .validate()
            .map_err(|e| AppError::Validation(format!("invalid settings: {e}")))?;
        Ok(settings)
    }

    fn merged(mut self, file: SettingsFile) -> Self {
        if let Some(driver) = file.driver {
            self.driver = driver;
        }
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(username) = file.username {
            self.username = username;
        }
        if let Some(password) = file.password {
            self.password = password;
        }
        if let Some(database) = file.database {
            self.database = database;
        }
        if file.socket.is_some() {
            self.socket = file.socket;
        }
        if let Some(auto_detect) = file.auto_detect {
            self.auto_detect = auto_detect;
        }
        if let Some(use_credential_file) = file.use_credential_file {
            self.use_credential_file = use_credential_file;
        }
        self
    }

    /// Whether the static fields are complete enough for a direct
    /// connection attempt.
    pub fn has_static_credentials(&self) -> bool {
        !self.host.is_empty() && !self.username.is_empty()
    }
}
