//! Connection resolution.
//!
//! An ordered chain of typed providers replaces the original ambient
//! discovery: hosts hand their handle (or their decryption routines)
//! to the resolver explicitly instead of having them found by a
//! scanner. Each step yields a structured outcome; failures are
//! logged and the chain falls through, never aborting. The final
//! outcome is either a usable handle or a single human-readable
//! error naming the manual-configuration fallback path.
//!
//! Handles are resolved per request and never retained between
//! invocations.

pub mod credentials;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::ConnectionSettings;

use crate::driver::{self, ResolvedHandle};
use credentials::{parse_credentials, CredentialValues, Decrypt, DecryptorChain};

/// Host-supplied source of a prebuilt handle. Takes the place of the
/// original's global-state scan: the host application that already
/// owns a connection registers a provider here.
#[async_trait]
pub trait HandleProvider: Send + Sync {
    async fn provide(&self) -> anyhow::Result<Option<ResolvedHandle>>;
}

/// A successful resolution and the step that produced it.
pub struct Resolution {
    pub handle: ResolvedHandle,
    pub step: &'static str,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("step", &self.step)
            .field("handle", &self.handle.server_info())
            .finish()
    }
}

enum StepOutcome {
    Resolved(ResolvedHandle),
    Skipped(String),
    Failed(String),
}

impl std::fmt::Debug for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepOutcome::Resolved(handle) => f
                .debug_tuple("Resolved")
                .field(&handle.server_info())
                .finish(),
            StepOutcome::Skipped(reason) => f.debug_tuple("Skipped").field(reason).finish(),
            StepOutcome::Failed(reason) => f.debug_tuple("Failed").field(reason).finish(),
        }
    }
}

/// Ordered connection resolver.
pub struct Resolver {
    settings: ConnectionSettings,
    settings_path: String,
    credential_path: String,
    connect_timeout: Duration,
    injected: Option<Arc<dyn HandleProvider>>,
    decryptors: DecryptorChain,
}

impl Resolver {
    pub fn new(settings: ConnectionSettings, config: &AppConfig) -> Self {
        Self {
            settings,
            settings_path: config.settings_path.clone(),
            credential_path: config.credential_path.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            injected: None,
            decryptors: DecryptorChain::default(),
        }
    }

    /// Registers a host-supplied handle provider (highest priority).
    pub fn with_injected_provider(mut self, provider: Arc<dyn HandleProvider>) -> Self {
        self.injected = Some(provider);
        self
    }

    /// Registers the primary decryption entry point.
    pub fn with_primary_decryptor(mut self, decryptor: Arc<dyn Decrypt>) -> Self {
        self.decryptors.primary = Some(decryptor);
        self
    }

    /// Registers the secondary decryption entry point.
    pub fn with_secondary_decryptor(mut self, decryptor: Arc<dyn Decrypt>) -> Self {
        self.decryptors.secondary = Some(decryptor);
        self
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Runs the provider chain in priority order, stopping at the
    /// first success.
    pub async fn resolve(&self) -> AppResult<Resolution> {
        if let Some(resolution) = Self::check("injected_handle", self.try_injected().await) {
            return Ok(resolution);
        }
        if let Some(resolution) = Self::check("static_config", self.try_static_config().await) {
            return Ok(resolution);
        }
        if let Some(resolution) = Self::check("credential_file", self.try_credential_file().await)
        {
            return Ok(resolution);
        }
        if let Some(resolution) = Self::check("manual_config", self.try_manual_config().await) {
            return Ok(resolution);
        }

        tracing::warn!(
            settings_path = %self.settings_path,
            "all resolution providers exhausted"
        );
        Err(AppError::ConnectionResolution(format!(
            "could not automatically detect a database connection; \
             edit {} to configure the connection manually",
            self.settings_path
        )))
    }

    fn check(step: &'static str, outcome: StepOutcome) -> Option<Resolution> {
        match outcome {
            StepOutcome::Resolved(handle) => {
                tracing::info!(step, "database handle resolved");
                Some(Resolution { handle, step })
            }
            StepOutcome::Skipped(reason) => {
                tracing::debug!(step, reason = %reason, "resolution step skipped");
                None
            }
            StepOutcome::Failed(reason) => {
                tracing::debug!(step, reason = %reason, "resolution step failed");
                None
            }
        }
    }

    async fn try_injected(&self) -> StepOutcome {
        let Some(provider) = &self.injected else {
            return StepOutcome::Skipped("no injected handle provider registered".to_string());
        };
        match provider.provide().await {
            Ok(Some(handle)) => StepOutcome::Resolved(handle),
            Ok(None) => StepOutcome::Skipped("injected provider had no handle".to_string()),
            Err(e) => StepOutcome::Failed(format!("injected provider failed: {e}")),
        }
    }

    async fn try_static_config(&self) -> StepOutcome {
        if !self.settings.has_static_credentials() {
            return StepOutcome::Skipped("static settings lack host or username".to_string());
        }
        match driver::connect(&self.settings, self.connect_timeout).await {
            Ok(handle) => StepOutcome::Resolved(handle),
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }

    async fn try_credential_file(&self) -> StepOutcome {
        let values = match self.load_credential_values() {
            Ok(values) => values,
            Err(outcome) => return outcome,
        };

        let mut merged = self.settings.clone();
        values.apply(&mut merged);
        match driver::connect(&merged, self.connect_timeout).await {
            Ok(handle) => StepOutcome::Resolved(handle),
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }

    /// Reads, decrypts, and parses the credential file without
    /// attempting a connection.
    fn load_credential_values(&self) -> Result<CredentialValues, StepOutcome> {
        if !self.settings.use_credential_file {
            return Err(StepOutcome::Skipped(
                "credential file disabled in settings".to_string(),
            ));
        }
        let blob = match std::fs::read_to_string(&self.credential_path) {
            Ok(blob) if !blob.is_empty() => blob,
            Ok(_) => return Err(StepOutcome::Failed("credential file is empty".to_string())),
            Err(_) => {
                return Err(StepOutcome::Skipped(format!(
                    "no credential file at {}",
                    self.credential_path
                )))
            }
        };

        let plaintext = match self.decryptors.decrypt(&blob) {
            Ok(text) => text,
            Err(reason) => return Err(StepOutcome::Failed(reason)),
        };

        parse_credentials(&plaintext).ok_or_else(|| {
            StepOutcome::Failed("decrypted credential file had no recognizable fields".to_string())
        })
    }

    async fn try_manual_config(&self) -> StepOutcome {
        if self.settings.auto_detect {
            return StepOutcome::Skipped(
                "auto-detect enabled; manual connection is the disabled-detection path"
                    .to_string(),
            );
        }
        match driver::connect_manual(&self.settings, self.connect_timeout).await {
            Ok(handle) => StepOutcome::Resolved(handle),
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::models::{ColumnDescriptor, DriverKind};

    struct NullDatabase;

    #[async_trait]
    impl crate::driver::Database for NullDatabase {
        fn kind(&self) -> DriverKind {
            DriverKind::Buffered
        }
        fn server_info(&self) -> String {
            "injected".to_string()
        }
        fn escape(&self, raw: &str) -> String {
            raw.to_string()
        }
        async fn query(&self, _sql: &str) -> AppResult<Vec<crate::driver::JsonRow>> {
            Ok(vec![])
        }
        async fn query_params(
            &self,
            _sql: &str,
            _params: Vec<Option<String>>,
        ) -> AppResult<Vec<crate::driver::JsonRow>> {
            Ok(vec![])
        }
        async fn execute(&self, _sql: &str, _params: Vec<Option<String>>) -> AppResult<u64> {
            Ok(0)
        }
        async fn exec_raw(&self, _sql: &str) -> AppResult<()> {
            Ok(())
        }
        async fn list_tables(&self) -> AppResult<Vec<String>> {
            Ok(vec![])
        }
        async fn describe_columns(&self, _table: &str) -> AppResult<Vec<ColumnDescriptor>> {
            Ok(vec![])
        }
    }

    struct InjectedProvider;

    #[async_trait]
    impl HandleProvider for InjectedProvider {
        async fn provide(&self) -> anyhow::Result<Option<ResolvedHandle>> {
            Ok(Some(Arc::new(NullDatabase)))
        }
    }

    struct EmptyProvider;

    #[async_trait]
    impl HandleProvider for EmptyProvider {
        async fn provide(&self) -> anyhow::Result<Option<ResolvedHandle>> {
            Ok(None)
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::load_with_service("viewer-service");
        config.settings_path = "dbviewer_settings.json".to_string();
        config.credential_path = "/nonexistent/credential-file".to_string();
        config.connect_timeout_secs = 1;
        config
    }

    fn undetectable_settings() -> ConnectionSettings {
        // no username: static step is skipped; credential file absent;
        // auto_detect on: manual step is skipped
        ConnectionSettings::default()
    }

    #[tokio::test]
    async fn outcomes_and_resolutions_format_for_diagnostics() {
        let resolver = Resolver::new(undetectable_settings(), &test_config())
            .with_injected_provider(Arc::new(InjectedProvider));
        let resolution = resolver.resolve().await.unwrap();
        let rendered = format!("{resolution:?}");
        assert!(rendered.contains("injected_handle"));
        assert!(rendered.contains("injected"));

        let skipped = StepOutcome::Skipped("no provider".to_string());
        assert!(format!("{skipped:?}").contains("no provider"));
    }

    #[tokio::test]
    async fn injected_handle_wins() {
        let resolver = Resolver::new(undetectable_settings(), &test_config())
            .with_injected_provider(Arc::new(InjectedProvider));
        let resolution = resolver.resolve().await.unwrap();
        assert_eq!(resolution.step, "injected_handle");
        assert_eq!(resolution.handle.server_info(), "injected");
    }

    #[tokio::test]
    async fn exhaustion_names_the_manual_fallback_path() {
        let resolver = Resolver::new(undetectable_settings(), &test_config());
        let err = resolver.resolve().await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("dbviewer_settings.json"));
        assert!(message.contains("manually"));
    }

    #[tokio::test]
    async fn empty_injected_provider_falls_through() {
        let resolver = Resolver::new(undetectable_settings(), &test_config())
            .with_injected_provider(Arc::new(EmptyProvider));
        assert!(resolver.resolve().await.is_err());
    }

    #[test]
    fn credential_step_skips_when_disabled() {
        let mut settings = undetectable_settings();
        settings.use_credential_file = false;
        let resolver = Resolver::new(settings, &test_config());
        match resolver.load_credential_values() {
            Err(StepOutcome::Skipped(reason)) => assert!(reason.contains("disabled")),
            _ => panic!("expected skip"),
        }
    }

    #[test]
    fn credential_step_reads_and_parses_a_real_file() {
        struct Plain;
        impl Decrypt for Plain {
            fn decrypt(&self, blob: &str) -> anyhow::Result<String> {
                Ok(blob.to_string())
            }
        }

        let path = std::env::temp_dir().join(format!("dbviewer-cred-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, "admin:pw:panel:127.0.0.1:3999").unwrap();

        let mut config = test_config();
        config.credential_path = path.to_string_lossy().to_string();
        let resolver = Resolver::new(undetectable_settings(), &config)
            .with_primary_decryptor(Arc::new(Plain));

        let values = resolver.load_credential_values().unwrap();
        assert_eq!(values.username, "admin");
        assert_eq!(values.host, "127.0.0.1");
        assert_eq!(values.port, 3999);

        std::fs::remove_file(&path).ok();
    }
}
