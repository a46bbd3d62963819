//! # Emission Configuration
//!
//! Configuration management for the emission pipeline.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     EINVOICE_DB_PATH=/var/lib/einvoice/einvoice.db                     │
//! │     EINVOICE_REQUEST_TIMEOUT_SECS=20                                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/einvoice/einvoice.toml (Linux)                           │
//! │     ~/Library/Application Support/co.einvoice.einvoice/... (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     No providers: every tenant is NotConfigured until one is added     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "einvoice.db"
//! max_connections = 5
//!
//! [emission]
//! request_timeout_secs = 15
//! max_retries = 0
//!
//! [providers.default]
//! kind = "delegated"
//! base_url = "https://api.alegra.com/api/v1/"
//! user_email = "billing@example.com"
//! api_key = "..."
//!
//! [providers.tenants.tenant-a]
//! kind = "direct"
//! base_url = "https://dian-gateway.example/api/"
//! software_id = "..."
//! software_pin = "..."
//! environment = "2"
//! test_set_id = "..."
//! nit = "900123456"
//! dv = "7"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{EmitError, EmitResult};
use einvoice_core::{IssuerInfo, ProviderKind};
use einvoice_db::DbConfig;

/// Alegra REST API v1.
pub const ALEGRA_BASE_URL: &str = "https://api.alegra.com/api/v1/";

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file holding resolutions, invoices and mappings.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("einvoice.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseSettings {
    pub fn to_db_config(&self) -> DbConfig {
        DbConfig::new(self.path.clone()).max_connections(self.max_connections)
    }
}

// =============================================================================
// Emission Settings
// =============================================================================

/// Pipeline behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionSettings {
    /// Upper bound for every provider request (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Extra attempts made by `emit_with_retry`. 0 disables retrying.
    #[serde(default)]
    pub max_retries: u32,

    /// Initial backoff between retries (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff between retries (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_request_timeout() -> u64 {
    15
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    30
}

impl Default for EmissionSettings {
    fn default() -> Self {
        EmissionSettings {
            request_timeout_secs: default_request_timeout(),
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

impl EmissionSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Provider Settings
// =============================================================================

/// Credentials and endpoint of one provider, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderSettings {
    /// Submit straight to the tax authority gateway.
    Direct(DirectSettings),
    /// Let Alegra number, stamp and submit.
    Delegated(DelegatedSettings),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectSettings {
    pub base_url: String,
    pub software_id: String,
    pub software_pin: String,
    /// `1` production, `2` habilitación (test).
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Habilitación test set the DIAN assigned. Required in environment `2`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_set_id: Option<String>,
    /// Issuer NIT without verification digit.
    pub nit: String,
    #[serde(default)]
    pub dv: String,
}

fn default_environment() -> String {
    "2".to_string()
}

impl DirectSettings {
    pub fn issuer(&self) -> IssuerInfo {
        IssuerInfo {
            nit: self.nit.clone(),
            dv: self.dv.clone(),
            environment: self.environment.clone(),
            test_set_id: self.test_set_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedSettings {
    #[serde(default = "default_alegra_url")]
    pub base_url: String,
    pub user_email: String,
    pub api_key: String,
}

fn default_alegra_url() -> String {
    ALEGRA_BASE_URL.to_string()
}

impl ProviderSettings {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderSettings::Direct(_) => ProviderKind::Direct,
            ProviderSettings::Delegated(_) => ProviderKind::Delegated,
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            ProviderSettings::Direct(d) => &d.base_url,
            ProviderSettings::Delegated(d) => &d.base_url,
        }
    }

    fn base_url_mut(&mut self) -> &mut String {
        match self {
            ProviderSettings::Direct(d) => &mut d.base_url,
            ProviderSettings::Delegated(d) => &mut d.base_url,
        }
    }

    /// Checks the URL and that no credential is blank.
    pub fn validate(&self) -> EmitResult<()> {
        let url = Url::parse(self.base_url())?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(EmitError::InvalidUrl(format!(
                "Provider URL must use http:// or https://, got: {}",
                self.base_url()
            )));
        }

        let blank = |field: &str, value: &str| {
            if value.trim().is_empty() {
                Err(EmitError::InvalidConfig(format!(
                    "{} provider requires {}",
                    self.kind(),
                    field
                )))
            } else {
                Ok(())
            }
        };

        match self {
            ProviderSettings::Direct(d) => {
                blank("software_id", &d.software_id)?;
                blank("software_pin", &d.software_pin)?;
                blank("nit", &d.nit)?;
                if d.environment != "1" && d.environment != "2" {
                    return Err(EmitError::InvalidConfig(format!(
                        "environment must be \"1\" (production) or \"2\" (test), got: {}",
                        d.environment
                    )));
                }
                if d.environment == "2" {
                    blank("test_set_id", d.test_set_id.as_deref().unwrap_or(""))?;
                }
            }
            ProviderSettings::Delegated(d) => {
                blank("user_email", &d.user_email)?;
                blank("api_key", &d.api_key)?;
            }
        }
        Ok(())
    }
}

/// Fallback provider plus per-tenant overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub default: Option<ProviderSettings>,

    #[serde(default)]
    pub tenants: BTreeMap<String, ProviderSettings>,
}

// =============================================================================
// Main Emission Configuration
// =============================================================================

/// Complete emission configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmissionConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub emission: EmissionSettings,

    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl EmissionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (einvoice.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EmitResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading emission config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(contents: &str) -> EmitResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EmitResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EmitError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EmitError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| EmitError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Emission config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EmitResult<()> {
        if self.database.max_connections == 0 {
            return Err(EmitError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.emission.request_timeout_secs == 0 {
            return Err(EmitError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.emission.max_retries > 0
            && self.emission.initial_backoff() > self.emission.max_backoff()
        {
            return Err(EmitError::InvalidConfig(
                "initial_backoff_ms must not exceed max_backoff_secs".into(),
            ));
        }

        if let Some(default) = &self.providers.default {
            default.validate()?;
        }
        for (tenant_id, settings) in &self.providers.tenants {
            settings.validate().map_err(|e| {
                EmitError::InvalidConfig(format!("tenant '{}': {}", tenant_id, e))
            })?;
        }

        Ok(())
    }

    /// Provider settings for `tenant_id`.
    ///
    /// Tenant-specific settings win over `providers.default`. With neither
    /// there is no provider to pick: `NotConfigured`.
    pub fn provider_for(&self, tenant_id: &str) -> EmitResult<&ProviderSettings> {
        self.providers
            .tenants
            .get(tenant_id)
            .or(self.providers.default.as_ref())
            .ok_or_else(|| EmitError::NotConfigured {
                tenant_id: tenant_id.to_string(),
            })
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies `EINVOICE_*` overrides read through `lookup`.
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("EINVOICE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("EINVOICE_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid EINVOICE_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(secs) = lookup("EINVOICE_REQUEST_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(n) => self.emission.request_timeout_secs = n,
                Err(_) => warn!(value = %secs, "Ignoring invalid EINVOICE_REQUEST_TIMEOUT_SECS"),
            }
        }

        if let Some(retries) = lookup("EINVOICE_MAX_RETRIES") {
            match retries.parse::<u32>() {
                Ok(n) => self.emission.max_retries = n,
                Err(_) => warn!(value = %retries, "Ignoring invalid EINVOICE_MAX_RETRIES"),
            }
        }

        // Credentials only patch an existing default provider.
        if let Some(default) = self.providers.default.as_mut() {
            if let Some(url) = lookup("EINVOICE_PROVIDER_URL") {
                debug!(url = %url, "Overriding default provider URL from environment");
                *default.base_url_mut() = url;
            }
            match default {
                ProviderSettings::Delegated(d) => {
                    if let Some(email) = lookup("EINVOICE_ALEGRA_EMAIL") {
                        d.user_email = email;
                    }
                    if let Some(key) = lookup("EINVOICE_ALEGRA_API_KEY") {
                        d.api_key = key;
                    }
                }
                ProviderSettings::Direct(d) => {
                    if let Some(id) = lookup("EINVOICE_DIAN_SOFTWARE_ID") {
                        d.software_id = id;
                    }
                    if let Some(pin) = lookup("EINVOICE_DIAN_SOFTWARE_PIN") {
                        d.software_pin = pin;
                    }
                    if let Some(test_set_id) = lookup("EINVOICE_DIAN_TEST_SET_ID") {
                        d.test_set_id = Some(test_set_id);
                    }
                }
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("co", "einvoice", "einvoice")
            .map(|dirs| dirs.config_dir().join("einvoice.toml"))
    }
}
