use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Default saved Dune query holding the curated historical exploit dataset.
pub const DEFAULT_DUNE_QUERY_ID: u64 = 5_064_259;

// ── Env reader ────────────────────────────────────────────────

/// Profiled key lookup: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
/// Empty values count as unset.
struct EnvReader<'a> {
    profile: String,
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl EnvReader<'_> {
    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            let prefixed = format!("{}_{}", self.profile, key);
            if let Some(v) = (self.lookup)(&prefixed).filter(|s| !s.is_empty()) {
                return Some(v);
            }
        }
        (self.lookup)(key).filter(|s| !s.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.opt(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(key, &raw, e.to_string())),
            None => Ok(default),
        }
    }

    /// Like [`parse`](Self::parse) but rejects zero.
    fn positive(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        let value = self.parse(key, default)?;
        if value == 0 {
            return Err(ConfigError::invalid(key, "0", "must be a positive integer"));
        }
        Ok(value)
    }

    fn flag(&self, key: &str) -> bool {
        self.opt(key)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1"))
            .unwrap_or(false)
    }
}

// ── Enumerated settings ───────────────────────────────────────

/// Deployment environment (`HACKWATCH_ENV`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "unknown environment '{other}': expected development, test or production"
            )),
        }
    }
}

/// Which live source the polling scheduler reads (`EXPLOIT_DATA_PROVIDER`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveProviderKind {
    Flipside,
    Helius,
}

impl LiveProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flipside => "flipside",
            Self::Helius => "helius",
        }
    }
}

impl fmt::Display for LiveProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LiveProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flipside" => Ok(Self::Flipside),
            "helius" => Ok(Self::Helius),
            other => Err(format!(
                "unknown provider '{other}': expected flipside or helius"
            )),
        }
    }
}

/// Log output format (`LOG_FORMAT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}': expected pretty or json")),
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub environment: Environment,
    /// `ENABLE_SERVICES`: runs the seeder and scheduler outside production.
    pub enable_services: bool,
    pub log_format: LogFormat,
    pub server: ServerConfig,
    pub postgres: PostgresConfig,
    pub dune: DuneConfig,
    pub flipside: FlipsideConfig,
    pub helius: HeliusConfig,
    pub ingest: IngestConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `HACKWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = lookup("HACKWATCH_PROFILE")
            .unwrap_or_default()
            .to_uppercase();
        let env = EnvReader {
            profile,
            lookup: &lookup,
        };

        let environment = env.parse("HACKWATCH_ENV", Environment::Development)?;
        let default_format = match environment {
            Environment::Production => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            profile: env.profile.clone(),
            environment,
            enable_services: env.flag("ENABLE_SERVICES"),
            log_format: env.parse("LOG_FORMAT", default_format)?,
            server: ServerConfig::from_env(&env),
            postgres: PostgresConfig::from_env(&env)?,
            dune: DuneConfig::from_env(&env)?,
            flipside: FlipsideConfig::from_env(&env)?,
            helius: HeliusConfig::from_env(&env),
            ingest: IngestConfig::from_env(&env)?,
        })
    }

    /// Background ingestion runs in production, or anywhere `ENABLE_SERVICES` is set.
    pub fn services_enabled(&self) -> bool {
        self.environment == Environment::Production || self.enable_services
    }

    /// Check that every credential the ingestion services need is present.
    pub fn validate_services(&self) -> Result<(), ConfigError> {
        if self.dune.api_key.is_none() {
            return Err(ConfigError::Missing("DUNE_API_KEY".into()));
        }
        match self.ingest.live_provider {
            LiveProviderKind::Flipside => {
                if self.flipside.api_key.is_none() {
                    return Err(ConfigError::Missing("FLIPSIDE_API_KEY".into()));
                }
                if self.flipside.query.is_none() {
                    return Err(ConfigError::Missing("FLIPSIDE_QUERY".into()));
                }
            }
            LiveProviderKind::Helius => {
                if self.helius.api_key.is_none() {
                    return Err(ConfigError::Missing("HELIUS_API_KEY".into()));
                }
            }
        }
        Ok(())
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  environment: {:?}, services_enabled={}",
            self.environment,
            self.services_enabled()
        );
        tracing::info!("  server:      bind={}", self.server.bind_addr);
        tracing::info!(
            "  postgres:    host={}, db={}",
            self.postgres.host,
            self.postgres.database
        );
        tracing::info!(
            "  dune:        query_id={}, key_set={}",
            self.dune.query_id,
            self.dune.api_key.is_some()
        );
        tracing::info!(
            "  ingest:      provider={}, interval={}s, batch_size={}",
            self.ingest.live_provider,
            self.ingest.poll_interval_secs,
            self.ingest.batch_size
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address for the health/status probe.
    pub bind_addr: String,
}

impl ServerConfig {
    fn from_env(env: &EnvReader<'_>) -> Self {
        Self {
            bind_addr: env.or("BIND_ADDR", "0.0.0.0:3001"),
        }
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Full URL (`DATABASE_URL`); overrides the individual fields when set.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env(env: &EnvReader<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            url: env.opt("DATABASE_URL"),
            host: env.or("PG_HOST", "localhost"),
            port: env.parse("PG_PORT", 5432)?,
            database: env.or("PG_DATABASE", "hackwatch"),
            username: env.opt("PG_USERNAME"),
            password: env.opt("PG_PASSWORD"),
            ssl_mode: env.or("PG_SSL_MODE", "prefer"),
            max_connections: env.parse("PG_MAX_CONNECTIONS", 10)?,
        })
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

// ── Dune (bulk historical source) ─────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuneConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_url: String,
    pub query_id: u64,
    /// Upper bound on waiting for a query execution to finish.
    pub timeout_secs: u64,
}

impl DuneConfig {
    fn from_env(env: &EnvReader<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: env.opt("DUNE_API_KEY"),
            api_url: env.or("DUNE_API_URL", "https://api.dune.com"),
            query_id: env.parse("DUNE_QUERY_ID", DEFAULT_DUNE_QUERY_ID)?,
            timeout_secs: env.positive("DUNE_TIMEOUT_SECS", 600)?,
        })
    }
}

// ── Flipside (live source A) ──────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlipsideConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_url: String,
    /// SQL executed on every poll.
    pub query: Option<String>,
    pub page_size: u32,
    pub timeout_secs: u64,
}

impl FlipsideConfig {
    fn from_env(env: &EnvReader<'_>) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: env.opt("FLIPSIDE_API_KEY"),
            api_url: env.or("FLIPSIDE_API_URL", "https://api-v2.flipsidecrypto.xyz"),
            query: env.opt("FLIPSIDE_QUERY"),
            page_size: env.parse("FLIPSIDE_PAGE_SIZE", 1000)?,
            timeout_secs: env.positive("FLIPSIDE_TIMEOUT_SECS", 300)?,
        })
    }
}

// ── Helius (live source B) ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeliusConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_url: String,
    /// Source path appended to `api_url`.
    pub source: String,
}

impl HeliusConfig {
    fn from_env(env: &EnvReader<'_>) -> Self {
        Self {
            api_key: env.opt("HELIUS_API_KEY"),
            api_url: env.or("HELIUS_API_URL", "https://api.helius.xyz/v0"),
            source: env.or("HELIUS_SOURCE", "exploits"),
        }
    }
}

// ── Ingestion ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub live_provider: LiveProviderKind,
    pub poll_interval_secs: u64,
    /// Max records per `create_many` call.
    pub batch_size: usize,
    /// Per-request HTTP timeout for provider calls.
    pub provider_timeout_secs: u64,
}

impl IngestConfig {
    fn from_env(env: &EnvReader<'_>) -> Result<Self, ConfigError> {
        let batch_size = env.positive("INGEST_BATCH_SIZE", 1000)?;
        Ok(Self {
            live_provider: env.parse("EXPLOIT_DATA_PROVIDER", LiveProviderKind::Flipside)?,
            poll_interval_secs: env.positive("EXPLOIT_POLL_INTERVAL", 15)?,
            batch_size: usize::try_from(batch_size).unwrap_or(usize::MAX),
            provider_timeout_secs: env.positive("PROVIDER_TIMEOUT_SECS", 30)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_without_any_env() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.ingest.live_provider, LiveProviderKind::Flipside);
        assert_eq!(config.ingest.poll_interval_secs, 15);
        assert_eq!(config.ingest.batch_size, 1000);
        assert_eq!(config.dune.query_id, DEFAULT_DUNE_QUERY_ID);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(!config.services_enabled());
    }

    #[test]
    fn production_enables_services_and_json_logs() {
        let config = config_from(&[("HACKWATCH_ENV", "production")]).unwrap();
        assert!(config.services_enabled());
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn enable_services_flag_in_development() {
        let config = config_from(&[("ENABLE_SERVICES", "true")]).unwrap();
        assert!(config.services_enabled());
        let config = config_from(&[("ENABLE_SERVICES", "no")]).unwrap();
        assert!(!config.services_enabled());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = config_from(&[("EXPLOIT_POLL_INTERVAL", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "EXPLOIT_POLL_INTERVAL"));
    }

    #[test]
    fn non_numeric_poll_interval_is_rejected() {
        let err = config_from(&[("EXPLOIT_POLL_INTERVAL", "soon")]).unwrap_err();
        assert!(err.to_string().contains("EXPLOIT_POLL_INTERVAL"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = config_from(&[("EXPLOIT_DATA_PROVIDER", "etherscan")]).unwrap_err();
        assert!(err.to_string().contains("etherscan"));
    }

    #[test]
    fn provider_selector_is_case_insensitive() {
        let config = config_from(&[("EXPLOIT_DATA_PROVIDER", "Helius")]).unwrap();
        assert_eq!(config.ingest.live_provider, LiveProviderKind::Helius);
    }

    #[test]
    fn profile_prefix_wins_over_plain_key() {
        let config = config_from(&[
            ("HACKWATCH_PROFILE", "prod"),
            ("PROD_EXPLOIT_POLL_INTERVAL", "60"),
            ("EXPLOIT_POLL_INTERVAL", "5"),
        ])
        .unwrap();
        assert_eq!(config.profile_label(), "PROD");
        assert_eq!(config.ingest.poll_interval_secs, 60);
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = config_from(&[("DUNE_API_KEY", ""), ("EXPLOIT_POLL_INTERVAL", "")]).unwrap();
        assert!(config.dune.api_key.is_none());
        assert_eq!(config.ingest.poll_interval_secs, 15);
    }

    #[test]
    fn validate_services_requires_dune_key() {
        let config = config_from(&[("FLIPSIDE_API_KEY", "f"), ("FLIPSIDE_QUERY", "select 1")]).unwrap();
        assert_eq!(
            config.validate_services(),
            Err(ConfigError::Missing("DUNE_API_KEY".into()))
        );
    }

    #[test]
    fn validate_services_requires_active_provider_credential() {
        let config = config_from(&[("DUNE_API_KEY", "d"), ("EXPLOIT_DATA_PROVIDER", "helius")]).unwrap();
        assert_eq!(
            config.validate_services(),
            Err(ConfigError::Missing("HELIUS_API_KEY".into()))
        );

        // Inactive provider's credential is not required.
        let config = config_from(&[
            ("DUNE_API_KEY", "d"),
            ("EXPLOIT_DATA_PROVIDER", "helius"),
            ("HELIUS_API_KEY", "h"),
        ])
        .unwrap();
        assert!(config.validate_services().is_ok());
    }

    #[test]
    fn database_url_prefers_explicit_url() {
        let config = config_from(&[("DATABASE_URL", "postgres://u:p@db:5432/x"), ("PG_HOST", "other")]).unwrap();
        assert_eq!(config.postgres.database_url(), "postgres://u:p@db:5432/x");

        let config = config_from(&[("PG_HOST", "db"), ("PG_USERNAME", "app")]).unwrap();
        assert_eq!(
            config.postgres.database_url(),
            "postgres://app:@db:5432/hackwatch?sslmode=prefer"
        );
    }
}
