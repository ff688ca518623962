//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::odds::database::DatabaseTier;
use crate::odds::search::{AnthropicSearch, ExternalSearchTier, SearchProvider, SerperSearch};
use crate::odds::{OddsResolver, OddsSource};
use crate::storage::sqlite::SqliteOddsStore;
use crate::strategy::Thresholds;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub odds: OddsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub qualification: Thresholds,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OddsConfig {
    pub bookmakers: Vec<String>,
    pub batch_delay_ms: u64,
    /// SQLite URL for the fighter directory and odds history. The database
    /// tier is skipped when unset.
    pub database_url: Option<String>,
}

impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            bookmakers: crate::odds::search::DEFAULT_BOOKMAKERS
                .iter()
                .map(|b| b.to_string())
                .collect(),
            batch_delay_ms: 2000,
            database_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    Serper,
    Anthropic,
    #[default]
    None,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SearchConfig {
    #[serde(default)]
    pub provider: SearchProviderKind,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StreamConfig {
    pub endpoint: String,
    pub results_dir: String,
    pub connect_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/agents".to_string(),
            results_dir: crate::storage::DEFAULT_RESULTS_DIR.to_string(),
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve a secret held in the named environment variable.
    pub fn resolve_secret(env_name: &str) -> Result<SecretString> {
        Self::resolve_env(env_name).map(SecretString::new)
    }

    /// Build the configured search provider, if any.
    pub fn search_provider(&self) -> Result<Option<Arc<dyn SearchProvider>>> {
        let key_env = || {
            self.search
                .api_key_env
                .as_deref()
                .context("search.api_key_env must be set for this provider")
        };

        let provider: Arc<dyn SearchProvider> = match self.search.provider {
            SearchProviderKind::None => return Ok(None),
            SearchProviderKind::Serper => {
                Arc::new(SerperSearch::new(Self::resolve_secret(key_env()?)?)?)
            }
            SearchProviderKind::Anthropic => Arc::new(AnthropicSearch::new(
                Self::resolve_secret(key_env()?)?,
                self.search.model.clone(),
            )?),
        };
        Ok(Some(provider))
    }

    /// Assemble the odds cascade: database (if configured), external search
    /// (if configured), then placeholder.
    pub async fn build_resolver(&self) -> Result<OddsResolver> {
        let mut sources: Vec<Box<dyn OddsSource>> = Vec::new();

        if let Some(url) = &self.odds.database_url {
            let store = Arc::new(SqliteOddsStore::connect(url).await?);
            sources.push(Box::new(DatabaseTier::new(store.clone(), store)));
        }

        match self.search_provider() {
            Ok(Some(provider)) => {
                sources.push(Box::new(
                    ExternalSearchTier::new(provider).with_bookmakers(self.odds.bookmakers.clone()),
                ));
            }
            Ok(None) => info!("No search provider configured, external tier disabled"),
            Err(e) => warn!(error = %e, "Search provider unavailable, external tier disabled"),
        }

        let resolver = OddsResolver::new(sources)
            .with_batch_delay(Duration::from_millis(self.odds.batch_delay_ms));
        info!(tiers = ?resolver.tier_names(), "Odds resolver ready");
        Ok(resolver)
    }
}
