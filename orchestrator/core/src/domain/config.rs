// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Fieldwork Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) covering:
// - Storage backend (in-memory or PostgreSQL)
// - Event bus sizing and audit persistence
// - Sensing defaults handed to agents that omit parameters
// - Bundle enrichment limits

use crate::domain::affinity::{DEFAULT_SENSE_DECAY, DEFAULT_SENSE_LIMIT, DEFAULT_SENSE_THRESHOLD};
use crate::domain::bundle::{MAX_BUNDLES_PER_NODE, MIN_BUNDLE_SCORE};
use crate::domain::repository::{PostgresConfig, StorageBackend};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const API_VERSION: &str = "fieldwork/v1";
pub const KIND: &str = "FieldworkConfig";
pub const CONFIG_FILE_NAME: &str = "fieldwork-config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldworkConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    pub kind: String,

    pub metadata: ConfigMetadata,

    #[serde(default)]
    pub spec: FieldworkSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldworkSpec {
    /// Omit for the in-memory store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub sensing: SensingConfig,

    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast buffer for streaming receivers
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Write every event to the audit table
    #[serde(default = "default_true")]
    pub persist: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            persist: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensingConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default = "default_decay")]
    pub decay: f64,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for SensingConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SENSE_THRESHOLD,
            decay: DEFAULT_SENSE_DECAY,
            limit: DEFAULT_SENSE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_max_bundles")]
    pub max_bundles_per_node: usize,

    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_bundles_per_node: MAX_BUNDLES_PER_NODE,
            min_score: MIN_BUNDLE_SCORE,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> u32 {
    5
}

fn default_channel_capacity() -> usize {
    1000
}

fn default_threshold() -> f64 {
    DEFAULT_SENSE_THRESHOLD
}

fn default_decay() -> f64 {
    DEFAULT_SENSE_DECAY
}

fn default_limit() -> usize {
    DEFAULT_SENSE_LIMIT
}

fn default_max_bundles() -> usize {
    MAX_BUNDLES_PER_NODE
}

fn default_min_score() -> f64 {
    MIN_BUNDLE_SCORE
}

impl Default for FieldworkConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ConfigMetadata {
                name: "fieldwork-local".to_string(),
                version: None,
            },
            spec: FieldworkSpec::default(),
        }
    }
}

impl FieldworkConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Candidate config locations in discovery order.
    pub fn discovery_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(p) = std::env::var("FIELDWORK_CONFIG_PATH") {
            paths.push(PathBuf::from(p));
        }
        paths.push(PathBuf::from(format!("./{}", CONFIG_FILE_NAME)));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".fieldwork").join("config.yaml"));
        }
        paths
    }

    pub fn discover_config() -> Option<PathBuf> {
        Self::discovery_paths().into_iter().find(|p| p.exists())
    }

    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // 1. Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        // 2. Discovery (env -> cwd -> home)
        let mut config = match Self::discover_config() {
            Some(path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", path);
                Self::from_yaml_file(path)?
            }
            None => {
                tracing::warn!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment overrides for container deployments.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("FIELDWORK_DATABASE_URL") {
            if !url.trim().is_empty() {
                tracing::info!("Environment override: FIELDWORK_DATABASE_URL");
                match self.spec.database.as_mut() {
                    Some(db) => db.url = url,
                    None => {
                        self.spec.database = Some(DatabaseConfig {
                            url,
                            max_connections: default_max_connections(),
                        })
                    }
                }
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }
        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }
        if let Some(db) = &self.spec.database {
            if db.url.trim().is_empty() {
                anyhow::bail!("spec.database.url must not be empty");
            }
            if db.max_connections == 0 {
                anyhow::bail!("spec.database.max_connections must be at least 1");
            }
        }
        if self.spec.events.channel_capacity == 0 {
            anyhow::bail!("spec.events.channel_capacity must be at least 1");
        }
        let sensing = &self.spec.sensing;
        if !(0.0..=1.0).contains(&sensing.threshold) {
            anyhow::bail!("spec.sensing.threshold must be within [0, 1]");
        }
        if sensing.decay < 0.0 {
            anyhow::bail!("spec.sensing.decay must not be negative");
        }
        if sensing.limit == 0 {
            anyhow::bail!("spec.sensing.limit must be at least 1");
        }
        let enrichment = &self.spec.enrichment;
        if !(1..=MAX_BUNDLES_PER_NODE).contains(&enrichment.max_bundles_per_node) {
            anyhow::bail!(
                "spec.enrichment.max_bundles_per_node must be within [1, {}]",
                MAX_BUNDLES_PER_NODE
            );
        }
        if enrichment.min_score.is_nan() || enrichment.min_score < MIN_BUNDLE_SCORE {
            anyhow::bail!("spec.enrichment.min_score must be at least {}", MIN_BUNDLE_SCORE);
        }
        Ok(())
    }

    pub fn storage_backend(&self) -> StorageBackend {
        match &self.spec.database {
            Some(db) => StorageBackend::PostgreSQL(PostgresConfig {
                connection_string: db.url.clone(),
                max_connections: db.max_connections,
            }),
            None => StorageBackend::InMemory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FieldworkConfig::default();
        assert!(config.validate().is_ok());
        assert!(matches!(config.storage_backend(), StorageBackend::InMemory));
    }

    #[test]
    fn test_yaml_with_database() {
        let yaml = r#"
apiVersion: fieldwork/v1
kind: FieldworkConfig
metadata:
  name: prod
spec:
  database:
    url: postgres://fieldwork@localhost/fieldwork
  sensing:
    threshold: 0.6
"#;
        let config = FieldworkConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.spec.sensing.threshold, 0.6);
        assert_eq!(config.spec.sensing.limit, DEFAULT_SENSE_LIMIT);
        match config.storage_backend() {
            StorageBackend::PostgreSQL(pg) => assert_eq!(pg.max_connections, 5),
            other => panic!("expected postgres backend, got {:?}", other),
        }
    }

    #[test]
    fn test_validation() {
        let mut config = FieldworkConfig::default();
        config.api_version = "v0".into();
        assert!(config.validate().is_err());

        let mut config = FieldworkConfig::default();
        config.spec.sensing.threshold = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enrichment_bounds() {
        let mut config = FieldworkConfig::default();
        config.spec.enrichment.max_bundles_per_node = MAX_BUNDLES_PER_NODE + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_bundles_per_node"));

        let mut config = FieldworkConfig::default();
        config.spec.enrichment.max_bundles_per_node = 0;
        assert!(config.validate().is_err());

        let mut config = FieldworkConfig::default();
        config.spec.enrichment.min_score = 0.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_score"));

        let mut config = FieldworkConfig::default();
        config.spec.enrichment.min_score = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = FieldworkConfig::default();
        config.spec.enrichment.min_score = 2.5;
        config.spec.enrichment.max_bundles_per_node = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = FieldworkConfig::default();
        config.spec.enrichment.max_bundles_per_node = 2;
        config.to_yaml_file(&path).unwrap();

        let loaded = FieldworkConfig::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.spec.enrichment.max_bundles_per_node, 2);
    }
}
