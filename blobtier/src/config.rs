//! Container configuration
//!
//! The tier list, materialization limit and spool location are read from a
//! JSON document:
//!
//! ```json
//! {
//!   "containers": [
//!     { "kind": "memory", "max_size": 1048576 },
//!     { "kind": "file" }
//!   ],
//!   "max_array_length": 2147483647,
//!   "hysteresis": 0.8,
//!   "spool_dir": "/var/tmp",
//!   "on_construction_failure": "degrade"
//! }
//! ```
//!
//! Every key is optional. A tier without `kind` is in-memory, a tier without
//! `max_size` is unbounded, and an empty `containers` list means a single
//! unbounded in-memory tier.

use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::BlobError;
use crate::io::BackendKind;
use crate::registry::BackendRegistry;
use crate::selecting::ContainerFactory;
use crate::tiers::{Tier, TierTable, DEFAULT_HYSTERESIS};

/// Environment variable holding the path of the configuration file
pub const CONFIG_ENV: &str = "BLOBTIER_CONFIG";

/// What to do when the backend for the resolved tier cannot be created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstructionPolicy {
    /// Log the failure and keep using the current backend
    #[default]
    Degrade,
    /// Surface `BlobError::Construction` to the caller
    Fail,
}

fn unbounded() -> u64 {
    u64::MAX
}

fn default_kind() -> BackendKind {
    BackendKind::Memory
}

fn default_hysteresis() -> f64 {
    DEFAULT_HYSTERESIS
}

/// One configured tier
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TierConfig {
    #[serde(default = "default_kind")]
    pub kind: BackendKind,
    #[serde(default = "unbounded")]
    pub max_size: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlobConfig {
    #[serde(default)]
    pub containers: Vec<TierConfig>,
    #[serde(default = "unbounded")]
    pub max_array_length: u64,
    #[serde(default = "default_hysteresis")]
    pub hysteresis: f64,
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
    #[serde(default)]
    pub on_construction_failure: ConstructionPolicy,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            containers: Vec::new(),
            max_array_length: unbounded(),
            hysteresis: DEFAULT_HYSTERESIS,
            spool_dir: None,
            on_construction_failure: ConstructionPolicy::default(),
        }
    }
}

impl BlobConfig {
    /// Parse configuration JSON from a reader.
    ///
    /// # Errors
    ///
    /// Returns `BlobError::Config` if the JSON is malformed or cannot be read.
    pub fn from_reader(reader: impl Read) -> Result<Self, BlobError> {
        serde_json::from_reader(reader)
            .map_err(|e| BlobError::Config(format!("Failed to parse config JSON: {e}")))
    }

    /// # Errors
    ///
    /// Returns `BlobError::Config` if the file cannot be opened or parsed.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, BlobError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            BlobError::Config(format!("Failed to open config {}: {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Load from `path`, falling back to the default configuration if no
    /// path is given or the file cannot be read or parsed.
    #[must_use]
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("No config file given, using default config");
            return Self::default();
        };
        match Self::from_path(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using default");
                Self::default()
            }
        }
    }

    /// Load from the file named by `BLOBTIER_CONFIG`, as `load_or_default`
    #[must_use]
    pub fn from_env() -> Self {
        Self::load_or_default(env_config_path().as_deref())
    }

    /// Build the tier table
    ///
    /// # Errors
    ///
    /// Returns `BlobError::Config` if the hysteresis factor is out of range.
    pub fn tier_table(&self) -> Result<TierTable, BlobError> {
        let mut tiers: Vec<Tier> = self
            .containers
            .iter()
            .map(|c| Tier::new(c.kind, c.max_size))
            .collect();
        if tiers.is_empty() {
            tiers.push(Tier::unbounded(BackendKind::Memory));
        }
        TierTable::with_hysteresis(tiers, self.max_array_length, self.hysteresis)
    }

    #[must_use]
    pub fn registry(&self) -> BackendRegistry {
        let spool_dir = self.spool_dir.clone().unwrap_or_else(std::env::temp_dir);
        BackendRegistry::with_defaults(spool_dir)
    }

    /// # Errors
    ///
    /// Returns `BlobError::Config` if the tier table is invalid.
    pub fn factory(&self) -> Result<ContainerFactory, BlobError> {
        Ok(ContainerFactory::new(self.tier_table()?, self.registry())
            .with_policy(self.on_construction_failure))
    }
}

fn env_config_path() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV).map(PathBuf::from)
}

/// Factory built from the config file at `path`, or the default one if the
/// configuration is missing or invalid
#[must_use]
pub fn factory_from_path(path: Option<&Path>) -> ContainerFactory {
    let factory = match BlobConfig::load_or_default(path).factory() {
        Ok(factory) => factory,
        Err(e) => {
            warn!(error = %e, "Invalid config, using default");
            ContainerFactory::default()
        }
    };
    info!(tiers = %factory.tiers(), max_array_length = factory.tiers().max_array_length(), "Config loaded");
    factory
}

/// Factory built from `BLOBTIER_CONFIG`, as `factory_from_path`
#[must_use]
pub fn factory_from_env() -> ContainerFactory {
    factory_from_path(env_config_path().as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_document() {
        let json = r#"{
            "containers": [
                { "kind": "file" },
                { "kind": "memory", "max_size": 4096 }
            ],
            "max_array_length": 100000,
            "hysteresis": 0.5,
            "spool_dir": "/tmp/spool",
            "on_construction_failure": "fail"
        }"#;
        let config = BlobConfig::from_reader(json.as_bytes()).unwrap();
        assert_eq!(config.on_construction_failure, ConstructionPolicy::Fail);
        assert_eq!(config.spool_dir, Some(PathBuf::from("/tmp/spool")));

        let table = config.tier_table().unwrap();
        assert_eq!(table.max_array_length(), 100_000);
        assert_eq!(table.resolve(4096).unwrap(), BackendKind::Memory);
        assert_eq!(table.resolve(4097).unwrap(), BackendKind::File);
        assert_eq!(table.projected_size(1000), 500);
    }

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = BlobConfig::from_reader("{}".as_bytes()).unwrap();
        assert_eq!(config, BlobConfig::default());
        assert_eq!(config.tier_table().unwrap(), TierTable::default());
    }

    #[test]
    fn test_tier_defaults() {
        let config = BlobConfig::from_reader(r#"{"containers": [{}]}"#.as_bytes()).unwrap();
        assert_eq!(
            config.containers,
            vec![TierConfig {
                kind: BackendKind::Memory,
                max_size: u64::MAX
            }]
        );
    }

    #[test]
    fn test_unknown_kind_is_config_error() {
        let result = BlobConfig::from_reader(r#"{"containers": [{"kind": "tape"}]}"#.as_bytes());
        assert!(matches!(result, Err(BlobError::Config(_))));
    }

    #[test]
    fn test_invalid_hysteresis_fails_table() {
        let config = BlobConfig {
            hysteresis: 2.0,
            ..BlobConfig::default()
        };
        assert!(config.tier_table().is_err());
        assert!(config.factory().is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = BlobConfig::from_path("/nonexistent/blobtier.json");
        assert!(matches!(result, Err(BlobError::Config(_))));
    }

    fn factory_for(json: &str) -> ContainerFactory {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blobtier.json");
        std::fs::write(&path, json).unwrap();
        factory_from_path(Some(&path))
    }

    #[test]
    fn test_unusable_config_falls_back_to_default() {
        for json in [
            "{ not json",
            r#"{"containers": [{"kind": "tape", "max_size": 10}]}"#,
            r#"{"containers": [{"kind": "file"}], "hysteresis": 2.0}"#,
        ] {
            let factory = factory_for(json);
            assert_eq!(factory.tiers(), &TierTable::default(), "config: {json}");
            assert_eq!(factory.policy(), ConstructionPolicy::Degrade);
        }
    }

    #[test]
    fn test_missing_config_falls_back_to_default() {
        let missing = Path::new("/nonexistent/blobtier.json");
        assert_eq!(factory_from_path(Some(missing)).tiers(), &TierTable::default());
        assert_eq!(factory_from_path(None).tiers(), &TierTable::default());
        assert_eq!(BlobConfig::load_or_default(Some(missing)), BlobConfig::default());
    }

    #[test]
    fn test_valid_config_is_used() {
        let factory = factory_for(
            r#"{"containers": [{"kind": "memory", "max_size": 10}, {"kind": "file"}],
                "on_construction_failure": "fail"}"#,
        );
        assert_eq!(factory.tiers().resolve(10).unwrap(), BackendKind::Memory);
        assert_eq!(factory.tiers().resolve(11).unwrap(), BackendKind::File);
        assert_eq!(factory.policy(), ConstructionPolicy::Fail);
    }
}
