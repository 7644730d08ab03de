//! Workshop configuration loaded from TOML

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::models::{DEFAULT_MARGIN_PERCENT, FixedCostSchedule};

pub const CONFIG_FILE_NAME: &str = "candle-costing.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub costing: CostingConfig,
    pub alerts: AlertThresholds,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("candle_costing.db"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CostingConfig {
    pub margin_percent: f64,
    /// Shop-wide schedule copied into new recipes
    pub fixed_costs: FixedCostSchedule,
}

impl Default for CostingConfig {
    fn default() -> Self {
        Self {
            margin_percent: DEFAULT_MARGIN_PERCENT,
            fixed_costs: FixedCostSchedule::default(),
        }
    }
}

/// Stock levels below `low` are alerted, below `medium` shown as medium
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertThresholds {
    pub material_low_grams: f64,
    pub material_medium_grams: f64,
    pub jar_low_units: i64,
    pub jar_medium_units: i64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            material_low_grams: 1000.0,
            material_medium_grams: 5000.0,
            jar_low_units: 10,
            jar_medium_units: 50,
        }
    }
}

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[database]
path = "candle_costing.db"

[costing]
margin_percent = 20.0

[alerts]
material_low_grams = 1000.0
material_medium_grams = 5000.0
jar_low_units = 10
jar_medium_units = 50
"#;

pub fn parse(contents: &str) -> Result<Config> {
    let config: Config = toml::from_str(contents)?;
    Ok(config)
}

/// Load configuration.
///
/// Search order:
/// 1. The explicit path, which must exist
/// 2. `candle-costing.toml` in the working directory
/// 3. The embedded default
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        tracing::info!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        return parse(&contents).with_context(|| format!("Invalid config {}", path.display()));
    }

    let local = Path::new(CONFIG_FILE_NAME);
    if local.exists() {
        tracing::info!("Loading config from: {}", local.display());
        let contents = std::fs::read_to_string(local)?;
        return parse(&contents).with_context(|| format!("Invalid config {}", local.display()));
    }

    tracing::debug!("Using default embedded configuration");
    parse(DEFAULT_CONFIG)
}
