//! Serializable run configuration.
//!
//! One TOML file describes a whole run:
//!
//! ```toml
//! seed = 42
//!
//! [engine]
//! signal_check_interval = 5
//!
//! [symbol]
//! symbol = "BTCUSD"
//! point = 0.01
//!
//! [broker]
//! initial_balance = 10000.0
//!
//! [position.trailing]
//! mode = "FIXED_PERCENT"
//! distance_pct = 0.5
//!
//! [risk]
//! base_risk_pct = 0.5
//! ```
//!
//! Every table is optional; missing fields take the component defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tradesim_core::broker::BrokerConfig;
use tradesim_core::domain::{SymbolSpec, SymbolSpecError};
use tradesim_core::engine::{EngineConfig, EngineConfigError};
use tradesim_core::position_management::{PositionManagerConfig, PositionManagerConfigError};
use tradesim_core::risk::RiskConfig;

/// Unique identifier for a run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("engine: {0}")]
    Engine(#[from] EngineConfigError),

    #[error("symbol: {0}")]
    Symbol(#[from] SymbolSpecError),

    #[error("position management: {0}")]
    Position(#[from] PositionManagerConfigError),

    #[error("initial balance must be positive, got {0}")]
    InitialBalance(f64),

    #[error("slippage must be non-negative, got {0} points")]
    Slippage(f64),

    #[error("commission must be non-negative, got {0} per lot")]
    Commission(f64),

    #[error("base risk must be positive, got {0}%")]
    BaseRisk(f64),
}

/// Everything needed to reproduce one backtest, bars and signals aside.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Master seed for slippage draws.
    pub seed: u64,
    pub engine: EngineConfig,
    pub symbol: SymbolSpec,
    pub broker: BrokerConfig,
    pub position: PositionManagerConfig,
    pub risk: RiskConfig,
}

impl RunConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.symbol.validate()?;
        self.position.validate()?;

        let broker = &self.broker;
        if !(broker.initial_balance.is_finite() && broker.initial_balance > 0.0) {
            return Err(ConfigError::InitialBalance(broker.initial_balance));
        }
        if !(broker.slippage_pips.is_finite() && broker.slippage_pips >= 0.0) {
            return Err(ConfigError::Slippage(broker.slippage_pips));
        }
        if !(broker.commission_per_lot.is_finite() && broker.commission_per_lot >= 0.0) {
            return Err(ConfigError::Commission(broker.commission_per_lot));
        }
        if !(self.risk.base_risk_pct.is_finite() && self.risk.base_risk_pct > 0.0) {
            return Err(ConfigError::BaseRisk(self.risk.base_risk_pct));
        }
        Ok(())
    }

    /// Deterministic hash of the full configuration.
    ///
    /// Two runs with identical configs share a RunId and, given the same bars
    /// and signals, produce identical results.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }
}
