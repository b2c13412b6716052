//! Position manager configuration.
//!
//! Percentages are in percent of entry price (0.5 = 0.5 %). Distances in the
//! ATR variant are price units.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PositionManagerConfigError {
    #[error("partial close at {threshold_pct}% must close between 0 and 100%, got {close_pct}%")]
    ClosePct { threshold_pct: f64, close_pct: f64 },

    #[error("max_position_hold_hours must be positive, got {0}")]
    HoldHours(f64),
}

/// One partial-profit rung: close `close_pct` % of the open volume once
/// profit reaches `profit_threshold_pct` %.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialProfitLevel {
    pub profit_threshold_pct: f64,
    pub close_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialProfitConfig {
    pub enabled: bool,
    pub levels: Vec<PartialProfitLevel>,
}

impl Default for PartialProfitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            levels: vec![
                PartialProfitLevel {
                    profit_threshold_pct: 1.0,
                    close_pct: 30.0,
                },
                PartialProfitLevel {
                    profit_threshold_pct: 2.0,
                    close_pct: 30.0,
                },
                PartialProfitLevel {
                    profit_threshold_pct: 3.0,
                    close_pct: 40.0,
                },
            ],
        }
    }
}

impl PartialProfitConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            levels: Vec::new(),
        }
    }

    /// Levels sorted by ascending threshold, non-finite entries dropped.
    pub fn sorted_levels(&self) -> Vec<PartialProfitLevel> {
        let mut levels: Vec<_> = self
            .levels
            .iter()
            .copied()
            .filter(|l| l.profit_threshold_pct.is_finite() && l.close_pct.is_finite())
            .collect();
        levels.sort_by(|a, b| a.profit_threshold_pct.total_cmp(&b.profit_threshold_pct));
        levels
    }

    /// Every rung must close a share in `(0, 100]`.
    pub fn validate(&self) -> Result<(), PositionManagerConfigError> {
        if !self.enabled {
            return Ok(());
        }
        match self
            .levels
            .iter()
            .find(|l| !(l.close_pct > 0.0 && l.close_pct <= 100.0))
        {
            Some(l) => Err(PositionManagerConfigError::ClosePct {
                threshold_pct: l.profit_threshold_pct,
                close_pct: l.close_pct,
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakEvenConfig {
    pub enabled: bool,
    pub activation_pct: f64,
    /// SL lands this far beyond entry, in the position's favour.
    pub buffer_pct: f64,
}

impl Default for BreakEvenConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            activation_pct: 0.5,
            buffer_pct: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedPercentTrailingConfig {
    pub activation_pct: f64,
    pub distance_pct: f64,
    /// Minimum SL improvement, percent of entry.
    pub step_pct: f64,
}

impl Default for FixedPercentTrailingConfig {
    fn default() -> Self {
        Self {
            activation_pct: 1.0,
            distance_pct: 0.5,
            step_pct: 0.25,
        }
    }
}

/// ATR multipliers per trailing phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtrMultipliers {
    pub initial: f64,
    pub conservative: f64,
    pub aggressive: f64,
    pub exit: f64,
}

impl Default for AtrMultipliers {
    fn default() -> Self {
        Self {
            initial: 2.0,
            conservative: 1.5,
            aggressive: 1.0,
            exit: 0.5,
        }
    }
}

/// Once the risk multiple reaches `trigger_risk_multiple`, keep at least
/// `lock_pct` % of the best profit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MfeLock {
    pub trigger_risk_multiple: f64,
    pub lock_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicTrailingConfig {
    pub atr_multipliers: AtrMultipliers,
    pub mfe_locks: Vec<MfeLock>,
    /// Retrace from best profit, percent of best profit, that tightens the trail.
    pub reversal_threshold_pct: f64,
    /// Minimum risk multiple for the reversal override.
    pub reversal_min_risk_multiple: f64,
    pub consolidation_bars_threshold: u32,
    /// Minimum SL improvement, percent of entry.
    pub min_improvement_pct: f64,
    /// Used whenever no ATR reading is available.
    pub fallback: FixedPercentTrailingConfig,
}

impl Default for DynamicTrailingConfig {
    fn default() -> Self {
        Self {
            atr_multipliers: AtrMultipliers::default(),
            mfe_locks: vec![
                MfeLock {
                    trigger_risk_multiple: 1.5,
                    lock_pct: 30.0,
                },
                MfeLock {
                    trigger_risk_multiple: 2.5,
                    lock_pct: 40.0,
                },
                MfeLock {
                    trigger_risk_multiple: 4.0,
                    lock_pct: 50.0,
                },
            ],
            reversal_threshold_pct: 30.0,
            reversal_min_risk_multiple: 1.5,
            consolidation_bars_threshold: 10,
            min_improvement_pct: 0.1,
            fallback: FixedPercentTrailingConfig::default(),
        }
    }
}

/// Trailing-stop strategy selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrailingConfig {
    Disabled,
    FixedPercent(FixedPercentTrailingConfig),
    DynamicAtr(DynamicTrailingConfig),
}

impl Default for TrailingConfig {
    fn default() -> Self {
        TrailingConfig::FixedPercent(FixedPercentTrailingConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionManagerConfig {
    pub partial_profit: PartialProfitConfig,
    pub break_even: BreakEvenConfig,
    pub trailing: TrailingConfig,
    /// `None` disables the time exit.
    pub max_position_hold_hours: Option<f64>,
}

impl Default for PositionManagerConfig {
    fn default() -> Self {
        Self {
            partial_profit: PartialProfitConfig::default(),
            break_even: BreakEvenConfig::default(),
            trailing: TrailingConfig::default(),
            max_position_hold_hours: Some(24.0),
        }
    }
}

impl PositionManagerConfig {
    /// Everything off. Handy as a base in tests and sweeps.
    pub fn passive() -> Self {
        Self {
            partial_profit: PartialProfitConfig::disabled(),
            break_even: BreakEvenConfig {
                enabled: false,
                ..BreakEvenConfig::default()
            },
            trailing: TrailingConfig::Disabled,
            max_position_hold_hours: None,
        }
    }

    pub fn validate(&self) -> Result<(), PositionManagerConfigError> {
        self.partial_profit.validate()?;
        if let Some(hours) = self.max_position_hold_hours {
            if !(hours.is_finite() && hours > 0.0) {
                return Err(PositionManagerConfigError::HoldHours(hours));
            }
        }
        Ok(())
    }
}
