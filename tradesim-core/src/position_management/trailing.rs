//! Trailing-stop strategies.
//!
//! The manager asks its strategy for a proposal once per update, after partial
//! profits and break-even had their chance. A proposal is only returned when it
//! tightens the current stop by at least the strategy's minimum step.

use std::fmt;

use tracing::debug;

use super::action::{StopReason, TrailPhase};
use super::config::{DynamicTrailingConfig, FixedPercentTrailingConfig, MfeLock, TrailingConfig};
use super::managed::ManagedPosition;
use crate::domain::Side;

/// A proposed stop level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingProposal {
    pub new_sl: f64,
    pub reason: StopReason,
}

/// Computes trailing stop levels for a managed position.
pub trait TrailingStrategy: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn propose(&self, position: &ManagedPosition) -> Option<TrailingProposal>;

    fn clone_box(&self) -> Box<dyn TrailingStrategy>;
}

impl Clone for Box<dyn TrailingStrategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Build the strategy selected by configuration. `None` when trailing is disabled.
pub fn from_config(config: &TrailingConfig) -> Option<Box<dyn TrailingStrategy>> {
    match config {
        TrailingConfig::Disabled => None,
        TrailingConfig::FixedPercent(c) => Some(Box::new(FixedPercentTrailing::new(*c))),
        TrailingConfig::DynamicAtr(c) => Some(Box::new(DynamicAtrTrailing::new(c.clone()))),
    }
}

// ── Fixed percentage ────────────────────────────────────────────────

/// Trail a fixed percentage behind the favourable extreme once profit passes
/// the activation threshold.
#[derive(Debug, Clone, Copy)]
pub struct FixedPercentTrailing {
    config: FixedPercentTrailingConfig,
}

impl FixedPercentTrailing {
    pub fn new(config: FixedPercentTrailingConfig) -> Self {
        Self { config }
    }
}

impl TrailingStrategy for FixedPercentTrailing {
    fn name(&self) -> &str {
        "FixedPercent"
    }

    fn propose(&self, position: &ManagedPosition) -> Option<TrailingProposal> {
        if position.profit_pct < self.config.activation_pct {
            return None;
        }
        let distance = self.config.distance_pct / 100.0;
        let new_sl = match position.side {
            Side::Buy => position.highest_price * (1.0 - distance),
            Side::Sell => position.lowest_price * (1.0 + distance),
        };
        let min_step = position.entry_price * self.config.step_pct / 100.0;
        position
            .sl_improves(new_sl, min_step)
            .then_some(TrailingProposal {
                new_sl,
                reason: StopReason::TrailingStop,
            })
    }

    fn clone_box(&self) -> Box<dyn TrailingStrategy> {
        Box::new(*self)
    }
}

// ── ATR + MFE ───────────────────────────────────────────────────────

/// Volatility-adaptive trailing driven by the risk multiple, with MFE profit locks.
///
/// Phases by risk multiple `r`:
/// - `r < 0.3`: no trailing
/// - `r < 1.0`: `ATR * initial`
/// - `r < 3.0`: `ATR * conservative`
/// - `r >= 3.0`: `min(ATR * aggressive, best - best * lock_pct / 100)`
///
/// A retrace of `reversal_threshold_pct` from the best profit while `r` is at
/// least `reversal_min_risk_multiple` forces `ATR * aggressive`. A stall of
/// `consolidation_bars_threshold` bars without a new best forces `ATR * exit`.
/// Without any usable ATR reading the fixed-percentage fallback runs instead.
#[derive(Debug, Clone)]
pub struct DynamicAtrTrailing {
    config: DynamicTrailingConfig,
    fallback: FixedPercentTrailing,
}

pub const NO_TRAIL_BELOW: f64 = 0.3;
pub const INITIAL_PHASE_BELOW: f64 = 1.0;
pub const CONSERVATIVE_PHASE_BELOW: f64 = 3.0;

impl DynamicAtrTrailing {
    pub fn new(config: DynamicTrailingConfig) -> Self {
        let fallback = FixedPercentTrailing::new(config.fallback);
        Self { config, fallback }
    }

    /// Highest lock whose trigger is at or below `risk_multiple`.
    pub fn lock_pct(&self, risk_multiple: f64) -> Option<f64> {
        active_lock(&self.config.mfe_locks, risk_multiple).map(|l| l.lock_pct)
    }

    /// Trail distance and the phase that produced it, or `None` below the trailing threshold.
    pub fn trail_distance(&self, position: &ManagedPosition, atr: f64) -> Option<(f64, TrailPhase)> {
        let m = &self.config.atr_multipliers;
        let r = position.risk_multiple();
        if !r.is_finite() || r < NO_TRAIL_BELOW {
            return None;
        }

        let best = position.best_profit_points;
        let (mut trail, mut phase) = if r < INITIAL_PHASE_BELOW {
            (atr * m.initial, TrailPhase::Initial)
        } else if r < CONSERVATIVE_PHASE_BELOW {
            (atr * m.conservative, TrailPhase::Conservative)
        } else {
            let atr_trail = atr * m.aggressive;
            match self.lock_pct(r) {
                Some(lock) => {
                    let locked = best - best * lock / 100.0;
                    if locked < atr_trail {
                        (locked, TrailPhase::MfeLock)
                    } else {
                        (atr_trail, TrailPhase::Aggressive)
                    }
                }
                None => (atr_trail, TrailPhase::Aggressive),
            }
        };

        if best > 0.0 && r >= self.config.reversal_min_risk_multiple {
            let retrace_pct = (best - position.profit_points()) / best * 100.0;
            if retrace_pct >= self.config.reversal_threshold_pct {
                trail = atr * m.aggressive;
                phase = TrailPhase::Reversal;
            }
        }

        if position.bars_since_new_best >= self.config.consolidation_bars_threshold {
            trail = atr * m.exit;
            phase = TrailPhase::Consolidation;
        }

        Some((trail, phase))
    }
}

fn active_lock(locks: &[MfeLock], risk_multiple: f64) -> Option<MfeLock> {
    locks
        .iter()
        .filter(|l| l.trigger_risk_multiple <= risk_multiple)
        .max_by(|a, b| a.trigger_risk_multiple.total_cmp(&b.trigger_risk_multiple))
        .copied()
}

impl TrailingStrategy for DynamicAtrTrailing {
    fn name(&self) -> &str {
        "DynamicAtr"
    }

    fn propose(&self, position: &ManagedPosition) -> Option<TrailingProposal> {
        let Some(atr) = position.current_atr else {
            debug!(ticket = %position.ticket, "no ATR available, using fixed-percentage trailing");
            return self.fallback.propose(position);
        };

        let (trail, phase) = self.trail_distance(position, atr)?;
        let new_sl = match position.side {
            Side::Buy => position.best_profit_price - trail,
            Side::Sell => position.best_profit_price + trail,
        };
        let min_step = position.entry_price * self.config.min_improvement_pct / 100.0;
        position
            .sl_improves(new_sl, min_step)
            .then_some(TrailingProposal {
                new_sl,
                reason: StopReason::AtrTrailing(phase),
            })
    }

    fn clone_box(&self) -> Box<dyn TrailingStrategy> {
        Box::new(self.clone())
    }
}
