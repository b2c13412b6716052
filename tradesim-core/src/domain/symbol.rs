//! Static contract metadata for the simulated symbol.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from `SymbolSpec::validate`.
#[derive(Debug, Error, PartialEq)]
pub enum SymbolSpecError {
    #[error("point must be positive, got {0}")]
    NonPositivePoint(f64),

    #[error("contract_size must be positive, got {0}")]
    NonPositiveContractSize(f64),

    #[error("lot_step must be positive, got {0}")]
    NonPositiveLotStep(f64),

    #[error("min_lot ({min}) exceeds max_lot ({max})")]
    LotBoundsInverted { min: f64, max: f64 },
}

/// Contract metadata for the traded symbol. Immutable for a backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolSpec {
    pub symbol: String,
    /// Smallest price increment.
    pub point: f64,
    /// Display precision.
    pub digits: u32,
    pub contract_size: f64,
    pub min_lot: f64,
    pub max_lot: f64,
    pub lot_step: f64,
    pub tick_size: f64,
    pub tick_value: f64,
    /// Minimum distance between price and SL/TP, in points.
    pub stops_level: u32,
    pub freeze_level: u32,
}

impl Default for SymbolSpec {
    fn default() -> Self {
        Self {
            symbol: "BTCUSD".into(),
            point: 0.01,
            digits: 2,
            contract_size: 1.0,
            min_lot: 0.01,
            max_lot: 100.0,
            lot_step: 0.01,
            tick_size: 0.01,
            tick_value: 1.0,
            stops_level: 0,
            freeze_level: 0,
        }
    }
}

impl SymbolSpec {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), SymbolSpecError> {
        if !is_positive(self.point) {
            return Err(SymbolSpecError::NonPositivePoint(self.point));
        }
        if !is_positive(self.contract_size) {
            return Err(SymbolSpecError::NonPositiveContractSize(self.contract_size));
        }
        if !is_positive(self.lot_step) {
            return Err(SymbolSpecError::NonPositiveLotStep(self.lot_step));
        }
        if self.min_lot > self.max_lot {
            return Err(SymbolSpecError::LotBoundsInverted {
                min: self.min_lot,
                max: self.max_lot,
            });
        }
        Ok(())
    }

    /// Round a volume down to `lot_step` and cap at `max_lot`.
    ///
    /// Returns `None` if the rounded volume is below `min_lot` or the input is
    /// not a positive finite number.
    pub fn normalize_volume(&self, lots: f64) -> Option<f64> {
        if !lots.is_finite() || lots <= 0.0 {
            return None;
        }
        // Small epsilon so 0.3 / 0.01 doesn't floor to 29.
        let steps = (lots / self.lot_step + 1e-9).floor();
        let rounded = round_to(steps * self.lot_step, self.lot_decimals());
        let capped = rounded.min(self.max_lot);
        if capped + 1e-12 < self.min_lot {
            None
        } else {
            Some(capped)
        }
    }

    /// Like `normalize_volume`, but falls back to `min_lot` instead of `None`.
    pub fn normalize_volume_or_min(&self, lots: f64) -> f64 {
        self.normalize_volume(lots).unwrap_or(self.min_lot)
    }

    /// Round a price to the symbol's display precision.
    pub fn round_price(&self, price: f64) -> f64 {
        round_to(price, self.digits)
    }

    /// `stops_level` expressed in price units.
    pub fn min_stop_distance(&self) -> f64 {
        self.stops_level as f64 * self.point
    }

    fn lot_decimals(&self) -> u32 {
        let mut decimals = 0;
        let mut step = self.lot_step;
        while decimals < 8 && (step - step.round()).abs() > 1e-9 {
            step *= 10.0;
            decimals += 1;
        }
        decimals
    }
}

fn is_positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
