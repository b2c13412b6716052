//! Signal source interface.
//!
//! Signal generation lives outside this crate. The driver only needs the
//! numeric fields of a [`TradeSignal`] to validate, size and place it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AccountInfo, Bar, PendingOrderType, Side, Tick};

/// How the entry should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EntryKind {
    #[default]
    Market,
    /// Resting order at a better price.
    Limit,
    /// Resting order at a worse price (breakout).
    Stop,
}

#[derive(Debug, Error, PartialEq)]
pub enum SignalError {
    #[error("entry price must be positive and finite, got {0}")]
    InvalidEntry(f64),

    #[error("stop loss {sl} is not on the losing side of entry {entry}")]
    StopOnWrongSide { entry: f64, sl: f64 },

    #[error("take profit {tp} is not on the winning side of entry {entry}")]
    TargetOnWrongSide { entry: f64, tp: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub side: Side,
    pub entry_price: f64,
    pub sl_price: f64,
    pub tp_price: Option<f64>,
    /// Opaque quality score from the generator.
    pub score: f64,
    pub rr_ratio: f64,
    pub entry: EntryKind,
    pub expiration: Option<DateTime<Utc>>,
    pub comment: Option<String>,
}

impl TradeSignal {
    pub fn market(side: Side, entry_price: f64, sl_price: f64, tp_price: Option<f64>) -> Self {
        let risk = (entry_price - sl_price).abs();
        let rr_ratio = match tp_price {
            Some(tp) if risk > 0.0 => (tp - entry_price).abs() / risk,
            _ => 0.0,
        };
        Self {
            side,
            entry_price,
            sl_price,
            tp_price,
            score: 0.0,
            rr_ratio,
            entry: EntryKind::Market,
            expiration: None,
            comment: None,
        }
    }

    pub fn with_entry(mut self, entry: EntryKind) -> Self {
        self.entry = entry;
        self
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Stop on the losing side, target (if any) on the winning side.
    pub fn validate(&self) -> Result<(), SignalError> {
        let entry = self.entry_price;
        if !(entry.is_finite() && entry > 0.0) {
            return Err(SignalError::InvalidEntry(entry));
        }
        let sl = self.sl_price;
        let sl_ok = sl.is_finite()
            && sl > 0.0
            && match self.side {
                Side::Buy => sl < entry,
                Side::Sell => sl > entry,
            };
        if !sl_ok {
            return Err(SignalError::StopOnWrongSide { entry, sl });
        }
        if let Some(tp) = self.tp_price {
            let tp_ok = tp.is_finite()
                && match self.side {
                    Side::Buy => tp > entry,
                    Side::Sell => tp < entry && tp > 0.0,
                };
            if !tp_ok {
                return Err(SignalError::TargetOnWrongSide { entry, tp });
            }
        }
        Ok(())
    }

    /// Resting order type, `None` for market entries.
    pub fn pending_type(&self) -> Option<PendingOrderType> {
        match (self.entry, self.side) {
            (EntryKind::Market, _) => None,
            (EntryKind::Limit, Side::Buy) => Some(PendingOrderType::BuyLimit),
            (EntryKind::Limit, Side::Sell) => Some(PendingOrderType::SellLimit),
            (EntryKind::Stop, Side::Buy) => Some(PendingOrderType::BuyStop),
            (EntryKind::Stop, Side::Sell) => Some(PendingOrderType::SellStop),
        }
    }
}

/// Market state handed to a signal source.
#[derive(Debug, Clone, Copy)]
pub struct SignalContext<'a> {
    /// Index of the current bar in the run.
    pub bar_index: usize,
    /// Bars seen so far, current bar last.
    pub bars: &'a [Bar],
    pub tick: &'a Tick,
    pub account: &'a AccountInfo,
    pub atr: Option<f64>,
}

impl SignalContext<'_> {
    pub fn time(&self) -> DateTime<Utc> {
        self.tick.time
    }
}

pub trait SignalSource: Send {
    fn name(&self) -> &str;

    /// Called every `signal_check_interval` bars.
    fn analyze(&mut self, ctx: &SignalContext<'_>) -> Option<TradeSignal>;
}

/// Never signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSignal;

impl SignalSource for NullSignal {
    fn name(&self) -> &str {
        "Null"
    }

    fn analyze(&mut self, _ctx: &SignalContext<'_>) -> Option<TradeSignal> {
        None
    }
}

/// Replays signals at fixed bar indices.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSignals {
    script: Vec<(usize, TradeSignal)>,
}

impl ScriptedSignals {
    pub fn new(mut script: Vec<(usize, TradeSignal)>) -> Self {
        script.sort_by_key(|(i, _)| *i);
        Self { script }
    }
}

impl SignalSource for ScriptedSignals {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn analyze(&mut self, ctx: &SignalContext<'_>) -> Option<TradeSignal> {
        self.script
            .iter()
            .find(|(i, _)| *i == ctx.bar_index)
            .map(|(_, s)| s.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_checks_sides() {
        assert!(TradeSignal::market(Side::Buy, 100.0, 95.0, Some(110.0)).validate().is_ok());
        assert!(TradeSignal::market(Side::Sell, 100.0, 105.0, None).validate().is_ok());
        assert!(matches!(
            TradeSignal::market(Side::Buy, 100.0, 101.0, None).validate(),
            Err(SignalError::StopOnWrongSide { .. })
        ));
        assert!(matches!(
            TradeSignal::market(Side::Sell, 100.0, 105.0, Some(101.0)).validate(),
            Err(SignalError::TargetOnWrongSide { .. })
        ));
        assert!(matches!(
            TradeSignal::market(Side::Buy, f64::NAN, 95.0, None).validate(),
            Err(SignalError::InvalidEntry(_))
        ));
    }

    #[test]
    fn rr_ratio_from_levels() {
        let s = TradeSignal::market(Side::Buy, 100.0, 95.0, Some(112.5));
        assert!((s.rr_ratio - 2.5).abs() < 1e-12);
    }

    #[test]
    fn pending_types() {
        let s = TradeSignal::market(Side::Sell, 100.0, 105.0, None);
        assert_eq!(s.pending_type(), None);
        assert_eq!(
            s.clone().with_entry(EntryKind::Limit).pending_type(),
            Some(PendingOrderType::SellLimit)
        );
        assert_eq!(
            s.with_entry(EntryKind::Stop).pending_type(),
            Some(PendingOrderType::SellStop)
        );
    }
}
