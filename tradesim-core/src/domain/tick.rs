//! Tick, the quote view the broker resolves against.
//!
//! Bid/ask are synthesized around the bar close with a spread that widens with
//! the bar's relative range. The broker only relies on the shape
//! (`bid <= ask`, `low <= min(open, close)`, `high >= max(open, close)`), not on
//! how the spread was derived.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::bar::Bar;

/// Quote snapshot for one simulated bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub time: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub spread: f64,
}

impl Tick {
    /// Build a tick with an explicit spread centred on `close`.
    pub fn with_spread(bar: &Bar, spread: f64) -> Self {
        let half = spread.max(0.0) / 2.0;
        Self {
            time: bar.time,
            bid: bar.close - half,
            ask: bar.close + half,
            last: bar.close,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            spread: spread.max(0.0),
        }
    }

    /// Zero-spread tick: bid == ask == close.
    pub fn flat(bar: &Bar) -> Self {
        Self::with_spread(bar, 0.0)
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

/// Spread model used to derive ticks from bars.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteModel {
    /// `spread = close * base_pct * (1 + (range / close) * range_scale)`.
    VolatilityScaled { base_pct: f64, range_scale: f64 },
    /// Constant absolute spread.
    Fixed { spread: f64 },
    /// bid == ask == close.
    Flat,
}

impl Default for QuoteModel {
    fn default() -> Self {
        QuoteModel::VolatilityScaled {
            base_pct: 0.0002,
            range_scale: 10.0,
        }
    }
}

impl QuoteModel {
    pub fn tick(&self, bar: &Bar) -> Tick {
        match *self {
            QuoteModel::VolatilityScaled {
                base_pct,
                range_scale,
            } => {
                let rel_range = if bar.close > 0.0 {
                    bar.range() / bar.close
                } else {
                    0.0
                };
                let spread = bar.close * base_pct * (1.0 + rel_range * range_scale);
                Tick::with_spread(bar, spread)
            }
            QuoteModel::Fixed { spread } => Tick::with_spread(bar, spread),
            QuoteModel::Flat => Tick::flat(bar),
        }
    }
}
