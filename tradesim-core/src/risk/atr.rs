//! Average True Range, streamed one bar at a time.
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|).
//! The first bar has no previous close and uses high-low.
//! ATR is seeded with the mean of the first `period` TRs, then Wilder-smoothed
//! (EMA with alpha = 1/period).

use crate::domain::Bar;

/// True Range of `bar` given the previous close.
pub fn true_range(bar: &Bar, prev_close: Option<f64>) -> f64 {
    let high_low = bar.high - bar.low;
    match prev_close {
        Some(pc) => high_low.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
        None => high_low,
    }
}

/// Streaming Wilder ATR.
#[derive(Debug, Clone)]
pub struct AtrTracker {
    period: usize,
    prev_close: Option<f64>,
    seed_sum: f64,
    seed_count: usize,
    value: Option<f64>,
    // running mean of every ATR reading, used as the volatility baseline
    baseline_sum: f64,
    baseline_count: usize,
}

impl AtrTracker {
    /// A zero period is treated as 1.
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev_close: None,
            seed_sum: 0.0,
            seed_count: 0,
            value: None,
            baseline_sum: 0.0,
            baseline_count: 0,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Feed one bar and return the ATR once warmed up.
    ///
    /// Bars with non-finite prices are ignored and leave the state untouched.
    pub fn update(&mut self, bar: &Bar) -> Option<f64> {
        if !(bar.high.is_finite() && bar.low.is_finite() && bar.close.is_finite()) {
            return self.value;
        }
        let tr = true_range(bar, self.prev_close);
        self.prev_close = Some(bar.close);

        let next = match self.value {
            Some(prev) => {
                let alpha = 1.0 / self.period as f64;
                Some(prev + alpha * (tr - prev))
            }
            None => {
                self.seed_sum += tr;
                self.seed_count += 1;
                (self.seed_count == self.period).then(|| self.seed_sum / self.period as f64)
            }
        };

        if let Some(atr) = next {
            self.value = Some(atr);
            self.baseline_sum += atr;
            self.baseline_count += 1;
        }
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    /// Mean of all ATR readings so far.
    pub fn baseline(&self) -> Option<f64> {
        (self.baseline_count > 0).then(|| self.baseline_sum / self.baseline_count as f64)
    }

    /// Current ATR relative to its own baseline. 1.0 until warmed up.
    pub fn volatility_factor(&self) -> f64 {
        match (self.value, self.baseline()) {
            (Some(current), Some(baseline)) => volatility_factor(current, baseline),
            _ => 1.0,
        }
    }
}

/// `current / baseline`, or 1.0 (neutral) when either input is unusable.
pub fn volatility_factor(current_atr: f64, baseline_atr: f64) -> f64 {
    let usable = current_atr.is_finite()
        && baseline_atr.is_finite()
        && current_atr > 0.0
        && baseline_atr > 0.0;
    if usable {
        current_atr / baseline_atr
    } else {
        1.0
    }
}

/// Stop distance of `multiplier` ATRs, or `None` when it would not be positive.
pub fn atr_stop_distance(atr: f64, multiplier: f64) -> Option<f64> {
    let distance = atr * multiplier;
    (distance.is_finite() && distance > 0.0).then_some(distance)
}
