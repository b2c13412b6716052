//! Parameter sweeps over position-management and risk settings.
//!
//! Every variant replays the same bars with its own signal source, built by a
//! factory so sources with internal state never leak between runs. Results
//! come back in grid order whether or not the sweep ran in parallel.

use std::collections::HashMap;

use anyhow::Result;
use rayon::prelude::*;
use tracing::info;

use tradesim_core::domain::Bar;
use tradesim_core::engine::{RunResult, SignalSource};
use tradesim_core::position_management::TrailingConfig;

use crate::config::{RunConfig, RunId};
use crate::runner::run_single;

/// Values to sweep; every combination becomes one run.
#[derive(Debug, Clone)]
pub struct SweepGrid {
    /// Break-even activation thresholds, percent of entry.
    pub break_even_activation_pct: Vec<f64>,
    pub trailing: Vec<TrailingConfig>,
    /// Base risk per trade, percent of balance.
    pub base_risk_pct: Vec<f64>,
}

impl SweepGrid {
    /// Varies nothing: a single variant equal to the base config.
    pub fn from_base(base: &RunConfig) -> Self {
        Self {
            break_even_activation_pct: vec![base.position.break_even.activation_pct],
            trailing: vec![base.position.trailing.clone()],
            base_risk_pct: vec![base.risk.base_risk_pct],
        }
    }

    pub fn size(&self) -> usize {
        self.break_even_activation_pct.len() * self.trailing.len() * self.base_risk_pct.len()
    }

    /// Every combination, labelled for reports.
    pub fn generate(&self, base: &RunConfig) -> Vec<(String, RunConfig)> {
        let mut variants = Vec::with_capacity(self.size());
        for &activation in &self.break_even_activation_pct {
            for trailing in &self.trailing {
                for &risk in &self.base_risk_pct {
                    let mut config = base.clone();
                    config.position.break_even.activation_pct = activation;
                    config.position.trailing = trailing.clone();
                    config.risk.base_risk_pct = risk;
                    let label = format!(
                        "be={activation} trail={} risk={risk}",
                        trailing_label(trailing)
                    );
                    variants.push((label, config));
                }
            }
        }
        variants
    }
}

fn trailing_label(trailing: &TrailingConfig) -> &'static str {
    match trailing {
        TrailingConfig::Disabled => "off",
        TrailingConfig::FixedPercent(_) => "fixed",
        TrailingConfig::DynamicAtr(_) => "atr",
    }
}

/// One finished variant.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub run_id: RunId,
    pub label: String,
    pub result: RunResult,
}

/// Sweep executor.
#[derive(Debug, Clone, Copy)]
pub struct ParamSweep {
    parallel: bool,
}

impl Default for ParamSweep {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamSweep {
    pub fn new() -> Self {
        Self { parallel: true }
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run every grid variant over `bars`.
    pub fn sweep<F>(
        &self,
        grid: &SweepGrid,
        base: &RunConfig,
        bars: &[Bar],
        make_signals: F,
    ) -> Result<SweepResults>
    where
        F: Fn() -> Box<dyn SignalSource> + Sync,
    {
        self.run_variants(grid.generate(base), bars, make_signals)
    }

    /// Run explicit `(label, config)` variants over `bars`.
    pub fn run_variants<F>(
        &self,
        variants: Vec<(String, RunConfig)>,
        bars: &[Bar],
        make_signals: F,
    ) -> Result<SweepResults>
    where
        F: Fn() -> Box<dyn SignalSource> + Sync,
    {
        info!(variants = variants.len(), parallel = self.parallel, "sweep started");
        let run = |(label, config): (String, RunConfig)| -> Result<SweepOutcome> {
            let mut signals = make_signals();
            let report = run_single(&config, bars, signals.as_mut())?;
            Ok(SweepOutcome {
                run_id: report.run_id,
                label,
                result: report.result,
            })
        };

        let outcomes = if self.parallel {
            variants
                .into_par_iter()
                .map(run)
                .collect::<Result<Vec<_>>>()?
        } else {
            variants.into_iter().map(run).collect::<Result<Vec<_>>>()?
        };
        Ok(SweepResults::new(outcomes))
    }
}

/// Results from a sweep, in grid order.
#[derive(Debug)]
pub struct SweepResults {
    outcomes: Vec<SweepOutcome>,
    by_run_id: HashMap<RunId, usize>,
}

impl SweepResults {
    fn new(outcomes: Vec<SweepOutcome>) -> Self {
        let by_run_id = outcomes
            .iter()
            .enumerate()
            .map(|(i, o)| (o.run_id.clone(), i))
            .collect();
        Self {
            outcomes,
            by_run_id,
        }
    }

    pub fn all(&self) -> &[SweepOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, run_id: &str) -> Option<&SweepOutcome> {
        self.by_run_id.get(run_id).map(|&i| &self.outcomes[i])
    }

    /// Outcomes sorted by return, best first.
    pub fn sorted_by_return(&self) -> Vec<&SweepOutcome> {
        let mut sorted: Vec<_> = self.outcomes.iter().collect();
        sorted.sort_by(|a, b| b.result.return_pct().total_cmp(&a.result.return_pct()));
        sorted
    }

    pub fn best(&self) -> Option<&SweepOutcome> {
        self.sorted_by_return().into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tradesim_core::domain::Side;
    use tradesim_core::engine::{EngineConfig, ScriptedSignals, TradeSignal};
    use tradesim_core::position_management::DynamicTrailingConfig;

    fn bars() -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..60)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.3).sin() * 4.0 + i as f64 * 0.05;
                Bar::new(t0 + Duration::hours(i), close, close + 1.2, close - 1.2, close, 1.0)
            })
            .collect()
    }

    fn base() -> RunConfig {
        RunConfig {
            seed: 5,
            engine: EngineConfig {
                signal_check_interval: 1,
                ..EngineConfig::default()
            },
            ..RunConfig::default()
        }
    }

    fn signals() -> Box<dyn SignalSource> {
        Box::new(ScriptedSignals::new(vec![
            (0, TradeSignal::market(Side::Buy, 100.0, 97.0, None)),
            (20, TradeSignal::market(Side::Sell, 101.0, 104.0, None)),
            (40, TradeSignal::market(Side::Buy, 102.0, 99.0, None)),
        ]))
    }

    fn grid() -> SweepGrid {
        SweepGrid {
            break_even_activation_pct: vec![0.3, 0.8],
            trailing: vec![
                TrailingConfig::Disabled,
                TrailingConfig::DynamicAtr(DynamicTrailingConfig::default()),
            ],
            base_risk_pct: vec![0.5, 1.0],
        }
    }

    #[test]
    fn grid_size_and_labels() {
        let g = grid();
        assert_eq!(g.size(), 8);
        let variants = g.generate(&base());
        assert_eq!(variants.len(), 8);
        assert_eq!(variants[0].0, "be=0.3 trail=off risk=0.5");
        assert_eq!(variants[7].1.risk.base_risk_pct, 1.0);
        assert_eq!(SweepGrid::from_base(&base()).size(), 1);
    }

    #[test]
    fn parallel_matches_sequential() {
        let data = bars();
        let par = ParamSweep::new().sweep(&grid(), &base(), &data, signals).unwrap();
        let seq = ParamSweep::new()
            .with_parallelism(false)
            .sweep(&grid(), &base(), &data, signals)
            .unwrap();

        assert_eq!(par.len(), 8);
        for (a, b) in par.all().iter().zip(seq.all()) {
            assert_eq!(a.run_id, b.run_id);
            assert_eq!(a.label, b.label);
            assert_eq!(a.result.trades, b.result.trades);
            assert_eq!(a.result.final_balance, b.result.final_balance);
        }
    }

    #[test]
    fn lookup_and_ranking() {
        let results = ParamSweep::new()
            .sweep(&grid(), &base(), &bars(), signals)
            .unwrap();
        let first = &results.all()[0];
        assert_eq!(results.get(&first.run_id).unwrap().label, first.label);

        let sorted = results.sorted_by_return();
        for pair in sorted.windows(2) {
            assert!(pair[0].result.return_pct() >= pair[1].result.return_pct());
        }
        assert_eq!(
            results.best().unwrap().run_id,
            sorted[0].run_id
        );
    }
}
