//! tradesim runner: orchestration around `tradesim-core`.
//!
//! This crate provides:
//! - TOML run configuration with a content-hash run id
//! - CSV bar loading with a dataset fingerprint
//! - Single-run orchestration with seeded slippage
//! - Parallel parameter sweeps
//! - Tracing subscriber setup

pub mod config;
pub mod data_loader;
pub mod logging;
pub mod runner;
pub mod sweep;

pub use config::{ConfigError, RunConfig, RunId};
pub use data_loader::{load_bars, read_bars, LoadError, LoadedBars};
pub use runner::{run_from_files, run_single, RunError, RunReport};
pub use sweep::{ParamSweep, SweepGrid, SweepOutcome, SweepResults};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<SweepGrid>();
        assert_sync::<SweepGrid>();
    }

    #[test]
    fn result_types_are_send_sync() {
        assert_send::<RunReport>();
        assert_sync::<RunReport>();
        assert_send::<SweepOutcome>();
        assert_sync::<SweepOutcome>();
        assert_send::<LoadedBars>();
        assert_sync::<LoadedBars>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
        assert_send::<LoadError>();
        assert_sync::<LoadError>();
        assert_send::<RunError>();
        assert_sync::<RunError>();
    }
}
