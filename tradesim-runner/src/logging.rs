//! Tracing subscriber setup for binaries and tests that want log output.
//!
//! `RUST_LOG` wins when set. Otherwise the core logs at `info` (or `debug`
//! when verbose) and everything else at `warn`.

use tracing_subscriber::EnvFilter;

fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("warn,tradesim_core={level},tradesim_runner={level}")
}

fn build_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)))
}

/// Install a global fmt subscriber. Later calls are no-ops.
pub fn init(verbose: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(build_filter(verbose))
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_crate_level() {
        assert!(default_directives(true).contains("tradesim_core=debug"));
        assert!(default_directives(false).contains("tradesim_runner=info"));
    }

    #[test]
    fn init_twice_is_harmless() {
        init(false);
        init(true);
    }
}
