use anyhow::{anyhow, Result};
use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive for a `-v` count
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `verbosity`.
///
/// With `tui` set, output goes to a sink so the alternate screen stays intact;
/// the dashboard's activity log carries user-facing messages instead.
pub fn init_logging(verbosity: u8, tui: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbosity)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if tui {
        registry.with(fmt::layer().with_writer(io::sink)).try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(io::stderr).with_target(false))
            .try_init()
    };
    installed.map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for() {
        assert_eq!(level_for(0), "info");
        assert_eq!(level_for(1), "debug");
        assert_eq!(level_for(5), "trace");
    }
}
