//! Tracing subscriber setup
//!
//! Logs go to stderr so `--json` output on stdout stays machine readable.
//! `RUST_LOG` takes precedence over `logging.level` from ledger.json.

use ledger_core::config::Config;
use tracing_subscriber::EnvFilter;

pub fn init(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // A second init (tests, embedding) is a no-op
    let _ = if config.log_json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}
