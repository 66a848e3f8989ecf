//! Subscriber setup for the `hostbridge` binary.
//!
//! Library code only emits `tracing` events; this module decides where
//! they go. Everything is written to stderr so `list --json` and
//! `search --json` output on stdout stays machine-readable.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Call once, before loading config.
///
/// `RUST_LOG` wins when set and valid; otherwise `--verbose` selects
/// `debug` and the default is `warn` for dependencies and `info` for
/// hostbridge itself.
pub fn init(verbose: bool) {
    let default = if verbose {
        "debug"
    } else {
        "warn,hostbridge=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let stderr_is_tty = std::io::IsTerminal::is_terminal(&std::io::stderr());
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(stderr_is_tty)
        .with_target(verbose);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer.without_time().compact())
        .try_init();
}
