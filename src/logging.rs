//! Diagnostic logging.
//!
//! Library code emits `tracing` events; this installs the subscriber that
//! prints them. Diagnostics go to stderr so they never mix with the result
//! lines on stdout.

use tracing_subscriber::EnvFilter;

/// Filter directive for a `-v` count. `None` means defer to `RUST_LOG`.
pub fn directive(verbosity: u8) -> Option<&'static str> {
    match verbosity {
        0 => None,
        1 => Some("anchor_patch=info"),
        2 => Some("anchor_patch=debug"),
        _ => Some("anchor_patch=trace"),
    }
}

/// Install the global subscriber.
///
/// With no `-v` flags, `RUST_LOG` decides; without that, logging is off and
/// only the result lines are printed. Calling this twice is harmless.
pub fn init(verbosity: u8) {
    let filter = match directive(verbosity) {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off")),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
