//! Log setup for the `splint` binary.
//!
//! Two layers: human-facing lines on stderr, and a DEBUG-level file for post-mortems. Both
//! only show splint's own crates unless `RUST_LOG` says otherwise.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Default log file, created in the working directory.
pub const DEFAULT_LOG_FILE: &str = "splint.log";

const CRATES: [&str; 5] = [
    "splint_core",
    "splint_patch",
    "splint_deploy",
    "splint_validate",
    "splint_cli",
];

/// Filter letting splint crates through at `level` and everything else at WARN.
pub fn filter(level: &str) -> EnvFilter {
    let directives: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
    EnvFilter::new(format!("warn,{}", directives.join(",")))
}

/// Installs the global subscriber. `verbose` lowers stderr to DEBUG and adds source locations.
pub fn init(verbose: bool, log_file: &Path) -> color_eyre::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;

    let stderr_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter(if verbose { "debug" } else { "info" }));
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .without_time()
        .with_target(verbose)
        .with_file(verbose)
        .with_line_number(verbose)
        .with_filter(stderr_filter);

    let file = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_filter(filter("debug"));

    tracing_subscriber::registry()
        .with(stderr)
        .with(file)
        .try_init()?;
    tracing::debug!("Logging to {}", log_file.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_names_every_crate() {
        let rendered = filter("debug").to_string();
        for krate in CRATES {
            assert!(rendered.contains(&format!("{krate}=debug")), "{rendered}");
        }
    }
}
