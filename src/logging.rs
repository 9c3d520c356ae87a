//! Process-wide `tracing` subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{Result, SmbError};

/// Directives used when the caller passes an empty filter.
pub const DEFAULT_FILTER: &str = "warn,smbwalk=info";

fn build_filter(filter: &str) -> Result<EnvFilter> {
    let directives = match filter.trim() {
        "" => DEFAULT_FILTER,
        given => given,
    };
    EnvFilter::try_new(directives)
        .map_err(|e| SmbError::Invalid(format!("invalid log filter {directives:?}: {e}")))
}

/// Installs a global `tracing` subscriber writing to stderr.
///
/// `filter` uses `EnvFilter` directive syntax, e.g.
/// `"smbwalk::listing=debug"`. Stdout is left to listing output.
pub fn init_logging(filter: &str) -> Result<()> {
    fmt()
        .with_env_filter(build_filter(filter)?)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|_| SmbError::Invalid("logging already initialized".into()))
}
