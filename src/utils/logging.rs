use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::error::{DeadArchiveError, Result};

pub fn init_logging(verbose: bool, quiet: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    };

    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    // Noisy dependencies stay at warn
    for target in ["reqwest", "hyper", "rusqlite", "redis"] {
        let directive = format!("{}=warn", target)
            .parse()
            .map_err(|e| DeadArchiveError::Internal(anyhow::anyhow!("bad log directive: {}", e)))?;
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init()
        .map_err(|e| DeadArchiveError::Internal(anyhow::anyhow!("logging already initialized: {}", e)))?;

    Ok(())
}
