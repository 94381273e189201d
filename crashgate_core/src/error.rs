use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop a harness from initializing.
///
/// None of these are retried: a missing module or symbol means the environment
/// is misconfigured, and the caller is expected to terminate the process.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("module '{module}' could not be loaded: {source}")]
    ModuleNotFound {
        module: String,
        #[source]
        source: libloading::Error,
    },
    #[error("symbol '{symbol}' not found in {module}: {reason}")]
    SymbolNotFound {
        symbol: String,
        module: String,
        reason: String,
    },
    #[error("failed to append marker to {path:?}: {source}")]
    MarkerWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid harness configuration: {0}")]
    InvalidConfig(String),
}
