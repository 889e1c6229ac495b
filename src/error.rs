use thiserror::Error;

use crate::config::ConfigError;
use crate::deploy::DeployError;
use crate::metafile::MetafileError;

/// Everything that can end a `mktor` run.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing arguments, detected before any I/O.
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Metafile(#[from] MetafileError),

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

impl Error {
    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }

    /// Returns true if the run failed because of how it was invoked or configured.
    pub fn is_usage(&self) -> bool {
        match self {
            Error::Usage(_) | Error::Config(_) => true,
            Error::Metafile(e) => e.is_usage(),
            Error::Deploy(_) => false,
        }
    }
}
