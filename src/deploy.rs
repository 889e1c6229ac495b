//! Idempotent hand-over of a written metafile to rTorrent.
//!
//! The handshake is probe, submit, settle, verify:
//!
//! 1. Ask the client for the item by info hash. If it answers, the item is
//!    already loaded and nothing is written.
//! 2. Otherwise load (or load and start) the metafile by absolute path.
//! 3. Wait a short, fixed delay; rTorrent ingests files asynchronously after
//!    the load command returns.
//! 4. Ask again. Still missing is fatal; there is exactly one verify.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metafile::InfoHash;
use crate::rpc::{ClientRpc, RpcError};

/// Settle delay between submitting a metafile and verifying it was ingested.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Load,
    Start,
}

impl Action {
    /// Completes "<name> was ... rTorrent".
    pub fn verb(self) -> &'static str {
        match self {
            Action::Load => "loaded into",
            Action::Start => "started in",
        }
    }
}

/// A metafile on disk to be handed to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    path: PathBuf,
    hash: InfoHash,
    action: Action,
}

impl DeploymentTarget {
    /// Creates a target, making `path` absolute against the current directory.
    pub fn new(path: impl AsRef<Path>, hash: InfoHash, action: Action) -> Result<Self, DeployError> {
        let path = path.as_ref();
        let path = std::path::absolute(path).map_err(|source| DeployError::Path {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { path, hash, action })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn hash(&self) -> &InfoHash {
        &self.hash
    }

    pub fn action(&self) -> Action {
        self.action
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The client already had the item; no command was sent.
    AlreadyPresent { name: String },
    /// The item was submitted and showed up after settling.
    Done { name: String },
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{hash}: checking for an existing item failed: {source}")]
    Probe { hash: InfoHash, source: RpcError },

    #[error("{hash}: submitting the metafile failed: {source}")]
    Submit { hash: InfoHash, source: RpcError },

    #[error("{hash}: item did not appear after loading: {source}")]
    Failed { hash: InfoHash, source: RpcError },

    #[error("{}: {source}", path.display())]
    Path { path: PathBuf, source: io::Error },
}

impl DeployError {
    pub fn hash(&self) -> Option<&InfoHash> {
        match self {
            DeployError::Probe { hash, .. }
            | DeployError::Submit { hash, .. }
            | DeployError::Failed { hash, .. } => Some(hash),
            DeployError::Path { .. } => None,
        }
    }
}

/// Runs the handshake for `target` over `client`.
pub async fn deploy<C: ClientRpc>(
    client: &mut C,
    target: &DeploymentTarget,
    settle: Duration,
) -> Result<Outcome, DeployError> {
    let hash = target.hash;

    match client.query_name_by_hash(&hash).await {
        Ok(name) => {
            warn!(%hash, name = %name, "item is already present, not loading");
            return Ok(Outcome::AlreadyPresent { name });
        }
        Err(RpcError::HashNotFound(_)) => {
            debug!(%hash, "item not present, submitting");
        }
        Err(source) => return Err(DeployError::Probe { hash, source }),
    }

    let submitted = match target.action {
        Action::Load => client.load_verbose(&target.path).await,
        Action::Start => client.start_verbose(&target.path).await,
    };
    submitted.map_err(|source| DeployError::Submit { hash, source })?;

    tokio::time::sleep(settle).await;

    let name = client
        .query_name_by_hash(&hash)
        .await
        .map_err(|source| DeployError::Failed { hash, source })?;

    info!(%hash, "{} was {} rTorrent", name, target.action.verb());
    Ok(Outcome::Done { name })
}
