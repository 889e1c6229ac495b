//! XML-RPC access to a running rTorrent instance.
//!
//! Only the handful of commands needed to hand over a metafile are modelled:
//! looking an item up by info hash and loading a metafile, optionally started.
//!
//! # Examples
//!
//! ```no_run
//! use mktor::rpc::{ClientRpc, XmlRpcClient};
//! use mktor::metafile::InfoHash;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = XmlRpcClient::new("scgi://127.0.0.1:5000")?;
//! let hash = InfoHash::from_hex("c12fe1c06bba254a9dc9f519b335aa7c1367a88a")?;
//!
//! match client.query_name_by_hash(&hash).await {
//!     Ok(name) => println!("already loaded: {name}"),
//!     Err(e) if e.is_not_found() => println!("not loaded"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod transport;
mod xmlrpc;

use std::path::Path;
use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

pub use error::{RpcError, FAULT_NOT_FOUND};
pub use transport::{scgi_request, scgi_response_body, Transport};
pub use xmlrpc::{encode_call, parse_response, XmlValue};

use crate::metafile::InfoHash;

/// Upper bound for a single call, connection included.
pub const RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Target argument for commands that do not address an existing item.
pub const NOHASH: &str = "";

/// The client operations a deployment needs.
#[allow(async_fn_in_trait)]
pub trait ClientRpc {
    /// Returns the name of the loaded item with `hash`.
    ///
    /// Fails with [`RpcError::HashNotFound`] if the client does not know it.
    async fn query_name_by_hash(&mut self, hash: &InfoHash) -> Result<String, RpcError>;

    /// Loads the metafile at `path` without starting it.
    ///
    /// `path` is resolved by the client process, so it must be absolute.
    async fn load_verbose(&mut self, path: &Path) -> Result<(), RpcError>;

    /// Loads and starts the metafile at `path`.
    async fn start_verbose(&mut self, path: &Path) -> Result<(), RpcError>;
}

/// rTorrent over XML-RPC.
#[derive(Debug, Clone)]
pub struct XmlRpcClient {
    transport: Transport,
}

impl XmlRpcClient {
    pub fn new(url: &str) -> Result<Self, RpcError> {
        Ok(Self {
            transport: Transport::from_url(url)?,
        })
    }

    /// Performs one method call.
    pub async fn call(&self, method: &str, params: &[XmlValue]) -> Result<XmlValue, RpcError> {
        debug!(method, params = params.len(), "xmlrpc call");
        let body = encode_call(method, params);

        let response = timeout(RPC_TIMEOUT, self.transport.send(body))
            .await
            .map_err(|_| RpcError::Timeout)??;

        parse_response(&response)
    }

    async fn load_with(&self, method: &str, path: &Path) -> Result<(), RpcError> {
        let path = path.to_string_lossy().into_owned();
        self.call(method, &[NOHASH.into(), path.into()]).await?;
        Ok(())
    }
}

impl ClientRpc for XmlRpcClient {
    async fn query_name_by_hash(&mut self, hash: &InfoHash) -> Result<String, RpcError> {
        let name = self.call("d.name", &[hash.to_hex().into()]).await?;
        match name {
            XmlValue::String(name) => Ok(name),
            other => Err(RpcError::InvalidResponse(format!(
                "d.name returned {other:?}"
            ))),
        }
    }

    async fn load_verbose(&mut self, path: &Path) -> Result<(), RpcError> {
        self.load_with("load.verbose", path).await
    }

    async fn start_verbose(&mut self, path: &Path) -> Result<(), RpcError> {
        self.load_with("load.start_verbose", path).await
    }
}
