use thiserror::Error;

/// rTorrent's fault code for commands addressing an unknown item.
pub const FAULT_NOT_FOUND: i64 = -501;

#[derive(Debug, Error)]
pub enum RpcError {
    /// The client has no item with the requested info hash.
    #[error("item not found: {0}")]
    HashNotFound(String),

    #[error("fault {code}: {message}")]
    Fault { code: i64, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("timeout")]
    Timeout,
}

impl RpcError {
    /// Classifies an XML-RPC fault, recognizing rTorrent's "unknown item" reply.
    pub fn fault(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        if code == FAULT_NOT_FOUND && message.contains("info-hash") {
            RpcError::HashNotFound(message)
        } else {
            RpcError::Fault { code, message }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RpcError::HashNotFound(_))
    }
}
