//! Carries XML-RPC documents to rTorrent over HTTP or SCGI.
//!
//! rTorrent speaks SCGI natively (`network.scgi.open_port` or
//! `network.scgi.open_local`); HTTP needs a front end such as nginx mounting
//! it at `/RPC2`.

use std::path::PathBuf;

use reqwest::Client;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::trace;

use super::error::RpcError;

const SCGI_SCHEME: &str = "scgi://";

#[derive(Debug, Clone)]
pub enum Transport {
    Http { client: Client, url: String },
    ScgiTcp(String),
    ScgiUnix(PathBuf),
}

impl Transport {
    /// Picks the transport for `url`.
    ///
    /// Accepted forms are `http(s)://...`, `scgi://host:port`, `scgi:///path`
    /// and a bare absolute socket path.
    pub fn from_url(url: &str) -> Result<Self, RpcError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let client = Client::builder().build()?;
            return Ok(Transport::Http {
                client,
                url: url.to_string(),
            });
        }

        if let Some(rest) = url.strip_prefix(SCGI_SCHEME) {
            if rest.starts_with('/') {
                return Ok(Transport::ScgiUnix(PathBuf::from(rest)));
            }
            if rest.is_empty() || !rest.contains(':') {
                return Err(RpcError::InvalidUrl(url.to_string()));
            }
            return Ok(Transport::ScgiTcp(rest.trim_end_matches('/').to_string()));
        }

        if url.starts_with('/') {
            return Ok(Transport::ScgiUnix(PathBuf::from(url)));
        }

        Err(RpcError::InvalidUrl(url.to_string()))
    }

    /// Sends one request document and returns the response body.
    pub async fn send(&self, body: String) -> Result<String, RpcError> {
        match self {
            Transport::Http { client, url } => {
                let response = client
                    .post(url)
                    .header("Content-Type", "text/xml")
                    .body(body)
                    .send()
                    .await?
                    .error_for_status()?;
                Ok(response.text().await?)
            }
            Transport::ScgiTcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).await?;
                scgi_exchange(stream, &body).await
            }
            Transport::ScgiUnix(path) => unix_exchange(path, &body).await,
        }
    }
}

#[cfg(unix)]
async fn unix_exchange(path: &std::path::Path, body: &str) -> Result<String, RpcError> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    scgi_exchange(stream, body).await
}

#[cfg(not(unix))]
async fn unix_exchange(path: &std::path::Path, _body: &str) -> Result<String, RpcError> {
    Err(RpcError::InvalidUrl(path.display().to_string()))
}

/// Frames `body` as an SCGI request: a netstring of NUL-separated headers, then the body.
pub fn scgi_request(body: &str) -> Vec<u8> {
    let headers = format!(
        "CONTENT_LENGTH\0{}\0SCGI\x001\0REQUEST_METHOD\0POST\0REQUEST_URI\0/RPC2\0",
        body.len()
    );

    let mut request = Vec::with_capacity(headers.len() + body.len() + 16);
    request.extend_from_slice(format!("{}:", headers.len()).as_bytes());
    request.extend_from_slice(headers.as_bytes());
    request.push(b',');
    request.extend_from_slice(body.as_bytes());
    request
}

/// Strips the CGI-style status and header lines from an SCGI response.
pub fn scgi_response_body(raw: &[u8]) -> Result<String, RpcError> {
    let text = String::from_utf8_lossy(raw);

    let (head, body) = match text.split_once("\r\n\r\n").or_else(|| text.split_once("\n\n")) {
        Some(parts) => parts,
        None => return Ok(text.into_owned()),
    };

    if let Some(status) = head
        .lines()
        .find_map(|line| line.strip_prefix("Status:"))
        .map(str::trim)
    {
        if !status.starts_with("200") {
            return Err(RpcError::InvalidResponse(format!("status {status}")));
        }
    }

    Ok(body.to_string())
}

async fn scgi_exchange<S>(mut stream: S, body: &str) -> Result<String, RpcError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = scgi_request(body);
    trace!(bytes = request.len(), "scgi request");

    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;
    trace!(bytes = raw.len(), "scgi response");

    scgi_response_body(&raw)
}
