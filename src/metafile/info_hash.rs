use super::error::MetafileError;
use crate::bencode::{encode, BencodeError, Value};
use sha1::{Digest, Sha1};
use std::fmt;

/// The SHA-1 identity of a torrent: the hash of its bencoded `info` dictionary.
///
/// Displayed as 40 uppercase hex digits, which is the form rTorrent uses to
/// address items.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Computes the info hash of an `info` dictionary.
    pub fn of_info(info: &Value) -> Result<Self, BencodeError> {
        let raw = encode(info)?;
        Ok(InfoHash(Sha1::digest(&raw).into()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetafileError> {
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|_| MetafileError::InvalidInfoHashLength)?;
        Ok(InfoHash(arr))
    }

    pub fn from_hex(s: &str) -> Result<Self, MetafileError> {
        let bytes = hex::decode(s).map_err(|_| MetafileError::InvalidInfoHashLength)?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({})", self.to_hex())
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
