use std::path::{Path, PathBuf};

use super::error::MetafileError;
use super::info_hash::InfoHash;
use crate::bencode::{decode, encode, write_file, BencodeError, Value};

/// An in-memory metafile: the root bencode dictionary of a `.torrent` file.
///
/// The root is always a dictionary. Everything under `info` contributes to
/// the [`InfoHash`]; the other top-level keys (`announce`, `comment`,
/// `creation date`, ...) do not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    root: Value,
}

/// One file of a torrent, as listed in its `info` dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpan {
    /// Path components relative to the torrent root. Empty for single-file torrents.
    pub path: Vec<String>,
    /// File size in bytes.
    pub length: u64,
}

impl Descriptor {
    /// Creates a descriptor with an empty root dictionary.
    pub fn new() -> Self {
        Self { root: Value::dict() }
    }

    pub fn from_value(root: Value) -> Result<Self, MetafileError> {
        match root {
            Value::Dict(_) => Ok(Self { root }),
            _ => Err(MetafileError::InvalidField("root")),
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, MetafileError> {
        Self::from_value(decode(data)?)
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, MetafileError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(MetafileError::io(path))?;
        Self::from_bytes(&data)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, MetafileError> {
        Ok(encode(&self.root)?)
    }

    /// Serializes the descriptor to `path`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), MetafileError> {
        let path = path.as_ref();
        write_file(path, &self.root).map_err(|e| match e {
            BencodeError::Io(source) => MetafileError::Io {
                path: PathBuf::from(path),
                source,
            },
            other => MetafileError::Bencode(other),
        })
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.root.get(key)
    }

    pub fn insert(&mut self, key: impl AsRef<[u8]>, value: impl Into<Value>) -> Option<Value> {
        self.root.insert(key, value)
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Value> {
        self.root.remove(key)
    }

    pub fn info(&self) -> Option<&Value> {
        self.root.get(b"info")
    }

    pub fn info_mut(&mut self) -> Option<&mut Value> {
        self.root.get_mut(b"info")
    }

    /// Computes the identity hash from the current `info` dictionary.
    pub fn info_hash(&self) -> Result<InfoHash, MetafileError> {
        let info = self.info().ok_or(MetafileError::MissingField("info"))?;
        Ok(InfoHash::of_info(info)?)
    }

    pub fn name(&self) -> Option<&str> {
        self.info()?.get(b"name")?.as_str()
    }

    pub fn announce(&self) -> Option<&str> {
        self.root.get(b"announce")?.as_str()
    }

    pub fn piece_length(&self) -> Option<u64> {
        self.info()?
            .get(b"piece length")?
            .as_integer()
            .and_then(|v| u64::try_from(v).ok())
    }

    /// Number of pieces recorded in `info.pieces`.
    pub fn piece_count(&self) -> usize {
        self.info()
            .and_then(|info| info.get(b"pieces"))
            .and_then(Value::as_bytes)
            .map_or(0, |pieces| pieces.len() / 20)
    }

    /// Returns true if the torrent has a single `length` instead of a `files` list.
    pub fn is_single_file(&self) -> bool {
        self.info().and_then(|i| i.get(b"files")).is_none()
    }

    /// Lists the files of the torrent in piece order.
    pub fn files(&self) -> Result<Vec<FileSpan>, MetafileError> {
        let info = self.info().ok_or(MetafileError::MissingField("info"))?;

        if let Some(files) = info.get(b"files") {
            let files = files
                .as_list()
                .ok_or(MetafileError::InvalidField("files"))?;

            return files
                .iter()
                .map(|file| {
                    let length = file
                        .get(b"length")
                        .and_then(Value::as_integer)
                        .and_then(|v| u64::try_from(v).ok())
                        .ok_or(MetafileError::MissingField("file length"))?;
                    let path = file
                        .get(b"path")
                        .and_then(Value::as_list)
                        .ok_or(MetafileError::MissingField("file path"))?
                        .iter()
                        .map(|p| p.as_str().map(String::from))
                        .collect::<Option<Vec<_>>>()
                        .ok_or(MetafileError::InvalidField("file path"))?;
                    Ok(FileSpan { path, length })
                })
                .collect();
        }

        let length = info
            .get(b"length")
            .and_then(Value::as_integer)
            .and_then(|v| u64::try_from(v).ok())
            .ok_or(MetafileError::MissingField("length or files"))?;

        Ok(vec![FileSpan {
            path: Vec::new(),
            length,
        }])
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Self::new()
    }
}
