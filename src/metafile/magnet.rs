//! Magnet link metafiles.
//!
//! rTorrent can load a metafile whose only content is a `magnet-uri` key; it
//! then fetches the real metadata from the swarm. Dropping such a file into a
//! watch directory is enough to start a download from a magnet link.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};
use tracing::{debug, info};

use super::builder::TORRENT_SUFFIX;
use super::descriptor::Descriptor;
use super::error::MetafileError;

/// The only key of a magnet metafile.
pub const MAGNET_KEY: &str = "magnet-uri";

const SCHEME: &str = "magnet:";
const BTIH_MARKER: &str = "=urn:btih:";
const FILE_PREFIX: &str = "magnet-";

/// Returns true if `arg` looks like a BitTorrent magnet link.
///
/// Detection only checks for the `urn:btih:` exact topic; the scheme itself is
/// optional.
pub fn is_magnet(arg: &str) -> bool {
    arg.contains(BTIH_MARKER)
}

/// A parsed magnet link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    uri: String,
    slug: String,
}

impl MagnetLink {
    /// Parses `uri`, with or without the `magnet:` scheme.
    pub fn parse(uri: &str) -> Self {
        let rest = uri.strip_prefix(SCHEME).unwrap_or(uri);
        let params = parse_query_string(rest.trim_start_matches('?'));

        let mut name = params
            .get("xt")
            .and_then(|v| v.first())
            .cloned()
            .unwrap_or_else(|| hex::encode(Sha1::digest(rest.as_bytes())));

        if let Some(display) = params.get("dn").and_then(|v| v.first()) {
            name = format!("{display}-{name}");
        }

        Self {
            uri: format!("{SCHEME}{rest}"),
            slug: slugify(&name),
        }
    }

    /// The link, always carrying the `magnet:` scheme.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Filesystem-safe name derived from the display name and exact topic.
    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Location of the metafile inside `watch_dir`: `magnet-<slug>.torrent`.
    pub fn watch_path(&self, watch_dir: &Path) -> PathBuf {
        watch_dir.join(format!("{FILE_PREFIX}{}{TORRENT_SUFFIX}", self.slug))
    }

    pub fn to_descriptor(&self) -> Descriptor {
        let mut descriptor = Descriptor::new();
        descriptor.insert(MAGNET_KEY, self.uri.as_str());
        descriptor
    }

    /// Writes the magnet metafile into `watch_dir` and returns its path.
    pub fn write_to_watch(&self, watch_dir: &Path) -> Result<PathBuf, MetafileError> {
        let path = self.watch_path(watch_dir);
        debug!(path = %path.display(), "writing magnet metafile");

        self.to_descriptor().write_to(&path)?;

        info!(path = %path.display(), "magnet metafile written");
        Ok(path)
    }
}

/// Replaces runs of unsafe characters with a dot and drops the `urn:btih:` namespace.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut in_run = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ',') {
            slug.push(c);
            in_run = false;
        } else if !in_run {
            slug.push('.');
            in_run = true;
        }
    }

    slug.trim_matches('.').replace("urn.btih.", "")
}

fn parse_query_string(query: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();

    for part in query.split(['&', ';']) {
        if let Some((key, value)) = part.split_once('=') {
            if value.is_empty() {
                continue;
            }
            params
                .entry(url_decode(key))
                .or_default()
                .push(url_decode(value));
        }
    }

    params
}

fn url_decode(s: &str) -> String {
    let raw = s.as_bytes();
    let mut decoded = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        match raw[i] {
            b'%' => {
                let byte = raw
                    .get(i + 1..i + 3)
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match byte {
                    Some(byte) => {
                        decoded.push(byte);
                        i += 3;
                        continue;
                    }
                    None => decoded.push(b'%'),
                }
            }
            b'+' => decoded.push(b' '),
            other => decoded.push(other),
        }
        i += 1;
    }

    String::from_utf8_lossy(&decoded).into_owned()
}
