//! libtorrent fast-resume data, as understood by rTorrent.
//!
//! A metafile carrying a `libtorrent_resume` dictionary tells the client that
//! every piece is already on disk, so it can seed without hashing the data
//! again. The resume data is derived from the same files the builder hashed;
//! if those files change in between, the client will serve corrupt data.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::debug;

use super::builder::insert_before_suffix;
use super::descriptor::Descriptor;
use super::error::MetafileError;
use crate::bencode::Value;

/// Top-level key holding the resume data.
pub const RESUME_FIELD: &str = "libtorrent_resume";

/// Marker inserted before the suffix of the resume metafile's name.
pub const RESUME_MARKER: &str = "-resume";

/// Returns a copy of `descriptor` with fast-resume data for the files below `datapath`.
///
/// For single-file torrents `datapath` may be the file itself or the directory
/// containing it. Every file must exist with exactly the size recorded in the
/// descriptor.
pub fn add_fast_resume(
    descriptor: &Descriptor,
    datapath: &Path,
) -> Result<Descriptor, MetafileError> {
    let piece_length = descriptor
        .piece_length()
        .filter(|&len| len > 0)
        .ok_or(MetafileError::MissingField("piece length"))?;
    let files = descriptor.files()?;

    let single_path = if descriptor.is_single_file() {
        let name = descriptor
            .name()
            .ok_or(MetafileError::MissingField("name"))?;
        Some(if datapath.is_dir() {
            datapath.join(name)
        } else {
            datapath.to_path_buf()
        })
    } else {
        None
    };

    let mut entries = Vec::with_capacity(files.len());
    let mut offset = 0u64;

    for file in &files {
        let path: PathBuf = match single_path {
            Some(ref path) => path.clone(),
            None => file.path.iter().fold(datapath.to_path_buf(), |p, c| p.join(c)),
        };

        let metadata = fs::metadata(&path).map_err(MetafileError::io(&path))?;
        if metadata.len() != file.length {
            return Err(MetafileError::SizeMismatch {
                path,
                actual: metadata.len(),
                expected: file.length,
            });
        }

        let mtime = metadata
            .modified()
            .map_err(MetafileError::io(&path))?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let completed = (offset + file.length).div_ceil(piece_length) - offset / piece_length;

        let mut entry = Value::dict();
        entry.insert("priority", 1i64);
        entry.insert("mtime", mtime);
        entry.insert("completed", completed as i64);
        entries.push(entry);

        offset += file.length;
    }

    let mut resume = Value::dict();
    resume.insert("bitfield", descriptor.piece_count() as i64);
    resume.insert("files", entries);

    debug!(
        files = files.len(),
        pieces = descriptor.piece_count(),
        "derived fast-resume data"
    );

    let mut hashed = descriptor.clone();
    hashed.insert(RESUME_FIELD, resume);
    Ok(hashed)
}

/// Path of the fast-resume metafile written next to `metapath`.
///
/// `foo.torrent` becomes `foo-resume.torrent`.
pub fn resume_path(metapath: &Path) -> PathBuf {
    insert_before_suffix(metapath, RESUME_MARKER)
}
