//! Metafile builder: hashes a file or directory tree into a [`Descriptor`].
//!
//! # Examples
//!
//! ```no_run
//! use mktor::metafile::BuildRequest;
//! use mktor::progress::NoProgress;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let descriptor = BuildRequest::new("path/to/data", vec!["http://tracker.example.com/announce".into()])
//!     .private(true)
//!     .comment("Created with mktor")
//!     .exclude("*.nfo")
//!     .build(&mut NoProgress)?;
//!
//! descriptor.write_to("data.torrent")?;
//! println!("info hash: {}", descriptor.info_hash()?);
//! # Ok(())
//! # }
//! ```

use std::ffi::OsString;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use md5::Md5;
use sha1::{Digest, Sha1};
use tracing::debug;

use super::descriptor::Descriptor;
use super::error::MetafileError;
use super::walk::{SourceFile, Walker};
use crate::bencode::Value;
use crate::progress::Progress;

/// File name suffix of every metafile.
pub const TORRENT_SUFFIX: &str = ".torrent";

/// Smallest automatically chosen piece size (32 KiB) as a power of two.
pub const PIECE_EXP_MIN: u32 = 15;

/// Largest automatically chosen piece size (16 MiB) as a power of two.
pub const PIECE_EXP_MAX: u32 = 24;

/// Upper limit for explicit piece size bounds (1 GiB).
pub const PIECE_LENGTH_LIMIT: u64 = 1 << 30;

/// Info dictionary field that ties the info hash to the tracker.
///
/// Without it, the same data announced to two trackers would have the same
/// info hash, and clients would refuse to load the second torrent. The value
/// is the hex MD5 of the announce URL.
pub const CROSS_SEED_FIELD: &str = "x_cross_seed";

/// Everything needed to hash a data path into a metafile.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    datapath: PathBuf,
    trackers: Vec<String>,
    root_name: Option<String>,
    private: bool,
    creation_date: bool,
    comment: Option<String>,
    created_by: Option<String>,
    ignore: Vec<String>,
    piece_min: Option<u64>,
    piece_max: Option<u64>,
}

impl BuildRequest {
    /// Creates a request for `datapath` announcing to `trackers`.
    ///
    /// `trackers` are the URLs of a single tracker, usually an alias. The first
    /// becomes `announce`; with more than one, all of them are also listed in
    /// `announce-list`, one tier each.
    pub fn new(datapath: impl AsRef<Path>, trackers: Vec<String>) -> Self {
        Self {
            datapath: strip_trailing_separators(datapath.as_ref()),
            trackers,
            root_name: None,
            private: false,
            creation_date: true,
            comment: None,
            created_by: None,
            ignore: Vec::new(),
            piece_min: None,
            piece_max: None,
        }
    }

    /// Overrides the torrent name (the root directory for multi-file torrents).
    pub fn root_name(mut self, name: impl Into<String>) -> Self {
        self.root_name = Some(name.into());
        self
    }

    /// Sets the private flag (disables DHT and PEX in clients).
    pub fn private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    /// Whether to record the creation date. Defaults to true.
    pub fn creation_date(mut self, include: bool) -> Self {
        self.creation_date = include;
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    /// Excludes files and directories whose name matches the glob `pattern`.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.ignore.push(pattern.into());
        self
    }

    /// Sets the minimum piece size; rounded up to a power of two.
    pub fn piece_min(mut self, size: u64) -> Self {
        self.piece_min = Some(size);
        self
    }

    /// Sets the maximum piece size; rounded down to a power of two.
    pub fn piece_max(mut self, size: u64) -> Self {
        self.piece_max = Some(size);
        self
    }

    pub fn datapath(&self) -> &Path {
        &self.datapath
    }

    pub fn trackers(&self) -> &[String] {
        &self.trackers
    }

    /// Checks everything about the request that does not need the data path.
    pub fn validate(&self) -> Result<(), MetafileError> {
        if self.trackers.is_empty() {
            return Err(MetafileError::NoTrackers);
        }
        self.validate_piece_bounds()?;
        Walker::new(&self.ignore)?;
        Ok(())
    }

    /// Hashes the data path and assembles the descriptor.
    ///
    /// Nothing is written to disk. Any I/O error on the source data aborts the
    /// build.
    pub fn build(&self, progress: &mut dyn Progress) -> Result<Descriptor, MetafileError> {
        let announce = self.trackers.first().ok_or(MetafileError::NoTrackers)?;
        self.validate_piece_bounds()?;

        let name = match &self.root_name {
            Some(name) if !name.is_empty() => name.clone(),
            Some(_) => return Err(MetafileError::InvalidField("root name")),
            None => root_name_for(&self.datapath)?,
        };

        let files = Walker::new(&self.ignore)?.walk(&self.datapath)?;
        let total: u64 = files.iter().map(|f| f.length).sum();
        let piece_length = piece_length_for(total, self.piece_min, self.piece_max);

        debug!(
            path = %self.datapath.display(),
            files = files.len(),
            total,
            piece_length,
            "hashing data"
        );

        let pieces = hash_pieces(&files, piece_length, progress)?;

        let mut info = Value::dict();
        info.insert("name", name);
        info.insert("piece length", piece_length as i64);
        info.insert("pieces", Bytes::from(pieces));

        if files.len() == 1 && files[0].components.is_empty() {
            info.insert("length", files[0].length as i64);
        } else {
            info.insert("files", files_list(&files));
        }

        if self.private {
            info.insert("private", 1i64);
        }

        info.insert(CROSS_SEED_FIELD, cross_seed_value(announce));

        let mut descriptor = Descriptor::new();
        descriptor.insert("info", info);
        self.add_common_fields(&mut descriptor, announce);

        Ok(descriptor)
    }

    fn validate_piece_bounds(&self) -> Result<(), MetafileError> {
        for bound in [self.piece_min, self.piece_max].into_iter().flatten() {
            if bound == 0 || bound > PIECE_LENGTH_LIMIT {
                return Err(MetafileError::InvalidPieceBounds(format!(
                    "{bound} is outside 1..={PIECE_LENGTH_LIMIT}"
                )));
            }
        }

        if let (Some(min), Some(max)) = (self.piece_min, self.piece_max) {
            if min > max {
                return Err(MetafileError::InvalidPieceBounds(format!(
                    "minimum {min} exceeds maximum {max}"
                )));
            }
        }

        Ok(())
    }

    fn add_common_fields(&self, descriptor: &mut Descriptor, announce: &str) {
        descriptor.insert("announce", announce);

        if self.trackers.len() > 1 {
            let tiers: Vec<Value> = self
                .trackers
                .iter()
                .map(|url| Value::List(vec![Value::string(url)]))
                .collect();
            descriptor.insert("announce-list", tiers);
        }

        if let Some(ref comment) = self.comment {
            descriptor.insert("comment", comment.as_str());
        }

        if let Some(ref created_by) = self.created_by {
            descriptor.insert("created by", created_by.as_str());
        }

        if self.creation_date {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            descriptor.insert("creation date", timestamp);
        }
    }
}

/// Chooses the piece size for `total` bytes of data.
///
/// The default aims for roughly 512 to 1024 pieces, limited to
/// `2^PIECE_EXP_MIN ..= 2^PIECE_EXP_MAX`. Explicit bounds take precedence over
/// that range.
pub fn piece_length_for(total: u64, min: Option<u64>, max: Option<u64>) -> u64 {
    let exp = match total {
        0 => 0,
        n => (63 - n.leading_zeros()).saturating_sub(9),
    };
    let mut length = 1u64 << exp.clamp(PIECE_EXP_MIN, PIECE_EXP_MAX);

    if let Some(min) = min.filter(|&m| m > 0) {
        length = length.max(min.next_power_of_two());
    }
    if let Some(max) = max.filter(|&m| m > 0) {
        length = length.min(1u64 << (63 - max.leading_zeros()));
    }

    length
}

/// Resolves where the metafile for `datapath` is written.
///
/// An `output` naming an existing directory receives a file named after the
/// data path; any other `output` is used verbatim. The `.torrent` suffix is
/// appended unless already present.
pub fn resolve_output_path(datapath: &Path, output: Option<&Path>) -> PathBuf {
    let datapath = strip_trailing_separators(datapath);

    let path = match output {
        Some(dir) if dir.is_dir() => match datapath.file_name() {
            Some(base) => dir.join(base),
            None => dir.join(datapath),
        },
        Some(output) => output.to_path_buf(),
        None => datapath,
    };

    ensure_torrent_suffix(path)
}

/// Appends [`TORRENT_SUFFIX`] unless `path` already ends with it.
pub fn ensure_torrent_suffix(path: PathBuf) -> PathBuf {
    if path
        .as_os_str()
        .as_encoded_bytes()
        .ends_with(TORRENT_SUFFIX.as_bytes())
    {
        return path;
    }

    let mut raw: OsString = path.into_os_string();
    raw.push(TORRENT_SUFFIX);
    PathBuf::from(raw)
}

/// Inserts `marker` in front of the `.torrent` suffix of the file name.
///
/// `foo.torrent` and `foo` both become `foo<marker>.torrent`.
pub fn insert_before_suffix(path: &Path, marker: &str) -> PathBuf {
    let Some(file_name) = path.file_name() else {
        let mut raw = path.as_os_str().to_os_string();
        raw.push(marker);
        raw.push(TORRENT_SUFFIX);
        return PathBuf::from(raw);
    };

    let mut name = match file_name.to_str() {
        Some(name) => OsString::from(name.strip_suffix(TORRENT_SUFFIX).unwrap_or(name)),
        None => file_name.to_os_string(),
    };
    name.push(marker);
    name.push(TORRENT_SUFFIX);
    path.with_file_name(name)
}

/// Value of [`CROSS_SEED_FIELD`] for the `announce` URL.
pub fn cross_seed_value(announce: &str) -> String {
    hex::encode(Md5::digest(announce.as_bytes()))
}

/// Default torrent name: the final component of the data path.
pub fn root_name_for(datapath: &Path) -> Result<String, MetafileError> {
    if let Some(name) = datapath.file_name() {
        return Ok(name.to_string_lossy().into_owned());
    }

    // "." or ".." have no file name of their own
    let canonical = datapath
        .canonicalize()
        .map_err(MetafileError::io(datapath))?;
    canonical
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or(MetafileError::InvalidField("name"))
}

fn strip_trailing_separators(path: &Path) -> PathBuf {
    let stripped: PathBuf = path.components().collect();
    if stripped.as_os_str().is_empty() {
        PathBuf::from(Component::CurDir.as_os_str())
    } else {
        stripped
    }
}

fn files_list(files: &[SourceFile]) -> Vec<Value> {
    files
        .iter()
        .map(|file| {
            let mut entry = Value::dict();
            entry.insert("length", file.length as i64);
            entry.insert(
                "path",
                file.components
                    .iter()
                    .map(|c| Value::string(c))
                    .collect::<Vec<_>>(),
            );
            entry
        })
        .collect()
}

/// SHA-1 hashes the concatenated file contents in `piece_length` chunks.
fn hash_pieces(
    files: &[SourceFile],
    piece_length: u64,
    progress: &mut dyn Progress,
) -> Result<Vec<u8>, MetafileError> {
    let total: u64 = files.iter().map(|f| f.length).sum();
    let piece_count = total.div_ceil(piece_length) as usize;

    let mut pieces = Vec::with_capacity(piece_count * 20);
    let mut buf = vec![0u8; piece_length as usize];
    let mut filled = 0usize;

    progress.start(total);

    for file in files {
        let handle = File::open(&file.path).map_err(MetafileError::io(&file.path))?;
        let mut reader = handle.take(file.length);
        let mut read_total = 0u64;

        loop {
            let n = match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(MetafileError::io(&file.path)(e)),
            };

            filled += n;
            read_total += n as u64;
            progress.advance(n as u64);

            if filled == buf.len() {
                pieces.extend_from_slice(&Sha1::digest(&buf));
                filled = 0;
            }
        }

        if read_total != file.length {
            return Err(MetafileError::SizeMismatch {
                path: file.path.clone(),
                actual: read_total,
                expected: file.length,
            });
        }
    }

    if filled > 0 {
        pieces.extend_from_slice(&Sha1::digest(&buf[..filled]));
    }

    progress.finish();
    Ok(pieces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use tempfile::TempDir;

    const TRACKER: &str = "http://tracker.example.com/announce";

    fn trackers() -> Vec<String> {
        vec![TRACKER.to_string()]
    }

    #[derive(Default)]
    struct Recorder {
        total: u64,
        seen: u64,
        finished: bool,
    }

    impl Progress for Recorder {
        fn start(&mut self, total: u64) {
            self.total = total;
        }

        fn advance(&mut self, bytes: u64) {
            self.seen += bytes;
        }

        fn finish(&mut self) {
            self.finished = true;
        }
    }

    #[test]
    fn test_single_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.txt");
        std::fs::write(&path, b"Hello, mktor!").unwrap();

        let descriptor = BuildRequest::new(&path, trackers())
            .build(&mut NoProgress)
            .unwrap();

        assert_eq!(descriptor.name(), Some("hello.txt"));
        assert_eq!(descriptor.announce(), Some(TRACKER));
        assert_eq!(descriptor.piece_length(), Some(1 << PIECE_EXP_MIN));
        assert_eq!(descriptor.piece_count(), 1);
        assert!(descriptor.is_single_file());

        let pieces = descriptor.info().unwrap().get(b"pieces").unwrap();
        let expected = Sha1::digest(b"Hello, mktor!");
        assert_eq!(pieces.as_bytes().unwrap().as_ref(), expected.as_slice());
    }

    #[test]
    fn test_multi_file_pieces_span_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("album");
        std::fs::create_dir_all(root.join("cd1")).unwrap();
        std::fs::write(root.join("cd1/a.flac"), vec![1u8; 40_000]).unwrap();
        std::fs::write(root.join("b.flac"), vec![2u8; 30_000]).unwrap();

        let descriptor = BuildRequest::new(&root, trackers())
            .build(&mut NoProgress)
            .unwrap();

        assert_eq!(descriptor.name(), Some("album"));
        assert!(!descriptor.is_single_file());

        let files = descriptor.files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, ["b.flac"]);
        assert_eq!(files[1].path, ["cd1", "a.flac"]);

        // 70_000 bytes in 32 KiB pieces
        assert_eq!(descriptor.piece_count(), 3);

        let mut data = vec![2u8; 30_000];
        data.extend(vec![1u8; 40_000]);
        let first = Sha1::digest(&data[..32768]);
        let pieces = descriptor.info().unwrap().get(b"pieces").unwrap();
        assert_eq!(&pieces.as_bytes().unwrap()[..20], first.as_slice());
    }

    #[test]
    fn test_optional_fields() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        std::fs::write(&path, b"data").unwrap();

        let descriptor = BuildRequest::new(&path, trackers())
            .private(true)
            .comment("a comment")
            .created_by("mktor test")
            .root_name("renamed")
            .creation_date(false)
            .build(&mut NoProgress)
            .unwrap();

        assert_eq!(descriptor.name(), Some("renamed"));
        assert_eq!(
            descriptor.info().unwrap().get(b"private"),
            Some(&Value::Integer(1))
        );
        assert_eq!(
            descriptor.get(b"comment").and_then(Value::as_str),
            Some("a comment")
        );
        assert_eq!(
            descriptor.get(b"created by").and_then(Value::as_str),
            Some("mktor test")
        );
        assert!(descriptor.get(b"creation date").is_none());
        assert!(descriptor.get(b"announce-list").is_none());
    }

    #[test]
    fn test_multiple_trackers() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        std::fs::write(&path, b"data").unwrap();

        let descriptor = BuildRequest::new(
            &path,
            vec![TRACKER.to_string(), "udp://backup.example.com:80".to_string()],
        )
        .build(&mut NoProgress)
        .unwrap();

        assert_eq!(descriptor.announce(), Some(TRACKER));
        let tiers = descriptor.get(b"announce-list").unwrap().as_list().unwrap();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[1].as_list().unwrap()[0].as_str(), Some("udp://backup.example.com:80"));
    }

    #[test]
    fn test_cross_seed_field_follows_tracker() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        std::fs::write(&path, b"data").unwrap();

        let a = BuildRequest::new(&path, trackers())
            .build(&mut NoProgress)
            .unwrap();
        let b = BuildRequest::new(&path, vec!["http://other.example.com/announce".into()])
            .build(&mut NoProgress)
            .unwrap();

        assert!(a.info().unwrap().get(CROSS_SEED_FIELD.as_bytes()).is_some());
        assert_ne!(a.info_hash().unwrap(), b.info_hash().unwrap());
    }

    #[test]
    fn test_cross_seed_value_is_md5_of_announce() {
        assert_eq!(cross_seed_value(TRACKER), "0b1712730bfe547fb46e7f51940a661a");

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        std::fs::write(&path, b"data").unwrap();
        let descriptor = BuildRequest::new(&path, trackers())
            .build(&mut NoProgress)
            .unwrap();
        assert_eq!(
            descriptor
                .info()
                .unwrap()
                .get(CROSS_SEED_FIELD.as_bytes())
                .and_then(Value::as_str),
            Some(cross_seed_value(TRACKER).as_str())
        );
    }

    #[test]
    fn test_progress_reporting() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        std::fs::write(&path, vec![7u8; 100_000]).unwrap();

        let mut recorder = Recorder::default();
        BuildRequest::new(&path, trackers())
            .build(&mut recorder)
            .unwrap();

        assert_eq!(recorder.total, 100_000);
        assert_eq!(recorder.seen, 100_000);
        assert!(recorder.finished);
    }

    #[test]
    fn test_no_trackers() {
        let temp = TempDir::new().unwrap();
        let result = BuildRequest::new(temp.path(), Vec::new()).build(&mut NoProgress);
        assert!(matches!(result, Err(MetafileError::NoTrackers)));
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gone");
        let result = BuildRequest::new(&missing, trackers()).build(&mut NoProgress);
        assert!(matches!(result, Err(MetafileError::Io { .. })));
    }

    #[test]
    fn test_piece_bounds_validation() {
        let temp = TempDir::new().unwrap();
        let result = BuildRequest::new(temp.path(), trackers())
            .piece_min(1 << 20)
            .piece_max(1 << 16)
            .build(&mut NoProgress);
        assert!(matches!(result, Err(MetafileError::InvalidPieceBounds(_))));

        let result = BuildRequest::new(temp.path(), trackers())
            .piece_max(0)
            .build(&mut NoProgress);
        assert!(matches!(result, Err(MetafileError::InvalidPieceBounds(_))));
    }

    #[test]
    fn test_validate_without_data() {
        let missing = Path::new("/nonexistent/mktor/data");
        assert!(BuildRequest::new(missing, trackers()).validate().is_ok());
        assert!(matches!(
            BuildRequest::new(missing, Vec::new()).validate(),
            Err(MetafileError::NoTrackers)
        ));
        assert!(matches!(
            BuildRequest::new(missing, trackers()).piece_min(0).validate(),
            Err(MetafileError::InvalidPieceBounds(_))
        ));
        assert!(matches!(
            BuildRequest::new(missing, trackers()).exclude("[unclosed").validate(),
            Err(MetafileError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_piece_length_defaults() {
        assert_eq!(piece_length_for(0, None, None), 1 << 15);
        assert_eq!(piece_length_for(1 << 20, None, None), 1 << 15);
        assert_eq!(piece_length_for(1 << 30, None, None), 1 << 21);
        assert_eq!(piece_length_for(1 << 40, None, None), 1 << 24);
    }

    #[test]
    fn test_piece_length_bounds() {
        assert_eq!(piece_length_for(1 << 30, Some(1 << 22), None), 1 << 22);
        assert_eq!(piece_length_for(1 << 30, None, Some(1 << 18)), 1 << 18);
        assert_eq!(piece_length_for(1 << 10, Some(3000), None), 1 << 15);
        assert_eq!(piece_length_for(1 << 10, None, Some(3000)), 2048);
        assert_eq!(piece_length_for(1 << 30, Some(5 << 20), None), 8 << 20);
    }

    #[test]
    fn test_output_path_suffix() {
        assert_eq!(
            resolve_output_path(Path::new("/data/show"), None),
            PathBuf::from("/data/show.torrent")
        );
        assert_eq!(
            resolve_output_path(Path::new("/data/show/"), None),
            PathBuf::from("/data/show.torrent")
        );
        assert_eq!(
            resolve_output_path(Path::new("/data/show"), Some(Path::new("/tmp/x.torrent"))),
            PathBuf::from("/tmp/x.torrent")
        );
        assert_eq!(
            ensure_torrent_suffix(PathBuf::from("a.torrent")),
            PathBuf::from("a.torrent")
        );
        assert_eq!(
            ensure_torrent_suffix(PathBuf::from("a.torrent.bak")),
            PathBuf::from("a.torrent.bak.torrent")
        );
    }

    #[test]
    fn test_insert_before_suffix() {
        assert_eq!(
            insert_before_suffix(Path::new("/out/show.torrent"), "-example"),
            PathBuf::from("/out/show-example.torrent")
        );
        assert_eq!(
            insert_before_suffix(Path::new("show"), "-resume"),
            PathBuf::from("show-resume.torrent")
        );
        assert_eq!(
            insert_before_suffix(Path::new("a.torrent.d/show.torrent"), "-x"),
            PathBuf::from("a.torrent.d/show-x.torrent")
        );
    }

    #[test]
    fn test_output_path_directory() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            resolve_output_path(Path::new("/data/show"), Some(temp.path())),
            temp.path().join("show.torrent")
        );
    }

    #[test]
    fn test_root_name_for_current_dir() {
        let expected = std::env::current_dir().unwrap();
        let name = root_name_for(Path::new(".")).unwrap();
        assert_eq!(Some(name.as_str()), expected.file_name().and_then(|n| n.to_str()));
    }
}
