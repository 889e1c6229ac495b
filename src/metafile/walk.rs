//! Deterministic traversal of the data path.

use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::{debug, trace};

use super::error::MetafileError;

/// File name patterns that are never hashed.
pub const DEFAULT_IGNORE: &[&str] = &[
    "core",
    "CVS",
    ".*",
    "*~",
    "*.swp",
    "*.tmp",
    "*.bak",
    "[Tt]humbs.db",
    "[Dd]esktop.ini",
    "ehthumbs_vista.db",
];

/// A regular file that will be hashed into the torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Location on disk.
    pub path: PathBuf,
    /// Path components relative to the data path. Empty when the data path is a file.
    pub components: Vec<String>,
    /// Size in bytes at the time of the walk.
    pub length: u64,
}

/// Lists the files below a data path, skipping names that match any ignore glob.
///
/// Entries are visited in byte order of their names, so the same tree always
/// produces the same file order and therefore the same piece hashes.
#[derive(Debug, Clone)]
pub struct Walker {
    ignore: Vec<Pattern>,
}

impl Walker {
    /// Creates a walker from the default ignore list plus `extra` patterns.
    pub fn new<S: AsRef<str>>(extra: &[S]) -> Result<Self, MetafileError> {
        let ignore = DEFAULT_IGNORE
            .iter()
            .copied()
            .chain(extra.iter().map(AsRef::as_ref))
            .map(|pattern| {
                Pattern::new(pattern).map_err(|source| MetafileError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self { ignore })
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.iter().any(|p| p.matches(name))
    }

    /// Walks `datapath`, returning its files in hashing order.
    pub fn walk(&self, datapath: &Path) -> Result<Vec<SourceFile>, MetafileError> {
        let metadata = fs::metadata(datapath).map_err(MetafileError::io(datapath))?;

        if !metadata.is_dir() {
            return Ok(vec![SourceFile {
                path: datapath.to_path_buf(),
                components: Vec::new(),
                length: metadata.len(),
            }]);
        }

        let mut files = Vec::new();
        self.walk_dir(datapath, &mut Vec::new(), &mut files)?;

        if files.is_empty() {
            return Err(MetafileError::NoFiles(datapath.to_path_buf()));
        }

        debug!(
            path = %datapath.display(),
            files = files.len(),
            "walked data directory"
        );
        Ok(files)
    }

    fn walk_dir(
        &self,
        dir: &Path,
        prefix: &mut Vec<String>,
        files: &mut Vec<SourceFile>,
    ) -> Result<(), MetafileError> {
        let mut entries = fs::read_dir(dir)
            .map_err(MetafileError::io(dir))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(MetafileError::io(dir))?;
        entries.sort();

        for path in entries {
            let name = match path.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };

            if self.is_ignored(&name) {
                trace!(path = %path.display(), "ignored");
                continue;
            }

            let metadata = fs::metadata(&path).map_err(MetafileError::io(&path))?;
            prefix.push(name);

            if metadata.is_dir() {
                self.walk_dir(&path, prefix, files)?;
            } else if metadata.is_file() {
                files.push(SourceFile {
                    path: path.clone(),
                    components: prefix.clone(),
                    length: metadata.len(),
                });
            }

            prefix.pop();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, rel: &str, content: &[u8]) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_single_file() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "data.bin", b"12345");

        let files = Walker::new::<&str>(&[])
            .unwrap()
            .walk(&temp.path().join("data.bin"))
            .unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].components.is_empty());
        assert_eq!(files[0].length, 5);
    }

    #[test]
    fn test_sorted_and_nested() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "b.txt", b"b");
        touch(temp.path(), "a/z.txt", b"z");
        touch(temp.path(), "a/y.txt", b"y");

        let files = Walker::new::<&str>(&[]).unwrap().walk(temp.path()).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.components.join("/")).collect();
        assert_eq!(paths, ["a/y.txt", "a/z.txt", "b.txt"]);
    }

    #[test]
    fn test_default_and_extra_ignores() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "keep.mkv", b"k");
        touch(temp.path(), ".hidden", b"h");
        touch(temp.path(), "notes.txt~", b"n");
        touch(temp.path(), "sample/clip.mkv", b"s");
        touch(temp.path(), "info.nfo", b"i");

        let walker = Walker::new(&["sample", "*.nfo"]).unwrap();
        let files = walker.walk(temp.path()).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.components.join("/")).collect();
        assert_eq!(paths, ["keep.mkv"]);
    }

    #[test]
    fn test_empty_directory() {
        let temp = TempDir::new().unwrap();
        let result = Walker::new::<&str>(&[]).unwrap().walk(temp.path());
        assert!(matches!(result, Err(MetafileError::NoFiles(_))));
    }

    #[test]
    fn test_missing_path() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing");
        match Walker::new::<&str>(&[]).unwrap().walk(&missing) {
            Err(MetafileError::Io { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            Walker::new(&["[unclosed"]),
            Err(MetafileError::InvalidPattern { .. })
        ));
    }
}
