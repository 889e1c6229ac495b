//! User configuration, read from a TOML file.
//!
//! The file lives at `--config PATH` or, by default, `config.toml` in the
//! platform config directory (`~/.config/mktor/` on Linux). A missing default
//! file is not an error.
//!
//! ```toml
//! magnet_watch = "~/rtorrent/watch/magnet"
//! settle_ms = 50
//!
//! [client]
//! url = "scgi:///var/run/rtorrent.sock"
//!
//! [announce]
//! local = "http://tracker.local/announce"
//! pub = ["http://a.example.com/announce", "udp://b.example.com:6969"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::deploy::DEFAULT_SETTLE;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown tracker alias {0:?}")]
    UnknownAlias(String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// One or several announce URLs behind an alias.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TrackerAlias {
    One(String),
    Many(Vec<String>),
}

impl TrackerAlias {
    pub fn urls(&self) -> &[String] {
        match self {
            TrackerAlias::One(url) => std::slice::from_ref(url),
            TrackerAlias::Many(urls) => urls,
        }
    }
}

/// A tracker argument resolved to its announce URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tracker {
    /// The alias name, or the second-level domain of a literal URL.
    pub alias: String,
    /// Announce URLs; never empty.
    pub urls: Vec<String>,
}

impl Tracker {
    /// A tracker given as a literal announce URL.
    pub fn from_url(url: &str) -> Self {
        Self {
            alias: url_alias(url),
            urls: vec![url.to_string()],
        }
    }

    pub fn announce(&self) -> &str {
        self.urls.first().map(String::as_str).unwrap_or_default()
    }
}

/// Short name for an announce URL: the second-level domain of its host.
///
/// `http://tracker.example.com:6969/announce` becomes `example`; a bare host
/// name or address is used whole.
pub fn url_alias(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = host.split(':').next().unwrap_or_default();

    if host.parse::<std::net::Ipv4Addr>().is_ok() {
        return host.to_string();
    }

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    match labels.as_slice() {
        [] => "tracker".to_string(),
        [only] => only.to_string(),
        [.., sld, _] => sld.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// XML-RPC endpoint of rTorrent.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory receiving magnet metafiles; `~` is expanded.
    #[serde(default)]
    pub magnet_watch: Option<PathBuf>,

    /// Overrides the `created by` signature.
    #[serde(default)]
    pub created_by: Option<String>,

    /// Milliseconds to wait between loading a metafile and verifying it.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default)]
    pub client: ClientConfig,

    /// Tracker aliases usable in place of announce URLs.
    #[serde(default)]
    pub announce: BTreeMap<String, TrackerAlias>,
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            magnet_watch: None,
            created_by: None,
            settle_ms: default_settle_ms(),
            client: ClientConfig::default(),
            announce: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads `path`, or the default location when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_path() {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => {
                    debug!("no configuration file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;

        for (alias, urls) in &config.announce {
            if urls.urls().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "tracker alias {alias:?} has no URLs"
                )));
            }
        }

        Ok(config)
    }

    /// The magnet watch directory with a leading `~` expanded.
    pub fn magnet_watch(&self) -> Option<PathBuf> {
        self.magnet_watch.as_deref().map(expand_home)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn created_by(&self) -> String {
        self.created_by
            .clone()
            .unwrap_or_else(|| format!("mktor {}", env!("CARGO_PKG_VERSION")))
    }

    /// Resolves tracker arguments, one [`Tracker`] per argument.
    ///
    /// Anything containing `://` is a URL and kept as is; everything else
    /// must be an alias from the `[announce]` table.
    pub fn resolve_trackers<S: AsRef<str>>(
        &self,
        args: &[S],
    ) -> Result<Vec<Tracker>, ConfigError> {
        args.iter()
            .map(|arg| {
                let arg = arg.as_ref();
                if arg.contains("://") {
                    return Ok(Tracker::from_url(arg));
                }
                let alias = self
                    .announce
                    .get(arg)
                    .ok_or_else(|| ConfigError::UnknownAlias(arg.to_string()))?;
                Ok(Tracker {
                    alias: arg.to_string(),
                    urls: alias.urls().to_vec(),
                })
            })
            .collect()
    }
}

/// `config.toml` in the platform config directory.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "mktor").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
