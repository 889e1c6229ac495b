//! mktor - create BitTorrent metafiles and hand them to rTorrent
//!
//! This library hashes a file or directory into a `.torrent` metafile,
//! optionally adds libtorrent fast-resume data, and loads the result into a
//! running rTorrent instance over XML-RPC without ever loading it twice.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 Bencode encoding/decoding
//! - [`metafile`] - Metafile building, field edits, fast-resume data, magnet links
//! - [`rpc`] - XML-RPC over HTTP or SCGI
//! - [`deploy`] - Idempotent probe/submit/settle/verify handshake
//! - [`pipeline`] - Argument classification, planning and execution
//! - [`config`] - TOML configuration and tracker aliases
//! - [`progress`] - Hashing progress reporting
//! - [`size`] - Human-readable byte sizes

pub mod bencode;
pub mod config;
pub mod deploy;
mod error;
pub mod metafile;
pub mod pipeline;
pub mod progress;
pub mod rpc;
pub mod size;

pub use bencode::{decode, encode, BencodeError, Value};
pub use config::{Config, ConfigError, Tracker};
pub use deploy::{deploy, Action, DeployError, DeploymentTarget, Outcome};
pub use error::Error;
pub use metafile::{
    add_fast_resume, BuildRequest, CrossSeed, Descriptor, FieldEdit, InfoHash, MagnetLink,
    MetafileError, Mutations,
};
pub use pipeline::{Input, Options, Plan};
pub use progress::{ConsoleProgress, NoProgress, Progress};
pub use rpc::{ClientRpc, RpcError, XmlRpcClient};
pub use size::parse_size;
