//! Torrent metafiles: building, editing and augmenting `.torrent` files ([BEP-3]).
//!
//! A metafile goes through up to three in-memory stages before it is written:
//!
//! 1. [`BuildRequest::build`] hashes a file or directory into a [`Descriptor`].
//! 2. [`fields::apply`] performs cross-seed labeling and `--set` edits.
//! 3. [`add_fast_resume`] optionally derives a copy carrying libtorrent
//!    resume data, so a client can seed without rehashing.
//!
//! Magnet links bypass all of this: [`MagnetLink`] turns one into a
//! single-key metafile for a watch directory.
//!
//! # Examples
//!
//! ```no_run
//! use mktor::metafile::{fields, BuildRequest, FieldEdit, Mutations};
//! use mktor::progress::NoProgress;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut descriptor = BuildRequest::new("album", vec!["http://tracker.example.com/announce".into()])
//!     .build(&mut NoProgress)?;
//!
//! let mutations = Mutations {
//!     edits: vec!["info.source=EXAMPLE".parse::<FieldEdit>()?],
//!     ..Default::default()
//! };
//! fields::apply(&mut descriptor, &mutations)?;
//!
//! println!("{}", descriptor.info_hash()?);
//! # Ok(())
//! # }
//! ```
//!
//! # Info hash stability
//!
//! Only the `info` dictionary contributes to the [`InfoHash`]. Top-level
//! edits, the `comment` and the resume data never change it; anything added
//! below `info` does.
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod builder;
mod descriptor;
mod error;
pub mod fields;
mod info_hash;
mod magnet;
mod resume;
mod walk;

pub use builder::{
    cross_seed_value, ensure_torrent_suffix, insert_before_suffix, piece_length_for,
    resolve_output_path, root_name_for, BuildRequest, CROSS_SEED_FIELD, PIECE_EXP_MAX,
    PIECE_EXP_MIN, PIECE_LENGTH_LIMIT, TORRENT_SUFFIX,
};
pub use descriptor::{Descriptor, FileSpan};
pub use error::MetafileError;
pub use fields::{CrossSeed, FieldEdit, Mutations};
pub use info_hash::InfoHash;
pub use magnet::{is_magnet, MagnetLink, MAGNET_KEY};
pub use resume::{add_fast_resume, resume_path, RESUME_FIELD};
pub use walk::{SourceFile, Walker, DEFAULT_IGNORE};
