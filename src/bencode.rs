//! Bencode encoding and decoding ([BEP-3]).
//!
//! Every metafile this crate produces is a bencoded dictionary. The encoder
//! always emits dictionary keys in sorted order, which makes the encoding
//! canonical: decoding and re-encoding a metafile yields the same bytes, and
//! so the same info hash.
//!
//! # Examples
//!
//! ```
//! use mktor::bencode::{decode, encode, Value};
//!
//! let mut value = Value::dict();
//! value.insert("announce", "http://tracker.example.com/announce");
//! value.insert("creation date", 1_700_000_000i64);
//!
//! let bytes = encode(&value).unwrap();
//! assert_eq!(decode(&bytes).unwrap(), value);
//! ```
//!
//! Nested dictionaries can be edited in place:
//!
//! ```
//! use mktor::bencode::{decode, Value};
//!
//! let mut value = decode(b"d4:infod4:name4:testee").unwrap();
//! value.get_mut(b"info").unwrap().insert("private", 1i64);
//! assert_eq!(value.get(b"info").and_then(|i| i.get(b"private")), Some(&Value::Integer(1)));
//! ```
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod decode;
mod encode;
mod error;
mod file;
mod value;

pub use decode::decode;
pub use encode::{encode, encode_into};
pub use error::BencodeError;
pub use file::{read_file, write_file};
pub use value::Value;
