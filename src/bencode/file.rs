use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::decode::decode;
use super::encode::encode_into;
use super::error::BencodeError;
use super::value::Value;

/// Reads and decodes a bencoded file.
pub fn read_file(path: impl AsRef<Path>) -> Result<Value, BencodeError> {
    let data = std::fs::read(path)?;
    decode(&data)
}

/// Encodes `value` and writes it to `path`, replacing any existing file.
pub fn write_file(path: impl AsRef<Path>, value: &Value) -> Result<(), BencodeError> {
    let mut writer = BufWriter::new(File::create(path)?);
    encode_into(value, &mut writer)?;
    writer.flush()?;
    Ok(())
}
