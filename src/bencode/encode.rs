use super::error::BencodeError;
use super::value::Value;
use std::io::Write;

/// Encodes a bencode value to a byte vector.
///
/// Dictionary keys are written in lexicographic order, so two equal values
/// always produce identical bytes.
///
/// # Examples
///
/// ```
/// use mktor::bencode::{encode, Value};
///
/// let mut dict = Value::dict();
/// dict.insert("b", 2i64);
/// dict.insert("a", "one");
/// assert_eq!(encode(&dict).unwrap(), b"d1:a3:one1:bi2ee");
/// ```
pub fn encode(value: &Value) -> Result<Vec<u8>, BencodeError> {
    let mut buf = Vec::new();
    encode_into(value, &mut buf)?;
    Ok(buf)
}

/// Encodes a bencode value into any writer.
pub fn encode_into<W: Write>(value: &Value, writer: &mut W) -> Result<(), BencodeError> {
    match value {
        Value::Integer(i) => {
            write!(writer, "i{}e", i)?;
        }
        Value::Bytes(b) => {
            write_bytes(b, writer)?;
        }
        Value::List(l) => {
            writer.write_all(b"l")?;
            for item in l {
                encode_into(item, writer)?;
            }
            writer.write_all(b"e")?;
        }
        Value::Dict(d) => {
            writer.write_all(b"d")?;
            for (key, val) in d {
                write_bytes(key, writer)?;
                encode_into(val, writer)?;
            }
            writer.write_all(b"e")?;
        }
    }
    Ok(())
}

fn write_bytes<W: Write>(bytes: &[u8], writer: &mut W) -> Result<(), BencodeError> {
    write!(writer, "{}:", bytes.len())?;
    writer.write_all(bytes)?;
    Ok(())
}
