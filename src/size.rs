//! Human-readable byte sizes for the piece size bounds.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid size {0:?} (expected a byte count, optionally suffixed with K, M or G)")]
pub struct ParseSizeError(String);

/// Parses `"65536"`, `"64K"`, `"4MiB"`, `"1gb"` and the like into bytes.
///
/// Suffixes are binary multiples and case insensitive.
pub fn parse_size(raw: &str) -> Result<u64, ParseSizeError> {
    let err = || ParseSizeError(raw.to_string());
    let s = raw.trim();

    let digits_end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(digits_end);
    if number.is_empty() {
        return Err(err());
    }
    let number: u64 = number.parse().map_err(|_| err())?;

    let suffix = suffix.trim().to_ascii_lowercase();
    let unit = suffix
        .strip_suffix("ib")
        .or_else(|| suffix.strip_suffix('b'))
        .unwrap_or(&suffix);

    let shift = match unit {
        "" => 0,
        "k" => 10,
        "m" => 20,
        "g" => 30,
        _ => return Err(err()),
    };

    number.checked_mul(1 << shift).ok_or_else(err)
}
