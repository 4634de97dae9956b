//! Key encoding utilities.
//!
//! - Longest-common-prefix splitting used by every trie split and merge
//! - Fixed-width encoding that makes `Number` keys sort numerically

use crate::error::{Error, Result};
use crate::manifest::IndexType;

/// Width of an encoded `Number` key, enough for any `i64` including its sign.
pub const NUMBER_KEY_WIDTH: usize = 20;

/// Compute the shared prefix length between two strings, in bytes.
///
/// The result always lands on a character boundary of both inputs, so the
/// prefix and both remainders are valid strings.
pub fn common_prefix_len(a: &str, b: &str) -> usize {
    let bytes = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    let mut len = bytes;
    while !a.is_char_boundary(len) {
        len -= 1;
    }
    len
}

/// Split two names around their longest common prefix.
///
/// Returns `(prefix, a_suffix, b_suffix)`.
pub fn split_common_prefix<'a, 'b>(a: &'a str, b: &'b str) -> (&'a str, &'a str, &'b str) {
    let len = common_prefix_len(a, b);
    (&a[..len], &a[len..], &b[len..])
}

/// First byte of a name, `None` for the empty name.
#[inline]
pub(crate) fn first_byte(name: &str) -> Option<u8> {
    name.as_bytes().first().copied()
}

/// Encode an integer as a zero-padded 20 digit decimal string.
///
/// Byte order of the encoded form equals numeric order for non-negative
/// values. Negative values carry a leading `-` and sort before all of them.
pub fn encode_number(value: i64) -> String {
    format!("{value:0width$}", width = NUMBER_KEY_WIDTH)
}

/// Parse a caller key into its stored `Number` form.
pub fn encode_number_key(key: &str) -> Result<String> {
    key.parse::<i64>()
        .map(encode_number)
        .map_err(|_| Error::KeyNotANumber(key.to_string()))
}

/// Decode a stored `Number` key.
pub fn decode_number_key(stored: &str) -> Result<i64> {
    stored
        .parse::<i64>()
        .map_err(|_| Error::KeyNotANumber(stored.to_string()))
}

/// Apply the key encoding rule of an index type.
pub fn encode_key(index_type: IndexType, key: &str) -> Result<String> {
    match index_type {
        IndexType::Number => encode_number_key(key),
        IndexType::String | IndexType::Bytes | IndexType::Map | IndexType::List => {
            Ok(key.to_string())
        }
    }
}
