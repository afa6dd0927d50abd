//! I2CP "mapping" format (spec §4.4.3's closing note): a flat key=value;
//! list, outer-length-prefixed by a big-endian `u16`. Used for I2CP session
//! options and for lease-set/destination property blocks. Any divergence
//! from this exact byte shape breaks interop, so encode/decode are kept in
//! lock-step here rather than reusing a generic serde mapping.

use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Encodes `entries` as `u16_len || "k1=v1;k2=v2;..."`.
pub fn encode(entries: &BTreeMap<String, String>) -> Vec<u8> {
	let mut body = String::new();
	for (k, v) in entries {
		body.push_str(k);
		body.push('=');
		body.push_str(v);
		body.push(';');
	}
	let bytes = body.into_bytes();
	let mut out = Vec::with_capacity(2 + bytes.len());
	out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
	out.extend_from_slice(&bytes);
	out
}

/// Decodes a `u16_len`-prefixed mapping block, returning the map and the
/// number of bytes consumed from `buf`.
pub fn decode(buf: &[u8]) -> Result<(BTreeMap<String, String>, usize)> {
	if buf.len() < 2 {
		return Err(Error::parse("mapping buffer too short for length prefix"));
	}
	let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
	if buf.len() < 2 + len {
		return Err(Error::parse("mapping buffer truncated"));
	}
	let body = std::str::from_utf8(&buf[2..2 + len]).map_err(|_| Error::parse("mapping body not utf8"))?;

	let mut out = BTreeMap::new();
	for entry in body.split(';') {
		if entry.is_empty() {
			continue;
		}
		let (k, v) = entry.split_once('=').ok_or_else(|| Error::parse(format!("malformed mapping entry {entry:?}")))?;
		out.insert(k.to_string(), v.to_string());
	}
	Ok((out, 2 + len))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_multiple_entries() {
		let mut entries = BTreeMap::new();
		entries.insert("i2cp.messageReliability".to_string(), "BestEffort".to_string());
		entries.insert("inbound.length".to_string(), "3".to_string());
		let wire = encode(&entries);
		let (decoded, consumed) = decode(&wire).unwrap();
		assert_eq!(consumed, wire.len());
		assert_eq!(decoded, entries);
	}

	#[test]
	fn empty_mapping_round_trips() {
		let entries = BTreeMap::new();
		let wire = encode(&entries);
		assert_eq!(wire, vec![0u8, 0u8]);
		let (decoded, consumed) = decode(&wire).unwrap();
		assert!(decoded.is_empty());
		assert_eq!(consumed, 2);
	}

	#[test]
	fn truncated_buffer_is_rejected() {
		assert!(decode(&[0, 5, b'a']).is_err());
	}

	#[test]
	fn decode_ignores_trailing_bytes_past_declared_length() {
		let mut entries = BTreeMap::new();
		entries.insert("a".to_string(), "b".to_string());
		let mut wire = encode(&entries);
		wire.extend_from_slice(b"trailing-garbage");
		let (decoded, consumed) = decode(&wire).unwrap();
		assert_eq!(decoded.get("a"), Some(&"b".to_string()));
		assert_eq!(consumed, 2 + "a=b;".len());
	}
}
