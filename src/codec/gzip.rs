//! Gzip inflate/deflate for datagram payloads (spec §4.3.4) and address
//! book subscription bodies. I2P also defines a zero-compression gzip frame
//! (`i2pd`'s `GzipNoCompression`) used when a datagram is already small
//! enough that compression would only add overhead; we expose both.

use std::io::{Read, Write};

use flate2::write::GzEncoder;
use flate2::read::GzDecoder;
use flate2::Compression;

use crate::error::{Error, Result};

pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
	let mut enc = GzEncoder::new(Vec::new(), Compression::default());
	enc.write_all(data)?;
	Ok(enc.finish()?)
}

/// Equivalent to i2pd's `GzipNoCompression`: a valid gzip stream whose
/// DEFLATE blocks are stored, not compressed. Used for small datagrams
/// where the fixed gzip header overhead already exceeds any savings.
pub fn deflate_stored(data: &[u8]) -> Result<Vec<u8>> {
	let mut enc = GzEncoder::new(Vec::new(), Compression::none());
	enc.write_all(data)?;
	Ok(enc.finish()?)
}

pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
	let mut dec = GzDecoder::new(data);
	let mut out = Vec::new();
	dec.read_to_end(&mut out)
		.map_err(|e| Error::parse(format!("bad gzip stream: {e}")))?;
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip() {
		let data = b"the quick brown fox jumps over the lazy dog".repeat(4);
		let compressed = deflate(&data).unwrap();
		assert_eq!(inflate(&compressed).unwrap(), data);
	}

	#[test]
	fn stored_round_trip() {
		let data = b"short";
		let compressed = deflate_stored(data).unwrap();
		assert_eq!(inflate(&compressed).unwrap(), data);
	}
}
