//! I2P's Base32 and Base64 alphabets.
//!
//! I2P uses the standard RFC 4648 Base32 alphabet lower-cased and unpadded,
//! and a Base64 alphabet that substitutes `-` and `~` for `+` and `/` so
//! that destinations round-trip safely through filenames and URLs.

use data_encoding::{Encoding, Specification};
use lazy_static::lazy_static;

use crate::error::{Error, Result};

lazy_static! {
	pub static ref BASE32_I2P: Encoding = {
		let mut spec = Specification::new();
		spec.symbols.push_str("abcdefghijklmnopqrstuvwxyz234567");
		spec.padding = None;
		spec.encoding().unwrap()
	};
	pub static ref BASE64_I2P: Encoding = {
		let mut spec = Specification::new();
		spec.symbols
			.push_str("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-~");
		spec.padding = Some('=');
		spec.encoding().unwrap()
	};
}

/// Lower-case, unpadded Base32 as used for `.b32.i2p` addresses.
pub fn base32_encode(data: &[u8]) -> String {
	BASE32_I2P.encode(data)
}

pub fn base32_decode(s: &str) -> Result<Vec<u8>> {
	BASE32_I2P
		.decode(s.as_bytes())
		.map_err(|e| Error::parse(format!("bad base32: {e}")))
}

/// I2P's modified Base64 alphabet (`-`/`~` instead of `+`/`/`).
pub fn base64_encode(data: &[u8]) -> String {
	BASE64_I2P.encode(data)
}

pub fn base64_decode(s: &str) -> Result<Vec<u8>> {
	BASE64_I2P
		.decode(s.as_bytes())
		.map_err(|e| Error::parse(format!("bad base64: {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn base32_round_trip() {
		let input: [u8; 25] = [
			0x53, 0xD3, 0x60, 0xFA, 0xF9, 0x58, 0xD0, 0x5E, 0x41, 0xA9, 0x6C, 0xF1, 0x9F, 0xC4,
			0x0E, 0x23, 0x9B, 0xCA, 0xB1, 0x61, 0xA7, 0x33, 0xCF, 0x1F, 0x30,
		];
		let encoded = base32_encode(&input);
		assert_eq!(encoded, "kpjwb6xzldif4qnjntyz7raoeon4vmlbu4z46hzq");
		assert_eq!(base32_decode(&encoded).unwrap(), input.to_vec());
	}

	#[test]
	fn base32_round_trip_arbitrary() {
		for len in [0usize, 1, 7, 16, 32, 100] {
			let data: Vec<u8> = (0..len).map(|i| (i * 37 + 5) as u8).collect();
			let encoded = base32_encode(&data);
			assert_eq!(base32_decode(&encoded).unwrap(), data);
		}
	}

	#[test]
	fn base64_round_trip() {
		for len in [0usize, 1, 3, 4, 387, 768] {
			let data: Vec<u8> = (0..len).map(|i| (i * 91 + 3) as u8).collect();
			let encoded = base64_encode(&data);
			assert_eq!(base64_decode(&encoded).unwrap(), data);
		}
	}

	#[test]
	fn base64_uses_i2p_alphabet() {
		// bytes chosen so the standard alphabet would emit '+' and '/'
		let data = [0xFB, 0xFF, 0xBF];
		let encoded = base64_encode(&data);
		assert!(!encoded.contains('+'));
		assert!(!encoded.contains('/'));
	}
}
