//! Signing/crypto key type enums and the variable-length certificate that
//! selects between them, per spec §3.

use crate::codec::{Reader, Writer};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningKeyType {
	DsaSha1,
	EcdsaSha256P256,
	EcdsaSha384P384,
	EcdsaSha512P521,
	RsaSha2562048,
	RsaSha3843072,
	RsaSha5124096,
	EdDsaSha512Ed25519,
	Gost2001Cpsha256,
	Gost2012Sha512,
	RedDsaSha512Ed25519,
	Unknown(u16),
}

impl SigningKeyType {
	pub fn from_code(code: u16) -> Self {
		use SigningKeyType::*;
		match code {
			0 => DsaSha1,
			1 => EcdsaSha256P256,
			2 => EcdsaSha384P384,
			3 => EcdsaSha512P521,
			4 => RsaSha2562048,
			5 => RsaSha3843072,
			6 => RsaSha5124096,
			7 => EdDsaSha512Ed25519,
			9 => Gost2001Cpsha256,
			10 => Gost2012Sha512,
			11 => RedDsaSha512Ed25519,
			other => Unknown(other),
		}
	}

	pub fn code(&self) -> u16 {
		use SigningKeyType::*;
		match self {
			DsaSha1 => 0,
			EcdsaSha256P256 => 1,
			EcdsaSha384P384 => 2,
			EcdsaSha512P521 => 3,
			RsaSha2562048 => 4,
			RsaSha3843072 => 5,
			RsaSha5124096 => 6,
			EdDsaSha512Ed25519 => 7,
			Gost2001Cpsha256 => 9,
			Gost2012Sha512 => 10,
			RedDsaSha512Ed25519 => 11,
			Unknown(v) => *v,
		}
	}

	/// Length in bytes of the signature this key type produces. Used to
	/// validate `sig` length before attempting verification.
	pub fn signature_len(&self) -> usize {
		use SigningKeyType::*;
		match self {
			DsaSha1 => 40,
			EcdsaSha256P256 => 64,
			EcdsaSha384P384 => 96,
			EcdsaSha512P521 => 132,
			RsaSha2562048 => 256,
			RsaSha3843072 => 384,
			RsaSha5124096 => 512,
			EdDsaSha512Ed25519 => 64,
			RedDsaSha512Ed25519 => 64,
			Gost2001Cpsha256 | Gost2012Sha512 | Unknown(_) => 0,
		}
	}

	/// Length in bytes of the public key material, which is how much of the
	/// (padded) 128-byte signing-key field or certificate tail this type
	/// actually occupies.
	pub fn public_key_len(&self) -> usize {
		use SigningKeyType::*;
		match self {
			DsaSha1 => 128,
			EcdsaSha256P256 => 64,
			EcdsaSha384P384 => 96,
			EcdsaSha512P521 => 132,
			RsaSha2562048 => 256,
			RsaSha3843072 => 384,
			RsaSha5124096 => 512,
			EdDsaSha512Ed25519 => 32,
			RedDsaSha512Ed25519 => 32,
			Gost2001Cpsha256 | Gost2012Sha512 | Unknown(_) => 0,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CryptoKeyType {
	ElGamal,
	EciesP256,
	EciesX25519AeadRatchet,
	Unknown(u16),
}

impl CryptoKeyType {
	pub fn from_code(code: u16) -> Self {
		use CryptoKeyType::*;
		match code {
			0 => ElGamal,
			1 => EciesP256,
			4 => EciesX25519AeadRatchet,
			other => Unknown(other),
		}
	}

	pub fn code(&self) -> u16 {
		use CryptoKeyType::*;
		match self {
			ElGamal => 0,
			EciesP256 => 1,
			EciesX25519AeadRatchet => 4,
			Unknown(v) => *v,
		}
	}
}

/// Certificate trailer of an `Identity`: either `Null` (implies
/// DSA-SHA1/ElGamal), a `Key` certificate naming the signing/crypto types,
/// or an unrecognised-but-preserved type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Certificate {
	Null,
	Key {
		signing_key_type: SigningKeyType,
		crypto_key_type: CryptoKeyType,
		/// Any trailing bytes beyond the first two u16 fields, preserved
		/// verbatim for round-trip (e.g. a straddling P-521 key tail).
		extra: Vec<u8>,
	},
	Unknown { cert_type: u8, body: Vec<u8> },
}

const CERT_TYPE_NULL: u8 = 0;
const CERT_TYPE_KEY: u8 = 5;

impl Certificate {
	pub fn cert_type(&self) -> u8 {
		match self {
			Certificate::Null => CERT_TYPE_NULL,
			Certificate::Key { .. } => CERT_TYPE_KEY,
			Certificate::Unknown { cert_type, .. } => *cert_type,
		}
	}

	pub fn body_len(&self) -> usize {
		match self {
			Certificate::Null => 0,
			Certificate::Key { extra, .. } => 4 + extra.len(),
			Certificate::Unknown { body, .. } => body.len(),
		}
	}

	pub fn write_to(&self, w: &mut Writer) {
		w.put_u8(self.cert_type());
		w.put_u16(self.body_len() as u16);
		match self {
			Certificate::Null => {}
			Certificate::Key {
				signing_key_type,
				crypto_key_type,
				extra,
			} => {
				w.put_u16(signing_key_type.code());
				w.put_u16(crypto_key_type.code());
				w.put_bytes(extra);
			}
			Certificate::Unknown { body, .. } => {
				w.put_bytes(body);
			}
		}
	}

	pub fn parse(r: &mut Reader) -> Result<Certificate> {
		let cert_type = r.take_u8()?;
		let len = r.take_u16()? as usize;
		let body = r.take(len)?;
		match cert_type {
			CERT_TYPE_NULL if len == 0 => Ok(Certificate::Null),
			CERT_TYPE_KEY if len >= 4 => {
				let signing_key_type = SigningKeyType::from_code(u16::from_be_bytes([
					body[0], body[1],
				]));
				let crypto_key_type =
					CryptoKeyType::from_code(u16::from_be_bytes([body[2], body[3]]));
				Ok(Certificate::Key {
					signing_key_type,
					crypto_key_type,
					extra: body[4..].to_vec(),
				})
			}
			other => Ok(Certificate::Unknown {
				cert_type: other,
				body: body.to_vec(),
			}),
		}
	}

	/// Signing key type implied by this certificate (`DsaSha1` for `Null`).
	pub fn signing_key_type(&self) -> SigningKeyType {
		match self {
			Certificate::Null => SigningKeyType::DsaSha1,
			Certificate::Key {
				signing_key_type, ..
			} => *signing_key_type,
			Certificate::Unknown { .. } => SigningKeyType::Unknown(0xFFFF),
		}
	}

	pub fn crypto_key_type(&self) -> CryptoKeyType {
		match self {
			Certificate::Null => CryptoKeyType::ElGamal,
			Certificate::Key { crypto_key_type, .. } => *crypto_key_type,
			Certificate::Unknown { .. } => CryptoKeyType::Unknown(0xFFFF),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn null_cert_round_trip() {
		let cert = Certificate::Null;
		let mut w = Writer::new();
		cert.write_to(&mut w);
		let buf = w.into_vec();
		assert_eq!(buf, vec![0, 0, 0]);
		let mut r = Reader::new(&buf);
		assert_eq!(Certificate::parse(&mut r).unwrap(), cert);
	}

	#[test]
	fn key_cert_round_trip() {
		let cert = Certificate::Key {
			signing_key_type: SigningKeyType::EdDsaSha512Ed25519,
			crypto_key_type: CryptoKeyType::EciesX25519AeadRatchet,
			extra: vec![],
		};
		let mut w = Writer::new();
		cert.write_to(&mut w);
		let buf = w.into_vec();
		let mut r = Reader::new(&buf);
		assert_eq!(Certificate::parse(&mut r).unwrap(), cert);
	}

	#[test]
	fn unknown_signing_type_is_retained() {
		let cert = Certificate::Key {
			signing_key_type: SigningKeyType::from_code(200),
			crypto_key_type: CryptoKeyType::ElGamal,
			extra: vec![1, 2, 3],
		};
		let mut w = Writer::new();
		cert.write_to(&mut w);
		let buf = w.into_vec();
		let mut r = Reader::new(&buf);
		let parsed = Certificate::parse(&mut r).unwrap();
		assert_eq!(parsed, cert);
		assert_eq!(parsed.signing_key_type().code(), 200);
	}
}
