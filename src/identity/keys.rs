//! `Identity`, `IdentityEx` and `PrivateKeys` (spec §3, §4.1).

use std::sync::Mutex;

use rand::RngCore;

use crate::codec::{Reader, Writer};
use crate::error::{Error, Result};
use crate::identity::cert::{Certificate, CryptoKeyType, SigningKeyType};
use crate::identity::hash::IdentHash;
use crate::identity::verify::Verifier;

pub const IDENTITY_PUB_LEN: usize = 256;
pub const IDENTITY_SIGNING_LEN: usize = 128;
pub const IDENTITY_FIXED_LEN: usize = IDENTITY_PUB_LEN + IDENTITY_SIGNING_LEN;

/// The 387-byte (for a `Null` certificate) fixed-layout identity:
/// `pub(256) || signingKey(128) || certificate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
	pub crypto_public_key: [u8; IDENTITY_PUB_LEN],
	/// 128-byte padded signing-key field; for non-DSA types the key
	/// material occupies the tail (high bytes), the rest is padding.
	pub signing_public_key: [u8; IDENTITY_SIGNING_LEN],
	pub certificate: Certificate,
}

impl Identity {
	pub fn full_len(&self) -> usize {
		IDENTITY_FIXED_LEN + 3 + self.certificate.body_len()
	}

	pub fn to_buffer(&self) -> Vec<u8> {
		let mut w = Writer::with_capacity(self.full_len());
		w.put_bytes(&self.crypto_public_key);
		w.put_bytes(&self.signing_public_key);
		self.certificate.write_to(&mut w);
		w.into_vec()
	}

	pub fn from_buffer(buf: &[u8]) -> Result<Identity> {
		let mut r = Reader::new(buf);
		let crypto_public_key: [u8; IDENTITY_PUB_LEN] = r.take(IDENTITY_PUB_LEN)?.try_into().unwrap();
		let signing_public_key: [u8; IDENTITY_SIGNING_LEN] =
			r.take(IDENTITY_SIGNING_LEN)?.try_into().unwrap();
		let certificate = Certificate::parse(&mut r)?;
		Ok(Identity {
			crypto_public_key,
			signing_public_key,
			certificate,
		})
	}

	pub fn signing_key_type(&self) -> SigningKeyType {
		self.certificate.signing_key_type()
	}

	pub fn crypto_key_type(&self) -> CryptoKeyType {
		self.certificate.crypto_key_type()
	}

	/// Extracts the raw public-key bytes for the signing key type, locating
	/// them at the tail of the padded 128-byte field (spec §4.1). Returns
	/// an empty slice for unsupported/zero-length types.
	pub fn signing_public_key_bytes(&self) -> Vec<u8> {
		let len = self.signing_key_type().public_key_len();
		if len == 0 || len > IDENTITY_SIGNING_LEN {
			return Vec::new();
		}
		self.signing_public_key[IDENTITY_SIGNING_LEN - len..].to_vec()
	}
}

/// `Identity` plus an owned certificate body and a memoised `IdentHash`.
/// The verifier is constructed lazily on first `verify()` call and may be
/// dropped afterwards via `drop_verifier()` to save memory (spec §9).
pub struct IdentityEx {
	identity: Identity,
	hash: IdentHash,
	verifier: Mutex<Option<Verifier>>,
}

impl IdentityEx {
	pub fn new(identity: Identity) -> Self {
		let hash = IdentHash::of(&identity.to_buffer());
		IdentityEx {
			identity,
			hash,
			verifier: Mutex::new(None),
		}
	}

	pub fn from_buffer(buf: &[u8]) -> Result<Self> {
		Ok(Self::new(Identity::from_buffer(buf)?))
	}

	pub fn to_buffer(&self) -> Vec<u8> {
		self.identity.to_buffer()
	}

	pub fn identity(&self) -> &Identity {
		&self.identity
	}

	pub fn hash(&self) -> &IdentHash {
		&self.hash
	}

	pub fn verify(&self, data: &[u8], sig: &[u8]) -> bool {
		let expected_len = self.identity.signing_key_type().signature_len();
		if expected_len != 0 && sig.len() != expected_len {
			return false;
		}
		let mut guard = self.verifier.lock().unwrap();
		if guard.is_none() {
			let key_bytes = self.identity.signing_public_key_bytes();
			*guard = Some(Verifier::construct(self.identity.signing_key_type(), &key_bytes));
		}
		guard.as_ref().unwrap().verify(data, sig)
	}

	/// Drop the cached verifier to reclaim memory; it is rebuilt lazily on
	/// the next `verify()` call.
	pub fn drop_verifier(&self) {
		*self.verifier.lock().unwrap() = None;
	}
}

impl Clone for IdentityEx {
	fn clone(&self) -> Self {
		IdentityEx {
			identity: self.identity.clone(),
			hash: self.hash,
			verifier: Mutex::new(None),
		}
	}
}

impl std::fmt::Debug for IdentityEx {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("IdentityEx")
			.field("hash", &self.hash)
			.field("signing_key_type", &self.identity.signing_key_type())
			.finish()
	}
}

/// The offline signature block an offline-signed destination carries
/// instead of signing directly with the identity key (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineSignature {
	pub expires: u32,
	pub transient_key_type: u16,
	pub transient_public_key: Vec<u8>,
	/// Signature over `expires || transientKeyType || transientPubKey` made
	/// by the parent identity key.
	pub signature: Vec<u8>,
}

/// Owns an `IdentityEx`, the encryption private key, the (possibly short)
/// signing private key, and an optional offline signature block.
/// Serialised as `publicPart || encPriv(256) || sPriv(sPrivLen) || [offlineSig]`.
pub struct PrivateKeys {
	pub identity: IdentityEx,
	pub encryption_private_key: [u8; 256],
	pub signing_private_key: Vec<u8>,
	pub offline_signature: Option<OfflineSignature>,
}

impl PrivateKeys {
	pub fn to_buffer(&self) -> Vec<u8> {
		let mut w = Writer::with_capacity(512);
		w.put_bytes(&self.identity.to_buffer());
		w.put_bytes(&self.encryption_private_key);
		w.put_bytes(&self.signing_private_key);
		if let Some(off) = &self.offline_signature {
			w.put_u32(off.expires);
			w.put_u16(off.transient_key_type);
			w.put_bytes(&off.transient_public_key);
			w.put_bytes(&off.signature);
		}
		w.into_vec()
	}

	pub fn from_buffer(buf: &[u8]) -> Result<PrivateKeys> {
		let identity = IdentityEx::from_buffer(buf)?;
		let public_len = identity.identity().full_len();
		let mut r = Reader::new(buf);
		r.take(public_len)?;
		let encryption_private_key: [u8; 256] = r.take(256)?.try_into().unwrap();
		let spriv_len = signing_private_key_len(identity.identity().signing_key_type());
		let signing_private_key = r.take(spriv_len)?.to_vec();

		let offline_signature = if r.remaining() > 0 {
			let expires = r.take_u32()?;
			let transient_key_type = r.take_u16()?;
			let transient_len =
				SigningKeyType::from_code(transient_key_type).public_key_len().max(32);
			let transient_public_key = r.take(transient_len)?.to_vec();
			let sig_len = SigningKeyType::from_code(transient_key_type).signature_len().max(64);
			let signature = r.take(sig_len.min(r.remaining()))?.to_vec();
			Some(OfflineSignature {
				expires,
				transient_key_type,
				transient_public_key,
				signature,
			})
		} else {
			None
		};

		Ok(PrivateKeys {
			identity,
			encryption_private_key,
			signing_private_key,
			offline_signature,
		})
	}

	/// Generates a fresh Ed25519/ECIES-X25519 destination, the default
	/// combination SAM's `DEST GENERATE` produces without an explicit
	/// `SIGNATURE_TYPE`.
	pub fn generate_ed25519() -> PrivateKeys {
		use ed25519_dalek::SigningKey;
		use rand::rngs::OsRng;

		let mut csprng = OsRng;
		let signing_key = SigningKey::generate(&mut csprng);
		let verifying_key = signing_key.verifying_key();

		let mut signing_public_key = [0u8; IDENTITY_SIGNING_LEN];
		signing_public_key[IDENTITY_SIGNING_LEN - 32..].copy_from_slice(verifying_key.as_bytes());

		let mut crypto_private = [0u8; 256];
		OsRng.fill_bytes(&mut crypto_private[0..32]);
		// X25519 private scalar lives in the low 32 bytes; the rest is
		// padding to stay layout-compatible with ElGamal-sized keys.
		let x25519_secret = x25519_dalek::StaticSecret::from(
			<[u8; 32]>::try_from(&crypto_private[0..32]).unwrap(),
		);
		let x25519_public = x25519_dalek::PublicKey::from(&x25519_secret);
		let mut crypto_public_key = [0u8; IDENTITY_PUB_LEN];
		crypto_public_key[0..32].copy_from_slice(x25519_public.as_bytes());

		let identity = Identity {
			crypto_public_key,
			signing_public_key,
			certificate: Certificate::Key {
				signing_key_type: SigningKeyType::EdDsaSha512Ed25519,
				crypto_key_type: CryptoKeyType::EciesX25519AeadRatchet,
				extra: vec![],
			},
		};

		PrivateKeys {
			identity: IdentityEx::new(identity),
			encryption_private_key: crypto_private,
			signing_private_key: signing_key.to_bytes().to_vec(),
			offline_signature: None,
		}
	}

	pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
		match self.identity.identity().signing_key_type() {
			SigningKeyType::EdDsaSha512Ed25519 => {
				use ed25519_dalek::{Signer, SigningKey};
				let key_bytes: [u8; 32] = self
					.signing_private_key
					.get(0..32)
					.ok_or_else(|| Error::CryptoMismatch("short ed25519 key".into()))?
					.try_into()
					.unwrap();
				let signing_key = SigningKey::from_bytes(&key_bytes);
				Ok(signing_key.sign(data).to_bytes().to_vec())
			}
			other => Err(Error::CryptoMismatch(format!(
				"signing not implemented for {:?}",
				other
			))),
		}
	}
}

fn signing_private_key_len(sig_type: SigningKeyType) -> usize {
	match sig_type {
		SigningKeyType::DsaSha1 => 20,
		SigningKeyType::EcdsaSha256P256 => 32,
		SigningKeyType::EcdsaSha384P384 => 48,
		SigningKeyType::EcdsaSha512P521 => 66,
		SigningKeyType::RsaSha2562048
		| SigningKeyType::RsaSha3843072
		| SigningKeyType::RsaSha5124096 => 0, // server never needs the RSA private exponent here
		SigningKeyType::EdDsaSha512Ed25519 | SigningKeyType::RedDsaSha512Ed25519 => 32,
		_ => 0,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identity_round_trip_all_zero_null_cert() {
		let identity = Identity {
			crypto_public_key: [0u8; IDENTITY_PUB_LEN],
			signing_public_key: [0u8; IDENTITY_SIGNING_LEN],
			certificate: Certificate::Null,
		};
		let buf = identity.to_buffer();
		assert_eq!(buf.len(), 387);
		let parsed = Identity::from_buffer(&buf).unwrap();
		assert_eq!(parsed, identity);
		assert_eq!(parsed.signing_key_type(), SigningKeyType::DsaSha1);
		assert_eq!(parsed.full_len(), 387);

		let ex = IdentityEx::new(parsed);
		let expect_hash = IdentHash::of(&buf);
		assert_eq!(ex.hash(), &expect_hash);
	}

	#[test]
	fn private_keys_round_trip_ed25519() {
		let pk = PrivateKeys::generate_ed25519();
		let buf = pk.to_buffer();
		let parsed = PrivateKeys::from_buffer(&buf).unwrap();
		assert_eq!(parsed.identity.hash(), pk.identity.hash());
		assert_eq!(parsed.encryption_private_key, pk.encryption_private_key);
		assert_eq!(parsed.signing_private_key, pk.signing_private_key);

		let sig = parsed.sign(b"hello").unwrap();
		assert!(parsed.identity.verify(b"hello", &sig));
		assert!(!parsed.identity.verify(b"goodbye", &sig));
	}
}
