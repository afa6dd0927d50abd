//! Blinded public keys for encrypted lease sets (LS2 type 5), spec §3/§4.1.
//!
//! The blinding scheme derives, for a given base destination and calendar
//! date, a blinded verification key (published in the encrypted lease set's
//! outer signature) and — when constructed from the base `PrivateKeys` — the
//! matching blinded signing key. Both directions must agree:
//! `pub(blind(priv, D)) == blind_pub(pub, D)`.

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::scalar::Scalar;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{Error, Result};
use crate::identity::cert::SigningKeyType;
use crate::identity::hash::IdentHash;
use crate::identity::keys::PrivateKeys;

/// RFC 8032 §5.1.5: hash the 32-byte seed, clamp, and take it as a scalar.
/// This is the same derivation `ed25519-dalek`'s signer performs internally;
/// it is reproduced here because blinding needs the raw scalar, not just
/// signatures.
fn clamped_scalar_from_seed(seed: &[u8; 32]) -> Scalar {
	let mut hasher = Sha512::new();
	hasher.update(seed);
	let digest = hasher.finalize();
	let mut bytes = [0u8; 32];
	bytes.copy_from_slice(&digest[0..32]);
	bytes[0] &= 248;
	bytes[31] &= 127;
	bytes[31] |= 64;
	Scalar::from_bytes_mod_order(bytes)
}

fn hash_to_scalar(parts: &[&[u8]]) -> Scalar {
	let mut hasher = Sha512::new();
	for p in parts {
		hasher.update(p);
	}
	let digest = hasher.finalize();
	let mut wide = [0u8; 64];
	wide.copy_from_slice(&digest);
	Scalar::from_bytes_mod_order_wide(&wide)
}

fn domain_hash(label: &[u8], parts: &[&[u8]]) -> [u8; 32] {
	let mut hasher = Sha256::new();
	hasher.update(label);
	for p in parts {
		hasher.update(p);
	}
	let digest = hasher.finalize();
	let mut out = [0u8; 32];
	out.copy_from_slice(&digest);
	out
}

#[derive(Debug, Clone)]
pub struct BlindedPublicKey {
	pub base_sig_type: SigningKeyType,
	pub blinded_sig_type: SigningKeyType,
	pub base_public_key: [u8; 32],
}

impl BlindedPublicKey {
	pub fn from_base_public(base_sig_type: SigningKeyType, base_public_key: [u8; 32]) -> Self {
		BlindedPublicKey {
			base_sig_type,
			blinded_sig_type: SigningKeyType::RedDsaSha512Ed25519,
			base_public_key,
		}
	}

	fn credential(&self) -> [u8; 32] {
		domain_hash(
			b"credential",
			&[
				&self.base_sig_type.code().to_be_bytes(),
				&self.blinded_sig_type.code().to_be_bytes(),
				&self.base_public_key,
			],
		)
	}

	/// `subcredential = H("subcredential", credential, blindedPub)` — used
	/// by the destination to build the store hash for the encrypted lease
	/// set lookup.
	pub fn subcredential(&self, date: &str) -> [u8; 32] {
		let blinded_pub = self.blind_public(date);
		domain_hash(
			b"subcredential",
			&[&self.credential(), &blinded_pub],
		)
	}

	fn alpha(&self, date: &str) -> Scalar {
		let credential = self.credential();
		hash_to_scalar(&[b"I2PGenerateAlpha", &credential, date.as_bytes()])
	}

	/// Derive the blinded public verification key for calendar date `date`
	/// (`YYYYMMDD`, UTC).
	pub fn blind_public(&self, date: &str) -> [u8; 32] {
		let alpha = self.alpha(date);
		let base_point = CompressedEdwardsY(self.base_public_key)
			.decompress()
			.expect("valid ed25519 public point");
		let blinded_point = alpha * base_point;
		blinded_point.compress().to_bytes()
	}

	/// The store hash `H` an encrypted lease set is published/looked up
	/// under for date `date`.
	pub fn store_hash(&self, date: &str) -> IdentHash {
		IdentHash::new(self.subcredential(date))
	}

	/// Textual `b33` form: base32 of
	/// `flags(1) || sigType(2) || blindedSigType(2) || pubkey || checksum(4)`.
	/// Distinguishable from a plain `b32` address by length (> 52 chars).
	pub fn to_b33(&self) -> String {
		use crate::codec::base32_encode;
		let mut buf = Vec::with_capacity(1 + 2 + 2 + 32 + 4);
		buf.push(0u8); // flags: no client auth
		buf.extend_from_slice(&self.base_sig_type.code().to_be_bytes());
		buf.extend_from_slice(&self.blinded_sig_type.code().to_be_bytes());
		buf.extend_from_slice(&self.base_public_key);
		let check = IdentHash::of(&buf).0;
		buf.extend_from_slice(&check[0..4]);
		let b32 = base32_encode(&buf);
		assert!(b32.len() > 52, "b33 form must be longer than a plain b32 address");
		b32
	}
}

/// Derives both the blinded public key and, when the caller has the base
/// private signing key, the blinded private scalar, keeping both
/// derivations colocated so the two-direction agreement invariant is easy
/// to exercise in tests.
pub struct BlindedKeyPair {
	pub public: BlindedPublicKey,
	pub blinded_private_scalar: Scalar,
}

impl BlindedKeyPair {
	pub fn derive(base: &PrivateKeys, date: &str) -> Result<BlindedKeyPair> {
		if base.identity.identity().signing_key_type() != SigningKeyType::EdDsaSha512Ed25519 {
			return Err(Error::CryptoMismatch(
				"blinding only supported for Ed25519 base destinations".into(),
			));
		}
		let base_public: [u8; 32] = base
			.identity
			.identity()
			.signing_public_key_bytes()
			.try_into()
			.map_err(|_| Error::CryptoMismatch("malformed ed25519 public key".into()))?;
		let public = BlindedPublicKey::from_base_public(SigningKeyType::EdDsaSha512Ed25519, base_public);

		let seed: [u8; 32] = base
			.signing_private_key
			.get(0..32)
			.ok_or_else(|| Error::CryptoMismatch("short ed25519 private key".into()))?
			.try_into()
			.unwrap();
		let base_scalar = clamped_scalar_from_seed(&seed);
		let alpha = public.alpha(date);
		let blinded_private_scalar = alpha * base_scalar;

		Ok(BlindedKeyPair {
			public,
			blinded_private_scalar,
		})
	}

	pub fn blinded_public_key_bytes(&self) -> [u8; 32] {
		(&self.blinded_private_scalar * &ED25519_BASEPOINT_TABLE)
			.compress()
			.to_bytes()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn blinded_key_agreement() {
		let base = PrivateKeys::generate_ed25519();
		for date in ["20200101", "20991231"] {
			let pair = BlindedKeyPair::derive(&base, date).unwrap();
			let from_priv = pair.blinded_public_key_bytes();
			let from_pub = pair.public.blind_public(date);
			assert_eq!(from_priv, from_pub, "blinded key agreement failed for {date}");
		}
	}

	#[test]
	fn different_dates_yield_different_blinded_keys() {
		let base = PrivateKeys::generate_ed25519();
		let a = BlindedKeyPair::derive(&base, "20200101").unwrap();
		let b = BlindedKeyPair::derive(&base, "20200102").unwrap();
		assert_ne!(a.blinded_public_key_bytes(), b.blinded_public_key_bytes());
	}

	#[test]
	fn b33_longer_than_b32() {
		let base = PrivateKeys::generate_ed25519();
		let pair = BlindedKeyPair::derive(&base, "20200101").unwrap();
		let b33 = pair.public.to_b33();
		let b32 = base.identity.hash().to_base32();
		assert!(b33.len() > 52);
		assert!(b33.len() > b32.len());
	}
}
