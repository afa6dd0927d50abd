//! Lazily-constructed signature verifiers, dispatched on `SigningKeyType`.
//!
//! Per spec §9 ("Lazy verifier construction"): the source builds a verifier
//! only when `Verify` is first called and may drop it afterwards to save
//! memory. `IdentityEx` models this with a `OnceCell`-style lazily
//! initialised, droppable handle; this module only defines the verifier
//! construction and the `Verify` dispatch itself.

use log::warn;

use ed25519_dalek::{Signature as EdSignature, Verifier as _, VerifyingKey as EdVerifyingKey};
use p256::ecdsa::{
	signature::Verifier as _, Signature as P256Signature, VerifyingKey as P256VerifyingKey,
};
use p384::ecdsa::{Signature as P384Signature, VerifyingKey as P384VerifyingKey};
use rsa::pkcs1v15::{Signature as RsaSignature, VerifyingKey as RsaVerifyingKey};
use rsa::signature::Verifier as RsaVerifierTrait;
use rsa::RsaPublicKey;
use sha2::{Sha256, Sha384, Sha512};

use crate::identity::cert::SigningKeyType;

/// A constructed verifier for one identity's signing key. `verify` never
/// panics on malformed input — it returns `false`, per spec §4.1's
/// "deterministically" requirement.
pub enum Verifier {
	Ed25519(Box<EdVerifyingKey>),
	EcdsaP256(Box<P256VerifyingKey>),
	EcdsaP384(Box<P384VerifyingKey>),
	RsaSha256(Box<RsaVerifyingKey<Sha256>>),
	RsaSha384(Box<RsaVerifyingKey<Sha384>>),
	RsaSha512(Box<RsaVerifyingKey<Sha512>>),
	/// Unsupported signing type (DSA-SHA1, P-521, GOST, or unknown):
	/// identity bytes are retained but every `verify` call returns false.
	Unsupported,
}

impl Verifier {
	/// Build a verifier from the raw public-key bytes embedded in an
	/// `Identity`'s signing-key field (and certificate tail, for the types
	/// that straddle into it). `key_bytes` must already be trimmed to the
	/// type's `public_key_len()` — the caller (identity parsing) is
	/// responsible for locating the key within the padded 128-byte field.
	pub fn construct(sig_type: SigningKeyType, key_bytes: &[u8]) -> Verifier {
		match sig_type {
			SigningKeyType::EdDsaSha512Ed25519 => {
				match <[u8; 32]>::try_from(key_bytes) {
					Ok(arr) => match EdVerifyingKey::from_bytes(&arr) {
						Ok(vk) => Verifier::Ed25519(Box::new(vk)),
						Err(_) => Verifier::Unsupported,
					},
					Err(_) => Verifier::Unsupported,
				}
			}
			SigningKeyType::EcdsaSha256P256 => {
				match P256VerifyingKey::from_sec1_bytes(&uncompressed_point(key_bytes)) {
					Ok(vk) => Verifier::EcdsaP256(Box::new(vk)),
					Err(_) => Verifier::Unsupported,
				}
			}
			SigningKeyType::EcdsaSha384P384 => {
				match P384VerifyingKey::from_sec1_bytes(&uncompressed_point(key_bytes)) {
					Ok(vk) => Verifier::EcdsaP384(Box::new(vk)),
					Err(_) => Verifier::Unsupported,
				}
			}
			SigningKeyType::RsaSha2562048 | SigningKeyType::RsaSha3843072 | SigningKeyType::RsaSha5124096 => {
				match rsa_public_key_from_modulus(key_bytes) {
					Some(pk) => match sig_type {
						SigningKeyType::RsaSha2562048 => {
							Verifier::RsaSha256(Box::new(RsaVerifyingKey::new(pk)))
						}
						SigningKeyType::RsaSha3843072 => {
							Verifier::RsaSha384(Box::new(RsaVerifyingKey::new(pk)))
						}
						_ => Verifier::RsaSha512(Box::new(RsaVerifyingKey::new(pk))),
					},
					None => Verifier::Unsupported,
				}
			}
			// RedDSA is handled separately by the blinding module, not here.
			other => {
				warn!("no verifier available for signing key type {other:?}, treating as unverifiable");
				Verifier::Unsupported
			}
		}
	}

	pub fn verify(&self, data: &[u8], sig: &[u8]) -> bool {
		match self {
			Verifier::Ed25519(vk) => match EdSignature::from_slice(sig) {
				Ok(sig) => vk.verify(data, &sig).is_ok(),
				Err(_) => false,
			},
			Verifier::EcdsaP256(vk) => match P256Signature::from_slice(sig) {
				Ok(sig) => vk.verify(data, &sig).is_ok(),
				Err(_) => false,
			},
			Verifier::EcdsaP384(vk) => match P384Signature::from_slice(sig) {
				Ok(sig) => vk.verify(data, &sig).is_ok(),
				Err(_) => false,
			},
			Verifier::RsaSha256(vk) => match RsaSignature::try_from(sig) {
				Ok(sig) => vk.verify(data, &sig).is_ok(),
				Err(_) => false,
			},
			Verifier::RsaSha384(vk) => match RsaSignature::try_from(sig) {
				Ok(sig) => vk.verify(data, &sig).is_ok(),
				Err(_) => false,
			},
			Verifier::RsaSha512(vk) => match RsaSignature::try_from(sig) {
				Ok(sig) => vk.verify(data, &sig).is_ok(),
				Err(_) => false,
			},
			Verifier::Unsupported => false,
		}
	}
}

/// I2P stores raw EC points as `x || y` (no SEC1 tag); re-add the
/// uncompressed-point tag RustCrypto's parser expects.
fn uncompressed_point(xy: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(xy.len() + 1);
	out.push(0x04);
	out.extend_from_slice(xy);
	out
}

fn rsa_public_key_from_modulus(modulus: &[u8]) -> Option<RsaPublicKey> {
	use rsa::BigUint;
	let n = BigUint::from_bytes_be(modulus);
	let e = BigUint::from(65537u32);
	RsaPublicKey::new(n, e).ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use ed25519_dalek::{Signer, SigningKey};
	use rand::rngs::OsRng;

	#[test]
	fn ed25519_sign_verify_round_trip() {
		let mut csprng = OsRng;
		let signing_key = SigningKey::generate(&mut csprng);
		let verifying_key = signing_key.verifying_key();
		let data = b"hello destination";
		let sig = signing_key.sign(data);

		let verifier = Verifier::construct(
			SigningKeyType::EdDsaSha512Ed25519,
			verifying_key.as_bytes(),
		);
		assert!(verifier.verify(data, &sig.to_bytes()));
		assert!(!verifier.verify(b"tampered", &sig.to_bytes()));
	}

	#[test]
	fn unsupported_type_never_verifies() {
		let verifier = Verifier::construct(SigningKeyType::DsaSha1, &[0u8; 128]);
		assert!(!verifier.verify(b"data", &[0u8; 40]));
	}
}
