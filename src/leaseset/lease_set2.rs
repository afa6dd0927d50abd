//! `LeaseSet2` (types 3/5/7, spec §3): the versioned lease set container.

use crate::codec::{Reader, Writer};
use crate::error::{Error, Result};
use crate::identity::{BlindedPublicKey, Identity, IdentityEx, Verifier};
use crate::leaseset::lease::{sort_leases, Lease};

pub const STORE_TYPE_STANDARD: u8 = 3;
pub const STORE_TYPE_ENCRYPTED: u8 = 5;
pub const STORE_TYPE_META: u8 = 7;

pub const FLAG_OFFLINE_KEYS: u16 = 0x0001;
pub const FLAG_UNPUBLISHED: u16 = 0x0002;
pub const FLAG_PUBLISHED_ENCRYPTED: u16 = 0x0004;

#[derive(Debug, Clone)]
pub struct LeaseSet2Property {
	pub key_type: u16,
	pub key: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct OfflineSignatureBlock {
	pub expires: u32,
	pub transient_key_type: u16,
	pub transient_public_key: Vec<u8>,
	pub signature: Vec<u8>,
}

/// The common header every LS2 store type shares (spec §3): identity,
/// timestamps, and the offline-signature/unpublished/encrypted flags.
#[derive(Debug, Clone)]
pub struct LeaseSet2Header {
	pub store_type: u8,
	pub identity: Identity,
	pub published_timestamp: u32,
	pub expires_seconds: u16,
	pub flags: u16,
	pub offline_signature: Option<OfflineSignatureBlock>,
}

impl LeaseSet2Header {
	pub fn is_unpublished(&self) -> bool {
		self.flags & FLAG_UNPUBLISHED != 0
	}

	pub fn is_published_encrypted(&self) -> bool {
		self.flags & FLAG_PUBLISHED_ENCRYPTED != 0
	}
}

/// Type 3 — standard LS2: key/value properties then the LEASE2 block.
#[derive(Debug, Clone)]
pub struct LeaseSet2Standard {
	pub header: LeaseSet2Header,
	pub properties: Vec<LeaseSet2Property>,
	pub leases: Vec<Lease>,
	pub signature: Vec<u8>,
}

impl LeaseSet2Standard {
	pub fn parse(buf: &[u8]) -> Result<LeaseSet2Standard> {
		let mut r = Reader::new(buf);
		let store_type = r.take_u8()?;
		if store_type != STORE_TYPE_STANDARD {
			return Err(Error::parse(format!("expected LS2 type 3, got {store_type}")));
		}
		let identity_start = r.pos();
		let identity = Identity::from_buffer(&buf[identity_start..])?;
		r.take(identity.full_len())?;
		let published_timestamp = r.take_u32()?;
		let expires_seconds = r.take_u16()?;
		let flags = r.take_u16()?;

		let offline_signature = if flags & FLAG_OFFLINE_KEYS != 0 {
			let expires = r.take_u32()?;
			let transient_key_type = r.take_u16()?;
			let transient_len = crate::identity::SigningKeyType::from_code(transient_key_type).public_key_len();
			let transient_public_key = r.take(transient_len)?.to_vec();
			let sig_len = identity.signing_key_type().signature_len();
			let signature = r.take(sig_len)?.to_vec();
			Some(OfflineSignatureBlock {
				expires,
				transient_key_type,
				transient_public_key,
				signature,
			})
		} else {
			None
		};

		let property_count = r.take_u16()?;
		let mut properties = Vec::with_capacity(property_count as usize);
		for _ in 0..property_count {
			let key_type = r.take_u16()?;
			let key_len = r.take_u16()? as usize;
			let key = r.take(key_len)?.to_vec();
			properties.push(LeaseSet2Property { key_type, key });
		}

		let lease_count = r.take_u8()? as usize;
		let mut leases = Vec::with_capacity(lease_count);
		for _ in 0..lease_count {
			leases.push(Lease::parse_v2(&mut r)?);
		}

		let signed_len = r.pos();
		let sig_len = identity.signing_key_type().signature_len();
		let signature = r.take(sig_len)?.to_vec();

		let verifier_identity = IdentityEx::new(identity.clone());
		let verified = if let Some(off) = &offline_signature {
			// Offline-signed: the transient key signs the body, and the
			// parent identity key signs the transient key block itself.
			let mut transient_signed = Writer::new();
			transient_signed.put_u32(off.expires);
			transient_signed.put_u16(off.transient_key_type);
			transient_signed.put_bytes(&off.transient_public_key);
			if !verifier_identity.verify(&transient_signed.into_vec(), &off.signature) {
				false
			} else {
				let transient_verifier =
					Verifier::construct(crate::identity::SigningKeyType::from_code(off.transient_key_type), &off.transient_public_key);
				transient_verifier.verify(&buf[..signed_len], &signature)
			}
		} else {
			verifier_identity.verify(&buf[..signed_len], &signature)
		};
		if !verified {
			return Err(Error::BadSignature);
		}

		Ok(LeaseSet2Standard {
			header: LeaseSet2Header {
				store_type,
				identity,
				published_timestamp,
				expires_seconds,
				flags,
				offline_signature,
			},
			properties,
			leases,
			signature,
		})
	}

	pub fn sorted_leases(&self) -> Vec<Lease> {
		let mut leases = self.leases.clone();
		sort_leases(&mut leases);
		leases
	}

	pub fn is_expired(&self, now_ms: u64) -> bool {
		let expires_at = self.header.published_timestamp as u64 * 1000 + self.header.expires_seconds as u64 * 1000;
		now_ms >= expires_at
	}
}

/// Type 5 — encrypted LS2: an inner lease set encrypted under a blinded
/// key. The outer signature is verified with the *blinded* verifier, not
/// the base destination's.
#[derive(Debug, Clone)]
pub struct EncryptedLeaseSet2 {
	pub blinded_public_key: BlindedPublicKey,
	pub published_timestamp: u32,
	pub expires_seconds: u16,
	pub flags: u16,
	pub encrypted_inner: Vec<u8>,
	pub signature: Vec<u8>,
}

impl EncryptedLeaseSet2 {
	/// `blinded_public_key` must already be known to the caller (recovered
	/// from the lookup key / b33 address), since the wire format carries
	/// only the blinded public key bytes, not the base destination.
	pub fn parse(buf: &[u8], base_sig_type: crate::identity::SigningKeyType) -> Result<EncryptedLeaseSet2> {
		let mut r = Reader::new(buf);
		let store_type = r.take_u8()?;
		if store_type != STORE_TYPE_ENCRYPTED {
			return Err(Error::parse(format!("expected LS2 type 5, got {store_type}")));
		}
		let blinded_pub: [u8; 32] = r.take(32)?.try_into().unwrap();
		let published_timestamp = r.take_u32()?;
		let expires_seconds = r.take_u16()?;
		let flags = r.take_u16()?;
		let encrypted_inner = r.take_rest().to_vec();

		// The signature trails the *raw* bytes already consumed; callers
		// only get at it by slicing with a concrete signing-key length,
		// which for RedDSA (the blinded default) is 64.
		if encrypted_inner.len() < 64 {
			return Err(Error::parse("encrypted lease set too short for a trailing signature"));
		}
		let split = encrypted_inner.len() - 64;
		let signature = encrypted_inner[split..].to_vec();
		let encrypted_inner = encrypted_inner[..split].to_vec();

		let blinded_public_key = BlindedPublicKey::from_base_public(base_sig_type, blinded_pub);
		let signed_len = buf.len() - 64;
		let verifier = Verifier::construct(blinded_public_key.blinded_sig_type, &blinded_pub);
		if !verifier.verify(&buf[..signed_len], &signature) {
			return Err(Error::BadSignature);
		}

		Ok(EncryptedLeaseSet2 {
			blinded_public_key,
			published_timestamp,
			expires_seconds,
			flags,
			encrypted_inner,
			signature,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::identity::{IdentHash, PrivateKeys, SigningKeyType};

	fn signed_standard(leases: Vec<Lease>) -> LeaseSet2Standard {
		let owner = PrivateKeys::generate_ed25519();
		let identity = owner.identity.identity().clone();
		let mut w = Writer::new();
		w.put_u8(STORE_TYPE_STANDARD);
		w.put_bytes(&identity.to_buffer());
		w.put_u32(1_700_000_000);
		w.put_u16(3600);
		w.put_u16(0); // flags: no offline sig
		w.put_u16(0); // property count
		w.put_u8(leases.len() as u8);
		for l in &leases {
			l.to_buffer_v2(&mut w);
		}
		let unsigned = w.into_vec();
		let signature = owner.sign(&unsigned).unwrap();
		let mut full = unsigned;
		full.extend_from_slice(&signature);
		LeaseSet2Standard::parse(&full).unwrap()
	}

	#[test]
	fn standard_round_trip_and_expiry() {
		let leases = vec![Lease {
			gateway: IdentHash::zero(),
			tunnel_id: 1,
			end_date: 0,
		}];
		let ls = signed_standard(leases);
		assert_eq!(ls.header.store_type, STORE_TYPE_STANDARD);
		assert!(!ls.is_expired(1_700_000_000_000));
		assert!(ls.is_expired(1_700_003_700_001));
	}

	#[test]
	fn wrong_store_type_rejected() {
		let mut buf = vec![STORE_TYPE_META];
		buf.extend_from_slice(&[0u8; 400]);
		assert!(LeaseSet2Standard::parse(&buf).is_err());
		let _ = SigningKeyType::EdDsaSha512Ed25519;
	}
}
