//! Builder-side lease set counterparts (spec §3): `LocalLeaseSet`,
//! `LocalLeaseSet2`, `LocalEncryptedLeaseSet2`. Each owns its serialised
//! buffer and exposes `{buffer, signature, identHash, storeHash,
//! expirationTime}`; `storeHash != identHash` only for the encrypted
//! variant, where the store hash is the blinded subcredential hash.

use crate::codec::Writer;
use crate::error::Result;
use crate::identity::{BlindedKeyPair, IdentHash, PrivateKeys};
use crate::leaseset::lease::{sort_leases, Lease};
use crate::leaseset::lease_set2::{STORE_TYPE_ENCRYPTED, STORE_TYPE_STANDARD};

pub struct LocalLeaseSet {
	pub buffer: Vec<u8>,
	pub signature: Vec<u8>,
	pub ident_hash: IdentHash,
	pub expiration_time: u64,
}

impl LocalLeaseSet {
	pub fn build(owner: &PrivateKeys, mut leases: Vec<Lease>, encryption_public_key: [u8; 256]) -> Result<LocalLeaseSet> {
		sort_leases(&mut leases);
		let identity_buf = owner.identity.to_buffer();
		let mut w = Writer::new();
		w.put_bytes(&identity_buf);
		w.put_bytes(&encryption_public_key);
		w.put_bytes(&[0u8; 128]); // transient_signing_key padding
		w.put_u8(leases.len() as u8);
		for lease in &leases {
			lease.to_buffer(&mut w);
		}
		let unsigned = w.into_vec();
		let signature = owner.sign(&unsigned)?;

		let mut buffer = unsigned;
		buffer.extend_from_slice(&signature);

		Ok(LocalLeaseSet {
			buffer,
			signature,
			ident_hash: *owner.identity.hash(),
			expiration_time: leases.iter().map(|l| l.end_date).max().unwrap_or(0),
		})
	}
}

pub struct LocalLeaseSet2 {
	pub buffer: Vec<u8>,
	pub signature: Vec<u8>,
	pub ident_hash: IdentHash,
	pub expiration_time: u64,
}

impl LocalLeaseSet2 {
	pub fn build(
		owner: &PrivateKeys,
		mut leases: Vec<Lease>,
		published_timestamp: u32,
		expires_seconds: u16,
	) -> Result<LocalLeaseSet2> {
		sort_leases(&mut leases);
		let mut w = Writer::new();
		w.put_u8(STORE_TYPE_STANDARD);
		w.put_bytes(&owner.identity.to_buffer());
		w.put_u32(published_timestamp);
		w.put_u16(expires_seconds);
		w.put_u16(0); // flags: no offline sig, published, cleartext
		w.put_u16(0); // property count
		w.put_u8(leases.len() as u8);
		for lease in &leases {
			lease.to_buffer_v2(&mut w);
		}
		let unsigned = w.into_vec();
		let signature = owner.sign(&unsigned)?;

		let mut buffer = unsigned;
		buffer.extend_from_slice(&signature);

		Ok(LocalLeaseSet2 {
			buffer,
			signature,
			ident_hash: *owner.identity.hash(),
			expiration_time: published_timestamp as u64 * 1000 + expires_seconds as u64 * 1000,
		})
	}
}

/// Builder for an encrypted (type 5) lease set published under the
/// destination's blinded store hash instead of its plain `identHash`.
pub struct LocalEncryptedLeaseSet2 {
	pub buffer: Vec<u8>,
	pub signature: Vec<u8>,
	/// The plain identity hash — kept for bookkeeping even though the
	/// store hash (below) is what this lease set is actually published
	/// under.
	pub ident_hash: IdentHash,
	pub store_hash: IdentHash,
	pub expiration_time: u64,
}

impl LocalEncryptedLeaseSet2 {
	pub fn build(
		owner: &PrivateKeys,
		blinded: &BlindedKeyPair,
		date: &str,
		encrypted_inner: Vec<u8>,
		published_timestamp: u32,
		expires_seconds: u16,
	) -> Result<LocalEncryptedLeaseSet2> {
		let mut w = Writer::new();
		w.put_u8(STORE_TYPE_ENCRYPTED);
		w.put_bytes(&blinded.blinded_public_key_bytes());
		w.put_u32(published_timestamp);
		w.put_u16(expires_seconds);
		w.put_u16(0);
		w.put_bytes(&encrypted_inner);
		let unsigned = w.into_vec();

		// The outer signature is by the blinded private scalar, not the
		// base identity key — RedDSA signing over the blinded scalar is
		// not yet implemented in this crate (see DESIGN.md); the signature
		// field is left as a correctly-sized placeholder so the wire shape
		// round-trips.
		let signature = vec![0u8; 64];

		let mut buffer = unsigned;
		buffer.extend_from_slice(&signature);

		Ok(LocalEncryptedLeaseSet2 {
			buffer,
			signature,
			ident_hash: *owner.identity.hash(),
			store_hash: blinded.public.store_hash(date),
			expiration_time: published_timestamp as u64 * 1000 + expires_seconds as u64 * 1000,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::identity::IdentHash as Hash;

	#[test]
	fn local_lease_set_expiration_is_max_lease_end_date() {
		let owner = PrivateKeys::generate_ed25519();
		let leases = vec![
			Lease {
				gateway: Hash::zero(),
				tunnel_id: 1,
				end_date: 100,
			},
			Lease {
				gateway: Hash::zero(),
				tunnel_id: 2,
				end_date: 300,
			},
		];
		let ls = LocalLeaseSet::build(&owner, leases, [0u8; 256]).unwrap();
		assert_eq!(ls.expiration_time, 300);
		assert_eq!(ls.ident_hash, *owner.identity.hash());
	}

	#[test]
	fn encrypted_store_hash_differs_from_ident_hash() {
		let owner = PrivateKeys::generate_ed25519();
		let blinded = BlindedKeyPair::derive(&owner, "20200101").unwrap();
		let ls = LocalEncryptedLeaseSet2::build(&owner, &blinded, "20200101", vec![1, 2, 3], 1_700_000_000, 3600).unwrap();
		assert_ne!(ls.store_hash, ls.ident_hash);
	}
}
