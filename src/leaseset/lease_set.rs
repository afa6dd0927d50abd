//! `LeaseSet` (type 1, spec §3): the legacy, non-versioned lease set format.

use crate::codec::{Reader, Writer};
use crate::error::{Error, Result};
use crate::identity::{Identity, IdentityEx};
use crate::leaseset::lease::{sort_leases, Lease};

pub const MAX_LEASES: usize = 16;
pub const MAX_LEASE_SET_BUFFER: usize = 3072;

#[derive(Debug, Clone)]
pub struct LeaseSet {
	pub identity: Identity,
	pub encryption_public_key: [u8; 256],
	/// Wire-format field name from the original protocol; in practice
	/// always zero padding for type-1 lease sets, kept for byte-exact
	/// round-trip.
	pub transient_signing_key: [u8; 128],
	pub leases: Vec<Lease>,
	pub signature: Vec<u8>,
}

impl LeaseSet {
	pub fn to_buffer(&self) -> Vec<u8> {
		let mut w = Writer::with_capacity(MAX_LEASE_SET_BUFFER);
		w.put_bytes(&self.identity.to_buffer());
		w.put_bytes(&self.encryption_public_key);
		w.put_bytes(&self.transient_signing_key);
		w.put_u8(self.leases.len() as u8);
		for lease in &self.leases {
			lease.to_buffer(&mut w);
		}
		w.put_bytes(&self.signature);
		w.into_vec()
	}

	/// Parses a type-1 lease set and verifies its by-identity signature.
	/// Invariants from spec §3: `0 <= leaseCount <= 16`, buffer length
	/// `<= 3072`.
	pub fn parse(buf: &[u8]) -> Result<LeaseSet> {
		if buf.len() > MAX_LEASE_SET_BUFFER {
			return Err(Error::parse("lease set buffer exceeds 3072 bytes"));
		}
		let identity = Identity::from_buffer(buf)?;
		let identity_len = identity.full_len();
		let mut r = Reader::new(buf);
		r.take(identity_len)?;
		let encryption_public_key: [u8; 256] = r.take(256)?.try_into().unwrap();
		let transient_signing_key: [u8; 128] = r.take(128)?.try_into().unwrap();
		let lease_count = r.take_u8()? as usize;
		if lease_count > MAX_LEASES {
			return Err(Error::parse(format!("lease count {lease_count} exceeds 16")));
		}
		let mut leases = Vec::with_capacity(lease_count);
		for _ in 0..lease_count {
			leases.push(Lease::parse(&mut r)?);
		}
		let signed_len = r.pos();
		let sig_len = identity.signing_key_type().signature_len();
		let signature = if sig_len == 0 {
			r.take_rest().to_vec()
		} else {
			r.take(sig_len)?.to_vec()
		};

		let identity_ex = IdentityEx::new(identity.clone());
		if !identity_ex.verify(&buf[..signed_len], &signature) {
			return Err(Error::BadSignature);
		}

		Ok(LeaseSet {
			identity,
			encryption_public_key,
			transient_signing_key,
			leases,
			signature,
		})
	}

	/// The lease set's expiration is the maximum lease `end_date` (spec §3).
	pub fn expiration(&self) -> u64 {
		self.leases.iter().map(|l| l.end_date).max().unwrap_or(0)
	}

	pub fn is_expired(&self, now_ms: u64) -> bool {
		now_ms >= self.expiration()
	}

	pub fn sorted_leases(&self) -> Vec<Lease> {
		let mut leases = self.leases.clone();
		sort_leases(&mut leases);
		leases
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::identity::PrivateKeys;

	fn signed_lease_set(leases: Vec<Lease>) -> LeaseSet {
		let owner = PrivateKeys::generate_ed25519();
		let identity = owner.identity.identity().clone();
		let mut w = Writer::new();
		w.put_bytes(&identity.to_buffer());
		let enc_key = [0u8; 256];
		w.put_bytes(&enc_key);
		let transient = [0u8; 128];
		w.put_bytes(&transient);
		w.put_u8(leases.len() as u8);
		for l in &leases {
			l.to_buffer(&mut w);
		}
		let unsigned = w.into_vec();
		let signature = owner.sign(&unsigned).unwrap();

		let mut full = unsigned;
		full.extend_from_slice(&signature);
		LeaseSet::parse(&full).unwrap()
	}

	#[test]
	fn parse_verifies_signature_and_expiration() {
		let leases = vec![Lease {
			gateway: crate::identity::IdentHash::zero(),
			tunnel_id: 7,
			end_date: 555_000,
		}];
		let ls = signed_lease_set(leases);
		assert_eq!(ls.expiration(), 555_000);
		assert!(ls.is_expired(600_000));
		assert!(!ls.is_expired(100));
	}

	#[test]
	fn rejects_too_many_leases_before_signature_check() {
		let mut buf = vec![0u8; 387 + 256 + 128];
		buf.push(17); // lease_count
		assert!(LeaseSet::parse(&buf).is_err());
	}

	#[test]
	fn round_trip_serialisation() {
		let ls = signed_lease_set(vec![]);
		let buf = ls.to_buffer();
		let parsed = LeaseSet::parse(&buf).unwrap();
		assert_eq!(parsed.signature, ls.signature);
	}
}
