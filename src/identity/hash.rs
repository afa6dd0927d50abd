//! `IdentHash`, `XORMetric`, and the time-rotated routing key construction
//! (spec §3, §4.1).

use std::cmp::Ordering;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::codec::{base32_decode, base32_encode, base64_decode, base64_encode};
use crate::error::{Error, Result};

/// A fixed 32-byte identity tag. Eight-byte aligned so it can be viewed as
/// four `u64`s for XOR-metric comparison without UB.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(align(8))]
pub struct IdentHash(pub [u8; 32]);

impl IdentHash {
	pub fn new(bytes: [u8; 32]) -> Self {
		IdentHash(bytes)
	}

	pub fn zero() -> Self {
		IdentHash([0u8; 32])
	}

	pub fn of(data: &[u8]) -> Self {
		let mut hasher = Sha256::new();
		hasher.update(data);
		let digest = hasher.finalize();
		let mut out = [0u8; 32];
		out.copy_from_slice(&digest);
		IdentHash(out)
	}

	pub fn to_base32(&self) -> String {
		base32_encode(&self.0)
	}

	pub fn to_base64(&self) -> String {
		base64_encode(&self.0)
	}

    pub fn from_base32(s: &str) -> Result<Self> {
        let bytes = base32_decode(s)?;
        Self::from_slice(&bytes)
    }

    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = base64_decode(s)?;
        Self::from_slice(&bytes)
    }

    fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(Error::parse(format!(
                "ident hash must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        Ok(IdentHash(out))
    }

	/// `SHA-256(self || "YYYYMMDD")` for the given UTC calendar date,
	/// rotating the floodfill selection key once per day. Callers must
	/// always supply a UTC date (never local time).
	pub fn routing_key_for_date(&self, date: &str) -> IdentHash {
		debug_assert_eq!(date.len(), 8, "date must be YYYYMMDD");
		let mut hasher = Sha256::new();
		hasher.update(self.0);
		hasher.update(date.as_bytes());
		let digest = hasher.finalize();
		let mut out = [0u8; 32];
		out.copy_from_slice(&digest);
		IdentHash(out)
	}
}

impl fmt::Debug for IdentHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "IdentHash({})", self.to_base64())
	}
}

impl fmt::Display for IdentHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_base32())
	}
}

impl PartialOrd for IdentHash {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for IdentHash {
	fn cmp(&self, other: &Self) -> Ordering {
		self.0.cmp(&other.0)
	}
}

/// `SHA-256(identHash || "YYYYMMDD")` computed for the *current* UTC day.
/// The caller supplies `today` (an 8-ASCII-char `YYYYMMDD` string) so the
/// function stays pure and testable; production call sites derive it from
/// `gmtime`, never local time.
pub fn create_routing_key(ident_hash: &IdentHash, today_utc: &str) -> IdentHash {
	ident_hash.routing_key_for_date(today_utc)
}

/// A 32-byte XOR distance, compared as four big-endian `u64` limbs —
/// lexicographic byte order and numeric big-endian order coincide.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct XorMetric(pub [u8; 32]);

impl XorMetric {
	pub fn between(a: &IdentHash, b: &IdentHash) -> Self {
		let mut out = [0u8; 32];
		for i in 0..32 {
			out[i] = a.0[i] ^ b.0[i];
		}
		XorMetric(out)
	}

	fn limbs(&self) -> [u64; 4] {
		let mut limbs = [0u64; 4];
		for (i, limb) in limbs.iter_mut().enumerate() {
			let mut b = [0u8; 8];
			b.copy_from_slice(&self.0[i * 8..i * 8 + 8]);
			*limb = u64::from_be_bytes(b);
		}
		limbs
	}
}

impl PartialOrd for XorMetric {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for XorMetric {
	fn cmp(&self, other: &Self) -> Ordering {
		self.limbs().cmp(&other.limbs())
	}
}
