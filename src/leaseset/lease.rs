//! `Lease` (spec §3): a single tunnel gateway entry inside a lease set.

use rand::Rng;

use crate::codec::{Reader, Writer};
use crate::error::Result;
use crate::identity::IdentHash;

pub const LEASE_WIRE_LEN: usize = 44; // gateway(32) + tunnelId(4) + endDate(8)
pub const LEASE2_WIRE_LEN: usize = 40; // gateway(32) + tunnelId(4) + expires:u32-seconds(4)

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
	pub gateway: IdentHash,
	pub tunnel_id: u32,
	/// milliseconds since the Unix epoch.
	pub end_date: u64,
}

impl Lease {
	pub fn to_buffer(&self, w: &mut Writer) {
		w.put_bytes(&self.gateway.0);
		w.put_u32(self.tunnel_id);
		w.put_u64(self.end_date);
	}

	pub fn parse(r: &mut Reader) -> Result<Lease> {
		let gateway = IdentHash::new(r.take(32)?.try_into().unwrap());
		let tunnel_id = r.take_u32()?;
		let end_date = r.take_u64()?;
		Ok(Lease {
			gateway,
			tunnel_id,
			end_date,
		})
	}

	/// LS2 (type 3/5) leases store `expires` as seconds, not an absolute
	/// millisecond timestamp; both are normalised to millisecond `end_date`
	/// here so downstream ordering/expiry logic is format-agnostic.
	pub fn to_buffer_v2(&self, w: &mut Writer) {
		w.put_bytes(&self.gateway.0);
		w.put_u32(self.tunnel_id);
		w.put_u32((self.end_date / 1000) as u32);
	}

	pub fn parse_v2(r: &mut Reader) -> Result<Lease> {
		let gateway = IdentHash::new(r.take(32)?.try_into().unwrap());
		let tunnel_id = r.take_u32()?;
		let expires_secs = r.take_u32()?;
		Ok(Lease {
			gateway,
			tunnel_id,
			end_date: expires_secs as u64 * 1000,
		})
	}

	/// A lease "expires within" `t` (with fudge `f`, both milliseconds) if
	/// `endDate - now < t + rand(0..f)` (spec §3). `rng` is passed in so
	/// call sites can inject a deterministic source under test.
	pub fn expires_within(&self, now_ms: u64, t_ms: u64, fudge_ms: u64, rng: &mut impl Rng) -> bool {
		let fudge = if fudge_ms == 0 { 0 } else { rng.gen_range(0..fudge_ms) };
		let remaining = self.end_date.saturating_sub(now_ms);
		remaining < t_ms + fudge
	}
}

/// Orders leases by `endDate` descending, then `tunnelId` ascending (spec
/// §3) — the order a lease set's leases are offered to callers in.
pub fn sort_leases(leases: &mut [Lease]) {
	leases.sort_by(|a, b| b.end_date.cmp(&a.end_date).then(a.tunnel_id.cmp(&b.tunnel_id)));
}

#[cfg(test)]
mod tests {
	use super::*;
	use rand::SeedableRng;
	use rand::rngs::StdRng;

	fn lease(end_date: u64, tunnel_id: u32) -> Lease {
		Lease {
			gateway: IdentHash::zero(),
			tunnel_id,
			end_date,
		}
	}

	#[test]
	fn v1_round_trip() {
		let l = lease(123456789, 42);
		let mut w = Writer::with_capacity(LEASE_WIRE_LEN);
		l.to_buffer(&mut w);
		let buf = w.into_vec();
		assert_eq!(buf.len(), LEASE_WIRE_LEN);
		let mut r = Reader::new(&buf);
		assert_eq!(Lease::parse(&mut r).unwrap(), l);
	}

	#[test]
	fn v2_round_trip_truncates_to_seconds() {
		let l = lease(123_000, 7);
		let mut w = Writer::with_capacity(LEASE2_WIRE_LEN);
		l.to_buffer_v2(&mut w);
		let buf = w.into_vec();
		assert_eq!(buf.len(), LEASE2_WIRE_LEN);
		let mut r = Reader::new(&buf);
		assert_eq!(Lease::parse_v2(&mut r).unwrap(), l);
	}

	#[test]
	fn sort_orders_by_end_date_desc_then_tunnel_asc() {
		let mut leases = vec![lease(100, 2), lease(200, 9), lease(200, 1)];
		sort_leases(&mut leases);
		assert_eq!(leases, vec![lease(200, 1), lease(200, 9), lease(100, 2)]);
	}

	#[test]
	fn expires_within_uses_fudge_window() {
		let l = lease(10_000, 0);
		let mut rng = StdRng::seed_from_u64(1);
		assert!(l.expires_within(9_500, 400, 200, &mut rng));
		let mut rng2 = StdRng::seed_from_u64(1);
		assert!(!l.expires_within(5_000, 100, 0, &mut rng2));
	}
}
