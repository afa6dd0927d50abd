//! External-collaborator traits (spec §1's "Out of scope" list): the
//! floodfill network database, tunnel pool, and garlic-wrapping session
//! this crate's in-scope components call through but does not implement.
//! An in-memory mock of each is provided for tests only.

use std::collections::HashMap;

use crate::identity::IdentHash;
use crate::leaseset::lease_set::LeaseSet;

/// A single outbound or inbound tunnel handle, assumed supplied by the
/// tunnel-build subsystem (out of scope here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelHandle {
	pub tunnel_id: u32,
	pub gateway: IdentHash,
}

/// `TunnelPool` (spec §1): supplies outbound tunnels and next-hop choices
/// for a destination. Real implementations build and rotate tunnels
/// continuously; this crate only needs to call through the interface.
pub trait TunnelPool: Send + Sync {
	fn get_next_outbound_tunnel(&self) -> Option<TunnelHandle>;
	fn select_next_hop(&self, excluded: &[IdentHash]) -> Option<IdentHash>;
}

/// `GarlicRoutingSession::WrapSingleMessage` (spec §1): ElGamal/AES/ECIES
/// garlic wrapping, referenced only through this one entry point.
pub trait GarlicRoutingSession: Send + Sync {
	fn wrap_single_message(&self, payload: &[u8]) -> Vec<u8>;
}

/// The floodfill network database lookup/store interface (spec §1).
/// Real NetDb selection uses XOR-metric proximity to the routing key
/// across the known floodfill set; this crate calls through this trait
/// rather than implementing DatabaseLookup/DatabaseStore I2NP handling.
pub trait NetDb: Send + Sync {
	/// Already-known lease set, if any (no network round trip).
	fn lookup_cached(&self, ident_hash: &IdentHash) -> Option<LeaseSet>;
	fn store_lease_set(&self, ident_hash: IdentHash, lease_set: LeaseSet);
	/// Up to `count` floodfills closest to `routing_key`, excluding any
	/// hash in `excluded` (spec §4.3.1's `MAX_NUM_FLOODFILLS_PER_REQUEST`).
	fn closest_floodfills(&self, routing_key: &IdentHash, excluded: &[IdentHash], count: usize) -> Vec<IdentHash>;
	/// Stand-in for the DatabaseLookup/DatabaseStore round trip against one
	/// specific floodfill; the garlic-wrapped I2NP exchange itself is out
	/// of scope (spec §1).
	fn query_floodfill(&self, floodfill: &IdentHash, target: &IdentHash) -> Option<LeaseSet>;
	/// Stand-in for sending a DatabaseStore of `lease_set` to `floodfill`.
	fn publish_to_floodfill(&self, floodfill: &IdentHash, ident_hash: &IdentHash, lease_set_buffer: &[u8]);
}

/// In-memory `NetDb` double used only by tests.
#[derive(Default)]
pub struct MockNetDb {
	lease_sets: std::sync::Mutex<HashMap<IdentHash, LeaseSet>>,
	floodfills: Vec<IdentHash>,
}

impl MockNetDb {
	pub fn new(floodfills: Vec<IdentHash>) -> MockNetDb {
		MockNetDb {
			lease_sets: std::sync::Mutex::new(HashMap::new()),
			floodfills,
		}
	}
}

impl NetDb for MockNetDb {
	fn lookup_cached(&self, ident_hash: &IdentHash) -> Option<LeaseSet> {
		self.lease_sets.lock().unwrap().get(ident_hash).cloned()
	}

	fn store_lease_set(&self, ident_hash: IdentHash, lease_set: LeaseSet) {
		self.lease_sets.lock().unwrap().insert(ident_hash, lease_set);
	}

	fn closest_floodfills(&self, routing_key: &IdentHash, excluded: &[IdentHash], count: usize) -> Vec<IdentHash> {
		let mut candidates: Vec<IdentHash> = self
			.floodfills
			.iter()
			.filter(|f| !excluded.contains(f))
			.copied()
			.collect();
		candidates.sort_by_key(|f| crate::identity::XorMetric::between(routing_key, f));
		candidates.truncate(count);
		candidates
	}

	fn query_floodfill(&self, _floodfill: &IdentHash, target: &IdentHash) -> Option<LeaseSet> {
		self.lookup_cached(target)
	}

	fn publish_to_floodfill(&self, _floodfill: &IdentHash, ident_hash: &IdentHash, _lease_set_buffer: &[u8]) {
		let _ = ident_hash;
	}
}

/// In-memory `TunnelPool` double used only by tests.
pub struct MockTunnelPool {
	pub tunnels: Vec<TunnelHandle>,
}

impl TunnelPool for MockTunnelPool {
	fn get_next_outbound_tunnel(&self) -> Option<TunnelHandle> {
		self.tunnels.first().copied()
	}

	fn select_next_hop(&self, excluded: &[IdentHash]) -> Option<IdentHash> {
		self.tunnels
			.iter()
			.map(|t| t.gateway)
			.find(|g| !excluded.contains(g))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mock_netdb_store_and_lookup() {
		let db = MockNetDb::new(vec![]);
		let hash = IdentHash::zero();
		assert!(db.lookup_cached(&hash).is_none());
	}

	#[test]
	fn mock_netdb_closest_floodfills_excludes_and_truncates() {
		let a = IdentHash::new([1u8; 32]);
		let b = IdentHash::new([2u8; 32]);
		let c = IdentHash::new([3u8; 32]);
		let db = MockNetDb::new(vec![a, b, c]);
		let routing_key = IdentHash::zero();
		let closest = db.closest_floodfills(&routing_key, &[a], 1);
		assert_eq!(closest.len(), 1);
		assert_ne!(closest[0], a);
	}
}
