//! Peer profile counters (spec §6): `[participation]`/`[usage]` fields the
//! transport layer feeds as peers connect, get selected for tunnels, or are
//! rejected. Persistence to the on-disk INI format is an external
//! collaborator (`PeerProfileSink`); this module owns the in-memory counters
//! and the 36-hour expiry rule only.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::identity::IdentHash;

/// `peerProfiles/p<letter>/profile-<b64 ident>.txt` expiry (spec §6).
pub const PROFILE_EXPIRY_SECS: u64 = 36 * 3600;

#[derive(Debug, Clone, Default)]
pub struct Participation {
	pub agreed: u32,
	pub declined: u32,
	pub nonreplied: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Usage {
	pub taken: u32,
	pub rejected: u32,
	pub connected: u32,
	pub duplicated: u32,
}

#[derive(Debug, Clone)]
pub struct PeerProfile {
	pub participation: Participation,
	pub usage: Usage,
	pub last_update_timestamp: u64,
	pub last_unreachable_time: Option<u64>,
}

impl PeerProfile {
	fn new(now: u64) -> PeerProfile {
		PeerProfile {
			participation: Participation::default(),
			usage: Usage::default(),
			last_update_timestamp: now,
			last_unreachable_time: None,
		}
	}

	pub fn is_expired(&self, now: u64) -> bool {
		now.saturating_sub(self.last_update_timestamp) > PROFILE_EXPIRY_SECS
	}
}

/// Receives profile updates as they happen; the on-disk INI store (spec §6)
/// implements this externally. A no-op implementation is provided for
/// routers that don't persist profiles.
pub trait PeerProfileSink: Send + Sync {
	fn on_update(&self, peer: &IdentHash, profile: &PeerProfile);
}

pub struct NullProfileSink;
impl PeerProfileSink for NullProfileSink {
	fn on_update(&self, _peer: &IdentHash, _profile: &PeerProfile) {}
}

fn now_secs(clock: u64) -> u64 {
	clock
}

/// Global in-memory profile map (spec §5: "a global map guarded by mutex").
/// Callers own the mutex; this type just holds the map and update logic —
/// actual locking is left to whichever owner (transport acceptor,
/// destination) needs it, matching the other `dashmap`-backed shared state
/// in this crate.
pub struct ProfileStore {
	profiles: HashMap<IdentHash, PeerProfile>,
}

impl ProfileStore {
	pub fn new() -> ProfileStore {
		ProfileStore {
			profiles: HashMap::new(),
		}
	}

	fn entry(&mut self, peer: &IdentHash, now: u64) -> &mut PeerProfile {
		self.profiles
			.entry(*peer)
			.and_modify(|p| {
				if p.is_expired(now) {
					*p = PeerProfile::new(now);
				}
			})
			.or_insert_with(|| PeerProfile::new(now))
	}

	pub fn on_connected(&mut self, peer: &IdentHash, now: u64) {
		self.entry(peer, now_secs(now)).usage.connected += 1;
		self.entry(peer, now).last_update_timestamp = now;
	}

	pub fn on_duplicated(&mut self, peer: &IdentHash, now: u64) {
		self.entry(peer, now).usage.duplicated += 1;
	}

	pub fn on_tunnel_agreed(&mut self, peer: &IdentHash, now: u64) {
		self.entry(peer, now).participation.agreed += 1;
	}

	pub fn on_tunnel_declined(&mut self, peer: &IdentHash, now: u64) {
		self.entry(peer, now).participation.declined += 1;
	}

	pub fn on_tunnel_nonreplied(&mut self, peer: &IdentHash, now: u64) {
		self.entry(peer, now).participation.nonreplied += 1;
	}

	pub fn on_taken(&mut self, peer: &IdentHash, now: u64) {
		self.entry(peer, now).usage.taken += 1;
	}

	pub fn on_rejected(&mut self, peer: &IdentHash, now: u64) {
		self.entry(peer, now).usage.rejected += 1;
	}

	pub fn on_unreachable(&mut self, peer: &IdentHash, now: u64) {
		let profile = self.entry(peer, now);
		profile.last_unreachable_time = Some(now);
	}

	pub fn get(&self, peer: &IdentHash) -> Option<&PeerProfile> {
		self.profiles.get(peer)
	}

	/// Drops profiles that have not been touched within `PROFILE_EXPIRY_SECS`.
	pub fn sweep_expired(&mut self, now: u64) {
		self.profiles.retain(|_, p| !p.is_expired(now));
	}
}

impl Default for ProfileStore {
	fn default() -> Self {
		Self::new()
	}
}

pub fn unix_now() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("system clock before epoch")
		.as_secs()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counters_accumulate() {
		let mut store = ProfileStore::new();
		let peer = IdentHash::zero();
		store.on_connected(&peer, 1000);
		store.on_connected(&peer, 1001);
		store.on_tunnel_agreed(&peer, 1002);
		let profile = store.get(&peer).unwrap();
		assert_eq!(profile.usage.connected, 2);
		assert_eq!(profile.participation.agreed, 1);
	}

	#[test]
	fn expired_profile_resets_on_next_touch() {
		let mut store = ProfileStore::new();
		let peer = IdentHash::zero();
		store.on_connected(&peer, 0);
		store.on_connected(&peer, PROFILE_EXPIRY_SECS + 100);
		let profile = store.get(&peer).unwrap();
		assert_eq!(profile.usage.connected, 1, "stale profile should reset, not accumulate");
	}

	#[test]
	fn sweep_removes_stale_entries() {
		let mut store = ProfileStore::new();
		let peer = IdentHash::zero();
		store.on_connected(&peer, 0);
		store.sweep_expired(PROFILE_EXPIRY_SECS + 100);
		assert!(store.get(&peer).is_none());
	}
}
