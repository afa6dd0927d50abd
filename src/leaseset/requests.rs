//! `LeaseSetRequests` (spec §4.3.1): the outstanding-lookup state machine a
//! `LeaseSetDestination` drives. Timer scheduling itself lives in
//! `destination.rs` (as `tokio::time::sleep` futures); this module holds
//! the deterministic bookkeeping so it can be unit-tested without a runtime.

use std::collections::HashMap;

use crate::identity::{BlindedPublicKey, IdentHash};
use crate::leaseset::lease_set::LeaseSet;

/// spec §4.3.1.
pub const MAX_NUM_FLOODFILLS_PER_REQUEST: usize = 7;
pub const LEASESET_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const MAX_LEASESET_REQUEST_TIMEOUT_SECS: u64 = 40;

type Callback = Box<dyn FnOnce(Option<LeaseSet>) + Send>;

pub struct LeaseSetRequest {
	pub ident_hash: IdentHash,
	pub requested_blinded_key: Option<BlindedPublicKey>,
	callbacks: Vec<Callback>,
	excluded_floodfills: Vec<IdentHash>,
	started_at_secs: u64,
	last_attempt_at_secs: u64,
	tried: usize,
}

impl LeaseSetRequest {
	fn new(ident_hash: IdentHash, requested_blinded_key: Option<BlindedPublicKey>, now_secs: u64) -> LeaseSetRequest {
		LeaseSetRequest {
			ident_hash,
			requested_blinded_key,
			callbacks: Vec::new(),
			excluded_floodfills: Vec::new(),
			started_at_secs: now_secs,
			last_attempt_at_secs: now_secs,
			tried: 0,
		}
	}

	/// Hard cap on the whole request's lifetime, independent of individual
	/// per-floodfill timeouts.
	pub fn is_hard_timed_out(&self, now_secs: u64) -> bool {
		now_secs.saturating_sub(self.started_at_secs) >= MAX_LEASESET_REQUEST_TIMEOUT_SECS
	}

	/// Whether the current in-flight attempt against one floodfill has
	/// timed out and a new floodfill should be tried.
	pub fn attempt_timed_out(&self, now_secs: u64) -> bool {
		now_secs.saturating_sub(self.last_attempt_at_secs) >= LEASESET_REQUEST_TIMEOUT_SECS
	}

	pub fn has_tried_max_floodfills(&self) -> bool {
		self.tried >= MAX_NUM_FLOODFILLS_PER_REQUEST
	}
}

/// The destination's outstanding-lookup table: one entry per in-flight
/// `identHash`, joined by every caller requesting the same destination
/// while a lookup is already running.
#[derive(Default)]
pub struct LeaseSetRequests {
	requests: HashMap<IdentHash, LeaseSetRequest>,
}

pub enum StartResult {
	/// No request was running; the caller must kick off the first
	/// floodfill lookup.
	Started,
	/// A request was already in flight; the callback was queued onto it.
	Joined,
}

impl LeaseSetRequests {
	pub fn new() -> LeaseSetRequests {
		LeaseSetRequests::default()
	}

	pub fn start_or_join(
		&mut self,
		ident_hash: IdentHash,
		requested_blinded_key: Option<BlindedPublicKey>,
		callback: Callback,
		now_secs: u64,
	) -> StartResult {
		if let Some(existing) = self.requests.get_mut(&ident_hash) {
			existing.callbacks.push(callback);
			StartResult::Joined
		} else {
			let mut request = LeaseSetRequest::new(ident_hash, requested_blinded_key, now_secs);
			request.callbacks.push(callback);
			self.requests.insert(ident_hash, request);
			StartResult::Started
		}
	}

	/// Records that `floodfill` was just tried for `ident_hash`, adding it
	/// to the excluded set so the next attempt picks a different one
	/// (invariant (c): excluded set resets on every successful lookup —
	/// callers achieve that by calling `complete`, which drops the whole
	/// request).
	pub fn record_attempt(&mut self, ident_hash: &IdentHash, floodfill: IdentHash, now_secs: u64) {
		if let Some(req) = self.requests.get_mut(ident_hash) {
			req.excluded_floodfills.push(floodfill);
			req.tried += 1;
			req.last_attempt_at_secs = now_secs;
		}
	}

	pub fn excluded_floodfills(&self, ident_hash: &IdentHash) -> &[IdentHash] {
		self.requests
			.get(ident_hash)
			.map(|r| r.excluded_floodfills.as_slice())
			.unwrap_or(&[])
	}

	pub fn get(&self, ident_hash: &IdentHash) -> Option<&LeaseSetRequest> {
		self.requests.get(ident_hash)
	}

	/// Completes the request for `ident_hash`, invoking every queued
	/// callback exactly once (spec §4.3.1: "Completion invokes every
	/// registered callback exactly once").
	pub fn complete(&mut self, ident_hash: &IdentHash, result: Option<LeaseSet>) {
		if let Some(request) = self.requests.remove(ident_hash) {
			for callback in request.callbacks {
				let cloned = result.clone();
				callback(cloned);
			}
		}
	}

	/// Sweeps and completes (with `None`) every request whose hard timeout
	/// has elapsed.
	pub fn sweep_timed_out(&mut self, now_secs: u64) {
		let expired: Vec<IdentHash> = self
			.requests
			.iter()
			.filter(|(_, r)| r.is_hard_timed_out(now_secs))
			.map(|(h, _)| *h)
			.collect();
		for hash in expired {
			self.complete(&hash, None);
		}
	}

	pub fn is_pending(&self, ident_hash: &IdentHash) -> bool {
		self.requests.contains_key(ident_hash)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	#[test]
	fn second_request_joins_first_and_both_fire_on_complete() {
		let mut requests = LeaseSetRequests::new();
		let hash = IdentHash::zero();
		let calls = Arc::new(AtomicUsize::new(0));

		let c1 = calls.clone();
		matches!(
			requests.start_or_join(hash, None, Box::new(move |_| { c1.fetch_add(1, Ordering::SeqCst); }), 0),
			StartResult::Started
		);
		let c2 = calls.clone();
		matches!(
			requests.start_or_join(hash, None, Box::new(move |_| { c2.fetch_add(1, Ordering::SeqCst); }), 1),
			StartResult::Joined
		);

		requests.complete(&hash, None);
		assert_eq!(calls.load(Ordering::SeqCst), 2);
		assert!(!requests.is_pending(&hash));
	}

	#[test]
	fn hard_timeout_after_max_duration() {
		let mut requests = LeaseSetRequests::new();
		let hash = IdentHash::zero();
		requests.start_or_join(hash, None, Box::new(|_| {}), 0);
        requests.sweep_timed_out(MAX_LEASESET_REQUEST_TIMEOUT_SECS - 1);
        assert!(requests.is_pending(&hash));
        requests.sweep_timed_out(MAX_LEASESET_REQUEST_TIMEOUT_SECS);
        assert!(!requests.is_pending(&hash));
	}

	#[test]
	fn attempt_tracking_caps_at_max_floodfills() {
		let mut requests = LeaseSetRequests::new();
		let hash = IdentHash::zero();
		requests.start_or_join(hash, None, Box::new(|_| {}), 0);
		for i in 0..MAX_NUM_FLOODFILLS_PER_REQUEST {
			requests.record_attempt(&hash, IdentHash::new([i as u8; 32]), i as u64);
		}
		assert!(requests.get(&hash).unwrap().has_tried_max_floodfills());
	}
}
