//! MASTER session inbound routing (spec §4.4.1): a `MASTER` session shares
//! one destination across several `SESSION ADD`ed sub-sessions, each
//! optionally bound to a `PORT=` (the I2P-level port an inbound stream's
//! `TO_PORT` must match to be routed there). `SamSession` in `session.rs`
//! owns the attach/detach bookkeeping; this module is the lookup table used
//! when an inbound stream or datagram actually arrives and must be handed
//! to the right sub-session.

use std::collections::HashMap;

use crate::error::{Error, Result};

#[derive(Default)]
pub struct MasterRouter {
	/// Sub-session ID -> the I2P port it listens on, if any. A sub-session
	/// with no bound port is the catch-all for traffic matching no other
	/// entry.
	port_bindings: HashMap<String, Option<u16>>,
}

impl MasterRouter {
	pub fn new() -> MasterRouter {
		MasterRouter::default()
	}

	pub fn bind(&mut self, sub_id: String, port: Option<u16>) {
		self.port_bindings.insert(sub_id, port);
	}

	pub fn unbind(&mut self, sub_id: &str) -> Result<()> {
		self.port_bindings.remove(sub_id).map(|_| ()).ok_or_else(|| Error::NotFound(format!("no sub-session {sub_id}")))
	}

	/// Resolves which sub-session an inbound stream/datagram with the given
	/// destination `to_port` should be delivered to: an exact port match
	/// wins, otherwise the unbound catch-all sub-session if one exists.
	pub fn route(&self, to_port: u16) -> Option<&str> {
		self.port_bindings
			.iter()
			.find(|(_, bound)| **bound == Some(to_port))
			.or_else(|| self.port_bindings.iter().find(|(_, bound)| bound.is_none()))
			.map(|(id, _)| id.as_str())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn routes_to_exact_port_match() {
		let mut router = MasterRouter::new();
		router.bind("streams".to_string(), Some(80));
		router.bind("dgrams".to_string(), Some(443));
		assert_eq!(router.route(80), Some("streams"));
		assert_eq!(router.route(443), Some("dgrams"));
	}

	#[test]
	fn falls_back_to_unbound_catch_all() {
		let mut router = MasterRouter::new();
		router.bind("catch-all".to_string(), None);
		router.bind("specific".to_string(), Some(80));
		assert_eq!(router.route(9999), Some("catch-all"));
	}

	#[test]
	fn no_match_and_no_catch_all_returns_none() {
		let mut router = MasterRouter::new();
		router.bind("specific".to_string(), Some(80));
		assert_eq!(router.route(9999), None);
	}

	#[test]
	fn unbind_removes_routing_entry() {
		let mut router = MasterRouter::new();
		router.bind("a".to_string(), Some(80));
		router.unbind("a").unwrap();
		assert_eq!(router.route(80), None);
		assert!(router.unbind("a").is_err());
	}
}
