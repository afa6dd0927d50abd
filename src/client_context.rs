//! The global router owner (spec §9, grounded on `ClientContext.{h,cpp}`):
//! one process-wide object holding the address book, the shared netdb/
//! tunnel-pool collaborators, and the table of live client destinations
//! keyed by nickname or ident hash. `src/bin/routerd.rs` constructs exactly
//! one of these at startup from a `RouterConfig`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::identity::{IdentHash, PrivateKeys};
use crate::leaseset::{ClientDestination, LeaseSetDestination};
use crate::naming::AddressBook;
use crate::netdb::{NetDb, TunnelPool};

/// Typed router configuration loaded via the `config` crate from a TOML
/// file, overridable by `I2P_*` environment variables. Defaults mirror the
/// reference router's built-in constants (spec §4.2/§4.3.1).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
	pub ntcp_port: u16,
	pub sam_tcp_port: u16,
	pub sam_udp_port: u16,
	pub bob_port: u16,
	pub i2cp_port: u16,
	pub keys_dir: String,
	/// Transport inactivity timeout, seconds (spec §4.2).
	pub transport_inactivity_timeout_secs: u64,
	/// Minimum interval between lease-set republications, seconds (spec §4.3.1).
	pub publish_min_interval_secs: u64,
}

impl Default for RouterConfig {
	fn default() -> RouterConfig {
		RouterConfig {
			ntcp_port: 7654,
			sam_tcp_port: 7656,
			sam_udp_port: 7655,
			bob_port: 2827,
			i2cp_port: 7654,
			keys_dir: "keys".to_string(),
			transport_inactivity_timeout_secs: 600,
			publish_min_interval_secs: 20,
		}
	}
}

impl RouterConfig {
	/// Loads from `path` (TOML), falling back to defaults for any field the
	/// file omits, then lets `I2P_*` environment variables override
	/// individual fields (e.g. `I2P_SAM_TCP_PORT=7656`).
	pub fn load(path: &str) -> Result<RouterConfig> {
		let settings = config::Config::builder()
			.add_source(config::File::with_name(path).required(false))
			.add_source(config::Environment::with_prefix("I2P"))
			.build()
			.map_err(|e| Error::Parse(format!("router config: {e}")))?;
		settings.try_deserialize().map_err(|e| Error::Parse(format!("router config: {e}")))
	}
}

/// Owns every live local destination, the shared naming/netdb/tunnel-pool
/// collaborators, and dispatches new destinations to the SAM/BOB/I2CP
/// bridges that requested them.
pub struct ClientContext {
	pub config: RouterConfig,
	pub address_book: AddressBook,
	netdb: Arc<dyn NetDb>,
	tunnels: Arc<dyn TunnelPool>,
	destinations: HashMap<IdentHash, ClientDestination>,
}

impl ClientContext {
	pub fn new(config: RouterConfig, netdb: Arc<dyn NetDb>, tunnels: Arc<dyn TunnelPool>) -> ClientContext {
		ClientContext {
			config,
			address_book: AddressBook::new(),
			netdb,
			tunnels,
			destinations: HashMap::new(),
		}
	}

	/// Creates (or returns the already-acquired) destination for `keys`,
	/// matching SAM/BOB/I2CP session-creation semantics where repeated
	/// requests for the same identity (typically reloaded from the same
	/// keys file) share one underlying destination.
	pub fn acquire_destination(&mut self, keys: PrivateKeys) -> &ClientDestination {
		let hash = *keys.identity.hash();
		let dest = self
			.destinations
			.entry(hash)
			.or_insert_with(|| ClientDestination::new(Arc::new(LeaseSetDestination::new(keys, self.netdb.clone()))));
		dest.acquire();
		&*dest
	}

	pub fn release_destination(&mut self, ident: &IdentHash) {
		let mut drop_it = false;
		if let Some(dest) = self.destinations.get(ident) {
			drop_it = dest.release() == 0;
		}
		if drop_it {
			self.destinations.remove(ident);
		}
	}

	pub fn find_destination(&self, ident: &IdentHash) -> Option<&ClientDestination> {
		self.destinations.get(ident)
	}

	pub fn destination_count(&self) -> usize {
		self.destinations.len()
	}

	pub fn tunnels(&self) -> &Arc<dyn TunnelPool> {
		&self.tunnels
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::netdb::{MockNetDb, MockTunnelPool};

	#[test]
	fn config_defaults_are_sane() {
		let cfg = RouterConfig::default();
		assert_eq!(cfg.sam_tcp_port, 7656);
		assert_eq!(cfg.bob_port, 2827);
	}

	#[test]
	fn acquire_then_release_drops_destination_at_zero_refcount() {
		let netdb: Arc<dyn NetDb> = Arc::new(MockNetDb::new(vec![]));
		let tunnels: Arc<dyn TunnelPool> = Arc::new(MockTunnelPool { tunnels: vec![] });
		let mut ctx = ClientContext::new(RouterConfig::default(), netdb, tunnels);
		let keys = PrivateKeys::generate_ed25519();
		let hash = *keys.identity.hash();
		ctx.acquire_destination(keys);
		assert_eq!(ctx.destination_count(), 1);
		ctx.release_destination(&hash);
		assert_eq!(ctx.destination_count(), 0);
	}

	#[test]
	fn repeated_acquire_shares_one_destination() {
		let netdb: Arc<dyn NetDb> = Arc::new(MockNetDb::new(vec![]));
		let tunnels: Arc<dyn TunnelPool> = Arc::new(MockTunnelPool { tunnels: vec![] });
		let mut ctx = ClientContext::new(RouterConfig::default(), netdb, tunnels);
		let keys = PrivateKeys::generate_ed25519();
		let hash = *keys.identity.hash();
		let keys_bytes = keys.to_buffer();
		let reloaded = PrivateKeys::from_buffer(&keys_bytes).unwrap();

		ctx.acquire_destination(keys);
		ctx.acquire_destination(reloaded);
		assert_eq!(ctx.destination_count(), 1);
		ctx.release_destination(&hash);
		assert_eq!(ctx.destination_count(), 1);
		ctx.release_destination(&hash);
		assert_eq!(ctx.destination_count(), 0);
	}
}
