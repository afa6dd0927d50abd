//! Listen/dial acceptor and ban list (spec §4.2's "Acceptor" paragraph).
//!
//! Grounded on `original_source/NTCPSession.cpp`'s `NTCP2Server` accept loop:
//! a new connection always starts in `Idle` and runs the handshake before
//! being handed to the session table: `original_source/NTCPSession.cpp`.

use std::collections::HashMap;
use std::net::SocketAddr;

use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::error::Result;

/// `peer address -> ban-until-epoch-seconds` (spec §4.2).
#[derive(Default)]
pub struct BanList {
	bans: HashMap<SocketAddr, u32>,
}

impl BanList {
	pub fn new() -> BanList {
		BanList::default()
	}

	pub fn ban(&mut self, addr: SocketAddr, until_epoch_secs: u32) {
		self.bans.insert(addr, until_epoch_secs);
	}

	/// Evicts the ban if it has elapsed and reports whether `addr` is
	/// currently banned.
	pub fn is_banned(&mut self, addr: &SocketAddr, now_epoch_secs: u32) -> bool {
		match self.bans.get(addr) {
			Some(&until) if until > now_epoch_secs => true,
			Some(_) => {
				self.bans.remove(addr);
				false
			}
			None => false,
		}
	}
}

/// A freshly accepted or dialed TCP connection, not yet run through the
/// handshake state machine.
pub struct InboundConnection {
	pub stream: TcpStream,
	pub peer_addr: SocketAddr,
}

/// Listens on the configured address(es) and forwards accepted connections
/// through `tx`, rejecting anything still on the ban list. Runs until the
/// listener errors or the task is dropped/cancelled.
pub async fn run_acceptor(
	listen_addr: SocketAddr,
	ban_list_default_secs: u32,
	tx: mpsc::UnboundedSender<InboundConnection>,
) -> Result<()> {
	let listener = TcpListener::bind(listen_addr).await?;
	let mut bans = BanList::new();
	info!("NTCP acceptor listening on {listen_addr}");

	loop {
		let (stream, peer_addr) = match listener.accept().await {
			Ok(pair) => pair,
			Err(e) => {
				warn!("accept failed: {e}");
				continue;
			}
		};

		let now = crate::transport::profile::unix_now() as u32;
		if bans.is_banned(&peer_addr, now) {
			debug!("rejecting banned peer {peer_addr}");
			drop(stream);
			continue;
		}

		if tx.send(InboundConnection { stream, peer_addr }).is_err() {
			break;
		}
		let _ = ban_list_default_secs;
	}
	Ok(())
}

/// Records a ban for a peer that closed the connection before sending any
/// bytes, per spec §4.2.
pub fn ban_for_early_close(bans: &mut BanList, addr: SocketAddr, now_epoch_secs: u32, duration_secs: u32) {
	bans.ban(addr, now_epoch_secs + duration_secs);
}

#[cfg(test)]
mod tests {
	use super::*;

	fn addr() -> SocketAddr {
		"127.0.0.1:4444".parse().unwrap()
	}

	#[test]
	fn ban_rejects_until_expiry() {
		let mut bans = BanList::new();
		bans.ban(addr(), 1000);
		assert!(bans.is_banned(&addr(), 999));
		assert!(!bans.is_banned(&addr(), 1000));
	}

	#[test]
	fn ban_is_evicted_after_expiry_check() {
		let mut bans = BanList::new();
		bans.ban(addr(), 1000);
		assert!(!bans.is_banned(&addr(), 1001));
		assert!(!bans.is_banned(&addr(), 0), "entry should have been evicted");
	}

	#[test]
	fn ban_for_early_close_computes_absolute_time() {
		let mut bans = BanList::new();
		ban_for_early_close(&mut bans, addr(), 5000, 600);
		assert!(bans.is_banned(&addr(), 5599));
		assert!(!bans.is_banned(&addr(), 5600));
	}
}
