//! A single BOB nicknamed tunnel's configuration and lifecycle (spec
//! §4.4.2). `BobServer` in `server.rs` owns a table of these keyed by
//! nickname and mutates the one named by `setnick`.

use crate::codec::base64_encode;
use crate::error::{Error, Result};
use crate::identity::PrivateKeys;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelDirection {
	/// Accepts local TCP, opens an anonymous outbound stream.
	Inbound,
	/// Accepts anonymous inbound streams, connects out to a local TCP peer.
	Outbound,
	/// Neither endpoint configured yet.
	Undetermined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
	Stopped,
	Starting,
	Running,
}

pub struct BobTunnel {
	pub nickname: String,
	pub keys: Option<PrivateKeys>,
	pub inhost: Option<String>,
	pub inport: Option<u16>,
	pub outhost: Option<String>,
	pub outport: Option<u16>,
	pub quiet: bool,
	pub state: TunnelState,
}

impl BobTunnel {
	pub fn new(nickname: String) -> BobTunnel {
		BobTunnel {
			nickname,
			keys: None,
			inhost: None,
			inport: None,
			outhost: None,
			outport: None,
			quiet: false,
			state: TunnelState::Stopped,
		}
	}

	pub fn direction(&self) -> TunnelDirection {
		match (self.inport.is_some(), self.outhost.is_some() && self.outport.is_some()) {
			(true, _) => TunnelDirection::Inbound,
			(false, true) => TunnelDirection::Outbound,
			(false, false) => TunnelDirection::Undetermined,
		}
	}

	/// `start` requires keys and at least one endpoint pair configured.
	pub fn start(&mut self) -> Result<()> {
		if self.keys.is_none() {
			return Err(Error::Protocol("tunnel has no keys, run newkeys or setkeys first".into()));
		}
		if self.direction() == TunnelDirection::Undetermined {
			return Err(Error::Protocol("tunnel needs inport, or outhost+outport".into()));
		}
		self.state = TunnelState::Running;
		Ok(())
	}

	pub fn stop(&mut self) {
		self.state = TunnelState::Stopped;
	}

	pub fn clear(&mut self) -> Result<()> {
		if self.state == TunnelState::Running {
			return Err(Error::Protocol("stop the tunnel before clearing it".into()));
		}
		*self = BobTunnel::new(self.nickname.clone());
		Ok(())
	}

	pub fn destination_b64(&self) -> Option<String> {
		self.keys.as_ref().map(|k| base64_encode(&k.identity.to_buffer()))
	}

	pub fn status_line(&self) -> String {
		let state = match self.state {
			TunnelState::Stopped => "STOPPED",
			TunnelState::Starting => "STARTING",
			TunnelState::Running => "RUNNING",
		};
		format!("tunnel {} is {} {:?}", self.nickname, state, self.direction())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn start_requires_keys() {
		let mut t = BobTunnel::new("foo".into());
		t.inport = Some(1234);
		assert!(t.start().is_err());
	}

	#[test]
	fn start_requires_an_endpoint() {
		let mut t = BobTunnel::new("foo".into());
		t.keys = Some(PrivateKeys::generate_ed25519());
		assert!(t.start().is_err());
	}

	#[test]
	fn start_succeeds_with_keys_and_inport() {
		let mut t = BobTunnel::new("foo".into());
		t.keys = Some(PrivateKeys::generate_ed25519());
		t.inport = Some(1234);
		t.start().unwrap();
		assert_eq!(t.state, TunnelState::Running);
		assert_eq!(t.direction(), TunnelDirection::Inbound);
	}

	#[test]
	fn clear_refuses_while_running() {
		let mut t = BobTunnel::new("foo".into());
		t.keys = Some(PrivateKeys::generate_ed25519());
		t.inport = Some(1234);
		t.start().unwrap();
		assert!(t.clear().is_err());
		t.stop();
		t.clear().unwrap();
		assert!(t.keys.is_none());
	}

	#[test]
	fn destination_b64_present_once_keys_set() {
		let mut t = BobTunnel::new("foo".into());
		assert!(t.destination_b64().is_none());
		t.keys = Some(PrivateKeys::generate_ed25519());
		assert!(t.destination_b64().is_some());
	}
}
