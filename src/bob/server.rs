//! BOB command dispatch (spec §4.4.2): maintains the tunnel table and the
//! session's "current nickname", and turns each `BobCommand` into exactly
//! one `OK `/`ERROR ` reply line. TCP splicing for the resulting inbound
//! and outbound tunnels lives outside this crate's pure test surface.

use std::collections::HashMap;

use crate::bob::commands::{error, ok, parse_line, BobCommand};
use crate::bob::tunnel::BobTunnel;
use crate::codec::base64_encode;
use crate::error::{Error, Result};
use crate::identity::PrivateKeys;

pub trait BobBackend {
	/// Resolves a hostname or raw base64 destination via the address book.
	fn lookup(&self, host: &str) -> Result<String>;
}

pub struct BobServer {
	tunnels: HashMap<String, BobTunnel>,
	current: Option<String>,
}

impl Default for BobServer {
	fn default() -> Self {
		BobServer {
			tunnels: HashMap::new(),
			current: None,
		}
	}
}

impl BobServer {
	pub fn new() -> BobServer {
		BobServer::default()
	}

	/// Parses and dispatches one line, always returning a single reply line.
	pub fn handle_line(&mut self, backend: &dyn BobBackend, line: &str) -> String {
		match parse_line(line).and_then(|cmd| self.dispatch(backend, cmd)) {
			Ok(reply) => reply,
			Err(e) => error(&e.to_string()),
		}
	}

	fn current_tunnel_mut(&mut self) -> Result<&mut BobTunnel> {
		let nick = self.current.clone().ok_or_else(|| Error::Protocol("tunnel nickname not set".into()))?;
		self.tunnels.get_mut(&nick).ok_or_else(|| Error::NotFound(format!("no such tunnel {nick}")))
	}

	fn dispatch(&mut self, backend: &dyn BobBackend, cmd: BobCommand) -> Result<String> {
		match cmd.verb.as_str() {
			"setnick" => self.cmd_setnick(cmd.arg),
			"getnick" => self.current.clone().map(|n| ok(&n)).ok_or_else(|| Error::Protocol("tunnel nickname not set".into())),
			"newkeys" => self.cmd_newkeys(cmd.arg),
			"setkeys" => self.cmd_setkeys(cmd.arg),
			"getkeys" => self.current_tunnel_mut()?.destination_b64().map(|b| ok(&b)).ok_or_else(|| Error::Protocol("no keys set".into())),
			"getdest" => self.current_tunnel_mut()?.destination_b64().map(|b| ok(&b)).ok_or_else(|| Error::Protocol("no keys set".into())),
			"inhost" => {
				let host = cmd.arg.ok_or_else(|| Error::Protocol("inhost requires an argument".into()))?;
				self.current_tunnel_mut()?.inhost = Some(host);
				Ok(ok(""))
			}
			"inport" => {
				let port = Self::parse_port(cmd.arg)?;
				self.current_tunnel_mut()?.inport = Some(port);
				Ok(ok(""))
			}
			"outhost" => {
				let host = cmd.arg.ok_or_else(|| Error::Protocol("outhost requires an argument".into()))?;
				self.current_tunnel_mut()?.outhost = Some(host);
				Ok(ok(""))
			}
			"outport" => {
				let port = Self::parse_port(cmd.arg)?;
				self.current_tunnel_mut()?.outport = Some(port);
				Ok(ok(""))
			}
			"quiet" => {
				self.current_tunnel_mut()?.quiet = true;
				Ok(ok(""))
			}
			"start" => {
				self.current_tunnel_mut()?.start()?;
				Ok(ok("Tunnel starting"))
			}
			"stop" => {
				self.current_tunnel_mut()?.stop();
				Ok(ok("Tunnel stopping"))
			}
			"clear" => {
				self.current_tunnel_mut()?.clear()?;
				Ok(ok(""))
			}
			"list" => {
				let mut names: Vec<&String> = self.tunnels.keys().collect();
				names.sort();
				Ok(ok(&names.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" ")))
			}
			"status" => {
				let name = cmd.arg.ok_or_else(|| Error::Protocol("status requires a nickname".into()))?;
				let tunnel = self.tunnels.get(&name).ok_or_else(|| Error::NotFound(format!("no such tunnel {name}")))?;
				Ok(ok(&tunnel.status_line()))
			}
			"option" => {
				// Options are accepted and ignored here; a concrete I2CP-options
				// sink belongs to the owning destination.
				cmd.arg.ok_or_else(|| Error::Protocol("option requires a key=value argument".into()))?;
				Ok(ok(""))
			}
			"lookup" => {
				let host = cmd.arg.ok_or_else(|| Error::Protocol("lookup requires a hostname".into()))?;
				backend.lookup(&host).map(|b64| ok(&b64))
			}
			"lookuplocal" => {
				let host = cmd.arg.ok_or_else(|| Error::Protocol("lookuplocal requires a hostname".into()))?;
				let tunnel = self.tunnels.get(&host).ok_or_else(|| Error::NotFound(format!("no such tunnel {host}")))?;
				tunnel.destination_b64().map(|b| ok(&b)).ok_or_else(|| Error::Protocol("no keys set".into()))
			}
			"help" => Ok(ok("setnick getnick newkeys setkeys getkeys getdest inhost inport outhost outport quiet start stop clear list status option lookup lookuplocal help quit zap")),
			"quit" => Ok(ok("Bye!")),
			"zap" => {
				self.tunnels.clear();
				self.current = None;
				Ok(ok("Zapped"))
			}
			other => Err(Error::Protocol(format!("unknown command {other}"))),
		}
	}

	fn cmd_setnick(&mut self, arg: Option<String>) -> Result<String> {
		let nick = arg.ok_or_else(|| Error::Protocol("setnick requires a nickname".into()))?;
		self.tunnels.entry(nick.clone()).or_insert_with(|| BobTunnel::new(nick.clone()));
		self.current = Some(nick);
		Ok(ok(""))
	}

	fn cmd_newkeys(&mut self, arg: Option<String>) -> Result<String> {
		// arg may carry `sigType [cryptoType]`; only Ed25519 is generated here.
		let _ = arg;
		let keys = PrivateKeys::generate_ed25519();
		let b64 = base64_encode(&keys.identity.to_buffer());
		self.current_tunnel_mut()?.keys = Some(keys);
		Ok(ok(&b64))
	}

	fn cmd_setkeys(&mut self, arg: Option<String>) -> Result<String> {
		let _b64 = arg.ok_or_else(|| Error::Protocol("setkeys requires a base64 key blob".into()))?;
		Err(Error::Protocol("setkeys: importing external private keys is not supported".into()))
	}

	fn parse_port(arg: Option<String>) -> Result<u16> {
		arg.ok_or_else(|| Error::Protocol("missing port argument".into()))?
			.parse()
			.map_err(|_| Error::Protocol("malformed port".into()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	struct FakeBackend;
	impl BobBackend for FakeBackend {
		fn lookup(&self, host: &str) -> Result<String> {
			if host == "known.i2p" {
				Ok("b64dest".to_string())
			} else {
				Err(Error::NotFound(host.to_string()))
			}
		}
	}

	#[test]
	fn full_inbound_tunnel_setup_flow() {
		let mut server = BobServer::new();
		assert_eq!(server.handle_line(&FakeBackend, "setnick mytun"), "OK \n");
		assert!(server.handle_line(&FakeBackend, "newkeys").starts_with("OK "));
		assert_eq!(server.handle_line(&FakeBackend, "inport 1234"), "OK \n");
		assert!(server.handle_line(&FakeBackend, "start").starts_with("OK "));
		assert!(server.handle_line(&FakeBackend, "status mytun").contains("RUNNING"));
	}

	#[test]
	fn start_without_keys_errors() {
		let mut server = BobServer::new();
		server.handle_line(&FakeBackend, "setnick mytun");
		server.handle_line(&FakeBackend, "inport 1234");
		assert!(server.handle_line(&FakeBackend, "start").starts_with("ERROR "));
	}

	#[test]
	fn commands_without_current_nickname_error() {
		let mut server = BobServer::new();
		assert!(server.handle_line(&FakeBackend, "inport 1234").starts_with("ERROR "));
	}

	#[test]
	fn lookup_hits_and_misses() {
		let mut server = BobServer::new();
		assert_eq!(server.handle_line(&FakeBackend, "lookup known.i2p"), "OK b64dest\n");
		assert!(server.handle_line(&FakeBackend, "lookup unknown.i2p").starts_with("ERROR "));
	}

	#[test]
	fn zap_clears_all_tunnels() {
		let mut server = BobServer::new();
		server.handle_line(&FakeBackend, "setnick a");
		server.handle_line(&FakeBackend, "zap");
		assert!(server.handle_line(&FakeBackend, "getnick").starts_with("ERROR "));
	}

	#[test]
	fn unknown_command_is_an_error() {
		let mut server = BobServer::new();
		assert!(server.handle_line(&FakeBackend, "bogus").starts_with("ERROR "));
	}
}
