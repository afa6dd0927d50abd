//! SAM command dispatch (spec §4.4.1). Pure state-transition logic: given a
//! parsed command and a `SamBackend` supplying destination/naming
//! operations, produces the reply line(s) and the follow-up action the
//! owning socket handler must perform (switch to a transparent byte-pipe,
//! open a forwarding connection, hand a datagram to the UDP sidecar, …).
//! The actual TCP/UDP plumbing lives outside this crate's test surface,
//! matching the "Async…/Post…" suspension-point convention.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::sam::parser::SamCommand;
use crate::sam::session::{negotiate_version, validate_session_id, SamSession, SessionStyle};

/// What the socket-handling layer must do after a command is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamAction {
	/// Just send the reply line(s); stay in command mode.
	None,
	/// Reply, then the socket becomes a transparent byte-pipe to the named
	/// remote destination.
	BecomeStreamPipe { session_id: String, destination: String },
	/// Reply, then queue an inbound-stream acceptor for this session.
	RegisterAccept { session_id: String },
	/// Each inbound stream on this session should open `host:port` and
	/// splice bytes both ways.
	RegisterForward { session_id: String, host: String, port: u16 },
	/// Send `payload` as a reliable/raw datagram to `destination`.
	SendDatagram { session_id: String, destination: String, reliable: bool, payload_len: usize },
}

pub struct SamServer {
	pub negotiated_version: Option<(u32, u32)>,
	pub sessions: HashMap<String, SamSession>,
}

pub trait SamBackend {
	/// Returns `(base64_public_destination, base64_private_keys)`.
	fn generate_destination(&self, sig_type: Option<&str>, crypto_type: Option<&str>) -> Result<(String, String)>;
	/// Resolves a hostname (or `ME` for the calling session's own
	/// destination) via the address book.
	fn lookup_name(&self, session_id: &str, name: &str) -> Result<String>;
}

impl Default for SamServer {
	fn default() -> Self {
		SamServer {
			negotiated_version: None,
			sessions: HashMap::new(),
		}
	}
}

impl SamServer {
	pub fn new() -> SamServer {
		SamServer::default()
	}

	pub fn process(&mut self, backend: &dyn SamBackend, cmd: &SamCommand) -> Result<(String, SamAction)> {
		if cmd.is("HELLO", "VERSION") {
			return self.handle_hello(cmd);
		}
		if self.negotiated_version.is_none() {
			return Err(Error::Protocol("HELLO VERSION must be the first command".into()));
		}
		if cmd.is("SESSION", "CREATE") {
			return self.handle_session_create(cmd);
		}
		if cmd.is("SESSION", "ADD") {
			return self.handle_session_add(cmd);
		}
		if cmd.is("SESSION", "REMOVE") {
			return self.handle_session_remove(cmd);
		}
		if cmd.is("STREAM", "CONNECT") {
			return self.handle_stream_connect(cmd);
		}
		if cmd.is("STREAM", "ACCEPT") {
			return self.handle_stream_accept(cmd);
		}
		if cmd.is("STREAM", "FORWARD") {
			return self.handle_stream_forward(cmd);
		}
		if cmd.is("DATAGRAM", "SEND") {
			return self.handle_datagram_send(cmd, true);
		}
		if cmd.is("RAW", "SEND") {
			return self.handle_datagram_send(cmd, false);
		}
		if cmd.is("NAMING", "LOOKUP") {
			return self.handle_naming_lookup(backend, cmd);
		}
		if cmd.is("DEST", "GENERATE") {
			return self.handle_dest_generate(backend, cmd);
		}
		if cmd.words[0].eq_ignore_ascii_case("PING") {
			let text = cmd.words.get(1).cloned().unwrap_or_default();
			return Ok((format!("PONG {text}\n"), SamAction::None));
		}
		Err(Error::Protocol(format!("unrecognised SAM command {:?}", cmd.words)))
	}

	fn handle_hello(&mut self, cmd: &SamCommand) -> Result<(String, SamAction)> {
		match negotiate_version(cmd.get("MIN"), cmd.get("MAX"))? {
			Some(v) => {
				self.negotiated_version = Some(v);
				Ok((format!("HELLO REPLY RESULT=OK VERSION={}.{}\n", v.0, v.1), SamAction::None))
			}
			None => Ok(("HELLO REPLY RESULT=NOVERSION\n".to_string(), SamAction::None)),
		}
	}

	fn handle_session_create(&mut self, cmd: &SamCommand) -> Result<(String, SamAction)> {
		let id = cmd.get("ID").ok_or_else(|| Error::Protocol("SESSION CREATE missing ID".into()))?;
		validate_session_id(id)?;
		if self.sessions.contains_key(id) {
			return Ok((
				"SESSION STATUS RESULT=DUPLICATED_ID\n".to_string(),
				SamAction::None,
			));
		}
		let style_token = cmd.get("STYLE").ok_or_else(|| Error::Protocol("SESSION CREATE missing STYLE".into()))?;
		let style = SessionStyle::parse(style_token)?;
		if style == SessionStyle::Master && self.negotiated_version.unwrap_or((0, 0)) < (3, 3) {
			return Err(Error::Protocol("MASTER sessions require SAM >= 3.3".into()));
		}

		let destination_token = cmd.get("DESTINATION").unwrap_or("TRANSIENT");
		let private_keys = if destination_token == "TRANSIENT" {
			"TRANSIENT_PLACEHOLDER".to_string()
		} else {
			destination_token.to_string()
		};

		let session = SamSession::new(id.to_string(), style, self.negotiated_version.unwrap());
		self.sessions.insert(id.to_string(), session);

		Ok((
			format!("SESSION STATUS RESULT=OK DESTINATION={private_keys}\n"),
			SamAction::None,
		))
	}

	fn handle_session_add(&mut self, cmd: &SamCommand) -> Result<(String, SamAction)> {
		let master_id = cmd.get("ID").ok_or_else(|| Error::Protocol("SESSION ADD missing ID".into()))?;
		let sub_id = cmd.get("SUB_ID").ok_or_else(|| Error::Protocol("SESSION ADD missing SUB_ID".into()))?;
		let style_token = cmd.get("STYLE").ok_or_else(|| Error::Protocol("SESSION ADD missing STYLE".into()))?;
		let style = SessionStyle::parse(style_token)?;
		let master = self.sessions.get_mut(master_id).ok_or_else(|| Error::NotFound(format!("no session {master_id}")))?;
		master.add_sub_session(sub_id.to_string(), style)?;
		Ok(("SESSION STATUS RESULT=OK\n".to_string(), SamAction::None))
	}

	fn handle_session_remove(&mut self, cmd: &SamCommand) -> Result<(String, SamAction)> {
		let master_id = cmd.get("ID").ok_or_else(|| Error::Protocol("SESSION REMOVE missing ID".into()))?;
		let sub_id = cmd.get("SUB_ID").ok_or_else(|| Error::Protocol("SESSION REMOVE missing SUB_ID".into()))?;
		let master = self.sessions.get_mut(master_id).ok_or_else(|| Error::NotFound(format!("no session {master_id}")))?;
		master.remove_sub_session(sub_id)?;
		Ok(("SESSION STATUS RESULT=OK\n".to_string(), SamAction::None))
	}

	fn handle_stream_connect(&mut self, cmd: &SamCommand) -> Result<(String, SamAction)> {
		let id = cmd.get("ID").ok_or_else(|| Error::Protocol("STREAM CONNECT missing ID".into()))?;
		if !self.sessions.contains_key(id) {
			return Err(Error::NotFound(format!("no session {id}")));
		}
		let destination = cmd.get("DESTINATION").ok_or_else(|| Error::Protocol("STREAM CONNECT missing DESTINATION".into()))?;
		let silent = cmd.get("SILENT").map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false);
		let reply = if silent { String::new() } else { "STREAM STATUS RESULT=OK\n".to_string() };
		Ok((
			reply,
			SamAction::BecomeStreamPipe {
				session_id: id.to_string(),
				destination: destination.to_string(),
			},
		))
	}

	fn handle_stream_accept(&mut self, cmd: &SamCommand) -> Result<(String, SamAction)> {
		let id = cmd.get("ID").ok_or_else(|| Error::Protocol("STREAM ACCEPT missing ID".into()))?;
		if !self.sessions.contains_key(id) {
			return Err(Error::NotFound(format!("no session {id}")));
		}
		Ok((
			"STREAM STATUS RESULT=OK\n".to_string(),
			SamAction::RegisterAccept { session_id: id.to_string() },
		))
	}

	fn handle_stream_forward(&mut self, cmd: &SamCommand) -> Result<(String, SamAction)> {
		let id = cmd.get("ID").ok_or_else(|| Error::Protocol("STREAM FORWARD missing ID".into()))?;
		if !self.sessions.contains_key(id) {
			return Err(Error::NotFound(format!("no session {id}")));
		}
		let port: u16 = cmd
			.get("PORT")
			.ok_or_else(|| Error::Protocol("STREAM FORWARD missing PORT".into()))?
			.parse()
			.map_err(|_| Error::Protocol("bad PORT in STREAM FORWARD".into()))?;
		let host = cmd.get("HOST").unwrap_or("127.0.0.1").to_string();
		Ok((
			"STREAM STATUS RESULT=OK\n".to_string(),
			SamAction::RegisterForward {
				session_id: id.to_string(),
				host,
				port,
			},
		))
	}

	fn handle_datagram_send(&mut self, cmd: &SamCommand, reliable: bool) -> Result<(String, SamAction)> {
		let id = cmd.get("ID").ok_or_else(|| Error::Protocol("DATAGRAM/RAW SEND missing ID".into()))?;
		if !self.sessions.contains_key(id) {
			return Err(Error::NotFound(format!("no session {id}")));
		}
		let destination = cmd.get("DESTINATION").ok_or_else(|| Error::Protocol("DATAGRAM/RAW SEND missing DESTINATION".into()))?;
		let size: usize = cmd
			.get("SIZE")
			.ok_or_else(|| Error::Protocol("DATAGRAM/RAW SEND missing SIZE".into()))?
			.parse()
			.map_err(|_| Error::Protocol("bad SIZE in DATAGRAM/RAW SEND".into()))?;
		// No reply line: the caller reads exactly `size` raw bytes off the
		// same socket next (spec §4.4.1).
		Ok((
			String::new(),
			SamAction::SendDatagram {
				session_id: id.to_string(),
				destination: destination.to_string(),
				reliable,
				payload_len: size,
			},
		))
	}

	fn handle_naming_lookup(&mut self, backend: &dyn SamBackend, cmd: &SamCommand) -> Result<(String, SamAction)> {
		let name = cmd.get("NAME").ok_or_else(|| Error::Protocol("NAMING LOOKUP missing NAME".into()))?;
		let session_id = cmd.get("ID").unwrap_or("");
		match backend.lookup_name(session_id, name) {
			Ok(b64) => Ok((format!("NAMING REPLY RESULT=OK NAME={name} VALUE={b64}\n"), SamAction::None)),
			Err(Error::NotFound(_)) => Ok((format!("NAMING REPLY RESULT=KEY_NOT_FOUND NAME={name}\n"), SamAction::None)),
			Err(e) => Err(e),
		}
	}

	fn handle_dest_generate(&mut self, backend: &dyn SamBackend, cmd: &SamCommand) -> Result<(String, SamAction)> {
		let (pub_b64, priv_b64) = backend.generate_destination(cmd.get("SIGNATURE_TYPE"), cmd.get("CRYPTO_TYPE"))?;
		Ok((format!("DEST REPLY PUB={pub_b64} PRIV={priv_b64}\n"), SamAction::None))
	}
}
