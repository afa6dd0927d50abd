//! I2CP session dispatch (spec §4.4.3): turns a decoded `I2cpMessage` into
//! the reply message(s) to write back and, where relevant, the action the
//! owning destination must perform. Sessions are keyed by a random
//! `u16` ID assigned at `CreateSession`, matching the reference server.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::i2cp::mapping;
use crate::i2cp::messages::{I2cpMessage, MessageStatus, MessageType, SessionStatus, I2CP_MAX_SEND_QUEUE_SIZE};
use crate::identity::{IdentHash, Identity};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I2cpAction {
	None,
	/// `SendMessage`/`SendMessageExpires`: hand `payload` to the garlic layer
	/// addressed to `to`, echoing `nonce` back to the client once delivered.
	SendMessage { to: IdentHash, payload: Vec<u8>, nonce: u32 },
	/// `DestroySession`: the caller should tear down the socket after
	/// flushing the reply.
	Terminate,
}

pub trait I2cpBackend {
	fn lookup_host(&self, name: &str) -> Result<IdentHash>;
}

pub struct I2cpClientSession {
	pub session_id: u16,
	pub identity: Identity,
	pub options: BTreeMap<String, String>,
	pub send_queue_bytes: usize,
}

#[derive(Default)]
pub struct I2cpServer {
	sessions: HashMap<u16, I2cpClientSession>,
	by_hash: HashMap<IdentHash, u16>,
}

impl I2cpServer {
	pub fn new() -> I2cpServer {
		I2cpServer::default()
	}

	/// `next_session_id` is supplied by the caller (the reference server
	/// draws it from an RNG; this module stays deterministic).
	pub fn process(&mut self, backend: &dyn I2cpBackend, msg: &I2cpMessage, next_session_id: u16) -> Result<(Vec<I2cpMessage>, I2cpAction)> {
		match msg.message_type {
			MessageType::GetDate => self.handle_get_date(&msg.payload),
			MessageType::CreateSession => self.handle_create_session(&msg.payload, next_session_id),
			MessageType::DestroySession => self.handle_destroy_session(&msg.payload),
			MessageType::SendMessage => self.handle_send_message(&msg.payload, false),
			MessageType::SendMessageExpires => self.handle_send_message(&msg.payload, true),
			MessageType::HostLookup => self.handle_host_lookup(backend, &msg.payload),
			other => Err(Error::Protocol(format!("{other:?} is not yet handled by this I2CP session"))),
		}
	}

	fn handle_get_date(&mut self, payload: &[u8]) -> Result<(Vec<I2cpMessage>, I2cpAction)> {
		// Client sends its version as a length-prefixed string; we echo it
		// back after an 8-byte millisecond timestamp, matching the
		// reference's `SetDate` reply shape. The timestamp itself is left at
		// 0 here — wall-clock time is the owning runtime's job, not this
		// pure dispatcher's.
		let mut out = Vec::with_capacity(8 + payload.len());
		out.extend_from_slice(&0u64.to_be_bytes());
		out.extend_from_slice(payload);
		Ok((vec![I2cpMessage::new(MessageType::SetDate, out)], I2cpAction::None))
	}

	fn handle_create_session(&mut self, payload: &[u8], session_id: u16) -> Result<(Vec<I2cpMessage>, I2cpAction)> {
		let identity = match Identity::from_buffer(payload) {
			Ok(id) => id,
			Err(_) => return Ok((self.session_status(0, SessionStatus::Invalid), I2cpAction::None)),
		};
		let offset = identity.full_len();
		let (options, _) = match mapping::decode(&payload[offset..]) {
			Ok(m) => m,
			Err(_) => return Ok((self.session_status(0, SessionStatus::Invalid), I2cpAction::None)),
		};

		let hash = IdentHash::of(&identity.to_buffer());
		if self.by_hash.contains_key(&hash) {
			return Ok((self.session_status(0, SessionStatus::Invalid), I2cpAction::None));
		}

		self.by_hash.insert(hash, session_id);
		self.sessions.insert(
			session_id,
			I2cpClientSession {
				session_id,
				identity,
				options,
				send_queue_bytes: 0,
			},
		);
		Ok((self.session_status(session_id, SessionStatus::Created), I2cpAction::None))
	}

	fn handle_destroy_session(&mut self, payload: &[u8]) -> Result<(Vec<I2cpMessage>, I2cpAction)> {
		let session_id = Self::read_session_id(payload)?;
		if let Some(session) = self.sessions.remove(&session_id) {
			let hash = IdentHash::of(&session.identity.to_buffer());
			self.by_hash.remove(&hash);
		}
		Ok((self.session_status(session_id, SessionStatus::Destroyed), I2cpAction::Terminate))
	}

	fn handle_send_message(&mut self, payload: &[u8], has_expiration: bool) -> Result<(Vec<I2cpMessage>, I2cpAction)> {
		let session_id = Self::read_session_id(payload)?;
		let session = self.sessions.get_mut(&session_id).ok_or_else(|| Error::NotFound(format!("no I2CP session {session_id}")))?;

		let mut offset = 2;
		let to = Identity::from_buffer(&payload[offset..]).map_err(|_| Error::parse("SendMessage: bad destination identity"))?;
		offset += to.full_len();

		if payload.len() < offset + 4 {
			return Err(Error::parse("SendMessage truncated before payload length"));
		}
		let payload_len = u32::from_be_bytes(payload[offset..offset + 4].try_into().unwrap()) as usize;
		offset += 4;

		if payload.len() < offset + payload_len + 4 {
			return Err(Error::parse("SendMessage truncated before nonce"));
		}
		let body = payload[offset..offset + payload_len].to_vec();
		let nonce = u32::from_be_bytes(payload[offset + payload_len..offset + payload_len + 4].try_into().unwrap());
		// `SendMessageExpires` additionally trails a 6-byte expiration field
		// which the reference handler strips from `len` before dispatch; we
		// already bounded on `payload_len` so no extra trimming is needed
		// here, it only affects how many trailing bytes the caller framed.
		let _ = has_expiration;

		if session.send_queue_bytes + body.len() > I2CP_MAX_SEND_QUEUE_SIZE {
			return Err(Error::ResourceExhausted("I2CP send queue overflow".into()));
		}
		session.send_queue_bytes += body.len();

		let status = I2cpMessage::new(MessageType::MessageStatus, Self::message_status_payload(nonce, MessageStatus::Accepted));
		Ok((
			vec![status],
			I2cpAction::SendMessage {
				to: IdentHash::of(&to.to_buffer()),
				payload: body,
				nonce,
			},
		))
	}

	fn handle_host_lookup(&mut self, backend: &dyn I2cpBackend, payload: &[u8]) -> Result<(Vec<I2cpMessage>, I2cpAction)> {
		if payload.len() < 11 {
			return Err(Error::parse("HostLookup frame too short"));
		}
		let request_id = u32::from_be_bytes(payload[2..6].try_into().unwrap());
		let kind = payload[10];
		let result = match kind {
			0 => {
				if payload.len() < 11 + 32 {
					return Err(Error::parse("HostLookup hash lookup truncated"));
				}
				let mut raw = [0u8; 32];
				raw.copy_from_slice(&payload[11..11 + 32]);
				Ok(IdentHash::new(raw))
			}
			1 => {
				let name = std::str::from_utf8(&payload[11..]).map_err(|_| Error::parse("HostLookup name not utf8"))?;
				backend.lookup_host(name.trim_end_matches('\0'))
			}
			other => Err(Error::Protocol(format!("unknown HostLookup kind {other}"))),
		};

		let reply_payload = match result {
			Ok(hash) => {
				let mut out = request_id.to_be_bytes().to_vec();
				out.push(0); // result: found
				out.extend_from_slice(&hash.0);
				out
			}
			Err(_) => {
				let mut out = request_id.to_be_bytes().to_vec();
				out.push(1); // result: not found
				out
			}
		};
		Ok((vec![I2cpMessage::new(MessageType::HostReply, reply_payload)], I2cpAction::None))
	}

	fn read_session_id(payload: &[u8]) -> Result<u16> {
		if payload.len() < 2 {
			return Err(Error::parse("message missing session id"));
		}
		Ok(u16::from_be_bytes([payload[0], payload[1]]))
	}

	fn message_status_payload(nonce: u32, status: MessageStatus) -> Vec<u8> {
		let mut out = nonce.to_be_bytes().to_vec();
		out.push(status as u8);
		out
	}

	fn session_status(&self, session_id: u16, status: SessionStatus) -> Vec<I2cpMessage> {
		let mut payload = session_id.to_be_bytes().to_vec();
		payload.push(status as u8);
		vec![I2cpMessage::new(MessageType::SessionStatus, payload)]
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::identity::PrivateKeys;

	struct FakeBackend;
	impl I2cpBackend for FakeBackend {
		fn lookup_host(&self, name: &str) -> Result<IdentHash> {
			if name == "known.i2p" {
				Ok(IdentHash::of(b"known"))
			} else {
				Err(Error::NotFound(name.to_string()))
			}
		}
	}

	fn create_session_payload() -> (Vec<u8>, IdentHash) {
		let keys = PrivateKeys::generate_ed25519();
		let identity_bytes = keys.identity.to_buffer();
		let hash = *keys.identity.hash();
		let mut payload = identity_bytes;
		payload.extend_from_slice(&mapping::encode(&BTreeMap::new()));
		(payload, hash)
	}

	#[test]
	fn create_session_then_destroy() {
		let mut server = I2cpServer::new();
		let (payload, _hash) = create_session_payload();
		let msg = I2cpMessage::new(MessageType::CreateSession, payload);
		let (replies, action) = server.process(&FakeBackend, &msg, 42).unwrap();
		assert_eq!(action, I2cpAction::None);
		assert_eq!(replies[0].message_type, MessageType::SessionStatus);
		assert_eq!(replies[0].payload[2], SessionStatus::Created as u8);

		let destroy_payload = 42u16.to_be_bytes().to_vec();
		let destroy = I2cpMessage::new(MessageType::DestroySession, destroy_payload);
		let (replies, action) = server.process(&FakeBackend, &destroy, 0).unwrap();
		assert_eq!(action, I2cpAction::Terminate);
		assert_eq!(replies[0].payload[2], SessionStatus::Destroyed as u8);
	}

	#[test]
	fn duplicate_destination_is_rejected() {
		let mut server = I2cpServer::new();
		let (payload, _) = create_session_payload();
		let msg = I2cpMessage::new(MessageType::CreateSession, payload.clone());
		server.process(&FakeBackend, &msg, 1).unwrap();
		let (replies, _) = server.process(&FakeBackend, &msg, 2).unwrap();
		assert_eq!(replies[0].payload[2], SessionStatus::Invalid as u8);
	}

	#[test]
	fn send_message_round_trip_produces_accepted_status_and_action() {
		let mut server = I2cpServer::new();
		let (payload, _) = create_session_payload();
		let create = I2cpMessage::new(MessageType::CreateSession, payload);
		server.process(&FakeBackend, &create, 7).unwrap();

		let recipient = PrivateKeys::generate_ed25519();
		let recipient_bytes = recipient.identity.to_buffer();
		let mut send_payload = 7u16.to_be_bytes().to_vec();
		send_payload.extend_from_slice(&recipient_bytes);
		let body = b"hello";
		send_payload.extend_from_slice(&(body.len() as u32).to_be_bytes());
		send_payload.extend_from_slice(body);
		send_payload.extend_from_slice(&99u32.to_be_bytes());

		let send = I2cpMessage::new(MessageType::SendMessage, send_payload);
		let (replies, action) = server.process(&FakeBackend, &send, 0).unwrap();
		assert_eq!(replies[0].message_type, MessageType::MessageStatus);
		match action {
			I2cpAction::SendMessage { payload, nonce, .. } => {
				assert_eq!(payload, body.to_vec());
				assert_eq!(nonce, 99);
			}
			_ => panic!("expected SendMessage action"),
		}
	}

	#[test]
	fn host_lookup_by_name_hit_and_miss() {
		let mut server = I2cpServer::new();
		let mut payload = 0xFFFFu16.to_be_bytes().to_vec();
		payload.extend_from_slice(&1u32.to_be_bytes()); // requestID
		payload.extend_from_slice(&0u32.to_be_bytes()); // timeout
		payload.push(1); // kind: address
		payload.extend_from_slice(b"known.i2p");
		let msg = I2cpMessage::new(MessageType::HostLookup, payload);
		let (replies, _) = server.process(&FakeBackend, &msg, 0).unwrap();
		assert_eq!(replies[0].payload[4], 0); // found

		let mut miss_payload = 0xFFFFu16.to_be_bytes().to_vec();
		miss_payload.extend_from_slice(&2u32.to_be_bytes());
		miss_payload.extend_from_slice(&0u32.to_be_bytes());
		miss_payload.push(1);
		miss_payload.extend_from_slice(b"unknown.i2p");
		let miss_msg = I2cpMessage::new(MessageType::HostLookup, miss_payload);
		let (replies, _) = server.process(&FakeBackend, &miss_msg, 0).unwrap();
		assert_eq!(replies[0].payload[4], 1); // not found
	}

	#[test]
	fn send_queue_overflow_is_rejected() {
		let mut server = I2cpServer::new();
		let (payload, _) = create_session_payload();
		let create = I2cpMessage::new(MessageType::CreateSession, payload);
		server.process(&FakeBackend, &create, 3).unwrap();

		let recipient = PrivateKeys::generate_ed25519();
		let recipient_bytes = recipient.identity.to_buffer();
		let body = vec![0u8; I2CP_MAX_SEND_QUEUE_SIZE + 1];
		let mut send_payload = 3u16.to_be_bytes().to_vec();
		send_payload.extend_from_slice(&recipient_bytes);
		send_payload.extend_from_slice(&(body.len() as u32).to_be_bytes());
		send_payload.extend_from_slice(&body);
		send_payload.extend_from_slice(&1u32.to_be_bytes());

		let send = I2cpMessage::new(MessageType::SendMessage, send_payload);
		assert!(server.process(&FakeBackend, &send, 0).is_err());
	}
}
