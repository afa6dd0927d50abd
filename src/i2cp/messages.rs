//! I2CP binary framing (spec §4.4.3): each message on the wire is
//! `length:u32 BE || type:u8 || payload[length]`, preceded once per
//! connection by a one-byte protocol sentinel. Exact type/status numbering
//! follows the reference router so existing I2CP clients work unmodified.

use crate::error::{Error, Result};

pub const I2CP_PROTOCOL_BYTE: u8 = 0x2A;
pub const I2CP_MAX_MESSAGE_LENGTH: usize = 65535;
pub const I2CP_MAX_SEND_QUEUE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
	CreateSession,
	ReconfigureSession,
	SessionStatus,
	DestroySession,
	RequestVariableLeaseSet,
	CreateLeaseSet,
	CreateLeaseSet2,
	SendMessage,
	SendMessageExpires,
	MessagePayload,
	MessageStatus,
	HostLookup,
	HostReply,
	DestLookup,
	DestReply,
	GetBandwidthLimits,
	BandwidthLimits,
	GetDate,
	SetDate,
}

impl MessageType {
	pub fn from_byte(b: u8) -> Result<MessageType> {
		use MessageType::*;
		Ok(match b {
			1 => CreateSession,
			2 => ReconfigureSession,
			20 => SessionStatus,
			3 => DestroySession,
			37 => RequestVariableLeaseSet,
			4 => CreateLeaseSet,
			41 => CreateLeaseSet2,
			5 => SendMessage,
			36 => SendMessageExpires,
			31 => MessagePayload,
			22 => MessageStatus,
			38 => HostLookup,
			39 => HostReply,
			34 => DestLookup,
			35 => DestReply,
			8 => GetBandwidthLimits,
			23 => BandwidthLimits,
			32 => GetDate,
			33 => SetDate,
			other => return Err(Error::Parse(format!("unknown I2CP message type {other}"))),
		})
	}

	pub fn to_byte(self) -> u8 {
		use MessageType::*;
		match self {
			CreateSession => 1,
			ReconfigureSession => 2,
			SessionStatus => 20,
			DestroySession => 3,
			RequestVariableLeaseSet => 37,
			CreateLeaseSet => 4,
			CreateLeaseSet2 => 41,
			SendMessage => 5,
			SendMessageExpires => 36,
			MessagePayload => 31,
			MessageStatus => 22,
			HostLookup => 38,
			HostReply => 39,
			DestLookup => 34,
			DestReply => 35,
			GetBandwidthLimits => 8,
			BandwidthLimits => 23,
			GetDate => 32,
			SetDate => 33,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
	Accepted = 1,
	GuaranteedSuccess = 4,
	GuaranteedFailure = 5,
	NoLeaseSet = 21,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
	Destroyed = 0,
	Created = 1,
	Updated = 2,
	Invalid = 3,
	Refused = 4,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cpMessage {
	pub message_type: MessageType,
	pub payload: Vec<u8>,
}

impl I2cpMessage {
	pub fn new(message_type: MessageType, payload: Vec<u8>) -> I2cpMessage {
		I2cpMessage { message_type, payload }
	}

	pub fn to_buffer(&self) -> Result<Vec<u8>> {
		if self.payload.len() > I2CP_MAX_MESSAGE_LENGTH {
			return Err(Error::ResourceExhausted("I2CP message exceeds max length".into()));
		}
		let mut out = Vec::with_capacity(5 + self.payload.len());
		out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
		out.push(self.message_type.to_byte());
		out.extend_from_slice(&self.payload);
		Ok(out)
	}

	/// Parses one `length||type||payload` frame, returning it and the
	/// number of bytes consumed. `buf` must not include the leading
	/// connection-level protocol sentinel.
	pub fn parse(buf: &[u8]) -> Result<(I2cpMessage, usize)> {
		if buf.len() < 5 {
			return Err(Error::parse("I2CP frame shorter than the length+type header"));
		}
		let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
		if length > I2CP_MAX_MESSAGE_LENGTH {
			return Err(Error::ResourceExhausted("I2CP message exceeds max length".into()));
		}
		if buf.len() < 5 + length {
			return Err(Error::parse("I2CP frame truncated before declared length"));
		}
		let message_type = MessageType::from_byte(buf[4])?;
		let payload = buf[5..5 + length].to_vec();
		Ok((I2cpMessage { message_type, payload }, 5 + length))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_a_frame() {
		let msg = I2cpMessage::new(MessageType::SendMessage, vec![1, 2, 3, 4]);
		let wire = msg.to_buffer().unwrap();
		let (parsed, consumed) = I2cpMessage::parse(&wire).unwrap();
		assert_eq!(parsed, msg);
		assert_eq!(consumed, wire.len());
	}

	#[test]
	fn rejects_oversized_payload() {
		let msg = I2cpMessage::new(MessageType::SendMessage, vec![0u8; I2CP_MAX_MESSAGE_LENGTH + 1]);
		assert!(msg.to_buffer().is_err());
	}

	#[test]
	fn rejects_truncated_frame() {
		let msg = I2cpMessage::new(MessageType::GetDate, vec![9, 9, 9]);
		let mut wire = msg.to_buffer().unwrap();
		wire.truncate(wire.len() - 1);
		assert!(I2cpMessage::parse(&wire).is_err());
	}

	#[test]
	fn message_type_numbering_matches_reference() {
		assert_eq!(MessageType::CreateSession.to_byte(), 1);
		assert_eq!(MessageType::SessionStatus.to_byte(), 20);
		assert_eq!(MessageType::CreateLeaseSet2.to_byte(), 41);
		assert_eq!(MessageType::from_byte(38).unwrap(), MessageType::HostLookup);
	}
}
