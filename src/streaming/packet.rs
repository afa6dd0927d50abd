//! Stream packet wire format (spec §4.3.3): `sendStreamId || recvStreamId ||
//! seq || ackThrough || nack[] || resendDelay || flags || optionData ||
//! payload`.

use crate::codec::{Reader, Writer};
use crate::error::{Error, Result};
use crate::identity::Identity;

pub const STREAMING_MTU: usize = 1730;
pub const STREAMING_MTU_RATCHETS: usize = 1812;
pub const MAX_PACKET_SIZE: usize = 4096;
/// Wire cap: `nackCount` is a one-byte field, so 255 is the largest
/// value that round-trips (256 would encode as 0).
pub const MAX_NACKS: usize = 255;

pub const FLAG_SYNCHRONIZE: u16 = 0x0001;
pub const FLAG_CLOSE: u16 = 0x0002;
pub const FLAG_RESET: u16 = 0x0004;
pub const FLAG_SIGNATURE_INCLUDED: u16 = 0x0008;
pub const FLAG_SIGNATURE_TYPE_INCLUDED: u16 = 0x0010;
pub const FLAG_FROM_INCLUDED: u16 = 0x0020;
pub const FLAG_DELAY_REQUESTED: u16 = 0x0040;
pub const FLAG_MAX_PACKET_SIZE_INCLUDED: u16 = 0x0080;
pub const FLAG_ECHO: u16 = 0x0200;
pub const FLAG_NO_ACK: u16 = 0x0400;

/// `DELAY_REQUESTED` of exactly 0 asks for an immediate ACK.
pub const DELAY_REQUESTED_IMMEDIATE: u16 = 0;
/// Any `DELAY_REQUESTED` at or above this value is a choke request.
pub const DELAY_REQUESTED_CHOKE: u16 = 60000;

/// Optional fields a packet may carry, gated by bits in `flags`. Only the
/// subset this crate's engine actually emits/consumes is modelled; unknown
/// flag bits are preserved in `flags` but their payload is not parsed
/// (matches the "ignore unrecognised options" posture of spec §4.3.3).
#[derive(Debug, Clone, Default)]
pub struct PacketOptions {
	pub delay_requested: Option<u16>,
	pub from_identity: Option<Identity>,
	pub signature: Option<Vec<u8>>,
	pub max_packet_size: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct StreamPacket {
	pub send_stream_id: u32,
	pub recv_stream_id: u32,
	pub seq: u32,
	pub ack_through: u32,
	pub nacks: Vec<u32>,
	pub resend_delay: u8,
	pub flags: u16,
	pub options: PacketOptions,
	pub payload: Vec<u8>,
}

impl StreamPacket {
	pub fn is_control(&self) -> bool {
		self.seq == 0
	}

	pub fn has_flag(&self, flag: u16) -> bool {
		self.flags & flag != 0
	}

	pub fn to_buffer(&self) -> Vec<u8> {
		let mut w = Writer::with_capacity(MAX_PACKET_SIZE);
		w.put_u32(self.send_stream_id);
		w.put_u32(self.recv_stream_id);
		w.put_u32(self.seq);
		w.put_u32(self.ack_through);
		let nack_count = self.nacks.len().min(MAX_NACKS);
		w.put_u8(nack_count as u8);
		for n in self.nacks.iter().take(nack_count) {
			w.put_u32(*n);
		}
		w.put_u8(self.resend_delay);
		w.put_u16(self.flags);

		let mut opt = Writer::new();
		if self.has_flag(FLAG_DELAY_REQUESTED) {
			opt.put_u16(self.options.delay_requested.unwrap_or(0));
		}
		if self.has_flag(FLAG_FROM_INCLUDED) {
			if let Some(identity) = &self.options.from_identity {
				opt.put_bytes(&identity.to_buffer());
			}
		}
		if self.has_flag(FLAG_MAX_PACKET_SIZE_INCLUDED) {
			opt.put_u16(self.options.max_packet_size.unwrap_or(MAX_PACKET_SIZE as u16));
		}
		if self.has_flag(FLAG_SIGNATURE_INCLUDED) {
			if let Some(sig) = &self.options.signature {
				opt.put_bytes(sig);
			}
		}
		let opt_bytes = opt.into_vec();
		w.put_u16(opt_bytes.len() as u16);
		w.put_bytes(&opt_bytes);
		w.put_bytes(&self.payload);
		w.into_vec()
	}

	pub fn parse(buf: &[u8]) -> Result<StreamPacket> {
		let mut r = Reader::new(buf);
		let send_stream_id = r.take_u32()?;
		let recv_stream_id = r.take_u32()?;
		let seq = r.take_u32()?;
		let ack_through = r.take_u32()?;
		let nack_count = r.take_u8()? as usize;
		if nack_count > MAX_NACKS {
			return Err(Error::parse(format!("nack count {nack_count} exceeds {MAX_NACKS}")));
		}
		let mut nacks = Vec::with_capacity(nack_count);
		for _ in 0..nack_count {
			nacks.push(r.take_u32()?);
		}
		let resend_delay = r.take_u8()?;
		let flags = r.take_u16()?;
		let option_size = r.take_u16()? as usize;
		let option_bytes = r.take(option_size)?;

		let mut options = PacketOptions::default();
		let mut opt_r = Reader::new(option_bytes);
		if flags & FLAG_DELAY_REQUESTED != 0 {
			options.delay_requested = Some(opt_r.take_u16()?);
		}
		if flags & FLAG_FROM_INCLUDED != 0 {
			let rest = opt_r.take_rest();
			let identity = Identity::from_buffer(rest)?;
			let len = identity.full_len();
			options.from_identity = Some(identity);
			opt_r = Reader::new(&rest[len..]);
		}
		if flags & FLAG_MAX_PACKET_SIZE_INCLUDED != 0 {
			options.max_packet_size = Some(opt_r.take_u16()?);
		}
		if flags & FLAG_SIGNATURE_INCLUDED != 0 {
			let sig_len = if let Some(identity) = &options.from_identity {
				identity.signing_key_type().signature_len()
			} else {
				64
			};
			options.signature = Some(opt_r.take(sig_len.min(opt_r.remaining()))?.to_vec());
		}

		let payload = r.take_rest().to_vec();

		Ok(StreamPacket {
			send_stream_id,
			recv_stream_id,
			seq,
			ack_through,
			nacks,
			resend_delay,
			flags,
			options,
			payload,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip_data_packet() {
		let pkt = StreamPacket {
			send_stream_id: 1,
			recv_stream_id: 2,
			seq: 5,
			ack_through: 4,
			nacks: vec![],
			resend_delay: 0,
			flags: 0,
			options: PacketOptions::default(),
			payload: b"hello".to_vec(),
		};
		let buf = pkt.to_buffer();
		let parsed = StreamPacket::parse(&buf).unwrap();
		assert_eq!(parsed.seq, 5);
		assert_eq!(parsed.payload, b"hello");
		assert!(!parsed.is_control());
	}

	#[test]
	fn round_trip_with_nacks_and_delay_option() {
		let pkt = StreamPacket {
			send_stream_id: 10,
			recv_stream_id: 20,
			seq: 0,
			ack_through: 7,
			nacks: vec![3, 4, 6],
			resend_delay: 9,
			flags: FLAG_DELAY_REQUESTED,
			options: PacketOptions {
				delay_requested: Some(DELAY_REQUESTED_CHOKE),
				..Default::default()
			},
			payload: vec![],
		};
		let buf = pkt.to_buffer();
		let parsed = StreamPacket::parse(&buf).unwrap();
		assert!(parsed.is_control());
		assert_eq!(parsed.nacks, vec![3, 4, 6]);
		assert_eq!(parsed.options.delay_requested, Some(DELAY_REQUESTED_CHOKE));
	}

	#[test]
	fn nack_count_over_cap_is_rejected() {
		let mut buf = vec![0u8; 16];
		buf.push(255); // claims 255 nacks, but none follow
		assert!(StreamPacket::parse(&buf).is_err());
	}
}
