//! Data-phase framing for an established NTCP-style session (spec §4.2):
//! `size:u16 || payload || padding || adler32:u32`, AES-256-CBC encrypted
//! as one continuous stream so each frame's ciphertext becomes the next
//! frame's IV.

use crate::codec::{Reader, Writer};
use crate::error::{Error, Result};
use crate::transport::handshake::CbcState;

/// Data-phase messages above this size are rejected outright rather than
/// fragmented; I2NP messages that need to go larger are split by the
/// tunnel-message layer before reaching the transport.
pub const NTCP_MAX_MESSAGE_SIZE: usize = 16384;

/// A `size == 0` frame carries no payload and exists purely to keep the
/// TCP connection (and any firewall/NAT state) alive.
const KEEPALIVE_SIZE: u16 = 0;

fn adler32(data: &[u8]) -> u32 {
	const MOD_ADLER: u32 = 65521;
	let mut a: u32 = 1;
	let mut b: u32 = 0;
	for &byte in data {
		a = (a + byte as u32) % MOD_ADLER;
		b = (b + a) % MOD_ADLER;
	}
	(b << 16) | a
}

/// Pads `size(2) + payload` up to the next 16-byte boundary, leaving room
/// for the trailing 4-byte checksum, and returns the full plaintext frame.
fn build_plaintext_frame(payload: &[u8]) -> Vec<u8> {
	let mut w = Writer::with_capacity(payload.len() + 16);
	w.put_u16(payload.len() as u16);
	w.put_bytes(payload);
	let mut buf = w.into_vec();
	let checksum = adler32(&buf);

	let unpadded_len = buf.len() + 4;
	let padded_len = ((unpadded_len + 15) / 16) * 16;
	buf.resize(padded_len - 4, 0);
	let mut out = Writer::with_capacity(padded_len);
	out.put_bytes(&buf);
	out.put_u32(checksum);
	out.into_vec()
}

/// Encrypts `payload` into a ready-to-send data-phase frame, encrypting in
/// place with the session's running CBC state so the IV chain continues
/// uninterrupted from the previous frame (or from Phase 3/4, for the very
/// first frame in each direction).
pub fn encode_frame(cbc: &mut CbcState, payload: &[u8]) -> Result<Vec<u8>> {
	if payload.len() > NTCP_MAX_MESSAGE_SIZE {
		return Err(Error::Protocol(format!(
			"message of {} bytes exceeds NTCP_MAX_MESSAGE_SIZE",
			payload.len()
		)));
	}
	let mut frame = build_plaintext_frame(payload);
	cbc.encrypt_blocks(&mut frame);
	Ok(frame)
}

pub fn encode_keepalive(cbc: &mut CbcState) -> Result<Vec<u8>> {
	let mut w = Writer::with_capacity(16);
	w.put_u16(KEEPALIVE_SIZE);
	w.put_bytes(&[0u8; 14]);
	let mut frame = w.into_vec();
	cbc.encrypt_blocks(&mut frame);
	Ok(frame)
}

pub enum DecodedFrame {
	Keepalive,
	Message(Vec<u8>),
}

/// Decrypts and validates one frame of `ciphertext` (which must already be
/// a multiple of 16 bytes — callers buffer partial reads themselves), and
/// returns either the decoded payload or a keepalive marker.
pub fn decode_frame(cbc: &mut CbcState, ciphertext: &[u8]) -> Result<DecodedFrame> {
	if ciphertext.len() % 16 != 0 || ciphertext.is_empty() {
		return Err(Error::Protocol("frame ciphertext must be a non-empty multiple of 16 bytes".into()));
	}
	let mut plaintext = ciphertext.to_vec();
	cbc.decrypt_blocks(&mut plaintext);
	validate_plain_frame(&plaintext)
}

/// Total padded length (including the trailing checksum) a frame with a
/// given declared `size` occupies. `size == 0` is the fixed 16-byte
/// keepalive frame.
pub fn padded_frame_len(size: u16) -> usize {
	if size == KEEPALIVE_SIZE {
		16
	} else {
		let unpadded = size as usize + 6;
		((unpadded + 15) / 16) * 16
	}
}

/// Validates and extracts a frame from already-decrypted `plaintext`
/// (exactly `padded_frame_len(size)` bytes, where `size` is read from the
/// first two bytes). Split out from `decode_frame` so an incremental,
/// block-at-a-time decryptor (see `transport::session::FrameReassembler`)
/// can decrypt once and validate separately instead of decrypting twice.
pub fn validate_plain_frame(plaintext: &[u8]) -> Result<DecodedFrame> {
	let mut r = Reader::new(plaintext);
	let size = r.take_u16()?;
	if size == KEEPALIVE_SIZE {
		return Ok(DecodedFrame::Keepalive);
	}
	let size = size as usize;
	if size > NTCP_MAX_MESSAGE_SIZE {
		return Err(Error::Protocol(format!(
			"declared frame size {size} exceeds NTCP_MAX_MESSAGE_SIZE"
		)));
	}
	if plaintext.len() < 2 + size + 4 {
		return Err(Error::parse("frame shorter than declared size + checksum"));
	}
	let payload = r.take(size)?.to_vec();
	let padding_len = plaintext.len() - 2 - size - 4;
	r.take(padding_len)?;
	let expected_checksum = r.take_u32()?;
	let actual_checksum = adler32(&plaintext[..plaintext.len() - 4]);
	if actual_checksum != expected_checksum {
		return Err(Error::Protocol("adler32 checksum mismatch".into()));
	}
	Ok(DecodedFrame::Message(payload))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn paired_state() -> (CbcState, CbcState) {
		let key = [9u8; 32];
		let iv = [5u8; 16];
		(CbcState::new_encryptor(&key, &iv), CbcState::new_decryptor(&key, &iv))
	}

	#[test]
	fn round_trip_message() {
		let (mut enc, mut dec) = paired_state();
		let payload = b"an I2NP message payload".to_vec();
		let frame = encode_frame(&mut enc, &payload).unwrap();
		assert_eq!(frame.len() % 16, 0);
		match decode_frame(&mut dec, &frame).unwrap() {
			DecodedFrame::Message(got) => assert_eq!(got, payload),
			DecodedFrame::Keepalive => panic!("expected message"),
		}
	}

	#[test]
	fn round_trip_multiple_frames_chain_iv() {
		let (mut enc, mut dec) = paired_state();
		let a = encode_frame(&mut enc, b"first").unwrap();
		let b = encode_frame(&mut enc, b"second").unwrap();
		match decode_frame(&mut dec, &a).unwrap() {
			DecodedFrame::Message(got) => assert_eq!(got, b"first"),
			_ => panic!(),
		}
		match decode_frame(&mut dec, &b).unwrap() {
			DecodedFrame::Message(got) => assert_eq!(got, b"second"),
			_ => panic!(),
		}
	}

	#[test]
	fn keepalive_round_trip() {
		let (mut enc, mut dec) = paired_state();
		let frame = encode_keepalive(&mut enc).unwrap();
		match decode_frame(&mut dec, &frame).unwrap() {
			DecodedFrame::Keepalive => {}
			DecodedFrame::Message(_) => panic!("expected keepalive"),
		}
	}

	#[test]
	fn oversized_message_rejected() {
		let (mut enc, _dec) = paired_state();
		let payload = vec![0u8; NTCP_MAX_MESSAGE_SIZE + 1];
		assert!(encode_frame(&mut enc, &payload).is_err());
	}

	#[test]
	fn tampered_frame_fails_checksum() {
		let (mut enc, mut dec) = paired_state();
		let mut frame = encode_frame(&mut enc, b"hello").unwrap();
		let last = frame.len() - 1;
		frame[last] ^= 0xFF;
		assert!(decode_frame(&mut dec, &frame).is_err());
	}
}
