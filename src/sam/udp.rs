//! SAM UDP sidecar (spec §4.4.1): `DATAGRAM`/`RAW` sessions exchange their
//! payloads over a UDP socket rather than the TCP command channel. Inbound
//! datagrams are forwarded to the client as
//! `<sender-b64>\n<payload>`; outbound sends from the client arrive as
//! `<style> <sessionID> DESTINATION=<b64>\n<payload>`. Parsing only —
//! socket ownership belongs to the router binary.

use crate::error::{Error, Result};

/// An inbound datagram forwarded to the SAM client's UDP port.
pub struct InboundForward<'a> {
	pub sender_destination_b64: &'a str,
	pub payload: &'a [u8],
}

pub fn format_inbound_forward(sender_destination_b64: &str, payload: &[u8]) -> Vec<u8> {
	let mut out = Vec::with_capacity(sender_destination_b64.len() + 1 + payload.len());
	out.extend_from_slice(sender_destination_b64.as_bytes());
	out.push(b'\n');
	out.extend_from_slice(payload);
	out
}

/// A datagram the client handed to the UDP sidecar for outbound delivery.
pub struct OutboundSend {
	pub style: String,
	pub session_id: String,
	pub destination_b64: String,
	pub payload: Vec<u8>,
}

/// Parses one UDP datagram received from a SAM client into its header line
/// and raw payload. The header is `STYLE SESSION_ID DESTINATION=b64...`,
/// terminated by the first `\n`.
pub fn parse_outbound_send(datagram: &[u8]) -> Result<OutboundSend> {
	let split_at = datagram
		.iter()
		.position(|&b| b == b'\n')
		.ok_or_else(|| Error::Protocol("UDP datagram missing header newline".into()))?;
	let header = std::str::from_utf8(&datagram[..split_at]).map_err(|_| Error::Protocol("UDP header not utf8".into()))?;
	let payload = datagram[split_at + 1..].to_vec();

	let mut tokens = header.split_whitespace();
	let style = tokens.next().ok_or_else(|| Error::Protocol("UDP header missing STYLE".into()))?.to_string();
	let session_id = tokens.next().ok_or_else(|| Error::Protocol("UDP header missing SESSION_ID".into()))?.to_string();
	let destination_b64 = tokens
		.find_map(|t| t.strip_prefix("DESTINATION="))
		.ok_or_else(|| Error::Protocol("UDP header missing DESTINATION=".into()))?
		.to_string();

	Ok(OutboundSend {
		style,
		session_id,
		destination_b64,
		payload,
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn formats_inbound_forward_with_newline_separator() {
		let wire = format_inbound_forward("abc123", b"payload-bytes");
		assert_eq!(wire, b"abc123\npayload-bytes".to_vec());
	}

	#[test]
	fn parses_outbound_send_header_and_payload() {
		let datagram = b"DATAGRAM mysession DESTINATION=someb64dest\nthe-actual-bytes";
		let parsed = parse_outbound_send(datagram).unwrap();
		assert_eq!(parsed.style, "DATAGRAM");
		assert_eq!(parsed.session_id, "mysession");
		assert_eq!(parsed.destination_b64, "someb64dest");
		assert_eq!(parsed.payload, b"the-actual-bytes".to_vec());
	}

	#[test]
	fn rejects_datagram_without_header_newline() {
		assert!(parse_outbound_send(b"no newline here").is_err());
	}

	#[test]
	fn rejects_header_missing_destination() {
		let datagram = b"RAW mysession\npayload";
		assert!(parse_outbound_send(datagram).is_err());
	}
}
