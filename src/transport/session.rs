//! The established transport session: send queue, inactivity timer, and the
//! read/write loop run as a single `tokio::spawn`ed task reachable only
//! through its mailbox (spec §5's executor-per-session model).
//!
//! Grounded on `original_source/NTCPSession.cpp`'s `Send`/`HandleReceivedData`
//! pair, reshaped into Rust's task + channel idiom instead of Boost.Asio
//! callbacks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::identity::IdentityEx;
use crate::transport::framing::{self, DecodedFrame};
use crate::transport::handshake::CbcState;

/// Inactivity timeout (spec §4.2): cancels and re-arms on every send/receive
/// completion; expiry closes the socket.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(120);

pub enum Command {
	Send(Vec<u8>),
	Terminate,
}

/// Read-only counters a caller can poll without going through the mailbox.
#[derive(Clone, Default)]
pub struct SessionStats {
	pub num_sent_bytes: Arc<AtomicU64>,
	pub num_received_bytes: Arc<AtomicU64>,
	pub is_established: Arc<AtomicBool>,
}

/// Handle to a running session task. Dropping `tx` (or sending `Terminate`)
/// ends the session.
pub struct TransportSessionHandle {
	pub tx: mpsc::UnboundedSender<Command>,
	pub remote_identity: IdentityEx,
	pub stats: SessionStats,
	pub join: tokio::task::JoinHandle<()>,
}

impl TransportSessionHandle {
	pub fn send(&self, msg: Vec<u8>) {
		let _ = self.tx.send(Command::Send(msg));
	}

	pub fn terminate(&self) {
		let _ = self.tx.send(Command::Terminate);
	}
}

/// Spawns the session task. `on_message` is invoked with each decoded I2NP
/// payload; `on_disconnect` fires exactly once when the session terminates
/// for any reason (inactivity, peer close, decryption failure, explicit
/// `Terminate`).
pub fn spawn_session<FMsg, FDisconnect>(
	stream: TcpStream,
	encrypt: CbcState,
	decrypt: CbcState,
	remote_identity: IdentityEx,
	mut on_message: FMsg,
	on_disconnect: FDisconnect,
) -> TransportSessionHandle
where
	FMsg: FnMut(Vec<u8>) + Send + 'static,
	FDisconnect: FnOnce(IdentHashOwned) + Send + 'static,
{
	let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
	let stats = SessionStats {
		num_sent_bytes: Arc::new(AtomicU64::new(0)),
		num_received_bytes: Arc::new(AtomicU64::new(0)),
		is_established: Arc::new(AtomicBool::new(true)),
	};
	let task_stats = stats.clone();
	let hash_for_disconnect = remote_identity.hash().0;

	let join = tokio::spawn(async move {
		let (mut reader, mut writer) = stream.into_split();
		let mut encrypt = encrypt;
		let mut reassembler = FrameReassembler::new(decrypt);
		let mut read_chunk = [0u8; 4096];

		let deadline = tokio::time::sleep(INACTIVITY_TIMEOUT);
		tokio::pin!(deadline);

		loop {
			tokio::select! {
				biased;

				_ = &mut deadline => {
					info!("transport session idle timeout, terminating");
					break;
				}

				cmd = rx.recv() => {
					match cmd {
						Some(Command::Send(payload)) => {
							match framing::encode_frame(&mut encrypt, &payload) {
								Ok(frame) => {
									if writer.write_all(&frame).await.is_err() {
										warn!("write failed, terminating session");
										break;
									}
									task_stats.num_sent_bytes.fetch_add(frame.len() as u64, Ordering::Relaxed);
									deadline.as_mut().reset(Instant::now() + INACTIVITY_TIMEOUT);
								}
								Err(e) => warn!("failed to encode outbound frame: {e}"),
							}
						}
						Some(Command::Terminate) | None => {
							debug!("session terminating by request");
							break;
						}
					}
				}

				read_result = reader.read(&mut read_chunk) => {
					match read_result {
						Ok(0) => {
							debug!("peer closed the connection");
							break;
						}
						Ok(n) => {
							task_stats.num_received_bytes.fetch_add(n as u64, Ordering::Relaxed);
							deadline.as_mut().reset(Instant::now() + INACTIVITY_TIMEOUT);

							match reassembler.feed(&read_chunk[..n]) {
								Ok(frames) => {
									for frame in frames {
										if let DecodedFrame::Message(payload) = frame {
											on_message(payload);
										}
									}
								}
								Err(e) => {
									warn!("frame decode failed, terminating session: {e}");
									break;
								}
							}
						}
						Err(e) => {
							warn!("read failed: {e}");
							break;
						}
					}
				}
			}
		}

		task_stats.is_established.store(false, Ordering::Relaxed);
		on_disconnect(IdentHashOwned(hash_for_disconnect));
	});

	TransportSessionHandle {
		tx,
		remote_identity,
		stats,
		join,
	}
}

/// Plain wrapper so the disconnect callback doesn't need to borrow the
/// session's `IdentityEx` (which owns a non-`Clone`-cheap verifier mutex).
pub struct IdentHashOwned(pub [u8; 32]);

/// Reassembles the declared-`size`-prefixed data-phase stream across
/// arbitrarily many 16-byte blocks, since a message's payload is rarely an
/// exact multiple of the block size. Kept separate from the read loop above
/// so the framing logic is independently testable.
pub struct FrameReassembler {
	cbc: CbcState,
	/// Raw ciphertext not yet decrypted (always < 16 bytes between feeds).
	cipher_buf: Vec<u8>,
	/// Decrypted bytes belonging to the frame currently being assembled.
	plain_buf: Vec<u8>,
}

impl FrameReassembler {
	pub fn new(cbc: CbcState) -> FrameReassembler {
		FrameReassembler {
			cbc,
			cipher_buf: Vec::new(),
			plain_buf: Vec::new(),
		}
	}

	/// Feeds raw ciphertext bytes (any length) and returns every complete
	/// message/keepalive decoded so far. Decrypts each 16-byte block exactly
	/// once, in order, so the CBC chain state never needs to be rewound.
	pub fn feed(&mut self, ciphertext: &[u8]) -> crate::error::Result<Vec<DecodedFrame>> {
		self.cipher_buf.extend_from_slice(ciphertext);
		let mut out = Vec::new();

		while self.cipher_buf.len() >= 16 {
			let mut block: Vec<u8> = self.cipher_buf.drain(..16).collect();
			self.cbc.decrypt_blocks(&mut block);
			self.plain_buf.extend_from_slice(&block);

			if self.plain_buf.len() < 2 {
				continue;
			}
			let size = u16::from_be_bytes([self.plain_buf[0], self.plain_buf[1]]);
			let total_len = framing::padded_frame_len(size);
			if self.plain_buf.len() < total_len {
				continue;
			}
			let frame: Vec<u8> = self.plain_buf.drain(..total_len).collect();
			out.push(framing::validate_plain_frame(&frame)?);
		}
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn reassembler_handles_split_feeds() {
		let key = [11u8; 32];
		let iv = [4u8; 16];
		let mut enc = CbcState::new_encryptor(&key, &iv);
		let dec = CbcState::new_decryptor(&key, &iv);

		let frame_a = framing::encode_frame(&mut enc, b"hello world").unwrap();
		let frame_b = framing::encode_frame(&mut enc, b"second message").unwrap();

		let mut reassembler = FrameReassembler::new(dec);
		let mut out = reassembler.feed(&frame_a[..8]).unwrap();
		assert!(out.is_empty());
		out.extend(reassembler.feed(&frame_a[8..]).unwrap());
		assert_eq!(out.len(), 1);

		let mut combined = Vec::new();
		combined.extend_from_slice(&frame_b);
		out.extend(reassembler.feed(&combined).unwrap());
		assert_eq!(out.len(), 2);
	}
}
