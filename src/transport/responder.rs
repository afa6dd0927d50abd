//! Composes the four handshake phases defined in `handshake.rs` into the
//! responder's half of the exchange, run once per accepted connection
//! before it is handed to `session::spawn_session` (spec §4.2).
//!
//! Grounded on `original_source/NTCPSession.cpp`'s `ServerLogin`/
//! `HandlePhase1Received`..`HandlePhase3Received` chain, reshaped into a
//! single linear `async fn` instead of the C++'s callback state machine.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::identity::{IdentHash, IdentityEx, PrivateKeys};
use crate::transport::dh;
use crate::transport::handshake::{
	derive_aes_key, signed_data, verify_phase3, CbcState, Phase1, Phase2, Phase2Plaintext, Phase3Plaintext,
};

/// Result of a completed responder handshake: the two independent CBC
/// chains (one per direction — NTCP never reuses a single cipher for both)
/// and the initiator's verified identity.
pub struct ResponderHandshake {
	pub encrypt: CbcState,
	pub decrypt: CbcState,
	pub remote_identity: IdentityEx,
}

fn now_secs() -> u32 {
	crate::transport::profile::unix_now() as u32
}

/// Runs Phase 1-4 as the responder over an already-accepted `stream`.
/// `own_keys` signs Phase 4; `own_identity` is what Phase 1 is checked
/// against and what Phase 2/3's `signed_data` binds to.
pub async fn run_responder_handshake(mut stream: TcpStream, own_keys: &PrivateKeys) -> Result<(ResponderHandshake, TcpStream)> {
	let own_identity = own_keys.identity.clone();
	let own_hash: IdentHash = *own_identity.hash();

	let mut phase1_buf = [0u8; crate::transport::handshake::PHASE1_LEN];
	stream.read_exact(&mut phase1_buf).await?;
	let phase1 = Phase1::parse(&phase1_buf)?;
	if !phase1.verify_against(&own_hash) {
		return Err(Error::BadSignature);
	}
	let x = phase1.x;

	let responder_dh = dh::generate_keypair();
	let y = responder_dh.public;
	let ts_b = now_secs();

	let shared_secret = dh::shared_secret(&responder_dh.private, &x);
	let aes_key = derive_aes_key(&shared_secret)?;

	// Phase 2's IV is the last 16 bytes of X (spec §4.2); the responder's
	// own Phase 3 read chains from the last 16 bytes of its own ciphertext.
	let mut phase2_iv = [0u8; 16];
	phase2_iv.copy_from_slice(&x[x.len() - 16..]);
	let mut phase2_encryptor = CbcState::new_encryptor(&aes_key, &phase2_iv);

	let plaintext = Phase2Plaintext::new(&x, &y, ts_b);
	let mut plaintext_buf = plaintext.to_buffer();
	phase2_encryptor.encrypt_blocks(&mut plaintext_buf);
	let phase2 = Phase2 {
		y,
		encrypted: plaintext_buf,
	};
	stream.write_all(&phase2.to_buffer()).await?;

	let mut phase3_iv = [0u8; 16];
	phase3_iv.copy_from_slice(&phase2.encrypted[phase2.encrypted.len() - 16..]);
	let mut phase3_decryptor = CbcState::new_decryptor(&aes_key, &phase3_iv);

	// Read a plausible fixed-size Phase 3 block first (identity header +
	// timestamp), enough to discover the carried identity's signature
	// length, then read any remaining signature bytes.
	let mut phase3_head = [0u8; 16];
	stream.read_exact(&mut phase3_head).await?;
	phase3_decryptor.decrypt_blocks(&mut phase3_head);
	let ident_len = u16::from_be_bytes([phase3_head[0], phase3_head[1]]) as usize;

	let mut remaining_identity = vec![0u8; 0];
	let header_ident_bytes = &phase3_head[2..];
	if header_ident_bytes.len() < ident_len {
		let need = ident_len - header_ident_bytes.len();
		let mut rest = vec![0u8; ((need + 15) / 16) * 16];
		stream.read_exact(&mut rest).await?;
		phase3_decryptor.decrypt_blocks(&mut rest);
		remaining_identity = rest;
	}
	let mut full_identity_and_tail = header_ident_bytes.to_vec();
	full_identity_and_tail.extend_from_slice(&remaining_identity);

	let probe_identity = IdentityEx::from_buffer(&full_identity_and_tail[..ident_len])?;
	let sig_len = probe_identity.identity().signing_key_type().signature_len();

	let already_have = full_identity_and_tail.len() - ident_len;
	let ts_a_and_sig_len = 4 + sig_len;
	if already_have < ts_a_and_sig_len {
		let need = ts_a_and_sig_len - already_have;
		let mut rest = vec![0u8; ((need + 15) / 16) * 16];
		stream.read_exact(&mut rest).await?;
		phase3_decryptor.decrypt_blocks(&mut rest);
		full_identity_and_tail.extend_from_slice(&rest);
	}

	let phase3 = Phase3Plaintext::parse(&full_identity_and_tail, sig_len)?;
	let remote_identity = IdentityEx::from_buffer(&phase3.router_identity)?;
	let ok = verify_phase3(
		&phase3.router_identity,
		&phase3.signature,
		&x,
		&y,
		&own_hash,
		phase3.ts_a,
		ts_b,
	)?;
	if !ok {
		return Err(Error::BadSignature);
	}

	// Phase 4: the responder signs the same data with its own key and
	// sends it back, encrypted under the same running Phase3 decryptor
	// direction reused as the responder's own send cipher (the two
	// directions diverge into their own chains once the data phase
	// starts — see `session::spawn_session`).
	let responder_signed = signed_data(&x, &y, &own_hash, phase3.ts_a, ts_b);
	let responder_sig = own_keys.sign(&responder_signed)?;
	let phase4 = Phase3Plaintext {
		router_identity: own_identity.to_buffer(),
		ts_a: phase3.ts_a,
		signature: responder_sig,
	};
	let mut phase4_buf = phase4.to_buffer();
	phase2_encryptor.encrypt_blocks(&mut phase4_buf);
	stream.write_all(&phase4_buf).await?;

	let encrypt = phase2_encryptor;
	let decrypt = phase3_decryptor;

	Ok((
		ResponderHandshake {
			encrypt,
			decrypt,
			remote_identity,
		},
		stream,
	))
}
