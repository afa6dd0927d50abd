//! NTCP-style four-phase handshake (spec §4.2): Diffie-Hellman key exchange,
//! the shared-secret normaliser, and the Phase 1-4 message formats.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use cbc::{Decryptor, Encryptor};
use sha2::{Digest, Sha256};

use crate::codec::{Reader, Writer};
use crate::error::{Error, Result};
use crate::identity::{IdentHash, IdentityEx};
use crate::transport::dh;

pub const PHASE1_LEN: usize = 384;

/// Derive the AES-256 key from the raw DH shared secret `S` (256 bytes,
/// big-endian). Spec §4.2: three branches reproduced exactly for wire
/// compatibility — do not simplify.
pub fn derive_aes_key(s: &[u8; 256]) -> Result<[u8; 32]> {
	if s[0] & 0x80 != 0 {
		let mut key = [0u8; 32];
		key[0] = 0;
		key[1..32].copy_from_slice(&s[0..31]);
		return Ok(key);
	}
	if s[0] != 0 {
		let mut key = [0u8; 32];
		key.copy_from_slice(&s[0..32]);
		return Ok(key);
	}
	// leading zero bytes: scan forward to the first non-zero byte
	if let Some(start) = s.iter().position(|&b| b != 0) {
		if start + 32 <= s.len() {
			let mut key = [0u8; 32];
			key.copy_from_slice(&s[start..start + 32]);
			return Ok(key);
		}
	}
	Err(Error::CryptoMismatch(
		"DH shared secret has fewer than 32 non-leading-zero trailing bytes".into(),
	))
}

pub struct Phase1 {
	pub x: [u8; 256],
	/// `SHA-256(X)[i] XOR remoteIdentHash[i]`
	pub hx_xor_hi: [u8; 32],
}

impl Phase1 {
	pub fn build(x: [u8; 256], remote_ident_hash: &IdentHash) -> Phase1 {
		let hx = Sha256::digest(x);
		let mut hx_xor_hi = [0u8; 32];
		for i in 0..32 {
			hx_xor_hi[i] = hx[i] ^ remote_ident_hash.0[i];
		}
		Phase1 { x, hx_xor_hi }
	}

	pub fn to_buffer(&self) -> Vec<u8> {
		let mut w = Writer::with_capacity(PHASE1_LEN);
		w.put_bytes(&self.x);
		w.put_bytes(&self.hx_xor_hi);
		w.into_vec()
	}

	pub fn parse(buf: &[u8]) -> Result<Phase1> {
		if buf.len() != PHASE1_LEN {
			return Err(Error::parse("phase1 must be 384 bytes"));
		}
		let mut r = Reader::new(buf);
		let x: [u8; 256] = r.take(256)?.try_into().unwrap();
		let hx_xor_hi: [u8; 32] = r.take(32)?.try_into().unwrap();
		Ok(Phase1 { x, hx_xor_hi })
	}

	/// Responder-side check: `SHA-256(X) XOR received == own ident hash`.
	pub fn verify_against(&self, own_ident_hash: &IdentHash) -> bool {
		let hx = Sha256::digest(self.x);
		for i in 0..32 {
			if (hx[i] ^ self.hx_xor_hi[i]) != own_ident_hash.0[i] {
				return false;
			}
		}
		true
	}
}

/// The Phase 2 plaintext: `SHA-256(X||Y) || tsB:u32 || filler(12)`.
pub struct Phase2Plaintext {
	pub hxy: [u8; 32],
	pub ts_b: u32,
	pub filler: [u8; 12],
}

impl Phase2Plaintext {
	pub fn new(x: &[u8; 256], y: &[u8; 256], ts_b: u32) -> Self {
		let mut hasher = Sha256::new();
		hasher.update(x);
		hasher.update(y);
		let digest = hasher.finalize();
		let mut hxy = [0u8; 32];
		hxy.copy_from_slice(&digest);
		Phase2Plaintext {
			hxy,
			ts_b,
			filler: [0u8; 12],
		}
	}

	pub fn to_buffer(&self) -> Vec<u8> {
		let mut w = Writer::with_capacity(48);
		w.put_bytes(&self.hxy);
		w.put_u32(self.ts_b);
		w.put_bytes(&self.filler);
		w.into_vec()
	}

	pub fn parse(buf: &[u8]) -> Result<Phase2Plaintext> {
		if buf.len() != 48 {
			return Err(Error::parse("phase2 plaintext must be 48 bytes"));
		}
		let mut r = Reader::new(buf);
		let hxy: [u8; 32] = r.take(32)?.try_into().unwrap();
		let ts_b = r.take_u32()?;
		let filler: [u8; 12] = r.take(12)?.try_into().unwrap();
		Ok(Phase2Plaintext { hxy, ts_b, filler })
	}
}

pub struct Phase2 {
	pub y: [u8; 256],
	pub encrypted: Vec<u8>,
}

impl Phase2 {
	pub fn to_buffer(&self) -> Vec<u8> {
		let mut w = Writer::with_capacity(256 + self.encrypted.len());
		w.put_bytes(&self.y);
		w.put_bytes(&self.encrypted);
		w.into_vec()
	}

	pub fn parse(buf: &[u8]) -> Result<Phase2> {
		if buf.len() < 256 + 16 {
			return Err(Error::parse("phase2 too short"));
		}
		let mut r = Reader::new(buf);
		let y: [u8; 256] = r.take(256)?.try_into().unwrap();
		let encrypted = r.take_rest().to_vec();
		Ok(Phase2 { y, encrypted })
	}
}

/// `SignedData = X || Y || responderIdentHash || tsA || tsB` signed in
/// Phase 3, verified in the Phase 4 exchange run in the opposite direction.
pub fn signed_data(x: &[u8; 256], y: &[u8; 256], responder_hash: &IdentHash, ts_a: u32, ts_b: u32) -> Vec<u8> {
	let mut w = Writer::with_capacity(256 + 256 + 32 + 4 + 4);
	w.put_bytes(x);
	w.put_bytes(y);
	w.put_bytes(&responder_hash.0);
	w.put_u32(ts_a);
	w.put_u32(ts_b);
	w.into_vec()
}

pub struct Phase3Plaintext {
	pub router_identity: Vec<u8>,
	pub ts_a: u32,
	pub signature: Vec<u8>,
}

impl Phase3Plaintext {
	pub fn to_buffer(&self) -> Vec<u8> {
		let mut w = Writer::new();
		w.put_u16(self.router_identity.len() as u16);
		w.put_bytes(&self.router_identity);
		w.put_u32(self.ts_a);
		w.put_bytes(&self.signature);
		let mut buf = w.into_vec();
		let pad = (16 - (buf.len() % 16)) % 16;
		buf.extend(std::iter::repeat(0u8).take(pad));
		buf
	}

	pub fn parse(buf: &[u8], sig_len: usize) -> Result<Phase3Plaintext> {
		let mut r = Reader::new(buf);
		let ident_size = r.take_u16()? as usize;
		let router_identity = r.take(ident_size)?.to_vec();
		let ts_a = r.take_u32()?;
		let signature = r.take(sig_len)?.to_vec();
		Ok(Phase3Plaintext {
			router_identity,
			ts_a,
			signature,
		})
	}
}

/// One direction's running AES-256-CBC state across the lifetime of a
/// session: the data-phase framing (spec §4.2) and Phase 3/4 both chain
/// from the IV established at handshake time, so the same cipher object
/// is reused for every subsequent block.
pub struct CbcState {
	encryptor: Option<Encryptor<Aes256>>,
	decryptor: Option<Decryptor<Aes256>>,
}

impl CbcState {
	pub fn new_encryptor(key: &[u8; 32], iv: &[u8; 16]) -> CbcState {
		CbcState {
			encryptor: Some(Encryptor::<Aes256>::new(key.into(), iv.into())),
			decryptor: None,
		}
	}

	pub fn new_decryptor(key: &[u8; 32], iv: &[u8; 16]) -> CbcState {
		CbcState {
			encryptor: None,
			decryptor: Some(Decryptor::<Aes256>::new(key.into(), iv.into())),
		}
	}

	/// Encrypts `data` in place; `data.len()` must be a multiple of 16.
	pub fn encrypt_blocks(&mut self, data: &mut [u8]) {
		let enc = self.encryptor.as_mut().expect("encryptor state");
		for chunk in data.chunks_mut(16) {
			let block = aes::cipher::generic_array::GenericArray::from_mut_slice(chunk);
			enc.encrypt_block_mut(block);
		}
	}

	pub fn decrypt_blocks(&mut self, data: &mut [u8]) {
		let dec = self.decryptor.as_mut().expect("decryptor state");
		for chunk in data.chunks_mut(16) {
			let block = aes::cipher::generic_array::GenericArray::from_mut_slice(chunk);
			dec.decrypt_block_mut(block);
		}
	}
}

/// Scratch area holding the ephemeral DH keypair and phase buffers while a
/// handshake is in progress; dropped once the session reaches `Established`
/// (spec §3) so no key material outlives the handshake.
pub struct Establisher {
	pub dh: dh::DhKeyPair,
	pub y: Option<[u8; 256]>,
	pub remote_identity: Option<IdentityEx>,
	pub ts_a: Option<u32>,
	pub ts_b: Option<u32>,
}

impl Establisher {
	pub fn new_initiator() -> Establisher {
		Establisher {
			dh: dh::generate_keypair(),
			y: None,
			remote_identity: None,
			ts_a: None,
			ts_b: None,
		}
	}

	pub fn x(&self) -> &[u8; 256] {
		&self.dh.public
	}
}

/// Verifies a Phase 3 signature against the peer identity it was carried
/// with, reconstructing the same `signed_data` the initiator signed.
#[allow(clippy::too_many_arguments)]
pub fn verify_phase3(
	router_identity_bytes: &[u8],
	signature: &[u8],
	x: &[u8; 256],
	y: &[u8; 256],
	responder_hash: &IdentHash,
	ts_a: u32,
	ts_b: u32,
) -> Result<bool> {
	let identity = IdentityEx::from_buffer(router_identity_bytes)?;
	let data = signed_data(x, y, responder_hash, ts_a, ts_b);
	Ok(identity.verify(&data, signature))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn aes_key_derivation_msb_set_branch() {
		let mut s = [0u8; 256];
		s[0] = 0x80;
		for i in 1..256 {
			s[i] = i as u8;
		}
		let key = derive_aes_key(&s).unwrap();
		assert_eq!(key[0], 0);
		assert_eq!(&key[1..32], &s[0..31]);
	}

	#[test]
	fn aes_key_derivation_nonzero_first_byte_branch() {
		let mut s = [0u8; 256];
		s[0] = 0x05;
		for i in 1..256 {
			s[i] = (i * 3) as u8;
		}
		let key = derive_aes_key(&s).unwrap();
		assert_eq!(&key[..], &s[0..32]);
	}

	#[test]
	fn aes_key_derivation_leading_zeros_branch() {
		let mut s = [0u8; 256];
		s[10] = 0x01;
		for i in 11..43 {
			s[i] = i as u8;
		}
		let key = derive_aes_key(&s).unwrap();
		assert_eq!(&key[..], &s[10..42]);
	}

	#[test]
	fn cbc_chain_round_trip_across_multiple_calls() {
		let key = [7u8; 32];
		let iv = [3u8; 16];
		let mut enc = CbcState::new_encryptor(&key, &iv);
		let mut dec = CbcState::new_decryptor(&key, &iv);

		let mut block1 = [1u8; 16];
		let mut block2 = [2u8; 16];
		let orig1 = block1;
		let orig2 = block2;

		enc.encrypt_blocks(&mut block1);
		enc.encrypt_blocks(&mut block2);

		dec.decrypt_blocks(&mut block1);
		dec.decrypt_blocks(&mut block2);

		assert_eq!(block1, orig1);
		assert_eq!(block2, orig2);
	}

	#[test]
	fn phase1_round_trip_and_verify() {
		let remote_hash = IdentHash::of(b"responder identity bytes");
		let p1 = Phase1::build([42u8; 256], &remote_hash);
		let buf = p1.to_buffer();
		assert_eq!(buf.len(), PHASE1_LEN);
		let parsed = Phase1::parse(&buf).unwrap();
		assert!(parsed.verify_against(&remote_hash));

		let wrong_hash = IdentHash::of(b"some other identity");
		assert!(!parsed.verify_against(&wrong_hash));
	}

	#[test]
	fn phase2_plaintext_round_trip() {
		let pt = Phase2Plaintext::new(&[1u8; 256], &[2u8; 256], 12345);
		let buf = pt.to_buffer();
		assert_eq!(buf.len(), 48);
		let parsed = Phase2Plaintext::parse(&buf).unwrap();
		assert_eq!(parsed.hxy, pt.hxy);
		assert_eq!(parsed.ts_b, 12345);
	}
}
