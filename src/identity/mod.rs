//! C2: router/destination identities, variable-length certificates,
//! blinded public keys, private-key containers, and the routing-key
//! construction (spec §3, §4.1).

pub mod blinding;
pub mod cert;
pub mod hash;
pub mod keys;
pub mod verify;

pub use blinding::{BlindedKeyPair, BlindedPublicKey};
pub use cert::{Certificate, CryptoKeyType, SigningKeyType};
pub use hash::{create_routing_key, IdentHash, XorMetric};
pub use keys::{Identity, IdentityEx, OfflineSignature, PrivateKeys};
pub use verify::Verifier;
