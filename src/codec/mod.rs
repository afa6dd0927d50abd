//! C1: codec utilities shared by every higher layer — Base32/Base64
//! encode/decode with I2P's alphabets, gzip inflate/deflate, and
//! big-endian buffer accessors.

pub mod base;
pub mod buf;
pub mod gzip;

pub use base::{base32_decode, base32_encode, base64_decode, base64_encode};
pub use buf::{Reader, Writer};
