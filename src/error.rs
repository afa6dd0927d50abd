use std::io;
use thiserror::Error as ThisError;

/// Crate-wide error kinds, covering the failure taxonomy of spec §7 as well
/// as the wire-level parsing/signature failures of the lower layers.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Wraps io errors (`ParseError`-adjacent: truncated reads, closed sockets).
	#[error("IO error: {0}")]
	Io(#[from] io::Error),

	/// Malformed wire buffer: identity, lease set, stream packet, I2CP message.
	#[error("failed to parse: {0}")]
	Parse(String),

	/// A cryptographic signature failed to verify.
	#[error("bad signature")]
	BadSignature,

	/// Decryption / MAC failure, or an unsupported key type was requested.
	#[error("crypto mismatch: {0}")]
	CryptoMismatch(String),

	/// A lookup, resend, publish-confirm, or handshake step exceeded its deadline.
	#[error("timed out: {0}")]
	Timeout(String),

	/// Repeated transport failures against a peer.
	#[error("peer unreachable: {0}")]
	UnreachablePeer(String),

	/// A lease set / address book / host lookup found nothing.
	#[error("not found: {0}")]
	NotFound(String),

	/// A bounded queue or backlog overflowed.
	#[error("resource exhausted: {0}")]
	ResourceExhausted(String),

	/// `Close()`/`Cancel()` aborted an in-flight operation.
	#[error("aborted by user")]
	AbortedByUser,

	/// A protocol-level textual/binary error the caller should translate
	/// into a SAM/BOB/I2CP status line verbatim.
	#[error("protocol error: {0}")]
	Protocol(String),
}

impl Error {
	pub fn parse(msg: impl Into<String>) -> Self {
		Error::Parse(msg.into())
	}
}

impl<I: std::fmt::Debug> From<nom::Err<nom::error::Error<I>>> for Error {
	fn from(err: nom::Err<nom::error::Error<I>>) -> Self {
		Error::Parse(format!("{err:?}"))
	}
}

pub type Result<T> = std::result::Result<T, Error>;
