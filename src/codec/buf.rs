//! Big-endian integer accessors over wire buffers.
//!
//! All I2P wire formats are big-endian. These helpers centralise bounds
//! checking so callers get `Error::Parse` instead of a panic on truncated
//! input, matching the "rejection on truncated buffer" invariant of spec §4.1.

use crate::error::{Error, Result};

pub struct Reader<'a> {
	buf: &'a [u8],
	pos: usize,
}

impl<'a> Reader<'a> {
	pub fn new(buf: &'a [u8]) -> Self {
		Reader { buf, pos: 0 }
	}

	pub fn remaining(&self) -> usize {
		self.buf.len() - self.pos
	}

	pub fn pos(&self) -> usize {
		self.pos
	}

	fn need(&self, n: usize) -> Result<()> {
		if self.remaining() < n {
			Err(Error::parse(format!(
				"truncated buffer: need {n} bytes, have {}",
				self.remaining()
			)))
		} else {
			Ok(())
		}
	}

	pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
		self.need(n)?;
		let out = &self.buf[self.pos..self.pos + n];
		self.pos += n;
		Ok(out)
	}

	pub fn take_u8(&mut self) -> Result<u8> {
		Ok(self.take(1)?[0])
	}

	pub fn take_u16(&mut self) -> Result<u16> {
		let b = self.take(2)?;
		Ok(u16::from_be_bytes([b[0], b[1]]))
	}

	pub fn take_u32(&mut self) -> Result<u32> {
		let b = self.take(4)?;
		Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
	}

	pub fn take_u64(&mut self) -> Result<u64> {
		let b = self.take(8)?;
		let mut arr = [0u8; 8];
		arr.copy_from_slice(b);
		Ok(u64::from_be_bytes(arr))
	}

	pub fn take_rest(&mut self) -> &'a [u8] {
		let out = &self.buf[self.pos..];
		self.pos = self.buf.len();
		out
	}
}

#[derive(Default)]
pub struct Writer {
	buf: Vec<u8>,
}

impl Writer {
	pub fn new() -> Self {
		Writer { buf: Vec::new() }
	}

	pub fn with_capacity(cap: usize) -> Self {
		Writer {
			buf: Vec::with_capacity(cap),
		}
	}

	pub fn put_u8(&mut self, v: u8) -> &mut Self {
		self.buf.push(v);
		self
	}

	pub fn put_u16(&mut self, v: u16) -> &mut Self {
		self.buf.extend_from_slice(&v.to_be_bytes());
		self
	}

	pub fn put_u32(&mut self, v: u32) -> &mut Self {
		self.buf.extend_from_slice(&v.to_be_bytes());
		self
	}

	pub fn put_u64(&mut self, v: u64) -> &mut Self {
		self.buf.extend_from_slice(&v.to_be_bytes());
		self
	}

	pub fn put_bytes(&mut self, v: &[u8]) -> &mut Self {
		self.buf.extend_from_slice(v);
		self
	}

	pub fn into_vec(self) -> Vec<u8> {
		self.buf
	}

	pub fn as_slice(&self) -> &[u8] {
		&self.buf
	}

	pub fn len(&self) -> usize {
		self.buf.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip() {
		let mut w = Writer::new();
		w.put_u8(7).put_u16(1000).put_u32(123456).put_bytes(b"hi");
		let buf = w.into_vec();
		let mut r = Reader::new(&buf);
		assert_eq!(r.take_u8().unwrap(), 7);
		assert_eq!(r.take_u16().unwrap(), 1000);
		assert_eq!(r.take_u32().unwrap(), 123456);
		assert_eq!(r.take(2).unwrap(), b"hi");
	}

	#[test]
	fn truncated_read_errors() {
		let buf = [0u8; 1];
		let mut r = Reader::new(&buf);
		assert!(r.take_u16().is_err());
	}
}
