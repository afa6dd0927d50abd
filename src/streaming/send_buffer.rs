//! Send-buffer FIFO (spec §4.3.3): user-provided byte spans with per-chunk
//! completion handlers, pulled out in MTU-sized slices.

use crate::error::{Error, Result};

type CompletionHandler = Box<dyn FnOnce(Result<()>) + Send>;

struct Chunk {
	data: Vec<u8>,
	offset: usize,
	on_complete: Option<CompletionHandler>,
}

impl Chunk {
	fn remaining(&self) -> &[u8] {
		&self.data[self.offset..]
	}
}

/// FIFO of pending outbound bytes. `pull` slices off up to `mtu` bytes,
/// spanning chunk boundaries, and fires each exhausted chunk's completion
/// handler with `Ok(())` the moment its last byte is pulled.
#[derive(Default)]
pub struct SendBuffer {
	chunks: std::collections::VecDeque<Chunk>,
}

impl SendBuffer {
	pub fn new() -> SendBuffer {
		SendBuffer::default()
	}

	pub fn push(&mut self, data: Vec<u8>, on_complete: Option<CompletionHandler>) {
		if data.is_empty() {
			if let Some(cb) = on_complete {
				cb(Ok(()));
			}
			return;
		}
		self.chunks.push_back(Chunk {
			data,
			offset: 0,
			on_complete,
		});
	}

	pub fn is_empty(&self) -> bool {
		self.chunks.is_empty()
	}

	pub fn total_pending(&self) -> usize {
		self.chunks.iter().map(|c| c.remaining().len()).sum()
	}

	/// Pulls up to `mtu` bytes from the front of the buffer, firing
	/// completion handlers for any chunk fully drained in the process.
	pub fn pull(&mut self, mtu: usize) -> Vec<u8> {
		let mut out = Vec::with_capacity(mtu);
		while out.len() < mtu {
			let Some(front) = self.chunks.front_mut() else { break };
			let want = mtu - out.len();
			let available = front.remaining().len();
			let take = want.min(available);
			out.extend_from_slice(&front.remaining()[..take]);
			front.offset += take;
			if front.offset >= front.data.len() {
				let mut chunk = self.chunks.pop_front().unwrap();
				if let Some(cb) = chunk.on_complete.take() {
					cb(Ok(()));
				}
			} else {
				break;
			}
		}
		out
	}

	/// Drains every remaining chunk, invoking its completion handler with
	/// `Error::AbortedByUser` (spec §4.3.3: "Closure calls the handler with
	/// an 'operation aborted' error for any un-sent remainder").
	pub fn abort_all(&mut self) {
		while let Some(mut chunk) = self.chunks.pop_front() {
			if let Some(cb) = chunk.on_complete.take() {
				cb(Err(Error::AbortedByUser));
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::sync::Arc;

	#[test]
	fn pull_spans_chunk_boundary_and_fires_completion() {
		let mut buf = SendBuffer::new();
		let done = Arc::new(AtomicUsize::new(0));
		let d1 = done.clone();
		buf.push(b"abc".to_vec(), Some(Box::new(move |_| { d1.fetch_add(1, Ordering::SeqCst); })));
		let d2 = done.clone();
		buf.push(b"defgh".to_vec(), Some(Box::new(move |_| { d2.fetch_add(1, Ordering::SeqCst); })));

		let out = buf.pull(4);
		assert_eq!(out, b"abcd");
		assert_eq!(done.load(Ordering::SeqCst), 1);

		let out2 = buf.pull(10);
		assert_eq!(out2, b"efgh");
		assert_eq!(done.load(Ordering::SeqCst), 2);
		assert!(buf.is_empty());
	}

	#[test]
	fn abort_all_reports_cancellation() {
		let mut buf = SendBuffer::new();
		let got_err = Arc::new(std::sync::atomic::AtomicBool::new(false));
		let g = got_err.clone();
		buf.push(b"xyz".to_vec(), Some(Box::new(move |r| { g.store(r.is_err(), Ordering::SeqCst); })));
		buf.abort_all();
		assert!(got_err.load(Ordering::SeqCst));
		assert!(buf.is_empty());
	}

	#[test]
	fn empty_push_fires_immediately() {
		let mut buf = SendBuffer::new();
		let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
		let f = fired.clone();
		buf.push(vec![], Some(Box::new(move |_| f.store(true, Ordering::SeqCst))));
		assert!(fired.load(Ordering::SeqCst));
	}
}
