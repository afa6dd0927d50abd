//! Per-stream state machine (spec §4.3.3): flow states, ACK/NACK policy,
//! RTT-driven retransmission, and pacing. Time is supplied by the caller as
//! milliseconds since an arbitrary epoch so the whole engine stays
//! deterministic and unit-testable without a running executor — the owning
//! destination's tick loop is the only piece that touches a real clock.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::streaming::packet::{
	PacketOptions, StreamPacket, DELAY_REQUESTED_CHOKE, DELAY_REQUESTED_IMMEDIATE, FLAG_CLOSE, FLAG_ECHO,
	FLAG_FROM_INCLUDED, FLAG_RESET, FLAG_SIGNATURE_INCLUDED, FLAG_SYNCHRONIZE, MAX_NACKS,
};
use crate::streaming::rtt::RttEstimator;
use crate::streaming::send_buffer::SendBuffer;
use crate::streaming::window::WindowController;

pub const SEND_INTERVAL_US: u64 = 1000;
pub const DEFAULT_ACK_DELAY_MS: u64 = 200;
pub const MAX_NUM_RESEND_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
	New,
	Open,
	Closing,
	Closed,
	Reset,
	Terminated,
}

struct SentPacket {
	packet: StreamPacket,
	sent_time_ms: u64,
	resent: bool,
	original_send_time_ms: u64,
}

/// One bi-directional reliable byte stream, multiplexed over garlic
/// messages the owning destination sends/receives on its behalf.
pub struct StreamSession {
	pub state: StreamState,
	pub local_id: u32,
	pub remote_id: u32,
	pub mtu: usize,
	pub remote_identity: Option<Identity>,

	next_send_seq: u32,
	last_recv_seq: u32,
	received_ahead: BTreeSet<u32>,
	reassembly: BTreeMap<u32, Vec<u8>>,
	pub inbox: Vec<u8>,

	sent_packets: VecDeque<SentPacket>,
	nacked_seqs: BTreeSet<u32>,

	pub rtt: RttEstimator,
	pub window: WindowController,
	send_buffer: SendBuffer,

	resend_attempts: u32,
	timeout_count: u32,
	ack_delay_ms: u64,
	ack_scheduled_at_ms: Option<u64>,
	quick_ack_pending: bool,
	close_sent: bool,
}

impl StreamSession {
	fn blank(local_id: u32, remote_id: u32, mtu: usize) -> StreamSession {
		StreamSession {
			state: StreamState::New,
			local_id,
			remote_id,
			mtu,
			remote_identity: None,
			next_send_seq: 1,
			last_recv_seq: 0,
			received_ahead: BTreeSet::new(),
			reassembly: BTreeMap::new(),
			inbox: Vec::new(),
			sent_packets: VecDeque::new(),
			nacked_seqs: BTreeSet::new(),
			rtt: RttEstimator::new(),
			window: WindowController::new(),
			send_buffer: SendBuffer::new(),
			resend_attempts: 0,
			timeout_count: 0,
			ack_delay_ms: DEFAULT_ACK_DELAY_MS,
			ack_scheduled_at_ms: None,
			quick_ack_pending: false,
			close_sent: false,
		}
	}

	/// New -> outbound `CreateStream`: queue SYN -> Open.
	pub fn new_outbound(local_id: u32, mtu: usize, ack_delay_ms: u64) -> StreamSession {
		let mut s = StreamSession::blank(local_id, 0, mtu);
		s.ack_delay_ms = ack_delay_ms;
		s.state = StreamState::Open;
		s
	}

	/// New -> inbound packet with SYN: store remote identity, move to Open.
	/// The SYN-ACK itself is produced by the next `tick()` piggybacked on
	/// the outgoing ack.
	pub fn new_inbound(syn: &StreamPacket, local_id: u32, mtu: usize, ack_delay_ms: u64) -> Result<StreamSession> {
		if syn.flags & FLAG_SYNCHRONIZE == 0 {
			return Err(Error::Protocol("expected a SYN packet to open an inbound stream".into()));
		}
		let mut s = StreamSession::blank(local_id, syn.send_stream_id, mtu);
		s.ack_delay_ms = ack_delay_ms;
		s.remote_identity = syn.options.from_identity.clone();
		s.state = StreamState::Open;
		s.receive(syn.clone(), 0)?;
		Ok(s)
	}

	pub fn in_flight(&self) -> usize {
		self.sent_packets.len()
	}

	/// `Close()`: Open with nothing in flight sends CLOSE immediately;
	/// with data queued or unacked, moves to Closing instead.
	pub fn close(&mut self) {
		if self.state != StreamState::Open && self.state != StreamState::Closing {
			return;
		}
		if self.send_buffer.is_empty() && self.sent_packets.is_empty() {
			self.state = StreamState::Closed;
		} else {
			self.state = StreamState::Closing;
		}
	}

	pub fn queue_send(&mut self, data: Vec<u8>, on_complete: Option<Box<dyn FnOnce(Result<()>) + Send>>) {
		self.send_buffer.push(data, on_complete);
	}

	fn abort_to_reset(&mut self) {
		self.state = StreamState::Reset;
		self.send_buffer.abort_all();
		self.sent_packets.clear();
	}

	/// Whether this (Closed, no pending work) session can be destroyed.
	pub fn is_destroyable(&self) -> bool {
		self.state == StreamState::Closed && self.send_buffer.is_empty() && self.sent_packets.is_empty()
	}

	/// Processes one inbound packet: RESET/CLOSE handling, ack-through and
	/// NACK application against our sent packets, and in-order/out-of-order
	/// data delivery.
	pub fn receive(&mut self, packet: StreamPacket, now_ms: u64) -> Result<()> {
		if packet.has_flag(FLAG_RESET) {
			self.abort_to_reset();
			return Ok(());
		}

		self.apply_ack(&packet, now_ms);

		if packet.has_flag(FLAG_ECHO) && packet.send_stream_id != 0 && packet.seq == 0 {
			// Ping: answered by the caller via `build_pong`, not here —
			// this method only updates protocol state.
			return Ok(());
		}

		if !packet.is_control() {
			self.receive_data(packet.seq, packet.payload, now_ms);
		}

		if packet.has_flag(FLAG_CLOSE) {
			if !self.close_sent {
				self.state = StreamState::Closed;
			} else {
				self.state = StreamState::Closed;
			}
		}

		if self.resend_attempts >= MAX_NUM_RESEND_ATTEMPTS {
			self.abort_to_reset();
		}

		Ok(())
	}

	fn receive_data(&mut self, seq: u32, payload: Vec<u8>, now_ms: u64) {
		if seq == self.last_recv_seq + 1 {
			self.last_recv_seq = seq;
			self.inbox.extend_from_slice(&payload);
			while let Some(next) = self.reassembly.remove(&(self.last_recv_seq + 1)) {
				self.last_recv_seq += 1;
				self.received_ahead.remove(&self.last_recv_seq);
				self.inbox.extend_from_slice(&next);
			}
			self.schedule_delayed_ack(now_ms);
		} else if seq > self.last_recv_seq {
			let is_new = self.received_ahead.insert(seq);
			if is_new {
				self.reassembly.insert(seq, payload);
			}
			// duplicate or out-of-order: quick ACK with NACKs for the gap.
			self.quick_ack_pending = true;
		}
		// seq <= last_recv_seq: a duplicate of already-delivered data; no
		// redelivery, but still covered by the quick-ack-on-duplicate rule.
		else {
			self.quick_ack_pending = true;
		}
	}

	fn schedule_delayed_ack(&mut self, now_ms: u64) {
		if self.ack_scheduled_at_ms.is_none() {
			let delay = (self.rtt.rtt_ms / 10.0).min(self.ack_delay_ms as f64) as u64;
			self.ack_scheduled_at_ms = Some(now_ms + delay);
		}
	}

	/// Applies the peer's `ackThrough`/`nack[]` against our outstanding
	/// sent packets: removes fully-acked packets, feeds RTT samples for
	/// un-resent ones, and drives window growth/NACK-triggered resend.
	fn apply_ack(&mut self, packet: &StreamPacket, now_ms: u64) {
		let nacked: BTreeSet<u32> = packet.nacks.iter().copied().collect();
		let ack_through = packet.ack_through;

		let mut newly_acked_any = false;
		let mut retained = VecDeque::new();
		while let Some(sent) = self.sent_packets.pop_front() {
			if sent.packet.seq != 0 && sent.packet.seq <= ack_through && !nacked.contains(&sent.packet.seq) {
				newly_acked_any = true;
				if !sent.resent {
					let sample = (now_ms.saturating_sub(sent.original_send_time_ms)) as f64;
					let prev = self.rtt.prev_sample_ms;
					self.rtt.on_sample(sample, self.window.is_win_dropped);
					if self.rtt.is_delay_based_drop(sample, prev) {
						self.window.on_delay_based_drop(sent.packet.seq);
					}
				}
				self.resend_attempts = 0;
			} else {
				retained.push_back(sent);
			}
		}
		self.sent_packets = retained;

		if newly_acked_any {
			self.window.on_qualifying_ack();
			self.window.on_ack_through(ack_through);
		}

		for seq in &nacked {
			self.nacked_seqs.insert(*seq);
		}

		if let Some(delay) = packet.options.delay_requested {
			if delay >= DELAY_REQUESTED_CHOKE {
				self.window.on_choke();
			} else if delay == DELAY_REQUESTED_IMMEDIATE {
				self.quick_ack_pending = true;
			}
		}
	}

	/// Every second RTO timeout alternates between asking the owning
	/// destination to pick a new outbound tunnel and a new remote lease;
	/// the caller invalidates the garlic routing path either way.
	pub fn should_alternate_route(&self) -> bool {
		self.timeout_count % 2 == 0
	}

	/// The gaps between `last_recv_seq+1` and the highest out-of-order seq
	/// seen, i.e. what's still missing — not the out-of-order seqs
	/// themselves (spec §3: `nack[]` lists gaps above `ackThrough`).
	fn nack_list(&self) -> Vec<u32> {
		let Some(&highest) = self.received_ahead.iter().next_back() else { return vec![] };
		(self.last_recv_seq + 1..=highest).filter(|seq| !self.received_ahead.contains(seq)).take(MAX_NACKS).collect()
	}

	fn build_ack_packet(&self, include_nacks: bool) -> StreamPacket {
		let nacks: Vec<u32> = if include_nacks { self.nack_list() } else { vec![] };
		StreamPacket {
			send_stream_id: self.local_id,
			recv_stream_id: self.remote_id,
			seq: 0,
			ack_through: self.last_recv_seq,
			nacks,
			resend_delay: self.rtt.resend_delay_byte(),
			flags: 0,
			options: PacketOptions::default(),
			payload: vec![],
		}
	}

	/// A signed SYN-less ping packet (spec §4.3.3): `seq=0,
	/// recvStreamId=local, sendStreamId=0, flags=ECHO|SIG_INC|FROM_INC`.
	pub fn build_ping(&self) -> StreamPacket {
		StreamPacket {
			send_stream_id: 0,
			recv_stream_id: self.local_id,
			seq: 0,
			ack_through: 0,
			nacks: vec![],
			resend_delay: 0,
			flags: FLAG_ECHO | FLAG_SIGNATURE_INCLUDED | FLAG_FROM_INCLUDED,
			options: PacketOptions::default(),
			payload: vec![],
		}
	}

	/// A pong answering an inbound ping: `sendStreamId=pingRecvId, ECHO,
	/// copied payload`.
	pub fn build_pong(ping: &StreamPacket) -> StreamPacket {
		StreamPacket {
			send_stream_id: ping.recv_stream_id,
			recv_stream_id: 0,
			seq: 0,
			ack_through: 0,
			nacks: vec![],
			resend_delay: 0,
			flags: FLAG_ECHO,
			options: PacketOptions::default(),
			payload: ping.payload.clone(),
		}
	}

	/// Drives one send-timer tick (`SEND_INTERVAL` cadence): window growth,
	/// resend of timed-out packets, NACK-driven fast retransmit, pacing
	/// of new data out of the send buffer, the delayed/quick ACK, and the
	/// Closing->Closed and RESET-after-max-resends transitions. Returns
	/// every packet that should actually go out this tick.
	pub fn tick(&mut self, now_ms: u64) -> Vec<StreamPacket> {
		let mut out = Vec::new();

		self.window.tick_growth(!self.send_buffer.is_empty());

		// NACK-driven fast retransmit: resend counter set to 1, not
		// incremented, and jumps the queue ahead of the normal RTO.
		if !self.nacked_seqs.is_empty() {
			let nacked: Vec<u32> = self.nacked_seqs.iter().copied().collect();
			self.nacked_seqs.clear();
			for seq in nacked {
				if let Some(idx) = self.sent_packets.iter().position(|s| s.packet.seq == seq) {
					let sent = &mut self.sent_packets[idx];
					sent.resent = true;
					sent.sent_time_ms = now_ms;
					self.resend_attempts = 1;
					out.push(sent.packet.clone());
				}
			}
		}

		// RTO-driven retransmission.
		let rto = self.rtt.rto_ms as u64;
		let mut resend_candidates: Vec<usize> = Vec::new();
		for (i, sent) in self.sent_packets.iter().enumerate() {
			if now_ms.saturating_sub(sent.sent_time_ms) >= rto {
				resend_candidates.push(i);
			}
		}
		if !resend_candidates.is_empty() {
			self.resend_attempts += 1;
			self.timeout_count += 1;
			self.rtt.reset_rto();
			self.window.on_loss_based_drop(self.next_send_seq, self.resend_attempts == 1);
			for i in resend_candidates {
				let sent = &mut self.sent_packets[i];
				if now_ms.saturating_sub(sent.original_send_time_ms) <= 2 * rto {
					sent.resent = true;
				}
				sent.sent_time_ms = now_ms;
				out.push(sent.packet.clone());
			}
			if self.resend_attempts >= MAX_NUM_RESEND_ATTEMPTS {
				self.abort_to_reset();
				return out;
			}
		}

		// Pace new data out of the send buffer, bounded by the window.
		while self.sent_packets.len() < self.window.window_size as usize && !self.send_buffer.is_empty() {
			let chunk = self.send_buffer.pull(self.mtu);
			if chunk.is_empty() {
				break;
			}
			let seq = self.next_send_seq;
			self.next_send_seq += 1;
			let packet = StreamPacket {
				send_stream_id: self.local_id,
				recv_stream_id: self.remote_id,
				seq,
				ack_through: self.last_recv_seq,
				nacks: self.nack_list(),
				resend_delay: self.rtt.resend_delay_byte(),
				flags: 0,
				options: PacketOptions::default(),
				payload: chunk,
			};
			self.sent_packets.push_back(SentPacket {
				packet: packet.clone(),
				sent_time_ms: now_ms,
				resent: false,
				original_send_time_ms: now_ms,
			});
			out.push(packet);
		}

		// Closing -> Closed once everything has drained.
		if self.state == StreamState::Closing && self.send_buffer.is_empty() && self.sent_packets.is_empty() {
			self.state = StreamState::Closed;
		}

		if self.state == StreamState::Closed && !self.close_sent {
			self.close_sent = true;
			out.push(StreamPacket {
				send_stream_id: self.local_id,
				recv_stream_id: self.remote_id,
				seq: 0,
				ack_through: self.last_recv_seq,
				nacks: vec![],
				resend_delay: 0,
				flags: FLAG_CLOSE,
				options: PacketOptions::default(),
				payload: vec![],
			});
		}

		let ack_due = self.ack_scheduled_at_ms.map(|at| now_ms >= at).unwrap_or(false);
		if self.quick_ack_pending {
			self.quick_ack_pending = false;
			self.ack_scheduled_at_ms = None;
			out.push(self.build_ack_packet(true));
		} else if ack_due {
			self.ack_scheduled_at_ms = None;
			out.push(self.build_ack_packet(false));
		}

		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::streaming::packet::PacketOptions;

	fn data_packet(seq: u32, ack_through: u32, payload: &[u8]) -> StreamPacket {
		StreamPacket {
			send_stream_id: 99,
			recv_stream_id: 1,
			seq,
			ack_through,
			nacks: vec![],
			resend_delay: 0,
			flags: 0,
			options: PacketOptions::default(),
			payload: payload.to_vec(),
		}
	}

	#[test]
	fn outbound_open_and_close_with_nothing_inflight_goes_straight_to_closed() {
		let mut s = StreamSession::new_outbound(1, 1730, 200);
		assert_eq!(s.state, StreamState::Open);
		s.close();
		assert_eq!(s.state, StreamState::Closed);
	}

	#[test]
	fn close_with_queued_data_goes_to_closing_then_closed_after_drain() {
		let mut s = StreamSession::new_outbound(1, 1730, 200);
		s.queue_send(b"hello".to_vec(), None);
		s.close();
		assert_eq!(s.state, StreamState::Closing);
		let sent = s.tick(0);
		assert!(!sent.is_empty());
		// Peer acks the one data packet we just sent.
		s.receive(data_packet(0, 1, &[]), 100);
		let sent2 = s.tick(200);
		assert_eq!(s.state, StreamState::Closed);
		assert!(sent2.iter().any(|p| p.flags & FLAG_CLOSE != 0));
	}

	#[test]
	fn in_order_data_is_delivered_and_gap_is_buffered() {
		let mut s = StreamSession::new_outbound(1, 1730, 200);
		s.receive(data_packet(1, 0, b"AB"), 0).unwrap();
		assert_eq!(s.inbox, b"AB");
		s.receive(data_packet(3, 0, b"D"), 0).unwrap();
		assert_eq!(s.inbox, b"AB"); // seq 3 buffered, gap at 2
		s.receive(data_packet(2, 0, b"C"), 0).unwrap();
		assert_eq!(s.inbox, b"ABCD");
	}

	#[test]
	fn reset_flag_aborts_and_drops_everything() {
		let mut s = StreamSession::new_outbound(1, 1730, 200);
		s.queue_send(b"data".to_vec(), None);
		let mut reset_pkt = data_packet(0, 0, &[]);
		reset_pkt.flags = FLAG_RESET;
		s.receive(reset_pkt, 0).unwrap();
		assert_eq!(s.state, StreamState::Reset);
	}

	#[test]
	fn resend_attempts_reaching_max_forces_reset() {
		let mut s = StreamSession::new_outbound(1, 1730, 200);
		s.queue_send(b"x".to_vec(), None);
		s.tick(0);
		let mut now = 0u64;
		for _ in 0..(MAX_NUM_RESEND_ATTEMPTS + 1) {
			now += s.rtt.rto_ms as u64 + 1;
			s.tick(now);
			if s.state == StreamState::Reset {
				break;
			}
		}
		assert_eq!(s.state, StreamState::Reset);
	}

	#[test]
	fn ping_and_pong_round_trip_shape() {
		let s = StreamSession::new_outbound(7, 1730, 200);
		let ping = s.build_ping();
		assert_eq!(ping.recv_stream_id, 7);
		assert_eq!(ping.send_stream_id, 0);
		assert!(ping.flags & FLAG_ECHO != 0);

		let pong = StreamSession::build_pong(&ping);
		assert_eq!(pong.send_stream_id, ping.recv_stream_id);
		assert!(pong.flags & FLAG_ECHO != 0);
	}

	#[test]
	fn ack_nacks_the_gap_not_the_out_of_order_seqs() {
		let mut s = StreamSession::new_outbound(1, 1730, 200);
		s.receive(data_packet(1, 0, b"A"), 0).unwrap();
		s.receive(data_packet(2, 0, b"B"), 0).unwrap();
		s.receive(data_packet(4, 0, b"D"), 0).unwrap();
		s.receive(data_packet(5, 0, b"E"), 0).unwrap();
		let ack = s.build_ack_packet(true);
		assert_eq!(ack.ack_through, 2);
		assert_eq!(ack.nacks, vec![3]);
	}

	#[test]
	fn delay_based_drop_fires_once_the_sample_lifts_slow_rtt2_past_threshold() {
		let mut s = StreamSession::new_outbound(1, 1730, 200);
		s.rtt.on_sample(100.0, false); // initialise, then pin the baseline the scenario needs
		s.rtt.slow_rtt_ms = 100.0;
		s.rtt.slow_rtt2_ms = 100.0;
		s.rtt.jitter_ms = 10.0;
		s.rtt.prev_sample_ms = 200.0;
		s.queue_send(b"x".to_vec(), None);
		let sent = s.tick(0);
		let seq = sent[0].seq;
		s.apply_ack(&data_packet(0, seq, &[]), 250);
		assert!(s.window.is_win_dropped);
	}

	#[test]
	fn choke_signal_drops_window_to_minimum() {
		let mut s = StreamSession::new_outbound(1, 1730, 200);
		let mut choke = data_packet(0, 0, &[]);
		choke.flags = crate::streaming::packet::FLAG_DELAY_REQUESTED;
		choke.options.delay_requested = Some(DELAY_REQUESTED_CHOKE);
		s.receive(choke, 0).unwrap();
		assert_eq!(s.window.window_size, crate::streaming::window::MIN_WINDOW_SIZE);
	}
}
