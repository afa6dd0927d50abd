//! Congestion window control (spec §4.3.3): bounds, growth, and the three
//! drop conditions.

pub const MIN_WINDOW_SIZE: u32 = 2;
pub const INITIAL_WINDOW_SIZE: u32 = 10;
pub const MAX_WINDOW_SIZE: u32 = 512;

#[derive(Debug, Clone)]
pub struct WindowController {
	pub window_size: u32,
	pub window_inc_counter: u32,
	pub is_win_dropped: bool,
	pub last_window_drop_size: u32,
	pub window_drop_target_size: u32,
	pub drop_window_delay_seq: u32,
}

impl Default for WindowController {
	fn default() -> Self {
		WindowController {
			window_size: INITIAL_WINDOW_SIZE,
			window_inc_counter: 0,
			is_win_dropped: false,
			last_window_drop_size: INITIAL_WINDOW_SIZE,
			window_drop_target_size: INITIAL_WINDOW_SIZE,
			drop_window_delay_seq: 0,
		}
	}
}

impl WindowController {
	pub fn new() -> WindowController {
		WindowController::default()
	}

	/// Call on every qualifying ACK (one that advances `ackThrough` with no
	/// drop already in progress); just increments the growth counter, the
	/// actual size change happens on the next send-timer tick.
	pub fn on_qualifying_ack(&mut self) {
		if !self.is_win_dropped {
			self.window_inc_counter += 1;
		}
	}

	/// Send-timer tick: grows the window by a term that shrinks as it
	/// approaches the size it was last dropped from, then resets the
	/// counter. A no-op if nothing is queued or nothing accumulated.
	pub fn tick_growth(&mut self, send_buffer_non_empty: bool) {
		if self.window_inc_counter == 0 || !send_buffer_non_empty {
			return;
		}
		let counter = self.window_inc_counter;
		self.window_inc_counter = 0;
		if self.window_size >= MAX_WINDOW_SIZE {
			return;
		}
		let remaining = self.last_window_drop_size.saturating_sub(self.window_size);
		let increment = if self.last_window_drop_size == 0 {
			counter
		} else {
			(counter * remaining / self.last_window_drop_size).max(1)
		};
		self.window_size = (self.window_size + increment).min(MAX_WINDOW_SIZE);
	}

	fn begin_drop(&mut self, seq: u32) {
		if self.is_win_dropped {
			return;
		}
		self.is_win_dropped = true;
		self.last_window_drop_size = self.window_size;
		self.window_drop_target_size = (self.last_window_drop_size - self.last_window_drop_size / 4).max(MIN_WINDOW_SIZE + 1);
		self.window_size = self.window_drop_target_size;
		self.drop_window_delay_seq = seq;
	}

	/// Condition (a): delay-based early drop signalled by the RTT
	/// estimator.
	pub fn on_delay_based_drop(&mut self, seq: u32) {
		self.begin_drop(seq);
	}

	/// Condition (b): first retransmit after a non-initial RTO, when
	/// loss-based control is enabled.
	pub fn on_loss_based_drop(&mut self, seq: u32, loss_based_enabled: bool) {
		if loss_based_enabled {
			self.begin_drop(seq);
		}
	}

	/// Condition (c): window full and not already dropped.
	pub fn on_full_window(&mut self, in_flight: usize, seq: u32) {
		if !self.is_win_dropped && in_flight as u32 == self.window_size {
			self.begin_drop(seq);
		}
	}

	/// Clears the drop state once an ACK crosses `dropWindowDelaySequenceNumber`.
	pub fn on_ack_through(&mut self, ack_through: u32) {
		if self.is_win_dropped && ack_through >= self.drop_window_delay_seq {
			self.is_win_dropped = false;
		}
	}

	/// A `DELAY_REQUESTED >= 60000` choke signal forces the window to the
	/// minimum and the sender must stop sending until the next ACK.
	pub fn on_choke(&mut self) {
		self.window_size = MIN_WINDOW_SIZE;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn growth_is_additive_and_shrinks_near_drop_size() {
		let mut w = WindowController::new();
		w.last_window_drop_size = 20;
		w.window_size = 18;
		w.window_inc_counter = 3;
		w.tick_growth(true);
		assert!(w.window_size > 18 && w.window_size <= MAX_WINDOW_SIZE);
	}

	#[test]
	fn no_growth_without_pending_counter_or_empty_buffer() {
		let mut w = WindowController::new();
		let before = w.window_size;
		w.tick_growth(false);
		assert_eq!(w.window_size, before);
	}

	#[test]
	fn full_window_triggers_drop_to_target() {
		let mut w = WindowController::new();
		w.window_size = 10;
		w.on_full_window(10, 42);
		assert!(w.is_win_dropped);
		assert_eq!(w.window_size, 8); // 10 - 10/4 = 10 - 2 = 8
		assert_eq!(w.drop_window_delay_seq, 42);
	}

	#[test]
	fn drop_clears_once_ack_crosses_marked_sequence() {
		let mut w = WindowController::new();
		w.window_size = 10;
		w.on_full_window(10, 100);
		assert!(w.is_win_dropped);
		w.on_ack_through(50);
		assert!(w.is_win_dropped);
		w.on_ack_through(100);
		assert!(!w.is_win_dropped);
	}

	#[test]
	fn choke_forces_minimum_window() {
		let mut w = WindowController::new();
		w.window_size = 300;
		w.on_choke();
		assert_eq!(w.window_size, MIN_WINDOW_SIZE);
	}

	#[test]
	fn second_drop_does_not_overwrite_while_already_dropped() {
		let mut w = WindowController::new();
		w.window_size = 10;
		w.on_full_window(10, 5);
		let size_after_first = w.window_size;
		w.on_delay_based_drop(999);
		assert_eq!(w.window_size, size_after_first);
		assert_eq!(w.drop_window_delay_seq, 5);
	}
}
