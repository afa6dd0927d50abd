//! C5: the reliable stream engine and the datagram destination built on
//! top of it (spec §4.3.3, §4.3.4).

pub mod datagram;
pub mod packet;
pub mod rtt;
pub mod send_buffer;
pub mod session;
pub mod window;

pub use datagram::DatagramDestination;
pub use packet::StreamPacket;
pub use session::{StreamSession, StreamState};
