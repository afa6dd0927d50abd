//! C7: the BOB nicknamed-tunnel command channel (spec §4.4.2).

pub mod commands;
pub mod server;
pub mod tunnel;

pub use commands::{parse_line, BobCommand};
pub use server::{BobBackend, BobServer};
pub use tunnel::{BobTunnel, TunnelDirection, TunnelState};
