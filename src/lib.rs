//! An I2P router node's core anonymity-transport and client-services
//! layer: NTCP-style transport sessions, identity/certificate/blinded-key
//! crypto, lease sets and destinations, the reliable streaming engine, and
//! the SAM/BOB/I2CP control-plane bridges.

pub mod bob;
pub mod client_context;
pub mod codec;
pub mod error;
pub mod i2cp;
pub mod identity;
pub mod leaseset;
pub mod naming;
pub mod netdb;
pub mod sam;
pub mod streaming;
pub mod transport;

pub use client_context::{ClientContext, RouterConfig};
pub use error::{Error, Result};
