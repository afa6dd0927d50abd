//! C6: the SAM v3 control-plane bridge (spec §4.4.1).

pub mod master;
pub mod parser;
pub mod server;
pub mod session;
pub mod udp;

pub use master::MasterRouter;
pub use parser::{parse_line, SamCommand};
pub use server::{SamAction, SamBackend, SamServer};
pub use session::{negotiate_version, validate_session_id, SamSession, SessionStyle};
