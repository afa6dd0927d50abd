//! C3: the NTCP-style transport session — handshake, data-phase framing,
//! per-session send queue and inactivity timer, the listen/dial acceptor,
//! and peer profile counters (spec §4.2, §6).

pub mod acceptor;
pub mod dh;
pub mod framing;
pub mod handshake;
pub mod profile;
pub mod responder;
pub mod session;

pub use acceptor::{BanList, InboundConnection};
pub use framing::{decode_frame, encode_frame, DecodedFrame, NTCP_MAX_MESSAGE_SIZE};
pub use handshake::{derive_aes_key, CbcState, Establisher, Phase1, Phase2, Phase2Plaintext, Phase3Plaintext};
pub use profile::{PeerProfile, PeerProfileSink, ProfileStore};
pub use responder::{run_responder_handshake, ResponderHandshake};
pub use session::{spawn_session, Command, TransportSessionHandle};
