//! C8: the I2CP binary session protocol (spec §4.4.3).

pub mod mapping;
pub mod messages;
pub mod server;

pub use messages::{I2cpMessage, MessageStatus, MessageType, SessionStatus, I2CP_MAX_MESSAGE_LENGTH, I2CP_MAX_SEND_QUEUE_SIZE, I2CP_PROTOCOL_BYTE};
pub use server::{I2cpAction, I2cpBackend, I2cpClientSession, I2cpServer};
