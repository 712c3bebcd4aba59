//! Data models for the cable-link client library.
//!
//! Defines the outbound command grammar, the inbound frame shape, and the
//! channel params that canonicalize into subscription identifiers.

pub mod channel_params;
pub mod client_command;
pub mod server_message;


pub use channel_params::ChannelParams;
pub use client_command::ClientCommand;
pub use server_message::{MessageType, ServerMessage};
