//! The RSP wire format: hex codecs and packet framing.

pub mod hex;
pub mod packet;

pub use packet::{Command, PacketParseError};
