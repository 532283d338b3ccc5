//! Protocol module containing message types and the JSON codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_inbound, encode_outbound, InboundFrame, ProtocolError};
pub use messages::*;
