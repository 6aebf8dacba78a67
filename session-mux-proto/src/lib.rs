//! Wire framing for the datagram session multiplexer.
//!
//! A single QUIC connection carries datagrams belonging to many
//! independent UDP sessions. This crate suffixes/extracts the 16-byte
//! [`SessionId`] that tells them apart, and nothing else: it has no
//! knowledge of sessions, sockets, or transports.

mod frame;
mod id;

pub use frame::{decode, decode_tagged, encode, encode_into, encode_tagged};
pub use frame::{Frame, FrameError, FrameTag, DEFAULT_MAX_FRAME};
pub use id::SessionId;
