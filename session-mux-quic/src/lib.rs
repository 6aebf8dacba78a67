//! Transport adapter binding the datagram session multiplexer's
//! [`session_mux_core::Transport`] trait to a `quinn::Connection`.

mod error;
mod transport;

pub use error::TransportError;
pub use transport::QuicTransport;
