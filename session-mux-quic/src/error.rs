use thiserror::Error;

/// Everything that can go wrong talking to a `quinn::Connection`, split
/// the way `web-transport-quinn`'s `SessionError` splits connection-level
/// failure from the datagram send path.
#[derive(Clone, Debug, Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(#[from] quinn::ConnectionError),

    #[error("send datagram error: {0}")]
    SendDatagram(#[from] quinn::SendDatagramError),
}

/// The QUIC application error code reserved for a graceful shutdown.
const NO_ERROR: quinn::VarInt = quinn::VarInt::from_u32(0);

/// Whether a `quinn::ConnectionError` represents the peer closing the
/// connection with the application "no error" code, as opposed to any
/// other transport-level failure.
pub(crate) fn is_graceful(err: &quinn::ConnectionError) -> bool {
    matches!(
        err,
        quinn::ConnectionError::ApplicationClosed(closed) if closed.error_code == NO_ERROR
    )
}
