use std::future::Future;

use bytes::Bytes;
use session_mux_proto::SessionId;

/// The QUIC side of the multiplexer: the thing that frames and exchanges
/// datagrams on one QUIC connection. `session-mux-quic` provides the
/// production implementation over `quinn`; tests use the in-memory double
/// in [`crate::testing`].
pub trait Transport: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Frames and submits one datagram for `id`. A `TooLarge` outcome is
    /// not fatal, the caller drops the frame and bumps a metric; any
    /// other error means the underlying connection is broken.
    fn send(&self, id: SessionId, payload: &[u8]) -> Result<(), SendError<Self::Error>>;

    /// Blocks until the next datagram is demuxed off the wire, or the
    /// connection reaches a graceful or fatal end.
    fn receive(
        &self,
    ) -> impl Future<Output = Result<(SessionId, Bytes), ReceiveError<Self::Error>>> + Send;

    /// Payload-side MTU: the largest `payload` that [`Transport::send`]
    /// will accept, already net of framing overhead.
    fn max_datagram_size(&self) -> usize;
}

#[derive(Debug, thiserror::Error)]
pub enum SendError<E> {
    #[error("payload too large for one datagram")]
    TooLarge,

    #[error(transparent)]
    Fatal(E),
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError<E> {
    /// The QUIC error code was the application-level "no error" sentinel:
    /// the manager exits `serve()` cleanly.
    #[error("connection closed gracefully")]
    Graceful,

    #[error(transparent)]
    Fatal(E),
}
