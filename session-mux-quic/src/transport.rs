use bytes::Bytes;
use session_mux_core::{ReceiveError, SendError, Transport};
use session_mux_proto::{SessionId, DEFAULT_MAX_FRAME};

use crate::error::{is_graceful, TransportError};

/// Binds the multiplexer to one `quinn::Connection`, framing and
/// extracting the 16-byte session id on every datagram. Mirrors
/// `web-transport-quinn::Session`'s `send_datagram`/`read_datagram`/
/// `max_datagram_size` trio, minus the WebTransport session-id header;
/// here the framing comes from `session_mux_proto` instead.
pub struct QuicTransport {
    connection: quinn::Connection,
    max_frame: usize,
}

impl QuicTransport {
    pub fn new(connection: quinn::Connection) -> Self {
        let negotiated = connection.max_datagram_size().unwrap_or(0);
        let max_frame = effective_max_frame(negotiated, DEFAULT_MAX_FRAME);
        Self { connection, max_frame }
    }

    /// Same as [`QuicTransport::new`] but with the compiled-in frame cap
    /// overridden, for platforms that probe a different MTU.
    pub fn with_max_frame(connection: quinn::Connection, max_frame_cap: usize) -> Self {
        let negotiated = connection.max_datagram_size().unwrap_or(0);
        let max_frame = effective_max_frame(negotiated, max_frame_cap);
        Self { connection, max_frame }
    }
}

/// The wire frame size is the smaller of what the QUIC connection
/// negotiated and a compiled-in cap.
fn effective_max_frame(negotiated: usize, cap: usize) -> usize {
    negotiated.min(cap)
}

impl Transport for QuicTransport {
    type Error = TransportError;

    fn send(&self, id: SessionId, payload: &[u8]) -> Result<(), SendError<Self::Error>> {
        let frame = session_mux_proto::encode(id, payload, self.max_frame).map_err(|_| SendError::TooLarge)?;

        match self.connection.send_datagram(frame) {
            Ok(()) => Ok(()),
            Err(quinn::SendDatagramError::TooLarge) => Err(SendError::TooLarge),
            Err(other) => Err(SendError::Fatal(TransportError::SendDatagram(other))),
        }
    }

    async fn receive(&self) -> Result<(SessionId, Bytes), ReceiveError<Self::Error>> {
        loop {
            match self.connection.read_datagram().await {
                Ok(bytes) => match session_mux_proto::decode(bytes) {
                    Ok((id, payload)) => return Ok((id, payload)),
                    Err(err) => {
                        log::warn!("dropping malformed datagram: {err}");
                        continue;
                    }
                },
                Err(err) if is_graceful(&err) => return Err(ReceiveError::Graceful),
                Err(err) => return Err(ReceiveError::Fatal(TransportError::Connection(err))),
            }
        }
    }

    fn max_datagram_size(&self) -> usize {
        self.max_frame.saturating_sub(SessionId::LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_frame_is_the_smaller_of_negotiated_and_cap() {
        assert_eq!(effective_max_frame(1350, 1220), 1220);
        assert_eq!(effective_max_frame(900, 1220), 900);
        assert_eq!(effective_max_frame(0, 1220), 0);
    }

    #[test]
    fn payload_mtu_is_net_of_session_id_overhead() {
        let max_frame = effective_max_frame(1220, DEFAULT_MAX_FRAME);
        assert_eq!(max_frame - SessionId::LEN, 1204);
    }
}
