use bytes::{Bytes, BytesMut};

use crate::SessionId;

/// Typical platform MTU-probe-derived frame cap. Callers should prefer
/// the QUIC connection's own negotiated max datagram size when one is
/// available; this constant is only a sensible default.
pub const DEFAULT_MAX_FRAME: usize = 1220;

/// Discriminator byte used by the tagged wire variant that multiplexes raw
/// IP packets alongside UDP sessions on the same QUIC connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameTag {
    Session = 0x00,
    RawIp = 0x01,
}

impl FrameTag {
    fn from_byte(byte: u8) -> Result<Self, FrameError> {
        match byte {
            0x00 => Ok(FrameTag::Session),
            0x01 => Ok(FrameTag::RawIp),
            other => Err(FrameError::UnknownTag { tag: other }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("payload of {len} bytes plus {overhead}-byte framing exceeds max frame size {max}")]
    TooLarge {
        len: usize,
        overhead: usize,
        max: usize,
    },

    #[error("frame of {len} bytes is too short to carry a session id")]
    Malformed { len: usize },

    #[error("unknown frame tag {tag:#04x}")]
    UnknownTag { tag: u8 },
}

/// A decoded tagged frame: either a UDP-session datagram or a raw IP packet
/// multiplexed on the same connection.
#[derive(Debug)]
pub enum Frame {
    Session { id: SessionId, payload: Bytes },
    RawIp { payload: Bytes },
}

/// Appends `id` to the tail of `payload`, producing the untagged wire
/// layout `payload || session_id[16]`.
///
/// Suffixing rather than prefixing lets a caller who read `payload` out of
/// a buffer with spare tail capacity append in place with no copy; see
/// [`encode_into`] for that zero-copy path.
pub fn encode(id: SessionId, payload: &[u8], max_frame: usize) -> Result<Bytes, FrameError> {
    check_len(payload.len(), SessionId::LEN, max_frame)?;
    let mut buf = BytesMut::with_capacity(payload.len() + SessionId::LEN);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(id.as_bytes());
    Ok(buf.freeze())
}

/// In-place variant of [`encode`]: `buf` already holds the payload bytes
/// (e.g. the result of a read into a `BytesMut` with spare tail capacity)
/// and the session id is appended without reallocating unless `buf`
/// lacks capacity.
pub fn encode_into(buf: &mut BytesMut, id: SessionId, max_frame: usize) -> Result<(), FrameError> {
    check_len(buf.len(), SessionId::LEN, max_frame)?;
    buf.extend_from_slice(id.as_bytes());
    Ok(())
}

/// Appends `id` and the session-frame discriminator, producing the tagged
/// wire layout `payload || session_id[16] || 0x00`.
pub fn encode_tagged(id: SessionId, payload: &[u8], max_frame: usize) -> Result<Bytes, FrameError> {
    check_len(payload.len(), SessionId::LEN + 1, max_frame)?;
    let mut buf = BytesMut::with_capacity(payload.len() + SessionId::LEN + 1);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(id.as_bytes());
    buf.extend_from_slice(&[FrameTag::Session as u8]);
    Ok(buf.freeze())
}

fn check_len(payload_len: usize, overhead: usize, max_frame: usize) -> Result<(), FrameError> {
    if payload_len + overhead > max_frame {
        return Err(FrameError::TooLarge {
            len: payload_len,
            overhead,
            max: max_frame,
        });
    }
    Ok(())
}

/// Interprets the final 16 bytes of `buf` as a session id. An
/// exactly-16-byte buffer decodes to an empty payload, preserving a
/// genuine zero-byte datagram rather than treating it as malformed.
pub fn decode(buf: Bytes) -> Result<(SessionId, Bytes), FrameError> {
    let len = buf.len();
    let (id, payload_len) = match SessionId::from_suffix(&buf) {
        Some((id, payload)) => (id, payload.len()),
        None => return Err(FrameError::Malformed { len }),
    };
    let payload = buf.slice(0..payload_len);
    Ok((id, payload))
}

/// Decodes the tagged wire variant, dispatching on the final byte.
pub fn decode_tagged(buf: Bytes) -> Result<Frame, FrameError> {
    let len = buf.len();
    if len < 1 {
        return Err(FrameError::Malformed { len });
    }
    let tag = FrameTag::from_byte(buf[len - 1])?;
    let without_tag = buf.slice(0..len - 1);

    match tag {
        FrameTag::RawIp => Ok(Frame::RawIp {
            payload: without_tag,
        }),
        FrameTag::Session => {
            let (id, payload) = decode(without_tag)?;
            Ok(Frame::Session { id, payload })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(byte: u8) -> SessionId {
        SessionId::from_bytes([byte; 16])
    }

    #[test]
    fn round_trip_preserves_id_and_payload() {
        for len in [0, 1, 17, 1200] {
            let payload = vec![0x42u8; len];
            let encoded = encode(id(3), &payload, DEFAULT_MAX_FRAME).unwrap();
            let (decoded_id, decoded_payload) = decode(encoded).unwrap();
            assert_eq!(decoded_id, id(3));
            assert_eq!(decoded_payload.as_ref(), payload.as_slice());
        }
    }

    #[test]
    fn round_trip_at_exact_mtu_boundary() {
        let max_frame = 64;
        let payload = vec![1u8; max_frame - SessionId::LEN];
        let encoded = encode(id(1), &payload, max_frame).unwrap();
        assert_eq!(encoded.len(), max_frame);
        let (decoded_id, decoded_payload) = decode(encoded).unwrap();
        assert_eq!(decoded_id, id(1));
        assert_eq!(decoded_payload.len(), payload.len());
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let max_frame = 32;
        let payload = vec![0u8; max_frame - SessionId::LEN + 1];
        let err = encode(id(9), &payload, max_frame).unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
    }

    #[test]
    fn decode_rejects_short_buffers() {
        let err = decode(Bytes::from_static(b"short")).unwrap_err();
        assert!(matches!(err, FrameError::Malformed { len: 5 }));
    }

    #[test]
    fn decode_of_exactly_16_bytes_yields_empty_payload() {
        let encoded = encode(id(5), &[], DEFAULT_MAX_FRAME).unwrap();
        assert_eq!(encoded.len(), SessionId::LEN);
        let (decoded_id, payload) = decode(encoded).unwrap();
        assert_eq!(decoded_id, id(5));
        assert!(payload.is_empty());
    }

    #[test]
    fn tagged_round_trip_for_session_frames() {
        let encoded = encode_tagged(id(2), b"hi", DEFAULT_MAX_FRAME).unwrap();
        match decode_tagged(encoded).unwrap() {
            Frame::Session { id: got, payload } => {
                assert_eq!(got, id(2));
                assert_eq!(payload.as_ref(), b"hi");
            }
            Frame::RawIp { .. } => panic!("expected a session frame"),
        }
    }

    #[test]
    fn tagged_decode_dispatches_raw_ip_frames() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"ip packet bytes");
        buf.extend_from_slice(&[FrameTag::RawIp as u8]);

        match decode_tagged(buf.freeze()).unwrap() {
            Frame::RawIp { payload } => assert_eq!(payload.as_ref(), b"ip packet bytes"),
            Frame::Session { .. } => panic!("expected a raw ip frame"),
        }
    }

    #[test]
    fn tagged_decode_rejects_unknown_tag() {
        let err = decode_tagged(Bytes::from_static(&[0xff])).unwrap_err();
        assert!(matches!(err, FrameError::UnknownTag { tag: 0xff }));
    }
}
