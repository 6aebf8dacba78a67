use std::fmt;

/// Opaque 16-byte identifier naming one UDP session.
///
/// The core never interprets the bytes beyond equality and hashing; the
/// value is minted and authenticated by whatever side channel advertises
/// session birth/death to the edge.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; 16]);

impl SessionId {
    pub const LEN: usize = 16;

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parses a `SessionId` out of the trailing 16 bytes of `buf`.
    ///
    /// Returns `None` if `buf` is shorter than [`SessionId::LEN`].
    pub fn from_suffix(buf: &[u8]) -> Option<(Self, &[u8])> {
        if buf.len() < Self::LEN {
            return None;
        }
        let split_at = buf.len() - Self::LEN;
        let (payload, id) = buf.split_at(split_at);
        let mut bytes = [0u8; Self::LEN];
        bytes.copy_from_slice(id);
        Some((Self(bytes), payload))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// Formats as 32 lowercase hex characters with no hyphens, the shape a
/// `sessionID` log field uses.
impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({self})")
    }
}

impl From<[u8; 16]> for SessionId {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}
