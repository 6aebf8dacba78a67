use std::time::Duration;

/// Why a [`Session`](crate::Session) reached its terminal state. Set
/// exactly once per session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CloseReason {
    #[error("idle for {0:?}")]
    IdleTimeout(Duration),

    #[error("closed by remote: {0}")]
    RemoteClose(String),

    #[error("closed locally: {0}")]
    LocalClose(String),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// `by_remote` is `false` when a session's own cancel token fired and
    /// `true` when the Manager tore down the whole table because the
    /// transport reader died, two distinct paths that both report
    /// "manager shutdown" with different provenance, so the flag travels
    /// with the variant instead of being a constant per variant.
    #[error("manager shutdown")]
    ManagerShutdown { by_remote: bool },
}

impl CloseReason {
    /// Whether the connector must skip the polite unregister round-trip
    /// toward the edge because the edge already knows.
    pub fn by_remote(&self) -> bool {
        match self {
            CloseReason::RemoteClose(_) => true,
            CloseReason::ManagerShutdown { by_remote } => *by_remote,
            CloseReason::IdleTimeout(_)
            | CloseReason::LocalClose(_)
            | CloseReason::TransportFailure(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_shutdown_and_remote_close_are_by_remote() {
        assert!(CloseReason::ManagerShutdown { by_remote: true }.by_remote());
        assert!(!CloseReason::ManagerShutdown { by_remote: false }.by_remote());
        assert!(CloseReason::RemoteClose("bye".into()).by_remote());
    }

    #[test]
    fn local_paths_are_not_by_remote() {
        assert!(!CloseReason::IdleTimeout(Duration::from_secs(1)).by_remote());
        assert!(!CloseReason::LocalClose("done".into()).by_remote());
        assert!(!CloseReason::TransportFailure("boom".into()).by_remote());
    }
}
