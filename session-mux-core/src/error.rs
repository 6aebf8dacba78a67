use std::time::Duration;

/// Errors surfaced by [`Manager::register`](crate::Manager::register) and
/// [`Manager::unregister`](crate::Manager::unregister). The session table
/// is left unchanged whenever one of these is returned.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("manager already closed")]
    AlreadyClosed,

    #[error("duplicate session id")]
    DuplicateSession,

    #[error("timed out after {0:?} waiting for the event loop")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

/// Why [`Manager::serve`](crate::Manager::serve) returned an error.
/// `Ok` completion means the transport reported a graceful close.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("transport failed: {0}")]
    TransportFatal(String),
}
