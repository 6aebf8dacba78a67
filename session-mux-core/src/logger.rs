use std::sync::Arc;

use arc_swap::ArcSwap;
use session_mux_proto::SessionId;

/// Severity for [`Logger::log`], matching the `log` crate's levels so a
/// `Logger` implementation can trivially forward to `log::log!`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// The pluggable log sink a [`Manager`](crate::Manager) writes through.
/// Log formatting is a thin shim owned by the connector; this trait is
/// that shim's seam. `session_id` is `None` for connection-scoped lines
/// and `Some` for session-scoped ones, which carry a `sessionID` field.
pub trait Logger: Send + Sync + 'static {
    fn log(&self, level: Level, session_id: Option<SessionId>, message: &str);
}

/// Forwards to the process-global `log` crate facade, formatting
/// `sessionID` into the message text the way `web-transport-quinn`'s
/// `log::debug!`/`log::warn!` call sites do (`log` has no structured
/// key-value API).
pub struct DefaultLogger;

impl Logger for DefaultLogger {
    fn log(&self, level: Level, session_id: Option<SessionId>, message: &str) {
        match (level, session_id) {
            (Level::Debug, Some(id)) => log::debug!("sessionID={id} {message}"),
            (Level::Debug, None) => log::debug!("{message}"),
            (Level::Info, Some(id)) => log::info!("sessionID={id} {message}"),
            (Level::Info, None) => log::info!("{message}"),
            (Level::Warn, Some(id)) => log::warn!("sessionID={id} {message}"),
            (Level::Warn, None) => log::warn!("{message}"),
            (Level::Error, Some(id)) => log::error!("sessionID={id} {message}"),
            (Level::Error, None) => log::error!("{message}"),
        }
    }
}

/// Holds the current [`Logger`] behind a single-word atomic swap. A
/// caller that reads the pointer just before [`LoggerSlot::update`]
/// swaps it in may log one line through the outgoing logger; that race
/// is harmless and not worth a lock. Grounded in
/// `arc_swap::ArcSwapOption`'s use for an analogous hot-swappable
/// connection handle in
/// `other_examples/Numi2-solana-numistack/crates/solana-quic-proxy/src/client.rs`.
pub(crate) struct LoggerSlot(ArcSwap<Arc<dyn Logger>>);

impl LoggerSlot {
    pub(crate) fn new(logger: Arc<dyn Logger>) -> Self {
        Self(ArcSwap::from_pointee(logger))
    }

    pub(crate) fn update(&self, logger: Arc<dyn Logger>) {
        self.0.store(Arc::new(logger));
    }

    pub(crate) fn log(&self, level: Level, session_id: Option<SessionId>, message: &str) {
        self.0.load().log(level, session_id, message);
    }
}
