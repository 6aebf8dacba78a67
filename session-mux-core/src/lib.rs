//! Session table, per-session forwarder, and event-loop manager for the
//! datagram session multiplexer.
//!
//! A single QUIC connection carries datagrams belonging to many
//! independent UDP sessions. [`Manager`] owns the session table and the
//! event loop that serialises every mutation to it; [`Session`] is the
//! per-flow forwarder between one [`Origin`] endpoint and the transport;
//! [`CloseReason`] and [`Metrics`] describe why a session ended and how
//! many are live.

mod close;
mod error;
mod logger;
mod manager;
mod metrics;
mod origin;
mod session;
mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use close::CloseReason;
pub use error::{ManagerError, ServeError};
pub use logger::{DefaultLogger, Level, Logger};
pub use manager::{Manager, DEFAULT_RPC_TIMEOUT};
pub use metrics::{metrics, Metrics};
pub use origin::Origin;
pub use session::{Session, DEFAULT_IDLE_AFTER};
pub use transport::{ReceiveError, SendError, Transport};
