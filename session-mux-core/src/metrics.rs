use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::OnceLock;

/// Process-global session-table counters.
///
/// Registration with an actual metrics backend (Prometheus or otherwise)
/// is a connector-level concern external to this crate; this struct only
/// owns the atomics and their names so the connector can read them.
/// Pattern grounded in
/// `other_examples/samansohani78-SNIProxy-rs/sniproxy-core/src/udp_connection.rs`,
/// which keeps an always-present metrics struct alongside its UDP session
/// table rather than hiding it behind a feature flag.
pub struct Metrics {
    active_udp_sessions: AtomicI64,
    total_udp_sessions: AtomicU64,
    packet_too_big_dropped: AtomicU64,
}

impl Metrics {
    const fn new() -> Self {
        Self {
            active_udp_sessions: AtomicI64::new(0),
            total_udp_sessions: AtomicU64::new(0),
            packet_too_big_dropped: AtomicU64::new(0),
        }
    }

    pub fn active_udp_sessions(&self) -> i64 {
        self.active_udp_sessions.load(Ordering::Relaxed)
    }

    pub fn total_udp_sessions(&self) -> u64 {
        self.total_udp_sessions.load(Ordering::Relaxed)
    }

    pub fn packet_too_big_dropped(&self) -> u64 {
        self.packet_too_big_dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn session_registered(&self) {
        self.active_udp_sessions.fetch_add(1, Ordering::Relaxed);
        self.total_udp_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_unregistered(&self) {
        self.active_udp_sessions.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn packet_too_big(&self) {
        self.packet_too_big_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Returns the process-wide [`Metrics`] instance, initializing it on first
/// access. No other global state belongs to this crate.
pub fn metrics() -> &'static Metrics {
    static METRICS: OnceLock<Metrics> = OnceLock::new();
    METRICS.get_or_init(Metrics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister_move_the_gauge() {
        let m = Metrics::new();
        m.session_registered();
        m.session_registered();
        assert_eq!(m.active_udp_sessions(), 2);
        assert_eq!(m.total_udp_sessions(), 2);

        m.session_unregistered();
        assert_eq!(m.active_udp_sessions(), 1);
        assert_eq!(m.total_udp_sessions(), 2);
    }

    #[test]
    fn too_big_counter_only_increments() {
        let m = Metrics::new();
        m.packet_too_big();
        m.packet_too_big();
        m.packet_too_big();
        assert_eq!(m.packet_too_big_dropped(), 3);
    }
}
