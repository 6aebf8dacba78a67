use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use session_mux_proto::SessionId;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::close::CloseReason;
use crate::metrics::metrics;
use crate::origin::Origin;

/// `idle_after = 0` substitutes this default.
pub const DEFAULT_IDLE_AFTER: Duration = Duration::from_secs(210);

/// The idle ticker fires at `idle_after / 8`, bounding the worst-case
/// early close to about 12.5% of the configured window.
const IDLE_CHECK_DIVISOR: u32 = 8;

/// The close channel's capacity: one slot for the reader task's error
/// path, one for an external [`Session::close`] call, so neither ever
/// blocks publishing.
const CLOSE_CHANNEL_CAPACITY: usize = 2;

/// The per-session submit path the reader task closes over, so `Session`
/// holds no back-pointer to its [`Manager`](crate::Manager). Built by the
/// Manager at registration time from its `Transport` handle and this
/// session's id.
pub(crate) trait RawSend: Send + Sync + 'static {
    fn send(&self, payload: &[u8]) -> Result<(), RawSendOutcome>;
}

pub(crate) enum RawSendOutcome {
    TooLarge,
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
#[error("origin write failed: {0}")]
pub struct WriteError(String);

struct Inner<O: Origin> {
    id: SessionId,
    origin: O,
    send_sink: Box<dyn RawSend>,
    mtu: usize,
    activity: watch::Sender<Instant>,
    close_tx: mpsc::Sender<CloseReason>,
    close_rx: Mutex<mpsc::Receiver<CloseReason>>,
    close_reason: OnceLock<CloseReason>,
    served: AtomicBool,
}

impl<O: Origin> Inner<O> {
    fn note_active(&self) {
        self.activity.send(Instant::now()).ok();
    }
}

/// One bidirectional pipe between the transport and one origin endpoint.
/// Cheap to clone (an `Arc` handle); the Manager keeps one clone in its
/// session table to route inbound datagrams while the caller of
/// [`Manager::register`](crate::Manager::register) keeps another to
/// drive [`Session::serve`].
pub struct Session<O: Origin> {
    inner: Arc<Inner<O>>,
}

impl<O: Origin> Clone for Session<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O: Origin> std::fmt::Debug for Session<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.inner.id).finish()
    }
}

impl<O: Origin> Session<O> {
    pub(crate) fn new(
        id: SessionId,
        origin: O,
        send_sink: Box<dyn RawSend>,
        mtu: usize,
    ) -> Self {
        let (close_tx, close_rx) = mpsc::channel(CLOSE_CHANNEL_CAPACITY);
        let (activity, _) = watch::channel(Instant::now());

        Self {
            inner: Arc::new(Inner {
                id,
                origin,
                send_sink,
                mtu,
                activity,
                close_tx,
                close_rx: Mutex::new(close_rx),
                close_reason: OnceLock::new(),
                served: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    /// `true` once this session has reached a terminal state.
    pub fn is_closed(&self) -> bool {
        self.inner.close_reason.get().is_some()
    }

    /// Idempotent: the first call wins, later calls are silently absorbed.
    pub fn close(&self, reason: CloseReason) {
        if self.inner.close_reason.set(reason.clone()).is_ok() {
            let _ = self.inner.close_tx.try_send(reason);
        }
    }

    /// Delivers a datagram that arrived for this session to the origin.
    /// Must not block on anything but the origin's own send path; called
    /// synchronously on the Manager's event loop thread.
    pub async fn write_to_origin(&self, payload: Bytes) -> Result<(), WriteError> {
        match self.inner.origin.send(&payload).await {
            Ok(()) => {
                self.inner.note_active();
                Ok(())
            }
            Err(err) => {
                let message = format!("origin write failed: {err}");
                self.close(CloseReason::LocalClose(message.clone()));
                Err(WriteError(message))
            }
        }
    }

    /// Runs this session until a terminal condition, returning whether
    /// the close originated with the remote side and why. Exactly one
    /// call per `Session` lifetime.
    pub async fn serve(&self, cancel: CancellationToken, idle_after: Duration) -> (bool, CloseReason) {
        assert!(
            !self.inner.served.swap(true, Ordering::SeqCst),
            "Session::serve called more than once for session {}",
            self.inner.id
        );

        let idle_after = if idle_after.is_zero() {
            DEFAULT_IDLE_AFTER
        } else {
            idle_after
        };

        let mut close_rx = self.inner.close_rx.lock().await;
        let mut activity_rx = self.inner.activity.subscribe();
        let mut last_active = *activity_rx.borrow();

        let tick_period = (idle_after / IDLE_CHECK_DIVISOR).max(Duration::from_millis(1));
        let mut idle_ticker = tokio::time::interval(tick_period);
        idle_ticker.tick().await;

        let reader = tokio::spawn(run_reader(Arc::clone(&self.inner)));

        let proposed = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break CloseReason::ManagerShutdown { by_remote: false };
                }
                Some(reason) = close_rx.recv() => {
                    break reason;
                }
                _ = idle_ticker.tick() => {
                    if last_active.elapsed() >= idle_after {
                        log::debug!(
                            "sessionID={} idle for {:?}, closing",
                            self.inner.id,
                            last_active.elapsed()
                        );
                        break CloseReason::IdleTimeout(idle_after);
                    }
                }
                changed = activity_rx.changed() => {
                    if changed.is_ok() {
                        last_active = *activity_rx.borrow();
                    }
                }
            }
        };

        // `close_reason` may already have been set by a racing call to
        // `close()` (from the reader task or an external caller); if so
        // that value, not `proposed`, is authoritative.
        self.inner.close_reason.set(proposed).ok();
        let reason = self
            .inner
            .close_reason
            .get()
            .cloned()
            .expect("close_reason set above");

        if let Err(err) = self.inner.origin.close().await {
            log::warn!("sessionID={} origin close failed: {err}", self.inner.id);
        }
        if let Err(err) = reader.await {
            log::warn!("sessionID={} reader task join failed: {err}", self.inner.id);
        }

        log::info!(
            "sessionID={} closed: by_remote={} reason={}",
            self.inner.id,
            reason.by_remote(),
            reason
        );

        (reason.by_remote(), reason)
    }
}

async fn run_reader<O: Origin>(inner: Arc<Inner<O>>) {
    let mut buf = vec![0u8; inner.mtu + 1];
    loop {
        match inner.origin.recv(&mut buf).await {
            Ok(len) => {
                inner.note_active();

                if len > inner.mtu {
                    metrics().packet_too_big();
                    log::warn!(
                        "sessionID={} dropped {}-byte origin read exceeding mtu {}",
                        inner.id,
                        len,
                        inner.mtu
                    );
                    continue;
                }

                match inner.send_sink.send(&buf[..len]) {
                    Ok(()) => {}
                    Err(RawSendOutcome::TooLarge) => {
                        metrics().packet_too_big();
                        log::warn!("sessionID={} transport rejected frame as too large", inner.id);
                    }
                    Err(RawSendOutcome::Fatal(message)) => {
                        log::error!("sessionID={} transport send failed: {message}", inner.id);
                        if inner.close_reason.set(CloseReason::TransportFailure(message.clone())).is_ok() {
                            let _ = inner
                                .close_tx
                                .try_send(CloseReason::TransportFailure(message));
                        }
                        return;
                    }
                }
            }
            Err(err) => {
                let message = format!("origin read failed: {err}");
                if inner
                    .close_reason
                    .set(CloseReason::LocalClose(message.clone()))
                    .is_ok()
                {
                    let _ = inner.close_tx.try_send(CloseReason::LocalClose(message));
                }
                return;
            }
        }
    }
}
