use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use session_mux_proto::SessionId;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::close::CloseReason;
use crate::error::{ManagerError, ServeError};
use crate::logger::{Level, Logger, LoggerSlot};
use crate::metrics::metrics;
use crate::origin::Origin;
use crate::session::{RawSend, RawSendOutcome, Session};
use crate::transport::{ReceiveError, SendError, Transport};

/// Register/unregister RPCs give up after this long if the event loop
/// never replies.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// The transport reader stays this far ahead of the event loop before it
/// starts applying back-pressure to the QUIC connection.
const DATAGRAM_QUEUE_CAPACITY: usize = 16;

/// `register_q`/`unregister_q` approximate the rendezvous handoff a
/// caller-waits-for-reply RPC wants; tokio's `mpsc` has a minimum buffer
/// of 1, so capacity 1 is the closest a bounded channel gets to
/// unbuffered.
const CONTROL_QUEUE_CAPACITY: usize = 1;

struct RegisterRequest<O: Origin> {
    id: SessionId,
    origin: O,
    reply: oneshot::Sender<Result<Session<O>, ManagerError>>,
}

struct UnregisterRequest {
    id: SessionId,
    reason: CloseReason,
    reply: oneshot::Sender<Result<(), ManagerError>>,
}

/// Adapts a shared [`Transport`] handle plus a fixed [`SessionId`] into
/// the callable a [`Session`]'s reader task closes over, so `Session`
/// itself never needs to know about `Manager` or `Transport`.
struct BoundSink<T: Transport> {
    id: SessionId,
    transport: Arc<T>,
}

impl<T: Transport> RawSend for BoundSink<T> {
    fn send(&self, payload: &[u8]) -> Result<(), RawSendOutcome> {
        match self.transport.send(self.id, payload) {
            Ok(()) => Ok(()),
            Err(SendError::TooLarge) => Err(RawSendOutcome::TooLarge),
            Err(SendError::Fatal(err)) => Err(RawSendOutcome::Fatal(err.to_string())),
        }
    }
}

/// Owns the session table and the single event loop that mutates it.
/// Routes inbound datagrams to sessions, and presents `register`/
/// `unregister` to external callers as request/reply RPCs serviced by
/// that loop. Modelled on `web-transport-ws/src/session.rs`'s
/// `tokio::select!` loop over a session map fed by `mpsc` control
/// channels.
pub struct Manager<T: Transport, O: Origin> {
    transport: Arc<T>,
    logger: LoggerSlot,
    register_tx: mpsc::Sender<RegisterRequest<O>>,
    register_rx: Mutex<mpsc::Receiver<RegisterRequest<O>>>,
    unregister_tx: mpsc::Sender<UnregisterRequest>,
    unregister_rx: Mutex<mpsc::Receiver<UnregisterRequest>>,
    closed: watch::Sender<bool>,
    rpc_timeout: Duration,
}

impl<T: Transport, O: Origin> Manager<T, O> {
    pub fn new(transport: T, logger: Arc<dyn Logger>) -> Self {
        Self::with_rpc_timeout(transport, logger, DEFAULT_RPC_TIMEOUT)
    }

    /// Same as [`Manager::new`] but with the register/unregister RPC
    /// timeout overridden, for tests that want to observe a `Timeout`
    /// without waiting the real default out.
    pub fn with_rpc_timeout(transport: T, logger: Arc<dyn Logger>, rpc_timeout: Duration) -> Self {
        let (register_tx, register_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
        let (closed, _) = watch::channel(false);

        Self {
            transport: Arc::new(transport),
            logger: LoggerSlot::new(logger),
            register_tx,
            register_rx: Mutex::new(register_rx),
            unregister_tx,
            unregister_rx: Mutex::new(unregister_rx),
            closed,
            rpc_timeout,
        }
    }

    /// Swaps the active [`Logger`]. Takes effect for the next log line;
    /// a line already in flight through the old logger is not recalled.
    pub fn update_logger(&self, logger: Arc<dyn Logger>) {
        self.logger.update(logger);
    }

    /// Registers `origin` under `id` and returns a [`Session`] handle.
    /// The caller, not the Manager, is responsible for invoking
    /// [`Session::serve`] on the returned handle.
    pub async fn register(
        &self,
        cancel: CancellationToken,
        id: SessionId,
        origin: O,
    ) -> Result<Session<O>, ManagerError> {
        if *self.closed.borrow() {
            return Err(ManagerError::AlreadyClosed);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = RegisterRequest {
            id,
            origin,
            reply: reply_tx,
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(ManagerError::Cancelled),
            sent = self.register_tx.send(request) => {
                if sent.is_err() {
                    return Err(ManagerError::AlreadyClosed);
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(ManagerError::Cancelled),
            outcome = tokio::time::timeout(self.rpc_timeout, reply_rx) => match outcome {
                Ok(Ok(reply)) => reply,
                Ok(Err(_)) => Err(ManagerError::AlreadyClosed),
                Err(_) => Err(ManagerError::Timeout(self.rpc_timeout)),
            },
        }
    }

    /// Enqueues removal of `id`, returning once the event loop has
    /// accepted the request (not necessarily once the Session has
    /// finished draining).
    pub async fn unregister(
        &self,
        cancel: CancellationToken,
        id: SessionId,
        message: String,
        by_remote: bool,
    ) -> Result<(), ManagerError> {
        if *self.closed.borrow() {
            return Err(ManagerError::AlreadyClosed);
        }

        let reason = if by_remote {
            CloseReason::RemoteClose(message)
        } else {
            CloseReason::LocalClose(message)
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = UnregisterRequest {
            id,
            reason,
            reply: reply_tx,
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(ManagerError::Cancelled),
            sent = self.unregister_tx.send(request) => {
                if sent.is_err() {
                    return Err(ManagerError::AlreadyClosed);
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(ManagerError::Cancelled),
            outcome = tokio::time::timeout(self.rpc_timeout, reply_rx) => match outcome {
                Ok(Ok(reply)) => reply,
                Ok(Err(_)) => Err(ManagerError::AlreadyClosed),
                Err(_) => Err(ManagerError::Timeout(self.rpc_timeout)),
            },
        }
    }

    /// Runs the event loop until `cancel` fires or the transport ends.
    /// The session table lives on this call's stack and is touched
    /// nowhere else; `register`/`unregister`/inbound-datagram handling
    /// all happen inline, one at a time, inside the loop below.
    pub async fn serve(&self, cancel: CancellationToken) -> Result<(), ServeError> {
        let (datagram_tx, mut datagram_rx) = mpsc::channel::<(SessionId, Bytes)>(DATAGRAM_QUEUE_CAPACITY);

        let reader_cancel = cancel.clone();
        let reader_transport = Arc::clone(&self.transport);
        let reader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reader_cancel.cancelled() => return Ok(()),
                    received = reader_transport.receive() => match received {
                        Ok((id, payload)) => {
                            if datagram_tx.send((id, payload)).await.is_err() {
                                return Ok(());
                            }
                        }
                        Err(ReceiveError::Graceful) => return Ok(()),
                        Err(ReceiveError::Fatal(err)) => return Err(err),
                    },
                }
            }
        });

        let mut register_rx = self.register_rx.lock().await;
        let mut unregister_rx = self.unregister_rx.lock().await;
        let mut table: HashMap<SessionId, Session<O>> = HashMap::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(request) = register_rx.recv() => {
                    self.handle_register(&mut table, request);
                }
                Some(request) = unregister_rx.recv() => {
                    self.handle_unregister(&mut table, request);
                }
                datagram = datagram_rx.recv() => match datagram {
                    Some((id, payload)) => self.route_datagram(&table, id, payload).await,
                    None => break,
                },
            }
        }

        self.closed.send(true).ok();
        self.logger.log(Level::Info, None, "manager shutting down, closing all sessions");

        for (_, session) in table.drain() {
            session.close(CloseReason::ManagerShutdown { by_remote: true });
            metrics().session_unregistered();
        }

        match reader.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(fatal)) => Err(ServeError::TransportFatal(fatal.to_string())),
            Err(join_err) => Err(ServeError::TransportFatal(format!(
                "transport reader task failed: {join_err}"
            ))),
        }
    }

    fn handle_register(&self, table: &mut HashMap<SessionId, Session<O>>, request: RegisterRequest<O>) {
        if table.contains_key(&request.id) {
            let _ = request.reply.send(Err(ManagerError::DuplicateSession));
            return;
        }

        let mtu = self.transport.max_datagram_size();
        let sink = Box::new(BoundSink {
            id: request.id,
            transport: Arc::clone(&self.transport),
        });
        let session = Session::new(request.id, request.origin, sink, mtu);

        table.insert(request.id, session.clone());
        metrics().session_registered();
        self.logger.log(Level::Info, Some(request.id), "session registered");

        let _ = request.reply.send(Ok(session));
    }

    fn handle_unregister(&self, table: &mut HashMap<SessionId, Session<O>>, request: UnregisterRequest) {
        match table.remove(&request.id) {
            Some(session) => {
                session.close(request.reason);
                metrics().session_unregistered();
                self.logger.log(Level::Info, Some(request.id), "session unregistered");
            }
            None => {
                self.logger
                    .log(Level::Debug, Some(request.id), "unregister for unknown session id");
            }
        }
        let _ = request.reply.send(Ok(()));
    }

    async fn route_datagram(&self, table: &HashMap<SessionId, Session<O>>, id: SessionId, payload: Bytes) {
        match table.get(&id) {
            Some(session) => {
                if let Err(err) = session.write_to_origin(payload).await {
                    self.logger
                        .log(Level::Warn, Some(id), &format!("write_to_origin failed: {err}"));
                }
            }
            None => {
                self.logger
                    .log(Level::Debug, Some(id), "datagram for unknown session id, discarding");
            }
        }
    }
}
