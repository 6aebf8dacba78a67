//! In-memory doubles for [`Origin`] and [`Transport`], used by this
//! crate's own test suite and available to downstream crates under the
//! `testing` feature.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use session_mux_proto::SessionId;
use tokio::sync::{mpsc, watch, Mutex};

use crate::origin::Origin;
use crate::session::{RawSend, RawSendOutcome};
use crate::transport::{ReceiveError, SendError, Transport};

/// An in-memory stand-in for a connected UDP socket. `recv` yields bytes
/// pushed through the paired [`OriginRemote`]; `send` forwards to it.
pub struct InMemoryOrigin {
    inbound: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    outbound: mpsc::UnboundedSender<Bytes>,
    closed: watch::Sender<bool>,
}

pub struct OriginRemote {
    inbound_tx: mpsc::UnboundedSender<Bytes>,
    outbound_rx: Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl InMemoryOrigin {
    pub fn pair() -> (Self, OriginRemote) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (closed_tx, _) = watch::channel(false);

        (
            Self {
                inbound: Mutex::new(inbound_rx),
                outbound: outbound_tx,
                closed: closed_tx,
            },
            OriginRemote {
                inbound_tx,
                outbound_rx: Mutex::new(outbound_rx),
            },
        )
    }
}

impl OriginRemote {
    /// Simulates the origin server sending `data` toward the tunnel.
    pub fn deliver(&self, data: Bytes) {
        self.inbound_tx.send(data).ok();
    }

    /// Returns the next payload the session wrote toward the origin.
    pub async fn recv_sent(&self) -> Option<Bytes> {
        self.outbound_rx.lock().await.recv().await
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "origin closed")
}

impl Origin for InMemoryOrigin {
    type Error = io::Error;

    async fn recv(&self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(closed_error());
        }

        tokio::select! {
            biased;
            _ = closed.changed() => Err(closed_error()),
            message = async { self.inbound.lock().await.recv().await } => {
                match message {
                    Some(data) => {
                        let n = data.len().min(buf.len());
                        buf[..n].copy_from_slice(&data[..n]);
                        Ok(n)
                    }
                    None => Err(closed_error()),
                }
            }
        }
    }

    async fn send(&self, buf: &[u8]) -> Result<(), Self::Error> {
        self.outbound
            .send(Bytes::copy_from_slice(buf))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "remote dropped"))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.closed.send(true).ok();
        Ok(())
    }
}

/// A [`RawSend`] double that records every frame a session submits.
pub struct TestSink {
    tx: mpsc::UnboundedSender<Bytes>,
}

pub struct TestSinkRx {
    rx: Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl TestSink {
    pub fn new() -> (Self, TestSinkRx) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, TestSinkRx { rx: Mutex::new(rx) })
    }
}

impl TestSinkRx {
    pub async fn recv(&self) -> Option<Bytes> {
        self.rx.lock().await.recv().await
    }
}

impl RawSend for TestSink {
    fn send(&self, payload: &[u8]) -> Result<(), RawSendOutcome> {
        self.tx
            .send(Bytes::copy_from_slice(payload))
            .map_err(|_| RawSendOutcome::Fatal("test sink dropped".into()))
    }
}

/// An in-memory stand-in for a QUIC connection carrying framed,
/// session-tagged datagrams. `EdgeRemote` plays the edge peer: it
/// injects inbound datagrams and observes outbound ones.
pub struct InMemoryTransport {
    inbound: Mutex<mpsc::UnboundedReceiver<(SessionId, Bytes)>>,
    outbound: mpsc::UnboundedSender<(SessionId, Bytes)>,
    max_datagram_size: usize,
    graceful: Arc<watch::Sender<Option<bool>>>,
}

pub struct EdgeRemote {
    inbound_tx: mpsc::UnboundedSender<(SessionId, Bytes)>,
    outbound_rx: Mutex<mpsc::UnboundedReceiver<(SessionId, Bytes)>>,
    graceful: Arc<watch::Sender<Option<bool>>>,
}

impl InMemoryTransport {
    pub fn pair(max_datagram_size: usize) -> (Self, EdgeRemote) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let graceful = Arc::new(watch::channel(None).0);

        (
            Self {
                inbound: Mutex::new(inbound_rx),
                outbound: outbound_tx,
                max_datagram_size,
                graceful: Arc::clone(&graceful),
            },
            EdgeRemote {
                inbound_tx,
                outbound_rx: Mutex::new(outbound_rx),
                graceful,
            },
        )
    }
}

impl EdgeRemote {
    pub fn deliver(&self, id: SessionId, payload: Bytes) {
        self.inbound_tx.send((id, payload)).ok();
    }

    pub async fn recv_sent(&self) -> Option<(SessionId, Bytes)> {
        self.outbound_rx.lock().await.recv().await
    }

    /// Simulates the QUIC connection closing with the application "no
    /// error" code.
    pub fn close_gracefully(&self) {
        self.graceful.send(Some(true)).ok();
    }

    /// Simulates the QUIC connection breaking for any other reason.
    pub fn close_fatally(&self) {
        self.graceful.send(Some(false)).ok();
    }
}

#[derive(Debug, thiserror::Error)]
#[error("in-memory transport connection lost")]
pub struct InMemoryTransportError;

impl Transport for InMemoryTransport {
    type Error = InMemoryTransportError;

    fn send(&self, id: SessionId, payload: &[u8]) -> Result<(), SendError<Self::Error>> {
        if payload.len() > self.max_datagram_size {
            return Err(SendError::TooLarge);
        }
        self.outbound
            .send((id, Bytes::copy_from_slice(payload)))
            .map_err(|_| SendError::Fatal(InMemoryTransportError))
    }

    async fn receive(&self) -> Result<(SessionId, Bytes), ReceiveError<Self::Error>> {
        let mut graceful = self.graceful.subscribe();
        match *graceful.borrow() {
            Some(false) => return Err(ReceiveError::Fatal(InMemoryTransportError)),
            Some(true) => return Err(ReceiveError::Graceful),
            None => {}
        }

        tokio::select! {
            biased;
            changed = graceful.changed() => {
                match changed {
                    Ok(()) => match *graceful.borrow() {
                        Some(true) | None => Err(ReceiveError::Graceful),
                        Some(false) => Err(ReceiveError::Fatal(InMemoryTransportError)),
                    },
                    Err(_) => Err(ReceiveError::Fatal(InMemoryTransportError)),
                }
            }
            message = async { self.inbound.lock().await.recv().await } => {
                match message {
                    Some((id, payload)) => Ok((id, payload)),
                    None => Err(ReceiveError::Graceful),
                }
            }
        }
    }

    fn max_datagram_size(&self) -> usize {
        self.max_datagram_size
    }
}
