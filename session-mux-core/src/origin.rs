use std::future::Future;

/// The local UDP endpoint on the connector side of one session.
///
/// Modelled in the style of `web-transport-generic`'s `Session` trait:
/// async methods returning `impl Future<...> + Send` (RPITIT) rather than
/// `#[async_trait]`, so a call through this trait costs no extra
/// allocation on the read/write hot path. A [`Session`](crate::Session)
/// owns its `Origin` exclusively from registration until close.
///
/// Methods take `&self`, not `&mut self`, mirroring
/// `tokio::net::UdpSocket`'s actual API: a connected UDP socket lets
/// `recv` and `send` run concurrently from independent tasks with no
/// external lock. That independence matters because `write_to_origin`
/// must not block behind a reader task that is independently parked in
/// `recv` on the same endpoint. An `&mut self` trait would force a mutex
/// between the two and risk `write_to_origin` blocking behind a reader
/// parked in a slow `recv`.
pub trait Origin: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reads one datagram's worth of bytes into `buf`. A return of `Ok(0)`
    /// means a genuine zero-byte datagram was read, not end-of-stream;
    /// some UDP applications use empty datagrams as signals, and the
    /// caller forwards them as such.
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = Result<usize, Self::Error>> + Send;

    /// Writes one datagram's worth of bytes to the origin. Must not block
    /// on anything but the underlying socket's send path, which is
    /// expected to be non-blocking in steady state.
    fn send(&self, buf: &[u8]) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Closes the endpoint. Called exactly once, on the session's
    /// terminal transition.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
