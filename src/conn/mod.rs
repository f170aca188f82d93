//! Byte transport between the stub and a debugger client.
//!
//! Both seams here are consumed interfaces: the host brings the socket
//! layer, the same way it brings the [`Processor`](crate::target::Processor).
//! [`TcpConnection`] is a convenience [`Connection`] impl for hosts whose
//! accept service hands out [`TcpStream`](std::net::TcpStream)s.

mod tcp;

pub use tcp::TcpConnection;

/// A connected debugger client.
///
/// The session loop polls rather than blocks, so implementations must
/// support a non-blocking receive that distinguishes "nothing yet" from
/// "gone".
pub trait Connection {
    /// Transport-specific error type.
    type Error: core::fmt::Debug;

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), Self::Error>;

    /// Whether the peer is still there. Once this returns `false` the
    /// session is over.
    fn is_connected(&self) -> bool;

    /// Read whatever is available into `buf` without blocking.
    /// `Ok(0)` means no data right now, or a peer that just went away;
    /// [`is_connected`](Connection::is_connected) tells the two apart.
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Send the entire buffer.
    fn send(&mut self, data: &[u8]) -> Result<(), Self::Error>;
}

/// The host service that accepts debugger clients on a configured port.
///
/// Never implemented by this crate: the stub hands over a per-client
/// callback through [`GdbStub::listen`](crate::GdbStub::listen) and the
/// host owns the running server, its threads, and its shutdown.
pub trait SocketServer: Sized {
    /// The connection type handed to the callback.
    type Conn: Connection;

    /// Error raised while binding the configured port.
    type Error;

    /// Bind `port` and invoke `on_accept` for every client that connects.
    fn create<F>(port: u16, on_accept: F) -> Result<Self, Self::Error>
    where
        F: FnMut(Self::Conn) + Send + 'static;
}
