use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;

use crate::conn::Connection;

/// A [`Connection`] over a TCP stream, for hosts whose accept service
/// deals in [`TcpStream`]s.
pub struct TcpConnection {
    stream: TcpStream,
    connected: bool,
}

impl TcpConnection {
    pub fn new(stream: TcpStream) -> TcpConnection {
        // RSP is many tiny packets; leaving Nagle on makes stepping crawl
        let _ = stream.set_nodelay(true);
        TcpConnection {
            stream,
            connected: true,
        }
    }
}

impl Connection for TcpConnection {
    type Error = std::io::Error;

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<(), Self::Error> {
        self.stream.set_nonblocking(nonblocking)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        match self.stream.read(buf) {
            // EOF: the peer closed its half of the stream
            Ok(0) => {
                self.connected = false;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                Ok(0)
            }
            Err(err) => {
                self.connected = false;
                Err(err)
            }
        }
    }

    fn send(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        let result = self.stream.write_all(data);
        if result.is_err() {
            self.connected = false;
        }
        result
    }
}
