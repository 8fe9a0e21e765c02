//! Low-level socket streams and the connector that opens them.
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};

/// A socket to a server.
pub enum Stream {
    Tcp(TcpStream),
}

/// Opens new sockets. Held by the pool so the transport can be swapped
/// without touching pooling logic.
#[derive(Clone)]
pub enum StreamConnector {
    Tcp,
}

impl Default for StreamConnector {
    fn default() -> Self {
        StreamConnector::Tcp
    }
}

impl StreamConnector {
    pub fn connect(&self, hostname: &str, port: u16) -> io::Result<Stream> {
        match *self {
            StreamConnector::Tcp => TcpStream::connect((hostname, port)).map(Stream::Tcp),
        }
    }
}

impl Stream {
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match *self {
            Stream::Tcp(ref s) => s.peer_addr(),
        }
    }

    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match *self {
            Stream::Tcp(ref s) => s.shutdown(how),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match *self {
            Stream::Tcp(ref mut s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match *self {
            Stream::Tcp(ref mut s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match *self {
            Stream::Tcp(ref mut s) => s.flush(),
        }
    }
}
