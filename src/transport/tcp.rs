//! # Transporte TCP
//! src/transport/tcp.rs

use std::net::{TcpListener, TcpStream};

use tracing::debug;

use crate::error::TransportError;
use crate::transport::{Acceptor, StreamConnection};

pub type TcpConnection = StreamConnection<TcpStream>;

/// Acceptor sobre un socket TCP en escucha
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
    addr: String,
}

impl TcpAcceptor {
    /// Hace bind en `host:port` y comienza a escuchar
    ///
    /// Con puerto 0 el sistema elige uno libre; ver `local_addr`.
    pub fn bind(host: &str, port: u16) -> Result<Self, TransportError> {
        let requested = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&requested).map_err(|source| TransportError::Bind {
            addr: requested.clone(),
            source,
        })?;

        let addr = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or(requested);
        debug!(addr = %addr, "tcp acceptor listening");

        Ok(Self { listener, addr })
    }

    /// Dirección real en la que escucha
    pub fn local_addr(&self) -> &str {
        &self.addr
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().map(|a| a.port()).unwrap_or(0)
    }
}

impl Acceptor for TcpAcceptor {
    type Conn = TcpConnection;

    fn accept_conn(&self) -> Result<TcpConnection, TransportError> {
        let (stream, peer) = self
            .listener
            .accept()
            .map_err(|source| TransportError::Accept {
                addr: self.addr.clone(),
                source,
            })?;
        Ok(StreamConnection::new(stream, peer.ip().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Connection;
    use std::io::{Read, Write};
    use std::net::Shutdown;
    use std::thread;

    #[test]
    fn test_accept_and_echo() {
        let acceptor = TcpAcceptor::bind("127.0.0.1", 0).unwrap();
        let addr = acceptor.local_addr().to_string();

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(b"ping").unwrap();
            stream.shutdown(Shutdown::Write).unwrap();
            let mut buf = String::new();
            stream.read_to_string(&mut buf).unwrap();
            buf
        });

        let mut conn = acceptor.accept_conn().unwrap();
        assert_eq!(conn.peer_addr(), "127.0.0.1");
        let data = conn.read_all().unwrap();
        conn.write(&data).unwrap();
        drop(conn);

        assert_eq!(client.join().unwrap(), "ping");
    }

    #[test]
    fn test_bind_conflict() {
        let first = TcpAcceptor::bind("127.0.0.1", 0).unwrap();
        let err = TcpAcceptor::bind("127.0.0.1", first.port()).unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));
    }
}
