//! # Capa de Transporte
//! src/transport/mod.rs
//!
//! Define la forma mínima que debe cumplir un transporte para que el
//! servidor lo use:
//!
//! - Un `Acceptor` entrega conexiones nuevas, bloqueando hasta que llegue una.
//! - Una `Connection` lee y escribe bytes y conoce su dirección remota.
//!
//! Los transportes cifrados cumplen la misma forma; el handshake ocurre al
//! construir su acceptor y es opaco para el resto del framework.

pub mod tcp;
pub mod unix;

pub use tcp::{TcpAcceptor, TcpConnection};
pub use unix::{UnixAcceptor, UnixConnection};

use std::io::{Read, Write};

use crate::error::TransportError;

/// Tamaño de cada lectura de `read_all`
pub const READ_CHUNK: usize = 4096;

/// Conexión establecida con un cliente
///
/// La tarea que la recibe es su única dueña; al soltarla se cierra el
/// descriptor subyacente.
pub trait Connection: Send {
    /// Lee hasta `buf.len()` bytes; retorna cuántos se leyeron (0 = EOF)
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Escribe todos los bytes o falla
    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Dirección remota en forma legible
    fn peer_addr(&self) -> &str;

    /// Lee todo lo que el cliente ya envió
    ///
    /// Lee en bloques de `READ_CHUNK` hasta EOF o hasta que una lectura
    /// retorne menos de un bloque completo.
    fn read_all(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut data = Vec::new();
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = self.read(&mut buf)?;
            data.extend_from_slice(&buf[..n]);
            if n < READ_CHUNK {
                break;
            }
        }
        Ok(data)
    }

    fn write_str(&mut self, data: &str) -> Result<(), TransportError> {
        self.write(data.as_bytes())
    }
}

/// Fuente de conexiones nuevas
pub trait Acceptor {
    type Conn: Connection + 'static;

    /// Bloquea hasta aceptar una conexión
    fn accept_conn(&self) -> Result<Self::Conn, TransportError>;
}

/// Conexión sobre cualquier stream bidireccional del sistema
#[derive(Debug)]
pub struct StreamConnection<S> {
    stream: S,
    peer: String,
}

impl<S> StreamConnection<S> {
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream,
            peer: peer.into(),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

impl<S: Read + Write + Send> Connection for StreamConnection<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.stream.read(buf).map_err(|source| TransportError::Read {
            peer: self.peer.clone(),
            source,
        })
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream
            .write_all(bytes)
            .and_then(|_| self.stream.flush())
            .map_err(|source| TransportError::Write {
                peer: self.peer.clone(),
                source,
            })
    }

    fn peer_addr(&self) -> &str {
        &self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    /// Stream en memoria: lee de `input`, escribe en `output`
    struct MemStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for MemStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for MemStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn mem_conn(input: Vec<u8>) -> StreamConnection<MemStream> {
        StreamConnection::new(
            MemStream {
                input: Cursor::new(input),
                output: Vec::new(),
            },
            "mem",
        )
    }

    #[test]
    fn test_read_all_short_input() {
        let mut conn = mem_conn(b"hola mundo".to_vec());
        assert_eq!(conn.read_all().unwrap(), b"hola mundo");
    }

    #[test]
    fn test_read_all_spans_chunks() {
        let input = vec![b'x'; READ_CHUNK * 2 + 10];
        let mut conn = mem_conn(input.clone());
        assert_eq!(conn.read_all().unwrap(), input);
    }

    #[test]
    fn test_read_all_exact_chunk_then_eof() {
        let input = vec![b'y'; READ_CHUNK];
        let mut conn = mem_conn(input.clone());
        assert_eq!(conn.read_all().unwrap(), input);
    }

    #[test]
    fn test_read_all_empty() {
        let mut conn = mem_conn(Vec::new());
        assert!(conn.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_write_and_peer() {
        let mut conn = mem_conn(Vec::new());
        conn.write_str("respuesta").unwrap();
        assert_eq!(conn.get_ref().output, b"respuesta");
        assert_eq!(conn.peer_addr(), "mem");
    }
}
