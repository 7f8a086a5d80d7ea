//! # Transporte Unix-domain
//! src/transport/unix.rs
//!
//! Misma forma que TCP pero sobre un socket de dominio Unix. Útil para
//! servicios locales y para tests que no quieren tocar la red.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use crate::error::TransportError;
use crate::transport::{Acceptor, StreamConnection};

pub type UnixConnection = StreamConnection<UnixStream>;

#[derive(Debug)]
pub struct UnixAcceptor {
    listener: UnixListener,
    path: PathBuf,
}

impl UnixAcceptor {
    /// Hace bind en `path`, eliminando un socket viejo si existe
    pub fn bind(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |source| TransportError::Bind {
            addr: path.display().to_string(),
            source,
        };

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(bind_err(err)),
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        Ok(Self { listener, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Acceptor for UnixAcceptor {
    type Conn = UnixConnection;

    fn accept_conn(&self) -> Result<UnixConnection, TransportError> {
        let (stream, _) = self
            .listener
            .accept()
            .map_err(|source| TransportError::Accept {
                addr: self.path.display().to_string(),
                source,
            })?;
        Ok(StreamConnection::new(stream, "local"))
    }
}

impl Drop for UnixAcceptor {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
