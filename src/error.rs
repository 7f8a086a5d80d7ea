//! # Errores del framework
//! src/error.rs
//!
//! Cada capa tiene su propio tipo de error. Los errores de una tarea
//! nunca cruzan hacia el loop del servidor: solo `ServerError` puede
//! terminar `Server::run`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errores de transporte (bind, accept, lectura, escritura).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept client on {addr}: {source}")]
    Accept {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("unable to read from {peer}: {source}")]
    Read {
        peer: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to {peer}: {source}")]
    Write {
        peer: String,
        #[source]
        source: io::Error,
    },
}

/// Errores al construir un runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to install SIGCHLD reaper: {0}")]
    Reaper(nix::errno::Errno),

    #[error("worker pool needs at least one worker")]
    NoWorkers,
}

/// Errores del canal IPC entre procesos.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("payload of {len} bytes exceeds the {max} byte IPC limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("IPC I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed IPC message: {0}")]
    Malformed(String),

    #[error("IPC JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("logger has no log file, cannot derive an IPC channel")]
    NoLogFile,

    #[error("logger is not in multi-process mode")]
    NotStarted,

    #[error("failed to fork logger dispatcher: {0}")]
    Fork(nix::errno::Errno),
}

pub(crate) fn ipc_io(path: impl Into<PathBuf>, source: io::Error) -> IpcError {
    IpcError::Io {
        path: path.into(),
        source,
    }
}

/// Errores del logger de eventos.
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to append to log file {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Ipc(#[from] IpcError),
}

/// Error al reconstruir un `LogEvent` serializado.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventParseError {
    #[error("logger event has no data")]
    Empty,
}

/// Errores que terminan el loop del servidor.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}
