//! # Canal IPC del Logger
//! src/logger/ipc.rs
//!
//! Transporte de mensajes entre procesos hijos y el proceso origen del
//! logger, sobre sockets Unix de datagramas:
//!
//! - El **canal conocido** es un socket cuyo nombre se deriva de la ruta
//!   del archivo de log y de un tag de servicio, así dos servidores con
//!   archivos distintos no chocan y una nueva ejecución con el mismo
//!   archivo usa el mismo canal.
//! - Cada consulta `GET_*` crea un **endpoint de respuesta** privado, lo
//!   usa una vez y lo destruye.
//!
//! Los mensajes viajan como JSON. El cuerpo está limitado a
//! `MAX_PAYLOAD` bytes; uno más grande se rechaza, nunca se trunca. Una
//! respuesta que no cabe llega al solicitante como `error`.

use std::fs;
use std::io::ErrorKind;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ipc_io, IpcError};

/// Tamaño máximo del cuerpo de un mensaje
pub const MAX_PAYLOAD: usize = 1023;

/// Buffer de recepción: cuerpo escapado en JSON + ruta de respuesta
pub const RECV_BUFFER: usize = 8192;

/// Tag que distingue al servicio de logging dentro del canal
pub const SERVICE_TAG: &str = "logger";

const CHANNEL_PREFIX: &str = "socket_server";

static REPLY_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Agregar una línea al archivo de log
    Record,
    /// Evento serializado que acaba de iniciar
    EventStart,
    /// Evento serializado que acaba de terminar
    EventEnd,
    /// Consultar un dato agregado de texto
    GetString,
    /// Consultar un dato agregado numérico
    GetNumber,
}

impl MessageKind {
    /// Los `GET_*` esperan respuesta
    pub fn expects_reply(self) -> bool {
        matches!(self, MessageKind::GetString | MessageKind::GetNumber)
    }
}

/// Motivo por el que el origen no pudo contestar una consulta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum ReplyError {
    PayloadTooLarge { len: usize, max: usize },
}

impl From<ReplyError> for IpcError {
    fn from(err: ReplyError) -> Self {
        match err {
            ReplyError::PayloadTooLarge { len, max } => IpcError::PayloadTooLarge { len, max },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<PathBuf>,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,
}

impl Message {
    pub fn new(kind: MessageKind, body: impl Into<String>) -> Self {
        Self {
            kind,
            reply_to: None,
            body: body.into(),
            error: None,
        }
    }

    /// Respuesta vacía que solo lleva el motivo del fallo
    pub fn failed(kind: MessageKind, error: ReplyError) -> Self {
        Self {
            error: Some(error),
            ..Self::new(kind, "")
        }
    }

    /// Codifica el mensaje, rechazando cuerpos demasiado grandes
    pub fn encode(&self) -> Result<Vec<u8>, IpcError> {
        if self.body.len() > MAX_PAYLOAD {
            return Err(IpcError::PayloadTooLarge {
                len: self.body.len(),
                max: MAX_PAYLOAD,
            });
        }
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IpcError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Identidad del canal conocido de un logger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    path: PathBuf,
}

impl Channel {
    /// Canal en el directorio temporal del sistema
    pub fn for_log_file(log_path: &Path) -> Self {
        Self::in_dir(&std::env::temp_dir(), log_path)
    }

    /// Canal en `dir`, derivado de `log_path` y `SERVICE_TAG`
    pub fn in_dir(dir: &Path, log_path: &Path) -> Self {
        let canonical = fs::canonicalize(log_path).unwrap_or_else(|_| log_path.to_path_buf());

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_os_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(SERVICE_TAG.as_bytes());
        let digest = hasher.finalize();

        let id: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
        Self {
            path: dir.join(format!("{}-{}.sock", CHANNEL_PREFIX, id)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Crea el socket del despachador, reemplazando uno viejo si existe
    pub fn bind(&self) -> Result<UnixDatagram, IpcError> {
        remove_stale(&self.path)?;
        UnixDatagram::bind(&self.path).map_err(|e| ipc_io(&self.path, e))
    }

    /// Envía un mensaje sin esperar respuesta
    pub fn send(&self, kind: MessageKind, body: &str) -> Result<(), IpcError> {
        let bytes = Message::new(kind, body).encode()?;
        let socket = UnixDatagram::unbound().map_err(|e| ipc_io(&self.path, e))?;
        socket
            .send_to(&bytes, &self.path)
            .map_err(|e| ipc_io(&self.path, e))?;
        Ok(())
    }

    /// Envía una consulta y bloquea hasta recibir la respuesta
    pub fn request(&self, kind: MessageKind, body: &str) -> Result<String, IpcError> {
        let endpoint = ReplyEndpoint::create(&self.path)?;

        let mut message = Message::new(kind, body);
        message.reply_to = Some(endpoint.path.clone());
        let bytes = message.encode()?;

        endpoint
            .socket
            .send_to(&bytes, &self.path)
            .map_err(|e| ipc_io(&self.path, e))?;

        let mut buf = vec![0u8; RECV_BUFFER];
        let reply = recv(&endpoint.socket, &mut buf)?;
        if reply.kind != kind {
            return Err(IpcError::Malformed(format!(
                "expected {:?} reply, got {:?}",
                kind, reply.kind
            )));
        }
        match reply.error {
            Some(err) => Err(err.into()),
            None => Ok(reply.body),
        }
    }
}

/// Recibe y decodifica un mensaje (bloqueante)
pub fn recv(socket: &UnixDatagram, buf: &mut [u8]) -> Result<Message, IpcError> {
    let n = socket
        .recv(buf)
        .map_err(|e| ipc_io(socket_path(socket), e))?;
    Message::decode(&buf[..n])
}

/// Contesta una consulta en el endpoint privado del solicitante
///
/// Si `body` no cabe en un mensaje, el solicitante recibe el error en su
/// lugar (nunca se queda esperando) y el fallo también se retorna aquí.
pub fn reply(reply_to: &Path, kind: MessageKind, body: &str) -> Result<(), IpcError> {
    if body.len() > MAX_PAYLOAD {
        let err = ReplyError::PayloadTooLarge {
            len: body.len(),
            max: MAX_PAYLOAD,
        };
        send_reply(reply_to, &Message::failed(kind, err))?;
        return Err(err.into());
    }
    send_reply(reply_to, &Message::new(kind, body))
}

fn send_reply(reply_to: &Path, message: &Message) -> Result<(), IpcError> {
    let bytes = message.encode()?;
    let socket = UnixDatagram::unbound().map_err(|e| ipc_io(reply_to, e))?;
    socket
        .send_to(&bytes, reply_to)
        .map_err(|e| ipc_io(reply_to, e))?;
    Ok(())
}

/// Endpoint de respuesta de un solo uso; se borra al soltarse
struct ReplyEndpoint {
    socket: UnixDatagram,
    path: PathBuf,
}

impl ReplyEndpoint {
    fn create(channel: &Path) -> Result<Self, IpcError> {
        let n = REPLY_COUNTER.fetch_add(1, Ordering::Relaxed);
        let stem = channel
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| CHANNEL_PREFIX.to_string());
        let path = channel.with_file_name(format!("{}-{}-{}.reply", stem, std::process::id(), n));

        remove_stale(&path)?;
        let socket = UnixDatagram::bind(&path).map_err(|e| ipc_io(&path, e))?;
        Ok(Self { socket, path })
    }
}

impl Drop for ReplyEndpoint {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn remove_stale(path: &Path) -> Result<(), IpcError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(ipc_io(path, err)),
    }
}

fn socket_path(socket: &UnixDatagram) -> PathBuf {
    socket
        .local_addr()
        .ok()
        .and_then(|addr| addr.as_pathname().map(Path::to_path_buf))
        .unwrap_or_default()
}
