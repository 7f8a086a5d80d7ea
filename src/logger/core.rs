//! # Logger Multi-Proceso
//! src/logger/core.rs
//!
//! El `Logger` guarda datos agregados (mapas texto→número y texto→texto),
//! el archivo de log y dos listas de listeners (inicio y fin de evento).
//!
//! Solo el **proceso origen** puede modificar los datos agregados. Cuando
//! el runner hace fork, los hijos ya no son el origen: sus eventos, sus
//! líneas de log y sus lecturas viajan por IPC hasta el origen.
//!
//! ## Modo multi-proceso
//!
//! `start_mp()` crea el canal, hace fork de un despachador que atiende
//! mensajes para siempre y lo registra como origen. Desde ese momento el
//! despachador es el dueño de los datos agregados y quien ejecuta los
//! listeners; el proceso que llamó (y todos sus hijos futuros) pasan por IPC.
//! Los listeners deben registrarse antes de llamar a `start_mp()`.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use nix::unistd::{fork, getpid, ForkResult};
use tracing::{debug, error, info, warn};

use crate::error::{IpcError, LoggerError};
use crate::logger::event::LogEvent;
use crate::logger::ipc::{self, Channel, Message, MessageKind, RECV_BUFFER};

/// Listener de eventos; recibe el logger para poder tocar los agregados
pub type Listener = Box<dyn Fn(&Logger, &LogEvent) + Send + Sync>;

pub struct Logger {
    origin_pid: AtomicI32,
    dispatcher_pid: AtomicI32,

    log_path: Option<PathBuf>,
    log_file: Option<Mutex<File>>,
    channel: Option<Channel>,

    start_listeners: RwLock<Vec<Listener>>,
    end_listeners: RwLock<Vec<Listener>>,

    num_data: Mutex<HashMap<String, f64>>,
    str_data: Mutex<HashMap<String, String>>,
}

impl Logger {
    /// Logger sin archivo; solo sirve en un único proceso
    pub fn new() -> Self {
        Self {
            origin_pid: AtomicI32::new(getpid().as_raw()),
            dispatcher_pid: AtomicI32::new(0),
            log_path: None,
            log_file: None,
            channel: None,
            start_listeners: RwLock::new(Vec::new()),
            end_listeners: RwLock::new(Vec::new()),
            num_data: Mutex::new(HashMap::new()),
            str_data: Mutex::new(HashMap::new()),
        }
    }

    /// Abre (o crea) `path` en modo append y deriva el canal IPC de él
    pub fn with_log_file(path: impl AsRef<Path>) -> Result<Self, LoggerError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o666)
            .open(&path)
            .map_err(|source| LoggerError::Open {
                path: path.clone(),
                source,
            })?;

        let channel = Channel::for_log_file(&path);
        Ok(Self {
            log_path: Some(path),
            log_file: Some(Mutex::new(file)),
            channel: Some(channel),
            ..Self::new()
        })
    }

    /// Ubica el canal IPC en `dir` en lugar del directorio temporal
    pub fn with_channel_dir(mut self, dir: impl AsRef<Path>) -> Self {
        if let Some(path) = &self.log_path {
            self.channel = Some(Channel::in_dir(dir.as_ref(), path));
        }
        self
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn channel_path(&self) -> Option<&Path> {
        self.channel.as_ref().map(Channel::path)
    }

    pub fn origin_pid(&self) -> i32 {
        self.origin_pid.load(Ordering::SeqCst)
    }

    /// Pid del despachador, si ya se entró en modo multi-proceso
    pub fn dispatcher_pid(&self) -> Option<i32> {
        match self.dispatcher_pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// ¿Este proceso es el dueño de los datos agregados?
    pub fn is_origin(&self) -> bool {
        getpid().as_raw() == self.origin_pid()
    }

    // ==================== Listeners ====================

    pub fn on_ev_start(&self, listener: Listener) {
        write_lock(&self.start_listeners).push(listener);
    }

    pub fn on_ev_end(&self, listener: Listener) {
        write_lock(&self.end_listeners).push(listener);
    }

    /// Crea un evento cuyas transiciones llegan a los listeners del logger
    ///
    /// En el origen se llama a los listeners directamente; en otro proceso
    /// el evento se serializa y se reenvía al origen.
    pub fn create_event(self: &Arc<Self>, name: impl Into<String>) -> LogEvent {
        let mut event = LogEvent::new(name);

        let logger = Arc::clone(self);
        event.on_start(Box::new(move |ev: &LogEvent| logger.event_started(ev)));

        let logger = Arc::clone(self);
        event.on_complete(Box::new(move |ev: &LogEvent| logger.event_ended(ev)));

        event
    }

    fn event_started(&self, event: &LogEvent) {
        if !self.is_origin() {
            self.forward(MessageKind::EventStart, &event.serialize());
            return;
        }
        self.notify(&self.start_listeners, event);
    }

    pub(crate) fn event_ended(&self, event: &LogEvent) {
        if !self.is_origin() {
            self.forward(MessageKind::EventEnd, &event.serialize());
            return;
        }
        self.notify(&self.end_listeners, event);
    }

    fn notify(&self, listeners: &RwLock<Vec<Listener>>, event: &LogEvent) {
        for listener in read_lock(listeners).iter() {
            listener(self, event);
        }
    }

    // Envío sin respuesta; un fallo se reporta pero no se propaga
    fn forward(&self, kind: MessageKind, body: &str) {
        if let Err(err) = self.send(kind, body) {
            warn!(?kind, error = %err, "failed to forward to logger origin");
        }
    }

    fn send(&self, kind: MessageKind, body: &str) -> Result<(), IpcError> {
        let channel = self.channel.as_ref().ok_or(IpcError::NoLogFile)?;
        channel.send(kind, body)
    }

    fn request(&self, kind: MessageKind, key: &str) -> Result<String, IpcError> {
        let channel = self.channel.as_ref().ok_or(IpcError::NoLogFile)?;
        if self.dispatcher_pid().is_none() {
            return Err(IpcError::NotStarted);
        }
        channel.request(kind, key)
    }

    // ==================== Datos agregados ====================

    /// Acceso exclusivo al mapa numérico. Solo desde el proceso origen.
    ///
    /// Llamarlo desde otro proceso es un error de programación y aborta.
    pub fn with_num_data<R>(&self, f: impl FnOnce(&mut HashMap<String, f64>) -> R) -> R {
        self.assert_origin("with_num_data");
        f(&mut lock(&self.num_data))
    }

    /// Acceso exclusivo al mapa de texto. Solo desde el proceso origen.
    pub fn with_str_data<R>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> R) -> R {
        self.assert_origin("with_str_data");
        f(&mut lock(&self.str_data))
    }

    fn assert_origin(&self, operation: &str) {
        if !self.is_origin() {
            error!(
                operation,
                pid = getpid().as_raw(),
                origin = self.origin_pid(),
                "aggregate data accessed outside the origin process"
            );
            process::abort();
        }
    }

    /// Lee un dato numérico (0 si no existe) desde cualquier proceso
    pub fn get_num_data(&self, key: &str) -> Result<f64, IpcError> {
        if self.is_origin() {
            return Ok(lock(&self.num_data).get(key).copied().unwrap_or(0.0));
        }

        let body = self.request(MessageKind::GetNumber, key)?;
        body.trim()
            .parse()
            .map_err(|_| IpcError::Malformed(format!("not a number: {:?}", body)))
    }

    /// Lee un dato de texto ("" si no existe) desde cualquier proceso
    pub fn get_str_data(&self, key: &str) -> Result<String, IpcError> {
        if self.is_origin() {
            return Ok(lock(&self.str_data).get(key).cloned().unwrap_or_default());
        }
        self.request(MessageKind::GetString, key)
    }

    // ==================== Log durable ====================

    /// Agrega una línea al archivo de log
    ///
    /// En el origen escribe directo bajo el lock del archivo (una sola
    /// escritura en modo append por línea). En otro proceso se reenvía.
    pub fn record(&self, line: &str) -> Result<(), LoggerError> {
        if !self.is_origin() {
            return Ok(self.send(MessageKind::Record, line)?);
        }

        let (Some(file), Some(path)) = (&self.log_file, &self.log_path) else {
            return Ok(());
        };

        let mut entry = String::with_capacity(line.len() + 1);
        entry.push_str(line);
        entry.push('\n');

        lock(file)
            .write_all(entry.as_bytes())
            .map_err(|source| LoggerError::Append {
                path: path.clone(),
                source,
            })
    }

    // ==================== Modo multi-proceso ====================

    /// Entra en modo multi-proceso
    ///
    /// Hace fork de un despachador que nunca retorna y lo registra como
    /// origen. Llamarlo de nuevo no hace nada.
    pub fn start_mp(&self) -> Result<(), IpcError> {
        if self.dispatcher_pid().is_some() {
            return Ok(());
        }
        let channel = self.channel.as_ref().ok_or(IpcError::NoLogFile)?;

        // El socket existe antes del fork: ningún mensaje llega sin dueño
        let socket = channel.bind()?;

        // SAFETY: el hijo entra al loop del despachador y nunca retorna.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                self.origin_pid.store(getpid().as_raw(), Ordering::SeqCst);
                self.dispatcher_pid
                    .store(getpid().as_raw(), Ordering::SeqCst);
                self.serve(socket)
            }
            Ok(ForkResult::Parent { child }) => {
                drop(socket);
                self.origin_pid.store(child.as_raw(), Ordering::SeqCst);
                self.dispatcher_pid.store(child.as_raw(), Ordering::SeqCst);
                info!(
                    dispatcher = child.as_raw(),
                    channel = %channel.path().display(),
                    "logger entered multi-process mode"
                );
                Ok(())
            }
            Err(errno) => {
                drop(socket);
                let _ = std::fs::remove_file(channel.path());
                Err(IpcError::Fork(errno))
            }
        }
    }

    // Un mensaje a la vez: el orden de llegada es el orden de proceso
    fn serve(&self, socket: UnixDatagram) -> ! {
        let mut buf = vec![0u8; RECV_BUFFER];
        loop {
            match ipc::recv(&socket, &mut buf) {
                Ok(message) => self.handle_message(message),
                Err(err) => warn!(error = %err, "logger dispatcher receive failed"),
            }
        }
    }

    fn handle_message(&self, message: Message) {
        debug!(kind = ?message.kind, "logger dispatcher message");

        match message.kind {
            MessageKind::Record => {
                if let Err(err) = self.record(&message.body) {
                    warn!(error = %err, "failed to record forwarded line");
                }
            }
            MessageKind::EventStart | MessageKind::EventEnd => {
                let event = match LogEvent::deserialize(&message.body) {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(error = %err, "dropping malformed forwarded event");
                        return;
                    }
                };
                if message.kind == MessageKind::EventStart {
                    self.notify(&self.start_listeners, &event);
                } else {
                    self.notify(&self.end_listeners, &event);
                }
            }
            MessageKind::GetString | MessageKind::GetNumber => {
                let Some(reply_to) = &message.reply_to else {
                    warn!(kind = ?message.kind, "query without reply endpoint");
                    return;
                };
                let value = if message.kind == MessageKind::GetString {
                    lock(&self.str_data)
                        .get(&message.body)
                        .cloned()
                        .unwrap_or_default()
                } else {
                    lock(&self.num_data)
                        .get(&message.body)
                        .copied()
                        .unwrap_or(0.0)
                        .to_string()
                };
                if let Err(err) = ipc::reply(reply_to, message.kind, &value) {
                    warn!(error = %err, "failed to answer logger query");
                }
            }
        }
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger")
            .field("origin_pid", &self.origin_pid)
            .field("dispatcher_pid", &self.dispatcher_pid)
            .field("log_path", &self.log_path)
            .finish_non_exhaustive()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_lock<T>(rw: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    rw.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(rw: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    rw.write().unwrap_or_else(PoisonError::into_inner)
}
