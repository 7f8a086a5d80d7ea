//! # Eventos de Log
//! src/logger/event.rs
//!
//! Un `LogEvent` es un registro con nombre, datos clave/valor (texto y
//! numéricos) y un ciclo de vida:
//!
//! - **vivo**: se crea en el proceso, `start()` y luego `end()`. Cada
//!   transición dispara sus hooks una sola vez.
//! - **deserializado**: se reconstruye desde un registro de texto; sus
//!   tiempos vienen de los campos grabados y ya no cambia de estado.
//!
//! ## Formato serializado
//!
//! ```text
//! <nombre>
//! EVT_START=<segundos unix>
//! EVT_END=<segundos unix>
//! EVT_DUR=<milisegundos>
//! EVT_STR="<forma de texto>"
//! <clave>="<valor texto>"
//! <clave>=<valor numérico>
//! ```
//!
//! Las líneas que no se reconocen se ignoran al parsear. `\` y los saltos
//! de línea dentro de textos se escapan para que cada par ocupe una línea.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;

use crate::error::EventParseError;

pub const EVT_START: &str = "EVT_START";
pub const EVT_END: &str = "EVT_END";
pub const EVT_DUR: &str = "EVT_DUR";
pub const EVT_STR: &str = "EVT_STR";

/// Nombre por defecto de un evento
pub const GENERIC_EVENT: &str = "GENERIC_EVENT";

static STR_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(\S+)\s*=\s*"(.*)"\s*$"#).expect("valid string pair regex")
});

static NUM_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S+)\s*=\s*([+-]?(?:[0-9]*[.])?[0-9]+)\s*$").expect("valid number pair regex")
});

/// Hook que se dispara en una transición del evento
pub type EventHook = Box<dyn Fn(&LogEvent) + Send + Sync>;

/// Campos grabados de un evento deserializado
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recorded {
    pub start_secs: i64,
    pub end_secs: i64,
    pub duration_ms: i64,
    pub summary: String,
}

#[derive(Default)]
struct LiveState {
    started: Option<SystemTime>,
    ended: Option<SystemTime>,
    on_start: Vec<EventHook>,
    on_complete: Vec<EventHook>,
}

enum Lifecycle {
    Live(LiveState),
    Deserialized(Recorded),
}

pub struct LogEvent {
    name: String,
    pub str_data: BTreeMap<String, String>,
    pub num_data: BTreeMap<String, f64>,
    lifecycle: Lifecycle,
}

impl LogEvent {
    /// Crea un evento vivo, aún sin iniciar
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            str_data: BTreeMap::new(),
            num_data: BTreeMap::new(),
            lifecycle: Lifecycle::Live(LiveState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Agrega un valor de texto (estilo builder)
    pub fn with_str(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.str_data.insert(key.into(), value.into());
        self
    }

    /// Agrega un valor numérico (estilo builder)
    pub fn with_num(mut self, key: impl Into<String>, value: f64) -> Self {
        self.num_data.insert(key.into(), value);
        self
    }

    /// Registra un hook para `start()`; se ignora en eventos deserializados
    pub fn on_start(&mut self, hook: EventHook) {
        if let Lifecycle::Live(live) = &mut self.lifecycle {
            live.on_start.push(hook);
        }
    }

    /// Registra un hook para `end()`; se ignora en eventos deserializados
    pub fn on_complete(&mut self, hook: EventHook) {
        if let Lifecycle::Live(live) = &mut self.lifecycle {
            live.on_complete.push(hook);
        }
    }

    /// Marca el inicio. Solo la primera llamada tiene efecto.
    pub fn start(&mut self) {
        let Lifecycle::Live(live) = &mut self.lifecycle else {
            return;
        };
        if live.started.is_some() || live.ended.is_some() {
            return;
        }
        live.started = Some(SystemTime::now());
        self.fire(|live| &live.on_start);
    }

    /// Marca el fin. Solo la primera llamada tiene efecto.
    ///
    /// Un evento que nunca se inició se considera iniciado ahora.
    pub fn end(&mut self) {
        let Lifecycle::Live(live) = &mut self.lifecycle else {
            return;
        };
        if live.ended.is_some() {
            return;
        }
        let now = SystemTime::now();
        live.started.get_or_insert(now);
        live.ended = Some(now);
        self.fire(|live| &live.on_complete);
    }

    fn fire(&self, hooks: impl Fn(&LiveState) -> &Vec<EventHook>) {
        if let Lifecycle::Live(live) = &self.lifecycle {
            for hook in hooks(live) {
                hook(self);
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        match &self.lifecycle {
            Lifecycle::Live(live) => live.ended.is_some(),
            Lifecycle::Deserialized(_) => true,
        }
    }

    pub fn is_deserialized(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Deserialized(_))
    }

    /// Campos grabados, solo para eventos deserializados
    pub fn recorded(&self) -> Option<&Recorded> {
        match &self.lifecycle {
            Lifecycle::Deserialized(recorded) => Some(recorded),
            Lifecycle::Live(_) => None,
        }
    }

    pub fn start_time(&self) -> Option<SystemTime> {
        match &self.lifecycle {
            Lifecycle::Live(live) => live.started,
            Lifecycle::Deserialized(rec) => Some(from_unix_secs(rec.start_secs)),
        }
    }

    pub fn end_time(&self) -> Option<SystemTime> {
        match &self.lifecycle {
            Lifecycle::Live(live) => live.ended,
            Lifecycle::Deserialized(rec) => Some(from_unix_secs(rec.end_secs)),
        }
    }

    /// Duración en milisegundos
    ///
    /// Vivo: 0 antes de iniciar, lo transcurrido mientras corre y
    /// `fin - inicio` al terminar. Deserializado: el `EVT_DUR` grabado.
    pub fn duration_ms(&self) -> i64 {
        match &self.lifecycle {
            Lifecycle::Deserialized(rec) => rec.duration_ms,
            Lifecycle::Live(live) => {
                let Some(started) = live.started else {
                    return 0;
                };
                let until = live.ended.unwrap_or_else(SystemTime::now);
                until
                    .duration_since(started)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0)
            }
        }
    }

    /// Convierte el evento en un registro de texto plano
    pub fn serialize(&self) -> String {
        let (start_secs, end_secs) = match &self.lifecycle {
            Lifecycle::Deserialized(rec) => (rec.start_secs, rec.end_secs),
            Lifecycle::Live(live) => (
                live.started.map(unix_secs).unwrap_or(0),
                live.ended.map(unix_secs).unwrap_or(0),
            ),
        };

        let mut out = String::new();
        out.push_str(&escape(&self.name));
        out.push('\n');
        out.push_str(&format!("{}={}\n", EVT_START, start_secs));
        out.push_str(&format!("{}={}\n", EVT_END, end_secs));
        out.push_str(&format!("{}={}\n", EVT_DUR, self.duration_ms()));
        out.push_str(&format!("{}=\"{}\"\n", EVT_STR, escape(&self.to_string())));

        for (key, value) in self.str_data.iter().filter(|(k, _)| !is_reserved(k)) {
            out.push_str(&format!("{}=\"{}\"\n", key, escape(value)));
        }
        // `inf` y `NaN` no tienen forma numérica en el registro: se omiten
        for (key, value) in self
            .num_data
            .iter()
            .filter(|(k, v)| !is_reserved(k) && v.is_finite())
        {
            out.push_str(&format!("{}={}\n", key, value));
        }
        out
    }

    /// Reconstruye un evento desde su registro serializado
    ///
    /// Falla solo si falta la primera línea (el nombre).
    pub fn deserialize(record: &str) -> Result<Self, EventParseError> {
        let mut lines = record.lines();
        let name = match lines.next() {
            Some(line) if !line.trim().is_empty() => unescape(line),
            _ => return Err(EventParseError::Empty),
        };

        let mut str_data = BTreeMap::new();
        let mut num_data = BTreeMap::new();
        let mut recorded = Recorded::default();

        for line in lines {
            if let Some(caps) = STR_PAIR.captures(line) {
                let value = unescape(&caps[2]);
                match &caps[1] {
                    EVT_STR => recorded.summary = value,
                    key => {
                        str_data.insert(key.to_string(), value);
                    }
                }
            } else if let Some(caps) = NUM_PAIR.captures(line) {
                let Ok(value) = caps[2].parse::<f64>() else {
                    continue;
                };
                match &caps[1] {
                    EVT_START => recorded.start_secs = value as i64,
                    EVT_END => recorded.end_secs = value as i64,
                    EVT_DUR => recorded.duration_ms = value as i64,
                    key => {
                        num_data.insert(key.to_string(), value);
                    }
                }
            }
        }

        Ok(Self {
            name,
            str_data,
            num_data,
            lifecycle: Lifecycle::Deserialized(recorded),
        })
    }
}

impl FromStr for LogEvent {
    type Err = EventParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::deserialize(s)
    }
}

impl Default for LogEvent {
    fn default() -> Self {
        Self::new(GENERIC_EVENT)
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lifecycle {
            Lifecycle::Deserialized(rec) => f.write_str(&rec.summary),
            Lifecycle::Live(_) => f.write_str(&self.name),
        }
    }
}

impl fmt::Debug for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEvent")
            .field("name", &self.name)
            .field("str_data", &self.str_data)
            .field("num_data", &self.num_data)
            .field("complete", &self.is_complete())
            .field("deserialized", &self.is_deserialized())
            .finish()
    }
}

fn is_reserved(key: &str) -> bool {
    matches!(key, EVT_START | EVT_END | EVT_DUR | EVT_STR)
}

fn unix_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn from_unix_secs(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
