//! # Logger de Eventos
//! src/logger/mod.rs
//!
//! - `event`: eventos con ciclo de vida y su formato de texto
//! - `core`: el `Logger` (datos agregados, archivo de log, listeners)
//! - `ipc`: canal entre procesos hijos y el proceso origen
//! - `stats`: estadísticas de servicio sobre los datos agregados

pub mod core;
pub mod event;
pub mod ipc;
pub mod stats;

// Re-exportar para facilitar el uso
pub use self::core::{Listener, Logger};
pub use event::LogEvent;
pub use stats::{ServiceStats, StatsSnapshot};
