//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración del servidor de eco con soporte para argumentos CLI y
//! variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./socket_server --port 4858 --mode pool --workers 8 --queue-capacity 32
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! SERVER_MODE=fork SERVER_LOG_FILE=/var/log/echo.log ./socket_server
//! ```

use std::thread;

use clap::{Parser, ValueEnum};

use crate::error::RunnerError;
use crate::runner::Runner;

/// Estrategia de concurrencia seleccionable desde la CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConcurrencyMode {
    /// Una conexión a la vez, en el thread principal
    Single,
    /// Un thread nuevo por conexión
    Thread,
    /// Pool fijo de workers con cola acotada
    Pool,
    /// Un proceso hijo por conexión
    Fork,
}

/// Configuración del servidor
#[derive(Debug, Clone, Parser)]
#[command(name = "socket_server")]
#[command(about = "Servidor de eco con estrategias de concurrencia intercambiables")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Host/IP en el que escucha
    #[arg(long, default_value = "127.0.0.1", env = "SERVER_HOST")]
    pub host: String,

    /// Puerto en el que escucha el servidor
    #[arg(short, long, default_value = "4858", env = "SERVER_PORT")]
    pub port: u16,

    // === Concurrencia ===

    /// Estrategia de concurrencia
    #[arg(short, long, value_enum, default_value = "single", env = "SERVER_MODE")]
    pub mode: ConcurrencyMode,

    /// Número de workers del pool
    #[arg(short, long, default_value_t = default_workers(), env = "SERVER_WORKERS")]
    pub workers: usize,

    /// Capacidad de la cola del pool (por defecto igual a `workers`)
    #[arg(long = "queue-capacity", env = "SERVER_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    // === Logging ===

    /// Archivo de log durable
    #[arg(long = "log-file", default_value = "server.log", env = "SERVER_LOG_FILE")]
    pub log_file: String,

    /// Filtro de logs de diagnóstico
    #[arg(long = "log-level", default_value = "info", env = "RUST_LOG")]
    pub log_level: String,
}

fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección completa para bind (host:port)
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.workers)
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port must be > 0".to_string());
        }
        if self.workers == 0 {
            return Err("Workers must be >= 1".to_string());
        }
        if self.queue_capacity() == 0 {
            return Err("Queue capacity must be >= 1".to_string());
        }
        // El canal IPC se deriva del archivo de log
        if self.mode == ConcurrencyMode::Fork && self.log_file.trim().is_empty() {
            return Err("Fork mode needs a log file".to_string());
        }
        Ok(())
    }

    /// Construye el runner configurado
    pub fn runner(&self) -> Result<Runner, RunnerError> {
        match self.mode {
            ConcurrencyMode::Single => Ok(Runner::inline()),
            ConcurrencyMode::Thread => Ok(Runner::per_thread()),
            ConcurrencyMode::Pool => Runner::pool(self.workers, self.queue_capacity()),
            ConcurrencyMode::Fork => Runner::fork(),
        }
    }

    /// Imprime un resumen de la configuración
    pub fn print_summary(&self) {
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║              Socket Echo Server Configuration                ║");
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!();
        println!("🌐 Network:");
        println!("   Address:      {}", self.address());
        println!();
        println!("👷 Concurrency:");
        println!("   Mode:         {:?}", self.mode);
        if self.mode == ConcurrencyMode::Pool {
            println!("   Workers:      {}", self.workers);
            println!("   Queue Cap:    {}", self.queue_capacity());
        }
        println!();
        println!("📝 Logging:");
        println!("   Log file:     {}", self.log_file);
        println!("   Level:        {}", self.log_level);
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4858,
            mode: ConcurrencyMode::Single,
            workers: 4,
            queue_capacity: None,
            log_file: "server.log".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 4858);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.mode, ConcurrencyMode::Single);
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn test_address() {
        let config = Config::default();
        assert_eq!(config.address(), "127.0.0.1:4858");
    }

    #[test]
    fn test_validate_success() {
        assert!(Config::default().validate().is_ok());
    }

    // ==================== Validación ====================

    #[test]
    fn test_validate_invalid_port() {
        let mut config = Config::default();
        config.port = 0;
        assert!(config.validate().unwrap_err().contains("Port"));
    }

    #[test]
    fn test_validate_invalid_workers() {
        let mut config = Config::default();
        config.workers = 0;
        assert!(config.validate().unwrap_err().contains("Workers"));
    }

    #[test]
    fn test_validate_invalid_queue_capacity() {
        let mut config = Config::default();
        config.queue_capacity = Some(0);
        assert!(config.validate().unwrap_err().contains("Queue capacity"));
    }

    #[test]
    fn test_validate_fork_needs_log_file() {
        let mut config = Config::default();
        config.mode = ConcurrencyMode::Fork;
        config.log_file = "  ".to_string();
        assert!(config.validate().unwrap_err().contains("log file"));

        // En otros modos el archivo vacío no importa
        config.mode = ConcurrencyMode::Thread;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_queue_capacity_defaults_to_workers() {
        let mut config = Config::default();
        config.workers = 6;
        assert_eq!(config.queue_capacity(), 6);
        config.queue_capacity = Some(32);
        assert_eq!(config.queue_capacity(), 32);
    }

    // ==================== CLI ====================

    #[test]
    fn test_parse_cli() {
        let config = Config::try_parse_from([
            "socket_server",
            "--port",
            "9000",
            "--mode",
            "pool",
            "--workers",
            "8",
            "--queue-capacity",
            "16",
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.mode, ConcurrencyMode::Pool);
        assert_eq!(config.workers, 8);
        assert_eq!(config.queue_capacity(), 16);
    }

    #[test]
    fn test_parse_rejects_unknown_mode() {
        assert!(Config::try_parse_from(["socket_server", "--mode", "async"]).is_err());
    }

    // ==================== Runner ====================

    #[test]
    fn test_runner_per_mode() {
        let mut config = Config::default();
        assert_eq!(config.runner().unwrap().name(), "inline");

        config.mode = ConcurrencyMode::Thread;
        assert_eq!(config.runner().unwrap().name(), "thread-per-task");

        config.mode = ConcurrencyMode::Pool;
        config.workers = 2;
        assert_eq!(config.runner().unwrap().name(), "worker-pool");
    }

    #[test]
    fn test_config_print_summary() {
        let mut config = Config::default();
        config.mode = ConcurrencyMode::Pool;
        // Should not panic
        config.print_summary();
    }
}
