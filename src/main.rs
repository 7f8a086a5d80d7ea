//! # Socket Server - Entry Point
//! src/main.rs
//!
//! Servidor de eco sobre TCP. Cada conexión:
//!
//! 1. Abre un evento `CONN_EV` con el peer.
//! 2. Lee lo que envía el cliente. Si es `STATS` contesta con las
//!    estadísticas agregadas; si no, devuelve los mismos bytes.
//! 3. Graba una línea en el archivo de log y cierra el evento.
//!
//! En modo `fork` el logger entra en modo multi-proceso antes de aceptar
//! conexiones, así los hijos reportan sus eventos al proceso origen.

use std::process;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use socket_server::config::{ConcurrencyMode, Config};
use socket_server::logger::{Logger, ServiceStats};
use socket_server::server::Server;
use socket_server::transport::{Connection, TcpAcceptor};

/// Nombre del evento que se emite por conexión
const CONN_EVENT: &str = "CONN_EV";

/// Comando que devuelve las estadísticas en lugar del eco
const STATS_COMMAND: &str = "STATS";

fn main() {
    let config = Config::new();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        process::exit(2);
    }
    config.print_summary();

    let logger = match Logger::with_log_file(&config.log_file) {
        Ok(logger) => Arc::new(logger),
        Err(e) => {
            error!(error = %e, "unable to open log file");
            process::exit(1);
        }
    };

    // Los listeners se registran antes de start_mp: el despachador los hereda
    ServiceStats::install(&logger, CONN_EVENT, "peer");

    if config.mode == ConcurrencyMode::Fork {
        if let Err(e) = logger.start_mp() {
            error!(error = %e, "unable to start multi-process logger");
            process::exit(1);
        }
    }

    let runner = match config.runner() {
        Ok(runner) => runner,
        Err(e) => {
            error!(error = %e, "unable to build runner");
            process::exit(1);
        }
    };

    let acceptor = match TcpAcceptor::bind(&config.host, config.port) {
        Ok(acceptor) => acceptor,
        Err(e) => {
            error!(error = %e, "unable to bind");
            process::exit(1);
        }
    };

    info!(
        address = %config.address(),
        runner = runner.name(),
        log_file = %config.log_file,
        "echo server listening"
    );

    let server = Server::new(acceptor, runner);
    // run solo retorna con un error
    let Err(e) = server.run(move |mut conn| handle_connection(&logger, &mut conn));
    error!(error = %e, "server stopped");
    process::exit(1);
}

fn handle_connection<C: Connection>(logger: &Arc<Logger>, conn: &mut C) {
    let peer = conn.peer_addr().to_string();
    let mut event = logger.create_event(CONN_EVENT).with_str("peer", peer.clone());
    event.start();

    let data = match conn.read_all() {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "read failed");
            event.end();
            return;
        }
    };

    let is_stats = String::from_utf8_lossy(&data).trim() == STATS_COMMAND;
    let written = if is_stats {
        match ServiceStats::snapshot(logger) {
            Ok(snapshot) => conn.write_str(&format!("{}\n", snapshot)),
            Err(e) => {
                warn!(error = %e, "stats unavailable");
                conn.write_str("stats unavailable\n")
            }
        }
    } else {
        conn.write(&data)
    };

    if let Err(e) = written {
        warn!(error = %e, "write failed");
    }

    let line = format!(
        "{} {} bytes{}",
        peer,
        data.len(),
        if is_stats { " (stats)" } else { "" }
    );
    if let Err(e) = logger.record(&line) {
        warn!(error = %e, "unable to record connection");
    }

    event.end();
}
