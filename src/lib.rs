//! # Socket Server
//! src/lib.rs
//!
//! Framework de servidor de sockets para demostrar conceptos de sistemas
//! operativos: concurrencia con threads y procesos, sincronización con
//! colas acotadas y comunicación entre procesos.
//!
//! ## Arquitectura
//!
//! - `transport`: forma mínima de un transporte (`Acceptor`/`Connection`), TCP y Unix
//! - `runner`: las cuatro estrategias de ejecución y la cola acotada
//! - `server`: loop de aceptación que despacha cada conexión en un runner
//! - `logger`: eventos, log durable y datos agregados entre procesos
//! - `config`: configuración por CLI y variables de entorno
//! - `error`: tipos de error por capa
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use socket_server::runner::Runner;
//! use socket_server::server::Server;
//! use socket_server::transport::{Connection, TcpAcceptor};
//!
//! let acceptor = TcpAcceptor::bind("127.0.0.1", 4858).unwrap();
//! let server = Server::new(acceptor, Runner::per_thread());
//! server
//!     .run(|mut conn| {
//!         if let Ok(data) = conn.read_all() {
//!             let _ = conn.write(&data);
//!         }
//!     })
//!     .unwrap();
//! ```

pub mod config;
pub mod error;
pub mod logger;
pub mod runner;
pub mod server;
pub mod transport;
