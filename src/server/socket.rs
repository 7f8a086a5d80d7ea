//! # Servidor de Sockets
//! src/server/socket.rs
//!
//! El servidor es dueño de un `Acceptor` y de un `Runner`. `run` nunca
//! termina por sí solo: la única salida normal es que el proceso reciba
//! una señal. Un error de `accept_conn` sí termina el loop y se propaga;
//! reiniciar es responsabilidad de quien llama.

use std::convert::Infallible;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::ServerError;
use crate::runner::{Runner, Task};
use crate::transport::{Acceptor, Connection};

pub struct Server<A> {
    acceptor: A,
    runner: Runner,
}

impl<A: Acceptor> Server<A> {
    pub fn new(acceptor: A, runner: Runner) -> Self {
        Self { acceptor, runner }
    }

    pub fn acceptor(&self) -> &A {
        &self.acceptor
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Acepta y despacha conexiones para siempre
    ///
    /// El loop nunca espera a que una tarea termine antes de aceptar la
    /// siguiente conexión (salvo con el runner inline).
    pub fn run<H>(&self, handler: H) -> Result<Infallible, ServerError>
    where
        H: Fn(A::Conn) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        info!(runner = self.runner.name(), "server accepting connections");

        loop {
            let conn = self.acceptor.accept_conn()?;
            debug!(peer = conn.peer_addr(), "accepted connection");

            let handler = Arc::clone(&handler);
            self.runner.dispatch(Task::new(move || handler(conn)));
        }
    }
}
