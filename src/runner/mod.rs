//! # Estrategias de Ejecución
//! src/runner/mod.rs
//!
//! Un `Runner` recibe una `Task` (un closure sin parámetros que ya es dueño
//! de su conexión) y garantiza que eventualmente se ejecute. Las cuatro
//! variantes comparten el mismo contrato `dispatch`:
//!
//! | Variante  | Ejecución                                  |
//! |-----------|--------------------------------------------|
//! | `Inline`  | En el thread que llama, antes de retornar  |
//! | `Thread`  | Un thread nuevo por tarea (detached)       |
//! | `Pool`    | `W` workers fijos detrás de una cola acotada |
//! | `Fork`    | Un proceso hijo por tarea                  |
//!
//! El loop del servidor no sabe cuál se usa; cambiar de estrategia es
//! solo configuración.

pub mod fork;
pub mod inline;
pub mod pool;
pub mod queue;
pub mod thread;

pub use fork::ForkRunner;
pub use inline::InlineRunner;
pub use pool::PoolRunner;
pub use queue::BoundedQueue;
pub use thread::ThreadRunner;

use std::fmt;

use crate::error::RunnerError;

/// Unidad de trabajo diferida
///
/// Una vez entregada a un runner, la tarea es dueña de todo lo que captura
/// (típicamente una conexión y el handler).
pub struct Task(Box<dyn FnOnce() + Send + 'static>);

impl Task {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// Ejecuta la tarea consumiéndola
    pub fn run(self) {
        (self.0)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Task")
    }
}

/// Estrategia de concurrencia de una instancia de servidor
#[derive(Debug)]
pub enum Runner {
    Inline(InlineRunner),
    Thread(ThreadRunner),
    Pool(PoolRunner),
    Fork(ForkRunner),
}

impl Runner {
    pub fn inline() -> Self {
        Runner::Inline(InlineRunner)
    }

    pub fn per_thread() -> Self {
        Runner::Thread(ThreadRunner::new())
    }

    /// Pool de `workers` threads con una cola de `queue_capacity` tareas
    pub fn pool(workers: usize, queue_capacity: usize) -> Result<Self, RunnerError> {
        PoolRunner::new(workers, queue_capacity).map(Runner::Pool)
    }

    /// Un proceso por tarea; instala el reaper de SIGCHLD la primera vez
    pub fn fork() -> Result<Self, RunnerError> {
        ForkRunner::new().map(Runner::Fork)
    }

    /// Entrega una tarea al runner
    ///
    /// Solo `Inline` espera a que la tarea termine.
    pub fn dispatch(&self, task: Task) {
        match self {
            Runner::Inline(r) => r.dispatch(task),
            Runner::Thread(r) => r.dispatch(task),
            Runner::Pool(r) => r.dispatch(task),
            Runner::Fork(r) => r.dispatch(task),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Runner::Inline(_) => "inline",
            Runner::Thread(_) => "thread-per-task",
            Runner::Pool(_) => "worker-pool",
            Runner::Fork(_) => "fork-per-task",
        }
    }
}
