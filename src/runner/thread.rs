//! # Runner Thread-por-Tarea
//! src/runner/thread.rs
//!
//! Cada tarea corre en su propio thread, que se suelta (no se hace join).
//! Un pánico dentro de la tarea solo termina ese thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::warn;

use crate::runner::Task;

#[derive(Debug, Default)]
pub struct ThreadRunner {
    /// Contador para nombrar los threads
    spawned: AtomicU64,
}

impl ThreadRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lanza un thread para la tarea y retorna inmediatamente
    ///
    /// Si el sistema no puede crear el thread, la tarea se ejecuta en el
    /// thread actual para no perderla.
    pub fn dispatch(&self, task: Task) {
        let id = self.spawned.fetch_add(1, Ordering::Relaxed);

        // `spawn` consume el closure incluso si falla, así que la tarea
        // viaja en un slot compartido del que se puede recuperar.
        let slot = Arc::new(Mutex::new(Some(task)));
        let worker_slot = Arc::clone(&slot);

        let spawned = thread::Builder::new()
            .name(format!("task-{id}"))
            .spawn(move || {
                let task = worker_slot
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(task) = task {
                    task.run();
                }
            });

        if let Err(err) = spawned {
            warn!(error = %err, "no se pudo crear thread, ejecutando tarea inline");
            let task = slot
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(task) = task {
                task.run();
            }
        }
    }

    /// Número de tareas despachadas hasta ahora
    pub fn dispatched(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_returns_without_waiting() {
        let runner = ThreadRunner::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();

        runner.dispatch(Task::new(move || {
            release_rx.recv().unwrap();
            done_tx.send(()).unwrap();
        }));

        // dispatch ya retornó aunque la tarea sigue bloqueada
        assert!(done_rx.try_recv().is_err());
        release_tx.send(()).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(runner.dispatched(), 1);
    }

    #[test]
    fn test_panic_is_confined_to_thread() {
        let runner = ThreadRunner::new();
        runner.dispatch(Task::new(|| panic!("fallo aislado")));

        let (tx, rx) = mpsc::channel();
        runner.dispatch(Task::new(move || tx.send(42).unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }
}
