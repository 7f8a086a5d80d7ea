//! # Pool Fijo de Workers
//! src/runner/pool.rs
//!
//! Al construirse lanza `W` workers de larga vida. Cada worker repite:
//! sacar una tarea de la cola compartida, ejecutarla, volver a esperar.
//! `dispatch` solo encola, y bloquea si la cola está llena (backpressure).

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tracing::{debug, warn};

use crate::error::RunnerError;
use crate::runner::queue::BoundedQueue;
use crate::runner::Task;

pub struct PoolRunner {
    queue: BoundedQueue<Task>,
    workers: usize,
}

impl PoolRunner {
    /// Crea el pool e inicia los workers
    pub fn new(workers: usize, queue_capacity: usize) -> Result<Self, RunnerError> {
        if workers == 0 {
            return Err(RunnerError::NoWorkers);
        }

        let pool = Self {
            queue: BoundedQueue::new(queue_capacity),
            workers,
        };

        pool.spawn_workers();
        Ok(pool)
    }

    fn spawn_workers(&self) {
        for i in 0..self.workers {
            let queue = self.queue.clone();
            let name = format!("pool-{}", i);

            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn(move || Self::worker_loop(name, queue));

            if let Err(err) = spawned {
                warn!(worker = i, error = %err, "no se pudo iniciar worker");
            }
        }
    }

    /// Loop principal del worker
    fn worker_loop(name: String, queue: BoundedQueue<Task>) {
        debug!(worker = %name, "worker started");

        loop {
            let task = queue.pop();

            // Un pánico en la tarea no mata al worker
            if panic::catch_unwind(AssertUnwindSafe(|| task.run())).is_err() {
                warn!(worker = %name, "task panicked, worker continues");
            }
        }
    }

    /// Encola la tarea; bloquea mientras la cola esté llena
    pub fn dispatch(&self, task: Task) {
        self.queue.push(task);
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Tareas esperando a un worker
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }
}

impl fmt::Debug for PoolRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRunner")
            .field("workers", &self.workers)
            .field("queue_capacity", &self.queue.capacity())
            .field("pending", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::sync::{Arc, Barrier, Mutex};
    use std::time::Duration;

    #[test]
    fn test_worker_survives_panic() {
        let pool = PoolRunner::new(1, 4).unwrap();
        pool.dispatch(Task::new(|| panic!("tarea rota")));

        let (tx, rx) = mpsc::channel();
        pool.dispatch(Task::new(move || tx.send("ok").unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "ok");
    }

    #[test]
    fn test_uses_all_workers() {
        const WORKERS: usize = 4;
        let pool = PoolRunner::new(WORKERS, WORKERS).unwrap();
        let barrier = Arc::new(Barrier::new(WORKERS));
        let names = Arc::new(Mutex::new(HashSet::new()));
        let (tx, rx) = mpsc::channel();

        // Cada tarea espera a las demás: solo termina si corren en paralelo
        for _ in 0..WORKERS {
            let barrier = Arc::clone(&barrier);
            let names = Arc::clone(&names);
            let tx = tx.clone();
            pool.dispatch(Task::new(move || {
                barrier.wait();
                let name = thread::current().name().unwrap_or("?").to_string();
                names.lock().unwrap().insert(name);
                tx.send(()).unwrap();
            }));
        }

        for _ in 0..WORKERS {
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(names.lock().unwrap().len(), WORKERS);
    }

    #[test]
    fn test_dispatch_applies_backpressure() {
        let pool = PoolRunner::new(1, 1).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));

        // Ocupa al único worker
        {
            let release_rx = Arc::clone(&release_rx);
            pool.dispatch(Task::new(move || {
                release_rx.lock().unwrap().recv().unwrap();
            }));
        }
        thread::sleep(Duration::from_millis(50));

        // Llena la cola
        pool.dispatch(Task::new(|| {}));
        assert_eq!(pool.pending(), 1);

        let pool = Arc::new(pool);
        let producer = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.dispatch(Task::new(|| {})))
        };
        thread::sleep(Duration::from_millis(100));
        assert!(!producer.is_finished(), "dispatch should block on a full queue");

        release_tx.send(()).unwrap();
        producer.join().unwrap();
    }

    #[test]
    fn test_debug_output() {
        let pool = PoolRunner::new(2, 8).unwrap();
        let text = format!("{:?}", pool);
        assert!(text.contains("workers: 2"));
        assert!(text.contains("queue_capacity: 8"));
        assert_eq!(pool.workers(), 2);
        assert_eq!(pool.queue_capacity(), 8);
    }
}
