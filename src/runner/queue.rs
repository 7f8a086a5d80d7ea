//! # Cola Bloqueante Acotada
//! src/runner/queue.rs
//!
//! Cola FIFO thread-safe de capacidad fija. `push` bloquea mientras la
//! cola está llena y `pop` bloquea mientras está vacía; nunca falla.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Estado compartido entre todos los clones de la cola
struct Shared<T> {
    items: Mutex<VecDeque<T>>,

    /// Se notifica cuando se libera un espacio
    not_full: Condvar,

    /// Se notifica cuando llega un elemento
    not_empty: Condvar,
}

/// Cola acotada con backpressure para productores y consumidores
pub struct BoundedQueue<T> {
    shared: Arc<Shared<T>>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Crea una cola con capacidad máxima `capacity` (mínimo 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                items: Mutex::new(VecDeque::with_capacity(capacity)),
                not_full: Condvar::new(),
                not_empty: Condvar::new(),
            }),
            capacity,
        }
    }

    // Una tarea que entra en pánico no debe dejar la cola inutilizable
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.shared
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Encola un elemento
    ///
    /// Bloquea hasta que haya espacio, luego despierta a un consumidor.
    pub fn push(&self, item: T) {
        let mut items = self.lock();
        while items.len() >= self.capacity {
            items = self
                .shared
                .not_full
                .wait(items)
                .unwrap_or_else(PoisonError::into_inner);
        }
        items.push_back(item);
        drop(items);
        self.shared.not_empty.notify_one();
    }

    /// Desencola el elemento más antiguo
    ///
    /// Bloquea hasta que haya un elemento, luego despierta a un productor.
    pub fn pop(&self) -> T {
        let mut items = self.lock();
        let item = loop {
            if let Some(item) = items.pop_front() {
                break item;
            }
            items = self
                .shared
                .not_empty
                .wait(items)
                .unwrap_or_else(PoisonError::into_inner);
        };
        drop(items);
        self.shared.not_full.notify_one();
        item
    }

    /// Intenta desencolar sin bloquear
    pub fn try_pop(&self) -> Option<T> {
        let item = self.lock().pop_front();
        if item.is_some() {
            self.shared.not_full.notify_one();
        }
        item
    }

    /// Retorna el tamaño actual de la cola
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Verifica si la cola está vacía
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Verifica si la cola está llena
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Retorna la capacidad máxima
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            capacity: self.capacity,
        }
    }
}
