//! # Runner Inline
//! src/runner/inline.rs

use crate::runner::Task;

/// Ejecuta cada tarea en el thread que llama a `dispatch`
///
/// Un pánico dentro de la tarea se propaga a quien despachó.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineRunner;

impl InlineRunner {
    pub fn dispatch(&self, task: Task) {
        task.run();
    }
}
