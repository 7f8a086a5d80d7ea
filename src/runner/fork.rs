//! # Runner Proceso-por-Tarea
//! src/runner/fork.rs
//!
//! `dispatch` hace fork(). El hijo ejecuta la tarea y termina; el padre
//! retorna de inmediato sin esperar. Si fork() falla, la tarea se ejecuta
//! en el proceso actual (nunca se pierde).
//!
//! Para que los hijos terminados no se acumulen como zombies se instala,
//! una sola vez por proceso, un handler de SIGCHLD que recoge con
//! `waitpid(-1, WNOHANG)` a todos los hijos terminados pendientes.
//!
//! El reaper es global al proceso: cualquier otro código que espere a un
//! hijo concreto con `waitpid` puede encontrarlo ya recogido.

use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::sync::OnceLock;

use nix::errno::{self, Errno};
use nix::libc::c_int;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use tracing::{debug, warn};

use crate::error::RunnerError;
use crate::runner::Task;

/// Código de salida del hijo cuando la tarea entra en pánico
pub const CHILD_PANIC_EXIT: i32 = 101;

static REAPER: OnceLock<Result<(), Errno>> = OnceLock::new();

#[derive(Debug)]
pub struct ForkRunner {
    _private: (),
}

impl ForkRunner {
    /// Crea el runner; la primera llamada del proceso instala el reaper
    pub fn new() -> Result<Self, RunnerError> {
        let installed = *REAPER.get_or_init(install_reaper);
        installed.map_err(RunnerError::Reaper)?;
        Ok(Self { _private: () })
    }

    pub fn dispatch(&self, task: Task) {
        // SAFETY: el hijo solo ejecuta la tarea y sale con process::exit;
        // nunca vuelve al loop del llamador.
        let forked = unsafe { fork() };
        complete_fork(forked, task);
    }

    /// Recoge a todos los hijos terminados sin bloquear
    ///
    /// Es lo mismo que hace el handler de SIGCHLD; retorna cuántos recogió.
    pub fn reap() -> usize {
        reap_children()
    }
}

// Cada lado del fork hace su parte con la tarea. Si no hubo fork, la
// tarea corre aquí mismo antes de retornar.
fn complete_fork(forked: nix::Result<ForkResult>, task: Task) {
    match forked {
        Ok(ForkResult::Child) => {
            let status = match panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
                Ok(()) => 0,
                Err(_) => CHILD_PANIC_EXIT,
            };
            process::exit(status);
        }
        Ok(ForkResult::Parent { child }) => {
            debug!(pid = child.as_raw(), "task forked");
        }
        Err(errno) => {
            warn!(error = %errno, "fork failed, running task in current process");
            task.run();
        }
    }
}

fn install_reaper() -> Result<(), Errno> {
    let action = SigAction::new(
        SigHandler::Handler(handle_sigchld),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: el handler solo llama a waitpid, que es async-signal-safe.
    unsafe { sigaction(Signal::SIGCHLD, &action) }.map(|_| ())
}

// waitpid puede pisar errno; el código interrumpido debe verlo intacto
extern "C" fn handle_sigchld(_: c_int) {
    let saved = errno::errno();
    reap_children();
    restore_errno(saved);
}

fn restore_errno(value: c_int) {
    // SAFETY: errno es thread-local; solo se escribe el del thread actual.
    unsafe {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            *nix::libc::__errno_location() = value;
        }
        #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
        {
            *nix::libc::__error() = value;
        }
    }
}

// Varios hijos pueden terminar antes de que llegue una sola señal,
// por eso se drena hasta que no quede ninguno.
fn reap_children() -> usize {
    let mut reaped = 0;
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(_) => reaped += 1,
        }
    }
    reaped
}
