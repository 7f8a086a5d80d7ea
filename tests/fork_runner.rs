//! Tests de integración del runner proceso-por-tarea
//! tests/fork_runner.rs
//!
//! Viven en su propio binario: el reaper de SIGCHLD es global al proceso
//! y recogería a los hijos que otros tests esperan con `waitpid`.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;

use socket_server::runner::{ForkRunner, Runner, Task};

// Los tests de este binario no deben correr en paralelo
static SERIAL: Mutex<()> = Mutex::new(());

fn wait_for_file(path: &Path, expected: &str) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if fs::read_to_string(path).map(|c| c == expected).unwrap_or(false) {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

/// Espera a que no quede ningún hijo sin recoger
fn no_children_left() -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        ForkRunner::reap();
        if waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) == Err(Errno::ECHILD) {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_children_run_every_task() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let runner = Runner::fork().unwrap();
    assert_eq!(runner.name(), "fork-per-task");

    for i in 0..10 {
        let marker = dir.path().join(format!("marker-{}", i));
        runner.dispatch(Task::new(move || fs::write(marker, i.to_string()).unwrap()));
    }

    for i in 0..10 {
        let marker = dir.path().join(format!("marker-{}", i));
        assert!(wait_for_file(&marker, &i.to_string()), "missing marker {}", i);
    }
    assert!(no_children_left());
}

#[test]
fn test_panicking_child_does_not_affect_parent() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let runner = ForkRunner::new().unwrap();

    runner.dispatch(Task::new(|| panic!("falla en el hijo")));

    let marker = dir.path().join("after-panic");
    {
        let marker = marker.clone();
        runner.dispatch(Task::new(move || fs::write(marker, "ok").unwrap()));
    }

    assert!(wait_for_file(&marker, "ok"));
    assert!(no_children_left());
}

#[test]
fn test_child_memory_is_isolated() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let dir = tempfile::tempdir().unwrap();
    let runner = ForkRunner::new().unwrap();
    let shared = Arc::new(Mutex::new(Vec::<u32>::new()));

    let marker = dir.path().join("isolated");
    {
        let shared = Arc::clone(&shared);
        let marker = marker.clone();
        runner.dispatch(Task::new(move || {
            shared.lock().unwrap().push(1);
            fs::write(marker, "done").unwrap();
        }));
    }

    assert!(wait_for_file(&marker, "done"));
    // El hijo modificó su propia copia
    assert!(shared.lock().unwrap().is_empty());
    assert!(no_children_left());
}

#[test]
fn test_burst_of_exits_leaves_no_zombies() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let runner = ForkRunner::new().unwrap();

    // Tareas instantáneas: muchos hijos terminan casi al mismo tiempo
    for _ in 0..50 {
        runner.dispatch(Task::new(|| {}));
    }
    assert!(no_children_left());
}

#[test]
fn test_reaper_installed_once() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    for _ in 0..3 {
        assert!(ForkRunner::new().is_ok());
    }
}
