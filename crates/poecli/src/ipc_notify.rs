//! Notifying a running daemon of a change, grounded in `is_poed_alive`/
//! `send_ipc_event` (`poecli.py`): read the daemon's PID file and probe it
//! with a null signal, then drop one token into the IPC FIFO if it's alive.

use std::io::Write;
use std::path::Path;

use nix::sys::signal::kill;
use nix::unistd::Pid;

pub fn is_poed_alive(pid_file: &Path) -> bool {
    let pid = match std::fs::read_to_string(pid_file).ok().and_then(|s| s.trim().parse::<i32>().ok()) {
        Some(pid) => pid,
        None => return false,
    };
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Writes one token to the event FIFO. Failures are swallowed, matching
/// `send_ipc_event`'s bare `except: pass` — a missing or blocked daemon
/// shouldn't make the CLI command itself fail.
pub fn send_ipc_event(fifo_path: &Path, token: &str) {
    if let Ok(mut f) = std::fs::OpenOptions::new().write(true).open(fifo_path) {
        let _ = f.write_all(token.as_bytes());
    }
}
