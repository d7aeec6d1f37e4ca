//! Cooperative shutdown signal shared by the autosave and IPC tasks,
//! replacing the original's global `thread_flag` boolean (spec.md §9:
//! a typed, clonable cancellation handle instead of a mutable module
//! global two unrelated threads both poll and write).

use tokio::sync::watch;

#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

pub fn channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, Shutdown { rx })
}

impl Shutdown {
    /// Resolves once `cancel()` has been called. Safe to call
    /// repeatedly and from `tokio::select!`.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
