//! Process-wide shutdown signal.
//!
//! SPDX-License-Identifier: GPL-3.0-or-later
//!
//! Out of scope per `spec.md` §1: process signal handling itself. This is
//! just the narrow observable the supervisor selects on (`spec.md` §6,
//! "Shutdown. A process-wide shutdown signal observable by the supervisor").

use tokio::sync::watch;

/// A cloneable handle to a process-wide shutdown flag.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// The write side, held by whatever external code observes SIGTERM/SIGINT.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Creates a linked `(ShutdownHandle, ShutdownSignal)` pair, initially not
/// shut down.
pub fn channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

impl ShutdownHandle {
    /// Signals shutdown. Idempotent.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl ShutdownSignal {
    /// `true` once shutdown has been triggered.
    pub fn is_shutting_down(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered. Used by the dispatcher in
    /// a `tokio::select!` alongside the event channel `recv()`.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Sender dropped; treat as permanent shutdown.
                return;
            }
        }
    }
}
