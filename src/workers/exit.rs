//! # Exit notifications.
//!
//! Worker exits reach the manager as explicit [`ExitEvent`]s rather than OS signals.
//! Anything holding an [`ExitSender`] can report an exit: [`ProcessWorker`](crate::ProcessWorker)
//! does so when its child is reaped, and tests inject synthetic exits the same way.
//!
//! ```text
//! child.wait() ──► ExitSender::notify(ExitEvent) ──► reactor ──► drain ──► reap + respawn
//! ```

use tokio::sync::mpsc;

/// A reaped child: pid plus how it ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitEvent {
    /// Pid of the process that exited.
    pub pid: u32,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number, if the process was killed.
    pub signal: Option<i32>,
}

impl ExitEvent {
    /// Normal exit with `code`.
    pub fn exited(pid: u32, code: i32) -> Self {
        Self {
            pid,
            code: Some(code),
            signal: None,
        }
    }

    /// Termination by signal number `signal`.
    pub fn signaled(pid: u32, signal: i32) -> Self {
        Self {
            pid,
            code: None,
            signal: Some(signal),
        }
    }

    /// Short description used in events and logs.
    pub fn describe(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("exit code {code}"),
            (None, Some(sig)) => format!("signal {sig}"),
            (None, None) => "unknown status".to_string(),
        }
    }
}

/// Cloneable sending half of the manager's exit-notification source.
#[derive(Clone, Debug)]
pub struct ExitSender {
    tx: mpsc::UnboundedSender<ExitEvent>,
}

impl ExitSender {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<ExitEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Reports an exit. Returns `false` if the manager is gone.
    pub fn notify(&self, ev: ExitEvent) -> bool {
        self.tx.send(ev).is_ok()
    }
}

/// Takes every exit already queued without waiting.
///
/// Several children may exit together; the reactor reaps them as one batch.
pub(crate) fn drain(first: ExitEvent, rx: &mut mpsc::UnboundedReceiver<ExitEvent>) -> Vec<ExitEvent> {
    let mut batch = vec![first];
    while let Ok(ev) = rx.try_recv() {
        batch.push(ev);
    }
    batch
}
