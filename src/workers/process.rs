//! # OS process workers.
//!
//! [`CommandFactory`] starts one child process per slot; [`ProcessWorker`] wraps it.
//!
//! ## Architecture
//! ```text
//! write(bytes) ──► [bounded input queue] ──► input pump ──► child stdin
//! child stdout ──► output pump ──► [bounded chunk queue] ──► read(max, timeout)
//! child exit   ──► waiter ──► ExitSender::notify(ExitEvent)
//! ```
//!
//! The child sees its slot identity in the environment:
//! - [`SLOT_NAME_ENV`]: composed slot name (`worker2`)
//! - [`SLOT_INDEX_ENV`]: slot index (`2`)
//!
//! ## Rules
//! - `write` never blocks; bytes are queued and flushed by the input pump. It returns
//!   `false` once the child stops reading and the input queue is full.
//! - Dropping a [`ProcessWorker`] kills its child; no exit is reported for it.
//! - An exit observed while the worker is alive is always reported.

use std::ffi::OsStr;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{self as nix_signal, Signal as NixSignal};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc};
use tokio::time;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::warn;

use crate::error::WorkerError;
use crate::workers::exit::{ExitEvent, ExitSender};
use crate::workers::factory::{SpawnContext, WorkerFactory};
use crate::workers::worker::{Signal, Worker, WorkerRef};

/// Environment variable carrying the composed slot name.
pub const SLOT_NAME_ENV: &str = "POOL_SLOT_NAME";
/// Environment variable carrying the slot index.
pub const SLOT_INDEX_ENV: &str = "POOL_SLOT_INDEX";

/// Output chunks buffered between the output pump and readers.
const OUTPUT_CHUNKS: usize = 64;
/// Default read size of the output pump.
const DEFAULT_READ_BUFFER: usize = 64 * 1024;
/// Default number of pending writes per worker.
const DEFAULT_INPUT_QUEUE: usize = 64;

/// Factory that starts `program` with fixed arguments, followed by the pool's `args`.
///
/// # Example
/// ```no_run
/// use poolvisor::CommandFactory;
///
/// let factory = CommandFactory::new("sh")
///     .arg("-c")
///     .arg("while read line; do echo \"$POOL_SLOT_NAME\"; done");
/// # let _ = factory;
/// ```
#[derive(Clone, Debug)]
pub struct CommandFactory {
    program: PathBuf,
    args: Vec<String>,
    read_buffer: usize,
    input_queue: usize,
}

impl CommandFactory {
    /// Creates a factory for `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            read_buffer: DEFAULT_READ_BUFFER,
            input_queue: DEFAULT_INPUT_QUEUE,
        }
    }

    /// Appends one fixed argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the read size of each worker's output pump (min 1).
    pub fn read_buffer(mut self, bytes: usize) -> Self {
        self.read_buffer = bytes.max(1);
        self
    }

    /// Sets how many writes may wait for the child to read its stdin (min 1).
    pub fn input_queue(mut self, writes: usize) -> Self {
        self.input_queue = writes.max(1);
        self
    }
}

#[async_trait]
impl WorkerFactory for CommandFactory {
    async fn spawn(&self, ctx: SpawnContext) -> Result<WorkerRef, WorkerError> {
        let args = self.args.iter().chain(ctx.args.iter());
        let worker = ProcessWorker::spawn(
            self.program.as_os_str(),
            args,
            &ctx,
            self.read_buffer,
            self.input_queue,
        )?;
        Ok(Arc::new(worker))
    }
}

/// Output side of a worker: received chunks plus the unread tail of the last one.
struct Output {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Output {
    fn take(&mut self, max: usize) -> Vec<u8> {
        if max == 0 || max >= self.pending.len() {
            return std::mem::take(&mut self.pending);
        }
        let rest = self.pending.split_off(max);
        std::mem::replace(&mut self.pending, rest)
    }
}

/// A child process with piped stdin/stdout.
pub struct ProcessWorker {
    pid: u32,
    input: mpsc::Sender<Vec<u8>>,
    output: Mutex<Output>,
    _guard: DropGuard,
}

impl ProcessWorker {
    /// Starts `program` for the slot described by `ctx`.
    ///
    /// `read_buffer` bounds each output chunk; `input_queue` bounds the writes waiting
    /// for the child. Must be called from within a tokio runtime.
    pub fn spawn<I, S>(
        program: &OsStr,
        args: I,
        ctx: &SpawnContext,
        read_buffer: usize,
        input_queue: usize,
    ) -> Result<Self, WorkerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut child = Command::new(program)
            .args(args)
            .env(SLOT_NAME_ENV, &ctx.name)
            .env(SLOT_INDEX_ENV, ctx.index.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let pid = child.id().ok_or(WorkerError::MissingPid)?;
        let stdin = child.stdin.take().ok_or(WorkerError::MissingPipe("stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or(WorkerError::MissingPipe("stdout"))?;

        let (in_tx, in_rx) = mpsc::channel(input_queue.max(1));
        let (out_tx, out_rx) = mpsc::channel(OUTPUT_CHUNKS);
        let token = CancellationToken::new();

        tokio::spawn(pump_input(stdin, in_rx));
        tokio::spawn(pump_output(stdout, out_tx, read_buffer.max(1)));
        tokio::spawn(wait_child(child, pid, ctx.exits.clone(), token.clone()));

        Ok(Self {
            pid,
            input: in_tx,
            output: Mutex::new(Output {
                rx: out_rx,
                pending: Vec::new(),
            }),
            _guard: token.drop_guard(),
        })
    }

    async fn read_chunk(&self, max: usize) -> Option<Vec<u8>> {
        let mut out = self.output.lock().await;
        if out.pending.is_empty() {
            out.pending = out.rx.recv().await?;
        }
        Some(out.take(max))
    }
}

#[async_trait]
impl Worker for ProcessWorker {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn write(&self, data: &[u8]) -> bool {
        self.input.try_send(data.to_vec()).is_ok()
    }

    async fn read(&self, max: usize, timeout: Option<Duration>) -> Option<Vec<u8>> {
        match timeout {
            Some(t) => time::timeout(t, self.read_chunk(max)).await.ok().flatten(),
            None => self.read_chunk(max).await,
        }
    }

    fn kill(&self, signal: Signal) -> bool {
        let Ok(raw) = i32::try_from(self.pid) else {
            return false;
        };
        let sig = match signal {
            Signal::Term => NixSignal::SIGTERM,
            Signal::Int => NixSignal::SIGINT,
            Signal::Kill => NixSignal::SIGKILL,
        };
        nix_signal::kill(Pid::from_raw(raw), sig).is_ok()
    }
}

async fn pump_input(mut stdin: ChildStdin, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(buf) = rx.recv().await {
        if stdin.write_all(&buf).await.is_err() || stdin.flush().await.is_err() {
            break;
        }
    }
}

async fn pump_output(mut stdout: ChildStdout, tx: mpsc::Sender<Vec<u8>>, cap: usize) {
    let mut buf = vec![0u8; cap];
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn wait_child(mut child: Child, pid: u32, exits: ExitSender, token: CancellationToken) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => {
                exits.notify(exit_event(pid, status));
            }
            Err(e) => warn!(pid, error = %e, "failed to wait for worker"),
        },
        _ = token.cancelled() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

fn exit_event(pid: u32, status: ExitStatus) -> ExitEvent {
    match (status.code(), status.signal()) {
        (Some(code), _) => ExitEvent::exited(pid, code),
        (None, Some(sig)) => ExitEvent::signaled(pid, sig),
        (None, None) => ExitEvent {
            pid,
            code: None,
            signal: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(pending: &[u8]) -> Output {
        let (_tx, rx) = mpsc::channel(1);
        Output {
            rx,
            pending: pending.to_vec(),
        }
    }

    #[test]
    fn take_respects_max_and_keeps_the_tail() {
        let mut out = output(b"worker1worker2");
        assert_eq!(out.take(7), b"worker1".to_vec());
        assert_eq!(out.pending, b"worker2".to_vec());
        assert_eq!(out.take(0), b"worker2".to_vec());
        assert!(out.pending.is_empty());
    }

    #[test]
    fn exit_status_maps_code_and_signal() {
        let ev = exit_event(7, ExitStatus::from_raw(3 << 8));
        assert_eq!(ev, ExitEvent::exited(7, 3));

        let ev = exit_event(8, ExitStatus::from_raw(15));
        assert_eq!(ev, ExitEvent::signaled(8, 15));
    }
}
