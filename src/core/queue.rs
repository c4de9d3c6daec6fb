//! Bounded FIFO of opaque payloads for polling pools.

use tokio::sync::mpsc;

/// Bounded, non-blocking work queue.
///
/// Both ends live in the registry; `push` and `pop` never wait.
pub(crate) struct WorkQueue {
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
}

impl WorkQueue {
    /// Creates a queue holding at most `capacity` payloads (min 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self { tx, rx }
    }

    /// Appends `data`; returns `false` if the queue is full.
    pub fn push(&self, data: Vec<u8>) -> bool {
        self.tx.try_send(data).is_ok()
    }

    /// Takes the oldest payload, if any.
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.rx.try_recv().ok()
    }

    /// Number of queued payloads.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_and_bounded() {
        let mut q = WorkQueue::new(2);
        assert!(q.push(b"a".to_vec()));
        assert!(q.push(b"b".to_vec()));
        assert!(!q.push(b"c".to_vec()));
        assert_eq!(q.len(), 2);

        assert_eq!(q.pop(), Some(b"a".to_vec()));
        assert_eq!(q.pop(), Some(b"b".to_vec()));
        assert_eq!(q.pop(), None);
        assert_eq!(q.len(), 0);
    }
}
