//! Delayed-job queue
//!
//! Min-heap of `(due_at, seq)` entries. Each key has at most one live job:
//! rescheduling or cancelling bumps the key's generation and stale heap
//! entries are discarded when they reach the top, or all at once when they
//! outnumber the live jobs.

use crate::clock::Millis;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobKind {
    Program,
    Nudge(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobKey {
    pub contact: String,
    pub kind: JobKind,
}

impl JobKey {
    pub fn program(contact: impl Into<String>) -> Self {
        Self {
            contact: contact.into(),
            kind: JobKind::Program,
        }
    }

    pub fn nudge(contact: impl Into<String>, stage: usize) -> Self {
        Self {
            contact: contact.into(),
            kind: JobKind::Nudge(stage),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueJob {
    pub key: JobKey,
    pub due_at: Millis,
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Reverse<(Millis, u64, JobKey)>>,
    /// Live sequence number per key. Heap entries with another seq are stale.
    live: HashMap<JobKey, u64>,
    next_seq: u64,
}

impl Queue {
    /// Drop stale entries: all of them once they outnumber live jobs,
    /// otherwise only those sitting at the top of the heap.
    fn prune(&mut self) {
        if self.heap.len() > 2 * self.live.len() {
            let live = &self.live;
            self.heap
                .retain(|Reverse((_, seq, key))| live.get(key) == Some(seq));
        }
        while let Some(Reverse((_, seq, key))) = self.heap.peek() {
            if self.live.get(key) == Some(seq) {
                break;
            }
            self.heap.pop();
        }
    }
}

#[derive(Default)]
pub struct Scheduler {
    queue: Mutex<Queue>,
    changed: Notify,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `key` at `due_at`, replacing any pending job for it.
    pub async fn schedule(&self, key: JobKey, due_at: Millis) {
        {
            let mut q = self.queue.lock().await;
            let seq = q.next_seq;
            q.next_seq += 1;
            q.live.insert(key.clone(), seq);
            q.heap.push(Reverse((due_at, seq, key)));
            q.prune();
        }
        self.changed.notify_one();
    }

    /// Returns true if a pending job was removed.
    pub async fn cancel(&self, key: &JobKey) -> bool {
        let mut q = self.queue.lock().await;
        let removed = q.live.remove(key).is_some();
        q.prune();
        removed
    }

    /// Cancel every nudge job of `contact`. Returns how many were pending.
    pub async fn cancel_contact_nudges(&self, contact: &str) -> usize {
        let mut q = self.queue.lock().await;
        let before = q.live.len();
        q.live
            .retain(|key, _| !(key.contact == contact && matches!(key.kind, JobKind::Nudge(_))));
        q.prune();
        before - q.live.len()
    }

    /// Pop every live job due at or before `now`, earliest first.
    pub async fn take_due(&self, now: Millis) -> Vec<DueJob> {
        let mut q = self.queue.lock().await;
        let mut due = Vec::new();
        loop {
            q.prune();
            match q.heap.peek() {
                Some(Reverse((due_at, _, _))) if *due_at <= now => {}
                _ => break,
            }
            if let Some(Reverse((due_at, _, key))) = q.heap.pop() {
                q.live.remove(&key);
                due.push(DueJob { key, due_at });
            }
        }
        due
    }

    /// Due time of the earliest live job.
    pub async fn next_due(&self) -> Option<Millis> {
        let mut q = self.queue.lock().await;
        q.prune();
        q.heap.peek().map(|Reverse((due_at, _, _))| *due_at)
    }

    /// Number of live jobs.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.live.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Resolves after the next call to [`schedule`](Self::schedule).
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_take_due_in_order() {
        let s = Scheduler::new();
        s.schedule(JobKey::program("b"), 200).await;
        s.schedule(JobKey::program("a"), 100).await;
        s.schedule(JobKey::nudge("a", 0), 300).await;

        assert_eq!(s.next_due().await, Some(100));
        let due = s.take_due(250).await;
        let keys: Vec<_> = due.iter().map(|j| j.key.contact.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(s.len().await, 1);
        assert_eq!(s.next_due().await, Some(300));
    }

    #[tokio::test]
    async fn test_future_jobs_stay_queued() {
        let s = Scheduler::new();
        s.schedule(JobKey::program("a"), 1_000).await;
        assert!(s.take_due(999).await.is_empty());
        assert_eq!(s.take_due(1_000).await.len(), 1);
        assert!(s.is_empty().await);
    }

    #[tokio::test]
    async fn test_reschedule_replaces() {
        let s = Scheduler::new();
        s.schedule(JobKey::program("a"), 100).await;
        s.schedule(JobKey::program("a"), 500).await;

        assert_eq!(s.len().await, 1);
        assert_eq!(s.next_due().await, Some(500));
        assert!(s.take_due(200).await.is_empty());
        assert_eq!(
            s.take_due(500).await,
            vec![DueJob {
                key: JobKey::program("a"),
                due_at: 500
            }]
        );
    }

    #[tokio::test]
    async fn test_cancel() {
        let s = Scheduler::new();
        s.schedule(JobKey::program("a"), 100).await;
        assert!(s.cancel(&JobKey::program("a")).await);
        assert!(!s.cancel(&JobKey::program("a")).await);
        assert_eq!(s.next_due().await, None);
        assert!(s.take_due(1_000).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_contact_nudges_keeps_program() {
        let s = Scheduler::new();
        s.schedule(JobKey::program("a"), 100).await;
        s.schedule(JobKey::nudge("a", 0), 200).await;
        s.schedule(JobKey::nudge("a", 1), 300).await;
        s.schedule(JobKey::nudge("b", 0), 400).await;

        assert_eq!(s.cancel_contact_nudges("a").await, 2);
        let due: Vec<_> = s.take_due(1_000).await.into_iter().map(|j| j.key).collect();
        assert_eq!(due, vec![JobKey::program("a"), JobKey::nudge("b", 0)]);
    }

    #[tokio::test]
    async fn test_schedule_wakes_waiter() {
        let s = Arc::new(Scheduler::new());
        let waiter = {
            let s = s.clone();
            tokio::spawn(async move { s.changed().await })
        };
        tokio::task::yield_now().await;
        s.schedule(JobKey::program("a"), 1).await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_entries_do_not_pile_up() {
        let s = Scheduler::new();
        s.schedule(JobKey::program("keep"), 10_000).await;
        for round in 0..20 {
            for stage in 0..3 {
                s.schedule(JobKey::nudge("a", stage), 1_000 * (round + 1) + stage as i64).await;
            }
            s.cancel_contact_nudges("a").await;
        }

        assert_eq!(s.len().await, 1);
        assert!(s.queue.lock().await.heap.len() <= 2);
        assert_eq!(s.next_due().await, Some(10_000));
    }
}
