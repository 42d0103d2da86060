//! Matchmaking queue: FIFO pairing with a cancellable bot fallback timer

use std::collections::VecDeque;

use tokio::task::JoinHandle;
use uuid::Uuid;

/// A waiting connection plus the handle of its armed fallback timer.
///
/// The timer task and a pairing event race for this entry; whichever
/// removes it first wins. Removal always aborts the timer, and a timer
/// that fires after losing finds the entry gone and does nothing.
#[derive(Debug)]
struct QueueEntry {
    conn_id: Uuid,
    timer: JoinHandle<()>,
}

/// Connections awaiting an opponent, longest-waiting first
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    entries: VecDeque<QueueEntry>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, conn_id: &Uuid) -> bool {
        self.entries.iter().any(|e| e.conn_id == *conn_id)
    }

    /// Enqueue a connection together with its armed fallback timer.
    pub fn push(&mut self, conn_id: Uuid, timer: JoinHandle<()>) {
        self.entries.push_back(QueueEntry { conn_id, timer });
    }

    /// Pop the longest-waiting entry for pairing, cancelling its timer.
    pub fn pop_front(&mut self) -> Option<Uuid> {
        let entry = self.entries.pop_front()?;
        entry.timer.abort();
        Some(entry.conn_id)
    }

    /// Remove a specific connection (pairing cleanup, disconnect, or the
    /// fired timer claiming its own entry). Returns false when the entry
    /// was already gone, which makes the removal idempotent.
    pub fn remove(&mut self, conn_id: &Uuid) -> bool {
        if let Some(pos) = self.entries.iter().position(|e| e.conn_id == *conn_id) {
            let entry = self.entries.remove(pos).expect("position found above");
            entry.timer.abort();
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_timer() -> JoinHandle<()> {
        tokio::spawn(std::future::pending())
    }

    #[tokio::test]
    async fn pop_front_is_fifo() {
        let mut queue = MatchmakingQueue::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        queue.push(first, dummy_timer());
        queue.push(second, dummy_timer());

        assert_eq!(queue.pop_front(), Some(first));
        assert_eq!(queue.pop_front(), Some(second));
        assert_eq!(queue.pop_front(), None);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let mut queue = MatchmakingQueue::new();
        let conn = Uuid::new_v4();
        queue.push(conn, dummy_timer());

        assert!(queue.remove(&conn));
        assert!(!queue.remove(&conn));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn pop_front_cancels_the_fallback_timer() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let _ = tx.send(());
        });

        let mut queue = MatchmakingQueue::new();
        let conn = Uuid::new_v4();
        queue.push(conn, timer);
        queue.pop_front();

        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(rx.try_recv().is_err(), "aborted timer must not fire");
    }
}
