//! Request queue with coalescing of viewport-driven batches.
//!
//! Batches are taken FIFO by the worker. A replaceable batch stands for "what
//! the viewport wants right now" and therefore stays at the tail: a
//! non-replaceable batch submitted behind it is slotted in front of it. Each
//! pending batch keeps a set of its requests so the worker can cheaply tell
//! whether a request it is about to process is still wanted.

use parking_lot::{Condvar, Mutex};
use pdf_desktop_cache::CacheKey;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;

/// A single load request: rasterize this page at this scale.
pub type LoadRequest = CacheKey;

/// Ordered group of load requests submitted together.
#[derive(Debug, Clone)]
pub struct RequestBatch {
    requests: Vec<LoadRequest>,
    members: HashSet<LoadRequest>,
    replaceable: bool,
}

impl RequestBatch {
    pub fn new(requests: Vec<LoadRequest>, replaceable: bool) -> Self {
        let members = requests.iter().copied().collect();
        Self { requests, members, replaceable }
    }

    /// Requests in processing order.
    pub fn requests(&self) -> &[LoadRequest] {
        &self.requests
    }

    /// Whether a newer batch may abandon the remainder of this one.
    pub fn is_replaceable(&self) -> bool {
        self.replaceable
    }

    pub fn contains(&self, request: &LoadRequest) -> bool {
        self.members.contains(request)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Batches accepted by `submit`
    pub submitted: u64,

    /// Non-replaceable batches slotted in front of a replaceable tail
    pub coalesced: u64,

    /// Batches handed to the worker
    pub taken: u64,

    /// Batches currently waiting
    pub pending: usize,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<RequestBatch>,
    in_flight: bool,
    closed: bool,
    stats: QueueStats,
}

/// Shared request queue between the scheduling side and the worker.
///
/// # Example
///
/// ```
/// use pdf_desktop_cache::{CacheKey, Scale};
/// use pdf_desktop_render::{DocumentHandle, PageRef};
/// use pdf_desktop_scheduler::RequestQueue;
///
/// let queue = RequestQueue::new();
/// let page = PageRef::new(DocumentHandle::from_raw(1), 0);
/// let visible = CacheKey::new(page, Scale::new(1.0).unwrap());
/// let thumbnail = CacheKey::new(page, Scale::new(0.1).unwrap());
///
/// queue.submit(vec![visible], true);
/// queue.submit(vec![thumbnail], false);
///
/// // The non-replaceable batch jumped ahead of the replaceable tail.
/// let first = queue.wait_pop().unwrap();
/// assert!(!first.is_replaceable());
/// ```
pub struct RequestQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self { state: Mutex::new(QueueState::default()), available: Condvar::new() }
    }

    /// Queue a batch for the worker.
    ///
    /// Empty batches are queued too: an empty replaceable batch still
    /// supersedes older replaceable work. Submissions after [`close`] are
    /// dropped.
    ///
    /// [`close`]: RequestQueue::close
    pub fn submit(&self, requests: Vec<LoadRequest>, replaceable: bool) {
        let batch = RequestBatch::new(requests, replaceable);
        let mut state = self.state.lock();
        if state.closed {
            tracing::debug!(len = batch.len(), "dropping batch submitted after close");
            return;
        }

        let tail_replaceable = state.pending.back().is_some_and(RequestBatch::is_replaceable);
        if !replaceable && tail_replaceable {
            let index = state.pending.len() - 1;
            state.pending.insert(index, batch);
            state.stats.coalesced += 1;
        } else {
            state.pending.push_back(batch);
        }
        state.stats.submitted += 1;

        tracing::trace!(replaceable, pending = state.pending.len(), "batch submitted");
        drop(state);
        self.available.notify_one();
    }

    /// Block until a batch is available and take it, marking it in flight.
    ///
    /// Returns `None` once the queue is closed.
    pub fn wait_pop(&self) -> Option<RequestBatch> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(batch) = state.pending.pop_front() {
                state.in_flight = true;
                state.stats.taken += 1;
                return Some(batch);
            }
            self.available.wait(&mut state);
        }
    }

    /// Like [`RequestQueue::wait_pop`] but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<RequestBatch> {
        let mut state = self.state.lock();
        if state.pending.is_empty() && !state.closed {
            self.available.wait_for(&mut state, timeout);
        }
        if state.closed {
            return None;
        }
        let batch = state.pending.pop_front()?;
        state.in_flight = true;
        state.stats.taken += 1;
        Some(batch)
    }

    /// Mark the batch taken last as fully processed.
    pub fn finish_batch(&self) {
        self.state.lock().in_flight = false;
    }

    /// True when `request` is no longer wanted: another batch is waiting and
    /// the request is absent from the batch at its head.
    pub fn supersedes(&self, request: &LoadRequest) -> bool {
        self.state.lock().pending.front().is_some_and(|next| !next.contains(request))
    }

    /// Nothing pending and nothing being processed.
    pub fn is_drained(&self) -> bool {
        let state = self.state.lock();
        state.pending.is_empty() && !state.in_flight
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Stop accepting work and wake a blocked worker.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.pending.clear();
        drop(state);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats { pending: state.pending.len(), ..state.stats }
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdf_desktop_cache::Scale;
    use pdf_desktop_render::{DocumentHandle, PageRef};
    use std::sync::Arc;
    use std::thread;

    fn req(page: u32, scale: f32) -> LoadRequest {
        CacheKey::new(
            PageRef::new(DocumentHandle::from_raw(1), page),
            Scale::new(scale).unwrap(),
        )
    }

    fn take_all(queue: &RequestQueue) -> Vec<(Vec<LoadRequest>, bool)> {
        let mut batches = Vec::new();
        while queue.pending_len() > 0 {
            let batch = queue.wait_pop().unwrap();
            batches.push((batch.requests().to_vec(), batch.is_replaceable()));
            queue.finish_batch();
        }
        batches
    }

    #[test]
    fn test_batch_membership() {
        let batch = RequestBatch::new(vec![req(0, 1.0), req(1, 1.0)], true);
        assert_eq!(batch.len(), 2);
        assert!(batch.contains(&req(1, 1.0)));
        assert!(!batch.contains(&req(1, 0.5)));
        assert!(batch.is_replaceable());
    }

    #[test]
    fn test_fifo_without_coalescing() {
        let queue = RequestQueue::new();
        queue.submit(vec![req(0, 1.0)], false);
        queue.submit(vec![req(1, 1.0)], true);
        queue.submit(vec![req(2, 1.0)], true);

        let order: Vec<_> = take_all(&queue).into_iter().map(|(r, _)| r[0]).collect();
        assert_eq!(order, vec![req(0, 1.0), req(1, 1.0), req(2, 1.0)]);
        assert_eq!(queue.stats().coalesced, 0);
    }

    #[test]
    fn test_non_replaceable_jumps_replaceable_tail() {
        let queue = RequestQueue::new();
        queue.submit(vec![req(0, 1.0)], true);
        queue.submit(vec![req(5, 0.1)], false);

        let batches = take_all(&queue);
        assert_eq!(batches[0], (vec![req(5, 0.1)], false));
        assert_eq!(batches[1], (vec![req(0, 1.0)], true));
        assert_eq!(queue.stats().coalesced, 1);
    }

    #[test]
    fn test_coalescing_keeps_replaceable_last() {
        let queue = RequestQueue::new();
        queue.submit(vec![req(0, 1.0)], true);
        queue.submit(vec![req(1, 0.1)], false);
        queue.submit(vec![req(2, 0.1)], false);

        let flags: Vec<_> = take_all(&queue).into_iter().map(|(_, r)| r).collect();
        assert_eq!(flags, vec![false, false, true]);
    }

    #[test]
    fn test_only_tail_is_considered() {
        let queue = RequestQueue::new();
        queue.submit(vec![req(0, 1.0)], true);
        queue.submit(vec![req(1, 1.0)], false);
        queue.submit(vec![req(2, 1.0)], true);
        queue.submit(vec![req(3, 0.1)], false);

        let order: Vec<_> = take_all(&queue).into_iter().map(|(r, _)| r[0].page.index).collect();
        assert_eq!(order, vec![1, 0, 3, 2]);
    }

    #[test]
    fn test_supersedes_checks_head_batch() {
        let queue = RequestQueue::new();
        assert!(!queue.supersedes(&req(0, 1.0)));

        queue.submit(vec![req(0, 1.0), req(1, 1.0)], true);
        assert!(!queue.supersedes(&req(0, 1.0)));
        assert!(queue.supersedes(&req(2, 1.0)));
        assert!(queue.supersedes(&req(0, 0.5)));
    }

    #[test]
    fn test_empty_batch_supersedes_everything() {
        let queue = RequestQueue::new();
        queue.submit(Vec::new(), true);
        assert_eq!(queue.pending_len(), 1);
        assert!(queue.supersedes(&req(0, 1.0)));
    }

    #[test]
    fn test_drained_tracks_in_flight() {
        let queue = RequestQueue::new();
        assert!(queue.is_drained());

        queue.submit(vec![req(0, 1.0)], true);
        assert!(!queue.is_drained());

        let _batch = queue.wait_pop().unwrap();
        assert!(!queue.is_drained());

        queue.finish_batch();
        assert!(queue.is_drained());
    }

    #[test]
    fn test_pop_timeout_on_empty_queue() {
        let queue = RequestQueue::new();
        assert!(queue.pop_timeout(Duration::from_millis(10)).is_none());
        assert!(queue.is_drained());
    }

    #[test]
    fn test_close_wakes_waiter() {
        let queue = Arc::new(RequestQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_pop().is_none())
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(waiter.join().unwrap());

        queue.submit(vec![req(0, 1.0)], false);
        assert_eq!(queue.pending_len(), 0);
        assert!(queue.is_closed());
    }

    #[test]
    fn test_submit_wakes_waiter() {
        let queue = Arc::new(RequestQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_pop().map(|b| b.len()))
        };

        thread::sleep(Duration::from_millis(20));
        queue.submit(vec![req(0, 1.0), req(1, 1.0)], true);
        assert_eq!(waiter.join().unwrap(), Some(2));
        assert_eq!(queue.stats().taken, 1);
    }
}
