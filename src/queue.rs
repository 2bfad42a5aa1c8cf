//! `DeliveryQueue` – the one hand-off point between the transport's delivery
//! context and the single consumer tick.
//!
//! ## Threading model
//!
//! ```text
//! transport thread(s)              │  consumer thread
//! ──────────────────────────────── │ ──────────────────────────────
//! Inbox::push(item)                │  DeliveryQueue::drain(limit)
//!   lock → push_back((epoch, item))│    lock → pop_front × n → unlock
//!                                  │    run items in arrival order
//! ```
//!
//! The mutex guards only enqueue/dequeue.  Items are handed back to the
//! consumer and executed outside the lock, on the consumer's own thread, so
//! no two deliveries ever run concurrently and arrival order is kept.
//!
//! Every item is tagged with the connection epoch of the [`Inbox`] that
//! pushed it.  [`DeliveryQueue::advance_epoch`] (called on close/reconnect)
//! makes every older item stale; stale items are discarded at drain time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

struct Shared<T> {
    pending: Mutex<VecDeque<(u64, T)>>,
    epoch: AtomicU64,
}

/// Consumer side.  Owned by whoever runs the tick.
pub struct DeliveryQueue<T> {
    shared: Arc<Shared<T>>,
}

/// Producer side.  Cheap to clone and `Send` when `T` is, so it can be moved
/// into transport callbacks or threads.
pub struct Inbox<T> {
    shared: Arc<Shared<T>>,
    epoch: u64,
}

impl<T> Clone for Inbox<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            epoch: self.epoch,
        }
    }
}

impl<T> Inbox<T> {
    /// Append an item.  Items from a superseded epoch are dropped here
    /// already; anything that slips past is filtered by `drain`.
    pub fn push(&self, item: T) {
        if !self.is_current() {
            log::debug!("[queue] Dropping delivery from stale epoch {}", self.epoch);
            return;
        }
        self.shared.pending.lock().push_back((self.epoch, item));
    }

    /// False once the queue has moved on to a newer epoch.
    pub fn is_current(&self) -> bool {
        self.shared.epoch.load(Ordering::Acquire) == self.epoch
    }
}

impl<T> Default for DeliveryQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeliveryQueue<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(VecDeque::new()),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Producer handle bound to the current epoch.
    pub fn inbox(&self) -> Inbox<T> {
        Inbox {
            shared: self.shared.clone(),
            epoch: self.epoch(),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.shared.epoch.load(Ordering::Acquire)
    }

    /// Start a new epoch.  Everything pushed under older epochs becomes stale.
    pub fn advance_epoch(&self) -> u64 {
        self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Pop up to `limit` current-epoch items in arrival order (`0` = all).
    pub fn drain(&self, limit: usize) -> Vec<T> {
        let current = self.epoch();
        let mut pending = self.shared.pending.lock();
        let mut out = Vec::new();
        let mut stale = 0usize;
        while limit == 0 || out.len() < limit {
            let Some((epoch, item)) = pending.pop_front() else {
                break;
            };
            if epoch == current {
                out.push(item);
            } else {
                stale += 1;
            }
        }
        drop(pending);
        if stale > 0 {
            log::debug!("[queue] Discarded {} stale deliveries", stale);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn drain_preserves_arrival_order() {
        let q = DeliveryQueue::new();
        let inbox = q.inbox();
        inbox.push("a");
        inbox.push("b");
        inbox.push("c");
        assert_eq!(q.drain(0), vec!["a", "b", "c"]);
        assert!(q.is_empty());
    }

    #[test]
    fn drain_limit_leaves_remainder_in_order() {
        let q = DeliveryQueue::new();
        let inbox = q.inbox();
        for i in 0..5 {
            inbox.push(i);
        }
        assert_eq!(q.drain(2), vec![0, 1]);
        assert_eq!(q.len(), 3);
        assert_eq!(q.drain(0), vec![2, 3, 4]);
    }

    #[test]
    fn stale_epoch_is_discarded_at_drain() {
        let q = DeliveryQueue::new();
        let old = q.inbox();
        old.push(1);
        old.push(2);

        q.advance_epoch();
        let fresh = q.inbox();
        fresh.push(3);

        assert_eq!(q.drain(0), vec![3]);
    }

    #[test]
    fn stale_inbox_push_is_dropped() {
        let q = DeliveryQueue::new();
        let old = q.inbox();
        q.advance_epoch();
        assert!(!old.is_current());
        old.push(9);
        assert!(q.is_empty());
    }

    #[test]
    fn per_producer_order_survives_concurrent_bursts() {
        let q: DeliveryQueue<(usize, usize)> = DeliveryQueue::new();
        let handles: Vec<_> = (0..4)
            .map(|p| {
                let inbox = q.inbox();
                thread::spawn(move || {
                    for i in 0..250 {
                        inbox.push((p, i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let items = q.drain(0);
        assert_eq!(items.len(), 1000);
        let mut next = [0usize; 4];
        for (p, i) in items {
            assert_eq!(i, next[p], "producer {p} delivered out of order");
            next[p] += 1;
        }
    }
}
