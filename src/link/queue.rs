//! # Outbound Queues
//!
//! Producer/consumer pairs feeding the multiplexer. Producers can only
//! insert and the single consumer, owned by the link, can only remove from
//! the tail. Where a producer inserts decides the drain order: head
//! insertion gives oldest-first, tail insertion gives newest-first.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::wire::messages::{encode_debug_print, KvBatch};

/// End of the queue a producer inserts at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertAt {
    Head,
    Tail,
}

type Shared<T> = Arc<Mutex<VecDeque<T>>>;

fn lock<T>(shared: &Shared<T>) -> MutexGuard<'_, VecDeque<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Insert-only handle
#[derive(Debug)]
pub struct Producer<T> {
    shared: Shared<T>,
    insert_at: InsertAt,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            insert_at: self.insert_at,
        }
    }
}

impl<T> Producer<T> {
    pub fn push(&self, item: T) {
        let mut queue = lock(&self.shared);
        match self.insert_at {
            InsertAt::Head => queue.push_front(item),
            InsertAt::Tail => queue.push_back(item),
        }
    }
}

/// Remove-only handle; there is exactly one per queue
#[derive(Debug)]
pub struct Consumer<T> {
    shared: Shared<T>,
}

impl<T> Consumer<T> {
    /// Remove the tail item
    pub fn pop(&mut self) -> Option<T> {
        lock(&self.shared).pop_back()
    }

    pub fn len(&self) -> usize {
        lock(&self.shared).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Create a queue whose producers insert at `insert_at`
pub fn channel<T>(insert_at: InsertAt) -> (Producer<T>, Consumer<T>) {
    let shared: Shared<T> = Arc::new(Mutex::new(VecDeque::new()));
    (
        Producer { shared: shared.clone(), insert_at },
        Consumer { shared },
    )
}

/// Producer side of the broadcast key-value batch queue
pub type BatchSender = Producer<KvBatch>;

/// Producer side of the debug-print queue
#[derive(Debug, Clone)]
pub struct DebugPrinter {
    inner: Producer<Vec<u8>>,
}

impl DebugPrinter {
    pub(crate) fn new(inner: Producer<Vec<u8>>) -> Self {
        Self { inner }
    }

    /// Queue a message for the peer, truncated to one frame
    pub fn print(&self, msg: impl fmt::Display) {
        self.inner.push(encode_debug_print(&msg.to_string()));
    }
}
