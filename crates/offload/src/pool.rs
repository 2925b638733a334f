use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use crate::error::Error;
use crate::task::TaskId;

/// Anything that can sit in the pool's backlog.
pub(crate) trait Queued {
    fn task_id(&self) -> TaskId;
}

/// Result of offering a new task to the pool.
#[derive(Debug)]
pub(crate) enum Admission<P> {
    /// A slot is free; the caller must bind the task now.
    Bind(P),
    /// All slots busy; the task waits in the backlog.
    Queued { position: usize },
    /// Slots and backlog both full.
    Rejected(P, Error),
}

/// Bounded set of execution slots plus a FIFO backlog.
///
/// `P` is a pending entry, `A` the bookkeeping kept for a bound slot.
/// `active.len() + backlog.len()` never exceeds `capacity + max_backlog`.
#[derive(Debug)]
pub(crate) struct ExecutionPool<P, A> {
    capacity: usize,
    max_backlog: usize,
    active: HashMap<TaskId, A>,
    backlog: VecDeque<P>,
}

impl<P, A> ExecutionPool<P, A>
where
    P: Queued,
{
    pub(crate) fn new(capacity: usize, max_backlog: usize) -> Self {
        Self {
            capacity,
            max_backlog,
            active: HashMap::with_capacity(capacity),
            backlog: VecDeque::with_capacity(max_backlog.min(1024)),
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn max_backlog(&self) -> usize {
        self.max_backlog
    }

    pub(crate) fn active_len(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    fn has_free_slot(&self) -> bool {
        self.active.len() < self.capacity
    }

    pub(crate) fn admit(&mut self, entry: P) -> Admission<P> {
        if self.has_free_slot() {
            return Admission::Bind(entry);
        }
        if self.backlog.len() < self.max_backlog {
            self.backlog.push_back(entry);
            return Admission::Queued {
                position: self.backlog.len(),
            };
        }
        let err = Error::PoolExhausted {
            active: self.active.len(),
            queued: self.backlog.len(),
        };
        Admission::Rejected(entry, err)
    }

    /// Marks a slot as bound to `id`. Callers must only bind after
    /// `admit` returned `Bind` or `next_ready` yielded an entry.
    pub(crate) fn occupy(&mut self, id: TaskId, slot: A) {
        debug_assert!(self.has_free_slot());
        self.active.insert(id, slot);
    }

    pub(crate) fn active_mut(&mut self, id: &TaskId) -> Option<&mut A> {
        self.active.get_mut(id)
    }

    /// Frees the slot bound to `id`, if any.
    pub(crate) fn release(&mut self, id: &TaskId) -> Option<A> {
        self.active.remove(id)
    }

    /// Oldest backlog entry, if a slot is free for it.
    pub(crate) fn next_ready(&mut self) -> Option<P> {
        if self.has_free_slot() {
            self.backlog.pop_front()
        } else {
            None
        }
    }

    /// Removes a still-pending entry from the backlog.
    pub(crate) fn remove_pending(&mut self, id: &TaskId) -> Option<P> {
        let index = self.backlog.iter().position(|entry| entry.task_id() == *id)?;
        self.backlog.remove(index)
    }

    pub(crate) fn drain(&mut self) -> (Vec<P>, Vec<(TaskId, A)>) {
        let pending = self.backlog.drain(..).collect();
        let active = self.active.drain().collect();
        (pending, active)
    }
}

/// Point-in-time view of a dispatcher's pool and counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub max_backlog: usize,
    pub active: usize,
    pub queued: usize,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub rejected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Entry(TaskId);

    impl Queued for Entry {
        fn task_id(&self) -> TaskId {
            self.0
        }
    }

    fn entry() -> Entry {
        Entry(TaskId::new_v4())
    }

    #[test]
    fn test_binds_until_capacity_then_queues() {
        let mut pool: ExecutionPool<Entry, ()> = ExecutionPool::new(2, 1);

        for _ in 0..2 {
            match pool.admit(entry()) {
                Admission::Bind(e) => pool.occupy(e.0, ()),
                other => panic!("expected bind, got {:?}", other),
            }
        }
        assert!(matches!(
            pool.admit(entry()),
            Admission::Queued { position: 1 }
        ));
        match pool.admit(entry()) {
            Admission::Rejected(_, Error::PoolExhausted { active, queued }) => {
                assert_eq!((active, queued), (2, 1));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(pool.active_len(), 2);
        assert_eq!(pool.backlog_len(), 1);
    }

    #[test]
    fn test_release_admits_backlog_in_fifo_order() {
        let mut pool: ExecutionPool<Entry, ()> = ExecutionPool::new(1, 3);
        let running = entry();
        let running_id = running.0;
        if let Admission::Bind(e) = pool.admit(running) {
            pool.occupy(e.0, ());
        }

        let ids: Vec<TaskId> = (0..3)
            .map(|_| {
                let e = entry();
                let id = e.0;
                pool.admit(e);
                id
            })
            .collect();

        assert!(pool.next_ready().is_none());
        assert!(pool.release(&running_id).is_some());

        let mut order = Vec::new();
        while let Some(next) = pool.next_ready() {
            order.push(next.0);
            pool.occupy(next.0, ());
            pool.release(&next.0);
        }
        assert_eq!(order, ids);
    }

    #[test]
    fn test_remove_pending() {
        let mut pool: ExecutionPool<Entry, ()> = ExecutionPool::new(0, 2);
        let a = entry();
        let b = entry();
        let (a_id, b_id) = (a.0, b.0);
        pool.admit(a);
        pool.admit(b);

        assert_eq!(pool.remove_pending(&a_id), Some(Entry(a_id)));
        assert!(pool.remove_pending(&a_id).is_none());
        assert_eq!(pool.backlog_len(), 1);
        assert_eq!(pool.remove_pending(&b_id), Some(Entry(b_id)));
    }
}
