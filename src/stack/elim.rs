use core::mem::ManuallyDrop;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};
use std::thread;

use crossbeam_utils::Backoff;
use rand::{thread_rng, Rng};

use crate::hazard::{Shield, HAZARDS};

use super::treiber::{Node, TreiberStack};
use super::Stack;

/// Number of slots in the elimination arena.
const ELIM_SIZE: usize = 16;
/// How many slots an operation tries before giving up on the arena.
const ELIM_TRIES: usize = 4;
/// Central CAS failures tolerated before an operation tries the arena.
const CAS_THRESHOLD: usize = 4;
/// How many yields a pusher waits in its slot for a matching pop.
const SPIN_ITERS: usize = 10;

#[inline]
fn random_index() -> usize {
    thread_rng().gen::<usize>() % ELIM_SIZE
}

/// Elimination-backoff stack.
///
/// A Treiber stack augmented with an arena of slots where, under contention,
/// a push and a pop pair off and cancel without touching the central stack.
/// An eliminated node moves straight from pusher to popper: it is never
/// reachable from the central head, so no third thread can hold a hazard on
/// it and the popper frees it immediately.
#[derive(Debug)]
pub struct EliminationStack<T> {
    inner: TreiberStack<T>,
    slots: [AtomicPtr<Node<T>>; ELIM_SIZE],
}

unsafe impl<T: Send> Send for EliminationStack<T> {}
unsafe impl<T: Send> Sync for EliminationStack<T> {}

impl<T> Default for EliminationStack<T> {
    fn default() -> Self {
        Self {
            inner: TreiberStack::default(),
            slots: Default::default(),
        }
    }
}

impl<T> EliminationStack<T> {
    /// Creates a new, empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers `node` in the arena and waits briefly for a pop to take it.
    ///
    /// `Ok(())` means some popper consumed the node and now owns it;
    /// `Err(node)` returns ownership to the caller for the central retry.
    fn try_elim_push(&self, node: *mut Node<T>) -> Result<(), *mut Node<T>> {
        for _ in 0..ELIM_TRIES {
            let slot = &self.slots[random_index()];
            if slot
                .compare_exchange(ptr::null_mut(), node, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }

            for _ in 0..SPIN_ITERS {
                // Anything but our node means a popper emptied the slot
                // (possibly followed by a new offer).
                if slot.load(Ordering::Acquire) != node {
                    return Ok(());
                }
                thread::yield_now();
            }

            // Timed out: withdraw the offer, unless a popper beat us to it.
            return match slot.compare_exchange(
                node,
                ptr::null_mut(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => Err(node),
                Err(_) => Ok(()),
            };
        }
        Err(node)
    }

    /// Sweeps the arena for an offered node and consumes it.
    fn try_elim_pop(&self) -> Option<T> {
        for _ in 0..ELIM_TRIES {
            let node = self.slots[random_index()].swap(ptr::null_mut(), Ordering::AcqRel);
            if !node.is_null() {
                // SAFETY: the swap made this thread the sole owner; the node
                // was never linked into the central stack.
                let mut node = unsafe { Box::from_raw(node) };
                return Some(unsafe { ManuallyDrop::take(&mut node.data) });
            }
        }
        None
    }

    /// Pushes a value on top of the stack.
    pub fn push(&self, value: T) {
        let mut node = Node::alloc(value);
        let mut failures = 0;
        let backoff = Backoff::new();
        loop {
            match self.inner.try_push_node(node) {
                Ok(()) => return,
                Err(n) => node = n,
            }
            failures += 1;
            if failures >= CAS_THRESHOLD {
                match self.try_elim_push(node) {
                    Ok(()) => return,
                    Err(n) => node = n,
                }
                failures = 0;
            }
            backoff.spin();
        }
    }

    /// Pops the top element, or `None` if the stack is observed empty.
    pub fn pop(&self) -> Option<T> {
        let shield = Shield::new(&HAZARDS);
        let mut failures = 0;
        let backoff = Backoff::new();
        loop {
            match self.inner.try_pop_node(&shield) {
                Ok(Some(value)) => return Some(value),
                // Central stack empty: one arena sweep decides between a
                // late elimination and reporting empty.
                Ok(None) => return self.try_elim_pop(),
                Err(()) => {}
            }
            failures += 1;
            if failures >= CAS_THRESHOLD {
                if let Some(value) = self.try_elim_pop() {
                    return Some(value);
                }
                failures = 0;
            }
            backoff.spin();
        }
    }

    /// Returns `true` if both the central stack and the arena are observed
    /// empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
            && self
                .slots
                .iter()
                .all(|slot| slot.load(Ordering::Acquire).is_null())
    }
}

impl<T> Drop for EliminationStack<T> {
    fn drop(&mut self) {
        // The inner stack drains itself; only nodes parked in the arena are
        // left. A parked offer's `next` may point into the central list, so
        // it is never followed here.
        for slot in &mut self.slots {
            let node = *slot.get_mut();
            if !node.is_null() {
                let mut node = unsafe { Box::from_raw(node) };
                unsafe { ManuallyDrop::drop(&mut node.data) };
            }
        }
    }
}

impl<T: Send> Stack<T> for EliminationStack<T> {
    fn push(&self, value: T) {
        EliminationStack::push(self, value);
    }

    fn pop(&self) -> Option<T> {
        EliminationStack::pop(self)
    }

    fn is_empty(&self) -> bool {
        EliminationStack::is_empty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::EliminationStack;
    use std::thread::scope;

    #[test]
    fn push_pop_balanced() {
        let stack = EliminationStack::new();

        scope(|s| {
            for _ in 0..10 {
                s.spawn(|| {
                    for i in 0..10_000 {
                        stack.push(i);
                        assert!(stack.pop().is_some());
                    }
                });
            }
        });

        assert!(stack.pop().is_none());
        assert!(stack.is_empty());
    }
}
