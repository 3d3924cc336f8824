use core::mem::ManuallyDrop;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use crossbeam_utils::Backoff;

use crate::hazard::{self, Shield, HAZARDS};

use super::Stack;

pub(super) struct Node<T> {
    pub(super) data: ManuallyDrop<T>,
    pub(super) next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    pub(super) fn alloc(value: T) -> *mut Self {
        Box::into_raw(Box::new(Self {
            data: ManuallyDrop::new(value),
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// Treiber's lock-free stack.
///
/// Usable with any number of producers and consumers. A pop publishes the
/// head in a hazard slot before touching it, so a concurrently retired node
/// is never dereferenced (and a recycled address never passes validation,
/// which rules out ABA on the head CAS turning into a use-after-free).
#[derive(Debug)]
pub struct TreiberStack<T> {
    head: AtomicPtr<Node<T>>,
}

unsafe impl<T: Send> Send for TreiberStack<T> {}
unsafe impl<T: Send> Sync for TreiberStack<T> {}

impl<T> Default for TreiberStack<T> {
    fn default() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl<T> TreiberStack<T> {
    /// Creates a new, empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// One CAS attempt at linking `node` as the new head.
    ///
    /// Returns the node back on contention so the caller decides how to
    /// back off.
    pub(super) fn try_push_node(&self, node: *mut Node<T>) -> Result<(), *mut Node<T>> {
        let head = self.head.load(Ordering::Relaxed);
        unsafe { (*node).next.store(head, Ordering::Relaxed) };
        self.head
            .compare_exchange(head, node, Ordering::Release, Ordering::Relaxed)
            .map(|_| ())
            .map_err(|_| node)
    }

    /// One CAS attempt at unlinking the head.
    ///
    /// `Ok(None)` means the stack was observed empty; `Err(())` means the
    /// CAS lost a race.
    pub(super) fn try_pop_node(&self, shield: &Shield<Node<T>>) -> Result<Option<T>, ()> {
        let head = shield.protect(&self.head);
        if head.is_null() {
            return Ok(None);
        }
        // The node is protected, so the plain field read cannot race a free.
        let next = unsafe { (*head).next.load(Ordering::Relaxed) };
        self.head
            .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ())?;

        // SAFETY: the successful CAS detached `head`; no other thread can
        // reach its data again, so reading it out by copy takes sole
        // ownership of the value.
        let data = unsafe { ptr::read(&(*head).data) };
        shield.clear();
        // SAFETY: `head` is unlinked and retired exactly once, here.
        unsafe { hazard::retire(head) };
        Ok(Some(ManuallyDrop::into_inner(data)))
    }

    /// Pushes a value on top of the stack.
    pub fn push(&self, value: T) {
        let mut node = Node::alloc(value);
        let backoff = Backoff::new();
        while let Err(n) = self.try_push_node(node) {
            node = n;
            backoff.spin();
        }
    }

    /// Pops the top element, or `None` if the stack is observed empty.
    pub fn pop(&self) -> Option<T> {
        let shield = Shield::new(&HAZARDS);
        let backoff = Backoff::new();
        loop {
            if let Ok(result) = self.try_pop_node(&shield) {
                return result;
            }
            backoff.spin();
        }
    }

    /// Returns `true` if the stack is observed empty.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }
}

impl<T> Drop for TreiberStack<T> {
    fn drop(&mut self) {
        // Drain without the hazard protocol: `&mut self` proves no
        // concurrent access.
        let mut curr = *self.head.get_mut();
        while !curr.is_null() {
            let mut node = unsafe { Box::from_raw(curr) };
            curr = *node.next.get_mut();
            unsafe { ManuallyDrop::drop(&mut node.data) };
        }
    }
}

impl<T: Send> Stack<T> for TreiberStack<T> {
    fn push(&self, value: T) {
        TreiberStack::push(self, value);
    }

    fn pop(&self) -> Option<T> {
        TreiberStack::pop(self)
    }

    fn is_empty(&self) -> bool {
        TreiberStack::is_empty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::TreiberStack;
    use std::thread::scope;

    #[test]
    fn push_pop_balanced() {
        let stack = TreiberStack::new();

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
