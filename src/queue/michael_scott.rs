//! Michael-Scott lock-free queue.
//!
//! Michael and Scott. Simple, Fast, and Practical Non-Blocking and Blocking
//! Concurrent Queue Algorithms. PODC 1996.

use core::mem::MaybeUninit;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use crate::hazard::{self, Shield, HAZARDS};

use super::Queue;

struct Node<T> {
    /// `MaybeUninit` because the sentinel at the head never holds a value:
    /// the initial dummy starts uninitialized, and a dequeued node's
    /// successor has its value moved out as it becomes the new sentinel.
    data: MaybeUninit<T>,

    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn alloc(data: MaybeUninit<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            data,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// Michael-Scott queue.
///
/// A singly-linked list with a sentinel node at the front; `head` always
/// points at the sentinel and the first real element is `head.next`. `tail`
/// may lag behind the true last node by one link, and every operation that
/// notices the lag helps heal it — which is also why a node `tail` points at
/// is always reachable from `head`, making the tail shield in `enqueue`
/// sound.
#[derive(Debug)]
pub struct MsQueue<T> {
    head: CachePadded<AtomicPtr<Node<T>>>,
    tail: CachePadded<AtomicPtr<Node<T>>>,
}

unsafe impl<T: Send> Send for MsQueue<T> {}
unsafe impl<T: Send> Sync for MsQueue<T> {}

impl<T> Default for MsQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MsQueue<T> {
    /// Creates a new, empty queue.
    pub fn new() -> Self {
        let sentinel = Node::alloc(MaybeUninit::uninit());
        Self {
            head: CachePadded::new(AtomicPtr::new(sentinel)),
            tail: CachePadded::new(AtomicPtr::new(sentinel)),
        }
    }

    /// Adds a value to the back of the queue.
    ///
    /// Linearizes at the CAS that links the new node.
    pub fn enqueue(&self, value: T) {
        let node = Node::alloc(MaybeUninit::new(value));
        let shield = Shield::new(&HAZARDS);
        let backoff = Backoff::new();

        loop {
            let tail = shield.protect(&self.tail);
            let tail_ref = unsafe { &*tail };
            let next = tail_ref.next.load(Ordering::Acquire);

            // A non-null next means `tail` is stale: help move it forward
            // and retry.
            if !next.is_null() {
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
                backoff.spin();
                continue;
            }

            match tail_ref.next.compare_exchange(
                ptr::null_mut(),
                node,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    // Swing the tail to the new node; losing this race is
                    // fine, the winner already moved it.
                    let _ = self
                        .tail
                        .compare_exchange(tail, node, Ordering::Release, Ordering::Relaxed);
                    return;
                }
                Err(_) => backoff.spin(),
            }
        }
    }

    /// Removes the front element, or `None` if the queue is observed empty.
    ///
    /// Linearizes at the head CAS, or at the `next` load that observes null
    /// for the empty answer.
    pub fn dequeue(&self) -> Option<T> {
        let head_shield = Shield::new(&HAZARDS);
        let next_shield = Shield::new(&HAZARDS);
        let backoff = Backoff::new();

        loop {
            let head = head_shield.protect(&self.head);
            let next = unsafe { &*head }.next.load(Ordering::Acquire);

            // The sentinel with no successor: empty.
            if next.is_null() {
                return None;
            }

            // Protect `next`, then re-check that `head` has not moved. An
            // unmoved head means `next` is still its successor, hence still
            // reachable, hence the protection landed in time. (A node's
            // `next` never changes once set, so validating against `head`
            // is the only way to prove `next` is live.)
            next_shield.set(next);
            if self.head.load(Ordering::Acquire) != head {
                backoff.spin();
                continue;
            }

            let tail = self.tail.load(Ordering::Acquire);
            if head == tail {
                // Tail is falling behind; help before advancing head past it.
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
                continue;
            }

            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // SAFETY: `next` was linked by an enqueue with initialized
                // data, the successful CAS makes this thread the sole reader
                // of that data (`next` is the new sentinel), and the second
                // shield keeps the node alive across the read even if it is
                // dequeued and retired in the meantime.
                let value = unsafe { (*next).data.assume_init_read() };
                head_shield.clear();
                // SAFETY: the old sentinel is unlinked and retired exactly
                // once, here.
                unsafe { hazard::retire(head) };
                return Some(value);
            }
            backoff.spin();
        }
    }

    /// Returns `true` if the queue is observed empty.
    pub fn is_empty(&self) -> bool {
        let shield = Shield::new(&HAZARDS);
        let head = shield.protect(&self.head);
        unsafe { &*head }.next.load(Ordering::Acquire).is_null()
    }
}

impl<T> Drop for MsQueue<T> {
    fn drop(&mut self) {
        // Drain without the hazard protocol: `&mut self` proves no
        // concurrent access. The sentinel's data is uninitialized and must
        // not be dropped; every other node's data is live.
        let mut sentinel = unsafe { Box::from_raw(*self.head.get_mut()) };
        loop {
            let next = *sentinel.next.get_mut();
            if next.is_null() {
                break;
            }
            let mut node = unsafe { Box::from_raw(next) };
            unsafe { node.data.assume_init_drop() };
            sentinel = node;
        }
    }
}

impl<T: Send> Queue<T> for MsQueue<T> {
    fn enqueue(&self, value: T) {
        MsQueue::enqueue(self, value);
    }

    fn dequeue(&self) -> Option<T> {
        MsQueue::dequeue(self)
    }

    fn is_empty(&self) -> bool {
        MsQueue::is_empty(self)
    }
}
