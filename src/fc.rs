//! Flat-combining publication machinery shared by the FC stack and queue.
//!
//! Each thread owns one [`Request`] record per container, registered once on
//! a lock-free publication list and found again through a thread-local map.
//! A caller publishes its operation by writing the operand and then
//! release-storing the op tag; whichever thread holds the container's data
//! mutex (the combiner) applies every published operation and clears the
//! tags. In this crate every caller runs the combiner loop itself, so after
//! its `combine` call returns, its own request has been served — either by
//! itself or by an earlier combiner, and the mutex acquisition synchronizes
//! both cases.

use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicU8, Ordering};
use std::cell::{RefCell, UnsafeCell};
use std::collections::HashMap;

/// No pending operation.
pub(crate) const OP_NONE: u8 = 0;
/// Pending insert (stack push / queue enqueue). Cannot fail.
pub(crate) const OP_INSERT: u8 = 1;
/// Pending remove (stack pop / queue dequeue). Fails on empty.
pub(crate) const OP_REMOVE: u8 = 2;

/// Source of process-unique publication-list ids.
///
/// Ids are never reused, so a thread-local registration for a dropped
/// container can never be confused with a live one.
static LIST_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// This thread's request per publication list, keyed by list id. The
    /// value is the request's address; the list's element type is fixed by
    /// the id, so the cast back is always to the registered type.
    static REGISTRATIONS: RefCell<HashMap<u64, usize>> = RefCell::new(HashMap::new());
}

/// One thread's operation record on a flat-combining container.
pub(crate) struct Request<T> {
    op: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
    success: AtomicBool,
    /// Immutable link to the next registered request, set before publication.
    next: *const Request<T>,
}

unsafe impl<T: Send> Send for Request<T> {}
unsafe impl<T: Send> Sync for Request<T> {}

impl<T> Request<T> {
    fn new() -> Self {
        Self {
            op: AtomicU8::new(OP_NONE),
            value: UnsafeCell::new(MaybeUninit::uninit()),
            success: AtomicBool::new(false),
            next: ptr::null(),
        }
    }

    /// Publishes an insert of `value`. Inserts always succeed, so the flag
    /// is pre-set.
    pub(crate) fn post_insert(&self, value: T) {
        unsafe { (*self.value.get()).write(value) };
        self.success.store(true, Ordering::Relaxed);
        self.op.store(OP_INSERT, Ordering::Release);
    }

    /// Publishes a remove.
    pub(crate) fn post_remove(&self) {
        self.success.store(false, Ordering::Relaxed);
        self.op.store(OP_REMOVE, Ordering::Release);
    }

    /// The operation the combiner sees as pending, if any.
    pub(crate) fn pending_op(&self) -> u8 {
        self.op.load(Ordering::Acquire)
    }

    /// Combiner side: takes a posted insert's operand and clears the tag.
    ///
    /// Must only be called once after `pending_op` returned [`OP_INSERT`];
    /// the acquire/release pair on the tag makes the operand visible and
    /// keeps owner and combiner accesses disjoint.
    pub(crate) fn take_insert(&self) -> T {
        let value = unsafe { (*self.value.get()).assume_init_read() };
        self.op.store(OP_NONE, Ordering::Release);
        value
    }

    /// Combiner side: answers a posted remove and clears the tag.
    pub(crate) fn fulfill_remove(&self, value: Option<T>) {
        if let Some(value) = value {
            unsafe { (*self.value.get()).write(value) };
            self.success.store(true, Ordering::Relaxed);
        }
        self.op.store(OP_NONE, Ordering::Release);
    }

    /// Owner side: reads back a completed remove's result.
    ///
    /// Must only be called after the caller's `combine` pass, which
    /// guarantees the tag is back to [`OP_NONE`].
    pub(crate) fn take_result(&self) -> Option<T> {
        if self.success.load(Ordering::Relaxed) {
            Some(unsafe { (*self.value.get()).assume_init_read() })
        } else {
            None
        }
    }
}

/// Grow-only list of every thread's [`Request`] for one container.
pub(crate) struct PublicationList<T> {
    head: AtomicPtr<Request<T>>,
    id: u64,
}

impl<T> PublicationList<T> {
    pub(crate) fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            id: LIST_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Returns the calling thread's request, registering one on first use.
    pub(crate) fn request(&self) -> &Request<T> {
        let registered = REGISTRATIONS.with(|map| map.borrow().get(&self.id).copied());
        let addr = match registered {
            Some(addr) => addr,
            None => {
                let addr = self.register();
                REGISTRATIONS.with(|map| map.borrow_mut().insert(self.id, addr));
                addr
            }
        };
        // SAFETY: the address was registered on this very list, so it is a
        // live `Request<T>` until the list (behind `&self`) is dropped.
        unsafe { &*(addr as *const Request<T>) }
    }

    fn register(&self) -> usize {
        let node = Box::into_raw(Box::new(Request::new()));
        loop {
            let head = self.head.load(Ordering::Relaxed);
            unsafe { (*node).next = head };
            if self
                .head
                .compare_exchange(head, node, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return node as usize;
            }
        }
    }

    /// Iterates over every registered request.
    ///
    /// Requests registered after the iterator reads `head` are missed, which
    /// is fine: their owners have not yet run their own combine pass.
    pub(crate) fn iter(&self) -> Requests<'_, T> {
        Requests {
            curr: self.head.load(Ordering::Acquire).cast_const(),
            _marker: PhantomData,
        }
    }
}

impl<T> core::fmt::Debug for PublicationList<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PublicationList")
            .field("id", &self.id)
            .finish()
    }
}

impl<T> Drop for PublicationList<T> {
    /// Frees every request. Sound because the container is dropped with
    /// `&mut`: no thread is mid-operation, and the list's id is never
    /// handed out again, so stale thread-local registrations stay dead.
    fn drop(&mut self) {
        let mut curr = *self.head.get_mut();
        while !curr.is_null() {
            let node = unsafe { Box::from_raw(curr) };
            curr = node.next.cast_mut();
        }
    }
}

pub(crate) struct Requests<'s, T> {
    curr: *const Request<T>,
    _marker: PhantomData<&'s PublicationList<T>>,
}

impl<'s, T> Iterator for Requests<'s, T> {
    type Item = &'s Request<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let request = unsafe { self.curr.as_ref() }?;
        self.curr = request.next;
        Some(request)
    }
}
