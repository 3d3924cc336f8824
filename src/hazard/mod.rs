//! Hazard pointers.
//!
//! Safe memory reclamation for the lock-free containers. A reader that must
//! dereference a shared node first publishes the node's address in a hazard
//! slot ([`Shield`]); a writer that unlinks a node hands it to [`retire`]
//! instead of freeing it, and the node is only freed once a scan of every
//! hazard slot proves no reader still advertises it.
//!
//! # Synchronization
//!
//! Suppose thread R wants to read node `b` and thread W wants to unlink and
//! free it:
//!
//! ```text
//! (R1) publish b in a hazard slot     | (W1) unlink b, retire b
//! (R2) validate b is still reachable; | (W2) scan the slots;
//!      if so, deref b                 |      free b if absent
//! (R3) clear the slot                 |
//! ```
//!
//! If `R3` happens before `W2`, `b` is freed only after all of R's accesses.
//! Otherwise either `R1` precedes `W2` (so `b` is kept) or `W1` precedes
//! `R2` (so validation fails and R never derefs). Release/acquire alone
//! cannot force one of those two orders to be visible — R may miss W's
//! unlink while W misses R's publication — so both sides also execute a
//! SeqCst fence: [`Shield::set`] after the publication store, and the scan
//! before its first slot load. The fences are totally ordered, which makes
//! one of the two messages arrive.
//!
//! # Example
//!
//! ```
//! use std::ptr;
//! use std::sync::atomic::{AtomicPtr, Ordering};
//! use concurrent_containers::hazard::{self, Shield, HAZARDS};
//!
//! let src = AtomicPtr::new(Box::into_raw(Box::new(1)));
//!
//! let shield = Shield::new(&HAZARDS);
//! let p = shield.protect(&src);
//! assert_eq!(unsafe { *p }, 1);
//!
//! // unlink, retire, and (not necessary) trigger reclamation by hand
//! src.store(ptr::null_mut(), Ordering::Relaxed);
//! unsafe { hazard::retire(p) };
//! drop(shield);
//! hazard::collect();
//! ```

use std::cell::RefCell;

mod bag;
mod retire;

pub use bag::{HazardBag, Shield, MAX_HAZARDS};
use retire::Retirees;

/// Global set of all hazard slots.
pub static HAZARDS: HazardBag = HazardBag::new();

thread_local! {
    /// This thread's list of retired pointers, each paired with the
    /// `free::<T>` instantiation that knows how to drop it.
    static RETIRED: RefCell<Retirees<'static>> = RefCell::new(Retirees::new(&HAZARDS));
}

/// Retires a pointer: defers its deletion until no shield protects it.
///
/// # Safety
///
/// `pointer` must come from `Box::into_raw`, must already be unreachable for
/// new readers (unlinked from every shared location), and must be retired
/// exactly once.
pub unsafe fn retire<T>(pointer: *mut T) {
    RETIRED.with(|retired| unsafe { retired.borrow_mut().retire(pointer) });
}

/// Frees the pointers retired by the current thread that no shield protects.
///
/// Runs automatically once the thread's retired list crosses a threshold;
/// calling it by hand is never required.
pub fn collect() {
    RETIRED.with(|retired| retired.borrow_mut().collect());
}
