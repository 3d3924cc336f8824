use core::marker::PhantomData;
use core::ptr::{self, NonNull};
use core::sync::atomic::{fence, AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::collections::HashSet;
use std::fmt;
use std::process;

/// Upper bound on the number of hazard slots a bag will ever allocate.
///
/// Sized for 64 threads with two simultaneously-held shields each. The bound
/// is a design parameter, not a runtime condition: exceeding it aborts the
/// process.
pub const MAX_HAZARDS: usize = 128;

/// Global bag (multiset) of hazard pointers.
///
/// `head` and `HazardSlot::next` form a grow-only list of slots. Slots are
/// never unlinked; a dropped [`Shield`] deactivates its slot so a later
/// shield can recycle it.
#[derive(Debug)]
pub struct HazardBag {
    head: AtomicPtr<HazardSlot>,
    /// Number of slots ever allocated, checked against [`MAX_HAZARDS`].
    len: AtomicUsize,
}

/// See [`HazardBag`].
#[derive(Debug)]
struct HazardSlot {
    /// Whether this slot is owned by a `Shield`.
    active: AtomicBool,
    /// Machine representation of the protected pointer. 0 = none.
    hazard: AtomicUsize,
    /// Immutable pointer to the next slot in the bag.
    next: *const HazardSlot,
}

impl HazardSlot {
    fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            hazard: AtomicUsize::new(0),
            next: ptr::null(),
        }
    }
}

unsafe impl Send for HazardSlot {}
unsafe impl Sync for HazardSlot {}

impl HazardBag {
    /// Creates a new, empty hazard set.
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            len: AtomicUsize::new(0),
        }
    }

    /// Acquires a slot, either by recycling an inactive one or by allocating.
    ///
    /// Aborts the process when the allocation would exceed [`MAX_HAZARDS`].
    fn acquire_slot(&self) -> &HazardSlot {
        if let Some(slot) = self.try_acquire_inactive() {
            return slot;
        }

        if self.len.fetch_add(1, Ordering::Relaxed) >= MAX_HAZARDS {
            eprintln!("hazard slot limit ({MAX_HAZARDS}) exhausted");
            process::abort();
        }

        let slot = Box::into_raw(Box::new(HazardSlot::new()));
        loop {
            let head = self.head.load(Ordering::Relaxed);
            unsafe { (*slot).next = head };
            if self
                .head
                .compare_exchange(head, slot, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return unsafe { &*slot };
            }
        }
    }

    /// Finds an inactive slot and activates it.
    fn try_acquire_inactive(&self) -> Option<&HazardSlot> {
        let mut curr = self.head.load(Ordering::Acquire).cast_const();
        while let Some(slot) = unsafe { curr.as_ref() } {
            if slot
                .active
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Some(slot);
            }
            curr = slot.next;
        }
        None
    }

    /// Returns every address currently protected by some slot.
    ///
    /// The caller is responsible for the SeqCst fence that orders this scan
    /// against preceding unlinks (see the module docs).
    pub fn all_hazards(&self) -> HashSet<usize> {
        let mut hazards = HashSet::new();
        let mut curr = self.head.load(Ordering::Acquire).cast_const();
        while let Some(slot) = unsafe { curr.as_ref() } {
            let hazard = slot.hazard.load(Ordering::Acquire);
            if hazard != 0 {
                hazards.insert(hazard);
            }
            curr = slot.next;
        }
        hazards
    }
}

impl Default for HazardBag {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HazardBag {
    /// Frees every slot. Only safe because a bag is dropped after all
    /// shields into it are gone (`&mut self`).
    fn drop(&mut self) {
        let mut curr = *self.head.get_mut();
        while !curr.is_null() {
            let slot = unsafe { Box::from_raw(curr) };
            curr = slot.next.cast_mut();
        }
    }
}

/// RAII ownership of one hazard slot.
///
/// While a shield holds an address (via [`set`](Shield::set) or
/// [`protect`](Shield::protect)), no retired node at that address is freed.
/// Dropping the shield clears the slot and releases it for recycling.
pub struct Shield<T> {
    slot: NonNull<HazardSlot>,
    _marker: PhantomData<*const T>, // !Send + !Sync
}

impl<T> Shield<T> {
    /// Acquires a slot in `hazards`.
    pub fn new(hazards: &HazardBag) -> Self {
        Self {
            slot: hazards.acquire_slot().into(),
            _marker: PhantomData,
        }
    }

    fn slot(&self) -> &HazardSlot {
        unsafe { self.slot.as_ref() }
    }

    /// Publishes `pointer` in this shield's slot.
    ///
    /// The caller must still validate that `pointer` is reachable *after*
    /// this call before dereferencing it; [`try_protect`](Shield::try_protect)
    /// bundles the validation.
    pub fn set(&self, pointer: *mut T) {
        self.slot().hazard.store(pointer as usize, Ordering::Release);
        fence(Ordering::SeqCst);
    }

    /// Clears the slot.
    pub fn clear(&self) {
        self.slot().hazard.store(0, Ordering::Release);
    }

    /// Tries to protect `*pointer`: publishes it, then re-reads `src`.
    ///
    /// Returns `true` if `src` still holds `*pointer`, which proves the
    /// publication happened while the node was reachable. Otherwise updates
    /// `*pointer` to the latest value, clears the slot, and returns `false`.
    pub fn try_protect(&self, pointer: &mut *mut T, src: &AtomicPtr<T>) -> bool {
        self.set(*pointer);
        let current = src.load(Ordering::Acquire);
        if current == *pointer {
            true
        } else {
            *pointer = current;
            self.clear();
            false
        }
    }

    /// Returns a protected pointer loaded from `src`.
    pub fn protect(&self, src: &AtomicPtr<T>) -> *mut T {
        let mut pointer = src.load(Ordering::Relaxed);
        while !self.try_protect(&mut pointer, src) {
            core::hint::spin_loop();
        }
        pointer
    }
}

impl<T> Default for Shield<T> {
    fn default() -> Self {
        Self::new(&super::HAZARDS)
    }
}

impl<T> Drop for Shield<T> {
    /// Clears and releases the slot.
    fn drop(&mut self) {
        let slot = self.slot();
        slot.hazard.store(0, Ordering::Release);
        slot.active.store(false, Ordering::Release);
    }
}

impl<T> fmt::Debug for Shield<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shield")
            .field("slot", &self.slot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{HazardBag, Shield};
    use std::collections::HashSet;
    use std::mem;
    use std::ops::Range;
    use std::sync::atomic::AtomicPtr;
    use std::sync::Arc;
    use std::thread;

    const THREADS: usize = 4;
    const VALUES: Range<usize> = 1..16;

    // `all_hazards` must contain the addresses still held by live shields.
    #[test]
    fn all_hazards_protected() {
        let hazards = Arc::new(HazardBag::new());
        let handles = (0..THREADS)
            .map(|_| {
                let hazards = Arc::clone(&hazards);
                thread::spawn(move || {
                    for data in VALUES {
                        let src = AtomicPtr::new(data as *mut ());
                        let shield = Shield::new(&hazards);
                        shield.protect(&src);
                        // keep the slot active and protecting
                        mem::forget(shield);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
        let all = hazards.all_hazards();
        let values = VALUES.collect();
        assert!(all.is_superset(&values));
    }

    // ... and must not contain addresses whose shields were dropped.
    #[test]
    fn all_hazards_unprotected() {
        let hazards = Arc::new(HazardBag::new());
        let handles = (0..THREADS)
            .map(|_| {
                let hazards = Arc::clone(&hazards);
                thread::spawn(move || {
                    for data in VALUES {
                        let src = AtomicPtr::new(data as *mut ());
                        let shield = Shield::new(&hazards);
                        shield.protect(&src);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }
        let all = hazards.all_hazards();
        let values = VALUES.collect();
        assert_eq!(all.intersection(&values).count(), 0);
    }

    // Dropped shields leave slots behind for later shields to recycle.
    #[test]
    fn recycle_slots() {
        let hazards = HazardBag::new();
        let shields = (0..64)
            .map(|_| Shield::<()>::new(&hazards))
            .collect::<Vec<_>>();
        let old_slots = shields
            .iter()
            .map(|s| s.slot.as_ptr() as usize)
            .collect::<HashSet<_>>();
        drop(shields);

        let shields = (0..32)
            .map(|_| Shield::<()>::new(&hazards))
            .collect::<Vec<_>>();
        let new_slots = shields
            .iter()
            .map(|s| s.slot.as_ptr() as usize)
            .collect::<HashSet<_>>();

        // no new slots should have been allocated
        assert!(new_slots.is_subset(&old_slots));
    }
}
