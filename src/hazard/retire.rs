use core::sync::atomic::{fence, Ordering};

use super::bag::HazardBag;

/// Thread-local list of retired pointers.
pub struct Retirees<'s> {
    hazards: &'s HazardBag,
    /// Machine representation of each retired pointer, paired with the
    /// `free::<T>` instantiation for its pointee type.
    inner: Vec<(usize, unsafe fn(usize))>,
}

impl<'s> Retirees<'s> {
    /// Max length of the retired list before a retire triggers `collect`.
    const THRESHOLD: usize = 64;

    pub fn new(hazards: &'s HazardBag) -> Self {
        Self {
            hazards,
            inner: Vec::new(),
        }
    }

    /// Retires a pointer.
    ///
    /// # Safety
    ///
    /// See [`crate::hazard::retire`].
    pub unsafe fn retire<T>(&mut self, pointer: *mut T) {
        unsafe fn free<T>(data: usize) {
            drop(unsafe { Box::from_raw(data as *mut T) });
        }

        self.inner.push((pointer as usize, free::<T>));
        if self.inner.len() >= Self::THRESHOLD {
            self.collect();
        }
    }

    /// Frees the retired pointers that no shield currently protects.
    pub fn collect(&mut self) {
        fence(Ordering::SeqCst);
        let guarded = self.hazards.all_hazards();

        let mut kept = Vec::with_capacity(self.inner.len());
        for (data, free) in self.inner.drain(..) {
            if guarded.contains(&data) {
                kept.push((data, free));
            } else {
                // SAFETY: the pointer was unlinked when retired and no scan
                // found a hazard on it, so no reference can exist.
                unsafe { free(data) };
            }
        }
        self.inner = kept;
    }
}

impl Drop for Retirees<'_> {
    fn drop(&mut self) {
        // A production-grade registry would hand leftovers to a global list
        // for other threads to reclaim; here the exiting thread waits out
        // the shields still protecting its retired nodes.
        while !self.inner.is_empty() {
            self.collect();
            core::hint::spin_loop();
        }
    }
}
