use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, MutexGuard};

/// Condition variable whose plain [`wait`](SeqCondvar::wait) never returns
/// spuriously.
///
/// Every notification bumps a generation counter; a waiter blocks until the
/// generation it sampled on entry has moved. Spurious wakeups of the
/// underlying condition variable re-check the generation and go back to
/// sleep, so each `wait` return corresponds to a real notification.
///
/// As with any condition variable, notifications delivered while no thread
/// is waiting are not queued.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use std::thread;
/// use concurrent_containers::sync::SeqCondvar;
///
/// let shared = Arc::new((Mutex::new(false), SeqCondvar::new()));
///
/// let waiter = {
///     let shared = Arc::clone(&shared);
///     thread::spawn(move || {
///         let (lock, cv) = &*shared;
///         let guard = lock.lock().unwrap();
///         let guard = cv.wait_while(guard, |ready| !*ready);
///         assert!(*guard);
///     })
/// };
///
/// *shared.0.lock().unwrap() = true;
/// shared.1.notify_all();
/// waiter.join().unwrap();
/// ```
#[derive(Debug, Default)]
pub struct SeqCondvar {
    cv: Condvar,
    seq: AtomicUsize,
}

impl SeqCondvar {
    /// Creates a new condition variable.
    pub const fn new() -> Self {
        Self {
            cv: Condvar::new(),
            seq: AtomicUsize::new(0),
        }
    }

    /// Wakes up one blocked waiter.
    pub fn notify_one(&self) {
        self.seq.fetch_add(1, Ordering::Release);
        self.cv.notify_one();
    }

    /// Wakes up all blocked waiters.
    pub fn notify_all(&self) {
        self.seq.fetch_add(1, Ordering::Release);
        self.cv.notify_all();
    }

    /// Blocks until notified.
    ///
    /// Returns once the notification generation has advanced past the value
    /// sampled on entry; wakeups without a notification are invisible to
    /// the caller.
    pub fn wait<'a, T>(&self, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let seq = self.seq.load(Ordering::Acquire);
        self.cv
            .wait_while(guard, |_| self.seq.load(Ordering::Acquire) == seq)
            .unwrap()
    }

    /// Blocks until `condition` returns `false`.
    ///
    /// The condition runs under the lock on every wakeup, which already
    /// masks spurious wakeups; this delegates straight to the underlying
    /// condition variable.
    pub fn wait_while<'a, T, F>(&self, guard: MutexGuard<'a, T>, condition: F) -> MutexGuard<'a, T>
    where
        F: FnMut(&mut T) -> bool,
    {
        self.cv.wait_while(guard, condition).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::SeqCondvar;
    use std::sync::{Arc, Mutex};
    use std::thread;

    #[test]
    fn wait_while_sees_update() {
        let shared = Arc::new((Mutex::new(0), SeqCondvar::new()));

        let waiter = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let (lock, cv) = &*shared;
                let guard = lock.lock().unwrap();
                let guard = cv.wait_while(guard, |v| *v < 3);
                *guard
            })
        };

        for _ in 0..3 {
            let (lock, cv) = &*shared;
            *lock.lock().unwrap() += 1;
            cv.notify_all();
        }
        assert_eq!(waiter.join().unwrap(), 3);
    }
}
