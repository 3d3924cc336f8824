use std::sync::{Arc, Mutex};
use std::thread;

use concurrent_containers::sync::SeqCondvar;

/// One waiter, N notifications, exactly N returns from `wait`.
///
/// Deterministic: the waiter bumps the shared counter under the lock and
/// only releases the lock by entering the next `wait`, so whenever the
/// notifier holds the lock and reads counter `k`, the waiter is parked in
/// wait number `k + 1`.
#[test]
fn notify_one_wakes_exactly_once_each() {
    const ROUNDS: usize = 10;

    let shared = Arc::new((Mutex::new(0usize), SeqCondvar::new()));

    let waiter = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            let (lock, cv) = &*shared;
            let mut guard = lock.lock().unwrap();
            *guard += 1; // registered and about to park
            for _ in 0..ROUNDS {
                guard = cv.wait(guard);
                *guard += 1;
            }
            *guard
        })
    };

    let (lock, cv) = &*shared;
    for round in 1..=ROUNDS {
        loop {
            let guard = lock.lock().unwrap();
            if *guard == round {
                // The waiter is parked; this notification cannot be missed.
                cv.notify_one();
                break;
            }
            drop(guard);
            thread::yield_now();
        }
    }

    // 1 registration bump + exactly one bump per notification
    assert_eq!(waiter.join().unwrap(), ROUNDS + 1);
}

/// W waiters, N broadcasts, exactly N returns from `wait` per waiter.
///
/// Same determinism argument as above, per waiter: wake counters only move
/// under the lock, and a waiter's only way to release the lock after its
/// k-th bump is parking in wait k + 1.
#[test]
fn notify_all_wakes_every_waiter_each_round() {
    const WAITERS: usize = 3;
    const ROUNDS: usize = 5;

    let shared = Arc::new((Mutex::new([0usize; WAITERS]), SeqCondvar::new()));

    let handles = (0..WAITERS)
        .map(|i| {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let (lock, cv) = &*shared;
                let mut guard = lock.lock().unwrap();
                guard[i] += 1; // registered and about to park
                for _ in 0..ROUNDS {
                    guard = cv.wait(guard);
                    guard[i] += 1;
                }
                guard[i]
            })
        })
        .collect::<Vec<_>>();

    let (lock, cv) = &*shared;
    for round in 1..=ROUNDS {
        loop {
            let guard = lock.lock().unwrap();
            if guard.iter().all(|&count| count == round) {
                cv.notify_all();
                break;
            }
            drop(guard);
            thread::yield_now();
        }
    }

    for handle in handles {
        // 1 registration bump + exactly one bump per broadcast
        assert_eq!(handle.join().unwrap(), ROUNDS + 1);
    }
}

/// The predicate form runs its condition under the lock and returns only
/// once the condition clears.
#[test]
fn wait_while_observes_predicate() {
    let shared = Arc::new((Mutex::new(false), SeqCondvar::new()));

    let waiter = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            let (lock, cv) = &*shared;
            let guard = lock.lock().unwrap();
            let guard = cv.wait_while(guard, |ready| !*ready);
            *guard
        })
    };

    let (lock, cv) = &*shared;
    *lock.lock().unwrap() = true;
    cv.notify_all();

    assert!(waiter.join().unwrap());
}
