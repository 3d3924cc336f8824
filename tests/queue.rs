use std::thread;

use concurrent_containers::queue::{CoarseQueue, FcQueue, MsQueue, Queue};

fn empty_dequeue<Q: Queue<i32>>() {
    let queue = Q::default();
    assert!(queue.dequeue().is_none());
    assert!(queue.is_empty());
}

fn fifo_order<Q: Queue<i32>>() {
    let queue = Q::default();
    queue.enqueue(10);
    queue.enqueue(20);
    queue.enqueue(30);
    assert_eq!(queue.dequeue(), Some(10));
    assert_eq!(queue.dequeue(), Some(20));
    assert_eq!(queue.dequeue(), Some(30));
    assert!(queue.dequeue().is_none());
}

/// Multiple producers with disjoint monotone ranges, one consumer.
///
/// The consumer must see every value exactly once, and each producer's
/// values in insertion order (cross-producer order is unconstrained).
fn mpsc<Q: Queue<usize>>() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 25_000;
    const TOTAL: usize = PRODUCERS * PER_PRODUCER;

    let queue = Q::default();
    let mut received = Vec::with_capacity(TOTAL);

    thread::scope(|s| {
        for id in 0..PRODUCERS {
            let queue = &queue;
            s.spawn(move || {
                for i in 0..PER_PRODUCER {
                    queue.enqueue(id * PER_PRODUCER + i);
                }
            });
        }

        let queue = &queue;
        let received = &mut received;
        s.spawn(move || {
            while received.len() < TOTAL {
                match queue.dequeue() {
                    Some(value) => received.push(value),
                    None => thread::yield_now(),
                }
            }
        });
    });

    assert!(queue.is_empty());

    // per-producer subsequences arrive in insertion order
    let mut last = [None::<usize>; PRODUCERS];
    for &value in &received {
        let producer = value / PER_PRODUCER;
        assert!(last[producer] < Some(value));
        last[producer] = Some(value);
    }

    received.sort_unstable();
    assert_eq!(received, (0..TOTAL).collect::<Vec<_>>());
}

#[test]
fn coarse_empty_dequeue() {
    empty_dequeue::<CoarseQueue<i32>>();
}

#[test]
fn coarse_fifo_order() {
    fifo_order::<CoarseQueue<i32>>();
}

#[test]
fn coarse_mpsc() {
    mpsc::<CoarseQueue<usize>>();
}

#[test]
fn ms_empty_dequeue() {
    empty_dequeue::<MsQueue<i32>>();
}

#[test]
fn ms_fifo_order() {
    fifo_order::<MsQueue<i32>>();
}

#[test]
fn ms_mpsc() {
    mpsc::<MsQueue<usize>>();
}

#[test]
fn fc_empty_dequeue() {
    empty_dequeue::<FcQueue<i32>>();
}

#[test]
fn fc_fifo_order() {
    fifo_order::<FcQueue<i32>>();
}

#[test]
fn fc_mpsc() {
    mpsc::<FcQueue<usize>>();
}
