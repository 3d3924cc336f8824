use std::collections::VecDeque;
use std::sync::Mutex;

use crate::fc::{PublicationList, OP_INSERT, OP_REMOVE};

use super::Queue;

/// Flat-combining queue.
///
/// Threads publish their operations on a per-thread request record; whoever
/// holds the data mutex applies every published operation in one pass.
/// All requests served in a pass linearize in publication-list order at that
/// pass.
#[derive(Debug)]
pub struct FcQueue<T> {
    data: Mutex<VecDeque<T>>,
    requests: PublicationList<T>,
}

impl<T> Default for FcQueue<T> {
    fn default() -> Self {
        Self {
            data: Mutex::new(VecDeque::new()),
            requests: PublicationList::new(),
        }
    }
}

impl<T: Send> FcQueue<T> {
    /// Creates a new, empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value to the back of the queue.
    pub fn enqueue(&self, value: T) {
        let request = self.requests.request();
        request.post_insert(value);
        self.combine();
    }

    /// Removes the front element, or `None` if the queue was empty when the
    /// combiner served the request.
    pub fn dequeue(&self) -> Option<T> {
        let request = self.requests.request();
        request.post_remove();
        self.combine();
        request.take_result()
    }

    /// Returns `true` if the queue is observed empty.
    pub fn is_empty(&self) -> bool {
        self.data.lock().unwrap().is_empty()
    }

    /// Serves every published request, this thread's included.
    fn combine(&self) {
        let mut data = self.data.lock().unwrap();
        for request in self.requests.iter() {
            match request.pending_op() {
                OP_INSERT => data.push_back(request.take_insert()),
                OP_REMOVE => request.fulfill_remove(data.pop_front()),
                _ => {}
            }
        }
    }
}

impl<T: Send> Queue<T> for FcQueue<T> {
    fn enqueue(&self, value: T) {
        FcQueue::enqueue(self, value);
    }

    fn dequeue(&self) -> Option<T> {
        FcQueue::dequeue(self)
    }

    fn is_empty(&self) -> bool {
        FcQueue::is_empty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::FcQueue;
    use std::thread::scope;

    #[test]
    fn fifo_single_thread() {
        let q = FcQueue::new();
        q.enqueue(10);
        q.enqueue(20);
        q.enqueue(30);
        assert_eq!(q.dequeue(), Some(10));
        assert_eq!(q.dequeue(), Some(20));
        assert_eq!(q.dequeue(), Some(30));
        assert!(q.dequeue().is_none());
    }

    #[test]
    fn enqueue_dequeue_balanced() {
        let q = FcQueue::new();

        scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for i in 0..10_000 {
                        q.enqueue(i);
                        assert!(q.dequeue().is_some());
                    }
                });
            }
        });

        assert!(q.dequeue().is_none());
        assert!(q.is_empty());
    }
}
