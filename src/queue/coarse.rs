use std::collections::VecDeque;
use std::sync::Mutex;

use super::Queue;

/// Queue under a single exclusive lock.
///
/// Trivially linearizable; the test suites use it as the correctness oracle
/// for the lock-free variants.
#[derive(Debug)]
pub struct CoarseQueue<T> {
    data: Mutex<VecDeque<T>>,
}

impl<T> Default for CoarseQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CoarseQueue<T> {
    /// Creates a new, empty queue.
    pub fn new() -> Self {
        Self {
            data: Mutex::new(VecDeque::new()),
        }
    }

    /// Adds a value to the back of the queue.
    pub fn enqueue(&self, value: T) {
        self.data.lock().unwrap().push_back(value);
    }

    /// Removes the front element, or `None` if the queue is empty.
    pub fn dequeue(&self) -> Option<T> {
        self.data.lock().unwrap().pop_front()
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.data.lock().unwrap().is_empty()
    }

    /// Returns the number of elements in the queue.
    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }
}

impl<T: Send> Queue<T> for CoarseQueue<T> {
    fn enqueue(&self, value: T) {
        CoarseQueue::enqueue(self, value);
    }

    fn dequeue(&self) -> Option<T> {
        CoarseQueue::dequeue(self)
    }

    fn is_empty(&self) -> bool {
        CoarseQueue::is_empty(self)
    }
}
