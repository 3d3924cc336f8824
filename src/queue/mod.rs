//! Concurrent FIFO containers.

mod coarse;
mod flat_combining;
mod michael_scott;

pub use coarse::CoarseQueue;
pub use flat_combining::FcQueue;
pub use michael_scott::MsQueue;

/// Concurrent queue contract shared by every variant.
///
/// Lets tests and benchmark harnesses parametrize over implementations.
pub trait Queue<T>: Default + Send + Sync {
    /// Adds a value to the back of the queue.
    fn enqueue(&self, value: T);

    /// Removes the front element, or `None` if the queue is observed empty.
    fn dequeue(&self) -> Option<T>;

    /// Returns `true` if the queue is observed empty.
    fn is_empty(&self) -> bool;
}
