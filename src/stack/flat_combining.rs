use std::sync::Mutex;

use crate::fc::{PublicationList, OP_INSERT, OP_REMOVE};

use super::Stack;

/// Flat-combining stack.
///
/// Threads publish their operations on a per-thread request record; whoever
/// holds the data mutex applies every published operation in one pass.
/// All requests served in a pass linearize in publication-list order at that
/// pass.
#[derive(Debug)]
pub struct FcStack<T> {
    data: Mutex<Vec<T>>,
    requests: PublicationList<T>,
}

impl<T> Default for FcStack<T> {
    fn default() -> Self {
        Self {
            data: Mutex::new(Vec::new()),
            requests: PublicationList::new(),
        }
    }
}

impl<T: Send> FcStack<T> {
    /// Creates a new, empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a value on top of the stack.
    pub fn push(&self, value: T) {
        let request = self.requests.request();
        request.post_insert(value);
        self.combine();
    }

    /// Pops the top element, or `None` if the stack was empty when the
    /// combiner served the request.
    pub fn pop(&self) -> Option<T> {
        let request = self.requests.request();
        request.post_remove();
        self.combine();
        request.take_result()
    }

    /// Returns `true` if the stack is observed empty.
    pub fn is_empty(&self) -> bool {
        self.data.lock().unwrap().is_empty()
    }

    /// Serves every published request, this thread's included.
    fn combine(&self) {
        let mut data = self.data.lock().unwrap();
        for request in self.requests.iter() {
            match request.pending_op() {
                OP_INSERT => data.push(request.take_insert()),
                OP_REMOVE => request.fulfill_remove(data.pop()),
                _ => {}
            }
        }
    }
}

impl<T: Send> Stack<T> for FcStack<T> {
    fn push(&self, value: T) {
        FcStack::push(self, value);
    }

    fn pop(&self) -> Option<T> {
        FcStack::pop(self)
    }

    fn is_empty(&self) -> bool {
        FcStack::is_empty(self)
    }
}
