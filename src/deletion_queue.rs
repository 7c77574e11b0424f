// LIFO deletion queue
//
// Austin Shafer - 2024
use utils::log;

/// A queue of deferred teardown actions.
///
/// Every GPU-side object created during initialization registers a
/// closure here that destroys it. Replay walks the queue back to
/// front, so the object graph dies in exact reverse creation order.
/// That ordering is what satisfies hidden dependency edges (an image
/// view dying before the swapchain its image belongs to) without the
/// queue ever tracking them explicitly.
pub struct DeletionQueue {
    /// teardown actions in push order, replayed from the back
    dq_actions: Vec<Box<dyn FnOnce() + Send>>,
    /// Set once flush has run. The queue accepts nothing afterwards.
    dq_flushed: bool,
}

impl DeletionQueue {
    /// Creates an empty deletion queue
    pub fn new() -> Self {
        Self {
            dq_actions: Vec::new(),
            dq_flushed: false,
        }
    }

    /// Register a teardown action.
    ///
    /// Actions must be pushed in creation order of the objects they
    /// destroy. Pushing onto a flushed queue is a caller bug.
    pub fn push<F: FnOnce() + Send + 'static>(&mut self, action: F) {
        assert!(!self.dq_flushed, "DeletionQueue used after flush");
        self.dq_actions.push(Box::new(action));
    }

    /// The number of teardown actions currently registered.
    pub fn len(&self) -> usize {
        self.dq_actions.len()
    }

    /// Run every teardown action in reverse push order.
    ///
    /// Each action runs exactly once. Flushing an empty queue, or
    /// flushing a second time, does nothing.
    pub fn flush(&mut self) {
        self.dq_flushed = true;

        while let Some(action) = self.dq_actions.pop() {
            action();
        }
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        // If initialization bailed out partway through, this is where
        // whatever did get created is released.
        if !self.dq_flushed && !self.dq_actions.is_empty() {
            log::debug!("Unwinding {} teardown action(s)", self.dq_actions.len());
            self.flush();
        }
    }
}
