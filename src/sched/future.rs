//! A handle to the eventual result of a job dispatched into the scheduler.

use std::fmt;
use std::sync::Arc;

use super::latch::{LatchProbe, LockLatch};
use crate::errors::{TaskError, TaskResult};

/// A shared handle to the result of an asynchronous task.
///
/// Cloning a `TaskFuture` does not clone the task, every copy observes the same result. The
/// default value is the _empty_ future, which does not refer to any task at all; it could be
/// told apart from a pending task with `is_valid`.
pub struct TaskFuture<T> {
    latch: Option<Arc<LockLatch<TaskResult<T>>>>,
}

impl<T> TaskFuture<T> {
    /// Creates the empty future.
    #[inline]
    pub fn empty() -> Self {
        TaskFuture { latch: None }
    }

    /// Creates a future that is fulfilled by whoever sets `latch`.
    #[inline]
    pub fn from_latch(latch: Arc<LockLatch<TaskResult<T>>>) -> Self {
        TaskFuture { latch: Some(latch) }
    }

    /// Creates a future that is already completed with `value`.
    pub fn ready(value: T) -> Self {
        let latch = LockLatch::new();
        latch.set(Ok(value));
        TaskFuture::from_latch(Arc::new(latch))
    }

    /// Creates a future that is already completed with a failure.
    pub fn failed<E: fmt::Display>(err: E) -> Self {
        let latch = LockLatch::new();
        latch.set(Err(TaskError::failed(err)));
        TaskFuture::from_latch(Arc::new(latch))
    }

    /// Returns false if this is the empty future.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.latch.is_some()
    }

    /// Checks if the task has completed, without blocking. The empty future is never ready.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.latch.as_ref().map(|v| v.is_set()).unwrap_or(false)
    }

    /// Blocks current thread until the task completes. Returns immediately for the empty
    /// future.
    ///
    /// It's safe to call this on a worker thread of the scheduler which runs the task, the
    /// worker keeps executing queued jobs while waiting.
    #[inline]
    pub fn wait(&self) {
        if let Some(ref latch) = self.latch {
            super::wait_until(latch.as_ref());
        }
    }

    /// Returns true if both futures refer to the same task.
    #[inline]
    pub fn ptr_eq(&self, rhs: &Self) -> bool {
        match (&self.latch, &rhs.latch) {
            (Some(lhs), Some(rhs)) => Arc::ptr_eq(lhs, rhs),
            _ => false,
        }
    }
}

impl<T: Clone> TaskFuture<T> {
    /// Returns the result if the task has completed, without blocking.
    pub fn try_get(&self) -> Option<TaskResult<T>> {
        match self.latch {
            Some(ref latch) => latch.peek(Clone::clone),
            None => Some(Err(TaskError::Empty)),
        }
    }

    /// Blocks current thread until the task completes, and returns a copy of its result.
    /// Could be called any number of times.
    pub fn get(&self) -> TaskResult<T> {
        self.wait();
        self.try_get().unwrap_or(Err(TaskError::Empty))
    }
}

impl<T: Clone + Send + 'static> TaskFuture<T> {
    /// Sets `latch` with the result of this task once it completes, without blocking. The
    /// empty future sets it with `TaskError::Empty` immediately.
    pub fn forward(&self, latch: Arc<LockLatch<TaskResult<T>>>) {
        match self.latch {
            Some(ref inner) => inner.on_set(move |rsp| latch.set(rsp.clone())),
            None => latch.set(Err(TaskError::Empty)),
        }
    }
}

impl<T> Clone for TaskFuture<T> {
    fn clone(&self) -> Self {
        TaskFuture {
            latch: self.latch.clone(),
        }
    }
}

impl<T> Default for TaskFuture<T> {
    fn default() -> Self {
        TaskFuture::empty()
    }
}

impl<T> fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = if !self.is_valid() {
            "Empty"
        } else if self.is_ready() {
            "Ready"
        } else {
            "NotReady"
        };

        write!(f, "TaskFuture({})", state)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty() {
        let future = TaskFuture::<u32>::default();
        assert!(!future.is_valid());
        assert!(!future.is_ready());
        future.wait();
        assert_eq!(future.get(), Err(TaskError::Empty));
        assert!(!future.ptr_eq(&TaskFuture::empty()));
    }

    #[test]
    fn ready() {
        let future = TaskFuture::ready(7u32);
        assert!(future.is_valid());
        assert!(future.is_ready());
        assert_eq!(future.get(), Ok(7));
        assert_eq!(future.get(), Ok(7));

        let cloned = future.clone();
        assert!(cloned.ptr_eq(&future));
        assert!(!cloned.ptr_eq(&TaskFuture::ready(7)));
    }

    #[test]
    fn failed() {
        let future = TaskFuture::<u32>::failed("file not found");
        assert!(future.is_ready());
        assert_eq!(
            future.get(),
            Err(TaskError::Failed("file not found".to_owned()))
        );
    }

    #[test]
    fn pending() {
        let latch = Arc::new(LockLatch::new());
        let future = TaskFuture::from_latch(latch.clone());
        assert!(future.is_valid());
        assert!(!future.is_ready());
        assert!(future.try_get().is_none());

        latch.set(Ok(1u32));
        assert!(future.is_ready());
        assert_eq!(future.try_get(), Some(Ok(1)));
    }

    #[test]
    fn forward() {
        let inner = Arc::new(LockLatch::new());
        let source = TaskFuture::from_latch(inner.clone());

        let outer = Arc::new(LockLatch::new());
        let target = TaskFuture::from_latch(outer.clone());
        source.forward(outer);
        assert!(!target.is_ready());

        inner.set(Ok("done".to_owned()));
        assert_eq!(target.get(), Ok("done".to_owned()));

        // Completed and empty futures forward at once.
        let latch = Arc::new(LockLatch::new());
        TaskFuture::<u32>::failed("broken").forward(latch.clone());
        assert_eq!(
            TaskFuture::from_latch(latch).try_get(),
            Some(Err(TaskError::Failed("broken".to_owned())))
        );

        let latch = Arc::new(LockLatch::new());
        TaskFuture::<u32>::empty().forward(latch.clone());
        assert_eq!(
            TaskFuture::from_latch(latch).try_get(),
            Some(Err(TaskError::Empty))
        );
    }
}
