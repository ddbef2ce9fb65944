//! Error vocabulary shared by the scheduler and the asset storages.

pub use failure::Error;

pub type Result<T> = ::std::result::Result<T, Error>;

/// The failure reported by a `TaskFuture`. It is cheap to clone, so a completed future could
/// hand out the same outcome to every caller that asks for it.
#[derive(Debug, Clone, PartialEq, Eq, Fail)]
pub enum TaskError {
    /// The future does not refer to any task, e.g. the result of a lookup that missed.
    #[fail(display = "The future is empty.")]
    Empty,
    /// The task finished with an error.
    #[fail(display = "{}", _0)]
    Failed(String),
    /// The task panicked before producing a result.
    #[fail(display = "The task panicked before producing a result.")]
    Panicked,
}

impl TaskError {
    #[inline]
    pub fn failed<T: ::std::fmt::Display>(err: T) -> Self {
        TaskError::Failed(err.to_string())
    }
}

pub type TaskResult<T> = ::std::result::Result<T, TaskError>;
