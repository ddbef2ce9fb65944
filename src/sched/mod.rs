//! The `ScheduleSystem` is the task-execution pool of this crate. Jobs are pushed into a
//! work-stealing queue and executed by a fixed number of worker threads.
//!
//! Every job which produces a value could be spawned with `spawn_task`, the value is then
//! delivered through a `TaskFuture`:
//!
//! ```rust
//! use rescache::sched::prelude::*;
//!
//! let sched = ScheduleSystem::new(SchedParams::default()).unwrap();
//! let future = sched.shared().spawn_task(|| Ok(1 + 1));
//! assert_eq!(future.get(), Ok(2));
//! ```
//!
//! Waiting on a future blocks the calling thread. When the calling thread is a worker of
//! the pool, it keeps executing other queued jobs until the future completes, so a job could
//! wait for another job even on a pool with a single worker.

pub mod future;
pub mod latch;
pub mod scheduler;

pub(crate) mod unwind;

pub mod prelude {
    pub use super::future::TaskFuture;
    pub use super::{SchedParams, ScheduleSystem, ScheduleSystemShared};
}

pub use self::scheduler::{wait_until, PanicHandler};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use self::future::TaskFuture;
use self::latch::LockLatch;
use self::scheduler::Scheduler;
use crate::errors::*;

/// Setup parameters of the `ScheduleSystem`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedParams {
    /// The number of worker threads. Zero makes the system headless, all the jobs will be
    /// executed on the spawning thread immediately.
    pub workers: u32,
    /// The stack size of worker threads, uses the platform default if `None`.
    pub stack_size: Option<usize>,
}

impl Default for SchedParams {
    fn default() -> Self {
        let workers = ::std::thread::available_parallelism()
            .map(|v| v.get() as u32)
            .unwrap_or(1);

        SchedParams {
            workers: workers.max(1),
            stack_size: None,
        }
    }
}

impl SchedParams {
    /// Parameters of a headless system.
    pub fn headless() -> Self {
        SchedParams {
            workers: 0,
            stack_size: None,
        }
    }
}

pub struct ScheduleSystem {
    shared: Arc<ScheduleSystemShared>,
}

impl ScheduleSystem {
    /// Creates a new `ScheduleSystem` and starts its worker threads.
    pub fn new(params: SchedParams) -> Result<Self> {
        ScheduleSystem::new_with(params, None)
    }

    /// Creates a new `ScheduleSystem` with a custom handler of panicked jobs.
    pub fn with_panic_handler<F>(params: SchedParams, handler: F) -> Result<Self>
    where
        F: Fn(Box<dyn ::std::any::Any + Send>) + Send + Sync + 'static,
    {
        ScheduleSystem::new_with(params, Some(Box::new(handler)))
    }

    /// Creates a headless `ScheduleSystem`.
    pub fn headless() -> Self {
        ScheduleSystem {
            shared: Arc::new(ScheduleSystemShared { scheduler: None }),
        }
    }

    fn new_with(params: SchedParams, panic_handler: Option<Box<PanicHandler>>) -> Result<Self> {
        if params.workers == 0 {
            info!("Setup headless schedule system.");
            return Ok(ScheduleSystem::headless());
        }

        let scheduler = Scheduler::new(params.workers, params.stack_size, panic_handler)?;
        info!(
            "Setup schedule system with {} worker threads.",
            params.workers
        );

        Ok(ScheduleSystem {
            shared: Arc::new(ScheduleSystemShared {
                scheduler: Some(scheduler),
            }),
        })
    }

    /// Returns the multi-thread friendly parts of `ScheduleSystem`.
    #[inline]
    pub fn shared(&self) -> Arc<ScheduleSystemShared> {
        self.shared.clone()
    }

    /// Blocks current thread until all the jobs have been executed, and then stops the
    /// worker threads. Jobs spawned afterwards are executed on the spawning thread.
    pub fn terminate(&self) {
        if let Some(ref scheduler) = self.shared.scheduler {
            if !scheduler.is_terminated() {
                scheduler.terminate();
                info!("Schedule system terminated.");
            }
        }
    }
}

impl Drop for ScheduleSystem {
    fn drop(&mut self) {
        self.terminate();
    }
}

pub struct ScheduleSystemShared {
    scheduler: Option<Arc<Scheduler>>,
}

impl ScheduleSystemShared {
    /// Gets the number of worker threads, zero if headless.
    #[inline]
    pub fn workers(&self) -> usize {
        self.scheduler.as_ref().map(|v| v.len()).unwrap_or(0)
    }

    /// Spawn an asynchronous job.
    pub fn spawn<F>(&self, func: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.scheduler {
            Some(ref scheduler) => {
                if let Err(func) = scheduler.spawn(func) {
                    warn!("Spawns job after the schedule system terminated.");
                    if let Err(err) = unwind::halt_unwinding(func) {
                        scheduler.handle_panic(err);
                    }
                }
            }
            None => func(),
        }
    }

    /// Spawn an asynchronous job which produces a value, returning a `TaskFuture` to the
    /// result immediately. Errors and panics of `func` are reported through the future.
    pub fn spawn_task<F, R>(&self, func: F) -> TaskFuture<R>
    where
        F: FnOnce() -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let latch = Arc::new(LockLatch::new());
        let tx = latch.clone();

        self.spawn(move || {
            let rsp = match unwind::halt_unwinding(func) {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(err)) => Err(TaskError::failed(err)),
                Err(payload) => {
                    warn!(
                        "Task panicked: {}",
                        unwind::panic_message(payload.as_ref())
                    );
                    Err(TaskError::Panicked)
                }
            };

            tx.set(rsp);
        });

        TaskFuture::from_latch(latch)
    }

    /// Blocks current thread until the task completes. Try to keep busy by popping and
    /// stealing jobs as necessary.
    #[inline]
    pub fn wait_until<T>(&self, future: &TaskFuture<T>) {
        future.wait();
    }
}
