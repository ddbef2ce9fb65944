use std::cell::{Cell, RefCell};
use std::iter;
use std::ptr;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_deque::{Injector, Steal, Stealer, Worker};

use super::latch::{CountLatch, LatchProbe, LatchWaitProbe, LockLatch};
use super::unwind::{self, AbortIfPanic};
use crate::errors::*;

/// The type for a panic handling closure. Note that this same closure
/// may be invoked multiple times in parallel.
pub type PanicHandler = dyn Fn(Box<dyn ::std::any::Any + Send>) + Send + Sync;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct Scheduler {
    terminator: CountLatch,
    terminated: AtomicBool,
    watcher: Watcher,
    threads: Vec<ThreadInfo>,
    injector: Injector<Job>,
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
    panic_handler: Option<Box<PanicHandler>>,
}

impl Scheduler {
    pub fn new(
        num: u32,
        stack_size: Option<usize>,
        panic_handler: Option<Box<PanicHandler>>,
    ) -> Result<Arc<Self>> {
        let mut workers = Vec::new();
        let mut threads = Vec::new();

        for _ in 0..num {
            let w = Worker::new_fifo();
            threads.push(ThreadInfo {
                stealer: w.stealer(),
                primed: LockLatch::new(),
            });
            workers.push(w);
        }

        let scheduler = Arc::new(Scheduler {
            terminator: CountLatch::new(),
            terminated: AtomicBool::new(false),
            watcher: Watcher(Mutex::new(()), Condvar::new()),
            threads,
            injector: Injector::new(),
            handles: Mutex::new(Vec::new()),
            panic_handler,
        });

        for (i, w) in workers.drain(..).enumerate() {
            let sc = scheduler.clone();
            let mut b = thread::Builder::new().name(format!("rescache-worker-{}", i));

            if let Some(stack_size) = stack_size {
                b = b.stack_size(stack_size);
            }

            match b.spawn(move || Scheduler::main_loop(sc, i, w)) {
                Ok(handle) => scheduler.handles.lock().unwrap().push(handle),
                Err(err) => {
                    scheduler.terminate();
                    return Err(err.into());
                }
            }
        }

        for v in &scheduler.threads {
            v.primed.wait();
        }

        Ok(scheduler)
    }

    /// Gets the number of worker threads.
    #[inline]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Checks if this scheduler has been asked to terminate.
    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Spawn an asynchronous job. Panics of the job are caught and forwarded to the
    /// panic handler.
    ///
    /// Returns the job back if this scheduler has finished terminating, no worker
    /// would ever run it.
    pub fn spawn<F>(self: &Arc<Self>, func: F) -> ::std::result::Result<(), F>
    where
        F: FnOnce() + Send + 'static,
    {
        // Ensure that scheduler cannot terminate until this job has executed. This
        // ref is decremented at the (*) below.
        if !self.terminator.try_increment() {
            return Err(func);
        }

        let sched = self.clone();
        let job: Job = Box::new(move || {
            if let Err(err) = unwind::halt_unwinding(func) {
                sched.handle_panic(err);
            }

            sched.terminator.set(); // (*) permit scheduler to terminate now
        });

        self.inject_or_push(job);
        Ok(())
    }

    /// Push a job into the local queue if we are running on a worker thread of this
    /// scheduler. Else, it will be injected from the outside and taken by whatever
    /// worker has nothing to do.
    fn inject_or_push(&self, job: Job) {
        match WorkerThread::current() {
            Some(ref w) if ptr::eq(w.scheduler.as_ref(), self) => w.worker.push(job),
            _ => self.injector.push(job),
        }

        self.watcher.notify_one();
    }

    /// Handles panic.
    pub fn handle_panic(&self, err: Box<dyn ::std::any::Any + Send>) {
        match self.panic_handler {
            Some(ref handler) => {
                // If the customizable panic handler itself panics, then we abort.
                let abort_guard = AbortIfPanic;
                handler(err);
                ::std::mem::forget(abort_guard);
            }
            None => {
                error!(
                    "Job panicked on {:?}: {}",
                    thread::current().name(),
                    unwind::panic_message(err.as_ref())
                );
            }
        }
    }

    /// Signals that the owner of this scheduler has been dropped. Blocks current
    /// thread until all the workers finished their jobs gracefully.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        self.terminator.set();
        self.watcher.notify_all();

        let current = thread::current().id();
        let handles: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }

            if handle.join().is_err() {
                warn!("Worker thread exits abnormally.");
            }
        }
    }

    fn main_loop(scheduler: Arc<Scheduler>, index: usize, worker: Worker<Job>) {
        let worker_thread = Rc::new(WorkerThread {
            scheduler,
            index,
            worker,
            rand: XorShift64Star::new(),
        });

        WorkerThread::set_current(worker_thread.clone());

        worker_thread.scheduler.threads[index].primed.set(());
        worker_thread.wait_until(&worker_thread.scheduler.terminator);

        WorkerThread::clear_current();
    }
}

/// Blocks current thread until latch is set. If current thread is a worker, it
/// keeps busy by popping and stealing jobs as necessary.
pub fn wait_until<L: LatchWaitProbe>(latch: &L) {
    match WorkerThread::current() {
        Some(w) => w.wait_until(latch),
        None => latch.wait(),
    }
}

struct Watcher(Mutex<()>, Condvar);

impl Watcher {
    #[inline]
    fn wait_timeout(&self, ms: u64) {
        let duration = Duration::from_millis(ms);
        let v = self.0.lock().unwrap();
        let _ = self.1.wait_timeout(v, duration);
    }

    #[inline]
    fn notify_one(&self) {
        self.1.notify_one()
    }

    #[inline]
    fn notify_all(&self) {
        self.1.notify_all()
    }
}

struct ThreadInfo {
    stealer: Stealer<Job>,
    primed: LockLatch<()>,
}

pub struct WorkerThread {
    scheduler: Arc<Scheduler>,
    index: usize,
    worker: Worker<Job>,
    rand: XorShift64Star,
}

thread_local! {
    static WORKER_THREAD_STATE: RefCell<Option<Rc<WorkerThread>>> = RefCell::new(None);
}

impl WorkerThread {
    /// Gets the `WorkerThread` for the current thread; returns None if this is not
    /// a worker thread.
    #[inline]
    pub fn current() -> Option<Rc<WorkerThread>> {
        WORKER_THREAD_STATE.with(|t| t.borrow().clone())
    }

    fn set_current(thread: Rc<WorkerThread>) {
        WORKER_THREAD_STATE.with(|t| {
            let mut t = t.borrow_mut();
            assert!(t.is_none());
            *t = Some(thread);
        });
    }

    fn clear_current() {
        WORKER_THREAD_STATE.with(|t| t.borrow_mut().take());
    }

    /// Runs queued jobs until the latch is set.
    pub fn wait_until<L: LatchProbe>(&self, latch: &L) {
        let mut ms = 1;

        while !latch.is_set() {
            if let Some(job) = self.find_work() {
                job();
                self.scheduler.watcher.notify_all();
                ms = 1;
            } else {
                self.scheduler.watcher.wait_timeout(ms);
                ms = (ms * 2).min(16);
            }
        }
    }

    fn find_work(&self) -> Option<Job> {
        self.worker.pop().or_else(|| {
            iter::repeat_with(|| {
                self.scheduler
                    .injector
                    .steal_batch_and_pop(&self.worker)
                    .or_else(|| self.steal())
            })
            .find(|s| !s.is_retry())
            .and_then(|s| s.success())
        })
    }

    /// Try to steal a single job from other workers.
    fn steal(&self) -> Steal<Job> {
        let num_threads = self.scheduler.threads.len();
        if num_threads <= 1 {
            return Steal::Empty;
        }

        let start = self.rand.next_usize(num_threads);
        (start..num_threads)
            .chain(0..start)
            .filter(|&i| i != self.index)
            .map(|i| self.scheduler.threads[i].stealer.steal())
            .collect()
    }
}

/// [xorshift*] is a fast pseudorandom number generator which will even tolerate
/// weak seeding, as long as it's not zero.
///
/// [xorshift*]: https://en.wikipedia.org/wiki/Xorshift#xorshift*
struct XorShift64Star {
    state: Cell<u64>,
}

impl XorShift64Star {
    fn new() -> Self {
        use crate::utils::hash;

        // Any non-zero seed will do -- this uses the hash of a global counter.
        let mut seed = 0;
        while seed == 0 {
            static COUNTER: AtomicUsize = AtomicUsize::new(0);
            seed = hash::hash64(&COUNTER.fetch_add(1, Ordering::Relaxed));
        }

        XorShift64Star {
            state: Cell::new(seed),
        }
    }

    fn next(&self) -> u64 {
        let mut x = self.state.get();
        debug_assert_ne!(x, 0);
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state.set(x);
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    /// Return a value from `0..n`.
    fn next_usize(&self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}
