use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

/// We define various kinds of latches, which are all a primitive signaling
/// mechanism. A latch starts as false. Eventually someone sets it and it
/// becomes true. You can test if it has been set by calling `is_set()`.
pub trait LatchProbe {
    /// Test if the latch is set.
    fn is_set(&self) -> bool;
}

/// A latch that the current thread could block on.
pub trait LatchWaitProbe: LatchProbe {
    /// Blocks current thread until latch is set.
    fn wait(&self);
}

type Listener<T> = Box<dyn FnOnce(&T) + Send>;

struct LatchState<T> {
    value: Option<T>,
    listeners: Vec<Listener<T>>,
}

/// A Latch starts as empty and eventually holds a value. You can block until
/// the value arrives. The value stays inside the latch, so it could be
/// observed any number of times.
pub struct LockLatch<T> {
    m: Mutex<LatchState<T>>,
    v: Condvar,
}

impl<T> LockLatch<T> {
    #[inline]
    pub fn new() -> Self {
        LockLatch {
            m: Mutex::new(LatchState {
                value: None,
                listeners: Vec::new(),
            }),
            v: Condvar::new(),
        }
    }

    /// Stores the value and wakes up every thread that is blocked on this latch, then
    /// runs the listeners registered with `on_set`.
    pub fn set(&self, value: T) {
        let listeners = {
            let mut guard = self.m.lock().unwrap();
            guard.value = Some(value);
            mem::replace(&mut guard.listeners, Vec::new())
        };

        self.v.notify_all();

        if !listeners.is_empty() {
            let guard = self.m.lock().unwrap();
            if let Some(ref value) = guard.value {
                for listener in listeners {
                    listener(value);
                }
            }
        }
    }

    /// Runs `func` with the value once this latch is set, immediately if it has been set
    /// already. `func` runs on the thread which sets the latch, with this latch locked, so
    /// it must not touch this latch again.
    pub fn on_set<F>(&self, func: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        let mut guard = self.m.lock().unwrap();
        match guard.value {
            Some(ref value) => func(value),
            None => guard.listeners.push(Box::new(func)),
        }
    }

    /// Maps the value if the latch has been set.
    #[inline]
    pub fn peek<F, R>(&self, func: F) -> Option<R>
    where
        F: FnOnce(&T) -> R,
    {
        self.m.lock().unwrap().value.as_ref().map(func)
    }
}

impl<T> Default for LockLatch<T> {
    fn default() -> Self {
        LockLatch::new()
    }
}

impl<T> LatchProbe for LockLatch<T> {
    #[inline]
    fn is_set(&self) -> bool {
        self.m.lock().unwrap().value.is_some()
    }
}

impl<T> LatchWaitProbe for LockLatch<T> {
    fn wait(&self) {
        let mut guard = self.m.lock().unwrap();
        while guard.value.is_none() {
            guard = self.v.wait(guard).unwrap();
        }
    }
}

/// Counting latches track a counter. Unlike other latches, calling `set()` does
/// not necessarily make the latch be considered set; instead, it just decrements
/// the counter. The latch is only "set" once the counter reaches zero, and it
/// stays set forever.
#[derive(Debug)]
pub struct CountLatch {
    counter: AtomicUsize,
}

impl CountLatch {
    #[inline]
    pub fn new() -> CountLatch {
        CountLatch {
            counter: AtomicUsize::new(1),
        }
    }

    /// Increments the counter, unless the latch has been set already. Returns false
    /// in that case.
    pub fn try_increment(&self) -> bool {
        let mut count = self.counter.load(Ordering::SeqCst);
        loop {
            if count == 0 {
                return false;
            }

            match self.counter.compare_exchange_weak(
                count,
                count + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(v) => count = v,
            }
        }
    }

    #[inline]
    pub fn set(&self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for CountLatch {
    fn default() -> Self {
        CountLatch::new()
    }
}

impl LatchProbe for CountLatch {
    #[inline]
    fn is_set(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == 0
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn lock_latch() {
        let latch = Arc::new(LockLatch::new());
        assert!(!latch.is_set());
        assert_eq!(latch.peek(|v: &u32| *v), None);

        let tx = latch.clone();
        let t = thread::spawn(move || tx.set(42));

        latch.wait();
        assert!(latch.is_set());
        assert_eq!(latch.peek(|v| *v), Some(42));
        assert_eq!(latch.peek(|v| *v), Some(42));
        t.join().unwrap();
    }

    #[test]
    fn listeners() {
        let latch = LockLatch::new();
        let sum = Arc::new(AtomicUsize::new(0));

        let s = sum.clone();
        latch.on_set(move |v: &usize| {
            s.fetch_add(*v, Ordering::SeqCst);
        });
        assert_eq!(sum.load(Ordering::SeqCst), 0);

        latch.set(2);
        assert_eq!(sum.load(Ordering::SeqCst), 2);

        // Listeners registered after the value arrived run immediately.
        let s = sum.clone();
        latch.on_set(move |v: &usize| {
            s.fetch_add(*v * 10, Ordering::SeqCst);
        });
        assert_eq!(sum.load(Ordering::SeqCst), 22);
    }

    #[test]
    fn count_latch() {
        let latch = CountLatch::new();
        assert!(latch.try_increment());
        assert!(latch.try_increment());
        latch.set();
        latch.set();
        assert!(!latch.is_set());
        latch.set();
        assert!(latch.is_set());

        // Once set, it could never be incremented again.
        assert!(!latch.try_increment());
        assert!(latch.is_set());
    }
}
