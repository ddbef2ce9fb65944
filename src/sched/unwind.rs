use std::any::Any;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::thread;

/// Executes `func` and captures any panic, translating that panic into a
/// `Err` result.
pub fn halt_unwinding<F, R>(func: F) -> thread::Result<R>
where
    F: FnOnce() -> R,
{
    panic::catch_unwind(AssertUnwindSafe(func))
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(v) = payload.downcast_ref::<&'static str>() {
        v
    } else if let Some(v) = payload.downcast_ref::<String>() {
        v.as_str()
    } else {
        "Box<Any>"
    }
}

/// Aborts the process when dropped. Forget it once the guarded section has
/// completed without unwinding.
pub struct AbortIfPanic;

impl Drop for AbortIfPanic {
    fn drop(&mut self) {
        let _ = writeln!(&mut io::stderr(), "detected unexpected panic; aborting");
        process::abort();
    }
}
