//! # What is This?
//!
//! _rescache_ is a typed, asynchronous resource cache. For every resource type, it loads,
//! memoizes and reloads resources identified by string keys, collapses concurrent requests
//! of the same key into one load, and exposes both blocking and non-blocking access.
//!
//! It is the substrate which higher level resource systems (textures, meshes, scripts,
//! configs) build on. Reading bytes from a filesystem and decoding formats are injected as
//! callbacks, this crate only orchestrates when they run and what happens to their results.
//!
//! ```rust
//! use std::sync::Arc;
//! use rescache::prelude::*;
//!
//! struct Config(String);
//!
//! let system = ScheduleSystem::new(SchedParams::default()).unwrap();
//! let sched = system.shared();
//! let manager = AssetManager::default();
//!
//! manager.register_storage(StorageCallbacks::<Config>::new().load_from_file(
//!     move |key, _, previous| {
//!         let key = key.to_owned();
//!         sched.spawn_task(move || {
//!             let asset = Arc::new(Config(format!("contents of {}", key)));
//!             Ok(AssetHandle::rebind(&previous, key, asset))
//!         })
//!     },
//! ));
//!
//! let future = manager.load::<Config>("app:settings.json", LoadMode::Sync, LoadFlags::Standard);
//! let handle = future.get().unwrap();
//! assert_eq!(handle.id(), "app:settings.json");
//! assert_eq!(handle.asset().unwrap().0, "contents of app:settings.json");
//! ```
//!
//! # Modules
//!
//! - `sched`: the task-execution pool and `TaskFuture`.
//! - `assets`: the `AssetManager`, per-type `AssetStorage`s and `AssetHandle`s.

#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

pub mod errors;
pub mod utils;

pub mod assets;
pub mod sched;

pub mod prelude {
    pub use crate::assets::prelude::*;
    pub use crate::errors::{TaskError, TaskResult};
    pub use crate::sched::prelude::*;
}
