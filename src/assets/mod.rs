//! The `AssetManager` is a typed, asynchronous cache of assets. For every asset type, it
//! loads, memoizes and reloads assets identified by string keys.
//!
//! # Key
//!
//! Assets are identified by plain strings. A key may starts with a _protocol_, a namespace
//! token followed by a separator, like this:
//!
//! ```sh
//! "app:textures/crate.png"
//! ```
//!
//! The protocol is only used to evict every asset of a namespace at once with
//! `AssetManager::clear_protocol`, the manager never interprets the rest of a key. Keys that
//! contains the _embedded marker_ (`"embedded"` by default) refer to assets which are
//! registered in memory up front, loading them is a pure lookup.
//!
//! # Storage
//!
//! Every asset type has its own `AssetStorage`, which maps keys to the `TaskFuture`s of
//! pending or completed loads. The actual work, reading bytes from disk and decoding them, is
//! injected into the storage as a set of `StorageCallbacks` at registration time.
//!
//! Concurrent requests of the same key are collapsed into one load, every caller receives
//! the same future.
//!
//! # Handle
//!
//! A completed load produces an `AssetHandle`. Handles are reference-counted views of a shared
//! `AssetLink`, which holds the current key and the asset instance. Renaming an asset updates
//! the key of all the handles, deleting an asset empties all of them.
//!
//! # Blocking
//!
//! Loading with `LoadMode::Sync`, renaming, deleting and clearing a protocol block the calling
//! thread until the affected loads have completed. Use `LoadMode::Async` on latency sensitive
//! threads and poll the returned future instead.

pub mod handle;
pub mod manager;
pub mod storage;

pub mod prelude {
    pub use super::handle::{AssetHandle, AssetLink};
    pub use super::manager::AssetManager;
    pub use super::storage::{AssetStorage, StorageCallbacks};
    pub use super::{LoadFlags, LoadMode, ManagerParams};
}

use serde::{Deserialize, Serialize};

/// The key marker of assets that are registered in memory.
pub const EMBEDDED_MARKER: &str = "embedded";

/// Whether a load request blocks the calling thread until completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadMode {
    Sync,
    Async,
}

impl Default for LoadMode {
    fn default() -> Self {
        LoadMode::Sync
    }
}

/// Extra behaviours of a load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoadFlags {
    Standard,
    /// Loads the asset again if its previous load has completed.
    Reload,
}

impl Default for LoadFlags {
    fn default() -> Self {
        LoadFlags::Standard
    }
}

/// Setup parameters of the `AssetManager`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerParams {
    /// Keys containing this marker are looked up, never loaded.
    pub embedded_marker: String,
}

impl Default for ManagerParams {
    fn default() -> Self {
        ManagerParams {
            embedded_marker: EMBEDDED_MARKER.to_owned(),
        }
    }
}
