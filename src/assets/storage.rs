use std::fmt;
use std::sync::{Arc, Mutex};

use super::handle::AssetHandle;
use super::{LoadFlags, LoadMode};
use crate::errors::*;
use crate::sched::future::TaskFuture;
use crate::sched::latch::LockLatch;
use crate::sched::unwind;
use crate::utils::hash::FastHashMap;
use crate::utils::string::starts_with_ignore_case;

/// The future of a load request.
pub type AssetFuture<T> = TaskFuture<AssetHandle<T>>;

/// key, mode, previous handle
pub type LoadFromFile<T> =
    dyn Fn(&str, LoadMode, AssetHandle<T>) -> AssetFuture<T> + Send + Sync + 'static;
/// key, bytes
pub type LoadFromMemory<T> = dyn Fn(&str, &[u8]) -> AssetFuture<T> + Send + Sync + 'static;
/// key, instance
pub type LoadFromInstance<T> = dyn Fn(&str, Arc<T>) -> AssetFuture<T> + Send + Sync + 'static;
/// key, handle
pub type SaveToFile<T> = dyn Fn(&str, &AssetHandle<T>) -> Result<()> + Send + Sync + 'static;
/// key, new key
pub type RenameAssetFile = dyn Fn(&str, &str) -> Result<()> + Send + Sync + 'static;
/// key
pub type DeleteAssetFile = dyn Fn(&str) -> Result<()> + Send + Sync + 'static;

/// The pluggable operations of one asset type.
///
/// The load callbacks are invoked on the calling thread, after a pending entry of the key has
/// been inserted and the lock of storage released. They should dispatch the actual work into
/// the scheduler and return. Loading other keys of the same type from a callback is fine, but
/// waiting for the key being loaded never completes. A panicking callback fails its load.
///
/// Load callbacks that are not provided produce failed futures. Backing-store callbacks that
/// are not provided do nothing, which suits assets living in memory only.
pub struct StorageCallbacks<T> {
    load_from_file: Box<LoadFromFile<T>>,
    load_from_memory: Box<LoadFromMemory<T>>,
    load_from_instance: Box<LoadFromInstance<T>>,
    save_to_file: Box<SaveToFile<T>>,
    rename_asset_file: Box<RenameAssetFile>,
    delete_asset_file: Box<DeleteAssetFile>,
}

impl<T: Send + Sync + 'static> StorageCallbacks<T> {
    pub fn new() -> Self {
        StorageCallbacks {
            load_from_file: Box::new(|key: &str, _: LoadMode, _: AssetHandle<T>| {
                warn!("Loads {} without a registered file loader.", key);
                TaskFuture::failed(format!("Could not load {} from file.", key))
            }),
            load_from_memory: Box::new(|key: &str, _: &[u8]| {
                warn!("Loads {} without a registered memory loader.", key);
                TaskFuture::failed(format!("Could not load {} from memory.", key))
            }),
            load_from_instance: Box::new(|key: &str, _: Arc<T>| {
                warn!("Loads {} without a registered instance loader.", key);
                TaskFuture::failed(format!("Could not load {} from instance.", key))
            }),
            save_to_file: Box::new(|_: &str, _: &AssetHandle<T>| Ok(())),
            rename_asset_file: Box::new(|_: &str, _: &str| Ok(())),
            delete_asset_file: Box::new(|_: &str| Ok(())),
        }
    }

    pub fn load_from_file<F>(mut self, func: F) -> Self
    where
        F: Fn(&str, LoadMode, AssetHandle<T>) -> AssetFuture<T> + Send + Sync + 'static,
    {
        self.load_from_file = Box::new(func);
        self
    }

    pub fn load_from_memory<F>(mut self, func: F) -> Self
    where
        F: Fn(&str, &[u8]) -> AssetFuture<T> + Send + Sync + 'static,
    {
        self.load_from_memory = Box::new(func);
        self
    }

    pub fn load_from_instance<F>(mut self, func: F) -> Self
    where
        F: Fn(&str, Arc<T>) -> AssetFuture<T> + Send + Sync + 'static,
    {
        self.load_from_instance = Box::new(func);
        self
    }

    pub fn save_to_file<F>(mut self, func: F) -> Self
    where
        F: Fn(&str, &AssetHandle<T>) -> Result<()> + Send + Sync + 'static,
    {
        self.save_to_file = Box::new(func);
        self
    }

    pub fn rename_asset_file<F>(mut self, func: F) -> Self
    where
        F: Fn(&str, &str) -> Result<()> + Send + Sync + 'static,
    {
        self.rename_asset_file = Box::new(func);
        self
    }

    pub fn delete_asset_file<F>(mut self, func: F) -> Self
    where
        F: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        self.delete_asset_file = Box::new(func);
        self
    }
}

impl<T: Send + Sync + 'static> Default for StorageCallbacks<T> {
    fn default() -> Self {
        StorageCallbacks::new()
    }
}

/// The cache of one asset type, which maps keys to the futures of their loads.
///
/// There is at most one entry per key. Entries are only removed by `rename`, `delete`,
/// `clear_entry`, `clear` and `clear_protocol`, never when a load completes.
pub struct AssetStorage<T> {
    callbacks: StorageCallbacks<T>,
    requests: Mutex<FastHashMap<String, AssetFuture<T>>>,
}

impl<T: Send + Sync + 'static> AssetStorage<T> {
    pub fn new(callbacks: StorageCallbacks<T>) -> Self {
        AssetStorage {
            callbacks,
            requests: Mutex::new(FastHashMap::default()),
        }
    }

    /// Loads the asset of `key` with the file loader, or returns the pending or completed
    /// load of it.
    ///
    /// With `LoadFlags::Reload`, a completed load is dispatched again with its handle passed
    /// to the loader; a reload of pending load is ignored. With `LoadMode::Sync`, this blocks
    /// current thread until the load completes.
    pub fn load(&self, key: &str, mode: LoadMode, flags: LoadFlags) -> AssetFuture<T> {
        let (future, dispatch) = {
            let mut requests = self.requests.lock().unwrap();

            match requests.get_mut(key) {
                Some(future) if flags == LoadFlags::Reload && future.is_ready() => {
                    debug!("Reloads asset {}.", key);
                    let previous = future
                        .try_get()
                        .and_then(|rsp| rsp.ok())
                        .unwrap_or_default();

                    let (placeholder, latch) = placeholder();
                    *future = placeholder.clone();
                    (placeholder, Some((latch, previous)))
                }
                Some(future) => (future.clone(), None),
                None => {
                    debug!("Loads asset {}.", key);
                    let (placeholder, latch) = placeholder();
                    requests.insert(key.to_owned(), placeholder.clone());
                    (placeholder, Some((latch, AssetHandle::empty())))
                }
            }
        };

        if let Some((latch, previous)) = dispatch {
            dispatch_into(key, latch, || {
                (self.callbacks.load_from_file)(key, mode, previous)
            });
        }

        if mode == LoadMode::Sync {
            future.wait();
        }

        future
    }

    /// Loads the asset of `key` from `bytes`, or returns the pending or completed load of it.
    pub fn load_from_memory(&self, key: &str, bytes: &[u8]) -> AssetFuture<T> {
        let (future, latch) = {
            let mut requests = self.requests.lock().unwrap();

            if let Some(future) = requests.get(key) {
                return future.clone();
            }

            debug!("Loads asset {} from {} bytes.", key, bytes.len());
            let (placeholder, latch) = placeholder();
            requests.insert(key.to_owned(), placeholder.clone());
            (placeholder, latch)
        };

        dispatch_into(key, latch, || (self.callbacks.load_from_memory)(key, bytes));
        future
    }

    /// Loads the asset of `key` from an existing instance. Always dispatches a new load,
    /// replacing the existing entry of `key`.
    pub fn load_from_instance(&self, key: &str, instance: Arc<T>) -> AssetFuture<T> {
        let (future, latch) = placeholder();

        debug!("Loads asset {} from instance.", key);
        self.requests
            .lock()
            .unwrap()
            .insert(key.to_owned(), future.clone());

        dispatch_into(key, latch, || {
            (self.callbacks.load_from_instance)(key, instance)
        });

        future
    }

    /// Returns the future of `key`, or the empty future if there is no such entry.
    pub fn find(&self, key: &str) -> AssetFuture<T> {
        self.requests
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Saves the asset with its current key.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is empty.
    pub fn save(&self, handle: &AssetHandle<T>) -> Result<()> {
        assert!(!handle.is_empty(), "Saves an empty asset handle.");

        let key = handle.id();
        (self.callbacks.save_to_file)(&key, handle).map_err(|err| {
            warn!("Failed to save asset {}: {}", key, err);
            err
        })
    }

    /// Renames the backing file of `key`, then moves the entry to `new_key` and updates the
    /// key of its link in place. Blocks current thread until the load of `key` completes.
    ///
    /// Nothing is changed in memory if renaming the backing file failed.
    pub fn rename(&self, key: &str, new_key: &str) -> Result<()> {
        if let Err(err) = (self.callbacks.rename_asset_file)(key, new_key) {
            warn!("Failed to rename asset {} to {}: {}", key, new_key, err);
            return Err(err);
        }

        let future = self.find(key);
        if !future.is_valid() {
            return Ok(());
        }

        future.wait();
        self.move_entry(&future, key, new_key);
        Ok(())
    }

    /// Moves the entry of `key` to `new_key`, and renames the link of `waited`, which is the
    /// completed load of `key`.
    fn move_entry(&self, waited: &AssetFuture<T>, key: &str, new_key: &str) {
        let moved = {
            let mut requests = self.requests.lock().unwrap();
            if let Some(Ok(handle)) = waited.try_get() {
                handle.rename_link(new_key);
            }

            match requests.remove(key) {
                Some(current) => {
                    debug!("Renames asset {} to {}.", key, new_key);
                    if requests.insert(new_key.to_owned(), current.clone()).is_some() {
                        debug!("Replaces the existing entry of {}.", new_key);
                    }

                    current
                }
                None => return,
            }
        };

        // A reload dispatched in the meantime rebinds the link with the old key.
        if !moved.ptr_eq(waited) {
            moved.wait();

            let requests = self.requests.lock().unwrap();
            let matched = requests
                .get(new_key)
                .map(|current| current.ptr_eq(&moved))
                .unwrap_or(false);

            if matched {
                if let Some(Ok(handle)) = moved.try_get() {
                    handle.rename_link(new_key);
                }
            }
        }
    }

    /// Deletes the backing file of `key`, then invalidates the entry. Blocks current thread
    /// until the load of `key` completes.
    ///
    /// Nothing is changed in memory if deleting the backing file failed.
    pub fn delete(&self, key: &str) -> Result<()> {
        if let Err(err) = (self.callbacks.delete_asset_file)(key) {
            warn!("Failed to delete asset {}: {}", key, err);
            return Err(err);
        }

        self.clear_entry(key);
        Ok(())
    }

    /// Removes the entry of `key` and invalidates its link, so every handle to this asset
    /// observes an empty asset. Blocks current thread until the load of `key` completes.
    pub fn clear_entry(&self, key: &str) {
        let future = self.find(key);
        if !future.is_valid() {
            return;
        }

        future.wait();

        let mut requests = self.requests.lock().unwrap();
        if let Some(Ok(handle)) = future.try_get() {
            handle.invalidate();
        }

        let matched = requests
            .get(key)
            .map(|current| current.ptr_eq(&future))
            .unwrap_or(false);

        if matched {
            debug!("Clears asset {}.", key);
            requests.remove(key);
        }
    }

    /// Forgets all the entries. Pending loads are not cancelled, they complete into futures
    /// that could not be found anymore.
    pub fn clear(&self) {
        self.requests.lock().unwrap().clear();
    }

    /// Removes every entry whose key starts with `protocol`, compared case-insensitively.
    /// Blocks current thread until the loads of those entries complete.
    ///
    /// Only the entries that exist when this is called are visited.
    pub fn clear_protocol(&self, protocol: &str) {
        let snapshot: Vec<_> = self
            .requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| starts_with_ignore_case(k, protocol))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if snapshot.is_empty() {
            return;
        }

        debug!(
            "Clears {} assets with protocol {}.",
            snapshot.len(),
            protocol
        );

        for (key, future) in snapshot {
            future.wait();

            let mut requests = self.requests.lock().unwrap();
            let matched = requests
                .get(&key)
                .map(|current| current.ptr_eq(&future))
                .unwrap_or(false);

            if matched {
                requests.remove(&key);
            }
        }
    }

    /// Gets the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if there is an entry of `key`.
    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.requests.lock().unwrap().contains_key(key)
    }

    /// Gets the keys of all entries.
    pub fn keys(&self) -> Vec<String> {
        self.requests.lock().unwrap().keys().cloned().collect()
    }
}

fn placeholder<T>() -> (AssetFuture<T>, Arc<LockLatch<TaskResult<AssetHandle<T>>>>) {
    let latch = Arc::new(LockLatch::new());
    (TaskFuture::from_latch(latch.clone()), latch)
}

/// Invokes a load callback without the lock of storage held, and forwards the future it
/// returns into `latch`. A panicking callback fails the load.
fn dispatch_into<T, F>(key: &str, latch: Arc<LockLatch<TaskResult<AssetHandle<T>>>>, func: F)
where
    T: Send + Sync + 'static,
    F: FnOnce() -> AssetFuture<T>,
{
    match unwind::halt_unwinding(func) {
        Ok(future) => future.forward(latch),
        Err(payload) => {
            error!(
                "Loader of asset {} panicked: {}",
                key,
                unwind::panic_message(payload.as_ref())
            );
            latch.set(Err(TaskError::Panicked));
        }
    }
}

impl<T> fmt::Debug for AssetStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let requests = self.requests.lock().unwrap();
        f.debug_struct("AssetStorage")
            .field("requests", &requests.len())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counted(counter: Arc<AtomicUsize>) -> AssetStorage<String> {
        let callbacks = StorageCallbacks::new().load_from_file(move |key, _, previous| {
            counter.fetch_add(1, Ordering::SeqCst);
            let asset = Arc::new(format!("contents of {}", key));
            TaskFuture::ready(AssetHandle::rebind(&previous, key, asset))
        });

        AssetStorage::new(callbacks)
    }

    #[test]
    fn load_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let storage = counted(counter.clone());

        let f1 = storage.load("app:a", LoadMode::Sync, LoadFlags::Standard);
        let f2 = storage.load("app:a", LoadMode::Async, LoadFlags::Standard);
        assert!(f1.ptr_eq(&f2));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(storage.len(), 1);
        assert!(storage.contains("app:a"));

        let h1 = f1.get().unwrap();
        let h2 = f2.get().unwrap();
        assert!(h1.same_link(&h2));
        assert_eq!(*h1.asset().unwrap(), "contents of app:a");
    }

    #[test]
    fn reload_keeps_link() {
        let counter = Arc::new(AtomicUsize::new(0));
        let storage = counted(counter.clone());

        let f1 = storage.load("app:a", LoadMode::Sync, LoadFlags::Standard);
        let f2 = storage.load("app:a", LoadMode::Sync, LoadFlags::Reload);
        assert!(!f1.ptr_eq(&f2));
        assert!(storage.find("app:a").ptr_eq(&f2));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert!(f1.get().unwrap().same_link(&f2.get().unwrap()));
    }

    #[test]
    fn missing_loaders() {
        let storage = AssetStorage::<u32>::new(StorageCallbacks::default());
        let future = storage.load("app:a", LoadMode::Sync, LoadFlags::Standard);
        assert!(future.is_ready());
        assert!(future.get().is_err());

        // Failed loads still occupy their entries.
        assert!(storage.find("app:a").ptr_eq(&future));
        assert!(storage.load_from_memory("app:b", &[0, 1]).get().is_err());
        assert!(storage.load_from_instance("app:c", Arc::new(1)).get().is_err());
        assert_eq!(storage.len(), 3);
    }

    #[test]
    fn find_never_loads() {
        let counter = Arc::new(AtomicUsize::new(0));
        let storage = counted(counter.clone());

        let future = storage.find("app:a");
        assert!(!future.is_valid());
        assert!(storage.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_loader() {
        let storage = AssetStorage::new(StorageCallbacks::new().load_from_file(
            |key, _, _| {
                if key == "app:bad" {
                    panic!("corrupted header");
                }

                TaskFuture::ready(AssetHandle::new(key, Arc::new(1u32)))
            },
        ));

        let future = storage.load("app:bad", LoadMode::Sync, LoadFlags::Standard);
        assert_eq!(future.get().map(|_| ()), Err(TaskError::Panicked));

        // The storage is still usable.
        assert!(storage.find("app:bad").ptr_eq(&future));
        assert!(!storage.find("app:good").is_valid());
        let future = storage.load("app:good", LoadMode::Sync, LoadFlags::Standard);
        assert_eq!(*future.get().unwrap().asset().unwrap(), 1);
    }

    #[test]
    fn rename_during_reload() {
        let pending = Arc::new(Mutex::new(Vec::new()));
        let latches = pending.clone();
        let storage = AssetStorage::new(StorageCallbacks::new().load_from_file(
            move |_, _, previous| {
                let latch = Arc::new(LockLatch::new());
                latches.lock().unwrap().push((latch.clone(), previous));
                TaskFuture::from_latch(latch)
            },
        ));

        let f1 = storage.load("app:a", LoadMode::Async, LoadFlags::Standard);
        {
            let (latch, _) = pending.lock().unwrap().remove(0);
            latch.set(Ok(AssetHandle::new("app:a", Arc::new(1u32))));
        }

        // A reload sneaks in after the rename waited for the first load.
        let f2 = storage.load("app:a", LoadMode::Async, LoadFlags::Reload);
        let (latch, previous) = pending.lock().unwrap().remove(0);
        let t = ::std::thread::spawn(move || {
            ::std::thread::sleep(::std::time::Duration::from_millis(10));
            latch.set(Ok(AssetHandle::rebind(&previous, "app:a", Arc::new(2u32))));
        });

        storage.move_entry(&f1, "app:a", "app:b");
        t.join().unwrap();

        assert!(storage.find("app:b").ptr_eq(&f2));
        assert!(!storage.find("app:a").is_valid());

        let handle = f2.get().unwrap();
        assert!(handle.same_link(&f1.get().unwrap()));
        assert_eq!(handle.id(), "app:b");
        assert_eq!(*handle.asset().unwrap(), 2);
    }

    #[test]
    #[should_panic]
    fn save_empty_handle() {
        let storage = AssetStorage::<u32>::new(StorageCallbacks::default());
        let _ = storage.save(&AssetHandle::empty());
    }
}
