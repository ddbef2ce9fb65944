//! The registry of `AssetStorage`s, one per asset type.

use std::any::{Any, TypeId};
use std::sync::{Arc, RwLock};

use super::handle::AssetHandle;
use super::storage::{AssetFuture, AssetStorage, StorageCallbacks};
use super::{LoadFlags, LoadMode, ManagerParams};
use crate::errors::*;
use crate::utils::hash::FastHashMap;

/// The operations that do not depend on the asset type.
trait ErasedStorage: Send + Sync {
    fn clear(&self);
    fn clear_protocol(&self, protocol: &str);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Send + Sync + 'static> ErasedStorage for AssetStorage<T> {
    fn clear(&self) {
        AssetStorage::clear(self);
    }

    fn clear_protocol(&self, protocol: &str) {
        AssetStorage::clear_protocol(self, protocol);
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// The `AssetManager` routes typed requests to the `AssetStorage` of that type, and applies
/// bulk operations to all of them.
///
/// Every asset type must be registered with `register_storage` before use, requesting an
/// unregistered type panics.
pub struct AssetManager {
    params: ManagerParams,
    storages: RwLock<FastHashMap<TypeId, Arc<dyn ErasedStorage>>>,
}

impl AssetManager {
    /// Creates a new and empty `AssetManager`.
    pub fn new(params: ManagerParams) -> Self {
        if params.embedded_marker.is_empty() {
            warn!("Embedded marker is empty, every key will be loaded.");
        }

        AssetManager {
            params,
            storages: RwLock::new(FastHashMap::default()),
        }
    }

    /// Gets the setup parameters.
    #[inline]
    pub fn params(&self) -> &ManagerParams {
        &self.params
    }

    /// Registers the storage of asset type `T`. If `T` has been registered already, the
    /// existing storage is kept and `callbacks` are dropped.
    pub fn register_storage<T>(&self, callbacks: StorageCallbacks<T>) -> Arc<AssetStorage<T>>
    where
        T: Send + Sync + 'static,
    {
        {
            let mut storages = self.storages.write().unwrap();
            let id = TypeId::of::<T>();

            if storages.contains_key(&id) {
                warn!(
                    "Storage of {} has been registered already.",
                    ::std::any::type_name::<T>()
                );
            } else {
                info!("Registers storage of {}.", ::std::any::type_name::<T>());
                storages.insert(id, Arc::new(AssetStorage::new(callbacks)));
            }
        }

        self.storage::<T>()
    }

    /// Checks if asset type `T` has been registered.
    #[inline]
    pub fn is_registered<T: Send + Sync + 'static>(&self) -> bool {
        self.storages
            .read()
            .unwrap()
            .contains_key(&TypeId::of::<T>())
    }

    /// Gets the storage of asset type `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` has not been registered.
    pub fn storage<T: Send + Sync + 'static>(&self) -> Arc<AssetStorage<T>> {
        let storage = self
            .storages
            .read()
            .unwrap()
            .get(&TypeId::of::<T>())
            .cloned()
            .unwrap_or_else(|| {
                panic!(
                    "Storage of {} has not been registered.",
                    ::std::any::type_name::<T>()
                )
            });

        match storage.into_any().downcast::<AssetStorage<T>>() {
            Ok(storage) => storage,
            Err(_) => unreachable!(),
        }
    }

    /// Loads the asset of `key`, or returns the pending or completed load of it. Keys with
    /// the embedded marker are looked up only, the empty future is returned if there is no
    /// such entry.
    ///
    /// With `LoadMode::Sync`, this blocks current thread until the load completes.
    pub fn load<T>(&self, key: &str, mode: LoadMode, flags: LoadFlags) -> AssetFuture<T>
    where
        T: Send + Sync + 'static,
    {
        let storage = self.storage::<T>();

        if self.is_embedded(key) {
            let future = storage.find(key);
            if mode == LoadMode::Sync {
                future.wait();
            }

            future
        } else {
            storage.load(key, mode, flags)
        }
    }

    /// Checks if `key` refers to an embedded asset. An empty marker matches nothing.
    pub fn is_embedded(&self, key: &str) -> bool {
        let marker = self.params.embedded_marker.as_str();
        !marker.is_empty() && key.contains(marker)
    }

    /// Loads the asset of `key` from `bytes`, or returns the pending or completed load of it.
    /// `flags` has no effect here.
    ///
    /// With `LoadMode::Sync`, this blocks current thread until the load completes.
    pub fn create_from_memory<T>(
        &self,
        key: &str,
        bytes: &[u8],
        mode: LoadMode,
        flags: LoadFlags,
    ) -> AssetFuture<T>
    where
        T: Send + Sync + 'static,
    {
        if flags == LoadFlags::Reload {
            debug!("Ignores reload flag of {} which is created from memory.", key);
        }

        let future = self.storage::<T>().load_from_memory(key, bytes);
        if mode == LoadMode::Sync {
            future.wait();
        }

        future
    }

    /// Returns the future of `key`, or the empty future if there is no such entry.
    #[inline]
    pub fn find_entry<T: Send + Sync + 'static>(&self, key: &str) -> AssetFuture<T> {
        self.storage::<T>().find(key)
    }

    /// Loads the asset of `key` from an existing instance, replacing the existing entry.
    #[inline]
    pub fn load_from_instance<T>(&self, key: &str, instance: Arc<T>) -> AssetFuture<T>
    where
        T: Send + Sync + 'static,
    {
        self.storage::<T>().load_from_instance(key, instance)
    }

    /// Renames an asset, see `AssetStorage::rename`. Blocks current thread until the load of
    /// `key` completes.
    #[inline]
    pub fn rename<T: Send + Sync + 'static>(&self, key: &str, new_key: &str) -> Result<()> {
        self.storage::<T>().rename(key, new_key)
    }

    /// Deletes an asset, see `AssetStorage::delete`. Blocks current thread until the load of
    /// `key` completes.
    #[inline]
    pub fn delete<T: Send + Sync + 'static>(&self, key: &str) -> Result<()> {
        self.storage::<T>().delete(key)
    }

    /// Invalidates an asset without touching its backing file. Blocks current thread until
    /// the load of `key` completes.
    #[inline]
    pub fn clear_entry<T: Send + Sync + 'static>(&self, key: &str) {
        self.storage::<T>().clear_entry(key)
    }

    /// Saves an asset with its current key.
    #[inline]
    pub fn save<T: Send + Sync + 'static>(&self, handle: &AssetHandle<T>) -> Result<()> {
        self.storage::<T>().save(handle)
    }

    /// Forgets all the entries of every storage.
    pub fn clear(&self) {
        for storage in self.snapshot() {
            storage.clear();
        }
    }

    /// Removes the entries whose key starts with `protocol` from every storage. Blocks
    /// current thread until the loads of those entries complete.
    pub fn clear_protocol(&self, protocol: &str) {
        for storage in self.snapshot() {
            storage.clear_protocol(protocol);
        }
    }

    /// Gets the number of entries of asset type `T`.
    #[inline]
    pub fn len<T: Send + Sync + 'static>(&self) -> usize {
        self.storage::<T>().len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn ErasedStorage>> {
        self.storages.read().unwrap().values().cloned().collect()
    }
}

impl Default for AssetManager {
    fn default() -> Self {
        AssetManager::new(ManagerParams::default())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sched::future::TaskFuture;

    struct Texture(u32);
    struct Mesh;

    #[test]
    fn register() {
        let manager = AssetManager::default();
        assert!(!manager.is_registered::<Texture>());

        let s1 = manager.register_storage(StorageCallbacks::<Texture>::new());
        let s2 = manager.register_storage(StorageCallbacks::<Texture>::new());
        assert!(Arc::ptr_eq(&s1, &s2));
        assert!(Arc::ptr_eq(&s1, &manager.storage::<Texture>()));
        assert!(manager.is_registered::<Texture>());
        assert!(!manager.is_registered::<Mesh>());
    }

    #[test]
    #[should_panic]
    fn unregistered() {
        let manager = AssetManager::default();
        let _ = manager.find_entry::<Mesh>("app:cube");
    }

    #[test]
    fn typed_routing() {
        let manager = AssetManager::default();
        manager.register_storage(
            StorageCallbacks::<Texture>::new().load_from_file(|key, _, _| {
                TaskFuture::ready(AssetHandle::new(key, Arc::new(Texture(1))))
            }),
        );
        manager.register_storage(StorageCallbacks::<Mesh>::new());

        let texture = manager.load::<Texture>("app:crate", LoadMode::Sync, LoadFlags::Standard);
        assert_eq!(texture.get().unwrap().asset().unwrap().0, 1);
        assert_eq!(manager.len::<Texture>(), 1);
        assert_eq!(manager.len::<Mesh>(), 0);
        assert!(!manager.find_entry::<Mesh>("app:crate").is_valid());
    }

    #[test]
    fn embedded_marker() {
        let loader = |key: &str, _: LoadMode, _: AssetHandle<Texture>| {
            TaskFuture::ready(AssetHandle::new(key, Arc::new(Texture(2))))
        };

        let manager = AssetManager::default();
        manager.register_storage(StorageCallbacks::new().load_from_file(loader));
        assert!(manager.is_embedded("embedded:white"));
        assert!(!manager.is_embedded("app:white"));

        let future =
            manager.load::<Texture>("embedded:white", LoadMode::Sync, LoadFlags::Standard);
        assert!(!future.is_valid());
        assert_eq!(manager.len::<Texture>(), 0);

        // An empty marker must not turn every key into a lookup.
        let manager = AssetManager::new(ManagerParams {
            embedded_marker: String::new(),
        });
        manager.register_storage(StorageCallbacks::new().load_from_file(loader));
        assert!(!manager.is_embedded("app:white"));

        let future =
            manager.load::<Texture>("app:white", LoadMode::Sync, LoadFlags::Standard);
        assert_eq!(future.get().unwrap().asset().unwrap().0, 2);
    }
}
