use std::fmt;
use std::sync::{Arc, RwLock};

/// The shared state of one logical asset: its current key and the asset instance.
///
/// Every `AssetHandle` to the same asset refers to one `AssetLink`, so they always observe
/// the same key and instance. Once invalidated, the key is empty and the instance is gone.
pub struct AssetLink<T> {
    state: RwLock<LinkState<T>>,
}

struct LinkState<T> {
    id: String,
    asset: Option<Arc<T>>,
}

impl<T> AssetLink<T> {
    fn new(id: String, asset: Arc<T>) -> Self {
        AssetLink {
            state: RwLock::new(LinkState {
                id,
                asset: Some(asset),
            }),
        }
    }

    /// Gets the current key.
    #[inline]
    pub fn id(&self) -> String {
        self.state.read().unwrap().id.clone()
    }

    /// Gets the asset instance, returns `None` if the link has been invalidated.
    #[inline]
    pub fn asset(&self) -> Option<Arc<T>> {
        self.state.read().unwrap().asset.clone()
    }

    /// Checks if the asset instance is still alive.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.state.read().unwrap().asset.is_some()
    }
}

/// A shared reference to an `AssetLink`. Cloning a handle shares the link, it never
/// duplicates the asset.
///
/// The default handle is _empty_, it does not refer to any link.
pub struct AssetHandle<T> {
    link: Option<Arc<AssetLink<T>>>,
}

impl<T> AssetHandle<T> {
    /// Creates a handle with a new link.
    pub fn new<S: Into<String>>(id: S, asset: Arc<T>) -> Self {
        AssetHandle {
            link: Some(Arc::new(AssetLink::new(id.into(), asset))),
        }
    }

    /// Creates the empty handle.
    #[inline]
    pub fn empty() -> Self {
        AssetHandle { link: None }
    }

    /// Binds `asset` to the link of `previous` in place, so that every existing handle
    /// observes the new instance. Creates a handle with a new link if `previous` is empty.
    ///
    /// This is what reload callbacks use to refresh an asset without orphaning the handles
    /// held by users.
    pub fn rebind<S: Into<String>>(previous: &AssetHandle<T>, id: S, asset: Arc<T>) -> Self {
        match previous.link {
            Some(ref link) => {
                {
                    let mut state = link.state.write().unwrap();
                    state.id = id.into();
                    state.asset = Some(asset);
                }

                previous.clone()
            }
            None => AssetHandle::new(id, asset),
        }
    }

    /// Returns true if this handle does not refer to any link.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.link.is_none()
    }

    /// Returns true if this handle refers to a link whose asset is still alive.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.link.as_ref().map(|v| v.is_valid()).unwrap_or(false)
    }

    /// Gets the current key of asset, which is empty if the asset has been deleted.
    #[inline]
    pub fn id(&self) -> String {
        self.link.as_ref().map(|v| v.id()).unwrap_or_default()
    }

    /// Gets the asset instance.
    #[inline]
    pub fn asset(&self) -> Option<Arc<T>> {
        self.link.as_ref().and_then(|v| v.asset())
    }

    /// Gets the underlying link.
    #[inline]
    pub fn link(&self) -> Option<&Arc<AssetLink<T>>> {
        self.link.as_ref()
    }

    /// Returns true if both handles share the same link.
    #[inline]
    pub fn same_link(&self, rhs: &AssetHandle<T>) -> bool {
        match (&self.link, &rhs.link) {
            (Some(lhs), Some(rhs)) => Arc::ptr_eq(lhs, rhs),
            _ => false,
        }
    }

    /// Replaces the key of link. Only called with the lock of owning storage held.
    pub(crate) fn rename_link(&self, id: &str) {
        if let Some(ref link) = self.link {
            link.state.write().unwrap().id = id.to_owned();
        }
    }

    /// Drops the asset instance and clears the key of link, every handle that shares this
    /// link will observe an empty asset. Only called with the lock of owning storage held.
    pub(crate) fn invalidate(&self) {
        if let Some(ref link) = self.link {
            let mut state = link.state.write().unwrap();
            state.asset = None;
            state.id.clear();
        }
    }
}

impl<T> Clone for AssetHandle<T> {
    fn clone(&self) -> Self {
        AssetHandle {
            link: self.link.clone(),
        }
    }
}

impl<T> Default for AssetHandle<T> {
    fn default() -> Self {
        AssetHandle::empty()
    }
}

impl<T> fmt::Debug for AssetHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.link {
            Some(ref link) => {
                let state = link.state.read().unwrap();
                f.debug_struct("AssetHandle")
                    .field("id", &state.id)
                    .field("valid", &state.asset.is_some())
                    .finish()
            }
            None => write!(f, "AssetHandle(Empty)"),
        }
    }
}
