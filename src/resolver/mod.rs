//! # Resolver
//!
//! Turns path specifications into open file objects, file systems and file
//! entries, reusing whatever is already open.
//!
//! ## Resolution
//!
//! 1. Every layer of the chain is checked against its registered helper
//!    before any I/O. An unknown type indicator anywhere in the chain fails
//!    the whole request with [`VfsError::PathSpec`].
//! 2. The chain is reduced to a [`CacheKey`]: the chain rebuilt from each
//!    helper's canonical form of its layer.
//! 3. A cache hit takes another reference. A miss reserves the key, builds
//!    the object outside the [`Context`] lock (resolving its parent
//!    recursively) and inserts it with one reference. A failed build inserts
//!    nothing, and concurrent requests for the same key wait for the first.
//!
//! ## Ownership
//!
//! A [`Resolver`] is a cheap clonable handle over its helper registry and
//! context. Handles it returns keep a weak link to the context, so dropping
//! every resolver clone drops the cache even if handles linger.

pub(crate) mod context;
mod helper;

pub use context::{CacheKey, Context};
pub use helper::{HelperRegistry, ResolverHelper};

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::file_io::{FileIoHandle, SharedFileObject};
use crate::{FileEntry, FileObject, FileSystem, FileSystemRef, OpenMode, PathSpec, TypeIndicator, VfsError};
use context::{CacheKind, Lease, Lookup};

struct ResolverInner {
    helpers: RwLock<HelperRegistry>,
    context: Arc<Context>,
}

/// Entry point for opening layered path specifications.
///
/// # Example
///
/// ```rust
/// use layerfs::backends::data_range::DataRange;
/// use layerfs::backends::fake::{self, FakeResolverHelper, FakeTree};
/// use layerfs::Resolver;
///
/// let mut tree = FakeTree::new();
/// tree.add_file("/blob.bin", b"0123456789".to_vec());
///
/// let resolver = Resolver::with_default_helpers();
/// resolver.register_helper(FakeResolverHelper::new(tree)).unwrap();
///
/// let spec = fake::path_spec("/blob.bin").layer(DataRange::new(2, 4));
/// let handle = resolver.open_file_object(&spec).unwrap();
/// assert_eq!(handle.read(None).unwrap(), b"2345");
/// ```
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("helpers", &self.inner.helpers.read().len())
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Create a resolver with no helpers and an empty context.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                helpers: RwLock::new(HelperRegistry::new()),
                context: Arc::new(Context::new()),
            }),
        }
    }

    /// Create a resolver with every bundled backend registered, except the
    /// fake one which needs a tree.
    pub fn with_default_helpers() -> Self {
        let resolver = Self::new();
        {
            let mut helpers = resolver.inner.helpers.write();
            for helper in crate::backends::default_helpers() {
                if let Err(error) = helpers.register(helper) {
                    tracing::warn!(%error, "skipping bundled helper");
                }
            }
        }
        resolver
    }

    /// Register a helper under its type indicator.
    ///
    /// # Errors
    ///
    /// - [`VfsError::AlreadyRegistered`] if the indicator is taken
    pub fn register_helper<H: ResolverHelper + 'static>(&self, helper: H) -> Result<(), VfsError> {
        self.inner.helpers.write().register(Arc::new(helper))
    }

    /// Remove the helper for a type indicator.
    ///
    /// Objects already cached for that type stay usable.
    ///
    /// # Errors
    ///
    /// - [`VfsError::HelperNotFound`] if nothing is registered for it
    pub fn deregister_helper(&self, type_indicator: &TypeIndicator) -> Result<(), VfsError> {
        self.inner.helpers.write().deregister(type_indicator)
    }

    /// The helper registered for a type indicator.
    ///
    /// # Errors
    ///
    /// - [`VfsError::HelperNotFound`] if nothing is registered for it
    pub fn helper(&self, type_indicator: &TypeIndicator) -> Result<Arc<dyn ResolverHelper>, VfsError> {
        self.inner.helpers.read().helper(type_indicator)
    }

    /// The cache shared by everything this resolver opens.
    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// Cache key of a path specification chain.
    ///
    /// # Errors
    ///
    /// - [`VfsError::PathSpec`] if a layer has no registered helper or is
    ///   malformed
    pub fn cache_key(&self, path_spec: &PathSpec) -> Result<CacheKey, VfsError> {
        let helpers = self.layer_helpers(path_spec)?;
        Ok(cache_key(&helpers, path_spec))
    }

    /// Open (or reuse) the file object of the outermost layer.
    ///
    /// # Errors
    ///
    /// - [`VfsError::PathSpec`] if the chain is not resolvable
    /// - any error raised while opening a layer
    pub fn open_file_object(&self, path_spec: &PathSpec) -> Result<FileIoHandle, VfsError> {
        let helpers = self.layer_helpers(path_spec)?;
        let key = cache_key(&helpers, path_spec);
        let context = &self.inner.context;

        let file_object = match context.lookup::<SharedFileObject>(&key) {
            Lookup::Cached(file_object) => file_object,
            Lookup::Reserved(reservation) => {
                tracing::debug!(%key, "opening file object");
                let mut file_object = FileObject::new(helpers[0].new_file_object(path_spec)?);
                file_object.open(self, path_spec, OpenMode::ReadBinary)?;
                let file_object = Arc::new(Mutex::new(file_object));
                reservation.complete(Arc::clone(&file_object));
                file_object
            }
        };

        let lease = Lease::new(context, CacheKind::FileObject, key);
        Ok(FileIoHandle::new(file_object, path_spec.clone(), lease))
    }

    /// Open (or reuse) the file system containing the outermost layer.
    ///
    /// # Errors
    ///
    /// - [`VfsError::PathSpec`] if the chain is not resolvable
    /// - any error raised while opening a layer
    pub fn open_file_system(&self, path_spec: &PathSpec) -> Result<FileSystemRef, VfsError> {
        let helpers = self.layer_helpers(path_spec)?;
        let root = helpers[0].file_system_root(path_spec);
        let key = self.cache_key(&root)?;
        let context = &self.inner.context;

        let file_system = match context.lookup::<Arc<dyn FileSystem>>(&key) {
            Lookup::Cached(file_system) => file_system,
            Lookup::Reserved(reservation) => {
                tracing::debug!(%key, "opening file system");
                let file_system = helpers[0].new_file_system(self, &root)?;
                reservation.complete(Arc::clone(&file_system));
                file_system
            }
        };

        let lease = Lease::new(context, CacheKind::FileSystem, key);
        Ok(FileSystemRef::new(file_system, self.clone(), lease))
    }

    /// Cache key of the file system that contains `path_spec`.
    pub(crate) fn file_system_key(&self, path_spec: &PathSpec) -> Result<CacheKey, VfsError> {
        let helpers = self.layer_helpers(path_spec)?;
        self.cache_key(&helpers[0].file_system_root(path_spec))
    }

    /// Open the file entry addressed by a path specification.
    ///
    /// Returns `Ok(None)` when the containing file system opens but has no
    /// entry at that path.
    ///
    /// # Errors
    ///
    /// - [`VfsError::PathSpec`] if the chain is not resolvable
    /// - any error raised while opening the file system
    pub fn open_file_entry(&self, path_spec: &PathSpec) -> Result<Option<Box<dyn FileEntry>>, VfsError> {
        let file_system = self.open_file_system(path_spec)?;
        file_system.file_entry_by_path_spec(path_spec)
    }

    fn layer_helpers(&self, path_spec: &PathSpec) -> Result<Vec<Arc<dyn ResolverHelper>>, VfsError> {
        let registry = self.inner.helpers.read();
        path_spec
            .layers()
            .map(|layer| {
                let helper = registry.helper(layer.type_indicator()).map_err(|_| {
                    VfsError::path_spec(format!(
                        "unsupported type indicator: {}",
                        layer.type_indicator()
                    ))
                })?;
                helper.validate_path_spec(layer)?;
                Ok(helper)
            })
            .collect()
    }
}

fn cache_key(helpers: &[Arc<dyn ResolverHelper>], path_spec: &PathSpec) -> CacheKey {
    // Layers run outermost first; rebuild the chain from the innermost one.
    let canonical = path_spec
        .layers()
        .zip(helpers)
        .map(|(layer, helper)| helper.layer_key(layer))
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .reduce(|parent, layer| layer.with_parent(parent));
    CacheKey::new(canonical.unwrap_or_else(|| path_spec.without_parent()))
}
