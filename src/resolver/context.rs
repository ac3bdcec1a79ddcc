//! Reference-counted cache of open file objects and file systems.
//!
//! One mutex guards both cache maps, their reference counts and the set of
//! keys being opened. It is only held for bookkeeping: a miss reserves its
//! key, the backend opens with the lock released, and the result is inserted
//! under the lock again. Other threads asking for a reserved key wait for it
//! instead of opening it a second time.
//!
//! Evicted objects are closed after the cache state has been unlocked, since
//! closing an outer layer releases its parent through this same context.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::{Condvar, Mutex};

use crate::file_io::SharedFileObject;
use crate::{FileSystem, PathSpec, VfsError};

/// Canonical identity of a resolved path specification chain.
///
/// The key is the chain rebuilt from the canonical form of every layer, so
/// two keys are equal exactly when the canonical chains are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(PathSpec);

impl CacheKey {
    pub(crate) fn new(canonical: PathSpec) -> Self {
        Self(canonical)
    }

    /// The canonical chain behind the key.
    pub fn as_path_spec(&self) -> &PathSpec {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layers: Vec<String> = self.0.layers().map(PathSpec::layer_comparable).collect();
        let layers: Vec<&str> = layers.iter().rev().map(String::as_str).collect();
        f.write_str(&layers.join(" | "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum CacheKind {
    FileObject,
    FileSystem,
}

pub(crate) struct Cached<T> {
    value: T,
    references: usize,
}

#[derive(Default)]
pub(crate) struct CacheState {
    file_objects: HashMap<CacheKey, Cached<SharedFileObject>>,
    file_systems: HashMap<CacheKey, Cached<Arc<dyn FileSystem>>>,
    opening: HashSet<(CacheKind, CacheKey)>,
}

/// A value the context can cache.
pub(crate) trait Cacheable: Clone + Sized {
    const KIND: CacheKind;

    fn entries(state: &mut CacheState) -> &mut HashMap<CacheKey, Cached<Self>>;

    fn close(&self) -> Result<(), VfsError>;
}

impl Cacheable for SharedFileObject {
    const KIND: CacheKind = CacheKind::FileObject;

    fn entries(state: &mut CacheState) -> &mut HashMap<CacheKey, Cached<Self>> {
        &mut state.file_objects
    }

    fn close(&self) -> Result<(), VfsError> {
        let mut file_object = self.lock();
        if file_object.is_open() {
            file_object.close()
        } else {
            Ok(())
        }
    }
}

impl Cacheable for Arc<dyn FileSystem> {
    const KIND: CacheKind = CacheKind::FileSystem;

    fn entries(state: &mut CacheState) -> &mut HashMap<CacheKey, Cached<Self>> {
        &mut state.file_systems
    }

    fn close(&self) -> Result<(), VfsError> {
        self.as_ref().close()
    }
}

/// Outcome of a cache lookup.
pub(crate) enum Lookup<'a, T: Cacheable> {
    /// The key was cached; one more reference has been taken.
    Cached(T),
    /// The key was not cached and is now reserved for the caller to open.
    Reserved(Reservation<'a, T>),
}

/// Exclusive right to open one key. Dropping it without
/// [`complete`](Reservation::complete) lets a waiting thread try instead.
pub(crate) struct Reservation<'a, T: Cacheable> {
    context: &'a Context,
    key: CacheKey,
    completed: bool,
    _value: PhantomData<T>,
}

impl<T: Cacheable> Reservation<'_, T> {
    /// Cache the opened value with one reference.
    pub(crate) fn complete(mut self, value: T) {
        self.completed = true;
        let mut state = self.context.state.lock();
        tracing::debug!(key = %self.key, kind = ?T::KIND, "caching opened object");
        T::entries(&mut state).insert(self.key.clone(), Cached { value, references: 1 });
        state.opening.remove(&(T::KIND, self.key.clone()));
        drop(state);
        self.context.opened.notify_all();
    }
}

impl<T: Cacheable> Drop for Reservation<'_, T> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        tracing::trace!(key = %self.key, kind = ?T::KIND, "open failed, releasing reservation");
        self.context
            .state
            .lock()
            .opening
            .remove(&(T::KIND, self.key.clone()));
        self.context.opened.notify_all();
    }
}

/// Resolver cache shared by every handle a resolver hands out.
#[derive(Default)]
pub struct Context {
    state: Mutex<CacheState>,
    opened: Condvar,
}

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a reference to the value cached for `key`, or reserve the key.
    ///
    /// Blocks while another thread holds the reservation for the same key.
    pub(crate) fn lookup<T: Cacheable>(&self, key: &CacheKey) -> Lookup<'_, T> {
        let mut state = self.state.lock();
        loop {
            if let Some(cached) = T::entries(&mut state).get_mut(key) {
                cached.references += 1;
                tracing::debug!(%key, references = cached.references, "resolver cache hit");
                return Lookup::Cached(cached.value.clone());
            }
            let reservation = (T::KIND, key.clone());
            if !state.opening.contains(&reservation) {
                state.opening.insert(reservation);
                return Lookup::Reserved(Reservation {
                    context: self,
                    key: key.clone(),
                    completed: false,
                    _value: PhantomData,
                });
            }
            tracing::trace!(%key, "waiting for concurrent open");
            self.opened.wait(&mut state);
        }
    }

    /// Outstanding references to the cached file object for `key`.
    pub fn file_object_references(&self, key: &CacheKey) -> Option<usize> {
        self.state.lock().file_objects.get(key).map(|cached| cached.references)
    }

    /// Outstanding references to the cached file system for `key`.
    pub fn file_system_references(&self, key: &CacheKey) -> Option<usize> {
        self.state.lock().file_systems.get(key).map(|cached| cached.references)
    }

    /// Number of cached file objects.
    pub fn number_of_file_objects(&self) -> usize {
        self.state.lock().file_objects.len()
    }

    /// Number of cached file systems.
    pub fn number_of_file_systems(&self) -> usize {
        self.state.lock().file_systems.len()
    }

    /// Drop every cached object, closing it regardless of outstanding
    /// references.
    ///
    /// Handles still alive afterwards fail with [`VfsError::NotOpen`]; their
    /// eventual release is a no-op.
    pub fn empty(&self) {
        let (file_systems, file_objects) = {
            let mut state = self.state.lock();
            (
                std::mem::take(&mut state.file_systems),
                std::mem::take(&mut state.file_objects),
            )
        };

        tracing::debug!(
            file_systems = file_systems.len(),
            file_objects = file_objects.len(),
            "emptying resolver context"
        );
        let results = file_systems
            .into_values()
            .map(|cached| cached.value.close())
            .chain(file_objects.into_values().map(|cached| cached.value.close()));
        for result in results {
            if let Err(error) = result {
                tracing::warn!(%error, "close failed while emptying context");
            }
        }
    }

    /// Drop one reference; close and evict the object at zero.
    pub(crate) fn release(&self, kind: CacheKind, key: &CacheKey) -> Result<(), VfsError> {
        match kind {
            CacheKind::FileObject => self.release_value::<SharedFileObject>(key),
            CacheKind::FileSystem => self.release_value::<Arc<dyn FileSystem>>(key),
        }
    }

    fn release_value<T: Cacheable>(&self, key: &CacheKey) -> Result<(), VfsError> {
        let evicted = {
            let mut state = self.state.lock();
            let entries = T::entries(&mut state);
            let Some(cached) = entries.get_mut(key) else {
                tracing::trace!(%key, "release of key no longer cached");
                return Ok(());
            };
            cached.references = cached.references.saturating_sub(1);
            tracing::debug!(%key, references = cached.references, "released cache reference");
            if cached.references == 0 {
                entries.remove(key).map(|cached| cached.value)
            } else {
                None
            }
        };

        match evicted {
            Some(value) => {
                tracing::debug!(%key, kind = ?T::KIND, "evicted from resolver cache");
                value.close()
            }
            None => Ok(()),
        }
    }
}

/// One cache reference; released exactly once.
pub(crate) struct Lease {
    context: Weak<Context>,
    kind: CacheKind,
    key: CacheKey,
    released: bool,
}

impl Lease {
    pub(crate) fn new(context: &Arc<Context>, kind: CacheKind, key: CacheKey) -> Self {
        Self {
            context: Arc::downgrade(context),
            kind,
            key,
            released: false,
        }
    }

    pub(crate) fn key(&self) -> &CacheKey {
        &self.key
    }

    pub(crate) fn release(mut self) -> Result<(), VfsError> {
        self.released = true;
        match self.context.upgrade() {
            Some(context) => context.release(self.kind, &self.key),
            None => Ok(()),
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(context) = self.context.upgrade() {
            if let Err(error) = context.release(self.kind, &self.key) {
                tracing::warn!(key = %self.key, %error, "release on drop failed");
            }
        }
    }
}
