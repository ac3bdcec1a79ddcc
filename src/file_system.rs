//! # File Systems
//!
//! A [`FileSystem`] is the namespace of one layer: the entries reachable
//! under a root path specification. Single-stream layers expose exactly one
//! virtual root entry; hierarchical layers expose a tree.
//!
//! Callers never hold a file system directly. They get a [`FileSystemRef`],
//! which keeps one cache reference for as long as any clone of it (or any
//! entry created through it) is alive.

use std::sync::Arc;

use crate::resolver::context::Lease;
use crate::{FileEntry, PathSpec, Resolver, TypeIndicator, VfsError};

/// Backend contract for the namespace of one layer.
///
/// # Thread Safety
///
/// A cached file system is shared by every [`FileSystemRef`] resolved to the
/// same root and may be used from several threads at once.
pub trait FileSystem: Send + Sync {
    /// Type indicator of the layer this file system belongs to.
    fn type_indicator(&self) -> &TypeIndicator;

    /// Path specification of the root of this file system.
    fn root_path_spec(&self) -> &PathSpec;

    /// Look up the entry for a path specification.
    ///
    /// `owner` is the reference the entry must keep. Returns `Ok(None)` if
    /// no entry exists at that path.
    ///
    /// # Errors
    ///
    /// - [`VfsError::PathSpec`] if the path specification is incorrect
    /// - [`VfsError::Io`] or [`VfsError::AccessDenied`] if the lookup fails
    fn file_entry_by_path_spec(
        &self,
        owner: &FileSystemRef,
        path_spec: &PathSpec,
    ) -> Result<Option<Box<dyn FileEntry>>, VfsError>;

    /// The entry of the root path specification.
    fn root_file_entry(&self, owner: &FileSystemRef) -> Result<Option<Box<dyn FileEntry>>, VfsError> {
        self.file_entry_by_path_spec(owner, self.root_path_spec())
    }

    /// Release backend resources. Called once, when the file system leaves
    /// the cache.
    fn close(&self) -> Result<(), VfsError> {
        Ok(())
    }

    /// Separator of locations inside this file system.
    fn path_separator(&self) -> &str {
        "/"
    }

    /// Join segments into an absolute location.
    ///
    /// Separators inside segments are normalized, empty segments dropped.
    fn join_path(&self, segments: &[&str]) -> String {
        let separator = self.path_separator();
        let parts: Vec<&str> = segments
            .iter()
            .flat_map(|segment| segment.split(separator))
            .filter(|part| !part.is_empty())
            .collect();
        format!("{separator}{}", parts.join(separator))
    }

    /// Split a location into its non-empty segments.
    fn split_path(&self, location: &str) -> Vec<String> {
        location
            .split(self.path_separator())
            .filter(|part| !part.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Location of the directory containing `location`.
    fn dirname(&self, location: &str) -> String {
        let mut segments = self.split_path(location);
        segments.pop();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        self.join_path(&segments)
    }

    /// Last segment of `location`, or an empty string for the root.
    fn basename(&self, location: &str) -> String {
        self.split_path(location).pop().unwrap_or_default()
    }
}

struct FileSystemLease {
    file_system: Arc<dyn FileSystem>,
    resolver: Resolver,
    lease: Lease,
}

/// A resolved file system, leased from the resolver cache.
///
/// Clones share one cache reference, released when the last clone is
/// dropped. Entries keep a clone, so an entry outliving the code that opened
/// its file system keeps that file system open.
#[derive(Clone)]
pub struct FileSystemRef {
    inner: Arc<FileSystemLease>,
}

impl FileSystemRef {
    pub(crate) fn new(file_system: Arc<dyn FileSystem>, resolver: Resolver, lease: Lease) -> Self {
        Self {
            inner: Arc::new(FileSystemLease {
                file_system,
                resolver,
                lease,
            }),
        }
    }

    /// The backend file system.
    pub fn file_system(&self) -> &dyn FileSystem {
        self.inner.file_system.as_ref()
    }

    /// Resolver the file system was opened by; parent layers and data
    /// streams of entries are resolved through it.
    pub fn resolver(&self) -> &Resolver {
        &self.inner.resolver
    }

    /// Type indicator of the file system.
    pub fn type_indicator(&self) -> &TypeIndicator {
        self.file_system().type_indicator()
    }

    /// Root path specification of the file system.
    pub fn root_path_spec(&self) -> &PathSpec {
        self.file_system().root_path_spec()
    }

    /// Look up the entry for a path specification.
    ///
    /// # Errors
    ///
    /// - [`VfsError::PathSpec`] if the path specification belongs to another
    ///   file system
    /// - any error of [`FileSystem::file_entry_by_path_spec`]
    pub fn file_entry_by_path_spec(&self, path_spec: &PathSpec) -> Result<Option<Box<dyn FileEntry>>, VfsError> {
        if !self.is_compatible(path_spec)? {
            return Err(VfsError::path_spec(format!(
                "path specification does not belong to file system: {}",
                self.root_path_spec().layer_comparable()
            )));
        }
        self.file_system().file_entry_by_path_spec(self, path_spec)
    }

    /// Returns `true` if `path_spec` resolves to this file system.
    ///
    /// The comparison uses cache keys, so spellings the backend considers
    /// equivalent are compatible.
    ///
    /// # Errors
    ///
    /// - [`VfsError::PathSpec`] if the chain is not resolvable
    pub fn is_compatible(&self, path_spec: &PathSpec) -> Result<bool, VfsError> {
        Ok(&self.resolver().file_system_key(path_spec)? == self.inner.lease.key())
    }

    /// Returns `true` if an entry exists for the path specification.
    pub fn file_entry_exists(&self, path_spec: &PathSpec) -> Result<bool, VfsError> {
        Ok(self.file_entry_by_path_spec(path_spec)?.is_some())
    }

    /// The root entry of the file system.
    pub fn root_file_entry(&self) -> Result<Option<Box<dyn FileEntry>>, VfsError> {
        self.file_system().root_file_entry(self)
    }

    /// Returns `true` if both references point at the same cached file
    /// system.
    pub fn shares_file_system_with(&self, other: &FileSystemRef) -> bool {
        Arc::ptr_eq(&self.inner.file_system, &other.inner.file_system)
    }
}

impl std::fmt::Debug for FileSystemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemRef")
            .field("root", &self.root_path_spec().layer_comparable())
            .finish_non_exhaustive()
    }
}
