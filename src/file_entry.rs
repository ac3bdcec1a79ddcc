//! # File Entries
//!
//! A [`FileEntry`] is one node of a [`FileSystem`](crate::FileSystem): its
//! name, type, metadata and links to its parent, its children, its data
//! stream and the entry of the layer beneath.
//!
//! | Navigation | Stays in layer | Returns |
//! |------------|----------------|---------|
//! | [`parent_file_entry`](FileEntry::parent_file_entry) | yes | `None` at the root |
//! | [`sub_file_entries`](FileEntry::sub_file_entries) | yes | lazy, stable order |
//! | [`parent_layer_file_entry`](FileEntry::parent_layer_file_entry) | no | `None` at a leaf layer |
//! | [`file_object`](FileEntry::file_object) | no | the entry's data stream |

use crate::file_io::FileIoHandle;
use crate::{EntryType, FileSystemRef, PathSpec, Stat, VfsError};

/// Iterator over the sub entries of a directory.
///
/// Each call to [`FileEntry::sub_file_entries`] returns a fresh iterator.
/// Entries are produced lazily; an error for one entry does not end the
/// iteration.
pub struct SubFileEntries(Box<dyn Iterator<Item = Result<Box<dyn FileEntry>, VfsError>> + Send + 'static>);

impl SubFileEntries {
    /// Create from any compatible iterator.
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = Result<Box<dyn FileEntry>, VfsError>> + Send + 'static,
    {
        Self(Box::new(iter))
    }

    /// Create from pre-built entries.
    pub fn from_vec(entries: Vec<Result<Box<dyn FileEntry>, VfsError>>) -> Self {
        Self(Box::new(entries.into_iter()))
    }

    /// An iterator yielding nothing.
    pub fn empty() -> Self {
        Self(Box::new(std::iter::empty()))
    }

    /// Collect all entries, short-circuiting on the first error.
    pub fn collect_all(self) -> Result<Vec<Box<dyn FileEntry>>, VfsError> {
        self.collect()
    }
}

impl Iterator for SubFileEntries {
    type Item = Result<Box<dyn FileEntry>, VfsError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next()
    }
}

/// Backend contract for one node of a file system.
///
/// An entry holds a [`FileSystemRef`], which keeps its file system (and the
/// layers beneath it) open for the lifetime of the entry.
///
/// # Consistency
///
/// [`stat`](FileEntry::stat) is idempotent while the underlying data is
/// unchanged, and its type and allocation flags agree with
/// [`entry_type`](FileEntry::entry_type) and
/// [`is_allocated`](FileEntry::is_allocated).
pub trait FileEntry: Send + Sync {
    /// Name of the entry; empty for a nameless root.
    fn name(&self) -> &str;

    /// Path specification addressing this entry.
    fn path_spec(&self) -> &PathSpec;

    /// File system the entry belongs to.
    fn file_system(&self) -> &FileSystemRef;

    /// Type of the entry.
    fn entry_type(&self) -> EntryType;

    /// Returns `true` for the root entry of its file system.
    fn is_root(&self) -> bool;

    /// Returns `true` if the entry is synthesized by the layer rather than
    /// stored in it.
    fn is_virtual(&self) -> bool;

    /// Returns `true` unless the entry is marked deleted.
    fn is_allocated(&self) -> bool {
        true
    }

    /// Metadata of the entry.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Io`] if the metadata cannot be read
    fn stat(&self) -> Result<Stat, VfsError>;

    /// The directory containing this entry, within the same layer.
    fn parent_file_entry(&self) -> Result<Option<Box<dyn FileEntry>>, VfsError>;

    /// The entries directly below this one. Empty unless this is a
    /// directory.
    fn sub_file_entries(&self) -> Result<SubFileEntries, VfsError> {
        Ok(SubFileEntries::empty())
    }

    /// Target of a symbolic link entry.
    fn link_target(&self) -> Result<Option<String>, VfsError> {
        Ok(None)
    }

    /// Returns `true` for a regular file.
    fn is_file(&self) -> bool {
        self.entry_type() == EntryType::File
    }

    /// Returns `true` for a directory.
    fn is_directory(&self) -> bool {
        self.entry_type() == EntryType::Directory
    }

    /// Returns `true` for a symbolic link.
    fn is_link(&self) -> bool {
        self.entry_type() == EntryType::Link
    }

    /// Returns `true` for a device.
    fn is_device(&self) -> bool {
        self.entry_type() == EntryType::Device
    }

    /// Returns `true` for a named pipe.
    fn is_pipe(&self) -> bool {
        self.entry_type() == EntryType::Pipe
    }

    /// Returns `true` for a socket.
    fn is_socket(&self) -> bool {
        self.entry_type() == EntryType::Socket
    }

    /// Number of sub entries.
    fn number_of_sub_file_entries(&self) -> Result<usize, VfsError> {
        Ok(self.sub_file_entries()?.collect_all()?.len())
    }

    /// Open the data stream of this entry through the resolver.
    ///
    /// # Errors
    ///
    /// - any error of [`Resolver::open_file_object`](crate::Resolver::open_file_object)
    fn file_object(&self) -> Result<FileIoHandle, VfsError> {
        self.file_system().resolver().open_file_object(self.path_spec())
    }

    /// The entry of the layer beneath, or `None` for a leaf layer.
    fn parent_layer_file_entry(&self) -> Result<Option<Box<dyn FileEntry>>, VfsError> {
        match self.path_spec().parent() {
            Some(parent) => self.file_system().resolver().open_file_entry(parent),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for dyn FileEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileEntry")
            .field("name", &self.name())
            .field("entry_type", &self.entry_type())
            .field("path_spec", &self.path_spec().layer_comparable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Resolver;
    use crate::backends::fake::{self, FakeResolverHelper, FakeTree};

    fn resolver() -> Resolver {
        let mut tree = FakeTree::new();
        tree.add_file("/a/one.txt", b"1".to_vec())
            .add_file("/a/two.txt", b"22".to_vec())
            .add_link("/a/link", "/a/one.txt");
        let resolver = Resolver::new();
        resolver.register_helper(FakeResolverHelper::new(tree)).unwrap();
        resolver
    }

    #[test]
    fn sub_file_entries_empty_and_from_vec() {
        assert_eq!(SubFileEntries::empty().count(), 0);
        let collected = SubFileEntries::from_vec(vec![Err(VfsError::NotSupported { operation: "x" })])
            .collect_all();
        assert!(collected.is_err());
    }

    #[test]
    fn provided_predicates_follow_entry_type() {
        let resolver = resolver();
        let dir = resolver.open_file_entry(&fake::path_spec("/a")).unwrap().unwrap();
        assert!(dir.is_directory());
        assert!(!dir.is_file());
        assert_eq!(dir.number_of_sub_file_entries().unwrap(), 3);

        let link = resolver.open_file_entry(&fake::path_spec("/a/link")).unwrap().unwrap();
        assert!(link.is_link());
        assert_eq!(link.link_target().unwrap().as_deref(), Some("/a/one.txt"));
        assert!(!link.is_device() && !link.is_pipe() && !link.is_socket());
    }

    #[test]
    fn leaf_layer_has_no_parent_layer_entry() {
        let resolver = resolver();
        let file = resolver.open_file_entry(&fake::path_spec("/a/two.txt")).unwrap().unwrap();
        assert!(file.parent_layer_file_entry().unwrap().is_none());
        assert_eq!(file.file_object().unwrap().read(None).unwrap(), b"22");
        assert!(file.sub_file_entries().unwrap().next().is_none());
    }
}
