//! File system shared by layers that decode one parent stream into one
//! stream: a single virtual root file with no children.

use std::time::SystemTime;

use parking_lot::Mutex;

use crate::file_io::{FileIoHandle, StreamReader};
use crate::{EntryType, FileEntry, FileSystem, FileSystemRef, PathSpec, Resolver, Stat, TypeIndicator, VfsError};

pub(crate) struct StreamFileSystem {
    root: PathSpec,
    parent: Mutex<Option<FileIoHandle>>,
    name: String,
    size: u64,
    modification_time: Option<SystemTime>,
}

impl StreamFileSystem {
    /// Open the parent stream of `root` and keep it for the lifetime of the
    /// file system.
    pub(crate) fn open(resolver: &Resolver, root: &PathSpec) -> Result<Self, VfsError> {
        let parent = root.parent().ok_or_else(|| {
            VfsError::path_spec(format!("{} path specification requires a parent", root.type_indicator()))
        })?;
        let parent = resolver.open_file_object(parent)?;
        Ok(Self {
            root: root.clone(),
            parent: Mutex::new(Some(parent)),
            name: String::new(),
            size: 0,
            modification_time: None,
        })
    }

    pub(crate) fn with_name(mut self, name: String) -> Self {
        self.name = name;
        self
    }

    /// Size of the decoded stream, reported by the root entry.
    pub(crate) fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub(crate) fn with_modification_time(mut self, modification_time: Option<SystemTime>) -> Self {
        self.modification_time = modification_time;
        self
    }

    /// Size of the parent stream.
    pub(crate) fn parent_size(&self) -> Result<u64, VfsError> {
        self.parent
            .lock()
            .as_ref()
            .ok_or(VfsError::NotOpen { operation: "get size" })?
            .size()
    }

    /// Independent reader over the parent stream.
    pub(crate) fn parent_reader(&self) -> Result<StreamReader, VfsError> {
        self.parent
            .lock()
            .as_ref()
            .map(|parent| parent.reader_at(0))
            .ok_or(VfsError::NotOpen {
                operation: "read parent stream",
            })
    }
}

impl FileSystem for StreamFileSystem {
    fn type_indicator(&self) -> &TypeIndicator {
        self.root.type_indicator()
    }

    fn root_path_spec(&self) -> &PathSpec {
        &self.root
    }

    fn file_entry_by_path_spec(
        &self,
        owner: &FileSystemRef,
        path_spec: &PathSpec,
    ) -> Result<Option<Box<dyn FileEntry>>, VfsError> {
        if !owner.is_compatible(path_spec)? {
            return Ok(None);
        }
        Ok(Some(Box::new(StreamFileEntry {
            file_system: owner.clone(),
            path_spec: path_spec.clone(),
            name: self.name.clone(),
            size: self.size,
            modification_time: self.modification_time,
        })))
    }

    fn close(&self) -> Result<(), VfsError> {
        match self.parent.lock().take() {
            Some(parent) => parent.close(),
            None => Ok(()),
        }
    }
}

struct StreamFileEntry {
    file_system: FileSystemRef,
    path_spec: PathSpec,
    name: String,
    size: u64,
    modification_time: Option<SystemTime>,
}

impl FileEntry for StreamFileEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn path_spec(&self) -> &PathSpec {
        &self.path_spec
    }

    fn file_system(&self) -> &FileSystemRef {
        &self.file_system
    }

    fn entry_type(&self) -> EntryType {
        EntryType::File
    }

    fn is_root(&self) -> bool {
        true
    }

    fn is_virtual(&self) -> bool {
        true
    }

    fn stat(&self) -> Result<Stat, VfsError> {
        let mut stat = Stat::new(EntryType::File, self.size);
        stat.modification_time = self.modification_time;
        Ok(stat)
    }

    fn parent_file_entry(&self) -> Result<Option<Box<dyn FileEntry>>, VfsError> {
        Ok(None)
    }
}
