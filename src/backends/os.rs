//! Native operating system files and directories.
//!
//! The OS layer is always a leaf. Entries are looked up with
//! `symlink_metadata`, so links are reported as links rather than followed.

use std::fs::{self, File, Metadata};
use std::io::{Read, Seek, SeekFrom};
use std::path::{MAIN_SEPARATOR_STR, Path};
use std::sync::Arc;

use crate::{
    EntryType, FileEntry, FileIo, FileSystem, FileSystemRef, ParentRule, PathSpec, PathSpecKind, Resolver,
    ResolverHelper, Stat, SubFileEntries, TypeIndicator, VfsError,
};

/// Schema of an `OS` layer.
pub const KIND: PathSpecKind = PathSpecKind {
    type_indicator: TypeIndicator::OS,
    required: &["location"],
    optional: &[],
    parent: ParentRule::Forbidden,
};

/// Path specification of a native location.
pub fn path_spec(location: impl Into<String>) -> PathSpec {
    PathSpec::new(TypeIndicator::OS).with_attribute("location", location.into())
}

fn location_of(path_spec: &PathSpec) -> Result<&str, VfsError> {
    path_spec
        .location()
        .ok_or_else(|| VfsError::path_spec("OS path specification requires a location"))
}

/// Resolver helper for `OS` layers.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsResolverHelper;

impl ResolverHelper for OsResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::OS
    }

    fn validate_path_spec(&self, path_spec: &PathSpec) -> Result<(), VfsError> {
        KIND.validate(path_spec)?;
        location_of(path_spec).map(|_| ())
    }

    fn layer_key(&self, path_spec: &PathSpec) -> PathSpec {
        match path_spec.location() {
            Some(location) if cfg!(windows) => self::path_spec(location.to_lowercase()),
            _ => path_spec.without_parent(),
        }
    }

    fn file_system_root(&self, _path_spec: &PathSpec) -> PathSpec {
        path_spec(MAIN_SEPARATOR_STR)
    }

    fn new_file_object(&self, _path_spec: &PathSpec) -> Result<Box<dyn FileIo>, VfsError> {
        Ok(Box::new(OsFileIo::default()))
    }

    fn new_file_system(&self, _resolver: &Resolver, root: &PathSpec) -> Result<Arc<dyn FileSystem>, VfsError> {
        Ok(Arc::new(OsFileSystem { root: root.clone() }))
    }
}

#[derive(Default)]
struct OsFileIo {
    file: Option<File>,
    location: String,
}

impl OsFileIo {
    fn file(&mut self, operation: &'static str) -> Result<&mut File, VfsError> {
        self.file.as_mut().ok_or(VfsError::NotOpen { operation })
    }
}

impl FileIo for OsFileIo {
    fn open(&mut self, _resolver: &Resolver, path_spec: &PathSpec) -> Result<(), VfsError> {
        let location = location_of(path_spec)?;
        let metadata = fs::metadata(location).map_err(|e| VfsError::from_io("open", location, e))?;
        if metadata.is_dir() {
            return Err(VfsError::from_io(
                "open",
                location,
                std::io::Error::other("is a directory"),
            ));
        }

        let file = File::open(location).map_err(|e| VfsError::from_io("open", location, e))?;
        tracing::trace!(location, "opened native file");
        self.file = Some(file);
        self.location = location.to_owned();
        Ok(())
    }

    fn close(&mut self) -> Result<(), VfsError> {
        self.file = None;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, VfsError> {
        let location = self.location.clone();
        let file = self.file("read")?;
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.read(buf))
            .map_err(|e| VfsError::from_io("read", location, e))
    }

    fn size(&mut self) -> Result<u64, VfsError> {
        // Seeking to the end also sizes block and character devices, whose
        // metadata length is 0.
        let location = self.location.clone();
        self.file("get size")?
            .seek(SeekFrom::End(0))
            .map_err(|e| VfsError::from_io("get size", location, e))
    }
}

struct OsFileSystem {
    root: PathSpec,
}

impl FileSystem for OsFileSystem {
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
        let location = location_of(path_spec)?;
        let metadata = match fs::symlink_metadata(location) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(VfsError::from_io("stat", location, error)),
        };

        let name = Path::new(location)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Some(Box::new(OsFileEntry {
            file_system: owner.clone(),
            path_spec: path_spec.clone(),
            location: location.to_owned(),
            name,
            metadata,
        })))
    }

    fn path_separator(&self) -> &str {
        MAIN_SEPARATOR_STR
    }
}

struct OsFileEntry {
    file_system: FileSystemRef,
    path_spec: PathSpec,
    location: String,
    name: String,
    metadata: Metadata,
}

impl OsFileEntry {
    fn parent_location(&self) -> Option<String> {
        Path::new(&self.location)
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(|parent| parent.to_string_lossy().into_owned())
    }
}

impl FileEntry for OsFileEntry {
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
        entry_type(&self.metadata)
    }

    fn is_root(&self) -> bool {
        Path::new(&self.location).parent().is_none()
    }

    fn is_virtual(&self) -> bool {
        false
    }

    fn stat(&self) -> Result<Stat, VfsError> {
        let mut stat = Stat::new(self.entry_type(), self.metadata.len());
        stat.access_time = self.metadata.accessed().ok();
        stat.modification_time = self.metadata.modified().ok();
        stat.creation_time = self.metadata.created().ok();
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            use std::time::{Duration, SystemTime};

            stat.inode = Some(self.metadata.ino());
            stat.mode = Some(self.metadata.mode());
            stat.change_time = u64::try_from(self.metadata.ctime()).ok().map(|seconds| {
                SystemTime::UNIX_EPOCH + Duration::new(seconds, self.metadata.ctime_nsec().clamp(0, 999_999_999) as u32)
            });
        }
        Ok(stat)
    }

    fn parent_file_entry(&self) -> Result<Option<Box<dyn FileEntry>>, VfsError> {
        match self.parent_location() {
            Some(parent) => self.file_system.file_entry_by_path_spec(&path_spec(parent)),
            None => Ok(None),
        }
    }

    fn sub_file_entries(&self) -> Result<SubFileEntries, VfsError> {
        if !self.metadata.is_dir() {
            return Ok(SubFileEntries::empty());
        }

        let mut names = Vec::new();
        let entries = fs::read_dir(&self.location)
            .map_err(|e| VfsError::from_io("read directory", self.location.as_str(), e))?;
        for entry in entries {
            let entry = entry.map_err(|e| VfsError::from_io("read directory", self.location.as_str(), e))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        let directory = self.location.clone();
        let file_system = self.file_system.clone();
        Ok(SubFileEntries::new(names.into_iter().map(move |name| {
            let location = Path::new(&directory).join(&name).to_string_lossy().into_owned();
            file_system
                .file_entry_by_path_spec(&path_spec(location.as_str()))?
                .ok_or(VfsError::NotFound { location })
        })))
    }

    fn link_target(&self) -> Result<Option<String>, VfsError> {
        if !self.metadata.file_type().is_symlink() {
            return Ok(None);
        }
        let target = fs::read_link(&self.location)
            .map_err(|e| VfsError::from_io("read link", self.location.as_str(), e))?;
        Ok(Some(target.to_string_lossy().into_owned()))
    }
}

fn entry_type(metadata: &Metadata) -> EntryType {
    let file_type = metadata.file_type();
    if file_type.is_symlink() {
        return EntryType::Link;
    }
    if file_type.is_dir() {
        return EntryType::Directory;
    }
    if file_type.is_file() {
        return EntryType::File;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;

        if file_type.is_block_device() || file_type.is_char_device() {
            return EntryType::Device;
        }
        if file_type.is_fifo() {
            return EntryType::Pipe;
        }
        if file_type.is_socket() {
            return EntryType::Socket;
        }
    }
    EntryType::Undefined
}
