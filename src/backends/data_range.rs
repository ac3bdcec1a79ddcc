//! Byte range within a parent stream.
//!
//! ```rust
//! use layerfs::backends::{data_range::DataRange, os};
//!
//! let spec = os::path_spec("/images/disk.raw").layer(DataRange::new(512, 1024));
//! assert_eq!(spec.integer_attribute("range_offset"), Some(512));
//! assert_eq!(spec.integer_attribute("range_size"), Some(1024));
//! ```

use std::sync::Arc;

use super::stream::StreamFileSystem;
use crate::file_io::FileIoHandle;
use crate::{FileIo, FileSystem, Layer, ParentRule, PathSpec, PathSpecKind, Resolver, ResolverHelper, TypeIndicator, VfsError};

/// Schema of a `DATA_RANGE` layer.
pub const KIND: PathSpecKind = PathSpecKind {
    type_indicator: TypeIndicator::DATA_RANGE,
    required: &["range_offset", "range_size"],
    optional: &[],
    parent: ParentRule::Required,
};

/// Layer description of a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRange {
    offset: u64,
    size: u64,
}

impl DataRange {
    /// Range of `size` bytes starting at `offset` of the parent.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }
}

impl Layer for DataRange {
    fn layer(self, parent: PathSpec) -> PathSpec {
        PathSpec::new(TypeIndicator::DATA_RANGE)
            .with_attribute("range_offset", self.offset)
            .with_attribute("range_size", self.size)
            .with_parent(parent)
    }
}

/// Resolver helper for `DATA_RANGE` layers.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataRangeResolverHelper;

impl ResolverHelper for DataRangeResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::DATA_RANGE
    }

    fn validate_path_spec(&self, path_spec: &PathSpec) -> Result<(), VfsError> {
        KIND.validate(path_spec)?;
        range_attributes(path_spec).map(|_| ())
    }

    fn new_file_object(&self, _path_spec: &PathSpec) -> Result<Box<dyn FileIo>, VfsError> {
        Ok(Box::new(DataRangeFileIo::default()))
    }

    fn new_file_system(&self, resolver: &Resolver, root: &PathSpec) -> Result<Arc<dyn FileSystem>, VfsError> {
        let (range_offset, range_size) = range_attributes(root)?;
        let file_system = StreamFileSystem::open(resolver, root)?;
        let size = clamped_size(range_offset, range_size, file_system.parent_size()?)?;
        Ok(Arc::new(file_system.with_size(size)))
    }
}

fn range_attributes(path_spec: &PathSpec) -> Result<(u64, u64), VfsError> {
    let offset = path_spec
        .integer_attribute("range_offset")
        .ok_or_else(|| VfsError::invalid_value("range_offset must be an integer"))?;
    let size = path_spec
        .integer_attribute("range_size")
        .ok_or_else(|| VfsError::invalid_value("range_size must be an integer"))?;
    Ok((offset, size))
}

/// Size of the window once clamped to the parent's end.
fn clamped_size(range_offset: u64, range_size: u64, parent_size: u64) -> Result<u64, VfsError> {
    if range_offset > parent_size {
        return Err(VfsError::invalid_value(format!(
            "range offset {range_offset} beyond end of parent ({parent_size} bytes)"
        )));
    }
    Ok(range_size.min(parent_size - range_offset))
}

/// Window of `size` bytes over the parent stream, clamped to the parent's
/// end.
#[derive(Default)]
struct DataRangeFileIo {
    parent: Option<FileIoHandle>,
    range_offset: u64,
    range_size: u64,
}

impl DataRangeFileIo {
    fn parent(&self) -> Result<&FileIoHandle, VfsError> {
        self.parent.as_ref().ok_or(VfsError::NotOpen { operation: "read" })
    }
}

impl FileIo for DataRangeFileIo {
    fn open(&mut self, resolver: &Resolver, path_spec: &PathSpec) -> Result<(), VfsError> {
        let (range_offset, range_size) = range_attributes(path_spec)?;
        let parent_spec = path_spec
            .parent()
            .ok_or_else(|| VfsError::path_spec("DATA_RANGE path specification requires a parent"))?;

        let parent = resolver.open_file_object(parent_spec)?;
        self.range_size = clamped_size(range_offset, range_size, parent.size()?)?;
        self.range_offset = range_offset;
        self.parent = Some(parent);
        Ok(())
    }

    fn close(&mut self) -> Result<(), VfsError> {
        match self.parent.take() {
            Some(parent) => parent.close(),
            None => Ok(()),
        }
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, VfsError> {
        if offset >= self.range_size {
            return Ok(0);
        }
        let available = (self.range_size - offset).min(buf.len() as u64) as usize;
        self.parent()?
            .read_at(self.range_offset + offset, &mut buf[..available])
    }

    fn size(&mut self) -> Result<u64, VfsError> {
        Ok(self.range_size)
    }
}
