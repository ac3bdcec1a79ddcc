//! Gzip compressed stream layer.
//!
//! Multi-member streams decompress as their concatenation. The
//! decompressed size is established once, at open, by decoding the whole
//! stream; this also rejects corrupt input before the object is cached.
//!
//! Deflate cannot be entered mid-stream, so reads keep one decoder and its
//! position: forward reads skip ahead, backward reads restart from the first
//! member.

use std::io::{self, Read};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use flate2::read::{GzDecoder, MultiGzDecoder};

use super::stream::StreamFileSystem;
use crate::file_io::{FileIoHandle, StreamReader};
use crate::{FileIo, FileSystem, Layer, ParentRule, PathSpec, PathSpecKind, Resolver, ResolverHelper, TypeIndicator, VfsError};

/// Schema of a `GZIP` layer.
pub const KIND: PathSpecKind = PathSpecKind {
    type_indicator: TypeIndicator::GZIP,
    required: &[],
    optional: &[],
    parent: ParentRule::Required,
};

/// Layer description of a gzip stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Gzip;

impl Layer for Gzip {
    fn layer(self, parent: PathSpec) -> PathSpec {
        PathSpec::new(TypeIndicator::GZIP).with_parent(parent)
    }
}

/// Resolver helper for `GZIP` layers.
#[derive(Debug, Default, Clone, Copy)]
pub struct GzipResolverHelper;

impl ResolverHelper for GzipResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::GZIP
    }

    fn validate_path_spec(&self, path_spec: &PathSpec) -> Result<(), VfsError> {
        KIND.validate(path_spec)
    }

    fn new_file_object(&self, _path_spec: &PathSpec) -> Result<Box<dyn FileIo>, VfsError> {
        Ok(Box::new(GzipFileIo::default()))
    }

    fn new_file_system(&self, resolver: &Resolver, root: &PathSpec) -> Result<Arc<dyn FileSystem>, VfsError> {
        let file_system = StreamFileSystem::open(resolver, root)?;

        // Name and time of the root entry come from the first member header.
        let decoder = GzDecoder::new(file_system.parent_reader()?);
        let (name, modification_time) = match decoder.header() {
            Some(header) => {
                let name = header
                    .filename()
                    .map(|name| String::from_utf8_lossy(name).into_owned())
                    .unwrap_or_default();
                let modification_time = match header.mtime() {
                    0 => None,
                    seconds => Some(SystemTime::UNIX_EPOCH + Duration::from_secs(u64::from(seconds))),
                };
                (name, modification_time)
            }
            None => (String::new(), None),
        };

        let mut members = MultiGzDecoder::new(file_system.parent_reader()?);
        let size = io::copy(&mut members, &mut io::sink())
            .map_err(|error| VfsError::from_decode(root.comparable(), error))?;

        Ok(Arc::new(
            file_system
                .with_name(name)
                .with_size(size)
                .with_modification_time(modification_time),
        ))
    }
}

#[derive(Default)]
struct GzipFileIo {
    parent: Option<FileIoHandle>,
    location: String,
    decoder: Option<MultiGzDecoder<StreamReader>>,
    position: u64,
    size: u64,
}

impl GzipFileIo {
    fn parent(&self) -> Result<&FileIoHandle, VfsError> {
        self.parent.as_ref().ok_or(VfsError::NotOpen { operation: "read" })
    }

    fn decode_error(&self, error: io::Error) -> VfsError {
        VfsError::from_decode(self.location.clone(), error)
    }

    fn restart(&mut self) -> Result<(), VfsError> {
        let reader = self.parent()?.reader_at(0);
        self.decoder = Some(MultiGzDecoder::new(reader));
        self.position = 0;
        Ok(())
    }
}

impl FileIo for GzipFileIo {
    fn open(&mut self, resolver: &Resolver, path_spec: &PathSpec) -> Result<(), VfsError> {
        let parent_spec = path_spec
            .parent()
            .ok_or_else(|| VfsError::path_spec("GZIP path specification requires a parent"))?;
        let parent = resolver.open_file_object(parent_spec)?;
        self.location = parent_spec.comparable();

        let mut decoder = MultiGzDecoder::new(parent.reader_at(0));
        self.size = io::copy(&mut decoder, &mut io::sink()).map_err(|error| self.decode_error(error))?;
        tracing::debug!(location = %self.location, size = self.size, "decoded gzip stream size");

        self.parent = Some(parent);
        self.decoder = None;
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<(), VfsError> {
        self.decoder = None;
        match self.parent.take() {
            Some(parent) => parent.close(),
            None => Ok(()),
        }
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, VfsError> {
        if offset >= self.size {
            return Ok(0);
        }
        if self.decoder.is_none() || offset < self.position {
            tracing::trace!(offset, position = self.position, "restarting gzip decoder");
            self.restart()?;
        }

        let Some(decoder) = self.decoder.as_mut() else {
            return Err(VfsError::NotOpen { operation: "read" });
        };
        let skip = offset - self.position;
        if skip > 0 {
            let skipped = io::copy(&mut decoder.by_ref().take(skip), &mut io::sink());
            self.position += skipped.map_err(|error| VfsError::from_decode(self.location.clone(), error))?;
        }

        let read = decoder
            .read(buf)
            .map_err(|error| VfsError::from_decode(self.location.clone(), error))?;
        self.position += read as u64;
        Ok(read)
    }

    fn size(&mut self) -> Result<u64, VfsError> {
        Ok(self.size)
    }
}
