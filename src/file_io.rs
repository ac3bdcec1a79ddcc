//! # File Objects
//!
//! Byte-stream access to the data of one layer.
//!
//! ## Responsibility
//! - [`FileIo`]: what a format backend implements (open, close, positioned
//!   reads, size)
//! - [`FileObject`]: the open/closed state machine and current offset shared
//!   by every backend
//! - [`FileIoHandle`]: what the [`Resolver`] hands out; a cache lease that
//!   releases its reference on [`close`](FileIoHandle::close) or drop
//!
//! ## Seeking
//!
//! Every file object is seekable. Backends only ever see positioned reads
//! (`read_at`), so a codec whose source is not natively seekable re-derives
//! its state for a requested offset instead of exposing partial seekability.
//!
//! ## Thread Safety
//!
//! A cached file object sits behind its own mutex, separate from the resolver
//! cache lock. Single calls are atomic; a `seek` followed by a `read` on a
//! shared handle is not. Outer layers read their parent with
//! [`FileIoHandle::read_at`], which never moves the shared offset.

use std::io::{self, SeekFrom};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::resolver::context::Lease;
use crate::{OpenMode, PathSpec, Resolver, VfsError};

/// Backend contract for the data stream of one layer.
///
/// Implementations are created by a resolver helper and driven through a
/// [`FileObject`], which guarantees `open` has succeeded before any other
/// method is called and that `close` runs at most once.
///
/// # Parent Access
///
/// A layer that decodes a parent stream must obtain it with
/// `resolver.open_file_object(parent)` inside [`open`](FileIo::open) and read
/// only through that handle. Dropping the handle in [`close`](FileIo::close)
/// releases the parent.
pub trait FileIo: Send {
    /// Open the stream described by `path_spec`.
    ///
    /// # Errors
    ///
    /// - [`VfsError::AccessDenied`] if access was denied
    /// - [`VfsError::NotFound`] if the underlying resource is missing
    /// - [`VfsError::PathSpec`] if the path specification is incorrect
    /// - [`VfsError::InvalidValue`] if an attribute value is invalid
    fn open(&mut self, resolver: &Resolver, path_spec: &PathSpec) -> Result<(), VfsError>;

    /// Release the resources held by the stream.
    fn close(&mut self) -> Result<(), VfsError> {
        Ok(())
    }

    /// Read into `buf` starting at `offset` of the decoded stream.
    ///
    /// Returns the number of bytes read; `0` only at end of stream.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, VfsError>;

    /// Size of the stream as exposed by this layer.
    fn size(&mut self) -> Result<u64, VfsError>;
}

/// A file object: a [`FileIo`] backend plus open state and current offset.
pub struct FileObject {
    backend: Box<dyn FileIo>,
    path_spec: Option<PathSpec>,
    is_open: bool,
    offset: u64,
    size: Option<u64>,
}

impl FileObject {
    /// Wrap a backend in a closed file object.
    pub fn new(backend: Box<dyn FileIo>) -> Self {
        Self {
            backend,
            path_spec: None,
            is_open: false,
            offset: 0,
            size: None,
        }
    }

    /// Returns `true` between a successful `open` and `close`.
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Path specification the object was opened with.
    pub fn path_spec(&self) -> Option<&PathSpec> {
        self.path_spec.as_ref()
    }

    /// File objects are always seekable.
    pub fn is_seekable(&self) -> bool {
        true
    }

    /// Open the file object.
    ///
    /// # Errors
    ///
    /// - [`VfsError::AlreadyOpen`] if the object is already open
    /// - any error of [`FileIo::open`]
    pub fn open(&mut self, resolver: &Resolver, path_spec: &PathSpec, mode: OpenMode) -> Result<(), VfsError> {
        if self.is_open {
            return Err(VfsError::AlreadyOpen { operation: "open" });
        }
        match mode {
            OpenMode::ReadBinary => {}
        }

        self.backend.open(resolver, path_spec)?;
        self.path_spec = Some(path_spec.clone());
        self.is_open = true;
        self.offset = 0;
        self.size = None;
        Ok(())
    }

    /// Close the file object.
    ///
    /// # Errors
    ///
    /// - [`VfsError::NotOpen`] if the object is not open
    /// - any error of [`FileIo::close`]
    pub fn close(&mut self) -> Result<(), VfsError> {
        if !self.is_open {
            return Err(VfsError::NotOpen { operation: "close" });
        }
        self.is_open = false;
        self.backend.close()
    }

    /// Read up to `size` bytes at the current offset, or everything left
    /// when `size` is `None`.
    ///
    /// Returns fewer bytes only at end of stream and an empty buffer when the
    /// offset is at or past the end.
    pub fn read(&mut self, size: Option<usize>) -> Result<Vec<u8>, VfsError> {
        self.ensure_open("read")?;
        let remaining = self.size()?.saturating_sub(self.offset);
        let wanted = match size {
            Some(size) => remaining.min(size as u64),
            None => remaining,
        };

        let mut data = vec![0u8; wanted as usize];
        let read = self.fill(self.offset, &mut data)?;
        data.truncate(read);
        self.offset += read as u64;
        Ok(data)
    }

    /// Read into `buf` at the current offset and advance it.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, VfsError> {
        let read = self.read_at(self.offset, buf)?;
        self.offset += read as u64;
        Ok(read)
    }

    /// Read into `buf` at `offset` without touching the current offset.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, VfsError> {
        self.ensure_open("read")?;
        let remaining = self.size()?.saturating_sub(offset);
        let wanted = remaining.min(buf.len() as u64) as usize;
        self.fill(offset, &mut buf[..wanted])
    }

    /// Move the current offset.
    ///
    /// Seeking past the end is allowed; reads there return no data.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Io`] if the object is not open or the resulting offset
    ///   would be negative
    pub fn seek(&mut self, position: SeekFrom) -> Result<u64, VfsError> {
        if !self.is_open {
            return Err(self.seek_error("not open"));
        }
        let target = match position {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.offset) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.size()?) + i128::from(delta),
        };
        if target < 0 {
            return Err(self.seek_error("offset before start of stream"));
        }
        self.offset = u64::try_from(target).map_err(|_| self.seek_error("offset out of range"))?;
        Ok(self.offset)
    }

    /// Current offset.
    pub fn offset(&self) -> Result<u64, VfsError> {
        self.ensure_open("get offset")?;
        Ok(self.offset)
    }

    /// Size of the stream; computed once per open session.
    pub fn size(&mut self) -> Result<u64, VfsError> {
        self.ensure_open("get size")?;
        match self.size {
            Some(size) => Ok(size),
            None => {
                let size = self.backend.size()?;
                self.size = Some(size);
                Ok(size)
            }
        }
    }

    fn fill(&mut self, mut offset: u64, buf: &mut [u8]) -> Result<usize, VfsError> {
        let mut filled = 0;
        while filled < buf.len() {
            let read = self.backend.read_at(offset, &mut buf[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
            offset += read as u64;
        }
        Ok(filled)
    }

    fn ensure_open(&self, operation: &'static str) -> Result<(), VfsError> {
        if self.is_open {
            Ok(())
        } else {
            Err(VfsError::NotOpen { operation })
        }
    }

    fn seek_error(&self, reason: &str) -> VfsError {
        VfsError::Io {
            operation: "seek",
            location: self.location(),
            source: io::Error::new(io::ErrorKind::InvalidInput, reason.to_owned()),
        }
    }

    fn location(&self) -> String {
        self.path_spec
            .as_ref()
            .map(PathSpec::layer_comparable)
            .unwrap_or_default()
    }
}

impl Drop for FileObject {
    fn drop(&mut self) {
        if self.is_open {
            self.is_open = false;
            if let Err(error) = self.backend.close() {
                tracing::warn!(location = %self.location(), %error, "implicit close failed");
            }
        }
    }
}

pub(crate) type SharedFileObject = Arc<Mutex<FileObject>>;

/// A resolved file object, leased from the resolver cache.
///
/// Handles for the same path specification share one file object, and with
/// it the current offset. The cache reference is released exactly once: by
/// [`close`](FileIoHandle::close), or by drop on every other exit path.
///
/// # Example
///
/// ```rust,no_run
/// use layerfs::backends::{gzip::Gzip, os};
/// use layerfs::{Resolver, VfsError};
///
/// fn first_line(resolver: &Resolver) -> Result<Vec<u8>, VfsError> {
///     let spec = os::path_spec("/var/log/syslog.1.gz").layer(Gzip);
///     let handle = resolver.open_file_object(&spec)?;
///     let data = handle.read(Some(128))?;
///     handle.close()?;
///     Ok(data)
/// }
/// ```
pub struct FileIoHandle {
    file_object: SharedFileObject,
    path_spec: PathSpec,
    lease: Option<Lease>,
}

impl FileIoHandle {
    pub(crate) fn new(file_object: SharedFileObject, path_spec: PathSpec, lease: Lease) -> Self {
        Self {
            file_object,
            path_spec,
            lease: Some(lease),
        }
    }

    /// Path specification this handle was resolved from.
    pub fn path_spec(&self) -> &PathSpec {
        &self.path_spec
    }

    /// See [`FileObject::read`].
    pub fn read(&self, size: Option<usize>) -> Result<Vec<u8>, VfsError> {
        self.file_object.lock().read(size)
    }

    /// See [`FileObject::read_at`]. The shared offset is left untouched.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, VfsError> {
        self.file_object.lock().read_at(offset, buf)
    }

    /// See [`FileObject::seek`].
    pub fn seek(&self, position: SeekFrom) -> Result<u64, VfsError> {
        self.file_object.lock().seek(position)
    }

    /// See [`FileObject::offset`].
    pub fn offset(&self) -> Result<u64, VfsError> {
        self.file_object.lock().offset()
    }

    /// See [`FileObject::size`].
    pub fn size(&self) -> Result<u64, VfsError> {
        self.file_object.lock().size()
    }

    /// File objects are always seekable.
    pub fn is_seekable(&self) -> bool {
        true
    }

    /// A reader with its own offset over the same file object.
    ///
    /// The reader does not hold a cache reference; it stays usable while
    /// this handle (or another lease on the same object) is alive.
    pub fn reader_at(&self, offset: u64) -> StreamReader {
        StreamReader {
            file_object: Arc::clone(&self.file_object),
            offset,
        }
    }

    /// Returns `true` if both handles lease the same cached file object.
    pub fn shares_file_object_with(&self, other: &FileIoHandle) -> bool {
        Arc::ptr_eq(&self.file_object, &other.file_object)
    }

    /// Release this handle's cache reference.
    ///
    /// The underlying file object is closed when the last reference goes.
    ///
    /// # Errors
    ///
    /// - [`VfsError::Io`] or any backend error raised while closing
    pub fn close(mut self) -> Result<(), VfsError> {
        match self.lease.take() {
            Some(lease) => lease.release(),
            None => Ok(()),
        }
    }
}

impl Drop for FileIoHandle {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            if let Err(error) = lease.release() {
                tracing::warn!(path_spec = %self.path_spec.layer_comparable(), %error, "release on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for FileIoHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileIoHandle")
            .field("path_spec", &self.path_spec.layer_comparable())
            .finish_non_exhaustive()
    }
}

impl io::Read for FileIoHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.file_object.lock().read_into(buf)?)
    }
}

impl io::Seek for FileIoHandle {
    fn seek(&mut self, position: SeekFrom) -> io::Result<u64> {
        Ok(self.file_object.lock().seek(position)?)
    }
}

/// Independent cursor over a shared file object.
///
/// Used by decoding layers to feed their parent stream to readers such as
/// decompressors without disturbing anybody else's offset.
pub struct StreamReader {
    file_object: SharedFileObject,
    offset: u64,
}

impl StreamReader {
    /// Current offset of this reader.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl io::Read for StreamReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.file_object.lock().read_at(self.offset, buf)?;
        self.offset += read as u64;
        Ok(read)
    }
}

impl io::Seek for StreamReader {
    fn seek(&mut self, position: SeekFrom) -> io::Result<u64> {
        let target = match position {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.offset) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.file_object.lock().size()?) + i128::from(delta),
        };
        self.offset = u64::try_from(target)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "invalid seek offset"))?;
        Ok(self.offset)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory backend for exercising the file object state machine.
    pub(crate) struct MemoryFileIo {
        data: Vec<u8>,
        pub(crate) closes: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl MemoryFileIo {
        pub(crate) fn new(data: &[u8]) -> Self {
            Self {
                data: data.to_vec(),
                closes: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            }
        }
    }

    impl FileIo for MemoryFileIo {
        fn open(&mut self, _: &Resolver, _: &PathSpec) -> Result<(), VfsError> {
            Ok(())
        }

        fn close(&mut self) -> Result<(), VfsError> {
            self.closes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, VfsError> {
            let start = (offset as usize).min(self.data.len());
            // Short reads on purpose, to exercise the fill loop.
            let end = (start + buf.len()).min(self.data.len()).min(start + 3);
            buf[..end - start].copy_from_slice(&self.data[start..end]);
            Ok(end - start)
        }

        fn size(&mut self) -> Result<u64, VfsError> {
            Ok(self.data.len() as u64)
        }
    }

    fn spec() -> PathSpec {
        PathSpec::new(crate::TypeIndicator::new("MEMORY"))
    }

    fn opened(data: &[u8]) -> FileObject {
        let mut file_object = FileObject::new(Box::new(MemoryFileIo::new(data)));
        file_object
            .open(&Resolver::new(), &spec(), OpenMode::ReadBinary)
            .unwrap();
        file_object
    }

    #[test]
    fn operations_require_open() {
        let mut file_object = FileObject::new(Box::new(MemoryFileIo::new(b"abc")));
        assert!(matches!(file_object.read(None), Err(VfsError::NotOpen { .. })));
        assert!(matches!(file_object.offset(), Err(VfsError::NotOpen { .. })));
        assert!(matches!(file_object.size(), Err(VfsError::NotOpen { .. })));
        assert!(matches!(
            file_object.seek(SeekFrom::Start(0)),
            Err(VfsError::Io { operation: "seek", .. })
        ));
        assert!(matches!(file_object.close(), Err(VfsError::NotOpen { .. })));
    }

    #[test]
    fn open_twice_fails() {
        let mut file_object = opened(b"abc");
        let err = file_object
            .open(&Resolver::new(), &spec(), OpenMode::ReadBinary)
            .unwrap_err();
        assert!(matches!(err, VfsError::AlreadyOpen { .. }));
        assert!(file_object.is_seekable());
    }

    #[test]
    fn read_sized_and_remaining() {
        let mut file_object = opened(b"hello world");
        assert_eq!(file_object.read(Some(5)).unwrap(), b"hello");
        assert_eq!(file_object.offset().unwrap(), 5);
        assert_eq!(file_object.read(None).unwrap(), b" world");
        assert_eq!(file_object.read(None).unwrap(), b"");
        assert_eq!(file_object.read(Some(4)).unwrap(), b"");
    }

    #[test]
    fn seek_whence_variants() {
        let mut file_object = opened(b"0123456789");
        assert_eq!(file_object.seek(SeekFrom::Start(2)).unwrap(), 2);
        assert_eq!(file_object.seek(SeekFrom::Current(3)).unwrap(), 5);
        assert_eq!(file_object.seek(SeekFrom::End(-1)).unwrap(), 9);
        assert_eq!(file_object.read(None).unwrap(), b"9");
    }

    #[test]
    fn seek_past_end_reads_empty() {
        let mut file_object = opened(b"abc");
        assert_eq!(file_object.seek(SeekFrom::Start(100)).unwrap(), 100);
        assert_eq!(file_object.read(None).unwrap(), b"");
        assert_eq!(file_object.read(Some(10)).unwrap(), b"");
    }

    #[test]
    fn seek_before_start_fails() {
        let mut file_object = opened(b"abc");
        assert!(matches!(
            file_object.seek(SeekFrom::Current(-1)),
            Err(VfsError::Io { operation: "seek", .. })
        ));
        assert_eq!(file_object.offset().unwrap(), 0);
    }

    #[test]
    fn read_at_leaves_offset_alone() {
        let mut file_object = opened(b"abcdefgh");
        let mut buf = [0u8; 4];
        assert_eq!(file_object.read_at(4, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"efgh");
        assert_eq!(file_object.offset().unwrap(), 0);
        assert_eq!(file_object.read_at(8, &mut buf).unwrap(), 0);
    }

    #[test]
    fn close_then_drop_closes_backend_once() {
        let backend = MemoryFileIo::new(b"abc");
        let closes = Arc::clone(&backend.closes);
        let mut file_object = FileObject::new(Box::new(backend));
        file_object
            .open(&Resolver::new(), &spec(), OpenMode::ReadBinary)
            .unwrap();
        file_object.close().unwrap();
        drop(file_object);
        assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_closes_open_object() {
        let backend = MemoryFileIo::new(b"abc");
        let closes = Arc::clone(&backend.closes);
        let mut file_object = FileObject::new(Box::new(backend));
        file_object
            .open(&Resolver::new(), &spec(), OpenMode::ReadBinary)
            .unwrap();
        drop(file_object);
        assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
