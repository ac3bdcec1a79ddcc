//! Encrypted stream layer.
//!
//! The layer decrypts its parent with the method named by the
//! `encryption_method` attribute. Key material travels as attributes of the
//! path specification (`key`, and `initialization_vector` / `cipher_mode`
//! for block ciphers).
//!
//! | Method | Supported |
//! |--------|-----------|
//! | `rc4` | yes |
//! | `aes`, `blowfish`, `des3` | no, rejected with [`VfsError::InvalidValue`] |
//!
//! RC4 is a stream cipher: the keystream position is the stream offset, so
//! the decrypted size equals the parent size and a backward seek restarts
//! the keystream.

use std::sync::Arc;

use super::stream::StreamFileSystem;
use crate::file_io::FileIoHandle;
use crate::{FileIo, FileSystem, Layer, ParentRule, PathSpec, PathSpecKind, Resolver, ResolverHelper, TypeIndicator, VfsError};

/// Schema of an `ENCRYPTED_STREAM` layer.
pub const KIND: PathSpecKind = PathSpecKind {
    type_indicator: TypeIndicator::ENCRYPTED_STREAM,
    required: &["encryption_method"],
    optional: &["key", "initialization_vector", "cipher_mode"],
    parent: ParentRule::Required,
};

/// `encryption_method` value of RC4.
pub const METHOD_RC4: &str = "rc4";

const UNSUPPORTED_METHODS: &[&str] = &["aes", "blowfish", "des3"];

/// Layer description of an encrypted stream.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedStream {
    method: String,
    key: Vec<u8>,
}

impl EncryptedStream {
    /// RC4 encrypted stream with the given key.
    pub fn rc4(key: Vec<u8>) -> Self {
        Self {
            method: METHOD_RC4.to_owned(),
            key,
        }
    }
}

impl std::fmt::Debug for EncryptedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedStream")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

impl Layer for EncryptedStream {
    fn layer(self, parent: PathSpec) -> PathSpec {
        PathSpec::new(TypeIndicator::ENCRYPTED_STREAM)
            .with_attribute("encryption_method", self.method)
            .with_attribute("key", self.key)
            .with_parent(parent)
    }
}

/// Resolver helper for `ENCRYPTED_STREAM` layers.
#[derive(Debug, Default, Clone, Copy)]
pub struct EncryptedStreamResolverHelper;

impl ResolverHelper for EncryptedStreamResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::ENCRYPTED_STREAM
    }

    fn validate_path_spec(&self, path_spec: &PathSpec) -> Result<(), VfsError> {
        KIND.validate(path_spec)?;
        cipher_key(path_spec).map(|_| ())
    }

    fn new_file_object(&self, _path_spec: &PathSpec) -> Result<Box<dyn FileIo>, VfsError> {
        Ok(Box::new(EncryptedStreamFileIo::default()))
    }

    fn new_file_system(&self, resolver: &Resolver, root: &PathSpec) -> Result<Arc<dyn FileSystem>, VfsError> {
        let file_system = StreamFileSystem::open(resolver, root)?;
        let size = file_system.parent_size()?;
        Ok(Arc::new(file_system.with_size(size)))
    }
}

/// Check the method and return the key it needs.
fn cipher_key(path_spec: &PathSpec) -> Result<Vec<u8>, VfsError> {
    let method = path_spec
        .string_attribute("encryption_method")
        .ok_or_else(|| VfsError::invalid_value("encryption_method must be a string"))?;
    match method {
        METHOD_RC4 => {
            let key = path_spec
                .bytes_attribute("key")
                .ok_or_else(|| VfsError::path_spec("rc4 encrypted stream requires a key"))?;
            Rc4::new(key)?;
            Ok(key.to_vec())
        }
        other if UNSUPPORTED_METHODS.contains(&other) => Err(VfsError::invalid_value(format!(
            "unsupported encryption method: {other}"
        ))),
        other => Err(VfsError::invalid_value(format!("unknown encryption method: {other}"))),
    }
}

#[derive(Default)]
struct EncryptedStreamFileIo {
    parent: Option<FileIoHandle>,
    key: Vec<u8>,
    cipher: Option<Rc4>,
    position: u64,
}

impl FileIo for EncryptedStreamFileIo {
    fn open(&mut self, resolver: &Resolver, path_spec: &PathSpec) -> Result<(), VfsError> {
        let key = cipher_key(path_spec)?;
        let parent_spec = path_spec
            .parent()
            .ok_or_else(|| VfsError::path_spec("ENCRYPTED_STREAM path specification requires a parent"))?;

        self.parent = Some(resolver.open_file_object(parent_spec)?);
        self.cipher = Some(Rc4::new(&key)?);
        self.key = key;
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<(), VfsError> {
        self.cipher = None;
        match self.parent.take() {
            Some(parent) => parent.close(),
            None => Ok(()),
        }
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, VfsError> {
        let parent = self.parent.as_ref().ok_or(VfsError::NotOpen { operation: "read" })?;
        let read = parent.read_at(offset, buf)?;

        if self.cipher.is_none() || offset < self.position {
            tracing::trace!(offset, position = self.position, "restarting rc4 keystream");
            self.cipher = Some(Rc4::new(&self.key)?);
            self.position = 0;
        }
        let cipher = self.cipher.as_mut().ok_or(VfsError::NotOpen { operation: "read" })?;
        cipher.skip(offset - self.position);
        cipher.apply(&mut buf[..read]);
        self.position = offset + read as u64;
        Ok(read)
    }

    fn size(&mut self) -> Result<u64, VfsError> {
        self.parent
            .as_ref()
            .ok_or(VfsError::NotOpen { operation: "get size" })?
            .size()
    }
}

/// RC4 keystream generator.
struct Rc4 {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    fn new(key: &[u8]) -> Result<Self, VfsError> {
        if key.is_empty() || key.len() > 256 {
            return Err(VfsError::invalid_value(format!(
                "rc4 key must be 1 to 256 bytes, got {}",
                key.len()
            )));
        }

        let mut state = [0u8; 256];
        for (index, value) in state.iter_mut().enumerate() {
            *value = index as u8;
        }
        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
            state.swap(i, usize::from(j));
        }
        Ok(Self { state, i: 0, j: 0 })
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.state[usize::from(self.i)]);
        self.state.swap(usize::from(self.i), usize::from(self.j));
        let index = self.state[usize::from(self.i)].wrapping_add(self.state[usize::from(self.j)]);
        self.state[usize::from(index)]
    }

    fn skip(&mut self, count: u64) {
        for _ in 0..count {
            self.next_byte();
        }
    }

    fn apply(&mut self, data: &mut [u8]) {
        for byte in data {
            *byte ^= self.next_byte();
        }
    }
}
