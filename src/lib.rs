//! # layerfs
//!
//! A **layered virtual file system**: read data nested inside other data
//! (a file inside a compressed stream inside an encrypted stream inside a
//! native file) through one uniform model.
//!
//! ---
//!
//! ## Quick Start
//!
//! Describe the nesting as a [`PathSpec`] chain and hand it to a
//! [`Resolver`]:
//!
//! ```rust,no_run
//! use layerfs::backends::{gzip::Gzip, os};
//! use layerfs::{FileEntryExt, Resolver, VfsError};
//!
//! fn show(resolver: &Resolver) -> Result<(), VfsError> {
//!     let spec = os::path_spec("/var/log/syslog.2.gz").layer(Gzip);
//!
//!     // Byte stream of the outermost layer
//!     let file_object = resolver.open_file_object(&spec)?;
//!     println!("{} bytes decompressed", file_object.size()?);
//!
//!     // Metadata and navigation
//!     if let Some(entry) = resolver.open_file_entry(&spec)? {
//!         println!("{} {:?}", entry.name(), entry.stat()?);
//!         let compressed = entry.parent_layer_file_entry()?;
//!         println!("inside {:?}", compressed.map(|e| e.name().to_owned()));
//!         println!("{}", entry.read_to_string()?);
//!     }
//!     Ok(())
//! }
//!
//! show(&Resolver::with_default_helpers()).unwrap();
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`PathSpec`] | Immutable chain of layer descriptions, innermost leaf to outermost layer |
//! | [`Resolver`] | Opens file objects, file systems and entries; owns the cache |
//! | [`ResolverHelper`] | Per-type factory registered under a [`TypeIndicator`] |
//! | [`FileIoHandle`] | Leased byte stream of one layer (read, seek, size) |
//! | [`FileSystemRef`] | Leased namespace of one layer |
//! | [`FileEntry`] | One node: name, type, [`Stat`], parent, children, data stream |
//! | [`Context`] | Reference-counted cache of open objects |
//! | [`VfsError`] | Error type with context |
//!
//! ---
//!
//! ## Layers
//!
//! ```text
//! type: OS, location: /cases/evidence.rc4        <- leaf
//!   └─ type: ENCRYPTED_STREAM, rc4, key          <- decrypts the OS file
//!        └─ type: GZIP                           <- decompresses the plaintext
//!             └─ type: DATA_RANGE, 0, 4096       <- first 4 KiB of it
//! ```
//!
//! Each layer reads its parent only through a handle obtained from the
//! resolver, so a parent shared by several outer layers is opened once.
//!
//! ---
//!
//! ## Lifetimes
//!
//! Handles are leases on the resolver cache. Closing or dropping the last
//! lease on an object closes it, which in turn releases its parent layers.
//!
//! ---
//!
//! ## Thread Safety
//!
//! [`Resolver`], [`FileIoHandle`], [`FileSystemRef`] and file entries are
//! `Send + Sync`. Backends open outside the cache lock, and concurrent
//! requests for the same chain wait for a single open. Each file object
//! carries its own lock for reads.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `serde` | yes | Serialization for [`PathSpec`] and [`Stat`], JSON helpers |
//! | `gzip` | yes | The `GZIP` layer |

// Private modules
mod error;
mod ext;
mod file_entry;
mod file_io;
mod file_system;
mod layer;
mod path_spec;
mod resolver;
mod types;

pub mod backends;

// Public re-exports - error types
pub use error::VfsError;

// Public re-exports - core types
pub use path_spec::{AttributeValue, Layers, ParentRule, PathSpec, PathSpecFactory, PathSpecKind, TypeIndicator};
pub use types::{EntryType, OpenMode, Stat};

// Public re-exports - backend contracts
pub use file_entry::{FileEntry, SubFileEntries};
pub use file_io::{FileIo, FileIoHandle, FileObject, StreamReader};
pub use file_system::{FileSystem, FileSystemRef};

// Public re-exports - resolution
pub use resolver::{CacheKey, Context, HelperRegistry, Resolver, ResolverHelper};

// Public re-exports - infrastructure
pub use ext::FileEntryExt;
pub use layer::Layer;

// Conditional re-exports
#[cfg(feature = "serde")]
pub use ext::{FileEntryExtJson, PathSpecJson};
