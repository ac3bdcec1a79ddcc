//! # Layer Trait
//!
//! Fluent stacking of format layers onto a parent path specification.
//!
//! ## Overview
//!
//! Each format backend that decodes a parent stream provides a small value
//! type describing its layer (`Gzip`, `EncryptedStream`, `DataRange`).
//! Implementing [`Layer`] for it lets callers build chains outward from the
//! leaf:
//!
//! ```text
//! PathSpec (leaf) ──▶ .layer(Gzip) ──▶ .layer(DataRange) ──▶ PathSpec (outer)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use layerfs::backends::{data_range::DataRange, encrypted_stream::EncryptedStream, os};
//! use layerfs::TypeIndicator;
//!
//! let spec = os::path_spec("/evidence/blob.rc4")
//!     .layer(EncryptedStream::rc4(b"secret".to_vec()))
//!     .layer(DataRange::new(0, 16));
//!
//! assert_eq!(spec.type_indicator(), &TypeIndicator::DATA_RANGE);
//! assert_eq!(spec.depth(), 3);
//! ```

use crate::PathSpec;

/// A format layer that can be wrapped around a parent path specification.
///
/// `layer(self, parent)` consumes both the description and the parent, so a
/// finished chain is never shared mutably.
///
/// # Example
///
/// ```rust
/// use layerfs::{Layer, PathSpec, TypeIndicator};
///
/// struct Bzip2;
///
/// impl Layer for Bzip2 {
///     fn layer(self, parent: PathSpec) -> PathSpec {
///         PathSpec::new(TypeIndicator::new("BZIP2")).with_parent(parent)
///     }
/// }
///
/// let leaf = PathSpec::new(TypeIndicator::OS).with_attribute("location", "/a.bz2");
/// let spec = leaf.clone().layer(Bzip2);
/// assert_eq!(spec.parent(), Some(&leaf));
/// ```
pub trait Layer {
    /// Build the path specification of this layer on top of `parent`.
    fn layer(self, parent: PathSpec) -> PathSpec;
}
