//! Format backends bundled with the crate.
//!
//! | Module | Type indicator | Parent | File system |
//! |--------|----------------|--------|-------------|
//! | [`os`] | `OS` | none | host directory tree |
//! | [`fake`] | `FAKE` | none | in-memory tree |
//! | `gzip` | `GZIP` | required | single virtual file |
//! | [`encrypted_stream`] | `ENCRYPTED_STREAM` | required | single virtual file |
//! | [`data_range`] | `DATA_RANGE` | required | single virtual file |
//!
//! `gzip` is compiled with the `gzip` feature (on by default).

pub mod data_range;
pub mod encrypted_stream;
pub mod fake;
#[cfg(feature = "gzip")]
pub mod gzip;
pub mod os;
mod stream;

use std::sync::Arc;

use crate::{PathSpecKind, ResolverHelper};

/// Schemas of every bundled layer type.
pub(crate) fn default_kinds() -> Vec<PathSpecKind> {
    let mut kinds = vec![os::KIND, fake::KIND, data_range::KIND, encrypted_stream::KIND];
    #[cfg(feature = "gzip")]
    kinds.push(gzip::KIND);
    kinds
}

/// Helpers registered by [`Resolver::with_default_helpers`](crate::Resolver::with_default_helpers).
pub(crate) fn default_helpers() -> Vec<Arc<dyn ResolverHelper>> {
    let mut helpers: Vec<Arc<dyn ResolverHelper>> = vec![
        Arc::new(os::OsResolverHelper),
        Arc::new(data_range::DataRangeResolverHelper),
        Arc::new(encrypted_stream::EncryptedStreamResolverHelper),
    ];
    #[cfg(feature = "gzip")]
    helpers.push(Arc::new(gzip::GzipResolverHelper));
    helpers
}
