//! # Extension Traits
//!
//! Convenience methods for file entries and path specifications.
//!
//! ## Overview
//!
//! [`FileEntryExt`] provides commonly-needed helpers that aren't part of the
//! core [`FileEntry`] contract. They are default methods with a blanket
//! implementation, so every backend's entries get them for free.
//!
//! ## Available Methods
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`read_data`](FileEntryExt::read_data) | Read the whole data stream |
//! | [`read_to_string`](FileEntryExt::read_to_string) | Read the data stream as UTF-8 |
//! | [`sub_file_entry_names`](FileEntryExt::sub_file_entry_names) | Names of the sub entries |
//! | [`sub_file_entry_by_name`](FileEntryExt::sub_file_entry_by_name) | Find a sub entry by name |
//!
//! ## JSON Support (Feature-Gated)
//!
//! With the `serde` feature enabled (the default), additional methods are
//! available:
//!
//! | Method | Description |
//! |--------|-------------|
//! | `PathSpecJson::to_json` | Serialize a path specification chain |
//! | `PathSpecJson::from_json` | Deserialize a path specification chain |
//! | `FileEntryExtJson::read_json` | Read and deserialize a JSON data stream |

use std::io::Read;

use crate::{FileEntry, VfsError};

/// Extension methods for any file entry.
///
/// # Example
///
/// ```rust
/// use layerfs::{FileEntry, FileEntryExt, VfsError};
///
/// fn dump(entry: &dyn FileEntry) -> Result<(), VfsError> {
///     if entry.is_directory() {
///         for name in entry.sub_file_entry_names()? {
///             println!("{name}");
///         }
///     } else {
///         println!("{} bytes", entry.read_data()?.len());
///     }
///     Ok(())
/// }
/// ```
pub trait FileEntryExt: FileEntry {
    /// Read the entire data stream of the entry.
    ///
    /// # Errors
    ///
    /// - any error raised while resolving or reading the data stream
    fn read_data(&self) -> Result<Vec<u8>, VfsError> {
        let file_object = self.file_object()?;
        let mut data = Vec::new();
        file_object
            .reader_at(0)
            .read_to_end(&mut data)
            .map_err(|e| VfsError::from_io("read", self.path_spec().layer_comparable(), e))?;
        file_object.close()?;
        Ok(data)
    }

    /// Read the entire data stream as UTF-8 text.
    ///
    /// # Errors
    ///
    /// - [`VfsError::InvalidData`] if the data is not valid UTF-8
    fn read_to_string(&self) -> Result<String, VfsError> {
        String::from_utf8(self.read_data()?).map_err(|e| VfsError::InvalidData {
            location: self.path_spec().layer_comparable(),
            details: e.to_string(),
        })
    }

    /// Names of the sub entries, in enumeration order.
    fn sub_file_entry_names(&self) -> Result<Vec<String>, VfsError> {
        self.sub_file_entries()?
            .map(|entry| entry.map(|entry| entry.name().to_owned()))
            .collect()
    }

    /// The sub entry with the given name, if any.
    fn sub_file_entry_by_name(&self, name: &str) -> Result<Option<Box<dyn FileEntry>>, VfsError> {
        for entry in self.sub_file_entries()? {
            let entry = entry?;
            if entry.name() == name {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}

// Blanket implementation - every file entry gets FileEntryExt for free
impl<E: FileEntry + ?Sized> FileEntryExt for E {}

// =============================================================================
// JSON Support (Feature-Gated)
// =============================================================================

#[cfg(feature = "serde")]
mod json {
    use super::*;
    use crate::PathSpec;
    use serde::de::DeserializeOwned;

    /// JSON form of path specification chains.
    ///
    /// Available when the `serde` feature is enabled.
    ///
    /// # Example
    ///
    /// ```rust
    /// use layerfs::backends::{data_range::DataRange, os};
    /// use layerfs::{PathSpec, PathSpecJson};
    ///
    /// let spec = os::path_spec("/images/disk.raw").layer(DataRange::new(512, 4096));
    /// let json = spec.to_json().unwrap();
    /// assert_eq!(PathSpec::from_json(&json).unwrap(), spec);
    /// ```
    pub trait PathSpecJson: Sized {
        /// Serialize the chain, outermost layer first.
        ///
        /// # Errors
        ///
        /// - `VfsError::Serialization` if serialization failed
        fn to_json(&self) -> Result<String, VfsError>;

        /// Deserialize a chain.
        ///
        /// The result is structurally checked only; validate it against a
        /// [`PathSpecFactory`](crate::PathSpecFactory) or let the resolver
        /// reject unsupported layers.
        ///
        /// # Errors
        ///
        /// - `VfsError::Deserialization` if the input is not a chain
        fn from_json(json: &str) -> Result<Self, VfsError>;
    }

    impl PathSpecJson for PathSpec {
        fn to_json(&self) -> Result<String, VfsError> {
            serde_json::to_string(self).map_err(|e| VfsError::Serialization(e.to_string()))
        }

        fn from_json(json: &str) -> Result<Self, VfsError> {
            serde_json::from_str(json).map_err(|e| VfsError::Deserialization(e.to_string()))
        }
    }

    /// JSON extension methods for file entries.
    ///
    /// Available when the `serde` feature is enabled.
    pub trait FileEntryExtJson: FileEntry {
        /// Read the data stream and deserialize it as JSON.
        ///
        /// # Errors
        ///
        /// - `VfsError::Deserialization` if JSON parsing failed
        /// - any error of [`FileEntryExt::read_data`]
        fn read_json<T: DeserializeOwned>(&self) -> Result<T, VfsError> {
            let data = self.read_data()?;
            serde_json::from_slice(&data).map_err(|e| VfsError::Deserialization(e.to_string()))
        }
    }

    // Blanket implementation
    impl<E: FileEntry + ?Sized> FileEntryExtJson for E {}
}

#[cfg(feature = "serde")]
pub use json::{FileEntryExtJson, PathSpecJson};
