//! Core types shared by file systems, file entries and file objects.

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use crate::VfsError;

/// Type of a file entry.
///
/// Exactly one of the `is_*` predicates on a [`FileEntry`](crate::FileEntry)
/// is true for every type except [`EntryType::Undefined`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EntryType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Link,
    /// Block or character device.
    Device,
    /// Named pipe.
    Pipe,
    /// Socket.
    Socket,
    /// The backend could not determine the type.
    #[default]
    Undefined,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryType::File => "file",
            EntryType::Directory => "directory",
            EntryType::Link => "link",
            EntryType::Device => "device",
            EntryType::Pipe => "pipe",
            EntryType::Socket => "socket",
            EntryType::Undefined => "undefined",
        };
        f.write_str(name)
    }
}

/// Metadata snapshot of a file entry.
///
/// Timestamps are optional because many layers (compressed or encrypted
/// streams, byte ranges) have no native notion of them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stat {
    /// Type of the entry.
    pub entry_type: EntryType,
    /// Size in bytes of the data exposed by this layer.
    pub size: u64,
    /// Whether the entry is allocated.
    pub is_allocated: bool,
    /// Last access time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub access_time: Option<SystemTime>,
    /// Last modification time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub modification_time: Option<SystemTime>,
    /// Last metadata change time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub change_time: Option<SystemTime>,
    /// Creation time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub creation_time: Option<SystemTime>,
    /// Inode or other backend identifier.
    pub inode: Option<u64>,
    /// Unix mode bits, when the backend has them.
    pub mode: Option<u32>,
}

impl Stat {
    /// Stat of an allocated entry of the given type and size, without times.
    pub fn new(entry_type: EntryType, size: u64) -> Self {
        Self {
            entry_type,
            size,
            is_allocated: true,
            ..Self::default()
        }
    }

    /// Returns `true` if this is a regular file.
    #[inline]
    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    /// Returns `true` if this is a directory.
    #[inline]
    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    /// Returns `true` if this is a symbolic link.
    #[inline]
    pub fn is_link(&self) -> bool {
        self.entry_type == EntryType::Link
    }
}

/// Access mode for opening a file object.
///
/// Only binary reading is supported. Parsing any other mode string fails with
/// [`VfsError::InvalidValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Read binary data (`"rb"`).
    #[default]
    ReadBinary,
}

impl FromStr for OpenMode {
    type Err = VfsError;

    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode {
            "rb" => Ok(OpenMode::ReadBinary),
            other => Err(VfsError::invalid_value(format!("unsupported mode: {other}"))),
        }
    }
}

/// Serde support for optional SystemTime (when serde feature is enabled).
#[cfg(feature = "serde")]
mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        time.map(|time| {
            let duration = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
            (duration.as_secs(), duration.subsec_nanos())
        })
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SystemTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<(u64, u32)> = Deserialize::deserialize(deserializer)?;
        Ok(value.map(|(secs, nanos)| UNIX_EPOCH + Duration::new(secs, nanos)))
    }
}
