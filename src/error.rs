//! Error types for layered path resolution and file access.

use std::io;

/// Error type shared by path specifications, the resolver and every backend.
///
/// Errors raised by an inner layer travel unchanged to the outermost caller;
/// no layer rewraps or masks the failure of the layer beneath it.
/// Uses `#[non_exhaustive]` for forward compatibility.
///
/// A lookup that is well formed but matches nothing is not an error: it is
/// reported as `Ok(None)`.
///
/// # Examples
///
/// ```rust
/// use layerfs::VfsError;
///
/// let err = VfsError::NotFound { location: "/missing".into() };
/// assert_eq!(err.to_string(), "not found: /missing");
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum VfsError {
    // Path specification errors
    /// The path specification chain is malformed or unsupported.
    #[error("path specification error: {reason}")]
    PathSpec {
        /// What is wrong with the chain.
        reason: String,
    },

    // Lookup errors
    /// The underlying resource does not exist.
    #[error("not found: {location}")]
    NotFound {
        /// Location of the missing resource.
        location: String,
    },

    /// No resolver helper is registered for a type indicator.
    #[error("no resolver helper registered for type indicator: {type_indicator}")]
    HelperNotFound {
        /// The unknown type indicator.
        type_indicator: String,
    },

    /// A resolver helper is already registered for a type indicator.
    #[error("resolver helper already registered for type indicator: {type_indicator}")]
    AlreadyRegistered {
        /// The duplicated type indicator.
        type_indicator: String,
    },

    // Permission errors
    /// Access to a resource was denied.
    #[error("access denied: {location} ({reason})")]
    AccessDenied {
        /// Location that was denied.
        location: String,
        /// Reason reported by the backend.
        reason: String,
    },

    // Argument errors
    /// An argument or attribute combination is invalid.
    #[error("invalid value: {reason}")]
    InvalidValue {
        /// Description of the invalid value.
        reason: String,
    },

    // State errors
    /// The object was already open.
    #[error("{operation}: already open")]
    AlreadyOpen {
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// The object is not open.
    #[error("{operation}: not open")]
    NotOpen {
        /// The operation that was attempted.
        operation: &'static str,
    },

    // Data errors
    /// The data of a layer could not be decoded.
    #[error("invalid data: {location} ({details})")]
    InvalidData {
        /// Location of the layer with invalid data.
        location: String,
        /// Details about the invalid data.
        details: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    // Backend errors
    /// The backend does not implement this operation.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: &'static str,
    },

    /// I/O error with context.
    #[error("{operation} failed for {location}: {source}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// The location involved in the operation.
        location: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

impl VfsError {
    /// Shorthand for [`VfsError::PathSpec`].
    pub fn path_spec(reason: impl Into<String>) -> Self {
        VfsError::PathSpec {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`VfsError::InvalidValue`].
    pub fn invalid_value(reason: impl Into<String>) -> Self {
        VfsError::InvalidValue {
            reason: reason.into(),
        }
    }

    /// Classify an I/O error raised while performing `operation` on `location`.
    ///
    /// Missing resources and permission failures become their dedicated
    /// variants; everything else is kept as [`VfsError::Io`]. An error that
    /// wraps a `VfsError` (one raised beneath a
    /// [`std::io::Read`] adapter) is returned unchanged.
    pub fn from_io(operation: &'static str, location: impl Into<String>, error: io::Error) -> Self {
        let error = match unwrap_inner(error) {
            Ok(inner) => return inner,
            Err(error) => error,
        };
        let location = location.into();
        match error.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound { location },
            io::ErrorKind::PermissionDenied => VfsError::AccessDenied {
                location,
                reason: error.to_string(),
            },
            _ => VfsError::Io {
                operation,
                location,
                source: error,
            },
        }
    }

    /// Classify an error raised while decoding a stream.
    ///
    /// Errors of the layers beneath are returned unchanged; anything else
    /// means the encoded data is corrupt and becomes
    /// [`VfsError::InvalidData`].
    pub fn from_decode(location: impl Into<String>, error: io::Error) -> Self {
        match unwrap_inner(error) {
            Ok(inner) => inner,
            Err(error) => VfsError::InvalidData {
                location: location.into(),
                details: error.to_string(),
            },
        }
    }
}

fn unwrap_inner(error: io::Error) -> Result<VfsError, io::Error> {
    if !error.get_ref().is_some_and(|inner| inner.is::<VfsError>()) {
        return Err(error);
    }
    let kind = error.kind();
    match error.into_inner().map(|inner| inner.downcast::<VfsError>()) {
        Some(Ok(inner)) => Ok(*inner),
        Some(Err(inner)) => Err(io::Error::new(kind, inner)),
        None => Err(io::Error::from(kind)),
    }
}

impl From<io::Error> for VfsError {
    fn from(error: io::Error) -> Self {
        VfsError::from_io("io", String::new(), error)
    }
}

impl From<VfsError> for io::Error {
    fn from(error: VfsError) -> Self {
        match error {
            VfsError::Io { ref source, .. } => {
                let kind = source.kind();
                io::Error::new(kind, error)
            }
            VfsError::NotFound { .. } => io::Error::new(io::ErrorKind::NotFound, error),
            VfsError::AccessDenied { .. } => io::Error::new(io::ErrorKind::PermissionDenied, error),
            VfsError::InvalidValue { .. } => io::Error::new(io::ErrorKind::InvalidInput, error),
            VfsError::InvalidData { .. } => io::Error::new(io::ErrorKind::InvalidData, error),
            other => io::Error::other(other),
        }
    }
}
