//! Per-type factories for file objects and file systems.

use std::collections::HashMap;
use std::sync::Arc;

use crate::{FileIo, FileSystem, PathSpec, Resolver, TypeIndicator, VfsError};

/// Factory for the objects of one layer type.
///
/// A helper is registered once per type indicator. The resolver consults it
/// for every layer carrying that indicator: to validate the layer before any
/// I/O happens, to canonicalize the layer for the cache key, and to build the
/// backend objects on a cache miss.
///
/// # Thread Safety
///
/// Helpers are shared across threads behind an `Arc` and must be stateless
/// or internally synchronized.
///
/// # Example
///
/// ```rust
/// use layerfs::{PathSpec, Resolver, ResolverHelper, TypeIndicator, VfsError};
///
/// struct Tape;
///
/// impl ResolverHelper for Tape {
///     fn type_indicator(&self) -> TypeIndicator {
///         TypeIndicator::new("TAPE")
///     }
/// }
///
/// let resolver = Resolver::new();
/// resolver.register_helper(Tape).unwrap();
/// assert!(matches!(
///     resolver.register_helper(Tape),
///     Err(VfsError::AlreadyRegistered { .. })
/// ));
/// ```
pub trait ResolverHelper: Send + Sync {
    /// Type indicator this helper is registered under.
    fn type_indicator(&self) -> TypeIndicator;

    /// Check one layer before anything is opened.
    ///
    /// # Errors
    ///
    /// - [`VfsError::PathSpec`] or [`VfsError::InvalidValue`] for a malformed
    ///   layer
    fn validate_path_spec(&self, _path_spec: &PathSpec) -> Result<(), VfsError> {
        Ok(())
    }

    /// Canonical form of one layer inside a cache key, without its parent.
    ///
    /// Two layers that address the same data must produce equal values, for
    /// example by normalizing a location.
    fn layer_key(&self, path_spec: &PathSpec) -> PathSpec {
        path_spec.without_parent()
    }

    /// Path specification of the root of the file system containing
    /// `path_spec`.
    ///
    /// The root keeps the parent chain of `path_spec`; single-stream layers
    /// are their own root.
    fn file_system_root(&self, path_spec: &PathSpec) -> PathSpec {
        path_spec.clone()
    }

    /// Create an unopened file object backend.
    ///
    /// # Errors
    ///
    /// - [`VfsError::NotSupported`] if the type has no data stream
    fn new_file_object(&self, _path_spec: &PathSpec) -> Result<Box<dyn FileIo>, VfsError> {
        Err(VfsError::NotSupported {
            operation: "new file object",
        })
    }

    /// Open the file system rooted at `root`.
    ///
    /// Parent layers must be obtained through `resolver`.
    ///
    /// # Errors
    ///
    /// - [`VfsError::NotSupported`] if the type has no file system
    /// - any error raised while opening the parent layers
    fn new_file_system(&self, _resolver: &Resolver, _root: &PathSpec) -> Result<Arc<dyn FileSystem>, VfsError> {
        Err(VfsError::NotSupported {
            operation: "new file system",
        })
    }
}

/// Resolver helpers keyed by type indicator.
#[derive(Default)]
pub struct HelperRegistry {
    helpers: HashMap<TypeIndicator, Arc<dyn ResolverHelper>>,
}

impl HelperRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a helper under its type indicator.
    ///
    /// # Errors
    ///
    /// - [`VfsError::AlreadyRegistered`] if the indicator is taken
    pub fn register(&mut self, helper: Arc<dyn ResolverHelper>) -> Result<(), VfsError> {
        let type_indicator = helper.type_indicator();
        if self.helpers.contains_key(&type_indicator) {
            return Err(VfsError::AlreadyRegistered {
                type_indicator: type_indicator.to_string(),
            });
        }
        tracing::debug!(%type_indicator, "registered resolver helper");
        self.helpers.insert(type_indicator, helper);
        Ok(())
    }

    /// Remove the helper for a type indicator.
    ///
    /// # Errors
    ///
    /// - [`VfsError::HelperNotFound`] if nothing is registered for it
    pub fn deregister(&mut self, type_indicator: &TypeIndicator) -> Result<(), VfsError> {
        match self.helpers.remove(type_indicator) {
            Some(_) => {
                tracing::debug!(%type_indicator, "deregistered resolver helper");
                Ok(())
            }
            None => Err(VfsError::HelperNotFound {
                type_indicator: type_indicator.to_string(),
            }),
        }
    }

    /// The helper for a type indicator.
    ///
    /// # Errors
    ///
    /// - [`VfsError::HelperNotFound`] if nothing is registered for it
    pub fn helper(&self, type_indicator: &TypeIndicator) -> Result<Arc<dyn ResolverHelper>, VfsError> {
        self.helpers
            .get(type_indicator)
            .cloned()
            .ok_or_else(|| VfsError::HelperNotFound {
                type_indicator: type_indicator.to_string(),
            })
    }

    /// Returns `true` if a helper is registered for the indicator.
    pub fn contains(&self, type_indicator: &TypeIndicator) -> bool {
        self.helpers.contains_key(type_indicator)
    }

    /// Number of registered helpers.
    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    /// Returns `true` if no helper is registered.
    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    impl ResolverHelper for Named {
        fn type_indicator(&self) -> TypeIndicator {
            TypeIndicator::new(self.0)
        }
    }

    #[test]
    fn register_lookup_deregister() {
        let mut registry = HelperRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(Named("A"))).unwrap();
        registry.register(Arc::new(Named("B"))).unwrap();
        assert_eq!(registry.len(), 2);

        let helper = registry.helper(&TypeIndicator::new("A")).unwrap();
        assert_eq!(helper.type_indicator(), TypeIndicator::new("A"));

        registry.deregister(&TypeIndicator::new("A")).unwrap();
        assert!(!registry.contains(&TypeIndicator::new("A")));
        assert!(matches!(
            registry.helper(&TypeIndicator::new("A")),
            Err(VfsError::HelperNotFound { .. })
        ));
    }

    #[test]
    fn register_twice_fails() {
        let mut registry = HelperRegistry::new();
        registry.register(Arc::new(Named("A"))).unwrap();
        let err = registry.register(Arc::new(Named("A"))).unwrap_err();
        assert!(matches!(err, VfsError::AlreadyRegistered { .. }));
    }

    #[test]
    fn deregister_missing_fails() {
        let mut registry = HelperRegistry::new();
        assert!(matches!(
            registry.deregister(&TypeIndicator::new("A")),
            Err(VfsError::HelperNotFound { .. })
        ));
    }

    #[test]
    fn defaults_refuse_to_build_objects() {
        let helper = Named("A");
        let spec = PathSpec::new(TypeIndicator::new("A"));
        assert!(matches!(
            helper.new_file_object(&spec),
            Err(VfsError::NotSupported { .. })
        ));
        assert!(matches!(
            helper.new_file_system(&Resolver::new(), &spec),
            Err(VfsError::NotSupported { .. })
        ));
        assert_eq!(helper.file_system_root(&spec), spec);
        assert_eq!(helper.layer_key(&spec), spec.without_parent());
    }
}
