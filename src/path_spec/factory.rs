//! Schema-validated construction of path specifications.

use std::collections::HashMap;

use super::{AttributeValue, PathSpec, TypeIndicator};
use crate::VfsError;

/// Whether a layer type sits on top of another layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRule {
    /// The layer decodes a parent stream and cannot exist without one.
    Required,
    /// The layer is a leaf (native file, device, in-memory tree).
    Forbidden,
    /// Either form is valid.
    Optional,
}

/// Attribute schema of one layer type.
///
/// Backends describe their path specification with a `const` kind, which
/// both the [`PathSpecFactory`] and their resolver helper validate against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpecKind {
    /// Type indicator the schema applies to.
    pub type_indicator: TypeIndicator,
    /// Attributes that must be present.
    pub required: &'static [&'static str],
    /// Attributes that may be present.
    pub optional: &'static [&'static str],
    /// Parent rule of the layer.
    pub parent: ParentRule,
}

impl PathSpecKind {
    /// Check a single layer (not its parents) against this schema.
    ///
    /// # Errors
    ///
    /// - [`VfsError::PathSpec`] if the type indicator differs, a required
    ///   attribute is missing or the parent rule is violated
    /// - [`VfsError::InvalidValue`] if an attribute is not part of the schema
    pub fn validate(&self, layer: &PathSpec) -> Result<(), VfsError> {
        if layer.type_indicator() != &self.type_indicator {
            return Err(VfsError::path_spec(format!(
                "expected type indicator {} but got {}",
                self.type_indicator,
                layer.type_indicator()
            )));
        }

        match (self.parent, layer.has_parent()) {
            (ParentRule::Required, false) => {
                return Err(VfsError::path_spec(format!(
                    "{} path specification requires a parent",
                    self.type_indicator
                )));
            }
            (ParentRule::Forbidden, true) => {
                return Err(VfsError::path_spec(format!(
                    "{} path specification cannot have a parent",
                    self.type_indicator
                )));
            }
            _ => {}
        }

        for name in self.required {
            if layer.attribute(name).is_none() {
                return Err(VfsError::path_spec(format!(
                    "{} path specification is missing attribute: {name}",
                    self.type_indicator
                )));
            }
        }

        for name in layer.attributes().keys() {
            let known = self.required.contains(&name.as_str()) || self.optional.contains(&name.as_str());
            if !known {
                return Err(VfsError::invalid_value(format!(
                    "unsupported {} path specification attribute: {name}",
                    self.type_indicator
                )));
            }
        }

        Ok(())
    }
}

/// Registry of layer schemas keyed by type indicator.
///
/// # Example
///
/// ```rust
/// use layerfs::{PathSpecFactory, TypeIndicator};
///
/// let factory = PathSpecFactory::with_default_kinds();
/// let os = factory
///     .new_path_spec(TypeIndicator::OS, [("location", "/data/syslog.gz")], None)
///     .unwrap();
/// let range = factory
///     .new_path_spec(
///         TypeIndicator::DATA_RANGE,
///         [("range_offset", 0u64), ("range_size", 512u64)],
///         Some(os),
///     )
///     .unwrap();
/// assert_eq!(range.depth(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PathSpecFactory {
    kinds: HashMap<TypeIndicator, PathSpecKind>,
}

impl PathSpecFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a factory knowing every backend bundled with this crate.
    pub fn with_default_kinds() -> Self {
        let mut factory = Self::new();
        for kind in crate::backends::default_kinds() {
            factory.kinds.insert(kind.type_indicator.clone(), kind);
        }
        factory
    }

    /// Register a layer schema.
    ///
    /// # Errors
    ///
    /// - [`VfsError::AlreadyRegistered`] if the type indicator is taken
    pub fn register(&mut self, kind: PathSpecKind) -> Result<(), VfsError> {
        if self.kinds.contains_key(&kind.type_indicator) {
            return Err(VfsError::AlreadyRegistered {
                type_indicator: kind.type_indicator.to_string(),
            });
        }
        self.kinds.insert(kind.type_indicator.clone(), kind);
        Ok(())
    }

    /// Remove a layer schema.
    ///
    /// # Errors
    ///
    /// - [`VfsError::NotFound`] if no schema is registered for the indicator
    pub fn deregister(&mut self, type_indicator: &TypeIndicator) -> Result<(), VfsError> {
        self.kinds
            .remove(type_indicator)
            .map(|_| ())
            .ok_or_else(|| VfsError::NotFound {
                location: format!("path specification type: {type_indicator}"),
            })
    }

    /// The schema registered for a type indicator.
    pub fn kind(&self, type_indicator: &TypeIndicator) -> Option<&PathSpecKind> {
        self.kinds.get(type_indicator)
    }

    /// Build and validate a path specification layer.
    ///
    /// # Errors
    ///
    /// - [`VfsError::PathSpec`] for unknown types, missing required
    ///   attributes or a parent rule violation
    /// - [`VfsError::InvalidValue`] for attributes outside the schema
    pub fn new_path_spec<K, V, I>(
        &self,
        type_indicator: TypeIndicator,
        attributes: I,
        parent: Option<PathSpec>,
    ) -> Result<PathSpec, VfsError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<AttributeValue>,
    {
        let kind = self.kind(&type_indicator).ok_or_else(|| {
            VfsError::path_spec(format!("unsupported type indicator: {type_indicator}"))
        })?;

        let mut spec = PathSpec::new(type_indicator);
        for (name, value) in attributes {
            spec = spec.with_attribute(name, value);
        }
        if let Some(parent) = parent {
            spec = spec.with_parent(parent);
        }

        kind.validate(&spec)?;
        Ok(spec)
    }

    /// Validate every layer of a chain, for example after deserialization.
    pub fn validate(&self, spec: &PathSpec) -> Result<(), VfsError> {
        for layer in spec.layers() {
            let kind = self.kind(layer.type_indicator()).ok_or_else(|| {
                VfsError::path_spec(format!(
                    "unsupported type indicator: {}",
                    layer.type_indicator()
                ))
            })?;
            kind.validate(layer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KIND: PathSpecKind = PathSpecKind {
        type_indicator: TypeIndicator::DATA_RANGE,
        required: &["range_offset"],
        optional: &["range_size"],
        parent: ParentRule::Required,
    };

    fn leaf() -> PathSpec {
        PathSpec::new(TypeIndicator::OS).with_attribute("location", "/x")
    }

    #[test]
    fn kind_accepts_valid_layer() {
        let spec = PathSpec::new(TypeIndicator::DATA_RANGE)
            .with_attribute("range_offset", 0u64)
            .with_parent(leaf());
        assert!(TEST_KIND.validate(&spec).is_ok());
    }

    #[test]
    fn kind_rejects_missing_required_attribute() {
        let spec = PathSpec::new(TypeIndicator::DATA_RANGE).with_parent(leaf());
        let err = TEST_KIND.validate(&spec).unwrap_err();
        assert!(matches!(err, VfsError::PathSpec { .. }));
        assert!(err.to_string().contains("range_offset"));
    }

    #[test]
    fn kind_rejects_missing_parent() {
        let spec = PathSpec::new(TypeIndicator::DATA_RANGE).with_attribute("range_offset", 0u64);
        assert!(matches!(
            TEST_KIND.validate(&spec),
            Err(VfsError::PathSpec { .. })
        ));
    }

    #[test]
    fn kind_rejects_unknown_attribute() {
        let spec = PathSpec::new(TypeIndicator::DATA_RANGE)
            .with_attribute("range_offset", 0u64)
            .with_attribute("bogus", 1u64)
            .with_parent(leaf());
        assert!(matches!(
            TEST_KIND.validate(&spec),
            Err(VfsError::InvalidValue { .. })
        ));
    }

    #[test]
    fn factory_register_twice_fails() {
        let mut factory = PathSpecFactory::new();
        factory.register(TEST_KIND).unwrap();
        assert!(matches!(
            factory.register(TEST_KIND),
            Err(VfsError::AlreadyRegistered { .. })
        ));
        factory.deregister(&TypeIndicator::DATA_RANGE).unwrap();
        assert!(matches!(
            factory.deregister(&TypeIndicator::DATA_RANGE),
            Err(VfsError::NotFound { .. })
        ));
    }

    #[test]
    fn factory_rejects_unknown_type() {
        let factory = PathSpecFactory::new();
        let err = factory
            .new_path_spec(TypeIndicator::new("BOGUS"), [("location", "/x")], None)
            .unwrap_err();
        assert!(matches!(err, VfsError::PathSpec { .. }));
    }

    #[test]
    fn default_kinds_validate_a_whole_chain() {
        let factory = PathSpecFactory::with_default_kinds();
        let os = factory
            .new_path_spec(TypeIndicator::OS, [("location", "/a.gz")], None)
            .unwrap();
        let range = PathSpec::new(TypeIndicator::DATA_RANGE)
            .with_attribute("range_offset", 0u64)
            .with_attribute("range_size", 4u64)
            .with_parent(os.clone());
        assert!(factory.validate(&range).is_ok());

        let orphan = PathSpec::new(TypeIndicator::DATA_RANGE)
            .with_attribute("range_offset", 0u64)
            .with_attribute("range_size", 4u64);
        assert!(factory.validate(&orphan).is_err());

        let os_with_parent = os.clone().with_parent(os);
        assert!(matches!(
            factory.validate(&os_with_parent),
            Err(VfsError::PathSpec { .. })
        ));
    }
}
