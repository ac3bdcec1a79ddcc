//! # Path Specifications
//!
//! A [`PathSpec`] describes one format layer (its [`TypeIndicator`] plus
//! format-specific attributes) and owns the path specification of the layer
//! beneath it. Chains run from an innermost leaf (a native OS path, a fake
//! in-memory tree) out to the layer the caller wants to read.
//!
//! ```text
//! type: OS, location: /data/syslog.gz      <- leaf, no parent
//!   └─ type: GZIP                          <- parent = OS layer
//!        └─ type: DATA_RANGE, ...          <- parent = GZIP layer
//! ```
//!
//! Chains are values: equality and hashing are structural over the type
//! indicator, every attribute and the whole parent chain. Because a layer can
//! only be built around an already complete parent, chains are acyclic.
//!
//! ## Example
//!
//! ```rust
//! use layerfs::{PathSpec, TypeIndicator};
//!
//! let os = PathSpec::new(TypeIndicator::OS).with_attribute("location", "/data/syslog.gz");
//! let gzip = PathSpec::new(TypeIndicator::GZIP).with_parent(os.clone());
//!
//! assert_eq!(gzip.parent(), Some(&os));
//! assert_eq!(gzip.comparable(), "type: OS, location: /data/syslog.gz\ntype: GZIP\n");
//! ```

mod factory;

pub use factory::{ParentRule, PathSpecFactory, PathSpecKind};

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Identifies which format backend handles a layer.
///
/// Well-known indicators are provided as constants; backends outside this
/// crate create their own with [`TypeIndicator::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct TypeIndicator(Cow<'static, str>);

impl TypeIndicator {
    /// Native operating system file.
    pub const OS: Self = Self(Cow::Borrowed("OS"));
    /// Gzip compressed stream.
    pub const GZIP: Self = Self(Cow::Borrowed("GZIP"));
    /// Encrypted stream.
    pub const ENCRYPTED_STREAM: Self = Self(Cow::Borrowed("ENCRYPTED_STREAM"));
    /// Byte range within the parent stream.
    pub const DATA_RANGE: Self = Self(Cow::Borrowed("DATA_RANGE"));
    /// In-memory fake file system.
    pub const FAKE: Self = Self(Cow::Borrowed("FAKE"));

    /// Create a type indicator from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// The indicator as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Value of a format-specific path specification attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AttributeValue {
    /// Text such as a location.
    String(String),
    /// Unsigned number such as an offset or inode.
    Integer(u64),
    /// Raw bytes such as a key.
    Bytes(Vec<u8>),
}

impl AttributeValue {
    /// The value if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// The value if it is an integer.
    pub fn as_integer(&self) -> Option<u64> {
        match self {
            AttributeValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// The value if it is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::Bytes(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(value) => f.write_str(value),
            AttributeValue::Integer(value) => write!(f, "{value}"),
            AttributeValue::Bytes(value) => f.write_str(&hex::encode(value)),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<u64> for AttributeValue {
    fn from(value: u64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(value: Vec<u8>) -> Self {
        AttributeValue::Bytes(value)
    }
}

impl From<&[u8]> for AttributeValue {
    fn from(value: &[u8]) -> Self {
        AttributeValue::Bytes(value.to_vec())
    }
}

/// Immutable description of one format layer and the layer beneath it.
///
/// The builder methods consume `self`, so a path specification cannot change
/// once it has been handed to a resolver or stored in a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PathSpec {
    type_indicator: TypeIndicator,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "BTreeMap::is_empty")
    )]
    attributes: BTreeMap<String, AttributeValue>,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    parent: Option<Box<PathSpec>>,
}

impl PathSpec {
    /// Create a leaf path specification with no attributes.
    pub fn new(type_indicator: TypeIndicator) -> Self {
        Self {
            type_indicator,
            attributes: BTreeMap::new(),
            parent: None,
        }
    }

    /// Set the parent layer, replacing any previous parent.
    pub fn with_parent(mut self, parent: PathSpec) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Set an attribute, replacing any previous value.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Wrap this path specification in an outer layer.
    ///
    /// ```rust
    /// use layerfs::backends::{data_range::DataRange, os};
    ///
    /// let spec = os::path_spec("/images/disk.raw").layer(DataRange::new(512, 4096));
    /// assert_eq!(spec.depth(), 2);
    /// ```
    pub fn layer<L: crate::Layer>(self, layer: L) -> PathSpec {
        layer.layer(self)
    }

    /// Type indicator of this layer.
    pub fn type_indicator(&self) -> &TypeIndicator {
        &self.type_indicator
    }

    /// Path specification of the layer beneath, if any.
    pub fn parent(&self) -> Option<&PathSpec> {
        self.parent.as_deref()
    }

    /// Returns `true` if this layer sits on top of another layer.
    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    /// All attributes of this layer, sorted by name.
    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    /// A single attribute of this layer.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// A string attribute of this layer.
    pub fn string_attribute(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(AttributeValue::as_str)
    }

    /// An integer attribute of this layer.
    pub fn integer_attribute(&self, name: &str) -> Option<u64> {
        self.attribute(name).and_then(AttributeValue::as_integer)
    }

    /// A byte string attribute of this layer.
    pub fn bytes_attribute(&self, name: &str) -> Option<&[u8]> {
        self.attribute(name).and_then(AttributeValue::as_bytes)
    }

    /// The `location` attribute of this layer.
    pub fn location(&self) -> Option<&str> {
        self.string_attribute("location")
    }

    /// Iterate the chain from this layer down to the innermost one.
    pub fn layers(&self) -> Layers<'_> {
        Layers { next: Some(self) }
    }

    /// Number of layers in the chain, this one included.
    pub fn depth(&self) -> usize {
        self.layers().count()
    }

    /// The innermost layer of the chain.
    pub fn innermost(&self) -> &PathSpec {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// This layer alone, with the same type indicator and attributes.
    pub fn without_parent(&self) -> PathSpec {
        Self {
            type_indicator: self.type_indicator.clone(),
            attributes: self.attributes.clone(),
            parent: None,
        }
    }

    /// Comparable form of this layer alone, e.g. `type: OS, location: /x`.
    pub fn layer_comparable(&self) -> String {
        let mut comparable = format!("type: {}", self.type_indicator);
        for (name, value) in &self.attributes {
            comparable.push_str(&format!(", {name}: {value}"));
        }
        comparable
    }

    /// Text form of the whole chain for logs and display.
    ///
    /// One line per layer, innermost first. Values are not escaped, so a
    /// value containing a line break can make two different chains print
    /// alike; compare chains with `==` or through
    /// [`Resolver::cache_key`](crate::Resolver::cache_key).
    pub fn comparable(&self) -> String {
        let mut lines: Vec<String> = self.layers().map(PathSpec::layer_comparable).collect();
        lines.reverse();
        let mut comparable = String::new();
        for line in lines {
            comparable.push_str(&line);
            comparable.push('\n');
        }
        comparable
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.comparable())
    }
}

/// Iterator over the layers of a chain, outermost first.
#[derive(Debug, Clone)]
pub struct Layers<'a> {
    next: Option<&'a PathSpec>,
}

impl<'a> Iterator for Layers<'a> {
    type Item = &'a PathSpec;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}
