//! In-memory leaf file system.
//!
//! A [`FakeTree`] is built up front and handed to a [`FakeResolverHelper`];
//! it cannot change afterwards. Locations are absolute, `/`-separated, and
//! sub entries enumerate in byte order of their names.
//!
//! ```rust
//! use layerfs::backends::fake::{self, FakeResolverHelper, FakeTree};
//! use layerfs::{FileEntryExt, Resolver};
//!
//! let mut tree = FakeTree::new();
//! tree.add_file("/etc/hosts", b"127.0.0.1 localhost\n".to_vec())
//!     .add_file("/etc/passwd", b"root:x:0:0::/root:/bin/sh\n".to_vec());
//!
//! let resolver = Resolver::new();
//! resolver.register_helper(FakeResolverHelper::new(tree)).unwrap();
//!
//! let etc = resolver.open_file_entry(&fake::path_spec("/etc")).unwrap().unwrap();
//! assert_eq!(etc.sub_file_entry_names().unwrap(), ["hosts", "passwd"]);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{
    EntryType, FileEntry, FileIo, FileSystem, FileSystemRef, ParentRule, PathSpec, PathSpecKind, Resolver,
    ResolverHelper, Stat, SubFileEntries, TypeIndicator, VfsError,
};

/// Schema of a `FAKE` layer.
pub const KIND: PathSpecKind = PathSpecKind {
    type_indicator: TypeIndicator::FAKE,
    required: &["location"],
    optional: &[],
    parent: ParentRule::Forbidden,
};

/// Path specification of a location in the fake tree.
pub fn path_spec(location: impl Into<String>) -> PathSpec {
    PathSpec::new(TypeIndicator::FAKE).with_attribute("location", location.into())
}

#[derive(Debug, Clone)]
struct FakeNode {
    entry_type: EntryType,
    data: Arc<[u8]>,
    link_target: Option<String>,
}

impl FakeNode {
    fn directory() -> Self {
        Self {
            entry_type: EntryType::Directory,
            data: Arc::from(Vec::new()),
            link_target: None,
        }
    }
}

/// Contents of a fake file system.
#[derive(Debug, Clone)]
pub struct FakeTree {
    nodes: BTreeMap<String, FakeNode>,
}

impl Default for FakeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTree {
    /// A tree holding only the root directory.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_owned(), FakeNode::directory());
        Self { nodes }
    }

    /// Add a directory, creating missing parents.
    pub fn add_directory(&mut self, location: &str) -> &mut Self {
        let location = normalize(location);
        self.add_parents(&location);
        self.nodes.insert(location, FakeNode::directory());
        self
    }

    /// Add a regular file, creating missing parents.
    pub fn add_file(&mut self, location: &str, data: Vec<u8>) -> &mut Self {
        let location = normalize(location);
        self.add_parents(&location);
        self.nodes.insert(
            location,
            FakeNode {
                entry_type: EntryType::File,
                data: Arc::from(data),
                link_target: None,
            },
        );
        self
    }

    /// Add a symbolic link, creating missing parents.
    pub fn add_link(&mut self, location: &str, target: &str) -> &mut Self {
        let location = normalize(location);
        self.add_parents(&location);
        self.nodes.insert(
            location,
            FakeNode {
                entry_type: EntryType::Link,
                data: Arc::from(Vec::new()),
                link_target: Some(target.to_owned()),
            },
        );
        self
    }

    /// Returns `true` if something exists at `location`.
    pub fn contains(&self, location: &str) -> bool {
        self.nodes.contains_key(&normalize(location))
    }

    fn add_parents(&mut self, location: &str) {
        let mut parent = parent_location(location);
        while let Some(current) = parent {
            self.nodes
                .entry(current.clone())
                .or_insert_with(FakeNode::directory);
            parent = parent_location(&current);
        }
    }

    fn node(&self, location: &str) -> Option<&FakeNode> {
        self.nodes.get(location)
    }

    fn children(&self, location: &str) -> Vec<String> {
        let prefix = if location == "/" {
            "/".to_owned()
        } else {
            format!("{location}/")
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| key.len() > prefix.len() && !key[prefix.len()..].contains('/'))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

fn normalize(location: &str) -> String {
    let segments: Vec<&str> = location.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

fn parent_location(location: &str) -> Option<String> {
    if location == "/" {
        return None;
    }
    match location.rfind('/') {
        Some(0) => Some("/".to_owned()),
        Some(index) => Some(location[..index].to_owned()),
        None => None,
    }
}

fn location_of(path_spec: &PathSpec) -> Result<String, VfsError> {
    path_spec
        .location()
        .map(normalize)
        .ok_or_else(|| VfsError::path_spec("FAKE path specification requires a location"))
}

/// Resolver helper serving one [`FakeTree`].
#[derive(Debug, Clone)]
pub struct FakeResolverHelper {
    tree: Arc<FakeTree>,
}

impl FakeResolverHelper {
    /// Serve `tree` under the `FAKE` type indicator.
    pub fn new(tree: FakeTree) -> Self {
        Self { tree: Arc::new(tree) }
    }
}

impl ResolverHelper for FakeResolverHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::FAKE
    }

    fn validate_path_spec(&self, path_spec: &PathSpec) -> Result<(), VfsError> {
        KIND.validate(path_spec)?;
        location_of(path_spec).map(|_| ())
    }

    fn layer_key(&self, path_spec: &PathSpec) -> PathSpec {
        match path_spec.location() {
            Some(location) => self::path_spec(normalize(location)),
            None => path_spec.without_parent(),
        }
    }

    fn file_system_root(&self, _path_spec: &PathSpec) -> PathSpec {
        path_spec("/")
    }

    fn new_file_object(&self, _path_spec: &PathSpec) -> Result<Box<dyn FileIo>, VfsError> {
        Ok(Box::new(FakeFileIo {
            tree: Arc::clone(&self.tree),
            data: None,
        }))
    }

    fn new_file_system(&self, _resolver: &Resolver, root: &PathSpec) -> Result<Arc<dyn FileSystem>, VfsError> {
        Ok(Arc::new(FakeFileSystem {
            tree: Arc::clone(&self.tree),
            root: root.clone(),
        }))
    }
}

struct FakeFileIo {
    tree: Arc<FakeTree>,
    data: Option<Arc<[u8]>>,
}

impl FileIo for FakeFileIo {
    fn open(&mut self, _resolver: &Resolver, path_spec: &PathSpec) -> Result<(), VfsError> {
        let location = location_of(path_spec)?;
        let node = self
            .tree
            .node(&location)
            .ok_or_else(|| VfsError::NotFound {
                location: location.clone(),
            })?;
        if node.entry_type != EntryType::File {
            return Err(VfsError::invalid_value(format!(
                "{location} is a {}, not a file",
                node.entry_type
            )));
        }
        self.data = Some(Arc::clone(&node.data));
        Ok(())
    }

    fn close(&mut self) -> Result<(), VfsError> {
        self.data = None;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, VfsError> {
        let data = self.data.as_ref().ok_or(VfsError::NotOpen { operation: "read" })?;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let end = start.saturating_add(buf.len()).min(data.len());
        buf[..end - start].copy_from_slice(&data[start..end]);
        Ok(end - start)
    }

    fn size(&mut self) -> Result<u64, VfsError> {
        let data = self.data.as_ref().ok_or(VfsError::NotOpen { operation: "get size" })?;
        Ok(data.len() as u64)
    }
}

struct FakeFileSystem {
    tree: Arc<FakeTree>,
    root: PathSpec,
}

impl FileSystem for FakeFileSystem {
    fn type_indicator(&self) -> &TypeIndicator {
        self.root.type_indicator()
    }

    fn root_path_spec(&self) -> &PathSpec {
        &self.root
    }

    fn file_entry_by_path_spec(
        &self,
        owner: &FileSystemRef,
        path_spec: &PathSpec,
    ) -> Result<Option<Box<dyn FileEntry>>, VfsError> {
        let location = location_of(path_spec)?;
        Ok(self.tree.node(&location).map(|node| {
            Box::new(FakeFileEntry {
                file_system: owner.clone(),
                tree: Arc::clone(&self.tree),
                name: self.basename(&location),
                path_spec: path_spec.clone(),
                node: node.clone(),
                location,
            }) as Box<dyn FileEntry>
        }))
    }
}

struct FakeFileEntry {
    file_system: FileSystemRef,
    tree: Arc<FakeTree>,
    path_spec: PathSpec,
    location: String,
    name: String,
    node: FakeNode,
}

impl FileEntry for FakeFileEntry {
    fn name(&self) -> &str {
        &self.name
    }

    fn path_spec(&self) -> &PathSpec {
        &self.path_spec
    }

    fn file_system(&self) -> &FileSystemRef {
        &self.file_system
    }

    fn entry_type(&self) -> EntryType {
        self.node.entry_type
    }

    fn is_root(&self) -> bool {
        self.location == "/"
    }

    fn is_virtual(&self) -> bool {
        false
    }

    fn stat(&self) -> Result<Stat, VfsError> {
        Ok(Stat::new(self.node.entry_type, self.node.data.len() as u64))
    }

    fn parent_file_entry(&self) -> Result<Option<Box<dyn FileEntry>>, VfsError> {
        match parent_location(&self.location) {
            Some(parent) => self.file_system.file_entry_by_path_spec(&path_spec(parent)),
            None => Ok(None),
        }
    }

    fn sub_file_entries(&self) -> Result<SubFileEntries, VfsError> {
        if self.node.entry_type != EntryType::Directory {
            return Ok(SubFileEntries::empty());
        }
        let file_system = self.file_system.clone();
        let children = self.tree.children(&self.location);
        Ok(SubFileEntries::new(children.into_iter().map(move |location| {
            file_system
                .file_entry_by_path_spec(&path_spec(location.as_str()))?
                .ok_or(VfsError::NotFound { location })
        })))
    }

    fn link_target(&self) -> Result<Option<String>, VfsError> {
        Ok(self.node.link_target.clone())
    }
}
