//! Integration tests resolving real layer chains end to end.
//!
//! These tests verify that:
//! 1. Chains over native files decode correctly (gzip, rc4, data ranges)
//! 2. Shared parents are opened once and released when the last user goes
//! 3. Entries expose the expected metadata and navigation
//! 4. A layer type defined outside the crate plugs into the resolver

use layerfs::backends::data_range::DataRange;
use layerfs::backends::encrypted_stream::EncryptedStream;
use layerfs::backends::fake::{self, FakeResolverHelper, FakeTree};
use layerfs::backends::gzip::Gzip;
use layerfs::backends::os;
use layerfs::*;
use std::fs;
use std::io::{Read, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// Fixtures
// =============================================================================

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::GzBuilder::new()
        .filename("messages")
        .write(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut state: Vec<u8> = (0..=255).collect();
    let mut j = 0u8;
    for i in 0..256 {
        j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
        state.swap(i, usize::from(j));
    }
    let (mut i, mut j) = (0u8, 0u8);
    data.iter()
        .map(|byte| {
            i = i.wrapping_add(1);
            j = j.wrapping_add(state[usize::from(i)]);
            state.swap(usize::from(i), usize::from(j));
            byte ^ state[usize::from(state[usize::from(i)].wrapping_add(state[usize::from(j)]))]
        })
        .collect()
}

fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathSpec {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    os::path_spec(path.to_string_lossy())
}

fn log_text() -> Vec<u8> {
    (0..2000)
        .flat_map(|n| format!("line {n}: nothing to see here\n").into_bytes())
        .collect()
}

// =============================================================================
// Layer chains over native files
// =============================================================================

#[test]
fn gzip_root_entry_over_native_file() {
    let dir = tempfile::tempdir().unwrap();
    let text = log_text();
    let spec = write_file(dir.path(), "messages.gz", &gzip(&text)).layer(Gzip);
    let resolver = Resolver::with_default_helpers();

    let entry = resolver.open_file_entry(&spec).unwrap().unwrap();
    assert!(entry.is_root());
    assert!(entry.is_virtual());
    assert!(entry.is_allocated());
    assert!(entry.is_file());
    assert_eq!(entry.name(), "messages");
    assert_eq!(entry.number_of_sub_file_entries().unwrap(), 0);
    assert!(entry.parent_file_entry().unwrap().is_none());

    let stat = entry.stat().unwrap();
    assert_eq!(stat.entry_type, EntryType::File);
    assert_eq!(stat.size, text.len() as u64);
    assert_eq!(entry.stat().unwrap(), stat);

    let compressed = entry.parent_layer_file_entry().unwrap().unwrap();
    assert_eq!(compressed.name(), "messages.gz");
    assert!(!compressed.is_virtual());
    assert!(compressed.parent_layer_file_entry().unwrap().is_none());

    assert_eq!(entry.read_data().unwrap(), text);
}

#[test]
fn rc4_stream_with_right_and_wrong_key() {
    let dir = tempfile::tempdir().unwrap();
    let plaintext = b"This is a secret message, keep it safe.";
    let leaf = write_file(dir.path(), "secret.rc4", &rc4(b"rc4test", plaintext));
    let resolver = Resolver::with_default_helpers();

    let right = leaf.clone().layer(EncryptedStream::rc4(b"rc4test".to_vec()));
    let handle = resolver.open_file_object(&right).unwrap();
    assert_eq!(handle.size().unwrap(), plaintext.len() as u64);
    assert_eq!(handle.read(None).unwrap(), plaintext);

    let wrong = leaf.layer(EncryptedStream::rc4(b"other".to_vec()));
    let garbage = resolver.open_file_object(&wrong).unwrap().read(None).unwrap();
    assert_ne!(garbage, plaintext);
}

#[test]
fn four_layer_chain() {
    let dir = tempfile::tempdir().unwrap();
    let text = log_text();
    let spec = write_file(dir.path(), "blob", &rc4(b"k", &gzip(&text)))
        .layer(EncryptedStream::rc4(b"k".to_vec()))
        .layer(Gzip)
        .layer(DataRange::new(100, 50));
    let resolver = Resolver::with_default_helpers();

    let handle = resolver.open_file_object(&spec).unwrap();
    assert_eq!(handle.read(None).unwrap(), &text[100..150]);
    assert_eq!(resolver.context().number_of_file_objects(), 4);

    handle.close().unwrap();
    assert_eq!(resolver.context().number_of_file_objects(), 0);
}

// =============================================================================
// Caching and reference counting
// =============================================================================

#[test]
fn two_ranges_share_one_parent_with_independent_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let leaf = write_file(dir.path(), "disk.raw", b"AAAABBBBCCCCDDDD");
    let resolver = Resolver::with_default_helpers();
    let leaf_key = resolver.cache_key(&leaf).unwrap();

    let first = resolver
        .open_file_object(&leaf.clone().layer(DataRange::new(0, 8)))
        .unwrap();
    let second = resolver
        .open_file_object(&leaf.clone().layer(DataRange::new(8, 8)))
        .unwrap();
    assert!(!first.shares_file_object_with(&second));
    assert_eq!(resolver.context().file_object_references(&leaf_key), Some(2));

    assert_eq!(first.read(Some(4)).unwrap(), b"AAAA");
    assert_eq!(second.read(Some(4)).unwrap(), b"CCCC");
    assert_eq!(first.read(Some(4)).unwrap(), b"BBBB");
    assert_eq!(second.read(Some(4)).unwrap(), b"DDDD");

    first.close().unwrap();
    assert_eq!(resolver.context().file_object_references(&leaf_key), Some(1));
    second.close().unwrap();
    assert_eq!(resolver.context().file_object_references(&leaf_key), None);
}

#[test]
fn resolving_twice_counts_two_references() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_file(dir.path(), "a.gz", &gzip(b"hello")).layer(Gzip);
    let resolver = Resolver::with_default_helpers();
    let key = resolver.cache_key(&spec).unwrap();

    let first = resolver.open_file_object(&spec).unwrap();
    let second = resolver.open_file_object(&spec).unwrap();
    assert!(first.shares_file_object_with(&second));
    assert_eq!(resolver.context().file_object_references(&key), Some(2));

    // Handles for one object share its offset.
    assert_eq!(first.read(Some(2)).unwrap(), b"he");
    assert_eq!(second.offset().unwrap(), 2);

    first.close().unwrap();
    second.close().unwrap();
    assert_eq!(resolver.context().file_object_references(&key), None);
    assert_eq!(resolver.context().number_of_file_objects(), 0);
}

#[test]
fn repeated_entry_lookups_agree() {
    let dir = tempfile::tempdir().unwrap();
    let text = log_text();
    let spec = write_file(dir.path(), "repeat.gz", &gzip(&text)).layer(Gzip);
    let resolver = Resolver::with_default_helpers();

    let file_system = resolver.open_file_system(&spec).unwrap();
    let first = file_system.file_entry_by_path_spec(&spec).unwrap().unwrap();
    let second = file_system.file_entry_by_path_spec(&spec).unwrap().unwrap();
    assert_eq!(first.name(), second.name());
    assert_eq!(first.stat().unwrap(), second.stat().unwrap());
    assert_eq!(first.stat().unwrap().size, text.len() as u64);

    // Stat is answered by the file system; no decoded object is cached.
    let key = resolver.cache_key(&spec).unwrap();
    assert_eq!(resolver.context().file_object_references(&key), None);
    assert_eq!(resolver.context().number_of_file_systems(), 1);
}

#[test]
fn entries_keep_their_file_system_alive() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_file(dir.path(), "a.gz", &gzip(b"hello")).layer(Gzip);
    let resolver = Resolver::with_default_helpers();

    let entry = resolver.open_file_entry(&spec).unwrap().unwrap();
    assert_eq!(resolver.context().number_of_file_systems(), 1);
    assert_eq!(resolver.context().number_of_file_objects(), 1);

    drop(entry);
    assert_eq!(resolver.context().number_of_file_systems(), 0);
    assert_eq!(resolver.context().number_of_file_objects(), 0);
}

#[test]
fn unsupported_layer_leaves_cached_parent_usable() {
    let dir = tempfile::tempdir().unwrap();
    let leaf = write_file(dir.path(), "data", b"payload");
    let resolver = Resolver::with_default_helpers();
    let leaf_key = resolver.cache_key(&leaf).unwrap();

    let parent = resolver.open_file_object(&leaf).unwrap();
    let bogus = PathSpec::new(TypeIndicator::new("BOGUS")).with_parent(leaf.clone());
    let err = resolver.open_file_object(&bogus).unwrap_err();
    assert!(matches!(err, VfsError::PathSpec { .. }));
    assert!(err.to_string().contains("BOGUS"));
    assert!(matches!(
        resolver.open_file_entry(&bogus),
        Err(VfsError::PathSpec { .. })
    ));

    assert_eq!(resolver.context().file_object_references(&leaf_key), Some(1));
    assert_eq!(parent.read(None).unwrap(), b"payload");
}

#[test]
fn emptied_context_invalidates_outstanding_handles() {
    let dir = tempfile::tempdir().unwrap();
    let leaf = write_file(dir.path(), "data", b"payload");
    let resolver = Resolver::with_default_helpers();

    let handle = resolver.open_file_object(&leaf).unwrap();
    resolver.context().empty();
    assert_eq!(resolver.context().number_of_file_objects(), 0);
    assert!(matches!(handle.read(None), Err(VfsError::NotOpen { .. })));
    assert!(handle.close().is_ok());
}

// =============================================================================
// File object behavior
// =============================================================================

#[test]
fn reads_at_and_past_end() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_file(dir.path(), "short", b"0123456789");
    let resolver = Resolver::with_default_helpers();
    let mut handle = resolver.open_file_object(&spec).unwrap();

    assert!(handle.is_seekable());
    assert_eq!(handle.read(None).unwrap(), b"0123456789");
    assert_eq!(handle.read(None).unwrap(), b"");
    assert_eq!(handle.seek(SeekFrom::Start(1000)).unwrap(), 1000);
    assert_eq!(handle.read(Some(5)).unwrap(), b"");
    assert!(handle.seek(SeekFrom::Current(-2000)).is_err());

    handle.seek(SeekFrom::Start(4)).unwrap();
    let mut buf = String::new();
    handle.read_to_string(&mut buf).unwrap();
    assert_eq!(buf, "456789");
}

#[test]
fn stream_reader_feeds_std_decoders() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_file(dir.path(), "a.gz", &gzip(b"via std::io"));
    let resolver = Resolver::with_default_helpers();
    let handle = resolver.open_file_object(&spec).unwrap();

    let mut decoded = String::new();
    flate2::read::GzDecoder::new(handle.reader_at(0))
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, "via std::io");
    assert_eq!(handle.offset().unwrap(), 0);
}

// =============================================================================
// Entries and navigation
// =============================================================================

#[test]
fn native_directory_enumeration() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["c.log", "a.log", "b.log"] {
        fs::write(dir.path().join(name), name).unwrap();
    }
    fs::create_dir(dir.path().join("nested")).unwrap();
    let resolver = Resolver::with_default_helpers();

    let root = resolver
        .open_file_entry(&os::path_spec(dir.path().to_string_lossy()))
        .unwrap()
        .unwrap();
    assert_eq!(
        root.sub_file_entry_names().unwrap(),
        ["a.log", "b.log", "c.log", "nested"]
    );
    let b = root.sub_file_entry_by_name("b.log").unwrap().unwrap();
    assert_eq!(b.read_to_string().unwrap(), "b.log");
    assert_eq!(b.parent_file_entry().unwrap().unwrap().path_spec(), root.path_spec());
}

#[test]
fn fake_tree_navigation() {
    let mut tree = FakeTree::new();
    tree.add_file("/var/log/messages.gz", gzip(b"fake log"))
        .add_directory("/var/tmp")
        .add_link("/var/log/current", "/var/log/messages.gz");
    let resolver = Resolver::with_default_helpers();
    resolver.register_helper(FakeResolverHelper::new(tree)).unwrap();

    let log = resolver.open_file_entry(&fake::path_spec("/var/log")).unwrap().unwrap();
    assert_eq!(log.sub_file_entry_names().unwrap(), ["current", "messages.gz"]);

    let link = log.sub_file_entry_by_name("current").unwrap().unwrap();
    assert!(link.is_link());
    assert_eq!(link.link_target().unwrap().as_deref(), Some("/var/log/messages.gz"));

    let inner = fake::path_spec("/var/log/messages.gz").layer(Gzip);
    let entry = resolver.open_file_entry(&inner).unwrap().unwrap();
    assert_eq!(entry.read_to_string().unwrap(), "fake log");
    let outer = entry.parent_layer_file_entry().unwrap().unwrap();
    assert_eq!(outer.parent_file_entry().unwrap().unwrap().name(), "log");
}

#[test]
fn file_system_rejects_foreign_path_specs() {
    let resolver = Resolver::new();
    resolver.register_helper(FakeResolverHelper::new(FakeTree::new())).unwrap();
    resolver.register_helper(os::OsResolverHelper).unwrap();

    let file_system = resolver.open_file_system(&fake::path_spec("/")).unwrap();
    assert!(file_system.file_entry_exists(&fake::path_spec("/")).unwrap());
    assert!(matches!(
        file_system.file_entry_by_path_spec(&os::path_spec("/")),
        Err(VfsError::PathSpec { .. })
    ));
}

// =============================================================================
// Path specifications
// =============================================================================

#[cfg(feature = "serde")]
#[test]
fn json_round_trip_resolves_to_the_same_object() {
    let dir = tempfile::tempdir().unwrap();
    let spec = write_file(dir.path(), "x.gz", &gzip(b"round trip"))
        .layer(Gzip)
        .layer(DataRange::new(6, 4));
    let resolver = Resolver::with_default_helpers();

    let restored = PathSpec::from_json(&spec.to_json().unwrap()).unwrap();
    assert_eq!(restored, spec);
    assert!(PathSpecFactory::with_default_kinds().validate(&restored).is_ok());
    assert_eq!(resolver.cache_key(&restored).unwrap(), resolver.cache_key(&spec).unwrap());

    let first = resolver.open_file_object(&spec).unwrap();
    let second = resolver.open_file_object(&restored).unwrap();
    assert!(first.shares_file_object_with(&second));
    assert_eq!(second.read(None).unwrap(), b"trip");
}

#[test]
fn factory_builds_resolvable_chains() {
    let dir = tempfile::tempdir().unwrap();
    let leaf = write_file(dir.path(), "f", b"factory-made");
    let factory = PathSpecFactory::with_default_kinds();
    let spec = factory
        .new_path_spec(
            TypeIndicator::DATA_RANGE,
            [("range_offset", 8u64), ("range_size", 4u64)],
            Some(leaf),
        )
        .unwrap();

    let resolver = Resolver::with_default_helpers();
    assert_eq!(resolver.open_file_object(&spec).unwrap().read(None).unwrap(), b"made");
}

// =============================================================================
// A layer defined outside the crate
// =============================================================================

struct Xor(u8);

impl Layer for Xor {
    fn layer(self, parent: PathSpec) -> PathSpec {
        PathSpec::new(TypeIndicator::new("XOR"))
            .with_attribute("mask", u64::from(self.0))
            .with_parent(parent)
    }
}

struct XorHelper;

impl ResolverHelper for XorHelper {
    fn type_indicator(&self) -> TypeIndicator {
        TypeIndicator::new("XOR")
    }

    fn validate_path_spec(&self, path_spec: &PathSpec) -> Result<(), VfsError> {
        match path_spec.integer_attribute("mask") {
            Some(mask) if mask <= 0xff => Ok(()),
            _ => Err(VfsError::invalid_value("mask must be a byte")),
        }
    }

    fn new_file_object(&self, _path_spec: &PathSpec) -> Result<Box<dyn FileIo>, VfsError> {
        Ok(Box::new(XorFileIo { parent: None, mask: 0 }))
    }
}

struct XorFileIo {
    parent: Option<FileIoHandle>,
    mask: u8,
}

impl FileIo for XorFileIo {
    fn open(&mut self, resolver: &Resolver, path_spec: &PathSpec) -> Result<(), VfsError> {
        let parent = path_spec
            .parent()
            .ok_or_else(|| VfsError::path_spec("XOR needs a parent"))?;
        self.mask = path_spec.integer_attribute("mask").unwrap_or(0) as u8;
        self.parent = Some(resolver.open_file_object(parent)?);
        Ok(())
    }

    fn close(&mut self) -> Result<(), VfsError> {
        self.parent.take().map_or(Ok(()), FileIoHandle::close)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize, VfsError> {
        let parent = self.parent.as_ref().ok_or(VfsError::NotOpen { operation: "read" })?;
        let read = parent.read_at(offset, buf)?;
        buf[..read].iter_mut().for_each(|byte| *byte ^= self.mask);
        Ok(read)
    }

    fn size(&mut self) -> Result<u64, VfsError> {
        self.parent.as_ref().ok_or(VfsError::NotOpen { operation: "size" })?.size()
    }
}

#[test]
fn external_layer_plugs_into_the_resolver() {
    let dir = tempfile::tempdir().unwrap();
    let masked: Vec<u8> = b"plugin".iter().map(|b| b ^ 0x5a).collect();
    let leaf = write_file(dir.path(), "masked", &masked);
    let resolver = Resolver::with_default_helpers();
    resolver.register_helper(XorHelper).unwrap();

    let spec = leaf.clone().layer(Xor(0x5a));
    assert_eq!(resolver.open_file_object(&spec).unwrap().read(None).unwrap(), b"plugin");

    // No file system for this layer type.
    assert!(matches!(
        resolver.open_file_entry(&spec),
        Err(VfsError::NotSupported { .. })
    ));

    let invalid = PathSpec::new(TypeIndicator::new("XOR"))
        .with_attribute("mask", 300u64)
        .with_parent(leaf);
    assert!(matches!(
        resolver.open_file_object(&invalid),
        Err(VfsError::InvalidValue { .. })
    ));
    assert_eq!(resolver.context().number_of_file_objects(), 0);

    resolver.deregister_helper(&TypeIndicator::new("XOR")).unwrap();
    assert!(matches!(
        resolver.open_file_object(&spec),
        Err(VfsError::PathSpec { .. })
    ));
}

#[test]
fn resolver_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Resolver>();
    assert_send_sync::<FileIoHandle>();
    assert_send_sync::<FileSystemRef>();
    assert_send_sync::<Box<dyn FileEntry>>();

    let dir = tempfile::tempdir().unwrap();
    let spec = write_file(dir.path(), "shared.gz", &gzip(&log_text())).layer(Gzip);
    let resolver = Arc::new(Resolver::with_default_helpers());
    let expected = log_text();

    std::thread::scope(|scope| {
        for n in 0..4u64 {
            let resolver = Arc::clone(&resolver);
            let spec = spec.clone();
            let expected = &expected;
            scope.spawn(move || {
                let handle = resolver.open_file_object(&spec).unwrap();
                let mut buf = [0u8; 32];
                let offset = n * 1000;
                let read = handle.read_at(offset, &mut buf).unwrap();
                assert_eq!(&buf[..read], &expected[offset as usize..offset as usize + read]);
            });
        }
    });
    assert_eq!(resolver.context().number_of_file_objects(), 0);
}
