//! Resolving a layered path specification over a native file.
//!
//! Writes an RC4 encrypted gzip stream to a temporary directory, then reads
//! it back through `OS -> ENCRYPTED_STREAM -> GZIP`, showing entries, the
//! cache and its reference counts along the way.
//!
//! Run with: `RUST_LOG=layerfs=debug cargo run --example resolve_layers`

use std::error::Error;
use std::io::Write;

use layerfs::backends::encrypted_stream::EncryptedStream;
use layerfs::backends::gzip::Gzip;
use layerfs::backends::os;
use layerfs::{FileEntry, FileEntryExt, Resolver};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const KEY: &[u8] = b"demo-key";

// =============================================================================
// Step 1: Build an encrypted, compressed file
// =============================================================================

fn rc4(key: &[u8], data: &mut [u8]) {
    let mut state: Vec<u8> = (0..=255).collect();
    let mut j = 0u8;
    for i in 0..256 {
        j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
        state.swap(i, usize::from(j));
    }
    let (mut i, mut j) = (0u8, 0u8);
    for byte in data {
        i = i.wrapping_add(1);
        j = j.wrapping_add(state[usize::from(i)]);
        state.swap(usize::from(i), usize::from(j));
        *byte ^= state[usize::from(state[usize::from(i)].wrapping_add(state[usize::from(j)]))];
    }
}

fn build_blob(text: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut encoder = flate2::GzBuilder::new()
        .filename("notes.txt")
        .write(Vec::new(), flate2::Compression::default());
    encoder.write_all(text.as_bytes())?;
    let mut blob = encoder.finish()?;
    rc4(KEY, &mut blob);
    Ok(blob)
}

// =============================================================================
// Step 2: Walk the layers
// =============================================================================

fn describe(entry: &dyn FileEntry, depth: usize) -> Result<(), Box<dyn Error>> {
    let stat = entry.stat()?;
    println!(
        "{:indent$}{} [{}] {} bytes{}",
        "",
        entry.path_spec().type_indicator(),
        stat.entry_type,
        stat.size,
        if entry.is_virtual() { " (virtual)" } else { "" },
        indent = depth * 2
    );
    if let Some(parent) = entry.parent_layer_file_entry()? {
        describe(parent.as_ref(), depth + 1)?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("notes.bin");
    std::fs::write(&path, build_blob("layered file systems, one layer at a time\n")?)?;

    let spec = os::path_spec(path.to_string_lossy())
        .layer(EncryptedStream::rc4(KEY.to_vec()))
        .layer(Gzip);
    println!("path specification:\n{spec}");

    let resolver = Resolver::with_default_helpers();
    let entry = resolver
        .open_file_entry(&spec)?
        .ok_or("no entry for the gzip layer")?;

    println!("layers, outermost first:");
    describe(entry.as_ref(), 1)?;
    println!("name from gzip header: {:?}", entry.name());
    print!("content: {}", entry.read_to_string()?);

    // =========================================================================
    // Step 3: Observe the cache
    // =========================================================================

    let key = resolver.cache_key(&spec)?;
    let first = resolver.open_file_object(&spec)?;
    let second = resolver.open_file_object(&spec)?;
    println!(
        "same object: {}, references: {:?}",
        first.shares_file_object_with(&second),
        resolver.context().file_object_references(&key)
    );

    first.close()?;
    second.close()?;
    drop(entry);
    println!(
        "after closing: {} file objects, {} file systems cached",
        resolver.context().number_of_file_objects(),
        resolver.context().number_of_file_systems()
    );
    Ok(())
}
