use std::fs;
use std::io::{self, Cursor, Write};
use std::sync::{Arc, Mutex};

use arcodec::{
    DecodeOptions, EncodeOptions, Error, ErrorKind, EscapePolicy, ExtractOptions, Registry,
    SkipReason, extract_from_reader,
};

#[derive(Clone, Default)]
struct Sink(Arc<Mutex<Vec<u8>>>);

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Archive with the given file entries, optionally wrapped in a compressor.
fn build(
    registry: &Registry,
    archive: &str,
    outer: Option<&str>,
    files: &[(&str, &[u8])],
) -> Vec<u8> {
    let archived = Sink::default();
    let mut writer = registry
        .open_for_write(archive, archived.clone(), None, &EncodeOptions::DEFAULT)
        .unwrap()
        .into_entries()
        .unwrap();
    for (name, body) in files {
        writer
            .append_file(name, Some(0o644), body.len() as u64, &mut &body[..])
            .unwrap();
    }
    writer.finish().unwrap();
    let bytes = archived.0.lock().unwrap().clone();

    let Some(outer) = outer else {
        return bytes;
    };
    let compressed = Sink::default();
    let mut writer = registry
        .open_for_write(outer, compressed.clone(), None, &EncodeOptions::DEFAULT)
        .unwrap()
        .into_bytes()
        .unwrap();
    writer.write_all(&bytes).unwrap();
    writer.finish().unwrap();
    let bytes = compressed.0.lock().unwrap().clone();
    bytes
}

fn available(registry: &Registry, names: &[&str]) -> bool {
    names
        .iter()
        .all(|name| registry.get(name).is_ok_and(|h| h.is_encode_available()))
}

#[test]
fn zip_slip_entry_aborts_extraction() {
    let registry = Registry::with_builtins();
    if !available(&registry, &["zip"]) {
        return;
    }
    let scratch = tempfile::Builder::new()
        .prefix("arcodec-test-zip-")
        .tempdir()
        .unwrap();
    let root = scratch.path().join("out");
    let bytes = build(&registry, "zip", None, &[("../evil.txt", b"pwned")]);

    let err = extract_from_reader(
        &registry,
        Cursor::new(bytes),
        &root,
        None,
        &DecodeOptions::DEFAULT,
        &ExtractOptions::default(),
    )
    .unwrap_err();

    assert!(matches!(err, Error::PathEscape { .. }), "{err}");
    assert_eq!(err.kind(), ErrorKind::PathEscape);
    assert!(!scratch.path().join("evil.txt").exists());
}

#[test]
fn zip_slip_entry_can_be_skipped() {
    let registry = Registry::with_builtins();
    if !available(&registry, &["zip"]) {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let root = scratch.path().join("out");
    let bytes = build(
        &registry,
        "zip",
        None,
        &[("../evil.txt", b"pwned"), ("docs/readme.txt", b"hello")],
    );

    let options = ExtractOptions::default().escape_policy(EscapePolicy::Skip);
    let report = extract_from_reader(
        &registry,
        Cursor::new(bytes),
        &root,
        None,
        &DecodeOptions::DEFAULT,
        &options,
    )
    .unwrap();

    assert_eq!(report.entry_count(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].entry, "../evil.txt");
    assert_eq!(report.skipped[0].reason, SkipReason::PathEscape);
    assert_eq!(fs::read(root.join("docs/readme.txt")).unwrap(), b"hello");
    assert!(!scratch.path().join("evil.txt").exists());
}

#[test]
fn tar_gz_is_peeled_and_stripped() {
    let registry = Registry::with_builtins();
    if !available(&registry, &["tar", "gz"]) {
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let bytes = build(
        &registry,
        "tar",
        Some("gz"),
        &[("tool-1.0/bin/tool", b"#!/bin/sh\n"), ("tool-1.0/LICENSE", b"MIT")],
    );

    let options = ExtractOptions::default().strip_components(1);
    let report = extract_from_reader(
        &registry,
        Cursor::new(bytes),
        scratch.path(),
        None,
        &DecodeOptions::DEFAULT,
        &options,
    )
    .unwrap();

    assert_eq!(report.format, "tar");
    assert_eq!(report.entry_count(), 2);
    assert_eq!(report.total_bytes, 13);
    assert!(scratch.path().join("bin/tool").is_file());
    assert!(scratch.path().join("LICENSE").is_file());
}

#[test]
fn plain_compressed_stream_is_not_an_archive() {
    let registry = Registry::with_builtins();
    if !available(&registry, &["zstd"]) {
        return;
    }
    let compressed = Sink::default();
    let mut writer = registry
        .open_for_write("zstd", compressed.clone(), None, &EncodeOptions::DEFAULT)
        .unwrap()
        .into_bytes()
        .unwrap();
    writer.write_all(b"just some text, not a container").unwrap();
    writer.finish().unwrap();
    let bytes = compressed.0.lock().unwrap().clone();

    let scratch = tempfile::tempdir().unwrap();
    let err = extract_from_reader(
        &registry,
        Cursor::new(bytes),
        scratch.path(),
        None,
        &DecodeOptions::DEFAULT,
        &ExtractOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoMatch);
}

#[test]
fn truncated_zip_recovers_on_request() {
    let registry = Registry::with_builtins();
    if !available(&registry, &["zip"]) {
        return;
    }
    let mut bytes = build(
        &registry,
        "zip",
        None,
        &[("a.txt", b"first"), ("b.txt", b"second")],
    );
    // keep the first local entry, corrupt the start of the second header
    let second = bytes
        .windows(4)
        .skip(4)
        .position(|w| w == [b'P', b'K', 3, 4])
        .map(|pos| pos + 4)
        .unwrap();
    bytes[second + 4..second + 8].fill(0xFF);
    bytes[second + 26..second + 30].fill(0xFF);

    let scratch = tempfile::tempdir().unwrap();
    let recover = DecodeOptions::builder()
        .with_try_to_recover_broken_archives(true)
        .with_max_memory_limit_in_kb(1024)
        .build()
        .unwrap();
    let report = extract_from_reader(
        &registry,
        Cursor::new(bytes),
        scratch.path(),
        None,
        &recover,
        &ExtractOptions::default(),
    )
    .unwrap();
    assert!(report.entry_count() >= 1);
    assert_eq!(fs::read(scratch.path().join("a.txt")).unwrap(), b"first");
}
