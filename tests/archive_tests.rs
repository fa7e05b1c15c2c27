//! Tests for single-entry tar archives.
//!
//! Reads every archive back with the `tar` crate to check entry name, mode,
//! size and content.

use std::io::Read;

use kubesniff::wrap_as_tar;

fn read_back(archive: &[u8]) -> Vec<(String, u32, Vec<u8>)> {
    let mut reader = tar::Archive::new(archive);
    reader
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mode = entry.header().mode().unwrap();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            (name, mode, content)
        })
        .collect()
}

#[test]
fn test_round_trip_sizes() {
    for size in [0usize, 1, 4096, 1024 * 1024] {
        let content: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let archive = wrap_as_tar("x.bin", &content).unwrap();

        let entries = read_back(&archive);
        assert_eq!(entries.len(), 1, "size {size}");
        let (name, mode, data) = &entries[0];
        assert_eq!(name, "x.bin", "size {size}");
        assert_eq!(*mode, 0o755, "size {size}");
        assert_eq!(data, &content, "size {size}");
    }
}

#[test]
fn test_header_reports_exact_size() {
    let archive = wrap_as_tar("static-tcpdump", &[7u8; 1500]).unwrap();
    let mut reader = tar::Archive::new(archive.as_slice());
    let entry = reader.entries().unwrap().next().unwrap().unwrap();

    assert_eq!(entry.header().size().unwrap(), 1500);
    assert_eq!(entry.header().entry_type(), tar::EntryType::Regular);
}

#[test]
fn test_same_input_same_bytes() {
    let a = wrap_as_tar("x.bin", b"payload").unwrap();
    let b = wrap_as_tar("x.bin", b"payload").unwrap();
    assert_eq!(a, b);

    let c = wrap_as_tar("y.bin", b"payload").unwrap();
    assert_ne!(a, c);
}

#[test]
fn test_archive_is_block_aligned() {
    for size in [0usize, 1, 511, 512, 513] {
        let archive = wrap_as_tar("x.bin", &vec![1u8; size]).unwrap();
        assert_eq!(archive.len() % 512, 0, "size {size}");
    }
}

#[test]
fn test_rejects_nested_names() {
    assert!(wrap_as_tar("tmp/x.bin", b"x").is_err());
    assert!(wrap_as_tar("/x.bin", b"x").is_err());
    assert!(wrap_as_tar(".", b"x").is_err());
}
