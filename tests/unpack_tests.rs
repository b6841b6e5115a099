use crxview::unpack::{
    ArchiveReader, ExtractionError, HeaderError, PackageFormat, ZipArchiveReader, detect_format,
    parse_header,
};
use std::io::{Cursor, Write};
use std::sync::Arc;
use zip::write::SimpleFileOptions;

fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn crx2(key: &[u8], sig: &[u8], zip: &[u8]) -> Vec<u8> {
    let mut data = b"Cr24".to_vec();
    data.extend_from_slice(&2u32.to_le_bytes());
    data.extend_from_slice(&(key.len() as u32).to_le_bytes());
    data.extend_from_slice(&(sig.len() as u32).to_le_bytes());
    data.extend_from_slice(key);
    data.extend_from_slice(sig);
    data.extend_from_slice(zip);
    data
}

#[test]
fn test_detect_crx_format() {
    assert_eq!(detect_format(b"Cr24\x03\x00\x00\x00"), PackageFormat::Crx3);
    assert_eq!(detect_format(b"Cr24\x02\x00\x00\x00"), PackageFormat::Crx2);
    assert_eq!(detect_format(b"Cr24\x09\x00\x00\x00"), PackageFormat::Unknown);
}

#[test]
fn test_detect_zip_format() {
    assert_eq!(detect_format(b"PK\x03\x04"), PackageFormat::Zip);
}

#[test]
fn test_detect_unknown_format() {
    assert_eq!(detect_format(b"UNKNOWN"), PackageFormat::Unknown);
    assert_eq!(detect_format(b"Cr"), PackageFormat::Unknown);
}

#[test]
fn test_crx2_documented_example() {
    let mut data = vec![
        0x43, 0x72, 0x32, 0x34, 0x02, 0x00, 0x00, 0x00, 0x0A, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00,
        0x00,
    ];
    data.extend_from_slice(&[0xAA; 10]);
    data.extend_from_slice(&[0xBB; 5]);
    data.extend(build_zip(&[("manifest.json", "{}")]));

    let header = parse_header(&data).unwrap();
    assert_eq!(header.format_version, 2);
    assert_eq!(header.archive_payload_offset, 31);
    assert_eq!(&data[31..33], &[0x50, 0x4B]);
}

#[test]
fn test_crx2_payload_opens_as_archive() {
    let data = crx2(b"public-key", b"signature", &build_zip(&[("a.js", "let a;")]));
    let header = parse_header(&data).unwrap();
    assert_eq!(header.archive_payload_offset, 16 + 10 + 9);

    let reader = ZipArchiveReader::open_at(Arc::from(data), header.archive_payload_offset).unwrap();
    assert_eq!(reader.read_entry("a.js").unwrap(), b"let a;");
}

#[test]
fn test_length_fields_past_end_fail() {
    let mut data = crx2(b"k", b"s", &build_zip(&[("a", "b")]));
    data[8..12].copy_from_slice(&0x7fff_ffffu32.to_le_bytes());
    assert!(matches!(parse_header(&data), Err(HeaderError::CorruptHeader(_))));
}

#[test]
fn test_truncated_inputs_never_panic() {
    let data = crx2(b"public-key", b"signature", &build_zip(&[("a.js", "let a;")]));
    for len in 0..data.len() {
        let _ = parse_header(&data[..len]);
    }
}

#[test]
fn test_corrupt_entry_is_read_error() {
    let content = "this content will be corrupted in place";
    let mut data = build_zip(&[("good.txt", "fine"), ("bad.txt", content)]);
    let start = data
        .windows(content.len())
        .position(|w| w == content.as_bytes())
        .unwrap();
    data[start] ^= 0xff;

    let reader = ZipArchiveReader::open(data).unwrap();
    assert!(matches!(
        reader.read_entry("bad.txt"),
        Err(ExtractionError::ReadError { .. })
    ));
    // Other entries are unaffected.
    assert_eq!(reader.read_entry("good.txt").unwrap(), b"fine");
}

#[test]
fn test_parallel_reads() {
    let files: Vec<(String, String)> = (0..16)
        .map(|i| (format!("js/file{i}.js"), format!("console.log({i});")))
        .collect();
    let refs: Vec<(&str, &str)> = files.iter().map(|(n, c)| (n.as_str(), c.as_str())).collect();
    let reader = Arc::new(ZipArchiveReader::open(build_zip(&refs)).unwrap());

    std::thread::scope(|scope| {
        for (name, content) in &files {
            let reader = Arc::clone(&reader);
            scope.spawn(move || {
                assert_eq!(reader.read_entry(name).unwrap(), content.as_bytes());
            });
        }
    });
}
