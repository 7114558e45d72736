//! Streaming gzip compression, checksum and archive verification
//!
//! All three work block by block, so memory use does not grow with the
//! size of the export.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

const COMPRESS_BLOCK: usize = 8192;
const CHECKSUM_BLOCK: usize = 4096;

/// Gzip `source` into `destination` and return the compressed size
///
/// The gzip header carries no timestamp or file name, so identical input
/// yields identical output.
pub fn compress_file(source: &Path, destination: &Path) -> Result<u64> {
    let mut input = File::open(source)?;
    let output = File::create(destination)?;
    let mut encoder = GzEncoder::new(output, Compression::best());

    let mut block = vec![0u8; COMPRESS_BLOCK];
    loop {
        let n = input.read(&mut block)?;
        if n == 0 {
            break;
        }
        encoder.write_all(&block[..n])?;
    }

    let mut output = encoder.finish()?;
    output.flush()?;
    output.sync_all()?;

    Ok(std::fs::metadata(destination)?.len())
}

/// Hex SHA-256 of a file, read in fixed-size blocks
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut block = [0u8; CHECKSUM_BLOCK];

    loop {
        let n = file.read(&mut block)?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Decompress the whole archive and return the uncompressed length
///
/// Reading through to the end checks the gzip trailer (CRC and length),
/// which catches truncation as well as a corrupt header.
pub fn verify_archive(path: &Path) -> Result<u64> {
    let file = File::open(path)?;
    let mut decoder = GzDecoder::new(BufReader::new(file));

    io::copy(&mut decoder, &mut io::sink())
        .map_err(|e| Error::Integrity(format!("{} is not a valid gzip archive: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn export_fixture(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("backup_20240101_000000.json");
        let records: String = (0..2000)
            .map(|i| format!("{{\"model\": \"app.client\", \"pk\": {i}, \"fields\": {{}}}}\n"))
            .collect();
        std::fs::write(&path, records).unwrap();
        path
    }

    #[test]
    fn test_compress_round_trip() {
        let dir = TempDir::new().unwrap();
        let source = export_fixture(dir.path());
        let archive = dir.path().join("backup_20240101_000000.json.gz");

        let size = compress_file(&source, &archive).unwrap();
        assert_eq!(size, std::fs::metadata(&archive).unwrap().len());
        assert!(size < std::fs::metadata(&source).unwrap().len());

        let mut restored = Vec::new();
        GzDecoder::new(File::open(&archive).unwrap())
            .read_to_end(&mut restored)
            .unwrap();
        assert_eq!(restored, std::fs::read(&source).unwrap());

        let length = verify_archive(&archive).unwrap();
        assert_eq!(length, restored.len() as u64);
    }

    #[test]
    fn test_compression_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let source = export_fixture(dir.path());
        let first = dir.path().join("first.gz");
        let second = dir.path().join("second.gz");

        compress_file(&source, &first).unwrap();
        compress_file(&source, &second).unwrap();
        assert_eq!(sha256_file(&first).unwrap(), sha256_file(&second).unwrap());
    }

    #[test]
    fn test_sha256_known_value() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_checksum_matches_independent_hash() {
        let dir = TempDir::new().unwrap();
        let source = export_fixture(dir.path());
        let archive = dir.path().join("a.gz");
        compress_file(&source, &archive).unwrap();

        let bytes = std::fs::read(&archive).unwrap();
        let expected = hex::encode(Sha256::digest(&bytes));
        assert_eq!(sha256_file(&archive).unwrap(), expected);
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json.gz");
        std::fs::write(&path, b"this is not gzip").unwrap();
        assert!(matches!(verify_archive(&path), Err(Error::Integrity(_))));
    }

    #[test]
    fn test_verify_rejects_truncated_archive() {
        let dir = TempDir::new().unwrap();
        let source = export_fixture(dir.path());
        let archive = dir.path().join("a.gz");
        compress_file(&source, &archive).unwrap();

        let bytes = std::fs::read(&archive).unwrap();
        std::fs::write(&archive, &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(verify_archive(&archive), Err(Error::Integrity(_))));
    }
}
