//! The archive listing codec: a flat, big-endian sequence of per-item
//! records (file / directory / symlink) describing a walked filesystem
//! tree, itself stored as just another stream in the block store.
//!
//! Grounded on `examples/original_source/dust-archive.c`'s `archive_files()`
//! and `dust-file-utils.c`'s `for_item_in_listing()` /
//! `extract_archive_listing()`.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::block::BlockType;
use crate::error::{Result, StoreError};
use crate::fingerprint::{Fingerprint, RunningHash, FINGERPRINT_SIZE};
use crate::store::Store;
use crate::stream::{add_stream, extract_stream};
use crate::wire;

pub const LISTING_MAGIC: u32 = 0xA7842A73;
pub const LISTING_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordType {
    File = 0,
    Directory = 1,
    Symlink = 2,
}

/// A decoded listing record, handed to the caller's callback during
/// [`decode_listing`]. The caller owns filesystem reconstruction; this
/// module only owns the wire format.
#[derive(Debug)]
pub struct ListingRecord {
    pub path: PathBuf,
    pub permissions: u32,
    pub body: ListingBody,
}

#[derive(Debug)]
pub enum ListingBody {
    File { fingerprint: Fingerprint, sha256: [u8; FINGERPRINT_SIZE] },
    Directory,
    Symlink { target: PathBuf },
}

fn path_to_nul_terminated_bytes(path: &Path) -> Vec<u8> {
    let mut bytes = path.as_os_str().as_bytes().to_vec();
    bytes.push(0);
    bytes
}

fn nul_terminated_bytes_to_path(bytes: &[u8]) -> PathBuf {
    let trimmed = match bytes.last() {
        Some(0) => &bytes[..bytes.len() - 1],
        _ => bytes,
    };
    PathBuf::from(std::ffi::OsStr::from_bytes(trimmed))
}

fn write_record_header<W: Write>(out: &mut W, record_type: RecordType, path_bytes: &[u8]) -> Result<()> {
    wire::write_u32be(out, record_type as u32).map_err(|e| StoreError::io(Path::new("<listing>"), e))?;
    wire::write_u32be(out, path_bytes.len() as u32).map_err(|e| StoreError::io(Path::new("<listing>"), e))?;
    out.write_all(path_bytes).map_err(|e| StoreError::io(Path::new("<listing>"), e))
}

/// Walks `paths` (each visited non-recursively — the caller is responsible
/// for handing in every entry of a directory tree it wants captured, the
/// same contract `archive_files()` uses), writes one record per entry, and
/// stores the resulting listing stream in `store`. Returns the listing
/// stream's fingerprint, which doubles as the archive's root fingerprint.
pub fn encode_listing<P: AsRef<Path>>(store: &mut Store, paths: &[P]) -> Result<Fingerprint> {
    let mut listing = tempfile::tempfile().map_err(|e| StoreError::io(Path::new("<listing buffer>"), e))?;
    wire::write_u32be(&mut listing, LISTING_MAGIC).map_err(|e| StoreError::io(Path::new("<listing buffer>"), e))?;
    wire::write_u32be(&mut listing, LISTING_VERSION).map_err(|e| StoreError::io(Path::new("<listing buffer>"), e))?;

    for item in paths {
        let path = item.as_ref();
        let meta = fs::symlink_metadata(path).map_err(|e| StoreError::io(path, e))?;
        let permissions = meta.permissions().mode() & 0o777;
        let path_bytes = path_to_nul_terminated_bytes(path);
        let file_type = meta.file_type();

        if file_type.is_file() {
            write_record_header(&mut listing, RecordType::File, &path_bytes)?;
            let mut file = File::open(path).map_err(|e| StoreError::io(path, e))?;
            let mut hash = RunningHash::new();
            let fp = add_stream(store, &mut file, BlockType::FileData, Some(&mut hash))?;
            listing
                .write_all(fp.as_bytes())
                .map_err(|e| StoreError::io(Path::new("<listing buffer>"), e))?;
            listing
                .write_all(&hash.finish())
                .map_err(|e| StoreError::io(Path::new("<listing buffer>"), e))?;
            wire::write_u32be(&mut listing, permissions).map_err(|e| StoreError::io(Path::new("<listing buffer>"), e))?;
        } else if file_type.is_dir() {
            write_record_header(&mut listing, RecordType::Directory, &path_bytes)?;
            wire::write_u32be(&mut listing, permissions).map_err(|e| StoreError::io(Path::new("<listing buffer>"), e))?;
        } else if file_type.is_symlink() {
            write_record_header(&mut listing, RecordType::Symlink, &path_bytes)?;
            let target = fs::read_link(path).map_err(|e| StoreError::io(path, e))?;
            let target_bytes = path_to_nul_terminated_bytes(&target);
            wire::write_u32be(&mut listing, target_bytes.len() as u32)
                .map_err(|e| StoreError::io(Path::new("<listing buffer>"), e))?;
            listing
                .write_all(&target_bytes)
                .map_err(|e| StoreError::io(Path::new("<listing buffer>"), e))?;
            wire::write_u32be(&mut listing, permissions).map_err(|e| StoreError::io(Path::new("<listing buffer>"), e))?;
        } else {
            return Err(StoreError::Logic(
                "unsupported file type: not a regular file, directory, or symlink",
            ));
        }
    }

    listing
        .flush()
        .map_err(|e| StoreError::io(Path::new("<listing buffer>"), e))?;
    listing
        .seek(SeekFrom::Start(0))
        .map_err(|e| StoreError::io(Path::new("<listing buffer>"), e))?;

    add_stream(store, &mut listing, BlockType::FileData, None)
}

fn read_u32be_or_eof<R: Read>(src: &mut R) -> Result<Option<u32>> {
    let mut buf = [0u8; 4];
    let mut total = 0;
    while total < 4 {
        match src.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StoreError::io(Path::new("<listing>"), e)),
        }
    }
    if total == 0 {
        return Ok(None);
    }
    if total < 4 {
        return Err(StoreError::ShortRead {
            path: PathBuf::from("<listing>"),
            expected: 4,
            got: total,
        });
    }
    let mut cursor = &buf[..];
    Ok(Some(wire::read_u32be(&mut cursor).expect("reading from a fixed-size slice")))
}

/// Reads a listing stream from `src` (already reassembled by the caller via
/// [`crate::stream::extract_stream`]) and invokes `callback` once per record
/// in the order they were written.
pub fn decode_listing<R: Read>(src: &mut R, mut callback: impl FnMut(ListingRecord) -> Result<()>) -> Result<()> {
    let magic = wire::read_u32be(src).map_err(|e| StoreError::io(Path::new("<listing>"), e))?;
    if magic != LISTING_MAGIC {
        return Err(StoreError::BadMagic {
            what: "listing",
            expected: LISTING_MAGIC,
            got: magic,
        });
    }
    let version = wire::read_u32be(src).map_err(|e| StoreError::io(Path::new("<listing>"), e))? as u64;
    if version != LISTING_VERSION as u64 {
        return Err(StoreError::UnsupportedVersion { what: "listing", version });
    }

    loop {
        let record_type = match read_u32be_or_eof(src)? {
            Some(v) => v,
            None => break,
        };

        let path_len = wire::read_u32be(src).map_err(|e| StoreError::io(Path::new("<listing>"), e))?;
        let mut path_bytes = vec![0u8; path_len as usize];
        src.read_exact(&mut path_bytes).map_err(|e| StoreError::io(Path::new("<listing>"), e))?;
        let path = nul_terminated_bytes_to_path(&path_bytes);

        let body = match record_type {
            0 => {
                let mut fp_bytes = [0u8; FINGERPRINT_SIZE];
                src.read_exact(&mut fp_bytes).map_err(|e| StoreError::io(Path::new("<listing>"), e))?;
                let mut sha_bytes = [0u8; FINGERPRINT_SIZE];
                src.read_exact(&mut sha_bytes).map_err(|e| StoreError::io(Path::new("<listing>"), e))?;
                ListingBody::File {
                    fingerprint: Fingerprint::from_bytes(fp_bytes),
                    sha256: sha_bytes,
                }
            }
            1 => ListingBody::Directory,
            2 => {
                let target_len = wire::read_u32be(src).map_err(|e| StoreError::io(Path::new("<listing>"), e))?;
                let mut target_bytes = vec![0u8; target_len as usize];
                src.read_exact(&mut target_bytes).map_err(|e| StoreError::io(Path::new("<listing>"), e))?;
                ListingBody::Symlink {
                    target: nul_terminated_bytes_to_path(&target_bytes),
                }
            }
            other => return Err(StoreError::UnknownRecordType { record_type: other }),
        };

        let permissions = wire::read_u32be(src).map_err(|e| StoreError::io(Path::new("<listing>"), e))?;
        callback(ListingRecord { path, permissions, body })?;
    }

    Ok(())
}

/// Reassembles the listing stream rooted at `fp` and decodes it, invoking
/// `callback` per record. Used by extraction and listing CLI paths alike.
pub fn for_each_record(
    store: &mut Store,
    root: Fingerprint,
    callback: impl FnMut(ListingRecord) -> Result<()>,
) -> Result<()> {
    let mut buffer = tempfile::tempfile().map_err(|e| StoreError::io(Path::new("<listing buffer>"), e))?;
    extract_stream(store, root, Some(&mut buffer), None)?;
    buffer
        .seek(SeekFrom::Start(0))
        .map_err(|e| StoreError::io(Path::new("<listing buffer>"), e))?;
    decode_listing(&mut buffer, callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::perm::Permission;
    use std::os::unix::fs::symlink;
    use tempfile::tempdir;

    fn new_store(dir: &Path) -> Store {
        let config = StoreConfig {
            index_path: dir.join("index"),
            arena_path: dir.join("arena"),
            fake_timestamp: Some(0),
            verbosity: 0,
        };
        Store::open(config, Permission::ReadWrite, true).unwrap()
    }

    #[test]
    fn round_trips_file_directory_and_symlink() {
        let store_dir = tempdir().unwrap();
        let mut store = new_store(store_dir.path());

        let src_dir = tempdir().unwrap();
        let file_path = src_dir.path().join("hello.txt");
        fs::write(&file_path, b"hello listing").unwrap();
        let sub_dir = src_dir.path().join("sub");
        fs::create_dir(&sub_dir).unwrap();
        let link_path = src_dir.path().join("link");
        symlink("hello.txt", &link_path).unwrap();

        let paths = vec![file_path.clone(), sub_dir.clone(), link_path.clone()];
        let root = encode_listing(&mut store, &paths).unwrap();

        let mut seen = Vec::new();
        for_each_record(&mut store, root, |record| {
            seen.push(record);
            Ok(())
        })
        .unwrap();

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].path, file_path);
        assert!(matches!(seen[0].body, ListingBody::File { .. }));
        assert_eq!(seen[1].path, sub_dir);
        assert!(matches!(seen[1].body, ListingBody::Directory));
        assert_eq!(seen[2].path, link_path);
        match &seen[2].body {
            ListingBody::Symlink { target } => assert_eq!(target, Path::new("hello.txt")),
            other => panic!("expected symlink, got {other:?}"),
        }
    }

    #[test]
    fn file_record_hash_matches_content() {
        let store_dir = tempdir().unwrap();
        let mut store = new_store(store_dir.path());
        let src_dir = tempdir().unwrap();
        let file_path = src_dir.path().join("data.bin");
        fs::write(&file_path, b"some bytes").unwrap();

        let root = encode_listing(&mut store, &[file_path.clone()]).unwrap();

        let mut found = None;
        for_each_record(&mut store, root, |record| {
            found = Some(record);
            Ok(())
        })
        .unwrap();

        match found.unwrap().body {
            ListingBody::File { sha256, .. } => {
                assert_eq!(sha256, Fingerprint::of(b"some bytes").as_bytes().clone());
            }
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[test]
    fn empty_listing_decodes_to_zero_records() {
        let store_dir = tempdir().unwrap();
        let mut store = new_store(store_dir.path());
        let root = encode_listing(&mut store, &Vec::<PathBuf>::new()).unwrap();

        let mut count = 0;
        for_each_record(&mut store, root, |_| {
            count += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 0);
    }
}
