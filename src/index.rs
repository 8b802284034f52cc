//! On-disk bucketed hash table mapping fingerprint → arena offset.
//!
//! Grounded on `examples/original_source/dust-internal.c`'s `index_header`/
//! `index_bucket`/`index_entry` structs and bucket-selection function.
//! Modeled per the spec's design note as a tagged sum type (`Backend`)
//! behind a common `lookup`/`insert`/`contains`/`close` capability set,
//! rather than sharing mutable file-descriptor and mapping state the way a
//! C tagged union would.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};

use crate::error::{Result, StoreError};
use crate::fingerprint::{Fingerprint, FINGERPRINT_SIZE};
use crate::ioutil;
use crate::perm::{IndexFlags, Permission};
use crate::wire;

pub const HEADER_SIZE: usize = 4096;
pub const BUCKET_SIZE: usize = 4096;
pub const ENTRIES_PER_BUCKET: usize = 102;
pub const ENTRY_SIZE: usize = FINGERPRINT_SIZE + 8;
pub const FORMAT_VERSION: u64 = 0;
pub const DEFAULT_NUM_BUCKETS: u64 = 1_048_576;

const COUNT_OFFSET: usize = ENTRIES_PER_BUCKET * ENTRY_SIZE;

struct IndexHeader {
    num_buckets: u64,
    version: u64,
}

impl IndexHeader {
    fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        {
            let mut cursor = &mut buf[..];
            wire::write_u64be(&mut cursor, self.num_buckets).expect("writing to a slice");
            wire::write_u64be(&mut cursor, self.version).expect("writing to a slice");
        }
        buf
    }

    fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let mut cursor = &buf[..];
        let num_buckets = wire::read_u64be(&mut cursor).expect("reading from a slice");
        let version = wire::read_u64be(&mut cursor).expect("reading from a slice");
        if version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                what: "index",
                version,
            });
        }
        Ok(IndexHeader { num_buckets, version })
    }
}

fn select_bucket(fp: &Fingerprint, num_buckets: u64) -> u64 {
    let mut acc: u64 = 0;
    for (i, &byte) in fp.as_bytes().iter().enumerate() {
        acc ^= (byte as u64) << ((i % 8) * 8);
    }
    acc % num_buckets
}

fn bucket_count(buf: &[u8]) -> u32 {
    let mut cursor = &buf[COUNT_OFFSET..COUNT_OFFSET + 4];
    wire::read_u32be(&mut cursor).expect("reading from a slice")
}

fn set_bucket_count(buf: &mut [u8], count: u32) {
    let mut cursor = &mut buf[COUNT_OFFSET..COUNT_OFFSET + 4];
    wire::write_u32be(&mut cursor, count).expect("writing to a slice")
}

fn read_entry(buf: &[u8], idx: usize) -> (Fingerprint, u64) {
    let start = idx * ENTRY_SIZE;
    let mut fp_bytes = [0u8; FINGERPRINT_SIZE];
    fp_bytes.copy_from_slice(&buf[start..start + FINGERPRINT_SIZE]);
    let mut cursor = &buf[start + FINGERPRINT_SIZE..start + ENTRY_SIZE];
    let offset = wire::read_u64be(&mut cursor).expect("reading from a slice");
    (Fingerprint::from_bytes(fp_bytes), offset)
}

fn write_entry(buf: &mut [u8], idx: usize, fp: &Fingerprint, offset: u64) {
    let start = idx * ENTRY_SIZE;
    buf[start..start + FINGERPRINT_SIZE].copy_from_slice(fp.as_bytes());
    let mut cursor = &mut buf[start + FINGERPRINT_SIZE..start + ENTRY_SIZE];
    wire::write_u64be(&mut cursor, offset).expect("writing to a slice");
}

fn bucket_lookup(buf: &[u8], fp: &Fingerprint) -> Option<u64> {
    let count = bucket_count(buf) as usize;
    (0..count).map(|i| read_entry(buf, i)).find(|(efp, _)| efp == fp).map(|(_, off)| off)
}

fn bucket_insert(buf: &mut [u8], fp: &Fingerprint, offset: u64, bucket_idx: u64) -> Result<()> {
    let count = bucket_count(buf) as usize;
    if count >= ENTRIES_PER_BUCKET {
        return Err(StoreError::BucketOverflow {
            bucket: bucket_idx,
            capacity: ENTRIES_PER_BUCKET,
        });
    }
    write_entry(buf, count, fp, offset);
    set_bucket_count(buf, (count + 1) as u32);
    Ok(())
}

enum MmapHandle {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

enum Backend {
    Stdio { buckets: Vec<u8>, dirty: bool },
    Mmap { mmap: MmapHandle },
}

pub struct Index {
    path: PathBuf,
    file: File,
    num_buckets: u64,
    permission: Permission,
    backend: Backend,
}

impl Index {
    /// Opens (or, with `flags.create`, creates) an index at `path`.
    /// `num_buckets` is meaningful only when a fresh index is actually
    /// initialized — an existing valid index dictates its own bucket count
    /// from its header, and a `None` on creation falls back to
    /// [`DEFAULT_NUM_BUCKETS`]. This models the original's variadic
    /// "number of buckets only at creation time" argument as a single
    /// optional parameter.
    pub fn open(
        path: impl AsRef<Path>,
        permission: Permission,
        flags: IndexFlags,
        num_buckets: Option<u64>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if flags.create && permission != Permission::ReadWrite {
            return Err(StoreError::Open {
                path,
                permission: permission.as_str(),
                reason: "CREATE requires read-write permission",
            });
        }

        match probe_existing(&path) {
            Some(header) => Self::open_existing(path, permission, flags, header),
            None if flags.create => {
                Self::create_fresh(path, flags, num_buckets.unwrap_or(DEFAULT_NUM_BUCKETS))
            }
            None => Err(StoreError::Open {
                path,
                permission: permission.as_str(),
                reason: "index file missing, too short, or not a valid index",
            }),
        }
    }

    fn open_existing(
        path: PathBuf,
        permission: Permission,
        flags: IndexFlags,
        header: IndexHeader,
    ) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.read(true);
        if permission == Permission::ReadWrite {
            options.write(true);
        }
        let mut file = options.open(&path).map_err(|e| StoreError::io(&path, e))?;

        let backend = if flags.mmap {
            let handle = match permission {
                Permission::ReadWrite => {
                    let m = unsafe { MmapMut::map_mut(&file) }.map_err(|e| StoreError::io(&path, e))?;
                    MmapHandle::ReadWrite(m)
                }
                Permission::Read => {
                    let m = unsafe { Mmap::map(&file) }.map_err(|e| StoreError::io(&path, e))?;
                    MmapHandle::ReadOnly(m)
                }
            };
            Backend::Mmap { mmap: handle }
        } else {
            file.seek(SeekFrom::Start(HEADER_SIZE as u64))
                .map_err(|e| StoreError::io(&path, e))?;
            let mut buckets = vec![0u8; header.num_buckets as usize * BUCKET_SIZE];
            ioutil::read_exact(&path, &mut file, &mut buckets)?;
            Backend::Stdio { buckets, dirty: false }
        };

        Ok(Index {
            path,
            file,
            num_buckets: header.num_buckets,
            permission,
            backend,
        })
    }

    fn create_fresh(path: PathBuf, flags: IndexFlags, num_buckets: u64) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| StoreError::io(&path, e))?;

        let total = HEADER_SIZE as u64 + num_buckets * BUCKET_SIZE as u64;
        file.set_len(total).map_err(|e| StoreError::io(&path, e))?;

        let header = IndexHeader {
            num_buckets,
            version: FORMAT_VERSION,
        };
        file.seek(SeekFrom::Start(0)).map_err(|e| StoreError::io(&path, e))?;
        ioutil::write_all(&path, &mut file, &header.encode())?;
        ioutil::flush(&path, &mut file)?;

        let backend = if flags.mmap {
            let m = unsafe { MmapMut::map_mut(&file) }.map_err(|e| StoreError::io(&path, e))?;
            Backend::Mmap {
                mmap: MmapHandle::ReadWrite(m),
            }
        } else {
            Backend::Stdio {
                buckets: vec![0u8; num_buckets as usize * BUCKET_SIZE],
                dirty: false,
            }
        };

        Ok(Index {
            path,
            file,
            num_buckets,
            permission: Permission::ReadWrite,
            backend,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn num_buckets(&self) -> u64 {
        self.num_buckets
    }

    fn bucket_slice(&self, idx: u64) -> &[u8] {
        let start = idx as usize * BUCKET_SIZE;
        match &self.backend {
            Backend::Stdio { buckets, .. } => &buckets[start..start + BUCKET_SIZE],
            Backend::Mmap { mmap } => {
                let bytes: &[u8] = match mmap {
                    MmapHandle::ReadOnly(m) => m,
                    MmapHandle::ReadWrite(m) => m,
                };
                &bytes[HEADER_SIZE + start..HEADER_SIZE + start + BUCKET_SIZE]
            }
        }
    }

    fn bucket_slice_mut(&mut self, idx: u64) -> Result<&mut [u8]> {
        let start = idx as usize * BUCKET_SIZE;
        match &mut self.backend {
            Backend::Stdio { buckets, dirty } => {
                *dirty = true;
                Ok(&mut buckets[start..start + BUCKET_SIZE])
            }
            Backend::Mmap { mmap } => match mmap {
                MmapHandle::ReadWrite(m) => Ok(&mut m[HEADER_SIZE + start..HEADER_SIZE + start + BUCKET_SIZE]),
                MmapHandle::ReadOnly(_) => Err(StoreError::Logic("index is open read-only")),
            },
        }
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.lookup(fp).is_some()
    }

    pub fn lookup(&self, fp: &Fingerprint) -> Option<u64> {
        let idx = select_bucket(fp, self.num_buckets);
        bucket_lookup(self.bucket_slice(idx), fp)
    }

    pub fn insert(&mut self, fp: &Fingerprint, offset: u64) -> Result<()> {
        if self.permission != Permission::ReadWrite {
            return Err(StoreError::Logic("cannot insert into a read-only index"));
        }
        let idx = select_bucket(fp, self.num_buckets);
        let slice = self.bucket_slice_mut(idx)?;
        bucket_insert(slice, fp, offset, idx)
    }

    /// Persists the index (`msync`/`munmap` for mmap mode, a full rewrite
    /// for stdio mode — skipped if never dirtied) and consumes the handle.
    pub fn close(mut self) -> Result<()> {
        match &mut self.backend {
            Backend::Mmap { mmap } => {
                if let MmapHandle::ReadWrite(m) = mmap {
                    m.flush().map_err(|e| StoreError::io(&self.path, e))?;
                }
            }
            Backend::Stdio { buckets, dirty } => {
                if *dirty {
                    let header = IndexHeader {
                        num_buckets: self.num_buckets,
                        version: FORMAT_VERSION,
                    };
                    self.file
                        .seek(SeekFrom::Start(0))
                        .map_err(|e| StoreError::io(&self.path, e))?;
                    ioutil::write_all(&self.path, &mut self.file, &header.encode())?;
                    ioutil::write_all(&self.path, &mut self.file, buckets)?;
                    ioutil::flush(&self.path, &mut self.file)?;
                }
            }
        }
        Ok(())
    }
}

fn probe_existing(path: &Path) -> Option<IndexHeader> {
    let mut file = File::open(path).ok()?;
    let len = file.metadata().ok()?.len();
    if len < HEADER_SIZE as u64 {
        return None;
    }
    let mut buf = [0u8; HEADER_SIZE];
    file.read_exact(&mut buf).ok()?;
    let header = IndexHeader::decode(&buf).ok()?;
    let expected_len = HEADER_SIZE as u64 + header.num_buckets * BUCKET_SIZE as u64;
    if len != expected_len {
        return None;
    }
    Some(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TINY_NUM_BUCKETS: u64 = 16;

    #[test]
    fn open_missing_without_create_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index");
        assert!(Index::open(&path, Permission::ReadWrite, IndexFlags::NONE, None).is_err());
        assert!(Index::open(&path, Permission::Read, IndexFlags::NONE, None).is_err());
    }

    #[test]
    fn create_requires_read_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index");
        assert!(Index::open(&path, Permission::Read, IndexFlags::CREATE, Some(TINY_NUM_BUCKETS)).is_err());
    }

    #[test]
    fn insert_lookup_persists_across_stdio_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index");
        let fp = Fingerprint::of(b"hello");

        let mut idx = Index::open(&path, Permission::ReadWrite, IndexFlags::CREATE, Some(TINY_NUM_BUCKETS)).unwrap();
        idx.insert(&fp, 1234).unwrap();
        idx.close().unwrap();

        let idx = Index::open(&path, Permission::Read, IndexFlags::NONE, None).unwrap();
        assert_eq!(idx.lookup(&fp), Some(1234));
    }

    #[test]
    fn insert_lookup_persists_across_mmap_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index");
        let fp = Fingerprint::of(b"world");

        let mut idx = Index::open(
            &path,
            Permission::ReadWrite,
            IndexFlags::CREATE.with_mmap(true),
            Some(TINY_NUM_BUCKETS),
        )
        .unwrap();
        idx.insert(&fp, 5678).unwrap();
        idx.close().unwrap();

        let idx = Index::open(&path, Permission::Read, IndexFlags::MMAP, None).unwrap();
        assert_eq!(idx.lookup(&fp), Some(5678));
    }

    #[test]
    fn zero_length_existing_file_rejected_unless_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index");
        File::create(&path).unwrap();

        assert!(Index::open(&path, Permission::Read, IndexFlags::NONE, None).is_err());
        assert!(Index::open(&path, Permission::ReadWrite, IndexFlags::NONE, None).is_err());
        assert!(Index::open(&path, Permission::ReadWrite, IndexFlags::CREATE, Some(TINY_NUM_BUCKETS)).is_ok());
    }

    #[test]
    fn bucket_overflow_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index");
        // A 1-bucket index: every fingerprint collides, so the 103rd insert
        // must fail.
        let mut idx = Index::open(&path, Permission::ReadWrite, IndexFlags::CREATE, Some(1)).unwrap();
        for i in 0..ENTRIES_PER_BUCKET {
            let fp = Fingerprint::of(&(i as u64).to_be_bytes());
            idx.insert(&fp, i as u64).unwrap();
        }
        let overflow_fp = Fingerprint::of(&(9999u64).to_be_bytes());
        assert!(idx.insert(&overflow_fp, 9999).is_err());
    }
}
