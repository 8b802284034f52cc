//! Append-only arena file: a sequence of fixed-size, self-verifying blocks
//! partitioned into zero-padded hunks.
//!
//! Grounded on `examples/original_source/dust-internal.c`'s
//! `add_block_to_arena`/`dust_setup`/`dust_check`, carried over in spirit:
//! hunk padding, the open-time fast sanity check bounded to the last hunk,
//! and the full scan used by `check`/`rebuild_index`.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::block::{Block, BlockHeader, BlockType, DATA_BLOCK_SIZE, HEADER_SIZE, SLOT_SIZE};
use crate::error::{CheckReport, Result, StoreError};
use crate::fingerprint::Fingerprint;
use crate::ioutil;
use crate::perm::{ArenaFlags, Permission};

/// Arena segment size. Every byte offset that is a multiple of this value is
/// either end-of-file or the start of a block.
pub const HUNK_SIZE: u64 = 100_000_000;

pub struct Arena {
    path: PathBuf,
    file: File,
    permission: Permission,
}

impl Arena {
    pub fn open(path: impl AsRef<Path>, permission: Permission, flags: ArenaFlags) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if flags.create && permission == Permission::Read {
            return Err(StoreError::Open {
                path,
                permission: permission.as_str(),
                reason: "CREATE requires read-write permission",
            });
        }

        let mut options = OpenOptions::new();
        options.read(true);
        if permission == Permission::ReadWrite {
            options.write(true);
        }
        if flags.create {
            options.create(true);
        }

        let file = options.open(&path).map_err(|_| StoreError::Open {
            path: path.clone(),
            permission: permission.as_str(),
            reason: "target file missing when not creating, or parent directory missing",
        })?;

        let mut arena = Arena {
            path,
            file,
            permission,
        };
        arena.fast_sanity_check()?;
        Ok(arena)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every write already flushes; closing just consumes the handle so
    /// callers get the same open/close lifecycle shape as [`crate::index::Index`].
    pub fn close(self) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| StoreError::io(&self.path, e))
    }

    /// Seeks to the start of the current in-progress hunk and walks blocks
    /// forward to end-of-file, verifying each block's fingerprint against
    /// its payload. Bounds recovery work on open to the last hunk.
    fn fast_sanity_check(&mut self) -> Result<()> {
        let file_len = self.len()?;
        let hunk_start = (file_len / HUNK_SIZE) * HUNK_SIZE;
        let mut offset = hunk_start;

        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| StoreError::io(&self.path, e))?;

        while offset < file_len {
            let mut header_buf = [0u8; HEADER_SIZE];
            ioutil::read_exact(&self.path, &mut self.file, &mut header_buf)?;

            if BlockHeader::is_all_zero_bytes(&header_buf) {
                return Err(StoreError::PrematureHunkEnd {
                    offset,
                    remaining: file_len - offset,
                });
            }

            let header = BlockHeader::decode(&header_buf)?;
            let mut payload = vec![0u8; header.size as usize];
            ioutil::read_exact(&self.path, &mut self.file, &mut payload)?;
            verify_fingerprint(&header.fingerprint, &payload, offset)?;

            let skip = DATA_BLOCK_SIZE - header.size as usize;
            if skip > 0 {
                self.file
                    .seek(SeekFrom::Current(skip as i64))
                    .map_err(|e| StoreError::io(&self.path, e))?;
            }
            offset += SLOT_SIZE as u64;
        }

        if offset != file_len {
            return Err(StoreError::ShortRead {
                path: self.path.clone(),
                expected: SLOT_SIZE,
                got: (file_len - (offset - SLOT_SIZE as u64)) as usize,
            });
        }

        debug!(arena = %self.path.display(), hunk_start, "fast sanity check passed");
        Ok(())
    }

    /// Appends `block`, respecting hunk discipline, and returns the byte
    /// offset of its header. Flushes after writing.
    pub fn append(&mut self, block: &Block) -> Result<u64> {
        if self.permission != Permission::ReadWrite {
            return Err(StoreError::Logic("cannot append to a read-only arena"));
        }

        let mut cur = self
            .file
            .seek(SeekFrom::End(0))
            .map_err(|e| StoreError::io(&self.path, e))?;

        let within_hunk = cur % HUNK_SIZE;
        if within_hunk + SLOT_SIZE as u64 > HUNK_SIZE {
            let pad = HUNK_SIZE - within_hunk;
            let zeros = vec![0u8; pad as usize];
            ioutil::write_all(&self.path, &mut self.file, &zeros)?;
            cur += pad;
        }

        let offset = cur;
        let slot = block.encode_slot();
        ioutil::write_all(&self.path, &mut self.file, &slot)?;
        ioutil::flush(&self.path, &mut self.file)?;
        Ok(offset)
    }

    pub fn read_at(&mut self, offset: u64) -> Result<Block> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| StoreError::io(&self.path, e))?;

        let mut header_buf = [0u8; HEADER_SIZE];
        ioutil::read_exact(&self.path, &mut self.file, &mut header_buf)?;
        let header = BlockHeader::decode(&header_buf)?;

        let mut data = vec![0u8; header.size as usize];
        ioutil::read_exact(&self.path, &mut self.file, &mut data)?;

        Ok(Block {
            header,
            data,
        })
    }

    /// Walks every block in the arena in order, invoking `visit` with the
    /// block and its offset. Stops at the first error, including one
    /// surfaced by `visit` itself. Nonzero hunk-trailer bytes are tolerated
    /// here — callers that need that invariant enforced use [`Arena::check`].
    pub fn for_each_block(&mut self, mut visit: impl FnMut(&Block, u64) -> Result<()>) -> Result<()> {
        let file_len = self.len()?;
        let mut offset = 0u64;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| StoreError::io(&self.path, e))?;

        while offset < file_len {
            let within_hunk = offset % HUNK_SIZE;
            let mut header_buf = [0u8; HEADER_SIZE];
            ioutil::read_exact(&self.path, &mut self.file, &mut header_buf)?;

            if BlockHeader::is_all_zero_bytes(&header_buf) {
                let remaining_in_hunk = HUNK_SIZE - within_hunk;
                if remaining_in_hunk < SLOT_SIZE as u64 {
                    self.file
                        .seek(SeekFrom::Current((remaining_in_hunk - HEADER_SIZE as u64) as i64))
                        .map_err(|e| StoreError::io(&self.path, e))?;
                    offset += remaining_in_hunk;
                    continue;
                } else {
                    return Err(StoreError::PrematureHunkEnd {
                        offset,
                        remaining: remaining_in_hunk,
                    });
                }
            }

            let header = BlockHeader::decode(&header_buf)?;
            let mut data = vec![0u8; header.size as usize];
            ioutil::read_exact(&self.path, &mut self.file, &mut data)?;
            let skip = DATA_BLOCK_SIZE - header.size as usize;
            if skip > 0 {
                self.file
                    .seek(SeekFrom::Current(skip as i64))
                    .map_err(|e| StoreError::io(&self.path, e))?;
            }

            let block = Block { header, data };
            visit(&block, offset)?;
            offset += SLOT_SIZE as u64;
        }

        Ok(())
    }

    /// Full integrity scan: recomputes the SHA-256 of every block's payload
    /// and compares it to the declared fingerprint, and verifies every hunk
    /// trailer is all-zero. Unlike every other arena operation, problems are
    /// collected rather than aborting the scan.
    pub fn check(&mut self) -> Result<CheckReport> {
        let mut report = CheckReport::default();
        let file_len = self.len()?;
        let mut offset = 0u64;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| StoreError::io(&self.path, e))?;

        while offset < file_len {
            let within_hunk = offset % HUNK_SIZE;
            let mut header_buf = [0u8; HEADER_SIZE];
            ioutil::read_exact(&self.path, &mut self.file, &mut header_buf)?;

            if BlockHeader::is_all_zero_bytes(&header_buf) {
                let remaining_in_hunk = HUNK_SIZE - within_hunk;
                if remaining_in_hunk < SLOT_SIZE as u64 {
                    let trailer_len = remaining_in_hunk - HEADER_SIZE as u64;
                    let mut trailer = vec![0u8; trailer_len as usize];
                    ioutil::read_exact(&self.path, &mut self.file, &mut trailer)?;
                    if trailer.iter().any(|&b| b != 0) {
                        warn!(offset, "nonzero byte in hunk trailer");
                        report.push(StoreError::NonzeroHunkTrailer { offset });
                    }
                    offset += remaining_in_hunk;
                    continue;
                } else {
                    report.push(StoreError::PrematureHunkEnd {
                        offset,
                        remaining: remaining_in_hunk,
                    });
                    break;
                }
            }

            let header = match BlockHeader::decode(&header_buf) {
                Ok(h) => h,
                Err(e) => {
                    report.push(e);
                    break;
                }
            };
            let mut data = vec![0u8; header.size as usize];
            ioutil::read_exact(&self.path, &mut self.file, &mut data)?;
            let skip = DATA_BLOCK_SIZE - header.size as usize;
            if skip > 0 {
                self.file
                    .seek(SeekFrom::Current(skip as i64))
                    .map_err(|e| StoreError::io(&self.path, e))?;
            }

            if let Err(e) = verify_fingerprint(&header.fingerprint, &data, offset) {
                report.push(e);
            }
            report.blocks_scanned += 1;
            offset += SLOT_SIZE as u64;
        }

        Ok(report)
    }
}

fn verify_fingerprint(expected: &Fingerprint, payload: &[u8], offset: u64) -> Result<()> {
    let actual = Fingerprint::of(payload);
    if actual != *expected {
        return Err(StoreError::FingerprintMismatch {
            expected: expected.to_hex(),
            actual: actual.to_hex(),
            offset,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn put_block(arena: &mut Arena, data: &[u8]) -> (Fingerprint, u64) {
        let fp = Fingerprint::of(data);
        let block = Block::new(fp, BlockType::FileData, data.to_vec(), 0);
        let off = arena.append(&block).unwrap();
        (fp, off)
    }

    #[test]
    fn open_missing_readonly_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("arena");
        assert!(Arena::open(&path, Permission::Read, ArenaFlags::NONE).is_err());
    }

    #[test]
    fn create_requires_read_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("arena");
        assert!(Arena::open(&path, Permission::Read, ArenaFlags::CREATE).is_err());
    }

    #[test]
    fn create_then_reopen_read_write_succeeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("arena");
        {
            let arena = Arena::open(&path, Permission::ReadWrite, ArenaFlags::CREATE).unwrap();
            drop(arena);
        }
        assert!(Arena::open(&path, Permission::ReadWrite, ArenaFlags::NONE).is_ok());
        assert!(Arena::open(&path, Permission::Read, ArenaFlags::NONE).is_ok());
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("arena");
        let mut arena = Arena::open(&path, Permission::ReadWrite, ArenaFlags::CREATE).unwrap();
        let (fp, off) = put_block(&mut arena, b"hello");
        let block = arena.read_at(off).unwrap();
        assert_eq!(block.fingerprint(), fp);
        assert_eq!(block.data(), b"hello");
    }

    #[test]
    fn check_passes_on_untouched_arena() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("arena");
        let mut arena = Arena::open(&path, Permission::ReadWrite, ArenaFlags::CREATE).unwrap();
        put_block(&mut arena, b"one");
        put_block(&mut arena, b"two");
        let report = arena.check().unwrap();
        assert!(report.is_ok());
        assert_eq!(report.blocks_scanned, 2);
    }
}
