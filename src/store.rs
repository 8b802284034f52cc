//! The block store façade: `put`, `get`, `check`, `rebuild_index`, and the
//! open/close lifecycle that ties an [`Arena`] and an [`Index`] together.
//!
//! Grounded on `examples/original_source/dust-internal.c`'s `dust_put`/
//! `dust_get`/`dust_check`/`dust_setup`/`dust_teardown`, and on the
//! teacher's `Archive::open`/`PackOptions` constructor-argument style for
//! the façade shape.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, info};

use crate::arena::Arena;
use crate::block::{Block, BlockType, DATA_BLOCK_SIZE};
use crate::config::StoreConfig;
use crate::error::{CheckReport, Result, StoreError};
use crate::fingerprint::Fingerprint;
use crate::index::Index;
use crate::perm::{ArenaFlags, IndexFlags, Permission};

pub struct Store {
    config: StoreConfig,
    arena: Arena,
    index: Index,
}

impl Store {
    /// Opens (or creates, if `create` is set) both the arena and the index
    /// named in `config`, for the given permission.
    pub fn open(config: StoreConfig, permission: Permission, create: bool) -> Result<Self> {
        let arena_flags = if create { ArenaFlags::CREATE } else { ArenaFlags::NONE };
        let index_flags = if create { IndexFlags::CREATE } else { IndexFlags::NONE };

        let arena = Arena::open(config.arena_path(), permission, arena_flags)?;
        let index = Index::open(config.index_path(), permission, index_flags, None)?;

        info!(
            arena = %config.arena_path().display(),
            index = %config.index_path().display(),
            "store opened",
        );

        Ok(Store { config, arena, index })
    }

    /// Opens the index with the mmap backend rather than stdio, everything
    /// else identical to [`Store::open`].
    pub fn open_mmap(config: StoreConfig, permission: Permission, create: bool) -> Result<Self> {
        let arena_flags = if create { ArenaFlags::CREATE } else { ArenaFlags::NONE };
        let index_flags = if create {
            IndexFlags::CREATE.with_mmap(true)
        } else {
            IndexFlags::MMAP
        };

        let arena = Arena::open(config.arena_path(), permission, arena_flags)?;
        let index = Index::open(config.index_path(), permission, index_flags, None)?;

        Ok(Store { config, arena, index })
    }

    pub fn close(self) -> Result<()> {
        self.arena.close()?;
        self.index.close()
    }

    fn wtime(&self) -> u64 {
        self.config
            .fake_timestamp
            .unwrap_or_else(|| Utc::now().timestamp().max(0) as u64)
    }

    /// `put(data, type) -> fingerprint`. Idempotent: if the index already
    /// maps this fingerprint, the arena is never touched.
    pub fn put(&mut self, data: &[u8], block_type: BlockType) -> Result<Fingerprint> {
        if data.len() > DATA_BLOCK_SIZE {
            return Err(StoreError::Logic("payload exceeds a single block's capacity"));
        }

        let fingerprint = Fingerprint::of(data);
        if self.index.contains(&fingerprint) {
            return Ok(fingerprint);
        }

        let block = Block::new(fingerprint, block_type, data.to_vec(), self.wtime());
        let offset = self.arena.append(&block)?;
        self.index.insert(&fingerprint, offset)?;
        debug!(fingerprint = %fingerprint, offset, "put");
        Ok(fingerprint)
    }

    /// `get(fingerprint) -> block`, fatal on any mismatch between the
    /// requested fingerprint, the on-disk header's fingerprint, and the
    /// recomputed SHA-256 of the payload — double verification, per spec.
    pub fn get(&mut self, fingerprint: &Fingerprint) -> Result<Block> {
        let offset = self.index.lookup(fingerprint).ok_or_else(|| StoreError::FingerprintNotFound {
            fingerprint: fingerprint.to_hex(),
        })?;

        let block = self.arena.read_at(offset)?;
        if block.fingerprint() != *fingerprint {
            return Err(StoreError::FingerprintMismatch {
                expected: fingerprint.to_hex(),
                actual: block.fingerprint().to_hex(),
                offset,
            });
        }

        let recomputed = Fingerprint::of(block.data());
        if recomputed != *fingerprint {
            return Err(StoreError::FingerprintMismatch {
                expected: fingerprint.to_hex(),
                actual: recomputed.to_hex(),
                offset,
            });
        }

        Ok(block)
    }

    /// Full-arena integrity scan. Does not require the index.
    pub fn check(&mut self) -> Result<CheckReport> {
        self.arena.check()
    }

    pub fn arena_path(&self) -> &Path {
        self.config.arena_path()
    }

    pub fn index_path(&self) -> &Path {
        self.config.index_path()
    }
}

/// Reconstructs an index from the arena alone.
///
/// `configured_index` is whatever index path is currently in effect (e.g.
/// `STORE_INDEX`, via [`StoreConfig::configured_index_env`]) — the caller
/// guarantees `new_index_path` differs from it. An unset configured index is
/// represented as `None` and can never collide with an explicit path.
pub fn rebuild_index(
    arena_path: &Path,
    new_index_path: &Path,
    configured_index: Option<&Path>,
    num_buckets: Option<u64>,
) -> Result<()> {
    if configured_index == Some(new_index_path) {
        return Err(StoreError::RebuildTargetCollision {
            path: new_index_path.to_path_buf(),
        });
    }

    let mut arena = Arena::open(arena_path, Permission::Read, ArenaFlags::NONE)?;
    let mut new_index = Index::open(new_index_path, Permission::ReadWrite, IndexFlags::CREATE, num_buckets)?;

    let mut count = 0u64;
    arena.for_each_block(|block, offset| {
        new_index.insert(&block.fingerprint(), offset)?;
        count += 1;
        Ok(())
    })?;

    info!(blocks = count, index = %new_index_path.display(), "index rebuilt");
    new_index.close()?;
    arena.close()
}
