//! # storekeep — content-addressed, deduplicating archival store
//!
//! Format guarantees:
//! - All numeric fields are big-endian; never negotiated
//! - Block identity is the SHA-256 of its payload; the arena never stores
//!   two blocks with the same fingerprint twice
//! - The arena is append-only: hunks are padded, never backfilled
//! - The index is a pure lookup accelerator; it can always be rebuilt from
//!   the arena alone via [`store::rebuild_index`]
//! - Archive handles are just `magic | root fingerprint`; everything else
//!   lives in the content-addressed store

pub mod archive;
pub mod arena;
pub mod block;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod ioutil;
pub mod listing;
pub mod perm;
pub mod store;
pub mod stream;
pub mod wire;

pub use arena::Arena;
pub use block::{Block, BlockHeader, BlockType, DATA_BLOCK_SIZE};
pub use config::StoreConfig;
pub use error::{CheckReport, Result, StoreError};
pub use fingerprint::{Fingerprint, RunningHash};
pub use index::Index;
pub use perm::{ArenaFlags, IndexFlags, Permission};
pub use store::{rebuild_index, Store};
