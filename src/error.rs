//! Error taxonomy for the block store and everything built on top of it.
//!
//! Every fallible operation in this crate returns [`StoreError`]. Per the
//! failure model, a `StoreError` returned from `put`/`get`/`arena` or `index`
//! operations is understood to be fatal to the calling process — `main`
//! is the only place that turns one into an exit code. `check` is the one
//! exception: it aggregates failures into a `CheckReport` rather than
//! propagating the first one.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot open '{path}' for {permission}: {reason}")]
    Open {
        path: PathBuf,
        permission: &'static str,
        reason: &'static str,
    },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("short read on '{path}': expected {expected} bytes, got {got}")]
    ShortRead {
        path: PathBuf,
        expected: usize,
        got: usize,
    },

    #[error("bad magic in {what}: expected {expected:#010x}, got {got:#010x}")]
    BadMagic {
        what: &'static str,
        expected: u32,
        got: u32,
    },

    #[error("unsupported {what} version: {version}")]
    UnsupportedVersion { what: &'static str, version: u64 },

    #[error("fingerprint-list block payload size {size} is not a nonzero multiple of 32")]
    MalformedFingerprintList { size: u32 },

    #[error("unknown record type {record_type} in listing")]
    UnknownRecordType { record_type: u32 },

    #[error("unknown block type {block_type} for fingerprint {fingerprint}")]
    UnknownBlockType { block_type: u32, fingerprint: String },

    #[error("fingerprint mismatch: expected {expected}, block at offset {offset} hashes to {actual}")]
    FingerprintMismatch {
        expected: String,
        actual: String,
        offset: u64,
    },

    #[error("end-to-end hash mismatch for '{path}': archive is probably corrupt")]
    EndToEndHashMismatch { path: String },

    #[error("nonzero byte at offset {offset} in hunk trailer")]
    NonzeroHunkTrailer { offset: u64 },

    #[error("zero block header encountered too early at offset {offset}, {remaining} bytes remained in hunk")]
    PrematureHunkEnd { offset: u64, remaining: u64 },

    #[error("index bucket {bucket} is full ({capacity} entries); rebuild with more buckets")]
    BucketOverflow { bucket: u64, capacity: usize },

    #[error("fingerprint not found in index: {fingerprint}")]
    FingerprintNotFound { fingerprint: String },

    #[error("rebuild target '{path}' must differ from the currently configured index path")]
    RebuildTargetCollision { path: PathBuf },

    #[error("logic error: {0}")]
    Logic(&'static str),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Accumulated result of a full-arena [`crate::store::Store::check`] pass.
///
/// Unlike every other block-store operation, `check` does not abort on the
/// first problem it finds — it keeps scanning and collects everything.
#[derive(Debug, Default)]
pub struct CheckReport {
    pub blocks_scanned: u64,
    pub problems: Vec<StoreError>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn push(&mut self, err: StoreError) {
        self.problems.push(err);
    }
}
