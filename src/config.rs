//! Explicit, environment-driven configuration.
//!
//! Replaces the original's process-global `getenv` calls scattered through
//! `dust-archive.c`/`dust-extract.c`/etc. with a single value assembled once
//! at process entry and threaded through every call that needs it.

use std::path::{Path, PathBuf};

pub const DEFAULT_INDEX_PATH: &str = "index";
pub const DEFAULT_ARENA_PATH: &str = "arena";

pub const ENV_INDEX: &str = "STORE_INDEX";
pub const ENV_ARENA: &str = "STORE_ARENA";
pub const ENV_FAKE_TIMESTAMP: &str = "STORE_FAKE_TIMESTAMP";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub index_path: PathBuf,
    pub arena_path: PathBuf,
    /// `Some(seconds)` overrides `wtime` on every `put`, for reproducible
    /// tests. `None` means "use the wall clock."
    pub fake_timestamp: Option<u64>,
    pub verbosity: u8,
}

impl StoreConfig {
    /// Builds a configuration from the environment, the way every original
    /// subcommand's `main` did: `STORE_INDEX`/`STORE_ARENA` default to
    /// `"index"`/`"arena"` when unset or empty, `STORE_FAKE_TIMESTAMP` is
    /// absent unless set and parses as a decimal integer.
    pub fn from_env() -> Self {
        StoreConfig {
            index_path: env_path_or(ENV_INDEX, DEFAULT_INDEX_PATH),
            arena_path: env_path_or(ENV_ARENA, DEFAULT_ARENA_PATH),
            fake_timestamp: std::env::var(ENV_FAKE_TIMESTAMP)
                .ok()
                .and_then(|s| s.parse().ok()),
            verbosity: 0,
        }
    }

    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// The raw, possibly-unset `STORE_INDEX` value, kept distinct from every
    /// explicit path so that a rebuild target can never accidentally
    /// collide with "unset."
    pub fn configured_index_env(&self) -> Option<String> {
        std::env::var(ENV_INDEX).ok().filter(|s| !s.is_empty())
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn arena_path(&self) -> &Path {
        &self.arena_path
    }
}

fn env_path_or(var: &str, default: &str) -> PathBuf {
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => PathBuf::from(v),
        _ => PathBuf::from(default),
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            arena_path: PathBuf::from(DEFAULT_ARENA_PATH),
            fake_timestamp: None,
            verbosity: 0,
        }
    }
}
