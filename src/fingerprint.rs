//! 32-byte content fingerprints (SHA-256 of a block's payload).

use std::fmt;

use sha2::{Digest, Sha256};

pub const FINGERPRINT_SIZE: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub [u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut bytes = [0u8; FINGERPRINT_SIZE];
        bytes.copy_from_slice(&digest);
        Fingerprint(bytes)
    }

    pub fn from_bytes(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Fingerprint(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// Accumulates a running SHA-256 over bytes fed to it incrementally, used
/// for the per-file end-to-end hash stored alongside a listing record.
pub struct RunningHash(Sha256);

impl RunningHash {
    pub fn new() -> Self {
        RunningHash(Sha256::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finish(self) -> [u8; FINGERPRINT_SIZE] {
        let digest = self.0.finalize();
        let mut bytes = [0u8; FINGERPRINT_SIZE];
        bytes.copy_from_slice(&digest);
        bytes
    }
}

impl Default for RunningHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fingerprint_matches_known_sha256() {
        let fp = Fingerprint::of(&[]);
        assert_eq!(
            fp.to_hex(),
            "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855"
        );
    }

    #[test]
    fn determinism() {
        let a = Fingerprint::of(b"hello world");
        let b = Fingerprint::of(b"hello world");
        assert_eq!(a, b);
    }
}
