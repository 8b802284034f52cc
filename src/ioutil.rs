//! Safe I/O wrappers: read/write-exact primitives whose failure is fatal.
//!
//! `std::io::Read::read_exact`/`Write::write_all` already fail on a short
//! read/write rather than silently returning a partial count, so there is no
//! C-style `dfread`/`dfwrite` loop to port. What this module adds is the
//! `Path`-carrying `StoreError` conversion the rest of the crate expects,
//! so every I/O failure reports which file it happened on.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{Result, StoreError};

pub fn read_exact(path: &Path, file: &mut File, buf: &mut [u8]) -> Result<()> {
    file.read_exact(buf)
        .map_err(|e| StoreError::io(path, e))
}

pub fn write_all(path: &Path, file: &mut File, buf: &[u8]) -> Result<()> {
    file.write_all(buf).map_err(|e| StoreError::io(path, e))
}

pub fn flush(path: &Path, file: &mut File) -> Result<()> {
    file.flush().map_err(|e| StoreError::io(path, e))
}

/// Reads up to `buf.len()` bytes, returning how many were actually read.
/// Unlike `read_exact`, fewer than `buf.len()` bytes is not an error — this
/// is for the splitter's chunked reads, where the final chunk of a stream is
/// legitimately short.
pub fn read_up_to(path: &Path, file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StoreError::io(path, e)),
        }
    }
    Ok(total)
}
