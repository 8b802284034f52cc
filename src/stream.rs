//! Stream splitter / reassembler: chunks arbitrary byte streams into
//! ≤65,536-byte blocks, wrapping a recursive FINGERPRINTS block when more
//! than one chunk is needed.
//!
//! Grounded directly on `examples/original_source/dust-archive.c`'s
//! `add_file()` and `dust-extract.c`'s `extract_file()` — the only places
//! in the original that implement the recursive split/wrap and
//! left-to-right pre-order reassembly.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::block::{BlockType, DATA_BLOCK_SIZE};
use crate::error::{Result, StoreError};
use crate::fingerprint::{Fingerprint, RunningHash, FINGERPRINT_SIZE};
use crate::store::Store;

fn fill_buffer<R: Read>(src: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match src.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StoreError::io(Path::new("<stream>"), e)),
        }
    }
    Ok(total)
}

/// Splits `src` into data blocks, optionally accumulating an end-to-end
/// SHA-256 over the original bytes in `hash`. Returns the fingerprint of
/// the single block if `src` fit in one chunk; otherwise the fingerprint of
/// the (possibly multiply-wrapped) FINGERPRINTS block covering the rest.
pub fn add_stream<R: Read>(
    store: &mut Store,
    src: &mut R,
    block_type: BlockType,
    mut hash: Option<&mut RunningHash>,
) -> Result<Fingerprint> {
    let mut chunk = vec![0u8; DATA_BLOCK_SIZE];
    let mut listing = tempfile::tempfile().map_err(|e| StoreError::io(Path::new("<fingerprint listing>"), e))?;
    let mut chunk_count: u64 = 0;
    let mut n = fill_buffer(src, &mut chunk)?;

    loop {
        if let Some(h) = hash.as_deref_mut() {
            h.update(&chunk[..n]);
        }

        let fp = store.put(&chunk[..n], block_type)?;

        // A short read already proves end-of-stream. A full-capacity read
        // does not: the only way to know whether it was the last chunk is
        // to try reading the next one before deciding whether to wrap.
        let full = n == DATA_BLOCK_SIZE;
        let next_n = if full { fill_buffer(src, &mut chunk)? } else { 0 };
        let eof = !full || next_n == 0;

        if eof && chunk_count == 0 {
            return Ok(fp);
        }

        listing
            .write_all(fp.as_bytes())
            .map_err(|e| StoreError::io(Path::new("<fingerprint listing>"), e))?;
        chunk_count += 1;

        if eof {
            break;
        }
        n = next_n;
    }

    listing
        .seek(SeekFrom::Start(0))
        .map_err(|e| StoreError::io(Path::new("<fingerprint listing>"), e))?;
    add_stream(store, &mut listing, BlockType::Fingerprints, None)
}

/// Reassembles the stream rooted at `fp` in left-to-right pre-order,
/// feeding bytes to `sink` and/or `hash` as they're recovered. Recursion
/// depth is bounded by `log_2048(|data|)`.
pub fn extract_stream<W: Write>(
    store: &mut Store,
    fp: Fingerprint,
    mut sink: Option<&mut W>,
    mut hash: Option<&mut RunningHash>,
) -> Result<()> {
    let block = store.get(&fp)?;

    match block.block_type() {
        BlockType::FileData => {
            if let Some(h) = hash.as_deref_mut() {
                h.update(block.data());
            }
            if let Some(s) = sink.as_deref_mut() {
                s.write_all(block.data()).map_err(|e| StoreError::io(Path::new("<extract sink>"), e))?;
            }
            Ok(())
        }
        BlockType::Fingerprints => {
            let data = block.data();
            if data.is_empty() || data.len() % FINGERPRINT_SIZE != 0 {
                return Err(StoreError::MalformedFingerprintList { size: data.len() as u32 });
            }
            for raw in data.chunks_exact(FINGERPRINT_SIZE) {
                let mut bytes = [0u8; FINGERPRINT_SIZE];
                bytes.copy_from_slice(raw);
                let child = Fingerprint::from_bytes(bytes);
                extract_stream(store, child, sink.as_deref_mut(), hash.as_deref_mut())?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::perm::Permission;
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
    fn single_chunk_round_trips_without_wrapper() {
        let dir = tempdir().unwrap();
        let mut store = new_store(dir.path());
        let data = vec![0x41u8; 65536];

        let fp = add_stream(&mut store, &mut &data[..], BlockType::FileData, None).unwrap();
        let block = store.get(&fp).unwrap();
        assert_eq!(block.block_type(), BlockType::FileData);

        let mut out = Vec::new();
        extract_stream(&mut store, fp, Some(&mut out), None).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn straddling_stream_wraps_in_fingerprints_block() {
        let dir = tempdir().unwrap();
        let mut store = new_store(dir.path());
        let data = vec![0x42u8; 65537];

        let fp = add_stream(&mut store, &mut &data[..], BlockType::FileData, None).unwrap();
        let root = store.get(&fp).unwrap();
        assert_eq!(root.block_type(), BlockType::Fingerprints);
        assert_eq!(root.data().len(), FINGERPRINT_SIZE * 2);

        let mut out = Vec::new();
        extract_stream(&mut store, fp, Some(&mut out), None).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn exact_multiple_of_block_size_wraps_with_no_trailing_empty_leaf() {
        let dir = tempdir().unwrap();
        let mut store = new_store(dir.path());
        let data = vec![0x43u8; 65536 * 2];

        let fp = add_stream(&mut store, &mut &data[..], BlockType::FileData, None).unwrap();
        let root = store.get(&fp).unwrap();
        assert_eq!(root.block_type(), BlockType::Fingerprints);
        assert_eq!(root.data().len(), FINGERPRINT_SIZE * 2);

        let mut out = Vec::new();
        extract_stream(&mut store, fp, Some(&mut out), None).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn empty_stream_is_a_single_zero_length_filedata_block() {
        let dir = tempdir().unwrap();
        let mut store = new_store(dir.path());
        let fp = add_stream(&mut store, &mut &b""[..], BlockType::FileData, None).unwrap();
        let block = store.get(&fp).unwrap();
        assert_eq!(block.block_type(), BlockType::FileData);
        assert_eq!(block.data(), b"");
    }

    #[test]
    fn end_to_end_hash_covers_only_original_bytes() {
        let dir = tempdir().unwrap();
        let mut store = new_store(dir.path());
        let data = b"hash me end to end";
        let mut hash = RunningHash::new();
        let fp = add_stream(&mut store, &mut &data[..], BlockType::FileData, Some(&mut hash)).unwrap();
        let digest = hash.finish();
        assert_eq!(digest, Fingerprint::of(data).as_bytes().clone());
        let _ = fp;
    }
}
