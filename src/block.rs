//! The arena's unit of storage: a 48-byte header plus a 65,536-byte payload.

use std::convert::TryFrom;

use crate::error::{Result, StoreError};
use crate::fingerprint::{Fingerprint, FINGERPRINT_SIZE};
use crate::wire;

/// Payload capacity of a single block. Fixed — variable-sized blocks are a
/// non-goal.
pub const DATA_BLOCK_SIZE: usize = 65536;

/// `32B fingerprint | u32 type | u32 size | u64 wtime`, all big-endian.
pub const HEADER_SIZE: usize = FINGERPRINT_SIZE + 4 + 4 + 8;

/// One arena slot is always header + full payload capacity, so offsets are
/// predictable for sequential scans regardless of how much of the payload
/// is meaningful.
pub const SLOT_SIZE: usize = HEADER_SIZE + DATA_BLOCK_SIZE;

/// Up to 2,048 child fingerprints fit in one FINGERPRINTS block's payload.
pub const MAX_FINGERPRINTS_PER_BLOCK: usize = DATA_BLOCK_SIZE / FINGERPRINT_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    FileData = 0,
    Fingerprints = 1,
}

impl BlockType {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for BlockType {
    type Error = StoreError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(BlockType::FileData),
            1 => Ok(BlockType::Fingerprints),
            other => Err(StoreError::UnknownBlockType {
                block_type: other,
                fingerprint: String::new(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub fingerprint: Fingerprint,
    pub block_type: BlockType,
    pub size: u32,
    pub wtime: u64,
}

impl BlockHeader {
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..FINGERPRINT_SIZE].copy_from_slice(self.fingerprint.as_bytes());
        {
            let mut cursor = &mut buf[FINGERPRINT_SIZE..];
            wire::write_u32be(&mut cursor, self.block_type.as_u32()).expect("writing to a slice");
            wire::write_u32be(&mut cursor, self.size).expect("writing to a slice");
            wire::write_u64be(&mut cursor, self.wtime).expect("writing to a slice");
        }
        buf
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let mut fp_bytes = [0u8; FINGERPRINT_SIZE];
        fp_bytes.copy_from_slice(&buf[..FINGERPRINT_SIZE]);
        let fingerprint = Fingerprint::from_bytes(fp_bytes);

        let mut cursor = &buf[FINGERPRINT_SIZE..];
        let raw_type = wire::read_u32be(&mut cursor).expect("reading from a slice");
        let size = wire::read_u32be(&mut cursor).expect("reading from a slice");
        let wtime = wire::read_u64be(&mut cursor).expect("reading from a slice");

        let block_type = BlockType::try_from(raw_type).map_err(|_| StoreError::UnknownBlockType {
            block_type: raw_type,
            fingerprint: fingerprint.to_hex(),
        })?;

        Ok(BlockHeader {
            fingerprint,
            block_type,
            size,
            wtime,
        })
    }

    pub fn is_all_zero_bytes(buf: &[u8; HEADER_SIZE]) -> bool {
        buf.iter().all(|&b| b == 0)
    }
}

/// An owned, in-memory block: header plus exactly `size` meaningful payload
/// bytes (never the zero-padded 65,536-byte on-disk form).
#[derive(Debug, Clone)]
pub struct Block {
    pub header: BlockHeader,
    pub data: Vec<u8>,
}

impl Block {
    pub fn new(fingerprint: Fingerprint, block_type: BlockType, data: Vec<u8>, wtime: u64) -> Self {
        debug_assert!(data.len() <= DATA_BLOCK_SIZE);
        Block {
            header: BlockHeader {
                fingerprint,
                block_type,
                size: data.len() as u32,
                wtime,
            },
            data,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.header.fingerprint
    }

    pub fn block_type(&self) -> BlockType {
        self.header.block_type
    }

    pub fn size(&self) -> u32 {
        self.header.size
    }

    pub fn wtime(&self) -> u64 {
        self.header.wtime
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The full on-disk slot: header followed by the payload zero-padded out
    /// to [`DATA_BLOCK_SIZE`].
    pub fn encode_slot(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SLOT_SIZE);
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.data);
        buf.resize(SLOT_SIZE, 0);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let fingerprint = Fingerprint::of(b"payload");
        let header = BlockHeader {
            fingerprint,
            block_type: BlockType::FileData,
            size: 7,
            wtime: 1_700_000_000,
        };
        let encoded = header.encode();
        let decoded = BlockHeader::decode(&encoded).unwrap();
        assert_eq!(decoded.fingerprint, fingerprint);
        assert_eq!(decoded.block_type, BlockType::FileData);
        assert_eq!(decoded.size, 7);
        assert_eq!(decoded.wtime, 1_700_000_000);
    }

    #[test]
    fn zero_header_detected() {
        let buf = [0u8; HEADER_SIZE];
        assert!(BlockHeader::is_all_zero_bytes(&buf));
    }

    #[test]
    fn slot_is_fixed_size_and_zero_padded() {
        let block = Block::new(Fingerprint::of(b"x"), BlockType::FileData, b"x".to_vec(), 0);
        let slot = block.encode_slot();
        assert_eq!(slot.len(), SLOT_SIZE);
        assert!(slot[HEADER_SIZE + 1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn unknown_block_type_rejected() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[FINGERPRINT_SIZE + 3] = 9;
        assert!(BlockHeader::decode(&buf).is_err());
    }
}
