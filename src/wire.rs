//! Big-endian integer (de)serialization.
//!
//! The original C store used `htonl`/`ntohl` and a hand-rolled 64-bit
//! byte-swap for the same purpose. `byteorder`'s `BigEndian` type parameter
//! covers all three widths portably, so this module is a thin set of named
//! wrappers rather than a reimplementation.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

pub fn read_u32be<R: Read>(r: &mut R) -> io::Result<u32> {
    r.read_u32::<BigEndian>()
}

pub fn read_u64be<R: Read>(r: &mut R) -> io::Result<u64> {
    r.read_u64::<BigEndian>()
}

pub fn write_u32be<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_u32::<BigEndian>(v)
}

pub fn write_u64be<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_u64::<BigEndian>(v)
}
