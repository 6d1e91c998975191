//! # Block Index Records
//!
//! Each compressed key block is described by one packed [`BlockIndex`]
//! record in the table at the front of the key-list range. The record is
//! exactly 16 bytes, little-endian, with no padding, and is read and
//! written directly against page memory through zerocopy.
//!
//! ## Record Layout
//!
//! ```text
//! Offset  Size  Field        Meaning
//! ------  ----  -----------  ---------------------------------------------
//! 0       2     offset       payload offset, relative to the payload region
//! 2       2     block_size   bytes reserved for the payload
//! 4       2     used_size    bytes actually used (<= block_size)
//! 6       2     key_count    1 + number of delta-coded keys in the payload
//! 8       4     value        first key of the block (not in the payload)
//! 12      4     highest      cached largest key of the block
//! ```
//!
//! The first key lives in the record itself, so a block with `key_count == 1`
//! has an empty payload (`used_size == 0`) and `highest == value`.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Size of one packed index record.
pub const BLOCK_INDEX_SIZE: usize = 16;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BlockIndex {
    offset: U16,
    block_size: U16,
    used_size: U16,
    key_count: U16,
    value: U32,
    highest: U32,
}

const _: () = assert!(std::mem::size_of::<BlockIndex>() == BLOCK_INDEX_SIZE);

impl BlockIndex {
    /// Creates a zeroed record describing an empty block at `offset` with
    /// `block_size` reserved payload bytes.
    pub fn new(offset: u16, block_size: u16) -> Self {
        Self {
            offset: U16::new(offset),
            block_size: U16::new(block_size),
            used_size: U16::new(0),
            key_count: U16::new(0),
            value: U32::new(0),
            highest: U32::new(0),
        }
    }

    /// Reads a record out of page memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        ensure!(
            data.len() >= BLOCK_INDEX_SIZE,
            "buffer too small for BlockIndex: {} < {}",
            data.len(),
            BLOCK_INDEX_SIZE
        );

        Self::read_from_bytes(&data[..BLOCK_INDEX_SIZE])
            .map_err(|e| eyre::eyre!("failed to read BlockIndex: {:?}", e))
    }

    /// Writes this record into page memory.
    pub fn write_to(&self, data: &mut [u8]) -> Result<()> {
        ensure!(
            data.len() >= BLOCK_INDEX_SIZE,
            "buffer too small for BlockIndex: {} < {}",
            data.len(),
            BLOCK_INDEX_SIZE
        );

        data[..BLOCK_INDEX_SIZE].copy_from_slice(self.as_bytes());
        Ok(())
    }

    /// Payload offset, relative to the start of the payload region.
    #[inline]
    pub fn offset(&self) -> u16 {
        self.offset.get()
    }

    #[inline]
    pub fn set_offset(&mut self, offset: u16) {
        self.offset = U16::new(offset);
    }

    /// Bytes reserved for the payload.
    #[inline]
    pub fn block_size(&self) -> u16 {
        self.block_size.get()
    }

    #[inline]
    pub fn set_block_size(&mut self, block_size: u16) {
        self.block_size = U16::new(block_size);
    }

    /// Bytes of the reservation actually used.
    #[inline]
    pub fn used_size(&self) -> u16 {
        self.used_size.get()
    }

    #[inline]
    pub fn set_used_size(&mut self, used_size: u16) {
        self.used_size = U16::new(used_size);
    }

    /// Number of keys in the block, counting the index-resident value.
    #[inline]
    pub fn key_count(&self) -> u16 {
        self.key_count.get()
    }

    #[inline]
    pub fn set_key_count(&mut self, key_count: u16) {
        self.key_count = U16::new(key_count);
    }

    /// First key of the block.
    #[inline]
    pub fn value(&self) -> u32 {
        self.value.get()
    }

    #[inline]
    pub fn set_value(&mut self, value: u32) {
        self.value = U32::new(value);
    }

    /// Cached largest key of the block.
    #[inline]
    pub fn highest(&self) -> u32 {
        self.highest.get()
    }

    #[inline]
    pub fn set_highest(&mut self, highest: u32) {
        self.highest = U32::new(highest);
    }

    /// End of the reserved payload bytes, relative to the payload region.
    #[inline]
    pub fn payload_end(&self) -> usize {
        self.offset() as usize + self.block_size() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_index_is_16_bytes() {
        assert_eq!(size_of::<BlockIndex>(), BLOCK_INDEX_SIZE);
    }

    #[test]
    fn new_record_is_empty() {
        let index = BlockIndex::new(32, 16);

        assert_eq!(index.offset(), 32);
        assert_eq!(index.block_size(), 16);
        assert_eq!(index.used_size(), 0);
        assert_eq!(index.key_count(), 0);
        assert_eq!(index.value(), 0);
        assert_eq!(index.highest(), 0);
    }

    #[test]
    fn accessors_round_trip() {
        let mut index = BlockIndex::new(0, 1);

        index.set_offset(7);
        index.set_block_size(40);
        index.set_used_size(33);
        index.set_key_count(12);
        index.set_value(1000);
        index.set_highest(9999);

        assert_eq!(index.offset(), 7);
        assert_eq!(index.block_size(), 40);
        assert_eq!(index.used_size(), 33);
        assert_eq!(index.key_count(), 12);
        assert_eq!(index.value(), 1000);
        assert_eq!(index.highest(), 9999);
    }

    #[test]
    fn serialization_is_little_endian() {
        let mut index = BlockIndex::new(0x0102, 0x0304);
        index.set_value(0x0A0B0C0D);

        let mut buf = [0u8; BLOCK_INDEX_SIZE];
        index.write_to(&mut buf).unwrap();

        assert_eq!(&buf[0..2], &[0x02, 0x01]);
        assert_eq!(&buf[2..4], &[0x04, 0x03]);
        assert_eq!(&buf[8..12], &[0x0D, 0x0C, 0x0B, 0x0A]);
    }

    #[test]
    fn from_bytes_reads_unaligned() {
        let mut buf = [0u8; BLOCK_INDEX_SIZE + 1];
        let mut index = BlockIndex::new(3, 9);
        index.set_value(42);
        index.write_to(&mut buf[1..]).unwrap();

        let read = BlockIndex::from_bytes(&buf[1..]).unwrap();

        assert_eq!(read, index);
    }

    #[test]
    fn from_bytes_too_small_fails() {
        let buf = [0u8; BLOCK_INDEX_SIZE - 1];
        assert!(BlockIndex::from_bytes(&buf).is_err());
    }

    #[test]
    fn payload_end_sums_offset_and_size() {
        let index = BlockIndex::new(100, 28);
        assert_eq!(index.payload_end(), 128);
    }
}
