//! # Block Key List
//!
//! This module implements the key store of a B+tree leaf node: a sorted
//! sequence of u32 keys partitioned into variable-sized compressed blocks
//! inside a byte range owned by the page.
//!
//! ## Range Layout
//!
//! ```text
//! Offset  Size              Description
//! ------  ----------------  ------------------------------------------
//! 0       4                 block_count: number of active blocks
//! 4       4                 used_size: bytes occupied from offset 0,
//!                           including this header, the index table and
//!                           all reserved block payloads
//! 8       16 * block_count  index table, packed BlockIndex records in
//!                           logical block order (ascending first key)
//! ...     variable          payload region: concatenated block payloads,
//!                           addressed by the per-block payload offsets
//! ...     remainder         free tail, available for growth
//! ```
//!
//! Payload offsets are relative to the start of the payload region, so
//! adding or removing an index record only requires shifting the region as
//! a whole; the offsets stay valid.
//!
//! ## Block Lifecycle
//!
//! A block is *empty* (`key_count == 0`, only right after creation or after
//! its last key is erased), *singleton* (`key_count == 1`, the key lives in
//! the index record, payload unused) or *populated* (`key_count >= 2`, the
//! non-initial keys are delta-coded in the payload). Deleting down from
//! *populated* recomputes `highest` from the new last body key.
//!
//! ## Insert Protocol
//!
//! 1. A linear scan of the index table picks the target block (block counts
//!    per node stay small, so the scan beats a binary search in practice).
//! 2. A full block is split: prepended and appended keys get fresh
//!    singleton blocks; otherwise the block is cut at a four-aligned pivot
//!    and the upper half moves into a new neighbor block.
//! 3. When the range itself is exhausted a *limits reached* error unwinds
//!    to [`BlockKeyList::insert`], which defragments once and retries; a
//!    second failure surfaces to the B+tree so it can split the node.
//!
//! Failed operations leave the range satisfying every invariant: mutating
//! steps that can fail run before the page is touched, and index records
//! are updated through copies that are only written back on success.
//!
//! ## Concurrency
//!
//! The list is a transient view over page memory and performs no I/O and no
//! locking; the owning environment serializes access. Operations that move
//! payloads (growth, splits, vacuumize, `change_range_size`) invalidate any
//! previously computed payload positions, which is why all internal helpers
//! re-read the index table after such calls.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;

use eyre::{bail, ensure, Result};
use smallvec::SmallVec;

use crate::config::{
    ESTIMATED_KEY_SIZE, KEY_LIST_OVERHEAD, MAX_KEYS_PER_BLOCK, SPLIT_PIVOT_ALIGN,
};
use crate::error::{integrity_error, kind_of, ErrorKind};
use crate::stats::{Metric, MetricsSink};

use super::codec::{BlockCodec, BlockOverflow, CodecOps};
use super::index::{BlockIndex, BLOCK_INDEX_SIZE};

/// Receives key runs during [`BlockKeyList::scan`]. The visitor is called
/// with the block's first value as a one-element slice, then with the
/// decoded remainder of the block.
pub trait ScanVisitor {
    fn visit(&mut self, keys: &[u32]);
}

impl<F: FnMut(&[u32])> ScanVisitor for F {
    fn visit(&mut self, keys: &[u32]) {
        self(keys)
    }
}

/// Result of [`BlockKeyList::find_lower_bound`]: the global slot plus how
/// the searched key relates to the node.
///
/// - `Ordering::Less`: the key sorts before every stored key; slot is -1
/// - `Ordering::Equal`: the key is stored at the returned slot
/// - `Ordering::Greater`: the key is absent; the slot is the position of
///   the first larger key (the insertion slot)
pub type LowerBound = (i32, std::cmp::Ordering);

/// Sorted u32 key list over a borrowed page range, organized as compressed
/// blocks behind a packed index table.
pub struct BlockKeyList<'a, C: BlockCodec> {
    data: &'a mut [u8],
    _codec: PhantomData<C>,
}

impl<'a, C: BlockCodec> BlockKeyList<'a, C> {
    /// The keys are not stored as one contiguous plain array.
    pub const HAS_SEQUENTIAL_DATA: bool = false;
    /// Block-wise [`Self::scan`] is supported.
    pub const SUPPORTS_BLOCK_SCANS: bool = true;
    /// The node layer must route `find` through this list.
    pub const CUSTOM_FIND: bool = true;
    /// The node layer must route `find_lower_bound` through this list.
    pub const CUSTOM_FIND_LOWER_BOUND: bool = true;
    /// The node layer must route `insert` through this list.
    pub const CUSTOM_INSERT: bool = true;
    /// Static overhead of the range header.
    pub const OVERHEAD_SIZE: usize = KEY_LIST_OVERHEAD;

    /// Creates a fresh key list in `data`, with a single empty block.
    pub fn create(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() >= KEY_LIST_OVERHEAD + BLOCK_INDEX_SIZE + C::INITIAL_BLOCK_SIZE,
            "range of {} bytes too small for a key list",
            data.len()
        );

        let mut list = Self {
            data,
            _codec: PhantomData,
        };
        list.initialize()?;
        Ok(list)
    }

    /// Opens a key list persisted in `data` (e.g. after the owning node was
    /// fetched from disk).
    pub fn open(data: &'a mut [u8]) -> Result<Self> {
        ensure!(
            data.len() >= KEY_LIST_OVERHEAD + BLOCK_INDEX_SIZE,
            "range of {} bytes too small for a key list",
            data.len()
        );

        let list = Self {
            data,
            _codec: PhantomData,
        };
        ensure!(
            list.block_count() > 0 && list.used_size() <= list.data.len(),
            "key list header corrupt: {} blocks, {} of {} bytes used",
            list.block_count(),
            list.used_size(),
            list.data.len()
        );
        Ok(list)
    }

    /// Size of the owned range.
    pub fn range_size(&self) -> usize {
        self.data.len()
    }

    /// Number of active blocks.
    pub fn block_count(&self) -> usize {
        u32::from_le_bytes(self.data[0..4].try_into().expect("4-byte slice")) as usize
    }

    /// Bytes occupied from the start of the range, including the header,
    /// the index table and all reserved payloads.
    pub fn used_size(&self) -> usize {
        u32::from_le_bytes(self.data[4..8].try_into().expect("4-byte slice")) as usize
    }

    /// Range size needed to persist the current content; used when the node
    /// re-distributes space between its lists.
    pub fn required_range_size(&self) -> usize {
        self.used_size()
    }

    /// Per-key size estimate for the node capacity planner. Deliberately
    /// low: the planner should assume keys compress well and rely on
    /// *limits reached* inserts for the rare incompressible node.
    pub fn full_key_size(&self) -> usize {
        ESTIMATED_KEY_SIZE
    }

    /// The list never asks for a preventive node split; an insert that does
    /// not fit reports *limits reached* instead.
    pub fn requires_split(&self, _node_count: usize) -> bool {
        false
    }

    /// Searches for `key`; returns its global slot if present.
    pub fn find(&self, key: u32) -> Option<usize> {
        let (slot, cmp) = self.find_lower_bound(key);
        if cmp == std::cmp::Ordering::Equal {
            Some(slot as usize)
        } else {
            None
        }
    }

    /// Locates the lower bound of `key`; see [`LowerBound`].
    pub fn find_lower_bound(&self, key: u32) -> LowerBound {
        debug_assert!(self.block_count() > 0);

        let (block, slot) = self.find_index(key);
        let index = self.index(block);

        // key is the new minimum of this node?
        if key < index.value() {
            debug_assert_eq!(slot, -1);
            return (slot as i32, std::cmp::Ordering::Less);
        }

        if key == index.value() {
            return (slot as i32, std::cmp::Ordering::Equal);
        }

        let (pos, matched) = CodecOps::<C>::find_lower_bound(&index, self.payload(&index), key);
        let body_len = index.key_count().saturating_sub(1) as usize;
        let cmp = if pos < body_len && matched == key {
            std::cmp::Ordering::Equal
        } else {
            std::cmp::Ordering::Greater
        };
        // global slot is off by one: position 0 is the index-resident value
        ((slot + pos as i64 + 1) as i32, cmp)
    }

    /// Inserts `key`, returning the global slot it now occupies.
    ///
    /// On *limits reached* the list defragments once and retries; the error
    /// propagates if the range is genuinely full. On *duplicate key* the
    /// list is unchanged.
    pub fn insert(&mut self, node_count: usize, key: u32) -> Result<usize> {
        debug_assert!(self.check_integrity(node_count).is_ok());

        match self.insert_impl(node_count, key) {
            Err(err) if kind_of(&err) == Some(ErrorKind::LimitsReached) => {
                self.vacuumize_full();
                // retry once; a second failure is the node's problem
                self.insert_impl(node_count, key)
            }
            result => result,
        }
    }

    /// Erases the key at `slot`. `slot == node_count` addresses the
    /// one-past-end position of the last block, which node merges use to
    /// drop the trailing key.
    pub fn erase(&mut self, node_count: usize, slot: usize) -> Result<()> {
        debug_assert!(self.check_integrity(node_count).is_ok());

        let (block, position) = if slot == 0 {
            (0, 0)
        } else if slot == node_count {
            let last = self.block_count() - 1;
            (last, self.index(last).key_count() as usize)
        } else {
            self.find_block_by_slot(slot)
        };

        let index = self.index(block);
        if index.key_count() == 1 {
            // the sole key lives in the record; no payload to rewrite
            let mut index = index;
            index.set_key_count(0);
            self.set_index(block, &index);
        } else {
            self.delete_in_block(block, position)?;
        }

        // an emptied block is removed unless it is the only one
        if self.index(block).key_count() == 0 && self.block_count() > 1 {
            self.remove_block(block);
        }

        debug_assert!(self.check_integrity(node_count - 1).is_ok());
        Ok(())
    }

    /// Returns the key stored at the global `slot`.
    pub fn key_at(&self, slot: usize) -> Result<u32> {
        let (block, position) = self.find_block_by_slot(slot);
        let index = self.index(block);
        ensure!(
            position < index.key_count() as usize,
            "slot {} out of bounds",
            slot
        );

        Ok(CodecOps::<C>::select(&index, self.payload(&index), position))
    }

    /// Writes the key at `slot` to `out` (for debugging).
    pub fn print(&self, slot: usize, out: &mut dyn fmt::Write) -> fmt::Result {
        let key = self.key_at(slot).map_err(|_| fmt::Error)?;
        write!(out, "{}", key)
    }

    /// Visits all keys in order, skipping the first `start` and stopping
    /// after `count`. Each block costs one decompression; the visitor sees
    /// the block's first value as a single-element run, then the decoded
    /// remainder as one contiguous run.
    pub fn scan(&self, visitor: &mut dyn ScanVisitor, start: usize, count: usize) {
        let mut start = start;
        let mut remaining = count;
        let mut scratch = [0u32; MAX_KEYS_PER_BLOCK];

        for i in 0..self.block_count() {
            if remaining == 0 {
                break;
            }

            let index = self.index(i);
            let key_count = index.key_count() as usize;
            if start >= key_count {
                start -= key_count;
                continue;
            }

            if start == 0 {
                visitor.visit(&[index.value()]);
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }

            let n = CodecOps::<C>::decompress(&index, self.payload(&index), &mut scratch);
            let skip = start.saturating_sub(1);
            let take = (n - skip).min(remaining);
            if take > 0 {
                visitor.visit(&scratch[skip..skip + take]);
                remaining -= take;
            }
            start = 0;
        }
    }

    /// Moves the keys from global slot `src_start` onwards into `dest`,
    /// starting at `dest_start`. Used by the node layer to split and merge
    /// leaves. Whole blocks are copied without decompression; only blocks
    /// cut by a boundary are decoded and merged.
    pub fn copy_to(
        &mut self,
        src_start: usize,
        node_count: usize,
        dest: &mut BlockKeyList<'_, C>,
        dest_count: usize,
        dest_start: usize,
    ) -> Result<()> {
        debug_assert!(self.check_integrity(node_count).is_ok());

        // merging into a node whose list was never used: start clean
        if dest_count == 0 {
            dest.initialize()?;
        }

        let (src_block, src_pos) = self.find_block_by_slot(src_start);
        let (dst_block, dst_pos) = dest.find_block_by_slot(dest_start);

        let mut srci = self.index(src_block);
        let dsti = dest.index(dst_block);

        let merge = src_pos > 0 || dst_pos > 0;

        // make sure the first destination block is large enough, both for a
        // wholesale payload copy and for the merged re-encoding
        let needed = if merge {
            dsti.used_size() as usize + srci.used_size() as usize + crate::config::MAX_VARBYTE_LEN
        } else {
            srci.used_size() as usize
        };
        if needed > dsti.block_size() as usize {
            dest.grow_block_size(dst_block, needed)?;
        }

        let mut initial_block_used = false;
        let mut bulk_from = src_block;
        let mut remove_from = src_block;

        if merge {
            // a boundary cuts through a block: decode both sides and move
            // the source tail key-by-key
            let mut sdata = [0u32; MAX_KEYS_PER_BLOCK];
            let sn = CodecOps::<C>::decompress(&srci, self.payload(&srci), &mut sdata);
            debug_assert_eq!(sn + 1, srci.key_count() as usize);

            let mut dsti = dest.index(dst_block);
            let mut ddata = [0u32; MAX_KEYS_PER_BLOCK];
            let mut dn = CodecOps::<C>::decompress(&dsti, dest.payload(&dsti), &mut ddata);
            let mut dest_keys = dsti.key_count() as usize;

            let moved = srci.key_count() as usize - src_pos;
            debug_assert!(dest_keys + moved <= MAX_KEYS_PER_BLOCK);
            for i in 0..moved {
                let key = match src_pos + i {
                    0 => srci.value(),
                    p => sdata[p - 1],
                };
                if dest_keys == 0 {
                    dsti.set_value(key);
                } else {
                    ddata[dn] = key;
                    dn += 1;
                }
                dest_keys += 1;
            }

            dsti.set_key_count(dest_keys as u16);
            dsti.set_highest(if dn == 0 { dsti.value() } else { ddata[dn - 1] });

            if dsti.key_count() > 1 {
                let range = dest.payload_range(&dsti);
                let used = C::compress(&dsti, &ddata[..dn], &mut dest.data[range]);
                debug_assert!(used <= dsti.block_size() as usize);
                dsti.set_used_size(used as u16);
            } else {
                dsti.set_used_size(0);
            }
            dest.set_index(dst_block, &dsti);

            // trim the source block down to the retained prefix
            srci.set_key_count(src_pos as u16);
            srci.set_highest(match src_pos {
                0 | 1 => srci.value(),
                p => sdata[p - 2],
            });
            if srci.key_count() > 1 {
                let range = self.payload_range(&srci);
                let used = C::compress(&srci, &sdata[..src_pos - 1], &mut self.data[range]);
                debug_assert!(used <= srci.block_size() as usize);
                srci.set_used_size(used as u16);
            } else {
                srci.set_used_size(0);
            }
            self.set_index(src_block, &srci);

            bulk_from = src_block + 1;
            if srci.key_count() > 0 {
                remove_from = src_block + 1;
            }
            initial_block_used = true;
        }

        // appending block-aligned data to a non-empty node must not clobber
        // the node's last block
        if dst_pos == 0 && dest_start > 0 {
            initial_block_used = true;
        }

        // bulk-copy the remaining whole blocks without decompressing
        let block_count = self.block_count();
        for i in bulk_from..block_count {
            let srci = self.index(i);

            let dst_at = if initial_block_used {
                dest.add_block(dest.block_count(), srci.block_size() as usize)?;
                dest.block_count() - 1
            } else {
                initial_block_used = true;
                dst_block
            };

            let mut dsti = dest.index(dst_at);
            let used = srci.used_size() as usize;
            let src_range = self.payload_range(&srci);
            let dst_range = dest.payload_range(&dsti);
            dest.data[dst_range.start..dst_range.start + used]
                .copy_from_slice(&self.data[src_range.start..src_range.start + used]);

            dsti.set_value(srci.value());
            dsti.set_highest(srci.highest());
            dsti.set_key_count(srci.key_count());
            dsti.set_used_size(srci.used_size());
            dest.set_index(dst_at, &dsti);
        }

        // drop the copied trailing index records; the payload region shifts
        // left over them, and the per-block offsets stay valid
        let removed = block_count - remove_from;
        if removed > 0 {
            let used = self.used_size();
            let region_start = KEY_LIST_OVERHEAD + BLOCK_INDEX_SIZE * block_count;
            let new_start = KEY_LIST_OVERHEAD + BLOCK_INDEX_SIZE * remove_from;
            self.data.copy_within(region_start..used, new_start);
            self.set_block_count(remove_from);
            self.reset_used_size();
        }

        // keep at least one block so every other operation has a target
        if self.block_count() == 0 {
            self.initialize()?;
        }

        debug_assert!(dest
            .check_integrity(dest_count + (node_count - src_start))
            .is_ok());
        debug_assert!(self.check_integrity(src_start).is_ok());
        Ok(())
    }

    /// Defragments the range. With `node_count == 0` the list is reset to
    /// its pristine single-block state.
    pub fn vacuumize(&mut self, node_count: usize) -> Result<()> {
        debug_assert!(self.check_integrity(node_count).is_ok());
        debug_assert!(self.block_count() > 0);

        if node_count == 0 {
            self.initialize()?;
        } else {
            self.vacuumize_full();
        }

        debug_assert!(self.check_integrity(node_count).is_ok());
        Ok(())
    }

    /// Moves a persisted key list from `old_offset` to `new_offset` within
    /// `page`, in preparation for resizing its range to `new_range_size`.
    /// Payload offsets are relative and survive the move; callers re-open
    /// the list at the new position afterwards.
    pub fn change_range_size(
        page: &mut [u8],
        old_offset: usize,
        new_offset: usize,
        new_range_size: usize,
    ) -> Result<()> {
        ensure!(
            old_offset + KEY_LIST_OVERHEAD <= page.len(),
            "old range outside the page"
        );
        let used = u32::from_le_bytes(
            page[old_offset + 4..old_offset + 8]
                .try_into()
                .expect("4-byte slice"),
        ) as usize;
        ensure!(
            old_offset + used <= page.len() && new_offset + new_range_size <= page.len(),
            "key list range outside the page"
        );
        if used > new_range_size {
            bail!(ErrorKind::LimitsReached);
        }

        if new_offset != old_offset {
            page.copy_within(old_offset..old_offset + used, new_offset);
        }
        Ok(())
    }

    /// Verifies every structural invariant of the range, including a full
    /// decode of each block. Returns the *integrity violated* error on the
    /// first broken invariant.
    pub fn check_integrity(&self, node_count: usize) -> Result<()> {
        let block_count = self.block_count();
        if block_count == 0 {
            tracing::error!("key list has no blocks");
            return Err(integrity_error("key list has no blocks".into()));
        }

        let mut total_keys = 0usize;
        let mut payload_used = 0usize;
        let mut prev_highest: Option<u32> = None;
        let mut scratch = [0u32; MAX_KEYS_PER_BLOCK];

        for i in 0..block_count {
            let index = self.index(i);
            let key_count = index.key_count() as usize;

            if index.used_size() > index.block_size() {
                return Err(integrity_error(format!(
                    "block {}: used size {} exceeds block size {}",
                    i,
                    index.used_size(),
                    index.block_size()
                )));
            }
            if key_count > MAX_KEYS_PER_BLOCK {
                return Err(integrity_error(format!(
                    "block {}: key count {} exceeds the maximum",
                    i, key_count
                )));
            }
            if index.highest() < index.value() {
                return Err(integrity_error(format!(
                    "block {}: highest {} below first value {}",
                    i,
                    index.highest(),
                    index.value()
                )));
            }
            if node_count > 0 && key_count == 0 {
                return Err(integrity_error(format!("block {}: no keys", i)));
            }
            if key_count == 1 && index.highest() != index.value() {
                return Err(integrity_error(format!(
                    "block {}: singleton with stale highest",
                    i
                )));
            }
            if key_count > 1 && index.used_size() == 0 {
                return Err(integrity_error(format!(
                    "block {}: populated block without payload",
                    i
                )));
            }
            if let Some(highest) = prev_highest {
                if key_count > 0 && index.value() <= highest {
                    return Err(integrity_error(format!(
                        "block {}: first value {} not above previous block's highest {}",
                        i,
                        index.value(),
                        highest
                    )));
                }
            }

            if key_count > 1 {
                let n = CodecOps::<C>::decompress(&index, self.payload(&index), &mut scratch);
                let body = &scratch[..n];
                if body[0] <= index.value() {
                    return Err(integrity_error(format!(
                        "block {}: body starts at {} but first value is {}",
                        i, body[0], index.value()
                    )));
                }
                if body.windows(2).any(|pair| pair[0] >= pair[1]) {
                    return Err(integrity_error(format!(
                        "block {}: body is not strictly increasing",
                        i
                    )));
                }
                if body[n - 1] != index.highest() {
                    return Err(integrity_error(format!(
                        "block {}: cached highest {} differs from last key {}",
                        i,
                        index.highest(),
                        body[n - 1]
                    )));
                }
            }

            if key_count > 0 {
                prev_highest = Some(index.highest());
            }
            total_keys += key_count;
            payload_used = payload_used.max(index.payload_end());
        }

        let used = KEY_LIST_OVERHEAD + BLOCK_INDEX_SIZE * block_count + payload_used;
        if used != self.used_size() {
            tracing::error!(
                computed = used,
                stored = self.used_size(),
                "used size differs from expected"
            );
            return Err(integrity_error(format!(
                "used size {} differs from expected {}",
                self.used_size(),
                used
            )));
        }
        if used > self.data.len() {
            tracing::error!(
                used,
                range = self.data.len(),
                "used size exceeds range size"
            );
            return Err(integrity_error(format!(
                "used size {} exceeds range size {}",
                used,
                self.data.len()
            )));
        }
        if total_keys != node_count {
            tracing::error!(
                total_keys,
                node_count,
                "key count differs from expected"
            );
            return Err(integrity_error(format!(
                "key count {} differs from expected {}",
                total_keys, node_count
            )));
        }

        Ok(())
    }

    /// Reports size metrics for this list to the statistics sink.
    pub fn fill_metrics(&self, sink: &mut dyn MetricsSink) {
        let block_count = self.block_count();
        sink.update_min_max_avg(
            Metric::KeyListIndexBytes,
            (block_count * BLOCK_INDEX_SIZE) as u32,
        );
        sink.update_min_max_avg(Metric::KeyListBlocksPerPage, block_count as u32);

        let mut used = 0;
        for i in 0..block_count {
            let index = self.index(i);
            used += BLOCK_INDEX_SIZE + index.used_size() as usize;
            sink.update_min_max_avg(Metric::KeyListBlockSize, index.block_size() as u32);
        }
        sink.update_min_max_avg(Metric::KeyListUnusedBytes, (self.data.len() - used) as u32);
    }

    // ---- internals -----------------------------------------------------

    /// Resets the range to one empty block.
    fn initialize(&mut self) -> Result<()> {
        self.set_block_count(0);
        self.set_used_size(KEY_LIST_OVERHEAD);
        self.add_block(0, C::INITIAL_BLOCK_SIZE)
    }

    fn set_block_count(&mut self, count: usize) {
        self.data[0..4].copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn set_used_size(&mut self, used: usize) {
        debug_assert!(used <= self.data.len());
        self.data[4..8].copy_from_slice(&(used as u32).to_le_bytes());
    }

    /// Reads a copy of the index record of block `i`. Mutations go through
    /// [`Self::set_index`] so failed operations never leave a half-updated
    /// record on the page.
    fn index(&self, i: usize) -> BlockIndex {
        debug_assert!(i < self.block_count());
        let at = KEY_LIST_OVERHEAD + i * BLOCK_INDEX_SIZE;
        BlockIndex::from_bytes(&self.data[at..]).expect("index table within range")
    }

    fn set_index(&mut self, i: usize, index: &BlockIndex) {
        debug_assert!(i < self.block_count());
        let at = KEY_LIST_OVERHEAD + i * BLOCK_INDEX_SIZE;
        index
            .write_to(&mut self.data[at..])
            .expect("index table within range");
    }

    /// Start of the payload region (right after the index table).
    fn payload_base(&self) -> usize {
        KEY_LIST_OVERHEAD + BLOCK_INDEX_SIZE * self.block_count()
    }

    fn payload_range(&self, index: &BlockIndex) -> Range<usize> {
        let start = self.payload_base() + index.offset() as usize;
        start..start + index.block_size() as usize
    }

    fn payload(&self, index: &BlockIndex) -> &[u8] {
        &self.data[self.payload_range(index)]
    }

    /// Linear scan of the index table for the block covering `key`; returns
    /// the block plus the global slot of its first key (-1 when `key`
    /// precedes the whole node).
    fn find_index(&self, key: u32) -> (usize, i64) {
        let block_count = self.block_count();

        if key < self.index(0).value() {
            return (0, -1);
        }

        let mut slot = 0i64;
        let mut i = 0;
        while i + 1 < block_count {
            if key < self.index(i + 1).value() {
                break;
            }
            slot += self.index(i).key_count() as i64;
            i += 1;
        }
        (i, slot)
    }

    /// Maps a global slot to its block and the position inside the block.
    /// A one-past-end slot lands behind the last block's keys.
    fn find_block_by_slot(&self, slot: usize) -> (usize, usize) {
        debug_assert!(self.block_count() > 0);

        let mut slot = slot;
        let block_count = self.block_count();
        for i in 0..block_count {
            let key_count = self.index(i).key_count() as usize;
            if key_count > slot {
                return (i, slot);
            }
            slot -= key_count;
        }
        (block_count - 1, slot)
    }

    fn insert_impl(&mut self, node_count: usize, key: u32) -> Result<usize> {
        let (block, slot) = self.find_index(key);
        let mut index = self.index(block);

        // first key of an empty block is stored without a delta body
        if index.key_count() == 0 {
            index.set_key_count(1);
            index.set_value(key);
            index.set_highest(key);
            self.set_index(block, &index);
            return Ok(slot.max(0) as usize);
        }

        if key == index.value() || key == index.highest() {
            bail!(ErrorKind::DuplicateKey);
        }

        let mut slot = slot;
        let mut target = block;

        if (index.key_count() as usize) + 1 < MAX_KEYS_PER_BLOCK {
            let estimate = C::estimate_required_size(&index, self.payload(&index), key);
            if estimate > index.block_size() as usize {
                self.grow_block_size(block, estimate)?;
            }
        } else {
            // the block is full and must be split

            if key < index.value() {
                // prepended key: a fresh singleton block, swapped in front
                self.add_block(block + 1, C::INITIAL_BLOCK_SIZE)?;
                let mut single = self.index(block + 1);
                single.set_key_count(1);
                single.set_value(key);
                single.set_highest(key);

                let full = self.index(block);
                self.set_index(block, &single);
                self.set_index(block + 1, &full);

                debug_assert!(self.check_integrity(node_count + 1).is_ok());
                return Ok(slot.max(0) as usize);
            }

            if key > index.highest() {
                // appended key: a fresh singleton block after this one
                self.add_block(block + 1, C::INITIAL_BLOCK_SIZE)?;
                let mut single = self.index(block + 1);
                single.set_key_count(1);
                single.set_value(key);
                single.set_highest(key);
                self.set_index(block + 1, &single);

                debug_assert!(self.check_integrity(node_count + 1).is_ok());
                return Ok((slot + index.key_count() as i64) as usize);
            }

            // cut the block at a four-aligned pivot and move the upper half
            // into a new neighbor
            let mut scratch = [0u32; MAX_KEYS_PER_BLOCK];
            let n = CodecOps::<C>::decompress(&index, self.payload(&index), &mut scratch);

            let to_copy = (index.key_count() as usize / 2) & !(SPLIT_PIVOT_ALIGN - 1);
            debug_assert!(to_copy > 0);
            let new_key_count = index.key_count() as usize - to_copy - 1;
            let new_value = scratch[to_copy];

            // the pivot itself may collide with the new key
            if new_value == key {
                bail!(ErrorKind::DuplicateKey);
            }

            let mut upper = [0u32; MAX_KEYS_PER_BLOCK];
            upper[..n - to_copy - 1].copy_from_slice(&scratch[to_copy + 1..n]);

            // creating the block can fail with *limits reached*; nothing has
            // been modified up to here
            self.add_block(block + 1, index.block_size() as usize)?;
            // adding a block may defragment the range; re-read the record
            index = self.index(block);

            let mut new_index = self.index(block + 1);
            new_index.set_value(new_value);
            new_index.set_highest(index.highest());
            new_index.set_key_count(new_key_count as u16);

            index.set_key_count((index.key_count() as usize - new_key_count) as u16);
            index.set_highest(scratch[to_copy - 1]);

            let range = self.payload_range(&index);
            let used = C::compress(&index, &scratch[..to_copy], &mut self.data[range]);
            debug_assert!(used <= index.block_size() as usize);
            index.set_used_size(used as u16);
            self.set_index(block, &index);

            let range = self.payload_range(&new_index);
            let used = C::compress(&new_index, &upper[..new_key_count - 1], &mut self.data[range]);
            debug_assert!(used <= new_index.block_size() as usize);
            new_index.set_used_size(used as u16);
            self.set_index(block + 1, &new_index);

            if key >= new_index.value() {
                slot += index.key_count() as i64;
                target = block + 1;
            }
        }

        let mut index = self.index(target);
        let range = self.payload_range(&index);
        let position = if key > index.highest() {
            let position = CodecOps::<C>::append(&mut index, &mut self.data[range], key);
            index.set_highest(key);
            position
        } else {
            CodecOps::<C>::insert(&mut index, &mut self.data[range], key)?
        };
        debug_assert!(index.used_size() <= index.block_size());
        self.set_index(target, &index);

        debug_assert!(self.check_integrity(node_count + 1).is_ok());
        Ok((slot + position as i64) as usize)
    }

    /// Removes the key at `position` of `block` through the codec adapter,
    /// growing the block when the re-encoding does not fit.
    fn delete_in_block(&mut self, block: usize, position: usize) -> Result<()> {
        let mut index = self.index(block);
        let range = self.payload_range(&index);
        match CodecOps::<C>::delete(&mut index, &mut self.data[range], position) {
            Ok(()) => {
                self.set_index(block, &index);
                Ok(())
            }
            Err(BlockOverflow { required }) => {
                // the scratched record copy is discarded; grow and retry
                self.grow_block_size(block, required)?;
                let mut index = self.index(block);
                let range = self.payload_range(&index);
                CodecOps::<C>::delete(&mut index, &mut self.data[range], position)
                    .map_err(|_| eyre::Report::new(ErrorKind::Internal))?;
                self.set_index(block, &index);
                Ok(())
            }
        }
    }

    /// Inserts a fresh empty block record at `position`, reserving
    /// `initial_size` payload bytes at the end of the payload region.
    fn add_block(&mut self, position: usize, initial_size: usize) -> Result<()> {
        debug_assert!(initial_size > 0);
        self.check_available_size(initial_size + BLOCK_INDEX_SIZE)?;

        let used = self.used_size();
        let block_count = self.block_count();

        // shift the following records and the payload region right to make
        // room for the new record
        if block_count != 0 {
            let start = KEY_LIST_OVERHEAD + position * BLOCK_INDEX_SIZE;
            self.data.copy_within(start..used, start + BLOCK_INDEX_SIZE);
        }

        self.set_block_count(block_count + 1);
        let new_used = used + BLOCK_INDEX_SIZE + initial_size;
        self.set_used_size(new_used);

        // the payload sits at the current end of the payload region
        let offset =
            new_used - KEY_LIST_OVERHEAD - BLOCK_INDEX_SIZE * (block_count + 1) - initial_size;
        let index = BlockIndex::new(offset as u16, initial_size as u16);
        self.set_index(position, &index);
        Ok(())
    }

    /// Drops the (empty) block at `position`.
    fn remove_block(&mut self, position: usize) {
        debug_assert!(self.block_count() > 1);
        debug_assert_eq!(self.index(position).key_count(), 0);

        let used = self.used_size();
        let block_count = self.block_count();
        let index = self.index(position);

        // if this payload ends the used region, other stale payloads may be
        // uncovered behind it and the used size must be recomputed
        let ends_used_region =
            used == KEY_LIST_OVERHEAD + BLOCK_INDEX_SIZE * block_count + index.payload_end();

        let start = KEY_LIST_OVERHEAD + (position + 1) * BLOCK_INDEX_SIZE;
        self.data.copy_within(start..used, start - BLOCK_INDEX_SIZE);
        self.set_block_count(block_count - 1);

        if ends_used_region {
            self.reset_used_size();
        } else {
            self.set_used_size(used - BLOCK_INDEX_SIZE);
        }
    }

    /// Recomputes `used_size` from the surviving index table.
    fn reset_used_size(&mut self) {
        let block_count = self.block_count();
        let mut payload_used = 0;
        for i in 0..block_count {
            payload_used = payload_used.max(self.index(i).payload_end());
        }
        self.set_used_size(KEY_LIST_OVERHEAD + BLOCK_INDEX_SIZE * block_count + payload_used);
    }

    /// Extends the reserved payload of `block` to `new_size` bytes, moving
    /// the following payloads out of the way.
    fn grow_block_size(&mut self, block: usize, new_size: usize) -> Result<()> {
        debug_assert!(new_size > self.index(block).block_size() as usize);

        self.check_available_size(new_size - self.index(block).block_size() as usize)?;

        // the vacuumize inside the check may have shrunk this block, so the
        // growth is recomputed against the current size
        let mut index = self.index(block);
        let additional = new_size - index.block_size() as usize;
        if self.used_size() + additional > self.data.len() {
            bail!(ErrorKind::LimitsReached);
        }

        let used = self.used_size();
        let payload_base = self.payload_base();

        // move the payloads behind this block unless it is the last one
        if index.payload_end() < used - payload_base {
            let move_start = payload_base + index.payload_end();
            self.data.copy_within(move_start..used, move_start + additional);

            let block_count = self.block_count();
            for i in 0..block_count {
                let mut other = self.index(i);
                if other.offset() > index.offset() {
                    other.set_offset(other.offset() + additional as u16);
                    self.set_index(i, &other);
                }
            }
        }

        index.set_block_size(new_size as u16);
        self.set_index(block, &index);
        self.set_used_size(used + additional);
        Ok(())
    }

    /// Verifies the range can absorb `additional` bytes, defragmenting once
    /// if it cannot; reports *limits reached* when even that is not enough.
    fn check_available_size(&mut self, additional: usize) -> Result<()> {
        if self.used_size() + additional <= self.data.len() {
            return Ok(());
        }
        self.vacuumize_weak();
        if self.used_size() + additional > self.data.len() {
            bail!(ErrorKind::LimitsReached);
        }
        Ok(())
    }

    /// Packs all payloads leftward without changing block identities, and
    /// shrinks every reservation to the bytes actually used (at least one,
    /// so no two blocks share an offset).
    fn vacuumize_weak(&mut self) {
        let block_count = self.block_count();

        let mut order: SmallVec<[(u16, u16); 16]> = SmallVec::with_capacity(block_count);
        let mut needs_sort = false;
        for i in 0..block_count {
            let offset = self.index(i).offset();
            if let Some(&(prev, _)) = order.last() {
                if offset < prev {
                    needs_sort = true;
                }
            }
            order.push((offset, i as u16));
        }
        // sorting is the expensive part; skip it while the table is already
        // in payload order
        if needs_sort {
            order.sort_unstable();
        }

        let payload_base = self.payload_base();
        let mut next_offset = 0usize;
        for &(_, i) in &order {
            let mut index = self.index(i as usize);
            if index.offset() as usize != next_offset {
                let src = payload_base + index.offset() as usize;
                self.data
                    .copy_within(src..src + index.used_size() as usize, payload_base + next_offset);
                index.set_offset(next_offset as u16);
            }
            index.set_block_size(index.used_size().max(1));
            next_offset += index.block_size() as usize;
            self.set_index(i as usize, &index);
        }

        self.set_used_size(payload_base + next_offset);
    }

    /// Full defragmentation: the weak pass plus any codec-specific
    /// re-layout (none for the codecs in this crate).
    fn vacuumize_full(&mut self) {
        self.vacuumize_weak();
    }
}

impl<C: BlockCodec> fmt::Debug for BlockKeyList<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockKeyList")
            .field("range_size", &self.data.len())
            .field("block_count", &self.block_count())
            .field("used_size", &self.used_size())
            .finish()
    }
}
