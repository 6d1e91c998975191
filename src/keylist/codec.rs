//! # Block Codec Interface and Adapter
//!
//! A [`BlockCodec`] turns the strictly increasing body of one key block
//! (every key after the index-resident first value) into bytes and back.
//! Codecs are pure: no I/O, no allocation, no state.
//!
//! ## Capability Dispatch
//!
//! Most codecs only know how to compress and decompress. The remaining
//! operations of the key-list contract (search, insert, append, delete,
//! select) are supplied by the adapter [`CodecOps`], which decompresses the
//! body into a stack scratch buffer, operates on the array, and recompresses.
//!
//! A codec that can do better on its compressed form advertises it through
//! an associated `const` flag and overrides the matching trait method; the
//! adapter then routes the call straight to the codec. The hot lookup path
//! in particular should avoid a full decompress when the codec supports
//! direct search.
//!
//! Calling a native method whose flag the codec does not raise is a
//! programming error and panics; real failures (duplicate key, block
//! overflow) are reported as results.
//!
//! ## Grow Protocol
//!
//! Deleting a key can in principle make a block *larger* (two deltas merge
//! into one wider delta under some encodings). The adapter therefore
//! recompresses into a stack buffer first and only commits to the page when
//! the result fits the reserved `block_size`. If it does not fit, the
//! adapter reports [`BlockOverflow`] without touching the page, and the key
//! list grows the block and retries. On-page bytes are never left
//! half-written.

use std::marker::PhantomData;

use eyre::bail;

use crate::config::{MAX_BLOCK_PAYLOAD, MAX_KEYS_PER_BLOCK};
use crate::error::ErrorKind;

use super::index::BlockIndex;

/// Recompression after a delete needs more bytes than the block reserves.
///
/// The page is untouched; the caller grows the block to at least
/// `required` bytes and retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOverflow {
    pub required: usize,
}

/// Encoder/decoder for the delta-coded body of one key block.
///
/// `index.value()` is the predecessor of the first body key; the body
/// itself is strictly increasing and strictly greater than `value`.
pub trait BlockCodec {
    /// Codec searches its compressed form directly; `find_lower_bound`
    /// is implemented.
    const HAS_FIND_LOWER_BOUND: bool = false;
    /// Codec inserts into its compressed form directly.
    const HAS_INSERT: bool = false;
    /// Codec appends to its compressed form directly.
    const HAS_APPEND: bool = false;
    /// Codec deletes from its compressed form directly.
    const HAS_DELETE: bool = false;
    /// Codec selects by position from its compressed form directly.
    const HAS_SELECT: bool = false;
    /// Codec mutates page payloads in place; callers must refetch payload
    /// slices after any operation that can move blocks.
    const COMPRESSES_IN_PLACE: bool = false;

    /// Payload bytes reserved for a freshly created block.
    const INITIAL_BLOCK_SIZE: usize = 16;

    /// Encodes `keys` (the block body) into `out`; returns bytes written.
    ///
    /// `out` is at least `index.block_size()` bytes, and `keys.len()` equals
    /// `index.key_count() - 1`.
    fn compress(index: &BlockIndex, keys: &[u32], out: &mut [u8]) -> usize;

    /// Decodes the block body from `payload` into `out`; returns the number
    /// of keys written. Only called with `index.key_count() >= 2`.
    fn decompress(index: &BlockIndex, payload: &[u8], out: &mut [u32]) -> usize;

    /// Worst-case payload bytes needed if `key` were inserted into this
    /// block.
    fn estimate_required_size(index: &BlockIndex, payload: &[u8], key: u32) -> usize;

    /// Native lower-bound search; see [`CodecOps::find_lower_bound`].
    fn find_lower_bound(_index: &BlockIndex, _payload: &[u8], _key: u32) -> (usize, u32) {
        panic!("{}: codec does not implement find_lower_bound", ErrorKind::Internal);
    }

    /// Native ordered insert; see [`CodecOps::insert`].
    fn insert(_index: &mut BlockIndex, _payload: &mut [u8], _key: u32) -> eyre::Result<usize> {
        panic!("{}: codec does not implement insert", ErrorKind::Internal);
    }

    /// Native append; see [`CodecOps::append`].
    fn append(_index: &mut BlockIndex, _payload: &mut [u8], _key: u32) -> usize {
        panic!("{}: codec does not implement append", ErrorKind::Internal);
    }

    /// Native delete; see [`CodecOps::delete`].
    fn delete(
        _index: &mut BlockIndex,
        _payload: &mut [u8],
        _slot: usize,
    ) -> Result<(), BlockOverflow> {
        panic!("{}: codec does not implement delete", ErrorKind::Internal);
    }

    /// Native select of body position `slot` (0 = first body key).
    fn select(_index: &BlockIndex, _payload: &[u8], _slot: usize) -> u32 {
        panic!("{}: codec does not implement select", ErrorKind::Internal);
    }
}

/// Lower-bound over a decoded block: position of the first body key
/// `>= key` together with the key at that position, or the last key when
/// every body key is smaller (`value` when the body is empty).
#[inline]
pub(crate) fn lower_bound(body: &[u32], value: u32, key: u32) -> (usize, u32) {
    let pos = body.partition_point(|&k| k < key);
    let matched = match body {
        [] => value,
        _ => body[pos.min(body.len() - 1)],
    };
    (pos, matched)
}

/// Bridges a [`BlockCodec`] into the uniform block-operation interface used
/// by the key list, falling back to decompress/operate/recompress for
/// operations the codec does not natively support.
///
/// All mutating operations work on a *copy* of the index record; the key
/// list writes the copy back only after the operation succeeds.
pub struct CodecOps<C: BlockCodec>(PhantomData<C>);

impl<C: BlockCodec> CodecOps<C> {
    /// Decodes the block body into `out`; a block of at most one key has an
    /// empty body and is answered without calling the codec.
    pub fn decompress(
        index: &BlockIndex,
        payload: &[u8],
        out: &mut [u32; MAX_KEYS_PER_BLOCK],
    ) -> usize {
        if index.key_count() <= 1 {
            return 0;
        }
        C::decompress(index, payload, out)
    }

    /// Position (0-based within the body) of the first body key `>= key`,
    /// plus the key found there; falls back to the last body key (or
    /// `value`) when every key is smaller.
    pub fn find_lower_bound(index: &BlockIndex, payload: &[u8], key: u32) -> (usize, u32) {
        if C::HAS_FIND_LOWER_BOUND {
            return C::find_lower_bound(index, payload, key);
        }

        let mut scratch = [0u32; MAX_KEYS_PER_BLOCK];
        let n = Self::decompress(index, payload, &mut scratch);
        lower_bound(&scratch[..n], index.value(), key)
    }

    /// Inserts `key` into the block in sorted order.
    ///
    /// If `key` undercuts the block's first value the two are swapped, so
    /// the new minimum ends up in the index record. Returns the slot the
    /// key occupies within the block (slot 0 is the index-resident value),
    /// or the *duplicate key* error with the block untouched.
    ///
    /// The caller must have sized the block for the insert beforehand (see
    /// [`BlockCodec::estimate_required_size`]).
    pub fn insert(index: &mut BlockIndex, payload: &mut [u8], key: u32) -> eyre::Result<usize> {
        if C::HAS_INSERT {
            return C::insert(index, payload, key);
        }

        let mut scratch = [0u32; MAX_KEYS_PER_BLOCK];
        let n = Self::decompress(index, payload, &mut scratch);

        let mut key = key;
        if key < index.value() {
            let tmp = index.value();
            index.set_value(key);
            key = tmp;
        }

        let pos = scratch[..n].partition_point(|&k| k < key);
        if pos < n && scratch[pos] == key {
            bail!(ErrorKind::DuplicateKey);
        }

        scratch.copy_within(pos..n, pos + 1);
        scratch[pos] = key;

        index.set_key_count(index.key_count() + 1);
        let used = C::compress(index, &scratch[..n + 1], payload);
        index.set_used_size(used as u16);

        Ok(pos + 1)
    }

    /// Appends `key` to the tail of the block. The caller guarantees
    /// `key > index.highest()` and updates `highest` afterwards. Returns
    /// the slot the key occupies within the block.
    pub fn append(index: &mut BlockIndex, payload: &mut [u8], key: u32) -> usize {
        if C::HAS_APPEND {
            return C::append(index, payload, key);
        }

        let mut scratch = [0u32; MAX_KEYS_PER_BLOCK];
        let n = Self::decompress(index, payload, &mut scratch);

        scratch[n] = key;

        index.set_key_count(index.key_count() + 1);
        let used = C::compress(index, &scratch[..n + 1], payload);
        index.set_used_size(used as u16);

        n + 1
    }

    /// Removes the key at `slot` (0 = the index-resident value, in which
    /// case the first body key is promoted into the record). Recomputes
    /// `highest` and recompresses; see [`BlockOverflow`] for the grow
    /// protocol. Only called with `index.key_count() >= 2`.
    pub fn delete(
        index: &mut BlockIndex,
        payload: &mut [u8],
        slot: usize,
    ) -> Result<(), BlockOverflow> {
        if C::HAS_DELETE {
            return C::delete(index, payload, slot);
        }

        let mut scratch = [0u32; MAX_KEYS_PER_BLOCK];
        let n = Self::decompress(index, payload, &mut scratch);

        let mut slot = slot;
        if slot == 0 {
            index.set_value(scratch[0]);
            slot = 1;
        }

        // drop body key slot-1; positions above shift down
        if slot < n {
            scratch.copy_within(slot..n, slot - 1);
        }

        let key_count = index.key_count() - 1;
        index.set_key_count(key_count);

        if key_count <= 1 {
            index.set_highest(index.value());
        } else {
            index.set_highest(scratch[key_count as usize - 2]);
        }

        if key_count > 1 {
            let mut tmp = [0u8; MAX_BLOCK_PAYLOAD];
            let used = C::compress(index, &scratch[..key_count as usize - 1], &mut tmp);
            if used > payload.len() {
                return Err(BlockOverflow { required: used });
            }
            payload[..used].copy_from_slice(&tmp[..used]);
            index.set_used_size(used as u16);
        } else {
            index.set_used_size(0);
        }

        Ok(())
    }

    /// Key at `position_in_block`; O(1) for position 0.
    pub fn select(index: &BlockIndex, payload: &[u8], position_in_block: usize) -> u32 {
        if position_in_block == 0 {
            return index.value();
        }

        if C::HAS_SELECT {
            return C::select(index, payload, position_in_block - 1);
        }

        let mut scratch = [0u32; MAX_KEYS_PER_BLOCK];
        let _ = Self::decompress(index, payload, &mut scratch);
        scratch[position_in_block - 1]
    }
}
