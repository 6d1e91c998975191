//! # Plain Block Codec
//!
//! Stores a block body as raw little-endian u32 words. Nothing shrinks, but
//! the compressed form is directly addressable, so lookups run on the wire
//! bytes without a decompression pass: the codec advertises native
//! `find_lower_bound` and `select`.
//!
//! Useful as the baseline codec for incompressible key distributions and as
//! the reference implementation the adapter's generic path is tested
//! against.

use super::codec::BlockCodec;
use super::index::BlockIndex;

/// Identity "compression": four bytes per body key, little-endian.
pub struct PlainCodec;

#[inline]
fn word_at(payload: &[u8], slot: usize) -> u32 {
    u32::from_le_bytes(
        payload[slot * 4..slot * 4 + 4]
            .try_into()
            .expect("4-byte slice"),
    )
}

impl BlockCodec for PlainCodec {
    const HAS_FIND_LOWER_BOUND: bool = true;
    const HAS_SELECT: bool = true;

    const INITIAL_BLOCK_SIZE: usize = 16;

    fn compress(_index: &BlockIndex, keys: &[u32], out: &mut [u8]) -> usize {
        for (i, &key) in keys.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&key.to_le_bytes());
        }
        keys.len() * 4
    }

    fn decompress(index: &BlockIndex, payload: &[u8], out: &mut [u32]) -> usize {
        let n = index.key_count() as usize - 1;
        for (i, slot) in out[..n].iter_mut().enumerate() {
            *slot = word_at(payload, i);
        }
        n
    }

    fn estimate_required_size(index: &BlockIndex, _payload: &[u8], _key: u32) -> usize {
        // body grows by exactly one word
        index.key_count() as usize * 4
    }

    fn find_lower_bound(index: &BlockIndex, payload: &[u8], key: u32) -> (usize, u32) {
        let n = index.key_count() as usize - 1;
        if n == 0 {
            return (0, index.value());
        }

        // binary search directly on the wire words
        let mut lo = 0;
        let mut hi = n;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if word_at(payload, mid) < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }

        (lo, word_at(payload, lo.min(n - 1)))
    }

    fn select(_index: &BlockIndex, payload: &[u8], slot: usize) -> u32 {
        word_at(payload, slot)
    }
}
