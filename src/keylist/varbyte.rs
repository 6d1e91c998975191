//! # Varbyte Block Codec
//!
//! Delta-codes a block body as variable-length bytes: each key is stored as
//! the difference to its predecessor (the first body key differs from the
//! index-resident `value`), encoded with [`crate::encoding::varbyte`].
//!
//! Dense key ranges collapse to one byte per key; the worst case is five
//! bytes per key. The codec carries no native operations, so every mutation
//! goes through the adapter's decompress/operate/recompress path.

use crate::config::MAX_VARBYTE_LEN;
use crate::encoding::varbyte::{decode_varbyte, encode_varbyte};

use super::codec::BlockCodec;
use super::index::BlockIndex;

/// Delta + varbyte compression for monotonically increasing u32 blocks.
pub struct VarbyteCodec;

impl BlockCodec for VarbyteCodec {
    const INITIAL_BLOCK_SIZE: usize = 16;

    fn compress(index: &BlockIndex, keys: &[u32], out: &mut [u8]) -> usize {
        let mut prev = index.value();
        let mut pos = 0;
        for &key in keys {
            debug_assert!(key > prev, "block keys must be strictly increasing");
            pos += encode_varbyte(key - prev, &mut out[pos..]);
            prev = key;
        }
        pos
    }

    fn decompress(index: &BlockIndex, payload: &[u8], out: &mut [u32]) -> usize {
        let n = index.key_count() as usize - 1;
        let mut prev = index.value();
        let mut pos = 0;
        for slot in out[..n].iter_mut() {
            let (delta, read) = decode_varbyte(&payload[pos..])
                .expect("block payload written by compress is well-formed");
            prev += delta;
            pos += read;
            *slot = prev;
        }
        n
    }

    fn estimate_required_size(index: &BlockIndex, _payload: &[u8], _key: u32) -> usize {
        // inserting splits one delta in two; the new delta is at most five
        // bytes and the re-encoded remainder never exceeds its old width
        index.used_size() as usize + MAX_VARBYTE_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_KEYS_PER_BLOCK;

    fn block_for(keys: &[u32]) -> BlockIndex {
        let mut index = BlockIndex::new(0, 64);
        index.set_value(keys[0]);
        index.set_highest(*keys.last().unwrap());
        index.set_key_count(keys.len() as u16);
        index
    }

    #[test]
    fn compress_then_decompress_restores_body() {
        let keys = [100u32, 101, 150, 4096, 70_000, u32::MAX];
        let index = block_for(&keys);
        let mut payload = [0u8; 64];

        let used = VarbyteCodec::compress(&index, &keys[1..], &mut payload);
        assert!(used > 0 && used <= 64);

        let mut out = [0u32; MAX_KEYS_PER_BLOCK];
        let n = VarbyteCodec::decompress(&index, &payload, &mut out);

        assert_eq!(&out[..n], &keys[1..]);
    }

    #[test]
    fn dense_keys_compress_to_one_byte_each() {
        let keys: Vec<u32> = (500..540).collect();
        let index = block_for(&keys);
        let mut payload = [0u8; 64];

        let used = VarbyteCodec::compress(&index, &keys[1..], &mut payload);

        assert_eq!(used, keys.len() - 1);
    }

    #[test]
    fn estimate_covers_any_single_insert() {
        let keys = [10u32, 200, 3000, 40_000, 500_000];
        let mut index = block_for(&keys);
        let mut payload = [0u8; 64];
        let used = VarbyteCodec::compress(&index, &keys[1..], &mut payload);
        index.set_used_size(used as u16);

        let estimate = VarbyteCodec::estimate_required_size(&index, &payload, 250_000);

        // re-encode with the key inserted; the estimate must be an upper bound
        let mut grown = keys.to_vec();
        grown.push(250_000);
        grown.sort_unstable();
        index.set_key_count(grown.len() as u16);
        let regrown = VarbyteCodec::compress(&index, &grown[1..], &mut payload);

        assert!(regrown <= estimate, "{} > {}", regrown, estimate);
    }
}
