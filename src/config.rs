//! # PackDB Configuration Constants
//!
//! This module centralizes the crate-wide tuning constants. Constants that
//! depend on each other are co-located and their relationships documented to
//! prevent mismatch bugs.
//!
//! ## Dependency Graph
//!
//! ```text
//! MAX_KEYS_PER_BLOCK (256)
//!       │
//!       ├─> Decompression scratch buffers: [u32; MAX_KEYS_PER_BLOCK]
//!       │     Every codec path decodes a block body into one of these,
//!       │     so a block may never hold more keys than this.
//!       │
//!       └─> MAX_BLOCK_PAYLOAD (derived: MAX_KEYS_PER_BLOCK * MAX_VARBYTE_LEN)
//!             Upper bound on the compressed size of one block; sizes the
//!             stack buffer used to recompress before committing to the page.
//!
//! MAX_VARBYTE_LEN (5)
//!       │
//!       └─> Worst-case encoded size of one u32 delta. Drives the varbyte
//!           codec's insertion size estimate.
//!
//! KEY_LIST_OVERHEAD (8)
//!       │
//!       └─> The two u32 header fields (block_count, used_size) at the
//!           front of every key-list range.
//!
//! DEFAULT_PAGE_SIZE (16384)
//!       │
//!       └─> Freelist extents and device allocations are multiples of this.
//! ```
//!
//! ## Critical Invariants
//!
//! Enforced by the compile-time assertions at the bottom of this file:
//!
//! 1. `MAX_KEYS_PER_BLOCK` fits the u16 `key_count` field of a block index
//! 2. `MAX_BLOCK_PAYLOAD` fits the u16 `block_size`/`used_size` fields
//! 3. The split pivot alignment divides `MAX_KEYS_PER_BLOCK`

/// Maximum number of keys (including the index-resident first value) a
/// single block may hold before insertion forces a block split.
pub const MAX_KEYS_PER_BLOCK: usize = 256;

/// Worst-case encoded length of a single u32 varbyte delta.
pub const MAX_VARBYTE_LEN: usize = 5;

/// Upper bound on the compressed payload of one block.
pub const MAX_BLOCK_PAYLOAD: usize = MAX_KEYS_PER_BLOCK * MAX_VARBYTE_LEN;

/// Static overhead at the front of a key-list range: the u32 block count
/// followed by the u32 used size.
pub const KEY_LIST_OVERHEAD: usize = 8;

/// Per-key size estimate reported to the node capacity planner. Kept
/// deliberately low so the planner assumes blocks compress well; an
/// over-full node surfaces as a *limits reached* insert instead.
pub const ESTIMATED_KEY_SIZE: usize = 3;

/// Block-split pivots are aligned down to a multiple of this, so codecs
/// with SIMD-friendly group layouts keep their alignment after a split.
pub const SPLIT_PIVOT_ALIGN: usize = 4;

/// Default page size of the database file.
pub const DEFAULT_PAGE_SIZE: usize = 16384;

const _: () = assert!(MAX_KEYS_PER_BLOCK <= u16::MAX as usize);
const _: () = assert!(MAX_BLOCK_PAYLOAD <= u16::MAX as usize);
const _: () = assert!(MAX_KEYS_PER_BLOCK % SPLIT_PIVOT_ALIGN == 0);
const _: () = assert!(SPLIT_PIVOT_ALIGN.is_power_of_two());
