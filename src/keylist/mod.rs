//! # Block-Compressed Key Lists
//!
//! This module implements the key side of a B+tree leaf node: all keys of
//! the node, stored as delta-compressed blocks inside a byte range on the
//! page.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ BlockKeyList      range header, index table, │
//! │                   block split/merge/grow,    │
//! │                   vacuumize, integrity       │
//! ├──────────────────────────────────────────────┤
//! │ CodecOps          capability dispatch +      │
//! │                   decompress/operate/        │
//! │                   recompress fallback        │
//! ├──────────────────────────────────────────────┤
//! │ BlockCodec        pure per-block encoding    │
//! │ (varbyte, plain)                             │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! A node's sorted `u32` keys are partitioned into blocks of at most
//! [`crate::config::MAX_KEYS_PER_BLOCK`] keys. Each block stores its first
//! key in a packed [`BlockIndex`] record and the remainder delta-coded in a
//! payload region behind the index table. Lookups scan the small index
//! table linearly, then search one block; only that block is ever decoded.
//!
//! ## Choosing a Codec
//!
//! - [`VarbyteCodec`]: default; one to five bytes per key, dense ranges
//!   collapse to one byte per key
//! - [`PlainCodec`]: four bytes per key, but searches and selects run
//!   directly on the wire form without decoding
//!
//! ## Thread Safety
//!
//! A key list is a transient view borrowing page memory; the page cache or
//! environment above serializes access. Nothing here blocks or suspends.

pub mod codec;
mod index;
mod list;
mod plain;
mod varbyte;

pub use codec::{BlockCodec, BlockOverflow, CodecOps};
pub use index::{BlockIndex, BLOCK_INDEX_SIZE};
pub use list::{BlockKeyList, LowerBound, ScanVisitor};
pub use plain::PlainCodec;
pub use varbyte::VarbyteCodec;
