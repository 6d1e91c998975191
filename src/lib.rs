//! # PackDB - Embedded Key/Value Store Core
//!
//! PackDB implements the storage core of an embedded, single-process
//! key/value store built around a persistent B+tree whose leaf nodes keep
//! their keys in block-compressed form. This crate prioritizes:
//!
//! - **Zero-copy page access**: key lists operate directly on page memory
//! - **Zero allocation on the hot path**: fixed-size stack scratch buffers
//! - **Compact leaves**: delta-coded key blocks fit thousands of keys per page
//!
//! ## Quick Start
//!
//! ```
//! use packdb::keylist::{BlockKeyList, VarbyteCodec};
//!
//! let mut page = vec![0u8; 512];
//! let mut keys: BlockKeyList<VarbyteCodec> = BlockKeyList::create(&mut page).unwrap();
//!
//! keys.insert(0, 10).unwrap();
//! keys.insert(1, 20).unwrap();
//! keys.insert(2, 15).unwrap();
//!
//! assert_eq!(keys.find(15), Some(1));
//! assert_eq!(keys.key_at(2).unwrap(), 20);
//! ```
//!
//! ## Architecture
//!
//! The crate covers the two subsystems below the B+tree node layer:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     B+tree node layer (external)        │
//! ├────────────────────┬────────────────────┤
//! │   Block Key List   │    Page Manager    │
//! ├────────────────────┼────────────────────┤
//! │   Codec Adapter    │      Freelist      │
//! ├────────────────────┼────────────────────┤
//! │   Block Codecs     │ Page Device (trait)│
//! └────────────────────┴────────────────────┘
//! ```
//!
//! A **block key list** owns a byte range inside a leaf page and partitions
//! its sorted `u32` keys into variable-sized compressed blocks, described by
//! a packed index table at the front of the range. Codecs encode and decode
//! individual blocks; the adapter bridges codecs that only know how to
//! compress into the full key-list contract.
//!
//! The **freelist** tracks freed multi-page extents of the database file and
//! serves first-fit allocations; the **page manager** glues it to the device
//! that actually grows and truncates the file.
//!
//! ## Module Overview
//!
//! - [`keylist`]: block-compressed key lists, codecs, and the codec adapter
//! - [`storage`]: freelist, page manager, and the page device interface
//! - [`encoding`]: variable-length integer primitives used by the codecs
//! - [`stats`]: min/max/avg metrics sink fed by `fill_metrics`
//! - [`config`]: crate-wide tuning constants
//! - [`error`]: error kinds shared by the key list and its callers

pub mod config;
pub mod encoding;
pub mod error;
pub mod keylist;
pub mod stats;
pub mod storage;

pub use error::ErrorKind;
pub use keylist::{BlockCodec, BlockIndex, BlockKeyList, PlainCodec, VarbyteCodec};
pub use storage::{Freelist, PageDevice, PageManager};
