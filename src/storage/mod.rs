//! # Storage Module
//!
//! Page-level bookkeeping for the database file: which multi-page extents
//! are free, how allocations are satisfied from them, and when the file
//! tail can be given back to the filesystem.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ PageManager     alloc/free/shrink entry point│
//! ├───────────────────────┬──────────────────────┤
//! │ Freelist              │ PageDevice (trait)   │
//! │ in-memory extent map  │ grows/truncates the  │
//! │                       │ actual file          │
//! └───────────────────────┴──────────────────────┘
//! ```
//!
//! The [`Freelist`] is a pure in-memory structure; durability is the page
//! layer's concern. The device implementation (mmap, plain file, test
//! double) lives outside this crate and is consumed through the
//! [`PageDevice`] trait only.
//!
//! ## Thread Safety
//!
//! None of these types synchronize; the embedding environment holds its
//! mutex around every call, as it does for the key lists.

mod freelist;
mod pager;

pub use freelist::Freelist;
pub use pager::{PageDevice, PageManager};
