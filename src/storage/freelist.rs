//! # Freelist Management
//!
//! This module tracks freed multi-page extents of the database file. When
//! pages are deleted (a dropped tree, a removed blob, a merged node chain)
//! their extent is recorded here rather than returned to the filesystem, so
//! later allocations can reuse the space without growing the file.
//!
//! ## Data Model
//!
//! The freelist is a map from `file_offset` to `page_count`, one entry per
//! free extent. Offsets are multiples of the page size; counts are
//! positive. Entries are kept in offset order, which makes first-fit
//! allocation a forward walk and tail detection a backward walk. Adjacent
//! extents are not coalesced on insert; `truncate` walks abutting tail
//! extents explicitly.
//!
//! ## Allocation Strategy
//!
//! `alloc` performs a first-fit scan:
//! 1. An extent of exactly the requested size is removed and returned.
//! 2. A larger extent is split: the tail remainder is re-recorded at
//!    `offset + requested * page_size`, the head is returned.
//! 3. If nothing fits, the caller grows the file through the page device.
//!
//! Hit and miss counters feed the environment's statistics.
//!
//! ## Persisted Format
//!
//! The freelist state is stored as a little-endian u32 entry count followed
//! by one record per entry:
//!
//! ```text
//! +--------+-----------------------------+
//! | tag    | high nibble: page count 1-15|
//! | 1 byte | low nibble:  0-8 id bytes   |
//! +--------+-----------------------------+
//! | id     | page id, little-endian,     |
//! | 0-8 B  | as many bytes as the tag    |
//! |        | says                        |
//! +--------+-----------------------------+
//! ```
//!
//! The stored id is a page number; the in-memory key is `id * page_size`.
//! Extents wider than 15 pages are emitted as several consecutive records.
//! A zero page count is invalid and rejected on decode.
//!
//! ## Thread Safety
//!
//! The freelist is not thread-safe on its own; the owning environment
//! serializes access to it together with the rest of the page layer.

use std::collections::BTreeMap;

use eyre::{ensure, Result};

/// In-memory map of free extents in the database file.
#[derive(Debug)]
pub struct Freelist {
    free_pages: BTreeMap<u64, usize>,
    page_size: usize,
    hits: u64,
    misses: u64,
}

impl Freelist {
    pub fn new(page_size: usize) -> Self {
        Self {
            free_pages: BTreeMap::new(),
            page_size,
            hits: 0,
            misses: 0,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of recorded extents.
    pub fn extent_count(&self) -> usize {
        self.free_pages.len()
    }

    /// Total free pages across all extents.
    pub fn free_page_count(&self) -> usize {
        self.free_pages.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.free_pages.is_empty()
    }

    /// Successful allocations served from the freelist.
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Allocations that fell through to the device.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// First-fit allocation of `num_pages` contiguous pages. Larger extents
    /// are split; the remainder stays recorded.
    pub fn alloc(&mut self, num_pages: usize) -> Option<u64> {
        debug_assert!(num_pages > 0);

        let found = self
            .free_pages
            .iter()
            .find(|(_, &count)| count >= num_pages)
            .map(|(&address, &count)| (address, count));

        match found {
            Some((address, count)) => {
                self.free_pages.remove(&address);
                if count > num_pages {
                    let remainder = address + (num_pages * self.page_size) as u64;
                    self.free_pages.insert(remainder, count - num_pages);
                }
                self.hits += 1;
                Some(address)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Records a free extent of `page_count` pages at `address`.
    pub fn put(&mut self, address: u64, page_count: usize) {
        debug_assert!(page_count > 0);
        debug_assert_eq!(address % self.page_size as u64, 0);
        self.free_pages.insert(address, page_count);
    }

    /// Membership test by exact extent offset.
    pub fn has(&self, address: u64) -> bool {
        self.free_pages.contains_key(&address)
    }

    /// Removes the extent at `address`, returning its page count.
    pub fn remove(&mut self, address: u64) -> Option<usize> {
        self.free_pages.remove(&address)
    }

    /// Offsets of all extents starting at or above `address`, ascending.
    pub fn extents_at_or_above(&self, address: u64) -> impl Iterator<Item = u64> + '_ {
        self.free_pages.range(address..).map(|(&offset, _)| offset)
    }

    /// Computes how far the file can be truncated: walks extents from the
    /// top and lowers the bound over every extent that ends exactly at it.
    /// The caller truncates the file and removes the consumed extents.
    pub fn truncate(&self, file_size: u64) -> u64 {
        let mut lower_bound = file_size;

        for (&address, &count) in self.free_pages.iter().rev() {
            if address + (count * self.page_size) as u64 == lower_bound {
                lower_bound = address;
            }
        }

        lower_bound
    }

    /// Parses the persisted representation and merges it into the map.
    pub fn decode_state(&mut self, bytes: &[u8]) -> Result<()> {
        ensure!(bytes.len() >= 4, "freelist state truncated");
        let count = u32::from_le_bytes(bytes[0..4].try_into().expect("4-byte slice"));
        let mut data = &bytes[4..];

        for i in 0..count {
            ensure!(!data.is_empty(), "freelist state truncated at entry {}", i);
            let tag = data[0];
            let page_count = (tag >> 4) as usize;
            let num_bytes = (tag & 0x0F) as usize;
            ensure!(page_count > 0, "freelist entry {} has a zero page count", i);
            ensure!(num_bytes <= 8, "freelist entry {} has {} id bytes", i, num_bytes);
            data = &data[1..];

            ensure!(
                data.len() >= num_bytes,
                "freelist state truncated at entry {}",
                i
            );
            let mut page_id = 0u64;
            for (shift, &byte) in data[..num_bytes].iter().enumerate() {
                page_id |= (byte as u64) << (shift * 8);
            }
            data = &data[num_bytes..];

            self.free_pages
                .insert(page_id * self.page_size as u64, page_count);
        }

        tracing::debug!(
            extents = self.free_pages.len(),
            trailing = data.len(),
            "decoded freelist state"
        );
        Ok(())
    }

    /// Produces the persisted representation parsed by
    /// [`Self::decode_state`]. Extents wider than 15 pages span several
    /// records.
    pub fn encode_state(&self) -> Vec<u8> {
        let mut out = vec![0u8; 4];
        let mut entries = 0u32;

        for (&address, &count) in self.free_pages.iter() {
            let mut page_id = address / self.page_size as u64;
            let mut remaining = count;
            while remaining > 0 {
                let chunk = remaining.min(15);
                let num_bytes = if page_id == 0 {
                    0
                } else {
                    (64 - page_id.leading_zeros() as usize).div_ceil(8)
                };
                out.push(((chunk as u8) << 4) | num_bytes as u8);
                out.extend_from_slice(&page_id.to_le_bytes()[..num_bytes]);

                page_id += chunk as u64;
                remaining -= chunk;
                entries += 1;
            }
        }

        out[0..4].copy_from_slice(&entries.to_le_bytes());
        out
    }
}
