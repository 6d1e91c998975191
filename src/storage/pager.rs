//! # Page Manager
//!
//! Allocation front end for the page layer: serves page requests from the
//! [`Freelist`] first and falls back to the device, returns freed extents
//! to the freelist, and gives the file tail back to the filesystem when the
//! trailing extents are free.
//!
//! The device itself (mmap, plain file, or a test double) lives outside
//! this crate; only the [`PageDevice`] contract is consumed here.

use eyre::Result;

use super::Freelist;

/// The device operations the page manager relies on. `allocate_aligned`
/// grows the file by `byte_count` bytes and returns the page-aligned offset
/// of the new region; `truncate` cuts the file down to `file_size`.
pub trait PageDevice {
    fn allocate_aligned(&mut self, byte_count: usize) -> Result<u64>;
    fn truncate(&mut self, file_size: u64) -> Result<()>;
}

/// Owns the freelist and a device, and decides which of the two satisfies
/// each request.
#[derive(Debug)]
pub struct PageManager<D: PageDevice> {
    device: D,
    freelist: Freelist,
}

impl<D: PageDevice> PageManager<D> {
    pub fn new(device: D, page_size: usize) -> Self {
        Self {
            device,
            freelist: Freelist::new(page_size),
        }
    }

    /// Restores a page manager whose freelist state was persisted earlier.
    pub fn open(device: D, page_size: usize, freelist_state: &[u8]) -> Result<Self> {
        let mut manager = Self::new(device, page_size);
        manager.freelist.decode_state(freelist_state)?;
        Ok(manager)
    }

    pub fn freelist(&self) -> &Freelist {
        &self.freelist
    }

    /// Serializes the freelist for the caller to persist.
    pub fn save_state(&self) -> Vec<u8> {
        self.freelist.encode_state()
    }

    /// Allocates `count` contiguous pages, reusing a free extent when one
    /// fits and growing the file otherwise.
    pub fn alloc_pages(&mut self, count: usize) -> Result<u64> {
        if let Some(address) = self.freelist.alloc(count) {
            return Ok(address);
        }
        self.device
            .allocate_aligned(count * self.freelist.page_size())
    }

    /// Returns `count` pages starting at `address` to the freelist.
    pub fn free_pages(&mut self, address: u64, count: usize) {
        self.freelist.put(address, count);
    }

    /// Truncates the file as far as the free tail extents allow; the
    /// consumed extents are dropped from the freelist. Returns the new file
    /// size.
    pub fn shrink(&mut self, file_size: u64) -> Result<u64> {
        let lower_bound = self.freelist.truncate(file_size);
        if lower_bound < file_size {
            let consumed: Vec<u64> = self.freelist.extents_at_or_above(lower_bound).collect();
            for address in consumed {
                self.freelist.remove(address);
            }
            self.device.truncate(lower_bound)?;
        }
        Ok(lower_bound)
    }
}
