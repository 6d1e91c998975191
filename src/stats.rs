//! # Statistics Sink
//!
//! Size metrics emitted by `fill_metrics` on the key list. Updates are
//! fire-and-forget: the emitting code hands samples to a [`MetricsSink`]
//! and never reads them back, so tests and embedders that do not care pass
//! a [`NoopSink`].

/// The metrics a key list reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Bytes occupied by the block index table of one node.
    KeyListIndexBytes,
    /// Number of blocks in one node.
    KeyListBlocksPerPage,
    /// Reserved payload bytes of one block.
    KeyListBlockSize,
    /// Bytes of the range not occupied by index records or payloads.
    KeyListUnusedBytes,
}

/// Receiver for metric samples.
pub trait MetricsSink {
    fn update_min_max_avg(&mut self, metric: Metric, sample: u32);
}

/// Sink that drops every sample.
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn update_min_max_avg(&mut self, _metric: Metric, _sample: u32) {}
}

/// Running minimum/maximum/average of one metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinMaxAvg {
    min: u32,
    max: u32,
    total: u64,
    count: u64,
}

impl MinMaxAvg {
    pub fn record(&mut self, sample: u32) {
        if self.count == 0 || sample < self.min {
            self.min = sample;
        }
        if sample > self.max {
            self.max = sample;
        }
        self.total += sample as u64;
        self.count += 1;
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn avg(&self) -> u32 {
        if self.count == 0 {
            0
        } else {
            (self.total / self.count) as u32
        }
    }
}

/// Aggregated key-list metrics across the nodes of a tree.
#[derive(Debug, Default)]
pub struct KeyListMetrics {
    pub index_bytes: MinMaxAvg,
    pub blocks_per_page: MinMaxAvg,
    pub block_size: MinMaxAvg,
    pub unused_bytes: MinMaxAvg,
}

impl MetricsSink for KeyListMetrics {
    fn update_min_max_avg(&mut self, metric: Metric, sample: u32) {
        match metric {
            Metric::KeyListIndexBytes => self.index_bytes.record(sample),
            Metric::KeyListBlocksPerPage => self.blocks_per_page.record(sample),
            Metric::KeyListBlockSize => self.block_size.record(sample),
            Metric::KeyListUnusedBytes => self.unused_bytes.record(sample),
        }
    }
}
