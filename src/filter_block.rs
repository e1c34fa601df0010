//! Offset-indexed filter block builder.
//!
//! Filters are indexed by the *file offset* of the data block they cover,
//! not by block index: `idx = offset >> base_lg`. This lets a reader
//! recover the right filter purely from a `BlockHandle.offset`, without a
//! per-block lookup table. A block that spans multiple `2^base_lg`-byte
//! windows causes empty filters to be appended for the skipped windows.

use std::sync::Arc;

use crate::filter_policy::FilterPolicy;
use crate::infolog::Logger;
use crate::varint::put_fixed32;

/// log2 of the filter granularity: one filter segment per 2 KiB window of
/// file offsets.
pub const BASE_LG: u8 = 11;
const BASE: usize = 1 << BASE_LG as usize;

pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    logger: Option<Logger>,
    keys: Vec<u8>,
    key_starts: Vec<usize>,
    filter_offsets: Vec<u32>,
    result: Vec<u8>,
}

impl FilterBlockBuilder {
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        Self::new_with_logger(policy, None)
    }

    pub fn new_with_logger(policy: Arc<dyn FilterPolicy>, logger: Option<Logger>) -> Self {
        FilterBlockBuilder {
            policy,
            logger,
            keys: Vec::new(),
            key_starts: Vec::new(),
            filter_offsets: Vec::new(),
            result: Vec::new(),
        }
    }

    pub fn filter_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Called with the file offset a new data block will start at (or, at
    /// construction time, 0). Emits one filter per 2 KiB window already
    /// passed, including empty filters for windows no block started in.
    pub fn start_block(&mut self, file_offset: u64) {
        let want = (file_offset as usize) / BASE;
        while self.filter_offsets.len() < want {
            self.emit_filter();
        }
    }

    pub fn add_key(&mut self, key: &[u8]) {
        self.key_starts.push(self.keys.len());
        self.keys.extend_from_slice(key);
    }

    pub fn finish(&mut self) -> &[u8] {
        if !self.key_starts.is_empty() {
            self.emit_filter();
        }

        let array_start = self.result.len() as u32;
        for &off in &self.filter_offsets {
            put_fixed32(&mut self.result, off);
        }
        put_fixed32(&mut self.result, array_start);
        self.result.push(BASE_LG);

        &self.result
    }

    fn emit_filter(&mut self) {
        let segment = self.filter_offsets.len();
        self.filter_offsets.push(self.result.len() as u32);

        if self.key_starts.is_empty() {
            if let Some(l) = &self.logger {
                crate::log!(l, "filter segment {} empty, covers no keys", segment);
            }
            return;
        }

        let mut starts = self.key_starts.clone();
        starts.push(self.keys.len());
        let key_slices: Vec<&[u8]> = starts
            .windows(2)
            .map(|w| &self.keys[w[0]..w[1]])
            .collect();

        let filter = self.policy.create_filter(&key_slices);
        if let Some(l) = &self.logger {
            crate::log!(
                l,
                "filter segment {} covers {} keys, {} filter bytes",
                segment,
                key_slices.len(),
                filter.len()
            );
        }
        self.result.extend_from_slice(&filter);

        self.keys.clear();
        self.key_starts.clear();
    }
}

/// Decodes a finished filter block for the purpose of probing it by data
/// block offset. This is the minimal read-side counterpart needed to test
/// the builder end-to-end; a caching, general-purpose reader is out of
/// scope.
pub struct FilterBlockReader<'a> {
    data: &'a [u8],
    offsets_start: usize,
    num_offsets: usize,
    base_lg: u8,
}

impl<'a> FilterBlockReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert!(data.len() >= 5, "filter block too short");
        let base_lg = data[data.len() - 1];
        let array_start = crate::varint::get_fixed32(&data[data.len() - 5..data.len() - 1]) as usize;
        let num_offsets = (data.len() - 5 - array_start) / 4;
        FilterBlockReader {
            data,
            offsets_start: array_start,
            num_offsets,
            base_lg,
        }
    }

    fn filter_bytes_for_index(&self, index: usize) -> &'a [u8] {
        if index >= self.num_offsets {
            return &[];
        }
        let start =
            crate::varint::get_fixed32(&self.data[self.offsets_start + 4 * index..]) as usize;
        let end = if index + 1 < self.num_offsets {
            crate::varint::get_fixed32(&self.data[self.offsets_start + 4 * (index + 1)..]) as usize
        } else {
            self.offsets_start
        };
        &self.data[start..end]
    }

    /// Returns whether the filter covering `block_offset` may contain
    /// `key`, by mapping the offset down to its filter index with
    /// `offset >> base_lg`.
    pub fn may_match(&self, block_offset: u64, key: &[u8], policy: &dyn FilterPolicy) -> bool {
        let index = (block_offset >> self.base_lg) as usize;
        let filter = self.filter_bytes_for_index(index);
        if filter.is_empty() {
            return false;
        }
        policy.key_may_match(key, filter)
    }
}
