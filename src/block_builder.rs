//! Restart-prefix block encoder.
//!
//! Produces the byte layout shared by data blocks, the meta-index block, and
//! the index block: a sequence of prefix-compressed entries, a restart-point
//! array, and a trailing restart count.

use crate::comparator::Comparator;
use crate::varint::{get_fixed32, get_varint32, put_fixed32, put_varint32};

/// Builds one block's payload: a sequence of prefix-compressed entries
/// followed by a restart-point array and a restart count. The encoding is
/// deterministic -- identical input yields identical bytes.
pub struct BlockBuilder {
    restart_interval: usize,
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    counter: usize,
    finished: bool,
    last_key: Vec<u8>,
}

impl BlockBuilder {
    pub fn new(restart_interval: usize) -> Self {
        BlockBuilder {
            restart_interval: restart_interval.max(1),
            buffer: Vec::new(),
            restarts: vec![0],
            counter: 0,
            finished: false,
            last_key: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.finished = false;
        self.last_key.clear();
    }

    pub fn empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Changes the restart cadence. Takes effect at the next restart point,
    /// not retroactively -- entries already buffered keep whatever sharing
    /// decision was made when they were added.
    pub fn set_restart_interval(&mut self, restart_interval: usize) {
        self.restart_interval = restart_interval.max(1);
    }

    /// Appends one key/value entry. `key` must compare greater than the
    /// previously added key, if any.
    pub fn add(&mut self, key: &[u8], value: &[u8], cmp: &dyn Comparator) {
        assert!(!self.finished, "add() called on a finished BlockBuilder");
        assert!(
            self.last_key.is_empty() || cmp.compare(&self.last_key, key) == std::cmp::Ordering::Less,
            "keys added to a block must be strictly ascending"
        );

        let shared = if self.counter < self.restart_interval {
            longest_common_prefix(&self.last_key, key)
        } else {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };

        let non_shared = key.len() - shared;

        put_varint32(&mut self.buffer, shared as u32);
        put_varint32(&mut self.buffer, non_shared as u32);
        put_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.counter += 1;
    }

    /// Finalizes the block, appending the restart array and count, and
    /// returns the full payload. The builder is left in a finished state;
    /// call `reset()` before reusing it.
    pub fn finish(&mut self) -> &[u8] {
        for &restart in &self.restarts {
            put_fixed32(&mut self.buffer, restart);
        }
        put_fixed32(&mut self.buffer, self.restarts.len() as u32);
        self.finished = true;
        &self.buffer
    }

    /// A conservative running estimate of what `finish()` would currently
    /// produce, used by the table builder to decide when to cut a block.
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + 4 * (self.restarts.len() + 1)
    }
}

fn longest_common_prefix(a: &[u8], b: &[u8]) -> usize {
    let max = a.len().min(b.len());
    let mut i = 0;
    while i < max && a[i] == b[i] {
        i += 1;
    }
    i
}

/// One decoded block entry, used only by the test-oriented decode path
/// below (and by `filter_block`'s meta-index lookups in tests). A full
/// table reader with seeking/caching is out of scope for this crate.
#[derive(Debug, PartialEq, Eq)]
pub struct DecodedEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Decodes every entry out of a finished block payload, reconstructing full
/// keys from their shared prefixes. Used by tests to assert round-trips;
/// not a general-purpose reader (no seeking, no restart-array binary
/// search).
pub fn decode_entries(payload: &[u8]) -> Vec<DecodedEntry> {
    let num_restarts = get_fixed32(&payload[payload.len() - 4..]) as usize;
    let restarts_off = payload.len() - 4 * (num_restarts + 1);

    let mut out = Vec::new();
    let mut offset = 0;
    let mut last_key: Vec<u8> = Vec::new();

    while offset < restarts_off {
        let (shared, n1) = get_varint32(&payload[offset..]).unwrap();
        offset += n1;
        let (non_shared, n2) = get_varint32(&payload[offset..]).unwrap();
        offset += n2;
        let (value_len, n3) = get_varint32(&payload[offset..]).unwrap();
        offset += n3;

        let mut key = Vec::with_capacity(shared as usize + non_shared as usize);
        key.extend_from_slice(&last_key[..shared as usize]);
        key.extend_from_slice(&payload[offset..offset + non_shared as usize]);
        offset += non_shared as usize;

        let value = payload[offset..offset + value_len as usize].to_vec();
        offset += value_len as usize;

        last_key = key.clone();
        out.push(DecodedEntry { key, value });
    }

    out
}

/// Returns the byte offsets (within the payload) of each restart point.
pub fn decode_restarts(payload: &[u8]) -> Vec<u32> {
    let num_restarts = get_fixed32(&payload[payload.len() - 4..]) as usize;
    let restarts_off = payload.len() - 4 * (num_restarts + 1);
    (0..num_restarts)
        .map(|i| get_fixed32(&payload[restarts_off + 4 * i..]))
        .collect()
}
