//! Table builder configuration.
//!
//! Carried as an `Arc`-backed, `Clone`-able value so `TableBuilder::
//! change_options` can hot-swap it mid-build.

use std::sync::Arc;

use crate::comparator::{BytewiseComparator, Comparator};
use crate::compression::CompressionType;
use crate::filter_policy::FilterPolicy;

#[derive(Clone)]
pub struct Options {
    pub comparator: Arc<dyn Comparator>,
    pub block_size: usize,
    pub block_restart_interval: usize,
    pub compression: CompressionType,
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            comparator: Arc::new(BytewiseComparator),
            block_size: 4 << 10,
            block_restart_interval: 16,
            compression: CompressionType::Snappy,
            filter_policy: None,
        }
    }
}
