//! The append-only file abstraction the table builder writes through.
//!
//! Trimmed to the two operations a table build ever needs: sequential
//! appends and flush. Seeking backwards is never required -- the builder
//! only ever grows the file.

use std::fs::File;
use std::io::Write;

use crate::error::{Result, Status};

/// A sequential, append-only sink. The table builder never seeks; it only
/// appends bytes and occasionally asks the sink to flush so that readers
/// opening the file after a successful `finish()` observe durable bytes at
/// least to this layer.
pub trait WritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

impl WritableFile for File {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.write_all(data).map_err(Status::from)
    }

    fn flush(&mut self) -> Result<()> {
        Write::flush(self).map_err(Status::from)
    }
}

/// An in-memory sink, useful for tests and for callers who want to build a
/// table entirely in memory before deciding whether to persist it.
#[derive(Default, Debug, Clone)]
pub struct MemSink {
    pub buf: Vec<u8>,
}

impl MemSink {
    pub fn new() -> Self {
        MemSink::default()
    }
}

impl WritableFile for MemSink {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A sink that fails every append after `fail_after` successful calls,
/// used to exercise the builder's error-latch behavior.
pub struct FlakySink {
    pub buf: Vec<u8>,
    pub fail_after: usize,
    calls: usize,
}

impl FlakySink {
    pub fn new(fail_after: usize) -> Self {
        FlakySink {
            buf: Vec::new(),
            fail_after,
            calls: 0,
        }
    }
}

impl WritableFile for FlakySink {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        if self.calls >= self.fail_after {
            return Err(Status::new(
                crate::error::StatusCode::IOError,
                "simulated write failure",
            ));
        }
        self.calls += 1;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
