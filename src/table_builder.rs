//! Table builder: the assembler state machine that interleaves data blocks,
//! an optional filter block, a meta-index, an index block, and a footer
//! into one immutable sorted table.
//!
//! The index's separator key is computed via an explicit
//! `pending_index_entry` flag plus a stashed `BlockHandle`, rather than by
//! threading the next key directly into the block write: this is what lets
//! `finish()` fall back to `find_short_successor` when there turns out to be
//! no next key.

use std::cmp::Ordering;

use crate::block_builder::BlockBuilder;
use crate::block_handle::{BlockHandle, Footer};
use crate::compression::{CompressionType, Compressor, SnappyCompressor};
use crate::crc::{crc32c_extend, mask};
use crate::error::{Status, StatusCode};
use crate::file_sink::WritableFile;
use crate::filter_block::FilterBlockBuilder;
use crate::infolog::Logger;
use crate::options::Options;

/// Trailer appended after every block's payload on disk: one compression
/// type byte plus a 4-byte masked CRC32C.
const BLOCK_TRAILER_LEN: usize = 5;

pub struct TableBuilder<W: WritableFile> {
    opt: Options,
    file: W,
    logger: Option<Logger>,

    offset: u64,
    status: Status,
    closed: bool,

    data_block: BlockBuilder,
    index_block: BlockBuilder,
    filter_block: Option<FilterBlockBuilder>,

    last_key: Vec<u8>,
    num_entries: u64,

    pending_index_entry: bool,
    pending_handle: BlockHandle,
}

impl<W: WritableFile> TableBuilder<W> {
    pub fn new(opt: Options, file: W) -> Self {
        Self::new_with_logger(opt, file, None)
    }

    pub fn new_with_logger(opt: Options, file: W, logger: Option<Logger>) -> Self {
        let filter_block = opt.filter_policy.clone().map(|policy| {
            let mut fb = FilterBlockBuilder::new_with_logger(policy, logger.clone());
            fb.start_block(0);
            fb
        });

        TableBuilder {
            data_block: BlockBuilder::new(opt.block_restart_interval),
            index_block: BlockBuilder::new(1),
            filter_block,
            opt,
            file,
            logger,
            offset: 0,
            status: Status::ok(),
            closed: false,
            last_key: Vec::new(),
            num_entries: 0,
            pending_index_entry: false,
            pending_handle: BlockHandle::default(),
        }
    }

    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    pub fn file_size(&self) -> u64 {
        self.offset
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Swaps in new options. Fails if the comparator changed -- an
    /// in-progress table's index and data blocks are already ordered under
    /// the old one. Other fields (block size, restart interval,
    /// compression, filter policy) take effect immediately; a live data
    /// block observes the new restart interval starting at its next
    /// restart point.
    pub fn change_options(&mut self, new_opt: Options) -> Status {
        if new_opt.comparator.name() != self.opt.comparator.name() {
            return Status::new(
                StatusCode::InvalidArgument,
                "cannot change comparator mid-build",
            );
        }
        self.data_block
            .set_restart_interval(new_opt.block_restart_interval);
        self.opt = new_opt;
        Status::ok()
    }

    /// Adds one key/value pair. `key` must compare strictly greater than
    /// the last key added.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        assert!(!self.closed, "add() called after finish()/abandon()");
        if !self.status.is_ok() {
            return;
        }

        if self.num_entries > 0 {
            assert_eq!(
                self.opt.comparator.compare(key, &self.last_key),
                Ordering::Greater,
                "keys must be added to a table in strictly ascending order"
            );
        }

        if self.pending_index_entry {
            assert!(
                self.data_block.empty(),
                "pending_index_entry implies the current data block is empty"
            );
            let mut sep = self.last_key.clone();
            self.opt.comparator.find_shortest_separator(&mut sep, key);
            let mut handle_enc = Vec::new();
            self.pending_handle.encode(&mut handle_enc);
            self.index_block
                .add(&sep, &handle_enc, self.opt.comparator.as_ref());
            self.pending_index_entry = false;
        }

        if let Some(fb) = &mut self.filter_block {
            fb.add_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block
            .add(key, value, self.opt.comparator.as_ref());

        if self.data_block.current_size_estimate() >= self.opt.block_size {
            self.flush();
        }
    }

    /// Finalizes the current data block (if non-empty) and writes it out.
    pub fn flush(&mut self) {
        assert!(!self.closed, "flush() called after finish()/abandon()");
        if self.data_block.empty() {
            return;
        }
        assert!(
            !self.pending_index_entry,
            "flush() called with an index entry still pending"
        );

        let raw = self.data_block.finish().to_vec();
        self.data_block.reset();

        let handle = self.write_block(raw);
        self.pending_handle = handle;
        self.pending_index_entry = true;

        if self.status.is_ok() {
            if let Err(e) = self.file.flush() {
                self.status = e;
            }
        }

        if let Some(fb) = &mut self.filter_block {
            fb.start_block(self.offset);
        }

        if let Some(l) = &self.logger {
            crate::log!(l, "flushed data block at offset {}", handle.offset);
        }
    }

    /// Compresses (if configured and worthwhile) and writes a finished
    /// block's payload, returning its handle.
    fn write_block(&mut self, raw: Vec<u8>) -> BlockHandle {
        let raw_len = raw.len();
        let (bytes, ctype) = match self.opt.compression {
            CompressionType::Snappy => match SnappyCompressor.compress(&raw) {
                Some(compressed) if compressed.len() < raw.len() - raw.len() / 8 => {
                    (compressed, CompressionType::Snappy)
                }
                _ => {
                    if let Some(l) = &self.logger {
                        crate::log!(
                            l,
                            "compression did not save 12.5%, storing {} bytes uncompressed",
                            raw_len
                        );
                    }
                    (raw, CompressionType::None)
                }
            },
            CompressionType::None => (raw, CompressionType::None),
        };
        self.write_raw_block(&bytes, ctype)
    }

    /// Appends `bytes` plus its 5-byte trailer to the file, returning the
    /// handle covering just the payload bytes (trailer excluded). `offset`
    /// only advances by bytes actually appended to the sink -- if either
    /// append fails, the latched error leaves `offset` exactly where it was.
    fn write_raw_block(&mut self, bytes: &[u8], ctype: CompressionType) -> BlockHandle {
        let handle = BlockHandle::new(self.offset, bytes.len() as u64);

        if self.status.is_ok() {
            if let Err(e) = self.file.append(bytes) {
                self.status = e;
            } else {
                let type_byte = ctype as u8;
                let crc = mask(crc32c_extend(bytes, type_byte));
                let mut trailer = [0u8; BLOCK_TRAILER_LEN];
                trailer[0] = type_byte;
                trailer[1..5].copy_from_slice(&crc.to_le_bytes());
                if let Err(e) = self.file.append(&trailer) {
                    self.status = e;
                } else {
                    self.offset += bytes.len() as u64 + BLOCK_TRAILER_LEN as u64;
                }
            }
        }

        handle
    }

    /// Flushes any pending data block, writes the filter block, meta-index,
    /// index, and footer, and returns the final status plus the underlying
    /// file -- safe to call even if a previous write already failed.
    pub fn finish(mut self) -> (Status, W) {
        assert!(!self.closed, "finish() called twice");
        self.flush();
        self.closed = true;

        let mut meta_index_block = BlockBuilder::new(self.opt.block_restart_interval);

        if let Some(mut fb) = self.filter_block.take() {
            let name = fb.filter_name();
            let raw = fb.finish().to_vec();
            let filter_handle = self.write_raw_block(&raw, CompressionType::None);

            let mut enc = Vec::new();
            filter_handle.encode(&mut enc);
            let key = format!("filter.{name}");
            meta_index_block.add(key.as_bytes(), &enc, self.opt.comparator.as_ref());
        }

        let meta_raw = meta_index_block.finish().to_vec();
        let meta_index_handle = self.write_block(meta_raw);

        if self.pending_index_entry {
            let mut succ = self.last_key.clone();
            self.opt.comparator.find_short_successor(&mut succ);
            let mut enc = Vec::new();
            self.pending_handle.encode(&mut enc);
            self.index_block
                .add(&succ, &enc, self.opt.comparator.as_ref());
            self.pending_index_entry = false;
        }

        let index_raw = self.index_block.finish().to_vec();
        let index_handle = self.write_block(index_raw);

        let footer = Footer::new(meta_index_handle, index_handle);
        let mut footer_buf = Vec::new();
        footer.encode(&mut footer_buf);

        if self.status.is_ok() {
            if let Err(e) = self.file.append(&footer_buf) {
                self.status = e;
            } else {
                self.offset += footer_buf.len() as u64;
            }
        }

        if let Some(l) = &self.logger {
            crate::log!(
                l,
                "finished table: {} entries, {} bytes",
                self.num_entries,
                self.offset
            );
        }

        (self.status, self.file)
    }

    /// Cancels the build. No further bytes are written; the caller is
    /// responsible for deleting whatever partial file already exists.
    /// Returns the underlying file/sink so the caller can remove it.
    pub fn abandon(mut self) -> W {
        self.closed = true;
        self.file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_builder::{decode_entries, decode_restarts, DecodedEntry};
    use crate::block_handle::FOOTER_LENGTH;
    use crate::comparator::{BytewiseComparator, Comparator};
    use crate::file_sink::MemSink;
    use crate::filter_policy::BloomFilterPolicy;
    use std::sync::Arc;

    fn opts_no_filter() -> Options {
        Options {
            compression: CompressionType::None,
            ..Options::default()
        }
    }

    /// Parses the table-level structure out of a finished in-memory file,
    /// purely for assertions -- not a general-purpose reader.
    struct ParsedTable {
        footer: Footer,
        bytes: Vec<u8>,
    }

    impl ParsedTable {
        fn parse(bytes: Vec<u8>) -> ParsedTable {
            let footer = Footer::decode(&bytes[bytes.len() - FOOTER_LENGTH..]).unwrap();
            ParsedTable { footer, bytes }
        }

        fn block_payload(&self, handle: BlockHandle) -> Vec<u8> {
            let start = handle.offset as usize;
            let end = start + handle.size as usize;
            let ctype = self.bytes[end];
            assert_eq!(
                ctype,
                CompressionType::None as u8,
                "test helper assumes uncompressed blocks"
            );
            self.bytes[start..end].to_vec()
        }

        fn index_entries(&self) -> Vec<DecodedEntry> {
            decode_entries(&self.block_payload(self.footer.index))
        }

        fn meta_index_entries(&self) -> Vec<DecodedEntry> {
            decode_entries(&self.block_payload(self.footer.meta_index))
        }
    }

    // A tiny table with one data block, no filter, no compression.
    #[test]
    fn minimal_single_block_table() {
        let mut b = TableBuilder::new(opts_no_filter(), MemSink::new());
        b.add(b"a", b"1");
        b.add(b"b", b"2");
        assert_eq!(b.num_entries(), 2);
        let (status, sink) = b.finish();
        assert!(status.is_ok());
        let table = ParsedTable::parse(sink.buf);

        assert!(table.meta_index_entries().is_empty());

        let index = table.index_entries();
        assert_eq!(index.len(), 1);
        let mut expected_sep = b"b".to_vec();
        BytewiseComparator.find_short_successor(&mut expected_sep);
        assert_eq!(index[0].key, expected_sep);

        let (data_handle, _) = BlockHandle::decode(&index[0].value).unwrap();
        let data_payload = table.block_payload(data_handle);
        assert_eq!(
            decode_entries(&data_payload),
            vec![
                DecodedEntry {
                    key: b"a".to_vec(),
                    value: b"1".to_vec()
                },
                DecodedEntry {
                    key: b"b".to_vec(),
                    value: b"2".to_vec()
                },
            ]
        );
        assert_eq!(decode_restarts(&data_payload), vec![0]);
    }

    // Index separators are shortened relative to the real boundary keys.
    #[test]
    fn index_separator_is_shortened_between_blocks() {
        let mut opt = opts_no_filter();
        opt.block_size = 1; // force a flush after every add
        let mut b = TableBuilder::new(opt, MemSink::new());
        b.add(b"the quick brown fox", b"1");
        b.add(b"the who", b"2");
        let (status, sink) = b.finish();
        assert!(status.is_ok());
        let table = ParsedTable::parse(sink.buf);
        let index = table.index_entries();
        assert_eq!(index.len(), 2);
        assert_eq!(index[0].key, b"the r");
    }

    // The configured restart interval bounds prefix sharing within a block.
    #[test]
    fn restart_interval_bounds_prefix_sharing() {
        let mut opt = opts_no_filter();
        opt.block_restart_interval = 3;
        let mut b = TableBuilder::new(opt, MemSink::new());
        for k in [b"aa".as_slice(), b"ab", b"ac", b"ad"] {
            b.add(k, b"");
        }
        let (status, sink) = b.finish();
        assert!(status.is_ok());
        let table = ParsedTable::parse(sink.buf);
        let index = table.index_entries();
        let (data_handle, _) = BlockHandle::decode(&index[0].value).unwrap();
        let payload = table.block_payload(data_handle);
        assert_eq!(decode_restarts(&payload).len(), 2);
    }

    // The filter block never produces a false negative for a key actually stored.
    #[test]
    fn filter_block_has_no_false_negatives() {
        let mut opt = opts_no_filter();
        opt.filter_policy = Some(Arc::new(BloomFilterPolicy::new(10)));
        let mut b = TableBuilder::new(opt, MemSink::new());

        let mut keys: Vec<Vec<u8>> = (0..1000u32).map(|i| i.to_be_bytes().to_vec()).collect();
        keys.sort();
        for k in &keys {
            b.add(k, b"v");
        }
        let (status, sink) = b.finish();
        assert!(status.is_ok());

        let table = ParsedTable::parse(sink.buf);
        let meta = table.meta_index_entries();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].key, b"filter.leveldb.BuiltinBloomFilter2");
        let (filter_handle, _) = BlockHandle::decode(&meta[0].value).unwrap();
        let filter_payload = table.block_payload(filter_handle);
        let reader = crate::filter_block::FilterBlockReader::new(&filter_payload);
        let policy = BloomFilterPolicy::new(10);

        let index = table.index_entries();
        for entry in &index {
            let (handle, _) = BlockHandle::decode(&entry.value).unwrap();
            let block = table.block_payload(handle);
            for e in decode_entries(&block) {
                assert!(reader.may_match(handle.offset, &e.key, &policy));
            }
        }
    }

    // abandon() leaves no footer or trailing blocks behind.
    #[test]
    fn abandon_writes_only_what_was_flushed() {
        let mut b = TableBuilder::new(opts_no_filter(), MemSink::new());
        b.add(b"a", b"1");
        assert_eq!(b.file_size(), 0, "nothing flushed yet before abandon");
        let sink = b.abandon();
        assert!(sink.buf.is_empty(), "abandon writes no footer or trailing blocks");
    }

    // Flipping a payload byte breaks the stored checksum.
    #[test]
    fn crc_detects_corruption() {
        let mut b = TableBuilder::new(opts_no_filter(), MemSink::new());
        b.add(b"a", b"1");
        b.add(b"b", b"2");
        let (status, sink) = b.finish();
        assert!(status.is_ok());
        let mut bytes = sink.buf;

        let table = ParsedTable::parse(bytes.clone());
        let index = table.index_entries();
        let (handle, _) = BlockHandle::decode(&index[0].value).unwrap();
        let start = handle.offset as usize;
        let end = start + handle.size as usize;

        let stored_crc =
            u32::from_le_bytes(bytes[end + 1..end + 5].try_into().unwrap());

        bytes[start] ^= 0xff;
        let flipped_crc = mask(crc32c_extend(
            &bytes[start..end],
            CompressionType::None as u8,
        ));
        assert_ne!(flipped_crc, stored_crc);
    }

    #[test]
    fn change_options_rejects_comparator_swap() {
        struct OtherCmp;
        impl Comparator for OtherCmp {
            fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
                a.cmp(b)
            }
            fn find_shortest_separator(&self, _a: &mut Vec<u8>, _b: &[u8]) {}
            fn find_short_successor(&self, _a: &mut Vec<u8>) {}
            fn name(&self) -> &'static str {
                "test.OtherComparator"
            }
        }

        let mut b = TableBuilder::new(opts_no_filter(), MemSink::new());
        let mut new_opt = opts_no_filter();
        new_opt.comparator = Arc::new(OtherCmp);
        let status = b.change_options(new_opt);
        assert!(!status.is_ok());
    }

    #[test]
    fn zero_keys_produces_valid_empty_table() {
        let b = TableBuilder::new(opts_no_filter(), MemSink::new());
        let (status, sink) = b.finish();
        assert!(status.is_ok());
        let table = ParsedTable::parse(sink.buf);
        assert!(table.index_entries().is_empty());
    }

    #[test]
    #[should_panic]
    fn rejects_non_ascending_keys() {
        let mut b = TableBuilder::new(opts_no_filter(), MemSink::new());
        b.add(b"b", b"1");
        b.add(b"a", b"2");
    }

    #[test]
    fn file_size_grows_with_each_forced_flush() {
        let mut opt = opts_no_filter();
        opt.block_size = 1; // force a flush after every add
        let mut b = TableBuilder::new(opt, MemSink::new());

        let mut prev = b.file_size();
        for i in 0..10u32 {
            b.add(&i.to_be_bytes(), b"value");
            let next = b.file_size();
            assert!(next > prev, "file_size() should grow once a block is flushed");
            prev = next;
        }

        let (status, sink) = b.finish();
        assert!(status.is_ok());
        assert!(sink.buf.len() as u64 > prev, "finish() must still append the index block and footer");
    }

    #[test]
    fn error_latch_makes_subsequent_adds_noops() {
        use crate::file_sink::FlakySink;
        let mut opt = opts_no_filter();
        opt.block_size = 1; // flush after every add, so the second add triggers a write
        let mut b = TableBuilder::new(opt, FlakySink::new(0));
        b.add(b"a", b"1");
        let entries_before = b.num_entries();
        b.add(b"b", b"2");
        // The flush triggered by the first add already failed (fail_after=0),
        // so the second add should have been a pure no-op.
        assert_eq!(b.num_entries(), entries_before);
        let (status, _) = b.finish();
        assert!(!status.is_ok());
    }

    // A failed append must not advance the assembler's offset: `file_size()`
    // always equals cumulative bytes actually appended to the sink.
    #[test]
    fn offset_does_not_advance_past_a_failed_append() {
        use crate::file_sink::FlakySink;
        let mut opt = opts_no_filter();
        opt.block_size = 1;
        let mut b = TableBuilder::new(opt, FlakySink::new(0));
        assert_eq!(b.file_size(), 0);
        b.add(b"a", b"1"); // triggers the first (failing) flush
        assert_eq!(b.file_size(), 0, "offset must not grow past a failed append");
        let (status, _) = b.finish();
        assert!(!status.is_ok());
        assert_eq!(b.file_size(), 0);
    }

    // The shared logger records a line at filter-segment emission.
    #[test]
    fn logger_records_filter_segment_emission() {
        use crate::infolog::Logger;
        use std::cell::RefCell;
        use std::rc::Rc;

        let sink = Rc::new(RefCell::new(Vec::<u8>::new()));
        let logger = Logger(sink.clone());

        let mut opt = opts_no_filter();
        opt.filter_policy = Some(Arc::new(BloomFilterPolicy::new(10)));
        let mut b = TableBuilder::new_with_logger(opt, MemSink::new(), Some(logger));
        b.add(b"a", b"1");
        b.add(b"b", b"2");
        let (status, _) = b.finish();
        assert!(status.is_ok());

        let logged = String::from_utf8(sink.borrow().clone()).unwrap();
        assert!(
            logged.contains("filter segment"),
            "expected a filter-segment emission log line, got: {logged}"
        );
    }

    #[test]
    fn logger_records_compression_fallback() {
        use crate::infolog::Logger;
        use std::cell::RefCell;
        use std::rc::Rc;

        let sink = Rc::new(RefCell::new(Vec::<u8>::new()));
        let logger = Logger(sink.clone());

        let opt = Options {
            compression: CompressionType::Snappy,
            ..Options::default()
        };
        let mut b = TableBuilder::new_with_logger(opt, MemSink::new(), Some(logger));
        // Random-ish, incompressible bytes so snappy can't hit the 12.5% bar.
        let incompressible: Vec<u8> = (0..200u32).map(|i| (i.wrapping_mul(2654435761)) as u8).collect();
        b.add(b"a", &incompressible);
        let (status, _) = b.finish();
        assert!(status.is_ok());

        let logged = String::from_utf8(sink.borrow().clone()).unwrap();
        assert!(
            logged.contains("did not save 12.5%"),
            "expected a compression-fallback log line, got: {logged}"
        );
    }
}
