//! Bin — one shard of the store
//!
//! A bin owns one append-only log file, one LRU cache segment, and one
//! reader-writer lock. Writers (insert/erase/compact/recover) hold the lock
//! exclusively; readers (get) hold it shared, so gets on the same bin can
//! run concurrently with each other but never with a writer.
//!
//! Write ordering: insert appends the new live record first, then flips the
//! tombstone on every earlier live record for the key. A crash between the
//! two writes leaves duplicate live records; reads stay correct because get
//! takes the LAST live match in file order and erase tombstones every live
//! match. Compaction preserves record order, so last-live-wins survives it.
//!
//! Every operation opens its own file handle inside the lock; nothing is
//! shared across operations except the path.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;

use parking_lot::RwLock;
use tracing::warn;

use crate::cache::CacheSegment;
use crate::error::{CaskError, CaskResult};
use crate::format::{encode_record, RecordHeader, HEADER_SIZE, TOMBSTONE_OFFSET};

/// Outcome of compacting one bin.
#[derive(Debug, Clone, Copy)]
pub struct CompactionStats {
    /// Records that survived
    pub live_records: usize,
    /// Tombstoned records dropped
    pub dropped_records: usize,
    /// Bytes trimmed off the file
    pub reclaimed_bytes: u64,
}

/// One shard: a log file, a cache segment, and a reader-writer lock.
pub struct Bin {
    id: usize,
    path: PathBuf,
    lock: RwLock<()>,
    cache: CacheSegment,
}

impl Bin {
    /// Create the in-memory handle for a bin. The log file must already exist.
    pub fn new(id: usize, path: PathBuf, cache_capacity: NonZeroUsize) -> Self {
        Self {
            id,
            path,
            lock: RwLock::new(()),
            cache: CacheSegment::new(cache_capacity),
        }
    }

    /// Bin index within the store.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Insert or overwrite a key.
    ///
    /// Appends the new record, then tombstones every earlier live record for
    /// the key so that at most one live record per key survives the exclusive
    /// section. The cache is updated first: if disk I/O fails afterwards the
    /// cache may be ahead of the log, and the engine should be discarded.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> CaskResult<()> {
        let record = encode_record(key, value)?;

        let _guard = self.lock.write();
        self.cache.put(key, value);

        let mut file = self.open_read_write()?;

        let end = file
            .seek(SeekFrom::End(0))
            .map_err(|e| self.io_error("Failed to seek to end of bin", e))?;
        file.write_all(&record)
            .map_err(|e| self.io_error("Failed to append record", e))?;

        // Everything before `end` predates the record just appended.
        self.tombstone_matches(&mut file, key, end)?;
        Ok(())
    }

    /// Look up a key. Cache first, then a full scan of the log.
    ///
    /// The last live match in file order wins; a disk hit is promoted into
    /// the cache on the way out.
    pub fn get(&self, key: &[u8]) -> CaskResult<Option<Vec<u8>>> {
        let _guard = self.lock.read();

        if let Some(value) = self.cache.get(key) {
            return Ok(Some(value));
        }

        let mut file = File::open(&self.path)
            .map_err(|e| self.io_error("Failed to open bin", e))?;
        let file_len = self.file_len(&file)?;

        let mut offset = 0u64;
        let mut found: Option<Vec<u8>> = None;

        while let Some(header) = self.read_header(&mut file, offset, file_len)? {
            let next = offset + header.total_len();

            // Tombstoned records and records with a different key length are
            // skipped without reading their payload.
            if header.tombstone || header.key_len as usize != key.len() {
                offset = next;
                continue;
            }

            let mut current = vec![0u8; header.key_len as usize];
            file.read_exact(&mut current)
                .map_err(|e| self.io_error("Failed to read record key", e))?;

            if current == key {
                let mut value = vec![0u8; header.value_len as usize];
                file.read_exact(&mut value)
                    .map_err(|e| self.io_error("Failed to read record value", e))?;
                found = Some(value);
            }
            offset = next;
        }

        if let Some(ref value) = found {
            self.cache.put(key, value);
        }
        Ok(found)
    }

    /// Logically delete a key by flipping the tombstone on every live record
    /// that matches it. Returns true if anything was flipped.
    pub fn erase(&self, key: &[u8]) -> CaskResult<bool> {
        let _guard = self.lock.write();
        self.cache.remove(key);

        let mut file = self.open_read_write()?;
        let file_len = self.file_len(&file)?;
        self.tombstone_matches(&mut file, key, file_len)
    }

    /// Rewrite the log in place, dropping tombstoned records, then truncate.
    ///
    /// Surviving records keep their relative order, which is what makes
    /// last-live-wins reads stable across compactions.
    pub fn compact(&self) -> CaskResult<CompactionStats> {
        let _guard = self.lock.write();

        let mut file = self.open_read_write()?;
        let file_len = self.file_len(&file)?;

        let mut read_pos = 0u64;
        let mut write_pos = 0u64;
        let mut live_records = 0usize;
        let mut dropped_records = 0usize;

        while let Some(header) = self.read_header(&mut file, read_pos, file_len)? {
            let total = header.total_len();

            if header.tombstone {
                read_pos += total;
                dropped_records += 1;
                continue;
            }

            if write_pos == read_pos {
                // No gap has opened yet; the record already sits where it belongs.
                read_pos += total;
                write_pos += total;
                live_records += 1;
                continue;
            }

            let mut body = vec![0u8; header.body_len() as usize];
            file.read_exact(&mut body)
                .map_err(|e| self.io_error("Failed to read record during compaction", e))?;
            read_pos += total;

            file.seek(SeekFrom::Start(write_pos))
                .map_err(|e| self.io_error("Failed to seek during compaction", e))?;
            file.write_all(&header.to_bytes())
                .map_err(|e| self.io_error("Failed to rewrite record header", e))?;
            file.write_all(&body)
                .map_err(|e| self.io_error("Failed to rewrite record payload", e))?;
            write_pos += total;
            live_records += 1;
        }

        file.set_len(write_pos)
            .map_err(|e| self.io_error("Failed to truncate bin after compaction", e))?;

        Ok(CompactionStats {
            live_records,
            dropped_records,
            reclaimed_bytes: file_len - write_pos,
        })
    }

    /// Open-time consistency check: scan the log and truncate at the first
    /// record that is invalid (negative length) or extends past end-of-file.
    ///
    /// Partial trailing writes from a crash are discarded here; fully written
    /// tombstoned records are kept until the next compaction.
    pub fn recover(&self) -> CaskResult<()> {
        let _guard = self.lock.write();

        let mut file = self.open_read_write()?;
        let file_len = self.file_len(&file)?;

        let mut offset = 0u64;
        while let Some(header) = self.read_header(&mut file, offset, file_len)? {
            offset += header.total_len();
        }

        if offset < file_len {
            warn!(
                bin = self.id,
                valid_bytes = offset,
                file_bytes = file_len,
                "truncating partial record at end of bin log"
            );
            file.set_len(offset)
                .map_err(|e| self.io_error("Failed to truncate corrupt tail", e))?;
        }
        Ok(())
    }

    /// Scan `[0, limit)` and flip the tombstone on every live record whose key
    /// equals `key`. Returns true if at least one record was flipped.
    fn tombstone_matches(&self, file: &mut File, key: &[u8], limit: u64) -> CaskResult<bool> {
        let mut offset = 0u64;
        let mut flipped = false;

        while let Some(header) = self.read_header(file, offset, limit)? {
            let next = offset + header.total_len();

            if header.tombstone || header.key_len as usize != key.len() {
                offset = next;
                continue;
            }

            let mut current = vec![0u8; header.key_len as usize];
            file.read_exact(&mut current)
                .map_err(|e| self.io_error("Failed to read record key", e))?;

            if current == key {
                file.seek(SeekFrom::Start(offset + TOMBSTONE_OFFSET))
                    .map_err(|e| self.io_error("Failed to seek to tombstone flag", e))?;
                file.write_all(&[1u8])
                    .map_err(|e| self.io_error("Failed to write tombstone flag", e))?;
                flipped = true;
            }
            offset = next;
        }

        Ok(flipped)
    }

    /// Read the record header at `offset`, leaving the file cursor just past
    /// it. Returns `Ok(None)` where the valid region ends: clean end-of-file,
    /// a truncated header, a negative length, or a payload that would run
    /// past `file_len`.
    fn read_header(&self, file: &mut File, offset: u64, file_len: u64) -> CaskResult<Option<RecordHeader>> {
        if offset + HEADER_SIZE as u64 > file_len {
            return Ok(None);
        }

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| self.io_error("Failed to seek to record header", e))?;

        let mut buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut buf)
            .map_err(|e| self.io_error("Failed to read record header", e))?;
        let header = RecordHeader::from_bytes(&buf);

        if !header.is_well_formed() || offset + header.total_len() > file_len {
            return Ok(None);
        }
        Ok(Some(header))
    }

    fn open_read_write(&self) -> CaskResult<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| self.io_error("Failed to open bin", e))
    }

    fn file_len(&self, file: &File) -> CaskResult<u64> {
        Ok(file
            .metadata()
            .map_err(|e| self.io_error("Failed to stat bin", e))?
            .len())
    }

    fn io_error(&self, message: &str, e: std::io::Error) -> CaskError {
        CaskError::Io {
            path: Some(self.path.clone()),
            kind: e.kind(),
            message: format!("{}: {}", message, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn test_bin(cache_capacity: usize) -> (Bin, TempDir) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("0.bkt");
        File::create(&path).unwrap();
        let bin = Bin::new(0, path, NonZeroUsize::new(cache_capacity).unwrap());
        (bin, tmp)
    }

    /// Parse every record in the bin's log file.
    fn records(bin: &Bin) -> Vec<(Vec<u8>, Vec<u8>, bool)> {
        let data = fs::read(&bin.path).unwrap();
        let mut out = Vec::new();
        let mut offset = 0usize;
        while offset + HEADER_SIZE <= data.len() {
            let mut buf = [0u8; HEADER_SIZE];
            buf.copy_from_slice(&data[offset..offset + HEADER_SIZE]);
            let header = RecordHeader::from_bytes(&buf);
            assert!(header.is_well_formed());
            let body = offset + HEADER_SIZE;
            let key_end = body + header.key_len as usize;
            let value_end = key_end + header.value_len as usize;
            assert!(value_end <= data.len());
            out.push((
                data[body..key_end].to_vec(),
                data[key_end..value_end].to_vec(),
                header.tombstone,
            ));
            offset = value_end;
        }
        assert_eq!(offset, data.len());
        out
    }

    #[test]
    fn test_insert_get() {
        let (bin, _tmp) = test_bin(4);
        bin.insert(b"hello", b"world").unwrap();
        assert_eq!(bin.get(b"hello").unwrap(), Some(b"world".to_vec()));
        assert_eq!(bin.get(b"missing").unwrap(), None);
    }

    #[test]
    fn test_insert_tombstones_previous() {
        let (bin, _tmp) = test_bin(4);
        bin.insert(b"k", b"v1").unwrap();
        bin.insert(b"k", b"v2").unwrap();

        assert_eq!(bin.get(b"k").unwrap(), Some(b"v2".to_vec()));

        let records = records(&bin);
        assert_eq!(records.len(), 2);
        assert!(records[0].2, "older record should be tombstoned");
        assert!(!records[1].2);
        assert_eq!(records[1].1, b"v2");
    }

    #[test]
    fn test_erase() {
        let (bin, _tmp) = test_bin(4);
        bin.insert(b"k", b"v").unwrap();
        assert!(bin.erase(b"k").unwrap());
        assert_eq!(bin.get(b"k").unwrap(), None);
        assert!(!bin.erase(b"k").unwrap(), "second erase finds nothing");
    }

    #[test]
    fn test_get_bypasses_cache_after_erase() {
        let (bin, _tmp) = test_bin(4);
        bin.insert(b"k", b"v").unwrap();
        assert_eq!(bin.get(b"k").unwrap(), Some(b"v".to_vec())); // cached
        bin.erase(b"k").unwrap();
        assert_eq!(bin.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_get_miss_populates_cache() {
        let (bin, _tmp) = test_bin(4);
        bin.insert(b"k", b"v").unwrap();
        bin.cache.remove(b"k"); // simulate eviction
        assert_eq!(bin.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(bin.cache.get(b"k"), Some(b"v".to_vec()));
    }

    #[test]
    fn test_get_takes_last_live_match() {
        let (bin, _tmp) = test_bin(4);
        // Two live records for the same key, as a crash between insert's
        // append and its tombstone pass would leave them.
        let path = bin.path.clone();
        bin.insert(b"k", b"old").unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&encode_record(b"k", b"new").unwrap()).unwrap();
        drop(file);
        bin.cache.remove(b"k");

        assert_eq!(bin.get(b"k").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn test_erase_flips_all_duplicates() {
        let (bin, _tmp) = test_bin(4);
        let path = bin.path.clone();
        bin.insert(b"k", b"old").unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&encode_record(b"k", b"new").unwrap()).unwrap();
        drop(file);

        assert!(bin.erase(b"k").unwrap());
        assert_eq!(bin.get(b"k").unwrap(), None);
        assert!(records(&bin).iter().all(|(_, _, tombstone)| *tombstone));
    }

    #[test]
    fn test_compact_drops_tombstones() {
        let (bin, _tmp) = test_bin(4);
        bin.insert(b"k", b"v1").unwrap();
        bin.insert(b"k", b"v2").unwrap();
        bin.insert(b"k", b"v3").unwrap();
        bin.insert(b"other", b"x").unwrap();
        bin.erase(b"other").unwrap();

        let stats = bin.compact().unwrap();
        assert_eq!(stats.live_records, 1);
        assert_eq!(stats.dropped_records, 3);
        assert!(stats.reclaimed_bytes > 0);

        let records = records(&bin);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, b"k");
        assert_eq!(records[0].1, b"v3");
        assert!(!records[0].2);

        assert_eq!(bin.get(b"k").unwrap(), Some(b"v3".to_vec()));
        assert_eq!(bin.get(b"other").unwrap(), None);
    }

    #[test]
    fn test_compact_preserves_order() {
        let (bin, _tmp) = test_bin(8);
        bin.insert(b"a", b"1").unwrap();
        bin.insert(b"b", b"2").unwrap();
        bin.insert(b"c", b"3").unwrap();
        bin.erase(b"b").unwrap();

        bin.compact().unwrap();

        let records = records(&bin);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, b"a");
        assert_eq!(records[1].0, b"c");
    }

    #[test]
    fn test_compact_empty_bin() {
        let (bin, _tmp) = test_bin(4);
        let stats = bin.compact().unwrap();
        assert_eq!(stats.live_records, 0);
        assert_eq!(stats.dropped_records, 0);
    }

    #[test]
    fn test_recover_truncates_partial_tail() {
        let (bin, _tmp) = test_bin(4);
        bin.insert(b"good", b"value").unwrap();

        // Append a header whose payload runs 5 bytes past end-of-file.
        let path = bin.path.clone();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        let header = RecordHeader::live(4, 10);
        file.write_all(&header.to_bytes()).unwrap();
        file.write_all(b"tailvalue").unwrap(); // 9 of the 14 payload bytes
        drop(file);

        bin.recover().unwrap();

        let records = records(&bin);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, b"good");
        assert_eq!(bin.get(b"good").unwrap(), Some(b"value".to_vec()));
    }

    #[test]
    fn test_recover_truncates_negative_length() {
        let (bin, _tmp) = test_bin(4);
        bin.insert(b"good", b"value").unwrap();

        let path = bin.path.clone();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&(-7i32).to_le_bytes()).unwrap();
        file.write_all(&3i32.to_le_bytes()).unwrap();
        file.write_all(&[0u8]).unwrap();
        file.write_all(b"junk").unwrap();
        drop(file);

        bin.recover().unwrap();
        assert_eq!(records(&bin).len(), 1);
    }

    #[test]
    fn test_recover_clean_file_untouched() {
        let (bin, _tmp) = test_bin(4);
        bin.insert(b"a", b"1").unwrap();
        bin.insert(b"b", b"2").unwrap();
        let before = fs::read(&bin.path).unwrap();

        bin.recover().unwrap();
        assert_eq!(fs::read(&bin.path).unwrap(), before);
    }

    #[test]
    fn test_empty_value() {
        let (bin, _tmp) = test_bin(4);
        bin.insert(b"k", b"").unwrap();
        assert_eq!(bin.get(b"k").unwrap(), Some(Vec::new()));
        bin.cache.remove(b"k");
        assert_eq!(bin.get(b"k").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_same_length_keys_disambiguated() {
        let (bin, _tmp) = test_bin(4);
        bin.insert(b"abc", b"1").unwrap();
        bin.insert(b"abd", b"2").unwrap();
        bin.cache.remove(b"abc");
        bin.cache.remove(b"abd");
        assert_eq!(bin.get(b"abc").unwrap(), Some(b"1".to_vec()));
        assert_eq!(bin.get(b"abd").unwrap(), Some(b"2".to_vec()));
    }
}
