//! Durable storage for the replicated log.
//!
//! Backed by RocksDB with three key families: `entries/<index>` mapping
//! each log position to its entry, the `commitIndex` counter, and
//! `snapshots/<timestamp>` holding serialized snapshots ordered by
//! creation time. Indices and timestamps are big-endian encoded so
//! iteration order matches numeric order.

use crate::entry::LogEntry;
use crate::error::{RaftLogError, Result};
use crate::snapshot::Snapshot;
use crate::types::LogIndex;
use chrono::Utc;
use rocksdb::{Options, DB};
use std::path::Path;

const ENTRY_PREFIX: &[u8] = b"entries/";
const COMMIT_INDEX_KEY: &[u8] = b"commitIndex";
const SNAPSHOT_PREFIX: &[u8] = b"snapshots/";

/// Durable store for log entries, the commit index, and snapshots.
pub struct LogStore {
    db: DB,
}

impl LogStore {
    /// Open or create a log store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    /// Store a single entry at its index.
    pub fn put_entry(&self, entry: &LogEntry) -> Result<()> {
        let value = bincode::serialize(entry)?;
        self.db.put(entry_key(entry.index), value)?;
        Ok(())
    }

    /// Store a batch of entries atomically.
    pub fn put_entries(&self, entries: &[LogEntry]) -> Result<()> {
        let mut batch = rocksdb::WriteBatch::default();
        for entry in entries {
            let value = bincode::serialize(entry)?;
            batch.put(entry_key(entry.index), value);
        }
        self.db.write(batch)?;
        Ok(())
    }

    /// Load the entry at `index`, if present.
    pub fn entry(&self, index: LogIndex) -> Result<Option<LogEntry>> {
        if index < 1 {
            return Ok(None);
        }
        match self.db.get(entry_key(index))? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    /// Delete entries with index >= `from_index`. Used when a conflicting
    /// suffix must be replaced.
    pub fn truncate_from(&self, from_index: LogIndex) -> Result<()> {
        let mut batch = rocksdb::WriteBatch::default();
        let start_key = entry_key(from_index.max(1));

        let iter = self.db.iterator(rocksdb::IteratorMode::From(
            &start_key,
            rocksdb::Direction::Forward,
        ));

        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(ENTRY_PREFIX) {
                break;
            }
            batch.delete(&key);
        }

        self.db.write(batch)?;
        Ok(())
    }

    /// Delete entries with index <= `up_to_index`. Used after a snapshot
    /// subsumes the prefix.
    pub fn prune_until(&self, up_to_index: LogIndex) -> Result<()> {
        let mut batch = rocksdb::WriteBatch::default();
        let end_key = entry_key(up_to_index + 1);

        let iter = self.db.iterator(rocksdb::IteratorMode::From(
            ENTRY_PREFIX,
            rocksdb::Direction::Forward,
        ));

        for item in iter {
            let (key, _) = item?;
            if key.as_ref() >= end_key.as_slice() || !key.starts_with(ENTRY_PREFIX) {
                break;
            }
            batch.delete(&key);
        }

        self.db.write(batch)?;
        Ok(())
    }

    /// The first and last indices stored, or None when empty.
    pub fn bounds(&self) -> Result<Option<(LogIndex, LogIndex)>> {
        let first = {
            let mut iter = self.db.iterator(rocksdb::IteratorMode::From(
                ENTRY_PREFIX,
                rocksdb::Direction::Forward,
            ));
            match iter.next() {
                Some(item) => {
                    let (key, _) = item?;
                    if key.starts_with(ENTRY_PREFIX) {
                        Some(parse_entry_key(&key)?)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        let last = {
            let end = entry_key(LogIndex::MAX);
            let mut iter = self
                .db
                .iterator(rocksdb::IteratorMode::From(&end, rocksdb::Direction::Reverse));
            match iter.next() {
                Some(item) => {
                    let (key, _) = item?;
                    if key.starts_with(ENTRY_PREFIX) {
                        Some(parse_entry_key(&key)?)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };

        match (first, last) {
            (Some(f), Some(l)) => Ok(Some((f, l))),
            _ => Ok(None),
        }
    }

    /// Max index present in the entry map, or 0 when empty.
    pub fn find_last_log_index(&self) -> Result<LogIndex> {
        Ok(self.bounds()?.map(|(_, last)| last).unwrap_or(0))
    }

    /// The entry with the highest index, if any.
    pub fn last_entry(&self) -> Result<Option<LogEntry>> {
        let end = entry_key(LogIndex::MAX);
        let mut iter = self
            .db
            .iterator(rocksdb::IteratorMode::From(&end, rocksdb::Direction::Reverse));
        match iter.next() {
            Some(item) => {
                let (key, value) = item?;
                if key.starts_with(ENTRY_PREFIX) {
                    Ok(Some(bincode::deserialize(&value)?))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// Number of live entries. The entry map is dense, so the count is
    /// derived from the bounds.
    pub fn entry_count(&self) -> Result<usize> {
        Ok(self
            .bounds()?
            .map(|(first, last)| (last - first + 1) as usize)
            .unwrap_or(0))
    }

    /// The durable commit index, 0 if never set.
    pub fn commit_index(&self) -> Result<LogIndex> {
        match self.db.get(COMMIT_INDEX_KEY)? {
            Some(data) => {
                let bytes: [u8; 8] = data.as_slice().try_into().map_err(|_| {
                    RaftLogError::Storage("invalid commit index encoding".to_string())
                })?;
                Ok(LogIndex::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    /// Durably advance the commit index. The flush also makes every entry
    /// written before this call durable, which is what permits the commit
    /// index to reference them.
    pub fn set_commit_index(&self, index: LogIndex) -> Result<()> {
        self.db.put(COMMIT_INDEX_KEY, index.to_be_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    /// Persist a snapshot under a fresh monotonic timestamp key, pruning
    /// the snapshot store down to the `keep` most recent.
    pub fn put_snapshot(&self, snapshot: &Snapshot, keep: usize) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let key_ts = match self.latest_snapshot_ts()? {
            Some(last) if now <= last => last + 1,
            _ => now,
        };

        let value = bincode::serialize(snapshot)?;
        self.db.put(snapshot_key(key_ts), value)?;
        self.db.flush()?;

        self.prune_snapshots(keep)?;
        Ok(())
    }

    /// The most recent snapshot, if any.
    pub fn latest_snapshot(&self) -> Result<Option<Snapshot>> {
        let end = snapshot_key(i64::MAX);
        let mut iter = self
            .db
            .iterator(rocksdb::IteratorMode::From(&end, rocksdb::Direction::Reverse));
        match iter.next() {
            Some(item) => {
                let (key, value) = item?;
                if key.starts_with(SNAPSHOT_PREFIX) {
                    Ok(Some(bincode::deserialize(&value)?))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// Number of snapshots currently retained.
    pub fn snapshot_count(&self) -> Result<usize> {
        Ok(self.snapshot_timestamps()?.len())
    }

    fn latest_snapshot_ts(&self) -> Result<Option<i64>> {
        Ok(self.snapshot_timestamps()?.last().copied())
    }

    fn snapshot_timestamps(&self) -> Result<Vec<i64>> {
        let mut timestamps = Vec::new();
        let iter = self.db.iterator(rocksdb::IteratorMode::From(
            SNAPSHOT_PREFIX,
            rocksdb::Direction::Forward,
        ));

        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(SNAPSHOT_PREFIX) {
                break;
            }
            timestamps.push(parse_snapshot_key(&key)?);
        }

        Ok(timestamps)
    }

    fn prune_snapshots(&self, keep: usize) -> Result<()> {
        let timestamps = self.snapshot_timestamps()?;
        if timestamps.len() <= keep {
            return Ok(());
        }

        let mut batch = rocksdb::WriteBatch::default();
        for ts in &timestamps[..timestamps.len() - keep] {
            batch.delete(snapshot_key(*ts));
        }
        self.db.write(batch)?;
        Ok(())
    }
}

fn entry_key(index: LogIndex) -> Vec<u8> {
    let mut key = ENTRY_PREFIX.to_vec();
    key.extend_from_slice(&(index as u64).to_be_bytes());
    key
}

fn parse_entry_key(key: &[u8]) -> Result<LogIndex> {
    let bytes: [u8; 8] = key
        .get(ENTRY_PREFIX.len()..)
        .and_then(|tail| tail.try_into().ok())
        .ok_or_else(|| RaftLogError::Storage("invalid entry key".to_string()))?;
    Ok(u64::from_be_bytes(bytes) as LogIndex)
}

fn snapshot_key(timestamp: i64) -> Vec<u8> {
    let mut key = SNAPSHOT_PREFIX.to_vec();
    key.extend_from_slice(&(timestamp as u64).to_be_bytes());
    key
}

fn parse_snapshot_key(key: &[u8]) -> Result<i64> {
    let bytes: [u8; 8] = key
        .get(SNAPSHOT_PREFIX.len()..)
        .and_then(|tail| tail.try_into().ok())
        .ok_or_else(|| RaftLogError::Storage("invalid snapshot key".to_string()))?;
    Ok(u64::from_be_bytes(bytes) as i64)
}
