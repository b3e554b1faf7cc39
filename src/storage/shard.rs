//! Storage Shard
//!
//! One persistent partition of a node's data over a contiguous hash interval. Every mutation
//! rewrites the shard's backing file through a temp file and an atomic rename, so the file on
//! disk is always either the old or the new contents.
//!
//! ## Split
//! Entries are ordered by `(key hash, key)`. The split boundary is the hash at index
//! `ceil(n/2) - 1`, and every entry whose hash is `<=` the boundary stays in the lower shard.
//! Equal hashes therefore never straddle the boundary, and the boundary is always the hash of
//! an existing key, inclusive on the lower side.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

use super::types::*;
use crate::ring::Position;

pub const SHARD_EXTENSION: &str = "shard";

/// Result of splitting a shard in two.
#[derive(Debug)]
pub struct SplitResult {
    /// The original shard (same file), now covering `(start, lower_boundary]`.
    pub lower: StorageShard,
    /// The new shard covering `(lower_boundary, end]`.
    pub upper: StorageShard,
    /// Highest key hash left in the lower shard.
    pub lower_boundary: Position,
    /// Highest key hash moved into the upper shard.
    pub upper_boundary: Position,
}

#[derive(Debug, Serialize, Deserialize)]
struct ShardFile {
    start: Option<String>,
    end: String,
    entries: Vec<(String, Record)>,
}

#[derive(Debug, Clone)]
pub struct StorageShard {
    id: Uuid,
    range: ShardRange,
    entries: BTreeMap<(Position, String), Record>,
    path: PathBuf,
}

impl StorageShard {
    /// Creates an empty shard with a fresh backing file in `dir`.
    pub fn create(dir: &Path, range: ShardRange) -> Result<Self, StorageError> {
        let shard = Self::in_memory(dir, range, BTreeMap::new());
        shard.persist()?;
        Ok(shard)
    }

    fn in_memory(
        dir: &Path,
        range: ShardRange,
        entries: BTreeMap<(Position, String), Record>,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            range,
            entries,
            path: dir.join(format!("{}.{}", id, SHARD_EXTENSION)),
        }
    }

    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let bytes = fs::read(path)?;
        let file: ShardFile = bincode::deserialize(&bytes)?;

        let id = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| Uuid::parse_str(stem).ok())
            .ok_or_else(|| StorageError::Corrupt(format!("bad shard file name {:?}", path)))?;
        let parse = |hex: &str| {
            hex.parse::<Position>()
                .map_err(|e| StorageError::Corrupt(format!("{:?}: {}", path, e)))
        };
        let range = ShardRange {
            start: file.start.as_deref().map(parse).transpose()?,
            end: parse(&file.end)?,
        };

        let mut entries = BTreeMap::new();
        for (key, record) in file.entries {
            let hash = Position::of_key(&key);
            if !range.contains(hash) {
                return Err(StorageError::Corrupt(format!(
                    "{:?} holds key '{}' outside its range",
                    path, key
                )));
            }
            entries.insert((hash, key), record);
        }

        Ok(Self {
            id,
            range,
            entries,
            path: path.to_path_buf(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn range(&self) -> ShardRange {
        self.range
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|(_, key)| key.as_str())
    }

    pub fn highest_hash(&self) -> Option<Position> {
        self.entries.keys().next_back().map(|(hash, _)| *hash)
    }

    fn slot(key: &str) -> (Position, String) {
        (Position::of_key(key), key.to_string())
    }

    pub fn get(&self, key: &str, password: Option<&str>) -> GetStatus {
        match self.entries.get(&Self::slot(key)) {
            None => GetStatus::NotFound,
            Some(record) if !record.admits(password) => GetStatus::PasswordMismatch,
            Some(record) => GetStatus::Found(record.value.clone()),
        }
    }

    pub fn put(
        &mut self,
        key: &str,
        value: Vec<u8>,
        password: Option<String>,
    ) -> Result<PutStatus, StorageError> {
        let slot = Self::slot(key);
        if let Some(existing) = self.entries.get(&slot)
            && !existing.admits(password.as_deref())
        {
            return Ok(PutStatus::PasswordMismatch);
        }

        let previous = self.upsert_slot(slot, Record::new(value, password))?;
        Ok(match previous {
            Some(_) => PutStatus::Updated,
            None => PutStatus::Created,
        })
    }

    pub fn delete(&mut self, key: &str, password: Option<&str>) -> Result<DeleteStatus, StorageError> {
        let slot = Self::slot(key);
        match self.entries.get(&slot) {
            None => return Ok(DeleteStatus::NotFound),
            Some(record) if !record.admits(password) => return Ok(DeleteStatus::PasswordMismatch),
            Some(_) => {}
        }

        self.remove_slot(&slot)?;
        Ok(DeleteStatus::Deleted)
    }

    /// Writes `record` regardless of the stored password. Used for replicas and hand-offs,
    /// where the primary has already checked it.
    pub fn upsert(&mut self, key: &str, record: Record) -> Result<Option<Record>, StorageError> {
        self.upsert_slot(Self::slot(key), record)
    }

    /// Removes `key` regardless of the stored password.
    pub fn remove(&mut self, key: &str) -> Result<Option<Record>, StorageError> {
        self.remove_slot(&Self::slot(key))
    }

    fn upsert_slot(
        &mut self,
        slot: (Position, String),
        record: Record,
    ) -> Result<Option<Record>, StorageError> {
        let previous = self.entries.insert(slot.clone(), record);
        if let Err(e) = self.persist() {
            match &previous {
                Some(old) => self.entries.insert(slot, old.clone()),
                None => self.entries.remove(&slot),
            };
            return Err(e);
        }
        Ok(previous)
    }

    fn remove_slot(&mut self, slot: &(Position, String)) -> Result<Option<Record>, StorageError> {
        let Some(previous) = self.entries.remove(slot) else {
            return Ok(None);
        };
        if let Err(e) = self.persist() {
            self.entries.insert(slot.clone(), previous);
            return Err(e);
        }
        Ok(Some(previous))
    }

    pub fn entries_where(&self, matches: impl Fn(Position) -> bool) -> Vec<(String, Record)> {
        self.entries
            .iter()
            .filter(|((hash, _), _)| matches(*hash))
            .map(|((_, key), record)| (key.clone(), record.clone()))
            .collect()
    }

    /// Removes and returns every entry whose hash matches `outside`.
    pub fn drain_where(
        &mut self,
        outside: impl Fn(Position) -> bool,
    ) -> Result<Vec<(String, Record)>, StorageError> {
        let slots: Vec<(Position, String)> = self
            .entries
            .keys()
            .filter(|(hash, _)| outside(*hash))
            .cloned()
            .collect();
        if slots.is_empty() {
            return Ok(Vec::new());
        }

        let mut drained = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(record) = self.entries.remove(&slot) {
                drained.push((slot, record));
            }
        }
        if let Err(e) = self.persist() {
            for (slot, record) in drained {
                self.entries.insert(slot, record);
            }
            return Err(e);
        }

        Ok(drained
            .into_iter()
            .map(|((_, key), record)| (key, record))
            .collect())
    }

    /// Shrinks the interval to `(start, end]`, dropping every entry above `end`. Returns how
    /// many entries were dropped.
    pub fn truncate(&mut self, end: Position) -> Result<usize, StorageError> {
        let before = self.entries.len();
        self.entries.retain(|(hash, _), _| *hash <= end);
        self.range.end = end;
        self.persist()?;
        Ok(before - self.entries.len())
    }

    /// Splits this shard at the median key hash.
    ///
    /// `self` is never modified. The upper half is written to a new file first, then the lower
    /// half atomically replaces this shard's file; if either write fails the new file is removed
    /// and the error is returned, so the shard on disk and in memory stays as it was. A crash
    /// between the two writes leaves both files ending at the same hash, which
    /// `KvStore::open` resolves in favour of the new upper file.
    pub fn split(&self) -> Result<SplitResult, StorageError> {
        let count = self.entries.len();
        if count < 2 {
            return Err(StorageError::Unsplittable(count));
        }

        let median = count.div_ceil(2) - 1;
        let lower_boundary = self
            .entries
            .keys()
            .nth(median)
            .map(|(hash, _)| *hash)
            .ok_or(StorageError::Unsplittable(count))?;

        let (lower_entries, upper_entries): (BTreeMap<_, _>, BTreeMap<_, _>) = self
            .entries
            .iter()
            .map(|(slot, record)| (slot.clone(), record.clone()))
            .partition(|((hash, _), _)| *hash <= lower_boundary);

        let upper_boundary = upper_entries
            .keys()
            .next_back()
            .map(|(hash, _)| *hash)
            .ok_or(StorageError::Unsplittable(count))?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let upper = Self::in_memory(
            dir,
            ShardRange {
                start: Some(lower_boundary),
                end: self.range.end,
            },
            upper_entries,
        );
        let lower = Self {
            id: self.id,
            range: ShardRange {
                start: self.range.start,
                end: lower_boundary,
            },
            entries: lower_entries,
            path: self.path.clone(),
        };

        upper.persist()?;
        if let Err(e) = lower.persist() {
            if let Err(cleanup) = fs::remove_file(&upper.path) {
                tracing::warn!("Failed to remove half-written shard {:?}: {}", upper.path, cleanup);
            }
            return Err(e);
        }

        Ok(SplitResult {
            lower,
            upper,
            lower_boundary,
            upper_boundary,
        })
    }

    /// Combines this shard with the adjacent shard above it.
    ///
    /// The combined contents replace this shard's file, then `upper`'s file is removed. If the
    /// removal fails this shard's file is restored and the error returned. After a crash between
    /// the two steps `KvStore::open` trims the combined file back to this shard's interval.
    pub fn merge(&self, upper: &StorageShard, capacity: usize) -> Result<StorageShard, StorageError> {
        if upper.range.start != Some(self.range.end) {
            return Err(StorageError::NotAdjacent {
                lower: self.range.end,
                upper: upper
                    .range
                    .start
                    .map(|start| start.to_string())
                    .unwrap_or_else(|| "zero".to_string()),
            });
        }
        let combined = self.entries.len() + upper.entries.len();
        if combined > capacity {
            return Err(StorageError::CapacityExceeded { combined, capacity });
        }

        let mut entries = self.entries.clone();
        entries.extend(upper.entries.iter().map(|(slot, record)| (slot.clone(), record.clone())));
        let merged = Self {
            id: self.id,
            range: ShardRange {
                start: self.range.start,
                end: upper.range.end,
            },
            entries,
            path: self.path.clone(),
        };

        merged.persist()?;
        if let Err(e) = fs::remove_file(&upper.path) {
            if let Err(restore) = self.persist() {
                tracing::error!("Failed to restore shard {:?} after merge: {}", self.path, restore);
            }
            return Err(e.into());
        }

        Ok(merged)
    }

    pub fn persist(&self) -> Result<(), StorageError> {
        let file = ShardFile {
            start: self.range.start.map(|start| start.to_string()),
            end: self.range.end.to_string(),
            entries: self
                .entries
                .iter()
                .map(|((_, key), record)| (key.clone(), record.clone()))
                .collect(),
        };
        let bytes = bincode::serialize(&file)?;
        write_atomically(&self.path, &bytes)
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}
