use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use super::shard::{SHARD_EXTENSION, SplitResult, StorageShard};
use super::types::*;
use crate::ring::Position;

/// A node's persistent key-value data.
///
/// Shards tile the whole hash space and are keyed by the end of their interval, so the shard
/// owning a hash is the first one whose key is `>=` the hash. The map sits behind a single
/// reader-writer lock: `get` is a reader, everything that mutates (including split and merge)
/// is a writer, so no caller can see a key in neither or both halves of a split.
pub struct KvStore {
    dir: PathBuf,
    capacity: usize,
    shards: RwLock<BTreeMap<Position, StorageShard>>,
}

impl KvStore {
    /// Opens the store in `dir`, loading existing shard files or creating one shard covering
    /// the whole hash space.
    ///
    /// Shards sharing an interval end are left behind by a split or merge that did not finish.
    /// The narrower one keeps the end and the wider one is trimmed to stop where it starts,
    /// which restores the state from before the merge or after the split.
    pub fn open(dir: impl AsRef<Path>, capacity: usize) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut loaded = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SHARD_EXTENSION) {
                continue;
            }
            loaded.push(StorageShard::load(&path)?);
        }
        // by end, narrowest first
        loaded.sort_by(|a, b| {
            a.range()
                .end
                .cmp(&b.range().end)
                .then(b.range().start.cmp(&a.range().start))
        });

        let mut shards = BTreeMap::new();
        for shard in loaded {
            place_shard(&mut shards, shard)?;
        }

        if shards.is_empty() {
            let shard = StorageShard::create(&dir, ShardRange::full())?;
            shards.insert(Position::MAX, shard);
        } else {
            check_tiling(&shards)?;
        }

        tracing::info!(
            "Opened store at {:?}: {} shard(s), {} entries, capacity {} per shard",
            dir,
            shards.len(),
            shards.values().map(StorageShard::len).sum::<usize>(),
            capacity
        );

        Ok(Self {
            dir,
            capacity: capacity.max(1),
            shards: RwLock::new(shards),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn get(&self, key: &str, password: Option<&str>) -> GetStatus {
        let shards = self.shards.read().await;
        match owning_shard(&shards, Position::of_key(key)) {
            Some(shard) => shard.get(key, password),
            None => GetStatus::NotFound,
        }
    }

    pub async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        password: Option<String>,
    ) -> Result<PutStatus, StorageError> {
        let mut shards = self.shards.write().await;
        let hash = Position::of_key(key);
        let shard = owning_shard_mut(&mut shards, hash)?;

        let status = shard.put(key, value, password)?;
        if status != PutStatus::PasswordMismatch && shard.len() > self.capacity {
            self.split_shard(&mut shards, hash);
        }
        Ok(status)
    }

    pub async fn delete(
        &self,
        key: &str,
        password: Option<&str>,
    ) -> Result<DeleteStatus, StorageError> {
        let mut shards = self.shards.write().await;
        owning_shard_mut(&mut shards, Position::of_key(key))?.delete(key, password)
    }

    /// Stores entries without password checks, splitting shards as they fill up.
    pub async fn insert_entries(&self, entries: Vec<(String, Record)>) -> Result<usize, StorageError> {
        let mut shards = self.shards.write().await;
        let mut inserted = 0;
        for (key, record) in entries {
            let hash = Position::of_key(&key);
            let shard = owning_shard_mut(&mut shards, hash)?;
            shard.upsert(&key, record)?;
            inserted += 1;
            if shard.len() > self.capacity {
                self.split_shard(&mut shards, hash);
            }
        }
        Ok(inserted)
    }

    /// Removes `key` without a password check.
    pub async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let mut shards = self.shards.write().await;
        Ok(owning_shard_mut(&mut shards, Position::of_key(key))?
            .remove(key)?
            .is_some())
    }

    /// Removes and returns every entry whose hash satisfies `outside`.
    ///
    /// If a shard fails to persist, whatever was already drained is reinserted before the
    /// error is returned.
    pub async fn extract_where(
        &self,
        outside: impl Fn(Position) -> bool,
    ) -> Result<Vec<(String, Record)>, StorageError> {
        let mut shards = self.shards.write().await;
        let mut extracted = Vec::new();
        let mut failure = None;
        for shard in shards.values_mut() {
            match shard.drain_where(&outside) {
                Ok(mut drained) => extracted.append(&mut drained),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        drop(shards);

        if let Some(e) = failure {
            self.insert_entries(extracted).await?;
            return Err(e);
        }
        Ok(extracted)
    }

    /// Copies of every entry whose hash satisfies `matches`.
    pub async fn entries_where(&self, matches: impl Fn(Position) -> bool) -> Vec<(String, Record)> {
        self.shards
            .read()
            .await
            .values()
            .flat_map(|shard| shard.entries_where(&matches))
            .collect()
    }

    /// Merges neighbouring shards while their combined size fits the capacity. Returns the
    /// number of merges performed.
    pub async fn compact(&self) -> Result<usize, StorageError> {
        let mut shards = self.shards.write().await;
        let mut merges = 0;

        let mut cursor = shards.keys().next().copied();
        while let Some(lower_end) = cursor {
            let Some(upper_end) = shards
                .range((std::ops::Bound::Excluded(lower_end), std::ops::Bound::Unbounded))
                .next()
                .map(|(end, _)| *end)
            else {
                break;
            };

            let (Some(lower), Some(upper)) = (shards.get(&lower_end), shards.get(&upper_end)) else {
                break;
            };
            match lower.merge(upper, self.capacity) {
                Ok(merged) => {
                    shards.remove(&lower_end);
                    shards.insert(upper_end, merged);
                    merges += 1;
                    cursor = Some(upper_end);
                }
                Err(StorageError::CapacityExceeded { .. }) => cursor = Some(upper_end),
                Err(e) => return Err(e),
            }
        }

        if merges > 0 {
            tracing::info!("Compacted store: {} merge(s), {} shard(s) left", merges, shards.len());
        }
        Ok(merges)
    }

    pub async fn len(&self) -> usize {
        self.shards.read().await.values().map(StorageShard::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn shard_count(&self) -> usize {
        self.shards.read().await.len()
    }

    /// `(range, entry count)` of every shard in hash order.
    pub async fn shard_ranges(&self) -> Vec<(ShardRange, usize)> {
        self.shards
            .read()
            .await
            .values()
            .map(|shard| (shard.range(), shard.len()))
            .collect()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.shards
            .read()
            .await
            .values()
            .flat_map(|shard| shard.keys().map(str::to_string).collect::<Vec<_>>())
            .collect()
    }

    /// Splits the shard owning `hash`. A failed split leaves the shard as it was; it will be
    /// attempted again on the next write that finds it over capacity.
    fn split_shard(&self, shards: &mut BTreeMap<Position, StorageShard>, hash: Position) {
        let Some((&end, shard)) = shards.range(hash..).next() else {
            return;
        };
        let shard_id = shard.id();
        match shard.split() {
            Ok(SplitResult {
                lower,
                upper,
                lower_boundary,
                upper_boundary,
            }) => {
                tracing::info!(
                    "Split shard {} at {}: lower {} entries (up to {}), upper {} entries (up to {})",
                    shard_id,
                    lower_boundary,
                    lower.len(),
                    lower_boundary,
                    upper.len(),
                    upper_boundary
                );
                shards.insert(end, upper);
                shards.insert(lower_boundary, lower);
            }
            Err(e) => {
                tracing::error!("Failed to split shard {}: {}", shard_id, e);
            }
        }
    }
}

fn owning_shard(
    shards: &BTreeMap<Position, StorageShard>,
    hash: Position,
) -> Option<&StorageShard> {
    shards.range(hash..).next().map(|(_, shard)| shard)
}

fn owning_shard_mut(
    shards: &mut BTreeMap<Position, StorageShard>,
    hash: Position,
) -> Result<&mut StorageShard, StorageError> {
    shards
        .range_mut(hash..)
        .next()
        .map(|(_, shard)| shard)
        .ok_or_else(|| StorageError::Corrupt(format!("no shard covers {}", hash)))
}

fn place_shard(
    shards: &mut BTreeMap<Position, StorageShard>,
    mut shard: StorageShard,
) -> Result<(), StorageError> {
    loop {
        let end = shard.range().end;
        if !shards.contains_key(&end) {
            shards.insert(end, shard);
            return Ok(());
        }
        let holder = &shards[&end];
        let cut = match holder.range().start {
            Some(start) if Some(start) > shard.range().start => start,
            _ => {
                return Err(StorageError::Corrupt(format!(
                    "shards {} and {} cover the same interval",
                    holder.id(),
                    shard.id()
                )));
            }
        };
        let holder_id = holder.id();
        let dropped = shard.truncate(cut)?;
        tracing::warn!(
            "Shard {} overlapped shard {} after an interrupted split or merge: trimmed to end at {}, {} entries left to {}",
            shard.id(),
            holder_id,
            cut,
            dropped,
            holder_id
        );
    }
}

fn check_tiling(shards: &BTreeMap<Position, StorageShard>) -> Result<(), StorageError> {
    let mut expected_start: Option<Position> = None;
    for shard in shards.values() {
        let range = shard.range();
        if range.start != expected_start {
            return Err(StorageError::Corrupt(format!(
                "shard {} starts at {:?}, expected {:?}",
                shard.id(),
                range.start,
                expected_start
            )));
        }
        expected_start = Some(range.end);
    }
    if expected_start != Some(Position::MAX) {
        return Err(StorageError::Corrupt(
            "shards do not reach the top of the hash space".to_string(),
        ));
    }
    Ok(())
}
