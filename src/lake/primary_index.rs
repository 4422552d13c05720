// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! In-memory primary index and its process-wide cache.
//!
//! The cache hands out pinned entry handles; an entry can only be
//! removed by key while unpinned. Eviction with outstanding pins removes
//! the entry from the cache immediately, the value itself is dropped when
//! the last pin goes away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::lake::proto::TabletMetadataPb;
use crate::lake::status::Status;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentRowRef {
    pub segment_id: u32,
    pub row_id: u32,
}

/// Map from encoded primary key to the row currently visible under it.
pub struct LakePrimaryIndex {
    tablet_id: i64,
    data_version: i64,
    loaded: bool,
    keys: hashbrown::HashMap<Vec<u8>, SegmentRowRef>,
    key_bytes: usize,
}

impl LakePrimaryIndex {
    pub fn new(tablet_id: i64) -> Self {
        Self {
            tablet_id,
            data_version: 0,
            loaded: false,
            keys: hashbrown::HashMap::new(),
            key_bytes: 0,
        }
    }

    pub fn tablet_id(&self) -> i64 {
        self.tablet_id
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn data_version(&self) -> i64 {
        self.data_version
    }

    pub fn mark_loaded(&mut self, version: i64) {
        self.loaded = true;
        self.data_version = version;
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<SegmentRowRef> {
        self.keys.get(key).copied()
    }

    /// Returns the displaced row when |key| was already mapped.
    pub fn insert(&mut self, key: Vec<u8>, row_ref: SegmentRowRef) -> Option<SegmentRowRef> {
        let key_len = key.len();
        match self.keys.insert(key, row_ref) {
            Some(old) => Some(old),
            None => {
                self.key_bytes += key_len;
                None
            }
        }
    }

    pub fn erase(&mut self, key: &[u8]) -> Option<SegmentRowRef> {
        let removed = self.keys.remove(key);
        if removed.is_some() {
            self.key_bytes = self.key_bytes.saturating_sub(key.len());
        }
        removed
    }

    /// Drops every mapping that still points into one of |segment_ranges|
    /// (half-open id ranges). Used after compaction supersedes input
    /// rowsets.
    pub fn erase_segment_ranges(&mut self, segment_ranges: &[(u32, u32)]) {
        let mut removed_bytes = 0_usize;
        self.keys.retain(|key, row_ref| {
            let dead = segment_ranges
                .iter()
                .any(|(start, end)| row_ref.segment_id >= *start && row_ref.segment_id < *end);
            if dead {
                removed_bytes += key.len();
            }
            !dead
        });
        self.key_bytes = self.key_bytes.saturating_sub(removed_bytes);
    }

    pub fn unload(&mut self) {
        self.keys = hashbrown::HashMap::new();
        self.key_bytes = 0;
        self.loaded = false;
        self.data_version = 0;
    }

    /// Marks the index as reflecting the about-to-be-persisted metadata.
    pub fn commit(&mut self, metadata: &TabletMetadataPb) -> Result<(), Status> {
        if !self.loaded {
            return Err(Status::InternalError(format!(
                "commit on unloaded primary index: tablet_id={}",
                self.tablet_id
            )));
        }
        self.data_version = metadata.version.ok_or_else(|| {
            Status::InternalError("tablet metadata missing version in index commit".to_string())
        })?;
        Ok(())
    }

    pub fn memory_usage(&self) -> usize {
        self.key_bytes + self.keys.len() * std::mem::size_of::<SegmentRowRef>()
    }
}

pub struct IndexCacheEntry {
    key: u64,
    value: Mutex<LakePrimaryIndex>,
    object_size: AtomicUsize,
}

impl IndexCacheEntry {
    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn value(&self) -> &Mutex<LakePrimaryIndex> {
        &self.value
    }

    pub fn object_size(&self) -> usize {
        self.object_size.load(Ordering::Relaxed)
    }
}

/// A pin on a cache entry. Dropping the handle releases the pin.
pub type IndexEntryHandle = Arc<IndexCacheEntry>;

#[derive(Default)]
pub struct IndexCache {
    entries: Mutex<HashMap<u64, Arc<IndexCacheEntry>>>,
    total_object_size: AtomicUsize,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the entry for |key|, creating an empty index when absent.
    pub fn get_or_create(&self, key: u64) -> IndexEntryHandle {
        let mut entries = self.entries.lock();
        Arc::clone(entries.entry(key).or_insert_with(|| {
            Arc::new(IndexCacheEntry {
                key,
                value: Mutex::new(LakePrimaryIndex::new(key as i64)),
                object_size: AtomicUsize::new(0),
            })
        }))
    }

    pub fn get(&self, key: u64) -> Option<IndexEntryHandle> {
        self.entries.lock().get(&key).map(Arc::clone)
    }

    pub fn contains(&self, key: u64) -> bool {
        self.entries.lock().contains_key(&key)
    }

    /// Installs a fresh value under |key|, replacing whatever was cached.
    pub fn install(&self, key: u64, index: LakePrimaryIndex) {
        let size = index.memory_usage();
        let entry = Arc::new(IndexCacheEntry {
            key,
            value: Mutex::new(index),
            object_size: AtomicUsize::new(size),
        });
        let old = self.entries.lock().insert(key, entry);
        if let Some(old) = old {
            self.total_object_size
                .fetch_sub(old.object_size(), Ordering::Relaxed);
        }
        self.total_object_size.fetch_add(size, Ordering::Relaxed);
    }

    /// Releases a pin. The entry stays cached.
    pub fn release(&self, entry: IndexEntryHandle) {
        drop(entry);
    }

    /// Evicts the entry from the cache. Outstanding pins keep the value
    /// alive until dropped.
    pub fn remove(&self, entry: &IndexEntryHandle) {
        let mut entries = self.entries.lock();
        if let Some(cached) = entries.get(&entry.key) {
            if Arc::ptr_eq(cached, entry) {
                entries.remove(&entry.key);
                self.total_object_size
                    .fetch_sub(entry.object_size(), Ordering::Relaxed);
            }
        }
    }

    /// Evicts by key only when no pin is outstanding.
    pub fn try_remove_by_key(&self, key: u64) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            None => true,
            // The map itself holds one reference.
            Some(entry) if Arc::strong_count(entry) > 1 => false,
            Some(_) => {
                let removed = entries.remove(&key);
                if let Some(entry) = removed {
                    self.total_object_size
                        .fetch_sub(entry.object_size(), Ordering::Relaxed);
                }
                true
            }
        }
    }

    pub fn update_object_size(&self, entry: &IndexEntryHandle, bytes: usize) {
        let old = entry.object_size.swap(bytes, Ordering::Relaxed);
        self.total_object_size.fetch_sub(old, Ordering::Relaxed);
        self.total_object_size.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn total_object_size(&self) -> usize {
        self.total_object_size.load(Ordering::Relaxed)
    }
}
