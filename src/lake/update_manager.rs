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

//! The update manager owns primary-index state shared across applies:
//! the index cache, the per-tablet index locks held for an applier's
//! lifetime, and the sharded step locks that exclude index GC while a
//! write or compaction step runs.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use roaring::RoaringBitmap;

use crate::common::config::LakeConfig;
use crate::lake::delvec::{crc32c_unmask, DelVector};
use crate::lake::layout::{read_file, segment_keys_filename, tablet_data_dir, write_file};
use crate::lake::meta_file::{MetaFileBuilder, RecoverFlag};
use crate::lake::primary_index::{
    IndexCache, IndexEntryHandle, LakePrimaryIndex, SegmentRowRef,
};
use crate::lake::proto::{next_rowset_id, txn_log_pb, RowsetMetadataPb, TabletMetadataPb};
use crate::lake::recover::LakePrimaryKeyRecover;
use crate::lake::status::Status;
use crate::lake::tablet::Tablet;

const PK_INDEX_SHARD_COUNT: usize = 32;

/// Owned lock guard; survives past the acquiring stack frame so the
/// applier can hold the per-tablet index lock across steps.
pub type PkIndexLockGuard = ArcMutexGuard<RawMutex, ()>;

/// Source of the encoded primary-key column of one segment, in row
/// order. The segment reader itself lives outside this crate; the
/// default implementation consumes the key sidecar the writer emits
/// next to each segment.
pub trait SegmentKeySource: Send + Sync {
    fn segment_keys(&self, tablet: &Tablet, segment_name: &str) -> Result<Vec<Vec<u8>>, Status>;
}

/// Reads `data/{segment}.keys` under the tablet root.
pub struct FileSegmentKeySource;

impl SegmentKeySource for FileSegmentKeySource {
    fn segment_keys(&self, tablet: &Tablet, segment_name: &str) -> Result<Vec<Vec<u8>>, Status> {
        let path = tablet_data_dir(&tablet.root()).join(segment_keys_filename(segment_name));
        let payload = read_file(&path)?;
        decode_segment_keys(&payload)
    }
}

pub fn encode_segment_keys(keys: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + keys.iter().map(|k| 4 + k.len()).sum::<usize>());
    out.extend_from_slice(&(keys.len() as u32).to_le_bytes());
    for key in keys {
        out.extend_from_slice(&(key.len() as u32).to_le_bytes());
        out.extend_from_slice(key);
    }
    out
}

pub fn decode_segment_keys(payload: &[u8]) -> Result<Vec<Vec<u8>>, Status> {
    let read_u32 = |buf: &[u8], at: usize| -> Result<u32, Status> {
        buf.get(at..at + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .ok_or_else(|| {
                Status::Corruption(format!(
                    "truncated segment key payload: offset={}, len={}",
                    at,
                    buf.len()
                ))
            })
    };
    let count = read_u32(payload, 0)? as usize;
    let mut keys = Vec::with_capacity(count);
    let mut at = 4_usize;
    for _ in 0..count {
        let len = read_u32(payload, at)? as usize;
        at += 4;
        let key = payload.get(at..at + len).ok_or_else(|| {
            Status::Corruption(format!(
                "truncated segment key payload: offset={}, key_len={}, len={}",
                at,
                len,
                payload.len()
            ))
        })?;
        keys.push(key.to_vec());
        at += len;
    }
    if at != payload.len() {
        return Err(Status::Corruption(format!(
            "trailing bytes in segment key payload: consumed={}, len={}",
            at,
            payload.len()
        )));
    }
    Ok(keys)
}

/// Writer-side helper emitting the key sidecar for one segment.
pub fn write_segment_keys(
    tablet_root: &Path,
    segment_name: &str,
    keys: &[Vec<u8>],
) -> Result<(), Status> {
    let path = tablet_data_dir(tablet_root).join(segment_keys_filename(segment_name));
    write_file(&path, &encode_segment_keys(keys))
}

/// Applier-facing contract. `LakeUpdateManager` is the production
/// implementation; tests may substitute their own to script publish
/// outcomes.
pub trait UpdateManager: Send + Sync {
    /// Guards against two appliers racing the same version bump: the
    /// latest on-store version must equal |base_version|.
    fn check_meta_version(&self, tablet: &Tablet, base_version: i64) -> Result<(), Status>;

    /// Excludes index GC on this tablet for the duration of one
    /// write/compaction step.
    fn lock_pk_index_shard(&self, tablet_id: i64) -> PkIndexLockGuard;

    /// Pins the tablet's index cache entry, loading the index at
    /// |base_version| when absent or stale. On first use |guard| is
    /// filled with the per-tablet index lock, held until applier
    /// destruction; a guard already present is left in place.
    fn prepare_primary_index(
        &self,
        tablet: &Tablet,
        metadata: &TabletMetadataPb,
        builder: &mut MetaFileBuilder,
        base_version: i64,
        new_version: i64,
        guard: &mut Option<PkIndexLockGuard>,
    ) -> Result<IndexEntryHandle, Status>;

    fn publish_primary_key_tablet(
        &self,
        op_write: &txn_log_pb::OpWrite,
        txn_id: i64,
        metadata: &mut TabletMetadataPb,
        tablet: &Tablet,
        index_entry: &IndexEntryHandle,
        builder: &mut MetaFileBuilder,
        base_version: i64,
    ) -> Result<(), Status>;

    fn publish_primary_compaction(
        &self,
        op_compaction: &txn_log_pb::OpCompaction,
        txn_id: i64,
        metadata: &mut TabletMetadataPb,
        tablet: &Tablet,
        index_entry: &IndexEntryHandle,
        builder: &mut MetaFileBuilder,
        base_version: i64,
    ) -> Result<(), Status>;

    /// Rebuilds the primary index and the delete vectors from scratch.
    fn recover_primary_key_tablet(
        &self,
        builder: &mut MetaFileBuilder,
        tablet: &Tablet,
        metadata: &mut TabletMetadataPb,
    ) -> Result<(), Status>;

    fn release_primary_index_cache(&self, entry: IndexEntryHandle);

    fn remove_primary_index_cache(&self, entry: IndexEntryHandle);

    fn unload_primary_index(&self, tablet_id: i64);

    /// Best-effort eviction; returns false while an apply still pins the
    /// entry.
    fn try_remove_primary_index_by_key(&self, tablet_id: i64) -> bool;

    fn set_enable_persistent_index(&self, tablet_id: i64, enable: bool);

    fn index_cache(&self) -> &IndexCache;
}

pub struct LakeUpdateManager {
    config: Arc<LakeConfig>,
    key_source: Arc<dyn SegmentKeySource>,
    index_cache: IndexCache,
    index_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
    shard_locks: Vec<Arc<Mutex<()>>>,
    persistent_index_flags: Mutex<HashMap<i64, bool>>,
}

impl LakeUpdateManager {
    pub fn new(config: Arc<LakeConfig>, key_source: Arc<dyn SegmentKeySource>) -> Self {
        Self {
            config,
            key_source,
            index_cache: IndexCache::new(),
            index_locks: Mutex::new(HashMap::new()),
            shard_locks: (0..PK_INDEX_SHARD_COUNT)
                .map(|_| Arc::new(Mutex::new(())))
                .collect(),
            persistent_index_flags: Mutex::new(HashMap::new()),
        }
    }

    pub fn persistent_index_enabled(&self, tablet_id: i64) -> Option<bool> {
        self.persistent_index_flags.lock().get(&tablet_id).copied()
    }

    pub(crate) fn key_source(&self) -> &Arc<dyn SegmentKeySource> {
        &self.key_source
    }

    fn tablet_index_lock(&self, tablet_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.index_locks.lock();
        Arc::clone(
            locks
                .entry(tablet_id)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Visible delete bitmap of one segment at the state described by
    /// |metadata|, read from the persisted delvec pages.
    pub(crate) fn load_segment_delvec(
        &self,
        tablet: &Tablet,
        metadata: &TabletMetadataPb,
        segment_id: u32,
    ) -> Result<DelVector, Status> {
        let Some(delvec_meta) = metadata.delvec_meta.as_ref() else {
            return Ok(DelVector::new());
        };
        let Some(page) = delvec_meta.delvecs.get(&segment_id) else {
            return Ok(DelVector::new());
        };
        let size = page.size.unwrap_or(0);
        if size == 0 {
            return Ok(DelVector::new());
        }
        let version = page.version.ok_or_else(|| {
            Status::Corruption(format!(
                "delvec page missing version: segment_id={}",
                segment_id
            ))
        })?;
        let file_name = delvec_meta
            .version_to_file
            .get(&version)
            .and_then(|f| f.name.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Status::Corruption(format!(
                    "delvec file mapping missing: segment_id={}, version={}",
                    segment_id, version
                ))
            })?;
        let bytes = read_file(&tablet_data_dir(&tablet.root()).join(file_name))?;
        let offset = page.offset.unwrap_or(0) as usize;
        let end = offset
            .checked_add(size as usize)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| {
                Status::Corruption(format!(
                    "delvec page out of file range: segment_id={}, offset={}, size={}, file_size={}",
                    segment_id,
                    offset,
                    size,
                    bytes.len()
                ))
            })?;
        let payload = &bytes[offset..end];

        if let Some(masked) = page.crc32c {
            if page.crc32c_gen_version == Some(version) {
                let expected = crc32c_unmask(masked);
                let actual = crc32c::crc32c(payload);
                if expected != actual {
                    return Err(Status::Corruption(format!(
                        "delvec crc32c mismatch: segment_id={}, version={}, expected={}, actual={}",
                        segment_id, version, expected, actual
                    )));
                }
            }
        }

        let mut delvec = DelVector::new();
        delvec.load(version, payload)?;
        Ok(delvec)
    }

    fn load_primary_index(
        &self,
        tablet: &Tablet,
        metadata: &TabletMetadataPb,
        index: &mut LakePrimaryIndex,
        builder: &mut MetaFileBuilder,
    ) -> Result<(), Status> {
        for rowset in &metadata.rowsets {
            let rowset_id = rowset.id.ok_or_else(|| {
                Status::InternalError(format!(
                    "rowset missing id while loading primary index: tablet_id={}",
                    tablet.id()
                ))
            })?;
            for (seg_idx, segment_name) in rowset.segments.iter().enumerate() {
                let segment_id = rowset_id + seg_idx as u32;
                let keys = self.key_source.segment_keys(tablet, segment_name)?;
                let delvec = self.load_segment_delvec(tablet, metadata, segment_id)?;
                for (row_idx, key) in keys.into_iter().enumerate() {
                    let row_id = row_idx as u32;
                    if delvec.contains(row_id) {
                        continue;
                    }
                    if let Some(old) = index.insert(key, SegmentRowRef { segment_id, row_id }) {
                        // Two live rows under one key: the delete vectors
                        // are out of step with the data. Ask for a rebuild
                        // and a re-publish of the in-flight step.
                        builder.set_recover_flag(RecoverFlag::RecoverWithPublish);
                        return Err(Status::Corruption(format!(
                            "duplicate primary key while loading index: tablet_id={}, segment_id={}, row_id={}, prev_segment_id={}, prev_row_id={}",
                            tablet.id(),
                            segment_id,
                            row_id,
                            old.segment_id,
                            old.row_id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Merges |added| over the segment's current delete bitmap, preferring
    /// delvecs already buffered in this apply over the persisted base.
    fn merge_delvec(
        &self,
        tablet: &Tablet,
        metadata: &TabletMetadataPb,
        builder: &MetaFileBuilder,
        segment_id: u32,
        added: &RoaringBitmap,
        version: i64,
    ) -> Result<DelVector, Status> {
        let mut delvec = DelVector::with_version(version);
        if let Some(buffered) = builder.buffered_delvec(segment_id) {
            delvec.union_bitmap(buffered.bitmap());
        } else {
            let base = self.load_segment_delvec(tablet, metadata, segment_id)?;
            delvec.union_bitmap(base.bitmap());
        }
        delvec.union_bitmap(added);
        Ok(delvec)
    }
}

fn in_ranges(segment_id: u32, ranges: &[(u32, u32)]) -> bool {
    ranges
        .iter()
        .any(|(start, end)| segment_id >= *start && segment_id < *end)
}

impl UpdateManager for LakeUpdateManager {
    fn check_meta_version(&self, tablet: &Tablet, base_version: i64) -> Result<(), Status> {
        match tablet.latest_version()? {
            None => Err(Status::NotFound(format!(
                "no metadata on store for tablet {}",
                tablet.id()
            ))),
            Some(latest) if latest == base_version => Ok(()),
            Some(latest) => Err(Status::VersionConflict(format!(
                "tablet {} expects base version {} but latest on-store version is {}",
                tablet.id(),
                base_version,
                latest
            ))),
        }
    }

    fn lock_pk_index_shard(&self, tablet_id: i64) -> PkIndexLockGuard {
        let shard = (tablet_id as u64 as usize) & (PK_INDEX_SHARD_COUNT - 1);
        self.shard_locks[shard].lock_arc()
    }

    fn prepare_primary_index(
        &self,
        tablet: &Tablet,
        metadata: &TabletMetadataPb,
        builder: &mut MetaFileBuilder,
        base_version: i64,
        new_version: i64,
        guard: &mut Option<PkIndexLockGuard>,
    ) -> Result<IndexEntryHandle, Status> {
        if guard.is_none() {
            let lock = self.tablet_index_lock(tablet.id());
            *guard = Some(lock.lock_arc());
        }
        let entry = self.index_cache.get_or_create(tablet.id() as u64);
        {
            let mut index = entry.value().lock();
            // A cached index rebuilt by recover mid-apply already sits at
            // the new version; anything else off the base is stale.
            if index.is_loaded()
                && index.data_version() != base_version
                && index.data_version() != new_version
            {
                tracing::info!(
                    "reloading stale primary index: tablet_id={} cached_version={} base_version={}",
                    tablet.id(),
                    index.data_version(),
                    base_version
                );
                index.unload();
            }
            if !index.is_loaded() {
                self.load_primary_index(tablet, metadata, &mut index, builder)
                    .map_err(|e| {
                        index.unload();
                        e
                    })?;
                index.mark_loaded(base_version);
            }
        }
        Ok(entry)
    }

    fn publish_primary_key_tablet(
        &self,
        op_write: &txn_log_pb::OpWrite,
        txn_id: i64,
        metadata: &mut TabletMetadataPb,
        tablet: &Tablet,
        index_entry: &IndexEntryHandle,
        builder: &mut MetaFileBuilder,
        base_version: i64,
    ) -> Result<(), Status> {
        let new_version = metadata.version.unwrap_or(0);
        let mut changed: BTreeMap<u32, RoaringBitmap> = BTreeMap::new();
        let mut appended: Option<(u32, RowsetMetadataPb)> = None;

        {
            let mut index = index_entry.value().lock();
            if let Some(rowset) = op_write.rowset.as_ref() {
                if rowset.num_rows.unwrap_or(0) > 0 || rowset.delete_predicate.is_some() {
                    let rowset_id = metadata
                        .next_rowset_id
                        .unwrap_or_else(|| next_rowset_id(&metadata.rowsets));
                    if rowset.num_rows.unwrap_or(0) > 0 {
                        for (seg_idx, segment_name) in rowset.segments.iter().enumerate() {
                            let segment_id = rowset_id + seg_idx as u32;
                            let keys = self.key_source.segment_keys(tablet, segment_name)?;
                            for (row_idx, key) in keys.into_iter().enumerate() {
                                let row_ref = SegmentRowRef {
                                    segment_id,
                                    row_id: row_idx as u32,
                                };
                                if let Some(old) = index.insert(key, row_ref) {
                                    changed
                                        .entry(old.segment_id)
                                        .or_default()
                                        .insert(old.row_id);
                                }
                            }
                        }
                    }
                    let mut new_rowset = rowset.clone();
                    new_rowset.id = Some(rowset_id);
                    appended = Some((rowset_id, new_rowset));
                }
            }

            for key in &op_write.dels {
                if let Some(old) = index.erase(key) {
                    changed.entry(old.segment_id).or_default().insert(old.row_id);
                }
            }
        }

        for (segment_id, added) in &changed {
            let delvec =
                self.merge_delvec(tablet, metadata, builder, *segment_id, added, new_version)?;
            builder.append_delvec(delvec, *segment_id);
        }

        if let Some((rowset_id, new_rowset)) = appended {
            metadata.next_rowset_id = Some(rowset_id + new_rowset.id_span());
            metadata.rowsets.push(new_rowset);
        }

        tracing::debug!(
            "publish primary key write finish: tablet_id={} txn_id={} base_version={} new_version={} changed_segments={}",
            tablet.id(),
            txn_id,
            base_version,
            new_version,
            changed.len()
        );
        Ok(())
    }

    fn publish_primary_compaction(
        &self,
        op_compaction: &txn_log_pb::OpCompaction,
        txn_id: i64,
        metadata: &mut TabletMetadataPb,
        tablet: &Tablet,
        index_entry: &IndexEntryHandle,
        builder: &mut MetaFileBuilder,
        base_version: i64,
    ) -> Result<(), Status> {
        debug_assert!(!op_compaction.input_rowsets.is_empty());
        let new_version = metadata.version.unwrap_or(0);

        let first_input_id = op_compaction.input_rowsets[0];
        let first_idx = metadata
            .rowsets
            .iter()
            .position(|r| r.id == Some(first_input_id))
            .ok_or_else(|| {
                Status::InternalError(format!("input rowset {} not found", first_input_id))
            })?;
        let mut pre = first_idx;
        for input_id in op_compaction.input_rowsets.iter().skip(1) {
            let found = metadata
                .rowsets
                .iter()
                .enumerate()
                .skip(pre + 1)
                .find(|(_, r)| r.id == Some(*input_id))
                .map(|(idx, _)| idx);
            match found {
                None => {
                    return Err(Status::InternalError(format!(
                        "input rowset {} not exist",
                        input_id
                    )))
                }
                Some(idx) if idx != pre + 1 => {
                    return Err(Status::InternalError(
                        "input rowset position not adjacent".to_string(),
                    ))
                }
                Some(idx) => pre = idx,
            }
        }
        let end = pre + 1;

        let input_ranges: Vec<(u32, u32)> = metadata.rowsets[first_idx..end]
            .iter()
            .map(|r| {
                let id = r.id.unwrap_or(0);
                (id, id + r.id_span())
            })
            .collect();

        let output_rowset = op_compaction
            .output_rowset
            .as_ref()
            .filter(|rowset| rowset.num_rows.unwrap_or(0) > 0);
        let has_output = output_rowset.is_some();
        let output_id = output_rowset.map(|_| {
            metadata
                .next_rowset_id
                .unwrap_or_else(|| next_rowset_id(&metadata.rowsets))
        });

        let mut changed: BTreeMap<u32, RoaringBitmap> = BTreeMap::new();
        {
            let mut index = index_entry.value().lock();
            if let (Some(output), Some(output_id)) = (output_rowset, output_id) {
                for (seg_idx, segment_name) in output.segments.iter().enumerate() {
                    let segment_id = output_id + seg_idx as u32;
                    let keys = self.key_source.segment_keys(tablet, segment_name)?;
                    for (row_idx, key) in keys.into_iter().enumerate() {
                        let row_ref = SegmentRowRef {
                            segment_id,
                            row_id: row_idx as u32,
                        };
                        if let Some(old) = index.insert(key, row_ref) {
                            // Rows re-pointed from input rowsets vanish with
                            // them; a displaced row anywhere else must be
                            // marked deleted.
                            if !in_ranges(old.segment_id, &input_ranges) {
                                changed
                                    .entry(old.segment_id)
                                    .or_default()
                                    .insert(old.row_id);
                            }
                        }
                    }
                }
            }
            // Rows compacted away keep no index entry.
            index.erase_segment_ranges(&input_ranges);
        }

        if let Some(delvec_meta) = metadata.delvec_meta.as_mut() {
            delvec_meta
                .delvecs
                .retain(|segment_id, _| !in_ranges(*segment_id, &input_ranges));
        }
        builder.retain_delvecs(|segment_id| !in_ranges(segment_id, &input_ranges));

        for (segment_id, added) in &changed {
            if in_ranges(*segment_id, &input_ranges) {
                continue;
            }
            let delvec =
                self.merge_delvec(tablet, metadata, builder, *segment_id, added, new_version)?;
            builder.append_delvec(delvec, *segment_id);
        }

        let inputs: Vec<_> = metadata.rowsets[first_idx..end].to_vec();
        metadata.compaction_inputs.extend(inputs);

        let mut erase_start = first_idx;
        if let (Some(output), Some(output_id)) = (output_rowset, output_id) {
            let mut out_rowset = output.clone();
            out_rowset.id = Some(output_id);
            metadata.next_rowset_id = Some(output_id + out_rowset.id_span());
            metadata.rowsets[first_idx] = out_rowset;
            erase_start = first_idx + 1;
        }
        metadata.rowsets.drain(erase_start..end);

        let mut new_cumulative_point = 0_u32;
        if !self.config.enable_size_tiered_compaction_strategy {
            let old_cp = metadata.cumulative_point.unwrap_or(0);
            let input_count = op_compaction.input_rowsets.len() as u32;
            if first_idx as u32 >= old_cp {
                new_cumulative_point = first_idx as u32;
            } else if old_cp >= input_count {
                new_cumulative_point = old_cp - input_count;
            }
            if has_output {
                new_cumulative_point += 1;
            }
            if new_cumulative_point as usize > metadata.rowsets.len() {
                return Err(Status::InternalError(format!(
                    "new cumulative point: {} exceeds rowset size: {}",
                    new_cumulative_point,
                    metadata.rowsets.len()
                )));
            }
        }
        metadata.cumulative_point = Some(new_cumulative_point);

        tracing::info!(
            "primary key compaction finish: tablet_id={} txn_id={} base_version={} new_version={} inputs={} output={:?} cumulative_point={}",
            tablet.id(),
            txn_id,
            base_version,
            new_version,
            op_compaction.input_rowsets.len(),
            output_id,
            new_cumulative_point
        );
        Ok(())
    }

    fn recover_primary_key_tablet(
        &self,
        builder: &mut MetaFileBuilder,
        tablet: &Tablet,
        metadata: &mut TabletMetadataPb,
    ) -> Result<(), Status> {
        LakePrimaryKeyRecover::new(self, builder, tablet, metadata).recover()
    }

    fn release_primary_index_cache(&self, entry: IndexEntryHandle) {
        self.index_cache.release(entry);
    }

    fn remove_primary_index_cache(&self, entry: IndexEntryHandle) {
        self.index_cache.remove(&entry);
    }

    fn unload_primary_index(&self, tablet_id: i64) {
        if let Some(entry) = self.index_cache.get(tablet_id as u64) {
            entry.value().lock().unload();
            self.index_cache.remove(&entry);
        }
    }

    fn try_remove_primary_index_by_key(&self, tablet_id: i64) -> bool {
        self.index_cache.try_remove_by_key(tablet_id as u64)
    }

    fn set_enable_persistent_index(&self, tablet_id: i64, enable: bool) {
        self.persistent_index_flags.lock().insert(tablet_id, enable);
    }

    fn index_cache(&self) -> &IndexCache {
        &self.index_cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_keys_roundtrip() {
        let keys = vec![b"a".to_vec(), Vec::new(), b"longer-key".to_vec()];
        let payload = encode_segment_keys(&keys);
        assert_eq!(decode_segment_keys(&payload).expect("decode"), keys);
        assert!(decode_segment_keys(&encode_segment_keys(&[]))
            .expect("decode empty")
            .is_empty());
    }

    #[test]
    fn segment_keys_decode_rejects_truncation() {
        let keys = vec![b"abc".to_vec()];
        let mut payload = encode_segment_keys(&keys);
        payload.truncate(payload.len() - 1);
        assert!(decode_segment_keys(&payload).unwrap_err().is_corruption());
        assert!(decode_segment_keys(&[1, 0]).unwrap_err().is_corruption());
    }

    #[test]
    fn segment_keys_decode_rejects_trailing_bytes() {
        let mut payload = encode_segment_keys(&[b"k".to_vec()]);
        payload.push(0);
        assert!(decode_segment_keys(&payload).unwrap_err().is_corruption());
    }
}
