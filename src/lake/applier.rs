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

//! Applies transaction logs on top of a base tablet metadata snapshot to
//! produce the next metadata version. One applier instance serves one
//! `(tablet, base metadata, new version)` triple on one driver thread:
//! `init()` once, `apply(log)` in caller order, `finish()` as the commit
//! point. Dropping an unfinished primary-key applier rolls the pinned
//! index entry back.

use std::cmp;
use std::sync::Arc;

use crate::lake::delvec::DelVector;
use crate::lake::meta_file::{MetaFileBuilder, RecoverFlag};
use crate::lake::primary_index::IndexEntryHandle;
use crate::lake::proto::{
    next_rowset_id, txn_log_pb, KeysType, ReplicationTxnStatePb, TabletMetadataPb, TxnLogPb,
};
use crate::lake::status::Status;
use crate::lake::tablet::Tablet;
use crate::lake::update_manager::{PkIndexLockGuard, UpdateManager};

pub trait TxnLogApplier {
    fn init(&mut self) -> Result<(), Status> {
        Ok(())
    }

    fn apply(&mut self, log: &TxnLogPb) -> Result<(), Status>;

    fn finish(&mut self) -> Result<(), Status>;

    /// In-progress metadata. Only meaningful before `finish()` persists
    /// it; afterwards the store holds the authoritative copy.
    fn metadata(&self) -> &TabletMetadataPb;
}

pub fn new_txn_log_applier(
    tablet: Tablet,
    metadata: TabletMetadataPb,
    new_version: i64,
) -> Box<dyn TxnLogApplier> {
    if metadata.keys_type() == Some(KeysType::PrimaryKeys) {
        return Box::new(PrimaryKeyTxnLogApplier::new(tablet, metadata, new_version));
    }
    Box::new(NonPrimaryKeyTxnLogApplier::new(tablet, metadata, new_version))
}

fn apply_alter_meta_log(
    metadata: &mut TabletMetadataPb,
    op_alter_metadata: &txn_log_pb::OpAlterMetadata,
    update_mgr: &Arc<dyn UpdateManager>,
) -> Result<(), Status> {
    let tablet_id = metadata.id.unwrap_or(0);
    for alter_meta in &op_alter_metadata.metadata_update_infos {
        if let Some(enable) = alter_meta.enable_persistent_index {
            metadata.enable_persistent_index = Some(enable);
            update_mgr.set_enable_persistent_index(tablet_id, enable);
            // May fail while an in-flight apply pins the index; that apply
            // evicts the entry on its own release.
            let _ = update_mgr.try_remove_primary_index_by_key(tablet_id);
        }
        if let Some(schema) = alter_meta.tablet_schema.as_ref() {
            tracing::debug!(
                "alter tablet schema: tablet_id={} old_schema_id={:?} new_schema_id={:?}",
                tablet_id,
                metadata.schema.as_ref().and_then(|s| s.id),
                schema.id
            );
            metadata.schema = Some(schema.clone());
        }
    }
    Ok(())
}

enum PkStep<'a> {
    Write(&'a txn_log_pb::OpWrite, i64),
    Compaction(&'a txn_log_pb::OpCompaction, i64),
}

pub struct PrimaryKeyTxnLogApplier {
    tablet: Tablet,
    metadata: TabletMetadataPb,
    base_version: i64,
    new_version: i64,
    // File name prefix of the delvec file emitted at finalize.
    max_txn_id: i64,
    builder: MetaFileBuilder,
    index_entry: Option<IndexEntryHandle>,
    guard: Option<PkIndexLockGuard>,
    has_finalized: bool,
}

impl PrimaryKeyTxnLogApplier {
    pub fn new(tablet: Tablet, mut metadata: TabletMetadataPb, new_version: i64) -> Self {
        let base_version = metadata.version.unwrap_or(0);
        metadata.version = Some(new_version);
        let builder = MetaFileBuilder::new(tablet.clone());
        Self {
            tablet,
            metadata,
            base_version,
            new_version,
            max_txn_id: 0,
            builder,
            index_entry: None,
            guard: None,
            has_finalized: false,
        }
    }

    fn check_meta_version(&self) -> Result<(), Status> {
        self.tablet
            .update_mgr()
            .check_meta_version(&self.tablet, self.base_version)
    }

    fn handle_failure(&mut self) {
        let Some(entry) = self.index_entry.take() else {
            self.guard = None;
            return;
        };
        if !self.has_finalized {
            // Unload first, then let go of the per-tablet index lock, then
            // evict, so the next prepare rebuilds from persisted state.
            entry.value().lock().unload();
            self.guard = None;
            self.tablet.update_mgr().remove_primary_index_cache(entry);
        } else {
            self.guard = None;
            self.tablet.update_mgr().release_primary_index_cache(entry);
        }
    }

    fn run_step(&mut self, step: &PkStep<'_>) -> Result<(), Status> {
        match step {
            PkStep::Write(op_write, txn_id) => self.apply_write_log(op_write, *txn_id),
            PkStep::Compaction(op_compaction, txn_id) => {
                self.apply_compaction_log(op_compaction, *txn_id)
            }
        }
    }

    fn check_and_recover(&mut self, step: &PkStep<'_>) -> Result<(), Status> {
        let ret = self.run_step(step);
        let need_recover = self.builder.recover_flag() != RecoverFlag::Ok;
        if self.tablet.config().enable_primary_key_recover && need_recover {
            let need_re_publish = self.builder.recover_flag() == RecoverFlag::RecoverWithPublish;
            tracing::info!(
                "primary key recover begin: tablet_id={} base_version={}",
                self.tablet.id(),
                self.base_version
            );
            // The recover routine installs a rebuilt index into the cache;
            // our pin on the inconsistent entry goes first.
            if let Some(entry) = self.index_entry.take() {
                self.tablet.update_mgr().release_primary_index_cache(entry);
            }
            let update_mgr = Arc::clone(self.tablet.update_mgr());
            update_mgr.recover_primary_key_tablet(
                &mut self.builder,
                &self.tablet,
                &mut self.metadata,
            )?;
            tracing::info!(
                "primary key recover finish: tablet_id={} base_version={}",
                self.tablet.id(),
                self.base_version
            );
            self.builder.set_recover_flag(RecoverFlag::Ok);
            if need_re_publish {
                // Re-execute the step exactly once; a second recover
                // request from the retry propagates as an error.
                return self.run_step(step);
            }
            // Recover already re-established a consistent state.
            return Ok(());
        }
        ret
    }

    fn apply_write_log(
        &mut self,
        op_write: &txn_log_pb::OpWrite,
        txn_id: i64,
    ) -> Result<(), Status> {
        let update_mgr = Arc::clone(self.tablet.update_mgr());
        // Excludes index GC on this tablet for the duration of the step.
        let _shard_guard = update_mgr.lock_pk_index_shard(self.tablet.id());

        // Prepared on the first write/compaction step instead of in
        // init(): the index must observe a landed schema change.
        if self.index_entry.is_none() {
            let entry = update_mgr.prepare_primary_index(
                &self.tablet,
                &self.metadata,
                &mut self.builder,
                self.base_version,
                self.new_version,
                &mut self.guard,
            )?;
            self.index_entry = Some(entry);
        }
        let empty_rowset = op_write.rowset.as_ref().map_or(true, |rowset| {
            rowset.num_rows.unwrap_or(0) == 0 && rowset.delete_predicate.is_none()
        });
        if op_write.dels.is_empty() && empty_rowset {
            return Ok(());
        }
        let Some(entry) = self.index_entry.as_ref() else {
            return Err(Status::InternalError(
                "primary index not prepared for write".to_string(),
            ));
        };
        update_mgr.publish_primary_key_tablet(
            op_write,
            txn_id,
            &mut self.metadata,
            &self.tablet,
            entry,
            &mut self.builder,
            self.base_version,
        )
    }

    fn apply_compaction_log(
        &mut self,
        op_compaction: &txn_log_pb::OpCompaction,
        txn_id: i64,
    ) -> Result<(), Status> {
        let update_mgr = Arc::clone(self.tablet.update_mgr());
        let _shard_guard = update_mgr.lock_pk_index_shard(self.tablet.id());

        if self.index_entry.is_none() {
            let entry = update_mgr.prepare_primary_index(
                &self.tablet,
                &self.metadata,
                &mut self.builder,
                self.base_version,
                self.new_version,
                &mut self.guard,
            )?;
            self.index_entry = Some(entry);
        }
        if op_compaction.input_rowsets.is_empty() {
            debug_assert!(op_compaction
                .output_rowset
                .as_ref()
                .map_or(true, |rowset| rowset.num_rows.unwrap_or(0) == 0));
            return Ok(());
        }
        let Some(entry) = self.index_entry.as_ref() else {
            return Err(Status::InternalError(
                "primary index not prepared for compaction".to_string(),
            ));
        };
        update_mgr.publish_primary_compaction(
            op_compaction,
            txn_id,
            &mut self.metadata,
            &self.tablet,
            entry,
            &mut self.builder,
            self.base_version,
        )
    }

    fn apply_schema_change_log(
        &mut self,
        op_schema_change: &txn_log_pb::OpSchemaChange,
    ) -> Result<(), Status> {
        debug_assert_eq!(1, self.base_version);
        debug_assert_eq!(0, self.metadata.rowsets.len());
        for rowset in &op_schema_change.rowsets {
            debug_assert!(rowset.id.is_some());
            let new_rowset = rowset.clone();
            self.metadata.next_rowset_id = Some(cmp::max(
                self.metadata.next_rowset_id.unwrap_or(0),
                new_rowset.id.unwrap_or(0) + new_rowset.id_span(),
            ));
            self.metadata.rowsets.push(new_rowset);
        }
        if let Some(delvec_meta) = op_schema_change.delvec_meta.as_ref() {
            debug_assert!(op_schema_change.linked_segment.unwrap_or(false));
            self.metadata.delvec_meta = Some(delvec_meta.clone());
        }
        // alter_version + 1 < new_version means other logs follow the
        // schema change log in this batch: they must see a durable
        // post-schema-change base, and the primary index is prepared only
        // after the schema change has landed.
        let alter_version = op_schema_change.alter_version.unwrap_or(0);
        if alter_version + 1 < self.new_version {
            self.base_version = alter_version;
            let mut base_meta = self.metadata.clone();
            base_meta.version = Some(self.base_version);
            self.tablet.put_metadata(&base_meta)?;
        }
        Ok(())
    }

    fn apply_replication_log(
        &mut self,
        op_replication: &txn_log_pb::OpReplication,
        txn_id: i64,
    ) -> Result<(), Status> {
        let txn_meta = op_replication.txn_meta.as_ref().ok_or_else(|| {
            Status::Corruption("replication log missing txn meta".to_string())
        })?;
        let txn_state = txn_meta
            .txn_state
            .and_then(|raw| ReplicationTxnStatePb::try_from(raw).ok());
        if txn_state != Some(ReplicationTxnStatePb::TxnReplicated) {
            tracing::warn!(
                "fail to apply replication log, invalid txn meta state: {:?}",
                txn_state
            );
            return Err(Status::Corruption(format!(
                "invalid txn meta state: {}",
                txn_state.map_or("UNKNOWN", |s| s.as_str_name())
            )));
        }
        if txn_meta.snapshot_version != Some(self.new_version) {
            tracing::warn!(
                "fail to apply replication log, mismatched snapshot version and new version: snapshot_version={:?} new_version={}",
                txn_meta.snapshot_version,
                self.new_version
            );
            return Err(Status::Corruption(
                "mismatched snapshot version and new version".to_string(),
            ));
        }

        if txn_meta.incremental_snapshot.unwrap_or(false) {
            debug_assert_eq!(
                self.new_version - self.base_version,
                op_replication.op_writes.len() as i64
            );
            for op_write in &op_replication.op_writes {
                self.apply_write_log(op_write, txn_id)?;
            }
            tracing::info!(
                "apply pk incremental replication log finish: tablet_id={} base_version={} new_version={} txn_id={}",
                self.tablet.id(),
                self.base_version,
                self.new_version,
                txn_id
            );
        } else {
            let rebase_id = self
                .metadata
                .next_rowset_id
                .unwrap_or_else(|| next_rowset_id(&self.metadata.rowsets));
            let old_rowsets = std::mem::take(&mut self.metadata.rowsets);
            self.metadata.delvec_meta = None;

            let mut new_next_rowset_id = rebase_id;
            for op_write in &op_replication.op_writes {
                let Some(rowset) = op_write.rowset.as_ref() else {
                    continue;
                };
                let mut new_rowset = rowset.clone();
                // Replicated ids restart at zero; rebasing keeps them
                // disjoint from any surviving history.
                let new_rowset_id = new_rowset.id.unwrap_or(0) + rebase_id;
                new_rowset.id = Some(new_rowset_id);
                new_next_rowset_id =
                    cmp::max(new_next_rowset_id, new_rowset_id + new_rowset.id_span());
                self.metadata.rowsets.push(new_rowset);
            }

            // Replicated delvecs address segment ids in the snapshot's id
            // space; shift them by the same base as the rowsets.
            for (segment_id, delvec_data) in &op_replication.delvecs {
                let mut delvec = DelVector::new();
                delvec.load(self.new_version, delvec_data)?;
                self.builder.append_delvec(delvec, segment_id + rebase_id);
            }

            self.metadata.next_rowset_id = Some(new_next_rowset_id);
            self.metadata.cumulative_point = Some(0);
            self.metadata.compaction_inputs = old_rowsets;

            // The cached index reflects the replaced history.
            self.tablet.update_mgr().unload_primary_index(self.tablet.id());

            tracing::info!(
                "apply pk full replication log finish: tablet_id={} base_version={} new_version={} txn_id={}",
                self.tablet.id(),
                self.base_version,
                self.new_version,
                txn_id
            );
        }

        if let Some(source_schema) = op_replication.source_schema.as_ref() {
            self.metadata.source_schema = Some(source_schema.clone());
        }

        Ok(())
    }
}

impl TxnLogApplier for PrimaryKeyTxnLogApplier {
    fn init(&mut self) -> Result<(), Status> {
        self.check_meta_version()
    }

    fn apply(&mut self, log: &TxnLogPb) -> Result<(), Status> {
        let txn_id = log.txn_id.unwrap_or(0);
        self.max_txn_id = cmp::max(self.max_txn_id, txn_id);
        if let Some(op_write) = log.op_write.as_ref() {
            self.check_and_recover(&PkStep::Write(op_write, txn_id))?;
        }
        if let Some(op_compaction) = log.op_compaction.as_ref() {
            self.check_and_recover(&PkStep::Compaction(op_compaction, txn_id))?;
        }
        if let Some(op_schema_change) = log.op_schema_change.as_ref() {
            self.apply_schema_change_log(op_schema_change)?;
        }
        if let Some(op_alter_metadata) = log.op_alter_metadata.as_ref() {
            debug_assert_eq!(self.base_version + 1, self.new_version);
            return apply_alter_meta_log(
                &mut self.metadata,
                op_alter_metadata,
                self.tablet.update_mgr(),
            );
        }
        if let Some(op_replication) = log.op_replication.as_ref() {
            self.apply_replication_log(op_replication, txn_id)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Status> {
        // `commit` must precede `finalize`: if either fails the index is
        // still rolled back in handle_failure. With no pinned entry this
        // apply touched no primary-key state.
        if let Some(entry) = self.index_entry.as_ref() {
            let memory_usage = {
                let mut index = entry.value().lock();
                index.commit(&self.metadata)?;
                index.memory_usage()
            };
            self.tablet
                .update_mgr()
                .index_cache()
                .update_object_size(entry, memory_usage);
        }
        self.builder.finalize(&mut self.metadata, self.max_txn_id)?;
        self.has_finalized = true;
        Ok(())
    }

    fn metadata(&self) -> &TabletMetadataPb {
        &self.metadata
    }
}

impl Drop for PrimaryKeyTxnLogApplier {
    fn drop(&mut self) {
        self.handle_failure();
    }
}

pub struct NonPrimaryKeyTxnLogApplier {
    tablet: Tablet,
    metadata: TabletMetadataPb,
    new_version: i64,
}

impl NonPrimaryKeyTxnLogApplier {
    pub fn new(tablet: Tablet, metadata: TabletMetadataPb, new_version: i64) -> Self {
        Self {
            tablet,
            metadata,
            new_version,
        }
    }

    fn apply_write_log(&mut self, op_write: &txn_log_pb::OpWrite) -> Result<(), Status> {
        if let Some(rowset) = op_write.rowset.as_ref() {
            if rowset.num_rows.unwrap_or(0) > 0 || rowset.delete_predicate.is_some() {
                let rowset_id = self
                    .metadata
                    .next_rowset_id
                    .unwrap_or_else(|| next_rowset_id(&self.metadata.rowsets));
                let mut new_rowset = rowset.clone();
                new_rowset.id = Some(rowset_id);
                self.metadata.next_rowset_id = Some(rowset_id + new_rowset.id_span());
                self.metadata.rowsets.push(new_rowset);
            }
        }
        Ok(())
    }

    fn apply_compaction_log(
        &mut self,
        op_compaction: &txn_log_pb::OpCompaction,
    ) -> Result<(), Status> {
        // A compaction log without input and output rowsets is valid.
        if op_compaction.input_rowsets.is_empty() {
            debug_assert!(op_compaction
                .output_rowset
                .as_ref()
                .map_or(true, |rowset| rowset.num_rows.unwrap_or(0) == 0));
            return Ok(());
        }

        let first_input_id = op_compaction.input_rowsets[0];
        let first_idx = self
            .metadata
            .rowsets
            .iter()
            .position(|r| r.id == Some(first_input_id))
            .ok_or_else(|| {
                Status::InternalError(format!("input rowset {} not found", first_input_id))
            })?;

        // Safety check:
        // 1. All input rowsets must exist in the metadata.
        // 2. Position of the input rowsets must be adjacent.
        let mut pre = first_idx;
        for input_id in op_compaction.input_rowsets.iter().skip(1) {
            let found = self
                .metadata
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

        let inputs: Vec<_> = self.metadata.rowsets[first_idx..end].to_vec();
        self.metadata.compaction_inputs.extend(inputs);

        let output_rowset = op_compaction
            .output_rowset
            .as_ref()
            .filter(|rowset| rowset.num_rows.unwrap_or(0) > 0);
        let has_output = output_rowset.is_some();
        let mut erase_start = first_idx;
        if let Some(output) = output_rowset {
            // Replace the first input slot with the output rowset.
            let output_id = self
                .metadata
                .next_rowset_id
                .unwrap_or_else(|| next_rowset_id(&self.metadata.rowsets));
            let mut new_rowset = output.clone();
            new_rowset.id = Some(output_id);
            // Advances by the plain segment count, without the max(1, _)
            // floor used on every other allocation path.
            self.metadata.next_rowset_id = Some(output_id + output.segments.len() as u32);
            self.metadata.rowsets[first_idx] = new_rowset;
            erase_start = first_idx + 1;
        }
        self.metadata.rowsets.drain(erase_start..end);

        // Size-tiered compaction does not maintain the cumulative point.
        let mut new_cumulative_point = 0_u32;
        if !self.tablet.config().enable_size_tiered_compaction_strategy {
            let old_cp = self.metadata.cumulative_point.unwrap_or(0);
            let input_count = op_compaction.input_rowsets.len() as u32;
            if first_idx as u32 >= old_cp {
                // Cumulative compaction.
                new_cumulative_point = first_idx as u32;
            } else if old_cp >= input_count {
                // Base compaction.
                new_cumulative_point = old_cp - input_count;
            }
            if has_output {
                new_cumulative_point += 1;
            }
            if new_cumulative_point as usize > self.metadata.rowsets.len() {
                return Err(Status::InternalError(format!(
                    "new cumulative point: {} exceeds rowset size: {}",
                    new_cumulative_point,
                    self.metadata.rowsets.len()
                )));
            }
        }
        self.metadata.cumulative_point = Some(new_cumulative_point);

        let rowset_ids: Vec<u32> = self.metadata.rowsets.iter().filter_map(|r| r.id).collect();
        let delete_rowset_ids: Vec<u32> = self
            .metadata
            .rowsets
            .iter()
            .filter(|r| r.delete_predicate.is_some())
            .filter_map(|r| r.id)
            .collect();
        tracing::info!(
            "compaction finish: tablet_id={:?} version={:?} cumulative_point={} rowsets={:?} delete_rowsets={:?}",
            self.metadata.id,
            self.metadata.version,
            new_cumulative_point,
            rowset_ids,
            delete_rowset_ids
        );
        Ok(())
    }

    fn apply_schema_change_log(
        &mut self,
        op_schema_change: &txn_log_pb::OpSchemaChange,
    ) -> Result<(), Status> {
        debug_assert_eq!(0, self.metadata.rowsets.len());
        for rowset in &op_schema_change.rowsets {
            debug_assert!(rowset.id.is_some());
            let new_rowset = rowset.clone();
            self.metadata.next_rowset_id = Some(cmp::max(
                self.metadata.next_rowset_id.unwrap_or(0),
                new_rowset.id.unwrap_or(0) + new_rowset.id_span(),
            ));
            self.metadata.rowsets.push(new_rowset);
        }
        debug_assert!(op_schema_change.delvec_meta.is_none());
        Ok(())
    }

    fn apply_replication_log(
        &mut self,
        op_replication: &txn_log_pb::OpReplication,
    ) -> Result<(), Status> {
        let txn_meta = op_replication.txn_meta.as_ref().ok_or_else(|| {
            Status::Corruption("replication log missing txn meta".to_string())
        })?;
        let txn_state = txn_meta
            .txn_state
            .and_then(|raw| ReplicationTxnStatePb::try_from(raw).ok());
        if txn_state != Some(ReplicationTxnStatePb::TxnReplicated) {
            tracing::warn!(
                "fail to apply replication log, invalid txn meta state: {:?}",
                txn_state
            );
            return Err(Status::Corruption(format!(
                "invalid txn meta state: {}",
                txn_state.map_or("UNKNOWN", |s| s.as_str_name())
            )));
        }
        if txn_meta.snapshot_version != Some(self.new_version) {
            tracing::warn!(
                "fail to apply replication log, mismatched snapshot version and new version: snapshot_version={:?} new_version={}",
                txn_meta.snapshot_version,
                self.new_version
            );
            return Err(Status::Corruption(
                "mismatched snapshot version and new version".to_string(),
            ));
        }

        if txn_meta.incremental_snapshot.unwrap_or(false) {
            for op_write in &op_replication.op_writes {
                self.apply_write_log(op_write)?;
            }
            tracing::info!(
                "apply incremental replication log finish: tablet_id={} base_version={:?} new_version={} txn_id={:?}",
                self.tablet.id(),
                self.metadata.version,
                self.new_version,
                txn_meta.txn_id
            );
        } else {
            let old_rowsets = std::mem::take(&mut self.metadata.rowsets);

            for op_write in &op_replication.op_writes {
                self.apply_write_log(op_write)?;
            }

            self.metadata.cumulative_point = Some(0);
            self.metadata.compaction_inputs = old_rowsets;

            tracing::info!(
                "apply full replication log finish: tablet_id={} base_version={:?} new_version={} txn_id={:?}",
                self.tablet.id(),
                self.metadata.version,
                self.new_version,
                txn_meta.txn_id
            );
        }

        if let Some(source_schema) = op_replication.source_schema.as_ref() {
            self.metadata.source_schema = Some(source_schema.clone());
        }

        Ok(())
    }
}

impl TxnLogApplier for NonPrimaryKeyTxnLogApplier {
    fn apply(&mut self, log: &TxnLogPb) -> Result<(), Status> {
        if let Some(op_write) = log.op_write.as_ref() {
            self.apply_write_log(op_write)?;
        }
        if let Some(op_compaction) = log.op_compaction.as_ref() {
            self.apply_compaction_log(op_compaction)?;
        }
        if let Some(op_schema_change) = log.op_schema_change.as_ref() {
            self.apply_schema_change_log(op_schema_change)?;
        }
        if let Some(op_alter_metadata) = log.op_alter_metadata.as_ref() {
            return apply_alter_meta_log(
                &mut self.metadata,
                op_alter_metadata,
                self.tablet.update_mgr(),
            );
        }
        if let Some(op_replication) = log.op_replication.as_ref() {
            self.apply_replication_log(op_replication)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), Status> {
        self.metadata.version = Some(self.new_version);
        self.tablet.put_metadata(&self.metadata)
    }

    fn metadata(&self) -> &TabletMetadataPb {
        &self.metadata
    }
}
