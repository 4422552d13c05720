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

//! Shared fixtures for the applier integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lakemeta::common::config::LakeConfig;
use lakemeta::lake::meta_file::{MetaFileBuilder, RecoverFlag};
use lakemeta::lake::primary_index::{IndexCache, IndexEntryHandle};
use lakemeta::lake::proto::{
    txn_log_pb, ColumnPb, KeysType, ReplicationTxnStatePb, RowsetMetadataPb, TabletMetadataPb,
    TabletSchemaPb, TxnLogPb,
};
use lakemeta::lake::status::Status;
use lakemeta::lake::tablet::{Tablet, TabletManager};
use lakemeta::lake::update_manager::{
    LakeUpdateManager, PkIndexLockGuard, SegmentKeySource, UpdateManager,
};

pub fn test_schema(keys_type: KeysType) -> TabletSchemaPb {
    TabletSchemaPb {
        id: Some(1),
        keys_type: Some(keys_type as i32),
        column: vec![ColumnPb {
            unique_id: 1,
            name: Some("c1".to_string()),
            r#type: "BIGINT".to_string(),
            is_key: Some(true),
            is_nullable: Some(false),
        }],
        schema_version: Some(0),
    }
}

pub fn test_schema_v2(schema_id: i64) -> TabletSchemaPb {
    let mut schema = test_schema(KeysType::DupKeys);
    schema.id = Some(schema_id);
    schema.schema_version = Some(2);
    schema.column.push(ColumnPb {
        unique_id: 2,
        name: Some("c2".to_string()),
        r#type: "INT".to_string(),
        is_key: Some(false),
        is_nullable: Some(true),
    });
    schema
}

pub fn test_rowset(id: Option<u32>, segments: &[&str], num_rows: i64) -> RowsetMetadataPb {
    RowsetMetadataPb {
        id,
        segments: segments.iter().map(|s| s.to_string()).collect(),
        num_rows: Some(num_rows),
        data_size: Some(num_rows * 8),
        num_dels: Some(0),
        overlapped: Some(false),
        delete_predicate: None,
        version: None,
    }
}

pub fn base_metadata(
    tablet_id: i64,
    version: i64,
    keys_type: KeysType,
    rowsets: Vec<RowsetMetadataPb>,
    next_rowset_id: u32,
    cumulative_point: u32,
) -> TabletMetadataPb {
    TabletMetadataPb {
        id: Some(tablet_id),
        version: Some(version),
        schema: Some(test_schema(keys_type)),
        rowsets,
        next_rowset_id: Some(next_rowset_id),
        cumulative_point: Some(cumulative_point),
        delvec_meta: None,
        compaction_inputs: Vec::new(),
        enable_persistent_index: None,
        source_schema: None,
    }
}

pub fn write_log(txn_id: i64, tablet_id: i64, rowset: Option<RowsetMetadataPb>) -> TxnLogPb {
    write_log_with_dels(txn_id, tablet_id, rowset, Vec::new())
}

pub fn write_log_with_dels(
    txn_id: i64,
    tablet_id: i64,
    rowset: Option<RowsetMetadataPb>,
    dels: Vec<Vec<u8>>,
) -> TxnLogPb {
    TxnLogPb {
        tablet_id: Some(tablet_id),
        txn_id: Some(txn_id),
        op_write: Some(txn_log_pb::OpWrite { rowset, dels }),
        ..Default::default()
    }
}

pub fn compaction_log(
    txn_id: i64,
    tablet_id: i64,
    input_rowsets: &[u32],
    output_rowset: Option<RowsetMetadataPb>,
) -> TxnLogPb {
    TxnLogPb {
        tablet_id: Some(tablet_id),
        txn_id: Some(txn_id),
        op_compaction: Some(txn_log_pb::OpCompaction {
            input_rowsets: input_rowsets.to_vec(),
            output_rowset,
        }),
        ..Default::default()
    }
}

pub fn replication_txn_meta(
    state: ReplicationTxnStatePb,
    snapshot_version: i64,
    incremental: bool,
    txn_id: i64,
) -> txn_log_pb::ReplicationTxnMetaPb {
    txn_log_pb::ReplicationTxnMetaPb {
        txn_state: Some(state as i32),
        snapshot_version: Some(snapshot_version),
        incremental_snapshot: Some(incremental),
        txn_id: Some(txn_id),
    }
}

/// Rowset id ranges in `rowsets` and `compaction_inputs` must stay
/// pairwise disjoint and below `next_rowset_id`.
pub fn assert_rowset_ids_disjoint(metadata: &TabletMetadataPb) {
    let mut ranges: Vec<(u32, u32)> = Vec::new();
    for rowset in metadata.rowsets.iter().chain(metadata.compaction_inputs.iter()) {
        let id = rowset.id.expect("rowset id assigned");
        ranges.push((id, id + rowset.id_span()));
    }
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        assert!(
            pair[0].1 <= pair[1].0,
            "rowset id ranges overlap: {:?} vs {:?}",
            pair[0],
            pair[1]
        );
    }
    if let Some(next) = metadata.next_rowset_id {
        for (start, end) in &ranges {
            assert!(
                *end <= next,
                "rowset range [{}, {}) not covered by next_rowset_id {}",
                start,
                end,
                next
            );
        }
    }
}

pub fn rowset_ids(rowsets: &[RowsetMetadataPb]) -> Vec<u32> {
    rowsets.iter().filter_map(|r| r.id).collect()
}

/// In-memory stand-in for the segment reader's key column access.
#[derive(Default)]
pub struct MemKeySource {
    keys: Mutex<HashMap<String, Vec<Vec<u8>>>>,
}

impl MemKeySource {
    pub fn put(&self, segment_name: &str, keys: &[&[u8]]) {
        self.keys.lock().unwrap().insert(
            segment_name.to_string(),
            keys.iter().map(|k| k.to_vec()).collect(),
        );
    }
}

impl SegmentKeySource for MemKeySource {
    fn segment_keys(&self, _tablet: &Tablet, segment_name: &str) -> Result<Vec<Vec<u8>>, Status> {
        self.keys
            .lock()
            .unwrap()
            .get(segment_name)
            .cloned()
            .ok_or_else(|| Status::NotFound(format!("segment keys not staged: {}", segment_name)))
    }
}

/// Real tablet manager wired to the production update manager and an
/// in-memory key source.
pub fn pk_env(
    root: &Path,
    config: LakeConfig,
) -> (Arc<TabletManager>, Arc<MemKeySource>, Arc<LakeUpdateManager>) {
    let config = Arc::new(config);
    let key_source = Arc::new(MemKeySource::default());
    let update_mgr = Arc::new(LakeUpdateManager::new(
        config.clone(),
        key_source.clone() as Arc<dyn SegmentKeySource>,
    ));
    let mgr = TabletManager::with_update_manager(
        root,
        config,
        update_mgr.clone() as Arc<dyn UpdateManager>,
    );
    (mgr, key_source, update_mgr)
}

pub enum StepScript {
    Ok,
    Fail(RecoverFlag, &'static str),
}

/// Wraps the production update manager but scripts publish outcomes, so
/// tests can drive the recover flag without manufacturing on-disk
/// inconsistencies.
pub struct ScriptedUpdateManager {
    inner: LakeUpdateManager,
    scripts: Mutex<VecDeque<StepScript>>,
    publish_calls: AtomicUsize,
    recover_calls: AtomicUsize,
}

impl ScriptedUpdateManager {
    pub fn new(config: Arc<LakeConfig>) -> Self {
        Self {
            inner: LakeUpdateManager::new(
                config,
                Arc::new(MemKeySource::default()) as Arc<dyn SegmentKeySource>,
            ),
            scripts: Mutex::new(VecDeque::new()),
            publish_calls: AtomicUsize::new(0),
            recover_calls: AtomicUsize::new(0),
        }
    }

    pub fn push_script(&self, script: StepScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    pub fn recover_calls(&self) -> usize {
        self.recover_calls.load(Ordering::SeqCst)
    }

    fn run_script(&self, builder: &mut MetaFileBuilder) -> Result<(), Status> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        match self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StepScript::Ok)
        {
            StepScript::Ok => Ok(()),
            StepScript::Fail(flag, message) => {
                builder.set_recover_flag(flag);
                Err(Status::Corruption(message.to_string()))
            }
        }
    }
}

impl UpdateManager for ScriptedUpdateManager {
    fn check_meta_version(&self, tablet: &Tablet, base_version: i64) -> Result<(), Status> {
        self.inner.check_meta_version(tablet, base_version)
    }

    fn lock_pk_index_shard(&self, tablet_id: i64) -> PkIndexLockGuard {
        self.inner.lock_pk_index_shard(tablet_id)
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
        self.inner
            .prepare_primary_index(tablet, metadata, builder, base_version, new_version, guard)
    }

    fn publish_primary_key_tablet(
        &self,
        _op_write: &txn_log_pb::OpWrite,
        _txn_id: i64,
        _metadata: &mut TabletMetadataPb,
        _tablet: &Tablet,
        _index_entry: &IndexEntryHandle,
        builder: &mut MetaFileBuilder,
        _base_version: i64,
    ) -> Result<(), Status> {
        self.run_script(builder)
    }

    fn publish_primary_compaction(
        &self,
        _op_compaction: &txn_log_pb::OpCompaction,
        _txn_id: i64,
        _metadata: &mut TabletMetadataPb,
        _tablet: &Tablet,
        _index_entry: &IndexEntryHandle,
        builder: &mut MetaFileBuilder,
        _base_version: i64,
    ) -> Result<(), Status> {
        self.run_script(builder)
    }

    fn recover_primary_key_tablet(
        &self,
        builder: &mut MetaFileBuilder,
        _tablet: &Tablet,
        _metadata: &mut TabletMetadataPb,
    ) -> Result<(), Status> {
        self.recover_calls.fetch_add(1, Ordering::SeqCst);
        builder.clear_delvecs();
        Ok(())
    }

    fn release_primary_index_cache(&self, entry: IndexEntryHandle) {
        self.inner.release_primary_index_cache(entry);
    }

    fn remove_primary_index_cache(&self, entry: IndexEntryHandle) {
        self.inner.remove_primary_index_cache(entry);
    }

    fn unload_primary_index(&self, tablet_id: i64) {
        self.inner.unload_primary_index(tablet_id);
    }

    fn try_remove_primary_index_by_key(&self, tablet_id: i64) -> bool {
        self.inner.try_remove_primary_index_by_key(tablet_id)
    }

    fn set_enable_persistent_index(&self, tablet_id: i64, enable: bool) {
        self.inner.set_enable_persistent_index(tablet_id, enable);
    }

    fn index_cache(&self) -> &IndexCache {
        self.inner.index_cache()
    }
}

pub fn scripted_env(
    root: &Path,
    config: LakeConfig,
) -> (Arc<TabletManager>, Arc<ScriptedUpdateManager>) {
    let config = Arc::new(config);
    let scripted = Arc::new(ScriptedUpdateManager::new(config.clone()));
    let mgr = TabletManager::with_update_manager(
        root,
        config,
        scripted.clone() as Arc<dyn UpdateManager>,
    );
    (mgr, scripted)
}
