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

//! Online primary-key recover: rebuilds the delete vectors and the
//! primary index from the rowset key columns alone, discarding whatever
//! inconsistent state triggered it. Invoked only from the apply path and
//! bounded there to one run per step.

use std::collections::BTreeMap;

use roaring::RoaringBitmap;

use crate::lake::delvec::DelVector;
use crate::lake::meta_file::MetaFileBuilder;
use crate::lake::primary_index::{LakePrimaryIndex, SegmentRowRef};
use crate::lake::proto::TabletMetadataPb;
use crate::lake::status::Status;
use crate::lake::tablet::Tablet;
use crate::lake::update_manager::{LakeUpdateManager, UpdateManager};

pub struct LakePrimaryKeyRecover<'a> {
    update_mgr: &'a LakeUpdateManager,
    builder: &'a mut MetaFileBuilder,
    tablet: &'a Tablet,
    metadata: &'a mut TabletMetadataPb,
}

impl<'a> LakePrimaryKeyRecover<'a> {
    pub fn new(
        update_mgr: &'a LakeUpdateManager,
        builder: &'a mut MetaFileBuilder,
        tablet: &'a Tablet,
        metadata: &'a mut TabletMetadataPb,
    ) -> Self {
        Self {
            update_mgr,
            builder,
            tablet,
            metadata,
        }
    }

    /// Walks the rowsets in apply order and re-derives which rows are
    /// live: a key seen again supersedes its earlier row. The resulting
    /// delete vectors replace every stale page, and the rebuilt index is
    /// installed into the cache for the steps that follow.
    pub fn recover(mut self) -> Result<(), Status> {
        let version = self.metadata.version.ok_or_else(|| {
            Status::InternalError("tablet metadata missing version in recover".to_string())
        })?;

        self.builder.clear_delvecs();

        let mut index = LakePrimaryIndex::new(self.tablet.id());
        let mut deletes: BTreeMap<u32, RoaringBitmap> = BTreeMap::new();
        for rowset in &self.metadata.rowsets {
            let rowset_id = rowset.id.ok_or_else(|| {
                Status::InternalError(format!(
                    "rowset missing id in recover: tablet_id={}",
                    self.tablet.id()
                ))
            })?;
            for (seg_idx, segment_name) in rowset.segments.iter().enumerate() {
                let segment_id = rowset_id + seg_idx as u32;
                // Every segment gets its delete vector rewritten, even
                // when no row turns out deleted; a stale page must not
                // survive the rebuild.
                deletes.entry(segment_id).or_default();
                let keys = self
                    .update_mgr
                    .key_source()
                    .segment_keys(self.tablet, segment_name)?;
                for (row_idx, key) in keys.into_iter().enumerate() {
                    let row_ref = SegmentRowRef {
                        segment_id,
                        row_id: row_idx as u32,
                    };
                    if let Some(old) = index.insert(key, row_ref) {
                        deletes.entry(old.segment_id).or_default().insert(old.row_id);
                    }
                }
            }
        }
        index.mark_loaded(version);

        // Every page is re-derived above; drop the stale mapping wholesale
        // and let finalize install the rebuilt ones.
        self.metadata.delvec_meta = None;
        let rebuilt_segments = deletes.len();
        for (segment_id, bitmap) in deletes {
            let mut delvec = DelVector::with_version(version);
            delvec.union_bitmap(&bitmap);
            self.builder.append_delvec(delvec, segment_id);
        }

        let key_count = index.len();
        self.update_mgr
            .index_cache()
            .install(self.tablet.id() as u64, index);

        tracing::info!(
            "primary key recover rebuilt state: tablet_id={} version={} keys={} delvec_segments={}",
            self.tablet.id(),
            version,
            key_count,
            rebuilt_segments
        );
        Ok(())
    }
}
