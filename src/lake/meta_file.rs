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

//! The meta-file builder buffers delete-vector updates during one apply
//! and finalises them together with the new metadata version.
//! `finalize` is the sole persistence point of a primary-key apply.

use std::collections::BTreeMap;

use crate::lake::delvec::{crc32c_mask, DelVector};
use crate::lake::layout::{delvec_filename, tablet_data_dir, write_file};
use crate::lake::proto::{DelvecMetadataPb, DelvecPagePb, FileMetaPb, TabletMetadataPb};
use crate::lake::status::Status;
use crate::lake::tablet::Tablet;

/// Set by deeper layers when they detect that the primary index or the
/// delete vectors need a rebuild. `RecoverWithPublish` additionally asks
/// for the failed step to be re-executed after the rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoverFlag {
    Ok,
    Recover,
    RecoverWithPublish,
}

pub struct MetaFileBuilder {
    tablet: Tablet,
    // Sorted by segment id so the delvec file layout is deterministic.
    delvecs: BTreeMap<u32, DelVector>,
    recover_flag: RecoverFlag,
}

impl MetaFileBuilder {
    pub fn new(tablet: Tablet) -> Self {
        Self {
            tablet,
            delvecs: BTreeMap::new(),
            recover_flag: RecoverFlag::Ok,
        }
    }

    /// Buffers |delvec| for |segment_id|; the last append per segment
    /// wins.
    pub fn append_delvec(&mut self, delvec: DelVector, segment_id: u32) {
        self.delvecs.insert(segment_id, delvec);
    }

    pub fn buffered_delvec_count(&self) -> usize {
        self.delvecs.len()
    }

    pub fn buffered_delvec(&self, segment_id: u32) -> Option<&DelVector> {
        self.delvecs.get(&segment_id)
    }

    /// Discards every buffered delvec. Used by recover before it rebuilds
    /// delete vectors from scratch.
    pub fn clear_delvecs(&mut self) {
        self.delvecs.clear();
    }

    /// Drops buffered delvecs whose segments no longer exist, e.g. after
    /// a compaction consumed their rowsets within the same apply.
    pub fn retain_delvecs<F>(&mut self, mut keep: F)
    where
        F: FnMut(u32) -> bool,
    {
        self.delvecs.retain(|segment_id, _| keep(*segment_id));
    }

    pub fn recover_flag(&self) -> RecoverFlag {
        self.recover_flag
    }

    pub fn set_recover_flag(&mut self, flag: RecoverFlag) {
        self.recover_flag = flag;
    }

    /// Writes the buffered delete vectors into one delvec file named with
    /// the |max_txn_id| prefix, installs their pages into the metadata,
    /// then persists the metadata version.
    pub fn finalize(
        &mut self,
        metadata: &mut TabletMetadataPb,
        max_txn_id: i64,
    ) -> Result<(), Status> {
        let version = metadata.version.ok_or_else(|| {
            Status::InternalError("tablet metadata missing version in finalize".to_string())
        })?;
        if !self.delvecs.is_empty() {
            let mut file_bytes = Vec::new();
            let mut pages = Vec::with_capacity(self.delvecs.len());
            for (segment_id, delvec) in &self.delvecs {
                let payload = delvec.save()?;
                let page = DelvecPagePb {
                    version: Some(delvec.version()),
                    offset: Some(file_bytes.len() as u64),
                    size: Some(payload.len() as u64),
                    crc32c: Some(crc32c_mask(crc32c::crc32c(&payload))),
                    crc32c_gen_version: Some(delvec.version()),
                };
                file_bytes.extend_from_slice(&payload);
                pages.push((*segment_id, page));
            }

            let file_name = delvec_filename(self.tablet.id(), max_txn_id, version);
            let path = tablet_data_dir(&self.tablet.root()).join(&file_name);
            write_file(&path, &file_bytes)?;

            let delvec_meta = metadata
                .delvec_meta
                .get_or_insert_with(DelvecMetadataPb::default);
            delvec_meta.version_to_file.insert(
                version,
                FileMetaPb {
                    name: Some(file_name),
                    size: Some(file_bytes.len() as u64),
                },
            );
            for (segment_id, page) in pages {
                delvec_meta.delvecs.insert(segment_id, page);
            }
        }
        self.tablet.put_metadata(metadata)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::common::config::LakeConfig;
    use crate::lake::delvec::{crc32c_unmask, DelVector};
    use crate::lake::layout::{read_file, tablet_data_dir};
    use crate::lake::proto::TabletMetadataPb;
    use crate::lake::tablet::TabletManager;

    use super::{MetaFileBuilder, RecoverFlag};

    #[test]
    fn finalize_without_delvecs_only_persists_metadata() {
        let dir = tempdir().expect("create tempdir");
        let mgr = TabletManager::new(dir.path(), LakeConfig::default());
        let tablet = mgr.get_tablet(5);
        let mut metadata = TabletMetadataPb {
            id: Some(5),
            version: Some(2),
            ..Default::default()
        };
        let mut builder = MetaFileBuilder::new(tablet.clone());
        builder.finalize(&mut metadata, 77).expect("finalize");
        assert!(metadata.delvec_meta.is_none());
        assert_eq!(tablet.get_metadata(2).expect("get metadata"), metadata);
    }

    #[test]
    fn finalize_writes_delvec_file_and_pages() {
        let dir = tempdir().expect("create tempdir");
        let mgr = TabletManager::new(dir.path(), LakeConfig::default());
        let tablet = mgr.get_tablet(5);
        let mut metadata = TabletMetadataPb {
            id: Some(5),
            version: Some(3),
            ..Default::default()
        };
        let mut builder = MetaFileBuilder::new(tablet.clone());
        let mut dv = DelVector::with_version(3);
        dv.mark_deleted(4);
        builder.append_delvec(dv, 11);
        builder.finalize(&mut metadata, 0x99).expect("finalize");

        let delvec_meta = metadata.delvec_meta.as_ref().expect("delvec meta");
        let page = delvec_meta.delvecs.get(&11).expect("page for segment 11");
        assert_eq!(page.version, Some(3));
        let file = delvec_meta.version_to_file.get(&3).expect("file mapping");
        let file_name = file.name.as_deref().expect("file name");
        assert!(file_name.starts_with("0000000000000099_"));

        let bytes = read_file(&tablet_data_dir(&tablet.root()).join(file_name))
            .expect("read delvec file");
        let offset = page.offset.unwrap() as usize;
        let size = page.size.unwrap() as usize;
        let payload = &bytes[offset..offset + size];
        assert_eq!(
            crc32c_unmask(page.crc32c.unwrap()),
            crc32c::crc32c(payload)
        );
        let mut loaded = DelVector::new();
        loaded.load(3, payload).expect("load delvec payload");
        assert!(loaded.contains(4));
    }

    #[test]
    fn recover_flag_defaults_ok_and_is_settable() {
        let dir = tempdir().expect("create tempdir");
        let mgr = TabletManager::new(dir.path(), LakeConfig::default());
        let mut builder = MetaFileBuilder::new(mgr.get_tablet(1));
        assert_eq!(builder.recover_flag(), RecoverFlag::Ok);
        builder.set_recover_flag(RecoverFlag::RecoverWithPublish);
        assert_eq!(builder.recover_flag(), RecoverFlag::RecoverWithPublish);
    }
}
