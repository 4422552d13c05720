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

//! Tablet handles and the file-backed metadata store.
//!
//! A tablet metadata object is immutable once written; a new version is a
//! new file under `meta/`. Writes are last-writer-wins per
//! `(tablet_id, version)`.

use std::path::PathBuf;
use std::sync::Arc;

use prost::Message;

use crate::common::config::LakeConfig;
use crate::lake::layout::{
    discover_latest_metadata_version, read_file, tablet_meta_dir, tablet_metadata_filename,
    write_file,
};
use crate::lake::proto::TabletMetadataPb;
use crate::lake::status::Status;
use crate::lake::update_manager::{
    FileSegmentKeySource, LakeUpdateManager, SegmentKeySource, UpdateManager,
};

pub struct TabletManager {
    root: PathBuf,
    config: Arc<LakeConfig>,
    update_mgr: Arc<dyn UpdateManager>,
}

impl TabletManager {
    pub fn new(root: impl Into<PathBuf>, config: LakeConfig) -> Arc<Self> {
        Self::with_key_source(root, config, Arc::new(FileSegmentKeySource))
    }

    pub fn with_key_source(
        root: impl Into<PathBuf>,
        config: LakeConfig,
        key_source: Arc<dyn SegmentKeySource>,
    ) -> Arc<Self> {
        let config = Arc::new(config);
        let update_mgr = Arc::new(LakeUpdateManager::new(config.clone(), key_source));
        Self::with_update_manager(root, config, update_mgr)
    }

    pub fn with_update_manager(
        root: impl Into<PathBuf>,
        config: Arc<LakeConfig>,
        update_mgr: Arc<dyn UpdateManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            root: root.into(),
            config,
            update_mgr,
        })
    }

    pub fn config(&self) -> &LakeConfig {
        &self.config
    }

    pub fn update_mgr(&self) -> &Arc<dyn UpdateManager> {
        &self.update_mgr
    }

    pub fn get_tablet(self: &Arc<Self>, tablet_id: i64) -> Tablet {
        Tablet {
            id: tablet_id,
            mgr: Arc::clone(self),
        }
    }

    pub fn tablet_root(&self, tablet_id: i64) -> PathBuf {
        self.root.join(tablet_id.to_string())
    }

    pub fn put_tablet_metadata(&self, metadata: &TabletMetadataPb) -> Result<(), Status> {
        let tablet_id = metadata
            .id
            .ok_or_else(|| Status::InternalError("tablet metadata missing id".to_string()))?;
        let version = metadata
            .version
            .ok_or_else(|| Status::InternalError("tablet metadata missing version".to_string()))?;
        let path = tablet_meta_dir(&self.tablet_root(tablet_id))
            .join(tablet_metadata_filename(tablet_id, version));
        write_file(&path, &metadata.encode_to_vec())
    }

    pub fn get_tablet_metadata(
        &self,
        tablet_id: i64,
        version: i64,
    ) -> Result<TabletMetadataPb, Status> {
        let path = tablet_meta_dir(&self.tablet_root(tablet_id))
            .join(tablet_metadata_filename(tablet_id, version));
        let bytes = read_file(&path)?;
        let metadata = TabletMetadataPb::decode(bytes.as_slice())?;
        if metadata.id != Some(tablet_id) || metadata.version != Some(version) {
            return Err(Status::Corruption(format!(
                "tablet metadata identity mismatch: file tablet_id={} version={}, decoded tablet_id={:?} version={:?}",
                tablet_id, version, metadata.id, metadata.version
            )));
        }
        Ok(metadata)
    }

    pub fn latest_tablet_version(&self, tablet_id: i64) -> Result<Option<i64>, Status> {
        discover_latest_metadata_version(&tablet_meta_dir(&self.tablet_root(tablet_id)), tablet_id)
    }
}

/// Lightweight handle to one tablet. Cheap to clone; all state lives in
/// the manager and on store.
#[derive(Clone)]
pub struct Tablet {
    id: i64,
    mgr: Arc<TabletManager>,
}

impl Tablet {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn tablet_mgr(&self) -> &Arc<TabletManager> {
        &self.mgr
    }

    pub fn update_mgr(&self) -> &Arc<dyn UpdateManager> {
        self.mgr.update_mgr()
    }

    pub fn config(&self) -> &LakeConfig {
        self.mgr.config()
    }

    pub fn root(&self) -> PathBuf {
        self.mgr.tablet_root(self.id)
    }

    pub fn put_metadata(&self, metadata: &TabletMetadataPb) -> Result<(), Status> {
        self.mgr.put_tablet_metadata(metadata)
    }

    pub fn get_metadata(&self, version: i64) -> Result<TabletMetadataPb, Status> {
        self.mgr.get_tablet_metadata(self.id, version)
    }

    pub fn latest_version(&self) -> Result<Option<i64>, Status> {
        self.mgr.latest_tablet_version(self.id)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::common::config::LakeConfig;
    use crate::lake::proto::{RowsetMetadataPb, TabletMetadataPb};

    use super::TabletManager;

    fn test_metadata(tablet_id: i64, version: i64) -> TabletMetadataPb {
        TabletMetadataPb {
            id: Some(tablet_id),
            version: Some(version),
            rowsets: vec![RowsetMetadataPb {
                id: Some(1),
                segments: vec!["seg_a.dat".to_string()],
                num_rows: Some(3),
                ..Default::default()
            }],
            next_rowset_id: Some(2),
            cumulative_point: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn put_get_metadata_roundtrip() {
        let dir = tempdir().expect("create tempdir");
        let mgr = TabletManager::new(dir.path(), LakeConfig::default());
        let meta = test_metadata(10, 3);
        mgr.put_tablet_metadata(&meta).expect("put metadata");
        let loaded = mgr.get_tablet_metadata(10, 3).expect("get metadata");
        assert_eq!(loaded, meta);
    }

    #[test]
    fn latest_version_tracks_highest_put() {
        let dir = tempdir().expect("create tempdir");
        let mgr = TabletManager::new(dir.path(), LakeConfig::default());
        assert_eq!(mgr.latest_tablet_version(10).expect("latest"), None);
        for version in [1, 4, 2] {
            mgr.put_tablet_metadata(&test_metadata(10, version))
                .expect("put metadata");
        }
        assert_eq!(mgr.latest_tablet_version(10).expect("latest"), Some(4));
    }

    #[test]
    fn missing_metadata_is_not_found() {
        let dir = tempdir().expect("create tempdir");
        let mgr = TabletManager::new(dir.path(), LakeConfig::default());
        let err = mgr.get_tablet_metadata(10, 9).unwrap_err();
        assert!(err.is_not_found());
    }
}
