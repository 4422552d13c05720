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

//! On-store layout of a tablet root.
//!
//! `meta/` holds immutable versioned metadata objects, `data/` holds
//! delete-vector files and segment key sidecars. File names embed ids in
//! zero-padded hex so a directory listing sorts by version.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::lake::status::Status;

pub const META_DIR: &str = "meta";
pub const DATA_DIR: &str = "data";

const META_SUFFIX: &str = ".meta";
const DELVEC_SUFFIX: &str = ".delvec";

pub fn tablet_metadata_filename(tablet_id: i64, version: i64) -> String {
    format!("{:016x}_{:016x}{}", tablet_id, version, META_SUFFIX)
}

pub fn parse_tablet_metadata_filename(name: &str) -> Option<(i64, i64)> {
    let trimmed = name.strip_suffix(META_SUFFIX)?;
    let (tablet_hex, version_hex) = trimmed.split_once('_')?;
    let tablet_id = i64::from_str_radix(tablet_hex, 16).ok()?;
    let version = i64::from_str_radix(version_hex, 16).ok()?;
    Some((tablet_id, version))
}

/// Delvec file for one apply. The txn id prefix keeps names unique across
/// versions; the uuid part is derived deterministically so retried writes
/// of the same apply land on the same object.
pub fn delvec_filename(tablet_id: i64, txn_id: i64, version: i64) -> String {
    let seed = format!("delvec_file:tablet={tablet_id}:txn={txn_id}:version={version}");
    format!(
        "{:016x}_{}{}",
        txn_id as u64,
        deterministic_uuid_from_seed(&seed),
        DELVEC_SUFFIX
    )
}

pub fn segment_keys_filename(segment_name: &str) -> String {
    format!("{}.keys", segment_name.trim_start_matches('/'))
}

fn deterministic_uuid_from_seed(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    let mut bytes = [0_u8; 16];
    bytes.copy_from_slice(&digest[0..16]);

    // RFC 4122 variant/version bits, UUIDv4 layout.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex = hex::encode(bytes);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

pub fn write_file(path: &Path, bytes: &[u8]) -> Result<(), Status> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

pub fn read_file(path: &Path) -> Result<Vec<u8>, Status> {
    if !path.exists() {
        return Err(Status::NotFound(format!(
            "file not found: {}",
            path.display()
        )));
    }
    Ok(fs::read(path)?)
}

pub fn read_file_if_exists(path: &Path) -> Result<Option<Vec<u8>>, Status> {
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(fs::read(path)?))
}

/// Largest metadata version present under |meta_dir| for |tablet_id|.
pub fn discover_latest_metadata_version(
    meta_dir: &Path,
    tablet_id: i64,
) -> Result<Option<i64>, Status> {
    if !meta_dir.exists() {
        return Ok(None);
    }
    let mut latest: Option<i64> = None;
    for entry in fs::read_dir(meta_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some((parsed_tablet, version)) = parse_tablet_metadata_filename(name) else {
            continue;
        };
        if parsed_tablet != tablet_id {
            continue;
        }
        latest = Some(latest.map_or(version, |v: i64| v.max(version)));
    }
    Ok(latest)
}

pub fn tablet_meta_dir(tablet_root: &Path) -> PathBuf {
    tablet_root.join(META_DIR)
}

pub fn tablet_data_dir(tablet_root: &Path) -> PathBuf {
    tablet_root.join(DATA_DIR)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn metadata_filename_roundtrip() {
        let name = tablet_metadata_filename(42, 7);
        assert!(name.ends_with(".meta"));
        assert_eq!(parse_tablet_metadata_filename(&name), Some((42, 7)));
        assert_eq!(parse_tablet_metadata_filename("garbage"), None);
        assert_eq!(parse_tablet_metadata_filename("zz_yy.meta"), None);
    }

    #[test]
    fn delvec_filename_is_deterministic_and_txn_prefixed() {
        let a = delvec_filename(1, 0x2a, 9);
        let b = delvec_filename(1, 0x2a, 9);
        assert_eq!(a, b);
        assert!(a.starts_with("000000000000002a_"));
        assert_ne!(a, delvec_filename(1, 0x2a, 10));
    }

    #[test]
    fn latest_version_discovery_scans_only_matching_tablet() {
        let dir = tempdir().expect("create tempdir");
        let meta_dir = dir.path().join(META_DIR);
        for (tablet, version) in [(7_i64, 2_i64), (7, 5), (8, 9)] {
            write_file(
                &meta_dir.join(tablet_metadata_filename(tablet, version)),
                b"x",
            )
            .expect("write meta file");
        }
        assert_eq!(
            discover_latest_metadata_version(&meta_dir, 7).expect("discover"),
            Some(5)
        );
        assert_eq!(
            discover_latest_metadata_version(&meta_dir, 1).expect("discover"),
            None
        );
    }

    #[test]
    fn read_file_reports_not_found() {
        let dir = tempdir().expect("create tempdir");
        let err = read_file(&dir.path().join("missing")).unwrap_err();
        assert!(err.is_not_found());
    }
}
