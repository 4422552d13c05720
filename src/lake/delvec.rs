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

//! Per-segment delete vectors.
//!
//! Wire format: a one-byte format version followed by a serialized
//! roaring bitmap. Pages stored in delvec files carry a masked crc32c so
//! a checksum of zero never appears on disk.

use std::io::Cursor;

use roaring::RoaringBitmap;

use crate::lake::status::Status;

pub const DELVEC_FORMAT_VERSION_V1: u8 = 0x01;
const CRC32C_MASK_DELTA: u32 = 0xa282_ead8;

#[derive(Clone, Debug, Default)]
pub struct DelVector {
    version: i64,
    bitmap: RoaringBitmap,
}

impl DelVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(version: i64) -> Self {
        Self {
            version,
            bitmap: RoaringBitmap::new(),
        }
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn cardinality(&self) -> u64 {
        self.bitmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    pub fn contains(&self, row_id: u32) -> bool {
        self.bitmap.contains(row_id)
    }

    pub fn mark_deleted(&mut self, row_id: u32) {
        self.bitmap.insert(row_id);
    }

    pub fn union_bitmap(&mut self, other: &RoaringBitmap) {
        self.bitmap |= other;
    }

    pub fn bitmap(&self) -> &RoaringBitmap {
        &self.bitmap
    }

    pub fn memory_usage(&self) -> usize {
        self.bitmap.serialized_size()
    }

    /// Replaces this vector with the payload of one delvec page.
    pub fn load(&mut self, version: i64, payload: &[u8]) -> Result<(), Status> {
        if payload.is_empty() {
            return Err(Status::Corruption(format!(
                "invalid delvec payload (empty): version={}",
                version
            )));
        }
        if payload[0] != DELVEC_FORMAT_VERSION_V1 {
            return Err(Status::Corruption(format!(
                "invalid delvec payload format: version={}, flag={}",
                version, payload[0]
            )));
        }
        self.version = version;
        if payload.len() == 1 {
            self.bitmap = RoaringBitmap::new();
            return Ok(());
        }
        let mut cursor = Cursor::new(&payload[1..]);
        self.bitmap = RoaringBitmap::deserialize_from(&mut cursor).map_err(|e| {
            Status::Corruption(format!(
                "decode delvec roaring bitmap failed: version={}, error={}",
                version, e
            ))
        })?;
        Ok(())
    }

    pub fn save(&self) -> Result<Vec<u8>, Status> {
        let mut out = Vec::with_capacity(1 + self.bitmap.serialized_size());
        out.push(DELVEC_FORMAT_VERSION_V1);
        self.bitmap.serialize_into(&mut out).map_err(|e| {
            Status::InternalError(format!("serialize delvec bitmap failed: {}", e))
        })?;
        Ok(out)
    }
}

pub fn crc32c_mask(crc: u32) -> u32 {
    crc.rotate_left(17).wrapping_add(CRC32C_MASK_DELTA)
}

pub fn crc32c_unmask(masked: u32) -> u32 {
    masked.wrapping_sub(CRC32C_MASK_DELTA).rotate_right(17)
}

#[cfg(test)]
mod tests {
    use roaring::RoaringBitmap;

    use super::*;

    #[test]
    fn save_load_roundtrip() {
        let mut dv = DelVector::with_version(7);
        dv.mark_deleted(0);
        dv.mark_deleted(3);
        dv.mark_deleted(100_000);
        let payload = dv.save().expect("save delvec");
        assert_eq!(payload[0], DELVEC_FORMAT_VERSION_V1);

        let mut loaded = DelVector::new();
        loaded.load(9, &payload).expect("load delvec");
        assert_eq!(loaded.version(), 9);
        assert_eq!(loaded.cardinality(), 3);
        assert!(loaded.contains(3));
        assert!(!loaded.contains(4));
    }

    #[test]
    fn load_rejects_empty_and_unknown_format() {
        let mut dv = DelVector::new();
        assert!(dv.load(1, &[]).unwrap_err().is_corruption());
        assert!(dv.load(1, &[0x7f, 0, 0]).unwrap_err().is_corruption());
    }

    #[test]
    fn format_byte_alone_is_an_empty_vector() {
        let mut dv = DelVector::new();
        dv.load(5, &[DELVEC_FORMAT_VERSION_V1]).expect("load empty");
        assert!(dv.is_empty());
        assert_eq!(dv.version(), 5);
    }

    #[test]
    fn crc_mask_is_invertible_and_nonzero_on_zero() {
        for crc in [0_u32, 1, 0xdead_beef, u32::MAX] {
            assert_eq!(crc32c_unmask(crc32c_mask(crc)), crc);
        }
        assert_ne!(crc32c_mask(0), 0);
    }

    #[test]
    fn union_merges_over_base_bitmap() {
        let mut dv = DelVector::with_version(3);
        dv.mark_deleted(1);
        let mut added = RoaringBitmap::new();
        added.insert(2);
        added.insert(9);
        dv.union_bitmap(&added);
        assert_eq!(dv.cardinality(), 3);
    }
}
