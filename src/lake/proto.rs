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

//! Wire types for tablet metadata and transaction logs.
//!
//! Hand-written prost messages; field presence follows the optional style
//! the protobuf toolchain would generate, so metadata objects written by
//! older builds keep decoding.

use std::collections::HashMap;

use prost::Message;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum KeysType {
    DupKeys = 0,
    UniqueKeys = 1,
    AggKeys = 2,
    PrimaryKeys = 3,
}

#[derive(Clone, PartialEq, Message)]
pub struct ColumnPb {
    #[prost(uint32, tag = "1")]
    pub unique_id: u32,
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(string, tag = "3")]
    pub r#type: String,
    #[prost(bool, optional, tag = "4")]
    pub is_key: Option<bool>,
    #[prost(bool, optional, tag = "5")]
    pub is_nullable: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TabletSchemaPb {
    #[prost(int64, optional, tag = "1")]
    pub id: Option<i64>,
    #[prost(enumeration = "KeysType", optional, tag = "2")]
    pub keys_type: Option<i32>,
    #[prost(message, repeated, tag = "3")]
    pub column: Vec<ColumnPb>,
    #[prost(int32, optional, tag = "4")]
    pub schema_version: Option<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeletePredicatePb {
    #[prost(int64, optional, tag = "1")]
    pub version: Option<i64>,
    #[prost(string, repeated, tag = "2")]
    pub sub_predicates: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct RowsetMetadataPb {
    #[prost(uint32, optional, tag = "1")]
    pub id: Option<u32>,
    #[prost(string, repeated, tag = "2")]
    pub segments: Vec<String>,
    #[prost(int64, optional, tag = "3")]
    pub num_rows: Option<i64>,
    #[prost(int64, optional, tag = "4")]
    pub data_size: Option<i64>,
    #[prost(int64, optional, tag = "5")]
    pub num_dels: Option<i64>,
    #[prost(bool, optional, tag = "6")]
    pub overlapped: Option<bool>,
    #[prost(message, optional, tag = "7")]
    pub delete_predicate: Option<DeletePredicatePb>,
    #[prost(int64, optional, tag = "8")]
    pub version: Option<i64>,
}

impl RowsetMetadataPb {
    /// Number of rowset ids consumed by this rowset. A rowset spanning k
    /// segments owns the contiguous id range [id, id + max(1, k)).
    pub fn id_span(&self) -> u32 {
        std::cmp::max(1, self.segments.len() as u32)
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct FileMetaPb {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(uint64, optional, tag = "2")]
    pub size: Option<u64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DelvecPagePb {
    #[prost(int64, optional, tag = "1")]
    pub version: Option<i64>,
    #[prost(uint64, optional, tag = "2")]
    pub offset: Option<u64>,
    #[prost(uint64, optional, tag = "3")]
    pub size: Option<u64>,
    #[prost(uint32, optional, tag = "4")]
    pub crc32c: Option<u32>,
    #[prost(int64, optional, tag = "5")]
    pub crc32c_gen_version: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DelvecMetadataPb {
    #[prost(map = "uint32, message", tag = "1")]
    pub delvecs: HashMap<u32, DelvecPagePb>,
    #[prost(map = "int64, message", tag = "2")]
    pub version_to_file: HashMap<i64, FileMetaPb>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TabletMetadataPb {
    #[prost(int64, optional, tag = "1")]
    pub id: Option<i64>,
    #[prost(int64, optional, tag = "2")]
    pub version: Option<i64>,
    #[prost(message, optional, tag = "3")]
    pub schema: Option<TabletSchemaPb>,
    #[prost(message, repeated, tag = "4")]
    pub rowsets: Vec<RowsetMetadataPb>,
    #[prost(uint32, optional, tag = "5")]
    pub next_rowset_id: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub cumulative_point: Option<u32>,
    #[prost(message, optional, tag = "7")]
    pub delvec_meta: Option<DelvecMetadataPb>,
    #[prost(message, repeated, tag = "8")]
    pub compaction_inputs: Vec<RowsetMetadataPb>,
    #[prost(bool, optional, tag = "9")]
    pub enable_persistent_index: Option<bool>,
    #[prost(message, optional, tag = "10")]
    pub source_schema: Option<TabletSchemaPb>,
}

impl TabletMetadataPb {
    pub fn keys_type(&self) -> Option<KeysType> {
        self.schema
            .as_ref()
            .and_then(|schema| schema.keys_type)
            .and_then(|raw| KeysType::try_from(raw).ok())
    }
}

/// Smallest id strictly above every id already assigned in |rowsets|.
/// Used when metadata predates the explicit next_rowset_id field.
pub fn next_rowset_id(rowsets: &[RowsetMetadataPb]) -> u32 {
    rowsets
        .iter()
        .map(|r| r.id.unwrap_or(0).saturating_add(r.id_span()))
        .max()
        .unwrap_or(1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ReplicationTxnStatePb {
    TxnPrepared = 0,
    TxnReplicated = 1,
}

impl ReplicationTxnStatePb {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            ReplicationTxnStatePb::TxnPrepared => "TXN_PREPARED",
            ReplicationTxnStatePb::TxnReplicated => "TXN_REPLICATED",
        }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct TxnLogPb {
    #[prost(int64, optional, tag = "1")]
    pub tablet_id: Option<i64>,
    #[prost(int64, optional, tag = "2")]
    pub txn_id: Option<i64>,
    #[prost(message, optional, tag = "3")]
    pub op_write: Option<txn_log_pb::OpWrite>,
    #[prost(message, optional, tag = "4")]
    pub op_compaction: Option<txn_log_pb::OpCompaction>,
    #[prost(message, optional, tag = "5")]
    pub op_schema_change: Option<txn_log_pb::OpSchemaChange>,
    #[prost(message, optional, tag = "6")]
    pub op_alter_metadata: Option<txn_log_pb::OpAlterMetadata>,
    #[prost(message, optional, tag = "7")]
    pub op_replication: Option<txn_log_pb::OpReplication>,
}

pub mod txn_log_pb {
    use super::*;

    #[derive(Clone, PartialEq, Message)]
    pub struct OpWrite {
        #[prost(message, optional, tag = "1")]
        pub rowset: Option<RowsetMetadataPb>,
        /// Encoded primary keys deleted by this write, staged by the
        /// writer alongside the rowset (PK tables only).
        #[prost(bytes = "vec", repeated, tag = "2")]
        pub dels: Vec<Vec<u8>>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct OpCompaction {
        #[prost(uint32, repeated, tag = "1")]
        pub input_rowsets: Vec<u32>,
        #[prost(message, optional, tag = "2")]
        pub output_rowset: Option<RowsetMetadataPb>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct OpSchemaChange {
        #[prost(message, repeated, tag = "1")]
        pub rowsets: Vec<RowsetMetadataPb>,
        #[prost(message, optional, tag = "2")]
        pub delvec_meta: Option<DelvecMetadataPb>,
        #[prost(int64, optional, tag = "3")]
        pub alter_version: Option<i64>,
        #[prost(bool, optional, tag = "4")]
        pub linked_segment: Option<bool>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct MetadataUpdateInfoPb {
        #[prost(bool, optional, tag = "1")]
        pub enable_persistent_index: Option<bool>,
        #[prost(message, optional, tag = "2")]
        pub tablet_schema: Option<TabletSchemaPb>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct OpAlterMetadata {
        #[prost(message, repeated, tag = "1")]
        pub metadata_update_infos: Vec<MetadataUpdateInfoPb>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct ReplicationTxnMetaPb {
        #[prost(enumeration = "ReplicationTxnStatePb", optional, tag = "1")]
        pub txn_state: Option<i32>,
        #[prost(int64, optional, tag = "2")]
        pub snapshot_version: Option<i64>,
        #[prost(bool, optional, tag = "3")]
        pub incremental_snapshot: Option<bool>,
        #[prost(int64, optional, tag = "4")]
        pub txn_id: Option<i64>,
    }

    #[derive(Clone, PartialEq, Message)]
    pub struct OpReplication {
        #[prost(message, optional, tag = "1")]
        pub txn_meta: Option<ReplicationTxnMetaPb>,
        #[prost(message, repeated, tag = "2")]
        pub op_writes: Vec<OpWrite>,
        #[prost(map = "uint32, bytes", tag = "3")]
        pub delvecs: HashMap<u32, Vec<u8>>,
        #[prost(message, optional, tag = "4")]
        pub source_schema: Option<TabletSchemaPb>,
    }
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn tablet_metadata_roundtrips_through_prost() {
        let meta = TabletMetadataPb {
            id: Some(42),
            version: Some(7),
            schema: Some(TabletSchemaPb {
                id: Some(1),
                keys_type: Some(KeysType::PrimaryKeys as i32),
                column: vec![ColumnPb {
                    unique_id: 1,
                    name: Some("c1".to_string()),
                    r#type: "BIGINT".to_string(),
                    is_key: Some(true),
                    is_nullable: Some(false),
                }],
                schema_version: Some(0),
            }),
            rowsets: vec![RowsetMetadataPb {
                id: Some(3),
                segments: vec!["seg_a.dat".to_string(), "seg_b.dat".to_string()],
                num_rows: Some(10),
                data_size: Some(80),
                num_dels: Some(0),
                overlapped: Some(false),
                delete_predicate: None,
                version: Some(6),
            }],
            next_rowset_id: Some(5),
            cumulative_point: Some(0),
            delvec_meta: None,
            compaction_inputs: Vec::new(),
            enable_persistent_index: Some(true),
            source_schema: None,
        };
        let bytes = meta.encode_to_vec();
        let decoded = TabletMetadataPb::decode(bytes.as_slice()).expect("decode tablet metadata");
        assert_eq!(decoded, meta);
        assert_eq!(decoded.keys_type(), Some(KeysType::PrimaryKeys));
    }

    #[test]
    fn next_rowset_id_covers_multi_segment_rowsets() {
        let rowsets = vec![
            RowsetMetadataPb {
                id: Some(1),
                segments: vec!["a".to_string(), "b".to_string()],
                ..Default::default()
            },
            RowsetMetadataPb {
                id: Some(3),
                segments: vec!["c".to_string()],
                ..Default::default()
            },
        ];
        assert_eq!(next_rowset_id(&rowsets), 4);
        assert_eq!(next_rowset_id(&[]), 1);
    }

    #[test]
    fn empty_rowset_still_spans_one_id() {
        let rowset = RowsetMetadataPb {
            id: Some(9),
            ..Default::default()
        };
        assert_eq!(rowset.id_span(), 1);
    }
}
