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

pub mod applier;
pub mod delvec;
pub mod layout;
pub mod meta_file;
pub mod primary_index;
pub mod proto;
pub mod recover;
pub mod status;
pub mod tablet;
pub mod update_manager;

pub use applier::{new_txn_log_applier, TxnLogApplier};
pub use delvec::DelVector;
pub use meta_file::{MetaFileBuilder, RecoverFlag};
pub use primary_index::{IndexCache, IndexEntryHandle, LakePrimaryIndex, SegmentRowRef};
pub use status::Status;
pub use tablet::{Tablet, TabletManager};
pub use update_manager::{
    LakeUpdateManager, PkIndexLockGuard, SegmentKeySource, UpdateManager,
};
