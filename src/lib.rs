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

//! Tablet metadata and transaction-log apply for a lake-style columnar
//! storage engine. Tablet state is durably materialised as immutable
//! versioned metadata objects; mutations are staged as transaction log
//! records and applied by [`lake::applier`] to produce the next version.

pub mod common;
pub mod lake;

pub use common::config as lakemeta_config;
pub use common::logging as lakemeta_logging;

pub use lake::applier::{new_txn_log_applier, TxnLogApplier};
pub use lake::status::Status;
pub use lake::tablet::{Tablet, TabletManager};
