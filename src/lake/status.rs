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

use thiserror::Error;

/// Error taxonomy of the tablet apply path.
///
/// `VersionConflict` is retryable by the caller from a fresh snapshot;
/// `Corruption` and `InternalError` are not. Collaborator IO failures
/// surface as `IoError` and propagate verbatim.
#[derive(Debug, Error)]
pub enum Status {
    #[error("version conflict: {0}")]
    VersionConflict(String),
    #[error("corruption: {0}")]
    Corruption(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Status {
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Status::VersionConflict(_))
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, Status::Corruption(_))
    }

    pub fn is_internal_error(&self) -> bool {
        matches!(self, Status::InternalError(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Status::NotFound(_))
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl From<prost::DecodeError> for Status {
    fn from(err: prost::DecodeError) -> Self {
        Status::Corruption(format!("decode protobuf failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::Status;

    #[test]
    fn status_kind_predicates() {
        assert!(Status::VersionConflict("v".to_string()).is_version_conflict());
        assert!(Status::Corruption("c".to_string()).is_corruption());
        assert!(Status::InternalError("i".to_string()).is_internal_error());
        assert!(Status::NotFound("n".to_string()).is_not_found());
        assert!(!Status::NotFound("n".to_string()).is_corruption());
    }

    #[test]
    fn decode_errors_surface_as_corruption() {
        let err = prost::DecodeError::new("truncated");
        let status: Status = err.into();
        assert!(status.is_corruption());
        assert!(status.message().contains("decode protobuf failed"));
    }
}
