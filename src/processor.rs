// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
use crate::envoy::service::ext_proc::v3::{ProcessingRequest, ProcessingResponse};
use async_trait::async_trait;
use thiserror::Error;
use tonic::Status;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("Processing failed: {0}")]
    Failed(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

impl From<ProcessingError> for Status {
    fn from(err: ProcessingError) -> Self {
        match err {
            ProcessingError::PermissionDenied(msg) => Status::permission_denied(msg),
            ProcessingError::Failed(msg) => Status::internal(msg),
        }
    }
}

/// Per-phase handlers for one ext_proc exchange.
///
/// Each handler receives the whole `ProcessingRequest` whose `request` oneof
/// holds the matching phase, and answers with the response for that phase.
/// Handlers must not keep state between calls; a stream may be served
/// concurrently with any number of others.
#[async_trait]
pub trait ExtProcessor: Send + Sync + 'static {
    async fn process_request_headers(
        &self,
        req: &ProcessingRequest,
    ) -> Result<ProcessingResponse, ProcessingError>;
    async fn process_response_headers(
        &self,
        req: &ProcessingRequest,
    ) -> Result<ProcessingResponse, ProcessingError>;
    async fn process_request_body(
        &self,
        req: &ProcessingRequest,
    ) -> Result<ProcessingResponse, ProcessingError>;
    async fn process_response_body(
        &self,
        req: &ProcessingRequest,
    ) -> Result<ProcessingResponse, ProcessingError>;
}
