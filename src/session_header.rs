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
//! The session header rule shared by the ext_proc and ext_authz adapters.
//!
//! A request carrying `session: V` gets `x-new-header: session-V` added. The
//! value is copied verbatim; no escaping or length limit is applied.

use crate::config::MissingSessionPolicy;
use crate::envoy::service::ext_proc::v3::{
    processing_request::Request as ProcessingRequestType, ProcessingRequest, ProcessingResponse,
};
use crate::processor::{ExtProcessor, ProcessingError};
use crate::utils::headers::{find_header, HeaderSource};
use crate::utils::mutations::{self, Mutation};
use async_trait::async_trait;
use log::{info, warn};

pub const SESSION_HEADER: &str = "session";
pub const NEW_HEADER: &str = "x-new-header";
pub const SESSION_PREFIX: &str = "session-";
pub const MISSING_SESSION_MESSAGE: &str = "Missing session header";

/// Returns the session header value, treating an empty value as missing.
pub fn session_value<S: HeaderSource + ?Sized>(headers: &S) -> Option<String> {
    find_header(headers, SESSION_HEADER)
        .filter(|value| !value.is_empty())
        .map(|value| value.into_owned())
}

/// Builds the mutation derived from a session value.
pub fn session_mutation(session: &str) -> Mutation {
    Mutation::single(NEW_HEADER, format!("{}{}", SESSION_PREFIX, session))
}

/// Applies the rule to `headers`: `Some(mutation)` when a session is present.
pub fn evaluate<S: HeaderSource + ?Sized>(headers: &S) -> Option<Mutation> {
    session_value(headers).map(|session| session_mutation(&session))
}

/// ext_proc processor adding `x-new-header` on the request headers phase and
/// acknowledging every other phase unchanged.
#[derive(Debug, Clone, Copy)]
pub struct SessionHeaderProcessor {
    missing_session: MissingSessionPolicy,
}

impl SessionHeaderProcessor {
    pub fn new(missing_session: MissingSessionPolicy) -> Self {
        Self { missing_session }
    }
}

impl Default for SessionHeaderProcessor {
    fn default() -> Self {
        Self::new(MissingSessionPolicy::Continue)
    }
}

#[async_trait]
impl ExtProcessor for SessionHeaderProcessor {
    async fn process_request_headers(
        &self,
        req: &ProcessingRequest,
    ) -> Result<ProcessingResponse, ProcessingError> {
        let headers = match &req.request {
            Some(ProcessingRequestType::RequestHeaders(headers)) => headers.headers.as_ref(),
            _ => None,
        };

        match headers.and_then(|h| evaluate(h)) {
            Some(mutation) => {
                info!("Session header modified: {}", mutation.set_headers[0].1);
                Ok(mutations::headers_response(&mutation, true))
            }
            None => match self.missing_session {
                MissingSessionPolicy::Continue => {
                    warn!("{}, continuing without mutation", MISSING_SESSION_MESSAGE);
                    Ok(mutations::headers_pass_through(true))
                }
                MissingSessionPolicy::Deny => {
                    warn!("{}, denying request", MISSING_SESSION_MESSAGE);
                    Err(ProcessingError::PermissionDenied(
                        MISSING_SESSION_MESSAGE.to_string(),
                    ))
                }
            },
        }
    }

    async fn process_response_headers(
        &self,
        _req: &ProcessingRequest,
    ) -> Result<ProcessingResponse, ProcessingError> {
        Ok(mutations::headers_pass_through(false))
    }

    async fn process_request_body(
        &self,
        _req: &ProcessingRequest,
    ) -> Result<ProcessingResponse, ProcessingError> {
        Ok(mutations::body_pass_through(true))
    }

    async fn process_response_body(
        &self,
        _req: &ProcessingRequest,
    ) -> Result<ProcessingResponse, ProcessingError> {
        Ok(mutations::body_pass_through(false))
    }
}
