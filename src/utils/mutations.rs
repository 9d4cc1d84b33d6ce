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
//! # Mutations Utility Module
//!
//! Header mutations and the processing responses that carry them back to
//! Envoy.
//!
//! [`Mutation`] is the protocol-neutral instruction: a list of headers to add
//! or overwrite on the in-flight request or response. The functions in this
//! module wrap it into the ext_proc `ProcessingResponse` shapes, and
//! [`Mutation::to_header_value_options`] renders it for the ext_authz
//! `OkHttpResponse`.

use crate::envoy::config::core::v3::{
    header_value_option::HeaderAppendAction, HeaderValue, HeaderValueOption,
};
use crate::envoy::service::ext_proc::v3::{
    processing_response::Response as ProcessingResponseType, BodyResponse, CommonResponse,
    HeaderMutation, HeadersResponse, ProcessingResponse,
};

/// Headers to add or overwrite, in the order they should be applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mutation {
    pub set_headers: Vec<(String, String)>,
}

impl Mutation {
    /// A mutation setting exactly one header.
    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            set_headers: vec![(key.into(), value.into())],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set_headers.is_empty()
    }

    /// Renders the headers as Envoy `HeaderValueOption`s that overwrite any
    /// existing value or add the header when absent.
    ///
    /// ext_proc reads `raw_value`, ext_authz reads `value`; `raw` selects
    /// which field is filled.
    pub fn to_header_value_options(&self, raw: bool) -> Vec<HeaderValueOption> {
        self.set_headers
            .iter()
            .map(|(key, value)| {
                let header = if raw {
                    HeaderValue {
                        key: key.clone(),
                        raw_value: value.as_bytes().to_vec(),
                        ..Default::default()
                    }
                } else {
                    HeaderValue {
                        key: key.clone(),
                        value: value.clone(),
                        ..Default::default()
                    }
                };
                HeaderValueOption {
                    header: Some(header),
                    append_action: HeaderAppendAction::OverwriteIfExistsOrAdd as i32,
                    keep_empty_value: false,
                }
            })
            .collect()
    }

    pub fn to_header_mutation(&self) -> HeaderMutation {
        HeaderMutation {
            set_headers: self.to_header_value_options(true),
            remove_headers: Vec::new(),
        }
    }
}

/// Creates a headers response for the request or response phase that applies
/// `mutation`.
///
/// An empty mutation produces a pass-through response with no
/// `header_mutation` at all.
pub fn headers_response(mutation: &Mutation, is_request: bool) -> ProcessingResponse {
    let common_response = CommonResponse {
        header_mutation: (!mutation.is_empty()).then(|| mutation.to_header_mutation()),
        ..Default::default()
    };

    let headers_response = HeadersResponse {
        response: Some(common_response),
    };

    let response = if is_request {
        ProcessingResponseType::RequestHeaders(headers_response)
    } else {
        ProcessingResponseType::ResponseHeaders(headers_response)
    };

    ProcessingResponse {
        response: Some(response),
    }
}

/// Acknowledges a headers phase without changing anything.
pub fn headers_pass_through(is_request: bool) -> ProcessingResponse {
    headers_response(&Mutation::default(), is_request)
}

/// Acknowledges a body phase without changing anything; Envoy forwards the
/// body as received.
pub fn body_pass_through(is_request: bool) -> ProcessingResponse {
    let body_response = BodyResponse {
        response: Some(CommonResponse::default()),
    };

    let response = if is_request {
        ProcessingResponseType::RequestBody(body_response)
    } else {
        ProcessingResponseType::ResponseBody(body_response)
    };

    ProcessingResponse {
        response: Some(response),
    }
}
