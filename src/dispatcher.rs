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
//! Routes one inbound `ProcessingRequest` to the handler for its phase.

use crate::envoy::service::ext_proc::v3::{
    processing_request::Request as ProcessingRequestType, ProcessingRequest, ProcessingResponse,
};
use crate::processor::{ExtProcessor, ProcessingError};
use log::warn;

/// Lifecycle point of an exchange a request message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    RequestHeaders,
    RequestBody,
    ResponseHeaders,
    ResponseBody,
}

impl Phase {
    /// The phase of `req`, or `None` for variants this service does not
    /// handle (trailers, or an empty message).
    pub fn of(req: &ProcessingRequest) -> Option<Phase> {
        match req.request.as_ref()? {
            ProcessingRequestType::RequestHeaders(_) => Some(Phase::RequestHeaders),
            ProcessingRequestType::RequestBody(_) => Some(Phase::RequestBody),
            ProcessingRequestType::ResponseHeaders(_) => Some(Phase::ResponseHeaders),
            ProcessingRequestType::ResponseBody(_) => Some(Phase::ResponseBody),
            ProcessingRequestType::RequestTrailers(_)
            | ProcessingRequestType::ResponseTrailers(_) => None,
        }
    }
}

/// Hands `req` to the matching handler of `processor`.
///
/// Returns `Ok(None)` when the message carries no phase this service handles;
/// the caller sends nothing back and keeps the stream open.
pub async fn dispatch<P>(
    processor: &P,
    req: &ProcessingRequest,
) -> Result<Option<ProcessingResponse>, ProcessingError>
where
    P: ExtProcessor + ?Sized,
{
    let response = match Phase::of(req) {
        Some(Phase::RequestHeaders) => processor.process_request_headers(req).await?,
        Some(Phase::RequestBody) => processor.process_request_body(req).await?,
        Some(Phase::ResponseHeaders) => processor.process_response_headers(req).await?,
        Some(Phase::ResponseBody) => processor.process_response_body(req).await?,
        None => {
            warn!("Ignoring unrecognized processing request: {:?}", req.request);
            return Ok(None);
        }
    };
    Ok(Some(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingSessionPolicy;
    use crate::envoy::config::core::v3::{HeaderMap, HeaderValue};
    use crate::envoy::service::ext_proc::v3::{
        processing_response::Response as ProcessingResponseVariant, HttpBody, HttpHeaders,
        HttpTrailers,
    };
    use crate::session_header::SessionHeaderProcessor;

    fn headers(pairs: &[(&str, &str)]) -> HttpHeaders {
        HttpHeaders {
            headers: Some(HeaderMap {
                headers: pairs
                    .iter()
                    .map(|(k, v)| HeaderValue {
                        key: k.to_string(),
                        raw_value: v.as_bytes().to_vec(),
                        ..Default::default()
                    })
                    .collect(),
            }),
            ..Default::default()
        }
    }

    fn request(variant: ProcessingRequestType) -> ProcessingRequest {
        ProcessingRequest {
            request: Some(variant),
            ..Default::default()
        }
    }

    #[test]
    fn test_phase_of() {
        assert_eq!(
            Phase::of(&request(ProcessingRequestType::RequestHeaders(headers(&[])))),
            Some(Phase::RequestHeaders)
        );
        assert_eq!(
            Phase::of(&request(ProcessingRequestType::ResponseBody(HttpBody::default()))),
            Some(Phase::ResponseBody)
        );
        assert_eq!(
            Phase::of(&request(ProcessingRequestType::RequestTrailers(
                HttpTrailers::default()
            ))),
            None
        );
        assert_eq!(Phase::of(&ProcessingRequest::default()), None);
    }

    #[tokio::test]
    async fn test_dispatch_request_headers_with_session() {
        let processor = SessionHeaderProcessor::default();
        let req = request(ProcessingRequestType::RequestHeaders(headers(&[(
            "session", "abc123",
        )])));

        let response = dispatch(&processor, &req).await.unwrap().unwrap();

        match response.response {
            Some(ProcessingResponseVariant::RequestHeaders(r)) => {
                let set_headers = r.response.unwrap().header_mutation.unwrap().set_headers;
                assert_eq!(set_headers.len(), 1);
                let header = set_headers[0].header.as_ref().unwrap();
                assert_eq!(header.key, "x-new-header");
                assert_eq!(header.raw_value, b"session-abc123".to_vec());
            }
            other => panic!("Expected RequestHeaders response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatch_matches_response_variant_to_phase() {
        let processor = SessionHeaderProcessor::default();
        let cases = vec![
            request(ProcessingRequestType::RequestHeaders(headers(&[(
                "host",
                "example.com",
            )]))),
            request(ProcessingRequestType::RequestBody(HttpBody::default())),
            request(ProcessingRequestType::ResponseHeaders(headers(&[]))),
            request(ProcessingRequestType::ResponseBody(HttpBody::default())),
        ];

        for req in cases {
            let response = dispatch(&processor, &req).await.unwrap().unwrap();
            let matches = matches!(
                (&req.request, &response.response),
                (
                    Some(ProcessingRequestType::RequestHeaders(_)),
                    Some(ProcessingResponseVariant::RequestHeaders(_))
                ) | (
                    Some(ProcessingRequestType::RequestBody(_)),
                    Some(ProcessingResponseVariant::RequestBody(_))
                ) | (
                    Some(ProcessingRequestType::ResponseHeaders(_)),
                    Some(ProcessingResponseVariant::ResponseHeaders(_))
                ) | (
                    Some(ProcessingRequestType::ResponseBody(_)),
                    Some(ProcessingResponseVariant::ResponseBody(_))
                )
            );
            assert!(matches, "mismatched response {:?} for {:?}", response, req);
        }
    }

    #[tokio::test]
    async fn test_dispatch_unrecognized_yields_nothing() {
        let processor = SessionHeaderProcessor::default();

        let trailers = request(ProcessingRequestType::ResponseTrailers(HttpTrailers::default()));
        assert_eq!(dispatch(&processor, &trailers).await.unwrap(), None);
        assert_eq!(
            dispatch(&processor, &ProcessingRequest::default()).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_dispatch_propagates_denial() {
        let processor = SessionHeaderProcessor::new(MissingSessionPolicy::Deny);
        let req = request(ProcessingRequestType::RequestHeaders(headers(&[])));

        let err = dispatch(&processor, &req).await.unwrap_err();
        assert!(matches!(err, ProcessingError::PermissionDenied(_)));
    }
}
