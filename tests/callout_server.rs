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
use session_callout::config::{Config, MissingSessionPolicy};
use session_callout::envoy::config::core::v3::{HeaderMap, HeaderValue};
use session_callout::envoy::service::auth::v3::{
    attribute_context, authorization_client::AuthorizationClient, check_response::HttpResponse,
    AttributeContext, CheckRequest,
};
use session_callout::envoy::service::ext_proc::v3::{
    external_processor_client::ExternalProcessorClient,
    processing_request::Request as ProcessingRequestVariant,
    processing_response::Response as ProcessingResponseVariant, HttpBody, HttpHeaders,
    ProcessingRequest, ProcessingResponse,
};
use session_callout::server::CalloutServer;
use session_callout::session_header::SessionHeaderProcessor;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

struct TestServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), session_callout::server::ServerError>>,
}

async fn start_server(config: Config) -> TestServer {
    let listener = CalloutServer::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, rx) = oneshot::channel::<()>();
    let processor = SessionHeaderProcessor::new(config.stream_missing_session);
    let server = CalloutServer::new(config);

    let handle = tokio::spawn(async move {
        server
            .serve(listener, processor, async {
                let _ = rx.await;
            })
            .await
    });

    TestServer {
        addr,
        shutdown,
        handle,
    }
}

fn request_headers(pairs: &[(&str, &str)]) -> ProcessingRequest {
    ProcessingRequest {
        request: Some(ProcessingRequestVariant::RequestHeaders(HttpHeaders {
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
            end_of_stream: false,
        })),
        ..Default::default()
    }
}

fn new_header(response: &ProcessingResponse) -> Option<String> {
    match &response.response {
        Some(ProcessingResponseVariant::RequestHeaders(r)) => r
            .response
            .as_ref()
            .and_then(|c| c.header_mutation.as_ref())
            .and_then(|m| m.set_headers.first())
            .and_then(|o| o.header.as_ref())
            .map(|h| String::from_utf8_lossy(&h.raw_value).into_owned()),
        other => panic!("Expected RequestHeaders response, got {:?}", other),
    }
}

fn check_request(pairs: &[(&str, &str)]) -> CheckRequest {
    let headers: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    CheckRequest {
        attributes: Some(AttributeContext {
            request: Some(attribute_context::Request {
                http: Some(attribute_context::HttpRequest {
                    headers,
                    ..Default::default()
                }),
            }),
            ..Default::default()
        }),
    }
}

#[tokio::test]
async fn test_full_exchange_over_ext_proc() {
    let server = start_server(Config::default()).await;
    let mut client = ExternalProcessorClient::connect(format!("http://{}", server.addr))
        .await
        .unwrap();

    let requests = tokio_stream::iter(vec![
        request_headers(&[(":path", "/"), ("session", "abc123")]),
        ProcessingRequest {
            request: Some(ProcessingRequestVariant::RequestBody(HttpBody {
                body: b"ping".to_vec(),
                end_of_stream: true,
            })),
            ..Default::default()
        },
        ProcessingRequest {
            request: Some(ProcessingRequestVariant::ResponseHeaders(HttpHeaders::default())),
            ..Default::default()
        },
        ProcessingRequest {
            request: Some(ProcessingRequestVariant::ResponseBody(HttpBody {
                body: b"pong".to_vec(),
                end_of_stream: true,
            })),
            ..Default::default()
        },
    ]);

    let responses: Vec<ProcessingResponse> = client
        .process(requests)
        .await
        .unwrap()
        .into_inner()
        .map(|r| r.unwrap())
        .collect()
        .await;

    assert_eq!(responses.len(), 4);
    assert_eq!(new_header(&responses[0]).as_deref(), Some("session-abc123"));
    assert!(matches!(
        responses[1].response,
        Some(ProcessingResponseVariant::RequestBody(_))
    ));
    assert!(matches!(
        responses[2].response,
        Some(ProcessingResponseVariant::ResponseHeaders(_))
    ));
    assert!(matches!(
        responses[3].response,
        Some(ProcessingResponseVariant::ResponseBody(_))
    ));

    drop(client);
    server.shutdown.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_concurrent_sessions_are_independent() {
    let server = start_server(Config::default()).await;
    let client = ExternalProcessorClient::connect(format!("http://{}", server.addr))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let mut client = client.clone();
        tasks.push(tokio::spawn(async move {
            let session = format!("user-{}", i);
            let requests = tokio_stream::iter(vec![request_headers(&[("session", session.as_str())])]);
            let mut responses = client.process(requests).await.unwrap().into_inner();
            let response = responses.next().await.unwrap().unwrap();
            (i, new_header(&response))
        }));
    }

    for task in tasks {
        let (i, header) = task.await.unwrap();
        assert_eq!(header, Some(format!("session-user-{}", i)));
    }

    drop(client);
    server.shutdown.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_missing_session_streams_and_checks_diverge() {
    let server = start_server(Config::default()).await;
    let endpoint = format!("http://{}", server.addr);

    // Streaming: soft condition, the exchange continues unmodified.
    let mut ext_proc = ExternalProcessorClient::connect(endpoint.clone()).await.unwrap();
    let requests = tokio_stream::iter(vec![request_headers(&[("host", "example.com")])]);
    let mut responses = ext_proc.process(requests).await.unwrap().into_inner();
    let response = responses.next().await.unwrap().unwrap();
    assert_eq!(new_header(&response), None);
    assert!(responses.next().await.is_none());

    // Check: explicit denial.
    let mut authz = AuthorizationClient::connect(endpoint).await.unwrap();
    let denied = authz
        .check(check_request(&[("host", "example.com")]))
        .await
        .unwrap()
        .into_inner();
    let status = denied.status.unwrap();
    assert_eq!(status.code, tonic::Code::PermissionDenied as i32);
    assert_eq!(status.message, "Missing session header");

    let allowed = authz
        .check(check_request(&[("session", "abc123")]))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(allowed.status.unwrap().code, tonic::Code::Ok as i32);
    match allowed.http_response {
        Some(HttpResponse::OkResponse(ok)) => {
            let header = ok.headers[0].header.as_ref().unwrap();
            assert_eq!(header.key, "x-new-header");
            assert_eq!(header.value, "session-abc123");
        }
        other => panic!("Expected OkResponse, got {:?}", other),
    }

    drop((ext_proc, authz));
    server.shutdown.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_policies_are_configurable() {
    let config = Config {
        stream_missing_session: MissingSessionPolicy::Deny,
        check_missing_session: MissingSessionPolicy::Continue,
        ..Config::default()
    };
    let server = start_server(config).await;
    let endpoint = format!("http://{}", server.addr);

    let mut ext_proc = ExternalProcessorClient::connect(endpoint.clone()).await.unwrap();
    let requests = tokio_stream::iter(vec![request_headers(&[])]);
    let mut responses = ext_proc.process(requests).await.unwrap().into_inner();
    let status = responses.next().await.unwrap().unwrap_err();
    assert_eq!(status.code(), tonic::Code::PermissionDenied);

    let mut authz = AuthorizationClient::connect(endpoint).await.unwrap();
    let allowed = authz.check(check_request(&[])).await.unwrap().into_inner();
    assert_eq!(allowed.status.unwrap().code, tonic::Code::Ok as i32);

    drop((ext_proc, authz));
    server.shutdown.send(()).unwrap();
    server.handle.await.unwrap().unwrap();
}
