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
//! ext_authz `Check` adapter for the session header rule.
//!
//! Unlike the streaming processor, the check answers with an explicit
//! allow/deny status. With [`MissingSessionPolicy::Deny`] a request without
//! a session is rejected with `PERMISSION_DENIED`.

use crate::config::MissingSessionPolicy;
use crate::envoy::service::auth::v3::{
    attribute_context::HttpRequest,
    authorization_server::{Authorization, AuthorizationServer},
    check_response::HttpResponse, CheckRequest, CheckResponse, OkHttpResponse,
};
use crate::google::rpc::Status as RpcStatus;
use crate::session_header::{self, MISSING_SESSION_MESSAGE};
use crate::utils::mutations::Mutation;
use log::{info, warn};
use tonic::{Code, Request, Response, Status};

#[derive(Debug, Clone, Copy)]
pub struct AuthorizationService {
    missing_session: MissingSessionPolicy,
}

impl AuthorizationService {
    pub fn new(missing_session: MissingSessionPolicy) -> Self {
        Self { missing_session }
    }

    pub fn into_server(self) -> AuthorizationServer<Self> {
        AuthorizationServer::new(self)
    }

    /// Evaluates the rule against a check request.
    pub fn evaluate(&self, req: &CheckRequest) -> CheckResponse {
        let http = req
            .attributes
            .as_ref()
            .and_then(|a| a.request.as_ref())
            .and_then(|r| r.http.as_ref());

        match http.and_then(session_mutation) {
            Some(mutation) => {
                info!("Session header modified: {}", mutation.set_headers[0].1);
                allow(&mutation)
            }
            None => match self.missing_session {
                MissingSessionPolicy::Deny => {
                    warn!("{}", MISSING_SESSION_MESSAGE);
                    CheckResponse {
                        status: Some(RpcStatus {
                            code: Code::PermissionDenied as i32,
                            message: MISSING_SESSION_MESSAGE.to_string(),
                        }),
                        http_response: None,
                    }
                }
                MissingSessionPolicy::Continue => {
                    warn!("{}, allowing without mutation", MISSING_SESSION_MESSAGE);
                    allow(&Mutation::default())
                }
            },
        }
    }
}

/// Looks the session up in the flattened header map first and falls back to
/// the ordered `header_map` Envoy sends when configured to.
fn session_mutation(http: &HttpRequest) -> Option<Mutation> {
    session_header::evaluate(&http.headers).or_else(|| {
        http.header_map
            .as_ref()
            .and_then(|headers| session_header::evaluate(headers))
    })
}

fn allow(mutation: &Mutation) -> CheckResponse {
    CheckResponse {
        status: Some(RpcStatus {
            code: Code::Ok as i32,
            message: String::new(),
        }),
        http_response: Some(HttpResponse::OkResponse(OkHttpResponse {
            headers: mutation.to_header_value_options(false),
            ..Default::default()
        })),
    }
}

#[tonic::async_trait]
impl Authorization for AuthorizationService {
    async fn check(
        &self,
        request: Request<CheckRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        Ok(Response::new(self.evaluate(request.get_ref())))
    }
}
