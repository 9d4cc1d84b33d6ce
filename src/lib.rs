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
//! Envoy callout that derives an `x-new-header` from the incoming `session`
//! header.
//!
//! Two protocol adapters share one rule core:
//!
//! - [`service::ExtProcService`] answers the bidirectional
//!   `envoy.service.ext_proc.v3.ExternalProcessor/Process` stream, one
//!   [`session::StreamSession`] per proxied exchange.
//! - [`authz::AuthorizationService`] answers the unary
//!   `envoy.service.auth.v3.Authorization/Check` call.
//!
//! [`server::CalloutServer`] hosts both on a single listener.

mod gen;

pub use gen::{envoy, google};

pub mod authz;
pub mod config;
pub mod dispatcher;
pub mod processor;
pub mod server;
pub mod service;
pub mod session;
pub mod session_header;
pub mod utils;
