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
//! # Stream Session
//!
//! One [`StreamSession`] drives the duplex ext_proc stream of a single proxied
//! exchange: it receives a `ProcessingRequest`, dispatches it, sends the
//! response (if any), and only then receives the next message. Responses
//! therefore leave in the order requests arrived.
//!
//! The loop suspends only on the receive and on the send. It ends when:
//!
//! - the proxy half-closes the stream ([`SessionEnd::Closed`]),
//! - the call is cancelled ([`SessionEnd::Cancelled`]),
//! - receiving fails, the response stream is gone, or a handler fails
//!   ([`SessionError`]).
//!
//! A handler failure is delivered to the runtime as a gRPC status on the
//! response stream before the session ends.

use crate::dispatcher::dispatch;
use crate::envoy::service::ext_proc::v3::{ProcessingRequest, ProcessingResponse};
use crate::processor::ExtProcessor;
use futures::{Stream, StreamExt};
use log::{debug, log, Level};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tonic::{Code, Status};

/// Sending half of the response stream handed back to tonic.
pub type ResponseSender = mpsc::Sender<Result<ProcessingResponse, Status>>;

/// Expected ways for a session to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The proxy closed its side of the stream.
    Closed,
    /// The call was cancelled (client disconnect, deadline, shutdown).
    Cancelled,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to receive processing request: {0}")]
    Receive(Status),
    #[error("Failed to send processing response: response stream closed")]
    Send,
    #[error("Processing failed: {0}")]
    Processing(Status),
}

/// Message counters of one session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub received: usize,
    pub sent: usize,
}

pub struct StreamSession {
    processor: Arc<dyn ExtProcessor>,
    peer: Option<SocketAddr>,
    stats: SessionStats,
}

impl StreamSession {
    pub fn new(processor: Arc<dyn ExtProcessor>) -> Self {
        Self {
            processor,
            peer: None,
            stats: SessionStats::default(),
        }
    }

    /// Records the remote address for log messages.
    pub fn with_peer(mut self, peer: Option<SocketAddr>) -> Self {
        self.peer = peer;
        self
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Runs the receive, dispatch, send loop until the stream ends.
    pub async fn run<S>(
        &mut self,
        mut inbound: S,
        outbound: &ResponseSender,
    ) -> Result<SessionEnd, SessionError>
    where
        S: Stream<Item = Result<ProcessingRequest, Status>> + Unpin,
    {
        loop {
            let req = match inbound.next().await {
                None => return Ok(SessionEnd::Closed),
                Some(Ok(req)) => req,
                Some(Err(status)) if status.code() == Code::Cancelled => {
                    return Ok(SessionEnd::Cancelled)
                }
                Some(Err(status)) => return Err(SessionError::Receive(status)),
            };
            self.stats.received += 1;

            match dispatch(self.processor.as_ref(), &req).await {
                Ok(Some(response)) => {
                    outbound
                        .send(Ok(response))
                        .await
                        .map_err(|_| SessionError::Send)?;
                    self.stats.sent += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    let status = Status::from(e);
                    // The runtime turns this into the call's final status.
                    if outbound.send(Err(status.clone())).await.is_err() {
                        return Err(SessionError::Send);
                    }
                    return Err(SessionError::Processing(status));
                }
            }
        }
    }

    /// Spawns the session on the runtime and logs how it ended.
    pub fn spawn<S>(mut self, inbound: S, outbound: ResponseSender) -> tokio::task::JoinHandle<()>
    where
        S: Stream<Item = Result<ProcessingRequest, Status>> + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            debug!("{}: stream opened", self.label());
            let result = self.run(inbound, &outbound).await;
            self.log_outcome(&result);
        })
    }

    fn label(&self) -> String {
        match self.peer {
            Some(peer) => format!("session from {}", peer),
            None => "session".to_string(),
        }
    }

    fn log_outcome(&self, result: &Result<SessionEnd, SessionError>) {
        let label = self.label();
        let SessionStats { received, sent } = self.stats;
        let level = outcome_level(result);
        match result {
            Ok(SessionEnd::Closed) => log!(
                level,
                "{}: stream closed after {} requests, {} responses",
                label,
                received,
                sent
            ),
            Ok(SessionEnd::Cancelled) => log!(
                level,
                "{}: stream cancelled after {} requests, {} responses",
                label,
                received,
                sent
            ),
            Err(SessionError::Processing(status)) if status.code() == Code::PermissionDenied => {
                log!(level, "{}: request denied: {}", label, status.message())
            }
            Err(e) => log!(
                level,
                "{}: {} (after {} requests, {} responses)",
                label,
                e,
                received,
                sent
            ),
        }
    }
}

/// Severity at which a session end is logged.
pub fn outcome_level(result: &Result<SessionEnd, SessionError>) -> Level {
    match result {
        Ok(SessionEnd::Closed) => Level::Debug,
        Ok(SessionEnd::Cancelled) => Level::Info,
        Err(SessionError::Processing(status)) if status.code() == Code::PermissionDenied => {
            Level::Warn
        }
        Err(_) => Level::Error,
    }
}
