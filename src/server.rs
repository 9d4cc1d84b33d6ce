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
//! # CalloutServer Module
//!
//! Hosts the callout services:
//!
//! - one gRPC listener serving both `ExternalProcessor` (streaming) and
//!   `Authorization` (unary check),
//! - an optional HTTP health check endpoint answering every request with an
//!   empty 200 OK.
//!
//! Listeners are bound before anything is served, so an unusable address is
//! reported to the caller instead of being logged from a background task. On
//! SIGINT or SIGTERM both servers stop accepting; the gRPC server lets
//! in-flight streams drain.

use crate::authz::AuthorizationService;
use crate::config::Config;
use crate::processor::ExtProcessor;
use crate::service::ExtProcService;
use hyper::{Body, Response, Server as HyperServer};
use log::{error, info};
use std::convert::Infallible;
use std::future::Future;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to listen on {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },
    #[error("gRPC server error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("Health check server error: {0}")]
    HealthCheck(#[from] hyper::Error),
}

/// Server hosting the session header callout.
#[derive(Clone)]
pub struct CalloutServer {
    config: Config,
}

impl CalloutServer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Binds a TCP listener on `address` (format: "host:port").
    pub async fn bind(address: &str) -> Result<TcpListener, ServerError> {
        TcpListener::bind(address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.to_string(),
                source,
            })
    }

    /// Binds every configured listener and serves until a termination signal
    /// arrives.
    pub async fn run<P: ExtProcessor>(&self, processor: P) -> Result<(), ServerError> {
        let listener = Self::bind(&self.config.listen_address).await?;
        let health_listener = match &self.config.health_check_address {
            Some(address) => Some(Self::bind(address).await?),
            None => None,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutting down callout server...");
            let _ = shutdown_tx.send(true);
        });

        let health = health_listener
            .map(|listener| Self::spawn_health_check(listener, wait_for(shutdown_rx.clone())));

        self.serve(listener, processor, wait_for(shutdown_rx)).await?;

        if let Some(health) = health {
            join_logged("Health check", health).await;
        }
        Ok(())
    }

    /// Serves both gRPC services on `listener` until `shutdown` resolves.
    pub async fn serve<P, F>(
        &self,
        listener: TcpListener,
        processor: P,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        P: ExtProcessor,
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            info!("Starting gRPC server on {}", addr);
        }

        let ext_proc = ExtProcService::new(processor);
        let authz = AuthorizationService::new(self.config.check_missing_session);

        Server::builder()
            .add_service(ext_proc.into_server())
            .add_service(authz.into_server())
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await?;

        info!("gRPC server stopped");
        Ok(())
    }

    /// Spawns the health check HTTP server on `listener`.
    pub fn spawn_health_check<F>(listener: TcpListener, shutdown: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            if let Err(e) = Self::serve_health_check(listener, shutdown).await {
                error!("Failed to run health check server: {}", e);
            }
        })
    }

    async fn serve_health_check<F>(listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            info!("Starting health check server on {}", addr);
        }

        let make_service = hyper::service::make_service_fn(|_| async {
            Ok::<_, Infallible>(hyper::service::service_fn(|_| async {
                Ok::<_, Infallible>(Response::new(Body::empty()))
            }))
        });

        HyperServer::builder(hyper::server::accept::from_stream(TcpListenerStream::new(
            listener,
        )))
        .serve(make_service)
        .with_graceful_shutdown(shutdown)
        .await?;

        Ok(())
    }
}

/// Waits for a background task, logging a panic or cancellation. Returns
/// whether the task finished normally.
async fn join_logged(name: &str, handle: tokio::task::JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            error!("{} task failed: {}", name, e);
            false
        }
    }
}

/// Resolves once the flag in `rx` turns true or its sender goes away.
async fn wait_for(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
