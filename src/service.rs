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
use crate::envoy::service::ext_proc::v3::{
    external_processor_server::{ExternalProcessor, ExternalProcessorServer},
    ProcessingRequest, ProcessingResponse,
};
use crate::processor::ExtProcessor;
use crate::session::StreamSession;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

/// Responses are sent one at a time, so the channel never holds more than a
/// single in-flight message per session.
const RESPONSE_BUFFER: usize = 1;

pub struct ExtProcService {
    processor: Arc<dyn ExtProcessor>,
}

impl ExtProcService {
    pub fn new<P: ExtProcessor + 'static>(processor: P) -> Self {
        Self {
            processor: Arc::new(processor),
        }
    }

    pub fn into_server(self) -> ExternalProcessorServer<Self> {
        ExternalProcessorServer::new(self)
    }
}

#[tonic::async_trait]
impl ExternalProcessor for ExtProcService {
    type ProcessStream =
        Pin<Box<dyn Stream<Item = Result<ProcessingResponse, Status>> + Send + 'static>>;

    async fn process(
        &self,
        request: Request<tonic::Streaming<ProcessingRequest>>,
    ) -> Result<Response<Self::ProcessStream>, Status> {
        let peer = request.remote_addr();
        let stream = request.into_inner();
        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);

        StreamSession::new(self.processor.clone())
            .with_peer(peer)
            .spawn(stream, tx);

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }
}
