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
use anyhow::Context;
use log::info;
use session_callout::{config::Config, server::CalloutServer, session_header::SessionHeaderProcessor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    env_logger::Builder::new()
        .filter_level(config.log_level.into())
        .init();

    info!(
        "Starting session callout (stream missing session: {:?}, check missing session: {:?})",
        config.stream_missing_session, config.check_missing_session
    );

    let processor = SessionHeaderProcessor::new(config.stream_missing_session);
    let server = CalloutServer::new(config);

    server
        .run(processor)
        .await
        .context("Callout server failed")?;

    info!("Callout server exited");
    Ok(())
}
