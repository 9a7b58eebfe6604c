// Copyright 2024 OctoFHIR Team
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

//! FHIRPath Lab server
//!
//! Serves `$fhirpath` (R4B) and `$fhirpath-r5` over HTTP.

use clap::Parser;
use octofhir_fhirpath_lab::config::{LabConfig, TERMINOLOGY_SERVER_ENV};
use octofhir_fhirpath_lab::server::{AppState, ServerConfig, serve};
use std::net::IpAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "fhirpath-lab-server", version, about = "FHIRPath Lab evaluation server")]
struct Args {
    /// Host IP address to bind to
    #[arg(long, env = "FHIRPATH_LAB_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to bind to
    #[arg(short, long, env = "FHIRPATH_LAB_PORT", default_value_t = 7071)]
    port: u16,

    /// Terminology server used when a request names none
    #[arg(long, env = TERMINOLOGY_SERVER_ENV)]
    terminology_server: Option<String>,

    /// Timeout in seconds for remote fetches and terminology calls
    #[arg(long, default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    human_panic::setup_panic!();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut builder = LabConfig::builder().remote_timeout(Duration::from_secs(args.timeout));
    if let Some(server) = args.terminology_server.filter(|s| !s.trim().is_empty()) {
        builder = builder.default_terminology_server(server);
    }
    let config = builder.build();
    tracing::info!(
        "default terminology server: {}",
        config.default_terminology_server
    );

    let server = ServerConfig {
        host: args.host,
        port: args.port,
    };
    serve(server, AppState::new(config)).await
}
