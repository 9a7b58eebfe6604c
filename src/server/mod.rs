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

//! HTTP server for the lab operations
//!
//! Routes:
//! - `GET /metadata`: CapabilityStatement
//! - `GET|POST /$fhirpath`: evaluation against the R4B model
//! - `GET|POST /$fhirpath-r5`: evaluation against the R5 model

pub mod error;
pub mod handlers;

use crate::config::{FhirVersion, LabConfig};
use crate::lab::ExpressionEvaluator;
use axum::{Router, routing::get};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use handlers::{fhirpath_get_handler, fhirpath_post_handler, metadata_handler};

/// Address the server binds to
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host IP address to bind to
    pub host: IpAddr,
    /// Port to bind to
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: [127, 0, 0, 1].into(),
            port: 7071,
        }
    }
}

/// Shared handler state: one evaluator per FHIR version
#[derive(Clone)]
pub struct AppState {
    config: Arc<LabConfig>,
    evaluators: Arc<Vec<Arc<ExpressionEvaluator>>>,
}

impl AppState {
    /// State with HTTP-backed evaluators for every version
    pub fn new(config: LabConfig) -> Self {
        let evaluators = FhirVersion::all()
            .iter()
            .map(|version| ExpressionEvaluator::new(*version, config.clone()))
            .collect();
        Self::from_evaluators(config, evaluators)
    }

    /// State over prepared evaluators
    pub fn from_evaluators(config: LabConfig, evaluators: Vec<ExpressionEvaluator>) -> Self {
        Self {
            config: Arc::new(config),
            evaluators: Arc::new(evaluators.into_iter().map(Arc::new).collect()),
        }
    }

    /// Shared configuration
    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    /// Evaluator for `version`, created on demand if none was prepared
    pub fn evaluator(&self, version: FhirVersion) -> Arc<ExpressionEvaluator> {
        self.evaluators
            .iter()
            .find(|evaluator| evaluator.version() == version)
            .cloned()
            .unwrap_or_else(|| Arc::new(ExpressionEvaluator::new(version, (*self.config).clone())))
    }
}

/// Build the router
pub fn router(state: AppState) -> Router {
    let mut app = Router::new().route("/metadata", get(metadata_handler));
    for version in FhirVersion::all() {
        let path = format!("/{}", version.operation_name());
        app = app.route(&path, get(fhirpath_get_handler).post(fhirpath_post_handler));
    }
    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Bind and serve until shutdown
pub async fn serve(server: ServerConfig, state: AppState) -> anyhow::Result<()> {
    let addr = SocketAddr::from((server.host, server.port));
    let app = router(state);
    info!("FHIRPath Lab server listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
