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

//! Request handlers

use super::AppState;
use super::error::{ServerError, ServerResult, fhir_json};
use crate::config::FhirVersion;
use crate::lab::{LabRequest, Parameters, capability_statement};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, Uri},
    response::Response,
};
use tracing::{debug, error, info};

/// `GET /metadata`
pub async fn metadata_handler(State(state): State<AppState>) -> Response {
    let statement = capability_statement(state.config(), FhirVersion::default());
    fhir_json(StatusCode::OK, statement)
}

/// `GET /$fhirpath[-r5]?expression=...`
pub async fn fhirpath_get_handler(
    State(state): State<AppState>,
    uri: Uri,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ServerResult<Response> {
    let version = operation_version(&uri)?;
    let request = LabRequest::from_query(pairs)?;
    run(state, version, request).await
}

/// `POST /$fhirpath[-r5]` with a `Parameters` body
pub async fn fhirpath_post_handler(
    State(state): State<AppState>,
    uri: Uri,
    body: Bytes,
) -> ServerResult<Response> {
    let version = operation_version(&uri)?;
    let parameters: Parameters =
        serde_json::from_slice(&body).map_err(|err| ServerError::BadRequest {
            message: err.to_string(),
        })?;
    let request = LabRequest::from_parameters(&parameters)?;
    run(state, version, request).await
}

fn operation_version(uri: &Uri) -> ServerResult<FhirVersion> {
    FhirVersion::from_operation(uri.path()).ok_or_else(|| ServerError::UnsupportedOperation {
        operation: uri.path().to_string(),
    })
}

async fn run(state: AppState, version: FhirVersion, request: LabRequest) -> ServerResult<Response> {
    let evaluator = state.evaluator(version);
    info!("evaluating '{}' ({version})", request.expression);
    let response = tokio::task::spawn_blocking(move || evaluator.evaluate(request))
        .await
        .map_err(|err| {
            error!("evaluation worker failed: {err}");
            ServerError::Internal(err.into())
        })?;
    let status = StatusCode::from_u16(response.status_code()).unwrap_or(StatusCode::OK);
    debug!("responding {status}");
    Ok(fhir_json(status, response.to_value()))
}
