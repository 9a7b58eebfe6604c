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

//! Error handling for the lab HTTP server

use crate::lab::{IssueType, LabError, OperationOutcome, OperationOutcomeIssue};
use axum::{
    Json,
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Server-specific errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Request could not be read
    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    /// Request was read but rejected by the pipeline
    #[error(transparent)]
    Lab(#[from] LabError),

    /// No evaluator for the requested version
    #[error("Unsupported operation: {operation}")]
    UnsupportedOperation { operation: String },

    /// Worker failure
    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest { .. } | ServerError::Lab(_) => StatusCode::BAD_REQUEST,
            ServerError::UnsupportedOperation { .. } => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn issue(&self) -> OperationOutcomeIssue {
        match self {
            ServerError::Lab(err) => err.to_issue(),
            ServerError::BadRequest { .. } => {
                OperationOutcomeIssue::error(IssueType::Invalid, self.to_string())
            }
            ServerError::UnsupportedOperation { .. } => {
                OperationOutcomeIssue::error(IssueType::NotSupported, self.to_string())
            }
            ServerError::Internal(_) => {
                OperationOutcomeIssue::error(IssueType::Exception, self.to_string())
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let outcome = OperationOutcome::from_issue(self.issue());
        fhir_json(self.status(), outcome.to_value())
    }
}

/// JSON response with the FHIR media type
pub fn fhir_json(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(CONTENT_TYPE, "application/fhir+json")],
        Json(body),
    )
        .into_response()
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;
