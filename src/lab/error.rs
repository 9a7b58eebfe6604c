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

//! Pipeline errors and their OperationOutcome form

use super::parameters::{IssueType, OperationOutcomeIssue};
use thiserror::Error;

/// Failures of a lab request
///
/// All variants except [`LabError::Processing`] abort the request and are
/// answered with an OperationOutcome.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LabError {
    /// A required request parameter is missing
    #[error("Missing required '{name}' parameter")]
    MissingParameter {
        /// Parameter name
        name: String,
    },

    /// A request body that is not a `Parameters` resource
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Decoder message
        message: String,
    },

    /// The input resource reference could not be fetched
    #[error("Unable to retrieve resource {reference}")]
    ResourceNotFound {
        /// The reference as supplied
        reference: String,
    },

    /// The expression failed to compile
    #[error("Invalid expression: {message}")]
    Compile {
        /// Compiler message
        message: String,
        /// Expression text
        expression: String,
    },

    /// The context expression navigated from an absent input
    #[error("Context expression requires a resource")]
    ContextRequiresResource {
        /// Context expression text
        context: String,
    },

    /// The context expression failed
    #[error("Invalid context expression: {message}")]
    Context {
        /// Failure message
        message: String,
        /// Context expression text
        context: String,
    },

    /// The expression navigated from an absent input
    #[error("Expression requires a resource {key}")]
    ResourceRequired {
        /// Context key being evaluated
        key: String,
        /// Expression text
        expression: String,
    },

    /// The expression failed while executing
    #[error("Invalid expression: {message}")]
    Evaluation {
        /// Failure message
        message: String,
        /// Expression text
        expression: String,
    },

    /// Results could not be shaped into the response
    #[error("Processing results error: ({key})\n{message}")]
    Processing {
        /// Context key being formatted
        key: String,
        /// Failure message
        message: String,
    },
}

impl LabError {
    /// Issue type code reported for this failure
    pub fn issue_type(&self) -> IssueType {
        match self {
            Self::MissingParameter { .. } | Self::InvalidRequest { .. } => IssueType::Invalid,
            Self::ResourceNotFound { .. } => IssueType::NotFound,
            Self::ContextRequiresResource { .. } | Self::ResourceRequired { .. } => {
                IssueType::Value
            }
            Self::Compile { .. }
            | Self::Context { .. }
            | Self::Evaluation { .. }
            | Self::Processing { .. } => IssueType::Exception,
        }
    }

    /// Whether the request must be answered with an OperationOutcome
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Processing { .. })
    }

    /// OperationOutcome issue for this failure
    pub fn to_issue(&self) -> OperationOutcomeIssue {
        let issue = OperationOutcomeIssue::error(self.issue_type(), self.to_string());
        match self {
            Self::ResourceNotFound { reference } => issue.with_diagnostics(reference.clone()),
            Self::Compile { expression, .. }
            | Self::ResourceRequired { expression, .. }
            | Self::Evaluation { expression, .. } => issue.with_diagnostics(expression.clone()),
            Self::ContextRequiresResource { context } | Self::Context { context, .. } => {
                issue.with_diagnostics(context.clone())
            }
            Self::MissingParameter { .. }
            | Self::InvalidRequest { .. }
            | Self::Processing { .. } => issue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::parameters::IssueSeverity;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_compile_issue() {
        let issue = LabError::Compile {
            message: "Unexpected end of input".to_string(),
            expression: "name.".to_string(),
        }
        .to_issue();
        assert_eq!(issue.severity, IssueSeverity::Error);
        assert_eq!(issue.code, IssueType::Exception);
        assert_eq!(issue.text(), Some("Invalid expression: Unexpected end of input"));
        assert_eq!(issue.diagnostics.as_deref(), Some("name."));
    }

    #[test]
    fn test_resource_issues() {
        let issue = LabError::ResourceRequired {
            key: String::new(),
            expression: "name".to_string(),
        }
        .to_issue();
        assert_eq!(issue.code, IssueType::Value);
        assert_eq!(issue.text(), Some("Expression requires a resource "));

        let issue = LabError::ContextRequiresResource {
            context: "name".to_string(),
        }
        .to_issue();
        assert_eq!(issue.code, IssueType::Value);
        assert_eq!(issue.text(), Some("Context expression requires a resource"));
    }

    #[test]
    fn test_processing_is_not_fatal() {
        let err = LabError::Processing {
            key: "Patient.name[0]".to_string(),
            message: "boom".to_string(),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "Processing results error: (Patient.name[0])\nboom");
    }
}
