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

//! Error types for FHIRPath compilation and evaluation
//!
//! Pipeline-level failures (compile, context, evaluation, processing) live in
//! [`crate::lab::LabError`]; this module covers the engine underneath.

use crate::parser::ParseError;
use thiserror::Error;

/// Result type alias for FHIRPath operations
pub type Result<T> = std::result::Result<T, FhirPathError>;

/// Error type for FHIRPath compilation and evaluation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FhirPathError {
    /// Parsing errors
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Runtime evaluation errors
    #[error("{message}")]
    EvaluationError {
        /// Human-readable evaluation error message
        message: String,
    },

    /// The expression navigated from an input document that was not supplied
    #[error("{what} requires an input resource")]
    ResourceRequired {
        /// Expression element that needed the resource
        what: String,
    },

    /// Unknown function
    #[error("Unknown function: {function_name}")]
    UnknownFunction {
        /// Name of the unknown function
        function_name: String,
    },

    /// Reference to a variable that was never declared
    #[error("Unknown variable: %{name}")]
    UnknownVariable {
        /// Variable name without the leading '%'
        name: String,
    },

    /// Invalid argument count
    #[error("Function '{function_name}' expects {expected} arguments, got {actual}")]
    InvalidArgumentCount {
        /// Name of the function with invalid argument count
        function_name: String,
        /// Expected argument count description
        expected: String,
        /// Actual number of arguments received
        actual: usize,
    },

    /// Function call errors
    #[error("Function '{function_name}' error: {message}")]
    FunctionError {
        /// Name of the function that caused the error
        function_name: String,
        /// Human-readable error message
        message: String,
    },

    /// Type errors during evaluation
    #[error("Type error: {message}")]
    TypeError {
        /// Human-readable type error message
        message: String,
    },

    /// Failure reported by a terminology server
    #[error("Terminology operation '{operation}' failed: {message}")]
    TerminologyError {
        /// `$expand` or `$lookup`
        operation: String,
        /// Server or transport message
        message: String,
    },

    /// Failure fetching a remote document
    #[error("Unable to fetch '{reference}': {message}")]
    FetchError {
        /// Absolute reference that was requested
        reference: String,
        /// Transport or decoding message
        message: String,
    },

    /// Malformed JSON supplied by the caller
    #[error("Invalid JSON: {message}")]
    InvalidJson {
        /// Decoder message
        message: String,
    },
}

impl FhirPathError {
    /// Create an evaluation error
    pub fn evaluation_error(message: impl Into<String>) -> Self {
        Self::EvaluationError {
            message: message.into(),
        }
    }

    /// Create a function error
    pub fn function_error(function_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FunctionError {
            function_name: function_name.into(),
            message: message.into(),
        }
    }

    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError {
            message: message.into(),
        }
    }

    /// Create a resource-required error
    pub fn resource_required(what: impl Into<String>) -> Self {
        Self::ResourceRequired { what: what.into() }
    }

    /// True when the failure was caused by a missing input document
    pub fn is_resource_required(&self) -> bool {
        matches!(self, Self::ResourceRequired { .. })
    }
}

impl From<serde_json::Error> for FhirPathError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson {
            message: err.to_string(),
        }
    }
}
