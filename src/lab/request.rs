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

//! Lab request input
//!
//! A request arrives either as a `Parameters` resource (POST) or as query
//! string pairs (GET, every value a string).

use super::error::LabError;
use super::parameters::{Parameters, ParametersParameter};
use super::resolver::DocumentFetcher;
use serde_json::Value;

/// One evaluation request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabRequest {
    /// Expression to evaluate
    pub expression: String,
    /// Optional context expression selecting the evaluation roots
    pub context: Option<String>,
    /// Embedded input resource
    pub resource: Option<Value>,
    /// Input given as a reference string
    pub resource_reference: Option<String>,
    /// Terminology server for `%terminologies`
    pub terminology_server: Option<String>,
    /// `variables` parameter with one part per variable
    pub variables: Option<ParametersParameter>,
    /// Run type analysis and emit debug output
    pub validate: bool,
}

impl LabRequest {
    /// Request for an expression with no input
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            ..Self::default()
        }
    }

    /// Set the input resource
    pub fn with_resource(mut self, resource: Value) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Set the input by reference
    pub fn with_resource_reference(mut self, reference: impl Into<String>) -> Self {
        self.resource_reference = Some(reference.into());
        self
    }

    /// Set the context expression
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set the terminology server
    pub fn with_terminology_server(mut self, server: impl Into<String>) -> Self {
        self.terminology_server = Some(server.into());
        self
    }

    /// Add a variable part
    pub fn with_variable(mut self, part: ParametersParameter) -> Self {
        self.variables
            .get_or_insert_with(|| ParametersParameter::named("variables"))
            .push_part(part);
        self
    }

    /// Enable validation output
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Context expression, when present and non-empty
    pub fn context_expression(&self) -> Option<&str> {
        self.context.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Read a `Parameters` request body
    pub fn from_parameters(parameters: &Parameters) -> Result<Self, LabError> {
        if parameters.resource_type != "Parameters" {
            return Err(LabError::InvalidRequest {
                message: format!("expected Parameters, found {}", parameters.resource_type),
            });
        }
        let expression = parameters
            .string("expression")
            .ok_or_else(|| LabError::MissingParameter {
                name: "expression".to_string(),
            })?
            .to_string();
        let resource_parameter = parameters.get("resource");
        let owned = |text: Option<&str>| text.filter(|t| !t.is_empty()).map(str::to_string);
        Ok(Self {
            expression,
            context: owned(parameters.string("context")),
            resource: resource_parameter.and_then(|p| p.resource.clone()),
            resource_reference: owned(resource_parameter.and_then(ParametersParameter::value_str)),
            terminology_server: owned(parameters.string("terminologyserver")),
            variables: parameters.get("variables").cloned(),
            validate: parameters.boolean("validate").unwrap_or(false),
        })
    }

    /// Read query string pairs
    pub fn from_query<I, K, V>(pairs: I) -> Result<Self, LabError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut parameters = Parameters::new();
        for (name, value) in pairs {
            parameters.push(ParametersParameter::string(name, value));
        }
        Self::from_parameters(&parameters)
    }

    /// Fetch the input when it was given as an absolute reference
    pub fn load_resource(&mut self, fetcher: &dyn DocumentFetcher) -> Result<(), LabError> {
        if self.resource.is_some() {
            return Ok(());
        }
        let Some(reference) = self.resource_reference.as_deref() else {
            return Ok(());
        };
        if !(reference.starts_with("http:") || reference.starts_with("https:")) {
            return Ok(());
        }
        match fetcher.fetch(reference) {
            Ok(resource) => {
                self.resource = Some(resource);
                Ok(())
            }
            Err(err) => {
                log::warn!("unable to retrieve {reference}: {err}");
                Err(LabError::ResourceNotFound {
                    reference: reference.to_string(),
                })
            }
        }
    }
}
