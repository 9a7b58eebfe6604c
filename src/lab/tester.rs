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

//! The lab evaluation pipeline
//!
//! One request moves through compile, context resolution, execution and
//! formatting. The first fatal failure ends the request with an
//! OperationOutcome; otherwise the answer is a `Parameters` resource whose
//! first part echoes the request configuration and whose remaining parts
//! are one `result` per context node.

use super::error::LabError;
use super::parameters::{
    IssueSeverity, IssueType, OperationOutcome, OperationOutcomeIssue, Parameters,
    ParametersParameter,
};
use super::request::LabRequest;
use super::resolver::{DocumentFetcher, HttpDocumentFetcher, ReferenceResolver};
use super::result_tree::result_part;
use super::terminology::{HttpTerminologyService, TerminologyClient, TerminologyService};
use super::variables::VariableBinder;
use crate::analyzer::{InferredType, IssueLevel, TypeAnalyzer};
use crate::compiler::CompiledExpression;
use crate::config::{FhirVersion, LabConfig};
use crate::evaluator::{Evaluator, RequestContext, SymbolTable};
use crate::model::{BuiltinModelProvider, ElementNode, FhirPathValue};
use crate::parser;
use crate::registry::FunctionRegistry;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Type assumed for validation when no resource is supplied
const DEFAULT_VALIDATION_TYPE: &str = "Patient";

/// Pipeline stage of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Request accepted
    Init,
    /// Main expression compiled
    Compiled,
    /// Context nodes selected
    ContextResolved,
    /// A context node evaluated
    Executed,
    /// All results shaped
    Formatted,
    /// Ended with an OperationOutcome
    Errored,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Compiled => "compiled",
            Stage::ContextResolved => "context-resolved",
            Stage::Executed => "executed",
            Stage::Formatted => "formatted",
            Stage::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Answer to a lab request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LabResponse {
    /// Successful evaluation
    Parameters(Parameters),
    /// Request-level failure
    Outcome(OperationOutcome),
}

impl LabResponse {
    /// Response for a fatal error
    pub fn from_error(err: &LabError) -> Self {
        Self::Outcome(OperationOutcome::from_issue(err.to_issue()))
    }

    /// JSON form
    pub fn to_value(&self) -> Value {
        match self {
            Self::Parameters(parameters) => parameters.to_value(),
            Self::Outcome(outcome) => outcome.to_value(),
        }
    }

    /// HTTP status the response is served with
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Parameters(_) => 200,
            Self::Outcome(_) => 400,
        }
    }

    /// The parameters, when successful
    pub fn as_parameters(&self) -> Option<&Parameters> {
        match self {
            Self::Parameters(parameters) => Some(parameters),
            Self::Outcome(_) => None,
        }
    }

    /// The outcome, when failed
    pub fn as_outcome(&self) -> Option<&OperationOutcome> {
        match self {
            Self::Outcome(outcome) => Some(outcome),
            Self::Parameters(_) => None,
        }
    }
}

/// Runs lab requests for one FHIR version
///
/// Shared across requests; everything request-scoped (symbols, resolver
/// cache, trace log) is created per call to [`ExpressionEvaluator::evaluate`].
pub struct ExpressionEvaluator {
    config: LabConfig,
    version: FhirVersion,
    functions: Arc<FunctionRegistry>,
    model: BuiltinModelProvider,
    fetcher: Arc<dyn DocumentFetcher + Send + Sync>,
    terminology: Arc<dyn TerminologyService + Send + Sync>,
}

impl ExpressionEvaluator {
    /// Evaluator using HTTP for remote documents and terminology
    pub fn new(version: FhirVersion, config: LabConfig) -> Self {
        let fetcher = Arc::new(HttpDocumentFetcher::new(config.remote_timeout));
        let terminology = Arc::new(HttpTerminologyService::new(config.remote_timeout));
        Self {
            config,
            version,
            functions: Arc::new(FunctionRegistry::lab()),
            model: BuiltinModelProvider::new(version),
            fetcher,
            terminology,
        }
    }

    /// Replace the remote document fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn DocumentFetcher + Send + Sync>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replace the terminology service
    pub fn with_terminology_service(
        mut self,
        service: Arc<dyn TerminologyService + Send + Sync>,
    ) -> Self {
        self.terminology = service;
        self
    }

    /// FHIR version served
    pub fn version(&self) -> FhirVersion {
        self.version
    }

    /// Shared configuration
    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    /// Run one request
    pub fn evaluate(&self, mut request: LabRequest) -> LabResponse {
        if let Err(err) = request.load_resource(&*self.fetcher) {
            return self.fail(&err, Vec::new());
        }
        let mut debug_issues = Vec::new();
        match self.run(&request, &mut debug_issues) {
            Ok(parameters) => LabResponse::Parameters(parameters),
            Err(err) => self.fail(&err, debug_issues),
        }
    }

    /// The `parameters` configuration block of a request, with the
    /// validation parts when `validate` is set
    ///
    /// Built before the expression is compiled, so it does not depend on
    /// how execution ends.
    pub fn configuration(&self, request: &LabRequest) -> Result<ParametersParameter, LabError> {
        let symbols = self.symbols(request)?;
        Ok(self.configuration_with(request, &symbols, &mut Vec::new()))
    }

    /// Validation issues come first, as they were found before the failure
    fn fail(&self, err: &LabError, debug_issues: Vec<OperationOutcomeIssue>) -> LabResponse {
        log::debug!("stage {}: {err}", Stage::Errored);
        let mut outcome = OperationOutcome::new();
        outcome.issue = debug_issues;
        outcome.issue.push(err.to_issue());
        LabResponse::Outcome(outcome)
    }

    fn symbols(&self, request: &LabRequest) -> Result<SymbolTable, LabError> {
        let mut symbols = SymbolTable::new(self.functions.clone());
        if let Some(variables) = &request.variables {
            VariableBinder::new(&self.model)
                .bind(&mut symbols, variables)
                .map_err(|err| LabError::Compile {
                    message: err.to_string(),
                    expression: request.expression.clone(),
                })?;
        }
        Ok(symbols)
    }

    fn configuration_with(
        &self,
        request: &LabRequest,
        symbols: &SymbolTable,
        debug_issues: &mut Vec<OperationOutcomeIssue>,
    ) -> ParametersParameter {
        let mut configuration = self.configuration_part(request);
        if request.validate {
            let (debug_parts, issues) = self.validate(request, symbols);
            configuration.part.splice(1..1, debug_parts);
            *debug_issues = issues;
        }
        configuration
    }

    fn run(
        &self,
        request: &LabRequest,
        debug_issues: &mut Vec<OperationOutcomeIssue>,
    ) -> Result<Parameters, LabError> {
        log::debug!("stage {}: '{}'", Stage::Init, request.expression);
        let compile_error = |err: &dyn fmt::Display| LabError::Compile {
            message: err.to_string(),
            expression: request.expression.clone(),
        };

        let symbols = self.symbols(request)?;
        let mut result = Parameters::new().with_id("fhirpath");
        let configuration = self.configuration_with(request, &symbols, debug_issues);

        let compiled = CompiledExpression::compile(&request.expression, &symbols)
            .map_err(|err| compile_error(&err))?;
        log::debug!("stage {}", Stage::Compiled);

        let root = request
            .resource
            .clone()
            .map(|json| FhirPathValue::Element(ElementNode::resource(json)));
        let resolver = ReferenceResolver::new(root.as_ref().and_then(FhirPathValue::as_element).cloned())
            .with_fetcher(&*self.fetcher);
        let server = request
            .terminology_server
            .clone()
            .unwrap_or_else(|| self.config.default_terminology_server.clone());
        let terminology = TerminologyClient::new(server, &*self.terminology);
        let context = RequestContext::new()
            .with_resolver(&resolver)
            .with_terminology(&terminology);

        let contexts = self.select_contexts(request, &symbols, &context, root.as_ref())?;
        log::debug!("stage {}: {} context nodes", Stage::ContextResolved, contexts.len());

        result.push(configuration);
        for (key, node) in contexts {
            context.clear_trace();
            let evaluator = Evaluator::new(&symbols, &context, &self.model)
                .with_root(root.clone())
                .with_context(node);
            let values = compiled.execute(&evaluator).map_err(|err| {
                if root.is_none() && err.is_resource_required() {
                    LabError::ResourceRequired {
                        key: key.clone(),
                        expression: request.expression.clone(),
                    }
                } else {
                    LabError::Evaluation {
                        message: err.to_string(),
                        expression: request.expression.clone(),
                    }
                }
            })?;
            log::debug!("stage {}: {key} -> {} values", Stage::Executed, values.len());

            for warning in resolver.take_warnings() {
                result.push(ParametersParameter::string("error", warning));
            }
            let traces = context.take_trace();
            let shaped = result_part(&key, &values, &traces, &self.model);
            if !push_result(&mut result, key, shaped) {
                return Ok(result);
            }
        }
        log::debug!("stage {}", Stage::Formatted);
        Ok(result)
    }

    /// Echo of the request, the first part of every successful response
    fn configuration_part(&self, request: &LabRequest) -> ParametersParameter {
        let mut part = ParametersParameter::named("parameters");
        part.push_part(ParametersParameter::string(
            "evaluator",
            self.config.evaluator_label(self.version),
        ));
        if let Some(context) = request.context_expression() {
            part.push_part(ParametersParameter::string("context", context));
        }
        part.push_part(ParametersParameter::string(
            "expression",
            request.expression.clone(),
        ));
        if let Some(reference) = &request.resource_reference {
            part.push_part(ParametersParameter::string("resource", reference.clone()));
        } else if let Some(resource) = &request.resource {
            part.push_part(ParametersParameter::resource("resource", resource.clone()));
        }
        if let Some(server) = &request.terminology_server {
            part.push_part(ParametersParameter::string(
                "terminologyServerUrl",
                server.clone(),
            ));
        }
        if let Some(variables) = &request.variables {
            part.push_part(variables.clone());
        }
        part
    }

    /// Context nodes keyed by location; a single unnamed entry without a
    /// context expression
    fn select_contexts(
        &self,
        request: &LabRequest,
        symbols: &SymbolTable,
        context: &RequestContext<'_>,
        root: Option<&FhirPathValue>,
    ) -> Result<IndexMap<String, Option<FhirPathValue>>, LabError> {
        let mut contexts = IndexMap::new();
        let Some(text) = request.context_expression() else {
            contexts.insert(String::new(), root.cloned());
            return Ok(contexts);
        };
        let context_error = |message: String| LabError::Context {
            message,
            context: text.to_string(),
        };

        let compiled = CompiledExpression::compile(text, symbols)
            .map_err(|err| context_error(err.to_string()))?;
        let evaluator = Evaluator::new(symbols, context, &self.model)
            .with_root(root.cloned())
            .with_context(root.cloned());
        let nodes = compiled.execute(&evaluator).map_err(|err| {
            if root.is_none() && err.is_resource_required() {
                LabError::ContextRequiresResource {
                    context: text.to_string(),
                }
            } else {
                context_error(err.to_string())
            }
        })?;

        for (index, node) in nodes.iter().enumerate() {
            let key = match node.as_element().map(ElementNode::location) {
                Some(location) if !location.is_empty() => location.to_string(),
                _ => format!("[{index}]"),
            };
            if contexts.contains_key(&key) {
                return Err(context_error(format!("Duplicate context location {key}")));
            }
            contexts.insert(key, Some(node.clone()));
        }
        Ok(contexts)
    }

    /// Static analysis parts, placed right after `evaluator`, and the
    /// issues found
    fn validate(
        &self,
        request: &LabRequest,
        symbols: &SymbolTable,
    ) -> (Vec<ParametersParameter>, Vec<OperationOutcomeIssue>) {
        let resource_type = request
            .resource
            .as_ref()
            .and_then(|r| r.get("resourceType"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_VALIDATION_TYPE);
        let resource = InferredType::single(resource_type);

        let mut input = resource.clone();
        if let Some(context) = request.context_expression() {
            let Ok(ast) = parser::parse(context) else {
                return (Vec::new(), Vec::new());
            };
            input = TypeAnalyzer::new(&self.model, symbols, resource.clone())
                .analyze(&ast)
                .return_type
                .with_collection(false);
        }
        let Ok(ast) = parser::parse(&request.expression) else {
            return (Vec::new(), Vec::new());
        };
        let analysis = TypeAnalyzer::new(&self.model, symbols, input)
            .with_resource(resource)
            .analyze(&ast);

        let mut parts = vec![ParametersParameter::string(
            "expectedReturnType",
            analysis.return_type_text.clone(),
        )];
        if let Some(tree) = &analysis.tree
            && let Ok(text) = serde_json::to_string_pretty(tree)
        {
            parts.push(ParametersParameter::string("parseDebugTree", text));
        }
        let issues: Vec<_> = analysis
            .issues
            .iter()
            .map(|issue| {
                let (severity, code) = match issue.level {
                    IssueLevel::Error => (IssueSeverity::Error, IssueType::Invalid),
                    IssueLevel::Warning => (IssueSeverity::Warning, IssueType::Processing),
                };
                OperationOutcomeIssue::new(severity, code, issue.message.clone())
                    .with_diagnostics(request.expression.clone())
            })
            .collect();
        if !issues.is_empty() {
            let mut outcome = OperationOutcome::new();
            outcome.issue = issues.clone();
            parts.push(ParametersParameter::resource(
                "debugOutcome",
                outcome.to_value(),
            ));
        }
        parts.push(ParametersParameter::string("parseDebug", analysis.dump()));
        (parts, issues)
    }
}

/// Append a shaped `result` part, or an `error` part when shaping failed
///
/// Returns `false` when the remaining contexts must be skipped.
fn push_result(
    result: &mut Parameters,
    key: String,
    shaped: crate::error::Result<ParametersParameter>,
) -> bool {
    match shaped {
        Ok(part) => {
            result.push(part);
            true
        }
        Err(err) => {
            let processing = LabError::Processing {
                key,
                message: err.to_string(),
            };
            log::warn!("{processing}");
            result.push(ParametersParameter::string("error", processing.to_string()));
            false
        }
    }
}

impl fmt::Debug for ExpressionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionEvaluator")
            .field("version", &self.version)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FhirPathError, Result};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct NoRemote;

    impl DocumentFetcher for NoRemote {
        fn fetch(&self, url: &str) -> Result<Value> {
            Err(FhirPathError::FetchError {
                reference: url.to_string(),
                message: "offline".to_string(),
            })
        }
    }

    impl TerminologyService for NoRemote {
        fn expand(&self, server: &str, _parameters: &Parameters) -> Result<Value> {
            Err(FhirPathError::TerminologyError {
                operation: "$expand".to_string(),
                message: format!("{server} offline"),
            })
        }

        fn lookup(&self, server: &str, _parameters: &Parameters) -> Result<Value> {
            Err(FhirPathError::TerminologyError {
                operation: "$lookup".to_string(),
                message: format!("{server} offline"),
            })
        }
    }

    fn evaluator() -> ExpressionEvaluator {
        let config = LabConfig::builder().evaluator_name("lab").build();
        ExpressionEvaluator::new(FhirVersion::R4B, config)
            .with_fetcher(Arc::new(NoRemote))
            .with_terminology_service(Arc::new(NoRemote))
    }

    fn patient() -> Value {
        json!({
            "resourceType": "Patient",
            "id": "pat1",
            "name": [
                {"family": "Smith", "given": ["Ann", "Jo"]},
                {"family": "Jones"}
            ]
        })
    }

    fn part_names(part: &ParametersParameter) -> Vec<&str> {
        part.part.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_no_input() {
        let response = evaluator().evaluate(LabRequest::new("1 + 1"));
        let parameters = response.as_parameters().unwrap();
        assert_eq!(parameters.id.as_deref(), Some("fhirpath"));
        assert_eq!(
            part_names(&parameters.parameter[0]),
            vec!["evaluator", "expression"]
        );
        assert_eq!(
            parameters.parameter[0].part[0].value_str(),
            Some("lab (R4B)")
        );
        assert_eq!(
            serde_json::to_value(&parameters.parameter[1]).unwrap(),
            json!({"name": "result", "part": [{"name": "integer", "valueInteger": 2}]})
        );
    }

    #[test]
    fn test_context_keys() {
        let request = LabRequest::new("given")
            .with_resource(patient())
            .with_context("name");
        let response = evaluator().evaluate(request);
        let parameters = response.as_parameters().unwrap();
        let results: Vec<_> = parameters.parameter[1..]
            .iter()
            .map(|p| (p.value_str().unwrap_or_default().to_string(), p.part.len()))
            .collect();
        assert_eq!(
            results,
            vec![
                ("Patient.name[0]".to_string(), 2),
                ("Patient.name[1]".to_string(), 0)
            ]
        );
    }

    #[test]
    fn test_resource_required() {
        let outcome = evaluator().evaluate(LabRequest::new("name.given"));
        let issue = &outcome.as_outcome().unwrap().issue[0];
        assert_eq!(issue.code, IssueType::Value);
        assert_eq!(outcome.status_code(), 400);

        let outcome = evaluator().evaluate(LabRequest::new("given").with_context("name"));
        let issue = &outcome.as_outcome().unwrap().issue[0];
        assert_eq!(issue.text(), Some("Context expression requires a resource"));
        assert_eq!(issue.diagnostics.as_deref(), Some("name"));
    }

    #[test]
    fn test_syntax_error() {
        let outcome = evaluator().evaluate(LabRequest::new("name.where(").with_resource(patient()));
        let issue = &outcome.as_outcome().unwrap().issue[0];
        assert_eq!(issue.code, IssueType::Exception);
        assert!(issue.text().unwrap().starts_with("Invalid expression: "));
        assert_eq!(issue.diagnostics.as_deref(), Some("name.where("));
    }

    #[test]
    fn test_unreachable_resource() {
        let request = LabRequest::new("id").with_resource_reference("http://example.org/Patient/1");
        let outcome = evaluator().evaluate(request);
        let issue = &outcome.as_outcome().unwrap().issue[0];
        assert_eq!(issue.code, IssueType::NotFound);
        assert_eq!(
            issue.text(),
            Some("Unable to retrieve resource http://example.org/Patient/1")
        );
    }

    #[test]
    fn test_validation_parts() {
        let request = LabRequest::new("name.given")
            .with_resource(patient())
            .with_validation(true);
        let response = evaluator().evaluate(request);
        let configuration = &response.as_parameters().unwrap().parameter[0];
        assert_eq!(
            part_names(configuration),
            vec![
                "evaluator",
                "expectedReturnType",
                "parseDebugTree",
                "parseDebug",
                "expression",
                "resource"
            ]
        );
        assert_eq!(configuration.part[1].value_str(), Some("string[]"));
    }

    #[test]
    fn test_validation_reports_issues() {
        let request = LabRequest::new("nme").with_resource(patient()).with_validation(true);
        let response = evaluator().evaluate(request);
        let configuration = &response.as_parameters().unwrap().parameter[0];
        let outcome = configuration
            .part
            .iter()
            .find(|p| p.name == "debugOutcome")
            .and_then(|p| p.resource.as_ref())
            .unwrap();
        assert_eq!(outcome["issue"][0]["severity"], "warning");
    }

    #[test]
    fn test_validation_survives_execution_failure() {
        let request = LabRequest::new("name.given").with_validation(true);
        let evaluator = evaluator();
        let configuration = evaluator.configuration(&request).unwrap();
        assert_eq!(configuration.part[1].name, "expectedReturnType");
        assert_eq!(configuration.part[1].value_str(), Some("string[]"));

        let outcome = evaluator.evaluate(request);
        let issue = &outcome.as_outcome().unwrap().issue[0];
        assert_eq!(issue.code, IssueType::Value);
    }

    #[test]
    fn test_validation_issues_precede_failure() {
        let request = LabRequest::new("nme").with_validation(true);
        let outcome = evaluator().evaluate(request);
        let issues = &outcome.as_outcome().unwrap().issue;
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].severity, IssueSeverity::Warning);
        assert_eq!(issues[1].code, IssueType::Value);
    }

    #[test]
    fn test_terminology_failure_aborts() {
        let request = LabRequest::new(
            "%terminologies.expand('http://hl7.org/fhir/ValueSet/administrative-gender')",
        );
        let outcome = evaluator().evaluate(request);
        let issue = &outcome.as_outcome().unwrap().issue[0];
        assert_eq!(issue.code, IssueType::Exception);
        assert!(issue.text().unwrap().contains("$expand"));
    }

    #[test]
    fn test_processing_error_keeps_partial_result() {
        let mut result = Parameters::new();
        assert!(push_result(
            &mut result,
            "Patient.name[0]".to_string(),
            Ok(ParametersParameter::string("result", "Patient.name[0]")),
        ));
        let failed = Err(FhirPathError::evaluation_error("unrenderable value"));
        assert!(!push_result(&mut result, "Patient.name[1]".to_string(), failed));

        assert_eq!(result.parameter.len(), 2);
        assert_eq!(result.parameter[0].name, "result");
        assert_eq!(result.parameter[1].name, "error");
        assert_eq!(
            result.parameter[1].value_str(),
            Some("Processing results error: (Patient.name[1])\nunrenderable value")
        );
    }
}
