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

//! End-to-end behavior of the lab pipeline

use octofhir_fhirpath_lab::lab::parameters::JSON_VALUE_EXTENSION;
use octofhir_fhirpath_lab::lab::{
    CanonicalUrl, DocumentFetcher, ExpressionEvaluator, IssueType, LabRequest, Parameters,
    ParametersParameter, TerminologyService, TypedValue,
};
use octofhir_fhirpath_lab::{FhirPathError, FhirVersion, LabConfig, Result};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

const REMOTE_PATIENT: &str = "http://example.org/fhir/Patient/p1";

#[derive(Default)]
struct CountingFetcher {
    calls: AtomicUsize,
}

impl DocumentFetcher for CountingFetcher {
    fn fetch(&self, url: &str) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if url == REMOTE_PATIENT {
            Ok(json!({"resourceType": "Patient", "id": "p1", "gender": "female"}))
        } else {
            Err(FhirPathError::FetchError {
                reference: url.to_string(),
                message: "404 Not Found".to_string(),
            })
        }
    }
}

struct StaticTerminology;

impl TerminologyService for StaticTerminology {
    fn expand(&self, _server: &str, parameters: &Parameters) -> Result<Value> {
        Ok(json!({
            "resourceType": "ValueSet",
            "url": parameters.string("url"),
            "expansion": {"contains": [{"code": "male"}, {"code": "female"}]}
        }))
    }

    fn lookup(&self, _server: &str, _parameters: &Parameters) -> Result<Value> {
        Ok(json!({
            "resourceType": "Parameters",
            "parameter": [{"name": "display", "valueString": "Female"}]
        }))
    }
}

/// Keeps every `$lookup` input it receives
#[derive(Default)]
struct RecordingTerminology {
    lookups: Mutex<Vec<Value>>,
}

impl TerminologyService for RecordingTerminology {
    fn expand(&self, _server: &str, _parameters: &Parameters) -> Result<Value> {
        Ok(json!({"resourceType": "ValueSet"}))
    }

    fn lookup(&self, _server: &str, parameters: &Parameters) -> Result<Value> {
        self.lookups.lock().unwrap().push(parameters.to_value());
        Ok(json!({"resourceType": "Parameters"}))
    }
}

fn evaluator_with(fetcher: Arc<CountingFetcher>) -> ExpressionEvaluator {
    ExpressionEvaluator::new(FhirVersion::R4B, LabConfig::default())
        .with_fetcher(fetcher)
        .with_terminology_service(Arc::new(StaticTerminology))
}

fn evaluator() -> ExpressionEvaluator {
    evaluator_with(Arc::new(CountingFetcher::default()))
}

fn patient() -> Value {
    json!({
        "resourceType": "Patient",
        "id": "example",
        "gender": "male",
        "name": [
            {"use": "official", "family": "Chalmers", "given": ["Peter", "James"]},
            {"use": "usual", "given": ["Jim"]}
        ],
        "contact": [{"gender": "female"}]
    })
}

fn observation() -> Value {
    json!({
        "resourceType": "Observation",
        "id": "obs",
        "status": "final",
        "subject": {"reference": REMOTE_PATIENT},
        "performer": [{"reference": REMOTE_PATIENT}, {"reference": "http://example.org/fhir/Practitioner/x"}]
    })
}

fn to_json(response: &octofhir_fhirpath_lab::LabResponse) -> Value {
    response.to_value()
}

#[rstest]
#[case("http://x|2.0", "http://x", Some("2.0"))]
#[case("http://x", "http://x", None)]
fn canonical_round_trip(#[case] text: &str, #[case] url: &str, #[case] version: Option<&str>) {
    let canonical = CanonicalUrl::parse(text);
    assert_eq!(canonical.value(), text);
    assert_eq!(canonical.url(), url);
    assert_eq!(canonical.version(), version);
}

#[test]
fn no_input_arithmetic() {
    let response = evaluator().evaluate(LabRequest::new("1 + 1"));
    assert_eq!(
        to_json(&response)["parameter"][1],
        json!({"name": "result", "part": [{"name": "integer", "valueInteger": 2}]})
    );
}

#[test]
fn navigation_without_input_requires_resource() {
    let response = evaluator().evaluate(LabRequest::new("name.family"));
    let outcome = response.as_outcome().unwrap();
    assert_eq!(outcome.issue.len(), 1);
    assert_eq!(outcome.issue[0].code, IssueType::Value);
    assert_eq!(outcome.issue[0].diagnostics.as_deref(), Some("name.family"));
}

#[test]
fn syntax_error_reports_expression() {
    let response = evaluator().evaluate(LabRequest::new("name.given.(").with_resource(patient()));
    let outcome = response.as_outcome().unwrap();
    assert_eq!(outcome.issue.len(), 1);
    assert_eq!(outcome.issue[0].code, IssueType::Exception);
    assert_eq!(outcome.issue[0].diagnostics.as_deref(), Some("name.given.("));
}

#[test]
fn empty_string_result() {
    let response = evaluator().evaluate(LabRequest::new("''"));
    assert_eq!(
        to_json(&response)["parameter"][1]["part"],
        json!([{"name": "empty-string"}])
    );
}

#[test]
fn configuration_echoes_request() {
    let request = LabRequest::new("given")
        .with_resource(patient())
        .with_context("name")
        .with_terminology_server("http://tx.example.org/fhir")
        .with_variable(ParametersParameter::string("v", "x"));
    let response = evaluator().evaluate(request);
    let configuration = &response.as_parameters().unwrap().parameter[0];
    let names: Vec<_> = configuration.part.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "evaluator",
            "context",
            "expression",
            "resource",
            "terminologyServerUrl",
            "variables"
        ]
    );
    assert!(
        configuration.part[0]
            .value_str()
            .unwrap()
            .ends_with("(R4B)")
    );
}

#[test]
fn raw_array_fragment_is_three_nodes() {
    let variable = ParametersParameter::named("nums")
        .with_string_extension(JSON_VALUE_EXTENSION, "[1,2,3]");
    let response = evaluator().evaluate(LabRequest::new("%nums.count()").with_variable(variable));
    assert_eq!(
        to_json(&response)["parameter"][1]["part"],
        json!([{"name": "integer", "valueInteger": 3}])
    );
}

#[test]
fn object_fragment_navigates() {
    let variable = ParametersParameter::named("obj")
        .with_string_extension(JSON_VALUE_EXTENSION, r#"{"a": {"b": "deep"}}"#);
    let response = evaluator().evaluate(LabRequest::new("%obj.a.b").with_variable(variable));
    assert_eq!(
        to_json(&response)["parameter"][1]["part"],
        json!([{"name": "string", "valueString": "deep"}])
    );
}

#[test]
fn same_reference_is_fetched_once() {
    let fetcher = Arc::new(CountingFetcher::default());
    let request = LabRequest::new("subject.resolve().id | performer.first().resolve().id")
        .with_resource(observation());
    let response = evaluator_with(fetcher.clone()).evaluate(request);
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        to_json(&response)["parameter"][1]["part"],
        json!([{"name": "id", "valueId": "p1"}])
    );
}

#[test]
fn failed_resolution_is_a_warning() {
    let fetcher = Arc::new(CountingFetcher::default());
    let request = LabRequest::new("performer.resolve().id").with_resource(observation());
    let response = evaluator_with(fetcher.clone()).evaluate(request);
    let parameters = response.as_parameters().unwrap();
    assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    assert_eq!(parameters.parameter[1].name, "error");
    assert!(
        parameters.parameter[1]
            .value_str()
            .unwrap()
            .starts_with("Resource 'http://example.org/fhir/Practitioner/x' unable to be resolved")
    );
    assert_eq!(parameters.parameter[2].name, "result");
    assert_eq!(parameters.parameter[2].part.len(), 1);
}

#[test]
fn remote_input_resource() {
    let fetcher = Arc::new(CountingFetcher::default());
    let request = LabRequest::new("gender").with_resource_reference(REMOTE_PATIENT);
    let response = evaluator_with(fetcher.clone()).evaluate(request);
    let json = to_json(&response);
    assert_eq!(json["parameter"][0]["part"][2]["valueString"], REMOTE_PATIENT);
    assert_eq!(
        json["parameter"][1]["part"],
        json!([{"name": "code", "valueCode": "female"}])
    );

    let request = LabRequest::new("gender")
        .with_resource_reference("http://example.org/fhir/Patient/missing");
    let response = evaluator_with(fetcher).evaluate(request);
    let issue = &response.as_outcome().unwrap().issue[0];
    assert_eq!(issue.code, IssueType::NotFound);
    assert_eq!(
        issue.diagnostics.as_deref(),
        Some("http://example.org/fhir/Patient/missing")
    );
}

#[test]
fn traces_follow_values() {
    let request = LabRequest::new("name.trace('names', given).family").with_resource(patient());
    let response = evaluator().evaluate(request);
    assert_eq!(
        to_json(&response)["parameter"][1]["part"],
        json!([
            {"name": "string", "valueString": "Chalmers"},
            {"name": "trace", "valueString": "names", "part": [
                {"name": "string", "valueString": "Peter"},
                {"name": "string", "valueString": "James"},
                {"name": "string", "valueString": "Jim"}
            ]}
        ])
    );
}

#[test]
fn backbone_elements_render_as_json() {
    let request = LabRequest::new("contact").with_resource(patient());
    let response = evaluator().evaluate(request);
    let part = &to_json(&response)["parameter"][1]["part"][0];
    assert_eq!(part["name"], "BackboneElement");
    assert_eq!(part["extension"][0]["url"], JSON_VALUE_EXTENSION);
}

#[test]
fn validate_reports_return_type_and_tree() {
    let request = LabRequest::new("name.given.count()")
        .with_resource(patient())
        .with_validation(true);
    let response = evaluator().evaluate(request);
    let configuration = &response.as_parameters().unwrap().parameter[0];
    assert_eq!(configuration.part[1].name, "expectedReturnType");
    assert_eq!(configuration.part[1].value_str(), Some("integer"));
    let tree: Value =
        serde_json::from_str(configuration.part[2].value_str().unwrap()).unwrap();
    assert_eq!(tree["ExpressionType"], "FunctionCallExpression");
    assert_eq!(tree["Name"], "count");
}

#[test]
fn validate_keeps_return_type_when_execution_fails() {
    let request = LabRequest::new("name.given").with_validation(true);
    let evaluator = evaluator();
    let configuration = evaluator.configuration(&request).unwrap();
    assert!(
        configuration
            .part
            .iter()
            .any(|p| p.name == "expectedReturnType")
    );
    assert!(evaluator.evaluate(request).as_outcome().is_some());
}

#[test]
fn terminology_expand() {
    let request = LabRequest::new(
        "%terminologies.expand('http://hl7.org/fhir/ValueSet/administrative-gender').expansion.contains.count()",
    );
    let response = evaluator().evaluate(request);
    assert_eq!(
        to_json(&response)["parameter"][1]["part"],
        json!([{"name": "integer", "valueInteger": 2}])
    );
}

#[test]
fn r5_evaluator_label() {
    let evaluator = ExpressionEvaluator::new(FhirVersion::R5, LabConfig::default())
        .with_fetcher(Arc::new(CountingFetcher::default()));
    let response = evaluator.evaluate(LabRequest::new("true"));
    let label = to_json(&response)["parameter"][0]["part"][0]["valueString"].clone();
    assert!(label.as_str().unwrap().ends_with("(R5)"));
}

#[test]
fn integer_negation_overflow_is_empty() {
    let response = evaluator().evaluate(LabRequest::new("-(-9223372036854775807 - 1)"));
    assert_eq!(to_json(&response)["parameter"][1], json!({"name": "result"}));
}

#[test]
fn deeply_nested_expression_is_invalid() {
    let expression = format!("{}1{}", "(".repeat(20_000), ")".repeat(20_000));
    let response = evaluator().evaluate(LabRequest::new(expression.clone()));
    let outcome = response.as_outcome().unwrap();
    assert_eq!(outcome.issue.len(), 1);
    assert_eq!(outcome.issue[0].code, IssueType::Exception);
    assert!(
        outcome.issue[0]
            .text()
            .unwrap()
            .starts_with("Invalid expression: Expression nested too deeply")
    );
    assert_eq!(outcome.issue[0].diagnostics.as_deref(), Some(expression.as_str()));
}

fn coding_variable() -> ParametersParameter {
    ParametersParameter::named("c").with_value(TypedValue::new(
        "Coding",
        json!({"system": "http://hl7.org/fhir/administrative-gender", "code": "male"}),
    ))
}

#[rstest]
#[case("'male'.lookup('system=http://s')", "%terminologies.lookup('male', 'system=http://s')")]
#[case("gender.lookup('system=http://s')", "%terminologies.lookup(gender, 'system=http://s')")]
#[case("%c.lookup()", "%terminologies.lookup(%c)")]
fn lookup_forms_send_the_same_request(#[case] method: &str, #[case] handle: &str) {
    let terminology = Arc::new(RecordingTerminology::default());
    let evaluator = ExpressionEvaluator::new(FhirVersion::R4B, LabConfig::default())
        .with_fetcher(Arc::new(CountingFetcher::default()))
        .with_terminology_service(terminology.clone());
    for expression in [method, handle] {
        let request = LabRequest::new(expression)
            .with_resource(patient())
            .with_variable(coding_variable());
        assert!(evaluator.evaluate(request).as_parameters().is_some());
    }

    let lookups = terminology.lookups.lock().unwrap();
    assert_eq!(lookups.len(), 2);
    assert_eq!(lookups[0], lookups[1]);
    let parameter = lookups[0]["parameter"].as_array().unwrap();
    let coded = parameter.last().unwrap();
    if method.starts_with("%c") {
        assert_eq!(coded["name"], "coding");
        assert_eq!(coded["valueCoding"]["code"], "male");
    } else {
        assert_eq!(coded, &json!({"name": "code", "valueCode": "male"}));
        assert_eq!(parameter[0], json!({"name": "system", "valueUri": "http://s"}));
    }
}

#[test]
fn traces_are_kept_per_context() {
    let request = LabRequest::new("trace('t', given).family")
        .with_resource(patient())
        .with_context("name");
    let response = evaluator().evaluate(request);
    let traces = |index: usize| -> Vec<Value> {
        to_json(&response)["parameter"][index]["part"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|part| part["name"] == "trace")
            .cloned()
            .collect()
    };
    assert_eq!(
        traces(1),
        vec![json!({"name": "trace", "valueString": "t", "part": [
            {"name": "string", "valueString": "Peter"},
            {"name": "string", "valueString": "James"}
        ]})]
    );
    assert_eq!(
        traces(2),
        vec![json!({"name": "trace", "valueString": "t", "part": [
            {"name": "string", "valueString": "Jim"}
        ]})]
    );
}
