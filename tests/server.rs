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

//! HTTP surface of the lab server

#![cfg(feature = "server")]

use axum::http::StatusCode;
use axum_test::TestServer;
use octofhir_fhirpath_lab::LabConfig;
use octofhir_fhirpath_lab::server::{AppState, router};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn server() -> TestServer {
    let config = LabConfig::builder().evaluator_name("lab-test").build();
    TestServer::new(router(AppState::new(config))).unwrap()
}

#[tokio::test]
async fn metadata_lists_operations() {
    let response = server().get("/metadata").await;
    response.assert_status_ok();
    let statement: Value = response.json();
    assert_eq!(statement["resourceType"], "CapabilityStatement");
    assert_eq!(statement["rest"][0]["security"]["cors"], true);
    let operations: Vec<_> = statement["rest"][0]["operation"]
        .as_array()
        .unwrap()
        .iter()
        .map(|op| op["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(operations, vec!["fhirpath", "fhirpath-r5"]);
}

#[tokio::test]
async fn post_parameters() {
    let body = json!({
        "resourceType": "Parameters",
        "parameter": [
            {"name": "expression", "valueString": "name.given.first()"},
            {"name": "resource", "resource": {
                "resourceType": "Patient",
                "name": [{"given": ["Ann", "Jo"]}]
            }}
        ]
    });
    let response = server().post("/$fhirpath").json(&body).await;
    response.assert_status_ok();
    let parameters: Value = response.json();
    assert_eq!(parameters["resourceType"], "Parameters");
    assert_eq!(
        parameters["parameter"][0]["part"][0]["valueString"],
        "lab-test (R4B)"
    );
    assert_eq!(
        parameters["parameter"][1]["part"],
        json!([{"name": "string", "valueString": "Ann"}])
    );
}

#[tokio::test]
async fn get_query_uses_r5() {
    let response = server()
        .get("/$fhirpath-r5")
        .add_query_param("expression", "2 * 3")
        .await;
    response.assert_status_ok();
    let parameters: Value = response.json();
    assert_eq!(
        parameters["parameter"][0]["part"][0]["valueString"],
        "lab-test (R5)"
    );
    assert_eq!(
        parameters["parameter"][1]["part"],
        json!([{"name": "integer", "valueInteger": 6}])
    );
}

#[tokio::test]
async fn failures_answer_with_outcome() {
    let response = server()
        .get("/$fhirpath")
        .add_query_param("expression", "name.where(")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let outcome: Value = response.json();
    assert_eq!(outcome["resourceType"], "OperationOutcome");
    assert_eq!(outcome["issue"][0]["code"], "exception");
    assert_eq!(outcome["issue"][0]["diagnostics"], "name.where(");

    let response = server().get("/$fhirpath").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let outcome: Value = response.json();
    assert_eq!(outcome["issue"][0]["code"], "invalid");
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let response = server().post("/$fhirpath").text("{not json").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let outcome: Value = response.json();
    assert_eq!(outcome["resourceType"], "OperationOutcome");
    assert_eq!(outcome["issue"][0]["severity"], "error");
}
