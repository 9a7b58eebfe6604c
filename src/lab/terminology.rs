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

//! Terminology operations behind `%terminologies`
//!
//! [`TerminologyClient`] turns FHIRPath arguments into `Parameters` for
//! `ValueSet/$expand` and `CodeSystem/$lookup` and hands them to a
//! [`TerminologyService`]. Options arrive as form-encoded strings such as
//! `filter=male&date=2020-01-01`.

use super::canonical::CanonicalUrl;
use super::parameters::{Parameters, ParametersParameter, TypedValue};
use crate::error::{FhirPathError, Result};
use crate::evaluator::TerminologyLookup;
use crate::model::FhirPathValue;
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::time::Duration;

const FHIR_JSON: &str = "application/fhir+json";

/// Remote terminology server operations
pub trait TerminologyService {
    /// `ValueSet/$expand`, returning the expanded ValueSet
    fn expand(&self, server: &str, parameters: &Parameters) -> Result<Value>;

    /// `CodeSystem/$lookup`, returning the result Parameters
    fn lookup(&self, server: &str, parameters: &Parameters) -> Result<Value>;
}

/// [`TerminologyService`] over blocking HTTP, client built on first use
#[derive(Debug)]
pub struct HttpTerminologyService {
    timeout: Duration,
    client: OnceCell<Client>,
}

impl HttpTerminologyService {
    /// Service with a request timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client: OnceCell::new(),
        }
    }

    fn post(&self, operation: &str, url: String, parameters: &Parameters) -> Result<Value> {
        let terminology_error = |err: reqwest::Error| FhirPathError::TerminologyError {
            operation: operation.to_string(),
            message: err.to_string(),
        };
        log::debug!("POST {url}");
        self.client
            .get_or_try_init(|| Client::builder().timeout(self.timeout).build())
            .map_err(terminology_error)?
            .post(&url)
            .header(CONTENT_TYPE, FHIR_JSON)
            .header(ACCEPT, FHIR_JSON)
            .json(parameters)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.json::<Value>())
            .map_err(terminology_error)
    }
}

impl TerminologyService for HttpTerminologyService {
    fn expand(&self, server: &str, parameters: &Parameters) -> Result<Value> {
        let url = format!("{}/ValueSet/$expand", server.trim_end_matches('/'));
        self.post("$expand", url, parameters)
    }

    fn lookup(&self, server: &str, parameters: &Parameters) -> Result<Value> {
        let url = format!("{}/CodeSystem/$lookup", server.trim_end_matches('/'));
        self.post("$lookup", url, parameters)
    }
}

fn parse_options(options: Option<&str>) -> Vec<(String, String)> {
    options
        .map(|text| {
            url::form_urlencoded::parse(text.trim_start_matches('?').as_bytes())
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

fn first_option<'o>(options: &'o [(String, String)], key: &str) -> Option<&'o str> {
    options
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.as_str())
}

fn typed(name: &str, type_name: &str, value: &str) -> ParametersParameter {
    ParametersParameter::named(name).with_value(TypedValue::new(
        type_name,
        Value::String(value.to_string()),
    ))
}

/// Build the `$expand` input for a canonical and options
pub fn expand_parameters(canonical: &str, options: Option<&str>) -> Parameters {
    let canonical = CanonicalUrl::parse(canonical);
    let options = parse_options(options);
    let mut parameters = Parameters::new();
    parameters.push(typed("url", "uri", canonical.url()));
    if let Some(version) = canonical.version() {
        parameters.push(typed("valueSetVersion", "string", version));
    }
    if let Some(filter) = first_option(&options, "filter") {
        parameters.push(typed("filter", "string", filter));
    }
    if let Some(date) = first_option(&options, "date") {
        parameters.push(typed("date", "dateTime", date));
    }
    parameters
}

/// Build the `$lookup` input for a code or coding; `None` when `coded`
/// is neither
pub fn lookup_parameters(coded: &FhirPathValue, options: Option<&str>) -> Option<Parameters> {
    let options = parse_options(options);
    let mut parameters = Parameters::new();
    if let Some(system) = first_option(&options, "system") {
        parameters.push(typed("system", "uri", system));
    }
    if let Some(version) = first_option(&options, "version") {
        parameters.push(typed("version", "string", version));
    }
    if let Some(date) = first_option(&options, "date") {
        parameters.push(typed("date", "dateTime", date));
    }
    if let Some(language) = first_option(&options, "displayLanguage") {
        parameters.push(typed("displayLanguage", "code", language));
    }
    for (_, property) in options.iter().filter(|(name, _)| name == "property") {
        parameters.push(typed("property", "code", property));
    }

    let coding = coded
        .as_element()
        .filter(|node| matches!(node.type_name(), None | Some("Coding")))
        .map(|node| node.json())
        .filter(|json| json.get("code").is_some());
    match coding {
        Some(json) => parameters.push(
            ParametersParameter::named("coding").with_value(TypedValue::new("Coding", json.clone())),
        ),
        None => {
            let code = coded.as_string()?;
            parameters.push(typed("code", "code", &code));
        }
    }
    Some(parameters)
}

/// Terminology client bound to one server for one request
pub struct TerminologyClient<'s> {
    server: String,
    service: &'s dyn TerminologyService,
}

impl<'s> TerminologyClient<'s> {
    /// Client for `server`
    pub fn new(server: impl Into<String>, service: &'s dyn TerminologyService) -> Self {
        Self {
            server: server.into(),
            service,
        }
    }
}

impl TerminologyLookup for TerminologyClient<'_> {
    fn server(&self) -> &str {
        &self.server
    }

    fn expand(&self, canonical: &str, options: Option<&str>) -> Result<Option<Value>> {
        let parameters = expand_parameters(canonical, options);
        log::debug!("expanding {canonical} on {}", self.server);
        self.service.expand(&self.server, &parameters).map(Some)
    }

    fn lookup(&self, coded: &FhirPathValue, options: Option<&str>) -> Result<Option<Value>> {
        let Some(parameters) = lookup_parameters(coded, options) else {
            return Ok(None);
        };
        self.service.lookup(&self.server, &parameters).map(Some)
    }
}

impl std::fmt::Debug for TerminologyClient<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminologyClient")
            .field("server", &self.server)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ElementNode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_expand_parameters() {
        let parameters = expand_parameters(
            "http://hl7.org/fhir/ValueSet/administrative-gender|4.0.1",
            Some("filter=fe&date=2020-01-01"),
        );
        assert_eq!(
            parameters.to_value(),
            json!({
                "resourceType": "Parameters",
                "parameter": [
                    {"name": "url", "valueUri": "http://hl7.org/fhir/ValueSet/administrative-gender"},
                    {"name": "valueSetVersion", "valueString": "4.0.1"},
                    {"name": "filter", "valueString": "fe"},
                    {"name": "date", "valueDateTime": "2020-01-01"}
                ]
            })
        );
    }

    #[test]
    fn test_lookup_parameters_for_coding() {
        let coding = FhirPathValue::Element(ElementNode::typed(
            json!({"system": "http://loinc.org", "code": "1963-8"}),
            "coding",
            "Coding",
        ));
        let parameters =
            lookup_parameters(&coding, Some("displayLanguage=de&property=a&property=b")).unwrap();
        let names: Vec<_> = parameters.parameter.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["displayLanguage", "property", "property", "coding"]);
        assert_eq!(
            parameters.get("coding").unwrap().value.as_ref().unwrap().type_name,
            "Coding"
        );
    }

    #[test]
    fn test_lookup_parameters_for_code() {
        let code = FhirPathValue::String("male".to_string());
        let parameters = lookup_parameters(
            &code,
            Some("system=http://hl7.org/fhir/administrative-gender"),
        )
        .unwrap();
        assert_eq!(parameters.string("code"), Some("male"));
        assert_eq!(
            parameters.string("system"),
            Some("http://hl7.org/fhir/administrative-gender")
        );
    }

    #[test]
    fn test_lookup_without_code() {
        let node = FhirPathValue::Element(ElementNode::typed(json!({"text": "x"}), "c", "CodeableConcept"));
        assert!(lookup_parameters(&node, None).is_none());
    }

    #[test]
    fn test_lookup_ignores_non_coding_elements() {
        let observation = FhirPathValue::Element(ElementNode::typed(
            json!({"resourceType": "Observation", "code": {"text": "x"}}),
            "Observation",
            "Observation",
        ));
        assert!(lookup_parameters(&observation, None).is_none());

        let fragment = FhirPathValue::Element(ElementNode::fragment(json!({"code": "male"})));
        let parameters = lookup_parameters(&fragment, None).unwrap();
        assert_eq!(
            parameters.get("coding").unwrap().value.as_ref().unwrap().type_name,
            "Coding"
        );
    }
}
