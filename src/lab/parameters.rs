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

//! FHIR `Parameters` and `OperationOutcome` resources
//!
//! Only the elements the lab reads and writes are modelled. Parameter
//! values are polymorphic (`valueString`, `valueHumanName`, ...) so
//! [`ParametersParameter`] serializes its `value[x]` key by hand.

use crate::model::is_primitive_type;
use crate::model::node::choice_suffix;
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Extension carrying raw JSON for values that have no FHIR type
pub const JSON_VALUE_EXTENSION: &str = "http://fhir.forms-lab.com/StructureDefinition/json-value";

/// A `value[x]`: FHIR type name plus its JSON form
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    /// FHIR type (`string`, `HumanName`, ...)
    pub type_name: String,
    /// JSON representation
    pub json: Value,
}

impl TypedValue {
    /// Value of a FHIR type
    pub fn new(type_name: impl Into<String>, json: Value) -> Self {
        Self {
            type_name: type_name.into(),
            json,
        }
    }

    /// `valueString`
    pub fn string(value: impl Into<String>) -> Self {
        Self::new("string", Value::String(value.into()))
    }

    /// JSON key for this value (`valueString`)
    pub fn key(&self) -> String {
        format!("value{}", choice_suffix(&self.type_name))
    }

    /// Text of a string-like primitive
    pub fn as_str(&self) -> Option<&str> {
        self.json.as_str()
    }

    /// Parse a `value[x]` key back into a FHIR type name
    pub fn type_from_key(key: &str) -> Option<String> {
        let suffix = key.strip_prefix("value")?;
        let mut chars = suffix.chars();
        let first = chars.next()?;
        if !first.is_ascii_uppercase() {
            return None;
        }
        let lowered = first.to_ascii_lowercase().to_string() + chars.as_str();
        if is_primitive_type(&lowered) {
            Some(lowered)
        } else {
            Some(suffix.to_string())
        }
    }
}

/// Simple extension with a `value[x]`
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    /// Extension URL
    pub url: String,
    /// Extension value
    pub value: Option<TypedValue>,
}

impl Serialize for Extension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("url", &self.url)?;
        if let Some(value) = &self.value {
            map.serialize_entry(&value.key(), &value.json)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Extension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let object = Map::deserialize(deserializer)?;
        let url = object
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::missing_field("url"))?
            .to_string();
        Ok(Self {
            url,
            value: value_of(&object),
        })
    }
}

fn value_of(object: &Map<String, Value>) -> Option<TypedValue> {
    object.iter().find_map(|(key, json)| {
        TypedValue::type_from_key(key).map(|type_name| TypedValue::new(type_name, json.clone()))
    })
}

/// One entry of `Parameters.parameter`, or a nested `part`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParametersParameter {
    /// Parameter name
    pub name: String,
    /// Extensions
    pub extension: Vec<Extension>,
    /// `value[x]`
    pub value: Option<TypedValue>,
    /// Embedded resource
    pub resource: Option<Value>,
    /// Nested parts
    pub part: Vec<ParametersParameter>,
}

impl ParametersParameter {
    /// Parameter with only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parameter carrying a `valueString`
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::named(name).with_value(TypedValue::string(value))
    }

    /// Parameter carrying a resource
    pub fn resource(name: impl Into<String>, resource: Value) -> Self {
        Self {
            resource: Some(resource),
            ..Self::named(name)
        }
    }

    /// Set the value
    pub fn with_value(mut self, value: TypedValue) -> Self {
        self.value = Some(value);
        self
    }

    /// Add a `valueString` extension
    pub fn with_string_extension(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.extension.push(Extension {
            url: url.into(),
            value: Some(TypedValue::string(text)),
        });
        self
    }

    /// Append a part
    pub fn push_part(&mut self, part: ParametersParameter) {
        self.part.push(part);
    }

    /// String value of the first extension with `url`
    pub fn string_extension(&self, url: &str) -> Option<&str> {
        self.extension
            .iter()
            .find(|ext| ext.url == url)
            .and_then(|ext| ext.value.as_ref())
            .and_then(TypedValue::as_str)
    }

    /// Text of a string-like value
    pub fn value_str(&self) -> Option<&str> {
        self.value.as_ref().and_then(TypedValue::as_str)
    }
}

impl Serialize for ParametersParameter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &self.name)?;
        if !self.extension.is_empty() {
            map.serialize_entry("extension", &self.extension)?;
        }
        if let Some(value) = &self.value {
            map.serialize_entry(&value.key(), &value.json)?;
        }
        if let Some(resource) = &self.resource {
            map.serialize_entry("resource", resource)?;
        }
        if !self.part.is_empty() {
            map.serialize_entry("part", &self.part)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParametersParameter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut object = Map::deserialize(deserializer)?;
        let name = object
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::missing_field("name"))?
            .to_string();
        let extension = match object.remove("extension") {
            Some(json) => serde_json::from_value(json).map_err(D::Error::custom)?,
            None => Vec::new(),
        };
        let part = match object.remove("part") {
            Some(json) => serde_json::from_value(json).map_err(D::Error::custom)?,
            None => Vec::new(),
        };
        Ok(Self {
            name,
            extension,
            value: value_of(&object),
            resource: object.remove("resource"),
            part,
        })
    }
}

/// FHIR `Parameters` resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    /// Always `Parameters`
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    /// Resource id
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    /// Parameters in order
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parameter: Vec<ParametersParameter>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            resource_type: "Parameters".to_string(),
            id: None,
            parameter: Vec::new(),
        }
    }
}

impl Parameters {
    /// Empty resource
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Append a parameter
    pub fn push(&mut self, parameter: ParametersParameter) {
        self.parameter.push(parameter);
    }

    /// First parameter named `name`
    pub fn get(&self, name: &str) -> Option<&ParametersParameter> {
        self.parameter.iter().find(|p| p.name == name)
    }

    /// String value of the first parameter named `name`
    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParametersParameter::value_str)
    }

    /// Boolean value, accepting `valueBoolean` or a `"true"`/`"false"` string
    pub fn boolean(&self, name: &str) -> Option<bool> {
        let value = self.get(name)?.value.as_ref()?;
        match &value.json {
            Value::Bool(flag) => Some(*flag),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// JSON form
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Fatal
    Fatal,
    /// Error
    Error,
    /// Warning
    Warning,
    /// Information
    Information,
}

/// Issue type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    /// Content is invalid
    Invalid,
    /// Referenced content could not be found
    NotFound,
    /// A value is missing or wrong
    Value,
    /// Unexpected internal error
    Exception,
    /// Processing issue
    Processing,
    /// Not supported
    NotSupported,
}

/// `CodeableConcept` with only text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDetails {
    /// Text
    pub text: String,
}

/// `OperationOutcome.issue`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcomeIssue {
    /// Severity
    pub severity: IssueSeverity,
    /// Issue type
    pub code: IssueType,
    /// Human-readable details
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<IssueDetails>,
    /// Diagnostic text
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub diagnostics: Option<String>,
}

impl OperationOutcomeIssue {
    /// Issue with details text
    pub fn new(severity: IssueSeverity, code: IssueType, text: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            details: Some(IssueDetails { text: text.into() }),
            diagnostics: None,
        }
    }

    /// Error issue with details text
    pub fn error(code: IssueType, text: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Error, code, text)
    }

    /// Set the diagnostics
    pub fn with_diagnostics(mut self, diagnostics: impl Into<String>) -> Self {
        self.diagnostics = Some(diagnostics.into());
        self
    }

    /// Details text, if any
    pub fn text(&self) -> Option<&str> {
        self.details.as_ref().map(|d| d.text.as_str())
    }
}

/// FHIR `OperationOutcome` resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Always `OperationOutcome`
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    /// Issues
    #[serde(default)]
    pub issue: Vec<OperationOutcomeIssue>,
}

impl Default for OperationOutcome {
    fn default() -> Self {
        Self {
            resource_type: "OperationOutcome".to_string(),
            issue: Vec::new(),
        }
    }
}

impl OperationOutcome {
    /// Outcome with no issues
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome with a single issue
    pub fn from_issue(issue: OperationOutcomeIssue) -> Self {
        Self {
            issue: vec![issue],
            ..Self::default()
        }
    }

    /// JSON form
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("valueString", Some("string"))]
    #[case("valueDateTime", Some("dateTime"))]
    #[case("valueHumanName", Some("HumanName"))]
    #[case("valueBase64Binary", Some("base64Binary"))]
    #[case("value", None)]
    #[case("values", None)]
    #[case("name", None)]
    fn test_type_from_key(#[case] key: &str, #[case] expected: Option<&str>) {
        assert_eq!(TypedValue::type_from_key(key).as_deref(), expected);
    }

    #[test]
    fn test_parameter_value_keys() {
        let json = json!({
            "resourceType": "Parameters",
            "parameter": [
                {"name": "expression", "valueString": "name.given"},
                {"name": "validate", "valueBoolean": true},
                {"name": "variables", "part": [
                    {"name": "v1", "valueHumanName": {"family": "Smith"}},
                    {"name": "v2", "extension": [{
                        "url": JSON_VALUE_EXTENSION,
                        "valueString": "[1,2]"
                    }]}
                ]}
            ]
        });
        let parameters: Parameters = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(parameters.string("expression"), Some("name.given"));
        assert_eq!(parameters.boolean("validate"), Some(true));

        let variables = parameters.get("variables").unwrap();
        let v1 = variables.part[0].value.as_ref().unwrap();
        assert_eq!(v1.type_name, "HumanName");
        assert_eq!(
            variables.part[1].string_extension(JSON_VALUE_EXTENSION),
            Some("[1,2]")
        );

        assert_eq!(parameters.to_value(), json);
    }

    #[test]
    fn test_outcome_codes() {
        let outcome = OperationOutcome::from_issue(
            OperationOutcomeIssue::error(IssueType::NotFound, "Unable to retrieve resource x")
                .with_diagnostics("x"),
        );
        assert_eq!(
            outcome.to_value(),
            json!({
                "resourceType": "OperationOutcome",
                "issue": [{
                    "severity": "error",
                    "code": "not-found",
                    "details": {"text": "Unable to retrieve resource x"},
                    "diagnostics": "x"
                }]
            })
        );
    }
}
