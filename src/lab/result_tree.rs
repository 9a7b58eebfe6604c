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

//! Shaping evaluation output into `Parameters` parts
//!
//! Every output value is first classified into an [`OutputValue`] and then
//! shaped by the function for its variant. Trace entries follow the values
//! of a result, one `trace` part per entry.

use super::parameters::{JSON_VALUE_EXTENSION, ParametersParameter, TypedValue};
use crate::error::Result;
use crate::evaluator::TraceEntry;
use crate::model::{FhirPathValue, ModelProvider, NodeOrigin, is_primitive_type};
use serde_json::Value;

/// An output value, classified by how it is rendered
#[derive(Debug, Clone, PartialEq)]
pub enum OutputValue {
    /// Value of a FHIR type, rendered as `value[x]`
    Typed(TypedValue),
    /// Complete resource
    Resource(Value),
    /// Element without a `value[x]` form (backbone elements, handles)
    Untyped {
        /// Type name used as the part name
        type_name: String,
        /// JSON content
        json: Value,
    },
    /// Value with no type information at all
    Absent {
        /// Raw JSON the value came from, if any
        source: Option<Value>,
    },
}

impl OutputValue {
    /// Classify an evaluation result
    pub fn classify(value: &FhirPathValue, model: &dyn ModelProvider) -> Self {
        let node = match value {
            FhirPathValue::Element(node) => node,
            FhirPathValue::Terminologies(_) => {
                return Self::Untyped {
                    type_name: "Terminologies".to_string(),
                    json: value.to_json(),
                };
            }
            system => {
                return Self::Typed(TypedValue::new(system.type_name(), system.to_json()));
            }
        };

        let json = node.json();
        let scalar = || {
            node.to_system_value()
                .map(|system| Self::Typed(TypedValue::new(system.type_name(), system.to_json())))
        };
        if node.origin() == NodeOrigin::Fragment {
            return scalar().unwrap_or_else(|| Self::Absent {
                source: Some(json.clone()),
            });
        }
        if node.is_resource() {
            return Self::Resource(json.clone());
        }
        match node.type_name() {
            Some(type_name) if is_primitive_type(type_name) => {
                Self::Typed(TypedValue::new(type_name, json.clone()))
            }
            Some(type_name) if model.display_type_name(type_name) == "BackboneElement" => {
                Self::Untyped {
                    type_name: "BackboneElement".to_string(),
                    json: json.clone(),
                }
            }
            Some(type_name) => Self::Typed(TypedValue::new(type_name, json.clone())),
            None => scalar().unwrap_or_else(|| Self::Absent {
                source: Some(json.clone()),
            }),
        }
    }

    /// Shape into a part
    pub fn into_part(self) -> Result<ParametersParameter> {
        match self {
            Self::Typed(value) => Ok(typed_part(value)),
            Self::Resource(json) => Ok(resource_part(json)),
            Self::Untyped { type_name, json } => untyped_part(type_name, &json),
            Self::Absent { source } => absent_part(source.as_ref()),
        }
    }
}

fn typed_part(value: TypedValue) -> ParametersParameter {
    if value.json.as_str() == Some("") {
        return ParametersParameter::named("empty-string");
    }
    ParametersParameter::named(value.type_name.clone()).with_value(value)
}

fn resource_part(json: Value) -> ParametersParameter {
    let name = json
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or("Resource")
        .to_string();
    ParametersParameter::resource(name, json)
}

fn untyped_part(type_name: String, json: &Value) -> Result<ParametersParameter> {
    let text = serde_json::to_string_pretty(json)?;
    Ok(ParametersParameter::named(type_name).with_string_extension(JSON_VALUE_EXTENSION, text))
}

fn absent_part(source: Option<&Value>) -> Result<ParametersParameter> {
    match source {
        Some(json) => untyped_part("Object".to_string(), json),
        None => Ok(ParametersParameter::named("(null)")),
    }
}

/// Part for one trace entry
pub fn trace_part(entry: &TraceEntry, model: &dyn ModelProvider) -> Result<ParametersParameter> {
    let mut part = ParametersParameter::string("trace", entry.name.clone());
    for value in entry.values.iter() {
        part.push_part(OutputValue::classify(value, model).into_part()?);
    }
    Ok(part)
}

/// `result` part for one context: values first, then traces
pub fn result_part(
    key: &str,
    values: &[FhirPathValue],
    traces: &[TraceEntry],
    model: &dyn ModelProvider,
) -> Result<ParametersParameter> {
    let mut part = if key.is_empty() {
        ParametersParameter::named("result")
    } else {
        ParametersParameter::string("result", key)
    };
    for value in values {
        part.push_part(OutputValue::classify(value, model).into_part()?);
    }
    for entry in traces {
        part.push_part(trace_part(entry, model)?);
    }
    Ok(part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FhirVersion;
    use crate::model::{BuiltinModelProvider, Collection, ElementNode};
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn model() -> BuiltinModelProvider {
        BuiltinModelProvider::new(FhirVersion::R4B)
    }

    fn shape(value: FhirPathValue) -> Value {
        let part = OutputValue::classify(&value, &model()).into_part().unwrap();
        serde_json::to_value(part).unwrap()
    }

    #[test]
    fn test_system_values() {
        assert_eq!(
            shape(FhirPathValue::Integer(2)),
            json!({"name": "integer", "valueInteger": 2})
        );
        assert_eq!(
            shape(FhirPathValue::Decimal(Decimal::new(15, 1))),
            json!({"name": "decimal", "valueDecimal": 1.5})
        );
        assert_eq!(
            shape(FhirPathValue::DateTime("2024-01-01T10:00:00Z".into())),
            json!({"name": "dateTime", "valueDateTime": "2024-01-01T10:00:00Z"})
        );
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(
            shape(FhirPathValue::String(String::new())),
            json!({"name": "empty-string"})
        );
    }

    #[test]
    fn test_elements() {
        let name = ElementNode::typed(json!({"family": "Smith"}), "name", "HumanName");
        assert_eq!(
            shape(FhirPathValue::Element(name)),
            json!({"name": "HumanName", "valueHumanName": {"family": "Smith"}})
        );

        let code = ElementNode::typed(json!("male"), "gender", "code");
        assert_eq!(
            shape(FhirPathValue::Element(code)),
            json!({"name": "code", "valueCode": "male"})
        );

        let patient = ElementNode::resource(json!({"resourceType": "Patient", "id": "x"}));
        assert_eq!(
            shape(FhirPathValue::Element(patient)),
            json!({"name": "Patient", "resource": {"resourceType": "Patient", "id": "x"}})
        );
    }

    #[test]
    fn test_backbone_and_fragments() {
        let contact = ElementNode::typed(json!({"gender": "female"}), "contact", "Patient.contact");
        let part = shape(FhirPathValue::Element(contact));
        assert_eq!(part["name"], "BackboneElement");
        assert_eq!(part["extension"][0]["url"], JSON_VALUE_EXTENSION);

        let fragment = ElementNode::fragment(json!({"a": 1}));
        let part = shape(FhirPathValue::Element(fragment));
        assert_eq!(part["name"], "Object");
        assert_eq!(
            part["extension"][0]["valueString"],
            serde_json::to_string_pretty(&json!({"a": 1})).unwrap()
        );

        assert_eq!(
            serde_json::to_value(absent_part(None).unwrap()).unwrap(),
            json!({"name": "(null)"})
        );
    }

    #[test]
    fn test_result_part_with_traces() {
        let traces = vec![TraceEntry {
            name: "n".to_string(),
            values: Collection::from_vec(vec![FhirPathValue::String("a".into())]),
        }];
        let part = result_part(
            "Patient.name[0]",
            &[FhirPathValue::Boolean(true)],
            &traces,
            &model(),
        )
        .unwrap();
        assert_eq!(
            serde_json::to_value(part).unwrap(),
            json!({
                "name": "result",
                "valueString": "Patient.name[0]",
                "part": [
                    {"name": "boolean", "valueBoolean": true},
                    {"name": "trace", "valueString": "n", "part": [
                        {"name": "string", "valueString": "a"}
                    ]}
                ]
            })
        );
    }
}
