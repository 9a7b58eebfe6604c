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

//! Binding caller-supplied variables into the symbol table

use super::parameters::{JSON_VALUE_EXTENSION, ParametersParameter};
use crate::error::{FhirPathError, Result};
use crate::evaluator::SymbolTable;
use crate::model::{Collection, ElementNode, FhirPathValue, ModelProvider};
use serde_json::{Value, json};

/// Materializes the `variables` parameter parts
pub struct VariableBinder<'m> {
    model: &'m dyn ModelProvider,
}

impl<'m> VariableBinder<'m> {
    /// Binder using `model` to type fragment children
    pub fn new(model: &'m dyn ModelProvider) -> Self {
        Self { model }
    }

    /// Declare every part of `variables` in `symbols`
    pub fn bind(&self, symbols: &mut SymbolTable, variables: &ParametersParameter) -> Result<()> {
        for part in &variables.part {
            let value = self.materialize(part)?;
            log::debug!("binding %{} ({} items)", part.name, value.len());
            symbols.declare(part.name.clone(), value);
        }
        Ok(())
    }

    /// Value of one variable part
    pub fn materialize(&self, part: &ParametersParameter) -> Result<Collection> {
        if let Some(fragment) = part.string_extension(JSON_VALUE_EXTENSION)
            && !fragment.is_empty()
        {
            return self.fragment(&part.name, fragment);
        }
        if let Some(value) = &part.value {
            let node = ElementNode::typed(value.json.clone(), &part.name, &value.type_name);
            return Ok(Collection::single(FhirPathValue::Element(node)));
        }
        if let Some(resource) = &part.resource {
            let node = ElementNode::resource(resource.clone());
            return Ok(Collection::single(FhirPathValue::Element(node)));
        }
        Ok(Collection::new())
    }

    fn fragment(&self, name: &str, fragment: &str) -> Result<Collection> {
        let trimmed = fragment.trim();
        let parsed: Value =
            serde_json::from_str(trimmed).map_err(|err| FhirPathError::InvalidJson {
                message: format!("variable '{name}': {err}"),
            })?;
        if trimmed.starts_with('[') || !trimmed.starts_with('{') {
            let wrapper = ElementNode::fragment(json!({ "value": parsed }));
            let items = wrapper
                .child("value", self.model)
                .into_iter()
                .map(FhirPathValue::Element)
                .collect();
            Ok(Collection::from_vec(items))
        } else {
            Ok(Collection::single(FhirPathValue::Element(
                ElementNode::fragment(parsed),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FhirVersion;
    use crate::lab::parameters::TypedValue;
    use crate::model::{BuiltinModelProvider, NodeOrigin};
    use crate::registry::FunctionRegistry;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn fragment_part(name: &str, text: &str) -> ParametersParameter {
        ParametersParameter::named(name).with_string_extension(JSON_VALUE_EXTENSION, text)
    }

    fn bind(parts: Vec<ParametersParameter>) -> Result<SymbolTable> {
        let model = BuiltinModelProvider::new(FhirVersion::R4B);
        let mut symbols = SymbolTable::new(Arc::new(FunctionRegistry::lab()));
        let mut variables = ParametersParameter::named("variables");
        variables.part = parts;
        VariableBinder::new(&model).bind(&mut symbols, &variables)?;
        Ok(symbols)
    }

    #[test]
    fn test_array_fragment_flattens() {
        let symbols = bind(vec![fragment_part("nums", "[1,2,3]")]).unwrap();
        let nums = symbols.variable("nums").unwrap();
        assert_eq!(nums.len(), 3);
        let node = nums.iter().next().and_then(FhirPathValue::as_element).unwrap();
        assert_eq!(node.origin(), NodeOrigin::Fragment);
        assert_eq!(node.name(), "value");
        assert_eq!(nums.as_slice()[2].as_integer(), Some(3));
    }

    #[test]
    fn test_object_and_scalar_fragments() {
        let symbols = bind(vec![
            fragment_part("obj", r#" {"a": {"b": true}} "#),
            fragment_part("text", r#""hello""#),
        ])
        .unwrap();
        let obj = symbols.variable("obj").unwrap();
        assert_eq!(obj.len(), 1);
        assert!(obj.as_single().and_then(FhirPathValue::as_element).is_some());
        let text = symbols.variable("text").unwrap();
        assert_eq!(text.as_single().and_then(FhirPathValue::as_string).as_deref(), Some("hello"));
    }

    #[test]
    fn test_typed_resource_and_empty_bindings() {
        let symbols = bind(vec![
            ParametersParameter::named("limit")
                .with_value(TypedValue::new("integer", serde_json::json!(5))),
            ParametersParameter::resource(
                "patient",
                serde_json::json!({"resourceType": "Patient", "id": "x"}),
            ),
            ParametersParameter::named("nothing"),
        ])
        .unwrap();
        assert_eq!(
            symbols.variable("limit").unwrap().as_single().and_then(FhirPathValue::as_integer),
            Some(5)
        );
        let patient = symbols.variable("patient").unwrap();
        assert_eq!(
            patient.as_single().and_then(FhirPathValue::as_element).and_then(ElementNode::resource_type),
            Some("Patient")
        );
        assert!(symbols.is_declared("nothing"));
        assert!(symbols.variable("nothing").unwrap().is_empty());
    }

    #[test]
    fn test_bad_fragment_is_an_error() {
        let err = bind(vec![fragment_part("bad", "{not json")]).unwrap_err();
        assert!(matches!(err, FhirPathError::InvalidJson { .. }));
    }
}
