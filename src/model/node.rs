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

//! JSON-backed document nodes

use super::provider::ModelProvider;
use super::value::FhirPathValue;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

/// Where a node came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOrigin {
    /// A FHIR resource or typed value; children are typed from the model
    Document,
    /// A caller-supplied raw JSON fragment; children stay untyped
    Fragment,
}

/// A node of a FHIR document or raw fragment
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    json: Arc<Value>,
    name: String,
    location: String,
    short_path: String,
    type_name: Option<String>,
    origin: NodeOrigin,
}

impl ElementNode {
    /// Root node of a resource; name, location and type are its `resourceType`
    pub fn resource(json: Value) -> Self {
        let resource_type = json
            .get("resourceType")
            .and_then(Value::as_str)
            .unwrap_or("Resource")
            .to_string();
        Self {
            json: Arc::new(json),
            name: resource_type.clone(),
            location: resource_type.clone(),
            short_path: resource_type.clone(),
            type_name: Some(resource_type),
            origin: NodeOrigin::Document,
        }
    }

    /// Node for a value of a known FHIR type, e.g. a `valueHumanName`
    pub fn typed(json: Value, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            json: Arc::new(json),
            location: name.clone(),
            short_path: name.clone(),
            name,
            type_name: Some(type_name.into()),
            origin: NodeOrigin::Document,
        }
    }

    /// Untyped node over a raw JSON fragment
    pub fn fragment(json: Value) -> Self {
        Self {
            json: Arc::new(json),
            name: String::new(),
            location: String::new(),
            short_path: String::new(),
            type_name: None,
            origin: NodeOrigin::Fragment,
        }
    }

    /// Underlying JSON
    pub fn json(&self) -> &Value {
        &self.json
    }

    /// Element name (`given`, `value`, or the resource type for roots)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location path such as `Patient.name[0].given[1]`
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Location with indexes only on repeating elements (`Patient.birthDate`)
    pub fn short_path(&self) -> &str {
        &self.short_path
    }

    /// Declared FHIR type, if known
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Node origin
    pub fn origin(&self) -> NodeOrigin {
        self.origin
    }

    /// `resourceType` when the node is a resource
    pub fn resource_type(&self) -> Option<&str> {
        self.json.get("resourceType").and_then(Value::as_str)
    }

    /// True when the node is a full resource
    pub fn is_resource(&self) -> bool {
        self.resource_type().is_some()
    }

    /// System value for primitive nodes; `None` for complex nodes
    pub fn to_system_value(&self) -> Option<FhirPathValue> {
        let json = self.json.as_ref();
        if json.is_object() || json.is_array() || json.is_null() {
            return None;
        }
        let text = json.as_str();
        let typed = match (self.type_name.as_deref(), text) {
            (Some("date"), Some(s)) => Some(FhirPathValue::Date(s.to_string())),
            (Some("dateTime" | "instant"), Some(s)) => Some(FhirPathValue::DateTime(s.to_string())),
            (Some("time"), Some(s)) => Some(FhirPathValue::Time(s.to_string())),
            (Some("decimal"), _) => json
                .as_f64()
                .and_then(|_| Decimal::from_str(&json.to_string()).ok())
                .map(FhirPathValue::Decimal),
            _ => None,
        };
        typed.or_else(|| FhirPathValue::from_json_scalar(json))
    }

    /// Entries of this node's object whose key belongs to `name`,
    /// matching `value[x]` style choice keys when there is no exact key
    fn property_keys<'a>(&'a self, name: &str, model: &dyn ModelProvider) -> Vec<&'a str> {
        let Some(object) = self.json.as_object() else {
            return Vec::new();
        };
        if let Some((key, _)) = object.get_key_value(name) {
            return vec![key.as_str()];
        }
        object
            .keys()
            .filter(|key| {
                key.len() > name.len()
                    && key.starts_with(name)
                    && key.as_bytes()[name.len()].is_ascii_uppercase()
                    && (self.type_name.is_none()
                        || self.origin == NodeOrigin::Fragment
                        || self.element_and_type(key, model).name == name)
            })
            .map(String::as_str)
            .collect()
    }

    /// Element name and declared type for a JSON key of this node
    fn element_and_type(&self, key: &str, model: &dyn ModelProvider) -> KeyElement {
        let untyped = KeyElement {
            name: key.to_string(),
            declared: None,
            many: self.json.get(key).is_some_and(Value::is_array),
        };
        if self.origin == NodeOrigin::Fragment {
            return untyped;
        }
        let Some(parent) = self.type_name.as_deref() else {
            return untyped;
        };

        if let Some(info) = model.element_info(parent, key)
            && !info.is_choice
        {
            return KeyElement {
                name: key.to_string(),
                declared: info.types.first().cloned(),
                many: info.is_collection,
            };
        }

        for (i, byte) in key.bytes().enumerate().skip(1) {
            if !byte.is_ascii_uppercase() {
                continue;
            }
            let (element, suffix) = key.split_at(i);
            if let Some(info) = model.element_info(parent, element)
                && info.is_choice
            {
                let declared = info
                    .types
                    .iter()
                    .find(|t| choice_suffix(t) == suffix)
                    .cloned();
                return KeyElement {
                    name: element.to_string(),
                    declared,
                    many: false,
                };
            }
        }

        untyped
    }

    fn make_child(
        &self,
        element: &str,
        item: &Value,
        declared: Option<&str>,
        index: Option<usize>,
    ) -> ElementNode {
        let type_name = match item.get("resourceType").and_then(Value::as_str) {
            Some(resource_type) => Some(resource_type.to_string()),
            None if self.origin == NodeOrigin::Fragment => None,
            None => declared
                .map(str::to_string)
                .or_else(|| guess_primitive_type(item).map(str::to_string)),
        };
        let join = |parent: &str, step: String| {
            if parent.is_empty() {
                step
            } else {
                format!("{parent}.{step}")
            }
        };
        let location = join(
            &self.location,
            format!("{element}[{}]", index.unwrap_or_default()),
        );
        let short_path = match index {
            Some(index) => join(&self.short_path, format!("{element}[{index}]")),
            None => join(&self.short_path, element.to_string()),
        };
        ElementNode {
            json: Arc::new(item.clone()),
            name: element.to_string(),
            location,
            short_path,
            type_name,
            origin: self.origin,
        }
    }

    fn expand_key(
        &self,
        key: &str,
        element_name: Option<&str>,
        model: &dyn ModelProvider,
        out: &mut Vec<ElementNode>,
    ) {
        let Some(value) = self.json.get(key) else {
            return;
        };
        let KeyElement {
            name,
            declared,
            many,
        } = self.element_and_type(key, model);
        let element = element_name.unwrap_or(&name);
        match value {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate().filter(|(_, v)| !v.is_null()) {
                    let index = (many || items.len() > 1).then_some(index);
                    out.push(self.make_child(element, item, declared.as_deref(), index));
                }
            }
            Value::Null => {}
            item => {
                let index = many.then_some(0);
                out.push(self.make_child(element, item, declared.as_deref(), index));
            }
        }
    }

    /// Child nodes for a property name
    pub fn child(&self, name: &str, model: &dyn ModelProvider) -> Vec<ElementNode> {
        let mut out = Vec::new();
        for key in self.property_keys(name, model) {
            self.expand_key(key, Some(name), model, &mut out);
        }
        out
    }

    /// All child nodes, in document order
    pub fn children(&self, model: &dyn ModelProvider) -> Vec<ElementNode> {
        let Some(object) = self.json.as_object() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for key in object.keys() {
            if key == "resourceType" || key.starts_with('_') {
                continue;
            }
            self.expand_key(key, None, model, &mut out);
        }
        out
    }
}

/// Element a JSON key maps to
struct KeyElement {
    name: String,
    declared: Option<String>,
    many: bool,
}

/// Suffix a choice type takes in a JSON key (`string` → `String`)
pub fn choice_suffix(type_name: &str) -> String {
    let mut chars = type_name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn guess_primitive_type(item: &Value) -> Option<&'static str> {
    match item {
        Value::Bool(_) => Some("boolean"),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some("integer"),
        Value::Number(_) => Some("decimal"),
        Value::String(_) => Some("string"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FhirVersion;
    use crate::model::BuiltinModelProvider;
    use serde_json::json;

    fn patient() -> ElementNode {
        ElementNode::resource(json!({
            "resourceType": "Patient",
            "id": "example",
            "name": [
                {"use": "official", "family": "Chalmers", "given": ["Peter", "James"]},
                {"use": "usual", "given": ["Jim"]}
            ],
            "gender": "male",
            "birthDate": "1974-12-25",
            "deceasedBoolean": false
        }))
    }

    #[test]
    fn test_child_navigation_types_and_locations() {
        let model = BuiltinModelProvider::new(FhirVersion::R4B);
        let names = patient().child("name", &model);
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].type_name(), Some("HumanName"));
        assert_eq!(names[1].location(), "Patient.name[1]");

        let given = names[0].child("given", &model);
        assert_eq!(given[1].location(), "Patient.name[0].given[1]");
        assert_eq!(given[1].type_name(), Some("string"));
        assert_eq!(given[1].name(), "given");
        assert_eq!(given[1].short_path(), "Patient.name[0].given[1]");

        let birth = patient().child("birthDate", &model);
        assert_eq!(birth[0].location(), "Patient.birthDate[0]");
        assert_eq!(birth[0].short_path(), "Patient.birthDate");
    }

    #[test]
    fn test_choice_navigation() {
        let model = BuiltinModelProvider::new(FhirVersion::R4B);
        let deceased = patient().child("deceased", &model);
        assert_eq!(deceased.len(), 1);
        assert_eq!(deceased[0].type_name(), Some("boolean"));
        assert_eq!(deceased[0].name(), "deceased");
        assert_eq!(
            deceased[0].to_system_value(),
            Some(FhirPathValue::Boolean(false))
        );
    }

    #[test]
    fn test_primitive_system_values() {
        let model = BuiltinModelProvider::new(FhirVersion::R4B);
        let birth = patient().child("birthDate", &model);
        assert_eq!(
            birth[0].to_system_value(),
            Some(FhirPathValue::Date("1974-12-25".into()))
        );
    }

    #[test]
    fn test_fragment_children_are_untyped() {
        let model = BuiltinModelProvider::new(FhirVersion::R4B);
        let fragment = ElementNode::fragment(json!({"value": [1, 2, 3]}));
        let values = fragment.child("value", &model);
        assert_eq!(values.len(), 3);
        assert!(values.iter().all(|v| v.type_name().is_none()));
        assert_eq!(values[2].to_system_value(), Some(FhirPathValue::Integer(3)));
    }

    #[test]
    fn test_choice_suffix() {
        assert_eq!(choice_suffix("dateTime"), "DateTime");
    }
}
