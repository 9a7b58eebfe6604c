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

//! FHIR-specific functions: extension, resolve

use crate::error::Result;
use crate::model::{Collection, FhirPathValue};
use crate::registry::function::{FunctionCall, FunctionRegistry};
use crate::registry::signature::{FunctionSignature, ReturnType};
use serde_json::Value;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.register(
        FunctionSignature::new("extension", 1, 1, ReturnType::Many("Extension")),
        extension,
    );
    registry.register(
        FunctionSignature::new("resolve", 0, 0, ReturnType::Many("Resource")),
        resolve,
    );
}

fn extension(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let Some(url) = call.arg_string(0)? else {
        return Ok(Collection::new());
    };
    Ok(call
        .focus
        .iter()
        .filter_map(FhirPathValue::as_element)
        .flat_map(|node| node.child("extension", call.model()))
        .filter(|ext| ext.json().get("url").and_then(Value::as_str) == Some(url.as_str()))
        .map(FhirPathValue::Element)
        .collect())
}

/// Reference text of a `Reference` element or a string/uri primitive
fn reference_text(value: &FhirPathValue) -> Option<String> {
    if let FhirPathValue::Element(node) = value
        && let Some(reference) = node.json().get("reference").and_then(Value::as_str)
    {
        return Some(reference.to_string());
    }
    match value.normalized().as_ref() {
        FhirPathValue::String(s) => Some(s.clone()),
        _ => None,
    }
}

fn resolve(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let Some(resolver) = call.request().resolver() else {
        return Ok(Collection::new());
    };
    Ok(call
        .focus
        .iter()
        .filter_map(reference_text)
        .filter_map(|reference| resolver.resolve(&reference))
        .map(FhirPathValue::Element)
        .collect())
}
