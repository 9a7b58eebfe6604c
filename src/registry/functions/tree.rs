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

//! Tree navigation: children, descendants

use crate::error::Result;
use crate::model::{Collection, FhirPathValue, ModelProvider};
use crate::registry::function::{FunctionCall, FunctionRegistry};
use crate::registry::signature::{FunctionSignature, ReturnType};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.register(
        FunctionSignature::new("children", 0, 0, ReturnType::Any),
        children,
    );
    registry.register(
        FunctionSignature::new("descendants", 0, 0, ReturnType::Any),
        descendants,
    );
}

fn children_of(items: &Collection, model: &dyn ModelProvider) -> Collection {
    items
        .iter()
        .filter_map(FhirPathValue::as_element)
        .flat_map(|node| node.children(model))
        .map(FhirPathValue::Element)
        .collect()
}

fn children(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(children_of(call.focus, call.model()))
}

fn descendants(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let mut out = Collection::new();
    let mut level = children_of(call.focus, call.model());
    while !level.is_empty() {
        let next = children_of(&level, call.model());
        out.extend(level);
        level = next;
    }
    Ok(out)
}
