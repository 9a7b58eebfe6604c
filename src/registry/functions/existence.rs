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

//! Existence functions: empty, exists, all, allTrue, anyTrue, allFalse,
//! anyFalse, count, distinct, isDistinct, hasValue

use super::boolean;
use crate::error::Result;
use crate::evaluator::union;
use crate::model::{Collection, FhirPathValue};
use crate::registry::function::{FunctionCall, FunctionRegistry};
use crate::registry::signature::{FunctionSignature, ReturnType};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let flag = ReturnType::Single("boolean");
    registry.register(FunctionSignature::new("empty", 0, 0, flag), empty);
    registry.register(FunctionSignature::new("exists", 0, 1, flag), exists);
    registry.register(FunctionSignature::new("all", 1, 1, flag), all);
    registry.register(FunctionSignature::new("allTrue", 0, 0, flag), all_true);
    registry.register(FunctionSignature::new("anyTrue", 0, 0, flag), any_true);
    registry.register(FunctionSignature::new("allFalse", 0, 0, flag), all_false);
    registry.register(FunctionSignature::new("anyFalse", 0, 0, flag), any_false);
    registry.register(
        FunctionSignature::new("count", 0, 0, ReturnType::Single("integer")),
        count,
    );
    registry.register(
        FunctionSignature::new("distinct", 0, 0, ReturnType::Focus),
        distinct,
    );
    registry.register(FunctionSignature::new("isDistinct", 0, 0, flag), is_distinct);
    registry.register(FunctionSignature::new("hasValue", 0, 0, flag), has_value);
}

fn empty(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(boolean(call.focus.is_empty()))
}

fn exists(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    if call.args.is_empty() {
        return Ok(boolean(!call.focus.is_empty()));
    }
    for (index, item) in call.focus.iter().enumerate() {
        if call.criterion(0, item, index)? {
            return Ok(boolean(true));
        }
    }
    Ok(boolean(false))
}

fn all(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    for (index, item) in call.focus.iter().enumerate() {
        if !call.criterion(0, item, index)? {
            return Ok(boolean(false));
        }
    }
    Ok(boolean(true))
}

fn booleans(call: &FunctionCall<'_, '_>) -> Result<Vec<bool>> {
    call.focus
        .iter()
        .map(|v| {
            v.as_boolean()
                .ok_or_else(|| call.error(format!("expects booleans, got {}", v.type_name())))
        })
        .collect()
}

fn all_true(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(boolean(booleans(call)?.into_iter().all(|b| b)))
}

fn any_true(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(boolean(booleans(call)?.into_iter().any(|b| b)))
}

fn all_false(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(boolean(booleans(call)?.into_iter().all(|b| !b)))
}

fn any_false(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(boolean(booleans(call)?.into_iter().any(|b| !b)))
}

fn count(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let count = i64::try_from(call.focus.len()).unwrap_or(i64::MAX);
    Ok(Collection::single(FhirPathValue::Integer(count)))
}

fn distinct(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(union(call.focus.clone(), Collection::new()))
}

fn is_distinct(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let unique = union(call.focus.clone(), Collection::new());
    Ok(boolean(unique.len() == call.focus.len()))
}

fn has_value(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let has_value = call
        .focus
        .as_single()
        .is_some_and(|v| !matches!(v.normalized().as_ref(), FhirPathValue::Element(_)));
    Ok(boolean(has_value))
}
