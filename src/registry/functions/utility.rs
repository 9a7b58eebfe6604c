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

//! Utility functions: trace, now, today, timeOfDay, not, is, as

use super::boolean;
use crate::error::Result;
use crate::model::{Collection, FhirPathValue};
use crate::registry::function::{FunctionCall, FunctionRegistry};
use crate::registry::signature::{FunctionSignature, ReturnType};
use chrono::Local;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.register(FunctionSignature::new("trace", 1, 2, ReturnType::Focus), trace);
    registry.register(
        FunctionSignature::new("now", 0, 0, ReturnType::Single("dateTime")),
        now,
    );
    registry.register(
        FunctionSignature::new("today", 0, 0, ReturnType::Single("date")),
        today,
    );
    registry.register(
        FunctionSignature::new("timeOfDay", 0, 0, ReturnType::Single("time")),
        time_of_day,
    );
    registry.register(
        FunctionSignature::new("not", 0, 0, ReturnType::Single("boolean")),
        not,
    );
    registry.register(
        FunctionSignature::new("is", 1, 1, ReturnType::Single("boolean")),
        is,
    );
    registry.register(
        FunctionSignature::new("as", 1, 1, ReturnType::TypeArgument),
        as_fn,
    );
}

/// Records the focus (or its projection) in the trace log and returns the
/// focus unchanged
fn trace(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let name = call.arg_string(0)?.unwrap_or_default();
    let traced = if call.args.len() > 1 {
        let mut projected = Collection::new();
        for (index, item) in call.focus.iter().enumerate() {
            projected.extend(call.arg_for_item(1, item, index)?);
        }
        projected
    } else {
        call.focus.clone()
    };
    log::trace!("trace({name}): {} item(s)", traced.len());
    call.request().record_trace(name, traced);
    Ok(call.focus.clone())
}

fn now(_call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let text = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string();
    Ok(Collection::single(FhirPathValue::DateTime(text)))
}

fn today(_call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let text = Local::now().format("%Y-%m-%d").to_string();
    Ok(Collection::single(FhirPathValue::Date(text)))
}

fn time_of_day(_call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let text = Local::now().format("%H:%M:%S%.3f").to_string();
    Ok(Collection::single(FhirPathValue::Time(text)))
}

fn not(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    match call.focus_single()? {
        None => Ok(Collection::new()),
        Some(value) => value
            .as_boolean()
            .map(|b| boolean(!b))
            .ok_or_else(|| call.error(format!("expects a boolean, got {}", value.type_name()))),
    }
}

fn is(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let type_name = call.arg_type(0)?;
    Ok(match call.focus_single()? {
        Some(value) => boolean(call.evaluator.is_type(value, &type_name)),
        None => Collection::new(),
    })
}

fn as_fn(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let type_name = call.arg_type(0)?;
    Ok(call
        .focus
        .iter()
        .filter(|item| call.evaluator.is_type(item, &type_name))
        .cloned()
        .collect())
}
