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

//! Filtering and projection: where, select, repeat, ofType

use crate::error::Result;
use crate::model::{Collection, values_equal};
use crate::registry::function::{FunctionCall, FunctionRegistry};
use crate::registry::signature::{FunctionSignature, ReturnType};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.register(FunctionSignature::new("where", 1, 1, ReturnType::Focus), where_fn);
    registry.register(
        FunctionSignature::new("select", 1, 1, ReturnType::Argument(0)),
        select,
    );
    registry.register(
        FunctionSignature::new("repeat", 1, 1, ReturnType::Argument(0)),
        repeat,
    );
    registry.register(
        FunctionSignature::new("ofType", 1, 1, ReturnType::TypeArgument),
        of_type,
    );
}

fn where_fn(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let mut out = Collection::new();
    for (index, item) in call.focus.iter().enumerate() {
        if call.criterion(0, item, index)? {
            out.push(item.clone());
        }
    }
    Ok(out)
}

fn select(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let mut out = Collection::new();
    for (index, item) in call.focus.iter().enumerate() {
        out.extend(call.arg_for_item(0, item, index)?);
    }
    Ok(out)
}

/// Applies the projection until no new items appear
fn repeat(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let mut out = Collection::new();
    let mut pending = call.focus.clone();
    while !pending.is_empty() {
        let mut next = Collection::new();
        for (index, item) in pending.iter().enumerate() {
            for produced in call.arg_for_item(0, item, index)? {
                if !out.iter().any(|v| values_equal(v, &produced) == Some(true)) {
                    out.push(produced.clone());
                    next.push(produced);
                }
            }
        }
        pending = next;
    }
    Ok(out)
}

fn of_type(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let type_name = call.arg_type(0)?;
    Ok(call
        .focus
        .iter()
        .filter(|item| call.evaluator.is_type(item, &type_name))
        .cloned()
        .collect())
}
