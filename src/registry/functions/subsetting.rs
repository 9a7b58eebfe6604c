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

//! Subsetting and combining: single, first, last, tail, skip, take,
//! intersect, exclude, union, combine

use crate::error::Result;
use crate::evaluator::union;
use crate::model::{Collection, values_equal};
use crate::registry::function::{FunctionCall, FunctionRegistry};
use crate::registry::signature::{FunctionSignature, ReturnType};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let single_item = ReturnType::FocusSingle;
    registry.register(FunctionSignature::new("single", 0, 0, single_item), single);
    registry.register(FunctionSignature::new("first", 0, 0, single_item), first);
    registry.register(FunctionSignature::new("last", 0, 0, single_item), last);
    registry.register(FunctionSignature::new("tail", 0, 0, ReturnType::Focus), tail);
    registry.register(FunctionSignature::new("skip", 1, 1, ReturnType::Focus), skip);
    registry.register(FunctionSignature::new("take", 1, 1, ReturnType::Focus), take);
    registry.register(
        FunctionSignature::new("intersect", 1, 1, ReturnType::Focus),
        intersect,
    );
    registry.register(
        FunctionSignature::new("exclude", 1, 1, ReturnType::Focus),
        exclude,
    );
    registry.register(FunctionSignature::new("union", 1, 1, ReturnType::Focus), union_fn);
    registry.register(
        FunctionSignature::new("combine", 1, 1, ReturnType::Focus),
        combine,
    );
}

fn single(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(call.focus_single()?.cloned().into_iter().collect())
}

fn first(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(call.focus.first().cloned().into_iter().collect())
}

fn last(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(call.focus.last().cloned().into_iter().collect())
}

fn tail(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(call.focus.iter().skip(1).cloned().collect())
}

fn count_arg(call: &FunctionCall<'_, '_>) -> Result<usize> {
    let count = call
        .arg_integer(0)?
        .ok_or_else(|| call.error("requires an integer argument"))?;
    Ok(usize::try_from(count).unwrap_or(0))
}

fn skip(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let count = count_arg(call)?;
    Ok(call.focus.iter().skip(count).cloned().collect())
}

fn take(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let count = count_arg(call)?;
    Ok(call.focus.iter().take(count).cloned().collect())
}

fn intersect(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let other = call.arg(0)?;
    let common = call
        .focus
        .iter()
        .filter(|v| other.iter().any(|o| values_equal(v, o) == Some(true)))
        .cloned()
        .collect();
    Ok(union(common, Collection::new()))
}

fn exclude(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let other = call.arg(0)?;
    Ok(call
        .focus
        .iter()
        .filter(|v| !other.iter().any(|o| values_equal(v, o) == Some(true)))
        .cloned()
        .collect())
}

fn union_fn(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(union(call.focus.clone(), call.arg(0)?))
}

fn combine(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let mut out = call.focus.clone();
    out.extend(call.arg(0)?);
    Ok(out)
}
