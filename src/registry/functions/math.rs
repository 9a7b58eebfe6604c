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

//! Math functions: abs, ceiling, floor, round, truncate

use crate::error::Result;
use crate::model::{Collection, FhirPathValue, Quantity};
use crate::registry::function::{FunctionCall, FunctionRegistry};
use crate::registry::signature::{FunctionSignature, ReturnType};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let integer = ReturnType::Single("integer");
    registry.register(FunctionSignature::new("abs", 0, 0, ReturnType::FocusSingle), abs);
    registry.register(FunctionSignature::new("ceiling", 0, 0, integer), ceiling);
    registry.register(FunctionSignature::new("floor", 0, 0, integer), floor);
    registry.register(
        FunctionSignature::new("round", 0, 1, ReturnType::Single("decimal")),
        round,
    );
    registry.register(FunctionSignature::new("truncate", 0, 0, integer), truncate);
}

fn number(call: &FunctionCall<'_, '_>) -> Result<Option<FhirPathValue>> {
    let Some(value) = call.focus_single()? else {
        return Ok(None);
    };
    match value.normalized().into_owned() {
        v @ (FhirPathValue::Integer(_) | FhirPathValue::Decimal(_) | FhirPathValue::Quantity(_)) => {
            Ok(Some(v))
        }
        other => Err(call.error(format!("expects a number, got {}", other.type_name()))),
    }
}

fn abs(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    // Integer overflow gives an empty result, as for the arithmetic operators
    let result = number(call)?.and_then(|value| match value {
        FhirPathValue::Integer(i) => i.checked_abs().map(FhirPathValue::Integer),
        FhirPathValue::Decimal(d) => Some(FhirPathValue::Decimal(d.abs())),
        FhirPathValue::Quantity(q) => Some(FhirPathValue::Quantity(Quantity {
            value: q.value.abs(),
            unit: q.unit,
        })),
        other => Some(other),
    });
    Ok(result.into_iter().collect())
}

/// Applies `f` to the decimal form and returns an integer
fn to_integer_with(
    call: &FunctionCall<'_, '_>,
    f: impl Fn(Decimal) -> Decimal,
) -> Result<Collection> {
    let Some(value) = number(call)? else {
        return Ok(Collection::new());
    };
    let decimal = value
        .as_decimal()
        .ok_or_else(|| call.error("expects an integer or decimal"))?;
    let integer = f(decimal)
        .to_i64()
        .ok_or_else(|| call.error("result out of range"))?;
    Ok(Collection::single(FhirPathValue::Integer(integer)))
}

fn ceiling(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    to_integer_with(call, |d| d.ceil())
}

fn floor(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    to_integer_with(call, |d| d.floor())
}

fn truncate(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    to_integer_with(call, |d| d.trunc())
}

fn round(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let Some(value) = number(call)? else {
        return Ok(Collection::new());
    };
    let decimal = value
        .as_decimal()
        .ok_or_else(|| call.error("expects an integer or decimal"))?;
    let precision = call.arg_integer(0)?.unwrap_or(0);
    let precision =
        u32::try_from(precision).map_err(|_| call.error("precision must not be negative"))?;
    let rounded = decimal.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero);
    Ok(Collection::single(FhirPathValue::Decimal(rounded)))
}
