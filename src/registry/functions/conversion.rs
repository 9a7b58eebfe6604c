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

//! Conversion functions

use super::boolean;
use crate::error::Result;
use crate::model::{Collection, FhirPathValue};
use crate::registry::function::{FunctionCall, FunctionRegistry};
use crate::registry::signature::{FunctionSignature, ReturnType};
use rust_decimal::Decimal;
use std::str::FromStr;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    registry.register(
        FunctionSignature::new("iif", 2, 3, ReturnType::Argument(1)),
        iif,
    );
    registry.register(
        FunctionSignature::new("toString", 0, 0, ReturnType::Single("string")),
        to_string,
    );
    registry.register(
        FunctionSignature::new("toInteger", 0, 0, ReturnType::Single("integer")),
        to_integer,
    );
    registry.register(
        FunctionSignature::new("toDecimal", 0, 0, ReturnType::Single("decimal")),
        to_decimal,
    );
    registry.register(
        FunctionSignature::new("toBoolean", 0, 0, ReturnType::Single("boolean")),
        to_boolean,
    );
    let flag = ReturnType::Single("boolean");
    registry.register(
        FunctionSignature::new("convertsToInteger", 0, 0, flag),
        converts_to_integer,
    );
    registry.register(
        FunctionSignature::new("convertsToDecimal", 0, 0, flag),
        converts_to_decimal,
    );
    registry.register(
        FunctionSignature::new("convertsToBoolean", 0, 0, flag),
        converts_to_boolean,
    );
    registry.register(
        FunctionSignature::new("convertsToString", 0, 0, flag),
        converts_to_string,
    );
}

/// `iif(criterion, true-result [, otherwise-result])`; only the chosen
/// branch is evaluated
fn iif(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let criterion = call.arg(0)?;
    let chosen = match criterion.as_slice() {
        [] => false,
        [value] => value
            .as_boolean()
            .ok_or_else(|| call.error("criterion must be a boolean"))?,
        _ => return Err(call.error("criterion must be a single boolean")),
    };
    if chosen {
        call.arg(1)
    } else {
        call.arg(2)
    }
}

fn integer_of(value: &FhirPathValue) -> Option<i64> {
    match value.normalized().as_ref() {
        FhirPathValue::Integer(i) => Some(*i),
        FhirPathValue::Boolean(b) => Some(i64::from(*b)),
        FhirPathValue::String(s) => {
            let s = s.trim();
            let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            s.parse().ok()
        }
        _ => None,
    }
}

fn decimal_of(value: &FhirPathValue) -> Option<Decimal> {
    match value.normalized().as_ref() {
        FhirPathValue::Integer(i) => Some(Decimal::from(*i)),
        FhirPathValue::Decimal(d) => Some(*d),
        FhirPathValue::Boolean(b) => Some(if *b { Decimal::ONE } else { Decimal::ZERO }),
        FhirPathValue::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn boolean_of(value: &FhirPathValue) -> Option<bool> {
    match value.normalized().as_ref() {
        FhirPathValue::Boolean(b) => Some(*b),
        FhirPathValue::Integer(1) => Some(true),
        FhirPathValue::Integer(0) => Some(false),
        FhirPathValue::Decimal(d) if *d == Decimal::ONE => Some(true),
        FhirPathValue::Decimal(d) if d.is_zero() => Some(false),
        FhirPathValue::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" | "1.0" => Some(true),
            "false" | "f" | "no" | "n" | "0" | "0.0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn convert<T>(
    call: &FunctionCall<'_, '_>,
    convert: impl Fn(&FhirPathValue) -> Option<T>,
    wrap: impl Fn(T) -> FhirPathValue,
) -> Result<Collection> {
    Ok(call
        .focus_single()?
        .and_then(convert)
        .map(wrap)
        .into_iter()
        .collect())
}

fn converts<T>(
    call: &FunctionCall<'_, '_>,
    convert: impl Fn(&FhirPathValue) -> Option<T>,
) -> Result<Collection> {
    Ok(match call.focus_single()? {
        Some(value) => boolean(convert(value).is_some()),
        None => Collection::new(),
    })
}

fn to_string(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    convert(call, FhirPathValue::as_string, FhirPathValue::String)
}

fn to_integer(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    convert(call, integer_of, FhirPathValue::Integer)
}

fn to_decimal(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    convert(call, decimal_of, FhirPathValue::Decimal)
}

fn to_boolean(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    convert(call, boolean_of, FhirPathValue::Boolean)
}

fn converts_to_integer(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    converts(call, integer_of)
}

fn converts_to_decimal(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    converts(call, decimal_of)
}

fn converts_to_boolean(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    converts(call, boolean_of)
}

fn converts_to_string(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    converts(call, FhirPathValue::as_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("42", Some(42))]
    #[case("-7", Some(-7))]
    #[case("4.2", None)]
    #[case("abc", None)]
    fn test_string_to_integer(#[case] text: &str, #[case] expected: Option<i64>) {
        assert_eq!(integer_of(&FhirPathValue::String(text.into())), expected);
    }

    #[test]
    fn test_boolean_conversion() {
        assert_eq!(boolean_of(&FhirPathValue::String("Yes".into())), Some(true));
        assert_eq!(boolean_of(&FhirPathValue::Integer(2)), None);
    }
}
