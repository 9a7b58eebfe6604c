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

//! String manipulation functions
//!
//! Positions and lengths count characters, not bytes.

use super::boolean;
use crate::error::Result;
use crate::model::{Collection, FhirPathValue};
use crate::registry::function::{FunctionCall, FunctionRegistry};
use crate::registry::signature::{FunctionSignature, ReturnType};
use regex::Regex;

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let text = ReturnType::Single("string");
    let flag = ReturnType::Single("boolean");
    let integer = ReturnType::Single("integer");
    registry.register(FunctionSignature::new("indexOf", 1, 1, integer), index_of);
    registry.register(FunctionSignature::new("substring", 1, 2, text), substring);
    registry.register(FunctionSignature::new("startsWith", 1, 1, flag), starts_with);
    registry.register(FunctionSignature::new("endsWith", 1, 1, flag), ends_with);
    registry.register(FunctionSignature::new("contains", 1, 1, flag), contains);
    registry.register(FunctionSignature::new("upper", 0, 0, text), upper);
    registry.register(FunctionSignature::new("lower", 0, 0, text), lower);
    registry.register(FunctionSignature::new("replace", 2, 2, text), replace);
    registry.register(FunctionSignature::new("matches", 1, 1, flag), matches);
    registry.register(
        FunctionSignature::new("replaceMatches", 2, 2, text),
        replace_matches,
    );
    registry.register(FunctionSignature::new("length", 0, 0, integer), length);
    registry.register(FunctionSignature::new("trim", 0, 0, text), trim);
    registry.register(
        FunctionSignature::new("split", 1, 1, ReturnType::Many("string")),
        split,
    );
    registry.register(FunctionSignature::new("join", 0, 1, text), join);
    registry.register(
        FunctionSignature::new("toChars", 0, 0, ReturnType::Many("string")),
        to_chars,
    );
}

fn string(s: impl Into<String>) -> Collection {
    Collection::single(FhirPathValue::String(s.into()))
}

fn integer(i: usize) -> Collection {
    Collection::single(FhirPathValue::Integer(
        i64::try_from(i).unwrap_or(i64::MAX),
    ))
}

/// Runs `f` when both the focus and the first argument are present
fn with_input_and_arg(
    call: &FunctionCall<'_, '_>,
    f: impl FnOnce(String, String) -> Result<Collection>,
) -> Result<Collection> {
    let Some(input) = call.focus_string()? else {
        return Ok(Collection::new());
    };
    let Some(arg) = call.arg_string(0)? else {
        return Ok(Collection::new());
    };
    f(input, arg)
}

fn map_input(
    call: &FunctionCall<'_, '_>,
    f: impl FnOnce(String) -> Collection,
) -> Result<Collection> {
    Ok(call.focus_string()?.map(f).unwrap_or_default())
}

fn regex(call: &FunctionCall<'_, '_>, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| call.error(format!("invalid regular expression: {e}")))
}

fn index_of(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    with_input_and_arg(call, |input, needle| {
        Ok(match input.find(&needle) {
            Some(byte) => integer(input[..byte].chars().count()),
            None => Collection::single(FhirPathValue::Integer(-1)),
        })
    })
}

fn substring(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let Some(input) = call.focus_string()? else {
        return Ok(Collection::new());
    };
    let Some(start) = call.arg_integer(0)? else {
        return Ok(Collection::new());
    };
    let length = call.arg_integer(1)?;
    let char_count = input.chars().count();
    let Ok(start) = usize::try_from(start) else {
        return Ok(Collection::new());
    };
    if start >= char_count {
        return Ok(Collection::new());
    }
    let take = match length {
        Some(length) => usize::try_from(length).unwrap_or(0),
        None => char_count,
    };
    Ok(string(input.chars().skip(start).take(take).collect::<String>()))
}

fn starts_with(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    with_input_and_arg(call, |input, prefix| Ok(boolean(input.starts_with(&prefix))))
}

fn ends_with(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    with_input_and_arg(call, |input, suffix| Ok(boolean(input.ends_with(&suffix))))
}

fn contains(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    with_input_and_arg(call, |input, needle| Ok(boolean(input.contains(&needle))))
}

fn upper(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    map_input(call, |s| string(s.to_uppercase()))
}

fn lower(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    map_input(call, |s| string(s.to_lowercase()))
}

fn replace(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let Some(substitution) = call.arg_string(1)? else {
        return Ok(Collection::new());
    };
    with_input_and_arg(call, |input, pattern| {
        Ok(string(input.replace(&pattern, &substitution)))
    })
}

fn matches(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    with_input_and_arg(call, |input, pattern| {
        let re = regex(call, &format!("^(?s:{pattern})$"))?;
        Ok(boolean(re.is_match(&input)))
    })
}

fn replace_matches(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let Some(substitution) = call.arg_string(1)? else {
        return Ok(Collection::new());
    };
    with_input_and_arg(call, |input, pattern| {
        let re = regex(call, &pattern)?;
        Ok(string(re.replace_all(&input, substitution.as_str())))
    })
}

fn length(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    map_input(call, |s| integer(s.chars().count()))
}

fn trim(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    map_input(call, |s| string(s.trim()))
}

fn split(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    with_input_and_arg(call, |input, separator| {
        // An empty separator splits into characters
        if separator.is_empty() {
            return Ok(input
                .chars()
                .map(|c| FhirPathValue::String(c.to_string()))
                .collect());
        }
        Ok(input
            .split(separator.as_str())
            .map(|part| FhirPathValue::String(part.to_string()))
            .collect())
    })
}

fn join(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let separator = call.arg_string(0)?.unwrap_or_default();
    let parts = call
        .focus
        .iter()
        .map(|v| {
            v.as_string()
                .ok_or_else(|| call.error(format!("cannot join {}", v.type_name())))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(string(parts.join(&separator)))
}

fn to_chars(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    map_input(call, |s| {
        s.chars()
            .map(|c| FhirPathValue::String(c.to_string()))
            .collect()
    })
}
