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

//! Lab extension functions
//!
//! `propname()`, `pathname()` and `shortpathname()` expose node metadata;
//! `expand()` and `lookup()` are the `%terminologies` operations. These are
//! only present in registries built with [`FunctionRegistry::lab`].

use crate::error::{FhirPathError, Result};
use crate::evaluator::TerminologyLookup;
use crate::model::{Collection, ElementNode, FhirPathValue};
use crate::registry::function::{FunctionCall, FunctionRegistry};
use crate::registry::signature::{FunctionSignature, ReturnType};

pub(crate) fn register(registry: &mut FunctionRegistry) {
    let names = ReturnType::Many("string");
    registry.register(FunctionSignature::new("propname", 0, 0, names), propname);
    registry.register(FunctionSignature::new("pathname", 0, 0, names), pathname);
    registry.register(
        FunctionSignature::new("shortpathname", 0, 0, names),
        shortpathname,
    );
    registry.register(
        FunctionSignature::new("expand", 1, 2, ReturnType::Single("ValueSet")),
        expand,
    );
    registry.register(
        FunctionSignature::new("lookup", 0, 2, ReturnType::Single("Parameters")),
        lookup,
    );
}

fn node_text(call: &FunctionCall<'_, '_>, text: fn(&ElementNode) -> &str) -> Collection {
    call.focus
        .iter()
        .map(|value| match value {
            FhirPathValue::Element(node) => FhirPathValue::String(text(node).to_string()),
            _ => FhirPathValue::String("?".to_string()),
        })
        .collect()
}

fn propname(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(node_text(call, ElementNode::name))
}

fn pathname(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(node_text(call, ElementNode::location))
}

fn shortpathname(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    Ok(node_text(call, ElementNode::short_path))
}

fn terminology<'a>(call: &FunctionCall<'_, 'a>) -> Result<&'a dyn TerminologyLookup> {
    call.request().terminology().ok_or_else(|| FhirPathError::TerminologyError {
        operation: call.name.to_string(),
        message: "no terminology server is configured".to_string(),
    })
}

fn is_handle(value: &FhirPathValue) -> bool {
    matches!(value, FhirPathValue::Terminologies(_))
}

fn as_resource(document: Option<serde_json::Value>) -> Collection {
    document
        .map(|json| FhirPathValue::Element(ElementNode::resource(json)))
        .into_iter()
        .collect()
}

/// `%terminologies.expand(canonical [, options])`
fn expand(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    if !call.focus.iter().all(is_handle) {
        return Err(call.error("must be called on %terminologies"));
    }
    let Some(canonical) = call.arg_string(0)? else {
        return Ok(Collection::new());
    };
    let options = call.arg_string(1)?;
    let document = terminology(call)?.expand(&canonical, options.as_deref())?;
    Ok(as_resource(document))
}

/// `%terminologies.lookup(coded [, options])` or `coded.lookup([options])`
///
/// A leading `%terminologies` handle is skipped so both shapes resolve the
/// same code.
fn lookup(call: &FunctionCall<'_, '_>) -> Result<Collection> {
    let (coded, options) = if call.focus.iter().any(is_handle) {
        (call.arg(0)?, call.arg_string(1)?)
    } else {
        if call.args.len() > 1 {
            return Err(call.error("expects at most one argument when called on a code"));
        }
        (call.focus.clone(), call.arg_string(0)?)
    };
    let coded = match coded.as_slice() {
        [] => return Ok(Collection::new()),
        [value] => value.clone(),
        _ => return Err(call.error("expects a single code or Coding")),
    };
    let document = terminology(call)?.lookup(&coded, options.as_deref())?;
    Ok(as_resource(document))
}
