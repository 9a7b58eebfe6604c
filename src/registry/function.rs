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

//! Function registry and invocation context

use super::functions;
use super::signature::FunctionSignature;
use crate::ast::ExpressionNode;
use crate::error::{FhirPathError, Result};
use crate::evaluator::{Evaluator, RequestContext, Scope};
use crate::model::{Collection, FhirPathValue, ModelProvider};
use rustc_hash::FxHashMap;

/// Implementation of a function
pub type FunctionImpl = fn(&FunctionCall<'_, '_>) -> Result<Collection>;

/// A registered function: metadata plus implementation
#[derive(Debug, Clone)]
pub struct RegisteredFunction {
    /// Signature used by the compiler and the type analyzer
    pub signature: FunctionSignature,
    implementation: FunctionImpl,
}

impl RegisteredFunction {
    /// Invoke the implementation
    pub fn invoke(&self, call: &FunctionCall<'_, '_>) -> Result<Collection> {
        (self.implementation)(call)
    }
}

/// Immutable table of callable functions
///
/// Build one at startup with [`FunctionRegistry::standard`] or
/// [`FunctionRegistry::lab`], wrap it in an `Arc` and share it between
/// requests.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: FxHashMap<&'static str, RegisteredFunction>,
}

impl FunctionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard FHIRPath and FHIR functions
    pub fn standard() -> Self {
        let mut registry = Self::new();
        functions::register_standard(&mut registry);
        registry
    }

    /// Standard registry extended with the lab functions
    /// (`propname`, `pathname`, `shortpathname`, `expand`, `lookup`)
    pub fn lab() -> Self {
        Self::standard().with_lab_extensions()
    }

    /// Add the lab functions to this registry
    pub fn with_lab_extensions(mut self) -> Self {
        functions::lab::register(&mut self);
        self
    }

    /// Register a function, replacing any previous one with the same name
    pub fn register(&mut self, signature: FunctionSignature, implementation: FunctionImpl) {
        self.functions.insert(
            signature.name,
            RegisteredFunction {
                signature,
                implementation,
            },
        );
    }

    /// Look up a function
    pub fn get(&self, name: &str) -> Option<&RegisteredFunction> {
        self.functions.get(name)
    }

    /// Signature of a function
    pub fn signature(&self, name: &str) -> Option<&FunctionSignature> {
        self.get(name).map(|f| &f.signature)
    }

    /// Whether a function is registered
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// One function invocation
///
/// Arguments are handed over unevaluated so that functions such as
/// `where()` can evaluate them once per focus item.
pub struct FunctionCall<'c, 'a> {
    /// Function name as written
    pub name: &'c str,
    /// Input collection
    pub focus: &'c Collection,
    /// Argument expressions
    pub args: &'c [ExpressionNode],
    /// Scope the call appears in
    pub scope: &'c Scope,
    /// Evaluator running the call
    pub evaluator: &'c Evaluator<'a>,
}

impl<'c, 'a> FunctionCall<'c, 'a> {
    /// Model of the running FHIR version
    pub fn model(&self) -> &dyn ModelProvider {
        self.evaluator.model()
    }

    /// Request context
    pub fn request(&self) -> &RequestContext<'a> {
        self.evaluator.request()
    }

    /// Error attributed to this function
    pub fn error(&self, message: impl Into<String>) -> FhirPathError {
        FhirPathError::function_error(self.name, message)
    }

    /// Evaluate argument `index` in the calling context
    pub fn arg(&self, index: usize) -> Result<Collection> {
        match self.args.get(index) {
            Some(expr) => self.evaluator.evaluate_argument(expr, self.scope),
            None => Ok(Collection::new()),
        }
    }

    /// Evaluate argument `index` with `item` as `$this`
    pub fn arg_for_item(
        &self,
        index: usize,
        item: &FhirPathValue,
        position: usize,
    ) -> Result<Collection> {
        match self.args.get(index) {
            Some(expr) => self
                .evaluator
                .evaluate_for_item(expr, item, position, self.scope),
            None => Ok(Collection::new()),
        }
    }

    /// Evaluate argument `index` as a boolean criterion for `item`
    ///
    /// Empty counts as false; anything but a single boolean is an error.
    pub fn criterion(&self, index: usize, item: &FhirPathValue, position: usize) -> Result<bool> {
        let result = self.arg_for_item(index, item, position)?;
        match result.as_slice() {
            [] => Ok(false),
            [value] => value
                .as_boolean()
                .ok_or_else(|| self.error("criteria must evaluate to a boolean")),
            _ => Err(self.error("criteria must evaluate to a single boolean")),
        }
    }

    /// Argument `index` as an optional singleton string
    pub fn arg_string(&self, index: usize) -> Result<Option<String>> {
        let value = self.arg(index)?;
        match value.as_slice() {
            [] => Ok(None),
            [single] => match single.normalized().as_ref() {
                FhirPathValue::String(s) => Ok(Some(s.clone())),
                other => Err(self.error(format!(
                    "argument {} must be a string, got {}",
                    index + 1,
                    other.type_name()
                ))),
            },
            _ => Err(self.error(format!("argument {} must be a single value", index + 1))),
        }
    }

    /// Argument `index` as an optional singleton integer
    pub fn arg_integer(&self, index: usize) -> Result<Option<i64>> {
        let value = self.arg(index)?;
        match value.as_slice() {
            [] => Ok(None),
            [single] => single
                .as_integer()
                .map(Some)
                .ok_or_else(|| self.error(format!("argument {} must be an integer", index + 1))),
            _ => Err(self.error(format!("argument {} must be a single value", index + 1))),
        }
    }

    /// Type specifier given as argument `index` (`ofType(HumanName)`)
    pub fn arg_type(&self, index: usize) -> Result<String> {
        self.args
            .get(index)
            .and_then(ExpressionNode::as_type_specifier)
            .ok_or_else(|| self.error("expected a type specifier"))
    }

    /// The focus as an optional singleton
    pub fn focus_single(&self) -> Result<Option<&'c FhirPathValue>> {
        match self.focus.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some(single)),
            _ => Err(self.error(format!(
                "expects a single input, got {} items",
                self.focus.len()
            ))),
        }
    }

    /// The focus as an optional singleton string
    ///
    /// Dates and times are accepted in their textual form.
    pub fn focus_string(&self) -> Result<Option<String>> {
        let Some(value) = self.focus_single()? else {
            return Ok(None);
        };
        match value.normalized().as_ref() {
            FhirPathValue::String(s)
            | FhirPathValue::Date(s)
            | FhirPathValue::DateTime(s)
            | FhirPathValue::Time(s) => Ok(Some(s.clone())),
            other => Err(self.error(format!("expects a string input, got {}", other.type_name()))),
        }
    }
}
