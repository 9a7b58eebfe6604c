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

//! Symbol table: functions plus request variables

use crate::model::Collection;
use crate::registry::FunctionRegistry;
use indexmap::IndexMap;
use std::sync::Arc;

/// Environment variables every expression may reference
pub const ENVIRONMENT_VARIABLES: &[&str] = &[
    "resource",
    "rootResource",
    "context",
    "terminologies",
    "ucum",
    "sct",
    "loinc",
];

/// Whether `%name` is provided by the environment rather than the caller
pub fn is_environment_variable(name: &str) -> bool {
    ENVIRONMENT_VARIABLES.contains(&name) || name.starts_with("vs-") || name.starts_with("ext-")
}

/// Functions and variables visible to one request
///
/// The function registry is shared and immutable; variables are declared
/// while the request is set up and never change afterwards.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    functions: Arc<FunctionRegistry>,
    variables: IndexMap<String, Collection>,
}

impl SymbolTable {
    /// Table over a function registry with no variables
    pub fn new(functions: Arc<FunctionRegistry>) -> Self {
        Self {
            functions,
            variables: IndexMap::new(),
        }
    }

    /// Function registry
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Declare a variable; an empty collection declares it without a value
    pub fn declare(&mut self, name: impl Into<String>, value: Collection) {
        self.variables.insert(name.into(), value);
    }

    /// Value of a declared variable
    pub fn variable(&self, name: &str) -> Option<&Collection> {
        self.variables.get(name)
    }

    /// Whether a caller variable or an environment variable exists
    pub fn is_declared(&self, name: &str) -> bool {
        self.variables.contains_key(name) || is_environment_variable(name)
    }

    /// Declared variables in declaration order
    pub fn variables(&self) -> impl Iterator<Item = (&str, &Collection)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }
}
