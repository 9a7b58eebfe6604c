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

//! Function signatures for arity and return type checking

use std::fmt;

/// How the analyzer derives a function's return type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    /// A fixed singleton type (`count()` → `integer`)
    Single(&'static str),
    /// A fixed collection type (`split()` → `string[]`)
    Many(&'static str),
    /// Same types and cardinality as the focus (`where`, `distinct`)
    Focus,
    /// Same types as the focus, singleton (`first`, `single`)
    FocusSingle,
    /// Types of an argument's expression (`select`, `iif`)
    Argument(usize),
    /// The type named by a type specifier argument (`ofType`, `as`)
    TypeArgument,
    /// Not statically known
    Any,
}

/// Function signature for arity checking and type inference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    /// Function name
    pub name: &'static str,
    /// Minimum number of arguments
    pub min_arity: usize,
    /// Maximum number of arguments (None for variadic)
    pub max_arity: Option<usize>,
    /// Return type rule
    pub returns: ReturnType,
}

impl FunctionSignature {
    /// Signature with a fixed argument range
    pub const fn new(
        name: &'static str,
        min_arity: usize,
        max_arity: usize,
        returns: ReturnType,
    ) -> Self {
        Self {
            name,
            min_arity,
            max_arity: Some(max_arity),
            returns,
        }
    }

    /// Signature without an upper argument bound
    pub const fn variadic(name: &'static str, min_arity: usize, returns: ReturnType) -> Self {
        Self {
            name,
            min_arity,
            max_arity: None,
            returns,
        }
    }

    /// Whether `count` arguments are accepted
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_arity && self.max_arity.is_none_or(|max| count <= max)
    }

    /// Human-readable arity, e.g. `0..1`
    pub fn arity_text(&self) -> String {
        match self.max_arity {
            Some(max) if max == self.min_arity => max.to_string(),
            Some(max) => format!("{}..{}", self.min_arity, max),
            None => format!("{}..*", self.min_arity),
        }
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.arity_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_checks() {
        let sig = FunctionSignature::new("substring", 1, 2, ReturnType::Single("string"));
        assert!(!sig.accepts(0));
        assert!(sig.accepts(2));
        assert!(!sig.accepts(3));
        assert_eq!(sig.to_string(), "substring(1..2)");

        let open = FunctionSignature::variadic("coalesce", 1, ReturnType::Any);
        assert!(open.accepts(7));
        assert_eq!(open.arity_text(), "1..*");
    }
}
