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

//! FHIRPath expression evaluator
//!
//! Expressions are evaluated synchronously over the AST. Everything that
//! belongs to a single request (variables, trace log, resolver,
//! terminology client) is passed in explicitly.

mod context;
mod engine;
mod operators;
mod symbols;

pub use context::{ReferenceLookup, RequestContext, TerminologyLookup, TraceEntry};
pub use engine::{Evaluator, Scope};
pub use operators::{apply_binary, union};
pub use symbols::{ENVIRONMENT_VARIABLES, SymbolTable, is_environment_variable};
