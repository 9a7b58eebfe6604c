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

//! Function registry for FHIRPath
//!
//! A registry is an immutable symbol table of function signatures and
//! implementations. It is built once at startup and shared between
//! requests.

pub mod function;
pub mod functions;
pub mod signature;

pub use function::{FunctionCall, FunctionImpl, FunctionRegistry, RegisteredFunction};
pub use signature::{FunctionSignature, ReturnType};
