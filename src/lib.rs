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

//! FHIRPath Lab evaluator
//!
//! Evaluates FHIRPath expressions against FHIR resources and renders the
//! results, traces and static type information as FHIR `Parameters`, the
//! exchange format of the FHIRPath Lab.
//!
//! ```no_run
//! use octofhir_fhirpath_lab::{ExpressionEvaluator, FhirVersion, LabConfig, LabRequest};
//! use serde_json::json;
//!
//! let evaluator = ExpressionEvaluator::new(FhirVersion::R4B, LabConfig::default());
//! let request = LabRequest::new("name.given")
//!     .with_resource(json!({"resourceType": "Patient", "name": [{"given": ["Ann"]}]}));
//! let response = evaluator.evaluate(request);
//! println!("{}", response.to_value());
//! ```

pub mod analyzer;
pub mod ast;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod lab;
pub mod model;
pub mod parser;
pub mod registry;

#[cfg(feature = "server")]
pub mod server;

pub use compiler::CompiledExpression;
pub use config::{FhirVersion, LabConfig};
pub use engine::FhirPathEngine;
pub use error::{FhirPathError, Result};
pub use lab::{ExpressionEvaluator, LabError, LabRequest, LabResponse, Parameters};
pub use model::{Collection, ElementNode, FhirPathValue};
pub use parser::{ParseError, parse};
pub use registry::FunctionRegistry;
