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

//! Built-in function implementations, grouped by category

pub mod conversion;
pub mod existence;
pub mod fhir;
pub mod filtering;
pub mod lab;
pub mod math;
pub mod string;
pub mod subsetting;
pub mod tree;
pub mod utility;

use super::function::FunctionRegistry;
use crate::model::{Collection, FhirPathValue};

/// Register every standard function
pub(crate) fn register_standard(registry: &mut FunctionRegistry) {
    existence::register(registry);
    filtering::register(registry);
    subsetting::register(registry);
    conversion::register(registry);
    string::register(registry);
    math::register(registry);
    tree::register(registry);
    utility::register(registry);
    fhir::register(registry);
}

pub(crate) fn boolean(value: bool) -> Collection {
    Collection::single(FhirPathValue::Boolean(value))
}
