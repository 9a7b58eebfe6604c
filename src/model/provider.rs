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

//! Model provider trait for FHIR type information

use crate::config::FhirVersion;

/// FHIR primitive type names
pub const PRIMITIVE_TYPES: &[&str] = &[
    "base64Binary",
    "boolean",
    "canonical",
    "code",
    "date",
    "dateTime",
    "decimal",
    "id",
    "instant",
    "integer",
    "integer64",
    "markdown",
    "oid",
    "positiveInt",
    "string",
    "time",
    "unsignedInt",
    "uri",
    "url",
    "uuid",
    "xhtml",
];

/// True for FHIR primitive type names
pub fn is_primitive_type(type_name: &str) -> bool {
    PRIMITIVE_TYPES.contains(&type_name)
}

/// Strip a `FHIR.` or `System.` namespace from a type specifier
pub fn strip_namespace(type_name: &str) -> &str {
    type_name
        .strip_prefix("FHIR.")
        .or_else(|| type_name.strip_prefix("System."))
        .unwrap_or(type_name)
}

/// Element definition as seen by navigation and type inference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementInfo {
    /// Allowed types; more than one only for choice elements
    pub types: Vec<String>,
    /// Whether the element repeats
    pub is_collection: bool,
    /// Whether the element is a `[x]` choice
    pub is_choice: bool,
}

/// Type information for one FHIR version
pub trait ModelProvider: Send + Sync + std::fmt::Debug {
    /// Version this provider describes
    fn fhir_version(&self) -> FhirVersion;

    /// Element of a type (searching base types), by element name without `[x]`
    fn element_info(&self, type_name: &str, element: &str) -> Option<ElementInfo>;

    /// Direct base type (`Patient` → `DomainResource`)
    fn base_type(&self, type_name: &str) -> Option<&str>;

    /// Whether the name is a resource type
    fn is_resource_type(&self, type_name: &str) -> bool;

    /// Whether the provider knows the type at all
    fn is_known_type(&self, type_name: &str) -> bool;

    /// True when `type_name` equals `ancestor` or derives from it
    fn is_subtype_of(&self, type_name: &str, ancestor: &str) -> bool {
        let mut current = Some(type_name);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self.base_type(name);
        }
        false
    }

    /// Name used when presenting a type to users; backbone element paths
    /// such as `Patient.contact` are reported as `BackboneElement`
    fn display_type_name<'a>(&self, type_name: &'a str) -> &'a str {
        if type_name.contains('.') {
            "BackboneElement"
        } else {
            type_name
        }
    }
}
