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

//! Built-in FHIR type tables
//!
//! Covers the base resources, common data types and the resources the lab
//! itself produces (Parameters, ValueSet, OperationOutcome). Backbone
//! elements are keyed by their path, e.g. `Patient.contact`.

use super::provider::{ElementInfo, ModelProvider, is_primitive_type};
use crate::config::FhirVersion;
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Availability {
    All,
    R4BOnly,
    R5Only,
}

impl Availability {
    fn includes(self, version: FhirVersion) -> bool {
        match self {
            Availability::All => true,
            Availability::R4BOnly => version == FhirVersion::R4B,
            Availability::R5Only => version == FhirVersion::R5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Resource,
    Complex,
}

struct ElementDef {
    name: &'static str,
    types: &'static str,
    many: bool,
    availability: Availability,
}

const fn one(name: &'static str, types: &'static str) -> ElementDef {
    ElementDef {
        name,
        types,
        many: false,
        availability: Availability::All,
    }
}

const fn many(name: &'static str, types: &'static str) -> ElementDef {
    ElementDef {
        name,
        types,
        many: true,
        availability: Availability::All,
    }
}

const fn r4b(def: ElementDef) -> ElementDef {
    ElementDef {
        availability: Availability::R4BOnly,
        ..def
    }
}

const fn r5(def: ElementDef) -> ElementDef {
    ElementDef {
        availability: Availability::R5Only,
        ..def
    }
}

struct TypeDef {
    name: &'static str,
    base: Option<&'static str>,
    kind: Kind,
    elements: &'static [ElementDef],
}

/// Types allowed for open `value[x]` elements (`Extension`, `Parameters`)
const OPEN_TYPES: &str = "base64Binary|boolean|canonical|code|date|dateTime|decimal|id|instant|\
integer|markdown|oid|positiveInt|string|time|unsignedInt|uri|url|uuid|Address|Age|Annotation|\
Attachment|CodeableConcept|Coding|ContactPoint|Count|Distance|Duration|HumanName|Identifier|\
Money|Period|Quantity|Range|Ratio|Reference|SampledData|Signature|Timing|Meta";

const OBSERVATION_VALUE: &str =
    "Quantity|CodeableConcept|string|boolean|integer|Range|Ratio|SampledData|time|dateTime|Period";

static TYPES: &[TypeDef] = &[
    TypeDef {
        name: "Element",
        base: None,
        kind: Kind::Complex,
        elements: &[one("id", "string"), many("extension", "Extension")],
    },
    TypeDef {
        name: "BackboneElement",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[many("modifierExtension", "Extension")],
    },
    TypeDef {
        name: "Extension",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[one("url", "uri"), one("value[x]", OPEN_TYPES)],
    },
    TypeDef {
        name: "Coding",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[
            one("system", "uri"),
            one("version", "string"),
            one("code", "code"),
            one("display", "string"),
            one("userSelected", "boolean"),
        ],
    },
    TypeDef {
        name: "CodeableConcept",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[many("coding", "Coding"), one("text", "string")],
    },
    TypeDef {
        name: "Identifier",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[
            one("use", "code"),
            one("type", "CodeableConcept"),
            one("system", "uri"),
            one("value", "string"),
            one("period", "Period"),
            one("assigner", "Reference"),
        ],
    },
    TypeDef {
        name: "HumanName",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[
            one("use", "code"),
            one("text", "string"),
            one("family", "string"),
            many("given", "string"),
            many("prefix", "string"),
            many("suffix", "string"),
            one("period", "Period"),
        ],
    },
    TypeDef {
        name: "ContactPoint",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[
            one("system", "code"),
            one("value", "string"),
            one("use", "code"),
            one("rank", "positiveInt"),
            one("period", "Period"),
        ],
    },
    TypeDef {
        name: "Address",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[
            one("use", "code"),
            one("type", "code"),
            one("text", "string"),
            many("line", "string"),
            one("city", "string"),
            one("district", "string"),
            one("state", "string"),
            one("postalCode", "string"),
            one("country", "string"),
            one("period", "Period"),
        ],
    },
    TypeDef {
        name: "Period",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[one("start", "dateTime"), one("end", "dateTime")],
    },
    TypeDef {
        name: "Quantity",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[
            one("value", "decimal"),
            one("comparator", "code"),
            one("unit", "string"),
            one("system", "uri"),
            one("code", "code"),
        ],
    },
    TypeDef {
        name: "Age",
        base: Some("Quantity"),
        kind: Kind::Complex,
        elements: &[],
    },
    TypeDef {
        name: "Range",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[one("low", "Quantity"), one("high", "Quantity")],
    },
    TypeDef {
        name: "Ratio",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[one("numerator", "Quantity"), one("denominator", "Quantity")],
    },
    TypeDef {
        name: "Reference",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[
            one("reference", "string"),
            one("type", "uri"),
            one("identifier", "Identifier"),
            one("display", "string"),
        ],
    },
    TypeDef {
        name: "Attachment",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[
            one("contentType", "code"),
            one("language", "code"),
            one("data", "base64Binary"),
            one("url", "url"),
            r4b(one("size", "unsignedInt")),
            r5(one("size", "integer64")),
            one("hash", "base64Binary"),
            one("title", "string"),
            one("creation", "dateTime"),
        ],
    },
    TypeDef {
        name: "Annotation",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[
            one("author[x]", "Reference|string"),
            one("time", "dateTime"),
            one("text", "markdown"),
        ],
    },
    TypeDef {
        name: "Meta",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[
            one("versionId", "id"),
            one("lastUpdated", "instant"),
            one("source", "uri"),
            many("profile", "canonical"),
            many("security", "Coding"),
            many("tag", "Coding"),
        ],
    },
    TypeDef {
        name: "Narrative",
        base: Some("Element"),
        kind: Kind::Complex,
        elements: &[one("status", "code"), one("div", "xhtml")],
    },
    TypeDef {
        name: "Resource",
        base: None,
        kind: Kind::Resource,
        elements: &[
            one("id", "id"),
            one("meta", "Meta"),
            one("implicitRules", "uri"),
            one("language", "code"),
        ],
    },
    TypeDef {
        name: "DomainResource",
        base: Some("Resource"),
        kind: Kind::Resource,
        elements: &[
            one("text", "Narrative"),
            many("contained", "Resource"),
            many("extension", "Extension"),
            many("modifierExtension", "Extension"),
        ],
    },
    TypeDef {
        name: "Patient",
        base: Some("DomainResource"),
        kind: Kind::Resource,
        elements: &[
            many("identifier", "Identifier"),
            one("active", "boolean"),
            many("name", "HumanName"),
            many("telecom", "ContactPoint"),
            one("gender", "code"),
            one("birthDate", "date"),
            one("deceased[x]", "boolean|dateTime"),
            many("address", "Address"),
            one("maritalStatus", "CodeableConcept"),
            one("multipleBirth[x]", "boolean|integer"),
            many("photo", "Attachment"),
            many("contact", "Patient.contact"),
            many("communication", "Patient.communication"),
            many("generalPractitioner", "Reference"),
            one("managingOrganization", "Reference"),
            many("link", "Patient.link"),
        ],
    },
    TypeDef {
        name: "Patient.contact",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[
            many("relationship", "CodeableConcept"),
            one("name", "HumanName"),
            many("telecom", "ContactPoint"),
            one("address", "Address"),
            one("gender", "code"),
            one("organization", "Reference"),
            one("period", "Period"),
        ],
    },
    TypeDef {
        name: "Patient.communication",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[one("language", "CodeableConcept"), one("preferred", "boolean")],
    },
    TypeDef {
        name: "Patient.link",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[one("other", "Reference"), one("type", "code")],
    },
    TypeDef {
        name: "Practitioner",
        base: Some("DomainResource"),
        kind: Kind::Resource,
        elements: &[
            many("identifier", "Identifier"),
            one("active", "boolean"),
            many("name", "HumanName"),
            many("telecom", "ContactPoint"),
            many("address", "Address"),
            one("gender", "code"),
            one("birthDate", "date"),
        ],
    },
    TypeDef {
        name: "Organization",
        base: Some("DomainResource"),
        kind: Kind::Resource,
        elements: &[
            many("identifier", "Identifier"),
            one("active", "boolean"),
            many("type", "CodeableConcept"),
            one("name", "string"),
            many("alias", "string"),
            r4b(many("telecom", "ContactPoint")),
            r4b(many("address", "Address")),
            one("partOf", "Reference"),
        ],
    },
    TypeDef {
        name: "Observation",
        base: Some("DomainResource"),
        kind: Kind::Resource,
        elements: &[
            many("identifier", "Identifier"),
            many("basedOn", "Reference"),
            many("partOf", "Reference"),
            one("status", "code"),
            many("category", "CodeableConcept"),
            one("code", "CodeableConcept"),
            one("subject", "Reference"),
            many("focus", "Reference"),
            one("encounter", "Reference"),
            one("effective[x]", "dateTime|Period|Timing|instant"),
            one("issued", "instant"),
            many("performer", "Reference"),
            one("value[x]", OBSERVATION_VALUE),
            one("dataAbsentReason", "CodeableConcept"),
            many("interpretation", "CodeableConcept"),
            many("note", "Annotation"),
            one("bodySite", "CodeableConcept"),
            one("method", "CodeableConcept"),
            one("specimen", "Reference"),
            one("device", "Reference"),
            many("referenceRange", "Observation.referenceRange"),
            many("hasMember", "Reference"),
            many("derivedFrom", "Reference"),
            many("component", "Observation.component"),
            r5(one("instantiates[x]", "canonical|Reference")),
            r5(many("triggeredBy", "Observation.triggeredBy")),
        ],
    },
    TypeDef {
        name: "Observation.referenceRange",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[
            one("low", "Quantity"),
            one("high", "Quantity"),
            r5(one("normalValue", "CodeableConcept")),
            one("type", "CodeableConcept"),
            many("appliesTo", "CodeableConcept"),
            one("age", "Range"),
            one("text", "string"),
        ],
    },
    TypeDef {
        name: "Observation.component",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[
            one("code", "CodeableConcept"),
            one("value[x]", OBSERVATION_VALUE),
            one("dataAbsentReason", "CodeableConcept"),
            many("interpretation", "CodeableConcept"),
            many("referenceRange", "Observation.referenceRange"),
        ],
    },
    TypeDef {
        name: "Observation.triggeredBy",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[
            one("observation", "Reference"),
            one("type", "code"),
            one("reason", "string"),
        ],
    },
    TypeDef {
        name: "Condition",
        base: Some("DomainResource"),
        kind: Kind::Resource,
        elements: &[
            many("identifier", "Identifier"),
            one("clinicalStatus", "CodeableConcept"),
            one("verificationStatus", "CodeableConcept"),
            many("category", "CodeableConcept"),
            one("severity", "CodeableConcept"),
            one("code", "CodeableConcept"),
            many("bodySite", "CodeableConcept"),
            one("subject", "Reference"),
            one("encounter", "Reference"),
            one("onset[x]", "dateTime|Age|Period|Range|string"),
            one("abatement[x]", "dateTime|Age|Period|Range|string"),
            one("recordedDate", "dateTime"),
            many("note", "Annotation"),
        ],
    },
    TypeDef {
        name: "Encounter",
        base: Some("DomainResource"),
        kind: Kind::Resource,
        elements: &[
            many("identifier", "Identifier"),
            one("status", "code"),
            r4b(one("class", "Coding")),
            r5(many("class", "CodeableConcept")),
            many("type", "CodeableConcept"),
            one("subject", "Reference"),
            r4b(one("period", "Period")),
            r5(one("actualPeriod", "Period")),
            many("reasonCode", "CodeableConcept"),
        ],
    },
    TypeDef {
        name: "Bundle",
        base: Some("Resource"),
        kind: Kind::Resource,
        elements: &[
            one("identifier", "Identifier"),
            one("type", "code"),
            one("timestamp", "instant"),
            one("total", "unsignedInt"),
            many("link", "Bundle.link"),
            many("entry", "Bundle.entry"),
        ],
    },
    TypeDef {
        name: "Bundle.link",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[
            r4b(one("relation", "string")),
            r5(one("relation", "code")),
            one("url", "uri"),
        ],
    },
    TypeDef {
        name: "Bundle.entry",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[
            many("link", "Bundle.link"),
            one("fullUrl", "uri"),
            one("resource", "Resource"),
            one("search", "Bundle.entry.search"),
            one("request", "Bundle.entry.request"),
            one("response", "Bundle.entry.response"),
        ],
    },
    TypeDef {
        name: "Bundle.entry.search",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[one("mode", "code"), one("score", "decimal")],
    },
    TypeDef {
        name: "Bundle.entry.request",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[one("method", "code"), one("url", "uri")],
    },
    TypeDef {
        name: "Bundle.entry.response",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[
            one("status", "string"),
            one("location", "uri"),
            one("etag", "string"),
            one("lastModified", "instant"),
        ],
    },
    TypeDef {
        name: "Parameters",
        base: Some("Resource"),
        kind: Kind::Resource,
        elements: &[many("parameter", "Parameters.parameter")],
    },
    TypeDef {
        name: "Parameters.parameter",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[
            one("name", "string"),
            one("value[x]", OPEN_TYPES),
            one("resource", "Resource"),
            many("part", "Parameters.parameter"),
        ],
    },
    TypeDef {
        name: "ValueSet",
        base: Some("DomainResource"),
        kind: Kind::Resource,
        elements: &[
            one("url", "uri"),
            many("identifier", "Identifier"),
            one("version", "string"),
            one("name", "string"),
            one("title", "string"),
            one("status", "code"),
            one("date", "dateTime"),
            one("publisher", "string"),
            one("description", "markdown"),
            one("compose", "ValueSet.compose"),
            one("expansion", "ValueSet.expansion"),
        ],
    },
    TypeDef {
        name: "ValueSet.compose",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[
            many("include", "ValueSet.compose.include"),
            many("exclude", "ValueSet.compose.include"),
        ],
    },
    TypeDef {
        name: "ValueSet.compose.include",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[
            one("system", "uri"),
            one("version", "string"),
            many("concept", "ValueSet.compose.include.concept"),
            many("valueSet", "canonical"),
        ],
    },
    TypeDef {
        name: "ValueSet.compose.include.concept",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[one("code", "code"), one("display", "string")],
    },
    TypeDef {
        name: "ValueSet.expansion",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[
            one("identifier", "uri"),
            one("timestamp", "dateTime"),
            one("total", "integer"),
            one("offset", "integer"),
            many("contains", "ValueSet.expansion.contains"),
        ],
    },
    TypeDef {
        name: "ValueSet.expansion.contains",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[
            one("system", "uri"),
            one("abstract", "boolean"),
            one("inactive", "boolean"),
            one("version", "string"),
            one("code", "code"),
            one("display", "string"),
            many("contains", "ValueSet.expansion.contains"),
        ],
    },
    TypeDef {
        name: "OperationOutcome",
        base: Some("DomainResource"),
        kind: Kind::Resource,
        elements: &[many("issue", "OperationOutcome.issue")],
    },
    TypeDef {
        name: "OperationOutcome.issue",
        base: Some("BackboneElement"),
        kind: Kind::Complex,
        elements: &[
            one("severity", "code"),
            one("code", "code"),
            one("details", "CodeableConcept"),
            one("diagnostics", "string"),
            many("expression", "string"),
        ],
    },
];

#[derive(Debug)]
struct TypeEntry {
    base: Option<&'static str>,
    kind: Kind,
    elements: FxHashMap<&'static str, ElementInfo>,
}

#[derive(Debug)]
struct ModelIndex {
    types: FxHashMap<&'static str, TypeEntry>,
}

impl ModelIndex {
    fn build(version: FhirVersion) -> Self {
        let types = TYPES
            .iter()
            .map(|def| {
                let elements = def
                    .elements
                    .iter()
                    .filter(|element| element.availability.includes(version))
                    .map(|element| {
                        let (name, is_choice) = match element.name.strip_suffix("[x]") {
                            Some(stem) => (stem, true),
                            None => (element.name, false),
                        };
                        let info = ElementInfo {
                            types: element.types.split('|').map(str::to_string).collect(),
                            is_collection: element.many,
                            is_choice,
                        };
                        (name, info)
                    })
                    .collect();
                let entry = TypeEntry {
                    base: def.base,
                    kind: def.kind,
                    elements,
                };
                (def.name, entry)
            })
            .collect();
        Self { types }
    }
}

static R4B_INDEX: Lazy<ModelIndex> = Lazy::new(|| ModelIndex::build(FhirVersion::R4B));
static R5_INDEX: Lazy<ModelIndex> = Lazy::new(|| ModelIndex::build(FhirVersion::R5));

/// Model provider backed by the built-in type tables
#[derive(Debug, Clone, Copy)]
pub struct BuiltinModelProvider {
    version: FhirVersion,
    index: &'static ModelIndex,
}

impl BuiltinModelProvider {
    /// Provider for a FHIR version
    pub fn new(version: FhirVersion) -> Self {
        let index: &'static ModelIndex = match version {
            FhirVersion::R4B => &R4B_INDEX,
            FhirVersion::R5 => &R5_INDEX,
        };
        Self { version, index }
    }
}

impl ModelProvider for BuiltinModelProvider {
    fn fhir_version(&self) -> FhirVersion {
        self.version
    }

    fn element_info(&self, type_name: &str, element: &str) -> Option<ElementInfo> {
        let mut current = Some(type_name);
        while let Some(name) = current {
            let entry = self.index.types.get(name)?;
            if let Some(info) = entry.elements.get(element) {
                return Some(info.clone());
            }
            current = entry.base;
        }
        None
    }

    fn base_type(&self, type_name: &str) -> Option<&str> {
        self.index.types.get(type_name).and_then(|entry| entry.base)
    }

    fn is_resource_type(&self, type_name: &str) -> bool {
        self.index
            .types
            .get(type_name)
            .is_some_and(|entry| entry.kind == Kind::Resource)
    }

    fn is_known_type(&self, type_name: &str) -> bool {
        is_primitive_type(type_name) || self.index.types.contains_key(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_inherited_elements() {
        let model = BuiltinModelProvider::new(FhirVersion::R4B);
        let id = model.element_info("Patient", "id").unwrap();
        assert_eq!(id.types, vec!["id".to_string()]);
        let extension = model.element_info("Patient.contact", "extension").unwrap();
        assert!(extension.is_collection);
    }

    #[test]
    fn test_choice_elements() {
        let model = BuiltinModelProvider::new(FhirVersion::R4B);
        let value = model.element_info("Observation", "value").unwrap();
        assert!(value.is_choice);
        assert!(value.types.contains(&"Quantity".to_string()));
    }

    #[rstest]
    #[case(FhirVersion::R4B, "period", true)]
    #[case(FhirVersion::R4B, "actualPeriod", false)]
    #[case(FhirVersion::R5, "period", false)]
    #[case(FhirVersion::R5, "actualPeriod", true)]
    fn test_version_specific_elements(
        #[case] version: FhirVersion,
        #[case] element: &str,
        #[case] present: bool,
    ) {
        let model = BuiltinModelProvider::new(version);
        assert_eq!(model.element_info("Encounter", element).is_some(), present);
    }

    #[test]
    fn test_type_hierarchy() {
        let model = BuiltinModelProvider::new(FhirVersion::R5);
        assert!(model.is_resource_type("Patient"));
        assert!(!model.is_resource_type("HumanName"));
        assert!(model.is_subtype_of("Patient", "Resource"));
        assert!(model.is_subtype_of("Age", "Quantity"));
        assert!(!model.is_subtype_of("Bundle", "DomainResource"));
        assert_eq!(model.display_type_name("Patient.contact"), "BackboneElement");
    }
}
