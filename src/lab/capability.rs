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

//! CapabilityStatement served at `/metadata`

use crate::config::{FhirVersion, LabConfig};
use serde_json::{Value, json};

/// Definition URL of the `fhirpath` operation
pub const OPERATION_DEFINITION: &str = "http://fhirpath-lab.org/OperationDefinition/fhirpath";

/// Capability statement; `version` is the version reported as `fhirVersion`,
/// the operations of every supported version are listed
pub fn capability_statement(config: &LabConfig, version: FhirVersion) -> Value {
    let operations: Vec<Value> = FhirVersion::all()
        .iter()
        .map(|v| {
            json!({
                "name": v.operation_name().trim_start_matches('$'),
                "definition": OPERATION_DEFINITION
            })
        })
        .collect();
    json!({
        "resourceType": "CapabilityStatement",
        "title": format!("FHIRPath Lab expression evaluator ({})", config.evaluator_name),
        "status": "active",
        "date": "2024-01-01",
        "kind": "instance",
        "fhirVersion": version.release(),
        "format": ["application/fhir+json"],
        "rest": [{
            "mode": "server",
            "security": {"cors": true},
            "operation": operations
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_capability_statement() {
        let statement = capability_statement(&LabConfig::default(), FhirVersion::R4B);
        assert_eq!(statement["status"], "active");
        assert_eq!(statement["kind"], "instance");
        assert_eq!(statement["fhirVersion"], "4.3.0");
        assert_eq!(statement["rest"][0]["security"]["cors"], true);
        assert_eq!(statement["rest"][0]["operation"][0]["name"], "fhirpath");
        assert_eq!(
            statement["rest"][0]["operation"][0]["definition"],
            OPERATION_DEFINITION
        );
        assert_eq!(statement["rest"][0]["operation"][1]["name"], "fhirpath-r5");
    }
}
