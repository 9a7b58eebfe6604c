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

//! FHIRPath engine - a small entry point for one-off evaluation

use crate::compiler::CompiledExpression;
use crate::config::FhirVersion;
use crate::error::Result;
use crate::evaluator::{Evaluator, RequestContext, SymbolTable};
use crate::model::{BuiltinModelProvider, Collection, ElementNode, FhirPathValue};
use crate::registry::FunctionRegistry;
use serde_json::Value;
use std::sync::Arc;

/// Evaluates expressions against plain JSON resources
///
/// No resolver and no terminology client are attached; use
/// [`crate::lab::ExpressionEvaluator`] for the full request pipeline.
#[derive(Debug, Clone)]
pub struct FhirPathEngine {
    functions: Arc<FunctionRegistry>,
    model: BuiltinModelProvider,
}

impl Default for FhirPathEngine {
    fn default() -> Self {
        Self::new(FhirVersion::default())
    }
}

impl FhirPathEngine {
    /// Engine with the lab function registry for a FHIR version
    pub fn new(version: FhirVersion) -> Self {
        Self::with_registry(version, Arc::new(FunctionRegistry::lab()))
    }

    /// Engine over an existing registry
    pub fn with_registry(version: FhirVersion, functions: Arc<FunctionRegistry>) -> Self {
        Self {
            functions,
            model: BuiltinModelProvider::new(version),
        }
    }

    /// Evaluate `expression` against an optional resource
    pub fn evaluate(&self, expression: &str, resource: Option<Value>) -> Result<Collection> {
        let symbols = SymbolTable::new(self.functions.clone());
        let compiled = CompiledExpression::compile(expression, &symbols)?;
        let request = RequestContext::new();
        let root = resource.map(|json| FhirPathValue::Element(ElementNode::resource(json)));
        let evaluator = Evaluator::new(&symbols, &request, &self.model)
            .with_root(root.clone())
            .with_context(root);
        compiled.execute(&evaluator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn patient() -> Value {
        json!({
            "resourceType": "Patient",
            "id": "example",
            "active": true,
            "name": [
                {"use": "official", "family": "Chalmers", "given": ["Peter", "James"]},
                {"use": "usual", "given": ["Jim"]}
            ],
            "telecom": [{"system": "phone", "value": "(03) 5555 6473", "use": "work"}],
            "birthDate": "1974-12-25"
        })
    }

    fn strings(values: &Collection) -> Vec<String> {
        values.iter().filter_map(FhirPathValue::as_string).collect()
    }

    #[test]
    fn test_navigation_and_functions() {
        let engine = FhirPathEngine::default();
        let given = engine
            .evaluate("Patient.name.where(use = 'official').given", Some(patient()))
            .unwrap();
        assert_eq!(strings(&given), vec!["Peter", "James"]);

        let count = engine.evaluate("name.given.count()", Some(patient())).unwrap();
        assert_eq!(count.as_single(), Some(&FhirPathValue::Integer(3)));

        let joined = engine
            .evaluate("name.first().given.join(' ') & ' ' & name.first().family", Some(patient()))
            .unwrap();
        assert_eq!(strings(&joined), vec!["Peter James Chalmers"]);
    }

    #[test]
    fn test_dates_and_iif() {
        let engine = FhirPathEngine::default();
        let result = engine
            .evaluate(
                "iif(birthDate < @1980-01-01, 'before', 'after')",
                Some(patient()),
            )
            .unwrap();
        assert_eq!(strings(&result), vec!["before"]);
    }

    #[test]
    fn test_missing_resource() {
        let engine = FhirPathEngine::default();
        assert_eq!(
            engine.evaluate("1 + 1", None).unwrap().as_single(),
            Some(&FhirPathValue::Integer(2))
        );
        let err = engine.evaluate("name.given", None).unwrap_err();
        assert!(err.is_resource_required());
    }

    #[test]
    fn test_node_metadata_functions() {
        let engine = FhirPathEngine::default();
        let paths = engine
            .evaluate("name[0].given.pathname()", Some(patient()))
            .unwrap();
        assert_eq!(
            strings(&paths),
            vec!["Patient.name[0].given[0]", "Patient.name[0].given[1]"]
        );
        let short = engine
            .evaluate("birthDate.shortpathname()", Some(patient()))
            .unwrap();
        assert_eq!(strings(&short), vec!["Patient.birthDate"]);
        let names = engine
            .evaluate("telecom.children().propname()", Some(patient()))
            .unwrap();
        assert_eq!(strings(&names), vec!["system", "value", "use"]);
    }

    #[test]
    fn test_abs_overflow_is_empty() {
        let engine = FhirPathEngine::default();
        assert_eq!(
            engine.evaluate("(-5).abs()", None).unwrap().as_single(),
            Some(&FhirPathValue::Integer(5))
        );
        assert!(
            engine
                .evaluate("(-9223372036854775807 - 1).abs()", None)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_split() {
        let engine = FhirPathEngine::default();
        let parts = engine.evaluate("'a,b'.split(',')", None).unwrap();
        assert_eq!(strings(&parts), vec!["a", "b"]);
        let chars = engine.evaluate("'a,b'.split('')", None).unwrap();
        assert_eq!(strings(&chars), vec!["a", ",", "b"]);
    }

    #[test]
    fn test_type_operators() {
        let engine = FhirPathEngine::default();
        let result = engine
            .evaluate("name.ofType(HumanName).count() = 2 and birthDate is date", Some(patient()))
            .unwrap();
        assert_eq!(result.as_single(), Some(&FhirPathValue::Boolean(true)));
    }
}
