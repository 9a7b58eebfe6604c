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

//! Request-scoped evaluation state
//!
//! A [`RequestContext`] is built fresh for every request and handed to the
//! evaluator next to the [`SymbolTable`](super::SymbolTable). It owns the
//! trace log and borrows the request's reference resolver and terminology
//! client, so nothing request-local is ever captured inside shared state.

use crate::error::Result;
use crate::model::{Collection, ElementNode, FhirPathValue};
use serde_json::Value;
use std::cell::RefCell;

/// One `trace()` emission
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    /// Name given as the first `trace()` argument
    pub name: String,
    /// Traced values
    pub values: Collection,
}

/// Resolves reference strings to document nodes
pub trait ReferenceLookup {
    /// Resolve a reference; `None` when it cannot be resolved
    fn resolve(&self, reference: &str) -> Option<ElementNode>;
}

/// Terminology operations exposed through `%terminologies`
pub trait TerminologyLookup {
    /// Base URL of the terminology server
    fn server(&self) -> &str;

    /// `ValueSet/$expand` for a canonical (`url|version`)
    fn expand(&self, canonical: &str, options: Option<&str>) -> Result<Option<Value>>;

    /// `CodeSystem/$lookup` for a code or coding
    fn lookup(&self, coded: &FhirPathValue, options: Option<&str>) -> Result<Option<Value>>;
}

/// Per-request state shared by every execution of one request
#[derive(Default)]
pub struct RequestContext<'r> {
    trace: RefCell<Vec<TraceEntry>>,
    resolver: Option<&'r dyn ReferenceLookup>,
    terminology: Option<&'r dyn TerminologyLookup>,
}

impl<'r> RequestContext<'r> {
    /// Context with no resolver and no terminology client
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a reference resolver
    pub fn with_resolver(mut self, resolver: &'r dyn ReferenceLookup) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Attach a terminology client
    pub fn with_terminology(mut self, terminology: &'r dyn TerminologyLookup) -> Self {
        self.terminology = Some(terminology);
        self
    }

    /// Reference resolver, if any
    pub fn resolver(&self) -> Option<&'r dyn ReferenceLookup> {
        self.resolver
    }

    /// Terminology client, if any
    pub fn terminology(&self) -> Option<&'r dyn TerminologyLookup> {
        self.terminology
    }

    /// Record a trace emission
    pub fn record_trace(&self, name: impl Into<String>, values: Collection) {
        self.trace.borrow_mut().push(TraceEntry {
            name: name.into(),
            values,
        });
    }

    /// Drop all recorded traces; called before each context execution
    pub fn clear_trace(&self) {
        self.trace.borrow_mut().clear();
    }

    /// Take the recorded traces, leaving the log empty
    pub fn take_trace(&self) -> Vec<TraceEntry> {
        std::mem::take(&mut *self.trace.borrow_mut())
    }
}

impl std::fmt::Debug for RequestContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("trace", &self.trace.borrow().len())
            .field("resolver", &self.resolver.is_some())
            .field("terminology", &self.terminology.map(|t| t.server().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_log_clears() {
        let request = RequestContext::new();
        request.record_trace("a", Collection::single(FhirPathValue::Integer(1)));
        request.record_trace("b", Collection::new());
        request.clear_trace();
        assert!(request.take_trace().is_empty());

        request.record_trace("c", Collection::new());
        let entries = request.take_trace();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "c");
        assert!(request.take_trace().is_empty());
    }
}
