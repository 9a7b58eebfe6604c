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

//! Reference resolution for `resolve()`
//!
//! References are looked up, in order, in the request cache, on a remote
//! server (absolute `http:`/`https:` URLs), in the input's `contained`
//! resources (`#id`) and in the entries of an input `Bundle`. Remote
//! failures never abort evaluation: they become warnings that the pipeline
//! reports next to the results.

use crate::error::{FhirPathError, Result};
use crate::evaluator::ReferenceLookup;
use crate::model::ElementNode;
use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::cell::RefCell;
use std::time::Duration;

/// Resource types that cannot carry `contained` resources
const NO_CONTAINED: &[&str] = &["Bundle", "Parameters", "Binary"];

/// Fetches a FHIR document from an absolute URL
pub trait DocumentFetcher {
    /// Fetch and decode the JSON document at `url`
    fn fetch(&self, url: &str) -> Result<Value>;
}

/// [`DocumentFetcher`] over blocking HTTP
///
/// The client is built on first use, so the fetcher can be created on an
/// async thread and used from a blocking one.
#[derive(Debug)]
pub struct HttpDocumentFetcher {
    timeout: Duration,
    client: OnceCell<Client>,
}

impl HttpDocumentFetcher {
    /// Fetcher with a request timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client: OnceCell::new(),
        }
    }

    fn client(&self) -> reqwest::Result<&Client> {
        self.client
            .get_or_try_init(|| Client::builder().timeout(self.timeout).build())
    }
}

impl DocumentFetcher for HttpDocumentFetcher {
    fn fetch(&self, url: &str) -> Result<Value> {
        let fetch_error = |err: reqwest::Error| FhirPathError::FetchError {
            reference: url.to_string(),
            message: err.to_string(),
        };
        log::debug!("fetching {url}");
        self.client()
            .map_err(fetch_error)?
            .get(url)
            .header(ACCEPT, "application/fhir+json")
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.json::<Value>())
            .map_err(fetch_error)
    }
}

/// Per-request reference resolver
pub struct ReferenceResolver<'f> {
    root: Option<ElementNode>,
    fetcher: Option<&'f dyn DocumentFetcher>,
    cache: RefCell<FxHashMap<String, Option<ElementNode>>>,
    warnings: RefCell<Vec<String>>,
}

impl<'f> ReferenceResolver<'f> {
    /// Resolver over the request's input resource
    pub fn new(root: Option<ElementNode>) -> Self {
        Self {
            root,
            fetcher: None,
            cache: RefCell::new(FxHashMap::default()),
            warnings: RefCell::new(Vec::new()),
        }
    }

    /// Enable remote fetches
    pub fn with_fetcher(mut self, fetcher: &'f dyn DocumentFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Take the warnings recorded since the last call
    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.warnings.borrow_mut())
    }

    fn remember(&self, reference: &str, node: Option<ElementNode>) -> Option<ElementNode> {
        self.cache
            .borrow_mut()
            .insert(reference.to_string(), node.clone());
        node
    }

    fn fetch_remote(&self, reference: &str) -> Option<ElementNode> {
        let fetcher = self.fetcher?;
        match fetcher.fetch(reference) {
            Ok(json) => self.remember(reference, Some(ElementNode::resource(json))),
            Err(err) => {
                let message = match err {
                    FhirPathError::FetchError { message, .. } => message,
                    other => other.to_string(),
                };
                let warning = format!("Resource '{reference}' unable to be resolved: {message}");
                log::warn!("{warning}");
                self.warnings.borrow_mut().push(warning);
                self.remember(reference, None)
            }
        }
    }

    fn find_contained(&self, id: &str) -> Option<Value> {
        let root = self.root.as_ref()?;
        if NO_CONTAINED.contains(&root.resource_type()?) {
            return None;
        }
        root.json()
            .get("contained")?
            .as_array()?
            .iter()
            .find(|resource| resource.get("id").and_then(Value::as_str) == Some(id))
            .cloned()
    }

    fn find_in_bundle(&self, reference: &str) -> Option<Value> {
        let root = self.root.as_ref()?;
        if root.resource_type() != Some("Bundle") {
            return None;
        }
        root.json()
            .get("entry")?
            .as_array()?
            .iter()
            .find(|entry| {
                if entry.get("fullUrl").and_then(Value::as_str) == Some(reference) {
                    return true;
                }
                let Some(resource) = entry.get("resource") else {
                    return false;
                };
                match (
                    resource.get("resourceType").and_then(Value::as_str),
                    resource.get("id").and_then(Value::as_str),
                ) {
                    (Some(resource_type), Some(id)) => {
                        reference == format!("{resource_type}/{id}")
                    }
                    _ => false,
                }
            })
            .and_then(|entry| entry.get("resource").cloned())
    }
}

impl ReferenceLookup for ReferenceResolver<'_> {
    fn resolve(&self, reference: &str) -> Option<ElementNode> {
        if let Some(cached) = self.cache.borrow().get(reference) {
            return cached.clone();
        }
        if reference.starts_with("http:") || reference.starts_with("https:") {
            return self.fetch_remote(reference);
        }
        if let Some(id) = reference.strip_prefix('#')
            && let Some(json) = self.find_contained(id)
        {
            return self.remember(reference, Some(ElementNode::resource(json)));
        }
        if let Some(json) = self.find_in_bundle(reference) {
            return self.remember(reference, Some(ElementNode::resource(json)));
        }
        None
    }
}

impl std::fmt::Debug for ReferenceResolver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceResolver")
            .field("root", &self.root.as_ref().map(ElementNode::location))
            .field("cached", &self.cache.borrow().len())
            .field("warnings", &self.warnings.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::Cell;

    struct CountingFetcher {
        calls: Cell<usize>,
        fail: bool,
    }

    impl DocumentFetcher for CountingFetcher {
        fn fetch(&self, url: &str) -> Result<Value> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                Err(FhirPathError::FetchError {
                    reference: url.to_string(),
                    message: "404 Not Found".to_string(),
                })
            } else {
                Ok(json!({"resourceType": "Practitioner", "id": "p1"}))
            }
        }
    }

    #[test]
    fn test_remote_fetch_is_cached() {
        let fetcher = CountingFetcher {
            calls: Cell::new(0),
            fail: false,
        };
        let resolver = ReferenceResolver::new(None).with_fetcher(&fetcher);
        let first = resolver.resolve("http://example.org/fhir/Practitioner/p1");
        let second = resolver.resolve("http://example.org/fhir/Practitioner/p1");
        assert_eq!(fetcher.calls.get(), 1);
        assert_eq!(first.unwrap().location(), "Practitioner");
        assert!(second.is_some());
    }

    #[test]
    fn test_remote_failure_is_a_warning() {
        let fetcher = CountingFetcher {
            calls: Cell::new(0),
            fail: true,
        };
        let resolver = ReferenceResolver::new(None).with_fetcher(&fetcher);
        assert!(resolver.resolve("https://example.org/Patient/x").is_none());
        assert!(resolver.resolve("https://example.org/Patient/x").is_none());
        assert_eq!(fetcher.calls.get(), 1);
        assert_eq!(
            resolver.take_warnings(),
            vec!["Resource 'https://example.org/Patient/x' unable to be resolved: 404 Not Found"]
        );
        assert!(resolver.take_warnings().is_empty());
    }

    #[test]
    fn test_contained_lookup() {
        let root = ElementNode::resource(json!({
            "resourceType": "Observation",
            "contained": [{"resourceType": "Patient", "id": "p"}],
            "subject": {"reference": "#p"}
        }));
        let resolver = ReferenceResolver::new(Some(root));
        let patient = resolver.resolve("#p").unwrap();
        assert_eq!(patient.resource_type(), Some("Patient"));
        assert!(resolver.resolve("#missing").is_none());
    }

    #[test]
    fn test_bundle_does_not_support_contained() {
        let root = ElementNode::resource(json!({
            "resourceType": "Bundle",
            "contained": [{"resourceType": "Patient", "id": "p"}]
        }));
        assert!(ReferenceResolver::new(Some(root)).resolve("#p").is_none());
    }

    #[test]
    fn test_bundle_entries() {
        let root = ElementNode::resource(json!({
            "resourceType": "Bundle",
            "type": "collection",
            "entry": [
                {"fullUrl": "urn:uuid:1", "resource": {"resourceType": "Patient", "id": "a"}},
                {"resource": {"resourceType": "Practitioner", "id": "b"}}
            ]
        }));
        let resolver = ReferenceResolver::new(Some(root));
        assert_eq!(
            resolver.resolve("urn:uuid:1").unwrap().resource_type(),
            Some("Patient")
        );
        assert_eq!(
            resolver.resolve("Practitioner/b").unwrap().resource_type(),
            Some("Practitioner")
        );
        assert!(resolver.resolve("Patient/zzz").is_none());
    }
}
