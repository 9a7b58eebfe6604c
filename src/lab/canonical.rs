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

//! Canonical URLs with an optional `|version` suffix

use std::fmt;

/// A canonical reference such as `http://hl7.org/fhir/ValueSet/example|4.0.1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUrl {
    url: String,
    version: Option<String>,
}

impl CanonicalUrl {
    /// Split on the first `|`
    pub fn parse(canonical: &str) -> Self {
        match canonical.split_once('|') {
            Some((url, version)) => Self {
                url: url.to_string(),
                version: Some(version.to_string()),
            },
            None => Self {
                url: canonical.to_string(),
                version: None,
            },
        }
    }

    /// URL part
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Version part; `None` when absent or empty
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref().filter(|v| !v.is_empty())
    }

    /// Recombined canonical, `url|version` only when a version is present
    pub fn value(&self) -> String {
        match self.version() {
            Some(version) => format!("{}|{}", self.url, version),
            None => self.url.clone(),
        }
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://x|2.0", "http://x", Some("2.0"), "http://x|2.0")]
    #[case("http://x", "http://x", None, "http://x")]
    #[case("http://x|", "http://x", None, "http://x")]
    #[case("http://x|1|2", "http://x", Some("1|2"), "http://x|1|2")]
    fn test_parse(
        #[case] input: &str,
        #[case] url: &str,
        #[case] version: Option<&str>,
        #[case] value: &str,
    ) {
        let canonical = CanonicalUrl::parse(input);
        assert_eq!(canonical.url(), url);
        assert_eq!(canonical.version(), version);
        assert_eq!(canonical.value(), value);
    }
}
