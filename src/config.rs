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

//! Configuration for the FHIRPath Lab evaluator

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Terminology server used when a request does not name one
pub const DEFAULT_TERMINOLOGY_SERVER: &str = "https://sqlonfhir-r4.azurewebsites.net/fhir";

/// Environment variable overriding [`DEFAULT_TERMINOLOGY_SERVER`]
pub const TERMINOLOGY_SERVER_ENV: &str = "FHIRPATH_LAB_TERMINOLOGY_SERVER";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Unsupported FHIR version label
    #[error("Invalid FHIR version: {version}")]
    InvalidFhirVersion {
        /// The rejected label
        version: String,
    },
}

/// FHIR versions the evaluator can be parameterized with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FhirVersion {
    /// FHIR 4.3.0
    #[default]
    R4B,
    /// FHIR 5.0.0
    R5,
}

impl FhirVersion {
    /// Get all supported FHIR versions
    pub fn all() -> &'static [FhirVersion] {
        &[FhirVersion::R4B, FhirVersion::R5]
    }

    /// Get the version as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            FhirVersion::R4B => "R4B",
            FhirVersion::R5 => "R5",
        }
    }

    /// Published FHIR release number
    pub fn release(&self) -> &'static str {
        match self {
            FhirVersion::R4B => "4.3.0",
            FhirVersion::R5 => "5.0.0",
        }
    }

    /// Name of the operation serving this version
    pub fn operation_name(&self) -> &'static str {
        match self {
            FhirVersion::R4B => "$fhirpath",
            FhirVersion::R5 => "$fhirpath-r5",
        }
    }

    /// Resolve the version from an operation path segment
    pub fn from_operation(segment: &str) -> Option<FhirVersion> {
        let segment = segment.trim_start_matches('/');
        Self::all()
            .iter()
            .copied()
            .find(|version| version.operation_name() == segment)
    }
}

impl FromStr for FhirVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "r4b" | "4.3" | "4.3.0" => Ok(FhirVersion::R4B),
            "r5" | "5.0" | "5.0.0" => Ok(FhirVersion::R5),
            _ => Err(ConfigError::InvalidFhirVersion {
                version: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluator-wide settings shared by every request
#[derive(Debug, Clone, PartialEq)]
pub struct LabConfig {
    /// Name reported in the `evaluator` output part
    pub evaluator_name: String,
    /// Terminology server used when a request does not name one
    pub default_terminology_server: String,
    /// Timeout for remote document and terminology calls
    pub remote_timeout: Duration,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            evaluator_name: format!("octofhir-fhirpath-lab-{}", env!("CARGO_PKG_VERSION")),
            default_terminology_server: DEFAULT_TERMINOLOGY_SERVER.to_string(),
            remote_timeout: Duration::from_secs(30),
        }
    }
}

impl LabConfig {
    /// Start a builder from defaults
    pub fn builder() -> LabConfigBuilder {
        LabConfigBuilder::default()
    }

    /// Defaults, with the terminology server taken from the environment when set
    pub fn from_env() -> Self {
        let mut builder = Self::builder();
        if let Ok(server) = std::env::var(TERMINOLOGY_SERVER_ENV)
            && !server.trim().is_empty()
        {
            builder = builder.default_terminology_server(server.trim());
        }
        builder.build()
    }

    /// Evaluator label for a version, e.g. `octofhir-fhirpath-lab-0.1.0 (R4B)`
    pub fn evaluator_label(&self, version: FhirVersion) -> String {
        format!("{} ({})", self.evaluator_name, version)
    }
}

/// Builder for [`LabConfig`]
#[derive(Debug, Default)]
pub struct LabConfigBuilder {
    config: LabConfig,
}

impl LabConfigBuilder {
    /// Set the evaluator name
    pub fn evaluator_name(mut self, name: impl Into<String>) -> Self {
        self.config.evaluator_name = name.into();
        self
    }

    /// Set the fallback terminology server
    pub fn default_terminology_server(mut self, url: impl Into<String>) -> Self {
        self.config.default_terminology_server = url.into();
        self
    }

    /// Set the timeout for remote calls
    pub fn remote_timeout(mut self, timeout: Duration) -> Self {
        self.config.remote_timeout = timeout;
        self
    }

    /// Finish building
    pub fn build(self) -> LabConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_from_str() {
        assert_eq!("r4b".parse::<FhirVersion>().unwrap(), FhirVersion::R4B);
        assert_eq!("R5".parse::<FhirVersion>().unwrap(), FhirVersion::R5);
        assert_eq!("5.0.0".parse::<FhirVersion>().unwrap(), FhirVersion::R5);
        assert!("r3".parse::<FhirVersion>().is_err());
    }

    #[test]
    fn test_version_from_operation() {
        assert_eq!(FhirVersion::from_operation("$fhirpath"), Some(FhirVersion::R4B));
        assert_eq!(FhirVersion::from_operation("/$fhirpath-r5"), Some(FhirVersion::R5));
        assert_eq!(FhirVersion::from_operation("$fhirpath-r6"), None);
    }

    #[test]
    fn test_builder_and_label() {
        let config = LabConfig::builder()
            .evaluator_name("lab")
            .default_terminology_server("http://tx.example.org/fhir")
            .build();
        assert_eq!(config.evaluator_label(FhirVersion::R5), "lab (R5)");
        assert_eq!(config.default_terminology_server, "http://tx.example.org/fhir");
    }
}
