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


//! FHIRPath Lab request handling
//!
//! A request (`Parameters` or query pairs) is loaded into a [`LabRequest`],
//! run by an [`ExpressionEvaluator`] for one FHIR version and answered with
//! a [`LabResponse`]: result `Parameters` or an `OperationOutcome`.

pub mod canonical;
pub mod capability;
pub mod error;
pub mod parameters;
pub mod request;
pub mod resolver;
pub mod result_tree;
pub mod terminology;
pub mod tester;
pub mod variables;

pub use canonical::CanonicalUrl;
pub use capability::capability_statement;
pub use error::LabError;
pub use parameters::{
    IssueSeverity, IssueType, OperationOutcome, OperationOutcomeIssue, Parameters,
    ParametersParameter, TypedValue,
};
pub use request::LabRequest;
pub use resolver::{DocumentFetcher, HttpDocumentFetcher, ReferenceResolver};
pub use result_tree::OutputValue;
pub use terminology::{HttpTerminologyService, TerminologyClient, TerminologyService};
pub use tester::{ExpressionEvaluator, LabResponse, Stage};
pub use variables::VariableBinder;
