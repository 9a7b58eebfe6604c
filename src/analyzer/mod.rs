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

//! Static analysis for FHIRPath expressions
//!
//! Type inference plus the debug tree produced for validation requests.

pub mod debug_tree;
pub mod type_analyzer;

pub use debug_tree::{DebugTreeBuilder, DebugTreeNode, ExpressionKind, NodeId};
pub use type_analyzer::{AnalysisIssue, InferredType, IssueLevel, TypeAnalysis, TypeAnalyzer};
