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

//! Type analysis for FHIRPath expressions
//!
//! The analyzer walks a parsed expression without data, inferring the type
//! each node produces from the model provider and the function registry.
//! While walking it records a [`DebugTreeNode`] for every node, so one pass
//! yields the expected return type, the debug tree and any issues found.

use super::debug_tree::{DebugTreeBuilder, DebugTreeNode, ExpressionKind};
use crate::ast::{BinaryOperator, ExpressionNode, LiteralValue, UnaryOperator, Visitor};
use crate::evaluator::SymbolTable;
use crate::model::node::choice_suffix;
use crate::model::{FhirPathValue, ModelProvider, is_primitive_type, strip_namespace};
use crate::registry::ReturnType;
use std::fmt;

/// Functions whose first argument is evaluated once per focus item
const ITERATING_FUNCTIONS: &[&str] = &["where", "select", "exists", "all", "repeat"];

/// Inferred type of an expression node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferredType {
    /// Candidate type names, empty when unknown
    pub types: Vec<String>,
    /// Whether more than one item may be produced
    pub is_collection: bool,
}

impl InferredType {
    /// Unknown type
    pub fn unknown() -> Self {
        Self::default()
    }

    /// One item of a type
    pub fn single(type_name: impl Into<String>) -> Self {
        Self {
            types: vec![type_name.into()],
            is_collection: false,
        }
    }

    /// Any number of items of a type
    pub fn many(type_name: impl Into<String>) -> Self {
        Self {
            types: vec![type_name.into()],
            is_collection: true,
        }
    }

    /// Whether nothing is known about the type
    pub fn is_unknown(&self) -> bool {
        self.types.is_empty()
    }

    /// Same types with the collection flag replaced
    pub fn with_collection(mut self, is_collection: bool) -> Self {
        self.is_collection = is_collection;
        self
    }

    /// Union of two inferred types
    pub fn merge(&self, other: &InferredType) -> InferredType {
        let mut types = self.types.clone();
        for name in &other.types {
            if !types.contains(name) {
                types.push(name.clone());
            }
        }
        InferredType {
            types,
            is_collection: self.is_collection || other.is_collection,
        }
    }

    fn contains(&self, type_name: &str) -> bool {
        self.types.iter().any(|t| t == type_name)
    }

    /// Render with user-facing type names (`BackboneElement` for backbone paths)
    pub fn describe(&self, model: &dyn ModelProvider) -> String {
        let mut names: Vec<&str> = Vec::with_capacity(self.types.len());
        for name in &self.types {
            let shown = model.display_type_name(name);
            if !names.contains(&shown) {
                names.push(shown);
            }
        }
        let mut out = names.join(" | ");
        if self.is_collection && !out.is_empty() {
            out.push_str("[]");
        }
        out
    }
}

impl fmt::Display for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.types.join(" | "))?;
        if self.is_collection && !self.types.is_empty() {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

/// Severity of an analysis issue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    /// The expression cannot work as written
    Error,
    /// The expression is suspicious but may still run
    Warning,
}

/// Problem found while analyzing an expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisIssue {
    /// Severity
    pub level: IssueLevel,
    /// Human-readable description
    pub message: String,
}

/// Result of analyzing one expression
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnalysis {
    /// Inferred type of the whole expression
    pub return_type: InferredType,
    /// Rendered return type, with user-facing names
    pub return_type_text: String,
    /// Issues found while walking
    pub issues: Vec<AnalysisIssue>,
    /// Debug tree of the expression
    pub tree: Option<DebugTreeNode>,
}

impl TypeAnalysis {
    /// Indented text form of the debug tree
    pub fn dump(&self) -> String {
        self.tree.as_ref().map(DebugTreeNode::dump).unwrap_or_default()
    }
}

/// Static type analyzer
pub struct TypeAnalyzer<'a> {
    model: &'a dyn ModelProvider,
    symbols: &'a SymbolTable,
    /// Type of the evaluation input (`%context`)
    input: InferredType,
    /// Type of the root resource (`%resource`)
    resource: InferredType,
    /// Type identifiers are resolved against
    focus: InferredType,
    issues: Vec<AnalysisIssue>,
    tree: DebugTreeBuilder,
}

impl<'a> TypeAnalyzer<'a> {
    /// Analyzer for expressions evaluated against `input`
    pub fn new(
        model: &'a dyn ModelProvider,
        symbols: &'a SymbolTable,
        input: InferredType,
    ) -> Self {
        Self {
            model,
            symbols,
            resource: input.clone(),
            focus: input.clone(),
            input,
            issues: Vec::new(),
            tree: DebugTreeBuilder::new(),
        }
    }

    /// Set the root resource type when it differs from the input
    pub fn with_resource(mut self, resource: InferredType) -> Self {
        self.resource = resource;
        self
    }

    /// Walk `expr` and collect the analysis
    pub fn analyze(mut self, expr: &ExpressionNode) -> TypeAnalysis {
        let return_type = self.visit_expression(expr);
        log::debug!(
            "analyzed '{expr}': {} ({} issues)",
            return_type,
            self.issues.len()
        );
        TypeAnalysis {
            return_type_text: return_type.describe(self.model),
            return_type,
            issues: self.issues,
            tree: self.tree.finish(),
        }
    }

    fn describe(&self, inferred: &InferredType) -> String {
        inferred.describe(self.model)
    }

    fn warn(&mut self, message: String) {
        self.issues.push(AnalysisIssue {
            level: IssueLevel::Warning,
            message,
        });
    }

    fn error(&mut self, message: String) {
        self.issues.push(AnalysisIssue {
            level: IssueLevel::Error,
            message,
        });
    }

    /// Type of `name` navigated from `parent`
    fn child_type(&mut self, parent: &InferredType, name: &str) -> InferredType {
        if parent.is_unknown() {
            return InferredType::unknown();
        }
        let mut result = InferredType {
            types: Vec::new(),
            is_collection: parent.is_collection,
        };
        let mut searched = false;
        for type_name in &parent.types {
            if is_primitive_type(type_name) && name != "extension" && name != "id" {
                continue;
            }
            searched = true;
            if let Some(found) = self.element_type(type_name, name) {
                result = result.merge(&found);
            }
        }
        if result.is_unknown() && searched {
            let parent_text = self.describe(&parent.clone().with_collection(false));
            self.warn(format!("prop '{name}' not found on {parent_text}"));
        }
        result
    }

    fn element_type(&self, type_name: &str, name: &str) -> Option<InferredType> {
        if let Some(info) = self.model.element_info(type_name, name) {
            return Some(InferredType {
                types: info.types,
                is_collection: info.is_collection,
            });
        }
        // valueQuantity style access to a choice element
        for (i, byte) in name.bytes().enumerate().skip(1) {
            if !byte.is_ascii_uppercase() {
                continue;
            }
            let (element, suffix) = name.split_at(i);
            if let Some(info) = self.model.element_info(type_name, element)
                && info.is_choice
            {
                return info
                    .types
                    .into_iter()
                    .find(|t| choice_suffix(t) == suffix)
                    .map(InferredType::single);
            }
        }
        None
    }

    fn literal_type(literal: &LiteralValue) -> InferredType {
        match literal {
            LiteralValue::Boolean(_) => InferredType::single("boolean"),
            LiteralValue::Integer(_) => InferredType::single("integer"),
            LiteralValue::Decimal(_) => InferredType::single("decimal"),
            LiteralValue::String(_) => InferredType::single("string"),
            LiteralValue::Date(_) => InferredType::single("date"),
            LiteralValue::DateTime(_) => InferredType::single("dateTime"),
            LiteralValue::Time(_) => InferredType::single("time"),
            LiteralValue::Quantity { .. } => InferredType::single("Quantity"),
            LiteralValue::Null => InferredType::unknown(),
        }
    }

    fn arithmetic_type(
        op: BinaryOperator,
        left: &InferredType,
        right: &InferredType,
    ) -> InferredType {
        let either = |name: &str| left.contains(name) || right.contains(name);
        let result = if left.contains("date") || left.contains("dateTime") || left.contains("time")
        {
            left.types.first().cloned()
        } else if either("Quantity") {
            Some("Quantity".to_string())
        } else if op == BinaryOperator::Add && left.contains("string") && right.contains("string") {
            Some("string".to_string())
        } else if op == BinaryOperator::Divide {
            Some("decimal".to_string())
        } else if op == BinaryOperator::IntegerDivide {
            Some("integer".to_string())
        } else if either("decimal") {
            Some("decimal".to_string())
        } else if left.contains("integer") || left.contains("positiveInt") {
            Some("integer".to_string())
        } else {
            None
        };
        result.map(InferredType::single).unwrap_or_default()
    }

    /// Analyze a call on `base_type`; the node for the call is already open
    fn analyze_call(
        &mut self,
        name: &str,
        base_type: &InferredType,
        args: &[ExpressionNode],
    ) -> InferredType {
        let signature = self.symbols.functions().signature(name).cloned();
        let Some(signature) = signature else {
            self.error(format!("Unknown function '{name}'"));
            for arg in args {
                self.visit_expression(arg);
            }
            return InferredType::unknown();
        };
        if !signature.accepts(args.len()) {
            self.error(format!(
                "Function '{name}' expects {} arguments, got {}",
                signature.arity_text(),
                args.len()
            ));
        }

        let mut arg_types = Vec::with_capacity(args.len());
        for (position, arg) in args.iter().enumerate() {
            let iterates = (ITERATING_FUNCTIONS.contains(&name) && position == 0)
                || (name == "trace" && position == 1);
            let focus = if iterates {
                base_type.clone().with_collection(false)
            } else {
                self.input.clone()
            };
            let saved = std::mem::replace(&mut self.focus, focus);
            let arg_type = self.visit_expression(arg);
            self.focus = saved;
            arg_types.push(arg_type);
        }

        match signature.returns {
            ReturnType::Single(type_name) => InferredType::single(type_name),
            ReturnType::Many(type_name) => InferredType::many(type_name),
            ReturnType::Focus => base_type.clone(),
            ReturnType::FocusSingle => base_type.clone().with_collection(false),
            ReturnType::Argument(index) => {
                let arg_type = arg_types.get(index).cloned().unwrap_or_default();
                if name == "iif" {
                    let otherwise = arg_types.get(2).cloned().unwrap_or_default();
                    arg_type.merge(&otherwise)
                } else {
                    let is_collection = arg_type.is_collection || base_type.is_collection;
                    arg_type.with_collection(is_collection)
                }
            }
            ReturnType::TypeArgument => {
                match args.first().and_then(ExpressionNode::as_type_specifier) {
                    Some(type_name) => {
                        self.check_type_name(&type_name);
                        InferredType::single(strip_namespace(&type_name))
                            .with_collection(base_type.is_collection)
                    }
                    None => InferredType::unknown(),
                }
            }
            ReturnType::Any => InferredType::unknown(),
        }
    }

    fn check_type_name(&mut self, type_name: &str) {
        let bare = strip_namespace(type_name);
        if !self.model.is_known_type(bare) && !is_primitive_type(&bare.to_lowercase()) {
            self.warn(format!("Unknown type '{type_name}'"));
        }
    }

    fn variable_type(&mut self, name: &str) -> InferredType {
        match name {
            "resource" | "rootResource" => self.resource.clone(),
            "context" => self.input.clone(),
            "terminologies" => InferredType::single("Terminologies"),
            "ucum" | "sct" | "loinc" => InferredType::single("string"),
            _ if name.starts_with("vs-") || name.starts_with("ext-") => {
                InferredType::single("string")
            }
            _ => match self.symbols.variable(name) {
                Some(values) => {
                    let mut inferred = InferredType::unknown();
                    for value in values {
                        inferred = inferred.merge(&InferredType::single(value_type(value)));
                    }
                    inferred.with_collection(values.len() > 1)
                }
                None => {
                    self.error(format!("Unknown variable %{name}"));
                    InferredType::unknown()
                }
            },
        }
    }

    fn type_operand(
        &mut self,
        operator: &str,
        expr: &ExpressionNode,
        type_name: &str,
    ) -> InferredType {
        let node = self
            .tree
            .begin_call(ExpressionKind::FunctionCallExpression, operator);
        let operand = self.visit_expression(expr);
        self.tree
            .leaf(ExpressionKind::ConstantExpression, type_name, "");
        self.check_type_name(type_name);
        let result = if operator == "is" {
            InferredType::single("boolean")
        } else {
            InferredType::single(strip_namespace(type_name)).with_collection(operand.is_collection)
        };
        let text = self.describe(&result);
        self.tree.end_call(node, text);
        result
    }
}

fn value_type(value: &FhirPathValue) -> String {
    match value {
        FhirPathValue::Element(node) if node.type_name().is_none() => "Object".to_string(),
        other => other.type_name().into_owned(),
    }
}

impl Visitor for TypeAnalyzer<'_> {
    type Result = InferredType;

    fn visit_literal(&mut self, literal: &LiteralValue) -> Self::Result {
        let inferred = Self::literal_type(literal);
        match literal {
            LiteralValue::Null => {
                self.tree
                    .leaf(ExpressionKind::NewNodeListInitExpression, "{}", "");
            }
            other => {
                let text = self.describe(&inferred);
                self.tree
                    .leaf(ExpressionKind::ConstantExpression, other.display_text(), text);
            }
        }
        inferred
    }

    fn visit_identifier(&mut self, name: &str) -> Self::Result {
        let node = self.tree.begin_call(ExpressionKind::ChildExpression, name);
        let focus = self.focus.clone();
        let focus_text = self.describe(&focus);
        self.tree
            .leaf(ExpressionKind::AxisExpression, "that", focus_text);

        let inferred = if self.model.is_resource_type(name)
            && (focus.is_unknown()
                || focus
                    .types
                    .iter()
                    .any(|t| self.model.is_subtype_of(t, name)))
        {
            InferredType::single(name).with_collection(focus.is_collection)
        } else {
            self.child_type(&focus, name)
        };
        let text = self.describe(&inferred);
        self.tree.end_call(node, text);
        inferred
    }

    fn visit_function_call(&mut self, name: &str, args: &[ExpressionNode]) -> Self::Result {
        let node = self
            .tree
            .begin_call(ExpressionKind::FunctionCallExpression, name);
        let base = self.focus.clone();
        let base_text = self.describe(&base);
        self.tree
            .leaf(ExpressionKind::AxisExpression, "that", base_text);
        let inferred = self.analyze_call(name, &base, args);
        let text = self.describe(&inferred);
        self.tree.end_call(node, text);
        inferred
    }

    fn visit_method_call(
        &mut self,
        base: &ExpressionNode,
        method: &str,
        args: &[ExpressionNode],
    ) -> Self::Result {
        let node = self
            .tree
            .begin_call(ExpressionKind::FunctionCallExpression, method);
        let base_type = self.visit_expression(base);
        let inferred = self.analyze_call(method, &base_type, args);
        let text = self.describe(&inferred);
        self.tree.end_call(node, text);
        inferred
    }

    fn visit_binary_op(
        &mut self,
        op: BinaryOperator,
        left: &ExpressionNode,
        right: &ExpressionNode,
    ) -> Self::Result {
        let node = self
            .tree
            .begin_call(ExpressionKind::FunctionCallExpression, op.as_str());
        let left_type = self.visit_expression(left);
        let right_type = self.visit_expression(right);
        let inferred = if op.is_boolean_result() {
            InferredType::single("boolean")
        } else if op == BinaryOperator::Union {
            left_type.merge(&right_type).with_collection(true)
        } else if op == BinaryOperator::Concatenate {
            InferredType::single("string")
        } else {
            Self::arithmetic_type(op, &left_type, &right_type)
        };
        let text = self.describe(&inferred);
        self.tree.end_call(node, text);
        inferred
    }

    fn visit_unary_op(&mut self, op: UnaryOperator, operand: &ExpressionNode) -> Self::Result {
        let node = self
            .tree
            .begin_call(ExpressionKind::FunctionCallExpression, op.as_str());
        let inferred = self.visit_expression(operand);
        let text = self.describe(&inferred);
        self.tree.end_call(node, text);
        inferred
    }

    fn visit_path(&mut self, base: &ExpressionNode, path: &str) -> Self::Result {
        let node = self.tree.begin_call(ExpressionKind::ChildExpression, path);
        let base_type = self.visit_expression(base);
        let inferred = self.child_type(&base_type, path);
        let text = self.describe(&inferred);
        self.tree.end_call(node, text);
        inferred
    }

    fn visit_index(&mut self, base: &ExpressionNode, index: &ExpressionNode) -> Self::Result {
        let node = self
            .tree
            .begin_call(ExpressionKind::FunctionCallExpression, "[]");
        let base_type = self.visit_expression(base);
        let saved = std::mem::replace(&mut self.focus, self.input.clone());
        let index_type = self.visit_expression(index);
        self.focus = saved;
        if !index_type.is_unknown() && !index_type.contains("integer") {
            let shown = self.describe(&index_type);
            self.error(format!("Index must be an integer, found {shown}"));
        }
        let inferred = base_type.with_collection(false);
        let text = self.describe(&inferred);
        self.tree.end_call(node, text);
        inferred
    }

    fn visit_type_check(&mut self, expr: &ExpressionNode, type_name: &str) -> Self::Result {
        self.type_operand("is", expr, type_name)
    }

    fn visit_type_cast(&mut self, expr: &ExpressionNode, type_name: &str) -> Self::Result {
        self.type_operand("as", expr, type_name)
    }

    fn visit_variable(&mut self, name: &str) -> Self::Result {
        let (kind, inferred) = match name {
            "this" => (
                ExpressionKind::AxisExpression,
                self.focus.clone().with_collection(false),
            ),
            "index" => (
                ExpressionKind::AxisExpression,
                InferredType::single("integer"),
            ),
            "total" => (ExpressionKind::AxisExpression, InferredType::unknown()),
            _ => (ExpressionKind::VariableRefExpression, self.variable_type(name)),
        };
        let text = self.describe(&inferred);
        self.tree.leaf(kind, name, text);
        inferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FhirVersion;
    use crate::model::{BuiltinModelProvider, Collection};
    use crate::parser::parse;
    use crate::registry::FunctionRegistry;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Arc;

    fn symbols() -> SymbolTable {
        let mut symbols = SymbolTable::new(Arc::new(FunctionRegistry::lab()));
        symbols.declare(
            "limit",
            Collection::single(FhirPathValue::Integer(2)),
        );
        symbols
    }

    fn analyze(expression: &str, input: &str) -> TypeAnalysis {
        let model = BuiltinModelProvider::new(FhirVersion::R4B);
        let symbols = symbols();
        let ast = parse(expression).unwrap();
        TypeAnalyzer::new(&model, &symbols, InferredType::single(input)).analyze(&ast)
    }

    #[rstest]
    #[case("name", "HumanName[]")]
    #[case("name.given", "string[]")]
    #[case("Patient.birthDate", "date")]
    #[case("name.first().family", "string")]
    #[case("name.given.count()", "integer")]
    #[case("contact.name", "HumanName[]")]
    #[case("contact", "BackboneElement[]")]
    #[case("name.where(use = 'official')", "HumanName[]")]
    #[case("name.select(given)", "string[]")]
    #[case("1 + 2", "integer")]
    #[case("1 / 2", "decimal")]
    #[case("'a' & 'b'", "string")]
    #[case("active and deceased.exists()", "boolean")]
    #[case("%limit", "integer")]
    #[case("name.propname()", "string[]")]
    fn test_patient_return_types(#[case] expression: &str, #[case] expected: &str) {
        let analysis = analyze(expression, "Patient");
        assert_eq!(analysis.return_type_text, expected);
        assert!(analysis.issues.is_empty(), "{:?}", analysis.issues);
    }

    #[test]
    fn test_choice_types() {
        let analysis = analyze("value.ofType(Quantity).unit", "Observation");
        assert_eq!(analysis.return_type_text, "string");

        let analysis = analyze("valueQuantity.value", "Observation");
        assert_eq!(analysis.return_type_text, "decimal");
    }

    #[test]
    fn test_unknown_property_is_warning() {
        let analysis = analyze("name.nickname", "Patient");
        assert_eq!(analysis.issues.len(), 1);
        assert_eq!(analysis.issues[0].level, IssueLevel::Warning);
        assert_eq!(analysis.issues[0].message, "prop 'nickname' not found on HumanName");
    }

    #[test]
    fn test_unknown_variable_is_error() {
        let analysis = analyze("%missing", "Patient");
        assert_eq!(analysis.issues[0].level, IssueLevel::Error);
        assert_eq!(analysis.issues[0].message, "Unknown variable %missing");
    }

    #[test]
    fn test_debug_tree_shape() {
        let analysis = analyze("name.given.count()", "Patient");
        let tree = analysis.tree.as_ref().unwrap();
        assert_eq!(
            serde_json::to_value(tree).unwrap(),
            json!({
                "ExpressionType": "FunctionCallExpression",
                "Name": "count",
                "Arguments": [{
                    "ExpressionType": "ChildExpression",
                    "Name": "given",
                    "Arguments": [{
                        "ExpressionType": "ChildExpression",
                        "Name": "name",
                        "Arguments": [{
                            "ExpressionType": "AxisExpression",
                            "Name": "that",
                            "ReturnType": "Patient"
                        }],
                        "ReturnType": "HumanName[]"
                    }],
                    "ReturnType": "string[]"
                }],
                "ReturnType": "integer"
            })
        );
        assert_eq!(
            analysis.dump(),
            "count : integer\n  given : string[]\n    name : HumanName[]\n      that : Patient\n"
        );
    }

    #[test]
    fn test_operator_and_constant_nodes() {
        let analysis = analyze("1 + %limit", "Patient");
        let tree = analysis.tree.unwrap();
        assert_eq!(tree.name, "+");
        assert_eq!(tree.expression_type, ExpressionKind::FunctionCallExpression);
        let kinds: Vec<_> = tree.arguments.iter().map(|a| a.expression_type).collect();
        assert_eq!(
            kinds,
            vec![
                ExpressionKind::ConstantExpression,
                ExpressionKind::VariableRefExpression
            ]
        );
    }
}
