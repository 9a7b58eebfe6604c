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

//! Tree-walking FHIRPath evaluator

use super::context::RequestContext;
use super::operators;
use super::symbols::SymbolTable;
use crate::ast::{ExpressionNode, LiteralValue, UnaryOperator};
use crate::config::DEFAULT_TERMINOLOGY_SERVER;
use crate::error::{FhirPathError, Result};
use crate::model::{
    Collection, FhirPathValue, ModelProvider, Quantity, is_primitive_type, strip_namespace,
};
use crate::registry::FunctionCall;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Lexical scope of an evaluation step
#[derive(Debug, Clone, Default)]
pub struct Scope {
    this: Option<FhirPathValue>,
    index: Option<usize>,
    total: Option<Collection>,
    at_input: bool,
}

impl Scope {
    /// Scope at the start of an expression
    pub fn root() -> Self {
        Self {
            at_input: true,
            ..Self::default()
        }
    }

    /// Scope for the right-hand side of a navigation step
    fn derived(&self) -> Self {
        Self {
            at_input: false,
            ..self.clone()
        }
    }

    /// Scope binding `$this` and `$index` for one item
    fn for_item(&self, item: &FhirPathValue, index: usize) -> Self {
        Self {
            this: Some(item.clone()),
            index: Some(index),
            total: self.total.clone(),
            at_input: false,
        }
    }

    /// Scope with `$total` bound
    pub fn with_total(&self, total: Collection) -> Self {
        Self {
            total: Some(total),
            ..self.clone()
        }
    }

    /// `$this`, if bound
    pub fn this(&self) -> Option<&FhirPathValue> {
        self.this.as_ref()
    }
}

/// Evaluates expressions for one context node of one request
pub struct Evaluator<'a> {
    symbols: &'a SymbolTable,
    request: &'a RequestContext<'a>,
    model: &'a dyn ModelProvider,
    input: Collection,
    root: Collection,
}

impl<'a> Evaluator<'a> {
    /// Evaluator with no input document
    pub fn new(
        symbols: &'a SymbolTable,
        request: &'a RequestContext<'a>,
        model: &'a dyn ModelProvider,
    ) -> Self {
        Self {
            symbols,
            request,
            model,
            input: Collection::new(),
            root: Collection::new(),
        }
    }

    /// Set the root document (`%resource`, `%rootResource`)
    pub fn with_root(mut self, root: Option<FhirPathValue>) -> Self {
        self.root = root.into_iter().collect();
        self
    }

    /// Set the context node the expression starts from (`%context`)
    pub fn with_context(mut self, context: Option<FhirPathValue>) -> Self {
        self.input = context.into_iter().collect();
        self
    }

    /// Model of the running FHIR version
    pub fn model(&self) -> &'a dyn ModelProvider {
        self.model
    }

    /// Request context
    pub fn request(&self) -> &'a RequestContext<'a> {
        self.request
    }

    /// Symbol table
    pub fn symbols(&self) -> &'a SymbolTable {
        self.symbols
    }

    fn input_missing(&self) -> bool {
        self.input.is_empty() && self.root.is_empty()
    }

    /// Evaluate an expression against the context node
    pub fn evaluate_expression(&self, expr: &ExpressionNode) -> Result<Collection> {
        self.evaluate(expr, &self.input, &Scope::root())
    }

    /// Evaluate `expr` with the given focus
    pub fn evaluate(
        &self,
        expr: &ExpressionNode,
        focus: &Collection,
        scope: &Scope,
    ) -> Result<Collection> {
        match expr {
            ExpressionNode::Literal(literal) => literal_value(literal),
            ExpressionNode::Identifier(name) => self.navigate(focus, name, scope),
            ExpressionNode::Path { base, path } => {
                let base = self.evaluate(base, focus, scope)?;
                self.navigate(&base, path, &scope.derived())
            }
            ExpressionNode::BinaryOp(data) => {
                let left = self.evaluate(&data.left, focus, scope)?;
                let right = self.evaluate(&data.right, focus, scope)?;
                operators::apply_binary(data.op, left, right)
            }
            ExpressionNode::UnaryOp { op, operand } => {
                let operand = self.evaluate(operand, focus, scope)?;
                apply_unary(*op, operand)
            }
            ExpressionNode::FunctionCall(call) => {
                self.call_function(&call.name, &call.args, focus, scope)
            }
            ExpressionNode::MethodCall(call) => {
                let base = self.evaluate(&call.base, focus, scope)?;
                self.call_function(&call.method, &call.args, &base, &scope.derived())
            }
            ExpressionNode::Index { base, index } => {
                let base = self.evaluate(base, focus, scope)?;
                let index = self.evaluate_argument(index, scope)?;
                let Some(position) = index.as_single().and_then(FhirPathValue::as_integer) else {
                    return if index.is_empty() {
                        Ok(Collection::new())
                    } else {
                        Err(FhirPathError::evaluation_error(
                            "Indexer must be a single integer",
                        ))
                    };
                };
                Ok(usize::try_from(position)
                    .ok()
                    .and_then(|i| base.get(i).cloned())
                    .into_iter()
                    .collect())
            }
            ExpressionNode::TypeCheck {
                expression,
                type_name,
            } => {
                let value = self.evaluate(expression, focus, scope)?;
                match value.as_slice() {
                    [] => Ok(Collection::new()),
                    [single] => Ok(Collection::single(FhirPathValue::Boolean(
                        self.is_type(single, type_name),
                    ))),
                    _ => Err(FhirPathError::evaluation_error(format!(
                        "'is {type_name}' requires a single item, got {}",
                        value.len()
                    ))),
                }
            }
            ExpressionNode::TypeCast {
                expression,
                type_name,
            } => {
                let value = self.evaluate(expression, focus, scope)?;
                Ok(value
                    .into_iter()
                    .filter(|item| self.is_type(item, type_name))
                    .collect())
            }
            ExpressionNode::Variable(name) => self.variable(name, focus, scope),
        }
    }

    /// Evaluate a function argument in the calling context
    ///
    /// Inside an iteration that is `$this`; otherwise the context node.
    pub fn evaluate_argument(&self, expr: &ExpressionNode, scope: &Scope) -> Result<Collection> {
        match &scope.this {
            Some(this) => self.evaluate(expr, &Collection::single(this.clone()), scope),
            None => {
                let scope = Scope {
                    at_input: true,
                    ..scope.clone()
                };
                self.evaluate(expr, &self.input, &scope)
            }
        }
    }

    /// Evaluate `expr` with `item` bound as `$this` and `index` as `$index`
    pub fn evaluate_for_item(
        &self,
        expr: &ExpressionNode,
        item: &FhirPathValue,
        index: usize,
        scope: &Scope,
    ) -> Result<Collection> {
        let scope = scope.for_item(item, index);
        self.evaluate(expr, &Collection::single(item.clone()), &scope)
    }

    fn navigate(&self, focus: &Collection, name: &str, scope: &Scope) -> Result<Collection> {
        if focus.is_empty() && scope.at_input && self.input_missing() {
            return Err(FhirPathError::resource_required(format!("'{name}'")));
        }
        let mut out = Collection::new();
        for item in focus {
            let FhirPathValue::Element(node) = item else {
                continue;
            };
            if scope.at_input && node.is_resource() && node.type_name() == Some(name) {
                out.push(item.clone());
                continue;
            }
            for child in node.child(name, self.model) {
                out.push(FhirPathValue::Element(child));
            }
        }
        Ok(out)
    }

    fn call_function(
        &self,
        name: &str,
        args: &[ExpressionNode],
        focus: &Collection,
        scope: &Scope,
    ) -> Result<Collection> {
        let function =
            self.symbols
                .functions()
                .get(name)
                .ok_or_else(|| FhirPathError::UnknownFunction {
                    function_name: name.to_string(),
                })?;
        if !function.signature.accepts(args.len()) {
            return Err(FhirPathError::InvalidArgumentCount {
                function_name: name.to_string(),
                expected: function.signature.arity_text(),
                actual: args.len(),
            });
        }
        let call = FunctionCall {
            name,
            focus,
            args,
            scope,
            evaluator: self,
        };
        function.invoke(&call)
    }

    fn variable(&self, name: &str, focus: &Collection, scope: &Scope) -> Result<Collection> {
        match name {
            "this" => {
                return Ok(match &scope.this {
                    Some(this) => Collection::single(this.clone()),
                    None => focus.clone(),
                });
            }
            "index" => {
                return Ok(scope
                    .index
                    .and_then(|i| i64::try_from(i).ok())
                    .map(FhirPathValue::Integer)
                    .into_iter()
                    .collect());
            }
            "total" => return Ok(scope.total.clone().unwrap_or_default()),
            _ => {}
        }

        if let Some(value) = self.symbols.variable(name) {
            return Ok(value.clone());
        }

        let text = |s: String| Ok(Collection::single(FhirPathValue::String(s)));
        match name {
            "resource" | "rootResource" => {
                if self.root.is_empty() {
                    Err(FhirPathError::resource_required(format!("%{name}")))
                } else {
                    Ok(self.root.clone())
                }
            }
            "context" => {
                if self.input_missing() {
                    Err(FhirPathError::resource_required("%context"))
                } else {
                    Ok(self.input.clone())
                }
            }
            "terminologies" => {
                let server = self
                    .request
                    .terminology()
                    .map(|t| t.server().to_string())
                    .unwrap_or_else(|| DEFAULT_TERMINOLOGY_SERVER.to_string());
                Ok(Collection::single(FhirPathValue::Terminologies(server)))
            }
            "ucum" => text("http://unitsofmeasure.org".into()),
            "sct" => text("http://snomed.info/sct".into()),
            "loinc" => text("http://loinc.org".into()),
            _ => {
                if let Some(id) = name.strip_prefix("vs-") {
                    text(format!("http://hl7.org/fhir/ValueSet/{id}"))
                } else if let Some(id) = name.strip_prefix("ext-") {
                    text(format!("http://hl7.org/fhir/StructureDefinition/{id}"))
                } else {
                    Err(FhirPathError::UnknownVariable {
                        name: name.to_string(),
                    })
                }
            }
        }
    }

    /// Whether a value is of the named type or one of its subtypes
    pub fn is_type(&self, value: &FhirPathValue, type_name: &str) -> bool {
        let wanted = strip_namespace(type_name);
        match value {
            FhirPathValue::Element(node) => match node.type_name() {
                Some(declared) => {
                    declared == wanted
                        || self.model.is_subtype_of(declared, wanted)
                        || (is_primitive_type(declared) && declared.eq_ignore_ascii_case(wanted))
                }
                None => node
                    .to_system_value()
                    .is_some_and(|v| v.type_name().eq_ignore_ascii_case(wanted)),
            },
            other => other.type_name().eq_ignore_ascii_case(wanted),
        }
    }
}

fn literal_value(literal: &LiteralValue) -> Result<Collection> {
    let decimal = |text: &str| {
        Decimal::from_str(text)
            .map_err(|e| FhirPathError::evaluation_error(format!("Invalid decimal '{text}': {e}")))
    };
    let value = match literal {
        LiteralValue::Boolean(b) => FhirPathValue::Boolean(*b),
        LiteralValue::Integer(i) => FhirPathValue::Integer(*i),
        LiteralValue::Decimal(text) => FhirPathValue::Decimal(decimal(text)?),
        LiteralValue::String(s) => FhirPathValue::String(s.clone()),
        LiteralValue::Date(s) => FhirPathValue::Date(s.clone()),
        LiteralValue::DateTime(s) => FhirPathValue::DateTime(s.clone()),
        LiteralValue::Time(s) => FhirPathValue::Time(s.clone()),
        LiteralValue::Quantity { value, unit } => FhirPathValue::Quantity(Quantity {
            value: decimal(value)?,
            unit: Some(unit.clone()),
        }),
        LiteralValue::Null => return Ok(Collection::new()),
    };
    Ok(Collection::single(value))
}

fn apply_unary(op: UnaryOperator, operand: Collection) -> Result<Collection> {
    let Some(value) = operand.as_single() else {
        return if operand.is_empty() {
            Ok(Collection::new())
        } else {
            Err(FhirPathError::evaluation_error(format!(
                "Unary '{op}' requires a single operand"
            )))
        };
    };
    let negate = op == UnaryOperator::Minus;
    let result = match value.normalized().into_owned() {
        FhirPathValue::Integer(i) if negate => match i.checked_neg() {
            Some(n) => FhirPathValue::Integer(n),
            None => return Ok(Collection::new()),
        },
        FhirPathValue::Decimal(d) if negate => FhirPathValue::Decimal(-d),
        FhirPathValue::Quantity(q) if negate => FhirPathValue::Quantity(Quantity {
            value: -q.value,
            unit: q.unit,
        }),
        v @ (FhirPathValue::Integer(_) | FhirPathValue::Decimal(_) | FhirPathValue::Quantity(_)) => {
            v
        }
        other => {
            return Err(FhirPathError::type_error(format!(
                "Unary '{op}' cannot be applied to {}",
                other.type_name()
            )));
        }
    };
    Ok(Collection::single(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unary_minus() {
        let negated =
            apply_unary(UnaryOperator::Minus, Collection::single(FhirPathValue::Integer(5))).unwrap();
        assert_eq!(negated, Collection::single(FhirPathValue::Integer(-5)));
        assert!(
            apply_unary(UnaryOperator::Minus, Collection::new())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_unary_minus_overflow_is_empty() {
        let min = Collection::single(FhirPathValue::Integer(i64::MIN));
        assert!(apply_unary(UnaryOperator::Minus, min).unwrap().is_empty());
    }
}
