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

//! Expression compiler
//!
//! Compilation parses the text and then checks it against the symbol
//! table: every function must exist with a matching argument count and
//! every `%variable` must be declared.

use crate::ast::{
    AXIS_VARIABLES, BinaryOperator, ExpressionNode, LiteralValue, UnaryOperator, Visitor,
};
use crate::error::{FhirPathError, Result};
use crate::evaluator::{Evaluator, SymbolTable};
use crate::model::Collection;
use crate::parser::parse;

/// A parsed and checked expression, ready to execute
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    text: String,
    ast: ExpressionNode,
}

impl CompiledExpression {
    /// Parse and check `text` against `symbols`
    pub fn compile(text: &str, symbols: &SymbolTable) -> Result<Self> {
        let ast = parse(text)?;
        SymbolChecker { symbols }.visit_expression(&ast)?;
        log::debug!("compiled expression: {ast}");
        Ok(Self {
            text: text.to_string(),
            ast,
        })
    }

    /// Source text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parsed tree
    pub fn ast(&self) -> &ExpressionNode {
        &self.ast
    }

    /// Execute with an evaluator bound to a context node
    pub fn execute(&self, evaluator: &Evaluator<'_>) -> Result<Collection> {
        evaluator.evaluate_expression(&self.ast)
    }
}

struct SymbolChecker<'s> {
    symbols: &'s SymbolTable,
}

impl SymbolChecker<'_> {
    fn check_call(&mut self, name: &str, args: &[ExpressionNode]) -> Result<()> {
        let signature = self.symbols.functions().signature(name).ok_or_else(|| {
            FhirPathError::UnknownFunction {
                function_name: name.to_string(),
            }
        })?;
        if !signature.accepts(args.len()) {
            return Err(FhirPathError::InvalidArgumentCount {
                function_name: name.to_string(),
                expected: signature.arity_text(),
                actual: args.len(),
            });
        }
        args.iter().try_for_each(|arg| self.visit_expression(arg))
    }
}

impl Visitor for SymbolChecker<'_> {
    type Result = Result<()>;

    fn visit_literal(&mut self, _literal: &LiteralValue) -> Self::Result {
        Ok(())
    }

    fn visit_identifier(&mut self, _name: &str) -> Self::Result {
        Ok(())
    }

    fn visit_function_call(&mut self, name: &str, args: &[ExpressionNode]) -> Self::Result {
        self.check_call(name, args)
    }

    fn visit_method_call(
        &mut self,
        base: &ExpressionNode,
        method: &str,
        args: &[ExpressionNode],
    ) -> Self::Result {
        self.visit_expression(base)?;
        self.check_call(method, args)
    }

    fn visit_binary_op(
        &mut self,
        _op: BinaryOperator,
        left: &ExpressionNode,
        right: &ExpressionNode,
    ) -> Self::Result {
        self.visit_expression(left)?;
        self.visit_expression(right)
    }

    fn visit_unary_op(&mut self, _op: UnaryOperator, operand: &ExpressionNode) -> Self::Result {
        self.visit_expression(operand)
    }

    fn visit_path(&mut self, base: &ExpressionNode, _path: &str) -> Self::Result {
        self.visit_expression(base)
    }

    fn visit_index(&mut self, base: &ExpressionNode, index: &ExpressionNode) -> Self::Result {
        self.visit_expression(base)?;
        self.visit_expression(index)
    }

    fn visit_type_check(&mut self, expr: &ExpressionNode, _type_name: &str) -> Self::Result {
        self.visit_expression(expr)
    }

    fn visit_type_cast(&mut self, expr: &ExpressionNode, _type_name: &str) -> Self::Result {
        self.visit_expression(expr)
    }

    fn visit_variable(&mut self, name: &str) -> Self::Result {
        if AXIS_VARIABLES.contains(&name) || self.symbols.is_declared(name) {
            Ok(())
        } else {
            Err(FhirPathError::UnknownVariable {
                name: name.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FunctionRegistry;
    use std::sync::Arc;

    fn symbols() -> SymbolTable {
        let mut symbols = SymbolTable::new(Arc::new(FunctionRegistry::standard()));
        symbols.declare("limit", Collection::new());
        symbols
    }

    #[test]
    fn test_compile_checks_functions() {
        let err = CompiledExpression::compile("name.frobnicate()", &symbols()).unwrap_err();
        assert!(matches!(err, FhirPathError::UnknownFunction { .. }));

        let err = CompiledExpression::compile("name.substring()", &symbols()).unwrap_err();
        assert!(matches!(err, FhirPathError::InvalidArgumentCount { .. }));
    }

    #[test]
    fn test_compile_checks_variables() {
        assert!(CompiledExpression::compile("name.take(%limit)", &symbols()).is_ok());
        assert!(CompiledExpression::compile("%resource.id", &symbols()).is_ok());
        assert!(CompiledExpression::compile("%`vs-administrative-gender`", &symbols()).is_ok());
        let err = CompiledExpression::compile("%missing", &symbols()).unwrap_err();
        assert_eq!(err.to_string(), "Unknown variable: %missing");
    }

    #[test]
    fn test_lab_functions_need_lab_registry() {
        let err = CompiledExpression::compile("name.propname()", &symbols()).unwrap_err();
        assert!(matches!(err, FhirPathError::UnknownFunction { .. }));

        let lab = SymbolTable::new(Arc::new(FunctionRegistry::lab()));
        assert!(CompiledExpression::compile("name.propname()", &lab).is_ok());
    }
}
