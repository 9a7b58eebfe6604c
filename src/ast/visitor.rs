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

//! Visitor pattern for AST traversal

use super::expression::{ExpressionNode, LiteralValue};
use super::operator::{BinaryOperator, UnaryOperator};

/// Trait for visiting AST nodes
pub trait Visitor: Sized {
    /// The result type of visiting a node
    type Result;

    /// Visit an expression node
    fn visit_expression(&mut self, expr: &ExpressionNode) -> Self::Result {
        walk_expression(self, expr)
    }

    /// Visit a literal expression
    fn visit_literal(&mut self, literal: &LiteralValue) -> Self::Result;

    /// Visit an identifier
    fn visit_identifier(&mut self, name: &str) -> Self::Result;

    /// Visit a function call
    fn visit_function_call(&mut self, name: &str, args: &[ExpressionNode]) -> Self::Result;

    /// Visit a method call
    fn visit_method_call(
        &mut self,
        base: &ExpressionNode,
        method: &str,
        args: &[ExpressionNode],
    ) -> Self::Result;

    /// Visit a binary operation
    fn visit_binary_op(
        &mut self,
        op: BinaryOperator,
        left: &ExpressionNode,
        right: &ExpressionNode,
    ) -> Self::Result;

    /// Visit a unary operation
    fn visit_unary_op(&mut self, op: UnaryOperator, operand: &ExpressionNode) -> Self::Result;

    /// Visit a path navigation
    fn visit_path(&mut self, base: &ExpressionNode, path: &str) -> Self::Result;

    /// Visit an index access
    fn visit_index(&mut self, base: &ExpressionNode, index: &ExpressionNode) -> Self::Result;

    /// Visit a type check
    fn visit_type_check(&mut self, expr: &ExpressionNode, type_name: &str) -> Self::Result;

    /// Visit a type cast
    fn visit_type_cast(&mut self, expr: &ExpressionNode, type_name: &str) -> Self::Result;

    /// Visit a variable reference
    fn visit_variable(&mut self, name: &str) -> Self::Result;
}

/// Default implementation of walking an expression tree
pub fn walk_expression<V: Visitor>(visitor: &mut V, expr: &ExpressionNode) -> V::Result {
    match expr {
        ExpressionNode::Literal(lit) => visitor.visit_literal(lit),
        ExpressionNode::Identifier(name) => visitor.visit_identifier(name),
        ExpressionNode::FunctionCall(func_data) => {
            visitor.visit_function_call(&func_data.name, &func_data.args)
        }
        ExpressionNode::MethodCall(method_data) => {
            visitor.visit_method_call(&method_data.base, &method_data.method, &method_data.args)
        }
        ExpressionNode::BinaryOp(data) => visitor.visit_binary_op(data.op, &data.left, &data.right),
        ExpressionNode::UnaryOp { op, operand } => visitor.visit_unary_op(*op, operand),
        ExpressionNode::Path { base, path } => visitor.visit_path(base, path),
        ExpressionNode::Index { base, index } => visitor.visit_index(base, index),
        ExpressionNode::TypeCheck {
            expression,
            type_name,
        } => visitor.visit_type_check(expression, type_name),
        ExpressionNode::TypeCast {
            expression,
            type_name,
        } => visitor.visit_type_cast(expression, type_name),
        ExpressionNode::Variable(name) => visitor.visit_variable(name),
    }
}
