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

//! Expression AST node definitions

use super::operator::{BinaryOperator, UnaryOperator};
use smallvec::SmallVec;
use std::fmt;

/// Argument list of a function or method call
pub type Arguments = SmallVec<[ExpressionNode; 4]>;

/// AST representation of FHIRPath expressions
///
/// Large variants are boxed to keep the enum small.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExpressionNode {
    /// Literal value (string, number, boolean, etc.)
    Literal(LiteralValue),

    /// Identifier evaluated against the current focus
    Identifier(String),

    /// Path navigation (object.property)
    Path {
        /// Base expression
        base: Box<ExpressionNode>,
        /// Property path
        path: String,
    },

    /// Binary operation (arithmetic, comparison, logical, union)
    BinaryOp(Box<BinaryOpData>),

    /// Unary operation (+, -)
    UnaryOp {
        /// The operator
        op: UnaryOperator,
        /// The operand
        operand: Box<ExpressionNode>,
    },

    /// Function call without an explicit focus (`today()`, `iif(...)`)
    FunctionCall(Box<FunctionCallData>),

    /// Method call on an expression (`expression.method(args)`)
    MethodCall(Box<MethodCallData>),

    /// Index access (collection\[index\])
    Index {
        /// Base expression
        base: Box<ExpressionNode>,
        /// Index expression
        index: Box<ExpressionNode>,
    },

    /// Type check (`expression is Type`)
    TypeCheck {
        /// Expression to check
        expression: Box<ExpressionNode>,
        /// Type specifier, possibly qualified (`FHIR.Patient`)
        type_name: String,
    },

    /// Type cast (`expression as Type`)
    TypeCast {
        /// Expression to cast
        expression: Box<ExpressionNode>,
        /// Type specifier, possibly qualified
        type_name: String,
    },

    /// Variable reference: `%name` for environment variables, `this`,
    /// `index` and `total` for the `$` axis variables
    Variable(String),
}

/// Binary operation data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryOpData {
    /// The operator
    pub op: BinaryOperator,
    /// Left operand
    pub left: ExpressionNode,
    /// Right operand
    pub right: ExpressionNode,
}

/// Function call data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionCallData {
    /// Function name
    pub name: String,
    /// Arguments
    pub args: Arguments,
}

/// Method call data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodCallData {
    /// Base expression (the focus)
    pub base: ExpressionNode,
    /// Method name
    pub method: String,
    /// Arguments
    pub args: Arguments,
}

/// Literal values in FHIRPath
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    /// Boolean literal
    Boolean(bool),
    /// Integer literal
    Integer(i64),
    /// Decimal literal, kept as text to preserve precision
    Decimal(String),
    /// String literal, escapes already processed
    String(String),
    /// Date literal without the '@' prefix
    Date(String),
    /// DateTime literal without the '@' prefix
    DateTime(String),
    /// Time literal without the '@T' prefix
    Time(String),
    /// Quantity literal
    Quantity {
        /// Numeric value as text
        value: String,
        /// Unit (UCUM code or calendar keyword)
        unit: String,
    },
    /// Empty collection literal `{}`
    Null,
}

/// Axis variables introduced with `$`
pub const AXIS_VARIABLES: [&str; 3] = ["this", "index", "total"];

impl ExpressionNode {
    /// Create a literal expression
    pub fn literal(value: LiteralValue) -> Self {
        Self::Literal(value)
    }

    /// Create an identifier expression
    pub fn identifier(name: impl Into<String>) -> Self {
        Self::Identifier(name.into())
    }

    /// Create a function call expression
    pub fn function_call(name: impl Into<String>, args: impl Into<Arguments>) -> Self {
        Self::FunctionCall(Box::new(FunctionCallData {
            name: name.into(),
            args: args.into(),
        }))
    }

    /// Create a method call expression
    pub fn method_call(
        base: ExpressionNode,
        method: impl Into<String>,
        args: impl Into<Arguments>,
    ) -> Self {
        Self::MethodCall(Box::new(MethodCallData {
            base,
            method: method.into(),
            args: args.into(),
        }))
    }

    /// Create a binary operation expression
    pub fn binary_op(op: BinaryOperator, left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::BinaryOp(Box::new(BinaryOpData { op, left, right }))
    }

    /// Create a unary operation expression
    pub fn unary_op(op: UnaryOperator, operand: ExpressionNode) -> Self {
        Self::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    /// Create a path navigation expression
    pub fn path(base: ExpressionNode, path: impl Into<String>) -> Self {
        Self::Path {
            base: Box::new(base),
            path: path.into(),
        }
    }

    /// Create an index access expression
    pub fn index(base: ExpressionNode, index: ExpressionNode) -> Self {
        Self::Index {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    /// Create a type check expression
    pub fn type_check(expression: ExpressionNode, type_name: impl Into<String>) -> Self {
        Self::TypeCheck {
            expression: Box::new(expression),
            type_name: type_name.into(),
        }
    }

    /// Create a type cast expression
    pub fn type_cast(expression: ExpressionNode, type_name: impl Into<String>) -> Self {
        Self::TypeCast {
            expression: Box::new(expression),
            type_name: type_name.into(),
        }
    }

    /// Create a variable reference
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// Get as identifier if this is an identifier
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Self::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// Interpret this node as a type specifier (`Patient`, `FHIR.Patient`)
    ///
    /// Used by `ofType`, `is` and `as` when called in function form.
    pub fn as_type_specifier(&self) -> Option<String> {
        match self {
            Self::Identifier(name) => Some(name.clone()),
            Self::Path { base, path } => base
                .as_type_specifier()
                .map(|prefix| format!("{prefix}.{path}")),
            _ => None,
        }
    }
}

impl LiteralValue {
    /// Textual form used in debug output
    pub fn display_text(&self) -> String {
        match self {
            Self::Boolean(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Decimal(d) => d.clone(),
            Self::String(s) => s.clone(),
            Self::Date(d) | Self::DateTime(d) => format!("@{d}"),
            Self::Time(t) => format!("@T{t}"),
            Self::Quantity { value, unit } => format!("{value} '{unit}'"),
            Self::Null => "{}".to_string(),
        }
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            other => f.write_str(&other.display_text()),
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[ExpressionNode]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg}")?;
    }
    Ok(())
}

impl fmt::Display for ExpressionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(lit) => write!(f, "{lit}"),
            Self::Identifier(name) => f.write_str(name),
            Self::Path { base, path } => write!(f, "{base}.{path}"),
            Self::BinaryOp(data) => write!(f, "({} {} {})", data.left, data.op, data.right),
            Self::UnaryOp { op, operand } => write!(f, "{op}{operand}"),
            Self::FunctionCall(data) => {
                write!(f, "{}(", data.name)?;
                write_args(f, &data.args)?;
                f.write_str(")")
            }
            Self::MethodCall(data) => {
                write!(f, "{}.{}(", data.base, data.method)?;
                write_args(f, &data.args)?;
                f.write_str(")")
            }
            Self::Index { base, index } => write!(f, "{base}[{index}]"),
            Self::TypeCheck {
                expression,
                type_name,
            } => write!(f, "{expression} is {type_name}"),
            Self::TypeCast {
                expression,
                type_name,
            } => write!(f, "{expression} as {type_name}"),
            Self::Variable(name) if AXIS_VARIABLES.contains(&name.as_str()) => {
                write!(f, "${name}")
            }
            Self::Variable(name) => write!(f, "%{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trips_structure() {
        let expr = ExpressionNode::method_call(
            ExpressionNode::path(ExpressionNode::identifier("Patient"), "name"),
            "where",
            vec![ExpressionNode::binary_op(
                BinaryOperator::Equal,
                ExpressionNode::identifier("use"),
                ExpressionNode::literal(LiteralValue::String("official".into())),
            )],
        );
        assert_eq!(expr.to_string(), "Patient.name.where((use = 'official'))");
    }

    #[test]
    fn test_type_specifier_from_path() {
        let expr = ExpressionNode::path(ExpressionNode::identifier("FHIR"), "Patient");
        assert_eq!(expr.as_type_specifier().as_deref(), Some("FHIR.Patient"));
        assert_eq!(
            ExpressionNode::literal(LiteralValue::Integer(1)).as_type_specifier(),
            None
        );
    }

    #[test]
    fn test_axis_variable_display() {
        assert_eq!(ExpressionNode::variable("this").to_string(), "$this");
        assert_eq!(ExpressionNode::variable("resource").to_string(), "%resource");
    }
}
