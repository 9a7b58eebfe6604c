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

//! Pratt parser for FHIRPath expressions

use super::error::{ParseError, ParseResult};
use super::tokenizer::{Token, Tokenizer};
use crate::ast::{Arguments, BinaryOperator, ExpressionNode, LiteralValue, UnaryOperator};

/// Operator precedence levels (higher = tighter binding)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// Lowest precedence - implies (right associative)
    Implies = 1,
    /// Logical OR and XOR
    Or = 2,
    /// Logical AND
    And = 3,
    /// Membership operators (in, contains)
    Membership = 4,
    /// Equality operators (=, !=, ~, !~)
    Equality = 5,
    /// Inequality operators (<, >, <=, >=)
    Inequality = 6,
    /// Union operator (|)
    Union = 7,
    /// Type operators (is, as)
    Type = 8,
    /// Additive operators (+, -, &)
    Additive = 9,
    /// Multiplicative operators (*, /, div, mod)
    Multiplicative = 10,
    /// Unary operators (+, -)
    Unary = 11,
    /// Invocation/Indexing (., [])
    Invocation = 12,
}

impl Precedence {
    /// Get the next higher precedence level for left-associative operators
    #[inline(always)]
    pub const fn next_level(self) -> Self {
        match self {
            Precedence::Implies => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Membership,
            Precedence::Membership => Precedence::Equality,
            Precedence::Equality => Precedence::Inequality,
            Precedence::Inequality => Precedence::Union,
            Precedence::Union => Precedence::Type,
            Precedence::Type => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative => Precedence::Unary,
            Precedence::Unary | Precedence::Invocation => Precedence::Invocation,
        }
    }

    /// Check if this precedence is right associative
    #[inline(always)]
    pub const fn is_right_associative(self) -> bool {
        matches!(self, Precedence::Implies)
    }
}

fn get_precedence(token: &Token<'_>) -> Option<Precedence> {
    Some(match token {
        Token::Implies => Precedence::Implies,
        Token::Or | Token::Xor => Precedence::Or,
        Token::And => Precedence::And,
        Token::In | Token::Contains => Precedence::Membership,
        Token::Equal | Token::NotEqual | Token::Equivalent | Token::NotEquivalent => {
            Precedence::Equality
        }
        Token::LessThan
        | Token::LessThanOrEqual
        | Token::GreaterThan
        | Token::GreaterThanOrEqual => Precedence::Inequality,
        Token::Union => Precedence::Union,
        Token::Is | Token::As => Precedence::Type,
        Token::Plus | Token::Minus | Token::Ampersand => Precedence::Additive,
        Token::Multiply | Token::Divide | Token::Div | Token::Mod => Precedence::Multiplicative,
        _ => return None,
    })
}

fn token_to_binary_op(token: &Token<'_>) -> Option<BinaryOperator> {
    Some(match token {
        Token::Plus => BinaryOperator::Add,
        Token::Minus => BinaryOperator::Subtract,
        Token::Multiply => BinaryOperator::Multiply,
        Token::Divide => BinaryOperator::Divide,
        Token::Div => BinaryOperator::IntegerDivide,
        Token::Mod => BinaryOperator::Modulo,
        Token::Equal => BinaryOperator::Equal,
        Token::NotEqual => BinaryOperator::NotEqual,
        Token::LessThan => BinaryOperator::LessThan,
        Token::LessThanOrEqual => BinaryOperator::LessThanOrEqual,
        Token::GreaterThan => BinaryOperator::GreaterThan,
        Token::GreaterThanOrEqual => BinaryOperator::GreaterThanOrEqual,
        Token::Equivalent => BinaryOperator::Equivalent,
        Token::NotEquivalent => BinaryOperator::NotEquivalent,
        Token::And => BinaryOperator::And,
        Token::Or => BinaryOperator::Or,
        Token::Xor => BinaryOperator::Xor,
        Token::Implies => BinaryOperator::Implies,
        Token::In => BinaryOperator::In,
        Token::Contains => BinaryOperator::Contains,
        Token::Union => BinaryOperator::Union,
        Token::Ampersand => BinaryOperator::Concatenate,
        _ => return None,
    })
}

/// Calendar duration keywords accepted as quantity units
const CALENDAR_UNITS: [&str; 16] = [
    "year",
    "years",
    "month",
    "months",
    "week",
    "weeks",
    "day",
    "days",
    "hour",
    "hours",
    "minute",
    "minutes",
    "second",
    "seconds",
    "millisecond",
    "milliseconds",
];

/// Deepest expression tree the parser builds
///
/// Evaluation, analysis and the debug tree all recurse over the tree, so
/// the limit bounds their stack use as well.
pub const MAX_NESTING_DEPTH: usize = 256;

/// Pratt parser over a [`Tokenizer`]
pub struct PrattParser<'input> {
    tokenizer: Tokenizer<'input>,
    current_token: Option<Token<'input>>,
    current_pos: usize,
    depth: usize,
}

impl<'input> PrattParser<'input> {
    /// Create a new parser; the first token is read lazily
    pub fn new(input: &'input str) -> Self {
        Self {
            tokenizer: Tokenizer::new(input),
            current_token: None,
            current_pos: 0,
            depth: 0,
        }
    }

    /// Enter one more level of nesting
    fn descend(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::TooDeeplyNested {
                position: self.current_pos,
                limit: MAX_NESTING_DEPTH,
            });
        }
        Ok(())
    }

    fn advance(&mut self) -> ParseResult<()> {
        self.current_token = self.tokenizer.next_token()?;
        self.current_pos = self.tokenizer.token_start();
        Ok(())
    }

    #[inline(always)]
    fn current(&self) -> Option<&Token<'input>> {
        self.current_token.as_ref()
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        match &self.current_token {
            Some(token) => ParseError::UnexpectedToken {
                token: format!("{token:?}"),
                position: self.current_pos,
            },
            None => ParseError::ExpectedToken {
                expected: expected.to_string(),
                position: self.current_pos,
            },
        }
    }

    fn expect(&mut self, expected: Token<'input>, description: &str) -> ParseResult<()> {
        if self.current_token.as_ref() == Some(&expected) {
            self.advance()
        } else {
            Err(self.unexpected(description))
        }
    }

    /// Parse complete input
    pub fn parse(&mut self) -> ParseResult<ExpressionNode> {
        self.advance()?;
        if self.current_token.is_none() {
            return Err(ParseError::EmptyExpression);
        }

        let expr = self.parse_expression_with_precedence(Precedence::Implies)?;

        if self.current_token.is_some() {
            return Err(self.unexpected("end of expression"));
        }

        Ok(expr)
    }

    fn parse_expression_with_precedence(
        &mut self,
        min_precedence: Precedence,
    ) -> ParseResult<ExpressionNode> {
        self.descend()?;
        let mut levels = 1;
        let mut left = self.parse_unary()?;

        while let Some(current_token) = self.current() {
            let precedence = match get_precedence(current_token) {
                Some(prec) if prec >= min_precedence => prec,
                _ => break,
            };
            let type_check = match current_token {
                Token::Is => Some(true),
                Token::As => Some(false),
                _ => None,
            };
            let op = token_to_binary_op(current_token);

            if let Some(is_check) = type_check {
                self.advance()?;
                let type_name = self.parse_type_specifier()?;
                left = if is_check {
                    ExpressionNode::type_check(left, type_name)
                } else {
                    ExpressionNode::type_cast(left, type_name)
                };
                self.descend()?;
                levels += 1;
                continue;
            }

            let op = op.ok_or_else(|| self.unexpected("operator"))?;
            self.advance()?;
            // A left-leaning chain deepens the tree one level per operator
            self.descend()?;
            levels += 1;

            let next_min = if precedence.is_right_associative() {
                precedence
            } else {
                precedence.next_level()
            };
            let right = self.parse_expression_with_precedence(next_min)?;
            left = ExpressionNode::binary_op(op, left, right);
        }

        self.depth -= levels;
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<ExpressionNode> {
        let op = match self.current() {
            Some(Token::Minus) => UnaryOperator::Minus,
            Some(Token::Plus) => UnaryOperator::Plus,
            _ => {
                let primary = self.parse_primary()?;
                return self.parse_postfix(primary);
            }
        };
        self.advance()?;
        self.descend()?;
        let operand = self.parse_unary()?;
        self.depth -= 1;
        Ok(ExpressionNode::unary_op(op, operand))
    }

    /// `Type`, `FHIR.Type` or `(Type)`
    fn parse_type_specifier(&mut self) -> ParseResult<String> {
        let parenthesized = matches!(self.current(), Some(Token::LeftParen));
        if parenthesized {
            self.advance()?;
        }

        let mut type_name = self.take_identifier("type name")?;
        while let Some(Token::Dot) = self.current() {
            self.advance()?;
            type_name.push('.');
            type_name.push_str(&self.take_identifier("type name")?);
        }

        if parenthesized {
            self.expect(Token::RightParen, "')'")?;
        }
        Ok(type_name)
    }

    fn take_identifier(&mut self, expected: &str) -> ParseResult<String> {
        let name = match self.current() {
            Some(Token::Identifier(name)) => (*name).to_string(),
            Some(Token::DelimitedIdentifier(name)) => self.unescape(name)?,
            Some(token) => match token.keyword_text() {
                Some(word) => word.to_string(),
                None => return Err(self.unexpected(expected)),
            },
            None => return Err(self.unexpected(expected)),
        };
        self.advance()?;
        Ok(name)
    }

    fn parse_primary(&mut self) -> ParseResult<ExpressionNode> {
        let token = match self.current_token.take() {
            Some(token) => token,
            None => {
                return Err(ParseError::UnexpectedEof {
                    position: self.tokenizer.position(),
                });
            }
        };
        let position = self.current_pos;

        match token {
            Token::Identifier(name) => {
                self.advance()?;
                if let Some(Token::LeftParen) = self.current() {
                    self.parse_function_call(name)
                } else {
                    Ok(ExpressionNode::identifier(name))
                }
            }
            Token::DelimitedIdentifier(name) => {
                let name = self.unescape(name)?;
                self.advance()?;
                Ok(ExpressionNode::identifier(name))
            }
            Token::Integer(text) => {
                self.advance()?;
                if let Some(quantity) = self.parse_quantity_unit(text)? {
                    return Ok(quantity);
                }
                let value = text.parse::<i64>().map_err(|_| ParseError::InvalidLiteral {
                    literal_type: "integer".to_string(),
                    value: text.to_string(),
                    position,
                })?;
                Ok(ExpressionNode::literal(LiteralValue::Integer(value)))
            }
            Token::Decimal(text) => {
                self.advance()?;
                if let Some(quantity) = self.parse_quantity_unit(text)? {
                    return Ok(quantity);
                }
                Ok(ExpressionNode::literal(LiteralValue::Decimal(text.to_string())))
            }
            Token::String(raw) => {
                let value = self.unescape(raw)?;
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::String(value)))
            }
            Token::Date(text) => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::Date(text.to_string())))
            }
            Token::DateTime(text) => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::DateTime(text.to_string())))
            }
            Token::Time(text) => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::Time(text.to_string())))
            }
            Token::True | Token::False => {
                self.advance()?;
                Ok(ExpressionNode::literal(LiteralValue::Boolean(matches!(
                    token,
                    Token::True
                ))))
            }
            Token::LeftParen => {
                self.advance()?;
                let expr = self.parse_expression_with_precedence(Precedence::Implies)?;
                self.expect(Token::RightParen, "')'")?;
                Ok(expr)
            }
            Token::LeftBrace => {
                self.advance()?;
                self.expect(Token::RightBrace, "'}'")?;
                Ok(ExpressionNode::literal(LiteralValue::Null))
            }
            Token::Percent => {
                self.advance()?;
                let name = match self.current() {
                    Some(Token::String(raw)) => {
                        let name = self.unescape(raw)?;
                        self.advance()?;
                        name
                    }
                    _ => self.take_identifier("variable name")?,
                };
                Ok(ExpressionNode::variable(name))
            }
            Token::DollarThis => {
                self.advance()?;
                Ok(ExpressionNode::variable("this"))
            }
            Token::DollarIndex => {
                self.advance()?;
                Ok(ExpressionNode::variable("index"))
            }
            Token::DollarTotal => {
                self.advance()?;
                Ok(ExpressionNode::variable("total"))
            }
            other => {
                // Keywords such as `contains` or `is` may still start a
                // function call
                if let Some(word) = other.keyword_text() {
                    self.advance()?;
                    if let Some(Token::LeftParen) = self.current() {
                        return self.parse_function_call(word);
                    }
                }
                Err(ParseError::UnexpectedToken {
                    token: format!("{other:?}"),
                    position,
                })
            }
        }
    }

    /// A number followed by a string or calendar keyword is a quantity
    fn parse_quantity_unit(&mut self, value: &str) -> ParseResult<Option<ExpressionNode>> {
        let unit = match self.current() {
            Some(Token::String(raw)) => self.unescape(raw)?,
            Some(Token::Identifier(word)) if CALENDAR_UNITS.contains(word) => (*word).to_string(),
            _ => return Ok(None),
        };
        self.advance()?;
        Ok(Some(ExpressionNode::literal(LiteralValue::Quantity {
            value: value.to_string(),
            unit,
        })))
    }

    fn parse_arguments(&mut self) -> ParseResult<Arguments> {
        self.expect(Token::LeftParen, "'('")?;
        let mut args = Arguments::new();

        if let Some(Token::RightParen) = self.current() {
            self.advance()?;
            return Ok(args);
        }

        loop {
            args.push(self.parse_expression_with_precedence(Precedence::Implies)?);
            match self.current() {
                Some(Token::Comma) => self.advance()?,
                Some(Token::RightParen) => {
                    self.advance()?;
                    break;
                }
                _ => return Err(self.unexpected("',' or ')' in function arguments")),
            }
        }

        Ok(args)
    }

    fn parse_function_call(&mut self, name: &str) -> ParseResult<ExpressionNode> {
        let args = self.parse_arguments()?;
        Ok(ExpressionNode::function_call(name, args))
    }

    fn parse_postfix(&mut self, mut left: ExpressionNode) -> ParseResult<ExpressionNode> {
        let mut levels = 0;
        loop {
            match self.current() {
                Some(Token::Dot) => {
                    self.advance()?;
                    self.descend()?;
                    levels += 1;
                    let name = self.take_identifier("identifier after '.'")?;
                    left = if let Some(Token::LeftParen) = self.current() {
                        let args = self.parse_arguments()?;
                        ExpressionNode::method_call(left, name, args)
                    } else {
                        ExpressionNode::path(left, name)
                    };
                }
                Some(Token::LeftBracket) => {
                    self.advance()?;
                    self.descend()?;
                    levels += 1;
                    let index = self.parse_expression_with_precedence(Precedence::Implies)?;
                    self.expect(Token::RightBracket, "']'")?;
                    left = ExpressionNode::index(left, index);
                }
                _ => break,
            }
        }
        self.depth -= levels;
        Ok(left)
    }

    /// Process escape sequences in string literals and delimited identifiers
    fn unescape(&self, input: &str) -> ParseResult<String> {
        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars();

        while let Some(ch) = chars.next() {
            if ch != '\\' {
                result.push(ch);
                continue;
            }
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('f') => result.push('\u{000C}'),
                Some(c @ ('\\' | '\'' | '"' | '`' | '/')) => result.push(c),
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    let decoded = u32::from_str_radix(&hex, 16)
                        .ok()
                        .filter(|_| hex.len() == 4)
                        .and_then(char::from_u32);
                    match decoded {
                        Some(c) => result.push(c),
                        None => {
                            return Err(ParseError::InvalidEscape {
                                sequence: format!("\\u{hex}"),
                                position: self.current_pos,
                            });
                        }
                    }
                }
                Some(other) => {
                    result.push('\\');
                    result.push(other);
                }
                None => {
                    return Err(ParseError::InvalidEscape {
                        sequence: "\\".to_string(),
                        position: self.current_pos,
                    });
                }
            }
        }

        Ok(result)
    }
}

/// Parse a FHIRPath expression into an AST
pub fn parse_expression_pratt(input: &str) -> ParseResult<ExpressionNode> {
    PrattParser::new(input).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOpData, MethodCallData};

    #[test]
    fn test_precedence_ordering() {
        assert!(Precedence::Multiplicative > Precedence::Additive);
        assert!(Precedence::Type > Precedence::Union);
        assert!(Precedence::Additive > Precedence::Equality);
        assert!(Precedence::Equality > Precedence::And);
        assert!(Precedence::Or > Precedence::Implies);
    }

    #[test]
    fn test_basic_expressions() {
        let result = parse_expression_pratt("Patient").unwrap();
        assert!(matches!(result, ExpressionNode::Identifier(_)));

        let result = parse_expression_pratt("Patient.name").unwrap();
        assert!(matches!(result, ExpressionNode::Path { .. }));

        let result = parse_expression_pratt("2 + 3 * 4").unwrap();
        let ExpressionNode::BinaryOp(data) = result else {
            panic!("Expected addition with multiplication on right");
        };
        assert_eq!(data.op, BinaryOperator::Add);
        assert_eq!(data.left, ExpressionNode::literal(LiteralValue::Integer(2)));
        assert!(matches!(
            &data.right,
            ExpressionNode::BinaryOp(inner) if inner.op == BinaryOperator::Multiply
        ));
    }

    #[test]
    fn test_implies_is_right_associative() {
        let result = parse_expression_pratt("a implies b implies c").unwrap();
        let ExpressionNode::BinaryOp(data) = result else {
            panic!("Expected implies");
        };
        let BinaryOpData { op, left, right } = *data;
        assert_eq!(op, BinaryOperator::Implies);
        assert_eq!(left, ExpressionNode::identifier("a"));
        assert!(matches!(right, ExpressionNode::BinaryOp(inner) if inner.op == BinaryOperator::Implies));
    }

    #[test]
    fn test_method_calls_and_keywords_as_names() {
        let result = parse_expression_pratt("name.given.contains('x')").unwrap();
        let ExpressionNode::MethodCall(data) = result else {
            panic!("Expected method call");
        };
        let MethodCallData { method, args, .. } = *data;
        assert_eq!(method, "contains");
        assert_eq!(args.len(), 1);

        let result = parse_expression_pratt("Patient.name.where(use = 'official')").unwrap();
        assert!(matches!(result, ExpressionNode::MethodCall { .. }));
    }

    #[test]
    fn test_type_operators() {
        let result = parse_expression_pratt("value is FHIR.Quantity").unwrap();
        assert_eq!(
            result,
            ExpressionNode::type_check(ExpressionNode::identifier("value"), "FHIR.Quantity")
        );

        let result = parse_expression_pratt("(a | b) as Patient").unwrap();
        assert!(matches!(result, ExpressionNode::TypeCast { .. }));
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            parse_expression_pratt("{}").unwrap(),
            ExpressionNode::literal(LiteralValue::Null)
        );
        assert_eq!(
            parse_expression_pratt("5 'mg'").unwrap(),
            ExpressionNode::literal(LiteralValue::Quantity {
                value: "5".into(),
                unit: "mg".into()
            })
        );
        assert_eq!(
            parse_expression_pratt("4 days").unwrap(),
            ExpressionNode::literal(LiteralValue::Quantity {
                value: "4".into(),
                unit: "days".into()
            })
        );
        assert_eq!(
            parse_expression_pratt(r"'a\nb'").unwrap(),
            ExpressionNode::literal(LiteralValue::String("a\nb".into()))
        );
    }

    #[test]
    fn test_variables() {
        assert_eq!(
            parse_expression_pratt("%`vs-gender`").unwrap(),
            ExpressionNode::variable("vs-gender")
        );
        assert_eq!(
            parse_expression_pratt("$this").unwrap(),
            ExpressionNode::variable("this")
        );
        assert_eq!(
            parse_expression_pratt("%resource.id").unwrap(),
            ExpressionNode::path(ExpressionNode::variable("resource"), "id")
        );
    }

    #[test]
    fn test_unary_minus() {
        assert_eq!(
            parse_expression_pratt("-5").unwrap(),
            ExpressionNode::unary_op(
                UnaryOperator::Minus,
                ExpressionNode::literal(LiteralValue::Integer(5))
            )
        );
    }

    #[test]
    fn test_errors_report_positions() {
        assert_eq!(parse_expression_pratt(""), Err(ParseError::EmptyExpression));
        let err = parse_expression_pratt("name.").unwrap_err();
        assert!(matches!(err, ParseError::ExpectedToken { position: 5, .. }));
        let err = parse_expression_pratt("name given").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedToken { position: 5, .. }));
        assert!(parse_expression_pratt("(1 + 2").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let nested = format!("{}1{}", "(".repeat(20_000), ")".repeat(20_000));
        let err = parse_expression_pratt(&nested).unwrap_err();
        assert!(matches!(
            err,
            ParseError::TooDeeplyNested {
                limit: MAX_NESTING_DEPTH,
                ..
            }
        ));

        let chain = vec!["1"; 5_000].join(" + ");
        assert!(matches!(
            parse_expression_pratt(&chain),
            Err(ParseError::TooDeeplyNested { .. })
        ));
        let negations = format!("{}1", "-".repeat(5_000));
        assert!(matches!(
            parse_expression_pratt(&negations),
            Err(ParseError::TooDeeplyNested { .. })
        ));

        let shallow = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert!(parse_expression_pratt(&shallow).is_ok());
        assert!(parse_expression_pratt("name.given.first().substring(1, 2)").is_ok());
    }
}
