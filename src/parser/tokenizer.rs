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

//! Byte-oriented tokenizer for FHIRPath expressions
//!
//! Tokens borrow slices of the input; string and delimited-identifier
//! contents are returned raw and unescaped by the parser.

use super::error::{ParseError, ParseResult};

/// Token with zero-copy string slices
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'input> {
    // Literals
    /// Integer literal (e.g., 42)
    Integer(&'input str),
    /// Decimal literal (e.g., 3.14)
    Decimal(&'input str),
    /// String literal content between single quotes, escapes unprocessed
    String(&'input str),
    /// Date literal without the '@' (e.g., 2023-01-01)
    Date(&'input str),
    /// DateTime literal without the '@' (e.g., 2023-01-01T12:00:00)
    DateTime(&'input str),
    /// Time literal without the '@T' (e.g., 12:00:00)
    Time(&'input str),

    // Identifiers
    /// Plain identifier
    Identifier(&'input str),
    /// Backtick-delimited identifier content, escapes unprocessed
    DelimitedIdentifier(&'input str),

    // Operators
    /// Addition operator (+)
    Plus,
    /// Subtraction operator (-)
    Minus,
    /// Multiplication operator (*)
    Multiply,
    /// Division operator (/)
    Divide,
    /// Modulo operator (mod keyword)
    Mod,
    /// Integer division operator (div keyword)
    Div,
    /// Equality operator (=)
    Equal,
    /// Inequality operator (!=)
    NotEqual,
    /// Less than operator (<)
    LessThan,
    /// Less than or equal operator (<=)
    LessThanOrEqual,
    /// Greater than operator (>)
    GreaterThan,
    /// Greater than or equal operator (>=)
    GreaterThanOrEqual,
    /// Equivalence operator (~)
    Equivalent,
    /// Non-equivalence operator (!~)
    NotEquivalent,
    /// Logical AND operator (and keyword)
    And,
    /// Logical OR operator (or keyword)
    Or,
    /// Logical XOR operator (xor keyword)
    Xor,
    /// Logical implication operator (implies keyword)
    Implies,
    /// Union operator (|)
    Union,
    /// Membership operator (in keyword)
    In,
    /// Contains operator (contains keyword)
    Contains,
    /// Ampersand operator (&) for string concatenation
    Ampersand,
    /// Type checking operator (is keyword)
    Is,
    /// Type casting operator (as keyword)
    As,

    // Punctuation
    /// Left parenthesis (
    LeftParen,
    /// Right parenthesis )
    RightParen,
    /// Left square bracket [
    LeftBracket,
    /// Right square bracket ]
    RightBracket,
    /// Left curly brace {
    LeftBrace,
    /// Right curly brace }
    RightBrace,
    /// Dot operator (.) for property access
    Dot,
    /// Comma separator (,)
    Comma,
    /// Percent sign (%) introducing an environment variable
    Percent,

    // Special variables
    /// $this
    DollarThis,
    /// $index
    DollarIndex,
    /// $total
    DollarTotal,
    /// Boolean literal true
    True,
    /// Boolean literal false
    False,
}

impl<'input> Token<'input> {
    /// Get keyword token from a word
    #[inline]
    pub fn from_keyword(s: &str) -> Option<Token<'static>> {
        match s {
            "true" => Some(Token::True),
            "false" => Some(Token::False),
            "and" => Some(Token::And),
            "or" => Some(Token::Or),
            "xor" => Some(Token::Xor),
            "implies" => Some(Token::Implies),
            "is" => Some(Token::Is),
            "as" => Some(Token::As),
            "in" => Some(Token::In),
            "contains" => Some(Token::Contains),
            "div" => Some(Token::Div),
            "mod" => Some(Token::Mod),
            _ => None,
        }
    }

    /// Word form of a keyword token, so keywords can still name members
    /// and functions after a dot (`.contains('x')`, `.is(Patient)`)
    pub fn keyword_text(&self) -> Option<&'static str> {
        match self {
            Token::True => Some("true"),
            Token::False => Some("false"),
            Token::And => Some("and"),
            Token::Or => Some("or"),
            Token::Xor => Some("xor"),
            Token::Implies => Some("implies"),
            Token::Is => Some("is"),
            Token::As => Some("as"),
            Token::In => Some("in"),
            Token::Contains => Some("contains"),
            Token::Div => Some("div"),
            Token::Mod => Some("mod"),
            _ => None,
        }
    }
}

#[inline(always)]
fn lookup_single_char_operator(byte: u8) -> Option<Token<'static>> {
    match byte {
        b'.' => Some(Token::Dot),
        b'(' => Some(Token::LeftParen),
        b')' => Some(Token::RightParen),
        b',' => Some(Token::Comma),
        b'+' => Some(Token::Plus),
        b'-' => Some(Token::Minus),
        b'*' => Some(Token::Multiply),
        b'[' => Some(Token::LeftBracket),
        b']' => Some(Token::RightBracket),
        b'{' => Some(Token::LeftBrace),
        b'}' => Some(Token::RightBrace),
        b'&' => Some(Token::Ampersand),
        b'%' => Some(Token::Percent),
        b'|' => Some(Token::Union),
        b'~' => Some(Token::Equivalent),
        _ => None,
    }
}

/// Tokenizer for FHIRPath expressions
#[derive(Clone)]
pub struct Tokenizer<'input> {
    input: &'input str,
    bytes: &'input [u8],
    pos: usize,
    end: usize,
    token_start: usize,
}

impl<'input> Tokenizer<'input> {
    /// Create a new tokenizer
    #[inline]
    pub fn new(input: &'input str) -> Self {
        let bytes = input.as_bytes();
        Self {
            input,
            bytes,
            pos: 0,
            end: bytes.len(),
            token_start: 0,
        }
    }

    /// Fast lookup for operators that may span two characters
    #[inline(always)]
    fn lookup_two_char_operator(first: u8, second: Option<u8>) -> Option<(Token<'static>, usize)> {
        match (first, second) {
            (b'!', Some(b'=')) => Some((Token::NotEqual, 2)),
            (b'!', Some(b'~')) => Some((Token::NotEquivalent, 2)),
            (b'<', Some(b'=')) => Some((Token::LessThanOrEqual, 2)),
            (b'>', Some(b'=')) => Some((Token::GreaterThanOrEqual, 2)),
            (b'=', _) => Some((Token::Equal, 1)),
            (b'<', _) => Some((Token::LessThan, 1)),
            (b'>', _) => Some((Token::GreaterThan, 1)),
            _ => None,
        }
    }

    /// Input slice between byte positions; positions always sit on ASCII
    /// boundaries so slicing cannot split a character
    #[inline(always)]
    fn slice(&self, start: usize, end: usize) -> &'input str {
        self.input.get(start..end).unwrap_or("")
    }

    #[inline(always)]
    fn is_id_start(ch: u8) -> bool {
        ch.is_ascii_alphabetic() || ch == b'_'
    }

    #[inline(always)]
    fn is_id_continue(ch: u8) -> bool {
        ch.is_ascii_alphanumeric() || ch == b'_'
    }

    #[inline(always)]
    fn digit_at(&self, pos: usize) -> bool {
        pos < self.end && self.bytes[pos].is_ascii_digit()
    }

    fn skip_digits(&mut self) {
        while self.digit_at(self.pos) {
            self.pos += 1;
        }
    }

    fn parse_number(&mut self) -> Token<'input> {
        let start = self.pos;
        self.skip_digits();

        // A '.' only belongs to the number when digits follow it, so
        // `1.toString()` keeps working
        if self.pos < self.end && self.bytes[self.pos] == b'.' && self.digit_at(self.pos + 1) {
            self.pos += 1;
            self.skip_digits();
            Token::Decimal(self.slice(start, self.pos))
        } else {
            Token::Integer(self.slice(start, self.pos))
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.end && matches!(self.bytes[self.pos], b' ' | b'\t' | b'\r' | b'\n') {
            self.pos += 1;
        }
    }

    fn skip_single_line_comment(&mut self) {
        self.pos += 2;
        while self.pos < self.end && !matches!(self.bytes[self.pos], b'\n' | b'\r') {
            self.pos += 1;
        }
    }

    fn skip_multi_line_comment(&mut self) -> ParseResult<()> {
        let start = self.pos;
        self.pos += 2;
        while self.pos + 1 < self.end {
            if self.bytes[self.pos] == b'*' && self.bytes[self.pos + 1] == b'/' {
                self.pos += 2;
                return Ok(());
            }
            self.pos += 1;
        }
        Err(ParseError::UnclosedComment { position: start })
    }

    fn parse_identifier(&mut self) -> &'input str {
        let start = self.pos;
        while self.pos < self.end && Self::is_id_continue(self.bytes[self.pos]) {
            self.pos += 1;
        }
        self.slice(start, self.pos)
    }

    /// Scan a quoted run (string or delimited identifier), skipping escaped
    /// characters, and return the raw content
    fn parse_quoted(&mut self, quote: u8) -> ParseResult<&'input str> {
        let open = self.pos;
        self.pos += 1;
        let start = self.pos;

        while self.pos < self.end {
            match self.bytes[self.pos] {
                b if b == quote => {
                    let content = self.slice(start, self.pos);
                    self.pos += 1;
                    return Ok(content);
                }
                b'\\' => self.pos += 2,
                _ => self.pos += 1,
            }
        }

        Err(ParseError::UnclosedString { position: open })
    }

    /// Next token, or `None` at end of input
    pub fn next_token(&mut self) -> ParseResult<Option<Token<'input>>> {
        loop {
            self.skip_whitespace();
            if self.pos + 1 < self.end && self.bytes[self.pos] == b'/' {
                match self.bytes[self.pos + 1] {
                    b'/' => {
                        self.skip_single_line_comment();
                        continue;
                    }
                    b'*' => {
                        self.skip_multi_line_comment()?;
                        continue;
                    }
                    _ => {}
                }
            }
            break;
        }

        self.token_start = self.pos;
        if self.pos >= self.end {
            return Ok(None);
        }

        let byte = self.bytes[self.pos];

        if let Some(token) = lookup_single_char_operator(byte) {
            self.pos += 1;
            return Ok(Some(token));
        }

        let token = match byte {
            b'=' | b'!' | b'<' | b'>' => {
                let second = self.bytes.get(self.pos + 1).copied();
                match Self::lookup_two_char_operator(byte, second) {
                    Some((token, consumed)) => {
                        self.pos += consumed;
                        token
                    }
                    None => {
                        return Err(ParseError::UnexpectedToken {
                            token: (byte as char).to_string(),
                            position: self.pos,
                        });
                    }
                }
            }
            b'/' => {
                self.pos += 1;
                Token::Divide
            }
            b'$' => {
                self.pos += 1;
                let name = self.parse_identifier();
                match name {
                    "this" => Token::DollarThis,
                    "index" => Token::DollarIndex,
                    "total" => Token::DollarTotal,
                    other => {
                        return Err(ParseError::UnexpectedToken {
                            token: format!("${other}"),
                            position: self.token_start,
                        });
                    }
                }
            }
            b'0'..=b'9' => self.parse_number(),
            b'\'' => Token::String(self.parse_quoted(b'\'')?),
            b'`' => Token::DelimitedIdentifier(self.parse_quoted(b'`')?),
            b'@' => self.parse_datetime_literal()?,
            ch if Self::is_id_start(ch) => {
                let ident = self.parse_identifier();
                Token::from_keyword(ident).unwrap_or(Token::Identifier(ident))
            }
            _ => {
                let ch = self
                    .input
                    .get(self.pos..)
                    .and_then(|rest| rest.chars().next())
                    .unwrap_or('?');
                return Err(ParseError::UnexpectedToken {
                    token: ch.to_string(),
                    position: self.pos,
                });
            }
        };

        Ok(Some(token))
    }

    /// Byte offset where the most recently returned token starts
    #[inline(always)]
    pub fn token_start(&self) -> usize {
        self.token_start
    }

    /// Current byte offset
    #[inline(always)]
    pub fn position(&self) -> usize {
        self.pos
    }

    fn parse_datetime_literal(&mut self) -> ParseResult<Token<'input>> {
        let start = self.pos;
        self.pos += 1;

        if self.pos < self.end && self.bytes[self.pos] == b'T' {
            self.pos += 1;
            let time_start = self.pos;
            self.parse_time_part();
            if self.pos == time_start {
                return Err(ParseError::InvalidLiteral {
                    literal_type: "time".to_string(),
                    value: self.slice(start, self.pos).to_string(),
                    position: start,
                });
            }
            return Ok(Token::Time(self.slice(time_start, self.pos)));
        }

        let date_start = self.pos;
        if !self.parse_date_part() {
            return Err(ParseError::InvalidLiteral {
                literal_type: "date".to_string(),
                value: "@".to_string(),
                position: start,
            });
        }

        if self.pos < self.end && self.bytes[self.pos] == b'T' {
            self.pos += 1;
            self.parse_time_part();
            self.parse_timezone();
            Ok(Token::DateTime(self.slice(date_start, self.pos)))
        } else {
            Ok(Token::Date(self.slice(date_start, self.pos)))
        }
    }

    /// Consume `-DD`-style two digit groups introduced by `sep`
    fn two_digit_group(&mut self, sep: u8) -> bool {
        let ok = self.pos + 2 < self.end
            && self.bytes[self.pos] == sep
            && self.digit_at(self.pos + 1)
            && self.digit_at(self.pos + 2);
        if ok {
            self.pos += 3;
        }
        ok
    }

    fn parse_date_part(&mut self) -> bool {
        let start = self.pos;
        while self.digit_at(self.pos) && self.pos - start < 4 {
            self.pos += 1;
        }
        if self.pos - start != 4 {
            return false;
        }
        if self.two_digit_group(b'-') {
            self.two_digit_group(b'-');
        }
        true
    }

    fn parse_time_part(&mut self) {
        if !(self.digit_at(self.pos) && self.digit_at(self.pos + 1)) {
            return;
        }
        self.pos += 2;
        if self.two_digit_group(b':') && self.two_digit_group(b':') {
            if self.pos < self.end && self.bytes[self.pos] == b'.' && self.digit_at(self.pos + 1) {
                self.pos += 1;
                self.skip_digits();
            }
        }
    }

    fn parse_timezone(&mut self) {
        if self.pos >= self.end {
            return;
        }
        match self.bytes[self.pos] {
            b'Z' => self.pos += 1,
            b'+' | b'-' => {
                let save = self.pos;
                self.pos += 1;
                let hours = self.digit_at(self.pos) && self.digit_at(self.pos + 1);
                if hours {
                    self.pos += 2;
                }
                if !(hours && self.two_digit_group(b':')) {
                    self.pos = save;
                }
            }
            _ => {}
        }
    }
}

/// Tokenize the whole input, mostly useful for tests and diagnostics
pub fn tokenize(input: &str) -> ParseResult<Vec<Token<'_>>> {
    let mut tokenizer = Tokenizer::new(input);
    let mut tokens = Vec::new();
    while let Some(token) = tokenizer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tokenizer_basic() {
        let tokens = tokenize("Patient.name").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("Patient"),
                Token::Dot,
                Token::Identifier("name")
            ]
        );
    }

    #[test]
    fn test_operators() {
        let tokens = tokenize("= != < <= > >= ~ !~ | & + - * /").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Equal,
                Token::NotEqual,
                Token::LessThan,
                Token::LessThanOrEqual,
                Token::GreaterThan,
                Token::GreaterThanOrEqual,
                Token::Equivalent,
                Token::NotEquivalent,
                Token::Union,
                Token::Ampersand,
                Token::Plus,
                Token::Minus,
                Token::Multiply,
                Token::Divide,
            ]
        );
    }

    #[test]
    fn test_numbers_and_member_access() {
        assert_eq!(
            tokenize("1.5 + 2").unwrap(),
            vec![Token::Decimal("1.5"), Token::Plus, Token::Integer("2")]
        );
        assert_eq!(
            tokenize("1.toString()").unwrap(),
            vec![
                Token::Integer("1"),
                Token::Dot,
                Token::Identifier("toString"),
                Token::LeftParen,
                Token::RightParen
            ]
        );
    }

    #[test]
    fn test_string_and_delimited_identifier() {
        assert_eq!(
            tokenize(r"'it\'s' `vs-1`").unwrap(),
            vec![
                Token::String(r"it\'s"),
                Token::DelimitedIdentifier("vs-1")
            ]
        );
        assert!(matches!(
            tokenize("'open"),
            Err(ParseError::UnclosedString { position: 0 })
        ));
    }

    #[test]
    fn test_date_time_literals() {
        assert_eq!(
            tokenize("@2023-01-15 @2023-01-15T10:30:00Z @T12:00 @2023").unwrap(),
            vec![
                Token::Date("2023-01-15"),
                Token::DateTime("2023-01-15T10:30:00Z"),
                Token::Time("12:00"),
                Token::Date("2023"),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = tokenize("a // trailing\n/* block */ .b").unwrap();
        assert_eq!(
            tokens,
            vec![Token::Identifier("a"), Token::Dot, Token::Identifier("b")]
        );
    }

    #[test]
    fn test_dollar_variable_recognition() {
        assert_eq!(
            tokenize("$this $index $total").unwrap(),
            vec![Token::DollarThis, Token::DollarIndex, Token::DollarTotal]
        );
        assert!(tokenize("$other").is_err());
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            tokenize("a and b implies c").unwrap(),
            vec![
                Token::Identifier("a"),
                Token::And,
                Token::Identifier("b"),
                Token::Implies,
                Token::Identifier("c")
            ]
        );
    }
}
