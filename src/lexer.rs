use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    ast::{Keyword, Token, TokenKind},
    config::{DEFAULT_TOKENIZE_TIMEOUT, ParsingConfig},
    error::{ParseError, ParseResult},
};

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?").expect("numeric literal pattern")
});

/// Splits an expression into tokens. Positions are byte offsets into the input.
pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
    case_sensitive: bool,
    timeout: Duration,
    deadline: Option<Instant>,
}

/// Tokenizes a whole expression, ending with an [`TokenKind::Eof`] token.
pub fn tokenize(input: &str, config: &ParsingConfig) -> ParseResult<Vec<Token>> {
    let mut lexer = Lexer::with_config(input, config);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.is(&TokenKind::Eof);
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            position: 0,
            case_sensitive: false,
            timeout: DEFAULT_TOKENIZE_TIMEOUT,
            deadline: None,
        }
    }

    pub fn with_config(input: &'a str, config: &ParsingConfig) -> Self {
        Lexer {
            case_sensitive: config.case_sensitive(),
            timeout: config.tokenize_timeout(),
            ..Lexer::new(input)
        }
    }

    /// Rewinds to the start of the input.
    pub fn reset(&mut self) {
        self.position = 0;
        self.deadline = None;
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        self.input[self.position..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.position += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn check_deadline(&mut self) -> ParseResult<()> {
        let timeout = self.timeout;
        let deadline = *self
            .deadline
            .get_or_insert_with(|| Instant::now() + timeout);
        if Instant::now() > deadline {
            return Err(ParseError::new(
                format!(
                    "Tokenization exceeded the time limit of {} ms",
                    self.timeout.as_millis()
                ),
                self.position,
            ));
        }
        Ok(())
    }

    fn read_identifier(&mut self) -> &'a str {
        let start = self.position;
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        let input = self.input;
        &input[start..self.position]
    }

    fn read_quoted(&mut self, quote: char) -> ParseResult<String> {
        let start = self.position;
        let mut result = String::new();
        self.advance(); // opening quote

        while let Some(ch) = self.current_char() {
            match ch {
                c if c == quote => {
                    self.advance();
                    return Ok(result);
                }
                '\\' => {
                    let escape_pos = self.position;
                    self.advance();
                    let escaped = match self.current_char() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('0') => '\0',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some('\\') => '\\',
                        Some('u') => self.read_unicode_escape(escape_pos)?,
                        Some(other) => {
                            return Err(ParseError::new(
                                format!("Invalid escape sequence '\\{}'", other),
                                escape_pos,
                            ));
                        }
                        None => break,
                    };
                    result.push(escaped);
                    self.advance();
                }
                _ => {
                    result.push(ch);
                    self.advance();
                }
            }
        }

        Err(ParseError::new("Unterminated string literal", start))
    }

    /// Reads the four hex digits of `\uXXXX`, leaving the cursor on the last one.
    fn read_unicode_escape(&mut self, escape_pos: usize) -> ParseResult<char> {
        let digits: String = (1..=4).filter_map(|i| self.peek_char(i)).collect();
        let code = (digits.len() == 4)
            .then(|| u32::from_str_radix(&digits, 16).ok())
            .flatten()
            .and_then(char::from_u32)
            .ok_or_else(|| ParseError::new("Invalid unicode escape sequence", escape_pos))?;
        for _ in 0..4 {
            self.advance();
        }
        Ok(code)
    }

    fn read_number(&mut self) -> ParseResult<Token> {
        let start = self.position;
        let matched = NUMBER
            .find(&self.input[start..])
            .ok_or_else(|| ParseError::new("Invalid numeric literal", start))?;
        let is_real = matched.as_str().contains(['.', 'e', 'E']);
        self.position += matched.end();

        if let Some('L' | 'l' | 'M' | 'm' | 'D' | 'd' | 'F' | 'f') = self.current_char() {
            self.advance();
        }
        if self
            .current_char()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            return Err(ParseError::new("Invalid numeric literal", start));
        }

        let kind = if is_real {
            TokenKind::RealLiteral
        } else {
            TokenKind::IntegerLiteral
        };
        Ok(Token::new(kind, &self.input[start..self.position], start))
    }

    /// Emits a token of `len` ASCII characters starting at the cursor.
    fn punct(&mut self, kind: TokenKind, len: usize) -> Token {
        let start = self.position;
        self.position += len;
        Token::new(kind, &self.input[start..self.position], start)
    }

    pub fn next_token(&mut self) -> ParseResult<Token> {
        self.check_deadline()?;
        self.skip_whitespace();

        let start = self.position;
        let token = match self.current_char() {
            None => Token::new(TokenKind::Eof, "", start),
            Some('.') => self.punct(TokenKind::Dot, 1),
            Some(',') => self.punct(TokenKind::Comma, 1),
            Some('(') => self.punct(TokenKind::LParen, 1),
            Some(')') => self.punct(TokenKind::RParen, 1),
            Some('[') => self.punct(TokenKind::LBracket, 1),
            Some(']') => self.punct(TokenKind::RBracket, 1),
            Some('@') => self.punct(TokenKind::At, 1),
            Some('+') => self.punct(TokenKind::Plus, 1),
            Some('-') => self.punct(TokenKind::Minus, 1),
            Some('*') => self.punct(TokenKind::Star, 1),
            Some('/') => self.punct(TokenKind::Slash, 1),
            Some('%') => self.punct(TokenKind::Percent, 1),
            Some(':') => self.punct(TokenKind::Colon, 1),
            Some('?') => {
                if self.peek_char(1) == Some('?') {
                    self.punct(TokenKind::QuestionQuestion, 2)
                } else {
                    self.punct(TokenKind::Question, 1)
                }
            }
            Some('=') => {
                if self.peek_char(1) == Some('=') {
                    self.punct(TokenKind::EqEq, 2)
                } else {
                    self.punct(TokenKind::EqEq, 1)
                }
            }
            Some('!') => {
                if self.peek_char(1) == Some('=') {
                    self.punct(TokenKind::NotEq, 2)
                } else {
                    self.punct(TokenKind::Exclamation, 1)
                }
            }
            Some('<') => match self.peek_char(1) {
                Some('=') => self.punct(TokenKind::LtEq, 2),
                Some('>') => self.punct(TokenKind::NotEq, 2),
                _ => self.punct(TokenKind::Lt, 1),
            },
            Some('>') => {
                if self.peek_char(1) == Some('=') {
                    self.punct(TokenKind::GtEq, 2)
                } else {
                    self.punct(TokenKind::Gt, 1)
                }
            }
            Some('&') if self.peek_char(1) == Some('&') => self.punct(TokenKind::AmpAmp, 2),
            Some('|') if self.peek_char(1) == Some('|') => self.punct(TokenKind::PipePipe, 2),
            Some('"') => {
                let text = self.read_quoted('"')?;
                Token::new(
                    TokenKind::StringLiteral(text),
                    &self.input[start..self.position],
                    start,
                )
            }
            Some('\'') => {
                let text = self.read_quoted('\'')?;
                let mut chars = text.chars();
                let kind = match (chars.next(), chars.next()) {
                    (Some(c), None) => TokenKind::CharLiteral(c),
                    _ => TokenKind::StringLiteral(text),
                };
                Token::new(kind, &self.input[start..self.position], start)
            }
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let ident = self.read_identifier();
                let kind = match Keyword::lookup(ident, self.case_sensitive) {
                    Some(keyword) => TokenKind::Keyword(keyword),
                    None => TokenKind::Identifier,
                };
                Token::new(kind, ident, start)
            }
            Some(ch) if ch.is_ascii_digit() => self.read_number()?,
            Some(ch) => {
                return Err(ParseError::new(
                    format!("Syntax error '{}'", ch),
                    start,
                ));
            }
        };
        Ok(token)
    }
}

#[test]
fn test_keywords() {
    let mut lexer = Lexer::new("new IT Outer inner is as null true false");
    let expected = [
        Keyword::New,
        Keyword::It,
        Keyword::Outer,
        Keyword::Inner,
        Keyword::Is,
        Keyword::As,
        Keyword::Null,
        Keyword::True,
        Keyword::False,
    ];
    for keyword in expected {
        assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Keyword(keyword));
    }
    assert_eq!(lexer.next_token().unwrap().kind, TokenKind::Eof);
}

#[test]
fn test_positions() {
    let mut lexer = Lexer::new("Price >= 10");
    assert_eq!(lexer.next_token().unwrap().pos, 0);
    let op = lexer.next_token().unwrap();
    assert_eq!((op.kind, op.pos), (TokenKind::GtEq, 6));
    assert_eq!(lexer.next_token().unwrap().pos, 9);
}

#[test]
fn test_reset() {
    let mut lexer = Lexer::new("a b");
    lexer.next_token().unwrap();
    lexer.reset();
    assert_eq!(lexer.next_token().unwrap().text, "a");
}
