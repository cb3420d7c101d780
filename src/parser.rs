use std::str::FromStr;

use rust_decimal::Decimal;

use crate::{
    ast::{
        BinOp, Expr, ExprKind, ImplicitParam, Keyword, Literal, OrderingItem, Projection, Token,
        TokenKind, TypeTestOp, UnaryOp,
    },
    config::ParsingConfig,
    error::{ParseError, ParseResult},
    lexer,
};

/// Methods whose trailing argument is a type name rather than an expression.
const TYPE_SENSITIVE_METHODS: [&str; 4] = ["OfType", "Cast", "is", "as"];

/// Recursive-descent parser over a token vector.
///
/// Precedence, lowest first: `?:`, `??`, `||`, `&&`, equality (`==`, `!=`, `is`, `as`),
/// relational, additive, multiplicative, unary, primary.
pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
    case_sensitive: bool,
    /// Cleared while parsing a `new(...)` member so `as` names the property
    infix_as: bool,
}

impl Parser {
    /// Creates a parser over `tokens`. A stream that does not end in `Eof` is
    /// terminated with one positioned after its last token.
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if !tokens.last().is_some_and(|token| token.is(&TokenKind::Eof)) {
            let end = tokens
                .last()
                .map_or(0, |token| token.pos + token.text.len());
            tokens.push(Token::new(TokenKind::Eof, "", end));
        }
        Parser {
            tokens,
            index: 0,
            case_sensitive: false,
            infix_as: true,
        }
    }

    /// Tokenizes `input` and returns a parser over the result.
    pub fn from_source(input: &str, config: &ParsingConfig) -> ParseResult<Self> {
        let tokens = lexer::tokenize(input, config)?;
        Ok(Parser {
            case_sensitive: config.case_sensitive(),
            ..Parser::new(tokens)
        })
    }

    fn current(&self) -> &Token {
        // `new` guarantees a trailing Eof
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek(&self, offset: usize) -> &Token {
        &self.tokens[(self.index + offset).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.current().is(kind)
    }

    fn check_keyword(&self, keyword: Keyword) -> bool {
        self.check(&TokenKind::Keyword(keyword))
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        if !self.check(&kind) {
            return Err(self.error_here(format!("{} expected", what)));
        }
        let token = self.current().clone();
        self.advance();
        Ok(token)
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.current().pos)
    }

    fn unexpected(&self) -> ParseError {
        let token = self.current();
        match token.kind {
            TokenKind::Eof => ParseError::new("Expression expected", token.pos),
            _ => ParseError::new(format!("Syntax error: unexpected '{}'", token.text), token.pos),
        }
    }

    fn names_equal(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }

    /// Parses a complete expression; trailing tokens are an error.
    pub fn parse(&mut self) -> ParseResult<Expr> {
        let expr = self.parse_expression()?;
        if !self.check(&TokenKind::Eof) {
            return Err(self.unexpected());
        }
        Ok(expr)
    }

    /// Parses `expr [ASC|DESC], ...` into ordering keys, preserving their order.
    pub fn parse_ordering(&mut self) -> ParseResult<Vec<OrderingItem>> {
        let mut items = Vec::new();
        loop {
            let expr = self.parse_expression()?;
            let mut ascending = true;
            if self.check(&TokenKind::Identifier) {
                let word = self.current().text.clone();
                if self.names_equal(&word, "asc") || self.names_equal(&word, "ascending") {
                    self.advance();
                } else if self.names_equal(&word, "desc") || self.names_equal(&word, "descending")
                {
                    ascending = false;
                    self.advance();
                }
            }
            items.push(OrderingItem { expr, ascending });

            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        if !self.check(&TokenKind::Eof) {
            return Err(self.unexpected());
        }
        Ok(items)
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_conditional()
    }

    fn parse_conditional(&mut self) -> ParseResult<Expr> {
        let test = self.parse_coalesce()?;
        if !self.check(&TokenKind::Question) {
            return Ok(test);
        }
        self.advance();
        let if_true = self.parse_expression()?;
        self.expect(TokenKind::Colon, "':'")?;
        let if_false = self.parse_expression()?;
        let pos = test.pos;
        Ok(Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                if_true: Box::new(if_true),
                if_false: Box::new(if_false),
            },
            pos,
        ))
    }

    fn parse_coalesce(&mut self) -> ParseResult<Expr> {
        let left = self.parse_or()?;
        if !self.check(&TokenKind::QuestionQuestion) {
            return Ok(left);
        }
        let pos = self.current().pos;
        self.advance();
        let right = self.parse_coalesce()?; // right-associative
        Ok(binary(BinOp::NullCoalesce, left, right, pos))
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;

        while self.check(&TokenKind::PipePipe) || self.check_keyword(Keyword::Or) {
            let pos = self.current().pos;
            self.advance();
            let right = self.parse_and()?;
            left = binary(BinOp::Or, left, right, pos);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_equality()?;

        while self.check(&TokenKind::AmpAmp) || self.check_keyword(Keyword::And) {
            let pos = self.current().pos;
            self.advance();
            let right = self.parse_equality()?;
            left = binary(BinOp::And, left, right, pos);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_relational()?;

        loop {
            let pos = self.current().pos;
            let op = match &self.current().kind {
                TokenKind::EqEq => BinOp::Equal,
                TokenKind::NotEq => BinOp::NotEqual,
                TokenKind::Keyword(Keyword::Is) => {
                    self.advance();
                    left = self.finish_type_test(TypeTestOp::Is, left, pos)?;
                    continue;
                }
                TokenKind::Keyword(Keyword::As) if self.infix_as => {
                    self.advance();
                    left = self.finish_type_test(TypeTestOp::As, left, pos)?;
                    continue;
                }
                _ => break,
            };
            self.advance();
            let right = self.parse_relational()?;
            left = binary(op, left, right, pos);
        }
        Ok(left)
    }

    fn finish_type_test(&mut self, op: TypeTestOp, operand: Expr, pos: usize) -> ParseResult<Expr> {
        let target = self.parse_type_name()?;
        Ok(Expr::new(
            ExprKind::TypeTest {
                op,
                operand: Box::new(operand),
                target: Box::new(target),
            },
            pos,
        ))
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match &self.current().kind {
                TokenKind::Lt => BinOp::LessThan,
                TokenKind::Gt => BinOp::GreaterThan,
                TokenKind::LtEq => BinOp::LessEqual,
                TokenKind::GtEq => BinOp::GreaterEqual,
                _ => break,
            };
            let pos = self.current().pos;
            self.advance();
            let right = self.parse_additive()?;
            left = binary(op, left, right, pos);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match &self.current().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Subtract,
                _ => break,
            };
            let pos = self.current().pos;
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right, pos);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match &self.current().kind {
                TokenKind::Star => BinOp::Multiply,
                TokenKind::Slash => BinOp::Divide,
                TokenKind::Percent => BinOp::Modulo,
                _ => break,
            };
            let pos = self.current().pos;
            self.advance();
            let right = self.parse_unary()?;
            left = binary(op, left, right, pos);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let pos = self.current().pos;
        let op = match &self.current().kind {
            TokenKind::Exclamation | TokenKind::Keyword(Keyword::Not) => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Negate,
            _ => return self.parse_postfix(),
        };
        self.advance();

        // -123 is a literal, so the narrowest-type rule sees the sign
        let numeric = matches!(
            self.current().kind,
            TokenKind::IntegerLiteral | TokenKind::RealLiteral
        );
        let followed_by_postfix = matches!(
            self.peek(1).kind,
            TokenKind::Dot | TokenKind::LBracket
        );
        if op == UnaryOp::Negate && numeric && !followed_by_postfix {
            let token = self.current().clone();
            self.advance();
            let literal = numeric_literal(&token, true)?;
            return Ok(Expr::new(ExprKind::Literal(literal), pos));
        }

        let operand = self.parse_unary()?;
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            pos,
        ))
    }

    /// Member access, method calls and indexers following a primary expression.
    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.check(&TokenKind::Dot) {
                self.advance();
                let name_token = self.current().clone();
                if !matches!(name_token.kind, TokenKind::Identifier | TokenKind::Keyword(_)) {
                    return Err(self.error_here("Identifier expected"));
                }
                self.advance();

                if self.check(&TokenKind::LParen) {
                    let args = self.parse_arguments(&name_token.text)?;
                    expr = Expr::new(
                        ExprKind::MethodCall {
                            target: Some(Box::new(expr)),
                            name: name_token.text,
                            args,
                        },
                        name_token.pos,
                    );
                } else {
                    expr = Expr::new(
                        ExprKind::MemberAccess {
                            target: Box::new(expr),
                            name: name_token.text,
                        },
                        name_token.pos,
                    );
                }
            } else if self.check(&TokenKind::LBracket) {
                let pos = self.current().pos;
                self.advance();
                let index = self.with_infix_as(true, Parser::parse_expression)?;
                self.expect(TokenKind::RBracket, "']'")?;
                expr = Expr::new(
                    ExprKind::Indexer {
                        target: Box::new(expr),
                        index: Box::new(index),
                    },
                    pos,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Parse primary expressions (atoms): literals, names, parameters, `new(...)`, `( )`
    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        let pos = token.pos;

        match token.kind {
            TokenKind::IntegerLiteral | TokenKind::RealLiteral => {
                self.advance();
                let literal = numeric_literal(&token, false)?;
                Ok(Expr::new(ExprKind::Literal(literal), pos))
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::String(s)), pos))
            }
            TokenKind::CharLiteral(c) => {
                self.advance();
                Ok(Expr::new(ExprKind::Literal(Literal::Char(c)), pos))
            }
            TokenKind::Keyword(keyword) => self.parse_keyword(keyword, token),
            TokenKind::Identifier => {
                self.advance();
                if self.check(&TokenKind::LParen) {
                    let args = self.parse_arguments(&token.text)?;
                    return Ok(Expr::new(
                        ExprKind::MethodCall {
                            target: None,
                            name: token.text,
                            args,
                        },
                        pos,
                    ));
                }
                Ok(Expr::new(ExprKind::Identifier(token.text), pos))
            }
            TokenKind::At => {
                self.advance();
                let index_token = self.current().clone();
                let index = match index_token.kind {
                    TokenKind::IntegerLiteral => index_token.text.parse::<usize>().ok(),
                    _ => None,
                }
                .ok_or_else(|| self.error_here("Parameter index expected after '@'"))?;
                self.advance();
                Ok(Expr::new(ExprKind::ExternalParam(index), pos))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.with_infix_as(true, Parser::parse_expression)?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_keyword(&mut self, keyword: Keyword, token: Token) -> ParseResult<Expr> {
        let pos = token.pos;
        let kind = match keyword {
            Keyword::True => ExprKind::Literal(Literal::Boolean(true)),
            Keyword::False => ExprKind::Literal(Literal::Boolean(false)),
            Keyword::Null => ExprKind::Literal(Literal::Null),
            Keyword::It => ExprKind::ImplicitParam(ImplicitParam::It),
            Keyword::Outer => ExprKind::ImplicitParam(ImplicitParam::Outer),
            Keyword::Inner => ExprKind::ImplicitParam(ImplicitParam::Inner),
            Keyword::New => {
                self.advance();
                return self.parse_new(pos);
            }
            // is(...) / as(...) used as functions
            Keyword::Is | Keyword::As if self.peek(1).is(&TokenKind::LParen) => {
                self.advance();
                let name = if keyword == Keyword::Is { "is" } else { "as" };
                let args = self.parse_arguments(name)?;
                return Ok(Expr::new(
                    ExprKind::MethodCall {
                        target: None,
                        name: name.to_string(),
                        args,
                    },
                    pos,
                ));
            }
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(Expr::new(kind, pos))
    }

    /// `new(expr as Name, ...)`; the `new` keyword is already consumed.
    fn parse_new(&mut self, pos: usize) -> ParseResult<Expr> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut members = Vec::new();

        while !self.check(&TokenKind::RParen) {
            let expr = self.with_infix_as(false, Parser::parse_expression)?;

            let (name, name_pos) = if self.check_keyword(Keyword::As) {
                self.advance();
                let name_token = self.current().clone();
                if !matches!(name_token.kind, TokenKind::Identifier | TokenKind::Keyword(_)) {
                    return Err(self.error_here("Property name expected after 'as'"));
                }
                self.advance();
                (name_token.text, name_token.pos)
            } else {
                match expr.path_name() {
                    Some(name) => (name.to_string(), expr.pos),
                    None => return Err(self.error_here("'as' expected")),
                }
            };
            members.push(Projection {
                name,
                expr,
                name_pos,
            });

            if !self.check(&TokenKind::RParen) {
                self.expect(TokenKind::Comma, "',' or ')'")?;
            }
        }

        self.expect(TokenKind::RParen, "')'")?;
        Ok(Expr::new(ExprKind::NewProjection(members), pos))
    }

    /// Parenthesized argument list. For type-sensitive methods a trailing argument
    /// shaped like a type name becomes a [`ExprKind::TypeLiteral`].
    fn parse_arguments(&mut self, method: &str) -> ParseResult<Vec<Expr>> {
        self.expect(TokenKind::LParen, "'('")?;
        let type_sensitive = TYPE_SENSITIVE_METHODS
            .iter()
            .any(|name| self.names_equal(name, method));
        let mut args = Vec::new();

        while !self.check(&TokenKind::RParen) {
            let arg = if type_sensitive && self.type_name_ends_argument_list() {
                self.parse_type_name()?
            } else {
                self.with_infix_as(true, Parser::parse_expression)?
            };
            args.push(arg);

            if !self.check(&TokenKind::RParen) {
                self.expect(TokenKind::Comma, "',' or ')'")?;
            }
        }

        self.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    /// True when the upcoming tokens are a string literal or dotted name followed by `)`.
    fn type_name_ends_argument_list(&self) -> bool {
        match &self.current().kind {
            TokenKind::StringLiteral(_) => self.peek(1).is(&TokenKind::RParen),
            TokenKind::Identifier => {
                let mut offset = 1;
                while self.peek(offset).is(&TokenKind::Dot)
                    && self.peek(offset + 1).is(&TokenKind::Identifier)
                {
                    offset += 2;
                }
                self.peek(offset).is(&TokenKind::RParen)
            }
            _ => false,
        }
    }

    /// A type name: a string literal or a dotted identifier chain.
    fn parse_type_name(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::StringLiteral(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::TypeLiteral(name), token.pos))
            }
            TokenKind::Identifier => {
                self.advance();
                let mut name = token.text;
                while self.check(&TokenKind::Dot) && self.peek(1).is(&TokenKind::Identifier) {
                    self.advance();
                    name.push('.');
                    name.push_str(&self.current().text);
                    self.advance();
                }
                Ok(Expr::new(ExprKind::TypeLiteral(name), token.pos))
            }
            _ => Err(self.error_here("Type name expected")),
        }
    }

    fn with_infix_as<T>(
        &mut self,
        enabled: bool,
        parse: fn(&mut Parser) -> ParseResult<T>,
    ) -> ParseResult<T> {
        let saved = std::mem::replace(&mut self.infix_as, enabled);
        let result = parse(self);
        self.infix_as = saved;
        result
    }
}

fn binary(op: BinOp, left: Expr, right: Expr, pos: usize) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        pos,
    )
}

/// Converts a numeric token to the narrowest literal kind its text and suffix allow.
fn numeric_literal(token: &Token, negative: bool) -> ParseResult<Literal> {
    let text = token.text.as_str();
    let (digits, suffix) = match text.chars().last() {
        Some(c) if c.is_ascii_alphabetic() && !text.ends_with(['e', 'E']) => {
            (&text[..text.len() - 1], Some(c.to_ascii_uppercase()))
        }
        _ => (text, None),
    };
    let signed = if negative {
        format!("-{}", digits)
    } else {
        digits.to_string()
    };
    let invalid = || ParseError::new(format!("Invalid numeric literal '{}'", text), token.pos);

    let literal = match (&token.kind, suffix) {
        (TokenKind::IntegerLiteral, None) => {
            let value: i128 = signed.parse().map_err(|_| invalid())?;
            if let Ok(n) = i32::try_from(value) {
                Literal::Int32(n)
            } else if let Ok(n) = i64::try_from(value) {
                Literal::Int64(n)
            } else {
                return Err(invalid());
            }
        }
        (TokenKind::IntegerLiteral, Some('L')) => {
            Literal::Int64(signed.parse().map_err(|_| invalid())?)
        }
        (_, Some('M')) => {
            let parsed = if signed.contains(['e', 'E']) {
                Decimal::from_scientific(&signed)
            } else {
                Decimal::from_str(&signed)
            };
            Literal::Decimal(parsed.map_err(|_| invalid())?)
        }
        (_, None | Some('D') | Some('F')) => {
            Literal::Double(signed.parse().map_err(|_| invalid())?)
        }
        _ => return Err(invalid()),
    };
    Ok(literal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(text: &str) -> ParseResult<Literal> {
        let config = ParsingConfig::default();
        let expr = Parser::from_source(text, &config)?.parse()?;
        match expr.kind {
            ExprKind::Literal(literal) => Ok(literal),
            other => panic!("expected literal, got {:?}", other),
        }
    }

    #[test]
    fn test_narrowest_integer_kind() {
        assert_eq!(literal("42").unwrap(), Literal::Int32(42));
        assert_eq!(literal("3000000000").unwrap(), Literal::Int64(3_000_000_000));
        assert_eq!(literal("-2147483648").unwrap(), Literal::Int32(i32::MIN));
        assert_eq!(literal("7L").unwrap(), Literal::Int64(7));
    }

    #[test]
    fn test_suffixes() {
        assert_eq!(literal("1.5m").unwrap(), Literal::Decimal(Decimal::new(15, 1)));
        assert_eq!(literal("2d").unwrap(), Literal::Double(2.0));
        assert_eq!(literal("1e3").unwrap(), Literal::Double(1000.0));
        assert!(literal("1.5L").is_err());
    }
}
