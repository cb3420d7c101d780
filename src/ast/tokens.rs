/// A lexical token together with its source text and byte offset.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Source text the token was read from
    pub text: String,
    /// Byte offset of the first character
    pub pos: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, pos: usize) -> Self {
        Token {
            kind,
            text: text.into(),
            pos,
        }
    }

    pub fn is(&self, kind: &TokenKind) -> bool {
        &self.kind == kind
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    /// Integer literal: digits plus an optional `L`, `M`, `D` or `F` suffix
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 42L
    /// 10m
    /// ```
    IntegerLiteral,

    /// Real literal with a fraction or exponent, plus an optional suffix
    ///
    /// # Examples
    /// ```text
    /// 3.14
    /// 1e3
    /// 19.99m
    /// ```
    RealLiteral,

    /// String literal, already unescaped
    ///
    /// # Examples
    /// ```text
    /// "hello"
    /// 'two or more chars'
    /// ```
    StringLiteral(String),

    /// Single-quoted literal holding exactly one character
    ///
    /// # Examples
    /// ```text
    /// 'a'
    /// '\n'
    /// ```
    CharLiteral(char),

    /// Member, method or type name
    ///
    /// Must start with letter or underscore, followed by letters, digits, or underscores.
    Identifier,

    /// Reserved word
    Keyword(Keyword),

    // Operators
    /// `==` (also written `=`)
    EqEq,
    /// `!=` (also written `<>`)
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    /// `&&` (also written `and`)
    AmpAmp,
    /// `||` (also written `or`)
    PipePipe,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// Null-coalescing `??`
    QuestionQuestion,
    /// Ternary `?`
    Question,
    Colon,
    /// `!` (also written `not`)
    Exclamation,

    // Punctuation
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    /// Prefix of external parameters (`@0`)
    At,

    /// End of input
    Eof,
}

/// Reserved words. Matching is case-insensitive unless the config says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    New,
    It,
    Outer,
    Inner,
    Is,
    As,
    Null,
    True,
    False,
    And,
    Or,
    Not,
}

impl Keyword {
    pub fn lookup(word: &str, case_sensitive: bool) -> Option<Keyword> {
        const KEYWORDS: [(&str, Keyword); 12] = [
            ("new", Keyword::New),
            ("it", Keyword::It),
            ("outer", Keyword::Outer),
            ("inner", Keyword::Inner),
            ("is", Keyword::Is),
            ("as", Keyword::As),
            ("null", Keyword::Null),
            ("true", Keyword::True),
            ("false", Keyword::False),
            ("and", Keyword::And),
            ("or", Keyword::Or),
            ("not", Keyword::Not),
        ];
        KEYWORDS
            .iter()
            .find(|(text, _)| {
                if case_sensitive {
                    *text == word
                } else {
                    text.eq_ignore_ascii_case(word)
                }
            })
            .map(|(_, keyword)| *keyword)
    }
}
