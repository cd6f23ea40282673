//! Tokenizer for the small slice of SQL expression text that column names,
//!  select lists and non-literal filter values may contain.
//!
//! #Notes
//! Words include `.` so that `table.column` and `1.5` come out as a single
//!  token; the sanitizer decides later whether a word is a number, a keyword
//!  or an identifier. Anything the sanitizer never emits (`;`, `=`, `#`, `\`,
//!  backticks, non-ASCII...) becomes an `Other` token so callers can drop it.
use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TokenType {
    ParenLeft,
    ParenRight,
    Comma,
    Plus,
    Minus,
    Asterisk,
    ForwardSlash,
    Word,
    StringSingleQuote,
    StringDoubleQuote,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub ty: TokenType,

    // Byte indexes into the source
    start: usize,
    end: usize,
}

impl Token {
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    UnterminatedStringLiteral(usize),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnterminatedStringLiteral(start) => {
                write!(f, "Unterminated string literal starting at {start}")
            }
        }
    }
}

impl std::error::Error for Error {}

#[inline]
pub fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

/// Cheap to copy, like a cursor: holds the source and an index.
#[derive(Clone)]
pub struct Lexer<'input> {
    source: &'input str,
    current: usize,
}

impl<'input> Lexer<'input> {
    pub fn new(source: &'input str) -> Self {
        Self { source, current: 0 }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current >= self.source.len()
    }

    #[inline]
    fn bytes(&self) -> &'input [u8] {
        self.source.as_bytes()
    }

    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.bytes().get(self.current).copied()
    }

    #[inline]
    pub fn pop(&mut self) -> Option<u8> {
        let res = self.peek();
        if res.is_some() {
            self.current += 1;
        }
        res
    }

    #[inline]
    fn consume_while(&mut self, predicate: impl Fn(u8) -> bool) {
        while let Some(c) = self.peek()
            && predicate(c)
        {
            self.current += 1;
        }
    }

    #[inline]
    fn consume_whitespace(&mut self) {
        self.consume_while(|b| b.is_ascii_whitespace());
    }

    /// Consumes a quoted literal whose opening quote was already popped.
    ///  Backslash escapes the following byte.
    fn consume_string(&mut self, quote: u8, start: usize) -> Result<(), Error> {
        loop {
            match self.pop() {
                None => return Err(Error::UnterminatedStringLiteral(start)),
                Some(b'\\') => {
                    self.pop();
                }
                Some(b) if b == quote => return Ok(()),
                Some(_) => {}
            }
        }
    }

    /// Returns the slice of the source that this token was lexed from.
    #[inline]
    pub fn source_of(&self, token: &Token) -> &'input str {
        &self.source[token.start..token.end]
    }

    /// Like [source_of] but omits the quotes of string literal tokens.
    #[inline]
    pub fn contents(&self, token: &Token) -> &'input str {
        let s = self.source_of(token);
        match token.ty {
            TokenType::StringSingleQuote | TokenType::StringDoubleQuote => &s[1..s.len() - 1],
            _ => s,
        }
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, Error> {
        self.consume_whitespace();

        let start = self.current;
        let Some(first) = self.pop() else {
            return Ok(None);
        };

        macro_rules! tok {
            ($name:ident) => {{
                Token {
                    ty: TokenType::$name,
                    start,
                    end: self.current,
                }
            }};
        }

        Ok(Some(match first {
            b'(' => tok!(ParenLeft),
            b')' => tok!(ParenRight),
            b',' => tok!(Comma),
            b'+' => tok!(Plus),
            b'-' => tok!(Minus),
            b'*' => tok!(Asterisk),
            b'/' => tok!(ForwardSlash),
            b'\'' => {
                self.consume_string(b'\'', start)?;
                tok!(StringSingleQuote)
            }
            b'"' => {
                self.consume_string(b'"', start)?;
                tok!(StringDoubleQuote)
            }
            b if is_word_byte(b) => {
                self.consume_while(is_word_byte);
                tok!(Word)
            }
            _ => {
                // keep multi-byte characters whole so slices stay on char
                //  boundaries
                self.consume_while(|b| b & 0b1100_0000 == 0b1000_0000);
                tok!(Other)
            }
        }))
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

static FUNCTION_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_]+)\s*\(").expect("valid function head regex"));

/// Splits `NAME(ARGS)` into its name and raw argument text. The opening
///  parenthesis must close exactly at the end of `expr`; quoted parentheses
///  don't count.
pub fn split_function_call(expr: &str) -> Option<(&str, &str)> {
    let head = FUNCTION_HEAD.captures(expr)?;
    let name = head.get(1)?.as_str();
    let open = head.get(0)?.end() - 1;

    let mut lexer = Lexer::new(&expr[open..]);
    let mut depth = 0usize;
    while let Some(token) = lexer.next_token().ok()? {
        match token.ty {
            TokenType::ParenLeft => depth += 1,
            TokenType::ParenRight => {
                depth -= 1;
                if depth == 0 {
                    let close = open + token.start;
                    return (close == expr.len() - 1).then(|| (name, &expr[open + 1..close]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits function arguments on top-level commas. Commas nested in
///  parentheses or quotes stay put. Text that doesn't lex is returned whole.
pub fn split_arguments(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0isize;
    let mut from = 0;
    for token in Lexer::new(args) {
        let Ok(token) = token else {
            return vec![args];
        };
        match token.ty {
            TokenType::ParenLeft => depth += 1,
            TokenType::ParenRight => depth -= 1,
            TokenType::Comma if depth == 0 => {
                parts.push(&args[from..token.start]);
                from = token.end;
            }
            _ => {}
        }
    }
    parts.push(&args[from..]);
    parts
}

/// Finds the last top-level `AS` keyword surrounded by whitespace and splits
///  around it. Both sides must be non-empty.
pub fn split_alias(expr: &str) -> Option<(&str, &str)> {
    let bytes = expr.as_bytes();
    let mut depth = 0isize;
    let mut split = None;
    for token in Lexer::new(expr) {
        let token = token.ok()?;
        match token.ty {
            TokenType::ParenLeft => depth += 1,
            TokenType::ParenRight => depth -= 1,
            TokenType::Word if depth == 0 => {
                let word = &expr[token.start..token.end];
                let spaced_before = token.start > 0 && bytes[token.start - 1].is_ascii_whitespace();
                let spaced_after = bytes.get(token.end).is_some_and(|b| b.is_ascii_whitespace());
                if word.eq_ignore_ascii_case("as") && spaced_before && spaced_after {
                    let left = expr[..token.start].trim();
                    let right = expr[token.end..].trim();
                    if !left.is_empty() && !right.is_empty() {
                        split = Some((left, right));
                    }
                }
            }
            _ => {}
        }
    }
    split
}
