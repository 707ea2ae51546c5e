use std::collections::VecDeque;
use std::fmt::Display;
use std::iter::FusedIterator;
use std::rc::Rc;

use crate::error::TokenizeError;

/// Where a token came from. Cheap to clone: the file name and source text are shared.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLocation {
    #[allow(missing_docs)]
    pub filename: Option<Rc<str>>,
    /// 1-based line of the token start.
    pub line: usize,
    /// The whole program source the token was scanned from.
    pub source: Option<Rc<str>>,
    /// Byte offset of the token start in `source`.
    pub offset: usize,
}

impl SourceLocation {
    /// A location with only a line, for tokens built by hand.
    pub fn at_line(line: usize) -> SourceLocation {
        SourceLocation {
            filename: None,
            line,
            source: None,
            offset: 0,
        }
    }
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let filename = self.filename.as_deref().unwrap_or("<source>");
        write!(f, "{}:{}:{}", filename, self.line, self.offset)
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    // Template structure.
    TextBlock,
    LBraceAt,     // {@
    RBraceAt,     // @}
    LDoubleBrace, // {:
    RDoubleBrace, // :}
    Newline,
    // Punctuation.
    Dot,
    Comma,
    Colon,
    Semicolon,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    // Literals.
    Identifier,
    DqString,
    Integer,
    Float,
    Nil,
    True,
    False,
    // Operators.
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Or,
    And,
    Not,
    // Keywords.
    End,
    Import,
    As,
    From,
    If,
    Elif,
    Else,
    For,
    Break,
    Continue,
    Return,
    Block,
    Inject,
    Global,
    Nonlocal,
    Struct,
    Def,
    Met,
    Extends,
}

/// Token is a single lexical unit of a Pad program.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    #[allow(missing_docs)]
    pub typ: TokenType,
    /// Raw text for identifiers, keywords, numbers, strings (unescaped) and text blocks.
    pub text: Option<String>,
    #[allow(missing_docs)]
    pub int_value: i64,
    #[allow(missing_docs)]
    pub float_value: f64,
    #[allow(missing_docs)]
    pub location: SourceLocation,
}

impl Token {
    /// A token with no payload, mostly useful for building token streams by hand.
    pub fn new(typ: TokenType, location: SourceLocation) -> Token {
        Token {
            typ,
            text: None,
            int_value: 0,
            float_value: 0.0,
            location,
        }
    }

    /// Same as `new`, with text attached.
    pub fn with_text(typ: TokenType, text: impl Into<String>, location: SourceLocation) -> Token {
        Token {
            text: Some(text.into()),
            ..Token::new(typ, location)
        }
    }

    /// The text payload, or the empty string.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

// `line:offset Type "text"`, the text only when there is some.
impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} {:?}",
            self.location.line, self.location.offset, self.typ
        )?;
        match &self.text {
            Some(text) => write!(f, " {:?}", text),
            None => Ok(()),
        }
    }
}

// Which part of the template we are in. Outside of `{@ @}` and `{: :}` everything is raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    Code,
    Ref,
    LineComment,
    BlockComment,
}

/// Scanner takes in a template source and spits out tokens.
#[derive(Debug)]
pub struct Scanner<'a> {
    input: &'a str,
    // byte offset of the first unscanned char
    pos: usize,
    current_line: usize,
    mode: Mode,
    // raw text collected in Text mode, flushed as a TextBlock when a code or ref block opens
    text_buf: String,
    text_start: (usize, usize),
    // one input step can produce two tokens (a text block and the opening brace)
    pending: VecDeque<Token>,
    filename: Option<Rc<str>>,
    source: Rc<str>,
    ended: bool,
}

impl<'a> Scanner<'a> {
    /// Returns a fresh Scanner, ready to spit out tokens from the given source
    pub fn new(source: &'a str) -> Scanner<'a> {
        Scanner {
            input: source,
            pos: 0,
            current_line: 1,
            mode: Mode::Text,
            text_buf: String::new(),
            text_start: (1, 0),
            pending: VecDeque::new(),
            filename: None,
            source: Rc::from(source),
            ended: false,
        }
    }

    /// Like `new`, but locations carry the given file name.
    pub fn with_filename(source: &'a str, filename: &str) -> Scanner<'a> {
        Scanner {
            filename: Some(Rc::from(filename)),
            ..Scanner::new(source)
        }
    }

    /// Scan the whole input, stopping at the first error.
    pub fn tokenize(self) -> Result<Vec<Token>, TokenizeError> {
        self.collect()
    }

    /// Returns the next token, advancing the scanner.
    /// After an error or the end of input this returns None forever.
    pub fn next_token(&mut self) -> Option<Result<Token, TokenizeError>> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return Some(Ok(token));
            }
            if self.ended {
                return None;
            }
            if let Err(e) = self.step() {
                self.ended = true;
                self.pending.clear();
                return Some(Err(e));
            }
        }
    }

    // Consume input until at least one token is pending or the input is exhausted.
    fn step(&mut self) -> Result<(), TokenizeError> {
        while self.pending.is_empty() {
            let start = self.pos;
            let c = match self.take_next_char() {
                Some(c) => c,
                None => return self.finish(),
            };
            match self.mode {
                Mode::Text => self.scan_text(c, start),
                Mode::Code | Mode::Ref => self.scan_code(c, start)?,
                Mode::LineComment => {
                    if c == '\n' || c == '\r' {
                        self.take_next_char_if_matches('\n');
                        self.push(TokenType::Newline, start);
                        self.current_line += 1;
                        self.mode = Mode::Code;
                    }
                }
                Mode::BlockComment => {
                    if c == '\n' {
                        self.current_line += 1;
                    } else if c == '*' && self.take_next_char_if_matches('/') {
                        self.mode = Mode::Code;
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), TokenizeError> {
        self.ended = true;
        self.store_text_block();
        if self.mode != Mode::Text {
            return Err(self.error("not closed by block"));
        }
        Ok(())
    }

    fn scan_text(&mut self, c: char, start: usize) {
        if self.text_buf.is_empty() {
            self.text_start = (self.current_line, start);
        }
        match c {
            '{' if self.take_next_char_if_matches('@') => {
                self.store_text_block();
                self.push(TokenType::LBraceAt, start);
                self.mode = Mode::Code;
            }
            '{' if self.take_next_char_if_matches(':') => {
                self.store_text_block();
                self.push(TokenType::LDoubleBrace, start);
                self.mode = Mode::Ref;
            }
            '\r' | '\n' => {
                let crlf = c == '\r' && self.take_next_char_if_matches('\n');
                // a trailing newline at the very end of the template is dropped
                if self.peek_next_char().is_some() {
                    self.text_buf.push(c);
                    if crlf {
                        self.text_buf.push('\n');
                    }
                    self.current_line += 1;
                }
            }
            c => self.text_buf.push(c),
        }
    }

    fn scan_code(&mut self, c: char, start: usize) -> Result<(), TokenizeError> {
        match c {
            '"' => self.scan_string_literal(start)?,
            '0'..='9' => self.scan_numeric_literal(start)?,
            c if is_identifier_char(c) => self.scan_identifier_or_keyword(start),
            '/' if self.mode == Mode::Code && self.take_next_char_if_matches('/') => {
                self.mode = Mode::LineComment;
            }
            '/' if self.mode == Mode::Code && self.take_next_char_if_matches('*') => {
                self.mode = Mode::BlockComment;
            }
            '\r' | '\n' => {
                if c == '\r' {
                    self.take_next_char_if_matches('\n');
                }
                self.push(TokenType::Newline, start);
                self.current_line += 1;
            }
            '@' if self.mode == Mode::Code => {
                if !self.take_next_char_if_matches('}') {
                    return Err(self.error("invalid syntax. single '@' is not supported"));
                }
                self.push(TokenType::RBraceAt, start);
                self.mode = Mode::Text;
            }
            ':' if self.mode == Mode::Ref && self.take_next_char_if_matches('}') => {
                self.push(TokenType::RDoubleBrace, start);
                self.mode = Mode::Text;
            }
            '=' => self.push_op(start, TokenType::Assign, TokenType::Eq),
            '+' => self.push_op(start, TokenType::Add, TokenType::AddAssign),
            '-' => self.push_op(start, TokenType::Sub, TokenType::SubAssign),
            '*' => self.push_op(start, TokenType::Mul, TokenType::MulAssign),
            '/' => self.push_op(start, TokenType::Div, TokenType::DivAssign),
            '%' => self.push_op(start, TokenType::Mod, TokenType::ModAssign),
            '<' => self.push_op(start, TokenType::Lt, TokenType::Lte),
            '>' => self.push_op(start, TokenType::Gt, TokenType::Gte),
            '!' if self.take_next_char_if_matches('=') => self.push(TokenType::NotEq, start),
            '.' => self.push(TokenType::Dot, start),
            ',' => self.push(TokenType::Comma, start),
            '(' => self.push(TokenType::LParen, start),
            ')' => self.push(TokenType::RParen, start),
            '[' => self.push(TokenType::LBracket, start),
            ']' => self.push(TokenType::RBracket, start),
            '{' => self.push(TokenType::LBrace, start),
            '}' => self.push(TokenType::RBrace, start),
            ':' => self.push(TokenType::Colon, start),
            ';' => self.push(TokenType::Semicolon, start),
            c if c.is_whitespace() => {}
            c => {
                return Err(self.error(format!("syntax error. unsupported character \"{}\"", c)));
            }
        }
        Ok(())
    }

    fn unscanned_input(&self) -> &'a str {
        if self.pos < self.input.len() {
            &self.input[self.pos..]
        } else {
            ""
        }
    }

    fn peek_next_char(&self) -> Option<char> {
        self.unscanned_input().chars().next()
    }

    fn peek_next_next_char(&self) -> Option<char> {
        self.unscanned_input().chars().nth(1)
    }

    fn take_next_char(&mut self) -> Option<char> {
        let next_char = self.peek_next_char()?;
        self.pos += next_char.len_utf8();
        Some(next_char)
    }

    fn take_next_char_if_matches(&mut self, target: char) -> bool {
        match self.peek_next_char() {
            Some(c) if c == target => {
                self.pos += c.len_utf8();
                true
            }
            _ => false,
        }
    }

    fn location(&self, line: usize, offset: usize) -> SourceLocation {
        SourceLocation {
            filename: self.filename.clone(),
            line,
            source: Some(self.source.clone()),
            offset,
        }
    }

    fn error(&self, message: impl Into<String>) -> TokenizeError {
        TokenizeError {
            location: self.location(self.current_line, self.pos),
            message: message.into(),
        }
    }

    fn push(&mut self, typ: TokenType, start: usize) {
        let location = self.location(self.current_line, start);
        self.pending.push_back(Token::new(typ, location));
    }

    // `op` or `op=`, e.g. '+' and '+='
    fn push_op(&mut self, start: usize, single: TokenType, with_equal: TokenType) {
        if self.take_next_char_if_matches('=') {
            self.push(with_equal, start);
        } else {
            self.push(single, start);
        }
    }

    fn store_text_block(&mut self) {
        if self.text_buf.is_empty() {
            return;
        }
        let (line, offset) = self.text_start;
        let text = std::mem::take(&mut self.text_buf);
        let location = self.location(line, offset);
        self.pending
            .push_back(Token::with_text(TokenType::TextBlock, text, location));
    }

    // Assumes the opening double quote has been taken.
    fn scan_string_literal(&mut self, start: usize) -> Result<(), TokenizeError> {
        let line = self.current_line;
        let mut buf = String::new();
        loop {
            match self.take_next_char() {
                Some('"') => break,
                Some('\\') => {
                    let escaped = match self.take_next_char() {
                        Some(c) => c,
                        None => return Err(self.error("not closed by double quote")),
                    };
                    match escaped {
                        '0' => buf.push('\0'),
                        'a' => buf.push('\x07'),
                        'b' => buf.push('\x08'),
                        'f' => buf.push('\x0c'),
                        'n' => buf.push('\n'),
                        'r' => buf.push('\r'),
                        't' => buf.push('\t'),
                        '\\' => buf.push('\\'),
                        '\'' => buf.push('\''),
                        '"' => buf.push('"'),
                        // unknown escapes are kept as written
                        other => {
                            buf.push('\\');
                            buf.push(other);
                        }
                    }
                }
                Some(c) => {
                    if c == '\n' {
                        self.current_line += 1;
                    }
                    buf.push(c);
                }
                None => return Err(self.error("not closed by double quote")),
            }
        }
        let location = self.location(line, start);
        self.pending
            .push_back(Token::with_text(TokenType::DqString, buf, location));
        Ok(())
    }

    // Assumes the first digit has been taken. A '.' must be followed by a digit.
    fn scan_numeric_literal(&mut self, start: usize) -> Result<(), TokenizeError> {
        while let Some('0'..='9') = self.peek_next_char() {
            self.take_next_char();
        }
        let mut typ = TokenType::Integer;
        if self.peek_next_char() == Some('.') {
            if !matches!(self.peek_next_next_char(), Some('0'..='9')) {
                return Err(self.error("invalid float"));
            }
            self.take_next_char();
            while let Some('0'..='9') = self.peek_next_char() {
                self.take_next_char();
            }
            typ = TokenType::Float;
        }
        let raw = &self.input[start..self.pos];
        let location = self.location(self.current_line, start);
        let mut token = Token::with_text(typ, raw, location);
        match typ {
            TokenType::Integer => {
                token.int_value = raw
                    .parse()
                    .map_err(|_| self.error(format!("integer out of range \"{}\"", raw)))?;
            }
            _ => {
                token.float_value = raw
                    .parse()
                    .map_err(|_| self.error(format!("invalid float \"{}\"", raw)))?;
            }
        }
        self.pending.push_back(token);
        Ok(())
    }

    fn scan_identifier_or_keyword(&mut self, start: usize) {
        while self.peek_next_char().map_or(false, is_identifier_char) {
            self.take_next_char();
        }
        let raw = &self.input[start..self.pos];
        let location = self.location(self.current_line, start);
        self.pending
            .push_back(Token::with_text(token_type_from_str(raw), raw, location));
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn token_type_from_str(token_text: &str) -> TokenType {
    match token_text {
        "end" => TokenType::End,
        "import" => TokenType::Import,
        "as" => TokenType::As,
        "from" => TokenType::From,
        "if" => TokenType::If,
        "elif" => TokenType::Elif,
        "else" => TokenType::Else,
        "for" => TokenType::For,
        "or" => TokenType::Or,
        "and" => TokenType::And,
        "not" => TokenType::Not,
        "nil" => TokenType::Nil,
        "break" => TokenType::Break,
        "continue" => TokenType::Continue,
        "return" => TokenType::Return,
        "def" => TokenType::Def,
        "met" => TokenType::Met,
        "true" => TokenType::True,
        "false" => TokenType::False,
        "block" => TokenType::Block,
        "inject" => TokenType::Inject,
        "global" => TokenType::Global,
        "nonlocal" => TokenType::Nonlocal,
        "extends" => TokenType::Extends,
        "struct" => TokenType::Struct,
        _ => TokenType::Identifier,
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Token, TokenizeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

impl<'a> FusedIterator for Scanner<'a> {}

#[cfg(test)]
mod test {
    use super::*;

    fn types(source: &str) -> Vec<TokenType> {
        Scanner::new(source)
            .tokenize()
            .expect("scanning succeeds")
            .into_iter()
            .map(|t| t.typ)
            .collect()
    }

    #[test]
    fn big_happy_path_test() {
        use TokenType::*;
        let input = "abc{@ a += 1 // comment\n  b[0].c(\"x\") != 2.5 @}def{: v :}\n";
        let tokens = Scanner::new(input).tokenize().expect("scanning succeeds");
        let got: Vec<_> = tokens.iter().map(|t| t.typ).collect();
        let expected = vec![
            TextBlock, LBraceAt, Identifier, AddAssign, Integer, Newline, Identifier, LBracket,
            Integer, RBracket, Dot, Identifier, LParen, DqString, RParen, NotEq, Float, RBraceAt,
            TextBlock, LDoubleBrace, Identifier, RDoubleBrace,
        ];
        assert_eq!(got, expected);
        assert_eq!(tokens[0].text(), "abc");
        assert_eq!(tokens[4].int_value, 1);
        assert_eq!(tokens[6].location.line, 2);
        assert_eq!(tokens[16].float_value, 2.5);
        assert_eq!(tokens[18].text(), "def");
    }

    #[test]
    fn test_keywords_and_identifiers() {
        use TokenType::*;
        let got = types("{@ if elif else end for break continue return def met struct block inject extends import from as global nonlocal and or not nil true false iff _x @}");
        assert_eq!(
            got,
            vec![
                LBraceAt, If, Elif, Else, End, For, Break, Continue, Return, Def, Met, Struct,
                Block, Inject, Extends, Import, From, As, Global, Nonlocal, And, Or, Not, Nil,
                True, False, Identifier, Identifier, RBraceAt,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = Scanner::new(r#"{@ "a\n\t\"b\q" @}"#).tokenize().unwrap();
        assert_eq!(tokens[1].typ, TokenType::DqString);
        assert_eq!(tokens[1].text(), "a\n\t\"b\\q");
    }

    #[test]
    fn test_single_atmark_is_an_error() {
        let err = Scanner::new("{@ a @ b @}").tokenize().unwrap_err();
        assert_eq!(err.message, "invalid syntax. single '@' is not supported");
    }

    #[test]
    fn test_unclosed_block_is_an_error() {
        let err = Scanner::new("text {@ a = 1").tokenize().unwrap_err();
        assert_eq!(err.message, "not closed by block");
    }

    #[test]
    fn test_trailing_newline_dropped_from_text() {
        let tokens = Scanner::new("hello\nworld\n").tokenize().unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text(), "hello\nworld");
    }

    #[test]
    fn test_block_comment_counts_lines() {
        let tokens = Scanner::new("{@ /* a\nb */ x @}").tokenize().unwrap();
        assert_eq!(tokens[1].typ, TokenType::Identifier);
        assert_eq!(tokens[1].location.line, 2);
    }

    #[test]
    fn test_filename_in_location() {
        let tokens = Scanner::with_filename("{@ x @}", "a.pad").tokenize().unwrap();
        assert_eq!(tokens[1].location.to_string(), "a.pad:1:3");
    }
}
