//! Token stream wrapper for the hand-written parser.

use crate::error::ParseError;
use pdl_ast::Span;
use pdl_lexer::Token;
use std::ops::Range;

/// Token stream with lookahead and span tracking.
///
/// Each slot holds either a token or a lexer error. Lexer errors surface as
/// parse errors at the point the parser reaches them — except inside `init`
/// blocks, which are consumed raw via [`TokenStream::advance_raw`].
pub struct TokenStream {
    tokens: Vec<(Option<Token>, Range<usize>)>,
    pos: usize,
    file_id: u16,
    source_len: u32,
}

impl TokenStream {
    pub fn new(tokens: Vec<(Option<Token>, Range<usize>)>, file_id: u16, source_len: u32) -> Self {
        Self {
            tokens,
            pos: 0,
            file_id,
            source_len,
        }
    }

    /// Peek at the current token; a lexer error slot is a parse error.
    pub fn peek(&self) -> Result<Option<&Token>, ParseError> {
        match self.tokens.get(self.pos) {
            Some((Some(tok), _)) => Ok(Some(tok)),
            Some((None, range)) => Err(ParseError::other(
                "unexpected character",
                self.span_of(range),
            )),
            None => Ok(None),
        }
    }

    /// Peek at the nth token ahead. Lexer error slots read as absent.
    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        match self.tokens.get(self.pos + n) {
            Some((tok, _)) => tok.as_ref(),
            None => None,
        }
    }

    /// Consume and return the current token.
    pub fn advance(&mut self) -> Result<Option<Token>, ParseError> {
        let tok = self.peek()?.cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        Ok(tok)
    }

    /// Current slot whatever it holds (token or lexer error), with its byte
    /// range. Used only by the `init` raw-region skipper, which tracks brace
    /// depth itself and consumes via [`TokenStream::advance_raw`].
    pub fn raw_slot(&self) -> Option<(Option<&Token>, &Range<usize>)> {
        self.tokens
            .get(self.pos)
            .map(|(tok, range)| (tok.as_ref(), range))
    }

    /// Consume the current slot whatever it holds.
    pub fn advance_raw(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// Does the current token match `expected` (by discriminant)?
    pub fn check(&self, expected: &Token) -> bool {
        matches!(
            self.tokens.get(self.pos),
            Some((Some(t), _)) if std::mem::discriminant(t) == std::mem::discriminant(expected)
        )
    }

    /// Expect a specific token and consume it.
    pub fn expect(&mut self, expected: Token) -> Result<Span, ParseError> {
        if self.check(&expected) {
            let span = self.current_span();
            self.pos += 1;
            Ok(span)
        } else {
            Err(ParseError::expected(
                &[expected.describe()],
                self.peek()?.map(|t| t.describe().to_string()),
                self.current_span(),
            ))
        }
    }

    /// Skip newline tokens.
    pub fn skip_newlines(&mut self) {
        while self.check(&Token::Newline) {
            self.pos += 1;
        }
    }

    /// Skip newline and semicolon tokens (item separators inside braces).
    pub fn skip_separators(&mut self) {
        while self.check(&Token::Newline) || self.check(&Token::Semicolon) {
            self.pos += 1;
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Span of the current token, or a zero-length span at EOF.
    pub fn current_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some((_, range)) => self.span_of(range),
            None => Span::new(self.file_id, self.source_len, self.source_len),
        }
    }

    /// End byte of the last consumed token.
    pub fn prev_end(&self) -> u32 {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].1.end as u32
        }
    }

    /// Span from a start byte to the end of the last consumed token.
    pub fn span_from(&self, start: u32) -> Span {
        Span::new(self.file_id, start, self.prev_end().max(start))
    }

    pub fn file_id(&self) -> u16 {
        self.file_id
    }

    fn span_of(&self, range: &Range<usize>) -> Span {
        Span::new(self.file_id, range.start as u32, range.end as u32)
    }
}
