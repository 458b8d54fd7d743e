//! Recursive-descent parser for platform descriptions.
//!
//! The grammar is line-sensitive at entry boundaries: an entry without a
//! brace block ends at the newline, and brace blocks span newlines with `;`
//! or newline separating their items. `init` blocks are not tokenized — the
//! parser tracks brace depth over the token stream and captures the raw
//! source text between the braces.

use crate::error::ParseError;
use crate::stream::TokenStream;
use logos::Logos;
use pdl_ast::{
    Attribute, Description, Entry, EnumLiteral, Ident, InitAttribute, IrqAttribute,
    IrqDestination, IrqEnd, IrqTarget, NumberLiteral, ObjectValue, ParamAttribute, RangeLiteral,
    Reference, RegistrationInfo, Span, Spanned, Using, Value,
};
use pdl_lexer::Token;

/// Parse one source file into a [`Description`].
pub fn parse(source: &str, file_id: u16) -> Result<Description, ParseError> {
    let tokens = Token::lexer(source)
        .spanned()
        .map(|(tok, range)| (tok.ok(), range))
        .collect();
    let stream = TokenStream::new(tokens, file_id, source.len() as u32);
    Parser { stream, source }.parse_description()
}

struct Parser<'src> {
    stream: TokenStream,
    source: &'src str,
}

impl<'src> Parser<'src> {
    fn parse_description(mut self) -> Result<Description, ParseError> {
        let mut description = Description::default();
        let mut seen_entry = false;
        loop {
            self.stream.skip_separators();
            if self.stream.at_end() {
                return Ok(description);
            }
            if self.stream.check(&Token::Using) {
                if seen_entry {
                    return Err(ParseError::other(
                        "'using' directives must precede all entries",
                        self.stream.current_span(),
                    ));
                }
                description.usings.push(self.parse_using()?);
            } else {
                description.entries.push(self.parse_entry()?);
                seen_entry = true;
            }
            self.expect_line_end()?;
        }
    }

    fn parse_using(&mut self) -> Result<Using, ParseError> {
        let start = self.stream.current_span().start;
        self.stream.expect(Token::Using)?;
        let path = self.expect_string()?;
        let prefix = if self.stream.check(&Token::Prefix) {
            self.stream.expect(Token::Prefix)?;
            Some(self.expect_string()?)
        } else {
            None
        };
        Ok(Using {
            path,
            prefix,
            span: self.stream.span_from(start),
        })
    }

    fn parse_entry(&mut self) -> Result<Entry, ParseError> {
        let variable = self.expect_ident()?;
        let start = variable.span.start;
        self.stream.expect(Token::Colon)?;
        let local = self.eat(&Token::Local);

        // An identifier here is a type name unless it opens an inline
        // attribute (`name:` or `name ->`).
        let type_name = if matches!(self.stream.peek_nth(0), Some(Token::Ident(_)))
            && !matches!(
                self.stream.peek_nth(1),
                Some(Token::Colon) | Some(Token::Arrow)
            ) {
            Some(self.parse_dotted_name()?.0)
        } else {
            None
        };

        let registrations = if self.stream.check(&Token::At) {
            Some(self.parse_registrations()?)
        } else {
            None
        };

        let alias = if self.eat(&Token::As) {
            Some(self.expect_string()?)
        } else {
            None
        };

        let attributes = self.parse_attribute_clause(true)?;

        Ok(Entry {
            variable,
            local,
            type_name,
            alias,
            registrations,
            attributes,
            span: self.stream.span_from(start),
        })
    }

    /// `@ none`, `@ register [point]`, or `@ { register [point]; ... }`.
    fn parse_registrations(&mut self) -> Result<Vec<RegistrationInfo>, ParseError> {
        let at = self.stream.expect(Token::At)?;
        if self.stream.check(&Token::None) {
            let none = self.stream.expect(Token::None)?;
            return Ok(vec![RegistrationInfo {
                register: None,
                point: None,
                span: at.merge(none),
            }]);
        }
        if self.eat(&Token::LBrace) {
            let mut infos = Vec::new();
            loop {
                self.stream.skip_separators();
                if self.eat(&Token::RBrace) {
                    break;
                }
                infos.push(self.parse_registration()?);
                self.expect_item_separator()?;
            }
            Ok(infos)
        } else {
            Ok(vec![self.parse_registration()?])
        }
    }

    fn parse_registration(&mut self) -> Result<RegistrationInfo, ParseError> {
        let register = self.expect_ident()?;
        let start = register.span.start;
        let point = if self.starts_registration_point() {
            Some(self.parse_value()?)
        } else {
            None
        };
        Ok(RegistrationInfo {
            register: Some(register),
            point,
            span: self.stream.span_from(start),
        })
    }

    /// A registration point follows if the next token can start a value and
    /// is not the head of an attribute (`name:`).
    fn starts_registration_point(&self) -> bool {
        match self.stream.peek_nth(0) {
            Some(Token::Ident(_)) => !matches!(self.stream.peek_nth(1), Some(Token::Colon)),
            Some(
                Token::String(_)
                | Token::True
                | Token::False
                | Token::Minus
                | Token::Integer(_)
                | Token::HexInteger(_)
                | Token::Float(_)
                | Token::Lt
                | Token::Empty,
            ) => true,
            _ => false,
        }
    }

    /// Attributes of an entry or object value: a brace block, an inline
    /// `;`-separated list ending at the newline, or nothing.
    fn parse_attribute_clause(&mut self, allow_irq: bool) -> Result<Vec<Attribute>, ParseError> {
        let mut attributes = Vec::new();
        if self.stream.check(&Token::LBrace) {
            self.stream.expect(Token::LBrace)?;
            loop {
                self.stream.skip_separators();
                if self.eat(&Token::RBrace) {
                    break;
                }
                if self.stream.at_end() {
                    return Err(ParseError::expected(
                        &["attribute", "'}'"],
                        None,
                        self.stream.current_span(),
                    ));
                }
                attributes.push(self.parse_attribute(allow_irq)?);
                self.expect_item_separator()?;
            }
        } else {
            while self.starts_attribute() {
                attributes.push(self.parse_attribute(allow_irq)?);
                if !self.eat(&Token::Semicolon) {
                    break;
                }
                self.stream.skip_newlines();
            }
        }
        Ok(attributes)
    }

    fn starts_attribute(&self) -> bool {
        match self.stream.peek_nth(0) {
            Some(Token::Init) | Some(Token::LBracket) | Some(Token::Arrow) => true,
            Some(Token::Ident(_)) | Some(Token::Integer(_)) => matches!(
                self.stream.peek_nth(1),
                Some(Token::Colon) | Some(Token::Arrow)
            ),
            _ => false,
        }
    }

    fn parse_attribute(&mut self, allow_irq: bool) -> Result<Attribute, ParseError> {
        match self.stream.peek()? {
            Some(Token::Init) => Ok(Attribute::Init(self.parse_init_attribute()?)),
            Some(Token::LBracket) | Some(Token::Arrow) | Some(Token::Integer(_)) => {
                self.irq_allowed(allow_irq)?;
                Ok(Attribute::Irq(self.parse_irq_attribute()?))
            }
            Some(Token::Ident(_)) => {
                if matches!(self.stream.peek_nth(1), Some(Token::Arrow)) {
                    self.irq_allowed(allow_irq)?;
                    Ok(Attribute::Irq(self.parse_irq_attribute()?))
                } else {
                    Ok(Attribute::Param(self.parse_param_attribute()?))
                }
            }
            found => Err(ParseError::expected(
                &["attribute"],
                found.map(|t| t.describe().to_string()),
                self.stream.current_span(),
            )),
        }
    }

    fn irq_allowed(&self, allow_irq: bool) -> Result<(), ParseError> {
        if allow_irq {
            Ok(())
        } else {
            Err(ParseError::other(
                "interrupt attributes are not allowed inside inline objects",
                self.stream.current_span(),
            ))
        }
    }

    /// `name: value` or the cancelling `name: none`.
    fn parse_param_attribute(&mut self) -> Result<ParamAttribute, ParseError> {
        let name = self.expect_ident()?;
        let start = name.span.start;
        self.stream.expect(Token::Colon)?;
        let value = if self.eat(&Token::None) {
            None
        } else {
            Some(self.parse_value()?)
        };
        Ok(ParamAttribute {
            name,
            value,
            span: self.stream.span_from(start),
        })
    }

    /// `[src, ...] -> dest@pin | dest@pin` with all the shorthand forms.
    fn parse_irq_attribute(&mut self) -> Result<IrqAttribute, ParseError> {
        let start = self.stream.current_span().start;
        let sources = if self.stream.check(&Token::Arrow) {
            None
        } else if self.eat(&Token::LBracket) {
            let mut ends = vec![self.parse_irq_end()?];
            while self.eat(&Token::Comma) {
                ends.push(self.parse_irq_end()?);
            }
            self.stream.expect(Token::RBracket)?;
            Some(ends)
        } else {
            Some(vec![self.parse_irq_end()?])
        };
        self.stream.expect(Token::Arrow)?;
        let mut destinations = vec![self.parse_irq_destination()?];
        while self.eat(&Token::Pipe) {
            destinations.push(self.parse_irq_destination()?);
        }
        Ok(IrqAttribute {
            sources,
            destinations,
            span: self.stream.span_from(start),
        })
    }

    fn parse_irq_end(&mut self) -> Result<IrqEnd, ParseError> {
        match self.stream.peek()? {
            Some(Token::Ident(_)) => Ok(IrqEnd::Named(self.expect_ident()?)),
            Some(Token::Integer(_)) => Ok(IrqEnd::Numbered(self.expect_pin_number()?)),
            found => Err(ParseError::expected(
                &["identifier", "number"],
                found.map(|t| t.describe().to_string()),
                self.stream.current_span(),
            )),
        }
    }

    fn parse_irq_destination(&mut self) -> Result<IrqDestination, ParseError> {
        if self.stream.check(&Token::None) {
            return Ok(IrqDestination::None(self.stream.expect(Token::None)?));
        }
        let peripheral = self.expect_ident()?;
        let start = peripheral.span.start;
        let local_index = if self.eat(&Token::Colon) {
            Some(self.expect_pin_number()?)
        } else {
            None
        };
        self.stream.expect(Token::At)?;
        let ends = if self.eat(&Token::LBracket) {
            let mut ends = vec![self.expect_pin_number()?];
            while self.eat(&Token::Comma) {
                ends.push(self.expect_pin_number()?);
            }
            self.stream.expect(Token::RBracket)?;
            ends
        } else {
            vec![self.expect_pin_number()?]
        };
        Ok(IrqDestination::Target(IrqTarget {
            peripheral,
            local_index,
            ends,
            span: self.stream.span_from(start),
        }))
    }

    /// `init: { raw lines }` — capture between the braces without tokenizing.
    fn parse_init_attribute(&mut self) -> Result<InitAttribute, ParseError> {
        let start = self.stream.current_span().start;
        self.stream.expect(Token::Init)?;
        self.stream.expect(Token::Colon)?;
        let open = self.stream.expect(Token::LBrace)?;
        let mut depth = 1u32;
        let close_start;
        loop {
            match self.stream.raw_slot() {
                Some((tok, range)) => {
                    match tok {
                        Some(Token::LBrace) => depth += 1,
                        Some(Token::RBrace) => {
                            depth -= 1;
                            if depth == 0 {
                                close_start = range.start as u32;
                                self.stream.advance_raw();
                                break;
                            }
                        }
                        _ => {}
                    }
                    self.stream.advance_raw();
                }
                None => {
                    return Err(ParseError::expected(
                        &["'}'"],
                        None,
                        self.stream.current_span(),
                    ));
                }
            }
        }
        let raw = &self.source[open.end as usize..close_start as usize];
        let lines = split_init_lines(raw, open.end, self.stream.file_id());
        Ok(InitAttribute {
            lines,
            span: self.stream.span_from(start),
        })
    }

    fn parse_value(&mut self) -> Result<Value, ParseError> {
        let span = self.stream.current_span();
        match self.stream.peek()? {
            Some(Token::String(_)) => Ok(Value::Str(self.expect_string()?)),
            Some(Token::True) => {
                self.stream.expect(Token::True)?;
                Ok(Value::Bool(Spanned::new(true, span)))
            }
            Some(Token::False) => {
                self.stream.expect(Token::False)?;
                Ok(Value::Bool(Spanned::new(false, span)))
            }
            Some(Token::Minus | Token::Integer(_) | Token::HexInteger(_) | Token::Float(_)) => {
                Ok(Value::Number(self.parse_number()?))
            }
            Some(Token::Lt) => self.parse_range(),
            Some(Token::Empty) => {
                self.stream.expect(Token::Empty)?;
                Ok(Value::Empty(span))
            }
            Some(Token::Ident(_)) => self.parse_named_value(),
            found => Err(ParseError::expected(
                &[
                    "string",
                    "number",
                    "boolean",
                    "range",
                    "reference",
                    "inline object",
                    "'empty'",
                ],
                found.map(|t| t.describe().to_string()),
                self.stream.current_span(),
            )),
        }
    }

    /// Reference, enum literal, or inline object — all start with a name.
    fn parse_named_value(&mut self) -> Result<Value, ParseError> {
        let (name, segments) = self.parse_dotted_name()?;
        if self.stream.check(&Token::LBrace) {
            let attributes = self.parse_attribute_clause(false)?;
            let span = name.span.merge(self.stream.span_from(name.span.start));
            return Ok(Value::Object(Box::new(ObjectValue {
                type_name: name,
                attributes,
                span,
            })));
        }
        if segments.len() == 1 {
            Ok(Value::Reference(Reference {
                name: name.name,
                span: name.span,
            }))
        } else {
            let mut path = segments;
            let member = path.pop().unwrap_or_default();
            Ok(Value::Enum(EnumLiteral {
                path,
                member,
                span: name.span,
            }))
        }
    }

    fn parse_number(&mut self) -> Result<NumberLiteral, ParseError> {
        let start = self.stream.current_span().start;
        let negative = self.eat(&Token::Minus);
        match self.stream.advance()? {
            Some(Token::Integer(s) | Token::HexInteger(s) | Token::Float(s)) => {
                let text = if negative {
                    format!("-{}", s)
                } else {
                    s.to_string()
                };
                Ok(NumberLiteral {
                    text,
                    span: self.stream.span_from(start),
                })
            }
            found => Err(ParseError::expected(
                &["number"],
                found.map(|t| t.describe().to_string()),
                self.stream.span_from(start),
            )),
        }
    }

    /// `<begin, end>` or `<begin, +size>`.
    fn parse_range(&mut self) -> Result<Value, ParseError> {
        let start = self.stream.expect(Token::Lt)?.start;
        let begin = self.parse_number()?;
        self.stream.expect(Token::Comma)?;
        let size_form = self.eat(&Token::Plus);
        let end = self.parse_number()?;
        self.stream.expect(Token::Gt)?;
        Ok(Value::Range(Box::new(RangeLiteral {
            begin,
            end,
            size_form,
            span: self.stream.span_from(start),
        })))
    }

    /// Dotted name; returns the joined identifier and the raw segments.
    fn parse_dotted_name(&mut self) -> Result<(Ident, Vec<String>), ParseError> {
        let first = self.expect_ident()?;
        let start = first.span.start;
        let mut segments = vec![first.name];
        while self.stream.check(&Token::Dot)
            && matches!(self.stream.peek_nth(1), Some(Token::Ident(_)))
        {
            self.stream.expect(Token::Dot)?;
            segments.push(self.expect_ident()?.name);
        }
        let span = self.stream.span_from(start);
        Ok((Ident::new(segments.join("."), span), segments))
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let span = self.stream.current_span();
        match self.stream.peek()? {
            Some(Token::Ident(name)) => {
                let name = name.to_string();
                self.stream.advance()?;
                Ok(Ident::new(name, span))
            }
            found => Err(ParseError::expected(
                &["identifier"],
                found.map(|t| t.describe().to_string()),
                span,
            )),
        }
    }

    fn expect_string(&mut self) -> Result<Spanned<String>, ParseError> {
        let span = self.stream.current_span();
        match self.stream.peek()? {
            Some(Token::String(s)) => {
                let s = s.to_string();
                self.stream.advance()?;
                Ok(Spanned::new(s, span))
            }
            found => Err(ParseError::expected(
                &["string"],
                found.map(|t| t.describe().to_string()),
                span,
            )),
        }
    }

    fn expect_pin_number(&mut self) -> Result<Spanned<u32>, ParseError> {
        let span = self.stream.current_span();
        match self.stream.peek()? {
            Some(Token::Integer(s)) => {
                let value = s
                    .parse::<u32>()
                    .map_err(|_| ParseError::other("pin number out of range", span))?;
                self.stream.advance()?;
                Ok(Spanned::new(value, span))
            }
            found => Err(ParseError::expected(
                &["number"],
                found.map(|t| t.describe().to_string()),
                span,
            )),
        }
    }

    /// After a brace-block item: `;`, newline, or the closing brace.
    fn expect_item_separator(&mut self) -> Result<(), ParseError> {
        if self.stream.check(&Token::RBrace)
            || self.stream.check(&Token::Semicolon)
            || self.stream.check(&Token::Newline)
        {
            Ok(())
        } else {
            Err(ParseError::expected(
                &["';'", "end of line", "'}'"],
                self.stream.peek()?.map(|t| t.describe().to_string()),
                self.stream.current_span(),
            ))
        }
    }

    /// Entries and usings end at a newline or EOF.
    fn expect_line_end(&mut self) -> Result<(), ParseError> {
        if self.stream.at_end() || self.stream.check(&Token::Newline) {
            Ok(())
        } else {
            Err(ParseError::expected(
                &["end of line"],
                self.stream.peek()?.map(|t| t.describe().to_string()),
                self.stream.current_span(),
            ))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.stream.check(token) {
            self.stream.advance_raw();
            true
        } else {
            false
        }
    }
}

/// Split an init block's raw text into trimmed lines with spans.
///
/// Lines are separated by newlines or `;`, except inside double quotes.
fn split_init_lines(raw: &str, base: u32, file_id: u16) -> Vec<Spanned<String>> {
    let mut lines = Vec::new();
    let mut line_start = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let push = |start: usize, end: usize, lines: &mut Vec<Spanned<String>>| {
        let segment = &raw[start..end];
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            return;
        }
        let offset = start + (segment.len() - segment.trim_start().len());
        lines.push(Spanned::new(
            trimmed.to_string(),
            Span::new(
                file_id,
                base + offset as u32,
                base + (offset + trimmed.len()) as u32,
            ),
        ));
    };
    for (idx, ch) in raw.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '\n' | ';' if !in_string => {
                push(line_start, idx, &mut lines);
                line_start = idx + 1;
            }
            _ => {}
        }
    }
    push(line_start, raw.len(), &mut lines);
    lines
}
