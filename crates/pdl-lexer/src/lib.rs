// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Lexical analysis for the platform description language.
//!
//! Tokenization is done with logos. Two details matter downstream:
//!
//! - Newlines are tokens, not skipped whitespace. Entry boundaries are
//!   line-sensitive (`cpu: PerformanceInMips: 1` ends at the newline), so the
//!   parser needs to see them; inside brace blocks they act as separators.
//! - Numeric literals keep their raw text. The shared number parser runs at
//!   value-conversion time, when the target type (and its range) is known.

use logos::Logos;
use std::rc::Rc;

/// A token of the platform description language.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+")] // Skip horizontal whitespace, keep newlines
#[logos(skip r"//[^\n]*")] // Skip // comments up to (not including) the newline
pub enum Token {
    // === Keywords ===
    /// Keyword `using`
    #[token("using")]
    Using,
    /// Keyword `prefix`
    #[token("prefix")]
    Prefix,
    /// Keyword `local`
    #[token("local")]
    Local,
    /// Keyword `as`
    #[token("as")]
    As,
    /// Keyword `init`
    #[token("init")]
    Init,
    /// Keyword `none`
    #[token("none")]
    None,
    /// Keyword `empty`
    #[token("empty")]
    Empty,
    /// Boolean literal `true`
    #[token("true")]
    True,
    /// Boolean literal `false`
    #[token("false")]
    False,

    // === Punctuation ===
    /// `:`
    #[token(":")]
    Colon,
    /// `;`
    #[token(";")]
    Semicolon,
    /// `,`
    #[token(",")]
    Comma,
    /// `.`
    #[token(".")]
    Dot,
    /// `@`
    #[token("@")]
    At,
    /// `->`
    #[token("->")]
    Arrow,
    /// `-` (only appears as a numeric sign)
    #[token("-")]
    Minus,
    /// `+` (range size form `<base, +size>`)
    #[token("+")]
    Plus,
    /// `{`
    #[token("{")]
    LBrace,
    /// `}`
    #[token("}")]
    RBrace,
    /// `[`
    #[token("[")]
    LBracket,
    /// `]`
    #[token("]")]
    RBracket,
    /// `<` (range open)
    #[token("<")]
    Lt,
    /// `>` (range close)
    #[token(">")]
    Gt,
    /// `|` (IRQ destination separator)
    #[token("|")]
    Pipe,

    /// Line break. Ends an unbraced entry; separates items inside braces.
    #[token("\n")]
    Newline,

    // === Literals ===
    /// Hexadecimal integer literal, raw text including the `0x` prefix.
    #[regex(r"0[xX][0-9a-fA-F]+", |lex| Rc::from(lex.slice()))]
    HexInteger(Rc<str>),

    /// Decimal integer literal, raw text.
    #[regex(r"[0-9]+", |lex| Rc::from(lex.slice()), priority = 2)]
    Integer(Rc<str>),

    /// Float literal, raw text.
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| Rc::from(lex.slice()))]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| Rc::from(lex.slice()))]
    Float(Rc<str>),

    /// String literal with the quotes stripped and escapes resolved.
    ///
    /// Uses `Rc<str>` for cheap cloning throughout the parser pipeline.
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| {
        let s = lex.slice();
        let content = &s[1..s.len() - 1];
        unescape_string(content).map(|s| Rc::from(s.as_str()))
    })]
    String(Rc<str>),

    /// Identifier: variable names, type name segments, attribute names.
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| Rc::from(lex.slice()))]
    Ident(Rc<str>),
}

/// Unescape a string literal content.
fn unescape_string(s: &str) -> Option<String> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                _ => return None,
            }
        } else {
            result.push(c);
        }
    }
    Some(result)
}

impl Token {
    /// Short name used in "expected A or B" parse errors.
    pub fn describe(&self) -> &'static str {
        match self {
            Token::Using => "'using'",
            Token::Prefix => "'prefix'",
            Token::Local => "'local'",
            Token::As => "'as'",
            Token::Init => "'init'",
            Token::None => "'none'",
            Token::Empty => "'empty'",
            Token::True | Token::False => "boolean",
            Token::Colon => "':'",
            Token::Semicolon => "';'",
            Token::Comma => "','",
            Token::Dot => "'.'",
            Token::At => "'@'",
            Token::Arrow => "'->'",
            Token::Minus => "'-'",
            Token::Plus => "'+'",
            Token::LBrace => "'{'",
            Token::RBrace => "'}'",
            Token::LBracket => "'['",
            Token::RBracket => "']'",
            Token::Lt => "'<'",
            Token::Gt => "'>'",
            Token::Pipe => "'|'",
            Token::Newline => "end of line",
            Token::HexInteger(_) | Token::Integer(_) => "number",
            Token::Float(_) => "number",
            Token::String(_) => "string",
            Token::Ident(_) => "identifier",
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::HexInteger(s) | Token::Integer(s) | Token::Float(s) => write!(f, "{}", s),
            Token::String(s) => write!(f, "\"{}\"", s),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Newline => write!(f, "\\n"),
            other => write!(f, "{}", other.describe().trim_matches('\'')),
        }
    }
}
