// Lexer for raster scripts.
//
// Uses the `logos` crate for DFA-based lexing, then frames the raw token
// stream for the selected dialect: newlines and continuation markers are
// either dropped, kept as terminators, or rejected.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::{FilterResult, Logos};
use std::fmt;

use crate::diag::{codes, DiagCode};
use crate::dialect::Dialect;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub code: DiagCode,
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Script token types.
///
/// Identifiers carry no value — use the span to retrieve the text from the
/// source.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+|//[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("until")]
    Until,
    #[token("foreach")]
    Foreach,
    #[token("in")]
    In,
    #[token("breakif")]
    BreakIf,
    #[token("break")]
    Break,
    #[token("images")]
    Images,
    #[token("init")]
    Init,
    #[token("options")]
    Options,
    #[token("read")]
    Read,
    #[token("write")]
    Write,

    // ── Assignment ──
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,

    // ── Operators ──
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("^|")]
    Xor,
    #[token("!")]
    Bang,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("$")]
    Dollar,

    // ── Punctuation ──
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // ── Literals ──
    /// Non-negative numeric literal (int, float, exponent).
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", parse_number)]
    Number(f64),

    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    // ── Line structure ──
    /// A single line break. Whitespace or terminator depending on dialect.
    #[regex(r"\n")]
    Newline,

    /// `\` at the end of a line, optionally followed by blanks or a comment.
    #[regex(r"\\[ \t\r]*(//[^\n]*)?\n")]
    Continuation,

    /// `/* ... */`, skipped entirely. Never appears in the token stream.
    #[token("/*", block_comment)]
    BlockComment,
}

impl Token {
    /// Whether this token ends a statement once the stream is framed.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Token::Semi | Token::Newline)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::Until => "until",
            Token::Foreach => "foreach",
            Token::In => "in",
            Token::BreakIf => "breakif",
            Token::Break => "break",
            Token::Images => "images",
            Token::Init => "init",
            Token::Options => "options",
            Token::Read => "read",
            Token::Write => "write",
            Token::Assign => "=",
            Token::PlusAssign => "+=",
            Token::MinusAssign => "-=",
            Token::StarAssign => "*=",
            Token::SlashAssign => "/=",
            Token::PercentAssign => "%=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::Caret => "^",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::Le => "<=",
            Token::Gt => ">",
            Token::Ge => ">=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Xor => "^|",
            Token::Bang => "!",
            Token::Question => "?",
            Token::Colon => ":",
            Token::Dollar => "$",
            Token::Comma => ",",
            Token::Semi => ";",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Number(v) => return write!(f, "{v}"),
            Token::Ident => "<ident>",
            Token::Newline => "<newline>",
            Token::Continuation => "\\",
            Token::BlockComment => "/*",
        };
        f.write_str(text)
    }
}

// ── Callbacks ──

fn parse_number(lex: &mut logos::Lexer<'_, Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

/// Skip to the matching `*/`. An unterminated comment swallows the rest of
/// the input and is reported as an error.
fn block_comment(lex: &mut logos::Lexer<'_, Token>) -> FilterResult<(), ()> {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            FilterResult::Skip
        }
        None => {
            lex.bump(lex.remainder().len());
            FilterResult::Error(())
        }
    }
}

// ── Public API ──

/// Lex a script and frame it for `dialect`.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// bad characters. In the standard dialect newlines are dropped and
/// continuation markers are errors; in the extended dialect newlines are kept
/// as terminators and continuation markers are dropped.
pub fn lex(source: &str, dialect: Dialect) -> LexResult {
    let raw = lex_raw(source);
    let mut tokens = Vec::with_capacity(raw.tokens.len());
    let mut errors = raw.errors;

    for (token, span) in raw.tokens {
        match token {
            Token::Newline if !dialect.newline_terminates() => {}
            Token::Continuation => {
                if dialect.continuation_marker().is_none() {
                    errors.push(LexError {
                        code: codes::E0003,
                        span: Span {
                            start: span.start,
                            end: span.start + 1,
                        },
                        message: format!(
                            "line continuation is only valid in the extended dialect \
                             (statements in the {dialect} dialect may span lines freely)"
                        ),
                    });
                }
            }
            _ => tokens.push((token, span)),
        }
    }

    // Errors are reported in source order regardless of which step found them.
    errors.sort_by_key(|e| e.span.start);
    LexResult { tokens, errors }
}

/// Lex without dialect framing: newlines and continuations stay in the stream.
pub fn lex_raw(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                let text = &source[span.start..span.end];
                let message = if text.starts_with("/*") {
                    "unterminated block comment".to_string()
                } else {
                    format!("unexpected character {text:?}")
                };
                errors.push(LexError {
                    code: codes::E0001,
                    span,
                    message,
                });
            }
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──
