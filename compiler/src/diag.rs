// diag.rs — Diagnostics accumulator shared by every compiler phase
//
// Each phase appends to one `Diagnostics` value; nothing here ever fails.
// Messages keep emission order so that compiling the same script twice
// renders byte-identical output.
//
// Preconditions: the accumulator is created from the exact script text the
//                spans refer to.
// Postconditions: every stored message has a 1-based line and column.
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::Serialize;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0101`, `W0001`).
///
/// Once assigned, a code keeps its meaning. Errors are `E`, warnings `W`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Every code the compiler can emit.
pub mod codes {
    use super::DiagCode;

    // ── Front end ──
    pub const E0001: DiagCode = DiagCode("E0001"); // unexpected character
    pub const E0002: DiagCode = DiagCode("E0002"); // syntax error
    pub const E0003: DiagCode = DiagCode("E0003"); // continuation marker in standard dialect

    // ── Semantic analysis ──
    pub const E0101: DiagCode = DiagCode("E0101"); // undefined variable
    pub const E0102: DiagCode = DiagCode("E0102"); // loop variable out of scope
    pub const E0103: DiagCode = DiagCode("E0103"); // write to source image
    pub const E0104: DiagCode = DiagCode("E0104"); // read of destination image
    pub const E0105: DiagCode = DiagCode("E0105"); // assignment to loop variable
    pub const E0106: DiagCode = DiagCode("E0106"); // assignment to constant
    pub const E0107: DiagCode = DiagCode("E0107"); // symbol kind conflict
    pub const E0108: DiagCode = DiagCode("E0108"); // unknown function or bad arity
    pub const E0109: DiagCode = DiagCode("E0109"); // list/scalar mismatch
    pub const E0110: DiagCode = DiagCode("E0110"); // break outside loop
    pub const E0111: DiagCode = DiagCode("E0111"); // destination write inside loop
    pub const E0112: DiagCode = DiagCode("E0112"); // no destination image
    pub const E0113: DiagCode = DiagCode("E0113"); // malformed image access
    pub const E0114: DiagCode = DiagCode("E0114"); // bad option
    pub const E0115: DiagCode = DiagCode("E0115"); // image read in init block

    // ── Code generation ──
    pub const E0900: DiagCode = DiagCode("E0900"); // internal lowering failure

    // ── Warnings ──
    pub const W0001: DiagCode = DiagCode("W0001"); // destination never assigned
    pub const W0002: DiagCode = DiagCode("W0002"); // source never read
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagLevel {
    Error,
    Warning,
}

impl fmt::Display for DiagLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagLevel::Error => write!(f, "ERROR"),
            DiagLevel::Warning => write!(f, "WARNING"),
        }
    }
}

// ── Line index ───────────────────────────────────────────────────────────

/// Maps byte offsets to 1-based (line, column) pairs.
///
/// Columns count characters, not bytes, from the start of the line.
#[derive(Debug, Clone)]
pub struct LineIndex {
    text: String,
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .char_indices()
                .filter(|&(_, c)| c == '\n')
                .map(|(i, _)| i + 1),
        );
        LineIndex {
            text: source.to_string(),
            line_starts,
        }
    }

    /// Line and column of `offset`. Offsets past the end clamp to the end.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.text.len());
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let start = self.line_starts[line];
        let column = self
            .text
            .get(start..offset)
            .map_or(offset - start, |s| s.chars().count());
        (line + 1, column + 1)
    }
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A positioned compiler message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub line: usize,
    pub column: usize,
    pub message: String,
    #[serde(skip)]
    pub span: Span,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

/// Renders as `{line}:{column} {LEVEL} : {message}`.
impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {} : {}",
            self.line, self.column, self.level, self.message
        )
    }
}

// ── Accumulator ──────────────────────────────────────────────────────────

/// Ordered collection of diagnostics for one script.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    index: LineIndex,
    messages: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(source: &str) -> Self {
        Diagnostics {
            index: LineIndex::new(source),
            messages: Vec::new(),
        }
    }

    /// Append a message without a code.
    pub fn report(&mut self, level: DiagLevel, span: Span, message: impl Into<String>) {
        self.push(None, level, span, message.into());
    }

    pub fn error(&mut self, code: DiagCode, span: Span, message: impl Into<String>) {
        self.push(Some(code), DiagLevel::Error, span, message.into());
    }

    pub fn warning(&mut self, code: DiagCode, span: Span, message: impl Into<String>) {
        self.push(Some(code), DiagLevel::Warning, span, message.into());
    }

    fn push(&mut self, code: Option<DiagCode>, level: DiagLevel, span: Span, message: String) {
        let (line, column) = self.index.position(span.start);
        self.messages.push(Diagnostic {
            code,
            level,
            line,
            column,
            message,
            span,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.messages.iter().filter(|d| d.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.messages.len() - self.error_count()
    }

    /// All messages in emission order.
    pub fn all(&self) -> &[Diagnostic] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.messages.iter()
    }

    /// One rendered message per line, in emission order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for d in &self.messages {
            out.push_str(&d.to_string());
            out.push('\n');
        }
        out
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
