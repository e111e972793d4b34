// AST node types for raster scripts.
//
// Every node carries a `SimpleSpan` (byte offsets into the script text) so
// later phases can report problems at a precise line and column.
//
// Preconditions: produced by the parser from a valid or partially-valid token stream.
// Postconditions: each node's span covers the source range of the construct.
// Failure modes: none (data-only module).
// Side effects: none.

use chumsky::span::SimpleSpan;

/// Byte-offset span (alias for chumsky's `SimpleSpan`).
pub type Span = SimpleSpan;

/// Join two spans into one covering both.
pub fn join(a: Span, b: Span) -> Span {
    (a.start.min(b.start)..a.end.max(b.end)).into()
}

// ── Root ──

/// A complete script: top-level statements in source order. Statements that
/// failed to parse are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub statements: Vec<Statement>,
    pub span: Span,
}

// ── Statements ──

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// `images { name = read; ... }` (top level only)
    Images(Vec<ImageDecl>),
    /// `init { name = expr; ... }` (top level only)
    Init(Vec<NamedValue>),
    /// `options { name = expr; ... }` (top level only)
    Options(Vec<NamedValue>),
    Assign(Assign),
    If(IfStmt),
    While(CondLoop),
    Until(CondLoop),
    Foreach(Foreach),
    Block(Vec<Statement>),
    BreakIf(Expr),
    Break,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageRole {
    Source,
    Destination,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageDecl {
    pub name: Ident,
    pub role: ImageRole,
    pub span: Span,
}

/// `name = expr` inside an `init` or `options` block.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue {
    pub name: Ident,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl AssignOp {
    /// The arithmetic applied by a compound assignment.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assign {
    pub target: Ident,
    pub op: AssignOp,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub cond: Expr,
    pub then_branch: Box<Statement>,
    pub else_branch: Option<Box<Statement>>,
}

/// `while (cond) body` or `until (cond) body`.
#[derive(Debug, Clone, PartialEq)]
pub struct CondLoop {
    pub cond: Expr,
    pub body: Box<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Foreach {
    pub var: Ident,
    pub source: ForeachSource,
    pub body: Box<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForeachSource {
    /// A list literal or list variable.
    List(Expr),
    /// Inclusive integer sequence `lo:hi`.
    Range(Expr, Expr),
}

// ── Expressions ──

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    /// Variable, constant, or source image at the current pixel.
    Name(Ident),
    Call {
        name: Ident,
        args: Vec<Expr>,
    },
    /// `img[band]`, `img[x, y]` or `img[band][x, y]`; shape checked by
    /// [`image_access`].
    ImageRead {
        image: Ident,
        selectors: Vec<Selector>,
    },
    List(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional {
        cond: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
}

/// One bracketed group of an image access.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub coords: Vec<Coord>,
    pub span: Span,
}

/// A `$` prefix makes a coordinate relative to the current pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Coord {
    pub relative: bool,
    pub value: Expr,
    pub span: Span,
}

/// Validated view of an image access.
#[derive(Debug, Clone, Copy)]
pub struct ImageAccess<'a> {
    pub band: Option<&'a Expr>,
    pub pos: Option<(&'a Coord, &'a Coord)>,
}

/// Interpret the bracket groups of an image access: `[band]`, `[x, y]` or
/// `[band][x, y]`. On failure returns the offending span and a reason.
pub fn image_access(selectors: &[Selector]) -> Result<ImageAccess<'_>, (Span, &'static str)> {
    match selectors {
        [] => Ok(ImageAccess {
            band: None,
            pos: None,
        }),
        [only] if only.coords.len() == 2 => Ok(ImageAccess {
            band: None,
            pos: Some(pos_of(only)?),
        }),
        [only] => Ok(ImageAccess {
            band: Some(band_of(only)?),
            pos: None,
        }),
        [band, pos] => Ok(ImageAccess {
            band: Some(band_of(band)?),
            pos: Some(pos_of(pos)?),
        }),
        [_, _, extra, ..] => Err((extra.span, "too many bracket groups in image access")),
    }
}

fn band_of(sel: &Selector) -> Result<&Expr, (Span, &'static str)> {
    match sel.coords.as_slice() {
        [c] if c.relative => Err((c.span, "'$' marks a pixel coordinate, not a band index")),
        [c] => Ok(&c.value),
        _ => Err((sel.span, "expected a single band index")),
    }
}

fn pos_of(sel: &Selector) -> Result<(&Coord, &Coord), (Span, &'static str)> {
    match sel.coords.as_slice() {
        [x, y] => Ok((x, y)),
        _ => Err((sel.span, "a pixel position needs exactly two coordinates")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Xor => "^|",
        }
    }
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
        }
    }
}

// ── Identifier ──

/// An identifier with its source text and span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}
