// resolve.rs — Semantic analysis for raster scripts
//
// Walks the parsed script once, classifies every identifier against the
// symbol table, and validates how each one is used. Every violation becomes a
// diagnostic; analysis always runs to the end of the script.
//
// Preconditions: `script` came from the parser (failed statements are absent).
// Postconditions: every identifier node that resolved has an entry in
//                 `ResolvedScript::names` or `ResolvedScript::calls`, keyed by
//                 its span.
// Failure modes: undefined names, illegal writes, loop variable misuse, kind
//                conflicts and bad calls produce error diagnostics. Unused
//                images produce warnings.
// Side effects: appends to `Diagnostics`.

use std::collections::{HashMap, HashSet};

use crate::ast::*;
use crate::builtins::{self, Builtin, BuiltinClass};
use crate::diag::{codes, DiagCode, Diagnostics};
use crate::id::{ScopeId, SymbolId};
use crate::symbol::{ScopeKind, SymbolKind, SymbolTable};

// ── Public types ────────────────────────────────────────────────────────────

/// What an identifier in expression or target position refers to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NameRef {
    Symbol(SymbolId),
    Constant(f64),
}

/// Resolution tables produced by semantic analysis. Downstream phases use
/// these alongside the original AST.
#[derive(Debug)]
pub struct ResolvedScript {
    pub table: SymbolTable,
    /// Identifier span → referent, for names, assignment targets, image
    /// reads, foreach variables and init variables.
    pub names: HashMap<Span, NameRef>,
    /// Call-site name span → built-in.
    pub calls: HashMap<Span, Builtin>,
    /// Value of `options { outside = ...; }`, if given.
    pub outside: Option<f64>,
}

impl ResolvedScript {
    pub fn symbol_at(&self, span: Span) -> Option<SymbolId> {
        match self.names.get(&span) {
            Some(NameRef::Symbol(id)) => Some(*id),
            _ => None,
        }
    }
}

/// Whether an expression produces one value or a list of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Scalar,
    List,
}

// ── Entry point ─────────────────────────────────────────────────────────────

/// Analyse `script`. `images` are the caller-declared image roles; they are
/// declared before any `images` block.
pub fn resolve(script: &Script, images: &[(String, ImageRole)], diags: &mut Diagnostics) -> ResolvedScript {
    let mut ctx = ResolveCtx {
        table: SymbolTable::new(),
        names: HashMap::new(),
        calls: HashMap::new(),
        outside: None,
        diags,
        dest_assigned: HashSet::new(),
        source_read: HashSet::new(),
        in_init: false,
        loop_depth: 0,
    };

    let caller_span: Span = (0..0).into();
    for (name, role) in images {
        ctx.declare_image(name, *role, caller_span);
    }

    // Pass 1: image-scope declarations, in source order.
    for stmt in &script.statements {
        match &stmt.kind {
            StatementKind::Images(decls) => {
                for decl in decls {
                    ctx.declare_image_decl(decl);
                }
            }
            StatementKind::Options(values) => ctx.options(values),
            _ => {}
        }
    }
    for stmt in &script.statements {
        if let StatementKind::Init(values) = &stmt.kind {
            ctx.init_block(values);
        }
    }

    // Pass 2: pixel statements.
    let pixel = ctx.table.pixel_scope();
    for stmt in &script.statements {
        ctx.statement(stmt, pixel);
    }

    ctx.finish(script.span);

    tracing::debug!(
        symbols = ctx.table.len(),
        names = ctx.names.len(),
        calls = ctx.calls.len(),
        "resolved script"
    );

    ResolvedScript {
        table: ctx.table,
        names: ctx.names,
        calls: ctx.calls,
        outside: ctx.outside,
    }
}

// ── Context ─────────────────────────────────────────────────────────────────

struct ResolveCtx<'a> {
    table: SymbolTable,
    names: HashMap<Span, NameRef>,
    calls: HashMap<Span, Builtin>,
    outside: Option<f64>,
    diags: &'a mut Diagnostics,
    dest_assigned: HashSet<SymbolId>,
    source_read: HashSet<SymbolId>,
    in_init: bool,
    loop_depth: usize,
}

impl<'a> ResolveCtx<'a> {
    fn error(&mut self, code: DiagCode, span: Span, message: String) {
        self.diags.error(code, span, message);
    }

    fn warning(&mut self, code: DiagCode, span: Span, message: String) {
        self.diags.warning(code, span, message);
    }

    // ── Image scope ──

    fn declare_image(&mut self, name: &str, role: ImageRole, span: Span) -> SymbolId {
        let kind = match role {
            ImageRole::Source => SymbolKind::SourceImage,
            ImageRole::Destination => SymbolKind::DestImage,
        };
        let root = self.table.image_scope();
        self.table.declare(root, name, kind, span, self.diags)
    }

    fn declare_image_decl(&mut self, decl: &ImageDecl) {
        if builtins::constant(&decl.name.name).is_some() {
            self.error(
                codes::E0106,
                decl.name.span,
                format!("cannot use constant '{}' as an image name", decl.name.name),
            );
            return;
        }
        let id = self.declare_image(&decl.name.name, decl.role, decl.name.span);
        self.names.insert(decl.name.span, NameRef::Symbol(id));
    }

    fn options(&mut self, values: &[NamedValue]) {
        for nv in values {
            if nv.name.name != "outside" {
                self.error(
                    codes::E0114,
                    nv.name.span,
                    format!("unknown option '{}'", nv.name.name),
                );
                continue;
            }
            match const_value(&nv.value) {
                Some(v) => self.outside = Some(v),
                None => self.error(
                    codes::E0114,
                    nv.value.span,
                    "option 'outside' needs a constant value".to_string(),
                ),
            }
        }
    }

    fn init_block(&mut self, values: &[NamedValue]) {
        let root = self.table.image_scope();
        self.in_init = true;
        for nv in values {
            self.scalar(&nv.value, root);
            if builtins::constant(&nv.name.name).is_some() {
                self.error(
                    codes::E0106,
                    nv.name.span,
                    format!("cannot assign to constant '{}'", nv.name.name),
                );
                continue;
            }
            let id = self
                .table
                .declare(root, &nv.name.name, SymbolKind::Scalar, nv.name.span, self.diags);
            self.names.insert(nv.name.span, NameRef::Symbol(id));
        }
        self.in_init = false;
    }

    // ── Statements ──

    fn statement(&mut self, stmt: &Statement, scope: ScopeId) {
        match &stmt.kind {
            StatementKind::Images(_) | StatementKind::Init(_) | StatementKind::Options(_) => {}
            StatementKind::Assign(assign) => self.assign(assign, scope),
            StatementKind::If(s) => {
                self.scalar(&s.cond, scope);
                self.statement(&s.then_branch, scope);
                if let Some(else_branch) = &s.else_branch {
                    self.statement(else_branch, scope);
                }
            }
            StatementKind::While(l) | StatementKind::Until(l) => {
                self.scalar(&l.cond, scope);
                self.loop_body(&l.body, scope);
            }
            StatementKind::Foreach(f) => self.foreach(f, scope),
            StatementKind::Block(stmts) => {
                for s in stmts {
                    self.statement(s, scope);
                }
            }
            StatementKind::BreakIf(cond) => {
                self.check_in_loop(stmt.span, "breakif");
                self.scalar(cond, scope);
            }
            StatementKind::Break => self.check_in_loop(stmt.span, "break"),
        }
    }

    fn loop_body(&mut self, body: &Statement, scope: ScopeId) {
        self.loop_depth += 1;
        self.statement(body, scope);
        self.loop_depth -= 1;
    }

    fn check_in_loop(&mut self, span: Span, what: &str) {
        if self.loop_depth == 0 {
            self.error(codes::E0110, span, format!("'{what}' outside a loop"));
        }
    }

    fn foreach(&mut self, f: &Foreach, scope: ScopeId) {
        match &f.source {
            ForeachSource::Range(lo, hi) => {
                self.scalar(lo, scope);
                self.scalar(hi, scope);
            }
            ForeachSource::List(list) => {
                if self.expr(list, scope) == Shape::Scalar {
                    self.error(
                        codes::E0109,
                        list.span,
                        "foreach needs a list or a range".to_string(),
                    );
                }
            }
        }
        let loop_scope = self.table.push_scope(scope, ScopeKind::Loop);
        let id = self
            .table
            .declare(loop_scope, &f.var.name, SymbolKind::LoopVar, f.var.span, self.diags);
        self.names.insert(f.var.span, NameRef::Symbol(id));
        self.loop_body(&f.body, loop_scope);
    }

    fn assign(&mut self, assign: &Assign, scope: ScopeId) {
        let target = &assign.target;
        let shape = self.expr(&assign.value, scope);

        if builtins::constant(&target.name).is_some() {
            self.error(
                codes::E0106,
                target.span,
                format!("cannot assign to constant '{}'", target.name),
            );
            return;
        }

        let wanted = match shape {
            Shape::Scalar => SymbolKind::Scalar,
            Shape::List => SymbolKind::List,
        };

        let Some(id) = self.table.resolve(scope, &target.name) else {
            if assign.op != AssignOp::Set {
                self.error(
                    codes::E0101,
                    target.span,
                    format!("undefined variable '{}'", target.name),
                );
                return;
            }
            // New variables always live in the pixel scope, even inside loops.
            let pixel = self.table.pixel_scope();
            let id = self.table.declare(pixel, &target.name, wanted, target.span, self.diags);
            self.names.insert(target.span, NameRef::Symbol(id));
            return;
        };

        self.names.insert(target.span, NameRef::Symbol(id));
        let symbol = self.table.get(id).clone();
        match symbol.kind {
            SymbolKind::SourceImage => self.error(
                codes::E0103,
                target.span,
                format!("cannot write to source image '{}'", target.name),
            ),
            SymbolKind::LoopVar => self.error(
                codes::E0105,
                target.span,
                format!("cannot assign to loop variable '{}'", target.name),
            ),
            SymbolKind::DestImage => {
                self.dest_assigned.insert(id);
                if self.loop_depth > 0 {
                    self.error(
                        codes::E0111,
                        target.span,
                        format!(
                            "destination image '{}' cannot be assigned inside a loop",
                            target.name
                        ),
                    );
                } else if assign.op != AssignOp::Set {
                    self.error(
                        codes::E0104,
                        target.span,
                        format!("cannot read destination image '{}'", target.name),
                    );
                } else if shape == Shape::List {
                    self.error(
                        codes::E0109,
                        assign.value.span,
                        format!("cannot write a list to destination image '{}'", target.name),
                    );
                }
            }
            SymbolKind::Scalar | SymbolKind::List => {
                if symbol.kind == SymbolKind::List && assign.op != AssignOp::Set {
                    self.error(
                        codes::E0109,
                        target.span,
                        format!("compound assignment to list '{}'", target.name),
                    );
                    return;
                }
                // Re-declaring in the owning scope either fetches the same
                // symbol or reports the kind conflict.
                self.table
                    .declare(symbol.scope, &target.name, wanted, target.span, self.diags);
            }
        }
    }

    // ── Expressions ──

    /// Resolve an expression that must produce a single value.
    fn scalar(&mut self, expr: &Expr, scope: ScopeId) {
        if self.expr(expr, scope) == Shape::List {
            self.error(
                codes::E0109,
                expr.span,
                "list used where a scalar is expected".to_string(),
            );
        }
    }

    fn expr(&mut self, expr: &Expr, scope: ScopeId) -> Shape {
        match &expr.kind {
            ExprKind::Number(_) => Shape::Scalar,
            ExprKind::Name(ident) => self.name(ident, scope),
            ExprKind::Call { name, args } => {
                self.call(name, args, scope);
                Shape::Scalar
            }
            ExprKind::ImageRead { image, selectors } => {
                self.image_read(image, selectors, scope);
                Shape::Scalar
            }
            ExprKind::List(items) => {
                for item in items {
                    if self.expr(item, scope) == Shape::List {
                        self.error(
                            codes::E0109,
                            item.span,
                            "lists cannot be nested".to_string(),
                        );
                    }
                }
                Shape::List
            }
            ExprKind::Unary(_, inner) => {
                self.scalar(inner, scope);
                Shape::Scalar
            }
            ExprKind::Binary(_, lhs, rhs) => {
                self.scalar(lhs, scope);
                self.scalar(rhs, scope);
                Shape::Scalar
            }
            ExprKind::Conditional {
                cond,
                then_value,
                else_value,
            } => {
                self.scalar(cond, scope);
                self.scalar(then_value, scope);
                self.scalar(else_value, scope);
                Shape::Scalar
            }
        }
    }

    fn name(&mut self, ident: &Ident, scope: ScopeId) -> Shape {
        if let Some(value) = builtins::constant(&ident.name) {
            self.names.insert(ident.span, NameRef::Constant(value));
            return Shape::Scalar;
        }

        let Some(id) = self.table.resolve(scope, &ident.name) else {
            self.undefined(ident);
            return Shape::Scalar;
        };
        self.names.insert(ident.span, NameRef::Symbol(id));

        let kind = self.table.get(id).kind;
        match kind {
            SymbolKind::SourceImage => {
                self.read_source(id, ident);
                Shape::Scalar
            }
            SymbolKind::DestImage => {
                self.error(
                    codes::E0104,
                    ident.span,
                    format!("cannot read destination image '{}'", ident.name),
                );
                Shape::Scalar
            }
            SymbolKind::List => Shape::List,
            SymbolKind::Scalar | SymbolKind::LoopVar => Shape::Scalar,
        }
    }

    fn undefined(&mut self, ident: &Ident) {
        if self.table.find_any(&ident.name, SymbolKind::LoopVar).is_some() {
            self.error(
                codes::E0102,
                ident.span,
                format!("loop variable '{}' used outside its foreach body", ident.name),
            );
        } else {
            self.error(
                codes::E0101,
                ident.span,
                format!("undefined variable '{}'", ident.name),
            );
        }
    }

    fn read_source(&mut self, id: SymbolId, ident: &Ident) {
        if self.in_init {
            self.error(
                codes::E0115,
                ident.span,
                format!("image '{}' cannot be read in an init block", ident.name),
            );
        }
        self.source_read.insert(id);
    }

    fn call(&mut self, name: &Ident, args: &[Expr], scope: ScopeId) {
        let Some(func) = Builtin::lookup(&name.name) else {
            self.error(
                codes::E0108,
                name.span,
                format!("unknown function '{}'", name.name),
            );
            for arg in args {
                self.expr(arg, scope);
            }
            return;
        };
        self.calls.insert(name.span, func);

        if !func.accepts(args.len()) {
            self.error(
                codes::E0108,
                name.span,
                format!(
                    "function '{}' expects {}, found {}",
                    func,
                    describe_arity(func.arity()),
                    args.len()
                ),
            );
        }

        if self.in_init && matches!(func, Builtin::X | Builtin::Y) {
            self.error(
                codes::E0115,
                name.span,
                format!("'{}()' is not available in an init block", func),
            );
        }

        for arg in args {
            let shape = self.expr(arg, scope);
            if shape == Shape::List && func.class() != BuiltinClass::Stats {
                self.error(
                    codes::E0108,
                    arg.span,
                    format!("function '{}' does not accept a list argument", func),
                );
            }
        }
    }

    fn image_read(&mut self, image: &Ident, selectors: &[Selector], scope: ScopeId) {
        match self.table.resolve(scope, &image.name) {
            None => self.undefined(image),
            Some(id) => {
                self.names.insert(image.span, NameRef::Symbol(id));
                let kind = self.table.get(id).kind;
                match kind {
                    SymbolKind::SourceImage => self.read_source(id, image),
                    SymbolKind::DestImage => self.error(
                        codes::E0104,
                        image.span,
                        format!("cannot read destination image '{}'", image.name),
                    ),
                    other => self.error(
                        codes::E0113,
                        image.span,
                        format!("'{}' is a {}, not an image", image.name, other),
                    ),
                }
            }
        }

        if let Err((span, reason)) = image_access(selectors) {
            self.error(codes::E0113, span, reason.to_string());
        }
        for sel in selectors {
            for coord in &sel.coords {
                self.scalar(&coord.value, scope);
            }
        }
    }

    // ── Finish ──

    fn finish(&mut self, script_span: Span) {
        if self.table.of_kind(SymbolKind::DestImage).next().is_none() {
            self.error(
                codes::E0112,
                (script_span.start..script_span.start).into(),
                "script has no destination image".to_string(),
            );
        }

        let unused: Vec<(SymbolKind, String, Span)> = self
            .table
            .symbols()
            .iter()
            .filter(|s| match s.kind {
                SymbolKind::DestImage => !self.dest_assigned.contains(&s.id),
                SymbolKind::SourceImage => !self.source_read.contains(&s.id),
                _ => false,
            })
            .map(|s| (s.kind, s.name.clone(), s.span))
            .collect();

        for (kind, name, span) in unused {
            if kind == SymbolKind::DestImage {
                self.warning(
                    codes::W0001,
                    span,
                    format!("destination image '{name}' is never assigned"),
                );
            } else {
                self.warning(
                    codes::W0002,
                    span,
                    format!("source image '{name}' is never read"),
                );
            }
        }
    }
}

fn describe_arity((min, max): (usize, usize)) -> String {
    let plural = |n: usize| if n == 1 { "argument" } else { "arguments" };
    if min == max {
        format!("{min} {}", plural(min))
    } else if max == usize::MAX {
        format!("at least {min} {}", plural(min))
    } else {
        format!("{min} to {max} arguments")
    }
}

/// Fold a constant expression: numbers, named constants, and signs.
fn const_value(expr: &Expr) -> Option<f64> {
    match &expr.kind {
        ExprKind::Number(n) => Some(*n),
        ExprKind::Name(ident) => builtins::constant(&ident.name),
        ExprKind::Unary(UnaryOp::Neg, inner) => const_value(inner).map(|v| -v),
        ExprKind::Unary(UnaryOp::Plus, inner) => const_value(inner),
        _ => None,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
