// codegen.rs — Lower a resolved script to LIR
//
// Assigns every symbol a runtime slot (image-scope scalars, pixel-scope
// scalars and loop variables, lists) and every image an index, then lowers
// statements and expressions to `LirStmt` / `LirExpr`. Slots are allocated per
// symbol, so repeated assignment to one variable always targets one slot.
//
// Preconditions: `resolved` came from `resolve::resolve` on `script` with no
//                error diagnostics.
// Postconditions: returns a `LirScript` whose slot and image indices are all
//                 in range, or `None` after reporting an `E0900` diagnostic.
// Failure modes: an identifier without a resolution, or a list in a scalar
//                position, is an internal inconsistency reported as `E0900`.
// Side effects: appends to `Diagnostics` on failure.

use std::collections::HashMap;

use crate::ast::*;
use crate::builtins::BuiltinClass;
use crate::diag::{codes, Diagnostics};
use crate::id::SymbolId;
use crate::lir::*;
use crate::resolve::{NameRef, ResolvedScript};
use crate::symbol::{ScopeKind, SymbolKind};

/// Lower `script` to LIR.
pub fn lower(script: &Script, resolved: &ResolvedScript, diags: &mut Diagnostics) -> Option<LirScript> {
    let mut ctx = CodegenCtx::new(resolved, diags);

    let mut init = Vec::new();
    for stmt in &script.statements {
        if let StatementKind::Init(values) = &stmt.kind {
            for nv in values {
                let value = ctx.expr(&nv.value);
                if let Some(slot) = ctx.var_slot(nv.name.span, &nv.name.name) {
                    init.push(LirStmt::Store { slot, value });
                }
            }
        }
    }

    let mut body = Vec::new();
    for stmt in &script.statements {
        ctx.statement(stmt, &mut body);
    }

    if ctx.failed {
        return None;
    }

    let lir = LirScript {
        sources: ctx.sources,
        destinations: ctx.destinations,
        image_slots: ctx.image_slots,
        pixel_slots: ctx.pixel_slots,
        list_slots: ctx.list_slots,
        init,
        body,
        outside: resolved.outside,
    };

    tracing::debug!(
        image_slots = lir.image_slots.len(),
        pixel_slots = lir.pixel_slots.len(),
        list_slots = lir.list_slots.len(),
        "lowered script"
    );

    Some(lir)
}

// ── Context ────────────────────────────────────────────────────────────────

struct CodegenCtx<'a> {
    resolved: &'a ResolvedScript,
    diags: &'a mut Diagnostics,
    failed: bool,
    source_index: HashMap<SymbolId, u32>,
    dest_index: HashMap<SymbolId, u32>,
    slots: HashMap<SymbolId, VarSlot>,
    lists: HashMap<SymbolId, ListSlot>,
    sources: Vec<String>,
    destinations: Vec<String>,
    image_slots: Vec<String>,
    pixel_slots: Vec<String>,
    list_slots: Vec<String>,
}

impl<'a> CodegenCtx<'a> {
    fn new(resolved: &'a ResolvedScript, diags: &'a mut Diagnostics) -> Self {
        let mut ctx = CodegenCtx {
            resolved,
            diags,
            failed: false,
            source_index: HashMap::new(),
            dest_index: HashMap::new(),
            slots: HashMap::new(),
            lists: HashMap::new(),
            sources: Vec::new(),
            destinations: Vec::new(),
            image_slots: Vec::new(),
            pixel_slots: Vec::new(),
            list_slots: Vec::new(),
        };
        for sym in resolved.table.of_kind(SymbolKind::SourceImage) {
            ctx.source_index.insert(sym.id, ctx.sources.len() as u32);
            ctx.sources.push(sym.name.clone());
        }
        for sym in resolved.table.of_kind(SymbolKind::DestImage) {
            ctx.dest_index.insert(sym.id, ctx.destinations.len() as u32);
            ctx.destinations.push(sym.name.clone());
        }
        ctx
    }

    fn internal(&mut self, span: Span, message: String) {
        self.failed = true;
        self.diags.error(codes::E0900, span, format!("internal: {message}"));
    }

    fn symbol(&mut self, span: Span, name: &str) -> Option<SymbolId> {
        let id = self.resolved.symbol_at(span);
        if id.is_none() {
            self.internal(span, format!("no symbol for '{name}'"));
        }
        id
    }

    // ── Slots ──

    /// Scalar slot for the symbol at `span`, allocated on first use.
    fn var_slot(&mut self, span: Span, name: &str) -> Option<VarSlot> {
        let id = self.symbol(span, name)?;
        if let Some(slot) = self.slots.get(&id) {
            return Some(*slot);
        }
        let resolved = self.resolved;
        let symbol = resolved.table.get(id);
        let in_image_scope = resolved.table.scope(symbol.scope).kind == ScopeKind::Image;
        let slot = match symbol.kind {
            SymbolKind::Scalar if in_image_scope => {
                self.image_slots.push(symbol.name.clone());
                VarSlot::Image(self.image_slots.len() as u32 - 1)
            }
            SymbolKind::Scalar | SymbolKind::LoopVar => {
                self.pixel_slots.push(symbol.name.clone());
                VarSlot::Pixel(self.pixel_slots.len() as u32 - 1)
            }
            other => {
                self.internal(span, format!("'{name}' is a {other}, not a scalar"));
                return None;
            }
        };
        self.slots.insert(id, slot);
        Some(slot)
    }

    fn list_slot(&mut self, id: SymbolId) -> ListSlot {
        if let Some(slot) = self.lists.get(&id) {
            return *slot;
        }
        self.list_slots.push(self.resolved.table.get(id).name.clone());
        let slot = ListSlot(self.list_slots.len() as u32 - 1);
        self.lists.insert(id, slot);
        slot
    }

    // ── Statements ──

    fn body(&mut self, stmt: &Statement) -> Vec<LirStmt> {
        let mut out = Vec::new();
        self.statement(stmt, &mut out);
        out
    }

    fn statement(&mut self, stmt: &Statement, out: &mut Vec<LirStmt>) {
        match &stmt.kind {
            StatementKind::Images(_) | StatementKind::Init(_) | StatementKind::Options(_) => {}
            StatementKind::Assign(assign) => {
                if let Some(s) = self.assign(assign) {
                    out.push(s);
                }
            }
            StatementKind::If(s) => {
                let cond = self.expr(&s.cond);
                let then_body = self.body(&s.then_branch);
                let else_body = match &s.else_branch {
                    Some(e) => self.body(e),
                    None => Vec::new(),
                };
                out.push(LirStmt::If {
                    cond,
                    then_body,
                    else_body,
                });
            }
            StatementKind::While(l) | StatementKind::Until(l) => {
                let until = matches!(stmt.kind, StatementKind::Until(_));
                let cond = self.expr(&l.cond);
                let body = self.body(&l.body);
                out.push(LirStmt::Loop { cond, until, body });
            }
            StatementKind::Foreach(f) => {
                let Some(var) = self.var_slot(f.var.span, &f.var.name) else {
                    return;
                };
                let lowered = match &f.source {
                    ForeachSource::Range(lo, hi) => {
                        let lo = self.expr(lo);
                        let hi = self.expr(hi);
                        let body = self.body(&f.body);
                        LirStmt::ForeachRange { var, lo, hi, body }
                    }
                    ForeachSource::List(list) => {
                        let list = self.list(list);
                        let body = self.body(&f.body);
                        LirStmt::ForeachList { var, list, body }
                    }
                };
                out.push(lowered);
            }
            StatementKind::Block(stmts) => {
                for s in stmts {
                    self.statement(s, out);
                }
            }
            StatementKind::BreakIf(cond) => {
                let cond = self.expr(cond);
                out.push(LirStmt::BreakIf(cond));
            }
            StatementKind::Break => out.push(LirStmt::Break),
        }
    }

    fn assign(&mut self, assign: &Assign) -> Option<LirStmt> {
        let target = &assign.target;
        let id = self.symbol(target.span, &target.name)?;
        let kind = self.resolved.table.get(id).kind;
        match kind {
            SymbolKind::DestImage => {
                let image = *self.dest_index.get(&id)?;
                let value = self.expr(&assign.value);
                Some(LirStmt::WriteDest { image, value })
            }
            SymbolKind::List => {
                let slot = self.list_slot(id);
                let value = self.list(&assign.value);
                Some(LirStmt::StoreList { slot, value })
            }
            SymbolKind::Scalar | SymbolKind::LoopVar => {
                let slot = self.var_slot(target.span, &target.name)?;
                let rhs = self.expr(&assign.value);
                let value = match assign.op.binary() {
                    Some(op) => LirExpr::Binary(op, Box::new(LirExpr::Load(slot)), Box::new(rhs)),
                    None => rhs,
                };
                Some(LirStmt::Store { slot, value })
            }
            SymbolKind::SourceImage => {
                self.internal(target.span, format!("write to source image '{}'", target.name));
                None
            }
        }
    }

    // ── Expressions ──

    fn expr(&mut self, expr: &Expr) -> LirExpr {
        match &expr.kind {
            ExprKind::Number(n) => LirExpr::Const(*n),
            ExprKind::Name(ident) => self.name(ident),
            ExprKind::Call { name, args } => self.call(name, args),
            ExprKind::ImageRead { image, selectors } => self.image_read(image, selectors),
            ExprKind::List(_) => {
                self.internal(expr.span, "list in scalar position".to_string());
                LirExpr::Const(f64::NAN)
            }
            ExprKind::Unary(op, inner) => LirExpr::Unary(*op, Box::new(self.expr(inner))),
            ExprKind::Binary(op, lhs, rhs) => {
                LirExpr::Binary(*op, Box::new(self.expr(lhs)), Box::new(self.expr(rhs)))
            }
            ExprKind::Conditional {
                cond,
                then_value,
                else_value,
            } => LirExpr::Select {
                cond: Box::new(self.expr(cond)),
                then_value: Box::new(self.expr(then_value)),
                else_value: Box::new(self.expr(else_value)),
            },
        }
    }

    fn name(&mut self, ident: &Ident) -> LirExpr {
        match self.resolved.names.get(&ident.span) {
            Some(NameRef::Constant(v)) => LirExpr::Const(*v),
            Some(NameRef::Symbol(id)) => {
                if let Some(&image) = self.source_index.get(id) {
                    return LirExpr::ReadSource {
                        image,
                        band: None,
                        pos: None,
                    };
                }
                match self.var_slot(ident.span, &ident.name) {
                    Some(slot) => LirExpr::Load(slot),
                    None => LirExpr::Const(f64::NAN),
                }
            }
            None => {
                self.internal(ident.span, format!("unresolved name '{}'", ident.name));
                LirExpr::Const(f64::NAN)
            }
        }
    }

    fn call(&mut self, name: &Ident, args: &[Expr]) -> LirExpr {
        let Some(&func) = self.resolved.calls.get(&name.span) else {
            self.internal(name.span, format!("unresolved function '{}'", name.name));
            return LirExpr::Const(f64::NAN);
        };
        match func.class() {
            BuiltinClass::Position => LirExpr::Position(func),
            BuiltinClass::Scalar => LirExpr::Call {
                func,
                args: args.iter().map(|a| self.expr(a)).collect(),
            },
            BuiltinClass::Stats => LirExpr::Stats {
                func,
                args: args.iter().map(|a| self.stats_arg(a)).collect(),
            },
        }
    }

    fn stats_arg(&mut self, arg: &Expr) -> LirArg {
        if self.is_list(arg) {
            LirArg::List(self.list(arg))
        } else {
            LirArg::Scalar(self.expr(arg))
        }
    }

    fn is_list(&self, expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::List(_) => true,
            ExprKind::Name(ident) => self
                .resolved
                .symbol_at(ident.span)
                .is_some_and(|id| self.resolved.table.get(id).kind == SymbolKind::List),
            _ => false,
        }
    }

    fn list(&mut self, expr: &Expr) -> LirList {
        match &expr.kind {
            ExprKind::List(items) => LirList::Literal(items.iter().map(|e| self.expr(e)).collect()),
            ExprKind::Name(ident) if self.is_list(expr) => match self.resolved.symbol_at(ident.span) {
                Some(id) => LirList::Slot(self.list_slot(id)),
                None => LirList::Literal(Vec::new()),
            },
            _ => {
                self.internal(expr.span, "expected a list".to_string());
                LirList::Literal(Vec::new())
            }
        }
    }

    fn image_read(&mut self, image: &Ident, selectors: &[Selector]) -> LirExpr {
        let index = self
            .resolved
            .symbol_at(image.span)
            .and_then(|id| self.source_index.get(&id).copied());
        let Some(index) = index else {
            self.internal(image.span, format!("'{}' is not a source image", image.name));
            return LirExpr::Const(f64::NAN);
        };
        let access = match image_access(selectors) {
            Ok(access) => access,
            Err((span, reason)) => {
                self.internal(span, reason.to_string());
                return LirExpr::Const(f64::NAN);
            }
        };
        let band = access.band.map(|b| Box::new(self.expr(b)));
        let pos = access.pos.map(|(x, y)| {
            Box::new(LirPos {
                x: LirCoord {
                    relative: x.relative,
                    value: self.expr(&x.value),
                },
                y: LirCoord {
                    relative: y.relative,
                    value: self.expr(&y.value),
                },
            })
        });
        LirExpr::ReadSource {
            image: index,
            band,
            pos,
        }
    }
}
