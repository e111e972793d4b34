//! LIR – Lowered, slot-resolved form of a compiled script.
//!
//! `LirScript` is self-contained: every variable is a numbered slot, every
//! image an index into the source or destination list, and every call a
//! resolved built-in. The runtime interprets it without consulting the AST,
//! the symbol table or the diagnostics of the compile that produced it.

use std::fmt::{self, Write};

use crate::ast::{BinaryOp, UnaryOp};
use crate::builtins::Builtin;

// ── Top-level ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct LirScript {
    /// Source image names; `LirExpr::ReadSource::image` indexes this.
    pub sources: Vec<String>,
    /// Destination image names; `LirStmt::WriteDest::image` indexes this.
    pub destinations: Vec<String>,
    /// Names of image-scope scalar slots (kept across pixels).
    pub image_slots: Vec<String>,
    /// Names of pixel-scope scalar slots (zeroed before each pixel).
    pub pixel_slots: Vec<String>,
    /// Names of pixel-scope list slots (emptied before each pixel).
    pub list_slots: Vec<String>,
    /// Runs once before the first pixel.
    pub init: Vec<LirStmt>,
    /// Runs for every pixel.
    pub body: Vec<LirStmt>,
    /// Value returned for source reads outside the raster, if set.
    pub outside: Option<f64>,
}

// ── Slots ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarSlot {
    Image(u32),
    Pixel(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListSlot(pub u32);

// ── Statements ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum LirStmt {
    Store {
        slot: VarSlot,
        value: LirExpr,
    },
    StoreList {
        slot: ListSlot,
        value: LirList,
    },
    WriteDest {
        image: u32,
        value: LirExpr,
    },
    If {
        cond: LirExpr,
        then_body: Vec<LirStmt>,
        else_body: Vec<LirStmt>,
    },
    /// `while` (runs while `cond` holds) or `until` (runs until it holds).
    Loop {
        cond: LirExpr,
        until: bool,
        body: Vec<LirStmt>,
    },
    ForeachList {
        var: VarSlot,
        list: LirList,
        body: Vec<LirStmt>,
    },
    /// Inclusive integer range; bounds are truncated toward zero.
    ForeachRange {
        var: VarSlot,
        lo: LirExpr,
        hi: LirExpr,
        body: Vec<LirStmt>,
    },
    BreakIf(LirExpr),
    Break,
}

// ── Expressions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum LirExpr {
    Const(f64),
    Load(VarSlot),
    ReadSource {
        image: u32,
        band: Option<Box<LirExpr>>,
        pos: Option<Box<LirPos>>,
    },
    /// `x()`, `width()`, ... evaluated against the current pixel and bounds.
    Position(Builtin),
    Unary(UnaryOp, Box<LirExpr>),
    Binary(BinaryOp, Box<LirExpr>, Box<LirExpr>),
    Select {
        cond: Box<LirExpr>,
        then_value: Box<LirExpr>,
        else_value: Box<LirExpr>,
    },
    Call {
        func: Builtin,
        args: Vec<LirExpr>,
    },
    Stats {
        func: Builtin,
        args: Vec<LirArg>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LirPos {
    pub x: LirCoord,
    pub y: LirCoord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LirCoord {
    pub relative: bool,
    pub value: LirExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LirList {
    Slot(ListSlot),
    Literal(Vec<LirExpr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LirArg {
    Scalar(LirExpr),
    List(LirList),
}

// ── Dump ───────────────────────────────────────────────────────────────────

impl fmt::Display for LirScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "LirScript ({} sources, {} destinations, {} image slots, {} pixel slots, {} list slots)",
            self.sources.len(),
            self.destinations.len(),
            self.image_slots.len(),
            self.pixel_slots.len(),
            self.list_slots.len()
        )?;
        if let Some(v) = self.outside {
            writeln!(f, "  outside = {}", v)?;
        }
        if !self.init.is_empty() {
            writeln!(f, "  init:")?;
            for s in &self.init {
                fmt_stmt(f, self, s, "    ")?;
            }
        }
        writeln!(f, "  body:")?;
        for s in &self.body {
            fmt_stmt(f, self, s, "    ")?;
        }
        Ok(())
    }
}

fn fmt_stmt(f: &mut fmt::Formatter<'_>, script: &LirScript, stmt: &LirStmt, indent: &str) -> fmt::Result {
    let deeper = format!("{indent}  ");
    match stmt {
        LirStmt::Store { slot, value } => {
            writeln!(f, "{}{} = {}", indent, script.slot_name(*slot), script.expr_text(value))
        }
        LirStmt::StoreList { slot, value } => writeln!(
            f,
            "{}{} = {}",
            indent,
            script.list_name(*slot),
            script.list_text(value)
        ),
        LirStmt::WriteDest { image, value } => writeln!(
            f,
            "{}write {} <- {}",
            indent,
            script.dest_name(*image),
            script.expr_text(value)
        ),
        LirStmt::If {
            cond,
            then_body,
            else_body,
        } => {
            writeln!(f, "{}if {}", indent, script.expr_text(cond))?;
            for s in then_body {
                fmt_stmt(f, script, s, &deeper)?;
            }
            if !else_body.is_empty() {
                writeln!(f, "{}else", indent)?;
                for s in else_body {
                    fmt_stmt(f, script, s, &deeper)?;
                }
            }
            Ok(())
        }
        LirStmt::Loop { cond, until, body } => {
            let kw = if *until { "until" } else { "while" };
            writeln!(f, "{}{} {}", indent, kw, script.expr_text(cond))?;
            for s in body {
                fmt_stmt(f, script, s, &deeper)?;
            }
            Ok(())
        }
        LirStmt::ForeachList { var, list, body } => {
            writeln!(
                f,
                "{}foreach {} in {}",
                indent,
                script.slot_name(*var),
                script.list_text(list)
            )?;
            for s in body {
                fmt_stmt(f, script, s, &deeper)?;
            }
            Ok(())
        }
        LirStmt::ForeachRange { var, lo, hi, body } => {
            writeln!(
                f,
                "{}foreach {} in {}:{}",
                indent,
                script.slot_name(*var),
                script.expr_text(lo),
                script.expr_text(hi)
            )?;
            for s in body {
                fmt_stmt(f, script, s, &deeper)?;
            }
            Ok(())
        }
        LirStmt::BreakIf(cond) => writeln!(f, "{}breakif {}", indent, script.expr_text(cond)),
        LirStmt::Break => writeln!(f, "{}break", indent),
    }
}

impl LirScript {
    /// `name@p0` for pixel slots, `name@i0` for image slots.
    pub fn slot_name(&self, slot: VarSlot) -> String {
        match slot {
            VarSlot::Image(i) => format!("{}@i{}", name_at(&self.image_slots, i), i),
            VarSlot::Pixel(i) => format!("{}@p{}", name_at(&self.pixel_slots, i), i),
        }
    }

    pub fn list_name(&self, slot: ListSlot) -> String {
        format!("{}@l{}", name_at(&self.list_slots, slot.0), slot.0)
    }

    pub fn source_name(&self, image: u32) -> &str {
        name_at(&self.sources, image)
    }

    pub fn dest_name(&self, image: u32) -> &str {
        name_at(&self.destinations, image)
    }

    /// Fully parenthesised rendering of an expression.
    pub fn expr_text(&self, expr: &LirExpr) -> String {
        let mut out = String::new();
        self.write_expr(&mut out, expr);
        out
    }

    fn list_text(&self, list: &LirList) -> String {
        match list {
            LirList::Slot(slot) => self.list_name(*slot),
            LirList::Literal(items) => {
                let items: Vec<String> = items.iter().map(|e| self.expr_text(e)).collect();
                format!("[{}]", items.join(", "))
            }
        }
    }

    fn write_expr(&self, out: &mut String, expr: &LirExpr) {
        match expr {
            LirExpr::Const(v) => {
                let _ = write!(out, "{}", v);
            }
            LirExpr::Load(slot) => out.push_str(&self.slot_name(*slot)),
            LirExpr::ReadSource { image, band, pos } => {
                out.push_str(self.source_name(*image));
                if let Some(band) = band {
                    out.push('[');
                    self.write_expr(out, band);
                    out.push(']');
                }
                if let Some(pos) = pos {
                    out.push('[');
                    self.write_coord(out, &pos.x);
                    out.push_str(", ");
                    self.write_coord(out, &pos.y);
                    out.push(']');
                }
            }
            LirExpr::Position(func) => {
                let _ = write!(out, "{}()", func);
            }
            LirExpr::Unary(op, inner) => {
                out.push('(');
                out.push_str(op.symbol());
                self.write_expr(out, inner);
                out.push(')');
            }
            LirExpr::Binary(op, lhs, rhs) => {
                out.push('(');
                self.write_expr(out, lhs);
                let _ = write!(out, " {} ", op.symbol());
                self.write_expr(out, rhs);
                out.push(')');
            }
            LirExpr::Select {
                cond,
                then_value,
                else_value,
            } => {
                out.push('(');
                self.write_expr(out, cond);
                out.push_str(" ? ");
                self.write_expr(out, then_value);
                out.push_str(" : ");
                self.write_expr(out, else_value);
                out.push(')');
            }
            LirExpr::Call { func, args } => {
                let _ = write!(out, "{}(", func);
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_expr(out, arg);
                }
                out.push(')');
            }
            LirExpr::Stats { func, args } => {
                let _ = write!(out, "{}(", func);
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    match arg {
                        LirArg::Scalar(e) => self.write_expr(out, e),
                        LirArg::List(l) => out.push_str(&self.list_text(l)),
                    }
                }
                out.push(')');
            }
        }
    }

    fn write_coord(&self, out: &mut String, coord: &LirCoord) {
        if coord.relative {
            out.push('$');
        }
        self.write_expr(out, &coord.value);
    }
}

fn name_at(names: &[String], index: u32) -> &str {
    names.get(index as usize).map(String::as_str).unwrap_or("?")
}
