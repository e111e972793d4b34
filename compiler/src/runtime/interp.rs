// interp.rs — Tree-walking evaluation of LIR
//
// Executes one pixel's worth of a `LirScript` against an `Env` that supplies
// source samples and position values. Arithmetic is plain f64: division and
// modulo by zero give infinities or NaN, never an error.

use crate::ast::{BinaryOp, UnaryOp};
use crate::builtins::{truthy, Builtin};
use crate::lir::*;

use super::RuntimeError;

/// What the interpreter needs from the runtime.
pub(crate) trait Env {
    /// Sample source `image` at world position (`x`, `y`).
    fn read_source(&self, image: u32, band: f64, x: f64, y: f64) -> Result<f64, RuntimeError>;

    /// Current world position.
    fn position(&self) -> (f64, f64);

    /// `xmin()`, `width()`, ... against the processing bounds.
    fn bounds_value(&self, func: Builtin) -> Result<f64, RuntimeError>;
}

/// Control flow out of a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Break,
}

/// Mutable evaluation state for one pixel.
pub(crate) struct Machine<'s> {
    image_values: &'s mut [f64],
    pixel_values: Vec<f64>,
    lists: Vec<Vec<f64>>,
    outputs: Vec<Option<f64>>,
}

impl<'s> Machine<'s> {
    /// A machine with zeroed pixel slots and empty lists.
    pub(crate) fn new(script: &LirScript, image_values: &'s mut [f64]) -> Self {
        Machine {
            image_values,
            pixel_values: vec![0.0; script.pixel_slots.len()],
            lists: vec![Vec::new(); script.list_slots.len()],
            outputs: vec![None; script.destinations.len()],
        }
    }

    /// Run `stmts`, then hand back each destination's value (`None` if it
    /// was not written).
    pub(crate) fn run(mut self, stmts: &[LirStmt], env: &dyn Env) -> Result<Vec<Option<f64>>, RuntimeError> {
        self.exec_block(stmts, env)?;
        Ok(self.outputs)
    }

    fn exec_block(&mut self, stmts: &[LirStmt], env: &dyn Env) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            if self.exec(stmt, env)? == Flow::Break {
                return Ok(Flow::Break);
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, stmt: &LirStmt, env: &dyn Env) -> Result<Flow, RuntimeError> {
        match stmt {
            LirStmt::Store { slot, value } => {
                let v = self.eval(value, env)?;
                self.store(*slot, v);
            }
            LirStmt::StoreList { slot, value } => {
                let items = self.list(value, env)?;
                self.lists[slot.0 as usize] = items;
            }
            LirStmt::WriteDest { image, value } => {
                let v = self.eval(value, env)?;
                self.outputs[*image as usize] = Some(v);
            }
            LirStmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let branch = if truthy(self.eval(cond, env)?) {
                    then_body
                } else {
                    else_body
                };
                return self.exec_block(branch, env);
            }
            LirStmt::Loop { cond, until, body } => loop {
                if truthy(self.eval(cond, env)?) == *until {
                    break;
                }
                if self.exec_block(body, env)? == Flow::Break {
                    break;
                }
            },
            LirStmt::ForeachList { var, list, body } => {
                for item in self.list(list, env)? {
                    self.store(*var, item);
                    if self.exec_block(body, env)? == Flow::Break {
                        break;
                    }
                }
            }
            LirStmt::ForeachRange { var, lo, hi, body } => {
                let lo = self.eval(lo, env)?;
                let hi = self.eval(hi, env)?;
                if lo.is_nan() || hi.is_nan() {
                    return Ok(Flow::Next);
                }
                // Count in integers: past 2^53 adding 1.0 to an f64 is a no-op.
                for i in (lo as i64)..=(hi as i64) {
                    self.store(*var, i as f64);
                    if self.exec_block(body, env)? == Flow::Break {
                        break;
                    }
                }
            }
            LirStmt::BreakIf(cond) => {
                if truthy(self.eval(cond, env)?) {
                    return Ok(Flow::Break);
                }
            }
            LirStmt::Break => return Ok(Flow::Break),
        }
        Ok(Flow::Next)
    }

    fn store(&mut self, slot: VarSlot, value: f64) {
        match slot {
            VarSlot::Image(i) => self.image_values[i as usize] = value,
            VarSlot::Pixel(i) => self.pixel_values[i as usize] = value,
        }
    }

    fn load(&self, slot: VarSlot) -> f64 {
        match slot {
            VarSlot::Image(i) => self.image_values[i as usize],
            VarSlot::Pixel(i) => self.pixel_values[i as usize],
        }
    }

    fn list(&mut self, list: &LirList, env: &dyn Env) -> Result<Vec<f64>, RuntimeError> {
        match list {
            LirList::Slot(slot) => Ok(self.lists[slot.0 as usize].clone()),
            LirList::Literal(items) => items.iter().map(|e| self.eval(e, env)).collect(),
        }
    }

    fn eval(&mut self, expr: &LirExpr, env: &dyn Env) -> Result<f64, RuntimeError> {
        Ok(match expr {
            LirExpr::Const(v) => *v,
            LirExpr::Load(slot) => self.load(*slot),
            LirExpr::ReadSource { image, band, pos } => {
                let band = match band {
                    Some(b) => self.eval(b, env)?,
                    None => 0.0,
                };
                let (cx, cy) = env.position();
                let (x, y) = match pos {
                    Some(p) => {
                        let x = self.eval(&p.x.value, env)?;
                        let y = self.eval(&p.y.value, env)?;
                        (
                            if p.x.relative { cx + x } else { x },
                            if p.y.relative { cy + y } else { y },
                        )
                    }
                    None => (cx, cy),
                };
                env.read_source(*image, band, x, y)?
            }
            LirExpr::Position(Builtin::X) => env.position().0,
            LirExpr::Position(Builtin::Y) => env.position().1,
            LirExpr::Position(func) => env.bounds_value(*func)?,
            LirExpr::Unary(op, inner) => {
                let v = self.eval(inner, env)?;
                match op {
                    UnaryOp::Neg => -v,
                    UnaryOp::Plus => v,
                    UnaryOp::Not => flag(!truthy(v)),
                }
            }
            LirExpr::Binary(BinaryOp::And, lhs, rhs) => {
                flag(truthy(self.eval(lhs, env)?) && truthy(self.eval(rhs, env)?))
            }
            LirExpr::Binary(BinaryOp::Or, lhs, rhs) => {
                flag(truthy(self.eval(lhs, env)?) || truthy(self.eval(rhs, env)?))
            }
            LirExpr::Binary(op, lhs, rhs) => {
                let a = self.eval(lhs, env)?;
                let b = self.eval(rhs, env)?;
                arithmetic(*op, a, b)
            }
            LirExpr::Select {
                cond,
                then_value,
                else_value,
            } => {
                if truthy(self.eval(cond, env)?) {
                    self.eval(then_value, env)?
                } else {
                    self.eval(else_value, env)?
                }
            }
            LirExpr::Call { func, args } => {
                let values = args
                    .iter()
                    .map(|a| self.eval(a, env))
                    .collect::<Result<Vec<_>, _>>()?;
                func.apply_scalar(&values)
            }
            LirExpr::Stats { func, args } => {
                let mut sample = Vec::new();
                for arg in args {
                    match arg {
                        LirArg::Scalar(e) => sample.push(self.eval(e, env)?),
                        LirArg::List(l) => sample.extend(self.list(l, env)?),
                    }
                }
                func.apply_stats(&sample)
            }
        })
    }
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Non-short-circuit binary operators.
pub(crate) fn arithmetic(op: BinaryOp, a: f64, b: f64) -> f64 {
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        // a*a is the correctly rounded square, as is powf(a, 2).
        BinaryOp::Pow if b == 2.0 => a * a,
        BinaryOp::Pow => a.powf(b),
        BinaryOp::Eq => flag(a == b),
        BinaryOp::Ne => flag(a != b),
        BinaryOp::Lt => flag(a < b),
        BinaryOp::Le => flag(a <= b),
        BinaryOp::Gt => flag(a > b),
        BinaryOp::Ge => flag(a >= b),
        BinaryOp::And => flag(truthy(a) && truthy(b)),
        BinaryOp::Or => flag(truthy(a) || truthy(b)),
        BinaryOp::Xor => flag(truthy(a) != truthy(b)),
    }
}
