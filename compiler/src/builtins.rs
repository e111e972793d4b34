// builtins.rs — Built-in functions and named constants
//
// The script language has no user-defined functions: every call resolves to
// one of the fixed built-ins here. Scalar and statistical functions are pure
// and evaluated here; position functions depend on the evaluation state and
// are evaluated by the runtime.

use std::cmp::Ordering;
use std::fmt;

// ── Constants ──────────────────────────────────────────────────────────────

/// Value of a named constant, if `name` is one.
pub fn constant(name: &str) -> Option<f64> {
    use std::f64::consts;
    let value = match name {
        "M_PI" => consts::PI,
        "M_PI_2" => consts::FRAC_PI_2,
        "M_PI_4" => consts::FRAC_PI_4,
        "M_E" => consts::E,
        "M_SQRT2" => consts::SQRT_2,
        "NaN" | "NULL" => f64::NAN,
        _ => return None,
    };
    Some(value)
}

// ── Functions ──────────────────────────────────────────────────────────────

/// How a built-in takes its arguments and where it is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinClass {
    /// No arguments; reads the current pixel position or processing bounds.
    Position,
    /// Fixed number of scalar arguments.
    Scalar,
    /// Any mix of scalars and lists, flattened into one sample.
    Stats,
}

macro_rules! builtins {
    ($( $variant:ident => $name:literal, $class:ident, $min:literal ..= $max:expr; )*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Builtin {
            $( $variant, )*
        }

        impl Builtin {
            /// Look up a built-in function by its script name.
            pub fn lookup(name: &str) -> Option<Builtin> {
                match name {
                    $( $name => Some(Builtin::$variant), )*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $( Builtin::$variant => $name, )*
                }
            }

            pub fn class(self) -> BuiltinClass {
                match self {
                    $( Builtin::$variant => BuiltinClass::$class, )*
                }
            }

            /// Accepted argument counts, inclusive. `usize::MAX` means unbounded.
            pub fn arity(self) -> (usize, usize) {
                match self {
                    $( Builtin::$variant => ($min, $max), )*
                }
            }
        }
    };
}

const ANY: usize = usize::MAX;

builtins! {
    // position
    X => "x", Position, 0..=0;
    Y => "y", Position, 0..=0;
    XMin => "xmin", Position, 0..=0;
    YMin => "ymin", Position, 0..=0;
    XMax => "xmax", Position, 0..=0;
    YMax => "ymax", Position, 0..=0;
    Width => "width", Position, 0..=0;
    Height => "height", Position, 0..=0;

    // scalar
    Abs => "abs", Scalar, 1..=1;
    Acos => "acos", Scalar, 1..=1;
    Asin => "asin", Scalar, 1..=1;
    Atan => "atan", Scalar, 1..=1;
    Atan2 => "atan2", Scalar, 2..=2;
    Ceil => "ceil", Scalar, 1..=1;
    Con => "con", Scalar, 1..=4;
    Cos => "cos", Scalar, 1..=1;
    DegToRad => "degToRad", Scalar, 1..=1;
    Exp => "exp", Scalar, 1..=1;
    Floor => "floor", Scalar, 1..=1;
    Hypot => "hypot", Scalar, 2..=2;
    IsInf => "isinf", Scalar, 1..=1;
    IsNan => "isnan", Scalar, 1..=1;
    IsNull => "isnull", Scalar, 1..=1;
    Log => "log", Scalar, 1..=2;
    Log10 => "log10", Scalar, 1..=1;
    RadToDeg => "radToDeg", Scalar, 1..=1;
    Round => "round", Scalar, 1..=2;
    Sin => "sin", Scalar, 1..=1;
    Sqrt => "sqrt", Scalar, 1..=1;
    Tan => "tan", Scalar, 1..=1;

    // statistics
    Max => "max", Stats, 1..=ANY;
    Min => "min", Stats, 1..=ANY;
    Mean => "mean", Stats, 1..=ANY;
    Median => "median", Stats, 1..=ANY;
    Mode => "mode", Stats, 1..=ANY;
    Range => "range", Stats, 1..=ANY;
    Sdev => "sdev", Stats, 1..=ANY;
    Sum => "sum", Stats, 1..=ANY;
    Variance => "variance", Stats, 1..=ANY;
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Script truth: non-zero and not NaN.
pub fn truthy(v: f64) -> bool {
    v != 0.0 && !v.is_nan()
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl Builtin {
    /// Whether `argc` arguments are accepted.
    pub fn accepts(self, argc: usize) -> bool {
        let (min, max) = self.arity();
        argc >= min && argc <= max
    }

    /// Evaluate a scalar built-in. `args.len()` has been checked against
    /// [`Builtin::arity`]; missing optional arguments take their defaults.
    pub fn apply_scalar(self, args: &[f64]) -> f64 {
        let a = args.first().copied().unwrap_or(f64::NAN);
        let b = args.get(1).copied();
        match self {
            Builtin::Abs => a.abs(),
            Builtin::Acos => a.acos(),
            Builtin::Asin => a.asin(),
            Builtin::Atan => a.atan(),
            Builtin::Atan2 => a.atan2(b.unwrap_or(f64::NAN)),
            Builtin::Ceil => a.ceil(),
            Builtin::Con => con(args),
            Builtin::Cos => a.cos(),
            Builtin::DegToRad => a.to_radians(),
            Builtin::Exp => a.exp(),
            Builtin::Floor => a.floor(),
            Builtin::Hypot => a.hypot(b.unwrap_or(f64::NAN)),
            Builtin::IsInf => flag(a.is_infinite()),
            Builtin::IsNan | Builtin::IsNull => flag(a.is_nan()),
            Builtin::Log => match b {
                Some(base) => a.ln() / base.ln(),
                None => a.ln(),
            },
            Builtin::Log10 => a.log10(),
            Builtin::RadToDeg => a.to_degrees(),
            Builtin::Round => match b {
                Some(step) => (a / step).round() * step,
                None => a.round(),
            },
            Builtin::Sin => a.sin(),
            Builtin::Sqrt => a.sqrt(),
            Builtin::Tan => a.tan(),
            _ => f64::NAN,
        }
    }

    /// Evaluate a statistical built-in over a flattened sample. NaN values
    /// are ignored; an empty sample yields NaN.
    pub fn apply_stats(self, values: &[f64]) -> f64 {
        let mut sample: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if sample.is_empty() {
            return f64::NAN;
        }
        let n = sample.len() as f64;
        match self {
            Builtin::Max => sample.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Builtin::Min => sample.iter().copied().fold(f64::INFINITY, f64::min),
            Builtin::Sum => sample.iter().sum(),
            Builtin::Mean => sample.iter().sum::<f64>() / n,
            Builtin::Range => {
                let max = sample.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let min = sample.iter().copied().fold(f64::INFINITY, f64::min);
                max - min
            }
            Builtin::Median => {
                sample.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
                let mid = sample.len() / 2;
                if sample.len() % 2 == 0 {
                    (sample[mid - 1] + sample[mid]) / 2.0
                } else {
                    sample[mid]
                }
            }
            Builtin::Mode => {
                sample.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
                mode_of_sorted(&sample)
            }
            Builtin::Variance => variance(&sample),
            Builtin::Sdev => variance(&sample).sqrt(),
            _ => f64::NAN,
        }
    }
}

/// `con(x)`, `con(x, a)`, `con(x, a, b)` test truth; the 4-argument form
/// picks by sign: `a` if positive, `b` if zero, `c` if negative.
fn con(args: &[f64]) -> f64 {
    match *args {
        [x] => flag(truthy(x)),
        [x, a] => {
            if truthy(x) {
                a
            } else {
                0.0
            }
        }
        [x, a, b] => {
            if truthy(x) {
                a
            } else {
                b
            }
        }
        [x, a, b, c] => {
            if x > 0.0 {
                a
            } else if x == 0.0 {
                b
            } else if x < 0.0 {
                c
            } else {
                f64::NAN
            }
        }
        _ => f64::NAN,
    }
}

/// Sample variance; NaN for fewer than two values.
fn variance(sample: &[f64]) -> f64 {
    if sample.len() < 2 {
        return f64::NAN;
    }
    let n = sample.len() as f64;
    let mean = sample.iter().sum::<f64>() / n;
    sample.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0)
}

/// Most frequent value of a sorted sample; ties go to the smallest value.
fn mode_of_sorted(sorted: &[f64]) -> f64 {
    let mut best = sorted[0];
    let mut best_count = 0;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        if j - i > best_count {
            best = sorted[i];
            best_count = j - i;
        }
        i = j;
    }
    best
}
