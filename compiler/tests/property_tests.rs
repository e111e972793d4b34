// Property-based tests for evaluation invariants.
//
// Two categories:
// 1. Arithmetic: compiled scripts agree with native f64 arithmetic
// 2. Sweep: every pixel of any extent is visited once, in row-major order
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use proptest::prelude::*;

use rasc::pipeline::{compile, CompileOptions, CompiledScript};
use rasc::progress::ProgressListener;
use rasc::raster::{Extent, GridRaster};
use rasc::runtime::{DestBindable, DirectlyEvaluable, SourceBindable, SweepEvaluable};
use rasc::Dialect;

// ── Helpers ─────────────────────────────────────────────────────────────────

fn compile_ok(source: &str) -> CompiledScript {
    let opts = CompileOptions::new().source("src").destination("dest");
    let outcome = compile(source, &opts);
    match outcome.script {
        Some(script) => script,
        None => panic!("compile failed:\n{}", outcome.diagnostics.render()),
    }
}

fn eval(script: &CompiledScript, v: f64) -> f64 {
    let src = GridRaster::filled(Extent::sized(1, 1), 1, v).unwrap();
    let mut rt = script.direct_runtime();
    rt.set_source_image("src", &src).unwrap();
    rt.evaluate(0.0, 0.0).unwrap()[0]
}

fn same(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
}

#[derive(Default)]
struct Fractions(Vec<f64>);

impl ProgressListener for Fractions {
    fn update(&mut self, fraction: f64) {
        self.0.push(fraction);
    }
}

// ── Arithmetic ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn square_equals_product(v in -1.0e6f64..1.0e6) {
        let script = compile_ok("dest = src^2;");
        prop_assert!(same(eval(&script, v), v * v));
    }

    #[test]
    fn modulo_matches_native(v in -1.0e6f64..1.0e6) {
        let script = compile_ok("dest = src % 11;");
        prop_assert!(same(eval(&script, v), v % 11.0));
    }

    #[test]
    fn linear_forms_match(v in -1.0e6f64..1.0e6) {
        let cases: [(&str, fn(f64) -> f64); 5] = [
            ("dest = src;", |v| v),
            ("dest = -src;", |v| -v),
            ("dest = src + 1;", |v| v + 1.0),
            ("dest = 1 - src;", |v| 1.0 - v),
            ("dest = 1 / src;", |v| 1.0 / v),
        ];
        for (source, f) in cases {
            let script = compile_ok(source);
            prop_assert!(same(eval(&script, v), f(v)), "{} at {}", source, v);
        }
    }

    #[test]
    fn dialect_does_not_change_semicolon_scripts(v in -100.0f64..100.0, k in 1u32..20) {
        let source = format!("a = src * {k}; b = a - {k};\ndest = a / (b + 0.5);");
        let results: Vec<f64> = [Dialect::Standard, Dialect::Extended]
            .into_iter()
            .map(|dialect| {
                let opts = CompileOptions::new()
                    .dialect(dialect)
                    .source("src")
                    .destination("dest");
                let script = compile(&source, &opts).script.unwrap();
                eval(&script, v)
            })
            .collect();
        prop_assert!(same(results[0], results[1]));
    }
}

// ── Sweep ───────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn sweep_order_is_row_major(
        min_x in -20i64..20,
        min_y in -20i64..20,
        width in 1u32..12,
        height in 1u32..12,
    ) {
        let script = compile_ok("init { n = 0; } n += 1; dest = n * 1000000 + (y() - ymin()) * 1000 + x() - xmin() + 0 * src;");
        let extent = Extent::new(min_x, min_y, width, height);
        let src = GridRaster::new(extent, 1).unwrap();
        let mut dest = GridRaster::new(extent, 1).unwrap();
        let mut progress = Fractions::default();
        {
            let mut rt = script.sweep_runtime();
            rt.set_source_image("src", &src).unwrap();
            rt.set_destination_image("dest", &mut dest).unwrap();
            rt.evaluate_all(&mut progress).unwrap();
        }

        let mut expected = Vec::new();
        for (i, (x, y)) in extent.positions().enumerate() {
            let visit = (i + 1) as f64;
            expected.push(visit * 1.0e6 + ((y - min_y) * 1000 + (x - min_x)) as f64);
        }
        prop_assert_eq!(dest.data(), expected.as_slice());
        prop_assert_eq!(progress.0.last().copied(), Some(1.0));
    }
}
