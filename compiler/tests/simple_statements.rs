// Single-assignment scripts evaluated pointwise against one source image.
//
// Each script is compiled with `src` as a source and `dest` as the
// destination, then evaluated directly at (0, 0) over a 1×1 source holding
// the test value.

use rasc::pipeline::{compile, CompileOptions, CompiledScript};
use rasc::raster::{Extent, GridRaster};
use rasc::runtime::{DirectlyEvaluable, SourceBindable};
use rasc::symbol::SymbolKind;

fn options() -> CompileOptions {
    CompileOptions::new().source("src").destination("dest")
}

fn compile_ok(source: &str) -> CompiledScript {
    let outcome = compile(source, &options());
    match outcome.script {
        Some(script) => script,
        None => panic!("compile failed:\n{}", outcome.diagnostics.render()),
    }
}

/// Value of `dest` for `src = v`.
fn eval_with(source: &str, v: f64) -> f64 {
    let script = compile_ok(source);
    let src = GridRaster::filled(Extent::sized(1, 1), 1, v).unwrap();
    let mut rt = script.direct_runtime();
    rt.set_source_image("src", &src).unwrap();
    let out = rt.evaluate(0.0, 0.0).unwrap();
    assert_eq!(out.len(), 1);
    out[0]
}

const VALUES: [f64; 7] = [0.0, 1.0, -1.0, 3.0, -7.25, 12.5, 1e6];

#[test]
fn identity() {
    for v in VALUES {
        assert_eq!(eval_with("dest = src;", v), v);
    }
}

#[test]
fn negation() {
    for v in VALUES {
        assert_eq!(eval_with("dest = -src;", v), -v);
    }
}

#[test]
fn add_and_subtract() {
    for v in VALUES {
        assert_eq!(eval_with("dest = src + 1;", v), v + 1.0);
        assert_eq!(eval_with("dest = 1 - src;", v), 1.0 - v);
    }
}

#[test]
fn multiply_and_divide() {
    for v in VALUES {
        assert_eq!(eval_with("dest = src * 2;", v), v * 2.0);
        assert_eq!(eval_with("dest = src / 2;", v), v / 2.0);
    }
}

#[test]
fn square_matches_product_for_negative_values() {
    for v in VALUES {
        assert_eq!(eval_with("dest = src^2;", v), v * v);
    }
}

#[test]
fn inverse_of_zero_is_positive_infinity() {
    assert_eq!(eval_with("dest = 1 / src;", 0.0), f64::INFINITY);
    assert_eq!(eval_with("dest = 1 / src;", 4.0), 0.25);
}

#[test]
fn modulo_keeps_sign_of_dividend() {
    for v in [0.0, 5.0, 11.0, 23.5, -23.5, -4.0] {
        let got = eval_with("dest = src % 11;", v);
        assert_eq!(got.to_bits(), (v % 11.0).to_bits(), "v = {v}");
    }
    assert!(eval_with("dest = 11 % src;", 0.0).is_nan());
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    assert_eq!(eval_with("dest = 1 + src * 2;", 3.0), 7.0);
    assert_eq!(eval_with("dest = (1 + src) * 2;", 3.0), 8.0);
    assert_eq!(eval_with("dest = 1 - src * 2;", 3.0), -5.0);
    assert_eq!(eval_with("dest = (1 - src) * 2;", 3.0), -4.0);
}

#[test]
fn power_binds_tighter_than_unary_minus() {
    assert_eq!(eval_with("dest = -src^2;", 2.0), -4.0);
    assert_eq!(eval_with("dest = (-src)^2;", 2.0), 4.0);
    assert_eq!(eval_with("dest = 2^src^2;", 2.0), 16.0);
}

#[test]
fn conditional_and_logic() {
    assert_eq!(eval_with("dest = src > 2 ? 10 : 20;", 3.0), 10.0);
    assert_eq!(eval_with("dest = src > 2 ? 10 : 20;", 1.0), 20.0);
    assert_eq!(eval_with("dest = src > 0 && src < 5;", 3.0), 1.0);
    assert_eq!(eval_with("dest = !src;", 0.0), 1.0);
    assert_eq!(eval_with("dest = src || 0;", f64::NAN), 0.0);
}

#[test]
fn builtin_functions() {
    assert_eq!(eval_with("dest = abs(src);", -3.0), 3.0);
    assert_eq!(eval_with("dest = max(src, [1, 2, 7]);", 3.0), 7.0);
    assert_eq!(eval_with("dest = sum([src, src], 1);", 3.0), 7.0);
    assert_eq!(eval_with("dest = isnan(src / src);", 0.0), 1.0);
    assert_eq!(eval_with("dest = M_PI * 0 + src;", 2.0), 2.0);
}

#[test]
fn repeated_assignment_reuses_one_symbol() {
    let source = "n = x(); n = n + 1; dest = n;";
    let outcome = compile(source, &options());
    assert!(outcome.is_success(), "{}", outcome.diagnostics.render());

    let resolved = outcome.resolved.as_ref().unwrap();
    let named_n: Vec<_> = resolved
        .table
        .symbols()
        .iter()
        .filter(|s| s.name == "n")
        .collect();
    assert_eq!(named_n.len(), 1);
    assert_eq!(named_n[0].kind, SymbolKind::Scalar);
    assert_eq!(named_n[0].scope, resolved.table.pixel_scope());

    let script = outcome.script.unwrap();
    assert_eq!(script.lir().pixel_slots, vec!["n".to_string()]);
    let mut rt = script.direct_runtime();
    assert_eq!(rt.evaluate(5.0, 0.0), Ok(vec![6.0]));
    assert_eq!(rt.evaluate(-2.0, 9.0), Ok(vec![-1.0]));
}

#[test]
fn pixel_variables_reset_between_pixels() {
    let script = compile_ok("if (x() == 0) n = 5; dest = n;");
    let mut rt = script.direct_runtime();
    assert_eq!(rt.evaluate(0.0, 0.0), Ok(vec![5.0]));
    assert_eq!(rt.evaluate(1.0, 0.0), Ok(vec![0.0]));
}

#[test]
fn loops_accumulate() {
    let source = "total = 0; foreach (k in 1:4) total += k; dest = total + src;";
    assert_eq!(eval_with(source, 0.5), 10.5);

    let source = "i = 0; while (i < 10) { i += 3; } dest = i + src;";
    assert_eq!(eval_with(source, 0.0), 12.0);

    let source = "i = 0; until (i >= 4) { i += 1; breakif (i == 2); } dest = i + src;";
    assert_eq!(eval_with(source, 0.0), 2.0);

    let source = "l = [4, 5, 6]; s = 0; foreach (v in l) { s += v; } dest = s + src;";
    assert_eq!(eval_with(source, 0.0), 15.0);
}
