// End-to-end tests for the `rasc` command-line driver.
//
// Each test writes its inputs to a private directory under the system temp
// dir and runs the built binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use rasc::raster::GridRaster;

fn rasc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_rasc"))
}

fn scratch_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rasc-cli-{}-{}", std::process::id(), test));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn run(args: &[&str]) -> Output {
    Command::new(rasc_binary())
        .args(args)
        .output()
        .expect("failed to run rasc")
}

const RASTER_2X1: &str =
    r#"{"extent":{"min_x":0,"min_y":0,"width":2,"height":1},"data":[1.5,-2.0]}"#;

#[test]
fn run_sweeps_and_prints_raster() {
    let dir = scratch_dir("run");
    let script = write(&dir, "scale.ras", "dest = src * 10;\n");
    let raster = write(&dir, "src.json", RASTER_2X1);
    let binding = format!("src={}", raster.display());

    let output = run(&[
        script.to_str().unwrap(),
        "--source",
        &binding,
        "--dest",
        "dest",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let result: GridRaster = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result.data(), &[15.0, -20.0]);
}

#[test]
fn run_output_with_nan_is_valid_source_input() {
    let dir = scratch_dir("nan");
    let first = write(&dir, "positive.ras", "if (src > 0) dest = src;\n");
    let second = write(&dir, "double.ras", "dest = src * 2;\n");
    let raster = write(&dir, "src.json", RASTER_2X1);
    let binding = format!("src={}", raster.display());
    let mid = dir.join("mid.json");

    let output = run(&[
        first.to_str().unwrap(),
        "--source",
        &binding,
        "--dest",
        "dest",
        "-o",
        mid.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    assert!(std::fs::read_to_string(&mid).unwrap().contains("null"));

    let binding = format!("src={}", mid.display());
    let output = run(&[
        second.to_str().unwrap(),
        "--source",
        &binding,
        "--dest",
        "dest",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let result: GridRaster = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result.data()[0], 3.0);
    assert!(result.data()[1].is_nan());
}

#[test]
fn check_reports_diagnostics_and_exit_code() {
    let dir = scratch_dir("check");
    let script = write(&dir, "bad.ras", "images { dest = write; }\ndest = nope;\n");

    let output = run(&[script.to_str().unwrap(), "--emit", "check"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("2:8 ERROR : undefined variable 'nope'"),
        "stderr: {stderr}"
    );
}

#[test]
fn json_diagnostics() {
    let dir = scratch_dir("json");
    let script = write(&dir, "bad.ras", "images { dest = write; }\ndest = nope;\n");

    let output = run(&[
        script.to_str().unwrap(),
        "--emit",
        "check",
        "--diagnostics-format",
        "json",
    ]);
    assert_eq!(output.status.code(), Some(1));
    let diags: serde_json::Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(diags[0]["code"], "E0101");
    assert_eq!(diags[0]["level"], "error");
    assert_eq!(diags[0]["line"], 2);
    assert_eq!(diags[0]["column"], 8);
}

#[test]
fn build_info_is_reproducible() {
    let dir = scratch_dir("build-info");
    let script = write(&dir, "ok.ras", "images { dest = write; }\ndest = x() + y();\n");

    let first = run(&[script.to_str().unwrap(), "--emit", "build-info"]);
    let second = run(&[script.to_str().unwrap(), "--emit", "build-info"]);
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);

    let info: serde_json::Value = serde_json::from_slice(&first.stdout).unwrap();
    assert_eq!(info["dialect"], "standard");
    assert_eq!(info["script_hash"].as_str().unwrap().len(), 64);
    assert_eq!(info["compiler_version"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn extended_dialect_flag() {
    let dir = scratch_dir("dialect");
    let script = write(&dir, "nl.ras", "images {\n  dest = write\n}\ndest = 1\n");

    let standard = run(&[script.to_str().unwrap(), "--emit", "check"]);
    assert_eq!(standard.status.code(), Some(1));
    let extended = run(&[
        script.to_str().unwrap(),
        "--emit",
        "check",
        "--dialect",
        "extended",
    ]);
    assert!(
        extended.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&extended.stderr)
    );
}

#[test]
fn lir_written_to_output_file() {
    let dir = scratch_dir("lir");
    let script = write(&dir, "ok.ras", "dest = src + 1;\n");
    let out = dir.join("out.lir");

    let output = run(&[
        script.to_str().unwrap(),
        "--source",
        "src=unused.json",
        "--dest",
        "dest",
        "--emit",
        "lir",
        "-o",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success());
    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.starts_with("LirScript (1 sources, 1 destinations"), "{text}");
    assert!(text.contains("write dest <- (src + 1)"), "{text}");
}

#[test]
fn missing_script_is_an_io_error() {
    let output = run(&["/nonexistent/script.ras", "--emit", "check"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("rasc: error:"));
}

#[test]
fn runtime_error_exit_code() {
    let dir = scratch_dir("runtime");
    let script = write(&dir, "edge.ras", "dest = src[$5, $0];\n");
    let raster = write(&dir, "src.json", RASTER_2X1);
    let binding = format!("src={}", raster.display());

    let output = run(&[
        script.to_str().unwrap(),
        "--source",
        &binding,
        "--dest",
        "dest",
    ]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("rasc: runtime error:"), "stderr: {stderr}");
}
