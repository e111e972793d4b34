use clap::Parser;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use rasc::diag::{Diagnostics, LineIndex};
use rasc::lexer::{self, Token};
use rasc::pipeline::{compile_with, CompileOptions, CompileOutcome};
use rasc::progress::ProgressListener;
use rasc::raster::{Extent, GridRaster, Raster};
use rasc::runtime::{DestBindable, SourceBindable, SweepEvaluable};
use rasc::Dialect;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum DialectArg {
    Standard,
    Extended,
}

impl From<DialectArg> for Dialect {
    fn from(d: DialectArg) -> Self {
        match d {
            DialectArg::Standard => Dialect::Standard,
            DialectArg::Extended => Dialect::Extended,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum EmitStage {
    /// Report diagnostics only
    Check,
    Tokens,
    Ast,
    Symbols,
    Lir,
    BuildInfo,
    /// Sweep the script over the bound rasters and write the destinations
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum DiagnosticsFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "rasc",
    version,
    about = "Raster script compiler — compiles raster-algebra scripts and evaluates them over JSON rasters"
)]
struct Cli {
    /// Script file
    script: PathBuf,

    /// Statement framing rules
    #[arg(long, value_enum, default_value_t = DialectArg::Standard)]
    dialect: DialectArg,

    /// Source image binding NAME=PATH to a JSON raster (repeatable)
    #[arg(long = "source", value_parser = parse_binding)]
    sources: Vec<(String, PathBuf)>,

    /// Destination image name (repeatable)
    #[arg(long = "dest")]
    dests: Vec<String>,

    /// Destination width when it cannot be taken from a source
    #[arg(long)]
    width: Option<u32>,

    /// Destination height when it cannot be taken from a source
    #[arg(long)]
    height: Option<u32>,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Run)]
    emit: EmitStage,

    /// Output file path (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// How diagnostics are printed on stderr
    #[arg(long, value_enum, default_value_t = DiagnosticsFormat::Text)]
    diagnostics_format: DiagnosticsFormat,

    /// Print compiler phases and timing
    #[arg(long)]
    verbose: bool,
}

fn parse_binding(arg: &str) -> Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, found '{arg}'")),
    }
}

fn main() {
    let cli = Cli::parse();
    let dialect = Dialect::from(cli.dialect);

    if cli.verbose {
        eprintln!("rasc: script  = {}", cli.script.display());
        eprintln!("rasc: dialect = {}", dialect);
        eprintln!("rasc: emit    = {:?}", cli.emit);
    }

    let source = match std::fs::read_to_string(&cli.script) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("rasc: error: {}: {}", cli.script.display(), e);
            process::exit(2);
        }
    };

    if cli.emit == EmitStage::Tokens {
        emit_tokens(&source, dialect, &cli);
        return;
    }

    // ── Compile ──
    let mut options = CompileOptions::new()
        .dialect(dialect)
        .display_name(cli.script.display().to_string());
    for (name, _) in &cli.sources {
        options = options.source(name.clone());
    }
    for name in &cli.dests {
        options = options.destination(name.clone());
    }

    let verbose = cli.verbose;
    let outcome = compile_with(&source, &options, |phase, elapsed, diags| {
        if verbose {
            eprintln!(
                "rasc: {} complete, {:.1}ms ({} errors, {} warnings)",
                phase.name(),
                elapsed.as_secs_f64() * 1000.0,
                diags.error_count(),
                diags.warning_count()
            );
        }
    });
    print_diagnostics(&outcome.diagnostics, cli.diagnostics_format);

    match cli.emit {
        EmitStage::Ast => {
            write_output(cli.output.as_deref(), &format!("{:#?}\n", outcome.ast));
            exit_on_errors(&outcome);
        }
        EmitStage::Symbols => {
            exit_on_errors(&outcome);
            if let Some(resolved) = &outcome.resolved {
                write_output(cli.output.as_deref(), &resolved.table.to_string());
            }
        }
        EmitStage::Check => exit_on_errors(&outcome),
        EmitStage::Lir => {
            exit_on_errors(&outcome);
            if let Some(script) = &outcome.script {
                write_output(cli.output.as_deref(), &script.lir().to_string());
            }
        }
        EmitStage::BuildInfo => {
            exit_on_errors(&outcome);
            if let Some(script) = &outcome.script {
                write_output(cli.output.as_deref(), &script.provenance().to_json());
            }
        }
        EmitStage::Run => {
            exit_on_errors(&outcome);
            run(&outcome, &cli);
        }
        // Emitted before compiling.
        EmitStage::Tokens => {}
    }
}

fn exit_on_errors(outcome: &CompileOutcome) {
    if !outcome.is_success() {
        process::exit(1);
    }
}

fn print_diagnostics(diags: &Diagnostics, format: DiagnosticsFormat) {
    match format {
        DiagnosticsFormat::Text => eprint!("{}", diags.render()),
        DiagnosticsFormat::Json => match serde_json::to_string_pretty(diags.all()) {
            Ok(json) => eprintln!("{json}"),
            Err(e) => eprintln!("rasc: error: {e}"),
        },
    }
}

fn emit_tokens(source: &str, dialect: Dialect, cli: &Cli) {
    let result = lexer::lex(source, dialect);
    let index = LineIndex::new(source);
    let mut out = String::new();
    for (token, span) in &result.tokens {
        let (line, column) = index.position(span.start);
        let text = match token {
            Token::Ident => source[span.start..span.end].to_string(),
            t => t.to_string(),
        };
        out.push_str(&format!("{line}:{column} {text}\n"));
    }
    for err in &result.errors {
        let (line, column) = index.position(err.span.start);
        eprintln!("{line}:{column} ERROR : {}", err.message);
    }
    write_output(cli.output.as_deref(), &out);
    if !result.errors.is_empty() {
        process::exit(1);
    }
}

fn write_output(path: Option<&Path>, text: &str) {
    match path {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                eprintln!("rasc: error: {}: {}", path.display(), e);
                process::exit(2);
            }
        }
        None => print!("{text}"),
    }
}

// ── Run ──

/// Reports sweep progress on stderr in 10% steps.
struct StderrProgress {
    interval: u64,
    started: Option<Instant>,
}

impl ProgressListener for StderrProgress {
    fn set_task_size(&mut self, size: u64) {
        self.interval = (size / 10).max(1);
        eprintln!("rasc: sweeping {size} pixels");
    }

    fn update_interval(&self) -> u64 {
        self.interval
    }

    fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    fn update(&mut self, fraction: f64) {
        eprintln!("rasc: {:.0}%", fraction * 100.0);
    }

    fn finish(&mut self) {
        if let Some(t) = self.started {
            eprintln!("rasc: sweep complete, {:.1}ms", t.elapsed().as_secs_f64() * 1000.0);
        }
    }
}

fn load_raster(path: &Path) -> GridRaster {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("rasc: error: {}: {}", path.display(), e);
            process::exit(2);
        }
    };
    match serde_json::from_str(&text) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("rasc: error: {}: {}", path.display(), e);
            process::exit(2);
        }
    }
}

fn run(outcome: &CompileOutcome, cli: &Cli) {
    let Some(script) = &outcome.script else {
        process::exit(1);
    };

    let sources: Vec<(String, GridRaster)> = cli
        .sources
        .iter()
        .map(|(name, path)| (name.clone(), load_raster(path)))
        .collect();

    let extent = match (cli.width, cli.height, sources.first()) {
        (Some(w), Some(h), _) => Extent::sized(w, h),
        (None, None, Some((_, raster))) => raster.extent(),
        _ => {
            eprintln!("rasc: error: destination size needs --width and --height or a --source");
            process::exit(2);
        }
    };

    let mut dests: Vec<(String, GridRaster)> = Vec::new();
    for name in script.destination_names() {
        match GridRaster::filled(extent, 1, f64::NAN) {
            Ok(r) => dests.push((name.clone(), r)),
            Err(e) => {
                eprintln!("rasc: error: {e}");
                process::exit(1);
            }
        }
    }

    if cli.verbose {
        eprintln!(
            "rasc: {} source(s), {} destination(s), {}x{}",
            sources.len(),
            dests.len(),
            extent.width,
            extent.height
        );
    }

    let result = {
        let mut rt = script.sweep_runtime();
        let mut bound = Ok(());
        for (name, raster) in &sources {
            bound = bound.and_then(|_| rt.set_source_image(name, raster));
        }
        for (name, raster) in dests.iter_mut() {
            bound = bound.and_then(|_| rt.set_destination_image(name, raster));
        }
        bound.and_then(|_| {
            if cli.verbose {
                rt.evaluate_all(&mut StderrProgress {
                    interval: 0,
                    started: None,
                })
            } else {
                rt.evaluate_all(&mut rasc::progress::NullProgressListener)
            }
        })
    };
    if let Err(e) = result {
        eprintln!("rasc: runtime error: {e}");
        process::exit(1);
    }

    let json = if dests.len() == 1 {
        serde_json::to_string(&dests[0].1)
    } else {
        let map: BTreeMap<&str, &GridRaster> =
            dests.iter().map(|(n, r)| (n.as_str(), r)).collect();
        serde_json::to_string(&map)
    };
    match json {
        Ok(mut json) => {
            json.push('\n');
            write_output(cli.output.as_deref(), &json);
        }
        Err(e) => {
            eprintln!("rasc: error: {e}");
            process::exit(2);
        }
    }
}
