// pipeline.rs — Compile entry point and phase orchestration
//
// Runs parse → resolve → codegen over one script, accumulating every
// diagnostic in a single `Diagnostics`, and wraps the resulting LIR in a
// `CompiledScript` that hands out runtimes.
//
// Preconditions: none; any UTF-8 text is accepted.
// Postconditions: `CompileOutcome::script` is `Some` iff no error-level
//   diagnostic was reported. Warnings never block code generation.
// Failure modes: syntax errors stop the compile after parsing (analysis of a
//   partial AST would only report follow-on errors); semantic errors stop it
//   after analysis.
// Side effects: calls `on_phase` after each phase that ran; emits `tracing`
//   spans and events.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::ast::{ImageRole, Script};
use crate::codegen;
use crate::diag::Diagnostics;
use crate::dialect::Dialect;
use crate::lir::LirScript;
use crate::parser;
use crate::resolve::{self, ResolvedScript};
use crate::runtime::{DirectRuntime, Runtime, SweepRuntime};

// ── Options ─────────────────────────────────────────────────────────────────

/// Per-compile configuration.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub dialect: Dialect,
    /// Shown in log spans and CLI output; never affects the result.
    pub display_name: Option<String>,
    /// Image roles declared by the caller, in declaration order.
    pub images: Vec<(String, ImageRole)>,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn source(mut self, name: impl Into<String>) -> Self {
        self.images.push((name.into(), ImageRole::Source));
        self
    }

    pub fn destination(mut self, name: impl Into<String>) -> Self {
        self.images.push((name.into(), ImageRole::Destination));
        self
    }
}

// ── Phases ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Parse,
    Resolve,
    Codegen,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Parse => "parse",
            Phase::Resolve => "resolve",
            Phase::Codegen => "codegen",
        }
    }
}

// ── Provenance ──────────────────────────────────────────────────────────────

/// Fingerprint of a compile's inputs.
///
/// `script_hash`: SHA-256 of the dialect name, a newline, and the script text.
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub script_hash: [u8; 32],
    pub dialect: Dialect,
    pub compiler_version: &'static str,
}

#[derive(Serialize)]
struct BuildInfo<'a> {
    script_hash: String,
    dialect: Dialect,
    compiler_version: &'a str,
}

impl Provenance {
    pub fn compute(source: &str, dialect: Dialect) -> Self {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(dialect.name().as_bytes());
        hasher.update(b"\n");
        hasher.update(source.as_bytes());
        let mut script_hash = [0u8; 32];
        script_hash.copy_from_slice(&hasher.finalize());
        Provenance {
            script_hash,
            dialect,
            compiler_version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Hex string of the script hash (64 characters).
    pub fn script_hash_hex(&self) -> String {
        use std::fmt::Write;

        let mut s = String::with_capacity(64);
        for b in &self.script_hash {
            let _ = write!(s, "{:02x}", b);
        }
        s
    }

    /// JSON document for `--emit build-info`.
    pub fn to_json(&self) -> String {
        let info = BuildInfo {
            script_hash: self.script_hash_hex(),
            dialect: self.dialect,
            compiler_version: self.compiler_version,
        };
        let mut json = serde_json::to_string_pretty(&info).unwrap_or_default();
        json.push('\n');
        json
    }
}

// ── Compiled script ─────────────────────────────────────────────────────────

/// A successfully compiled script. Cheap to clone; every runtime it creates
/// shares the same LIR.
#[derive(Debug, Clone)]
pub struct CompiledScript {
    lir: Arc<LirScript>,
    provenance: Provenance,
    display_name: Option<String>,
}

impl CompiledScript {
    pub fn lir(&self) -> &LirScript {
        &self.lir
    }

    pub fn source_names(&self) -> &[String] {
        &self.lir.sources
    }

    /// Destination names in declaration order; `evaluate` returns values in
    /// this order.
    pub fn destination_names(&self) -> &[String] {
        &self.lir.destinations
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// A runtime for random-access evaluation with no images bound.
    pub fn direct_runtime<'img>(&self) -> DirectRuntime<'img> {
        Runtime::new(Arc::clone(&self.lir))
    }

    /// A runtime for whole-image sweeps with no images bound.
    pub fn sweep_runtime<'img>(&self) -> SweepRuntime<'img> {
        Runtime::new(Arc::clone(&self.lir))
    }
}

// ── Compile ─────────────────────────────────────────────────────────────────

/// Everything a compile produced.
#[derive(Debug)]
pub struct CompileOutcome {
    /// Present iff there were no errors.
    pub script: Option<CompiledScript>,
    /// Parsed statements; failed statements are absent.
    pub ast: Script,
    /// Present if analysis ran (the script parsed cleanly).
    pub resolved: Option<ResolvedScript>,
    pub diagnostics: Diagnostics,
}

impl CompileOutcome {
    pub fn is_success(&self) -> bool {
        self.script.is_some()
    }
}

pub fn compile(source: &str, options: &CompileOptions) -> CompileOutcome {
    compile_with(source, options, |_, _, _| {})
}

/// `compile`, calling `on_phase` with each phase's wall time and the
/// diagnostics so far as soon as the phase completes.
pub fn compile_with(
    source: &str,
    options: &CompileOptions,
    mut on_phase: impl FnMut(Phase, Duration, &Diagnostics),
) -> CompileOutcome {
    let name = options.display_name.as_deref().unwrap_or("<script>");
    let span = tracing::info_span!("rasc.compile", name = %name, dialect = %options.dialect);
    let _enter = span.enter();

    let mut diags = Diagnostics::new(source);

    let t = Instant::now();
    let ast = parser::parse(source, options.dialect, &mut diags);
    on_phase(Phase::Parse, t.elapsed(), &diags);
    if diags.has_errors() {
        return CompileOutcome {
            script: None,
            ast,
            resolved: None,
            diagnostics: diags,
        };
    }

    let t = Instant::now();
    let resolved = resolve::resolve(&ast, &options.images, &mut diags);
    on_phase(Phase::Resolve, t.elapsed(), &diags);
    if diags.has_errors() {
        return CompileOutcome {
            script: None,
            ast,
            resolved: Some(resolved),
            diagnostics: diags,
        };
    }

    let t = Instant::now();
    let lir = codegen::lower(&ast, &resolved, &mut diags);
    on_phase(Phase::Codegen, t.elapsed(), &diags);

    let script = lir.filter(|_| !diags.has_errors()).map(|lir| CompiledScript {
        lir: Arc::new(lir),
        provenance: Provenance::compute(source, options.dialect),
        display_name: options.display_name.clone(),
    });

    CompileOutcome {
        script,
        ast,
        resolved: Some(resolved),
        diagnostics: diags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolKind;

    fn opts() -> CompileOptions {
        CompileOptions::new().source("src").destination("dest")
    }

    #[test]
    fn successful_compile_has_script() {
        let outcome = compile("dest = src + 1;", &opts());
        assert!(outcome.is_success(), "{}", outcome.diagnostics.render());
        let script = outcome.script.unwrap();
        assert_eq!(script.source_names(), ["src"]);
        assert_eq!(script.destination_names(), ["dest"]);
    }

    #[test]
    fn warnings_do_not_block() {
        let outcome = compile("dest = 1;", &opts());
        assert!(outcome.is_success());
        assert_eq!(outcome.diagnostics.warning_count(), 1);
    }

    #[test]
    fn syntax_errors_skip_analysis() {
        let outcome = compile("dest = ;\ndest = undefined_name;", &opts());
        assert!(!outcome.is_success());
        assert!(outcome.resolved.is_none());
        assert_eq!(outcome.diagnostics.error_count(), 1);
    }

    #[test]
    fn semantic_errors_block_codegen() {
        let outcome = compile("dest = nope;", &opts());
        assert!(outcome.script.is_none());
        let resolved = outcome.resolved.unwrap();
        assert_eq!(resolved.table.of_kind(SymbolKind::SourceImage).count(), 1);
    }

    #[test]
    fn phases_reported_in_order() {
        let mut phases = Vec::new();
        compile_with("dest = src;", &opts(), |phase, _, _| phases.push(phase));
        assert_eq!(phases, vec![Phase::Parse, Phase::Resolve, Phase::Codegen]);
    }

    #[test]
    fn provenance_depends_on_dialect_and_text() {
        let a = Provenance::compute("dest = src;", Dialect::Standard);
        let b = Provenance::compute("dest = src;", Dialect::Standard);
        let c = Provenance::compute("dest = src;", Dialect::Extended);
        let d = Provenance::compute("dest = src; ", Dialect::Standard);
        assert_eq!(a, b);
        assert_ne!(a.script_hash, c.script_hash);
        assert_ne!(a.script_hash, d.script_hash);
        assert_eq!(a.script_hash_hex().len(), 64);
    }

    #[test]
    fn build_info_is_json() {
        let p = Provenance::compute("dest = src;", Dialect::Extended);
        let v: serde_json::Value = serde_json::from_str(&p.to_json()).unwrap();
        assert_eq!(v["dialect"], "extended");
        assert_eq!(v["script_hash"].as_str().unwrap(), p.script_hash_hex());
    }
}
