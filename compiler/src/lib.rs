// rasc — Raster script compiler
//
// Library root. Front end (lexer, parser), analysis (symbol, resolve),
// lowering (codegen, lir) and the runtime that evaluates compiled scripts
// against bound rasters.

pub mod ast;
pub mod builtins;
pub mod codegen;
pub mod diag;
pub mod dialect;
pub mod id;
pub mod lexer;
pub mod lir;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod raster;
pub mod resolve;
pub mod runtime;
pub mod symbol;
pub mod transform;

pub use dialect::Dialect;
pub use pipeline::{compile, CompileOptions, CompileOutcome, CompiledScript};
