// symbol.rs — Scopes and the symbol table
//
// Symbols are keyed by (scope, name). Declaring a name already bound in the
// same scope with the same kind returns the existing symbol, so repeated
// assignment to a pixel variable never creates a second one.
//
// Preconditions: scopes are created before symbols are declared in them.
// Postconditions: within one scope a name maps to at most one symbol.
// Failure modes: a kind conflict on `declare` reports `E0107` and returns the
//                original symbol.
// Side effects: `declare` may append to `Diagnostics`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::ast::Span;
use crate::diag::{codes, Diagnostics};
use crate::id::{IdAllocator, ScopeId, SymbolId};

// ── Symbols ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SymbolKind {
    Scalar,
    LoopVar,
    List,
    SourceImage,
    DestImage,
}

impl SymbolKind {
    pub fn describe(self) -> &'static str {
        match self {
            SymbolKind::Scalar => "scalar",
            SymbolKind::LoopVar => "loop variable",
            SymbolKind::List => "list",
            SymbolKind::SourceImage => "source image",
            SymbolKind::DestImage => "destination image",
        }
    }

    pub fn is_image(self) -> bool {
        matches!(self, SymbolKind::SourceImage | SymbolKind::DestImage)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub scope: ScopeId,
    /// Site of the first declaration.
    #[serde(skip)]
    pub span: Span,
}

// ── Scopes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScopeKind {
    /// Root: images and `init` variables, alive for a whole evaluation.
    Image,
    /// Recomputed for every evaluated coordinate.
    Pixel,
    /// Body of a `foreach`; holds only its loop variable.
    Loop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
}

// ── Table ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct SymbolTable {
    ids: IdAllocator,
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
    by_name: HashMap<(ScopeId, String), SymbolId>,
    image_scope: ScopeId,
    pixel_scope: ScopeId,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// A table with the image scope and its pixel scope already created.
    pub fn new() -> Self {
        let mut ids = IdAllocator::new();
        let image_scope = ids.alloc_scope();
        let pixel_scope = ids.alloc_scope();
        SymbolTable {
            ids,
            scopes: vec![
                Scope {
                    id: image_scope,
                    kind: ScopeKind::Image,
                    parent: None,
                },
                Scope {
                    id: pixel_scope,
                    kind: ScopeKind::Pixel,
                    parent: Some(image_scope),
                },
            ],
            symbols: Vec::new(),
            by_name: HashMap::new(),
            image_scope,
            pixel_scope,
        }
    }

    pub fn image_scope(&self) -> ScopeId {
        self.image_scope
    }

    pub fn pixel_scope(&self) -> ScopeId {
        self.pixel_scope
    }

    pub fn push_scope(&mut self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        let id = self.ids.alloc_scope();
        self.scopes.push(Scope {
            id,
            kind,
            parent: Some(parent),
        });
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    /// Declare `name` in `scope`, or fetch it if already declared there.
    pub fn declare(
        &mut self,
        scope: ScopeId,
        name: &str,
        kind: SymbolKind,
        span: Span,
        diags: &mut Diagnostics,
    ) -> SymbolId {
        match self.by_name.entry((scope, name.to_string())) {
            Entry::Occupied(e) => {
                let id = *e.get();
                let existing = &self.symbols[id.0 as usize];
                if existing.kind != kind {
                    diags.error(
                        codes::E0107,
                        span,
                        format!(
                            "symbol kind conflict: '{}' is a {}, not a {}",
                            name, existing.kind, kind
                        ),
                    );
                }
                id
            }
            Entry::Vacant(e) => {
                let id = self.ids.alloc_symbol();
                self.symbols.push(Symbol {
                    id,
                    name: name.to_string(),
                    kind,
                    scope,
                    span,
                });
                e.insert(id);
                id
            }
        }
    }

    /// Look `name` up from `scope` outward.
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            if let Some(&id) = self.by_name.get(&(s, name.to_string())) {
                return Some(id);
            }
            current = self.scope(s).parent;
        }
        None
    }

    /// Any symbol of `kind` named `name`, in any scope.
    pub fn find_any(&self, name: &str, kind: SymbolKind) -> Option<SymbolId> {
        self.symbols
            .iter()
            .find(|s| s.kind == kind && s.name == name)
            .map(|s| s.id)
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    /// All symbols in declaration order.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn symbols_in(&self, scope: ScopeId) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(move |s| s.scope == scope)
    }

    /// Symbols of `kind`, in declaration order.
    pub fn of_kind(&self, kind: SymbolKind) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(move |s| s.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// One line per symbol: `sym0 scope0 source image src`.
impl fmt::Display for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.symbols {
            writeln!(f, "{} {} {} {}", s.id, s.scope, s.kind, s.name)?;
        }
        Ok(())
    }
}
