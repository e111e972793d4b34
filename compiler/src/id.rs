// id.rs — Stable identifiers for scopes, symbols and runtime slots
//
// Allocated in source order while a script is analysed, so two compiles of
// the same text produce the same numbering. Code generation and the LIR dump
// rely on that determinism.

use std::fmt;

use serde::Serialize;

/// Identifier of a lexical scope in the symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(pub u32);

/// Identifier of a declared symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SymbolId(pub u32);

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope{}", self.0)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym{}", self.0)
    }
}

/// Allocator for stable IDs. Produces monotonically increasing IDs in
/// allocation (source) order.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_scope: u32,
    next_symbol: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_scope(&mut self) -> ScopeId {
        let id = ScopeId(self.next_scope);
        self.next_scope += 1;
        id
    }

    pub fn alloc_symbol(&mut self) -> SymbolId {
        let id = SymbolId(self.next_symbol);
        self.next_symbol += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_per_kind() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.alloc_scope(), ScopeId(0));
        assert_eq!(ids.alloc_symbol(), SymbolId(0));
        assert_eq!(ids.alloc_symbol(), SymbolId(1));
        assert_eq!(ids.alloc_scope(), ScopeId(1));
    }
}
