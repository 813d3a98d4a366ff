//! Symbol table
//!
//! A stack of scope frames mapping names to declarations. The parser fills
//! it while parsing (catching duplicate declarations early) and the type
//! checker rebuilds it with the same push/pop discipline during analysis.

use std::collections::HashMap;

use crate::common::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolCategory {
    Variable,
    Function,
}

#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub name: String,
    pub category: SymbolCategory,
    pub typ: Type,
    /// Line of the defining occurrence
    pub line: u32,
    /// Parameter types, for functions
    pub params: Option<Vec<Type>>,
}

/// Stacked scope frames; frame 0 is the global scope and cannot be popped
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<HashMap<String, SymbolInfo>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        assert!(self.scopes.len() > 1, "cannot pop the global scope");
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Insert into the top frame; fails if the name is already there
    pub fn declare(&mut self, info: SymbolInfo) -> Result<(), SymbolInfo> {
        let top = self.scopes.last_mut().expect("global scope always exists");
        match top.get(&info.name) {
            Some(existing) => Err(existing.clone()),
            None => {
                top.insert(info.name.clone(), info);
                Ok(())
            }
        }
    }

    /// Search the frames top-down and return the first hit
    pub fn resolve(&self, name: &str) -> Option<&SymbolInfo> {
        self.resolve_from(0, name)
    }

    /// Like [`resolve`](Self::resolve), but stops above frame `depth`
    ///
    /// Used to hide outer-scope variables from function bodies while still
    /// letting the innermost frames shadow each other.
    pub fn resolve_from(&self, depth: usize, name: &str) -> Option<&SymbolInfo> {
        self.scopes[depth..]
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
    }

    pub fn exists_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .expect("global scope always exists")
            .contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, typ: Type) -> SymbolInfo {
        SymbolInfo {
            name: name.to_string(),
            category: SymbolCategory::Variable,
            typ,
            line: 1,
            params: None,
        }
    }

    #[test]
    fn declare_and_resolve() {
        let mut table = SymbolTable::new();
        table.declare(var("x", Type::Int)).unwrap();
        assert_eq!(table.resolve("x").unwrap().typ, Type::Int);
        assert!(table.resolve("y").is_none());
    }

    #[test]
    fn duplicate_declaration_fails_in_the_same_frame_only() {
        let mut table = SymbolTable::new();
        table.declare(var("x", Type::Int)).unwrap();
        assert!(table.declare(var("x", Type::Float)).is_err());

        table.push_scope();
        table.declare(var("x", Type::Float)).unwrap();
        assert_eq!(table.resolve("x").unwrap().typ, Type::Float);
        table.pop_scope();
        assert_eq!(table.resolve("x").unwrap().typ, Type::Int);
    }

    #[test]
    fn resolve_from_hides_outer_frames() {
        let mut table = SymbolTable::new();
        table.declare(var("global", Type::Int)).unwrap();
        table.push_scope();
        table.declare(var("local", Type::Bool)).unwrap();

        assert!(table.resolve_from(1, "local").is_some());
        assert!(table.resolve_from(1, "global").is_none());
        assert!(table.resolve("global").is_some());
    }

    #[test]
    #[should_panic(expected = "cannot pop the global scope")]
    fn global_scope_cannot_be_popped() {
        SymbolTable::new().pop_scope();
    }

    #[test]
    fn current_scope_lookup_ignores_parents() {
        let mut table = SymbolTable::new();
        table.declare(var("x", Type::Int)).unwrap();
        table.push_scope();
        assert!(!table.exists_in_current_scope("x"));
        table.declare(var("x", Type::Int)).unwrap();
        assert!(table.exists_in_current_scope("x"));
    }
}
