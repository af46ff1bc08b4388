// This module implements the SymbolTableManager, which owns one SymbolTable per scope
// keyed by the scope's qualified name. Tables are created lazily and idempotently so
// that discovery, analysis and IR generation can all address a scope before or after it
// has been populated. Resolution walks outward from the innermost open scope: a direct
// lookup at each level, then the innermost frame is dropped and the lookup retried,
// stopping at the first library frame so that a library never sees names declared
// outside it. When several candidate scopes are supplied (the current scope followed
// by every `using` import) each is searched to exhaustion in order and the first hit
// wins. Member lookup additionally follows the base-type chain of type symbols.

//! Symbol table manager and outward resolution.

use super::{Symbol, SymbolError, SymbolTable};
use crate::state::State;
use hashbrown::{HashMap, HashSet};

/// Owns all symbol tables of a compilation.
#[derive(Debug, Default)]
pub struct SymbolTableManager {
    tables: HashMap<State, SymbolTable>,
}

impl SymbolTableManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the table for `scope` unless it already exists.
    pub fn create_table(&mut self, scope: &State) -> &mut SymbolTable {
        self.tables
            .entry(scope.clone())
            .or_insert_with(|| SymbolTable::new(scope.clone()))
    }

    pub fn has_table(&self, scope: &State) -> bool {
        self.tables.contains_key(scope)
    }

    pub fn table(&self, scope: &State) -> Option<&SymbolTable> {
        self.tables.get(scope)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Insert into the table of the symbol's owning scope.
    pub fn insert(&mut self, symbol: Symbol) -> Result<(), SymbolError> {
        let owner = symbol.owner();
        self.create_table(&owner).insert(symbol)
    }

    /// Direct lookup in exactly one scope.
    pub fn lookup(&self, scope: &State, name: &str) -> Option<&Symbol> {
        self.tables.get(scope)?.get(name)
    }

    /// The symbol declared at `address`.
    pub fn symbol_at(&self, address: &State) -> Option<&Symbol> {
        let owner = address.parent()?;
        self.lookup(&owner, address.name()?)
    }

    pub fn symbol_at_mut(&mut self, address: &State) -> Option<&mut Symbol> {
        let owner = address.parent()?;
        let name = address.name()?;
        self.tables.get_mut(&owner)?.get_mut(name)
    }

    /// Outward search from `scope`, never crossing a library frame.
    pub fn find(&self, name: &str, scope: &State) -> Option<&Symbol> {
        let mut scope = scope.clone();
        loop {
            if let Some(symbol) = self.lookup(&scope, name) {
                return Some(symbol);
            }
            match scope.last() {
                None => return None,
                Some(frame) if frame.kind.is_library_boundary() => return None,
                Some(_) => {}
            }
            scope.pop().ok()?;
        }
    }

    /// Outward search over several candidate scopes; first match wins.
    pub fn find_in(&self, name: &str, scopes: &[State]) -> Option<&Symbol> {
        scopes.iter().find_map(|scope| self.find(name, scope))
    }

    /// Resolve a dotted reference: the head by outward search, every further
    /// segment as a member of the previous one.
    pub fn find_path(&self, path: &[&str], scopes: &[State]) -> Option<&Symbol> {
        let (head, rest) = path.split_first()?;
        let mut current = self.find_in(head, scopes)?;
        for segment in rest {
            current = self.find_member(current, segment)?;
        }
        Some(current)
    }

    /// Look `name` up inside `container`: its own table for types and libraries,
    /// the table of its data type for variables and functions, then along the
    /// base-type chain.
    pub fn find_member(&self, container: &Symbol, name: &str) -> Option<&Symbol> {
        let mut current = if container.is_type() || container.kind.is_library_boundary() {
            Some(container.state.clone())
        } else {
            container.data_type.clone()
        };
        let mut visited = HashSet::new();
        while let Some(scope) = current {
            if !visited.insert(scope.clone()) {
                log::debug!("cyclic base-type chain at `{scope}`");
                return None;
            }
            if let Some(symbol) = self.lookup(&scope, name) {
                return Some(symbol);
            }
            current = self
                .symbol_at(&scope)
                .filter(|s| s.is_type())
                .and_then(|s| s.parent.clone());
        }
        None
    }

    /// Whether the scope directly enclosing `address` is a library.
    pub fn enclosed_by_library(&self, address: &State) -> bool {
        address
            .parent()
            .and_then(|owner| owner.last().map(|f| f.kind.is_library_boundary()))
            .unwrap_or(false)
    }
}
