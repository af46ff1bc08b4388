//! Per-scope symbol table.

use super::{Symbol, SymbolError};
use crate::state::State;
use hashbrown::HashMap;

/// Mapping from simple name to symbol for one scope. No shadowing inside a scope.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    scope: State,
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new(scope: State) -> Self {
        Self {
            scope,
            symbols: HashMap::new(),
        }
    }

    pub fn scope(&self) -> &State {
        &self.scope
    }

    pub fn insert(&mut self, symbol: Symbol) -> Result<(), SymbolError> {
        if self.symbols.contains_key(&symbol.name) {
            return Err(SymbolError::Duplicate {
                name: symbol.name,
                scope: self.scope.to_string(),
            });
        }
        self.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.symbols.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AddressKind;

    #[test]
    fn test_duplicate_insert_fails() {
        let scope = State::from_names(["lib"], AddressKind::Library);
        let mut table = SymbolTable::new(scope.clone());
        let x = Symbol::new(
            scope.with(crate::state::AddressFrame::new("x", AddressKind::VariableDeclaration)),
            AddressKind::VariableDeclaration,
            0,
        );

        table.insert(x.clone()).unwrap();
        let err = table.insert(x).unwrap_err();
        assert_eq!(
            err,
            SymbolError::Duplicate {
                name: "x".into(),
                scope: "lib".into()
            }
        );
        assert_eq!(table.len(), 1);
    }
}
