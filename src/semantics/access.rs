// This module implements the accessibility decision for one reference. The caller is
// the qualified name of the innermost declaration the reference appears in (a function,
// type or library); the callee is the resolved symbol being reached. The decision is a
// pure function of the callee's access modifier, the two qualified names and the symbol
// tables, so the analyser can run it for every segment of a call chain without
// side effects. When the caller has no symbol of its own (module-level code) the
// non-public modifiers collapse to a single rule: the callee is reachable unless it is
// declared directly inside a library.

//! Accessibility checks.

use crate::state::State;
use crate::symbols::{AccessModifier, Symbol, SymbolTableManager};

/// Whether code in `caller` may reach `callee`.
pub fn is_accessible(manager: &SymbolTableManager, caller: &State, callee: &Symbol) -> bool {
    let access = match callee.access {
        None | Some(AccessModifier::Public) => return true,
        Some(access) => access,
    };

    if manager.symbol_at(caller).is_none() {
        return !manager.enclosed_by_library(&callee.state);
    }

    match access {
        AccessModifier::Public => true,
        AccessModifier::Private => caller.is_child_of(&callee.owner()),
        AccessModifier::Protected => callee.parent.as_ref() == Some(caller),
        AccessModifier::Restricted => {
            callee.state.len() == 1
                || (caller.first().is_some() && caller.first() == callee.state.first())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AddressFrame, AddressKind};

    fn ty(path: &[&str]) -> State {
        State::from_names(path.iter().copied(), AddressKind::DataType)
    }

    fn member(owner: &State, name: &str, access: AccessModifier) -> Symbol {
        Symbol::new(
            owner.with(AddressFrame::new(name, AddressKind::VariableDeclaration)),
            AddressKind::VariableDeclaration,
            0,
        )
        .with_access(Some(access))
        .with_parent(Some(owner.clone()))
    }

    fn register(manager: &mut SymbolTableManager, state: State, kind: AddressKind) {
        manager.insert(Symbol::new(state, kind, 0)).unwrap();
    }

    #[test]
    fn test_unset_modifier_is_public() {
        let manager = SymbolTableManager::new();
        let mut sym = member(&ty(&["A"]), "x", AccessModifier::Private);
        sym.access = None;
        assert!(is_accessible(&manager, &ty(&["Z"]), &sym));
    }

    #[test]
    fn test_private_requires_nesting_in_owner() {
        let mut manager = SymbolTableManager::new();
        let a = ty(&["A"]);
        register(&mut manager, a.clone(), AddressKind::DataType);
        let method = a.with(AddressFrame::new("m", AddressKind::Function));
        register(&mut manager, method.clone(), AddressKind::Function);
        register(&mut manager, ty(&["Z"]), AddressKind::DataType);

        let x = member(&a, "x", AccessModifier::Private);
        assert!(is_accessible(&manager, &a, &x));
        assert!(is_accessible(&manager, &method, &x));
        assert!(!is_accessible(&manager, &ty(&["Z"]), &x));
    }

    #[test]
    fn test_unresolved_caller_is_blocked_only_by_library() {
        let manager = SymbolTableManager::new();
        let lib = State::from_names(["lib"], AddressKind::Library);
        let in_lib = member(&lib, "secret", AccessModifier::Private);
        let in_type = member(&ty(&["A"]), "x", AccessModifier::Restricted);

        assert!(!is_accessible(&manager, &State::root(), &in_lib));
        assert!(is_accessible(&manager, &State::root(), &in_type));
    }
}
