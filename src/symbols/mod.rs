// This module defines the symbol layer: the Symbol record describing one declared
// entity, the per-scope SymbolTable, and the SymbolTableManager that owns every table
// keyed by the qualified name of its scope and implements outward name resolution.
// Symbols are created by declaration discovery, refined by the semantic analyser
// (resolved data types, base-type links, default access modifiers) and read by the IR
// generator. A symbol is never removed during a compilation.

//! Symbols, symbol tables and scope-aware resolution.

pub mod manager;
pub mod table;

pub use manager::SymbolTableManager;
pub use table::SymbolTable;

use crate::core::error::CompileError;
use crate::state::{AddressKind, State};
use thiserror::Error;

/// Four-level visibility model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessModifier {
    Public,
    Private,
    Protected,
    Restricted,
}

impl AccessModifier {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessModifier::Public => "public",
            AccessModifier::Private => "private",
            AccessModifier::Protected => "protected",
            AccessModifier::Restricted => "restricted",
        }
    }
}

/// Non-access modifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    pub is_static: bool,
    pub is_dynamic: bool,
    pub is_abstract: bool,
    pub is_const: bool,
}

/// Metadata for one declared entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: AddressKind,
    /// Full address of the entity (enclosing scope plus its own frame).
    pub state: State,
    pub data_type: Option<State>,
    pub access: Option<AccessModifier>,
    pub modifiers: Modifiers,
    /// Base type for type declarations, declaring type for members.
    pub parent: Option<State>,
    /// Position in the parameter list for function parameters.
    pub param_index: Option<usize>,
    pub offset: usize,
}

impl Symbol {
    pub fn new(state: State, kind: AddressKind, offset: usize) -> Self {
        let name = state.name().unwrap_or_default().to_string();
        Self {
            name,
            kind,
            state,
            data_type: None,
            access: None,
            modifiers: Modifiers::default(),
            parent: None,
            param_index: None,
            offset,
        }
    }

    pub fn with_access(mut self, access: Option<AccessModifier>) -> Self {
        self.access = access;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn with_parent(mut self, parent: Option<State>) -> Self {
        self.parent = parent;
        self
    }

    pub fn with_data_type(mut self, data_type: Option<State>) -> Self {
        self.data_type = data_type;
        self
    }

    /// Scope the symbol is declared in.
    pub fn owner(&self) -> State {
        self.state.parent().unwrap_or_default()
    }

    pub fn is_type(&self) -> bool {
        self.kind.is_type()
    }
}

/// Symbol table mutation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("`{name}` is already declared in `{scope}`")]
    Duplicate { name: String, scope: String },
}

impl From<SymbolError> for CompileError {
    fn from(err: SymbolError) -> Self {
        match err {
            SymbolError::Duplicate { name, scope } => CompileError::DuplicateSymbol { name, scope },
        }
    }
}
