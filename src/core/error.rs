// This module defines the fatal error type of the compiler using the thiserror crate.
// CompileError covers the failures that abort the current file instead of being
// collected as diagnostics: duplicate declarations inside one scope, scope stack
// underflow, tree nodes missing a required child, broken SSA bookkeeping, and lookups
// of functions or blocks that the generator never created. Source-level problems such
// as unresolved references or invalid operand kinds are not errors in this sense; they
// are reported through the diagnostics collector and traversal continues.

//! Fatal error types for the compiler.

use thiserror::Error;

/// Unrecoverable compiler error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Duplicate declaration of `{name}` in scope `{scope}`")]
    DuplicateSymbol { name: String, scope: String },

    #[error("Scope stack underflow: {context}")]
    StateUnderflow { context: &'static str },

    #[error("Missing required node: {context}")]
    MissingNode { context: &'static str },

    #[error("Malformed SSA bookkeeping: {reason}")]
    MalformedSsa { reason: String },

    #[error("Function not found: {name}")]
    UnknownFunction { name: String },

    #[error("Block not found: {block}")]
    UnknownBlock { block: String },

    #[error("Register allocation failed: {reason}")]
    RegisterAllocation { reason: String },
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
