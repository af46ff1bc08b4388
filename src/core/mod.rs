// This module is the hub for the infrastructure shared by every compiler stage:
// the arena-backed compilation session, the structured diagnostics channel, the
// fatal error enum and the compile options. Stages never talk to a global logger or
// error sink; they receive the session and report through it.

//! Core compiler infrastructure.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena allocation of syntax tree nodes using `bumpalo`
//! - String interning
//! - Compilation statistics
//!
//! ## Diagnostics (`diagnostics`)
//! - Typed notifications (code, offset, kind, level, arguments)
//! - Snapshot/rollback for tentative operations
//!
//! ## Errors (`error`)
//! - Fatal, non-recoverable conditions via `thiserror`

pub mod diagnostics;
pub mod error;
pub mod options;
pub mod session;
pub mod test_utils;

pub use diagnostics::{Diagnostic, DiagnosticCollector, Level, MessageCode, MessageKind, Snapshot};
pub use error::{CompileError, CompileResult};
pub use options::CompileOptions;
pub use session::{CompilationSession, SessionStats};
