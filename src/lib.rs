//! ssac - middle end of a compiler for a small scope-qualified language.
//!
//! The crate takes an arena-allocated declaration tree, produced by an
//! external parser, through name resolution, semantic analysis, SSA
//! construction and register assignment.
//!
//! # Primary Usage
//!
//! ```ignore
//! use ssac::core::CompilationSession;
//! use ssac::pipeline::Compiler;
//! use bumpalo::Bump;
//!
//! // Create compilation session with arena allocation
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//!
//! // Compile every file of the program
//! let mut compiler = Compiler::new(&session);
//! let compiled = compiler.compile(&[file_a, file_b])?;
//! assert!(compiled.succeeded());
//! ```
//!
//! # Architecture
//!
//! - [`state`] - Qualified names and their algebra
//! - [`ast`] - Arena-allocated syntax tree and a builder for it
//! - [`symbols`] - Per-scope symbol tables and outward resolution
//! - [`semantics`] - Declaration discovery and the two-pass analyser
//! - [`ir`] - SSA IR, its generator and the decoder to a flat stream
//! - [`regalloc`] - Greedy weight-based register allocation
//! - [`pipeline`] - Staged driver over many files
//! - [`core`] - Shared infrastructure (session, diagnostics, errors, options)

pub mod ast;
pub mod core;
pub mod ir;
pub mod pipeline;
pub mod regalloc;
pub mod semantics;
pub mod state;
pub mod symbols;

pub use crate::core::{
    CompilationSession, CompileError, CompileOptions, CompileResult, Diagnostic,
    DiagnosticCollector, MessageCode, SessionStats,
};
pub use ir::{IrFunction, IrProgram};
pub use pipeline::{CompiledProgram, Compiler};
pub use regalloc::{Allocation, Slot, STACK};
pub use state::{AddressFrame, AddressKind, State};
pub use symbols::{Symbol, SymbolTableManager};
