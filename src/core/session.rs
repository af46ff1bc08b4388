// This module provides arena-based compilation session management using the bumpalo
// crate. CompilationSession is the handle every stage receives: it owns the arena that
// holds all syntax tree nodes (including the rewritten copies produced by each analysis
// pass, which share unchanged subtrees with their inputs), interns identifier strings,
// carries the compile options, and collects diagnostics and statistics behind RefCell
// so that stages can report through a shared reference. Tree nodes only contain
// references and Copy data, so nothing allocated in the arena needs a destructor.

//! Arena-based compilation session management.

use super::diagnostics::{Diagnostic, DiagnosticCollector, Snapshot};
use super::options::CompileOptions;
use bumpalo::Bump;
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;

/// Shared state for one compilation.
///
/// All syntax tree nodes are allocated in the arena and live as long as the
/// session's `'arena` lifetime.
pub struct CompilationSession<'arena> {
    arena: &'arena Bump,
    options: CompileOptions,
    stats: RefCell<SessionStats>,
    diagnostics: RefCell<DiagnosticCollector>,
    interned_strings: RefCell<HashMap<String, &'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self::with_options(arena, CompileOptions::default())
    }

    pub fn with_options(arena: &'arena Bump, options: CompileOptions) -> Self {
        Self {
            arena,
            options,
            stats: RefCell::new(SessionStats::default()),
            diagnostics: RefCell::new(DiagnosticCollector::new()),
            interned_strings: RefCell::new(HashMap::new()),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Allocate an object in the session arena.
    pub fn alloc<T>(&self, value: T) -> &'arena T {
        self.arena.alloc(value)
    }

    /// Allocate a slice in the session arena.
    pub fn alloc_slice<T: Clone>(&self, slice: &[T]) -> &'arena [T] {
        self.arena.alloc_slice_clone(slice)
    }

    pub fn alloc_vec<T>(&self, items: Vec<T>) -> &'arena [T] {
        self.arena.alloc_slice_fill_iter(items)
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }
        let interned: &'arena str = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    pub fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.borrow_mut().report(diagnostic);
    }

    pub fn snapshot(&self) -> Snapshot {
        self.diagnostics.borrow().snapshot()
    }

    pub fn rollback(&self, snapshot: Snapshot) {
        self.diagnostics.borrow_mut().rollback(snapshot);
    }

    /// Run `op`; when it returns `None` every diagnostic it reported is discarded.
    pub fn tentative<T>(&self, op: impl FnOnce(&Self) -> Option<T>) -> Option<T> {
        let snapshot = self.snapshot();
        let result = op(self);
        if result.is_none() {
            self.rollback(snapshot);
        }
        result
    }

    pub fn diagnostics(&self) -> Ref<'_, DiagnosticCollector> {
        self.diagnostics.borrow()
    }

    pub fn take_diagnostics(&self) -> DiagnosticCollector {
        std::mem::take(&mut *self.diagnostics.borrow_mut())
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.borrow().has_errors()
    }

    pub fn record_symbol_registered(&self) {
        self.stats.borrow_mut().symbols_registered += 1;
    }

    pub fn record_reference_resolved(&self) {
        self.stats.borrow_mut().references_resolved += 1;
    }

    pub fn record_phi_created(&self) {
        self.stats.borrow_mut().phis_created += 1;
    }

    pub fn record_phi_removed(&self) {
        self.stats.borrow_mut().trivial_phis_removed += 1;
    }

    pub fn record_block_sealed(&self) {
        self.stats.borrow_mut().blocks_sealed += 1;
    }

    pub fn record_statement_emitted(&self) {
        self.stats.borrow_mut().statements_emitted += 1;
    }

    pub fn record_registers_assigned(&self, count: usize) {
        self.stats.borrow_mut().registers_assigned += count;
    }

    pub fn record_evictions(&self, count: usize) {
        self.stats.borrow_mut().evictions += count;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub symbols_registered: usize,
    pub references_resolved: usize,
    pub phis_created: usize,
    pub trivial_phis_removed: usize,
    pub blocks_sealed: usize,
    pub statements_emitted: usize,
    pub registers_assigned: usize,
    pub evictions: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Symbols registered: {}", self.symbols_registered)?;
        writeln!(f, "  References resolved: {}", self.references_resolved)?;
        writeln!(f, "  Phis created: {}", self.phis_created)?;
        writeln!(f, "  Trivial phis removed: {}", self.trivial_phis_removed)?;
        writeln!(f, "  Blocks sealed: {}", self.blocks_sealed)?;
        writeln!(f, "  Statements emitted: {}", self.statements_emitted)?;
        writeln!(f, "  Registers assigned: {}", self.registers_assigned)?;
        writeln!(f, "  Evictions: {}", self.evictions)?;
        Ok(())
    }
}
