// This module drives a whole compilation through the middle end. All files share one
// symbol table manager, and every stage finishes for every file before the next stage
// starts: discovery for all files, the deferring analysis pass for all files, the
// enforcing pass for all files, IR generation for all files, then decoding and register
// allocation per generated function. The barriers are what make forward and cross-file
// references resolvable without any locking. Source-level errors stop the pipeline
// after analysis; the rewritten trees and the diagnostics are still returned. A fatal
// error aborts the compilation and is left on the session as an internal diagnostic.

//! Staged compilation driver.

use crate::ast::Decl;
use crate::core::diagnostics::{Diagnostic, DiagnosticCollector, MessageCode};
use crate::core::error::CompileResult;
use crate::core::session::{CompilationSession, SessionStats};
use crate::ir::{DecodedFunction, IrGenerator, IrProgram};
use crate::regalloc::{self, Allocation};
use crate::semantics::{AnalysisPass, DeclarationDiscovery, SemanticAnalyser};
use crate::state::State;
use crate::symbols::SymbolTableManager;
use hashbrown::HashMap;

/// Output of a compilation.
#[derive(Debug)]
pub struct CompiledProgram<'a> {
    pub program: IrProgram,
    /// Flat statement streams, in function generation order.
    pub decoded: Vec<DecodedFunction>,
    pub allocations: HashMap<State, Allocation>,
    /// Trees produced by the enforcing pass, one per file.
    pub trees: Vec<&'a [Decl<'a>]>,
    pub diagnostics: DiagnosticCollector,
    pub stats: SessionStats,
}

impl CompiledProgram<'_> {
    /// No error-level diagnostic was reported.
    pub fn succeeded(&self) -> bool {
        !self.diagnostics.has_errors()
    }

    pub fn allocation(&self, function: &State) -> Option<&Allocation> {
        self.allocations.get(function)
    }

    pub fn decoded(&self, function: &State) -> Option<&DecodedFunction> {
        self.decoded.iter().find(|f| &f.name == function)
    }
}

pub struct Compiler<'s, 'a> {
    session: &'s CompilationSession<'a>,
    manager: SymbolTableManager,
}

impl<'s, 'a> Compiler<'s, 'a> {
    pub fn new(session: &'s CompilationSession<'a>) -> Self {
        Self {
            session,
            manager: SymbolTableManager::new(),
        }
    }

    pub fn manager(&self) -> &SymbolTableManager {
        &self.manager
    }

    /// Compile every file of one program.
    pub fn compile(&mut self, files: &[&'a [Decl<'a>]]) -> CompileResult<CompiledProgram<'a>> {
        self.run(files).inspect_err(|err| {
            log::debug!("compilation aborted: {err}");
            self.session.report(Diagnostic::internal(
                MessageCode::InternalFailure,
                0,
                vec![err.to_string()],
            ));
        })
    }

    fn run(&mut self, files: &[&'a [Decl<'a>]]) -> CompileResult<CompiledProgram<'a>> {
        for decls in files {
            DeclarationDiscovery::new(self.session, &mut self.manager).discover(decls)?;
        }
        log::debug!(
            "discovery done: {} files, {} tables",
            files.len(),
            self.manager.table_count()
        );

        let shallow = self.analyse_all(files, AnalysisPass::Shallow)?;
        let trees = self.analyse_all(&shallow, AnalysisPass::Full)?;

        let mut program = IrProgram::new();
        let mut decoded = Vec::new();
        let mut allocations = HashMap::new();
        if self.session.has_errors() {
            log::debug!(
                "analysis reported {} errors, skipping code generation",
                self.session.diagnostics().error_count()
            );
        } else {
            let mut generator = IrGenerator::new(self.session, &self.manager);
            for decls in &trees {
                generator.generate(decls)?;
            }
            program = generator.finish();

            let pool = self.session.options().register_pool;
            for function in program.iter() {
                let flat = function.decode()?;
                log::debug!("allocating registers for `{}`", function.name);
                let allocation = regalloc::allocate(self.session, &flat.stmts, pool)?;
                allocations.insert(function.name.clone(), allocation);
                decoded.push(flat);
            }
        }

        Ok(CompiledProgram {
            program,
            decoded,
            allocations,
            trees,
            diagnostics: self.session.take_diagnostics(),
            stats: self.session.stats(),
        })
    }

    fn analyse_all(
        &mut self,
        files: &[&'a [Decl<'a>]],
        pass: AnalysisPass,
    ) -> CompileResult<Vec<&'a [Decl<'a>]>> {
        let mut trees = Vec::with_capacity(files.len());
        for decls in files {
            trees.push(SemanticAnalyser::new(self.session, &mut self.manager, pass).analyse(decls)?);
        }
        log::debug!("analysis pass {pass:?} done");
        Ok(trees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, TreeBuilder};
    use crate::core::diagnostics::MessageKind;
    use crate::core::error::CompileError;
    use crate::core::test_utils::test::TestContext;
    use crate::state::AddressKind;

    #[test]
    fn test_cross_file_reference_resolves_across_barrier() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let b = TreeBuilder::new(&session);

        // `main` in the first file calls `helper` declared in the second.
        let first = session.alloc_vec(vec![b.function(
            "main",
            vec![],
            Some(b.int_ty()),
            vec![b.ret(Some(b.call("helper", vec![*b.int(2)])))],
        )]);
        let second = session.alloc_vec(vec![b.function(
            "helper",
            vec![b.param("n", b.int_ty())],
            Some(b.int_ty()),
            vec![b.ret(Some(b.binary(BinaryOp::Mul, b.reference("n"), b.int(3))))],
        )]);

        let mut compiler = Compiler::new(&session);
        let compiled = compiler.compile(&[first, second]).unwrap();

        assert!(compiled.succeeded());
        assert_eq!(compiled.program.order.len(), 2);
        let main = State::from_names(["main"], AddressKind::Function);
        assert!(compiled.allocation(&main).is_some());
        assert!(compiled.decoded(&main).is_some());
        assert!(compiled.stats.statements_emitted > 0);
    }

    #[test]
    fn test_errors_stop_before_code_generation() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let b = TreeBuilder::new(&session);

        let file = session.alloc_vec(vec![b.function(
            "main",
            vec![],
            None,
            vec![b.expr_stmt(b.reference("missing"))],
        )]);

        let mut compiler = Compiler::new(&session);
        let compiled = compiler.compile(&[file]).unwrap();

        assert!(!compiled.succeeded());
        assert_eq!(compiled.diagnostics.with_code(MessageCode::UnresolvedSymbol).count(), 1);
        assert!(compiled.program.functions.is_empty());
        assert_eq!(compiled.trees.len(), 1);
    }

    #[test]
    fn test_fatal_error_leaves_internal_diagnostic() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let b = TreeBuilder::new(&session);

        let file = session.alloc_vec(vec![
            b.var("x", Some(b.int_ty()), None),
            b.var("x", Some(b.int_ty()), None),
        ]);

        let err = Compiler::new(&session).compile(&[file]).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateSymbol { .. }));

        let diags = session.diagnostics();
        let internal: Vec<_> = diags.with_code(MessageCode::InternalFailure).collect();
        assert_eq!(internal.len(), 1);
        assert_eq!(internal[0].kind, MessageKind::Internal);
        assert!(internal[0].is_error());
        assert_eq!(internal[0].args, vec![err.to_string()]);
    }

    #[test]
    fn test_overflowing_constant_fails_compilation() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let b = TreeBuilder::new(&session);

        let file = session.alloc_vec(vec![b.var(
            "a",
            None,
            Some(b.binary(BinaryOp::Add, b.int(i32::MAX), b.int(1))),
        )]);

        let compiled = Compiler::new(&session).compile(&[file]).unwrap();
        assert!(!compiled.succeeded());
        assert_eq!(compiled.diagnostics.with_code(MessageCode::LiteralOverflow).count(), 1);
    }
}
