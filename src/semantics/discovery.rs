// This module implements declaration discovery, the first walk over a file's
// declaration tree. It registers every declared entity (libraries, types, functions,
// parameters, member/global variables and block-local variables) under its qualified
// address and creates a symbol table for every scope it enters, including the
// anonymous scopes of blocks, branches, loop bodies and switch cases. Running it for
// every file before any analysis starts is what makes forward references resolvable.
// A duplicate name inside one scope aborts discovery of the file.

//! Declaration discovery pass.

use crate::ast::{BodyScope, Decl, DeclKind, Stmt, StmtKind, TypeDeclKind, VariableDecl};
use crate::core::error::CompileResult;
use crate::core::session::CompilationSession;
use crate::state::{AddressFrame, AddressKind, State};
use crate::symbols::{Symbol, SymbolTableManager};

pub struct DeclarationDiscovery<'s, 'a> {
    session: &'s CompilationSession<'a>,
    manager: &'s mut SymbolTableManager,
    scope: State,
    /// Type whose body is currently being walked, for member parent links.
    owner_type: Option<State>,
}

impl<'s, 'a> DeclarationDiscovery<'s, 'a> {
    pub fn new(session: &'s CompilationSession<'a>, manager: &'s mut SymbolTableManager) -> Self {
        Self {
            session,
            manager,
            scope: State::root(),
            owner_type: None,
        }
    }

    /// Register every declaration of one file.
    pub fn discover(&mut self, decls: &[Decl<'a>]) -> CompileResult<()> {
        self.manager.create_table(&State::root());
        for decl in decls {
            self.visit_decl(decl)?;
        }
        log::debug!(
            "discovery finished: {} tables, {} symbols so far",
            self.manager.table_count(),
            self.session.stats().symbols_registered
        );
        Ok(())
    }

    /// Push `frame`, run `f`, pop again whatever `f` returned.
    fn scoped<R>(
        &mut self,
        frame: AddressFrame,
        f: impl FnOnce(&mut Self) -> CompileResult<R>,
    ) -> CompileResult<R> {
        self.scope.push(frame);
        self.manager.create_table(&self.scope);
        let result = f(self);
        self.scope.pop()?;
        result
    }

    fn register(&mut self, symbol: Symbol) -> CompileResult<()> {
        log::trace!("register `{}` ({:?})", symbol.state, symbol.kind);
        self.manager.insert(symbol)?;
        self.session.record_symbol_registered();
        Ok(())
    }

    fn visit_decl(&mut self, decl: &Decl<'a>) -> CompileResult<()> {
        match &decl.kind {
            DeclKind::Library(lib) => {
                let frame = AddressFrame::new(lib.name, AddressKind::Library);
                self.register(Symbol::new(self.scope.with(frame.clone()), AddressKind::Library, decl.offset))?;
                let saved_owner = self.owner_type.take();
                let result = self.scoped(frame, |this| {
                    lib.body.iter().try_for_each(|d| this.visit_decl(d))
                });
                self.owner_type = saved_owner;
                result
            }
            DeclKind::Using(_) => Ok(()),
            DeclKind::Type(ty) => {
                let kind = ty.kind.address_kind();
                let frame = AddressFrame::new(ty.name, kind);
                let state = self.scope.with(frame.clone());
                let mut symbol = Symbol::new(state.clone(), kind, decl.offset)
                    .with_access(ty.modifiers.access)
                    .with_modifiers(ty.modifiers.modifiers)
                    .with_parent(
                        ty.parent
                            .map(|p| State::from_names(p.iter().copied(), AddressKind::DataType)),
                    );
                if ty.kind == TypeDeclKind::Alias {
                    symbol.data_type = ty.aliased.map(|t| t.to_state());
                }
                self.register(symbol)?;

                let saved_owner = self.owner_type.replace(state);
                let result = self.scoped(frame, |this| {
                    ty.body.iter().try_for_each(|d| this.visit_decl(d))
                });
                self.owner_type = saved_owner;
                result
            }
            DeclKind::Function(func) => {
                let frame = AddressFrame::new(func.name, AddressKind::Function);
                let symbol = Symbol::new(self.scope.with(frame.clone()), AddressKind::Function, decl.offset)
                    .with_access(func.modifiers.access)
                    .with_modifiers(func.modifiers.modifiers)
                    .with_parent(self.owner_type.clone())
                    .with_data_type(func.return_type.map(|t| t.to_state()));
                self.register(symbol)?;

                let saved_owner = self.owner_type.take();
                let result = self.scoped(frame, |this| {
                    for (idx, param) in func.params.iter().enumerate() {
                        let state = this
                            .scope
                            .with(AddressFrame::new(param.name, AddressKind::VariableDeclaration));
                        let mut symbol = Symbol::new(state, AddressKind::VariableDeclaration, param.offset)
                            .with_data_type(Some(param.ty.to_state()));
                        symbol.param_index = Some(idx);
                        this.register(symbol)?;
                    }
                    func.body.iter().try_for_each(|s| this.visit_stmt(s))
                });
                self.owner_type = saved_owner;
                result
            }
            DeclKind::Variable(var) => {
                let symbol = self.variable_symbol(var, AddressKind::VariableDeclaration, decl.offset);
                self.register(symbol)
            }
        }
    }

    fn variable_symbol(&self, var: &VariableDecl<'a>, kind: AddressKind, offset: usize) -> Symbol {
        Symbol::new(self.scope.with(AddressFrame::new(var.name, kind)), kind, offset)
            .with_access(var.modifiers.access)
            .with_modifiers(var.modifiers.modifiers)
            .with_parent(self.owner_type.clone())
            .with_data_type(var.ty.map(|t| t.to_state()))
    }

    fn visit_body(&mut self, scope: BodyScope, offset: usize, body: &[Stmt<'a>]) -> CompileResult<()> {
        self.scoped(scope.frame(offset), |this| {
            body.iter().try_for_each(|s| this.visit_stmt(s))
        })
    }

    fn visit_stmt(&mut self, stmt: &Stmt<'a>) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Block(body) => self.visit_body(BodyScope::Block, stmt.offset, body),
            StmtKind::Variable(var) => {
                let symbol = self.variable_symbol(var, AddressKind::VariableStatement, stmt.offset);
                self.register(symbol)
            }
            StmtKind::Expression(_) | StmtKind::Return(_) => Ok(()),
            StmtKind::If { branches, else_body } => {
                for branch in branches.iter() {
                    self.visit_body(BodyScope::If, branch.offset, branch.body)?;
                }
                if let Some(body) = else_body {
                    self.visit_body(BodyScope::Else, stmt.offset, body)?;
                }
                Ok(())
            }
            StmtKind::While { body, .. } => self.visit_body(BodyScope::While, stmt.offset, body),
            StmtKind::DoWhile { body, .. } => self.visit_body(BodyScope::DoWhile, stmt.offset, body),
            StmtKind::For { init, body, .. } => self.scoped(BodyScope::For.frame(stmt.offset), |this| {
                if let Some(init) = init {
                    this.visit_stmt(init)?;
                }
                body.iter().try_for_each(|s| this.visit_stmt(s))
            }),
            StmtKind::Switch { cases, default, .. } => {
                for case in cases.iter() {
                    self.visit_body(BodyScope::Case, case.offset, case.body)?;
                }
                if let Some(body) = default {
                    self.visit_body(BodyScope::Default, stmt.offset, body)?;
                }
                Ok(())
            }
        }
    }
}
