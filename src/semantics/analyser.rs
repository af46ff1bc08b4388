// This module implements the semantic analyser, a rewriting visitor over the syntax
// tree produced by the parser. Every visit returns a node: the input itself when
// nothing below it changed, otherwise a new node allocated in the session arena that
// shares all unchanged children with the input. The analyser resolves every dotted
// reference to a symbol (head segment by outward search over the current scope plus
// the `using` imports, further segments as members along the base-type chain),
// records the resolved address on each call segment, attaches data types to
// expressions, backfills declared and inferred types, base types and default access
// modifiers into the symbol tables, evaluates raw numeric literals, validates operand
// kinds and folds pure literal expressions. It runs twice per file: the shallow pass
// only refines the tables and the tree, the full pass repeats the traversal over the
// refined tree and reports every diagnostic, including access violations, which need
// all symbols to be final.

//! Two-pass semantic analysis.

use super::access::is_accessible;
use super::literals::{evaluate_number, fold_binary, fold_unary, FoldError, LiteralError};
use super::operators::{binary_operands_valid, binary_result_type, type_name, unary_operand_valid};
use crate::ast::*;
use crate::core::diagnostics::{Diagnostic, MessageCode};
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::state::{AddressFrame, AddressKind, State};
use crate::symbols::{AccessModifier, Symbol, SymbolTableManager};
use std::ptr;

/// Which of the two analysis passes is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPass {
    /// Tolerates forward references and reports nothing.
    Shallow,
    /// Reports every diagnostic, including access violations.
    Full,
}

pub struct SemanticAnalyser<'s, 'a> {
    session: &'s CompilationSession<'a>,
    manager: &'s mut SymbolTableManager,
    pass: AnalysisPass,
    scope: State,
    imports: Vec<State>,
    /// Kind of the type whose members are being visited.
    owner_kind: Option<TypeDeclKind>,
}

impl<'s, 'a> SemanticAnalyser<'s, 'a> {
    pub fn new(
        session: &'s CompilationSession<'a>,
        manager: &'s mut SymbolTableManager,
        pass: AnalysisPass,
    ) -> Self {
        Self {
            session,
            manager,
            pass,
            scope: State::root(),
            imports: Vec::new(),
            owner_kind: None,
        }
    }

    /// Analyse one file and return its rewritten declarations.
    pub fn analyse(&mut self, decls: &'a [Decl<'a>]) -> CompileResult<&'a [Decl<'a>]> {
        log::debug!("analysis pass {:?} over {} declarations", self.pass, decls.len());
        self.imports.clear();
        self.visit_decls(decls)
    }

    fn report(&self, diagnostic: Diagnostic) {
        if self.pass == AnalysisPass::Full {
            self.session.report(diagnostic);
        }
    }

    fn scoped<R>(
        &mut self,
        frame: AddressFrame,
        f: impl FnOnce(&mut Self) -> CompileResult<R>,
    ) -> CompileResult<R> {
        self.scope.push(frame);
        let result = f(self);
        self.scope.pop()?;
        result
    }

    /// The current scope followed by every import.
    fn candidates(&self) -> Vec<State> {
        let mut scopes = Vec::with_capacity(self.imports.len() + 1);
        scopes.push(self.scope.clone());
        scopes.extend(self.imports.iter().cloned());
        scopes
    }

    fn default_access(&self) -> Option<AccessModifier> {
        match self.owner_kind? {
            TypeDeclKind::Data => Some(AccessModifier::Public),
            TypeDeclKind::System => Some(AccessModifier::Private),
            TypeDeclKind::Alias => None,
        }
    }

    /// Innermost type the current scope lies in.
    fn enclosing_type(&self) -> Option<&Symbol> {
        let frames = self.scope.frames();
        let idx = frames.iter().rposition(|f| f.kind.is_type())?;
        self.manager
            .symbol_at(&State::from_frames(frames[..=idx].to_vec()))
    }

    fn resolve_type(&self, ty: DataType<'a>, offset: usize) -> DataType<'a> {
        let DataType::Named(path) = ty else {
            return ty;
        };
        match self
            .manager
            .find_path(path, &self.candidates())
            .filter(|s| s.is_type())
        {
            Some(symbol) => DataType::Named(state_to_path(self.session, &symbol.state)),
            None => {
                self.report(Diagnostic::error(
                    MessageCode::UnresolvedSymbol,
                    offset,
                    vec![path.join(".")],
                ));
                ty
            }
        }
    }

    fn symbol_mut(&mut self, address: &State, context: &'static str) -> CompileResult<&mut Symbol> {
        self.manager
            .symbol_at_mut(address)
            .ok_or(CompileError::MissingNode { context })
    }

    // ---- declarations ----

    fn visit_decl(&mut self, decl: &Decl<'a>) -> CompileResult<Decl<'a>> {
        let kind = match decl.kind {
            DeclKind::Library(lib) => {
                let saved = self.owner_kind.take();
                let body = self.scoped(AddressFrame::new(lib.name, AddressKind::Library), |this| {
                    this.visit_decls(lib.body)
                });
                self.owner_kind = saved;
                DeclKind::Library(LibraryDecl { body: body?, ..lib })
            }
            DeclKind::Using(using) => DeclKind::Using(self.visit_using(&using, decl.offset)),
            DeclKind::Type(ty) => DeclKind::Type(self.visit_type(&ty, decl.offset)?),
            DeclKind::Function(func) => DeclKind::Function(self.visit_function(&func, decl.offset)?),
            DeclKind::Variable(var) => DeclKind::Variable(self.visit_variable(&var, decl.offset)?),
        };
        Ok(Decl {
            offset: decl.offset,
            kind,
        })
    }

    fn visit_decls(&mut self, decls: &'a [Decl<'a>]) -> CompileResult<&'a [Decl<'a>]> {
        let rewritten = decls
            .iter()
            .map(|decl| self.visit_decl(decl))
            .collect::<CompileResult<Vec<_>>>()?;
        Ok(self.session.alloc_vec(rewritten))
    }

    fn visit_using(&mut self, using: &UsingDecl<'a>, offset: usize) -> UsingDecl<'a> {
        let scopes = [State::root(), self.scope.clone()];
        let target = self
            .manager
            .find_path(using.path, &scopes)
            .filter(|s| s.kind.is_library_boundary() || s.is_type())
            .map(|s| s.state.clone());
        match target {
            Some(state) => {
                log::trace!("using `{state}` in `{}`", self.scope);
                let resolved = state_to_path(self.session, &state);
                if !self.imports.contains(&state) {
                    self.imports.push(state);
                }
                UsingDecl {
                    resolved: Some(resolved),
                    ..*using
                }
            }
            None => {
                self.report(Diagnostic::error(
                    MessageCode::UnresolvedUsing,
                    offset,
                    vec![using.path.join(".")],
                ));
                *using
            }
        }
    }

    fn visit_type(&mut self, ty: &TypeDecl<'a>, offset: usize) -> CompileResult<TypeDecl<'a>> {
        let frame = AddressFrame::new(ty.name, ty.kind.address_kind());
        let address = self.scope.with(frame.clone());

        let mut resolved_parent = ty.resolved_parent;
        if let Some(parent) = ty.parent {
            let base = self
                .manager
                .find_path(parent, &self.candidates())
                .filter(|s| s.is_type())
                .map(|s| s.state.clone());
            match base {
                Some(base) => {
                    resolved_parent = Some(state_to_path(self.session, &base));
                    self.symbol_mut(&address, "type declaration without symbol")?.parent = Some(base);
                }
                None => self.report(Diagnostic::error(
                    MessageCode::UnresolvedSymbol,
                    offset,
                    vec![parent.join(".")],
                )),
            }
        }

        let aliased = ty.aliased.map(|t| self.resolve_type(t, offset));
        if let Some(target) = aliased {
            self.symbol_mut(&address, "type alias without symbol")?.data_type = Some(target.to_state());
        }

        let saved = self.owner_kind.replace(ty.kind);
        let body = self.scoped(frame, |this| this.visit_decls(ty.body));
        self.owner_kind = saved;

        Ok(TypeDecl {
            resolved_parent,
            aliased,
            body: body?,
            ..*ty
        })
    }

    fn visit_function(&mut self, func: &FunctionDecl<'a>, offset: usize) -> CompileResult<FunctionDecl<'a>> {
        let frame = AddressFrame::new(func.name, AddressKind::Function);
        let address = self.scope.with(frame.clone());
        let access = func.modifiers.access.or(self.default_access());
        let return_type = func.return_type.map(|t| self.resolve_type(t, offset));

        let symbol = self.symbol_mut(&address, "function without symbol")?;
        symbol.data_type = return_type.map(|t| t.to_state());
        if symbol.access.is_none() {
            symbol.access = access;
        }

        let saved = self.owner_kind.take();
        let result = self.scoped(frame, |this| {
            let mut params = Vec::with_capacity(func.params.len());
            for param in func.params {
                let ty = this.resolve_type(param.ty, param.offset);
                let address = this
                    .scope
                    .with(AddressFrame::new(param.name, AddressKind::VariableDeclaration));
                this.symbol_mut(&address, "parameter without symbol")?.data_type = Some(ty.to_state());
                params.push(Param { ty, ..*param });
            }
            let body = this.visit_stmts(func.body)?;
            Ok((this.session.alloc_vec(params), body))
        });
        self.owner_kind = saved;
        let (params, body) = result?;

        Ok(FunctionDecl {
            modifiers: DeclModifiers {
                access,
                ..func.modifiers
            },
            params,
            return_type,
            body,
            ..*func
        })
    }

    fn visit_variable(&mut self, var: &VariableDecl<'a>, offset: usize) -> CompileResult<VariableDecl<'a>> {
        let init = var.init.map(|e| self.visit_expr(e)).transpose()?;
        let ty = match var.ty {
            Some(declared) => Some(self.resolve_type(declared, offset)),
            None => init.and_then(|e| e.ty),
        };
        let access = var.modifiers.access.or(self.default_access());

        let address = self
            .scope
            .with(AddressFrame::new(var.name, AddressKind::VariableDeclaration));
        let symbol = self.symbol_mut(&address, "variable without symbol")?;
        symbol.data_type = ty.map(|t| t.to_state());
        if symbol.access.is_none() {
            symbol.access = access;
        }

        Ok(VariableDecl {
            modifiers: DeclModifiers {
                access,
                ..var.modifiers
            },
            ty,
            init,
            ..*var
        })
    }

    // ---- statements ----

    fn visit_stmts(&mut self, stmts: &'a [Stmt<'a>]) -> CompileResult<&'a [Stmt<'a>]> {
        let mut rewritten = Vec::with_capacity(stmts.len());
        let mut returned = false;
        for stmt in stmts {
            if returned {
                self.report(Diagnostic::warning(MessageCode::UnreachableCode, stmt.offset, vec![]));
                returned = false;
            }
            rewritten.push(self.visit_stmt(stmt)?);
            if matches!(stmt.kind, StmtKind::Return(_)) {
                returned = true;
            }
        }
        Ok(self.session.alloc_vec(rewritten))
    }

    fn visit_body(&mut self, scope: BodyScope, offset: usize, body: &'a [Stmt<'a>]) -> CompileResult<&'a [Stmt<'a>]> {
        self.scoped(scope.frame(offset), |this| this.visit_stmts(body))
    }

    fn visit_stmt(&mut self, stmt: &Stmt<'a>) -> CompileResult<Stmt<'a>> {
        let kind = match stmt.kind {
            StmtKind::Block(body) => StmtKind::Block(self.visit_body(BodyScope::Block, stmt.offset, body)?),
            StmtKind::Variable(var) => StmtKind::Variable(self.visit_variable(&var, stmt.offset)?),
            StmtKind::Expression(expr) => StmtKind::Expression(self.visit_expr(expr)?),
            StmtKind::If { branches, else_body } => {
                let mut rewritten = Vec::with_capacity(branches.len());
                for branch in branches.iter() {
                    rewritten.push(CondBranch {
                        cond: self.visit_expr(branch.cond)?,
                        body: self.visit_body(BodyScope::If, branch.offset, branch.body)?,
                        ..*branch
                    });
                }
                let else_body = else_body
                    .map(|body| self.visit_body(BodyScope::Else, stmt.offset, body))
                    .transpose()?;
                StmtKind::If {
                    branches: self.session.alloc_vec(rewritten),
                    else_body,
                }
            }
            StmtKind::While { cond, body } => StmtKind::While {
                cond: self.visit_expr(cond)?,
                body: self.visit_body(BodyScope::While, stmt.offset, body)?,
            },
            StmtKind::DoWhile { body, cond } => {
                let body = self.visit_body(BodyScope::DoWhile, stmt.offset, body)?;
                StmtKind::DoWhile {
                    body,
                    cond: self.visit_expr(cond)?,
                }
            }
            StmtKind::For { init, cond, step, body } => {
                self.scoped(BodyScope::For.frame(stmt.offset), |this| {
                    let init = match init {
                        Some(init) => Some(this.session.alloc(this.visit_stmt(init)?)),
                        None => None,
                    };
                    Ok(StmtKind::For {
                        init,
                        cond: cond.map(|c| this.visit_expr(c)).transpose()?,
                        step: step.map(|s| this.visit_expr(s)).transpose()?,
                        body: this.visit_stmts(body)?,
                    })
                })?
            }
            StmtKind::Switch { subject, cases, default } => {
                let subject = self.visit_expr(subject)?;
                let mut rewritten = Vec::with_capacity(cases.len());
                for case in cases.iter() {
                    let value = self.visit_expr(case.value)?;
                    if !binary_operands_valid(BinaryOp::Eq, subject.ty, value.ty) {
                        self.report(Diagnostic::error(
                            MessageCode::InvalidOperands,
                            case.offset,
                            vec![BinaryOp::Eq.symbol().into(), type_name(subject.ty), type_name(value.ty)],
                        ));
                    }
                    rewritten.push(SwitchCase {
                        value,
                        body: self.visit_body(BodyScope::Case, case.offset, case.body)?,
                        ..*case
                    });
                }
                let default = default
                    .map(|body| self.visit_body(BodyScope::Default, stmt.offset, body))
                    .transpose()?;
                StmtKind::Switch {
                    subject,
                    cases: self.session.alloc_vec(rewritten),
                    default,
                }
            }
            StmtKind::Return(value) => StmtKind::Return(value.map(|v| self.visit_expr(v)).transpose()?),
        };
        Ok(Stmt {
            offset: stmt.offset,
            kind,
        })
    }

    // ---- expressions ----

    fn alloc_expr(&self, offset: usize, kind: ExprKind<'a>, ty: Option<DataType<'a>>) -> &'a Expr<'a> {
        self.session.alloc(Expr { offset, kind, ty })
    }

    fn visit_expr(&mut self, expr: &'a Expr<'a>) -> CompileResult<&'a Expr<'a>> {
        match expr.kind {
            ExprKind::Literal(lit) => Ok(self.visit_literal(expr, lit)),
            ExprKind::Grouping(inner) => {
                let new_inner = self.visit_expr(inner)?;
                if ptr::eq(new_inner, inner) && expr.ty == new_inner.ty {
                    return Ok(expr);
                }
                Ok(self.alloc_expr(expr.offset, ExprKind::Grouping(new_inner), new_inner.ty))
            }
            ExprKind::Unary { op, operand } => {
                let new_operand = self.visit_expr(operand)?;
                if !unary_operand_valid(op, new_operand.ty) {
                    self.report(Diagnostic::error(
                        MessageCode::InvalidOperands,
                        expr.offset,
                        vec![op.symbol().into(), type_name(new_operand.ty)],
                    ));
                    return Ok(self.alloc_expr(
                        expr.offset,
                        ExprKind::Unary { op, operand: new_operand },
                        None,
                    ));
                }
                if self.session.options().fold_constants {
                    if let Some(folded) = new_operand.literal().and_then(|l| fold_unary(op, l)) {
                        return Ok(self.alloc_expr(expr.offset, ExprKind::Literal(folded), folded.data_type()));
                    }
                }
                let ty = match op {
                    UnaryOp::Not => Some(DataType::Primitive(PrimitiveType::Bool)),
                    UnaryOp::Neg | UnaryOp::BitNot => new_operand.ty,
                };
                if ptr::eq(new_operand, operand) && expr.ty == ty {
                    return Ok(expr);
                }
                Ok(self.alloc_expr(expr.offset, ExprKind::Unary { op, operand: new_operand }, ty))
            }
            ExprKind::Binary { op, lhs, rhs } => self.visit_binary(expr, op, lhs, rhs),
            ExprKind::Assign { target, op, value } => {
                let new_target = self.visit_expr(target)?;
                let new_value = self.visit_expr(value)?;
                if let Some(bop) = op.binary() {
                    if !binary_operands_valid(bop, new_target.ty, new_value.ty) {
                        self.report(Diagnostic::error(
                            MessageCode::InvalidOperands,
                            expr.offset,
                            vec![bop.symbol().into(), type_name(new_target.ty), type_name(new_value.ty)],
                        ));
                    }
                }
                if !matches!(new_target.kind, ExprKind::Call(_)) {
                    return Err(CompileError::MissingNode {
                        context: "assignment target is not a reference",
                    });
                }
                let ty = new_target.ty;
                if ptr::eq(new_target, target) && ptr::eq(new_value, value) && expr.ty == ty {
                    return Ok(expr);
                }
                Ok(self.alloc_expr(
                    expr.offset,
                    ExprKind::Assign {
                        target: new_target,
                        op,
                        value: new_value,
                    },
                    ty,
                ))
            }
            ExprKind::Call(chain) => self.visit_chain(expr, chain),
        }
    }

    fn visit_literal(&mut self, expr: &'a Expr<'a>, lit: Literal<'a>) -> &'a Expr<'a> {
        match lit {
            Literal::Number { text, base, suffix } => match evaluate_number(text, base, suffix) {
                Ok(value) => self.alloc_expr(expr.offset, ExprKind::Literal(value), value.data_type()),
                Err(err) => {
                    let code = match err {
                        LiteralError::Malformed => MessageCode::MalformedLiteral,
                        LiteralError::Overflow => MessageCode::LiteralOverflow,
                    };
                    self.report(Diagnostic::error(code, expr.offset, vec![text.into(), base.to_string()]));
                    expr
                }
            },
            _ if expr.ty.is_some() => expr,
            _ => self.alloc_expr(expr.offset, expr.kind, lit.data_type()),
        }
    }

    fn visit_binary(
        &mut self,
        expr: &'a Expr<'a>,
        op: BinaryOp,
        lhs: &'a Expr<'a>,
        rhs: &'a Expr<'a>,
    ) -> CompileResult<&'a Expr<'a>> {
        let new_lhs = self.visit_expr(lhs)?;
        let new_rhs = self.visit_expr(rhs)?;
        let rebuilt = ExprKind::Binary {
            op,
            lhs: new_lhs,
            rhs: new_rhs,
        };

        if !binary_operands_valid(op, new_lhs.ty, new_rhs.ty) {
            self.report(Diagnostic::error(
                MessageCode::InvalidOperands,
                expr.offset,
                vec![op.symbol().into(), type_name(new_lhs.ty), type_name(new_rhs.ty)],
            ));
            return Ok(self.alloc_expr(expr.offset, rebuilt, None));
        }

        if self.session.options().fold_constants {
            if let (Some(l), Some(r)) = (new_lhs.literal(), new_rhs.literal()) {
                let offset = expr.offset;
                match self.session.tentative(|_| fold_binary(op, l, r)) {
                    Some(Ok(value)) => {
                        log::trace!("folded `{}` at {offset}", op.symbol());
                        return Ok(self.alloc_expr(offset, ExprKind::Literal(value), value.data_type()));
                    }
                    // The node is kept unfolded; the next pass sees it again.
                    Some(Err(FoldError::Overflow)) => self.report(Diagnostic::error(
                        MessageCode::LiteralOverflow,
                        offset,
                        vec![op.symbol().into()],
                    )),
                    Some(Err(FoldError::DivisionByZero)) => {
                        self.report(Diagnostic::warning(MessageCode::DivisionByZero, offset, vec![]))
                    }
                    None => {}
                }
            }
        }

        let ty = binary_result_type(op, new_lhs.ty, new_rhs.ty);
        if ptr::eq(new_lhs, lhs) && ptr::eq(new_rhs, rhs) && expr.ty == ty {
            return Ok(expr);
        }
        Ok(self.alloc_expr(expr.offset, rebuilt, ty))
    }

    fn visit_chain(&mut self, expr: &'a Expr<'a>, chain: CallChain<'a>) -> CompileResult<&'a Expr<'a>> {
        let candidates = self.candidates();
        let caller = self.scope.enclosing_declaration();
        let check_access = self.pass == AnalysisPass::Full && self.session.options().enforce_access;

        let mut segments = Vec::with_capacity(chain.segments.len());
        let mut current: Option<Symbol> = None;
        let mut failed = false;

        for (idx, segment) in chain.segments.iter().enumerate() {
            let args = match segment.args {
                Some(args) => {
                    let mut rewritten = Vec::with_capacity(args.len());
                    for arg in args {
                        rewritten.push(*self.visit_expr(arg)?);
                    }
                    Some(self.session.alloc_vec(rewritten))
                }
                None => None,
            };
            if failed {
                segments.push(CallSegment { args, ..*segment });
                continue;
            }

            let found = match &current {
                None => self
                    .manager
                    .find_in(segment.name, &candidates)
                    .or_else(|| {
                        let owner = self.enclosing_type()?;
                        self.manager.find_member(owner, segment.name)
                    })
                    .cloned(),
                Some(prev) => self.manager.find_member(prev, segment.name).cloned(),
            };
            let spelled = || {
                chain.segments[..=idx]
                    .iter()
                    .map(|s| s.name)
                    .collect::<Vec<_>>()
                    .join(".")
            };

            match found {
                Some(symbol) => {
                    self.session.record_reference_resolved();
                    if check_access && !is_accessible(self.manager, &caller, &symbol) {
                        self.report(Diagnostic::error(
                            MessageCode::AccessViolation,
                            segment.offset,
                            vec![spelled(), caller.to_string()],
                        ));
                    }
                    segments.push(CallSegment {
                        args,
                        resolved: Some(state_to_path(self.session, &symbol.state)),
                        ..*segment
                    });
                    current = Some(symbol);
                }
                None => {
                    self.report(Diagnostic::error(
                        MessageCode::UnresolvedSymbol,
                        segment.offset,
                        vec![spelled()],
                    ));
                    segments.push(CallSegment { args, ..*segment });
                    failed = true;
                }
            }
        }

        let ty = match (&current, failed) {
            (Some(symbol), false) if symbol.is_type() => {
                Some(DataType::Named(state_to_path(self.session, &symbol.state)))
            }
            (Some(symbol), false) => symbol
                .data_type
                .as_ref()
                .map(|t| DataType::from_state(self.session, t)),
            _ => None,
        };

        Ok(self.alloc_expr(
            expr.offset,
            ExprKind::Call(CallChain {
                segments: self.session.alloc_vec(segments),
            }),
            ty,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::TestContext;
    use crate::semantics::discovery::DeclarationDiscovery;

    fn analyse_both<'a>(
        session: &CompilationSession<'a>,
        manager: &mut SymbolTableManager,
        decls: Vec<Decl<'a>>,
    ) -> &'a [Decl<'a>] {
        let decls = session.alloc_vec(decls);
        DeclarationDiscovery::new(session, manager).discover(decls).unwrap();
        let first = SemanticAnalyser::new(session, manager, AnalysisPass::Shallow)
            .analyse(decls)
            .unwrap();
        SemanticAnalyser::new(session, manager, AnalysisPass::Full)
            .analyse(first)
            .unwrap()
    }

    fn init_of<'a>(decl: &Decl<'a>) -> &'a Expr<'a> {
        match decl.kind {
            DeclKind::Variable(VariableDecl { init: Some(init), .. }) => init,
            _ => panic!("expected initialised variable"),
        }
    }

    #[test]
    fn test_forward_reference_resolves() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let b = TreeBuilder::new(&session);
        let mut manager = SymbolTableManager::new();

        let decls = vec![
            b.var("y", None, Some(b.reference("x"))),
            b.var("x", Some(b.int_ty()), Some(b.int(1))),
        ];
        let out = analyse_both(&session, &mut manager, decls);

        assert!(!session.has_errors());
        let y = init_of(&out[0]);
        assert_eq!(y.ty, Some(DataType::Primitive(PrimitiveType::Int)));
        let y_symbol = manager.lookup(&State::root(), "y").unwrap();
        assert_eq!(y_symbol.data_type.as_ref().map(|t| t.to_string()), Some("int".into()));
    }

    #[test]
    fn test_unresolved_reported_only_in_full_pass() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let b = TreeBuilder::new(&session);
        let mut manager = SymbolTableManager::new();

        let decls = session.alloc_vec(vec![b.var("y", None, Some(b.reference("missing")))]);
        DeclarationDiscovery::new(&session, &mut manager).discover(decls).unwrap();
        let first = SemanticAnalyser::new(&session, &mut manager, AnalysisPass::Shallow)
            .analyse(decls)
            .unwrap();
        assert!(!session.has_errors());

        SemanticAnalyser::new(&session, &mut manager, AnalysisPass::Full)
            .analyse(first)
            .unwrap();
        let diags = session.diagnostics();
        let unresolved: Vec<_> = diags.with_code(MessageCode::UnresolvedSymbol).collect();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].args, vec!["missing".to_string()]);
    }

    #[test]
    fn test_constant_folding_and_division_by_zero() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let b = TreeBuilder::new(&session);
        let mut manager = SymbolTableManager::new();

        let decls = vec![
            b.var("a", None, Some(b.binary(BinaryOp::Mul, b.int(6), b.int(7)))),
            b.var("z", None, Some(b.binary(BinaryOp::Div, b.int(1), b.int(0)))),
        ];
        let out = analyse_both(&session, &mut manager, decls);

        assert!(matches!(init_of(&out[0]).kind, ExprKind::Literal(Literal::Int(42))));
        assert!(matches!(init_of(&out[1]).kind, ExprKind::Binary { .. }));
        assert!(!session.has_errors());
        assert_eq!(session.diagnostics().with_code(MessageCode::DivisionByZero).count(), 1);
    }

    #[test]
    fn test_folding_overflow_is_reported_once() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let b = TreeBuilder::new(&session);
        let mut manager = SymbolTableManager::new();

        let decls = vec![b.var("a", None, Some(b.binary(BinaryOp::Add, b.int(i32::MAX), b.int(1))))];
        let out = analyse_both(&session, &mut manager, decls);

        assert!(matches!(init_of(&out[0]).kind, ExprKind::Binary { .. }));
        let diags = session.diagnostics();
        assert_eq!(diags.with_code(MessageCode::LiteralOverflow).count(), 1);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_invalid_operands_keep_traversing() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let b = TreeBuilder::new(&session);
        let mut manager = SymbolTableManager::new();

        let decls = vec![
            b.var("a", None, Some(b.binary(BinaryOp::Lt, b.boolean(true), b.boolean(false)))),
            b.var("c", None, Some(b.binary(BinaryOp::And, b.string("s"), b.boolean(true)))),
            b.var("d", None, Some(b.number("19", 8, NumberSuffix::None))),
        ];
        analyse_both(&session, &mut manager, decls);

        let diags = session.diagnostics();
        assert_eq!(diags.with_code(MessageCode::InvalidOperands).count(), 2);
        assert_eq!(diags.with_code(MessageCode::MalformedLiteral).count(), 1);
    }

    #[test]
    fn test_member_defaults_and_base_backfill() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let b = TreeBuilder::new(&session);
        let mut manager = SymbolTableManager::new();

        let decls = vec![
            b.data("A", None, vec![b.var("x", Some(b.int_ty()), None)]),
            b.system("S", Some("A"), vec![b.var("hidden", Some(b.int_ty()), None)]),
        ];
        analyse_both(&session, &mut manager, decls);

        let a = State::from_names(["A"], AddressKind::DataType);
        let s = State::from_names(["S"], AddressKind::SystemType);
        assert_eq!(manager.lookup(&a, "x").unwrap().access, Some(AccessModifier::Public));
        assert_eq!(manager.lookup(&s, "hidden").unwrap().access, Some(AccessModifier::Private));
        assert_eq!(manager.symbol_at(&s).unwrap().parent, Some(a));
    }

    #[test]
    fn test_unreachable_after_return() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let b = TreeBuilder::new(&session);
        let mut manager = SymbolTableManager::new();

        let decls = vec![b.function(
            "f",
            vec![],
            Some(b.int_ty()),
            vec![b.ret(Some(b.int(1))), b.local("dead", None, Some(b.int(2)))],
        )];
        analyse_both(&session, &mut manager, decls);

        assert_eq!(session.diagnostics().with_code(MessageCode::UnreachableCode).count(), 1);
        assert!(!session.has_errors());
    }

    #[test]
    fn test_unchanged_subtrees_are_shared() {
        let ctx = TestContext::new();
        let session = ctx.create_session();
        let b = TreeBuilder::new(&session);
        let mut manager = SymbolTableManager::new();

        let decls = vec![b.var("a", None, Some(b.binary(BinaryOp::Add, b.reference("a"), b.int(1))))];
        let decls = session.alloc_vec(decls);
        DeclarationDiscovery::new(&session, &mut manager).discover(decls).unwrap();
        let first = SemanticAnalyser::new(&session, &mut manager, AnalysisPass::Shallow)
            .analyse(decls)
            .unwrap();
        let second = SemanticAnalyser::new(&session, &mut manager, AnalysisPass::Full)
            .analyse(first)
            .unwrap();

        let (ExprKind::Binary { rhs: rhs1, .. }, ExprKind::Binary { rhs: rhs2, .. }) =
            (init_of(&first[0]).kind, init_of(&second[0]).kind)
        else {
            panic!("expected binary initialisers");
        };
        assert!(ptr::eq(rhs1, rhs2));
    }
}
