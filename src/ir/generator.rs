// This module implements the IR generator. It walks the analysed tree once and lowers
// module-level declarations into the program's global statement list and every
// function body into a control-flow graph of basic blocks. Locals and parameters are
// SSA values managed by the SsaBuilder; globals and members go through LOAD/DFE by
// qualified name. Every jump records a predecessor edge, and every block is sealed as
// soon as its predecessor set is final: fallthrough and merge blocks right after their
// last incoming edge, loop headers only after the back edge from the loop body.
// Statements after a terminator are not lowered; the analyser has already warned
// about them.

//! Lowering of the analysed tree into SSA form.

use super::ssa::SsaBuilder;
use super::{BlockId, IrArg, IrFunction, IrProgram, IrRef, Opcode};
use crate::ast::*;
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::semantics::literals::evaluate_number;
use crate::state::{AddressFrame, AddressKind, State};
use crate::symbols::{Symbol, SymbolTableManager};

/// Generation state of the function being lowered.
struct FunctionState {
    func: IrFunction,
    ssa: SsaBuilder,
    block: BlockId,
    /// No instruction can reach the current position.
    terminated: bool,
}

pub struct IrGenerator<'s, 'a> {
    session: &'s CompilationSession<'a>,
    manager: &'s SymbolTableManager,
    program: IrProgram,
    scope: State,
    current: Option<FunctionState>,
}

impl<'s, 'a> IrGenerator<'s, 'a> {
    pub fn new(session: &'s CompilationSession<'a>, manager: &'s SymbolTableManager) -> Self {
        Self {
            session,
            manager,
            program: IrProgram::new(),
            scope: State::root(),
            current: None,
        }
    }

    /// Lower the declarations of one file into the program.
    pub fn generate(&mut self, decls: &'a [Decl<'a>]) -> CompileResult<()> {
        for decl in decls {
            self.gen_decl(decl)?;
        }
        Ok(())
    }

    pub fn program(&self) -> &IrProgram {
        &self.program
    }

    pub fn finish(self) -> IrProgram {
        self.program
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

    fn state(&mut self) -> CompileResult<&mut FunctionState> {
        self.current.as_mut().ok_or(CompileError::MissingNode {
            context: "statement outside of a function",
        })
    }

    // ---- declarations ----

    fn gen_decl(&mut self, decl: &Decl<'a>) -> CompileResult<()> {
        match decl.kind {
            DeclKind::Library(lib) => {
                let frame = AddressFrame::new(lib.name, AddressKind::Library);
                self.program
                    .push_global(Opcode::Lib, vec![IrArg::State(self.scope.with(frame.clone()))]);
                self.scoped(frame, |this| this.generate(lib.body))
            }
            DeclKind::Using(using) => {
                if let Some(target) = using.resolved {
                    self.program.push_global(
                        Opcode::Use,
                        vec![IrArg::State(path_to_state(target, AddressKind::Library))],
                    );
                }
                Ok(())
            }
            DeclKind::Type(ty) => {
                let frame = AddressFrame::new(ty.name, ty.kind.address_kind());
                self.scoped(frame, |this| this.generate(ty.body))
            }
            DeclKind::Function(func) => self.gen_function(&func),
            DeclKind::Variable(var) => {
                let address = self
                    .scope
                    .with(AddressFrame::new(var.name, AddressKind::VariableDeclaration));
                let mut args = vec![IrArg::State(address.clone())];
                match var.init.and_then(|e| e.literal()) {
                    Some(lit) => args.push(literal_arg(lit)?),
                    None if var.init.is_some() => {
                        log::debug!("initialiser of `{address}` is not constant, left to the runtime");
                    }
                    None => {}
                }
                self.program.push_global(Opcode::Def, args);
                Ok(())
            }
        }
    }

    fn gen_function(&mut self, decl: &FunctionDecl<'a>) -> CompileResult<()> {
        let frame = AddressFrame::new(decl.name, AddressKind::Function);
        let name = self.scope.with(frame.clone());
        log::debug!("generating `{name}`");

        let mut func = IrFunction::new(name.clone());
        let entry = func.add_block(block_label(&name, 0));
        self.current = Some(FunctionState {
            func,
            ssa: SsaBuilder::new(),
            block: entry,
            terminated: false,
        });
        self.seal(entry)?;
        self.emit(Opcode::Func, vec![IrArg::State(name.clone())])?;

        for (idx, param) in decl.params.iter().enumerate() {
            let address = name.with(AddressFrame::new(param.name, AddressKind::VariableDeclaration));
            let loaded = self.emit(Opcode::LoadParam, vec![IrArg::Int(idx as i32)])?;
            let state = self.state()?;
            state.ssa.write_variable(&address, entry, loaded);
        }

        self.scoped(frame, |this| this.gen_stmts(decl.body))?;
        if !self.state()?.terminated {
            self.emit(Opcode::Retn, Vec::new())?;
        }

        let mut state = self.current.take().ok_or(CompileError::MissingNode {
            context: "function state vanished",
        })?;
        let unsealed: Vec<BlockId> = state.ssa.unsealed(&state.func).collect();
        for block in unsealed {
            log::debug!("`{name}`: {block} left unsealed, sealing at function end");
            state.ssa.seal_block(self.session, &mut state.func, block)?;
        }
        log::debug!(
            "generated `{name}`: {} statements in {} blocks",
            state.func.statements().len(),
            state.func.blocks().len()
        );
        self.program.add_function(state.func);
        Ok(())
    }

    // ---- blocks and jumps ----

    fn emit(&mut self, opcode: Opcode, args: Vec<IrArg>) -> CompileResult<IrRef> {
        let state = self.state()?;
        let r = state.func.push(state.block, opcode, args)?;
        self.session.record_statement_emitted();
        Ok(r)
    }

    fn new_block(&mut self) -> CompileResult<BlockId> {
        let state = self.state()?;
        let label = block_label(&state.func.name, state.func.blocks().len());
        Ok(state.func.add_block(label))
    }

    fn seal(&mut self, block: BlockId) -> CompileResult<()> {
        let session = self.session;
        let state = self.state()?;
        state.ssa.seal_block(session, &mut state.func, block)
    }

    /// Continue emitting into `block`. A block nothing jumps to is unreachable.
    fn switch_to(&mut self, block: BlockId) -> CompileResult<()> {
        let state = self.state()?;
        let unreachable = Some(block) != state.func.entry() && state.func.block(block)?.preds.is_empty();
        state.block = block;
        state.terminated = unreachable;
        Ok(())
    }

    /// Unconditional jump, unless control already left the current block.
    fn jump_to(&mut self, target: BlockId) -> CompileResult<()> {
        if self.state()?.terminated {
            return Ok(());
        }
        let from = self.state()?.block;
        self.emit(Opcode::Jmp, vec![IrArg::Block(target)])?;
        let state = self.state()?;
        state.func.add_edge(from, target)?;
        state.terminated = true;
        Ok(())
    }

    /// Conditional jump to `target`; emission continues in a new sealed
    /// fallthrough block.
    fn cond_jump(&mut self, opcode: Opcode, mut args: Vec<IrArg>, target: BlockId) -> CompileResult<()> {
        let from = self.state()?.block;
        args.push(IrArg::Block(target));
        self.emit(opcode, args)?;
        self.state()?.func.add_edge(from, target)?;

        let fallthrough = self.new_block()?;
        self.state()?.func.add_edge(from, fallthrough)?;
        self.seal(fallthrough)?;
        self.switch_to(fallthrough)
    }

    /// Jump to `target` when `cond` evaluates to `jump_if`.
    fn branch(&mut self, cond: &'a Expr<'a>, target: BlockId, jump_if: bool) -> CompileResult<()> {
        if let Some((op, lhs, rhs)) = comparison(cond) {
            let op = if jump_if { Some(op) } else { op.negated() };
            if let Some(op) = op {
                let l = self.gen_expr(lhs)?;
                let r = self.gen_expr(rhs)?;
                return self.cond_jump(jump_opcode(op), vec![l, r], target);
            }
        }
        let value = self.gen_expr(cond)?;
        let opcode = if jump_if { Opcode::Jt } else { Opcode::Jf };
        self.cond_jump(opcode, vec![value], target)
    }

    // ---- statements ----

    fn gen_stmts(&mut self, stmts: &'a [Stmt<'a>]) -> CompileResult<()> {
        for stmt in stmts {
            if self.state()?.terminated {
                log::trace!("skipping unreachable statement at {}", stmt.offset);
                break;
            }
            self.gen_stmt(stmt)?;
        }
        Ok(())
    }

    fn gen_body(&mut self, scope: BodyScope, offset: usize, body: &'a [Stmt<'a>]) -> CompileResult<()> {
        self.scoped(scope.frame(offset), |this| this.gen_stmts(body))
    }

    fn gen_stmt(&mut self, stmt: &Stmt<'a>) -> CompileResult<()> {
        match stmt.kind {
            StmtKind::Block(body) => self.gen_body(BodyScope::Block, stmt.offset, body),
            StmtKind::Variable(var) => {
                let Some(init) = var.init else {
                    return Ok(());
                };
                let address = self
                    .scope
                    .with(AddressFrame::new(var.name, AddressKind::VariableStatement));
                let value = self.gen_expr(init)?;
                self.define_local(&address, value).map(|_| ())
            }
            StmtKind::Expression(expr) => self.gen_expr(expr).map(|_| ()),
            StmtKind::If { branches, else_body } => {
                let merge = self.new_block()?;
                for (idx, branch) in branches.iter().enumerate() {
                    let last = idx + 1 == branches.len();
                    let next = if last && else_body.is_none() {
                        merge
                    } else {
                        self.new_block()?
                    };
                    self.branch(branch.cond, next, false)?;
                    self.gen_body(BodyScope::If, branch.offset, branch.body)?;
                    self.jump_to(merge)?;
                    if next != merge {
                        self.seal(next)?;
                        self.switch_to(next)?;
                    }
                }
                if let Some(body) = else_body {
                    self.gen_body(BodyScope::Else, stmt.offset, body)?;
                    self.jump_to(merge)?;
                }
                self.seal(merge)?;
                self.switch_to(merge)
            }
            StmtKind::While { cond, body } => {
                let header = self.new_block()?;
                self.jump_to(header)?;
                self.switch_to(header)?;
                let exit = self.new_block()?;
                self.branch(cond, exit, false)?;
                self.gen_body(BodyScope::While, stmt.offset, body)?;
                self.jump_to(header)?;
                self.seal(header)?;
                self.seal(exit)?;
                self.switch_to(exit)
            }
            StmtKind::DoWhile { body, cond } => {
                let head = self.new_block()?;
                self.jump_to(head)?;
                self.switch_to(head)?;
                self.gen_body(BodyScope::DoWhile, stmt.offset, body)?;
                if !self.state()?.terminated {
                    self.branch(cond, head, true)?;
                }
                self.seal(head)
            }
            StmtKind::For { init, cond, step, body } => {
                self.scoped(BodyScope::For.frame(stmt.offset), |this| {
                    if let Some(init) = init {
                        this.gen_stmt(init)?;
                    }
                    let header = this.new_block()?;
                    this.jump_to(header)?;
                    this.switch_to(header)?;
                    let exit = this.new_block()?;
                    if let Some(cond) = cond {
                        this.branch(cond, exit, false)?;
                    }
                    this.gen_stmts(body)?;
                    if let Some(step) = step {
                        if !this.state()?.terminated {
                            this.gen_expr(step)?;
                        }
                    }
                    this.jump_to(header)?;
                    this.seal(header)?;
                    this.seal(exit)?;
                    this.switch_to(exit)
                })
            }
            StmtKind::Switch { subject, cases, default } => {
                let subject = self.gen_expr(subject)?;
                let end = self.new_block()?;
                for case in cases.iter() {
                    let next = self.new_block()?;
                    let value = self.gen_expr(case.value)?;
                    self.cond_jump(Opcode::Jne, vec![subject.clone(), value], next)?;
                    self.gen_body(BodyScope::Case, case.offset, case.body)?;
                    self.jump_to(end)?;
                    self.seal(next)?;
                    self.switch_to(next)?;
                }
                if let Some(body) = default {
                    self.gen_body(BodyScope::Default, stmt.offset, body)?;
                }
                self.jump_to(end)?;
                self.seal(end)?;
                self.switch_to(end)
            }
            StmtKind::Return(value) => {
                match value {
                    Some(value) => {
                        let value = self.gen_expr(value)?;
                        self.emit(Opcode::Ret, vec![value])?;
                    }
                    None => {
                        self.emit(Opcode::Retn, Vec::new())?;
                    }
                }
                self.state()?.terminated = true;
                Ok(())
            }
        }
    }

    // ---- expressions ----

    fn define_local(&mut self, address: &State, value: IrArg) -> CompileResult<IrRef> {
        let def = self.emit(Opcode::Def, vec![IrArg::State(address.clone()), value])?;
        let state = self.state()?;
        state.ssa.write_variable(address, state.block, def);
        Ok(def)
    }

    fn reference(&self, chain: &CallChain<'a>) -> CompileResult<(State, &'s Symbol)> {
        let path = chain.last().and_then(|s| s.resolved).ok_or(CompileError::MissingNode {
            context: "unresolved reference reached code generation",
        })?;
        let state = path_to_state(path, AddressKind::Call);
        let manager = self.manager;
        let symbol = manager.symbol_at(&state).ok_or(CompileError::MissingNode {
            context: "reference to a symbol that was never declared",
        })?;
        Ok((state, symbol))
    }

    fn read(&mut self, state: &State, symbol: &Symbol) -> CompileResult<IrArg> {
        if is_local(symbol) {
            let session = self.session;
            let fs = self.state()?;
            let value = fs.ssa.read_variable(session, &mut fs.func, state, fs.block)?;
            Ok(IrArg::Ref(value))
        } else {
            Ok(IrArg::Ref(self.emit(Opcode::Load, vec![IrArg::State(state.clone())])?))
        }
    }

    fn gen_expr(&mut self, expr: &'a Expr<'a>) -> CompileResult<IrArg> {
        match expr.kind {
            ExprKind::Literal(lit) => literal_arg(&lit),
            ExprKind::Grouping(inner) => self.gen_expr(inner),
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.gen_expr(lhs)?;
                let r = self.gen_expr(rhs)?;
                Ok(IrArg::Ref(self.emit(binary_opcode(op), vec![l, r])?))
            }
            ExprKind::Unary { op, operand } => {
                let value = self.gen_expr(operand)?;
                let opcode = match op {
                    UnaryOp::Neg => Opcode::Neg,
                    UnaryOp::Not => Opcode::Not,
                    UnaryOp::BitNot => Opcode::BNot,
                };
                Ok(IrArg::Ref(self.emit(opcode, vec![value])?))
            }
            ExprKind::Assign { target, op, value } => {
                let ExprKind::Call(chain) = target.kind else {
                    return Err(CompileError::MissingNode {
                        context: "assignment target is not a reference",
                    });
                };
                let (state, symbol) = self.reference(&chain)?;
                let mut value = self.gen_expr(value)?;
                if let Some(bop) = op.binary() {
                    let current = self.read(&state, symbol)?;
                    value = IrArg::Ref(self.emit(binary_opcode(bop), vec![current, value])?);
                }
                if is_local(symbol) {
                    Ok(IrArg::Ref(self.define_local(&state, value)?))
                } else {
                    self.emit(Opcode::Dfe, vec![IrArg::State(state), value.clone()])?;
                    Ok(value)
                }
            }
            ExprKind::Call(chain) => {
                let (state, symbol) = self.reference(&chain)?;
                match chain.last().and_then(|s| s.args) {
                    Some(args) => {
                        for arg in args {
                            let value = self.gen_expr(arg)?;
                            let opcode = if value.is_immediate() {
                                Opcode::LdArgDir
                            } else {
                                Opcode::LoadArg
                            };
                            self.emit(opcode, vec![value])?;
                        }
                        let call = self.emit(
                            Opcode::Call,
                            vec![IrArg::State(state), IrArg::Int(args.len() as i32)],
                        )?;
                        Ok(IrArg::Ref(call))
                    }
                    None => self.read(&state, symbol),
                }
            }
        }
    }
}

fn block_label(function: &State, idx: usize) -> State {
    function.with(AddressFrame::new(format!("$b{idx}"), AddressKind::Block))
}

/// Locals and parameters live in SSA values; everything else in memory.
fn is_local(symbol: &Symbol) -> bool {
    symbol.kind == AddressKind::VariableStatement || symbol.param_index.is_some()
}

fn comparison<'a>(cond: &'a Expr<'a>) -> Option<(BinaryOp, &'a Expr<'a>, &'a Expr<'a>)> {
    match cond.kind {
        ExprKind::Grouping(inner) => comparison(inner),
        ExprKind::Binary { op, lhs, rhs } if op.negated().is_some() => Some((op, lhs, rhs)),
        _ => None,
    }
}

fn jump_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Eq => Opcode::Je,
        BinaryOp::Ne => Opcode::Jne,
        BinaryOp::Lt => Opcode::Jl,
        BinaryOp::Le => Opcode::Jle,
        BinaryOp::Gt => Opcode::Jg,
        _ => Opcode::Jge,
    }
}

fn binary_opcode(op: BinaryOp) -> Opcode {
    match op {
        BinaryOp::Add => Opcode::Add,
        BinaryOp::Sub => Opcode::Sub,
        BinaryOp::Mul => Opcode::Mul,
        BinaryOp::Div => Opcode::Div,
        BinaryOp::Mod => Opcode::Mod,
        BinaryOp::BitAnd => Opcode::And,
        BinaryOp::BitOr => Opcode::Or,
        BinaryOp::BitXor => Opcode::Xor,
        BinaryOp::Shl => Opcode::Shl,
        BinaryOp::Shr => Opcode::Shr,
        BinaryOp::And => Opcode::LAnd,
        BinaryOp::Or => Opcode::LOr,
        BinaryOp::Eq => Opcode::Eq,
        BinaryOp::Ne => Opcode::Ne,
        BinaryOp::Lt => Opcode::Lt,
        BinaryOp::Le => Opcode::Le,
        BinaryOp::Gt => Opcode::Gt,
        BinaryOp::Ge => Opcode::Ge,
    }
}

/// Immediate operand for a literal.
fn literal_arg(lit: &Literal<'_>) -> CompileResult<IrArg> {
    Ok(match *lit {
        Literal::Bool(v) => IrArg::Bool(v),
        Literal::Int(v) => IrArg::Int(v),
        Literal::Long(v) => IrArg::Long(v),
        Literal::Short(v) => IrArg::Short(v),
        Literal::Byte(v) => IrArg::Byte(v),
        Literal::Float(v) => IrArg::Float(v),
        Literal::Double(v) => IrArg::Double(v),
        Literal::Char(v) => IrArg::Char(v),
        Literal::Str(v) => IrArg::Str(v.to_string()),
        Literal::Null => IrArg::Null,
        Literal::Number { text, base, suffix } => {
            let value = evaluate_number(text, base, suffix).map_err(|_| CompileError::MissingNode {
                context: "numeric literal that does not evaluate",
            })?;
            return literal_arg(&value);
        }
    })
}
