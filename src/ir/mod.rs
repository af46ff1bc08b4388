// This module defines the intermediate representation produced by the generator. A
// function owns a flat, index-addressed statement arena: an IrRef is the position of a
// statement in that arena and doubles as the SSA value the statement defines. Basic
// blocks only hold the refs of their phis and ordinary statements, so phis, their
// operands and their users refer to each other by index and never form ownership
// cycles. Removing a trivial phi leaves a REROUTE tombstone in its slot that points at
// the surviving value; readers resolve through tombstones until decoding drops them.

//! SSA intermediate representation.

pub mod decode;
pub mod generator;
pub mod ssa;

pub use decode::DecodedFunction;
pub use generator::IrGenerator;
pub use ssa::SsaBuilder;

use crate::core::error::{CompileError, CompileResult};
use crate::state::State;
use hashbrown::HashMap;
use std::collections::BTreeSet;
use std::fmt;

/// Instruction number inside one function (or the global statement list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IrRef(pub u32);

impl IrRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for IrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // structural
    Label,
    Lib,
    Func,
    Use,
    // data movement
    Load,
    LoadArg,
    LoadParam,
    LdArgDir,
    Def,
    Dfe,
    // control
    Jmp,
    Jt,
    Jf,
    Je,
    Jne,
    Jl,
    Jle,
    Jg,
    Jge,
    Call,
    Ret,
    Retn,
    // arithmetic and logic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    LAnd,
    LOr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Neg,
    Not,
    BNot,
    // SSA bookkeeping
    Phi,
    Reroute,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        use Opcode::*;
        match self {
            Label => "LABEL",
            Lib => "LIB",
            Func => "FUNC",
            Use => "USE",
            Load => "LOAD",
            LoadArg => "LOADARG",
            LoadParam => "LOADPARAM",
            LdArgDir => "LDARGDIR",
            Def => "DEF",
            Dfe => "DFE",
            Jmp => "JMP",
            Jt => "JT",
            Jf => "JF",
            Je => "JE",
            Jne => "JNE",
            Jl => "JL",
            Jle => "JLE",
            Jg => "JG",
            Jge => "JGE",
            Call => "CALL",
            Ret => "RET",
            Retn => "RETN",
            Add => "ADD",
            Sub => "SUB",
            Mul => "MUL",
            Div => "DIV",
            Mod => "MOD",
            And => "AND",
            Or => "OR",
            Xor => "XOR",
            Shl => "SHL",
            Shr => "SHR",
            LAnd => "LAND",
            LOr => "LOR",
            Eq => "EQ",
            Ne => "NE",
            Lt => "LT",
            Le => "LE",
            Gt => "GT",
            Ge => "GE",
            Neg => "NEG",
            Not => "NOT",
            BNot => "BNOT",
            Phi => "PHI",
            Reroute => "REROUTE",
        }
    }

    pub fn is_jump(self) -> bool {
        use Opcode::*;
        matches!(self, Jmp | Jt | Jf | Je | Jne | Jl | Jle | Jg | Jge)
    }

    /// Control never falls through a terminator.
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Jmp | Opcode::Ret | Opcode::Retn)
    }
}

/// Phi operand bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct IrPhi {
    pub block: BlockId,
    /// One operand per predecessor, in predecessor order.
    pub operands: Vec<IrRef>,
    /// Statements (ordinary or phi) that reference this phi.
    pub users: BTreeSet<IrRef>,
}

/// Statement operand.
#[derive(Debug, Clone, PartialEq)]
pub enum IrArg {
    Bool(bool),
    Int(i32),
    Long(i64),
    Short(i16),
    Byte(u8),
    Float(f32),
    Double(f64),
    Char(char),
    Str(String),
    Null,
    State(State),
    Ref(IrRef),
    Block(BlockId),
    Phi(IrPhi),
}

impl IrArg {
    pub fn as_ref(&self) -> Option<IrRef> {
        match self {
            IrArg::Ref(r) => Some(*r),
            _ => None,
        }
    }

    /// Literal operands that can be encoded directly into an instruction.
    pub fn is_immediate(&self) -> bool {
        !matches!(
            self,
            IrArg::State(_) | IrArg::Ref(_) | IrArg::Block(_) | IrArg::Phi(_)
        )
    }
}

impl fmt::Display for IrArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrArg::Bool(v) => write!(f, "{v}"),
            IrArg::Int(v) => write!(f, "{v}"),
            IrArg::Long(v) => write!(f, "{v}L"),
            IrArg::Short(v) => write!(f, "{v}S"),
            IrArg::Byte(v) => write!(f, "{v}B"),
            IrArg::Float(v) => write!(f, "{v}F"),
            IrArg::Double(v) => write!(f, "{v}D"),
            IrArg::Char(v) => write!(f, "{v:?}"),
            IrArg::Str(v) => write!(f, "{v:?}"),
            IrArg::Null => write!(f, "null"),
            IrArg::State(s) => write!(f, "{s}"),
            IrArg::Ref(r) => write!(f, "{r}"),
            IrArg::Block(b) => write!(f, "{b}"),
            IrArg::Phi(phi) => {
                write!(f, "[")?;
                for (idx, op) in phi.operands.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{op}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrStatement {
    pub number: IrRef,
    pub opcode: Opcode,
    pub args: Vec<IrArg>,
}

impl IrStatement {
    pub fn new(number: IrRef, opcode: Opcode, args: Vec<IrArg>) -> Self {
        Self { number, opcode, args }
    }

    /// Every value this statement reads, phi operands included.
    pub fn uses(&self) -> impl Iterator<Item = IrRef> + '_ {
        self.args.iter().flat_map(|arg| {
            let refs: Vec<IrRef> = match arg {
                IrArg::Ref(r) => vec![*r],
                IrArg::Phi(phi) => phi.operands.clone(),
                _ => Vec::new(),
            };
            refs
        })
    }

    pub fn phi(&self) -> Option<&IrPhi> {
        match (self.opcode, self.args.first()) {
            (Opcode::Phi, Some(IrArg::Phi(phi))) => Some(phi),
            _ => None,
        }
    }

    pub fn phi_mut(&mut self) -> Option<&mut IrPhi> {
        match (self.opcode, self.args.first_mut()) {
            (Opcode::Phi, Some(IrArg::Phi(phi))) => Some(phi),
            _ => None,
        }
    }
}

impl fmt::Display for IrStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}: {}", self.number, self.opcode.mnemonic())?;
        for (idx, arg) in self.args.iter().enumerate() {
            write!(f, "{}{arg}", if idx == 0 { " " } else { ", " })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrBlock {
    pub id: BlockId,
    pub label: State,
    pub preds: Vec<BlockId>,
    pub phis: Vec<IrRef>,
    pub stmts: Vec<IrRef>,
}

/// Ordered generator actions, kept for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenEvent {
    Jump { from: BlockId, to: BlockId },
    Seal(BlockId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: State,
    stmts: Vec<IrStatement>,
    blocks: Vec<IrBlock>,
    events: Vec<GenEvent>,
}

impl IrFunction {
    pub fn new(name: State) -> Self {
        Self {
            name,
            stmts: Vec::new(),
            blocks: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.blocks.first().map(|b| b.id)
    }

    pub fn add_block(&mut self, label: State) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(IrBlock {
            id,
            label,
            preds: Vec::new(),
            phis: Vec::new(),
            stmts: Vec::new(),
        });
        id
    }

    pub fn blocks(&self) -> &[IrBlock] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> CompileResult<&IrBlock> {
        self.blocks.get(id.index()).ok_or_else(|| CompileError::UnknownBlock {
            block: id.to_string(),
        })
    }

    pub fn block_mut(&mut self, id: BlockId) -> CompileResult<&mut IrBlock> {
        self.blocks.get_mut(id.index()).ok_or_else(|| CompileError::UnknownBlock {
            block: id.to_string(),
        })
    }

    pub fn statements(&self) -> &[IrStatement] {
        &self.stmts
    }

    pub fn statement(&self, r: IrRef) -> CompileResult<&IrStatement> {
        self.stmts.get(r.index()).ok_or_else(|| CompileError::MalformedSsa {
            reason: format!("dangling reference {r}"),
        })
    }

    pub fn statement_mut(&mut self, r: IrRef) -> CompileResult<&mut IrStatement> {
        self.stmts.get_mut(r.index()).ok_or_else(|| CompileError::MalformedSsa {
            reason: format!("dangling reference {r}"),
        })
    }

    fn next_ref(&self) -> IrRef {
        IrRef(self.stmts.len() as u32)
    }

    /// Append an ordinary statement to `block`. Operands are resolved through
    /// tombstones and registered as users of the phis they read.
    pub fn push(&mut self, block: BlockId, opcode: Opcode, args: Vec<IrArg>) -> CompileResult<IrRef> {
        let number = self.next_ref();
        let mut resolved = Vec::with_capacity(args.len());
        for arg in args {
            resolved.push(match arg {
                IrArg::Ref(r) => IrArg::Ref(self.resolve(r)?),
                other => other,
            });
        }
        for used in resolved.iter().filter_map(IrArg::as_ref) {
            if let Some(phi) = self.statement_mut(used)?.phi_mut() {
                phi.users.insert(number);
            }
        }
        self.block_mut(block)?.stmts.push(number);
        self.stmts.push(IrStatement::new(number, opcode, resolved));
        Ok(number)
    }

    /// Create an operand-less phi at the head of `block`.
    pub fn push_phi(&mut self, block: BlockId) -> CompileResult<IrRef> {
        let number = self.next_ref();
        self.block_mut(block)?.phis.push(number);
        self.stmts.push(IrStatement::new(
            number,
            Opcode::Phi,
            vec![IrArg::Phi(IrPhi {
                block,
                operands: Vec::new(),
                users: BTreeSet::new(),
            })],
        ));
        Ok(number)
    }

    /// Follow REROUTE tombstones to the live value.
    pub fn resolve(&self, mut r: IrRef) -> CompileResult<IrRef> {
        for _ in 0..=self.stmts.len() {
            let stmt = self.statement(r)?;
            if stmt.opcode != Opcode::Reroute {
                return Ok(r);
            }
            r = stmt.args.first().and_then(IrArg::as_ref).ok_or_else(|| {
                CompileError::MalformedSsa {
                    reason: format!("reroute {r} without target"),
                }
            })?;
        }
        Err(CompileError::MalformedSsa {
            reason: format!("reroute cycle through {r}"),
        })
    }

    pub fn add_edge(&mut self, from: BlockId, to: BlockId) -> CompileResult<()> {
        self.block(from)?;
        self.block_mut(to)?.preds.push(from);
        self.events.push(GenEvent::Jump { from, to });
        Ok(())
    }

    pub fn record_seal(&mut self, block: BlockId) {
        self.events.push(GenEvent::Seal(block));
    }

    pub fn events(&self) -> &[GenEvent] {
        &self.events
    }

    /// Refs of every live phi, block by block.
    pub fn live_phis(&self) -> impl Iterator<Item = &IrStatement> + '_ {
        self.blocks
            .iter()
            .flat_map(|b| b.phis.iter())
            .filter_map(|r| self.stmts.get(r.index()))
            .filter(|s| s.opcode == Opcode::Phi)
    }

    /// Last statement of `block`, if any.
    pub fn last_in(&self, block: BlockId) -> Option<&IrStatement> {
        let r = self.blocks.get(block.index())?.stmts.last()?;
        self.stmts.get(r.index())
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function {}:", self.name)?;
        for block in &self.blocks {
            write!(f, "  {} ({})", block.id, block.label)?;
            if !block.preds.is_empty() {
                let preds: Vec<String> = block.preds.iter().map(|p| p.to_string()).collect();
                write!(f, " <- {}", preds.join(", "))?;
            }
            writeln!(f)?;
            for r in block.phis.iter().chain(block.stmts.iter()) {
                if let Some(stmt) = self.stmts.get(r.index()) {
                    if stmt.opcode != Opcode::Reroute {
                        writeln!(f, "    {stmt}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Generated code for a whole compilation.
#[derive(Debug, Clone, Default)]
pub struct IrProgram {
    pub globals: Vec<IrStatement>,
    pub functions: HashMap<State, IrFunction>,
    /// Function names in generation order.
    pub order: Vec<State>,
}

impl IrProgram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_global(&mut self, opcode: Opcode, args: Vec<IrArg>) -> IrRef {
        let number = IrRef(self.globals.len() as u32);
        self.globals.push(IrStatement::new(number, opcode, args));
        number
    }

    pub fn add_function(&mut self, function: IrFunction) {
        if !self.functions.contains_key(&function.name) {
            self.order.push(function.name.clone());
        }
        self.functions.insert(function.name.clone(), function);
    }

    pub fn function(&self, name: &State) -> CompileResult<&IrFunction> {
        self.functions.get(name).ok_or_else(|| CompileError::UnknownFunction {
            name: name.to_string(),
        })
    }

    /// Functions in generation order.
    pub fn iter(&self) -> impl Iterator<Item = &IrFunction> + '_ {
        self.order.iter().filter_map(|name| self.functions.get(name))
    }
}

impl fmt::Display for IrProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "globals:")?;
        for stmt in &self.globals {
            writeln!(f, "  {stmt}")?;
        }
        for function in self.iter() {
            write!(f, "{function}")?;
        }
        Ok(())
    }
}
