// This module defines the syntax tree consumed by the middle end. The parser that
// produces it lives outside this crate; what matters here is the closed set of node
// kinds, modelled as sum types per category (declarations, statements, expressions,
// call chains) so every pass matches exhaustively. All nodes are allocated in the
// compilation session's bump arena and hold only references and Copy data. Passes
// never mutate a node: they build a new one next to it and reuse every child that did
// not change, so the tree handed to the second analysis pass shares most of its
// structure with the first.

//! Arena-allocated syntax tree.

pub mod builder;

use crate::core::session::CompilationSession;
use crate::state::{AddressFrame, AddressKind, State};
use crate::symbols::{AccessModifier, Modifiers};

pub use builder::TreeBuilder;

/// Dotted name as written in the source, or a resolved qualified address.
pub type Path<'a> = &'a [&'a str];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Bool,
    Int,
    Long,
    Short,
    Byte,
    Float,
    Double,
    Char,
    String,
    Void,
}

impl PrimitiveType {
    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveType::Bool => "bool",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Short => "short",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
            PrimitiveType::Char => "char",
            PrimitiveType::String => "string",
            PrimitiveType::Void => "void",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => PrimitiveType::Bool,
            "int" => PrimitiveType::Int,
            "long" => PrimitiveType::Long,
            "short" => PrimitiveType::Short,
            "byte" => PrimitiveType::Byte,
            "float" => PrimitiveType::Float,
            "double" => PrimitiveType::Double,
            "char" => PrimitiveType::Char,
            "string" => PrimitiveType::String,
            "void" => PrimitiveType::Void,
            _ => return None,
        })
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            PrimitiveType::Int
                | PrimitiveType::Long
                | PrimitiveType::Short
                | PrimitiveType::Byte
                | PrimitiveType::Float
                | PrimitiveType::Double
        )
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            PrimitiveType::Int | PrimitiveType::Long | PrimitiveType::Short | PrimitiveType::Byte
        )
    }
}

/// Type attached to declarations and (after analysis) to expressions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataType<'a> {
    Primitive(PrimitiveType),
    Null,
    Named(Path<'a>),
}

impl<'a> DataType<'a> {
    /// Owned qualified form stored on symbols.
    pub fn to_state(&self) -> State {
        match self {
            DataType::Primitive(p) => State::from_names([p.as_str()], AddressKind::SystemType),
            DataType::Null => State::from_names(["null"], AddressKind::SystemType),
            DataType::Named(path) => State::from_names(path.iter().copied(), AddressKind::DataType),
        }
    }

    pub fn from_state(session: &CompilationSession<'a>, state: &State) -> DataType<'a> {
        if state.len() == 1 {
            if let Some(name) = state.name() {
                if name == "null" {
                    return DataType::Null;
                }
                if let Some(p) = PrimitiveType::from_name(name) {
                    return DataType::Primitive(p);
                }
            }
        }
        DataType::Named(state_to_path(session, state))
    }

    pub fn primitive(&self) -> Option<PrimitiveType> {
        match self {
            DataType::Primitive(p) => Some(*p),
            _ => None,
        }
    }
}

/// Copy a qualified address into the arena.
pub fn state_to_path<'a>(session: &CompilationSession<'a>, state: &State) -> Path<'a> {
    let names: Vec<&'a str> = state
        .frames()
        .iter()
        .map(|f| session.intern_str(&f.name))
        .collect();
    session.alloc_vec(names)
}

pub fn path_to_state(path: Path<'_>, kind: AddressKind) -> State {
    State::from_names(path.iter().copied(), kind)
}

/// Anonymous body scopes. Every pass names them the same way, from the offset
/// of the node that opens them, so their tables can be found again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyScope {
    Block,
    If,
    Else,
    While,
    DoWhile,
    For,
    Case,
    Default,
}

impl BodyScope {
    pub fn prefix(self) -> &'static str {
        match self {
            BodyScope::Block => "block",
            BodyScope::If => "if",
            BodyScope::Else => "else",
            BodyScope::While => "while",
            BodyScope::DoWhile => "do",
            BodyScope::For => "for",
            BodyScope::Case => "case",
            BodyScope::Default => "default",
        }
    }

    pub fn frame(self, offset: usize) -> AddressFrame {
        AddressFrame::new(format!("${}:{offset}", self.prefix()), AddressKind::Block)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeclModifiers {
    pub access: Option<AccessModifier>,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy)]
pub struct Decl<'a> {
    pub offset: usize,
    pub kind: DeclKind<'a>,
}

#[derive(Debug, Clone, Copy)]
pub enum DeclKind<'a> {
    Library(LibraryDecl<'a>),
    Using(UsingDecl<'a>),
    Type(TypeDecl<'a>),
    Function(FunctionDecl<'a>),
    Variable(VariableDecl<'a>),
}

#[derive(Debug, Clone, Copy)]
pub struct LibraryDecl<'a> {
    pub name: &'a str,
    pub body: &'a [Decl<'a>],
}

#[derive(Debug, Clone, Copy)]
pub struct UsingDecl<'a> {
    pub path: Path<'a>,
    pub resolved: Option<Path<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeDeclKind {
    System,
    Data,
    Alias,
}

impl TypeDeclKind {
    pub fn address_kind(self) -> AddressKind {
        match self {
            TypeDeclKind::System => AddressKind::SystemType,
            TypeDeclKind::Data => AddressKind::DataType,
            TypeDeclKind::Alias => AddressKind::TypeAlias,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TypeDecl<'a> {
    pub kind: TypeDeclKind,
    pub name: &'a str,
    pub modifiers: DeclModifiers,
    /// Base type as written (`data B < A`).
    pub parent: Option<Path<'a>>,
    /// Base type's qualified address once analysed.
    pub resolved_parent: Option<Path<'a>>,
    /// Target of a type alias.
    pub aliased: Option<DataType<'a>>,
    pub body: &'a [Decl<'a>],
}

#[derive(Debug, Clone, Copy)]
pub struct Param<'a> {
    pub offset: usize,
    pub name: &'a str,
    pub ty: DataType<'a>,
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionDecl<'a> {
    pub name: &'a str,
    pub modifiers: DeclModifiers,
    pub params: &'a [Param<'a>],
    pub return_type: Option<DataType<'a>>,
    pub body: &'a [Stmt<'a>],
}

#[derive(Debug, Clone, Copy)]
pub struct VariableDecl<'a> {
    pub name: &'a str,
    pub modifiers: DeclModifiers,
    pub ty: Option<DataType<'a>>,
    pub init: Option<&'a Expr<'a>>,
}

#[derive(Debug, Clone, Copy)]
pub struct Stmt<'a> {
    pub offset: usize,
    pub kind: StmtKind<'a>,
}

#[derive(Debug, Clone, Copy)]
pub enum StmtKind<'a> {
    Block(&'a [Stmt<'a>]),
    Variable(VariableDecl<'a>),
    Expression(&'a Expr<'a>),
    If {
        branches: &'a [CondBranch<'a>],
        else_body: Option<&'a [Stmt<'a>]>,
    },
    While {
        cond: &'a Expr<'a>,
        body: &'a [Stmt<'a>],
    },
    DoWhile {
        body: &'a [Stmt<'a>],
        cond: &'a Expr<'a>,
    },
    For {
        init: Option<&'a Stmt<'a>>,
        cond: Option<&'a Expr<'a>>,
        step: Option<&'a Expr<'a>>,
        body: &'a [Stmt<'a>],
    },
    Switch {
        subject: &'a Expr<'a>,
        cases: &'a [SwitchCase<'a>],
        default: Option<&'a [Stmt<'a>]>,
    },
    Return(Option<&'a Expr<'a>>),
}

/// `if`/`elif` arm.
#[derive(Debug, Clone, Copy)]
pub struct CondBranch<'a> {
    pub offset: usize,
    pub cond: &'a Expr<'a>,
    pub body: &'a [Stmt<'a>],
}

#[derive(Debug, Clone, Copy)]
pub struct SwitchCase<'a> {
    pub offset: usize,
    pub value: &'a Expr<'a>,
    pub body: &'a [Stmt<'a>],
}

#[derive(Debug, Clone, Copy)]
pub struct Expr<'a> {
    pub offset: usize,
    pub kind: ExprKind<'a>,
    pub ty: Option<DataType<'a>>,
}

impl<'a> Expr<'a> {
    pub fn new(offset: usize, kind: ExprKind<'a>) -> Self {
        Self { offset, kind, ty: None }
    }

    pub fn literal(&self) -> Option<&Literal<'a>> {
        match &self.kind {
            ExprKind::Literal(lit) => Some(lit),
            ExprKind::Grouping(inner) => inner.literal(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ExprKind<'a> {
    Assign {
        target: &'a Expr<'a>,
        op: AssignOp,
        value: &'a Expr<'a>,
    },
    Binary {
        op: BinaryOp,
        lhs: &'a Expr<'a>,
        rhs: &'a Expr<'a>,
    },
    Unary {
        op: UnaryOp,
        operand: &'a Expr<'a>,
    },
    Call(CallChain<'a>),
    Literal(Literal<'a>),
    Grouping(&'a Expr<'a>),
}

/// Dotted reference such as `x`, `B.x` or `lib.f(1)`.
#[derive(Debug, Clone, Copy)]
pub struct CallChain<'a> {
    pub segments: &'a [CallSegment<'a>],
}

impl<'a> CallChain<'a> {
    pub fn last(&self) -> Option<&CallSegment<'a>> {
        self.segments.last()
    }

    /// Source spelling, e.g. `B.x`.
    pub fn spelling(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.name)
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CallSegment<'a> {
    pub offset: usize,
    pub name: &'a str,
    /// `Some` when the segment is a function call.
    pub args: Option<&'a [Expr<'a>]>,
    /// Qualified address of the symbol this segment names, once analysed.
    pub resolved: Option<Path<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberSuffix {
    None,
    Long,
    Short,
    Byte,
    Float,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal<'a> {
    Bool(bool),
    Int(i32),
    Long(i64),
    Short(i16),
    Byte(u8),
    Float(f32),
    Double(f64),
    Char(char),
    Str(&'a str),
    Null,
    /// Unevaluated numeric literal as scanned.
    Number {
        text: &'a str,
        base: u32,
        suffix: NumberSuffix,
    },
}

impl<'a> Literal<'a> {
    pub fn data_type(&self) -> Option<DataType<'a>> {
        Some(match self {
            Literal::Bool(_) => DataType::Primitive(PrimitiveType::Bool),
            Literal::Int(_) => DataType::Primitive(PrimitiveType::Int),
            Literal::Long(_) => DataType::Primitive(PrimitiveType::Long),
            Literal::Short(_) => DataType::Primitive(PrimitiveType::Short),
            Literal::Byte(_) => DataType::Primitive(PrimitiveType::Byte),
            Literal::Float(_) => DataType::Primitive(PrimitiveType::Float),
            Literal::Double(_) => DataType::Primitive(PrimitiveType::Double),
            Literal::Char(_) => DataType::Primitive(PrimitiveType::Char),
            Literal::Str(_) => DataType::Primitive(PrimitiveType::String),
            Literal::Null => DataType::Null,
            Literal::Number { .. } => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCategory {
    Arithmetic,
    Bitwise,
    Logical,
    Equality,
    Comparison,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn category(self) -> OperatorCategory {
        use BinaryOp::*;
        match self {
            Add | Sub | Mul | Div | Mod => OperatorCategory::Arithmetic,
            BitAnd | BitOr | BitXor | Shl | Shr => OperatorCategory::Bitwise,
            And | Or => OperatorCategory::Logical,
            Eq | Ne => OperatorCategory::Equality,
            Lt | Le | Gt | Ge => OperatorCategory::Comparison,
        }
    }

    pub fn symbol(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
            BitAnd => "&",
            BitOr => "|",
            BitXor => "^",
            Shl => "<<",
            Shr => ">>",
            And => "&&",
            Or => "||",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
        }
    }

    /// Predicate that holds exactly when `self` does not.
    pub fn negated(self) -> Option<BinaryOp> {
        use BinaryOp::*;
        Some(match self {
            Eq => Ne,
            Ne => Eq,
            Lt => Ge,
            Le => Gt,
            Gt => Le,
            Ge => Lt,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl AssignOp {
    /// Binary operator applied by a compound assignment.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
            AssignOp::Mod => Some(BinaryOp::Mod),
        }
    }
}
