//! Convenience constructors for syntax trees.
//!
//! Used by tests and the trace binary in place of the external parser. Every
//! node gets a fresh, increasing source offset so anonymous scopes stay unique.

use super::*;
use std::cell::Cell;

pub struct TreeBuilder<'s, 'a> {
    session: &'s CompilationSession<'a>,
    next_offset: Cell<usize>,
}

impl<'s, 'a> TreeBuilder<'s, 'a> {
    pub fn new(session: &'s CompilationSession<'a>) -> Self {
        Self {
            session,
            next_offset: Cell::new(0),
        }
    }

    fn offset(&self) -> usize {
        let offset = self.next_offset.get();
        self.next_offset.set(offset + 1);
        offset
    }

    fn name(&self, s: &str) -> &'a str {
        self.session.intern_str(s)
    }

    fn path(&self, dotted: &str) -> Path<'a> {
        let names: Vec<&'a str> = dotted.split('.').map(|n| self.name(n)).collect();
        self.session.alloc_vec(names)
    }

    // ---- types ----

    pub fn prim(&self, p: PrimitiveType) -> DataType<'a> {
        DataType::Primitive(p)
    }

    pub fn int_ty(&self) -> DataType<'a> {
        DataType::Primitive(PrimitiveType::Int)
    }

    pub fn bool_ty(&self) -> DataType<'a> {
        DataType::Primitive(PrimitiveType::Bool)
    }

    pub fn named(&self, dotted: &str) -> DataType<'a> {
        DataType::Named(self.path(dotted))
    }

    // ---- declarations ----

    pub fn library(&self, name: &str, body: Vec<Decl<'a>>) -> Decl<'a> {
        Decl {
            offset: self.offset(),
            kind: DeclKind::Library(LibraryDecl {
                name: self.name(name),
                body: self.session.alloc_vec(body),
            }),
        }
    }

    pub fn using(&self, dotted: &str) -> Decl<'a> {
        Decl {
            offset: self.offset(),
            kind: DeclKind::Using(UsingDecl {
                path: self.path(dotted),
                resolved: None,
            }),
        }
    }

    fn type_decl(
        &self,
        kind: TypeDeclKind,
        name: &str,
        parent: Option<&str>,
        body: Vec<Decl<'a>>,
    ) -> Decl<'a> {
        Decl {
            offset: self.offset(),
            kind: DeclKind::Type(TypeDecl {
                kind,
                name: self.name(name),
                modifiers: DeclModifiers::default(),
                parent: parent.map(|p| self.path(p)),
                resolved_parent: None,
                aliased: None,
                body: self.session.alloc_vec(body),
            }),
        }
    }

    pub fn data(&self, name: &str, parent: Option<&str>, body: Vec<Decl<'a>>) -> Decl<'a> {
        self.type_decl(TypeDeclKind::Data, name, parent, body)
    }

    pub fn system(&self, name: &str, parent: Option<&str>, body: Vec<Decl<'a>>) -> Decl<'a> {
        self.type_decl(TypeDeclKind::System, name, parent, body)
    }

    pub fn alias(&self, name: &str, target: DataType<'a>) -> Decl<'a> {
        let mut decl = self.type_decl(TypeDeclKind::Alias, name, None, Vec::new());
        if let DeclKind::Type(t) = &mut decl.kind {
            t.aliased = Some(target);
        }
        decl
    }

    pub fn param(&self, name: &str, ty: DataType<'a>) -> Param<'a> {
        Param {
            offset: self.offset(),
            name: self.name(name),
            ty,
        }
    }

    pub fn function(
        &self,
        name: &str,
        params: Vec<Param<'a>>,
        return_type: Option<DataType<'a>>,
        body: Vec<Stmt<'a>>,
    ) -> Decl<'a> {
        Decl {
            offset: self.offset(),
            kind: DeclKind::Function(FunctionDecl {
                name: self.name(name),
                modifiers: DeclModifiers::default(),
                params: self.session.alloc_vec(params),
                return_type,
                body: self.session.alloc_vec(body),
            }),
        }
    }

    fn variable_decl(
        &self,
        name: &str,
        ty: Option<DataType<'a>>,
        init: Option<&'a Expr<'a>>,
    ) -> VariableDecl<'a> {
        VariableDecl {
            name: self.name(name),
            modifiers: DeclModifiers::default(),
            ty,
            init,
        }
    }

    pub fn var(&self, name: &str, ty: Option<DataType<'a>>, init: Option<&'a Expr<'a>>) -> Decl<'a> {
        Decl {
            offset: self.offset(),
            kind: DeclKind::Variable(self.variable_decl(name, ty, init)),
        }
    }

    /// Set the access modifier of a type, function or variable declaration.
    pub fn with_access(&self, mut decl: Decl<'a>, access: AccessModifier) -> Decl<'a> {
        match &mut decl.kind {
            DeclKind::Type(t) => t.modifiers.access = Some(access),
            DeclKind::Function(f) => f.modifiers.access = Some(access),
            DeclKind::Variable(v) => v.modifiers.access = Some(access),
            DeclKind::Library(_) | DeclKind::Using(_) => {}
        }
        decl
    }

    // ---- statements ----

    pub fn local(&self, name: &str, ty: Option<DataType<'a>>, init: Option<&'a Expr<'a>>) -> Stmt<'a> {
        Stmt {
            offset: self.offset(),
            kind: StmtKind::Variable(self.variable_decl(name, ty, init)),
        }
    }

    pub fn expr_stmt(&self, expr: &'a Expr<'a>) -> Stmt<'a> {
        Stmt {
            offset: self.offset(),
            kind: StmtKind::Expression(expr),
        }
    }

    /// `target = value;` as a statement.
    pub fn set(&self, target: &str, value: &'a Expr<'a>) -> Stmt<'a> {
        let target = self.reference(target);
        self.expr_stmt(self.assign(target, value))
    }

    pub fn block(&self, body: Vec<Stmt<'a>>) -> Stmt<'a> {
        Stmt {
            offset: self.offset(),
            kind: StmtKind::Block(self.session.alloc_vec(body)),
        }
    }

    pub fn if_(
        &self,
        branches: Vec<(&'a Expr<'a>, Vec<Stmt<'a>>)>,
        else_body: Option<Vec<Stmt<'a>>>,
    ) -> Stmt<'a> {
        let branches: Vec<CondBranch<'a>> = branches
            .into_iter()
            .map(|(cond, body)| CondBranch {
                offset: self.offset(),
                cond,
                body: self.session.alloc_vec(body),
            })
            .collect();
        Stmt {
            offset: self.offset(),
            kind: StmtKind::If {
                branches: self.session.alloc_vec(branches),
                else_body: else_body.map(|b| self.session.alloc_vec(b)),
            },
        }
    }

    pub fn while_(&self, cond: &'a Expr<'a>, body: Vec<Stmt<'a>>) -> Stmt<'a> {
        Stmt {
            offset: self.offset(),
            kind: StmtKind::While {
                cond,
                body: self.session.alloc_vec(body),
            },
        }
    }

    pub fn do_while(&self, body: Vec<Stmt<'a>>, cond: &'a Expr<'a>) -> Stmt<'a> {
        Stmt {
            offset: self.offset(),
            kind: StmtKind::DoWhile {
                body: self.session.alloc_vec(body),
                cond,
            },
        }
    }

    pub fn for_(
        &self,
        init: Option<Stmt<'a>>,
        cond: Option<&'a Expr<'a>>,
        step: Option<&'a Expr<'a>>,
        body: Vec<Stmt<'a>>,
    ) -> Stmt<'a> {
        Stmt {
            offset: self.offset(),
            kind: StmtKind::For {
                init: init.map(|s| self.session.alloc(s)),
                cond,
                step,
                body: self.session.alloc_vec(body),
            },
        }
    }

    pub fn switch(
        &self,
        subject: &'a Expr<'a>,
        cases: Vec<(&'a Expr<'a>, Vec<Stmt<'a>>)>,
        default: Option<Vec<Stmt<'a>>>,
    ) -> Stmt<'a> {
        let cases: Vec<SwitchCase<'a>> = cases
            .into_iter()
            .map(|(value, body)| SwitchCase {
                offset: self.offset(),
                value,
                body: self.session.alloc_vec(body),
            })
            .collect();
        Stmt {
            offset: self.offset(),
            kind: StmtKind::Switch {
                subject,
                cases: self.session.alloc_vec(cases),
                default: default.map(|b| self.session.alloc_vec(b)),
            },
        }
    }

    pub fn ret(&self, value: Option<&'a Expr<'a>>) -> Stmt<'a> {
        Stmt {
            offset: self.offset(),
            kind: StmtKind::Return(value),
        }
    }

    // ---- expressions ----

    fn expr(&self, kind: ExprKind<'a>) -> &'a Expr<'a> {
        self.session.alloc(Expr::new(self.offset(), kind))
    }

    pub fn lit(&self, literal: Literal<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::Literal(literal))
    }

    pub fn int(&self, value: i32) -> &'a Expr<'a> {
        self.lit(Literal::Int(value))
    }

    pub fn boolean(&self, value: bool) -> &'a Expr<'a> {
        self.lit(Literal::Bool(value))
    }

    pub fn string(&self, value: &str) -> &'a Expr<'a> {
        self.lit(Literal::Str(self.name(value)))
    }

    pub fn null(&self) -> &'a Expr<'a> {
        self.lit(Literal::Null)
    }

    /// Raw numeric literal in the given base.
    pub fn number(&self, text: &str, base: u32, suffix: NumberSuffix) -> &'a Expr<'a> {
        self.lit(Literal::Number {
            text: self.name(text),
            base,
            suffix,
        })
    }

    fn segment(&self, name: &str, args: Option<&'a [Expr<'a>]>) -> CallSegment<'a> {
        CallSegment {
            offset: self.offset(),
            name: self.name(name),
            args,
            resolved: None,
        }
    }

    /// Dotted identifier reference, e.g. `B.x`.
    pub fn reference(&self, dotted: &str) -> &'a Expr<'a> {
        let segments: Vec<CallSegment<'a>> =
            dotted.split('.').map(|n| self.segment(n, None)).collect();
        self.expr(ExprKind::Call(CallChain {
            segments: self.session.alloc_vec(segments),
        }))
    }

    /// Function call; `dotted` may qualify the callee (`lib.f`).
    pub fn call(&self, dotted: &str, args: Vec<Expr<'a>>) -> &'a Expr<'a> {
        let args = self.session.alloc_vec(args);
        let names: Vec<&str> = dotted.split('.').collect();
        let last = names.len() - 1;
        let segments: Vec<CallSegment<'a>> = names
            .iter()
            .enumerate()
            .map(|(idx, n)| self.segment(n, if idx == last { Some(args) } else { None }))
            .collect();
        self.expr(ExprKind::Call(CallChain {
            segments: self.session.alloc_vec(segments),
        }))
    }

    pub fn binary(&self, op: BinaryOp, lhs: &'a Expr<'a>, rhs: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::Binary { op, lhs, rhs })
    }

    pub fn unary(&self, op: UnaryOp, operand: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::Unary { op, operand })
    }

    pub fn assign(&self, target: &'a Expr<'a>, value: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::Assign {
            target,
            op: AssignOp::Assign,
            value,
        })
    }

    pub fn compound(&self, op: AssignOp, target: &'a Expr<'a>, value: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::Assign { target, op, value })
    }

    pub fn group(&self, inner: &'a Expr<'a>) -> &'a Expr<'a> {
        self.expr(ExprKind::Grouping(inner))
    }
}
