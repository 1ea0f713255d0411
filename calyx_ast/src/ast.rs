//! AST node definitions for Calyx source programs.
//!
//! The tree mirrors the surface language: expressions with postfix chains,
//! statements with structured control flow, and unresolved type signatures
//! that the checker's assembly normalizes into resolved types.

use crate::span::Span;
use serde::{Deserialize, Serialize};

/// Unresolved type signature as written in source.
///
/// Signatures are resolved against the assembly (with the enclosing
/// template binds) to produce normalized resolved types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeSignature {
    /// `auto` - inferred from an initializer or the surrounding context.
    Auto(Span),
    /// A nominal reference: `NS::Name<T1, T2>`. Template names resolve here
    /// too (a one-segment name matching an in-scope term).
    Nominal {
        name: String,
        term_args: Vec<TypeSignature>,
        span: Span,
    },
    /// Tuple signature: `[Int, Bool?, ...]`.
    Tuple {
        entries: Vec<TupleEntrySig>,
        open: bool,
        span: Span,
    },
    /// Record signature: `{f: Int, g?: Bool, ...}`.
    Record {
        entries: Vec<RecordEntrySig>,
        open: bool,
        span: Span,
    },
    /// Function signature: `fn(x: Int, y?: Bool, ...r: List<Int>) -> Int`.
    Function {
        params: Vec<ParamSig>,
        rest: Option<Box<TypeSignature>>,
        result: Box<TypeSignature>,
        span: Span,
    },
    /// Union signature: `Int | None`.
    Union {
        options: Vec<TypeSignature>,
        span: Span,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleEntrySig {
    pub sig: TypeSignature,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntrySig {
    pub name: String,
    pub sig: TypeSignature,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSig {
    pub name: String,
    pub sig: TypeSignature,
    pub optional: bool,
}

impl TypeSignature {
    pub fn span(&self) -> Span {
        match self {
            Self::Auto(span) => *span,
            Self::Nominal { span, .. } => *span,
            Self::Tuple { span, .. } => *span,
            Self::Record { span, .. } => *span,
            Self::Function { span, .. } => *span,
            Self::Union { span, .. } => *span,
        }
    }

    /// Shorthand for a nominal signature with no template arguments.
    pub fn nominal(name: impl Into<String>, span: Span) -> Self {
        Self::Nominal {
            name: name.into(),
            term_args: Vec::new(),
            span,
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto(_))
    }
}

/// A single call-site argument.
///
/// `name` is set for `name=expr` arguments; `is_spread` for `...expr`
/// expansion arguments. A spread argument is never named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub name: Option<String>,
    pub is_spread: bool,
    pub expr: Expr,
    pub span: Span,
}

impl Arg {
    pub fn positional(expr: Expr) -> Self {
        let span = expr.span();
        Self {
            name: None,
            is_spread: false,
            expr,
            span,
        }
    }

    pub fn named(name: impl Into<String>, expr: Expr) -> Self {
        let span = expr.span();
        Self {
            name: Some(name.into()),
            is_spread: false,
            expr,
            span,
        }
    }

    pub fn spread(expr: Expr) -> Self {
        let span = expr.span();
        Self {
            name: None,
            is_spread: true,
            expr,
            span,
        }
    }
}

/// Lambda parameter: the signature is `None` when the lambda is declared
/// with an `auto` signature and takes its parameter types from context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaParam {
    pub name: String,
    pub sig: Option<TypeSignature>,
}

/// Lambda signature. When `auto` is true every parameter signature is
/// absent and the contextual expected type supplies them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaSig {
    pub auto: bool,
    pub params: Vec<LambdaParam>,
    pub result: Option<TypeSignature>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefixOpKind {
    Plus,
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
    Implies,
}

/// Expression in the source tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    LiteralNone(Span),
    LiteralBool(bool, Span),
    LiteralInt(i64, Span),
    LiteralString(String, Span),
    /// Typed string `T'...'`. The literal form yields `StringOf<T>`; the
    /// constructor form `T@'...'` routes through `T::tryParse`.
    LiteralTypedString {
        value: String,
        of: TypeSignature,
        constructor: bool,
        span: Span,
    },
    /// `NS::name` constant access.
    AccessNamespaceConst {
        namespace: String,
        name: String,
        span: Span,
    },
    /// `T::name` member-const access.
    AccessStaticConst {
        of: TypeSignature,
        name: String,
        span: Span,
    },
    AccessVariable {
        name: String,
        span: Span,
    },
    /// Tuple construction: `[e1, e2, ...]` (always closed).
    ConstructTuple {
        entries: Vec<Expr>,
        span: Span,
    },
    /// Record construction: `{f=e1, g=e2}` (always closed).
    ConstructRecord {
        entries: Vec<(String, Expr)>,
        span: Span,
    },
    /// Entity construction `T@{...}` or factory construction `T@factory{...}`.
    ConstructEntity {
        of: TypeSignature,
        factory: Option<String>,
        args: Vec<Arg>,
        span: Span,
    },
    /// Lambda construction. The capture set is computed by the parser.
    ConstructLambda {
        sig: LambdaSig,
        captured: Vec<String>,
        body: Box<FunctionBody>,
        span: Span,
    },
    CallNamespaceFunction {
        namespace: String,
        name: String,
        term_args: Vec<TypeSignature>,
        args: Vec<Arg>,
        span: Span,
    },
    CallStaticFunction {
        of: TypeSignature,
        name: String,
        term_args: Vec<TypeSignature>,
        args: Vec<Arg>,
        span: Span,
    },
    PrefixOp {
        op: PrefixOpKind,
        operand: Box<Expr>,
        span: Span,
    },
    BinArith {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    /// `==` / `!=`.
    BinEq {
        negated: bool,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    BinCmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    /// Short-circuit `&&`, `||` and the imply form `==>`.
    BinLogic {
        op: LogicOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    /// None-check short-circuit `lhs ?& rhs`: when the left side is Some
    /// the whole expression is None and the right side never runs.
    NoneCheck {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    /// Coalesce `lhs ?| rhs`: when the left side is Some it is the result,
    /// otherwise the right side runs.
    Coalesce {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    /// `cond ? tval : fval`.
    Select {
        cond: Box<Expr>,
        tval: Box<Expr>,
        fval: Box<Expr>,
        span: Span,
    },
    /// Postfix chain: `root op1 op2 ...`.
    Postfix {
        root: Box<Expr>,
        ops: Vec<PostfixOp>,
        span: Span,
    },
}

/// One operator in a postfix chain. `is_elvis` marks the `?.` form that
/// short-circuits the rest of the chain to None.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostfixOp {
    pub kind: PostfixOpKind,
    pub is_elvis: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PostfixOpKind {
    /// `.0` tuple entry access.
    AccessIndex(usize),
    /// `.f` property / field access.
    AccessName(String),
    /// `@[i, j]` tuple projection.
    ProjectIndices(Vec<usize>),
    /// `@{f, g}` record projection.
    ProjectNames(Vec<String>),
    /// `@#T` projection through a type pattern.
    ProjectType(TypeSignature),
    /// `<~[i=e, ...]` tuple update.
    ModifyIndices(Vec<(usize, Expr)>),
    /// `<~{f=e, ...}` record update.
    ModifyNames(Vec<(String, Expr)>),
    /// `<+(e)` structured extend with a tuple or record.
    Extend(Box<Expr>),
    /// `.m(...)` method / lambda-field invocation.
    Invoke {
        name: String,
        term_args: Vec<TypeSignature>,
        args: Vec<Arg>,
    },
    /// `(...)` call of a function-typed value.
    CallLambda { args: Vec<Arg> },
}

/// Statement in the source tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Empty(Span),
    /// `var x: T = e;` / `let x = e;` (`is_const` for `let`).
    VarDecl {
        name: String,
        is_const: bool,
        sig: TypeSignature,
        init: Option<Expr>,
        span: Span,
    },
    VarAssign {
        name: String,
        value: Expr,
        span: Span,
    },
    /// `if (...) { } elseif (...) { } else { }`.
    IfElse {
        branches: Vec<CondBranch>,
        else_body: Option<BlockStmt>,
        span: Span,
    },
    Return {
        value: Expr,
        span: Span,
    },
    Assert {
        cond: Expr,
        span: Span,
    },
    Check {
        cond: Expr,
        span: Span,
    },
    Block(BlockStmt),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondBranch {
    pub cond: Expr,
    pub body: BlockStmt,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockStmt {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

/// A declaration body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunctionBody {
    /// Raw pass-through body (builtin implementations); treated as opaque.
    Raw { code: String, span: Span },
    /// Single-expression body.
    Expr(Expr),
    /// Block body.
    Block(BlockStmt),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Self::LiteralNone(span) => *span,
            Self::LiteralBool(_, span) => *span,
            Self::LiteralInt(_, span) => *span,
            Self::LiteralString(_, span) => *span,
            Self::LiteralTypedString { span, .. } => *span,
            Self::AccessNamespaceConst { span, .. } => *span,
            Self::AccessStaticConst { span, .. } => *span,
            Self::AccessVariable { span, .. } => *span,
            Self::ConstructTuple { span, .. } => *span,
            Self::ConstructRecord { span, .. } => *span,
            Self::ConstructEntity { span, .. } => *span,
            Self::ConstructLambda { span, .. } => *span,
            Self::CallNamespaceFunction { span, .. } => *span,
            Self::CallStaticFunction { span, .. } => *span,
            Self::PrefixOp { span, .. } => *span,
            Self::BinArith { span, .. } => *span,
            Self::BinEq { span, .. } => *span,
            Self::BinCmp { span, .. } => *span,
            Self::BinLogic { span, .. } => *span,
            Self::NoneCheck { span, .. } => *span,
            Self::Coalesce { span, .. } => *span,
            Self::Select { span, .. } => *span,
            Self::Postfix { span, .. } => *span,
        }
    }

    /// The variable name when this is a plain variable access.
    /// Flow narrowing keys off this: only direct variable accesses narrow.
    pub fn as_variable_name(&self) -> Option<&str> {
        match self {
            Self::AccessVariable { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Self::Empty(span) => *span,
            Self::VarDecl { span, .. } => *span,
            Self::VarAssign { span, .. } => *span,
            Self::IfElse { span, .. } => *span,
            Self::Return { span, .. } => *span,
            Self::Assert { span, .. } => *span,
            Self::Check { span, .. } => *span,
            Self::Block(block) => block.span,
        }
    }
}

impl FunctionBody {
    pub fn span(&self) -> Span {
        match self {
            Self::Raw { span, .. } => *span,
            Self::Expr(expr) => expr.span(),
            Self::Block(block) => block.span,
        }
    }
}
