//! calyx_ast
//!
//! Source AST for the Calyx language.
//!
//! This crate defines the tree the parser produces and the checker consumes:
//! expressions, statements, argument forms, function bodies, and unresolved
//! type signatures, all carrying source spans. There is no parser here; the
//! checker's drivers and the test suites construct these nodes directly.

pub mod ast;
pub mod span;

// Re-exports
pub use ast::{
    Arg, ArithOp, BlockStmt, CmpOp, CondBranch, Expr, FunctionBody, LambdaParam, LambdaSig,
    LogicOp, ParamSig, PostfixOp, PostfixOpKind, PrefixOpKind, RecordEntrySig, Stmt,
    TupleEntrySig, TypeSignature,
};
pub use span::Span;
