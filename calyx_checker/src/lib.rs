// Prevent accidental debug output in library code.
#![deny(clippy::print_stderr)]

//! calyx_checker
//!
//! Flow-sensitive type checker and IR lowerer for the Calyx language.
//!
//! The crate is organized bottom-up:
//!
//! - `types`: resolved types as normalized unions of atoms, plus the
//!   structural operators (load / project / update / append / merge).
//! - `assembly`: the resolved declaration database - namespaces, entities,
//!   concepts, member lookup with root computation, template-bind
//!   resolution, and type normalization.
//! - `ir`: the opcode model, the basic-block body emitter, and the output
//!   assembly the checker registers compiled bodies into.
//! - `check`: the checker core - environments with multi-flow splitting,
//!   the argument resolver, the expression/statement checkers, and the
//!   per-declaration drivers.

pub mod assembly;
pub mod check;
pub mod error;
pub mod ir;
pub mod types;

pub use calyx_ast as ast;
pub use calyx_ast::Span;

pub use assembly::Assembly;
pub use check::Checker;
pub use error::{CheckError, CheckErrorKind, CheckResult};
pub use ir::program::IrAssembly;
pub use types::{ResolvedType, TypeAtom};
