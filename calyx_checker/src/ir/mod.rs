//! IR model and emission.
//!
//! - `core`: opcode and basic-block definitions plus compiled bodies
//! - `body`: the append-only body emitter (register counter, block cursor)
//! - `program`: the output assembly - registered types, calls, lambdas,
//!   compiled bodies, pending-processing queues, and key generators

pub mod body;
pub mod core;
pub mod program;

pub use body::BodyEmitter;
pub use core::{BasicBlock, BodyImpl, CompiledBody, Op, PrefixOp, Register};
pub use program::IrAssembly;
