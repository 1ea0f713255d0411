//! Core IR - straight-line opcodes over virtual registers, organized into
//! labeled basic blocks.
//!
//! Opcodes are emitted in evaluation order; blocks are created in lexical
//! order of the control constructs that need them, so re-checking the same
//! declaration reproduces the identical sequence.

use serde::{Deserialize, Serialize};

/// A virtual register. Fresh registers are numbered in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Register(pub u32);

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefixOp {
    Plus,
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
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

/// One IR opcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    // Constants
    LoadConstNone { trgt: Register },
    LoadConstBool { trgt: Register, value: bool },
    LoadConstInt { trgt: Register, value: i64 },
    LoadConstString { trgt: Register, value: String },
    LoadConstTypedString { trgt: Register, value: String, tkey: String },
    /// Load a declared default value compiled under `key`.
    LoadDefaultValue { trgt: Register, key: String },

    // Accesses
    AccessNamespaceConstant { trgt: Register, gkey: String },
    AccessConst { trgt: Register, ckey: String },
    AccessLocal { trgt: Register, name: String },
    AccessArg { trgt: Register, name: String },
    AccessCaptured { trgt: Register, name: String },

    // Structural loads
    LoadTupleIndex { trgt: Register, arg: Register, index: usize },
    LoadProperty { trgt: Register, arg: Register, name: String },
    LoadField { trgt: Register, arg: Register, fkey: String },

    // Constructors
    ConstructTuple { trgt: Register, args: Vec<Register> },
    ConstructRecord { trgt: Register, entries: Vec<(String, Register)> },
    ConstructLambda { trgt: Register, lkey: String },
    ConstructPrimary { trgt: Register, tkey: String, args: Vec<Register> },
    ConstructPrimaryCollectionEmpty { trgt: Register, tkey: String },
    ConstructPrimaryCollectionSingletons { trgt: Register, tkey: String, args: Vec<Register> },
    ConstructPrimaryCollectionCopies { trgt: Register, tkey: String, args: Vec<Register> },
    /// Mixed element/copy construction; `true` marks a copied container.
    ConstructPrimaryCollectionMixed { trgt: Register, tkey: String, args: Vec<(bool, Register)> },

    // Calls
    CallNamespaceFunction { trgt: Register, fkey: String, args: Vec<Register> },
    CallStaticFunction { trgt: Register, skey: String, args: Vec<Register> },
    /// Direct dispatch; `args[0]` is the receiver.
    CallKnownTarget { trgt: Register, mkey: String, args: Vec<Register> },
    /// Virtual dispatch through the root declaration's key.
    CallVirtualTarget { trgt: Register, vkey: String, args: Vec<Register> },
    CallLambda { trgt: Register, lambda: Register, args: Vec<Register> },

    // Structural projections and updates
    ProjectTupleIndices { trgt: Register, arg: Register, indices: Vec<usize> },
    ProjectRecordNames { trgt: Register, arg: Register, names: Vec<String> },
    ProjectFromType { trgt: Register, arg: Register, tkey: String },
    ModifyWithIndices { trgt: Register, arg: Register, updates: Vec<(usize, Register)> },
    ModifyWithNames { trgt: Register, arg: Register, updates: Vec<(String, Register)> },
    StructuredExtendTuple { trgt: Register, arg: Register, ext: Register },
    StructuredExtendRecord { trgt: Register, arg: Register, ext: Register },
    StructuredExtendObject { trgt: Register, arg: Register, ext: Register },

    // Operators
    PrefixOp { trgt: Register, op: PrefixOp, arg: Register },
    BinOp { trgt: Register, op: BinOp, lhs: Register, rhs: Register },
    BinEq { trgt: Register, negated: bool, lhs: Register, rhs: Register },
    BinCmp { trgt: Register, op: CmpOp, lhs: Register, rhs: Register },
    /// Collapse a `Bool | None` value to Bool (None becomes false).
    TruthyConversion { trgt: Register, src: Register },
    /// Runtime type test backing the universal `is[T]` family.
    IsTypeOf { trgt: Register, arg: Register, tkey: String },
    /// Cast backing `as[T]` / `tryAs[T]`; a fallible cast yields None on
    /// failure instead of aborting.
    ConvertTo { trgt: Register, arg: Register, tkey: String, fallible: bool },
    /// Cast backing `defaultAs[T](d)`.
    ConvertOrDefault { trgt: Register, arg: Register, tkey: String, default: Register },

    // Assignment and frame management
    RegAssign { trgt: Register, src: Register },
    ReturnAssign { src: Register },
    Assert { cond: Register },
    Check { cond: Register },
    LocalLifetimeStart { name: String, tkey: String },
    LocalLifetimeEnd { name: String },

    // Terminators
    DirectJump { target: String },
    BoolJump { cond: Register, true_target: String, false_target: String },
    NoneJump { arg: Register, none_target: String, some_target: String },
}

impl Op {
    /// Whether this opcode ends a basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::DirectJump { .. } | Self::BoolJump { .. } | Self::NoneJump { .. }
        )
    }
}

/// A labeled basic block with its opcodes in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub label: String,
    pub ops: Vec<Op>,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ops: Vec::new(),
        }
    }
}

/// The compiled implementation of one declaration body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BodyImpl {
    /// Raw source pass-through; opaque to the checker.
    Raw { code: String },
    Blocks {
        register_count: u32,
        /// Frame variables with their home registers, in registration order.
        vars: Vec<(String, Register)>,
        /// Blocks in creation order; the first is the entry block.
        blocks: Vec<BasicBlock>,
    },
}

/// A compiled body keyed for the output assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledBody {
    pub bkey: String,
    pub src_file: String,
    pub body: BodyImpl,
}
