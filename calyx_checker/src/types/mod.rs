//! Resolved types for the Calyx checker.
//!
//! A resolved type is a normalized union of atoms. Atoms are structural
//! (tuples, records, functions) or nominal (entities, concept
//! conjunctions). Normalization keeps atoms deduplicated and sorted by
//! identity key, so structural equality of the normalized form is identity.
//!
//! # Module Organization
//!
//! - `resolved/`: atom definitions, normalization, subtype comparison,
//!   identity-string display
//! - `structural.rs`: the per-atom structural operators (load, project,
//!   update, append, merge) and the expansion feasibility predicates

pub mod resolved;
pub mod structural;

pub use resolved::{
    ConceptAtom, ConceptRef, EntityAtom, FunctionAtom, FunctionParam, RecordAtom, RecordEntry,
    ResolvedType, TupleAtom, TupleEntry, TypeAtom,
};
pub use structural::{ExpandoRecordInfo, ExpandoTupleInfo};

/// Names of the core declarations the assembly installs up front. The
/// checker recognizes a handful of them structurally (None/Some splits,
/// truthy conversion), so the names are fixed here rather than configured.
pub mod names {
    pub const ANY: &str = "Any";
    pub const SOME: &str = "Some";
    pub const NONE: &str = "None";
    pub const BOOL: &str = "Bool";
    pub const INT: &str = "Int";
    pub const STRING: &str = "String";
    pub const STRING_OF: &str = "StringOf";
    pub const GUID: &str = "Guid";
    pub const TUPLE: &str = "Tuple";
    pub const RECORD: &str = "Record";
    pub const OBJECT: &str = "Object";
    pub const FUNCTION: &str = "Function";
    pub const PARSABLE: &str = "Parsable";
    pub const ENUM: &str = "Enum";
    pub const KEYED: &str = "Keyed";
    pub const LIST: &str = "List";
    pub const MAP: &str = "Map";
}

/// The universal methods every value carries. A record property may never
/// shadow one of these, and the postfix engine special-cases the
/// flow-sensitive subset.
pub static UNIVERSAL_METHODS: once_cell::sync::Lazy<Vec<&'static str>> =
    once_cell::sync::Lazy::new(|| vec!["is", "as", "tryAs", "defaultAs", "isNone", "isSome"]);

pub fn is_universal_method(name: &str) -> bool {
    UNIVERSAL_METHODS.contains(&name)
}
