//! Resolved type atoms and normalization.
//!
//! Every resolved type is a set of atoms with no duplicates, kept sorted
//! by identity key. The empty atom set is the infeasible type: it appears
//! only transiently, when a flow split proves a branch impossible.

pub mod comparison;
pub mod display;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::names;

/// One entry of a tuple atom. Entry order is part of the atom's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleEntry {
    pub ty: ResolvedType,
    pub optional: bool,
}

/// Ordered tuple atom. `open` permits extra trailing entries of type Any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleAtom {
    pub entries: Vec<TupleEntry>,
    pub open: bool,
}

impl TupleAtom {
    pub fn closed(entries: Vec<TupleEntry>) -> Self {
        Self {
            entries,
            open: false,
        }
    }

    /// Number of leading required entries.
    pub fn required_len(&self) -> usize {
        self.entries.iter().take_while(|e| !e.optional).count()
    }
}

/// One named entry of a record atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub name: String,
    pub ty: ResolvedType,
    pub optional: bool,
}

/// Record atom. Property order is irrelevant to identity, so entries are
/// kept sorted by name. `open` permits extra properties of type Any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordAtom {
    pub entries: Vec<RecordEntry>,
    pub open: bool,
}

impl RecordAtom {
    /// Build a record atom, sorting entries into canonical name order.
    pub fn new(mut entries: Vec<RecordEntry>, open: bool) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self { entries, open }
    }

    pub fn closed(entries: Vec<RecordEntry>) -> Self {
        Self::new(entries, false)
    }

    pub fn find(&self, name: &str) -> Option<&RecordEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Nominal concrete type: a declared entity plus its template binds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityAtom {
    pub name: String,
    pub binds: BTreeMap<String, ResolvedType>,
}

impl EntityAtom {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binds: BTreeMap::new(),
        }
    }
}

/// One concept reference inside a concept atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptRef {
    pub name: String,
    pub binds: BTreeMap<String, ResolvedType>,
}

impl ConceptRef {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binds: BTreeMap::new(),
        }
    }
}

/// Non-empty conjunction of concepts, kept sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptAtom {
    pub refs: Vec<ConceptRef>,
}

impl ConceptAtom {
    pub fn new(mut refs: Vec<ConceptRef>) -> Self {
        refs.sort_by_key(|r| display::concept_ref_key(r));
        refs.dedup();
        debug_assert!(!refs.is_empty(), "concept atom may not be empty");
        Self { refs }
    }

    pub fn single(r: ConceptRef) -> Self {
        Self { refs: vec![r] }
    }
}

/// One parameter of a function atom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParam {
    pub name: String,
    pub ty: ResolvedType,
    pub optional: bool,
}

/// Function atom: parameters, an optional rest parameter (a collection
/// entity type), and the result type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionAtom {
    pub params: Vec<FunctionParam>,
    pub rest: Option<Box<ResolvedType>>,
    pub result: Box<ResolvedType>,
}

/// An irreducible case in a type's union decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeAtom {
    Tuple(TupleAtom),
    Record(RecordAtom),
    Entity(EntityAtom),
    Concept(ConceptAtom),
    Function(FunctionAtom),
}

impl TypeAtom {
    /// Stable identity key; the normalized rendering of the atom.
    pub fn atom_key(&self) -> String {
        display::atom_key(self)
    }
}

/// A normalized union of atoms. Value-semantic: every operation returns a
/// new type; equality of normalized forms is identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedType {
    atoms: Vec<TypeAtom>,
}

impl ResolvedType {
    /// The infeasible type (empty union). Never the type of a value;
    /// signals a dead flow branch.
    pub fn never() -> Self {
        Self { atoms: Vec::new() }
    }

    pub fn from_atom(atom: TypeAtom) -> Self {
        Self { atoms: vec![atom] }
    }

    pub fn entity(atom: EntityAtom) -> Self {
        Self::from_atom(TypeAtom::Entity(atom))
    }

    pub fn simple_entity(name: impl Into<String>) -> Self {
        Self::entity(EntityAtom::simple(name))
    }

    pub fn concept(name: impl Into<String>) -> Self {
        Self::from_atom(TypeAtom::Concept(ConceptAtom::single(ConceptRef::simple(
            name,
        ))))
    }

    /// Normalize a list of atoms: dedupe by identity key, sort by key.
    pub fn from_atoms(atoms: Vec<TypeAtom>) -> Self {
        let mut keyed: Vec<(String, TypeAtom)> =
            atoms.into_iter().map(|a| (a.atom_key(), a)).collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.dedup_by(|a, b| a.0 == b.0);
        Self {
            atoms: keyed.into_iter().map(|(_, a)| a).collect(),
        }
    }

    /// Union of several types: flatten and renormalize.
    pub fn union_of(parts: &[ResolvedType]) -> Self {
        let mut atoms = Vec::new();
        for p in parts {
            atoms.extend(p.atoms.iter().cloned());
        }
        Self::from_atoms(atoms)
    }

    pub fn atoms(&self) -> &[TypeAtom] {
        &self.atoms
    }

    pub fn is_never(&self) -> bool {
        self.atoms.is_empty()
    }

    /// Stable identity key for interning and fingerprints.
    pub fn type_key(&self) -> String {
        self.to_string()
    }

    /// The single atom, when the union is degenerate.
    pub fn try_unique_atom(&self) -> Option<&TypeAtom> {
        match self.atoms.as_slice() {
            [atom] => Some(atom),
            _ => None,
        }
    }

    /// The unique entity atom, if this type is exactly one entity.
    pub fn as_unique_entity(&self) -> Option<&EntityAtom> {
        match self.try_unique_atom() {
            Some(TypeAtom::Entity(e)) => Some(e),
            _ => None,
        }
    }

    /// The unique function atom, if this type is exactly one function.
    pub fn as_unique_function(&self) -> Option<&FunctionAtom> {
        match self.try_unique_atom() {
            Some(TypeAtom::Function(f)) => Some(f),
            _ => None,
        }
    }

    fn atom_is_none(atom: &TypeAtom) -> bool {
        matches!(atom, TypeAtom::Entity(e) if e.name == names::NONE && e.binds.is_empty())
    }

    /// Whether the union includes the None entity.
    pub fn contains_none(&self) -> bool {
        self.atoms.iter().any(Self::atom_is_none)
    }

    /// Whether the union is exactly the None entity.
    pub fn is_none_only(&self) -> bool {
        !self.atoms.is_empty() && self.atoms.iter().all(Self::atom_is_none)
    }

    /// Whether the union includes any non-None atom. Concept atoms other
    /// than pure-Any count as Some-able; the Any concept admits None too,
    /// so a variable typed Any splits into both parts.
    pub fn contains_some(&self) -> bool {
        self.atoms.iter().any(|a| !Self::atom_is_none(a))
    }

    fn atom_admits_none(atom: &TypeAtom) -> bool {
        match atom {
            TypeAtom::Entity(_) => Self::atom_is_none(atom),
            TypeAtom::Concept(c) => c.refs.iter().all(|r| r.name == names::ANY),
            _ => false,
        }
    }

    /// Split into (None part, Some part) for flow refinement. An Any
    /// concept atom lands in both parts: as None on the none side and
    /// unchanged on the some side.
    pub fn split_none(&self) -> (ResolvedType, ResolvedType) {
        let mut none_atoms = Vec::new();
        let mut some_atoms = Vec::new();
        for atom in &self.atoms {
            if Self::atom_is_none(atom) {
                none_atoms.push(atom.clone());
            } else if Self::atom_admits_none(atom) {
                none_atoms.push(TypeAtom::Entity(EntityAtom::simple(names::NONE)));
                some_atoms.push(atom.clone());
            } else {
                some_atoms.push(atom.clone());
            }
        }
        (Self::from_atoms(none_atoms), Self::from_atoms(some_atoms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int() -> ResolvedType {
        ResolvedType::simple_entity(names::INT)
    }

    fn none() -> ResolvedType {
        ResolvedType::simple_entity(names::NONE)
    }

    // ── normalization ────────────────────────────────────────────────────

    #[test]
    fn test_union_dedupes_atoms() {
        let u = ResolvedType::union_of(&[int(), int(), none()]);
        assert_eq!(u.atoms().len(), 2);
    }

    #[test]
    fn test_union_is_order_independent() {
        let a = ResolvedType::union_of(&[int(), none()]);
        let b = ResolvedType::union_of(&[none(), int()]);
        assert_eq!(a, b);
        assert_eq!(a.type_key(), b.type_key());
    }

    #[test]
    fn test_record_entry_order_is_not_identity() {
        let a = RecordAtom::closed(vec![
            RecordEntry {
                name: "x".to_string(),
                ty: int(),
                optional: false,
            },
            RecordEntry {
                name: "a".to_string(),
                ty: int(),
                optional: false,
            },
        ]);
        let b = RecordAtom::closed(vec![
            RecordEntry {
                name: "a".to_string(),
                ty: int(),
                optional: false,
            },
            RecordEntry {
                name: "x".to_string(),
                ty: int(),
                optional: false,
            },
        ]);
        assert_eq!(a, b);
    }

    // ── none/some splitting ──────────────────────────────────────────────

    #[test]
    fn test_split_none_partitions_union() {
        let u = ResolvedType::union_of(&[int(), none()]);
        let (n, s) = u.split_none();
        assert_eq!(n, none());
        assert_eq!(s, int());
    }

    #[test]
    fn test_split_none_on_pure_int_has_empty_none_part() {
        let (n, s) = int().split_none();
        assert!(n.is_never());
        assert_eq!(s, int());
    }

    #[test]
    fn test_any_concept_splits_into_both_parts() {
        let any = ResolvedType::concept(names::ANY);
        let (n, s) = any.split_none();
        assert!(!n.is_never());
        assert!(!s.is_never());
    }
}
