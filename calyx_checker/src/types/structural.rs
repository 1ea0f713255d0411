//! Structural-type operators.
//!
//! Each operator works per atom of its input union and unions the per-atom
//! results. Failures report message-only errors; callers attach the error
//! kind and source position.
//!
//! Tuple extension over optional prefixes keeps the conservative result
//! (`open = true`): the exact shape is not representable without
//! entry-level presence tracking. TODO: tighten once the update operators
//! carry presence masks.

use std::collections::BTreeSet;

use crate::assembly::Assembly;

use super::names;
use super::resolved::{
    ConceptAtom, RecordAtom, RecordEntry, ResolvedType, TupleAtom, TupleEntry, TypeAtom,
};

pub type StructResult<T> = Result<T, String>;

/// Feasibility of expanding a value as positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandoTupleInfo {
    pub ok: bool,
    pub req_len: usize,
    pub max_len: usize,
}

/// Feasibility of expanding a value as named arguments. A name is required
/// iff it is required in every atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandoRecordInfo {
    pub ok: bool,
    pub required: BTreeSet<String>,
    pub all: BTreeSet<String>,
}

fn any_ty() -> ResolvedType {
    ResolvedType::concept(names::ANY)
}

fn none_ty() -> ResolvedType {
    ResolvedType::simple_entity(names::NONE)
}

// ==================== Load operators ====================

/// `t[i]`: entry type per atom, None-widened for optional entries, Any for
/// open overruns, None past the end of a closed tuple.
pub fn load_from_index(asm: &Assembly, t: &ResolvedType, idx: usize) -> StructResult<ResolvedType> {
    let mut parts = Vec::new();
    for atom in t.atoms() {
        let rep = asm
            .tuple_representation(atom)
            .ok_or_else(|| format!("Type '{}' has no tuple representation", atom.atom_key()))?;
        match rep.entries.get(idx) {
            Some(entry) if entry.optional => {
                parts.push(ResolvedType::union_of(&[entry.ty.clone(), none_ty()]));
            }
            Some(entry) => parts.push(entry.ty.clone()),
            None if rep.open => parts.push(any_ty()),
            None => parts.push(none_ty()),
        }
    }
    Ok(ResolvedType::union_of(&parts))
}

/// `r.f`: symmetric to [`load_from_index`] over records.
pub fn load_from_name(asm: &Assembly, t: &ResolvedType, name: &str) -> StructResult<ResolvedType> {
    let mut parts = Vec::new();
    for atom in t.atoms() {
        let rep = asm
            .record_representation(atom)
            .ok_or_else(|| format!("Type '{}' has no record representation", atom.atom_key()))?;
        match rep.find(name) {
            Some(entry) if entry.optional => {
                parts.push(ResolvedType::union_of(&[entry.ty.clone(), none_ty()]));
            }
            Some(entry) => parts.push(entry.ty.clone()),
            None if rep.open => parts.push(any_ty()),
            None => parts.push(none_ty()),
        }
    }
    Ok(ResolvedType::union_of(&parts))
}

// ==================== Project operators ====================

pub fn project_tuple_pattern(
    asm: &Assembly,
    t: &ResolvedType,
    pattern: &TupleAtom,
) -> StructResult<ResolvedType> {
    let mut parts = Vec::new();
    for atom in t.atoms() {
        let rep = asm
            .tuple_representation(atom)
            .ok_or_else(|| format!("Type '{}' has no tuple representation", atom.atom_key()))?;
        let mut entries = Vec::new();
        for (i, pe) in pattern.entries.iter().enumerate() {
            match rep.entries.get(i) {
                Some(se) => {
                    if !pe.optional && se.optional {
                        return Err(format!("Required tuple position {} may be absent", i));
                    }
                    if !asm.subtype_of(&se.ty, &pe.ty) {
                        return Err(format!(
                            "Tuple position {} has type '{}' which is not a subtype of '{}'",
                            i, se.ty, pe.ty
                        ));
                    }
                    entries.push(TupleEntry {
                        ty: se.ty.clone(),
                        optional: pe.optional && se.optional,
                    });
                }
                None if rep.open => {
                    if !asm.subtype_of(&any_ty(), &pe.ty) {
                        return Err(format!(
                            "Open tuple entry at position {} is not a subtype of '{}'",
                            i, pe.ty
                        ));
                    }
                    entries.push(TupleEntry {
                        ty: any_ty(),
                        optional: pe.optional,
                    });
                }
                None => {
                    if !pe.optional {
                        return Err(format!("Required tuple position {} is missing", i));
                    }
                    // Optional pattern entry absent from the source: skipped.
                }
            }
        }
        if pattern.open {
            for se in rep.entries.iter().skip(pattern.entries.len()) {
                entries.push(se.clone());
            }
        } else if rep.entries.len() > pattern.entries.len() || rep.open {
            return Err(format!(
                "Tuple '{}' has entries beyond the closed projection pattern",
                atom.atom_key()
            ));
        }
        parts.push(ResolvedType::from_atom(TypeAtom::Tuple(TupleAtom {
            entries,
            open: pattern.open && rep.open,
        })));
    }
    Ok(ResolvedType::union_of(&parts))
}

pub fn project_record_pattern(
    asm: &Assembly,
    t: &ResolvedType,
    pattern: &RecordAtom,
) -> StructResult<ResolvedType> {
    let mut parts = Vec::new();
    for atom in t.atoms() {
        let rep = asm
            .record_representation(atom)
            .ok_or_else(|| format!("Type '{}' has no record representation", atom.atom_key()))?;
        let mut entries = Vec::new();
        for pe in &pattern.entries {
            match rep.find(&pe.name) {
                Some(se) => {
                    if !pe.optional && se.optional {
                        return Err(format!("Required record property '{}' may be absent", pe.name));
                    }
                    if !asm.subtype_of(&se.ty, &pe.ty) {
                        return Err(format!(
                            "Record property '{}' has type '{}' which is not a subtype of '{}'",
                            pe.name, se.ty, pe.ty
                        ));
                    }
                    entries.push(RecordEntry {
                        name: pe.name.clone(),
                        ty: se.ty.clone(),
                        optional: pe.optional && se.optional,
                    });
                }
                None if rep.open => {
                    if !asm.subtype_of(&any_ty(), &pe.ty) {
                        return Err(format!(
                            "Open record property '{}' is not a subtype of '{}'",
                            pe.name, pe.ty
                        ));
                    }
                    entries.push(RecordEntry {
                        name: pe.name.clone(),
                        ty: any_ty(),
                        optional: pe.optional,
                    });
                }
                None => {
                    if !pe.optional {
                        return Err(format!("Required record property '{}' is missing", pe.name));
                    }
                }
            }
        }
        if pattern.open {
            for se in &rep.entries {
                if pattern.find(&se.name).is_none() {
                    entries.push(se.clone());
                }
            }
        } else {
            let extra = rep
                .entries
                .iter()
                .any(|se| pattern.find(&se.name).is_none());
            if extra || rep.open {
                return Err(format!(
                    "Record '{}' has properties beyond the closed projection pattern",
                    atom.atom_key()
                ));
            }
        }
        parts.push(ResolvedType::from_atom(TypeAtom::Record(RecordAtom::new(
            entries,
            pattern.open && rep.open,
        ))));
    }
    Ok(ResolvedType::union_of(&parts))
}

/// Project through a concept pattern: gather the concept set's declared
/// field names (sorted), require each to resolve uniquely in `t`, and
/// build a closed record per source atom.
pub fn project_concept_pattern(
    asm: &Assembly,
    t: &ResolvedType,
    pattern: &ConceptAtom,
) -> StructResult<ResolvedType> {
    let names = asm.concept_field_names(pattern)?;
    let mut parts = Vec::new();
    for atom in t.atoms() {
        let single = ResolvedType::from_atom(atom.clone());
        let mut entries = Vec::new();
        for name in &names {
            let field_ty = asm.field_type_unique(&single, name)?;
            entries.push(RecordEntry {
                name: name.clone(),
                ty: field_ty,
                optional: false,
            });
        }
        parts.push(ResolvedType::from_atom(TypeAtom::Record(RecordAtom::new(
            entries, false,
        ))));
    }
    Ok(ResolvedType::union_of(&parts))
}

// ==================== Update operators ====================

/// Overwrite tuple entries, extending past the end where an update index
/// requires it. Extension over a source with optional entries loses the
/// exact shape and degrades to an open result.
pub fn update_tuple(
    asm: &Assembly,
    t: &ResolvedType,
    updates: &[(usize, ResolvedType)],
) -> StructResult<ResolvedType> {
    let mut parts = Vec::new();
    for atom in t.atoms() {
        let rep = asm
            .tuple_representation(atom)
            .ok_or_else(|| format!("Type '{}' has no tuple representation", atom.atom_key()))?;
        let mut entries = rep.entries.clone();
        let mut conservative_open = false;
        for (idx, ty) in updates {
            if *idx >= entries.len() {
                if entries.iter().any(|e| e.optional) {
                    conservative_open = true;
                }
                let filler = if rep.open { any_ty() } else { none_ty() };
                while entries.len() < *idx {
                    entries.push(TupleEntry {
                        ty: filler.clone(),
                        optional: false,
                    });
                }
                entries.push(TupleEntry {
                    ty: ty.clone(),
                    optional: false,
                });
            } else {
                entries[*idx] = TupleEntry {
                    ty: ty.clone(),
                    optional: false,
                };
            }
        }
        parts.push(ResolvedType::from_atom(TypeAtom::Tuple(TupleAtom {
            entries,
            open: rep.open || conservative_open,
        })));
    }
    Ok(ResolvedType::union_of(&parts))
}

/// Replace-or-append record entries; an updated entry is always required.
pub fn update_record(
    asm: &Assembly,
    t: &ResolvedType,
    updates: &[(String, ResolvedType)],
) -> StructResult<ResolvedType> {
    let mut parts = Vec::new();
    for atom in t.atoms() {
        let rep = asm
            .record_representation(atom)
            .ok_or_else(|| format!("Type '{}' has no record representation", atom.atom_key()))?;
        let mut entries = rep.entries.clone();
        for (name, ty) in updates {
            if let Some(existing) = entries.iter_mut().find(|e| &e.name == name) {
                existing.ty = ty.clone();
                existing.optional = false;
            } else {
                entries.push(RecordEntry {
                    name: name.clone(),
                    ty: ty.clone(),
                    optional: false,
                });
            }
        }
        parts.push(ResolvedType::from_atom(TypeAtom::Record(RecordAtom::new(
            entries, rep.open,
        ))));
    }
    Ok(ResolvedType::union_of(&parts))
}

// ==================== Append / merge operators ====================

pub fn append_tuple(
    asm: &Assembly,
    t: &ResolvedType,
    ext: &ResolvedType,
) -> StructResult<ResolvedType> {
    let mut parts = Vec::new();
    for base_atom in t.atoms() {
        let base = asm
            .tuple_representation(base_atom)
            .ok_or_else(|| format!("Type '{}' has no tuple representation", base_atom.atom_key()))?;
        for ext_atom in ext.atoms() {
            let ext_rep = asm.tuple_representation(ext_atom).ok_or_else(|| {
                format!("Type '{}' has no tuple representation", ext_atom.atom_key())
            })?;
            let base_has_optional = base.entries.iter().any(|e| e.optional);
            let atom = if base.open || ext_rep.open || base_has_optional {
                // Placement of the appended entries is not statically known.
                TupleAtom {
                    entries: base.entries.clone(),
                    open: true,
                }
            } else {
                let mut entries = base.entries.clone();
                entries.extend(ext_rep.entries.iter().cloned());
                TupleAtom {
                    entries,
                    open: false,
                }
            };
            parts.push(ResolvedType::from_atom(TypeAtom::Tuple(atom)));
        }
    }
    Ok(ResolvedType::union_of(&parts))
}

pub fn merge_record(
    asm: &Assembly,
    t: &ResolvedType,
    ext: &ResolvedType,
) -> StructResult<ResolvedType> {
    let mut parts = Vec::new();
    for base_atom in t.atoms() {
        let base = asm
            .record_representation(base_atom)
            .ok_or_else(|| format!("Type '{}' has no record representation", base_atom.atom_key()))?;
        for ext_atom in ext.atoms() {
            let ext_rep = asm.record_representation(ext_atom).ok_or_else(|| {
                format!("Type '{}' has no record representation", ext_atom.atom_key())
            })?;
            let mut entries = base.entries.clone();
            for ee in &ext_rep.entries {
                match entries.iter_mut().find(|e| e.name == ee.name) {
                    Some(existing) if !ee.optional => {
                        existing.ty = ee.ty.clone();
                        existing.optional = false;
                    }
                    Some(existing) => {
                        existing.ty =
                            ResolvedType::union_of(&[existing.ty.clone(), ee.ty.clone()]);
                        existing.optional = true;
                    }
                    None => entries.push(ee.clone()),
                }
            }
            parts.push(ResolvedType::from_atom(TypeAtom::Record(RecordAtom::new(
                entries,
                base.open || ext_rep.open,
            ))));
        }
    }
    Ok(ResolvedType::union_of(&parts))
}

/// Merge a record into an entity/concept receiver. Type-only: the record
/// must be closed and every property must resolve uniquely to a field of
/// the receiver with a conforming type; the result is the receiver type.
pub fn merge_object_record(
    asm: &Assembly,
    t: &ResolvedType,
    ext: &ResolvedType,
) -> StructResult<ResolvedType> {
    for ext_atom in ext.atoms() {
        let rep = asm
            .record_representation(ext_atom)
            .ok_or_else(|| format!("Type '{}' has no record representation", ext_atom.atom_key()))?;
        if rep.open {
            return Err("Cannot merge an open record into a nominal value".to_string());
        }
        for entry in &rep.entries {
            let field_ty = asm.field_type_unique(t, &entry.name)?;
            if !asm.subtype_of(&entry.ty, &field_ty) {
                return Err(format!(
                    "Property '{}' has type '{}' which is not a subtype of field type '{}'",
                    entry.name, entry.ty, field_ty
                ));
            }
        }
    }
    Ok(t.clone())
}

// ==================== Expansion feasibility ====================

pub fn tuple_expando(asm: &Assembly, t: &ResolvedType) -> ExpandoTupleInfo {
    let mut req_len = usize::MAX;
    let mut max_len = 0;
    for atom in t.atoms() {
        let Some(rep) = asm.tuple_representation(atom) else {
            return ExpandoTupleInfo {
                ok: false,
                req_len: 0,
                max_len: 0,
            };
        };
        if rep.open {
            return ExpandoTupleInfo {
                ok: false,
                req_len: 0,
                max_len: 0,
            };
        }
        req_len = req_len.min(rep.required_len());
        max_len = max_len.max(rep.entries.len());
    }
    ExpandoTupleInfo {
        ok: !t.atoms().is_empty(),
        req_len: if req_len == usize::MAX { 0 } else { req_len },
        max_len,
    }
}

pub fn record_expando(asm: &Assembly, t: &ResolvedType) -> ExpandoRecordInfo {
    let mut required: Option<BTreeSet<String>> = None;
    let mut all = BTreeSet::new();
    for atom in t.atoms() {
        let Some(rep) = asm.record_representation(atom) else {
            return ExpandoRecordInfo {
                ok: false,
                required: BTreeSet::new(),
                all: BTreeSet::new(),
            };
        };
        if rep.open {
            return ExpandoRecordInfo {
                ok: false,
                required: BTreeSet::new(),
                all: BTreeSet::new(),
            };
        }
        let atom_required: BTreeSet<String> = rep
            .entries
            .iter()
            .filter(|e| !e.optional)
            .map(|e| e.name.clone())
            .collect();
        required = Some(match required {
            None => atom_required,
            Some(prev) => prev.intersection(&atom_required).cloned().collect(),
        });
        all.extend(rep.entries.iter().map(|e| e.name.clone()));
    }
    ExpandoRecordInfo {
        ok: !t.atoms().is_empty(),
        required: required.unwrap_or_default(),
        all,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::Assembly;
    use crate::types::names;

    fn int() -> ResolvedType {
        ResolvedType::simple_entity(names::INT)
    }

    fn bool_ty() -> ResolvedType {
        ResolvedType::simple_entity(names::BOOL)
    }

    fn tup(entries: Vec<(ResolvedType, bool)>, open: bool) -> ResolvedType {
        ResolvedType::from_atom(TypeAtom::Tuple(TupleAtom {
            entries: entries
                .into_iter()
                .map(|(ty, optional)| TupleEntry { ty, optional })
                .collect(),
            open,
        }))
    }

    fn rec(entries: Vec<(&str, ResolvedType, bool)>, open: bool) -> ResolvedType {
        ResolvedType::from_atom(TypeAtom::Record(RecordAtom::new(
            entries
                .into_iter()
                .map(|(name, ty, optional)| RecordEntry {
                    name: name.to_string(),
                    ty,
                    optional,
                })
                .collect(),
            open,
        )))
    }

    // ── load ─────────────────────────────────────────────────────────────

    #[test]
    fn test_load_index_required_entry() {
        let asm = Assembly::core();
        let t = tup(vec![(int(), false), (bool_ty(), false)], false);
        assert_eq!(load_from_index(&asm, &t, 0).unwrap(), int());
    }

    #[test]
    fn test_load_index_optional_entry_widens_with_none() {
        let asm = Assembly::core();
        let t = tup(vec![(int(), false), (bool_ty(), true)], false);
        let loaded = load_from_index(&asm, &t, 1).unwrap();
        assert!(loaded.contains_none());
        assert!(loaded.contains_some());
    }

    #[test]
    fn test_load_index_past_closed_end_is_none() {
        let asm = Assembly::core();
        let t = tup(vec![(int(), false)], false);
        assert!(load_from_index(&asm, &t, 3).unwrap().is_none_only());
    }

    #[test]
    fn test_load_name_on_non_record_fails() {
        let asm = Assembly::core();
        assert!(load_from_name(&asm, &int(), "f").is_err());
    }

    // ── project ──────────────────────────────────────────────────────────

    #[test]
    fn test_project_tuple_prefix_requires_open_pattern() {
        let asm = Assembly::core();
        let t = tup(vec![(int(), false), (bool_ty(), false)], false);
        let closed = TupleAtom::closed(vec![TupleEntry {
            ty: int(),
            optional: false,
        }]);
        assert!(project_tuple_pattern(&asm, &t, &closed).is_err());

        let open = TupleAtom {
            entries: vec![TupleEntry {
                ty: int(),
                optional: false,
            }],
            open: true,
        };
        let projected = project_tuple_pattern(&asm, &t, &open).unwrap();
        // Closed source under an open pattern: result is closed with the
        // trailing entries carried over.
        assert_eq!(projected, t);
    }

    #[test]
    fn test_project_tuple_missing_required_fails() {
        let asm = Assembly::core();
        let t = tup(vec![(int(), false)], false);
        let pattern = TupleAtom::closed(vec![
            TupleEntry {
                ty: int(),
                optional: false,
            },
            TupleEntry {
                ty: int(),
                optional: false,
            },
        ]);
        assert!(project_tuple_pattern(&asm, &t, &pattern).is_err());
    }

    #[test]
    fn test_project_record_subset() {
        let asm = Assembly::core();
        let t = rec(vec![("x", int(), false), ("y", bool_ty(), false)], false);
        let pattern = RecordAtom {
            entries: vec![RecordEntry {
                name: "x".to_string(),
                ty: int(),
                optional: false,
            }],
            open: true,
        };
        let projected = project_record_pattern(&asm, &t, &pattern).unwrap();
        assert_eq!(projected, t);
    }

    // ── update ───────────────────────────────────────────────────────────

    #[test]
    fn test_update_composition_later_shadows_earlier() {
        let asm = Assembly::core();
        let t = tup(vec![(int(), false), (int(), false)], false);
        let once = update_tuple(&asm, &t, &[(0, bool_ty()), (0, int())]).unwrap();
        let twice = update_tuple(
            &asm,
            &update_tuple(&asm, &t, &[(0, bool_ty())]).unwrap(),
            &[(0, int())],
        )
        .unwrap();
        assert_eq!(once, twice);
        assert_eq!(once, t);
    }

    #[test]
    fn test_update_tuple_extension_fills_with_none() {
        let asm = Assembly::core();
        let t = tup(vec![(int(), false)], false);
        let updated = update_tuple(&asm, &t, &[(2, bool_ty())]).unwrap();
        let loaded = load_from_index(&asm, &updated, 1).unwrap();
        assert!(loaded.is_none_only());
    }

    #[test]
    fn test_update_tuple_extension_over_optional_goes_open() {
        let asm = Assembly::core();
        let t = tup(vec![(int(), true)], false);
        let updated = update_tuple(&asm, &t, &[(3, bool_ty())]).unwrap();
        match updated.try_unique_atom() {
            Some(TypeAtom::Tuple(t)) => assert!(t.open),
            other => panic!("expected tuple atom, got {:?}", other),
        }
    }

    #[test]
    fn test_update_record_appends_and_requires() {
        let asm = Assembly::core();
        let t = rec(vec![("x", int(), true)], false);
        let updated = update_record(&asm, &t, &[("x".to_string(), int())]).unwrap();
        assert_eq!(updated, rec(vec![("x", int(), false)], false));
    }

    // ── append / merge ───────────────────────────────────────────────────

    #[test]
    fn test_append_closed_required_concatenates() {
        let asm = Assembly::core();
        let t = tup(vec![(int(), false)], false);
        let ext = tup(vec![(bool_ty(), false)], false);
        let appended = append_tuple(&asm, &t, &ext).unwrap();
        assert_eq!(
            appended,
            tup(vec![(int(), false), (bool_ty(), false)], false)
        );
    }

    #[test]
    fn test_append_with_optional_base_is_conservatively_open() {
        let asm = Assembly::core();
        let t = tup(vec![(int(), true)], false);
        let ext = tup(vec![(bool_ty(), false)], false);
        let appended = append_tuple(&asm, &t, &ext).unwrap();
        match appended.try_unique_atom() {
            Some(TypeAtom::Tuple(t)) => assert!(t.open),
            other => panic!("expected tuple atom, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_record_optional_widens() {
        let asm = Assembly::core();
        let t = rec(vec![("x", int(), false)], false);
        let ext = rec(vec![("x", bool_ty(), true), ("y", int(), false)], false);
        let merged = merge_record(&asm, &t, &ext).unwrap();
        let expected = rec(
            vec![
                ("x", ResolvedType::union_of(&[int(), bool_ty()]), true),
                ("y", int(), false),
            ],
            false,
        );
        assert_eq!(merged, expected);
    }

    // ── expando ──────────────────────────────────────────────────────────

    #[test]
    fn test_tuple_expando_over_union() {
        let asm = Assembly::core();
        let u = ResolvedType::union_of(&[
            tup(vec![(int(), false), (int(), true)], false),
            tup(vec![(int(), false), (int(), false), (int(), false)], false),
        ]);
        let info = tuple_expando(&asm, &u);
        assert!(info.ok);
        assert_eq!(info.req_len, 1);
        assert_eq!(info.max_len, 3);
    }

    #[test]
    fn test_tuple_expando_rejects_open() {
        let asm = Assembly::core();
        let t = tup(vec![(int(), false)], true);
        assert!(!tuple_expando(&asm, &t).ok);
    }

    #[test]
    fn test_record_expando_required_is_intersection() {
        let asm = Assembly::core();
        let u = ResolvedType::union_of(&[
            rec(vec![("x", int(), false), ("y", int(), false)], false),
            rec(vec![("x", int(), false), ("y", int(), true)], false),
        ]);
        let info = record_expando(&asm, &u);
        assert!(info.ok);
        assert!(info.required.contains("x"));
        assert!(!info.required.contains("y"));
        assert!(info.all.contains("y"));
    }
}
