//! Subtype checking over resolved type atoms.
//!
//! Union handling follows the usual decomposition: `Union <: U` iff every
//! atom is, and `T <: Union` iff some atom covers it. Nominal subtyping is
//! invariant in template binds and walks the provides closure supplied by
//! the assembly; structural subtyping is entry-wise.

use crate::assembly::Assembly;

use super::{FunctionAtom, RecordAtom, ResolvedType, TupleAtom, TypeAtom};

pub(crate) fn subtype(asm: &Assembly, a: &ResolvedType, b: &ResolvedType) -> bool {
    a.atoms()
        .iter()
        .all(|aa| b.atoms().iter().any(|ba| atom_subtype(asm, aa, ba)))
}

pub(crate) fn atom_subtype(asm: &Assembly, a: &TypeAtom, b: &TypeAtom) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (_, TypeAtom::Concept(bc)) => {
            let closure = asm.provides_closure_of_atom(a);
            bc.refs.iter().all(|r| closure.contains(r))
        }
        (TypeAtom::Entity(ae), TypeAtom::Entity(be)) => {
            // Nominal subtyping is invariant: same declaration, same binds.
            ae.name == be.name && ae.binds == be.binds
        }
        (TypeAtom::Tuple(at), TypeAtom::Tuple(bt)) => tuple_subtype(asm, at, bt),
        (TypeAtom::Record(ar), TypeAtom::Record(br)) => record_subtype(asm, ar, br),
        (TypeAtom::Function(af), TypeAtom::Function(bf)) => function_subtype(asm, af, bf),
        _ => false,
    }
}

fn tuple_subtype(asm: &Assembly, a: &TupleAtom, b: &TupleAtom) -> bool {
    if a.open && !b.open {
        return false;
    }
    let max_len = a.entries.len().max(b.entries.len());
    for i in 0..max_len {
        match (a.entries.get(i), b.entries.get(i)) {
            (Some(ae), Some(be)) => {
                if ae.optional && !be.optional {
                    return false;
                }
                if !subtype(asm, &ae.ty, &be.ty) {
                    return false;
                }
            }
            (Some(_), None) => {
                // Extra entries in the source need an open target.
                if !b.open {
                    return false;
                }
            }
            (None, Some(be)) => {
                if a.open {
                    // Unknown trailing entries are Any-typed; a required
                    // target entry of anything narrower cannot accept them.
                    return false;
                }
                // Closed shorter source: the entry is absent, which only an
                // optional target entry allows.
                if !be.optional {
                    return false;
                }
            }
            (None, None) => unreachable!(),
        }
    }
    true
}

fn record_subtype(asm: &Assembly, a: &RecordAtom, b: &RecordAtom) -> bool {
    if a.open && !b.open {
        return false;
    }
    for be in &b.entries {
        match a.find(&be.name) {
            Some(ae) => {
                if ae.optional && !be.optional {
                    return false;
                }
                if !subtype(asm, &ae.ty, &be.ty) {
                    return false;
                }
            }
            None => {
                if a.open {
                    // The property may exist with type Any.
                    return false;
                }
                if !be.optional {
                    return false;
                }
            }
        }
    }
    for ae in &a.entries {
        if b.find(&ae.name).is_none() && !b.open {
            return false;
        }
    }
    true
}

fn function_subtype(asm: &Assembly, a: &FunctionAtom, b: &FunctionAtom) -> bool {
    if a.params.len() != b.params.len() {
        return false;
    }
    for (ap, bp) in a.params.iter().zip(b.params.iter()) {
        if bp.optional && !ap.optional {
            return false;
        }
        // Contravariant in parameters.
        if !subtype(asm, &bp.ty, &ap.ty) {
            return false;
        }
    }
    match (&a.rest, &b.rest) {
        (None, None) => {}
        (Some(ar), Some(br)) => {
            if !subtype(asm, br, ar) {
                return false;
            }
        }
        _ => return false,
    }
    // Covariant in the result.
    subtype(asm, &a.result, &b.result)
}
