//! Identity-string rendering for resolved types.
//!
//! The rendered form doubles as the interning key: two types render
//! identically iff they are the same normalized type.

use std::collections::BTreeMap;
use std::fmt;

use super::{ConceptRef, ResolvedType, TypeAtom};

fn binds_suffix(binds: &BTreeMap<String, ResolvedType>) -> String {
    if binds.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = binds.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("<{}>", parts.join(", "))
}

pub(crate) fn concept_ref_key(r: &ConceptRef) -> String {
    format!("{}{}", r.name, binds_suffix(&r.binds))
}

pub(crate) fn atom_key(atom: &TypeAtom) -> String {
    match atom {
        TypeAtom::Tuple(t) => {
            let mut parts: Vec<String> = t
                .entries
                .iter()
                .map(|e| {
                    if e.optional {
                        format!("{}?", e.ty)
                    } else {
                        e.ty.to_string()
                    }
                })
                .collect();
            if t.open {
                parts.push("...".to_string());
            }
            format!("[{}]", parts.join(", "))
        }
        TypeAtom::Record(r) => {
            let mut parts: Vec<String> = r
                .entries
                .iter()
                .map(|e| {
                    if e.optional {
                        format!("{}?: {}", e.name, e.ty)
                    } else {
                        format!("{}: {}", e.name, e.ty)
                    }
                })
                .collect();
            if r.open {
                parts.push("...".to_string());
            }
            format!("{{{}}}", parts.join(", "))
        }
        TypeAtom::Entity(e) => format!("{}{}", e.name, binds_suffix(&e.binds)),
        TypeAtom::Concept(c) => {
            let parts: Vec<String> = c.refs.iter().map(concept_ref_key).collect();
            parts.join("&")
        }
        TypeAtom::Function(f) => {
            let mut parts: Vec<String> = f
                .params
                .iter()
                .map(|p| {
                    if p.optional {
                        format!("{}?: {}", p.name, p.ty)
                    } else {
                        format!("{}: {}", p.name, p.ty)
                    }
                })
                .collect();
            if let Some(rest) = &f.rest {
                parts.push(format!("...{}", rest));
            }
            format!("fn({}) -> {}", parts.join(", "), f.result)
        }
    }
}

impl fmt::Display for ResolvedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.atoms().is_empty() {
            return write!(f, "#never");
        }
        let parts: Vec<String> = self.atoms().iter().map(atom_key).collect();
        write!(f, "{}", parts.join(" | "))
    }
}
