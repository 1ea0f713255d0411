//! The assembly: resolved name → declaration database and type oracle.
//!
//! The checker consumes the assembly through a narrow surface: type
//! normalization, the subtype relation, structural representations, OO
//! member lookup with root computation, template-bind resolution, and the
//! narrowing operators behind `is[T]`.
//!
//! Failures are message-only (`AsmResult`); the checker attaches error
//! kinds and source positions where it calls in.

pub mod decls;

use std::collections::BTreeMap;

use calyx_ast::TypeSignature;
use indexmap::IndexMap;

use crate::types::resolved::comparison;
use crate::types::{
    is_universal_method, names, ConceptAtom, ConceptRef, EntityAtom, FunctionAtom, FunctionParam,
    RecordAtom, RecordEntry, ResolvedType, TupleAtom, TupleEntry,
};
use crate::types::TypeAtom;

pub use decls::{
    ConstDecl, FieldDecl, FunctionDecl, GlobalDecl, NamespaceDecl, OOKind, OOTypeDecl, ParamDecl,
    RestParamDecl, TermDecl,
};

pub type AsmResult<T> = Result<T, String>;

pub type Binds = BTreeMap<String, ResolvedType>;

/// Kind selector for OO member lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
    Const,
    Static,
}

impl MemberKind {
    fn describe(self) -> &'static str {
        match self {
            Self::Field => "field",
            Self::Method => "method",
            Self::Const => "const",
            Self::Static => "static",
        }
    }
}

/// One resolution of a member name: the declaring type and the binds the
/// member's signatures must be normalized under.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberCandidate {
    pub owner: String,
    pub binds: Binds,
}

/// All resolutions of a member name over a union, plus the shared root
/// declaration when one exists. `root == None` with multiple candidates
/// is the ambiguous-inheritance case the checker must reject.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberLookup {
    pub candidates: Vec<MemberCandidate>,
    pub root: Option<MemberCandidate>,
}

/// The resolved declaration database.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub namespaces: IndexMap<String, NamespaceDecl>,
    pub object_decls: IndexMap<String, OOTypeDecl>,
}

impl Assembly {
    /// An assembly with the core declarations installed: the special
    /// concepts and primitive entities the checker recognizes by name.
    pub fn core() -> Self {
        let mut asm = Self::default();
        let span = calyx_ast::Span::synthetic();

        let some_sig = || vec![TypeSignature::nominal(names::SOME, span)];
        let keyed_sig = || vec![TypeSignature::nominal(names::KEYED, span)];

        for concept in [
            OOTypeDecl::concept(names::ANY),
            OOTypeDecl::concept(names::SOME),
            OOTypeDecl::concept(names::TUPLE).with_provides(some_sig()),
            OOTypeDecl::concept(names::RECORD).with_provides(some_sig()),
            OOTypeDecl::concept(names::OBJECT).with_provides(some_sig()),
            OOTypeDecl::concept(names::FUNCTION).with_provides(some_sig()),
            OOTypeDecl::concept(names::PARSABLE).with_provides(some_sig()),
            OOTypeDecl::concept(names::ENUM).with_provides(keyed_sig()),
            OOTypeDecl::concept(names::KEYED).with_provides(some_sig()),
        ] {
            asm.add_object_decl(concept.with_attribute("core"));
        }

        asm.add_object_decl(OOTypeDecl::entity(names::NONE).with_attribute("core"));
        for primitive in [names::BOOL, names::INT, names::STRING, names::GUID] {
            asm.add_object_decl(
                OOTypeDecl::entity(primitive)
                    .with_provides(keyed_sig())
                    .with_attribute("core"),
            );
        }

        asm.add_object_decl(
            OOTypeDecl::entity(names::STRING_OF)
                .with_terms(vec![TermDecl::bounded(
                    "T",
                    TypeSignature::nominal(names::PARSABLE, span),
                )])
                .with_provides(keyed_sig())
                .with_attribute("core"),
        );
        asm.add_object_decl(
            OOTypeDecl::entity(names::LIST)
                .with_terms(vec![TermDecl::unbounded("T")])
                .with_attribute("core")
                .with_attribute("collection"),
        );
        asm.add_object_decl(
            OOTypeDecl::entity(names::MAP)
                .with_terms(vec![
                    TermDecl {
                        name: "K".to_string(),
                        bound: Some(TypeSignature::nominal(names::KEYED, span)),
                        is_unique: true,
                    },
                    TermDecl::unbounded("V"),
                ])
                .with_attribute("core")
                .with_attribute("map"),
        );

        asm.ensure_namespace("Core");
        asm
    }

    // ==================== Registration ====================

    pub fn ensure_namespace(&mut self, name: &str) -> &mut NamespaceDecl {
        self.namespaces
            .entry(name.to_string())
            .or_insert_with(|| NamespaceDecl::new(name))
    }

    pub fn add_object_decl(&mut self, decl: OOTypeDecl) {
        self.object_decls.insert(decl.name.clone(), decl);
    }

    pub fn add_namespace_function(&mut self, ns: &str, decl: FunctionDecl) {
        self.ensure_namespace(ns)
            .functions
            .insert(decl.name.clone(), decl);
    }

    pub fn add_namespace_const(&mut self, ns: &str, decl: ConstDecl) {
        self.ensure_namespace(ns)
            .consts
            .insert(decl.name.clone(), decl);
    }

    pub fn add_namespace_global(&mut self, ns: &str, decl: GlobalDecl) {
        self.ensure_namespace(ns)
            .globals
            .insert(decl.name.clone(), decl);
    }

    pub fn has_namespace(&self, name: &str) -> bool {
        self.namespaces.contains_key(name)
    }

    pub fn get_namespace(&self, name: &str) -> Option<&NamespaceDecl> {
        self.namespaces.get(name)
    }

    pub fn object_decl(&self, name: &str) -> Option<&OOTypeDecl> {
        self.object_decls.get(name)
    }

    // ==================== Specials ====================

    pub fn none_type(&self) -> ResolvedType {
        ResolvedType::simple_entity(names::NONE)
    }

    pub fn bool_type(&self) -> ResolvedType {
        ResolvedType::simple_entity(names::BOOL)
    }

    pub fn int_type(&self) -> ResolvedType {
        ResolvedType::simple_entity(names::INT)
    }

    pub fn string_type(&self) -> ResolvedType {
        ResolvedType::simple_entity(names::STRING)
    }

    pub fn guid_type(&self) -> ResolvedType {
        ResolvedType::simple_entity(names::GUID)
    }

    pub fn any_type(&self) -> ResolvedType {
        ResolvedType::concept(names::ANY)
    }

    pub fn some_type(&self) -> ResolvedType {
        ResolvedType::concept(names::SOME)
    }

    pub fn tuple_concept_type(&self) -> ResolvedType {
        ResolvedType::concept(names::TUPLE)
    }

    pub fn record_concept_type(&self) -> ResolvedType {
        ResolvedType::concept(names::RECORD)
    }

    pub fn object_concept_type(&self) -> ResolvedType {
        ResolvedType::concept(names::OBJECT)
    }

    pub fn function_concept_type(&self) -> ResolvedType {
        ResolvedType::concept(names::FUNCTION)
    }

    pub fn parsable_concept_type(&self) -> ResolvedType {
        ResolvedType::concept(names::PARSABLE)
    }

    pub fn enum_concept_type(&self) -> ResolvedType {
        ResolvedType::concept(names::ENUM)
    }

    pub fn keyed_concept_type(&self) -> ResolvedType {
        ResolvedType::concept(names::KEYED)
    }

    /// `Bool | None`, the type every truthy position accepts.
    pub fn truthy_type(&self) -> ResolvedType {
        ResolvedType::union_of(&[self.bool_type(), self.none_type()])
    }

    // ==================== Normalization ====================

    /// Normalize a source signature under template binds.
    pub fn normalize_type(&self, sig: &TypeSignature, binds: &Binds) -> AsmResult<ResolvedType> {
        match sig {
            TypeSignature::Auto(_) => Err("Auto type is not allowed in this position".to_string()),
            TypeSignature::Nominal {
                name, term_args, ..
            } => {
                if term_args.is_empty() {
                    if let Some(bound) = binds.get(name) {
                        return Ok(bound.clone());
                    }
                }
                let decl = self
                    .object_decls
                    .get(name)
                    .ok_or_else(|| format!("Unknown type name '{}'", name))?;
                if term_args.len() != decl.terms.len() {
                    return Err(format!(
                        "Type '{}' expects {} template arguments, got {}",
                        name,
                        decl.terms.len(),
                        term_args.len()
                    ));
                }
                let mut new_binds = Binds::new();
                for (term, arg) in decl.terms.iter().zip(term_args.iter()) {
                    new_binds.insert(term.name.clone(), self.normalize_type(arg, binds)?);
                }
                self.validate_binds(&decl.terms, &new_binds)?;
                match decl.kind {
                    OOKind::Entity => Ok(ResolvedType::entity(EntityAtom {
                        name: name.clone(),
                        binds: new_binds,
                    })),
                    OOKind::Concept => Ok(ResolvedType::from_atom(TypeAtom::Concept(
                        ConceptAtom::single(ConceptRef {
                            name: name.clone(),
                            binds: new_binds,
                        }),
                    ))),
                }
            }
            TypeSignature::Tuple { entries, open, .. } => {
                let mut resolved = Vec::new();
                let mut seen_optional = false;
                for entry in entries {
                    if entry.optional {
                        seen_optional = true;
                    } else if seen_optional {
                        return Err(
                            "Required tuple entries may not follow optional entries".to_string()
                        );
                    }
                    resolved.push(TupleEntry {
                        ty: self.normalize_type(&entry.sig, binds)?,
                        optional: entry.optional,
                    });
                }
                Ok(ResolvedType::from_atom(TypeAtom::Tuple(TupleAtom {
                    entries: resolved,
                    open: *open,
                })))
            }
            TypeSignature::Record { entries, open, .. } => {
                let mut resolved = Vec::new();
                for entry in entries {
                    if is_universal_method(&entry.name) {
                        return Err(format!(
                            "Record property '{}' masks a universal method",
                            entry.name
                        ));
                    }
                    if resolved.iter().any(|e: &RecordEntry| e.name == entry.name) {
                        return Err(format!("Duplicate record property '{}'", entry.name));
                    }
                    resolved.push(RecordEntry {
                        name: entry.name.clone(),
                        ty: self.normalize_type(&entry.sig, binds)?,
                        optional: entry.optional,
                    });
                }
                Ok(ResolvedType::from_atom(TypeAtom::Record(RecordAtom::new(
                    resolved, *open,
                ))))
            }
            TypeSignature::Function {
                params,
                rest,
                result,
                ..
            } => Ok(ResolvedType::from_atom(TypeAtom::Function(
                self.normalize_function_sig(params, rest.as_deref(), result, binds)?,
            ))),
            TypeSignature::Union { options, .. } => {
                let mut parts = Vec::new();
                for option in options {
                    parts.push(self.normalize_type(option, binds)?);
                }
                Ok(ResolvedType::union_of(&parts))
            }
        }
    }

    /// Normalize a function signature, enforcing the parameter-order
    /// invariants: no required parameter after an optional one, and no
    /// optional parameters together with a rest parameter.
    pub fn normalize_function_sig(
        &self,
        params: &[calyx_ast::ParamSig],
        rest: Option<&TypeSignature>,
        result: &TypeSignature,
        binds: &Binds,
    ) -> AsmResult<FunctionAtom> {
        let mut resolved = Vec::new();
        let mut seen_optional = false;
        for param in params {
            if param.optional {
                seen_optional = true;
            } else if seen_optional {
                return Err("Required parameters may not follow optional parameters".to_string());
            }
            if resolved
                .iter()
                .any(|p: &FunctionParam| p.name == param.name)
            {
                return Err(format!("Duplicate parameter '{}'", param.name));
            }
            resolved.push(FunctionParam {
                name: param.name.clone(),
                ty: self.normalize_type(&param.sig, binds)?,
                optional: param.optional,
            });
        }
        let rest_ty = match rest {
            Some(sig) => {
                if seen_optional {
                    return Err(
                        "Optional parameters cannot be combined with a rest parameter".to_string()
                    );
                }
                let rt = self.normalize_type(sig, binds)?;
                if self.collection_element_type(&rt).is_none() {
                    return Err(format!(
                        "Rest parameter type '{}' is not a collection entity",
                        rt
                    ));
                }
                Some(Box::new(rt))
            }
            None => None,
        };
        Ok(FunctionAtom {
            params: resolved,
            rest: rest_ty,
            result: Box::new(self.normalize_type(result, binds)?),
        })
    }

    /// Validate template binds against bounds and uniqueness markers.
    pub fn validate_binds(&self, terms: &[TermDecl], binds: &Binds) -> AsmResult<()> {
        for term in terms {
            let bound_to = binds
                .get(&term.name)
                .ok_or_else(|| format!("Missing bind for template '{}'", term.name))?;
            if let Some(bound_sig) = &term.bound {
                let bound_rt = self.normalize_type(bound_sig, binds)?;
                if !self.subtype_of(bound_to, &bound_rt) {
                    return Err(format!(
                        "Bind '{}' for template '{}' does not satisfy bound '{}'",
                        bound_to, term.name, bound_rt
                    ));
                }
            }
            if term.is_unique {
                let keyed = bound_to
                    .as_unique_entity()
                    .map(|e| {
                        self.atom_provides(&TypeAtom::Entity(e.clone()), names::KEYED)
                    })
                    .unwrap_or(false);
                if !keyed {
                    return Err(format!(
                        "Template '{}' requires a unique keyed bind, got '{}'",
                        term.name, bound_to
                    ));
                }
            }
        }
        Ok(())
    }

    /// Bind a call's templates: declared terms zipped with resolved
    /// arguments, layered over the receiver and caller binds. `None` when
    /// the counts disagree or a bound/uniqueness check fails.
    pub fn resolve_binds_for_call(
        &self,
        terms: &[TermDecl],
        term_args: &[ResolvedType],
        receiver_binds: &Binds,
        caller_binds: &Binds,
    ) -> Option<Binds> {
        if terms.len() != term_args.len() {
            return None;
        }
        let mut binds = receiver_binds.clone();
        binds.extend(caller_binds.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (term, arg) in terms.iter().zip(term_args.iter()) {
            binds.insert(term.name.clone(), arg.clone());
        }
        self.validate_binds(terms, &binds).ok()?;
        Some(binds)
    }

    /// The resolved function atom of a function-like declaration.
    pub fn function_decl_atom(&self, decl: &FunctionDecl, binds: &Binds) -> AsmResult<FunctionAtom> {
        let params: Vec<calyx_ast::ParamSig> = decl
            .params
            .iter()
            .map(|p| calyx_ast::ParamSig {
                name: p.name.clone(),
                sig: p.sig.clone(),
                optional: p.optional,
            })
            .collect();
        self.normalize_function_sig(
            &params,
            decl.rest.as_ref().map(|r| &r.sig),
            &decl.result,
            binds,
        )
    }

    // ==================== Subtyping and unions ====================

    pub fn subtype_of(&self, a: &ResolvedType, b: &ResolvedType) -> bool {
        comparison::subtype(self, a, b)
    }

    pub fn type_union(&self, parts: &[ResolvedType]) -> ResolvedType {
        ResolvedType::union_of(parts)
    }

    /// The provides closure of one atom, as concept references. Entities
    /// implicitly provide Some (except None) and Object (except core
    /// primitives); every atom provides Any.
    pub fn provides_closure_of_atom(&self, atom: &TypeAtom) -> Vec<ConceptRef> {
        let mut out = Vec::new();
        match atom {
            TypeAtom::Tuple(_) => {
                push_ref(&mut out, ConceptRef::simple(names::TUPLE));
                push_ref(&mut out, ConceptRef::simple(names::SOME));
            }
            TypeAtom::Record(_) => {
                push_ref(&mut out, ConceptRef::simple(names::RECORD));
                push_ref(&mut out, ConceptRef::simple(names::SOME));
            }
            TypeAtom::Function(_) => {
                push_ref(&mut out, ConceptRef::simple(names::FUNCTION));
                push_ref(&mut out, ConceptRef::simple(names::SOME));
            }
            TypeAtom::Entity(e) => {
                self.declared_provides_closure(&e.name, &e.binds, &mut out);
                if e.name != names::NONE {
                    push_ref(&mut out, ConceptRef::simple(names::SOME));
                }
                let is_core = self
                    .object_decls
                    .get(&e.name)
                    .map(|d| d.has_attribute("core"))
                    .unwrap_or(false);
                if !is_core {
                    push_ref(&mut out, ConceptRef::simple(names::OBJECT));
                }
            }
            TypeAtom::Concept(c) => {
                for r in &c.refs {
                    push_ref(&mut out, r.clone());
                    self.declared_provides_closure(&r.name, &r.binds, &mut out);
                }
            }
        }
        push_ref(&mut out, ConceptRef::simple(names::ANY));
        out
    }

    fn declared_provides_closure(&self, name: &str, binds: &Binds, out: &mut Vec<ConceptRef>) {
        let Some(decl) = self.object_decls.get(name) else {
            return;
        };
        for sig in &decl.provides {
            let Ok(rt) = self.normalize_type(sig, binds) else {
                continue;
            };
            for atom in rt.atoms() {
                if let TypeAtom::Concept(c) = atom {
                    for r in &c.refs {
                        if !out.contains(r) {
                            out.push(r.clone());
                            self.declared_provides_closure(&r.name, &r.binds, out);
                        }
                    }
                }
            }
        }
    }

    fn atom_provides(&self, atom: &TypeAtom, concept: &str) -> bool {
        self.provides_closure_of_atom(atom)
            .iter()
            .any(|r| r.name == concept)
    }

    // ==================== Structural representations ====================

    /// View an atom as a tuple shape. Concept atoms covering only the
    /// Tuple family degrade to the fully-open empty tuple.
    pub fn tuple_representation(&self, atom: &TypeAtom) -> Option<TupleAtom> {
        match atom {
            TypeAtom::Tuple(t) => Some(t.clone()),
            TypeAtom::Concept(c)
                if c.refs.iter().any(|r| r.name == names::TUPLE)
                    && c.refs.iter().all(|r| {
                        matches!(r.name.as_str(), n if n == names::TUPLE || n == names::SOME || n == names::ANY)
                    }) =>
            {
                Some(TupleAtom {
                    entries: Vec::new(),
                    open: true,
                })
            }
            _ => None,
        }
    }

    /// View an atom as a record shape; dual of [`Self::tuple_representation`].
    pub fn record_representation(&self, atom: &TypeAtom) -> Option<RecordAtom> {
        match atom {
            TypeAtom::Record(r) => Some(r.clone()),
            TypeAtom::Concept(c)
                if c.refs.iter().any(|r| r.name == names::RECORD)
                    && c.refs.iter().all(|r| {
                        matches!(r.name.as_str(), n if n == names::RECORD || n == names::SOME || n == names::ANY)
                    }) =>
            {
                Some(RecordAtom {
                    entries: Vec::new(),
                    open: true,
                })
            }
            _ => None,
        }
    }

    /// Element type of a collection or map entity: `T` for collections,
    /// `[K, V]` for maps.
    pub fn collection_element_type(&self, t: &ResolvedType) -> Option<ResolvedType> {
        let entity = t.as_unique_entity()?;
        let decl = self.object_decls.get(&entity.name)?;
        if decl.is_collection() {
            entity.binds.get("T").cloned()
        } else if decl.is_map() {
            let k = entity.binds.get("K")?.clone();
            let v = entity.binds.get("V")?.clone();
            Some(ResolvedType::from_atom(TypeAtom::Tuple(TupleAtom::closed(
                vec![
                    TupleEntry {
                        ty: k,
                        optional: false,
                    },
                    TupleEntry {
                        ty: v,
                        optional: false,
                    },
                ],
            ))))
        } else {
            None
        }
    }

    // ==================== OO member lookup ====================

    fn decl_declares(&self, owner: &str, kind: MemberKind, name: &str) -> bool {
        let Some(decl) = self.object_decls.get(owner) else {
            return false;
        };
        match kind {
            MemberKind::Field => decl.field(name).is_some(),
            MemberKind::Method => decl.methods.contains_key(name),
            MemberKind::Const => decl.consts.contains_key(name),
            MemberKind::Static => decl.statics.contains_key(name),
        }
    }

    /// Direct provides references of a declaration, resolved under binds.
    fn direct_provides(&self, owner: &str, binds: &Binds) -> Vec<ConceptRef> {
        let mut refs = Vec::new();
        let Some(decl) = self.object_decls.get(owner) else {
            return refs;
        };
        for sig in &decl.provides {
            let Ok(rt) = self.normalize_type(sig, binds) else {
                continue;
            };
            for atom in rt.atoms() {
                if let TypeAtom::Concept(c) = atom {
                    for r in &c.refs {
                        push_ref(&mut refs, r.clone());
                    }
                }
            }
        }
        refs
    }

    /// Depth-first, left-to-right: the first declaration along each
    /// provides path that declares the member. Multiple distinct hits
    /// surface as multiple candidates (ambiguity).
    fn lookup_in_nominal(
        &self,
        owner: &str,
        binds: &Binds,
        kind: MemberKind,
        name: &str,
        out: &mut Vec<MemberCandidate>,
    ) {
        if self.decl_declares(owner, kind, name) {
            let candidate = MemberCandidate {
                owner: owner.to_string(),
                binds: binds.clone(),
            };
            if !out.contains(&candidate) {
                out.push(candidate);
            }
            return;
        }
        for parent in self.direct_provides(owner, binds) {
            self.lookup_in_nominal(&parent.name, &parent.binds, kind, name, out);
        }
    }

    fn lookup_member_in_atom(
        &self,
        atom: &TypeAtom,
        kind: MemberKind,
        name: &str,
    ) -> Vec<MemberCandidate> {
        let mut out = Vec::new();
        match atom {
            TypeAtom::Entity(e) => self.lookup_in_nominal(&e.name, &e.binds, kind, name, &mut out),
            TypeAtom::Concept(c) => {
                for r in &c.refs {
                    self.lookup_in_nominal(&r.name, &r.binds, kind, name, &mut out);
                }
            }
            TypeAtom::Tuple(_) | TypeAtom::Record(_) | TypeAtom::Function(_) => {}
        }
        out
    }

    /// Every declaration at or above `owner` that declares the member.
    fn declaring_decls_above(
        &self,
        owner: &str,
        binds: &Binds,
        kind: MemberKind,
        name: &str,
        out: &mut Vec<MemberCandidate>,
    ) {
        if self.decl_declares(owner, kind, name) {
            let candidate = MemberCandidate {
                owner: owner.to_string(),
                binds: binds.clone(),
            };
            if !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        for parent in self.direct_provides(owner, binds) {
            self.declaring_decls_above(&parent.name, &parent.binds, kind, name, out);
        }
    }

    fn reaches(&self, from: &str, from_binds: &Binds, target: &str) -> bool {
        let mut closure = Vec::new();
        self.declared_provides_closure(from, from_binds, &mut closure);
        closure.iter().any(|r| r.name == target)
    }

    /// All resolutions of a member name over a type, plus the shared root.
    ///
    /// The root is the unique base-most declaring declaration: the one
    /// member of the declaring set that reaches no other member through
    /// provides. Two unrelated declaring declarations leave `root = None`.
    pub fn try_get_oo_member_options(
        &self,
        t: &ResolvedType,
        kind: MemberKind,
        name: &str,
    ) -> MemberLookup {
        let mut candidates = Vec::new();
        let mut declaring = Vec::new();
        for atom in t.atoms() {
            for candidate in self.lookup_member_in_atom(atom, kind, name) {
                self.declaring_decls_above(&candidate.owner, &candidate.binds, kind, name, &mut declaring);
                if !candidates.contains(&candidate) {
                    candidates.push(candidate);
                }
            }
        }
        let roots: Vec<&MemberCandidate> = declaring
            .iter()
            .filter(|c| {
                !declaring
                    .iter()
                    .any(|other| other.owner != c.owner && self.reaches(&c.owner, &c.binds, &other.owner))
            })
            .collect();
        let root = match roots.as_slice() {
            [single] => Some((*single).clone()),
            _ => None,
        };
        MemberLookup { candidates, root }
    }

    /// The unique resolution of a member name: every atom resolves to the
    /// same single declaring declaration.
    pub fn try_get_oo_member_unique(
        &self,
        t: &ResolvedType,
        kind: MemberKind,
        name: &str,
    ) -> Option<MemberCandidate> {
        let mut unique: Option<MemberCandidate> = None;
        for atom in t.atoms() {
            let found = self.lookup_member_in_atom(atom, kind, name);
            match found.as_slice() {
                [candidate] => match &unique {
                    None => unique = Some(candidate.clone()),
                    Some(existing) if existing == candidate => {}
                    Some(_) => return None,
                },
                _ => return None,
            }
        }
        unique
    }

    /// Look up the declaration record behind a member candidate.
    pub fn member_function(
        &self,
        owner: &str,
        kind: MemberKind,
        name: &str,
    ) -> Option<&FunctionDecl> {
        let decl = self.object_decls.get(owner)?;
        match kind {
            MemberKind::Method => decl.methods.get(name),
            MemberKind::Static => decl.statics.get(name),
            _ => None,
        }
    }

    pub fn member_const(&self, owner: &str, name: &str) -> Option<&ConstDecl> {
        self.object_decls.get(owner)?.consts.get(name)
    }

    pub fn member_field(&self, owner: &str, name: &str) -> Option<&FieldDecl> {
        self.object_decls.get(owner)?.field(name)
    }

    /// All fields of a declaration, inherited and declared, keyed by name
    /// and sorted lexicographically. A more-derived redeclaration shadows
    /// the inherited one.
    pub fn get_all_oo_fields(
        &self,
        name: &str,
        binds: &Binds,
    ) -> AsmResult<Vec<(String, FieldDecl, Binds)>> {
        let mut map: BTreeMap<String, (String, FieldDecl, Binds)> = BTreeMap::new();
        self.collect_fields(name, binds, &mut map)?;
        Ok(map.into_values().collect())
    }

    fn collect_fields(
        &self,
        owner: &str,
        binds: &Binds,
        map: &mut BTreeMap<String, (String, FieldDecl, Binds)>,
    ) -> AsmResult<()> {
        let decl = self
            .object_decls
            .get(owner)
            .ok_or_else(|| format!("Unknown type name '{}'", owner))?;
        for field in &decl.fields {
            map.entry(field.name.clone())
                .or_insert_with(|| (owner.to_string(), field.clone(), binds.clone()));
        }
        for parent in self.direct_provides(owner, binds) {
            self.collect_fields(&parent.name, &parent.binds, map)?;
        }
        Ok(())
    }

    /// The declared type of a field that must resolve uniquely in `t`.
    pub fn field_type_unique(&self, t: &ResolvedType, name: &str) -> AsmResult<ResolvedType> {
        let lookup = self.try_get_oo_member_options(t, MemberKind::Field, name);
        match lookup.candidates.as_slice() {
            [] => Err(format!("Field '{}' is not defined on '{}'", name, t)),
            [candidate] => {
                let field = self
                    .member_field(&candidate.owner, name)
                    .ok_or_else(|| format!("Field '{}' is not defined on '{}'", name, t))?;
                self.normalize_type(&field.sig, &candidate.binds)
            }
            _ => Err(format!("Field '{}' is ambiguous on '{}'", name, t)),
        }
    }

    /// Sorted union of field names declared across a concept set and its
    /// provides closure.
    pub fn concept_field_names(&self, pattern: &ConceptAtom) -> AsmResult<Vec<String>> {
        let mut names_set = std::collections::BTreeSet::new();
        for r in &pattern.refs {
            let mut map = BTreeMap::new();
            self.collect_fields(&r.name, &r.binds, &mut map)?;
            names_set.extend(map.into_keys());
        }
        Ok(names_set.into_iter().collect())
    }

    /// Unify override signatures through the root's signature: every
    /// override must be usable wherever the root is.
    pub fn compute_unified_function_type(
        &self,
        sigs: &[FunctionAtom],
        root: &FunctionAtom,
    ) -> Option<FunctionAtom> {
        for sig in sigs {
            if !comparison::atom_subtype(
                self,
                &TypeAtom::Function(sig.clone()),
                &TypeAtom::Function(root.clone()),
            ) {
                return None;
            }
        }
        Some(root.clone())
    }

    // ==================== Narrowing ====================

    /// `restrictT`: the part of `t` that may be a `target`. Atoms of `t`
    /// below `target` survive; broader atoms are replaced by the `target`
    /// atoms they admit.
    pub fn restrict_to(&self, t: &ResolvedType, target: &ResolvedType) -> ResolvedType {
        let mut kept = Vec::new();
        for atom in t.atoms() {
            if target
                .atoms()
                .iter()
                .any(|tb| comparison::atom_subtype(self, atom, tb))
            {
                kept.push(atom.clone());
            }
        }
        for tb in target.atoms() {
            if t.atoms()
                .iter()
                .any(|atom| comparison::atom_subtype(self, tb, atom))
            {
                kept.push(tb.clone());
            }
        }
        ResolvedType::from_atoms(kept)
    }

    /// `restrictNotT`: the part of `t` that is definitely not a `target`.
    /// Atoms not below `target` survive; this is conservative for broad
    /// atoms, which stay in place.
    pub fn restrict_not(&self, t: &ResolvedType, target: &ResolvedType) -> ResolvedType {
        let kept: Vec<TypeAtom> = t
            .atoms()
            .iter()
            .filter(|atom| {
                !target
                    .atoms()
                    .iter()
                    .any(|tb| comparison::atom_subtype(self, atom, tb))
            })
            .cloned()
            .collect();
        ResolvedType::from_atoms(kept)
    }
}

fn push_ref(out: &mut Vec<ConceptRef>, r: ConceptRef) {
    if !out.contains(&r) {
        out.push(r);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calyx_ast::Span;

    fn span() -> Span {
        Span::synthetic()
    }

    // ── core subtyping ───────────────────────────────────────────────────

    #[test]
    fn test_primitives_are_some_and_any() {
        let asm = Assembly::core();
        assert!(asm.subtype_of(&asm.int_type(), &asm.some_type()));
        assert!(asm.subtype_of(&asm.int_type(), &asm.any_type()));
        assert!(!asm.subtype_of(&asm.int_type(), &asm.none_type()));
    }

    #[test]
    fn test_none_is_any_but_not_some() {
        let asm = Assembly::core();
        assert!(asm.subtype_of(&asm.none_type(), &asm.any_type()));
        assert!(!asm.subtype_of(&asm.none_type(), &asm.some_type()));
    }

    #[test]
    fn test_union_subtyping() {
        let asm = Assembly::core();
        let int_or_none = ResolvedType::union_of(&[asm.int_type(), asm.none_type()]);
        assert!(asm.subtype_of(&asm.int_type(), &int_or_none));
        assert!(asm.subtype_of(&int_or_none, &asm.any_type()));
        assert!(!asm.subtype_of(&int_or_none, &asm.int_type()));
    }

    #[test]
    fn test_user_entity_provides_chain() {
        let mut asm = Assembly::core();
        asm.add_object_decl(OOTypeDecl::concept("Animal"));
        asm.add_object_decl(
            OOTypeDecl::entity("Dog")
                .with_provides(vec![TypeSignature::nominal("Animal", span())]),
        );
        let dog = ResolvedType::simple_entity("Dog");
        assert!(asm.subtype_of(&dog, &ResolvedType::concept("Animal")));
        assert!(asm.subtype_of(&dog, &asm.object_concept_type()));
        assert!(asm.subtype_of(&dog, &asm.some_type()));
    }

    // ── normalization ────────────────────────────────────────────────────

    #[test]
    fn test_normalize_union_signature_dedupes() {
        let asm = Assembly::core();
        let sig = TypeSignature::Union {
            options: vec![
                TypeSignature::nominal(names::INT, span()),
                TypeSignature::nominal(names::INT, span()),
                TypeSignature::nominal(names::NONE, span()),
            ],
            span: span(),
        };
        let rt = asm.normalize_type(&sig, &Binds::new()).unwrap();
        assert_eq!(rt.atoms().len(), 2);
    }

    #[test]
    fn test_normalize_rejects_masking_record_property() {
        let asm = Assembly::core();
        let sig = TypeSignature::Record {
            entries: vec![calyx_ast::RecordEntrySig {
                name: "isNone".to_string(),
                sig: TypeSignature::nominal(names::INT, span()),
                optional: false,
            }],
            open: false,
            span: span(),
        };
        assert!(asm.normalize_type(&sig, &Binds::new()).is_err());
    }

    #[test]
    fn test_normalize_validates_template_bounds() {
        let asm = Assembly::core();
        // StringOf<Int> fails: Int does not provide Parsable.
        let sig = TypeSignature::Nominal {
            name: names::STRING_OF.to_string(),
            term_args: vec![TypeSignature::nominal(names::INT, span())],
            span: span(),
        };
        assert!(asm.normalize_type(&sig, &Binds::new()).is_err());
    }

    #[test]
    fn test_map_key_must_be_unique_keyed() {
        let asm = Assembly::core();
        let good = TypeSignature::Nominal {
            name: names::MAP.to_string(),
            term_args: vec![
                TypeSignature::nominal(names::INT, span()),
                TypeSignature::nominal(names::BOOL, span()),
            ],
            span: span(),
        };
        assert!(asm.normalize_type(&good, &Binds::new()).is_ok());

        let bad = TypeSignature::Nominal {
            name: names::MAP.to_string(),
            term_args: vec![
                TypeSignature::Union {
                    options: vec![
                        TypeSignature::nominal(names::INT, span()),
                        TypeSignature::nominal(names::STRING, span()),
                    ],
                    span: span(),
                },
                TypeSignature::nominal(names::BOOL, span()),
            ],
            span: span(),
        };
        assert!(asm.normalize_type(&bad, &Binds::new()).is_err());
    }

    #[test]
    fn test_function_sig_rejects_optional_then_required() {
        let asm = Assembly::core();
        let params = vec![
            calyx_ast::ParamSig {
                name: "a".to_string(),
                sig: TypeSignature::nominal(names::INT, span()),
                optional: true,
            },
            calyx_ast::ParamSig {
                name: "b".to_string(),
                sig: TypeSignature::nominal(names::INT, span()),
                optional: false,
            },
        ];
        let result = TypeSignature::nominal(names::INT, span());
        assert!(asm
            .normalize_function_sig(&params, None, &result, &Binds::new())
            .is_err());
    }

    // ── member lookup ────────────────────────────────────────────────────

    #[test]
    fn test_member_root_unifies_single_chain() {
        let mut asm = Assembly::core();
        let mut base = OOTypeDecl::concept("Shape");
        base.methods.insert(
            "area".to_string(),
            FunctionDecl::new("area", vec![], TypeSignature::nominal(names::INT, span())),
        );
        asm.add_object_decl(base);
        let mut circle = OOTypeDecl::entity("Circle")
            .with_provides(vec![TypeSignature::nominal("Shape", span())]);
        circle.methods.insert(
            "area".to_string(),
            FunctionDecl::new("area", vec![], TypeSignature::nominal(names::INT, span())),
        );
        asm.add_object_decl(circle);

        let t = ResolvedType::simple_entity("Circle");
        let lookup = asm.try_get_oo_member_options(&t, MemberKind::Method, "area");
        assert_eq!(lookup.candidates.len(), 1);
        assert_eq!(lookup.candidates[0].owner, "Circle");
        assert_eq!(lookup.root.as_ref().unwrap().owner, "Shape");
    }

    #[test]
    fn test_member_two_unrelated_decls_have_no_root() {
        let mut asm = Assembly::core();
        for concept in ["Reader", "Writer"] {
            let mut decl = OOTypeDecl::concept(concept);
            decl.methods.insert(
                "close".to_string(),
                FunctionDecl::new("close", vec![], TypeSignature::nominal(names::BOOL, span())),
            );
            asm.add_object_decl(decl);
        }
        asm.add_object_decl(OOTypeDecl::entity("File").with_provides(vec![
            TypeSignature::nominal("Reader", span()),
            TypeSignature::nominal("Writer", span()),
        ]));

        let t = ResolvedType::simple_entity("File");
        let lookup = asm.try_get_oo_member_options(&t, MemberKind::Method, "close");
        assert_eq!(lookup.candidates.len(), 2);
        assert!(lookup.root.is_none());
    }

    #[test]
    fn test_get_all_oo_fields_sorted_and_inherited() {
        let mut asm = Assembly::core();
        asm.add_object_decl(
            OOTypeDecl::concept("Named").with_fields(vec![FieldDecl::required(
                "name",
                TypeSignature::nominal(names::STRING, span()),
            )]),
        );
        asm.add_object_decl(
            OOTypeDecl::entity("City")
                .with_provides(vec![TypeSignature::nominal("Named", span())])
                .with_fields(vec![FieldDecl::required(
                    "area",
                    TypeSignature::nominal(names::INT, span()),
                )]),
        );
        let fields = asm.get_all_oo_fields("City", &Binds::new()).unwrap();
        let field_names: Vec<&str> = fields.iter().map(|(_, f, _)| f.name.as_str()).collect();
        assert_eq!(field_names, vec!["area", "name"]);
    }

    // ── narrowing ────────────────────────────────────────────────────────

    #[test]
    fn test_restrict_to_and_not_partition_union() {
        let asm = Assembly::core();
        let t = ResolvedType::union_of(&[asm.int_type(), asm.string_type()]);
        assert_eq!(asm.restrict_to(&t, &asm.int_type()), asm.int_type());
        assert_eq!(asm.restrict_not(&t, &asm.int_type()), asm.string_type());
    }

    #[test]
    fn test_restrict_any_to_int_yields_int() {
        let asm = Assembly::core();
        let narrowed = asm.restrict_to(&asm.any_type(), &asm.int_type());
        assert_eq!(narrowed, asm.int_type());
    }
}
