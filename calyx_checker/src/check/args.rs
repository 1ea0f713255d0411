//! Argument evaluation and the two-phase argument resolver.
//!
//! Phase one binds named arguments and record spreads to their slots;
//! phase two walks positional arguments and tuple spreads through a
//! parameter cursor. Unfilled slots complete through declared defaults or
//! None; trailing positional arguments pack into a declared rest
//! collection. Entity construction reuses the same binder over the sorted
//! field list; collection construction has its own element-typed path.

use calyx_ast::{Arg, Span};

use crate::assembly::{Binds, FunctionDecl};
use crate::error::{CheckErrorKind, CheckResult};
use crate::ir::core::{Op, Register};
use crate::ir::program;
use crate::types::{structural, FunctionAtom, ResolvedType};

use super::env::{join_flows, TypeEnv};
use super::Checker;

/// A call-site argument after evaluation: its register, its type, and the
/// binding mode it arrived with.
#[derive(Debug, Clone)]
pub(crate) struct EvaluatedArg {
    pub name: Option<String>,
    pub is_spread: bool,
    pub reg: Register,
    pub ty: ResolvedType,
    pub span: Span,
}

/// One bindable slot: a declared parameter or entity field.
#[derive(Debug, Clone)]
pub(crate) struct BindSlot {
    pub name: String,
    pub ty: ResolvedType,
    pub optional: bool,
    pub default_key: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct SlotFill {
    reg: Register,
}

impl Checker<'_> {
    /// Evaluate call-site arguments left to right, threading the joined
    /// environment. `hints` supplies contextual types for the leading
    /// positional arguments (signature bias).
    pub(crate) fn eval_args(
        &mut self,
        env: &TypeEnv,
        args: &[Arg],
        hints: &[Option<ResolvedType>],
    ) -> CheckResult<(Vec<EvaluatedArg>, TypeEnv)> {
        let mut cur = env.clone();
        let mut out = Vec::with_capacity(args.len());
        let mut positional = 0usize;
        for arg in args {
            let hint = if arg.name.is_none() && !arg.is_spread {
                let h = hints.get(positional).cloned().flatten();
                positional += 1;
                h
            } else {
                None
            };
            let (reg, flows) = self.check_expr(&cur, &arg.expr, hint.as_ref())?;
            let joined = join_flows(&flows);
            out.push(EvaluatedArg {
                name: arg.name.clone(),
                is_spread: arg.is_spread,
                reg,
                ty: joined.result_ty(),
                span: arg.span,
            });
            cur = joined;
        }
        Ok((out, cur))
    }

    /// Slots for a function-like target: resolved parameter types zipped
    /// with the declaration's defaults, keyed under the bind-free
    /// declaration key.
    pub(crate) fn slots_for_function(
        &self,
        atom: &FunctionAtom,
        decl: Option<&FunctionDecl>,
        base_key: &str,
    ) -> Vec<BindSlot> {
        atom.params
            .iter()
            .map(|p| {
                let has_default = decl
                    .and_then(|d| d.params.iter().find(|dp| dp.name == p.name))
                    .map(|dp| dp.default.is_some())
                    .unwrap_or(false);
                BindSlot {
                    name: p.name.clone(),
                    ty: p.ty.clone(),
                    optional: p.optional,
                    default_key: has_default
                        .then(|| program::default_value_key(base_key, &p.name)),
                }
            })
            .collect()
    }

    fn structural_fail<T>(&self, span: Span, msg: String) -> CheckResult<T> {
        let kind = if msg.contains("ambiguous") {
            CheckErrorKind::AmbiguousField
        } else {
            CheckErrorKind::TypeMismatch
        };
        self.fail(kind, span, msg)
    }

    /// Bind evaluated arguments to slots under the positional / named /
    /// spread / optional / rest rules. Returns the registers in slot
    /// order, with the packed rest collection appended when declared.
    /// `slot_kind` selects the diagnostic wording ("argument" / "field").
    pub(crate) fn resolve_call_args(
        &mut self,
        slots: &[BindSlot],
        rest: Option<&ResolvedType>,
        evaluated: &[EvaluatedArg],
        span: Span,
        slot_kind: &str,
    ) -> CheckResult<Vec<Register>> {
        let asm = self.asm;
        let none_ty = asm.none_type();
        let mut filled: Vec<Option<SlotFill>> = vec![None; slots.len()];

        // ---- Phase 1: named arguments and record spreads ----
        for arg in evaluated {
            if let Some(name) = &arg.name {
                let idx = slots.iter().position(|s| &s.name == name).ok_or_else(|| {
                    self.raise(
                        CheckErrorKind::UnknownName,
                        arg.span,
                        format!("Unknown {} '{}'", slot_kind, name),
                    )
                })?;
                if filled[idx].is_some() {
                    return self.fail(
                        CheckErrorKind::DuplicateName,
                        arg.span,
                        format!("{} '{}' is bound more than once", slot_kind, name),
                    );
                }
                if !asm.subtype_of(&arg.ty, &slots[idx].ty) {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        arg.span,
                        format!(
                            "Type '{}' is not a subtype of {} type '{}'",
                            arg.ty, slot_kind, slots[idx].ty
                        ),
                    );
                }
                filled[idx] = Some(SlotFill { reg: arg.reg });
            } else if arg.is_spread {
                let rinfo = structural::record_expando(asm, &arg.ty);
                if !rinfo.ok {
                    continue; // tuple and container spreads bind in phase 2
                }
                for name in &rinfo.all {
                    let idx = slots.iter().position(|s| &s.name == name).ok_or_else(|| {
                        self.raise(
                            CheckErrorKind::UnknownName,
                            arg.span,
                            format!("Unknown {} '{}' from record expansion", slot_kind, name),
                        )
                    })?;
                    if filled[idx].is_some() {
                        return self.fail(
                            CheckErrorKind::DuplicateName,
                            arg.span,
                            format!("{} '{}' is bound more than once", slot_kind, name),
                        );
                    }
                    let must_def = rinfo.required.contains(name);
                    if !must_def && !slots[idx].optional && slots[idx].default_key.is_none() {
                        return self.fail(
                            CheckErrorKind::MissingRequired,
                            arg.span,
                            format!("Required {} '{}' may be absent in expansion", slot_kind, name),
                        );
                    }
                    let loaded_ty = match structural::load_from_name(asm, &arg.ty, name) {
                        Ok(t) => t,
                        Err(msg) => return self.structural_fail(arg.span, msg),
                    };
                    let target = if must_def {
                        slots[idx].ty.clone()
                    } else {
                        ResolvedType::union_of(&[slots[idx].ty.clone(), none_ty.clone()])
                    };
                    if !asm.subtype_of(&loaded_ty, &target) {
                        return self.fail(
                            CheckErrorKind::TypeMismatch,
                            arg.span,
                            format!(
                                "Type '{}' is not a subtype of {} type '{}'",
                                loaded_ty, slot_kind, slots[idx].ty
                            ),
                        );
                    }
                    let trgt = self.emitter.generate_tmp_register();
                    self.emitter.emit(Op::LoadProperty {
                        trgt,
                        arg: arg.reg,
                        name: name.clone(),
                    });
                    filled[idx] = Some(SlotFill { reg: trgt });
                }
            }
        }

        // ---- Phase 2: positional arguments and tuple spreads ----
        let mut cursor = 0usize;
        let mut rest_items: Vec<(bool, Register, ResolvedType, Span)> = Vec::new();

        let mut bind_positional = |chk: &mut Self,
                                   cursor: &mut usize,
                                   rest_items: &mut Vec<(bool, Register, ResolvedType, Span)>,
                                   reg: Register,
                                   ty: ResolvedType,
                                   must_def: bool,
                                   filled: &mut Vec<Option<SlotFill>>,
                                   arg_span: Span|
         -> CheckResult<()> {
            while *cursor < slots.len() && filled[*cursor].is_some() {
                if slots[*cursor].optional {
                    return chk.fail(
                        CheckErrorKind::AmbiguousCall,
                        arg_span,
                        format!(
                            "Positional placement across the already-bound optional {} '{}' is ambiguous",
                            slot_kind, slots[*cursor].name
                        ),
                    );
                }
                *cursor += 1;
            }
            if *cursor < slots.len() {
                let slot = &slots[*cursor];
                if !must_def && !slot.optional && slot.default_key.is_none() {
                    return chk.fail(
                        CheckErrorKind::MissingRequired,
                        arg_span,
                        format!("Required {} '{}' may be absent in expansion", slot_kind, slot.name),
                    );
                }
                let target = if must_def {
                    slot.ty.clone()
                } else {
                    ResolvedType::union_of(&[slot.ty.clone(), none_ty.clone()])
                };
                if !chk.asm.subtype_of(&ty, &target) {
                    return chk.fail(
                        CheckErrorKind::TypeMismatch,
                        arg_span,
                        format!(
                            "Type '{}' is not a subtype of {} type '{}'",
                            ty, slot_kind, slot.ty
                        ),
                    );
                }
                filled[*cursor] = Some(SlotFill { reg });
                *cursor += 1;
                Ok(())
            } else if rest.is_some() {
                rest_items.push((false, reg, ty, arg_span));
                Ok(())
            } else {
                chk.fail(
                    CheckErrorKind::TypeMismatch,
                    arg_span,
                    "Too many positional arguments",
                )
            }
        };

        for arg in evaluated {
            if arg.name.is_some() {
                continue;
            }
            if !arg.is_spread {
                bind_positional(
                    self,
                    &mut cursor,
                    &mut rest_items,
                    arg.reg,
                    arg.ty.clone(),
                    true,
                    &mut filled,
                    arg.span,
                )?;
                continue;
            }
            if structural::record_expando(asm, &arg.ty).ok {
                continue; // bound in phase 1
            }
            let tinfo = structural::tuple_expando(asm, &arg.ty);
            if tinfo.ok {
                for i in 0..tinfo.max_len {
                    let loaded_ty = match structural::load_from_index(asm, &arg.ty, i) {
                        Ok(t) => t,
                        Err(msg) => return self.structural_fail(arg.span, msg),
                    };
                    let trgt = self.emitter.generate_tmp_register();
                    self.emitter.emit(Op::LoadTupleIndex {
                        trgt,
                        arg: arg.reg,
                        index: i,
                    });
                    bind_positional(
                        self,
                        &mut cursor,
                        &mut rest_items,
                        trgt,
                        loaded_ty,
                        i < tinfo.req_len,
                        &mut filled,
                        arg.span,
                    )?;
                }
            } else if rest.is_some() && asm.collection_element_type(&arg.ty).is_some() {
                rest_items.push((true, arg.reg, arg.ty.clone(), arg.span));
            } else {
                return self.fail(
                    CheckErrorKind::UnsupportedOp,
                    arg.span,
                    format!("Cannot expand a value of type '{}'", arg.ty),
                );
            }
        }

        // ---- Optional / default completion ----
        let mut out = Vec::with_capacity(slots.len() + 1);
        for (idx, slot) in slots.iter().enumerate() {
            match &filled[idx] {
                Some(fill) => out.push(fill.reg),
                None => {
                    if let Some(key) = &slot.default_key {
                        let trgt = self.emitter.generate_tmp_register();
                        self.emitter.emit(Op::LoadDefaultValue {
                            trgt,
                            key: key.clone(),
                        });
                        out.push(trgt);
                    } else if slot.optional {
                        let trgt = self.emitter.generate_tmp_register();
                        self.emitter.emit(Op::LoadConstNone { trgt });
                        out.push(trgt);
                    } else {
                        return self.fail(
                            CheckErrorKind::MissingRequired,
                            span,
                            format!("Missing required {} '{}'", slot_kind, slot.name),
                        );
                    }
                }
            }
        }

        // ---- Rest packing ----
        if let Some(rest_ty) = rest {
            let reg = self.construct_collection_items(rest_ty, &rest_items, span)?;
            out.push(reg);
        }
        Ok(out)
    }

    /// Collection/map constructor: all arguments unnamed; non-spread
    /// arguments conform to the element type, spread arguments are
    /// containers whose element type conforms.
    pub(crate) fn construct_collection(
        &mut self,
        coll_ty: &ResolvedType,
        evaluated: &[EvaluatedArg],
        span: Span,
    ) -> CheckResult<Register> {
        let mut items = Vec::with_capacity(evaluated.len());
        for arg in evaluated {
            if arg.name.is_some() {
                return self.fail(
                    CheckErrorKind::UnsupportedOp,
                    arg.span,
                    "Collection constructors do not take named arguments",
                );
            }
            items.push((arg.is_spread, arg.reg, arg.ty.clone(), arg.span));
        }
        self.construct_collection_items(coll_ty, &items, span)
    }

    fn construct_collection_items(
        &mut self,
        coll_ty: &ResolvedType,
        items: &[(bool, Register, ResolvedType, Span)],
        span: Span,
    ) -> CheckResult<Register> {
        let asm = self.asm;
        let elem_ty = asm.collection_element_type(coll_ty).ok_or_else(|| {
            self.raise(
                CheckErrorKind::TypeMismatch,
                span,
                format!("Type '{}' is not a collection entity", coll_ty),
            )
        })?;
        for (is_copy, _, ty, item_span) in items {
            if *is_copy {
                let src_elem = asm.collection_element_type(ty).ok_or_else(|| {
                    self.raise(
                        CheckErrorKind::TypeMismatch,
                        *item_span,
                        format!("Cannot spread a value of type '{}' into a collection", ty),
                    )
                })?;
                if !asm.subtype_of(&src_elem, &elem_ty) {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        *item_span,
                        format!(
                            "Element type '{}' is not a subtype of '{}'",
                            src_elem, elem_ty
                        ),
                    );
                }
            } else if !asm.subtype_of(ty, &elem_ty) {
                return self.fail(
                    CheckErrorKind::TypeMismatch,
                    *item_span,
                    format!("Type '{}' is not a subtype of element type '{}'", ty, elem_ty),
                );
            }
        }

        let tkey = self.ir.register_type_instantiation(coll_ty);
        let trgt = self.emitter.generate_tmp_register();
        let any_copy = items.iter().any(|(c, ..)| *c);
        let all_copy = items.iter().all(|(c, ..)| *c);
        if items.is_empty() {
            self.emitter
                .emit(Op::ConstructPrimaryCollectionEmpty { trgt, tkey });
        } else if !any_copy {
            self.emitter.emit(Op::ConstructPrimaryCollectionSingletons {
                trgt,
                tkey,
                args: items.iter().map(|(_, r, ..)| *r).collect(),
            });
        } else if all_copy {
            self.emitter.emit(Op::ConstructPrimaryCollectionCopies {
                trgt,
                tkey,
                args: items.iter().map(|(_, r, ..)| *r).collect(),
            });
        } else {
            self.emitter.emit(Op::ConstructPrimaryCollectionMixed {
                trgt,
                tkey,
                args: items.iter().map(|(c, r, ..)| (*c, *r)).collect(),
            });
        }
        Ok(trgt)
    }

    /// Entity constructor binding: the sorted field list becomes the slot
    /// list, with declared field defaults as completion.
    pub(crate) fn bind_entity_fields(
        &mut self,
        entity_ty: &ResolvedType,
        owner_name: &str,
        owner_binds: &Binds,
        evaluated: &[EvaluatedArg],
        span: Span,
    ) -> CheckResult<Register> {
        let fields = match self.asm.get_all_oo_fields(owner_name, owner_binds) {
            Ok(f) => f,
            Err(msg) => return self.structural_fail(span, msg),
        };
        let mut slots = Vec::with_capacity(fields.len());
        for (field_owner, field, field_binds) in &fields {
            let ty = self.normalize(&field.sig, field_binds, field.span)?;
            slots.push(BindSlot {
                name: field.name.clone(),
                ty,
                optional: false,
                default_key: field
                    .default
                    .as_ref()
                    .map(|_| program::default_value_key(field_owner, &field.name)),
            });
        }
        let args = self.resolve_call_args(&slots, None, evaluated, span, "field")?;
        let tkey = self.ir.register_type_instantiation(entity_ty);
        let trgt = self.emitter.generate_tmp_register();
        self.emitter.emit(Op::ConstructPrimary { trgt, tkey, args });
        Ok(trgt)
    }
}
