//! The postfix chain engine.
//!
//! A chain `root op1 op2 ...` threads a current register and multi-flow
//! through each operator. Elvis (`?.`) operators split the flow into Some
//! and None sides, jump the None side to a shared none-block, and continue
//! on the Some side; the none-block loads None into the final target and
//! joins the done-block. The universal `is` family narrows a plain
//! variable root.

use calyx_ast::{Arg, Expr, PostfixOp, PostfixOpKind, Span, TypeSignature};

use crate::assembly::{Binds, MemberKind};
use crate::error::{CheckErrorKind, CheckResult};
use crate::ir::core::{Op, Register};
use crate::ir::program;
use crate::types::{
    is_universal_method, structural, ResolvedType, TupleAtom, TupleEntry, TypeAtom,
};
use crate::types::{RecordAtom, RecordEntry};

use super::super::env::{join_flows, split_none, FlowTruth, Flows, TypeEnv};
use super::super::Checker;

impl Checker<'_> {
    pub(crate) fn check_postfix(
        &mut self,
        env: &TypeEnv,
        root: &Expr,
        ops: &[PostfixOp],
        _span: Span,
    ) -> CheckResult<(Register, Flows)> {
        let root_var = root.as_variable_name().map(str::to_string);
        let (mut cur_reg, mut cur_flows) = self.check_expr(env, root, None)?;

        let has_elvis = ops.iter().any(|op| op.is_elvis);
        let (none_block, done_block) = if has_elvis {
            (
                Some(self.emitter.create_new_block("pfxnone")),
                Some(self.emitter.create_new_block("pfxdone")),
            )
        } else {
            (None, None)
        };
        let final_trgt = has_elvis.then(|| self.emitter.generate_tmp_register());
        let mut short_circuited: Flows = Vec::new();

        for (i, op) in ops.iter().enumerate() {
            let narrow_var = (i == 0).then_some(root_var.as_deref()).flatten();
            if op.is_elvis {
                let (some_flows, none_flows) = split_none(self.asm, &cur_flows, narrow_var);
                if none_flows.is_empty() {
                    return self.fail(
                        CheckErrorKind::RedundantNullCheck,
                        op.span,
                        "None value is not possible",
                    );
                }
                if some_flows.is_empty() {
                    return self.fail(
                        CheckErrorKind::RedundantNullCheck,
                        op.span,
                        "Value is always none",
                    );
                }
                let some_block = self.emitter.create_new_block("pfxsome");
                self.emitter.emit_none_jump(
                    cur_reg,
                    none_block.as_deref().expect("elvis chain has a none block"),
                    &some_block,
                );
                self.emitter.set_active_block(&some_block);
                short_circuited.extend(none_flows);
                cur_flows = some_flows;
            }
            let (reg, flows) = self.check_postfix_op(&cur_flows, cur_reg, op, narrow_var)?;
            cur_reg = reg;
            cur_flows = flows;
        }

        if has_elvis {
            let done = done_block.expect("elvis chain has a done block");
            let nb = none_block.expect("elvis chain has a none block");
            let ft = final_trgt.expect("elvis chain has a final target");
            self.emitter.emit(Op::RegAssign {
                trgt: ft,
                src: cur_reg,
            });
            self.emitter.emit(Op::DirectJump {
                target: done.clone(),
            });
            self.emitter.set_active_block(&nb);
            self.emitter.emit(Op::LoadConstNone { trgt: ft });
            self.emitter.emit(Op::DirectJump {
                target: done.clone(),
            });
            self.emitter.set_active_block(&done);

            let none_ty = self.asm.none_type();
            let mut flows = cur_flows;
            flows.extend(
                short_circuited
                    .iter()
                    .map(|f| f.with_result(none_ty.clone(), FlowTruth::False)),
            );
            Ok((ft, flows))
        } else {
            Ok((cur_reg, cur_flows))
        }
    }

    fn check_postfix_op(
        &mut self,
        flows: &Flows,
        reg: Register,
        op: &PostfixOp,
        narrow_var: Option<&str>,
    ) -> CheckResult<(Register, Flows)> {
        let joined = join_flows(flows);
        let cur_ty = joined.result_ty();
        let span = op.span;
        match &op.kind {
            PostfixOpKind::AccessIndex(index) => {
                let ty = match structural::load_from_index(self.asm, &cur_ty, *index) {
                    Ok(t) => t,
                    Err(msg) => return self.fail(CheckErrorKind::TypeMismatch, span, msg),
                };
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::LoadTupleIndex {
                    trgt,
                    arg: reg,
                    index: *index,
                });
                Ok((trgt, vec![joined.with_result_unknown(ty)]))
            }
            PostfixOpKind::AccessName(name) => {
                let (trgt, ty) = self.load_name_value(&joined, reg, name, span)?;
                Ok((trgt, vec![joined.with_result_unknown(ty)]))
            }
            PostfixOpKind::ProjectIndices(indices) => {
                let mut entries = Vec::with_capacity(indices.len());
                for index in indices {
                    let ty = match structural::load_from_index(self.asm, &cur_ty, *index) {
                        Ok(t) => t,
                        Err(msg) => return self.fail(CheckErrorKind::TypeMismatch, span, msg),
                    };
                    entries.push(TupleEntry {
                        ty,
                        optional: false,
                    });
                }
                let result = ResolvedType::from_atom(TypeAtom::Tuple(TupleAtom::closed(entries)));
                self.ir.register_resolved_type_reference(&result);
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::ProjectTupleIndices {
                    trgt,
                    arg: reg,
                    indices: indices.clone(),
                });
                Ok((trgt, vec![joined.with_result_unknown(result)]))
            }
            PostfixOpKind::ProjectNames(prop_names) => {
                let mut entries = Vec::with_capacity(prop_names.len());
                for name in prop_names {
                    let ty = match structural::load_from_name(self.asm, &cur_ty, name) {
                        Ok(t) => t,
                        Err(msg) => return self.fail(CheckErrorKind::TypeMismatch, span, msg),
                    };
                    entries.push(RecordEntry {
                        name: name.clone(),
                        ty,
                        optional: false,
                    });
                }
                let result =
                    ResolvedType::from_atom(TypeAtom::Record(RecordAtom::new(entries, false)));
                self.ir.register_resolved_type_reference(&result);
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::ProjectRecordNames {
                    trgt,
                    arg: reg,
                    names: prop_names.clone(),
                });
                Ok((trgt, vec![joined.with_result_unknown(result)]))
            }
            PostfixOpKind::ProjectType(sig) => {
                let pattern = self.normalize_in_env(sig, &joined, span)?;
                let projected = match pattern.try_unique_atom() {
                    Some(TypeAtom::Tuple(t)) => {
                        structural::project_tuple_pattern(self.asm, &cur_ty, t)
                    }
                    Some(TypeAtom::Record(r)) => {
                        structural::project_record_pattern(self.asm, &cur_ty, r)
                    }
                    Some(TypeAtom::Concept(c)) => {
                        structural::project_concept_pattern(self.asm, &cur_ty, c)
                    }
                    _ => {
                        return self.fail(
                            CheckErrorKind::UnsupportedOp,
                            span,
                            format!("Cannot project through type '{}'", pattern),
                        )
                    }
                };
                let result = match projected {
                    Ok(t) => t,
                    Err(msg) => {
                        let kind = if msg.contains("ambiguous") {
                            CheckErrorKind::AmbiguousField
                        } else {
                            CheckErrorKind::TypeMismatch
                        };
                        return self.fail(kind, span, msg);
                    }
                };
                self.ir.register_resolved_type_reference(&result);
                let tkey = self.ir.register_resolved_type_reference(&pattern);
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::ProjectFromType {
                    trgt,
                    arg: reg,
                    tkey,
                });
                Ok((trgt, vec![joined.with_result_unknown(result)]))
            }
            PostfixOpKind::ModifyIndices(updates) => {
                let mut cur = joined;
                let mut update_regs = Vec::with_capacity(updates.len());
                let mut update_tys = Vec::with_capacity(updates.len());
                for (index, value) in updates {
                    let (vreg, next) = self.check_expr_joined(&cur, value, None)?;
                    update_tys.push((*index, next.result_ty()));
                    update_regs.push((*index, vreg));
                    cur = next;
                }
                let result = match structural::update_tuple(self.asm, &cur_ty, &update_tys) {
                    Ok(t) => t,
                    Err(msg) => return self.fail(CheckErrorKind::TypeMismatch, span, msg),
                };
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::ModifyWithIndices {
                    trgt,
                    arg: reg,
                    updates: update_regs,
                });
                Ok((trgt, vec![cur.with_result_unknown(result)]))
            }
            PostfixOpKind::ModifyNames(updates) => {
                let mut cur = joined;
                let mut update_regs = Vec::with_capacity(updates.len());
                let mut update_tys = Vec::with_capacity(updates.len());
                for (name, value) in updates {
                    let (vreg, next) = self.check_expr_joined(&cur, value, None)?;
                    update_tys.push((name.clone(), next.result_ty()));
                    update_regs.push((name.clone(), vreg));
                    cur = next;
                }
                let result = match structural::update_record(self.asm, &cur_ty, &update_tys) {
                    Ok(t) => t,
                    Err(msg) => return self.fail(CheckErrorKind::TypeMismatch, span, msg),
                };
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::ModifyWithNames {
                    trgt,
                    arg: reg,
                    updates: update_regs,
                });
                Ok((trgt, vec![cur.with_result_unknown(result)]))
            }
            PostfixOpKind::Extend(ext) => {
                let (ereg, eenv) = self.check_expr_joined(&joined, ext, None)?;
                let ety = eenv.result_ty();
                let asm = self.asm;
                let base_tuple = cur_ty
                    .atoms()
                    .iter()
                    .all(|a| asm.tuple_representation(a).is_some());
                let base_record = cur_ty
                    .atoms()
                    .iter()
                    .all(|a| asm.record_representation(a).is_some());
                let base_nominal = cur_ty
                    .atoms()
                    .iter()
                    .all(|a| matches!(a, TypeAtom::Entity(_) | TypeAtom::Concept(_)));

                enum ExtendKind {
                    Tuple,
                    Record,
                    Object,
                }
                let (computed, kind) = if base_tuple {
                    (structural::append_tuple(asm, &cur_ty, &ety), ExtendKind::Tuple)
                } else if base_record {
                    (structural::merge_record(asm, &cur_ty, &ety), ExtendKind::Record)
                } else if base_nominal {
                    (
                        structural::merge_object_record(asm, &cur_ty, &ety),
                        ExtendKind::Object,
                    )
                } else {
                    return self.fail(
                        CheckErrorKind::UnsupportedOp,
                        span,
                        format!("Cannot extend a value of type '{}'", cur_ty),
                    );
                };
                let result = match computed {
                    Ok(t) => t,
                    Err(msg) => {
                        let kind = if msg.contains("ambiguous") {
                            CheckErrorKind::AmbiguousField
                        } else {
                            CheckErrorKind::TypeMismatch
                        };
                        return self.fail(kind, span, msg);
                    }
                };
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(match kind {
                    ExtendKind::Tuple => Op::StructuredExtendTuple {
                        trgt,
                        arg: reg,
                        ext: ereg,
                    },
                    ExtendKind::Record => Op::StructuredExtendRecord {
                        trgt,
                        arg: reg,
                        ext: ereg,
                    },
                    ExtendKind::Object => Op::StructuredExtendObject {
                        trgt,
                        arg: reg,
                        ext: ereg,
                    },
                });
                Ok((trgt, vec![eenv.with_result_unknown(result)]))
            }
            PostfixOpKind::Invoke {
                name,
                term_args,
                args,
            } => {
                if is_universal_method(name) {
                    self.check_universal_invoke(flows, reg, name, term_args, args, span, narrow_var)
                } else {
                    self.check_method_invoke(&joined, reg, name, term_args, args, span)
                }
            }
            PostfixOpKind::CallLambda { args } => {
                let Some(atom) = cur_ty.as_unique_function().cloned() else {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        span,
                        format!("Type '{}' is not callable", cur_ty),
                    );
                };
                let slots = self.slots_for_function(&atom, None, "");
                let hints: Vec<Option<ResolvedType>> =
                    slots.iter().map(|s| Some(s.ty.clone())).collect();
                let (evaluated, out_env) = self.eval_args(&joined, args, &hints)?;
                let call_args =
                    self.resolve_call_args(&slots, atom.rest.as_deref(), &evaluated, span, "argument")?;
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::CallLambda {
                    trgt,
                    lambda: reg,
                    args: call_args,
                });
                let result = (*atom.result).clone();
                Ok((trgt, vec![out_env.with_result_unknown(result)]))
            }
        }
    }

    /// Name access: a record property, or a uniquely-rooted field of a
    /// nominal base.
    fn load_name_value(
        &mut self,
        env: &TypeEnv,
        reg: Register,
        name: &str,
        span: Span,
    ) -> CheckResult<(Register, ResolvedType)> {
        let cur_ty = env.result_ty();
        let all_records = cur_ty
            .atoms()
            .iter()
            .all(|a| self.asm.record_representation(a).is_some());
        if all_records && !cur_ty.atoms().is_empty() {
            let ty = match structural::load_from_name(self.asm, &cur_ty, name) {
                Ok(t) => t,
                Err(msg) => return self.fail(CheckErrorKind::TypeMismatch, span, msg),
            };
            let trgt = self.emitter.generate_tmp_register();
            self.emitter.emit(Op::LoadProperty {
                trgt,
                arg: reg,
                name: name.to_string(),
            });
            return Ok((trgt, ty));
        }

        let lookup = self
            .asm
            .try_get_oo_member_options(&cur_ty, MemberKind::Field, name);
        match lookup.candidates.as_slice() {
            [] => self.fail(
                CheckErrorKind::UnknownName,
                span,
                format!("'{}' is not a property or field of '{}'", name, cur_ty),
            ),
            [candidate] => {
                let field = self
                    .asm
                    .member_field(&candidate.owner, name)
                    .expect("candidate owner declares the field");
                let ty = self.normalize(&field.sig, &candidate.binds, span)?;
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::LoadField {
                    trgt,
                    arg: reg,
                    fkey: program::field_key(&candidate.owner, name),
                });
                Ok((trgt, ty))
            }
            _ => self.fail(
                CheckErrorKind::AmbiguousField,
                span,
                format!("Field '{}' is ambiguous on '{}'", name, cur_ty),
            ),
        }
    }

    // ==================== Method invocation ====================

    fn check_method_invoke(
        &mut self,
        env: &TypeEnv,
        reg: Register,
        name: &str,
        term_args: &[TypeSignature],
        args: &[Arg],
        span: Span,
    ) -> CheckResult<(Register, Flows)> {
        let cur_ty = env.result_ty();
        let mut resolved_terms = Vec::with_capacity(term_args.len());
        for term in term_args {
            resolved_terms.push(self.normalize_in_env(term, env, span)?);
        }

        let lookup = self
            .asm
            .try_get_oo_member_options(&cur_ty, MemberKind::Method, name);

        if lookup.candidates.is_empty() {
            // Not a method anywhere: a record property or object field of
            // function type, called as a lambda.
            let (freg, fty) = self.load_name_value(env, reg, name, span)?;
            let Some(atom) = fty.as_unique_function().cloned() else {
                return self.fail(
                    CheckErrorKind::UnknownName,
                    span,
                    format!("'{}' is not a method of '{}'", name, cur_ty),
                );
            };
            let slots = self.slots_for_function(&atom, None, "");
            let hints: Vec<Option<ResolvedType>> =
                slots.iter().map(|s| Some(s.ty.clone())).collect();
            let (evaluated, out_env) = self.eval_args(env, args, &hints)?;
            let call_args =
                self.resolve_call_args(&slots, atom.rest.as_deref(), &evaluated, span, "argument")?;
            let trgt = self.emitter.generate_tmp_register();
            self.emitter.emit(Op::CallLambda {
                trgt,
                lambda: freg,
                args: call_args,
            });
            let result = (*atom.result).clone();
            return Ok((trgt, vec![out_env.with_result_unknown(result)]));
        }

        let unique_receiver = cur_ty.as_unique_entity().is_some();
        if unique_receiver {
            let candidate = match lookup.candidates.as_slice() {
                [candidate] => candidate.clone(),
                _ => {
                    return self.fail(
                        CheckErrorKind::AmbiguousCall,
                        span,
                        format!("Method '{}' is ambiguous on '{}'", name, cur_ty),
                    )
                }
            };
            let decl = self
                .asm
                .member_function(&candidate.owner, MemberKind::Method, name)
                .expect("candidate owner declares the method");
            let Some(binds) = self.asm.resolve_binds_for_call(
                &decl.terms,
                &resolved_terms,
                &candidate.binds,
                &env.terms,
            ) else {
                return self.fail(
                    CheckErrorKind::TypeMismatch,
                    span,
                    format!("Cannot bind templates for call to '{}'", name),
                );
            };
            let atom = match self.asm.function_decl_atom(decl, &binds) {
                Ok(a) => a,
                Err(msg) => return self.fail(CheckErrorKind::TypeMismatch, span, msg),
            };
            let base_key = program::method_key(&candidate.owner, name, &Binds::new());
            let slots = self.slots_for_function(&atom, Some(decl), &base_key);
            let hints: Vec<Option<ResolvedType>> =
                slots.iter().map(|s| Some(s.ty.clone())).collect();
            let (evaluated, out_env) = self.eval_args(env, args, &hints)?;
            let mut call_args = vec![reg];
            call_args.extend(self.resolve_call_args(
                &slots,
                atom.rest.as_deref(),
                &evaluated,
                span,
                "argument",
            )?);

            let mkey = program::method_key(&candidate.owner, name, &binds);
            self.ir.register_call(
                mkey.clone(),
                program::CallRegistration {
                    kind: program::CallKind::Method,
                    owner: Some(candidate.owner.clone()),
                    name: name.to_string(),
                    binds,
                },
            );
            let trgt = self.emitter.generate_tmp_register();
            self.emitter.emit(Op::CallKnownTarget {
                trgt,
                mkey,
                args: call_args,
            });
            let result = (*atom.result).clone();
            return Ok((trgt, vec![out_env.with_result_unknown(result)]));
        }

        // Virtual dispatch: every atom must share a single root.
        let Some(root) = lookup.root.clone() else {
            return self.fail(
                CheckErrorKind::AmbiguousCall,
                span,
                format!("Method '{}' has no unique root on '{}'", name, cur_ty),
            );
        };
        let root_decl = self
            .asm
            .member_function(&root.owner, MemberKind::Method, name)
            .expect("root owner declares the method");
        let Some(root_binds) = self.asm.resolve_binds_for_call(
            &root_decl.terms,
            &resolved_terms,
            &root.binds,
            &env.terms,
        ) else {
            return self.fail(
                CheckErrorKind::TypeMismatch,
                span,
                format!("Cannot bind templates for call to '{}'", name),
            );
        };
        let root_atom = match self.asm.function_decl_atom(root_decl, &root_binds) {
            Ok(a) => a,
            Err(msg) => return self.fail(CheckErrorKind::TypeMismatch, span, msg),
        };

        let mut override_atoms = Vec::with_capacity(lookup.candidates.len());
        for candidate in &lookup.candidates {
            let decl = self
                .asm
                .member_function(&candidate.owner, MemberKind::Method, name)
                .expect("candidate owner declares the method");
            let Some(binds) = self.asm.resolve_binds_for_call(
                &decl.terms,
                &resolved_terms,
                &candidate.binds,
                &env.terms,
            ) else {
                return self.fail(
                    CheckErrorKind::TypeMismatch,
                    span,
                    format!("Cannot bind templates for call to '{}'", name),
                );
            };
            match self.asm.function_decl_atom(decl, &binds) {
                Ok(a) => override_atoms.push(a),
                Err(msg) => return self.fail(CheckErrorKind::TypeMismatch, span, msg),
            }
        }
        let Some(unified) = self
            .asm
            .compute_unified_function_type(&override_atoms, &root_atom)
        else {
            return self.fail(
                CheckErrorKind::TypeMismatch,
                span,
                format!("Override signatures of '{}' do not unify through the root", name),
            );
        };

        let base_key = program::method_key(&root.owner, name, &Binds::new());
        let slots = self.slots_for_function(&unified, Some(root_decl), &base_key);
        let hints: Vec<Option<ResolvedType>> =
            slots.iter().map(|s| Some(s.ty.clone())).collect();
        let (evaluated, out_env) = self.eval_args(env, args, &hints)?;
        let mut call_args = vec![reg];
        call_args.extend(self.resolve_call_args(
            &slots,
            unified.rest.as_deref(),
            &evaluated,
            span,
            "argument",
        )?);

        let vkey = program::virtual_method_key(&root.owner, name, &root_binds);
        self.ir.register_call(
            vkey.clone(),
            program::CallRegistration {
                kind: program::CallKind::VirtualMethod,
                owner: Some(root.owner.clone()),
                name: name.to_string(),
                binds: root_binds,
            },
        );
        let trgt = self.emitter.generate_tmp_register();
        self.emitter.emit(Op::CallVirtualTarget {
            trgt,
            vkey,
            args: call_args,
        });
        let result = (*unified.result).clone();
        Ok((trgt, vec![out_env.with_result_unknown(result)]))
    }

    // ==================== Universal methods ====================

    fn check_universal_invoke(
        &mut self,
        flows: &Flows,
        reg: Register,
        name: &str,
        term_args: &[TypeSignature],
        args: &[Arg],
        span: Span,
        narrow_var: Option<&str>,
    ) -> CheckResult<(Register, Flows)> {
        let joined = join_flows(flows);
        let cur_ty = joined.result_ty();

        let one_term = |chk: &Self| -> CheckResult<ResolvedType> {
            match term_args {
                [sig] => chk.normalize_in_env(sig, &joined, span),
                _ => chk.fail(
                    CheckErrorKind::UnsupportedOp,
                    span,
                    format!("'{}' takes exactly one template argument", name),
                ),
            }
        };

        match name {
            "is" | "isNone" | "isSome" => {
                if !args.is_empty() {
                    return self.fail(
                        CheckErrorKind::UnsupportedOp,
                        span,
                        format!("'{}' takes no arguments", name),
                    );
                }
                let target = match name {
                    "isNone" => self.asm.none_type(),
                    "isSome" => self.asm.some_type(),
                    _ => one_term(self)?,
                };
                let none_like = self.asm.subtype_of(&target, &self.asm.none_type());
                let some_like = target == self.asm.some_type();

                let (true_part, false_part) = if none_like {
                    let (none_part, some_part) = cur_ty.split_none();
                    (none_part, some_part)
                } else if some_like {
                    let (none_part, some_part) = cur_ty.split_none();
                    (some_part, none_part)
                } else {
                    (
                        self.asm.restrict_to(&cur_ty, &target),
                        self.asm.restrict_not(&cur_ty, &target),
                    )
                };

                if true_part.is_never() {
                    let (kind, msg) = if none_like {
                        (CheckErrorKind::RedundantNullCheck, "Value is never None")
                    } else if some_like {
                        (CheckErrorKind::RedundantNullCheck, "Value is always None")
                    } else {
                        (CheckErrorKind::RedundantTruth, "Type check is always false")
                    };
                    return self.fail(kind, span, msg);
                }
                if false_part.is_never() {
                    let (kind, msg) = if none_like {
                        (CheckErrorKind::RedundantNullCheck, "Value is always None")
                    } else if some_like {
                        (CheckErrorKind::RedundantNullCheck, "Value is never None")
                    } else {
                        (CheckErrorKind::RedundantTruth, "Type check is always true")
                    };
                    return self.fail(kind, span, msg);
                }

                let tkey = self.ir.register_resolved_type_reference(&target);
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::IsTypeOf {
                    trgt,
                    arg: reg,
                    tkey,
                });

                let bool_ty = self.asm.bool_type();
                let mut true_env = joined.with_result(bool_ty.clone(), FlowTruth::True);
                let mut false_env = joined.with_result(bool_ty, FlowTruth::False);
                if let Some(var) = narrow_var {
                    true_env = true_env.with_var_flow(var, true_part);
                    false_env = false_env.with_var_flow(var, false_part);
                }
                Ok((trgt, vec![true_env, false_env]))
            }
            "as" => {
                if !args.is_empty() {
                    return self.fail(
                        CheckErrorKind::UnsupportedOp,
                        span,
                        "'as' takes no arguments",
                    );
                }
                let target = one_term(self)?;
                if self.asm.restrict_to(&cur_ty, &target).is_never() {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        span,
                        format!("Cast from '{}' to '{}' can never succeed", cur_ty, target),
                    );
                }
                let tkey = self.ir.register_resolved_type_reference(&target);
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::ConvertTo {
                    trgt,
                    arg: reg,
                    tkey,
                    fallible: false,
                });
                Ok((trgt, vec![joined.with_result_unknown(target)]))
            }
            "tryAs" => {
                if !args.is_empty() {
                    return self.fail(
                        CheckErrorKind::UnsupportedOp,
                        span,
                        "'tryAs' takes no arguments",
                    );
                }
                let target = one_term(self)?;
                let tkey = self.ir.register_resolved_type_reference(&target);
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::ConvertTo {
                    trgt,
                    arg: reg,
                    tkey,
                    fallible: true,
                });
                let result = ResolvedType::union_of(&[target, self.asm.none_type()]);
                Ok((trgt, vec![joined.with_result_unknown(result)]))
            }
            "defaultAs" => {
                let target = one_term(self)?;
                let [default_arg] = args else {
                    return self.fail(
                        CheckErrorKind::UnsupportedOp,
                        span,
                        "'defaultAs' takes exactly one argument",
                    );
                };
                if default_arg.name.is_some() || default_arg.is_spread {
                    return self.fail(
                        CheckErrorKind::UnsupportedOp,
                        span,
                        "'defaultAs' takes a plain positional argument",
                    );
                }
                let (dreg, denv) =
                    self.check_expr_joined(&joined, &default_arg.expr, Some(&target))?;
                let dty = denv.result_ty();
                if !self.asm.subtype_of(&dty, &target) {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        span,
                        format!("Default value type '{}' is not a subtype of '{}'", dty, target),
                    );
                }
                let tkey = self.ir.register_resolved_type_reference(&target);
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::ConvertOrDefault {
                    trgt,
                    arg: reg,
                    tkey,
                    default: dreg,
                });
                Ok((trgt, vec![denv.with_result_unknown(target)]))
            }
            _ => unreachable!("universal method list is fixed"),
        }
    }
}
