//! Expression checking and emission.
//!
//! `check_expr` dispatches on the node tag, emits the opcodes for the
//! expression into the active block, and returns the result register plus
//! the multi-flow of post-state environments (each carrying the result
//! type and truth tag).
//!
//! Submodules:
//! - `ops`: prefix and binary operators, short-circuit forms, select
//! - `call`: namespace/static calls, typed strings, lambda construction
//! - `postfix`: the postfix chain engine with the elvis merge

pub mod call;
pub mod ops;
pub mod postfix;

use calyx_ast::Expr;

use crate::error::{CheckErrorKind, CheckResult};
use crate::ir::core::{Op, Register};
use crate::ir::program;
use crate::types::{
    is_universal_method, RecordAtom, RecordEntry, ResolvedType, TupleAtom, TupleEntry, TypeAtom,
};

use super::args::EvaluatedArg;
use super::env::{join_flows, FlowTruth, Flows, TypeEnv, VarClass};
use super::Checker;

impl Checker<'_> {
    /// Check one expression under `env`. Returns the register holding the
    /// value and the non-empty multi-flow of post-states. `hint` is the
    /// contextual expected type (signature bias); only auto lambda
    /// signatures consume it, everything else infers bottom-up.
    pub(crate) fn check_expr(
        &mut self,
        env: &TypeEnv,
        expr: &Expr,
        hint: Option<&ResolvedType>,
    ) -> CheckResult<(Register, Flows)> {
        match expr {
            Expr::LiteralNone(_) => {
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::LoadConstNone { trgt });
                Ok((
                    trgt,
                    vec![env.with_result(self.asm.none_type(), FlowTruth::False)],
                ))
            }
            Expr::LiteralBool(value, _) => {
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::LoadConstBool {
                    trgt,
                    value: *value,
                });
                let truth = if *value {
                    FlowTruth::True
                } else {
                    FlowTruth::False
                };
                Ok((trgt, vec![env.with_result(self.asm.bool_type(), truth)]))
            }
            Expr::LiteralInt(value, _) => {
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::LoadConstInt {
                    trgt,
                    value: *value,
                });
                Ok((trgt, vec![env.with_result_unknown(self.asm.int_type())]))
            }
            Expr::LiteralString(value, _) => {
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::LoadConstString {
                    trgt,
                    value: value.clone(),
                });
                Ok((trgt, vec![env.with_result_unknown(self.asm.string_type())]))
            }
            Expr::LiteralTypedString { .. } => self.check_typed_string(env, expr),
            Expr::AccessVariable { name, span } => {
                let Some((info, class)) = env.lookup_var(name) else {
                    return self.fail(
                        CheckErrorKind::UnknownName,
                        *span,
                        format!("Variable '{}' is not defined", name),
                    );
                };
                if !info.must_defined {
                    return self.fail(
                        CheckErrorKind::UseBeforeDef,
                        *span,
                        format!("Variable '{}' may be used before definition", name),
                    );
                }
                let flow = info.flow.clone();
                let trgt = self.emitter.generate_tmp_register();
                let op = match class {
                    VarClass::Local => Op::AccessLocal {
                        trgt,
                        name: name.clone(),
                    },
                    VarClass::Arg => Op::AccessArg {
                        trgt,
                        name: name.clone(),
                    },
                    VarClass::Captured => Op::AccessCaptured {
                        trgt,
                        name: name.clone(),
                    },
                };
                self.emitter.emit(op);
                Ok((trgt, vec![env.with_result_unknown(flow)]))
            }
            Expr::AccessNamespaceConst {
                namespace,
                name,
                span,
            } => self.check_namespace_const_access(env, namespace, name, *span),
            Expr::AccessStaticConst { of, name, span } => {
                self.check_static_const_access(env, of, name, *span)
            }
            Expr::ConstructTuple { entries, span: _ } => {
                let mut cur = env.clone();
                let mut regs = Vec::with_capacity(entries.len());
                let mut tys = Vec::with_capacity(entries.len());
                for entry in entries {
                    let (reg, cur_next) = self.check_expr_joined(&cur, entry, None)?;
                    tys.push(TupleEntry {
                        ty: cur_next.result_ty(),
                        optional: false,
                    });
                    regs.push(reg);
                    cur = cur_next;
                }
                let result = ResolvedType::from_atom(TypeAtom::Tuple(TupleAtom::closed(tys)));
                self.ir.register_resolved_type_reference(&result);
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::ConstructTuple { trgt, args: regs });
                Ok((trgt, vec![cur.with_result_unknown(result)]))
            }
            Expr::ConstructRecord { entries, span } => {
                let mut cur = env.clone();
                let mut regs = Vec::with_capacity(entries.len());
                let mut resolved = Vec::with_capacity(entries.len());
                for (name, entry) in entries {
                    if is_universal_method(name) {
                        return self.fail(
                            CheckErrorKind::RecordMasksAnyMethod,
                            *span,
                            format!("Record property '{}' masks a universal method", name),
                        );
                    }
                    if resolved.iter().any(|e: &RecordEntry| &e.name == name) {
                        return self.fail(
                            CheckErrorKind::DuplicateName,
                            *span,
                            format!("Duplicate record property '{}'", name),
                        );
                    }
                    let (reg, cur_next) = self.check_expr_joined(&cur, entry, None)?;
                    resolved.push(RecordEntry {
                        name: name.clone(),
                        ty: cur_next.result_ty(),
                        optional: false,
                    });
                    regs.push((name.clone(), reg));
                    cur = cur_next;
                }
                let result =
                    ResolvedType::from_atom(TypeAtom::Record(RecordAtom::new(resolved, false)));
                self.ir.register_resolved_type_reference(&result);
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::ConstructRecord {
                    trgt,
                    entries: regs,
                });
                Ok((trgt, vec![cur.with_result_unknown(result)]))
            }
            Expr::ConstructEntity {
                of,
                factory,
                args,
                span,
            } => self.check_entity_construction(env, of, factory.as_deref(), args, *span),
            Expr::ConstructLambda { .. } => self.check_lambda_construction(env, expr, hint),
            Expr::CallNamespaceFunction { .. } | Expr::CallStaticFunction { .. } => {
                self.check_call(env, expr)
            }
            Expr::PrefixOp { .. }
            | Expr::BinArith { .. }
            | Expr::BinEq { .. }
            | Expr::BinCmp { .. }
            | Expr::BinLogic { .. }
            | Expr::NoneCheck { .. }
            | Expr::Coalesce { .. }
            | Expr::Select { .. } => self.check_operator(env, expr, hint),
            Expr::Postfix { root, ops, span } => self.check_postfix(env, root, ops, *span),
        }
    }

    /// Check an expression and join its flows.
    pub(crate) fn check_expr_joined(
        &mut self,
        env: &TypeEnv,
        expr: &Expr,
        hint: Option<&ResolvedType>,
    ) -> CheckResult<(Register, TypeEnv)> {
        let (reg, flows) = self.check_expr(env, expr, hint)?;
        Ok((reg, join_flows(&flows)))
    }

    fn check_namespace_const_access(
        &mut self,
        env: &TypeEnv,
        namespace: &str,
        name: &str,
        span: calyx_ast::Span,
    ) -> CheckResult<(Register, Flows)> {
        let Some(ns) = self.asm.get_namespace(namespace) else {
            return self.fail(
                CheckErrorKind::UnknownName,
                span,
                format!("Namespace '{}' is not defined", namespace),
            );
        };
        if let Some(decl) = ns.consts.get(name) {
            let ty = self.normalize(&decl.sig, &crate::assembly::Binds::new(), span)?;
            let gkey = program::const_key(namespace, name);
            self.ir.register_pending_const_processing(
                gkey.clone(),
                program::PendingConst::Namespace {
                    ns: namespace.to_string(),
                    name: name.to_string(),
                },
            );
            let trgt = self.emitter.generate_tmp_register();
            self.emitter.emit(Op::AccessNamespaceConstant { trgt, gkey });
            return Ok((trgt, vec![env.with_result_unknown(ty)]));
        }
        if let Some(decl) = ns.globals.get(name) {
            let ty = self.normalize(&decl.sig, &crate::assembly::Binds::new(), span)?;
            let gkey = program::global_key(namespace, name);
            self.ir.register_pending_global_processing(
                gkey.clone(),
                program::PendingGlobal {
                    ns: namespace.to_string(),
                    name: name.to_string(),
                },
            );
            let trgt = self.emitter.generate_tmp_register();
            self.emitter.emit(Op::AccessNamespaceConstant { trgt, gkey });
            return Ok((trgt, vec![env.with_result_unknown(ty)]));
        }
        self.fail(
            CheckErrorKind::UnknownName,
            span,
            format!("'{}::{}' is not defined", namespace, name),
        )
    }

    fn check_static_const_access(
        &mut self,
        env: &TypeEnv,
        of: &calyx_ast::TypeSignature,
        name: &str,
        span: calyx_ast::Span,
    ) -> CheckResult<(Register, Flows)> {
        let receiver = self.normalize_in_env(of, env, span)?;
        let lookup =
            self.asm
                .try_get_oo_member_options(&receiver, crate::assembly::MemberKind::Const, name);
        let candidate = match lookup.candidates.as_slice() {
            [] => {
                return self.fail(
                    CheckErrorKind::UnknownName,
                    span,
                    format!("Const '{}' is not defined on '{}'", name, receiver),
                )
            }
            [candidate] => candidate.clone(),
            _ => {
                return self.fail(
                    CheckErrorKind::AmbiguousField,
                    span,
                    format!("Const '{}' is ambiguous on '{}'", name, receiver),
                )
            }
        };
        let decl = self
            .asm
            .member_const(&candidate.owner, name)
            .expect("candidate owner declares the const");
        let ty = self.normalize(&decl.sig, &candidate.binds, span)?;
        let ckey = program::const_key(&candidate.owner, name);
        self.ir.register_pending_const_processing(
            ckey.clone(),
            program::PendingConst::Member {
                owner: candidate.owner.clone(),
                name: name.to_string(),
            },
        );
        let trgt = self.emitter.generate_tmp_register();
        self.emitter.emit(Op::AccessConst { trgt, ckey });
        Ok((trgt, vec![env.with_result_unknown(ty)]))
    }

    fn check_entity_construction(
        &mut self,
        env: &TypeEnv,
        of: &calyx_ast::TypeSignature,
        factory: Option<&str>,
        args: &[calyx_ast::Arg],
        span: calyx_ast::Span,
    ) -> CheckResult<(Register, Flows)> {
        let entity_ty = self.normalize_in_env(of, env, span)?;
        let Some(entity) = entity_ty.as_unique_entity().cloned() else {
            return self.fail(
                CheckErrorKind::TypeMismatch,
                span,
                format!("Type '{}' is not a constructible entity", entity_ty),
            );
        };
        let decl = self
            .asm
            .object_decl(&entity.name)
            .expect("normalized entity has a declaration");

        // Collection and map entities route through the element-typed path.
        if decl.is_collection() || decl.is_map() {
            let elem = self
                .asm
                .collection_element_type(&entity_ty)
                .expect("collection entity has an element type");
            let hints: Vec<Option<ResolvedType>> =
                args.iter().map(|_| Some(elem.clone())).collect();
            let (evaluated, out_env) = self.eval_args(env, args, &hints)?;
            let reg = self.construct_collection(&entity_ty, &evaluated, span)?;
            return Ok((reg, vec![out_env.with_result_unknown(entity_ty)]));
        }

        if let Some(factory_name) = factory {
            return self.check_factory_construction(
                env, &entity_ty, &entity, factory_name, args, span,
            );
        }

        let fields = match self.asm.get_all_oo_fields(&entity.name, &entity.binds) {
            Ok(f) => f,
            Err(msg) => return self.fail(CheckErrorKind::UnknownName, span, msg),
        };
        let mut hints = Vec::with_capacity(fields.len());
        for (_, field, field_binds) in &fields {
            hints.push(self.normalize(&field.sig, field_binds, field.span).ok());
        }
        let (evaluated, out_env) = self.eval_args(env, args, &hints)?;
        let reg =
            self.bind_entity_fields(&entity_ty, &entity.name, &entity.binds, &evaluated, span)?;
        Ok((reg, vec![out_env.with_result_unknown(entity_ty)]))
    }

    /// Factory construction: call the named factory static, then re-run
    /// field binding with its structural result as an expando record.
    fn check_factory_construction(
        &mut self,
        env: &TypeEnv,
        entity_ty: &ResolvedType,
        entity: &crate::types::EntityAtom,
        factory_name: &str,
        args: &[calyx_ast::Arg],
        span: calyx_ast::Span,
    ) -> CheckResult<(Register, Flows)> {
        let decl = self
            .asm
            .object_decl(&entity.name)
            .expect("normalized entity has a declaration");
        let Some(factory) = decl.factory(factory_name) else {
            return self.fail(
                CheckErrorKind::UnknownName,
                span,
                format!(
                    "Factory '{}' is not defined on '{}'",
                    factory_name, entity.name
                ),
            );
        };
        let Some(binds) = self.asm.resolve_binds_for_call(
            &factory.terms,
            &[],
            &entity.binds,
            &env.terms,
        ) else {
            return self.fail(
                CheckErrorKind::TypeMismatch,
                span,
                format!("Cannot bind templates for factory '{}'", factory_name),
            );
        };
        let atom = match self.asm.function_decl_atom(factory, &binds) {
            Ok(a) => a,
            Err(msg) => return self.fail(CheckErrorKind::TypeMismatch, span, msg),
        };
        let base_key = program::static_function_key(
            &entity.name,
            factory_name,
            &crate::assembly::Binds::new(),
        );
        let slots = self.slots_for_function(&atom, Some(factory), &base_key);
        let hints: Vec<Option<ResolvedType>> =
            slots.iter().map(|s| Some(s.ty.clone())).collect();
        let (evaluated, out_env) = self.eval_args(env, args, &hints)?;
        let rest_ty = atom.rest.as_deref();
        let call_args = self.resolve_call_args(&slots, rest_ty, &evaluated, span, "argument")?;

        let skey = program::static_function_key(&entity.name, factory_name, &binds);
        self.ir.register_call(
            skey.clone(),
            program::CallRegistration {
                kind: program::CallKind::StaticFunction,
                owner: Some(entity.name.clone()),
                name: factory_name.to_string(),
                binds: binds.clone(),
            },
        );
        let freg = self.emitter.generate_tmp_register();
        self.emitter.emit(Op::CallStaticFunction {
            trgt: freg,
            skey,
            args: call_args,
        });

        let factory_result = (*atom.result).clone();
        if !crate::types::structural::record_expando(self.asm, &factory_result).ok {
            return self.fail(
                CheckErrorKind::TypeMismatch,
                span,
                format!(
                    "Factory '{}' must produce a closed record, got '{}'",
                    factory_name, factory_result
                ),
            );
        }
        let expando = EvaluatedArg {
            name: None,
            is_spread: true,
            reg: freg,
            ty: factory_result,
            span,
        };
        let reg =
            self.bind_entity_fields(entity_ty, &entity.name, &entity.binds, &[expando], span)?;
        Ok((reg, vec![out_env.with_result_unknown(entity_ty.clone())]))
    }
}
