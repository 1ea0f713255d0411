//! Namespace and static calls, typed strings, and lambda construction.
//!
//! Calls resolve a signature, bind call-site templates over the enclosing
//! and receiver binds, evaluate arguments with signature bias, and hand
//! the expanded argument list to the argument resolver.

use calyx_ast::Expr;

use crate::assembly::{Binds, MemberKind};
use crate::error::{CheckErrorKind, CheckResult};
use crate::ir::core::{Op, Register};
use crate::ir::program;
use crate::types::{names, EntityAtom, FunctionAtom, FunctionParam, ResolvedType, TypeAtom};

use super::super::env::{Flows, TypeEnv};
use super::super::{Checker, PendingLambda};

impl Checker<'_> {
    pub(crate) fn check_call(
        &mut self,
        env: &TypeEnv,
        expr: &Expr,
    ) -> CheckResult<(Register, Flows)> {
        match expr {
            Expr::CallNamespaceFunction {
                namespace,
                name,
                term_args,
                args,
                span,
            } => {
                let Some(ns) = self.asm.get_namespace(namespace) else {
                    return self.fail(
                        CheckErrorKind::UnknownName,
                        *span,
                        format!("Namespace '{}' is not defined", namespace),
                    );
                };
                let Some(decl) = ns.functions.get(name) else {
                    return self.fail(
                        CheckErrorKind::UnknownName,
                        *span,
                        format!("'{}::{}' is not defined", namespace, name),
                    );
                };
                let mut resolved_terms = Vec::with_capacity(term_args.len());
                for term in term_args {
                    resolved_terms.push(self.normalize_in_env(term, env, *span)?);
                }
                let Some(binds) = self.asm.resolve_binds_for_call(
                    &decl.terms,
                    &resolved_terms,
                    &Binds::new(),
                    &env.terms,
                ) else {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        *span,
                        format!("Cannot bind templates for call to '{}::{}'", namespace, name),
                    );
                };
                let atom = match self.asm.function_decl_atom(decl, &binds) {
                    Ok(a) => a,
                    Err(msg) => return self.fail(CheckErrorKind::TypeMismatch, *span, msg),
                };
                let base_key = program::namespace_function_key(namespace, name, &Binds::new());
                let slots = self.slots_for_function(&atom, Some(decl), &base_key);
                let hints: Vec<Option<ResolvedType>> =
                    slots.iter().map(|s| Some(s.ty.clone())).collect();
                let (evaluated, out_env) = self.eval_args(env, args, &hints)?;
                let call_args =
                    self.resolve_call_args(&slots, atom.rest.as_deref(), &evaluated, *span, "argument")?;

                let fkey = program::namespace_function_key(namespace, name, &binds);
                self.ir.register_call(
                    fkey.clone(),
                    program::CallRegistration {
                        kind: program::CallKind::NamespaceFunction,
                        owner: Some(namespace.clone()),
                        name: name.clone(),
                        binds,
                    },
                );
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::CallNamespaceFunction {
                    trgt,
                    fkey,
                    args: call_args,
                });
                let result = (*atom.result).clone();
                Ok((trgt, vec![out_env.with_result_unknown(result)]))
            }
            Expr::CallStaticFunction {
                of,
                name,
                term_args,
                args,
                span,
            } => {
                let receiver = self.normalize_in_env(of, env, *span)?;
                let lookup = self
                    .asm
                    .try_get_oo_member_options(&receiver, MemberKind::Static, name);
                let candidate = match lookup.candidates.as_slice() {
                    [] => {
                        return self.fail(
                            CheckErrorKind::UnknownName,
                            *span,
                            format!("Static '{}' is not defined on '{}'", name, receiver),
                        )
                    }
                    [candidate] => candidate.clone(),
                    _ => {
                        return self.fail(
                            CheckErrorKind::AmbiguousCall,
                            *span,
                            format!("Static '{}' is ambiguous on '{}'", name, receiver),
                        )
                    }
                };
                let decl = self
                    .asm
                    .member_function(&candidate.owner, MemberKind::Static, name)
                    .expect("candidate owner declares the static");
                let mut resolved_terms = Vec::with_capacity(term_args.len());
                for term in term_args {
                    resolved_terms.push(self.normalize_in_env(term, env, *span)?);
                }
                let Some(binds) = self.asm.resolve_binds_for_call(
                    &decl.terms,
                    &resolved_terms,
                    &candidate.binds,
                    &env.terms,
                ) else {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        *span,
                        format!("Cannot bind templates for call to '{}::{}'", receiver, name),
                    );
                };
                let atom = match self.asm.function_decl_atom(decl, &binds) {
                    Ok(a) => a,
                    Err(msg) => return self.fail(CheckErrorKind::TypeMismatch, *span, msg),
                };
                let base_key =
                    program::static_function_key(&candidate.owner, name, &Binds::new());
                let slots = self.slots_for_function(&atom, Some(decl), &base_key);
                let hints: Vec<Option<ResolvedType>> =
                    slots.iter().map(|s| Some(s.ty.clone())).collect();
                let (evaluated, out_env) = self.eval_args(env, args, &hints)?;
                let call_args =
                    self.resolve_call_args(&slots, atom.rest.as_deref(), &evaluated, *span, "argument")?;

                let skey = program::static_function_key(&candidate.owner, name, &binds);
                self.ir.register_call(
                    skey.clone(),
                    program::CallRegistration {
                        kind: program::CallKind::StaticFunction,
                        owner: Some(candidate.owner.clone()),
                        name: name.clone(),
                        binds,
                    },
                );
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::CallStaticFunction {
                    trgt,
                    skey,
                    args: call_args,
                });
                let result = (*atom.result).clone();
                Ok((trgt, vec![out_env.with_result_unknown(result)]))
            }
            _ => unreachable!("check_call only handles call nodes"),
        }
    }

    // ==================== Typed strings ====================

    pub(crate) fn check_typed_string(
        &mut self,
        env: &TypeEnv,
        expr: &Expr,
    ) -> CheckResult<(Register, Flows)> {
        let Expr::LiteralTypedString {
            value,
            of,
            constructor,
            span,
        } = expr
        else {
            unreachable!("check_typed_string only handles typed strings");
        };
        let of_ty = self.normalize_in_env(of, env, *span)?;
        if of_ty.as_unique_entity().is_none() {
            return self.fail(
                CheckErrorKind::NotParsable,
                *span,
                format!("Typed string target '{}' is not a unique nominal type", of_ty),
            );
        }
        if !self.asm.subtype_of(&of_ty, &self.asm.parsable_concept_type()) {
            return self.fail(
                CheckErrorKind::NotParsable,
                *span,
                format!("Type '{}' does not provide Parsable", of_ty),
            );
        }
        let tkey = self.ir.register_resolved_type_reference(&of_ty);

        if !*constructor {
            let mut binds = Binds::new();
            binds.insert("T".to_string(), of_ty.clone());
            let result = ResolvedType::entity(EntityAtom {
                name: names::STRING_OF.to_string(),
                binds,
            });
            self.ir.register_resolved_type_reference(&result);
            let trgt = self.emitter.generate_tmp_register();
            self.emitter.emit(Op::LoadConstTypedString {
                trgt,
                value: value.clone(),
                tkey,
            });
            return Ok((trgt, vec![env.with_result_unknown(result)]));
        }

        // Constructor form: route the literal through `T::tryParse`.
        let lookup = self
            .asm
            .try_get_oo_member_options(&of_ty, MemberKind::Static, "tryParse");
        let candidate = match lookup.candidates.as_slice() {
            [candidate] => candidate.clone(),
            [] => {
                return self.fail(
                    CheckErrorKind::NotParsable,
                    *span,
                    format!("Type '{}' does not declare tryParse", of_ty),
                )
            }
            _ => {
                return self.fail(
                    CheckErrorKind::AmbiguousCall,
                    *span,
                    format!("tryParse is ambiguous on '{}'", of_ty),
                )
            }
        };
        let decl = self
            .asm
            .member_function(&candidate.owner, MemberKind::Static, "tryParse")
            .expect("candidate owner declares tryParse");
        let Some(binds) =
            self.asm
                .resolve_binds_for_call(&decl.terms, &[], &candidate.binds, &env.terms)
        else {
            return self.fail(
                CheckErrorKind::TypeMismatch,
                *span,
                format!("Cannot bind templates for '{}::tryParse'", of_ty),
            );
        };
        let atom = match self.asm.function_decl_atom(decl, &binds) {
            Ok(a) => a,
            Err(msg) => return self.fail(CheckErrorKind::TypeMismatch, *span, msg),
        };

        let literal = self.emitter.generate_tmp_register();
        self.emitter.emit(Op::LoadConstTypedString {
            trgt: literal,
            value: value.clone(),
            tkey,
        });
        let skey = program::static_function_key(&candidate.owner, "tryParse", &binds);
        self.ir.register_call(
            skey.clone(),
            program::CallRegistration {
                kind: program::CallKind::StaticFunction,
                owner: Some(candidate.owner.clone()),
                name: "tryParse".to_string(),
                binds,
            },
        );
        let trgt = self.emitter.generate_tmp_register();
        self.emitter.emit(Op::CallStaticFunction {
            trgt,
            skey,
            args: vec![literal],
        });
        let result = (*atom.result).clone();
        Ok((trgt, vec![env.with_result_unknown(result)]))
    }

    // ==================== Lambdas ====================

    pub(crate) fn check_lambda_construction(
        &mut self,
        env: &TypeEnv,
        expr: &Expr,
        hint: Option<&ResolvedType>,
    ) -> CheckResult<(Register, Flows)> {
        let Expr::ConstructLambda {
            sig,
            captured,
            body,
            span,
        } = expr
        else {
            unreachable!("check_lambda_construction only handles lambdas");
        };

        let atom = if sig.auto {
            let Some(expected) = hint.and_then(|h| h.as_unique_function()) else {
                return self.fail(
                    CheckErrorKind::TypeMismatch,
                    *span,
                    "Cannot infer an auto lambda signature without a function-typed context",
                );
            };
            if expected.params.len() != sig.params.len() {
                return self.fail(
                    CheckErrorKind::TypeMismatch,
                    *span,
                    format!(
                        "Lambda takes {} parameters but the context expects {}",
                        sig.params.len(),
                        expected.params.len()
                    ),
                );
            }
            FunctionAtom {
                params: sig
                    .params
                    .iter()
                    .zip(expected.params.iter())
                    .map(|(p, ep)| FunctionParam {
                        name: p.name.clone(),
                        ty: ep.ty.clone(),
                        optional: ep.optional,
                    })
                    .collect(),
                rest: expected.rest.clone(),
                result: expected.result.clone(),
            }
        } else {
            let mut params = Vec::with_capacity(sig.params.len());
            for p in &sig.params {
                let Some(psig) = &p.sig else {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        *span,
                        format!("Lambda parameter '{}' is missing a type", p.name),
                    );
                };
                params.push(calyx_ast::ParamSig {
                    name: p.name.clone(),
                    sig: psig.clone(),
                    optional: false,
                });
            }
            let Some(result_sig) = &sig.result else {
                return self.fail(
                    CheckErrorKind::TypeMismatch,
                    *span,
                    "Lambda with an explicit signature must declare a result type",
                );
            };
            match self
                .asm
                .normalize_function_sig(&params, None, result_sig, &env.terms)
            {
                Ok(a) => a,
                Err(msg) => return self.fail(CheckErrorKind::TypeMismatch, *span, msg),
            }
        };

        // Capture set: record each captured name with its current flow type.
        let mut captures = Vec::with_capacity(captured.len());
        for name in captured {
            let Some((info, _)) = env.lookup_var(name) else {
                return self.fail(
                    CheckErrorKind::UnknownName,
                    *span,
                    format!("Captured variable '{}' is not defined", name),
                );
            };
            if !info.must_defined {
                return self.fail(
                    CheckErrorKind::UseBeforeDef,
                    *span,
                    format!("Captured variable '{}' may be used before definition", name),
                );
            }
            captures.push((name.clone(), info.flow.clone()));
        }

        let lkey = program::lambda_key(
            &self.current_bkey,
            span.start_line,
            span.start_column,
            &env.terms,
        );
        self.ir.register_lambda(
            lkey.clone(),
            program::LambdaRegistration {
                captures: captures.clone(),
            },
        );
        self.pending_lambdas.push_back(PendingLambda {
            lkey: lkey.clone(),
            atom: atom.clone(),
            body: (**body).clone(),
            captures,
            terms: env.terms.clone(),
            src_file: self.src_file.clone(),
        });

        let trgt = self.emitter.generate_tmp_register();
        self.emitter.emit(Op::ConstructLambda { trgt, lkey });
        let result = ResolvedType::from_atom(TypeAtom::Function(atom));
        self.ir.register_resolved_type_reference(&result);
        Ok((trgt, vec![env.with_result_unknown(result)]))
    }
}
