//! The checker core.
//!
//! `Checker` owns the error list, the output assembly, and the body
//! emitter for the declaration currently being checked. The declaration
//! drivers build the initial environment for each declaration kind and
//! delegate to the body entry; a failed check unwinds to the driver,
//! which records the error, drops the partial body, and moves on.
//!
//! Submodules:
//! - `env`: typing environments and multi-flow splitting/joining
//! - `args`: argument evaluation and the two-phase argument resolver
//! - `expr`: expression checking and emission
//! - `stmt`: statement checking, block scoping, and joins
//! - `body`: body entry and return-type conformance

pub mod args;
pub mod body;
pub mod env;
pub mod expr;
pub mod stmt;

use std::collections::{BTreeMap, VecDeque};

use calyx_ast::{FunctionBody, Span, TypeSignature};

use crate::assembly::{Assembly, Binds, ConstDecl, FunctionDecl, GlobalDecl, OOTypeDecl, TermDecl};
use crate::error::{CheckError, CheckErrorKind, CheckResult, MAX_ERRORS};
use crate::ir::body::BodyEmitter;
use crate::ir::program::{self, IrAssembly};
use crate::types::{EntityAtom, FunctionAtom, ResolvedType, TypeAtom};
use crate::types::{ConceptAtom, ConceptRef};

use env::{TypeEnv, VarInfo};

/// A lambda body queued during expression checking and compiled after the
/// enclosing declaration finishes.
#[derive(Debug, Clone)]
pub(crate) struct PendingLambda {
    pub lkey: String,
    pub atom: FunctionAtom,
    pub body: FunctionBody,
    pub captures: Vec<(String, ResolvedType)>,
    pub terms: Binds,
    pub src_file: String,
}

/// The expression/statement checker and IR lowerer.
pub struct Checker<'a> {
    pub(crate) asm: &'a Assembly,
    pub ir: IrAssembly,
    pub errors: Vec<CheckError>,
    pub(crate) emitter: BodyEmitter,
    pub(crate) src_file: String,
    pub(crate) current_bkey: String,
    pub(crate) result_hint: Option<ResolvedType>,
    pub(crate) pending_lambdas: VecDeque<PendingLambda>,
    halted: bool,
}

impl std::fmt::Debug for Checker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Checker")
            .field("errors", &self.errors.len())
            .field("bodies", &self.ir.bodies.len())
            .finish()
    }
}

impl<'a> Checker<'a> {
    pub fn new(asm: &'a Assembly) -> Self {
        Self {
            asm,
            ir: IrAssembly::new(),
            errors: Vec::new(),
            emitter: BodyEmitter::new(),
            src_file: String::new(),
            current_bkey: String::new(),
            result_hint: None,
            pending_lambdas: VecDeque::new(),
            halted: false,
        }
    }

    /// Consume the checker, yielding the output assembly and diagnostics.
    pub fn into_result(self) -> (IrAssembly, Vec<CheckError>) {
        (self.ir, self.errors)
    }

    // ==================== Error helpers ====================

    pub(crate) fn raise(
        &self,
        kind: CheckErrorKind,
        span: Span,
        message: impl Into<String>,
    ) -> CheckError {
        CheckError::new(kind, self.src_file.clone(), span, message)
    }

    pub(crate) fn fail<T>(
        &self,
        kind: CheckErrorKind,
        span: Span,
        message: impl Into<String>,
    ) -> CheckResult<T> {
        Err(self.raise(kind, span, message))
    }

    fn kind_for_asm_message(message: &str) -> CheckErrorKind {
        if message.contains("Unknown type name") {
            CheckErrorKind::UnknownName
        } else if message.contains("masks a universal method") {
            CheckErrorKind::RecordMasksAnyMethod
        } else if message.contains("Duplicate") {
            CheckErrorKind::DuplicateName
        } else if message.contains("may not follow optional")
            || message.contains("cannot be combined with a rest parameter")
        {
            CheckErrorKind::BadParameterOrder
        } else {
            CheckErrorKind::TypeMismatch
        }
    }

    /// Normalize a signature, converting oracle failures into diagnostics.
    pub(crate) fn normalize(
        &self,
        sig: &TypeSignature,
        binds: &Binds,
        span: Span,
    ) -> CheckResult<ResolvedType> {
        self.asm
            .normalize_type(sig, binds)
            .map_err(|msg| self.raise(Self::kind_for_asm_message(&msg), span, msg))
    }

    pub(crate) fn normalize_in_env(
        &self,
        sig: &TypeSignature,
        env: &TypeEnv,
        span: Span,
    ) -> CheckResult<ResolvedType> {
        self.normalize(sig, &env.terms, span)
    }

    // ==================== Declaration walk ====================

    /// Check every declaration in the assembly: namespace functions,
    /// consts, globals, then OO types (field defaults, invariants,
    /// methods, statics, member consts), then queued lambdas. A failing
    /// declaration is recorded and skipped; past the failure budget the
    /// walk halts with a synthetic fatal error.
    pub fn check_all(&mut self) {
        let asm = self.asm;

        for ns in asm.namespaces.values() {
            for decl in ns.functions.values() {
                self.run_declaration(|chk| chk.check_namespace_function(&ns.name, decl));
            }
            for decl in ns.consts.values() {
                self.run_declaration(|chk| chk.check_namespace_const(&ns.name, decl));
            }
            for decl in ns.globals.values() {
                self.run_declaration(|chk| chk.check_namespace_global(&ns.name, decl));
            }
        }

        for decl in asm.object_decls.values() {
            if decl.has_attribute("core") {
                continue;
            }
            self.check_oo_decl(decl);
        }

        self.process_pending();
    }

    fn run_declaration<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Self) -> CheckResult<()>,
    {
        if self.halted {
            return;
        }
        if let Err(err) = f(self) {
            self.emitter.disable();
            self.errors.push(err);
        }
        if self.errors.len() > MAX_ERRORS && !self.halted {
            self.halted = true;
            self.errors.push(CheckError::new(
                CheckErrorKind::Fatal,
                "<checker>",
                Span::synthetic(),
                "Too many errors; checking aborted",
            ));
        }
    }

    /// Bind each declared term to its bound (or Any) so generic bodies
    /// check against the most general admissible instantiation.
    pub(crate) fn term_binds(&self, terms: &[TermDecl], outer: &Binds) -> CheckResult<Binds> {
        let mut binds = outer.clone();
        for term in terms {
            let bound = match &term.bound {
                Some(sig) => self.normalize(sig, &binds, Span::synthetic())?,
                None => self.asm.any_type(),
            };
            binds.insert(term.name.clone(), bound);
        }
        Ok(binds)
    }

    /// The receiver type of an OO declaration under its own terms.
    fn receiver_type(&self, decl: &OOTypeDecl, binds: &Binds) -> ResolvedType {
        let own_binds: Binds = decl
            .terms
            .iter()
            .filter_map(|t| binds.get(&t.name).map(|b| (t.name.clone(), b.clone())))
            .collect();
        if decl.is_entity() {
            ResolvedType::entity(EntityAtom {
                name: decl.name.clone(),
                binds: own_binds,
            })
        } else {
            ResolvedType::from_atom(TypeAtom::Concept(ConceptAtom::single(ConceptRef {
                name: decl.name.clone(),
                binds: own_binds,
            })))
        }
    }

    fn function_env(
        &self,
        decl: &FunctionDecl,
        terms: &Binds,
        this: Option<&ResolvedType>,
    ) -> CheckResult<(TypeEnv, Vec<String>)> {
        let mut args = BTreeMap::new();
        let mut arg_names = Vec::new();
        if let Some(this_ty) = this {
            args.insert(
                "this".to_string(),
                VarInfo::new(this_ty.clone(), true, true),
            );
            arg_names.push("this".to_string());
        }
        for param in &decl.params {
            let ty = self.normalize(&param.sig, terms, param_span(decl))?;
            let declared = if param.optional && param.default.is_none() {
                ResolvedType::union_of(&[ty, self.asm.none_type()])
            } else {
                ty
            };
            args.insert(param.name.clone(), VarInfo::new(declared, false, true));
            arg_names.push(param.name.clone());
        }
        if let Some(rest) = &decl.rest {
            let ty = self.normalize(&rest.sig, terms, param_span(decl))?;
            args.insert(rest.name.clone(), VarInfo::new(ty, false, true));
            arg_names.push(rest.name.clone());
        }
        Ok((
            TypeEnv::new(terms.clone(), args, BTreeMap::new()),
            arg_names,
        ))
    }

    fn check_function_like(
        &mut self,
        fkey: &str,
        decl: &FunctionDecl,
        terms: &Binds,
        this: Option<&ResolvedType>,
    ) -> CheckResult<()> {
        let result_ty = self.normalize(&decl.result, terms, decl.span)?;
        let (env, arg_names) = self.function_env(decl, terms, this)?;

        // Declared parameter defaults compile to their own keyed bodies;
        // the argument resolver loads them for unfilled slots.
        for param in &decl.params {
            if let Some(default) = &param.default {
                let dkey = program::default_value_key(fkey, &param.name);
                if self.ir.has_body(&dkey) {
                    continue;
                }
                let declared = self.normalize(&param.sig, terms, decl.span)?;
                let default_env = TypeEnv::new(terms.clone(), BTreeMap::new(), BTreeMap::new());
                let default_body = FunctionBody::Expr(default.clone());
                self.compile_body(&dkey, &decl.src_file, &default_body, default_env, &[], &declared)?;
            }
        }

        for (i, cond) in decl.preconds.iter().enumerate() {
            let pre_body = FunctionBody::Expr(cond.clone());
            self.compile_body(
                &program::precond_key(fkey, i),
                &decl.src_file,
                &pre_body,
                env.clone(),
                &arg_names,
                &self.asm.bool_type(),
            )?;
        }
        for (i, cond) in decl.postconds.iter().enumerate() {
            let mut post_env = env.clone();
            let mut post_args = arg_names.clone();
            post_env = post_env_with_return(post_env, &result_ty);
            post_args.push("_return_".to_string());
            let post_body = FunctionBody::Expr(cond.clone());
            self.compile_body(
                &program::postcond_key(fkey, i),
                &decl.src_file,
                &post_body,
                post_env,
                &post_args,
                &self.asm.bool_type(),
            )?;
        }

        if let Some(body) = &decl.body {
            self.compile_body(fkey, &decl.src_file, body, env, &arg_names, &result_ty)?;
        }
        Ok(())
    }

    fn check_namespace_function(&mut self, ns: &str, decl: &FunctionDecl) -> CheckResult<()> {
        let terms = self.term_binds(&decl.terms, &Binds::new())?;
        let fkey = program::namespace_function_key(ns, &decl.name, &Binds::new());
        self.check_function_like(&fkey, decl, &terms, None)
    }

    fn check_namespace_const(&mut self, ns: &str, decl: &ConstDecl) -> CheckResult<()> {
        let ckey = program::const_key(ns, &decl.name);
        if self.ir.has_body(&ckey) {
            return Ok(());
        }
        let declared = self.normalize(&decl.sig, &Binds::new(), decl.span)?;
        let env = TypeEnv::new(Binds::new(), BTreeMap::new(), BTreeMap::new());
        let body = FunctionBody::Expr(decl.value.clone());
        self.compile_body(&ckey, &decl.src_file, &body, env, &[], &declared)
    }

    fn check_namespace_global(&mut self, ns: &str, decl: &GlobalDecl) -> CheckResult<()> {
        let gkey = program::global_key(ns, &decl.name);
        if self.ir.has_body(&gkey) {
            return Ok(());
        }
        let declared = self.normalize(&decl.sig, &Binds::new(), decl.span)?;
        let env = TypeEnv::new(Binds::new(), BTreeMap::new(), BTreeMap::new());
        let body = FunctionBody::Expr(decl.value.clone());
        self.compile_body(&gkey, &decl.src_file, &body, env, &[], &declared)
    }

    fn check_oo_decl(&mut self, decl: &OOTypeDecl) {
        let Ok(type_terms) = self.term_binds(&decl.terms, &Binds::new()) else {
            self.run_declaration(|chk| {
                chk.fail(
                    CheckErrorKind::TypeMismatch,
                    decl.span,
                    format!("Invalid template bounds on '{}'", decl.name),
                )
            });
            return;
        };
        let receiver = self.receiver_type(decl, &type_terms);
        // Declaration-walk keys are bind-free: bodies are compiled once per
        // declaration, while call sites carry instantiation fingerprints.
        let owner_key = decl.name.clone();

        for field in &decl.fields {
            if let Some(default) = &field.default {
                self.run_declaration(|chk| {
                    let declared = chk.normalize(&field.sig, &type_terms, field.span)?;
                    let env = TypeEnv::new(type_terms.clone(), BTreeMap::new(), BTreeMap::new());
                    let body = FunctionBody::Expr(default.clone());
                    chk.compile_body(
                        &program::default_value_key(&owner_key, &field.name),
                        &decl.src_file,
                        &body,
                        env,
                        &[],
                        &declared,
                    )
                });
            }
        }

        for (i, invariant) in decl.invariants.iter().enumerate() {
            self.run_declaration(|chk| {
                let mut args = BTreeMap::new();
                args.insert("this".to_string(), VarInfo::new(receiver.clone(), true, true));
                let env = TypeEnv::new(type_terms.clone(), args, BTreeMap::new());
                let body = FunctionBody::Expr(invariant.clone());
                chk.compile_body(
                    &program::invariant_key(&owner_key, i),
                    &decl.src_file,
                    &body,
                    env,
                    &["this".to_string()],
                    &chk.asm.bool_type(),
                )
            });
        }

        for method in decl.methods.values() {
            if method.is_abstract() {
                continue;
            }
            self.run_declaration(|chk| {
                let terms = chk.term_binds(&method.terms, &type_terms)?;
                let mkey = program::method_key(&owner_key, &method.name, &Binds::new());
                chk.check_function_like(&mkey, method, &terms, Some(&receiver))
            });
        }

        for static_fn in decl.statics.values() {
            if static_fn.body.is_none() {
                continue;
            }
            self.run_declaration(|chk| {
                let terms = chk.term_binds(&static_fn.terms, &type_terms)?;
                let skey = program::static_function_key(&owner_key, &static_fn.name, &Binds::new());
                chk.check_function_like(&skey, static_fn, &terms, None)
            });
        }

        for member_const in decl.consts.values() {
            self.run_declaration(|chk| {
                let ckey = program::const_key(&owner_key, &member_const.name);
                if chk.ir.has_body(&ckey) {
                    return Ok(());
                }
                let declared = chk.normalize(&member_const.sig, &type_terms, member_const.span)?;
                let env = TypeEnv::new(type_terms.clone(), BTreeMap::new(), BTreeMap::new());
                let body = FunctionBody::Expr(member_const.value.clone());
                chk.compile_body(&ckey, &decl.src_file, &body, env, &[], &declared)
            });
        }
    }

    /// Drain the pending queues: lambdas discovered in bodies, plus any
    /// const/global initializers referenced before (or instead of) their
    /// own walk slot.
    fn process_pending(&mut self) {
        while let Some(lambda) = self.pending_lambdas.pop_front() {
            if self.halted {
                return;
            }
            self.run_declaration(|chk| chk.check_pending_lambda(&lambda));
        }

        let pending_consts = self.ir.take_pending_consts();
        for (_, pending) in pending_consts {
            match pending {
                program::PendingConst::Namespace { ns, name } => {
                    let Some(decl) = self
                        .asm
                        .get_namespace(&ns)
                        .and_then(|n| n.consts.get(&name))
                    else {
                        continue;
                    };
                    self.run_declaration(|chk| chk.check_namespace_const(&ns, decl));
                }
                program::PendingConst::Member { .. } => {
                    // Member consts are compiled in the declaration walk;
                    // the pending entry only records the reference.
                }
            }
        }
        let pending_globals = self.ir.take_pending_globals();
        for (_, pending) in pending_globals {
            let Some(decl) = self
                .asm
                .get_namespace(&pending.ns)
                .and_then(|n| n.globals.get(&pending.name))
            else {
                continue;
            };
            self.run_declaration(|chk| chk.check_namespace_global(&pending.ns, decl));
        }

        if !self.pending_lambdas.is_empty() {
            self.process_pending();
        }
    }

    fn check_pending_lambda(&mut self, lambda: &PendingLambda) -> CheckResult<()> {
        if self.ir.has_body(&lambda.lkey) {
            return Ok(());
        }
        let mut args = BTreeMap::new();
        let mut arg_names = Vec::new();
        for param in &lambda.atom.params {
            let declared = if param.optional {
                ResolvedType::union_of(&[param.ty.clone(), self.asm.none_type()])
            } else {
                param.ty.clone()
            };
            args.insert(param.name.clone(), VarInfo::new(declared, false, true));
            arg_names.push(param.name.clone());
        }
        let mut captured = BTreeMap::new();
        for (name, ty) in &lambda.captures {
            captured.insert(name.clone(), VarInfo::new(ty.clone(), true, true));
        }
        let env = TypeEnv::new(lambda.terms.clone(), args, captured);
        let result = (*lambda.atom.result).clone();
        self.compile_body(
            &lambda.lkey,
            &lambda.src_file,
            &lambda.body,
            env,
            &arg_names,
            &result,
        )
    }
}

fn param_span(decl: &FunctionDecl) -> Span {
    decl.span
}

fn post_env_with_return(env: TypeEnv, result_ty: &ResolvedType) -> TypeEnv {
    // Post-condition environments additionally see `_return_` with the
    // declared result type.
    env.declare_local("_return_", VarInfo::new(result_ty.clone(), true, true))
}
