//! Statement checking: declarations, assignment, structured control flow,
//! return, assert/check, and block scoping.
//!
//! Each statement takes an environment and returns the single post-state
//! environment; branch environments join explicitly at the merge block.
//! Blocks open a local scope and emit a lifetime-end for every declared
//! variable on every exit path.

use calyx_ast::{BlockStmt, Stmt};

use crate::error::{CheckErrorKind, CheckResult};
use crate::ir::body::EXIT_BLOCK;
use crate::ir::core::Op;

use super::env::{join_flows, split_truth, TypeEnv, VarInfo};
use super::Checker;

impl Checker<'_> {
    pub(crate) fn check_stmt(&mut self, env: TypeEnv, stmt: &Stmt) -> CheckResult<TypeEnv> {
        match stmt {
            Stmt::Empty(_) => Ok(env),
            Stmt::VarDecl {
                name,
                is_const,
                sig,
                init,
                span,
            } => {
                if env.would_shadow(name) {
                    return self.fail(
                        CheckErrorKind::IllegalShadowing,
                        *span,
                        format!("Variable '{}' shadows an existing binding", name),
                    );
                }
                if *is_const && init.is_none() {
                    return self.fail(
                        CheckErrorKind::MissingRequired,
                        *span,
                        format!("Const variable '{}' requires an initializer", name),
                    );
                }
                if sig.is_auto() && init.is_none() {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        *span,
                        format!("Auto-typed variable '{}' requires an initializer", name),
                    );
                }
                let declared_opt = if sig.is_auto() {
                    None
                } else {
                    Some(self.normalize_in_env(sig, &env, *span)?)
                };

                match init {
                    Some(value) => {
                        let (reg, joined) =
                            self.check_expr_joined(&env, value, declared_opt.as_ref())?;
                        let flow = joined.result_ty();
                        let declared = declared_opt.unwrap_or_else(|| flow.clone());
                        if !self.asm.subtype_of(&flow, &declared) {
                            return self.fail(
                                CheckErrorKind::TypeMismatch,
                                *span,
                                format!(
                                    "Initializer type '{}' is not a subtype of declared type '{}'",
                                    flow, declared
                                ),
                            );
                        }
                        let home = self.emitter.register_var(name);
                        let tkey = self.ir.register_resolved_type_reference(&declared);
                        self.emitter.emit(Op::LocalLifetimeStart {
                            name: name.clone(),
                            tkey,
                        });
                        self.emitter.emit(Op::RegAssign {
                            trgt: home,
                            src: reg,
                        });
                        Ok(joined.declare_local(
                            name,
                            VarInfo {
                                declared,
                                is_const: *is_const,
                                must_defined: true,
                                flow,
                            },
                        ))
                    }
                    None => {
                        let declared = declared_opt.expect("checked above");
                        self.emitter.register_var(name);
                        let tkey = self.ir.register_resolved_type_reference(&declared);
                        self.emitter.emit(Op::LocalLifetimeStart {
                            name: name.clone(),
                            tkey,
                        });
                        Ok(env.declare_local(name, VarInfo::new(declared, false, false)))
                    }
                }
            }
            Stmt::VarAssign { name, value, span } => {
                let Some((info, _)) = env.lookup_var(name) else {
                    return self.fail(
                        CheckErrorKind::UnknownName,
                        *span,
                        format!("Variable '{}' is not declared", name),
                    );
                };
                if info.is_const {
                    return self.fail(
                        CheckErrorKind::AssignToConst,
                        *span,
                        format!("Cannot assign to const variable '{}'", name),
                    );
                }
                let declared = info.declared.clone();
                let (reg, joined) = self.check_expr_joined(&env, value, Some(&declared))?;
                let ty = joined.result_ty();
                if !self.asm.subtype_of(&ty, &declared) {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        *span,
                        format!(
                            "Assigned type '{}' is not a subtype of declared type '{}'",
                            ty, declared
                        ),
                    );
                }
                let home = self.emitter.register_var(name);
                self.emitter.emit(Op::RegAssign {
                    trgt: home,
                    src: reg,
                });
                Ok(joined.with_var_assigned(name, ty))
            }
            Stmt::IfElse {
                branches,
                else_body,
                span,
            } => {
                if branches.len() > 1 && else_body.is_none() {
                    return self.fail(
                        CheckErrorKind::MissingRequired,
                        *span,
                        "If statement with elseif branches requires an else branch",
                    );
                }
                let done = self.emitter.create_new_block("ifdone");
                let mut cur = env;
                let mut branch_envs = Vec::with_capacity(branches.len() + 1);

                for branch in branches {
                    let (creg, cflows) = self.check_expr(&cur, &branch.cond, None)?;
                    let cty = join_flows(&cflows).result_ty();
                    self.require_truthy(&cty, branch.span)?;
                    let (true_flows, false_flows) = split_truth(&cflows);
                    if true_flows.is_empty() {
                        return self.fail(
                            CheckErrorKind::RedundantTruth,
                            branch.span,
                            "Condition is never true",
                        );
                    }
                    if false_flows.is_empty() {
                        return self.fail(
                            CheckErrorKind::RedundantTruth,
                            branch.span,
                            "Condition is always true",
                        );
                    }
                    let cval = self.ensure_truthy_value(creg, &cty);
                    let tblock = self.emitter.create_new_block("iftrue");
                    let fblock = self.emitter.create_new_block("ifelse");
                    self.emitter.emit_bool_jump(cval, &tblock, &fblock);

                    self.emitter.set_active_block(&tblock);
                    let out = self.check_block(join_flows(&true_flows), &branch.body)?;
                    if out.normal_flow {
                        self.emitter.emit(Op::DirectJump {
                            target: done.clone(),
                        });
                    }
                    branch_envs.push(out);

                    self.emitter.set_active_block(&fblock);
                    cur = join_flows(&false_flows);
                }

                match else_body {
                    Some(body) => {
                        let out = self.check_block(cur, body)?;
                        if out.normal_flow {
                            self.emitter.emit(Op::DirectJump {
                                target: done.clone(),
                            });
                        }
                        branch_envs.push(out);
                    }
                    None => {
                        self.emitter.emit(Op::DirectJump {
                            target: done.clone(),
                        });
                        branch_envs.push(cur);
                    }
                }
                self.emitter.set_active_block(&done);
                Ok(TypeEnv::join(&branch_envs))
            }
            Stmt::Return { value, span: _ } => {
                let hint = self.result_hint.clone();
                let (reg, joined) = self.check_expr_joined(&env, value, hint.as_ref())?;
                let ty = joined.result_ty();
                // Close every open scope before leaving the frame.
                for name in joined.all_scope_vars() {
                    self.emitter.emit(Op::LocalLifetimeEnd { name });
                }
                self.emitter.emit(Op::ReturnAssign { src: reg });
                self.emitter.emit(Op::DirectJump {
                    target: EXIT_BLOCK.to_string(),
                });
                Ok(joined.with_return(ty))
            }
            Stmt::Assert { cond, span } => self.check_test_stmt(env, cond, *span, true),
            Stmt::Check { cond, span } => self.check_test_stmt(env, cond, *span, false),
            Stmt::Block(block) => self.check_block(env, block),
        }
    }

    fn check_test_stmt(
        &mut self,
        env: TypeEnv,
        cond: &calyx_ast::Expr,
        span: calyx_ast::Span,
        is_assert: bool,
    ) -> CheckResult<TypeEnv> {
        let (creg, cflows) = self.check_expr(&env, cond, None)?;
        let cty = join_flows(&cflows).result_ty();
        self.require_truthy(&cty, span)?;
        let (true_flows, false_flows) = split_truth(&cflows);
        if true_flows.is_empty() {
            return self.fail(
                CheckErrorKind::RedundantTruth,
                span,
                "Test condition is never true",
            );
        }
        if false_flows.is_empty() {
            return self.fail(
                CheckErrorKind::RedundantTruth,
                span,
                "Test condition is always true",
            );
        }
        let cval = self.ensure_truthy_value(creg, &cty);
        if is_assert {
            self.emitter.emit(Op::Assert { cond: cval });
        } else {
            self.emitter.emit(Op::Check { cond: cval });
        }
        // Execution continues only when the test held.
        Ok(join_flows(&true_flows))
    }

    /// Check a block: open a scope, stop at the first statement that
    /// clears normal flow (reporting anything after it), and close the
    /// scope with lifetime-ends on the normal exit path.
    pub(crate) fn check_block(&mut self, env: TypeEnv, block: &BlockStmt) -> CheckResult<TypeEnv> {
        let mut cur = env.push_scope();
        for stmt in &block.stmts {
            if !cur.normal_flow {
                return self.fail(CheckErrorKind::UnreachableCode, stmt.span(), "Unreachable code");
            }
            cur = self.check_stmt(cur, stmt)?;
        }
        if cur.normal_flow {
            for name in cur.innermost_scope_vars() {
                self.emitter.emit(Op::LocalLifetimeEnd { name });
            }
        }
        let (popped, _) = cur.pop_scope();
        Ok(popped)
    }
}
