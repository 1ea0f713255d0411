//! Prefix and binary operators, the short-circuit forms, and select.
//!
//! Short-circuit operators emit a shortcut block loading the constant
//! outcome, a continuation block evaluating the right side, and a merge
//! block. The flows propagated into the right side are the left side's
//! opposite-truth flows, so refinements carry across the operator.

use calyx_ast::{ArithOp, CmpOp, Expr, LogicOp, PrefixOpKind};

use crate::error::{CheckErrorKind, CheckResult};
use crate::ir::core::{self, Op, Register};
use crate::types::{names, ResolvedType, TypeAtom};

use super::super::env::{join_flows, split_none, split_truth, FlowTruth, Flows, TypeEnv};
use super::super::Checker;

impl Checker<'_> {
    pub(crate) fn check_operator(
        &mut self,
        env: &TypeEnv,
        expr: &Expr,
        hint: Option<&ResolvedType>,
    ) -> CheckResult<(Register, Flows)> {
        match expr {
            Expr::PrefixOp { op, operand, span } => match op {
                PrefixOpKind::Plus | PrefixOpKind::Negate => {
                    let (reg, out) = self.check_expr_joined(env, operand, None)?;
                    let ty = out.result_ty();
                    if !self.asm.subtype_of(&ty, &self.asm.int_type()) {
                        return self.fail(
                            CheckErrorKind::TypeMismatch,
                            *span,
                            format!("Prefix operator requires an Int operand, got '{}'", ty),
                        );
                    }
                    let trgt = self.emitter.generate_tmp_register();
                    let ir_op = match op {
                        PrefixOpKind::Plus => core::PrefixOp::Plus,
                        _ => core::PrefixOp::Negate,
                    };
                    self.emitter.emit(Op::PrefixOp {
                        trgt,
                        op: ir_op,
                        arg: reg,
                    });
                    Ok((trgt, vec![out.with_result_unknown(self.asm.int_type())]))
                }
                PrefixOpKind::Not => {
                    let (reg, flows) = self.check_expr(env, operand, None)?;
                    let joined = join_flows(&flows);
                    let ty = joined.result_ty();
                    self.require_truthy(&ty, *span)?;
                    let cond = self.ensure_truthy_value(reg, &ty);
                    let trgt = self.emitter.generate_tmp_register();
                    self.emitter.emit(Op::PrefixOp {
                        trgt,
                        op: core::PrefixOp::Not,
                        arg: cond,
                    });
                    let bool_ty = self.asm.bool_type();
                    let inverted = flows
                        .iter()
                        .map(|f| {
                            let truth = match f.result_truth() {
                                FlowTruth::True => FlowTruth::False,
                                FlowTruth::False => FlowTruth::True,
                                FlowTruth::Unknown => FlowTruth::Unknown,
                            };
                            f.with_result(bool_ty.clone(), truth)
                        })
                        .collect();
                    Ok((trgt, inverted))
                }
            },
            Expr::BinArith { op, lhs, rhs, span } => {
                let (lreg, lenv) = self.check_expr_joined(env, lhs, None)?;
                let lty = lenv.result_ty();
                let (rreg, renv) = self.check_expr_joined(&lenv, rhs, None)?;
                let rty = renv.result_ty();
                let int = self.asm.int_type();
                if !self.asm.subtype_of(&lty, &int) || !self.asm.subtype_of(&rty, &int) {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        *span,
                        format!(
                            "Arithmetic requires Int operands, got '{}' and '{}'",
                            lty, rty
                        ),
                    );
                }
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::BinOp {
                    trgt,
                    op: arith_to_ir(*op),
                    lhs: lreg,
                    rhs: rreg,
                });
                Ok((trgt, vec![renv.with_result_unknown(int)]))
            }
            Expr::BinCmp { op, lhs, rhs, span } => {
                let (lreg, lenv) = self.check_expr_joined(env, lhs, None)?;
                let lty = lenv.result_ty();
                let (rreg, renv) = self.check_expr_joined(&lenv, rhs, None)?;
                let rty = renv.result_ty();
                let int = self.asm.int_type();
                let string = self.asm.string_type();
                let both_int =
                    self.asm.subtype_of(&lty, &int) && self.asm.subtype_of(&rty, &int);
                let both_string =
                    self.asm.subtype_of(&lty, &string) && self.asm.subtype_of(&rty, &string);
                if !both_int && !both_string {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        *span,
                        format!(
                            "Comparison requires two Ints or two Strings, got '{}' and '{}'",
                            lty, rty
                        ),
                    );
                }
                let trgt = self.emitter.generate_tmp_register();
                self.emitter.emit(Op::BinCmp {
                    trgt,
                    op: cmp_to_ir(*op),
                    lhs: lreg,
                    rhs: rreg,
                });
                Ok((trgt, vec![renv.with_result_unknown(self.asm.bool_type())]))
            }
            Expr::BinEq {
                negated,
                lhs,
                rhs,
                span,
            } => self.check_equality(env, *negated, lhs, rhs, *span),
            Expr::BinLogic { op, lhs, rhs, span } => {
                self.check_short_circuit(env, *op, lhs, rhs, *span)
            }
            Expr::NoneCheck { lhs, rhs, span } => {
                self.check_none_gate(env, lhs, rhs, *span, hint, false)
            }
            Expr::Coalesce { lhs, rhs, span } => {
                self.check_none_gate(env, lhs, rhs, *span, hint, true)
            }
            Expr::Select {
                cond,
                tval,
                fval,
                span,
            } => self.check_select(env, cond, tval, fval, *span, hint),
            _ => unreachable!("check_operator only handles operator nodes"),
        }
    }

    // ==================== Truthiness helpers ====================

    pub(crate) fn require_truthy(&self, ty: &ResolvedType, span: calyx_ast::Span) -> CheckResult<()> {
        if !self.asm.subtype_of(ty, &self.asm.truthy_type()) {
            return self.fail(
                CheckErrorKind::TypeMismatch,
                span,
                format!("Expected a Bool | None value, got '{}'", ty),
            );
        }
        Ok(())
    }

    /// Collapse a `Bool | None` register to Bool when None is possible.
    pub(crate) fn ensure_truthy_value(&mut self, reg: Register, ty: &ResolvedType) -> Register {
        if ty.contains_none() {
            let trgt = self.emitter.generate_tmp_register();
            self.emitter.emit(Op::TruthyConversion { trgt, src: reg });
            trgt
        } else {
            reg
        }
    }

    // ==================== Equality ====================

    fn atom_is_none(atom: &TypeAtom) -> bool {
        matches!(atom, TypeAtom::Entity(e) if e.name == names::NONE)
    }

    fn eq_compatible(&self, a: &ResolvedType, b: &ResolvedType) -> bool {
        for aa in a.atoms() {
            for ba in b.atoms() {
                if Self::atom_is_none(aa) || Self::atom_is_none(ba) {
                    continue;
                }
                // Equality through mutual subtyping: the same keyed entity
                // on both sides (primitives, enums, custom keys).
                let same_keyed = aa == ba
                    && matches!(aa, TypeAtom::Entity(_))
                    && self
                        .asm
                        .provides_closure_of_atom(aa)
                        .iter()
                        .any(|r| r.name == names::KEYED);
                if !same_keyed {
                    return false;
                }
            }
        }
        true
    }

    fn check_equality(
        &mut self,
        env: &TypeEnv,
        negated: bool,
        lhs: &Expr,
        rhs: &Expr,
        span: calyx_ast::Span,
    ) -> CheckResult<(Register, Flows)> {
        let (lreg, lenv) = self.check_expr_joined(env, lhs, None)?;
        let lty = lenv.result_ty();
        let (rreg, renv) = self.check_expr_joined(&lenv, rhs, None)?;
        let rty = renv.result_ty();

        if !self.eq_compatible(&lty, &rty) {
            return self.fail(
                CheckErrorKind::TypeMismatch,
                span,
                format!("Types '{}' and '{}' cannot be compared for equality", lty, rty),
            );
        }

        let trgt = self.emitter.generate_tmp_register();
        self.emitter.emit(Op::BinEq {
            trgt,
            negated,
            lhs: lreg,
            rhs: rreg,
        });

        // None-literal against a plain variable: split into assumed-None
        // and assumed-Some environments with the matching truth values.
        let split_var = match (lhs, rhs) {
            (Expr::LiteralNone(_), _) => rhs.as_variable_name(),
            (_, Expr::LiteralNone(_)) => lhs.as_variable_name(),
            _ => None,
        };
        let bool_ty = self.asm.bool_type();
        if let Some(var) = split_var {
            let flow = renv
                .lookup_var(var)
                .map(|(info, _)| info.flow.clone())
                .unwrap_or_else(ResolvedType::never);
            let (none_part, some_part) = flow.split_none();
            let (eq_truth, ne_truth) = if negated {
                (FlowTruth::False, FlowTruth::True)
            } else {
                (FlowTruth::True, FlowTruth::False)
            };
            let mut flows = Vec::new();
            if !none_part.is_never() {
                flows.push(
                    renv.with_var_flow(var, none_part)
                        .with_result(bool_ty.clone(), eq_truth),
                );
            }
            if !some_part.is_never() {
                flows.push(
                    renv.with_var_flow(var, some_part)
                        .with_result(bool_ty.clone(), ne_truth),
                );
            }
            // Keep split order: the True flow first.
            flows.sort_by_key(|f| match f.result_truth() {
                FlowTruth::True => 0,
                _ => 1,
            });
            return Ok((trgt, flows));
        }
        Ok((trgt, vec![renv.with_result_unknown(bool_ty)]))
    }

    // ==================== Short-circuit boolean forms ====================

    fn check_short_circuit(
        &mut self,
        env: &TypeEnv,
        op: LogicOp,
        lhs: &Expr,
        rhs: &Expr,
        span: calyx_ast::Span,
    ) -> CheckResult<(Register, Flows)> {
        let (lreg, lflows) = self.check_expr(env, lhs, None)?;
        let lty = join_flows(&lflows).result_ty();
        self.require_truthy(&lty, span)?;

        let (true_flows, false_flows) = split_truth(&lflows);
        if true_flows.is_empty() {
            return self.fail(
                CheckErrorKind::RedundantTruth,
                span,
                "Left side of logical expression is never true",
            );
        }
        if false_flows.is_empty() {
            return self.fail(
                CheckErrorKind::RedundantTruth,
                span,
                "Left side of logical expression is always true",
            );
        }

        let cond = self.ensure_truthy_value(lreg, &lty);
        let trgt = self.emitter.generate_tmp_register();
        let shortcut = self.emitter.create_new_block("lshort");
        let rest = self.emitter.create_new_block("lrest");
        let done = self.emitter.create_new_block("ldone");

        let (shortcut_value, rhs_flows_in, shortcut_flows) = match op {
            LogicOp::And => (false, &true_flows, &false_flows),
            LogicOp::Or => (true, &false_flows, &true_flows),
            LogicOp::Implies => (true, &true_flows, &false_flows),
        };
        match op {
            LogicOp::Or => self.emitter.emit_bool_jump(cond, &shortcut, &rest),
            LogicOp::And | LogicOp::Implies => {
                self.emitter.emit_bool_jump(cond, &rest, &shortcut)
            }
        }

        self.emitter.set_active_block(&shortcut);
        self.emitter.emit(Op::LoadConstBool {
            trgt,
            value: shortcut_value,
        });
        self.emitter.emit(Op::DirectJump {
            target: done.clone(),
        });

        self.emitter.set_active_block(&rest);
        let rhs_env = join_flows(rhs_flows_in);
        let (rreg, rflows) = self.check_expr(&rhs_env, rhs, None)?;
        let rty = join_flows(&rflows).result_ty();
        self.require_truthy(&rty, span)?;
        let rcond = self.ensure_truthy_value(rreg, &rty);
        self.emitter.emit(Op::RegAssign { trgt, src: rcond });
        self.emitter.emit(Op::DirectJump {
            target: done.clone(),
        });
        self.emitter.set_active_block(&done);

        let bool_ty = self.asm.bool_type();
        let shortcut_truth = if shortcut_value {
            FlowTruth::True
        } else {
            FlowTruth::False
        };
        let mut flows: Flows = Vec::new();
        match op {
            // Preserve split-introduction order: for Or the shortcut came
            // from the True split (introduced first); for And/Implies the
            // RHS flows descend from the True split.
            LogicOp::Or => {
                flows.extend(
                    shortcut_flows
                        .iter()
                        .map(|f| f.with_result(bool_ty.clone(), shortcut_truth)),
                );
                flows.extend(
                    rflows
                        .iter()
                        .map(|f| f.with_result(bool_ty.clone(), f.result_truth())),
                );
            }
            LogicOp::And | LogicOp::Implies => {
                flows.extend(
                    rflows
                        .iter()
                        .map(|f| f.with_result(bool_ty.clone(), f.result_truth())),
                );
                flows.extend(
                    shortcut_flows
                        .iter()
                        .map(|f| f.with_result(bool_ty.clone(), shortcut_truth)),
                );
            }
        }
        Ok((trgt, flows))
    }

    // ==================== None gates ====================

    /// The `?&` none-check (`coalesce = false`) and `?|` coalesce
    /// (`coalesce = true`) short-circuit forms.
    fn check_none_gate(
        &mut self,
        env: &TypeEnv,
        lhs: &Expr,
        rhs: &Expr,
        span: calyx_ast::Span,
        hint: Option<&ResolvedType>,
        coalesce: bool,
    ) -> CheckResult<(Register, Flows)> {
        let narrowed_var = lhs.as_variable_name();
        let (lreg, lflows) = self.check_expr(env, lhs, None)?;
        let (some_flows, none_flows) = split_none(self.asm, &lflows, narrowed_var);
        if some_flows.is_empty() {
            return self.fail(CheckErrorKind::RedundantNullCheck, span, "Value is always none");
        }
        if none_flows.is_empty() {
            return self.fail(
                CheckErrorKind::RedundantNullCheck,
                span,
                "None value is not possible",
            );
        }

        let trgt = self.emitter.generate_tmp_register();
        let shortcut = self.emitter.create_new_block("ncshort");
        let rest = self.emitter.create_new_block("ncrest");
        let done = self.emitter.create_new_block("ncdone");
        self.emitter.emit_none_jump(lreg, &rest, &shortcut);

        self.emitter.set_active_block(&shortcut);
        if coalesce {
            self.emitter.emit(Op::RegAssign { trgt, src: lreg });
        } else {
            self.emitter.emit(Op::LoadConstNone { trgt });
        }
        self.emitter.emit(Op::DirectJump {
            target: done.clone(),
        });

        self.emitter.set_active_block(&rest);
        let rhs_env = join_flows(&none_flows);
        let (rreg, rflows) = self.check_expr(&rhs_env, rhs, hint)?;
        self.emitter.emit(Op::RegAssign { trgt, src: rreg });
        self.emitter.emit(Op::DirectJump {
            target: done.clone(),
        });
        self.emitter.set_active_block(&done);

        let mut flows: Flows = Vec::new();
        if coalesce {
            // The Some path forwards the narrowed left value.
            flows.extend(some_flows.iter().cloned());
        } else {
            let none_ty = self.asm.none_type();
            flows.extend(
                some_flows
                    .iter()
                    .map(|f| f.with_result(none_ty.clone(), FlowTruth::False)),
            );
        }
        flows.extend(rflows);
        Ok((trgt, flows))
    }

    // ==================== Select ====================

    fn check_select(
        &mut self,
        env: &TypeEnv,
        cond: &Expr,
        tval: &Expr,
        fval: &Expr,
        span: calyx_ast::Span,
        hint: Option<&ResolvedType>,
    ) -> CheckResult<(Register, Flows)> {
        let (creg, cflows) = self.check_expr(env, cond, None)?;
        let cty = join_flows(&cflows).result_ty();
        self.require_truthy(&cty, span)?;
        let (true_flows, false_flows) = split_truth(&cflows);
        if true_flows.is_empty() {
            return self.fail(
                CheckErrorKind::RedundantTruth,
                span,
                "Select condition is never true",
            );
        }
        if false_flows.is_empty() {
            return self.fail(
                CheckErrorKind::RedundantTruth,
                span,
                "Select condition is always true",
            );
        }

        let cvalue = self.ensure_truthy_value(creg, &cty);
        let trgt = self.emitter.generate_tmp_register();
        let tblock = self.emitter.create_new_block("selecttrue");
        let fblock = self.emitter.create_new_block("selectfalse");
        let done = self.emitter.create_new_block("selectdone");
        self.emitter.emit_bool_jump(cvalue, &tblock, &fblock);

        self.emitter.set_active_block(&tblock);
        let tenv = join_flows(&true_flows);
        let (treg, tflows) = self.check_expr(&tenv, tval, hint)?;
        self.emitter.emit(Op::RegAssign { trgt, src: treg });
        self.emitter.emit(Op::DirectJump {
            target: done.clone(),
        });

        self.emitter.set_active_block(&fblock);
        let fenv = join_flows(&false_flows);
        let (freg, fflows) = self.check_expr(&fenv, fval, hint)?;
        self.emitter.emit(Op::RegAssign { trgt, src: freg });
        self.emitter.emit(Op::DirectJump {
            target: done.clone(),
        });
        self.emitter.set_active_block(&done);

        let mut flows = tflows;
        flows.extend(fflows);
        Ok((trgt, flows))
    }
}

fn arith_to_ir(op: ArithOp) -> core::BinOp {
    match op {
        ArithOp::Add => core::BinOp::Add,
        ArithOp::Sub => core::BinOp::Sub,
        ArithOp::Mul => core::BinOp::Mul,
        ArithOp::Div => core::BinOp::Div,
        ArithOp::Mod => core::BinOp::Mod,
    }
}

fn cmp_to_ir(op: CmpOp) -> core::CmpOp {
    match op {
        CmpOp::Lt => core::CmpOp::Lt,
        CmpOp::Le => core::CmpOp::Le,
        CmpOp::Gt => core::CmpOp::Gt,
        CmpOp::Ge => core::CmpOp::Ge,
    }
}
