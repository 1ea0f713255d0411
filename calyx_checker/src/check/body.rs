//! Body entry: wraps expression and block bodies, verifies return-type
//! conformance, and registers the compiled body.
//!
//! Raw bodies pass through opaquely. An expression body is wrapped in a
//! return-assign plus jump to the exit block; a block body must end every
//! reachable path in a return statement.

use calyx_ast::FunctionBody;

use crate::error::{CheckErrorKind, CheckResult};
use crate::ir::body::{BodyEmitter, EXIT_BLOCK};
use crate::ir::core::{BodyImpl, CompiledBody, Op};
use crate::types::ResolvedType;

use super::env::TypeEnv;
use super::Checker;

impl Checker<'_> {
    /// Check one declaration body and register the compiled result under
    /// `bkey`. The emitter is fresh per body; a failed check leaves the
    /// partial output unregistered.
    pub(crate) fn compile_body(
        &mut self,
        bkey: &str,
        src_file: &str,
        body: &FunctionBody,
        env: TypeEnv,
        arg_names: &[String],
        declared_result: &ResolvedType,
    ) -> CheckResult<()> {
        self.src_file = src_file.to_string();
        self.current_bkey = bkey.to_string();
        self.result_hint = Some(declared_result.clone());
        self.emitter = BodyEmitter::new();

        match body {
            FunctionBody::Raw { code, .. } => {
                self.ir.register_body(CompiledBody {
                    bkey: bkey.to_string(),
                    src_file: src_file.to_string(),
                    body: BodyImpl::Raw { code: code.clone() },
                });
                return Ok(());
            }
            FunctionBody::Expr(expr) => {
                for name in arg_names {
                    self.emitter.register_var(name);
                }
                let (reg, joined) = self.check_expr_joined(&env, expr, Some(declared_result))?;
                let ty = joined.result_ty();
                if !self.asm.subtype_of(&ty, declared_result) {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        expr.span(),
                        format!(
                            "Body result type '{}' is not a subtype of the declared result '{}'",
                            ty, declared_result
                        ),
                    );
                }
                self.emitter.emit(Op::ReturnAssign { src: reg });
                self.emitter.emit(Op::DirectJump {
                    target: EXIT_BLOCK.to_string(),
                });
            }
            FunctionBody::Block(block) => {
                for name in arg_names {
                    self.emitter.register_var(name);
                }
                let out = self.check_block(env, block)?;
                if out.normal_flow {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        block.span,
                        "Not all control paths return a value",
                    );
                }
                let returned = out
                    .return_result
                    .clone()
                    .unwrap_or_else(ResolvedType::never);
                if !self.asm.subtype_of(&returned, declared_result) {
                    return self.fail(
                        CheckErrorKind::TypeMismatch,
                        block.span,
                        format!(
                            "Return type '{}' is not a subtype of the declared result '{}'",
                            returned, declared_result
                        ),
                    );
                }
            }
        }

        let emitter = std::mem::take(&mut self.emitter);
        if emitter.is_enabled() {
            self.ir.register_body(emitter.get_body(bkey, src_file));
        }
        Ok(())
    }
}
