//! End-to-end checker scenarios: flow narrowing, argument expansion,
//! redundancy diagnostics, and emitted-IR shape.

use calyx_ast::{
    Arg, ArithOp, BlockStmt, CmpOp, CondBranch, Expr, FunctionBody, LambdaParam, LambdaSig,
    PostfixOp, PostfixOpKind, Span, Stmt, TypeSignature,
};
use calyx_checker::assembly::{
    Assembly, ConstDecl, FieldDecl, FunctionDecl, OOTypeDecl, ParamDecl,
};
use calyx_checker::error::CheckErrorKind;
use calyx_checker::ir::core::{BodyImpl, Op};
use calyx_checker::{CheckError, Checker, IrAssembly};
use pretty_assertions::assert_eq;

fn sp() -> Span {
    Span::at(1, 1)
}

fn int_sig() -> TypeSignature {
    TypeSignature::nominal("Int", sp())
}

fn bool_sig() -> TypeSignature {
    TypeSignature::nominal("Bool", sp())
}

fn string_sig() -> TypeSignature {
    TypeSignature::nominal("String", sp())
}

fn union_sig(options: Vec<TypeSignature>) -> TypeSignature {
    TypeSignature::Union {
        options,
        span: sp(),
    }
}

fn int_or_none_sig() -> TypeSignature {
    union_sig(vec![int_sig(), TypeSignature::nominal("None", sp())])
}

fn var(name: &str) -> Expr {
    Expr::AccessVariable {
        name: name.to_string(),
        span: sp(),
    }
}

fn lit(value: i64) -> Expr {
    Expr::LiteralInt(value, sp())
}

fn add(lhs: Expr, rhs: Expr) -> Expr {
    Expr::BinArith {
        op: ArithOp::Add,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        span: sp(),
    }
}

fn block(stmts: Vec<Stmt>) -> BlockStmt {
    BlockStmt { stmts, span: sp() }
}

fn ret(value: Expr) -> Stmt {
    Stmt::Return { value, span: sp() }
}

fn invoke(name: &str, term_args: Vec<TypeSignature>, is_elvis: bool) -> PostfixOp {
    PostfixOp {
        kind: PostfixOpKind::Invoke {
            name: name.to_string(),
            term_args,
            args: vec![],
        },
        is_elvis,
        span: sp(),
    }
}

fn postfix(root: Expr, ops: Vec<PostfixOp>) -> Expr {
    Expr::Postfix {
        root: Box::new(root),
        ops,
        span: sp(),
    }
}

/// Register `decl` as `App::<name>`, run the checker, and hand back the
/// output assembly plus diagnostics.
fn check_function(mut asm: Assembly, decl: FunctionDecl) -> (IrAssembly, Vec<CheckError>) {
    asm.add_namespace_function("App", decl);
    let mut checker = Checker::new(&asm);
    checker.check_all();
    checker.into_result()
}

fn body_ops(ir: &IrAssembly, bkey: &str) -> Vec<Op> {
    match &ir.bodies.get(bkey).expect("body was registered").body {
        BodyImpl::Blocks { blocks, .. } => {
            blocks.iter().flat_map(|b| b.ops.iter().cloned()).collect()
        }
        BodyImpl::Raw { .. } => panic!("expected a block body"),
    }
}

fn point_assembly() -> Assembly {
    let mut asm = Assembly::core();
    asm.add_object_decl(OOTypeDecl::entity("Point").with_fields(vec![
        FieldDecl::required("x", int_sig()),
        FieldDecl::required("y", int_sig()),
        FieldDecl::defaulted("z", int_sig(), lit(0)),
    ]));
    asm
}

// ==================== None-coalesce narrowing ====================

#[test]
fn test_coalesce_narrows_and_emits_none_jump() {
    // x: Int | None; let y = x ?| 0; return y + 1
    let body = FunctionBody::Block(block(vec![
        Stmt::VarDecl {
            name: "y".to_string(),
            is_const: true,
            sig: TypeSignature::Auto(sp()),
            init: Some(Expr::Coalesce {
                lhs: Box::new(var("x")),
                rhs: Box::new(lit(0)),
                span: sp(),
            }),
            span: sp(),
        },
        ret(add(var("y"), lit(1))),
    ]));
    let decl = FunctionDecl::new(
        "f",
        vec![ParamDecl::required("x", int_or_none_sig())],
        int_sig(),
    )
    .with_body(body);

    let (ir, errors) = check_function(Assembly::core(), decl);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    let ops = body_ops(&ir, "App::f");
    assert!(
        ops.iter().any(|op| matches!(op, Op::NoneJump { .. })),
        "coalesce must gate on a none-jump"
    );
}

#[test]
fn test_coalesce_on_non_none_value_is_redundant() {
    let body = FunctionBody::Expr(Expr::Coalesce {
        lhs: Box::new(var("x")),
        rhs: Box::new(lit(0)),
        span: sp(),
    });
    let decl =
        FunctionDecl::new("f", vec![ParamDecl::required("x", int_sig())], int_sig()).with_body(body);
    let (_, errors) = check_function(Assembly::core(), decl);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, CheckErrorKind::RedundantNullCheck);
    assert!(errors[0].message.contains("None value is not possible"));
}

// ==================== Record expando into entity constructor ====================

#[test]
fn test_record_expando_fills_entity_fields_with_default() {
    // Point@{...{x=1, y=2}} - z defaults.
    let ctor = Expr::ConstructEntity {
        of: TypeSignature::nominal("Point", sp()),
        factory: None,
        args: vec![Arg::spread(Expr::ConstructRecord {
            entries: vec![("x".to_string(), lit(1)), ("y".to_string(), lit(2))],
            span: sp(),
        })],
        span: sp(),
    };
    let decl = FunctionDecl::new("make", vec![], TypeSignature::nominal("Point", sp()))
        .with_body(FunctionBody::Expr(ctor));
    let (ir, errors) = check_function(point_assembly(), decl);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    let ops = body_ops(&ir, "App::make");
    assert!(ops
        .iter()
        .any(|op| matches!(op, Op::LoadDefaultValue { key, .. } if key == "Point::z@default")));
    assert!(ops
        .iter()
        .any(|op| matches!(op, Op::ConstructPrimary { .. })));
}

#[test]
fn test_record_expando_missing_required_field() {
    let ctor = Expr::ConstructEntity {
        of: TypeSignature::nominal("Point", sp()),
        factory: None,
        args: vec![Arg::spread(Expr::ConstructRecord {
            entries: vec![("x".to_string(), lit(1))],
            span: sp(),
        })],
        span: sp(),
    };
    let decl = FunctionDecl::new("make", vec![], TypeSignature::nominal("Point", sp()))
        .with_body(FunctionBody::Expr(ctor));
    let (_, errors) = check_function(point_assembly(), decl);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, CheckErrorKind::MissingRequired);
    assert!(errors[0].message.contains("'y'"), "got: {}", errors[0].message);
}

// ==================== `is` narrowing on a variable ====================

#[test]
fn test_is_narrowing_types_both_branches() {
    // v: Int | String; if (v.is[Int]()) { return v + 1; } else: v is a
    // String there, so a string comparison must typecheck.
    let then_body = block(vec![ret(add(var("v"), lit(1)))]);
    let else_body = block(vec![ret(Expr::Select {
        cond: Box::new(Expr::BinCmp {
            op: CmpOp::Lt,
            lhs: Box::new(var("v")),
            rhs: Box::new(Expr::LiteralString("zz".to_string(), sp())),
            span: sp(),
        }),
        tval: Box::new(lit(1)),
        fval: Box::new(lit(0)),
        span: sp(),
    })]);
    let body = FunctionBody::Block(block(vec![Stmt::IfElse {
        branches: vec![CondBranch {
            cond: postfix(var("v"), vec![invoke("is", vec![int_sig()], false)]),
            body: then_body,
            span: sp(),
        }],
        else_body: Some(else_body),
        span: sp(),
    }]));
    let decl = FunctionDecl::new(
        "f",
        vec![ParamDecl::required(
            "v",
            union_sig(vec![int_sig(), string_sig()]),
        )],
        int_sig(),
    )
    .with_body(body);
    let (_, errors) = check_function(Assembly::core(), decl);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
}

#[test]
fn test_is_none_on_definite_value_reports_never_none() {
    let body = FunctionBody::Expr(postfix(var("x"), vec![invoke("isNone", vec![], false)]));
    let decl =
        FunctionDecl::new("f", vec![ParamDecl::required("x", int_sig())], bool_sig()).with_body(body);
    let (_, errors) = check_function(Assembly::core(), decl);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, CheckErrorKind::RedundantNullCheck);
    assert!(errors[0].message.contains("Value is never None"));
}

#[test]
fn test_is_none_on_none_value_reports_always_none() {
    let body = FunctionBody::Expr(postfix(var("x"), vec![invoke("isNone", vec![], false)]));
    let decl = FunctionDecl::new(
        "f",
        vec![ParamDecl::required("x", TypeSignature::nominal("None", sp()))],
        bool_sig(),
    )
    .with_body(body);
    let (_, errors) = check_function(Assembly::core(), decl);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("Value is always None"));
}

// ==================== Redundant elvis ====================

#[test]
fn test_elvis_on_non_none_receiver_is_redundant() {
    let body = FunctionBody::Expr(postfix(var("x"), vec![invoke("foo", vec![], true)]));
    let decl = FunctionDecl::new(
        "f",
        vec![ParamDecl::required("x", int_sig())],
        int_or_none_sig(),
    )
    .with_body(body);
    let (_, errors) = check_function(Assembly::core(), decl);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, CheckErrorKind::RedundantNullCheck);
    assert!(errors[0].message.contains("None value is not possible"));
}

// ==================== Tuple spread in calls ====================

fn spread_call_assembly() -> Assembly {
    let mut asm = Assembly::core();
    let callee = FunctionDecl::new(
        "g",
        vec![
            ParamDecl::required("a", int_sig()),
            ParamDecl::required("b", int_sig()),
            ParamDecl::defaulted("c", int_sig(), lit(0)),
        ],
        int_sig(),
    )
    .with_body(FunctionBody::Expr(var("a")));
    asm.add_namespace_function("App", callee);
    asm
}

fn call_g_with_tuple(entries: Vec<Expr>) -> FunctionDecl {
    let call = Expr::CallNamespaceFunction {
        namespace: "App".to_string(),
        name: "g".to_string(),
        term_args: vec![],
        args: vec![Arg::spread(Expr::ConstructTuple {
            entries,
            span: sp(),
        })],
        span: sp(),
    };
    FunctionDecl::new("h", vec![], int_sig()).with_body(FunctionBody::Expr(call))
}

#[test]
fn test_tuple_spread_binds_and_defaults_trailing_param() {
    let (ir, errors) = check_function(spread_call_assembly(), call_g_with_tuple(vec![lit(1), lit(2)]));
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    let ops = body_ops(&ir, "App::h");
    let loads = ops
        .iter()
        .filter(|op| matches!(op, Op::LoadTupleIndex { .. }))
        .count();
    assert_eq!(loads, 2);
    assert!(ops
        .iter()
        .any(|op| matches!(op, Op::LoadDefaultValue { key, .. } if key == "App::g::c@default")));
}

#[test]
fn test_tuple_spread_missing_required_param() {
    let (_, errors) = check_function(spread_call_assembly(), call_g_with_tuple(vec![lit(1)]));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, CheckErrorKind::MissingRequired);
    assert!(errors[0].message.contains("'b'"), "got: {}", errors[0].message);
}

// ==================== Equality branch split ====================

#[test]
fn test_none_equality_narrows_else_branch() {
    // if (x == none) { return 0; } else { return x + 1; }
    let body = FunctionBody::Block(block(vec![Stmt::IfElse {
        branches: vec![CondBranch {
            cond: Expr::BinEq {
                negated: false,
                lhs: Box::new(var("x")),
                rhs: Box::new(Expr::LiteralNone(sp())),
                span: sp(),
            },
            body: block(vec![ret(lit(0))]),
            span: sp(),
        }],
        else_body: Some(block(vec![ret(add(var("x"), lit(1)))])),
        span: sp(),
    }]));
    let decl = FunctionDecl::new(
        "f",
        vec![ParamDecl::required("x", int_or_none_sig())],
        int_sig(),
    )
    .with_body(body);
    let (_, errors) = check_function(Assembly::core(), decl);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
}

// ==================== Boundary behaviors ====================

#[test]
fn test_empty_tuple_literal_is_closed_arity_zero() {
    let body = FunctionBody::Expr(Expr::ConstructTuple {
        entries: vec![],
        span: sp(),
    });
    let decl = FunctionDecl::new(
        "f",
        vec![],
        TypeSignature::Tuple {
            entries: vec![],
            open: false,
            span: sp(),
        },
    )
    .with_body(body);
    let (_, errors) = check_function(Assembly::core(), decl);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
}

#[test]
fn test_assert_always_true_is_redundant() {
    let body = FunctionBody::Block(block(vec![
        Stmt::Assert {
            cond: Expr::LiteralBool(true, sp()),
            span: sp(),
        },
        ret(lit(0)),
    ]));
    let decl = FunctionDecl::new("f", vec![], int_sig()).with_body(body);
    let (_, errors) = check_function(Assembly::core(), decl);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, CheckErrorKind::RedundantTruth);
}

#[test]
fn test_shadowing_is_rejected() {
    let body = FunctionBody::Block(block(vec![
        Stmt::VarDecl {
            name: "x".to_string(),
            is_const: false,
            sig: int_sig(),
            init: Some(lit(1)),
            span: sp(),
        },
        ret(lit(0)),
    ]));
    let decl =
        FunctionDecl::new("f", vec![ParamDecl::required("x", int_sig())], int_sig()).with_body(body);
    let (_, errors) = check_function(Assembly::core(), decl);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, CheckErrorKind::IllegalShadowing);
}

#[test]
fn test_assign_to_const_is_rejected() {
    let body = FunctionBody::Block(block(vec![
        Stmt::VarDecl {
            name: "y".to_string(),
            is_const: true,
            sig: int_sig(),
            init: Some(lit(1)),
            span: sp(),
        },
        Stmt::VarAssign {
            name: "y".to_string(),
            value: lit(2),
            span: sp(),
        },
        ret(var("y")),
    ]));
    let decl = FunctionDecl::new("f", vec![], int_sig()).with_body(body);
    let (_, errors) = check_function(Assembly::core(), decl);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, CheckErrorKind::AssignToConst);
}

#[test]
fn test_missing_return_path_is_rejected() {
    let body = FunctionBody::Block(block(vec![Stmt::Empty(sp())]));
    let decl = FunctionDecl::new("f", vec![], int_sig()).with_body(body);
    let (_, errors) = check_function(Assembly::core(), decl);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("Not all control paths return"));
}

// ==================== Lambdas ====================

#[test]
fn test_auto_lambda_takes_signature_from_context_and_compiles() {
    // let f: fn(a: Int) -> Int = fn(a) => a + 1; return f(2);
    let lambda_sig_decl = TypeSignature::Function {
        params: vec![calyx_ast::ParamSig {
            name: "a".to_string(),
            sig: int_sig(),
            optional: false,
        }],
        rest: None,
        result: Box::new(int_sig()),
        span: sp(),
    };
    let lambda = Expr::ConstructLambda {
        sig: LambdaSig {
            auto: true,
            params: vec![LambdaParam {
                name: "a".to_string(),
                sig: None,
            }],
            result: None,
        },
        captured: vec![],
        body: Box::new(FunctionBody::Expr(add(var("a"), lit(1)))),
        span: sp(),
    };
    let body = FunctionBody::Block(block(vec![
        Stmt::VarDecl {
            name: "f".to_string(),
            is_const: true,
            sig: lambda_sig_decl,
            init: Some(lambda),
            span: sp(),
        },
        ret(postfix(
            var("f"),
            vec![PostfixOp {
                kind: PostfixOpKind::CallLambda {
                    args: vec![Arg::positional(lit(2))],
                },
                is_elvis: false,
                span: sp(),
            }],
        )),
    ]));
    let decl = FunctionDecl::new("apply", vec![], int_sig()).with_body(body);
    let (ir, errors) = check_function(Assembly::core(), decl);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    // The lambda body is compiled under its own key.
    assert!(ir.bodies.keys().any(|k| k.contains("$lambda@")));
    assert_eq!(ir.lambdas.len(), 1);
    let ops = body_ops(&ir, "App::apply");
    assert!(ops.iter().any(|op| matches!(op, Op::CallLambda { .. })));
}

// ==================== Virtual dispatch ====================

#[test]
fn test_concept_receiver_dispatches_virtually() {
    let mut asm = Assembly::core();
    let mut shape = OOTypeDecl::concept("Shape");
    shape.methods.insert(
        "area".to_string(),
        FunctionDecl::new("area", vec![], int_sig()),
    );
    asm.add_object_decl(shape);
    asm.add_object_decl(
        OOTypeDecl::entity("Circle")
            .with_provides(vec![TypeSignature::nominal("Shape", sp())])
            .with_method(
                FunctionDecl::new("area", vec![], int_sig()).with_body(FunctionBody::Expr(lit(3))),
            ),
    );
    let body = FunctionBody::Expr(postfix(var("s"), vec![invoke("area", vec![], false)]));
    let decl = FunctionDecl::new(
        "measure",
        vec![ParamDecl::required("s", TypeSignature::nominal("Shape", sp()))],
        int_sig(),
    )
    .with_body(body);
    let (ir, errors) = check_function(asm, decl);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    let ops = body_ops(&ir, "App::measure");
    assert!(ops
        .iter()
        .any(|op| matches!(op, Op::CallVirtualTarget { vkey, .. } if vkey.contains("Shape"))));
}

// ==================== Constants and determinism ====================

#[test]
fn test_namespace_const_access_registers_and_compiles_once() {
    let mut asm = Assembly::core();
    asm.add_namespace_const(
        "App",
        ConstDecl {
            name: "limit".to_string(),
            sig: int_sig(),
            value: lit(10),
            src_file: "app.cx".to_string(),
            span: sp(),
        },
    );
    let body = FunctionBody::Expr(Expr::AccessNamespaceConst {
        namespace: "App".to_string(),
        name: "limit".to_string(),
        span: sp(),
    });
    let decl = FunctionDecl::new("f", vec![], int_sig()).with_body(body);
    let (ir, errors) = check_function(asm, decl);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    assert!(ir.bodies.contains_key("App::limit"));
    let ops = body_ops(&ir, "App::f");
    assert!(ops
        .iter()
        .any(|op| matches!(op, Op::AccessNamespaceConstant { gkey, .. } if gkey == "App::limit")));
}

#[test]
fn test_rechecking_is_deterministic() {
    let run = || {
        let (ir, errors) = check_function(
            spread_call_assembly(),
            call_g_with_tuple(vec![lit(1), lit(2)]),
        );
        assert!(errors.is_empty());
        ir.to_json().expect("serializes")
    };
    assert_eq!(run(), run());
}
