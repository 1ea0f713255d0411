//! OO-surface scenarios: statics, member consts, typed strings, the
//! universal cast family, invariants, and pre/post-conditions.

use calyx_ast::{
    Arg, BlockStmt, CmpOp, Expr, FunctionBody, ParamSig, PostfixOp, PostfixOpKind, Span, Stmt,
    TypeSignature,
};
use calyx_checker::assembly::{
    Assembly, ConstDecl, FieldDecl, FunctionDecl, OOTypeDecl, ParamDecl,
};
use calyx_checker::error::CheckErrorKind;
use calyx_checker::ir::core::{BodyImpl, Op};
use calyx_checker::{CheckError, Checker, IrAssembly};

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

fn var(name: &str) -> Expr {
    Expr::AccessVariable {
        name: name.to_string(),
        span: sp(),
    }
}

fn lit(value: i64) -> Expr {
    Expr::LiteralInt(value, sp())
}

fn gt(lhs: Expr, rhs: Expr) -> Expr {
    Expr::BinCmp {
        op: CmpOp::Gt,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        span: sp(),
    }
}

fn field_access(base: Expr, name: &str) -> Expr {
    Expr::Postfix {
        root: Box::new(base),
        ops: vec![PostfixOp {
            kind: PostfixOpKind::AccessName(name.to_string()),
            is_elvis: false,
            span: sp(),
        }],
        span: sp(),
    }
}

fn check(asm: &Assembly) -> (IrAssembly, Vec<CheckError>) {
    let mut checker = Checker::new(asm);
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

// ==================== Statics and member consts ====================

#[test]
fn test_static_call_and_member_const_resolve_through_the_type() {
    let mut asm = Assembly::core();
    asm.add_object_decl(
        OOTypeDecl::entity("Counter")
            .with_fields(vec![FieldDecl::required("count", int_sig())])
            .with_static(
                FunctionDecl::new(
                    "bump",
                    vec![ParamDecl::required("n", int_sig())],
                    int_sig(),
                )
                .with_body(FunctionBody::Expr(var("n"))),
            )
            .with_const(ConstDecl {
                name: "start".to_string(),
                sig: int_sig(),
                value: lit(0),
                src_file: "core.cx".to_string(),
                span: sp(),
            }),
    );
    let body = FunctionBody::Expr(Expr::CallStaticFunction {
        of: TypeSignature::nominal("Counter", sp()),
        name: "bump".to_string(),
        term_args: vec![],
        args: vec![Arg::positional(Expr::AccessStaticConst {
            of: TypeSignature::nominal("Counter", sp()),
            name: "start".to_string(),
            span: sp(),
        })],
        span: sp(),
    });
    asm.add_namespace_function("App", FunctionDecl::new("f", vec![], int_sig()).with_body(body));

    let (ir, errors) = check(&asm);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    assert!(ir.bodies.contains_key("Counter::start"));
    let ops = body_ops(&ir, "App::f");
    assert!(ops
        .iter()
        .any(|op| matches!(op, Op::AccessConst { ckey, .. } if ckey == "Counter::start")));
    assert!(ops
        .iter()
        .any(|op| matches!(op, Op::CallStaticFunction { skey, .. } if skey == "Counter::bump")));
}

// ==================== Typed strings ====================

fn zipcode_assembly() -> Assembly {
    let mut asm = Assembly::core();
    asm.add_object_decl(
        OOTypeDecl::entity("ZipCode")
            .with_provides(vec![
                TypeSignature::nominal("Parsable", sp()),
                TypeSignature::nominal("Keyed", sp()),
            ])
            .with_fields(vec![FieldDecl::required("digits", string_sig())])
            .with_static(
                FunctionDecl::new(
                    "tryParse",
                    vec![ParamDecl::required("value", string_sig())],
                    TypeSignature::Union {
                        options: vec![
                            TypeSignature::nominal("ZipCode", sp()),
                            TypeSignature::nominal("None", sp()),
                        ],
                        span: sp(),
                    },
                )
                .with_body(FunctionBody::Expr(Expr::ConstructEntity {
                    of: TypeSignature::nominal("ZipCode", sp()),
                    factory: None,
                    args: vec![Arg::named("digits", var("value"))],
                    span: sp(),
                })),
            ),
    );
    asm
}

#[test]
fn test_typed_string_literal_yields_string_of() {
    let mut asm = zipcode_assembly();
    let body = FunctionBody::Expr(Expr::LiteralTypedString {
        value: "02139".to_string(),
        of: TypeSignature::nominal("ZipCode", sp()),
        constructor: false,
        span: sp(),
    });
    asm.add_namespace_function(
        "App",
        FunctionDecl::new(
            "f",
            vec![],
            TypeSignature::Nominal {
                name: "StringOf".to_string(),
                term_args: vec![TypeSignature::nominal("ZipCode", sp())],
                span: sp(),
            },
        )
        .with_body(body),
    );
    let (ir, errors) = check(&asm);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    let ops = body_ops(&ir, "App::f");
    assert!(ops
        .iter()
        .any(|op| matches!(op, Op::LoadConstTypedString { tkey, .. } if tkey == "ZipCode")));
}

#[test]
fn test_typed_string_constructor_calls_try_parse() {
    let mut asm = zipcode_assembly();
    let body = FunctionBody::Expr(Expr::LiteralTypedString {
        value: "02139".to_string(),
        of: TypeSignature::nominal("ZipCode", sp()),
        constructor: true,
        span: sp(),
    });
    asm.add_namespace_function(
        "App",
        FunctionDecl::new(
            "f",
            vec![],
            TypeSignature::Union {
                options: vec![
                    TypeSignature::nominal("ZipCode", sp()),
                    TypeSignature::nominal("None", sp()),
                ],
                span: sp(),
            },
        )
        .with_body(body),
    );
    let (ir, errors) = check(&asm);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    let ops = body_ops(&ir, "App::f");
    assert!(ops
        .iter()
        .any(|op| matches!(op, Op::CallStaticFunction { skey, .. } if skey == "ZipCode::tryParse")));
}

#[test]
fn test_typed_string_requires_parsable() {
    let mut asm = Assembly::core();
    asm.add_object_decl(OOTypeDecl::entity("Plain"));
    let body = FunctionBody::Expr(Expr::LiteralTypedString {
        value: "x".to_string(),
        of: TypeSignature::nominal("Plain", sp()),
        constructor: false,
        span: sp(),
    });
    asm.add_namespace_function(
        "App",
        FunctionDecl::new("f", vec![], string_sig()).with_body(body),
    );
    let (_, errors) = check(&asm);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, CheckErrorKind::NotParsable);
}

// ==================== Universal cast family ====================

#[test]
fn test_try_as_widens_with_none_and_default_as_keeps_target() {
    let mut asm = Assembly::core();
    let union = TypeSignature::Union {
        options: vec![int_sig(), string_sig()],
        span: sp(),
    };
    let try_body = FunctionBody::Expr(Expr::Postfix {
        root: Box::new(var("v")),
        ops: vec![PostfixOp {
            kind: PostfixOpKind::Invoke {
                name: "tryAs".to_string(),
                term_args: vec![int_sig()],
                args: vec![],
            },
            is_elvis: false,
            span: sp(),
        }],
        span: sp(),
    });
    asm.add_namespace_function(
        "App",
        FunctionDecl::new(
            "t",
            vec![ParamDecl::required("v", union.clone())],
            TypeSignature::Union {
                options: vec![int_sig(), TypeSignature::nominal("None", sp())],
                span: sp(),
            },
        )
        .with_body(try_body),
    );

    let default_body = FunctionBody::Expr(Expr::Postfix {
        root: Box::new(var("v")),
        ops: vec![PostfixOp {
            kind: PostfixOpKind::Invoke {
                name: "defaultAs".to_string(),
                term_args: vec![int_sig()],
                args: vec![Arg::positional(lit(0))],
            },
            is_elvis: false,
            span: sp(),
        }],
        span: sp(),
    });
    asm.add_namespace_function(
        "App",
        FunctionDecl::new("d", vec![ParamDecl::required("v", union)], int_sig())
            .with_body(default_body),
    );

    let (ir, errors) = check(&asm);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    assert!(body_ops(&ir, "App::t")
        .iter()
        .any(|op| matches!(op, Op::ConvertTo { fallible: true, .. })));
    assert!(body_ops(&ir, "App::d")
        .iter()
        .any(|op| matches!(op, Op::ConvertOrDefault { .. })));
}

#[test]
fn test_as_rejects_impossible_cast() {
    let mut asm = Assembly::core();
    let body = FunctionBody::Expr(Expr::Postfix {
        root: Box::new(var("v")),
        ops: vec![PostfixOp {
            kind: PostfixOpKind::Invoke {
                name: "as".to_string(),
                term_args: vec![string_sig()],
                args: vec![],
            },
            is_elvis: false,
            span: sp(),
        }],
        span: sp(),
    });
    asm.add_namespace_function(
        "App",
        FunctionDecl::new("f", vec![ParamDecl::required("v", int_sig())], string_sig())
            .with_body(body),
    );
    let (_, errors) = check(&asm);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, CheckErrorKind::TypeMismatch);
    assert!(errors[0].message.contains("never succeed"));
}

// ==================== Invariants and conditions ====================

#[test]
fn test_entity_invariant_compiles_with_this_bound() {
    let mut asm = Assembly::core();
    let mut decl = OOTypeDecl::entity("Account")
        .with_fields(vec![FieldDecl::required("balance", int_sig())]);
    decl.invariants.push(gt(field_access(var("this"), "balance"), lit(-1)));
    asm.add_object_decl(decl);

    let (ir, errors) = check(&asm);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    let ops = body_ops(&ir, "Account@invariant0");
    assert!(ops
        .iter()
        .any(|op| matches!(op, Op::LoadField { fkey, .. } if fkey == "Account.balance")));
}

#[test]
fn test_pre_and_post_conditions_compile_to_keyed_bodies() {
    let mut asm = Assembly::core();
    let mut decl = FunctionDecl::new(
        "half",
        vec![ParamDecl::required("n", int_sig())],
        int_sig(),
    )
    .with_body(FunctionBody::Expr(var("n")));
    decl.preconds.push(gt(var("n"), lit(0)));
    decl.postconds.push(gt(var("n"), var("_return_")));
    asm.add_namespace_function("App", decl);

    let (ir, errors) = check(&asm);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    assert!(ir.bodies.contains_key("App::half@pre0"));
    assert!(ir.bodies.contains_key("App::half@post0"));
}

#[test]
fn test_postcondition_cannot_see_return_without_binding() {
    // `_return_` exists only in post-condition environments.
    let mut asm = Assembly::core();
    let mut decl = FunctionDecl::new("f", vec![], int_sig()).with_body(FunctionBody::Expr(lit(1)));
    decl.preconds.push(gt(var("_return_"), lit(0)));
    asm.add_namespace_function("App", decl);
    let (_, errors) = check(&asm);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, CheckErrorKind::UnknownName);
}

// ==================== Rest parameters ====================

#[test]
fn test_rest_parameter_packs_into_collection() {
    let mut asm = Assembly::core();
    let mut callee = FunctionDecl::new(
        "sum",
        vec![ParamDecl::required("first", int_sig())],
        int_sig(),
    )
    .with_body(FunctionBody::Expr(var("first")));
    callee.rest = Some(calyx_checker::assembly::RestParamDecl {
        name: "rest".to_string(),
        sig: TypeSignature::Nominal {
            name: "List".to_string(),
            term_args: vec![int_sig()],
            span: sp(),
        },
    });
    asm.add_namespace_function("App", callee);

    let call = Expr::CallNamespaceFunction {
        namespace: "App".to_string(),
        name: "sum".to_string(),
        term_args: vec![],
        args: vec![
            Arg::positional(lit(1)),
            Arg::positional(lit(2)),
            Arg::positional(lit(3)),
        ],
        span: sp(),
    };
    asm.add_namespace_function(
        "App",
        FunctionDecl::new("f", vec![], int_sig()).with_body(FunctionBody::Expr(call)),
    );

    let (ir, errors) = check(&asm);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    let ops = body_ops(&ir, "App::f");
    assert!(ops
        .iter()
        .any(|op| matches!(op, Op::ConstructPrimaryCollectionSingletons { args, .. } if args.len() == 2)));
}

// ==================== Lambda signature mismatch ====================

#[test]
fn test_explicit_lambda_signature_must_declare_types() {
    let mut asm = Assembly::core();
    let lambda = Expr::ConstructLambda {
        sig: calyx_ast::LambdaSig {
            auto: false,
            params: vec![calyx_ast::LambdaParam {
                name: "a".to_string(),
                sig: None,
            }],
            result: Some(int_sig()),
        },
        captured: vec![],
        body: Box::new(FunctionBody::Expr(lit(1))),
        span: sp(),
    };
    asm.add_namespace_function(
        "App",
        FunctionDecl::new(
            "f",
            vec![],
            TypeSignature::Function {
                params: vec![ParamSig {
                    name: "a".to_string(),
                    sig: int_sig(),
                    optional: false,
                }],
                rest: None,
                result: Box::new(int_sig()),
                span: sp(),
            },
        )
        .with_body(FunctionBody::Expr(lambda)),
    );
    let (_, errors) = check(&asm);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("missing a type"));
}

// ==================== Structured block body ====================

#[test]
fn test_block_body_emits_lifetime_pairs() {
    let body = FunctionBody::Block(BlockStmt {
        stmts: vec![
            Stmt::VarDecl {
                name: "tmp".to_string(),
                is_const: false,
                sig: int_sig(),
                init: Some(lit(5)),
                span: sp(),
            },
            Stmt::Return {
                value: var("tmp"),
                span: sp(),
            },
        ],
        span: sp(),
    });
    let mut asm = Assembly::core();
    asm.add_namespace_function("App", FunctionDecl::new("f", vec![], int_sig()).with_body(body));
    let (ir, errors) = check(&asm);
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    let ops = body_ops(&ir, "App::f");
    let starts = ops
        .iter()
        .filter(|op| matches!(op, Op::LocalLifetimeStart { name, .. } if name == "tmp"))
        .count();
    let ends = ops
        .iter()
        .filter(|op| matches!(op, Op::LocalLifetimeEnd { name } if name == "tmp"))
        .count();
    assert_eq!(starts, 1);
    assert_eq!(ends, 1);
}
