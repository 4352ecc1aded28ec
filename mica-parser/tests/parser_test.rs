// mica-parser - Parser tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

use mica_parser::{AssignOp, AstKind, AstNode, BinaryOp, Parser, PrefixOp};

fn parse(source: &str) -> AstNode {
    Parser::parse_script(source).expect("parse error")
}

fn statements(node: &AstNode) -> &[AstNode] {
    match &node.kind {
        AstKind::Script(statements) => statements,
        other => panic!("expected a script, got {:?}", other),
    }
}

#[test]
fn test_var_declarations() {
    let script = parse("var a = 1; const b = 'x'; var c;");
    let stmts = statements(&script);
    assert_eq!(stmts.len(), 3);
    match &stmts[0].kind {
        AstKind::Var {
            name,
            init,
            is_const,
        } => {
            assert_eq!(name, "a");
            assert!(init.is_some());
            assert!(!is_const);
        }
        other => panic!("expected var, got {:?}", other),
    }
    assert!(matches!(&stmts[1].kind, AstKind::Var { is_const: true, .. }));
    assert!(matches!(&stmts[2].kind, AstKind::Var { init: None, .. }));
}

#[test]
fn test_precedence_shape() {
    // 1 + 2 * 3 parses as 1 + (2 * 3).
    let script = parse("1 + 2 * 3;");
    let stmts = statements(&script);
    match &stmts[0].kind {
        AstKind::Binary { op, right, .. } => {
            assert_eq!(*op, BinaryOp::Add);
            assert!(matches!(
                &right.kind,
                AstKind::Binary {
                    op: BinaryOp::Mul,
                    ..
                }
            ));
        }
        other => panic!("expected binary, got {:?}", other),
    }
}

#[test]
fn test_power_is_right_associative() {
    let script = parse("2 ** 3 ** 2;");
    match &statements(&script)[0].kind {
        AstKind::Binary { op, right, .. } => {
            assert_eq!(*op, BinaryOp::Power);
            assert!(matches!(
                &right.kind,
                AstKind::Binary {
                    op: BinaryOp::Power,
                    ..
                }
            ));
        }
        other => panic!("expected binary, got {:?}", other),
    }
}

#[test]
fn test_ternary_sets_conditional_flag() {
    let script = parse("var r = a ? 1 : 2;");
    match &statements(&script)[0].kind {
        AstKind::Var { init: Some(init), .. } => match &init.kind {
            AstKind::If {
                conditional,
                else_branch,
                ..
            } => {
                assert!(*conditional);
                assert!(else_branch.is_some());
            }
            other => panic!("expected conditional, got {:?}", other),
        },
        other => panic!("expected var, got {:?}", other),
    }

    // Statement `if` leaves the flag clear.
    let script = parse("if (a) 1; else 2;");
    assert!(matches!(
        &statements(&script)[0].kind,
        AstKind::If {
            conditional: false,
            ..
        }
    ));
}

#[test]
fn test_while_lowers_to_for() {
    let script = parse("while (x) y;");
    match &statements(&script)[0].kind {
        AstKind::For {
            init,
            condition,
            step,
            ..
        } => {
            assert!(init.is_none());
            assert!(condition.is_some());
            assert!(step.is_none());
        }
        other => panic!("expected for, got {:?}", other),
    }
}

#[test]
fn test_for_in_forms() {
    let script = parse("for (x in items) x; for (var y in items) y;");
    let stmts = statements(&script);
    assert!(matches!(&stmts[0].kind, AstKind::ForEach { var_name, .. } if var_name == "x"));
    assert!(matches!(&stmts[1].kind, AstKind::ForEach { var_name, .. } if var_name == "y"));
}

#[test]
fn test_postfix_chain() {
    // a.b[0](1) nests member -> index -> call.
    let script = parse("a.b[0](1);");
    match &statements(&script)[0].kind {
        AstKind::Call { callee, args } => {
            assert_eq!(args.len(), 1);
            match &callee.kind {
                AstKind::Index { object, .. } => {
                    assert!(matches!(&object.kind, AstKind::Member { field, .. } if field == "b"));
                }
                other => panic!("expected index, got {:?}", other),
            }
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn test_class_declaration() {
    let script = parse("class B(y) extends A(1, 2) { var v = 3; function m() {} }");
    match &statements(&script)[0].kind {
        AstKind::Class {
            name,
            params,
            extends,
            members,
        } => {
            assert_eq!(name, "B");
            assert_eq!(params, &["y".to_string()]);
            let extends = extends.as_ref().expect("extends clause");
            assert_eq!(extends.parent, "A");
            assert_eq!(extends.args.as_ref().map(|a| a.len()), Some(2));
            assert_eq!(members.len(), 2);
        }
        other => panic!("expected class, got {:?}", other),
    }

    // Inherited parameters: no argument list on extends.
    let script = parse("class C extends A {}");
    match &statements(&script)[0].kind {
        AstKind::Class { extends, .. } => {
            assert!(extends.as_ref().unwrap().args.is_none());
        }
        other => panic!("expected class, got {:?}", other),
    }
}

#[test]
fn test_object_literal_const_keys() {
    let script = parse("var o = {a: 1, const b: 2, 'c d': 3};");
    match &statements(&script)[0].kind {
        AstKind::Var { init: Some(init), .. } => match &init.kind {
            AstKind::ObjectLiteral(props) => {
                assert_eq!(props.len(), 3);
                assert!(!props[0].is_const);
                assert!(props[1].is_const);
                assert_eq!(props[2].name, "c d");
            }
            other => panic!("expected object literal, got {:?}", other),
        },
        other => panic!("expected var, got {:?}", other),
    }
}

#[test]
fn test_function_expression_and_declaration() {
    let script = parse("function named() {} var f = function (x) { return x; };");
    let stmts = statements(&script);
    assert!(matches!(&stmts[0].kind, AstKind::Function { name, .. } if name == "named"));
    match &stmts[1].kind {
        AstKind::Var { init: Some(init), .. } => {
            assert!(matches!(&init.kind, AstKind::Function { name, .. } if name.is_empty()));
        }
        other => panic!("expected var, got {:?}", other),
    }
}

#[test]
fn test_compound_assignment_ops() {
    let script = parse("a += 1; b <<= 2; c >>>= 3;");
    let stmts = statements(&script);
    assert!(matches!(&stmts[0].kind, AstKind::Assignment { op: AssignOp::Add, .. }));
    assert!(matches!(&stmts[1].kind, AstKind::Assignment { op: AssignOp::Lshift, .. }));
    assert!(matches!(&stmts[2].kind, AstKind::Assignment { op: AssignOp::RshiftU, .. }));
}

#[test]
fn test_prefix_operators() {
    let script = parse("!a; -b; ~c; ++d;");
    let stmts = statements(&script);
    assert!(matches!(&stmts[0].kind, AstKind::Prefix { op: PrefixOp::Not, .. }));
    assert!(matches!(&stmts[1].kind, AstKind::Prefix { op: PrefixOp::Neg, .. }));
    assert!(matches!(&stmts[2].kind, AstKind::Prefix { op: PrefixOp::BitNot, .. }));
    assert!(matches!(&stmts[3].kind, AstKind::Prefix { op: PrefixOp::Inc, .. }));
}

#[test]
fn test_new_is_transparent() {
    let script = parse("var p = new Point(1, 2);");
    match &statements(&script)[0].kind {
        AstKind::Var { init: Some(init), .. } => {
            assert!(matches!(&init.kind, AstKind::Call { .. }));
        }
        other => panic!("expected var, got {:?}", other),
    }
}

#[test]
fn test_export_import() {
    let script = parse("import 'lib.mica'; export function f() {} export class A {}");
    let stmts = statements(&script);
    assert!(matches!(&stmts[0].kind, AstKind::Import(_)));
    assert!(matches!(&stmts[1].kind, AstKind::Export(_)));
    assert!(matches!(&stmts[2].kind, AstKind::Export(_)));
}

#[test]
fn test_parse_errors() {
    assert!(Parser::parse_script("var = 1;").is_err());
    assert!(Parser::parse_script("{ unterminated").is_err());
    assert!(Parser::parse_script("1 +").is_err());
    assert!(Parser::parse_script("f(1,").is_err());
    assert!(Parser::parse_script("1 = 2;").is_err());
    assert!(Parser::parse_script("class {}").is_err());
}

#[test]
fn test_positions_recorded() {
    let script = parse("var a = 1;\nvar b = 2;");
    let stmts = statements(&script);
    assert_eq!(stmts[0].pos.line, 1);
    assert_eq!(stmts[1].pos.line, 2);
}

#[test]
fn test_json_dump_smoke() {
    let script = parse("var a = [1, {b: 'c'}];");
    let json = script.to_json();
    assert_eq!(json["type"], "Script");
    let text = serde_json::to_string(&json).unwrap();
    assert!(text.contains("ArrayLiteral"));
    assert!(text.contains("ObjectLiteral"));
}
