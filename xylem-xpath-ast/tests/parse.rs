//! Parser shape tests.

use ibig::IBig;
use xylem_name::{Namespaces, FN_NAMESPACE};
use xylem_xpath_ast::ast::*;
use xylem_xpath_ast::parse_xpath;

fn parse(input: &str) -> Expr {
    parse_xpath(input, &Namespaces::default()).unwrap()
}

fn int(n: i64) -> Expr {
    Expr::Literal(Literal::Integer(IBig::from(n)))
}

#[test]
fn precedence_mul_over_add() {
    assert_eq!(
        parse("2 + 3 * 4"),
        Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(int(2)),
            right: Box::new(Expr::Binary {
                op: BinaryOp::Mul,
                left: Box::new(int(3)),
                right: Box::new(int(4)),
            }),
        }
    );
}

#[test]
fn keyword_operators() {
    assert_eq!(
        parse("1 eq 2 and 3 lt 4"),
        Expr::Binary {
            op: BinaryOp::And,
            left: Box::new(Expr::Binary {
                op: BinaryOp::ValEq,
                left: Box::new(int(1)),
                right: Box::new(int(2)),
            }),
            right: Box::new(Expr::Binary {
                op: BinaryOp::ValLt,
                left: Box::new(int(3)),
                right: Box::new(int(4)),
            }),
        }
    );
}

#[test]
fn path_with_predicate_attaches_to_step() {
    let expr = parse("a/b[1]");
    match expr {
        Expr::Path(path) => {
            assert_eq!(path.steps.len(), 2);
            match &path.steps[1] {
                Step::Axis {
                    axis: Axis::Child,
                    predicates,
                    ..
                } => assert_eq!(predicates.len(), 1),
                other => panic!("unexpected step {other:?}"),
            }
        }
        other => panic!("unexpected expr {other:?}"),
    }
}

#[test]
fn parenthesized_path_filters_whole_sequence() {
    let expr = parse("(a/b)[1]");
    assert!(matches!(expr, Expr::Filter { .. }));
}

#[test]
fn double_slash_desugars() {
    let expr = parse("a//b");
    match expr {
        Expr::Path(path) => {
            assert_eq!(path.steps.len(), 3);
            assert!(matches!(
                &path.steps[1],
                Step::Axis {
                    axis: Axis::DescendantOrSelf,
                    test: NodeTest::Kind(KindTest::AnyKind),
                    ..
                }
            ));
        }
        other => panic!("unexpected expr {other:?}"),
    }
}

#[test]
fn leading_slash_is_root() {
    let expr = parse("/a");
    match expr {
        Expr::Path(path) => {
            assert!(matches!(path.steps[0], Step::Root));
            assert_eq!(path.steps.len(), 2);
        }
        other => panic!("unexpected expr {other:?}"),
    }
}

#[test]
fn unprefixed_function_gets_fn_namespace() {
    let expr = parse("count(x)");
    match expr {
        Expr::FunctionCall { name, args } => {
            assert_eq!(name.namespace(), FN_NAMESPACE);
            assert_eq!(name.local_name(), "count");
            assert_eq!(args.len(), 1);
        }
        other => panic!("unexpected expr {other:?}"),
    }
}

#[test]
fn if_then_else() {
    let expr = parse("if (1) then 2 else 3");
    assert!(matches!(expr, Expr::If { .. }));
}

#[test]
fn nested_if_in_else_branch() {
    let expr = parse("if (1) then 2 else if (3) then 4 else 5");
    match expr {
        Expr::If { else_, .. } => assert!(matches!(*else_, Expr::If { .. })),
        other => panic!("unexpected expr {other:?}"),
    }
}

#[test]
fn for_with_multiple_bindings() {
    let expr = parse("for $x in 1 to 3, $y in 4 to 6 return $x + $y");
    match expr {
        Expr::Binding {
            kind: BindingKind::For,
            bindings,
            ..
        } => assert_eq!(bindings.len(), 2),
        other => panic!("unexpected expr {other:?}"),
    }
}

#[test]
fn let_binding() {
    let expr = parse("let $x := 2 return $x * $x");
    assert!(matches!(
        expr,
        Expr::Binding {
            kind: BindingKind::Let,
            ..
        }
    ));
}

#[test]
fn quantified() {
    let expr = parse("some $x in (1, 2) satisfies $x = 2");
    assert!(matches!(
        expr,
        Expr::Binding {
            kind: BindingKind::Some,
            ..
        }
    ));
}

#[test]
fn inline_function_and_dynamic_call() {
    let expr = parse("function($a, $b) { $a + $b }(1, 2)");
    match expr {
        Expr::DynamicCall { base, args } => {
            assert!(matches!(*base, Expr::InlineFunction(_)));
            assert_eq!(args.len(), 2);
        }
        other => panic!("unexpected expr {other:?}"),
    }
}

#[test]
fn named_function_ref() {
    let expr = parse("fn:count#1");
    assert!(matches!(
        expr,
        Expr::NamedFunctionRef { arity: 1, .. }
    ));
}

#[test]
fn arrow_desugars_to_call() {
    let expr = parse("'x' => upper-case()");
    match expr {
        Expr::FunctionCall { name, args } => {
            assert_eq!(name.local_name(), "upper-case");
            assert_eq!(args.len(), 1);
        }
        other => panic!("unexpected expr {other:?}"),
    }
}

#[test]
fn map_and_array_constructors() {
    let expr = parse("map { 'a' : 1, 'b' : 2 }");
    assert!(matches!(expr, Expr::MapConstructor(entries) if entries.len() == 2));
    let expr = parse("[1, 2, 3]");
    assert!(matches!(expr, Expr::SquareArray(items) if items.len() == 3));
    let expr = parse("array { 1 to 3 }");
    assert!(matches!(expr, Expr::CurlyArray(Some(_))));
}

#[test]
fn lookup_operators() {
    assert!(matches!(
        parse("$m?key"),
        Expr::Lookup {
            key: LookupKey::Name(_),
            ..
        }
    ));
    assert!(matches!(parse("?*"), Expr::UnaryLookup(LookupKey::Wildcard)));
}

#[test]
fn instance_of_and_cast() {
    assert!(matches!(parse("1 instance of xs:integer"), Expr::InstanceOf { .. }));
    assert!(matches!(parse("'7' cast as xs:integer"), Expr::Cast { .. }));
    assert!(matches!(
        parse("5 treat as xs:decimal"),
        Expr::Treat { .. }
    ));
}

#[test]
fn axes_and_kind_tests() {
    let expr = parse("ancestor-or-self::node()");
    match expr {
        Expr::Path(path) => assert!(matches!(
            &path.steps[0],
            Step::Axis {
                axis: Axis::AncestorOrSelf,
                test: NodeTest::Kind(KindTest::AnyKind),
                ..
            }
        )),
        other => panic!("unexpected expr {other:?}"),
    }
    assert!(matches!(parse("@id"), Expr::Path(_)));
    assert!(matches!(parse("text()"), Expr::Path(_)));
}

#[test]
fn deeply_nested_expression_does_not_overflow() {
    // an iterative parser must survive nesting that would blow the
    // native stack in a recursive one
    let mut input = String::new();
    for _ in 0..20_000 {
        input.push('(');
    }
    input.push('1');
    for _ in 0..20_000 {
        input.push(')');
    }
    let expr = parse_xpath(&input, &Namespaces::default()).unwrap();
    // drop without recursing either
    let mut stack = vec![expr];
    while let Some(e) = stack.pop() {
        if let Expr::Parenthesized(inner) = e {
            stack.push(*inner);
        }
    }
}

#[test]
fn sequence_at_top_level() {
    assert!(matches!(parse("1, 2, 3"), Expr::Sequence(items) if items.len() == 3));
}

#[test]
fn simple_map_operator() {
    assert!(matches!(parse("(1, 2) ! (. * 2)"), Expr::SimpleMap(_, _)));
}

#[test]
fn unknown_prefix_is_static_error() {
    assert!(parse_xpath("nope:x", &Namespaces::default()).is_err());
}

#[test]
fn string_concat_operator() {
    assert!(matches!(
        parse("'a' || 'b'"),
        Expr::Binary {
            op: BinaryOp::Concat,
            ..
        }
    ));
}