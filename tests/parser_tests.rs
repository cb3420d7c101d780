// tests/parser_tests.rs

use dynaquery::ast::{
    BinOp, Expr, ExprKind, ImplicitParam, Literal, TokenKind, TypeTestOp, UnaryOp,
};
use dynaquery::lexer::tokenize;
use dynaquery::{ParseError, Parser, ParsingConfig};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn parse(input: &str) -> Expr {
    try_parse(input).unwrap_or_else(|e| panic!("Failed to parse '{}': {}", input, e))
}

fn try_parse(input: &str) -> Result<Expr, ParseError> {
    let config = ParsingConfig::default();
    Parser::from_source(input, &config)?.parse()
}

fn binary_op(expr: &Expr) -> (BinOp, &Expr, &Expr) {
    match &expr.kind {
        ExprKind::Binary { op, left, right } => (*op, left, right),
        other => panic!("Expected binary operation, got: {:?}", other),
    }
}

// ============================================================================
// Precedence
// ============================================================================

#[test]
fn test_multiplication_binds_tighter() {
    let expr = parse("1 + 2 * 3");
    let (op, left, right) = binary_op(&expr);
    assert_eq!(op, BinOp::Add);
    assert_eq!(left.kind, ExprKind::Literal(Literal::Int32(1)));
    assert_eq!(binary_op(right).0, BinOp::Multiply);
}

#[test]
fn test_parentheses() {
    let expr = parse("(1 + 2) * 3");
    let (op, left, _) = binary_op(&expr);
    assert_eq!(op, BinOp::Multiply);
    assert_eq!(binary_op(left).0, BinOp::Add);
}

#[test]
fn test_and_binds_tighter_than_or() {
    let expr = parse("a || b && c");
    let (op, _, right) = binary_op(&expr);
    assert_eq!(op, BinOp::Or);
    assert_eq!(binary_op(right).0, BinOp::And);
}

#[test]
fn test_coalesce_is_right_associative() {
    let expr = parse("a ?? b ?? c");
    let (op, left, right) = binary_op(&expr);
    assert_eq!(op, BinOp::NullCoalesce);
    assert_eq!(left.kind, ExprKind::Identifier("a".into()));
    assert_eq!(binary_op(right).0, BinOp::NullCoalesce);
}

#[test]
fn test_conditional() {
    let expr = parse("Age >= 18 ? \"adult\" : \"minor\"");
    let ExprKind::Conditional { test, if_false, .. } = &expr.kind else {
        panic!("Expected conditional, got: {:?}", expr);
    };
    assert_eq!(binary_op(test).0, BinOp::GreaterEqual);
    assert_eq!(if_false.kind, ExprKind::Literal(Literal::String("minor".into())));
}

#[rstest]
#[case("a = b", BinOp::Equal)]
#[case("a <> b", BinOp::NotEqual)]
#[case("a and b", BinOp::And)]
#[case("a or b", BinOp::Or)]
#[case("a % b", BinOp::Modulo)]
fn test_operator_aliases(#[case] input: &str, #[case] expected: BinOp) {
    assert_eq!(binary_op(&parse(input)).0, expected);
}

// ============================================================================
// Unary and literals
// ============================================================================

#[test]
fn test_negative_literal_is_folded() {
    let expr = parse("-5");
    assert_eq!(expr.kind, ExprKind::Literal(Literal::Int32(-5)));
}

#[test]
fn test_negation_of_member_is_unary() {
    let expr = parse("-Price");
    let ExprKind::Unary { op, operand } = &expr.kind else {
        panic!("Expected unary, got: {:?}", expr);
    };
    assert_eq!(*op, UnaryOp::Negate);
    assert_eq!(operand.kind, ExprKind::Identifier("Price".into()));
}

#[test]
fn test_not_keyword() {
    let expr = parse("not Active");
    assert!(matches!(expr.kind, ExprKind::Unary { op: UnaryOp::Not, .. }));
}

// ============================================================================
// Member access and calls
// ============================================================================

#[test]
fn test_method_chain() {
    let expr = parse("Orders.Where(Amount > 10).Count()");
    let ExprKind::MethodCall { target, name, args } = &expr.kind else {
        panic!("Expected method call, got: {:?}", expr);
    };
    assert_eq!(name, "Count");
    assert!(args.is_empty());
    let inner = target.as_deref().unwrap();
    let ExprKind::MethodCall { name, args, .. } = &inner.kind else {
        panic!("Expected method call, got: {:?}", inner);
    };
    assert_eq!((name.as_str(), args.len()), ("Where", 1));
}

#[test]
fn test_external_parameter_call() {
    let expr = parse("@0.Contains(UserName)");
    let ExprKind::MethodCall { target, name, args } = &expr.kind else {
        panic!("Expected method call, got: {:?}", expr);
    };
    assert_eq!(target.as_deref().unwrap().kind, ExprKind::ExternalParam(0));
    assert_eq!(name, "Contains");
    assert_eq!(args[0].kind, ExprKind::Identifier("UserName".into()));
}

#[test]
fn test_indexer_and_implicit_param() {
    let expr = parse("it.Tags[0]");
    let ExprKind::Indexer { target, index } = &expr.kind else {
        panic!("Expected indexer, got: {:?}", expr);
    };
    assert_eq!(index.kind, ExprKind::Literal(Literal::Int32(0)));
    let ExprKind::MemberAccess { target, name } = &target.kind else {
        panic!("Expected member access, got: {:?}", target);
    };
    assert_eq!(name, "Tags");
    assert_eq!(target.kind, ExprKind::ImplicitParam(ImplicitParam::It));
}

#[test]
fn test_type_name_arguments() {
    let expr = parse("Items.OfType(App.Models.Worker)");
    let ExprKind::MethodCall { args, .. } = &expr.kind else {
        panic!("Expected method call, got: {:?}", expr);
    };
    assert_eq!(args[0].kind, ExprKind::TypeLiteral("App.Models.Worker".into()));

    let expr = parse("is(\"Worker\")");
    let ExprKind::MethodCall { target, name, args } = &expr.kind else {
        panic!("Expected function call, got: {:?}", expr);
    };
    assert!(target.is_none());
    assert_eq!(name, "is");
    assert_eq!(args[0].kind, ExprKind::TypeLiteral("Worker".into()));
}

#[test]
fn test_infix_type_test() {
    let expr = parse("it is \"Worker\"");
    let ExprKind::TypeTest { op, target, .. } = &expr.kind else {
        panic!("Expected type test, got: {:?}", expr);
    };
    assert_eq!(*op, TypeTestOp::Is);
    assert_eq!(target.kind, ExprKind::TypeLiteral("Worker".into()));
}

// ============================================================================
// Projections and ordering
// ============================================================================

#[test]
fn test_projection_names() {
    let expr = parse("new(Name as UserName, Address.City, Age * 12 as Months)");
    let ExprKind::NewProjection(members) = &expr.kind else {
        panic!("Expected projection, got: {:?}", expr);
    };
    let names: Vec<&str> = members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["UserName", "City", "Months"]);
}

#[test]
fn test_projection_needs_a_name() {
    let err = try_parse("new(1 + 2)").unwrap_err();
    assert_eq!(err.message, "'as' expected");
}

#[test]
fn test_ordering_clause() {
    let config = ParsingConfig::default();
    let items = Parser::from_source("Name, Price desc, Id ASC", &config)
        .unwrap()
        .parse_ordering()
        .unwrap();
    let directions: Vec<bool> = items.iter().map(|i| i.ascending).collect();
    assert_eq!(directions, vec![true, false, true]);
    assert_eq!(items[1].expr.kind, ExprKind::Identifier("Price".into()));
}

// ============================================================================
// Errors
// ============================================================================

#[rstest]
#[case("Name ===", "Syntax error: unexpected '='", 7)]
#[case("Name ==", "Expression expected", 7)]
#[case("(1 + 2", "')' expected", 6)]
#[case("a b", "Syntax error: unexpected 'b'", 2)]
#[case("@x", "Parameter index expected after '@'", 1)]
#[case("a.", "Identifier expected", 2)]
#[case("a ? b", "':' expected", 5)]
fn test_syntax_errors(#[case] input: &str, #[case] message: &str, #[case] position: usize) {
    let err = try_parse(input).unwrap_err();
    assert_eq!((err.message.as_str(), err.position), (message, position));
}

#[test]
fn test_token_streams_without_eof() {
    let err = Parser::new(Vec::new()).parse().unwrap_err();
    assert_eq!((err.message.as_str(), err.position), ("Expression expected", 0));

    let mut tokens = tokenize("a +", &ParsingConfig::default()).unwrap();
    tokens.pop();
    let err = Parser::new(tokens).parse().unwrap_err();
    assert_eq!((err.message.as_str(), err.position), ("Expression expected", 3));

    let tokens = tokenize("a + 1", &ParsingConfig::default())
        .unwrap()
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .collect();
    let expr = Parser::new(tokens).parse().unwrap();
    let (op, _, right) = binary_op(&expr);
    assert_eq!(op, BinOp::Add);
    assert_eq!(right.kind, ExprKind::Literal(Literal::Int32(1)));
}
