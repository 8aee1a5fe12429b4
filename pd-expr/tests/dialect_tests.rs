mod common;

use std::sync::Arc;

use common::*;
use expr::compiler::builders::{FollowBuilder, StartBuilder};
use expr::vm::BinaryOp;
use expr::Dialect;

fn formula(source: &str, params: &[Type], ret: Type) -> CompiledFunction {
    formula_engine()
        .compile(source, &signature(params, ret))
        .unwrap_or_else(|err| panic!("'{source}' should compile: {err}"))
}

#[test]
fn caret_is_a_right_associative_power() {
    let function = formula("(double x) => x ^ 2", &[Type::Double], Type::Double);
    assert_eq!(
        function.invoke(&[Value::Double(3.0)]).expect("run"),
        Value::Double(9.0)
    );

    let function = formula("() => 2 ^ 3 ^ 2", &[], Type::Double);
    assert_eq!(function.invoke(&[]).expect("run"), Value::Double(512.0));
}

#[test]
fn ampersand_concatenates_any_operands() {
    let function = formula(
        "(string name, int n) => 'Hello, ' & name & \" #\" & n",
        &[Type::String, Type::Int],
        Type::String,
    );
    let result = function
        .invoke(&[text("Ada"), Value::Int(7)])
        .expect("run");
    assert_eq!(result, text("Hello, Ada #7"));
}

#[test]
fn word_operators_and_single_equals_compare() {
    let function = formula(
        "(int a, int b) => a <> b and a = 1 or not (b < 0)",
        &[Type::Int, Type::Int],
        Type::Bool,
    );
    for (a, b, expected) in [(1, 2, true), (1, 1, true), (2, -1, false), (3, 4, true)] {
        let result = function
            .invoke(&[Value::Int(a), Value::Int(b)])
            .expect("run");
        assert_eq!(result, Value::Bool(expected), "a={a} b={b}");
    }
}

#[test]
fn hex_prefix_and_upper_case_booleans() {
    let function = formula("() => &HFF + 1", &[], Type::Int);
    assert_eq!(function.invoke(&[]).expect("run"), Value::Int(256));

    let function = formula("(bool flag) => flag = TRUE", &[Type::Bool], Type::Bool);
    assert_eq!(
        function.invoke(&[Value::Bool(true)]).expect("run"),
        Value::Bool(true)
    );
}

#[test]
fn formula_can_call_catalog_members() {
    let function = formula(
        "(double x) => Math.Sqrt(x) & ' ' & 'abc'.ToUpper()",
        &[Type::Double],
        Type::String,
    );
    assert_eq!(
        function.invoke(&[Value::Double(16.0)]).expect("run"),
        text("4 ABC")
    );
}

#[test]
fn formula_has_no_statement_forms() {
    let err = formula_engine()
        .compile("(int x) => { x }", &signature(&[Type::Int], Type::Int))
        .expect_err("braces do not start anything");
    let SourceError::Parse(err) = err else {
        panic!("expected a parse error, got {err:?}");
    };
    assert_eq!(err.kind, ParseErrorKind::WrongSymbol);
    assert_eq!(err.offset, 11);
}

#[test]
fn same_source_means_different_things_per_flavor() {
    let source = "(int a, int b) => a ^ b";
    let params = [Type::Int, Type::Int];
    let xor = compile(source, &params, Type::Int);
    assert_eq!(
        xor.invoke(&[Value::Int(6), Value::Int(3)]).expect("run"),
        Value::Int(5)
    );
    let power = formula(source, &params, Type::Double);
    assert_eq!(
        power.invoke(&[Value::Int(6), Value::Int(3)]).expect("run"),
        Value::Double(216.0)
    );
}

#[test]
fn custom_dialects_plug_into_the_engine() {
    let dialect = Dialect::builder("words")
        .symbols(&["(", ")", "[", "]", "{", "}", ",", ";", "?", ":", "=>", "."])
        .start("(", StartBuilder::Group)
        .start("minus", StartBuilder::Unary(expr::UnaryOp::Neg))
        .follow("plus", 12, FollowBuilder::Binary(BinaryOp::Add))
        .follow("times", 13, FollowBuilder::Binary(BinaryOp::Mul))
        .follow("then", 11, FollowBuilder::Concat)
        .build()
        .expect("dialect should build");
    let engine = engine().with_dialect(Arc::new(dialect));
    assert_eq!(engine.dialect().name(), "words");

    let function = engine
        .compile(
            "(int a, int b) => minus a plus b times 2",
            &signature(&[Type::Int, Type::Int], Type::Int),
        )
        .expect("compiles");
    assert_eq!(
        function.invoke(&[Value::Int(1), Value::Int(3)]).expect("run"),
        Value::Int(5)
    );

    let function = engine
        .compile_inferred("(int a) => a then a")
        .expect("compiles");
    assert_eq!(function.signature().ret, Type::String);
    assert_eq!(function.invoke(&[Value::Int(4)]).expect("run"), text("44"));
}
