mod common;

use common::*;

const INTS: [i32; 7] = [-7, -1, 0, 1, 2, 13, 1000];
const DOUBLES: [f64; 4] = [0.5, -2.25, 10.0, 0.0];

#[test]
fn integer_operators_match_native_arithmetic() {
    let cases: [(&str, fn(i32, i32) -> Option<i32>); 4] = [
        ("+", |a, b| Some(a + b)),
        ("-", |a, b| Some(a - b)),
        ("*", |a, b| Some(a * b)),
        ("%", |a, b| (b != 0).then(|| a % b)),
    ];
    for (op, expected) in cases {
        let source = format!("(int x, int y) => x {op} y");
        let function = compile(&source, &[Type::Int, Type::Int], Type::Int);
        for a in INTS {
            for b in INTS {
                let Some(expected) = expected(a, b) else {
                    continue;
                };
                let result = function
                    .invoke(&[Value::Int(a), Value::Int(b)])
                    .expect("function should run");
                assert_eq!(result, Value::Int(expected), "{a} {op} {b}");
            }
        }
    }
}

#[test]
fn mixed_operands_widen_to_double() {
    let cases: [(&str, fn(f64, f64) -> f64); 3] = [
        ("+", |a, b| a + b),
        ("-", |a, b| a - b),
        ("*", |a, b| a * b),
    ];
    for (op, expected) in cases {
        let source = format!("(int x, double y) => x {op} y");
        let function = compile(&source, &[Type::Int, Type::Double], Type::Double);
        for a in INTS {
            for b in DOUBLES {
                let result = function
                    .invoke(&[Value::Int(a), Value::Double(b)])
                    .expect("function should run");
                assert_eq!(result, Value::Double(expected(a as f64, b)), "{a} {op} {b}");
            }
        }
    }
}

#[test]
fn inferred_result_type_follows_widening() {
    let engine = engine();
    let cases = [
        ("(int a, long b) => a * b", Type::Long),
        ("(int a, float b) => a + b", Type::Float),
        ("(long a, double b) => a - b", Type::Double),
        ("(char c) => c + 1", Type::Int),
        ("(int a, int b) => a < b", Type::Bool),
    ];
    for (source, expected) in cases {
        let function = engine.compile_inferred(source).expect("should compile");
        assert_eq!(function.signature().ret, expected, "{source}");
    }
}

#[test]
fn body_converts_implicitly_to_the_declared_return() {
    let result = eval("(int x) => x * 2", &[Type::Int], Type::Double, &[Value::Int(21)]);
    assert_eq!(result, Value::Double(42.0));

    let err = parse_error("(double x) => x * 2", &[Type::Double], Type::Int);
    assert_eq!(err.kind, ParseErrorKind::Type);
}

#[test]
fn char_arithmetic_promotes_to_int() {
    let result = eval("(char c) => c + 1", &[Type::Char], Type::Int, &[Value::Char('a')]);
    assert_eq!(result, Value::Int(98));
}

#[test]
fn integer_division_by_zero_fails_at_runtime() {
    let function = compile("(int a, int b) => a / b", &[Type::Int, Type::Int], Type::Int);
    assert_eq!(
        function.invoke(&[Value::Int(7), Value::Int(2)]).expect("run"),
        Value::Int(3)
    );
    let err = function
        .invoke(&[Value::Int(7), Value::Int(0)])
        .expect_err("division by zero");
    assert!(matches!(err, VmError::DivisionByZero));
}

#[test]
fn adjacent_literals_fold_around_a_variable() {
    let params = [Type::String];
    let long_form = compile(r#"(string x) => "a" + "b" + x + "c" + "d""#, &params, Type::String);
    let short_form = compile(r#"(string x) => "ab" + x + "cd""#, &params, Type::String);
    assert_eq!(long_form.disassemble(), short_form.disassemble());
    for x in ["", "-", "middle"] {
        let left = long_form.invoke(&[text(x)]).expect("run");
        let right = short_form.invoke(&[text(x)]).expect("run");
        assert_eq!(left, right);
        assert_eq!(left, text(&format!("ab{x}cd")));
    }
}

#[test]
fn concatenation_renders_non_string_operands() {
    let result = eval(
        r#"(int n, bool flag) => "n=" + n + ", flag=" + flag"#,
        &[Type::Int, Type::Bool],
        Type::String,
        &[Value::Int(4), Value::Bool(true)],
    );
    assert_eq!(result, text("n=4, flag=True"));
}

#[test]
fn unsupported_operand_types_are_resolution_errors() {
    let source = "(bool a, int b) => a - b";
    let err = parse_error(source, &[Type::Bool, Type::Int], Type::Int);
    assert_eq!(err.kind, ParseErrorKind::Resolution);
    assert_eq!(err.offset, source.find('-').expect("operator"));
}
