mod common;

use common::*;

#[test]
fn block_value_is_its_last_expression_statement() {
    let source = r#"(string s) => { string inner = "test"; inner + s; }"#;
    let result = eval(source, &[Type::String], Type::String, &[text("X")]);
    assert_eq!(result, text("testX"));
}

#[test]
fn switch_expression_selects_a_section() {
    let function = compile(
        "(int i) => switch(i) { case 1: 10; case 2: 20; default: 0; }",
        &[Type::Int],
        Type::Int,
    );
    for (input, expected) in [(1, 10), (2, 20), (3, 0)] {
        let result = function.invoke(&[Value::Int(input)]).expect("run");
        assert_eq!(result, Value::Int(expected), "input {input}");
    }
}

#[test]
fn switch_statement_sections_end_in_jumps() {
    let source = r#"(string code) => {
        var label = "other";
        switch (code) {
            case "a":
            case "b":
                label = "letter";
                break;
            case "1":
                return "digit";
            default:
                label = label + "!";
                break;
        }
        return label;
    }"#;
    let function = compile(source, &[Type::String], Type::String);
    for (input, expected) in [("a", "letter"), ("b", "letter"), ("1", "digit"), ("?", "other!")] {
        let result = function.invoke(&[text(input)]).expect("run");
        assert_eq!(result, text(expected), "input {input}");
    }
}

#[test]
fn switch_expression_without_default_is_rejected() {
    let source = "(int i) => switch(i) { case 1: 10; case 2: 20; }";
    let err = parse_error(source, &[Type::Int], Type::Int);
    assert_eq!(err.kind, ParseErrorKind::Type);
    assert_eq!(err.offset, source.find("switch").expect("switch"));
}

#[test]
fn block_variables_go_out_of_scope() {
    let source = "(int x) => { { int y = x; } return y; }";
    let err = parse_error(source, &[Type::Int], Type::Int);
    assert_eq!(err.kind, ParseErrorKind::UnknownSymbol);
    assert_eq!(err.offset, source.rfind('y').expect("second y"));
}

#[test]
fn while_loop_stops_when_break_first_runs() {
    let source = "(int start, int step, int limit) => { \
        var acc = start; var rounds = 0; \
        while (true) { if (acc >= limit) break; else acc += step; rounds++; } \
        rounds * 1000 + acc; }";
    let function = compile(source, &[Type::Int, Type::Int, Type::Int], Type::Int);
    for (start, step, limit) in [(0, 1, 5), (3, 4, 20), (10, 2, 10), (-9, 3, 0)] {
        let mut acc = start;
        let mut rounds = 0;
        while acc < limit {
            acc += step;
            rounds += 1;
        }
        let result = function
            .invoke(&[Value::Int(start), Value::Int(step), Value::Int(limit)])
            .expect("run");
        assert_eq!(result, Value::Int(rounds * 1000 + acc), "{start}/{step}/{limit}");
    }
}

#[test]
fn for_loop_supports_continue_and_steps() {
    let source = "(int n) => { var sum = 0; \
        for (int i = 0, j = 10; i < n; i++, j--) { if (i % 2 == 0) continue; sum += i * j; } \
        return sum; }";
    let result = eval(source, &[Type::Int], Type::Int, &[Value::Int(6)]);
    // i = 1, 3, 5 with j = 9, 7, 5
    assert_eq!(result, Value::Int(9 + 21 + 25));
}

#[test]
fn foreach_visits_every_element() {
    let source = "(int[] items) => { var total = 0; foreach (var item in items) total += item; total; }";
    let items = Value::array(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);
    let result = eval(source, &[Type::array(Type::Int)], Type::Int, &[items]);
    assert_eq!(result, Value::Int(10));
}

#[test]
fn foreach_converts_loosely_typed_elements() {
    let source = "(object[] xs) => { var total = 0; foreach (int k in xs) total += k; total; }";
    let function = compile(source, &[Type::array(Type::Object)], Type::Int);
    let items = Value::array(vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(function.invoke(&[items]).expect("run"), Value::Int(3));

    let mixed = Value::array(vec![Value::Int(1), text("two")]);
    let err = function.invoke(&[mixed]).expect_err("string element");
    assert!(matches!(err, VmError::InvalidCast { to: Type::Int, .. }));
}

#[test]
fn foreach_over_a_sequence() {
    let source = "(int n) => { var total = 0; foreach (int k in Enumerable.Range(1, n)) total += k; total; }";
    let function = compile(source, &[Type::Int], Type::Int);
    assert_eq!(function.invoke(&[Value::Int(4)]).expect("run"), Value::Int(10));
    assert_eq!(function.invoke(&[Value::Int(0)]).expect("run"), Value::Int(0));
}

#[test]
fn foreach_over_a_string_yields_chars() {
    let source = r#"(string word) => { var out = ""; foreach (char c in word) out = c + out; out; }"#;
    let result = eval(source, &[Type::String], Type::String, &[text("abc")]);
    assert_eq!(result, text("cba"));
}

#[test]
fn if_else_with_values_is_an_expression() {
    let source = "(int x) => if (x > 0) x; else -x;";
    let function = compile(source, &[Type::Int], Type::Int);
    assert_eq!(function.invoke(&[Value::Int(-4)]).expect("run"), Value::Int(4));
    assert_eq!(function.invoke(&[Value::Int(6)]).expect("run"), Value::Int(6));
}

#[test]
fn missing_return_in_a_block_is_a_type_error() {
    let source = "(int x) => { if (x > 0) return 1; }";
    let err = parse_error(source, &[Type::Int], Type::Int);
    assert_eq!(err.kind, ParseErrorKind::Type);
}

#[test]
fn return_type_is_inferred_from_the_first_return() {
    let function = engine()
        .compile_inferred("(int x) => { if (x > 10) return x * 2.5; return x; }")
        .expect("compiles");
    assert_eq!(function.signature().ret, Type::Double);
    assert_eq!(
        function.invoke(&[Value::Int(12)]).expect("run"),
        Value::Double(30.0)
    );
    assert_eq!(
        function.invoke(&[Value::Int(2)]).expect("run"),
        Value::Double(2.0)
    );
}

#[test]
fn jumps_outside_loops_are_rejected() {
    let err = parse_error("(int x) => { break; }", &[Type::Int], Type::Void);
    assert_eq!(err.kind, ParseErrorKind::WrongSymbol);
    let err = parse_error("(int x) => { continue; }", &[Type::Int], Type::Void);
    assert_eq!(err.kind, ParseErrorKind::WrongSymbol);
}

#[test]
fn void_signature_discards_the_body_value() {
    let result = eval("(int x) => { var y = x + 1; y; }", &[Type::Int], Type::Void, &[Value::Int(1)]);
    assert_eq!(result, Value::Null);
}
