mod common;

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread;

use common::*;
use expr::{StandardCatalog, TypeDef, render_source_error};

#[derive(Debug)]
struct Point {
    x: i32,
    y: i32,
}

impl expr::HostObject for Point {
    fn type_name(&self) -> &str {
        "Point"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_text(&self) -> String {
        format!("({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Default)]
struct Counter {
    count: AtomicI32,
    lookups: AtomicI32,
}

impl expr::HostObject for Counter {
    fn type_name(&self) -> &str {
        "Counter"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn point(args: &[Value], index: usize) -> Result<&Point, VmError> {
    args.get(index)
        .and_then(Value::downcast_ref::<Point>)
        .ok_or(VmError::NullReference)
}

fn counter(args: &[Value]) -> Result<&Counter, VmError> {
    args.first()
        .and_then(Value::downcast_ref::<Counter>)
        .ok_or(VmError::NullReference)
}

fn geometry_engine() -> Engine {
    let point_def = TypeDef::new("Point")
        .constructor(vec![Type::Int, Type::Int], |args| {
            Ok(Value::object(Point {
                x: args[0].as_int()?,
                y: args[1].as_int()?,
            }))
        })
        .property("X", Type::Int, |args| Ok(Value::Int(point(args, 0)?.x)))
        .property("Y", Type::Int, |args| Ok(Value::Int(point(args, 0)?.y)))
        .static_method(
            "op_Addition",
            vec![Type::named("Point"), Type::named("Point")],
            Type::named("Point"),
            |args| {
                let (a, b) = (point(args, 0)?, point(args, 1)?);
                Ok(Value::object(Point {
                    x: a.x + b.x,
                    y: a.y + b.y,
                }))
            },
        );
    let counter_def = TypeDef::new("Counter")
        .mutable_property(
            "Count",
            Type::Int,
            |args| Ok(Value::Int(counter(args)?.count.load(Ordering::SeqCst))),
            |args| {
                let value = args.get(1).ok_or(VmError::NullReference)?.as_int()?;
                counter(args)?.count.store(value, Ordering::SeqCst);
                Ok(Value::Int(value))
            },
        )
        .method("Touch", Vec::new(), Type::named("Counter"), |args| {
            counter(args)?.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(args[0].clone())
        });
    engine().with_catalog(
        StandardCatalog::new()
            .with_type(point_def)
            .with_type(counter_def),
    )
}

#[test]
fn typed_functions_convert_arguments_and_results() {
    let function = engine()
        .compile_typed::<(i32, String), String>(r#"(n, s) => s + ":" + n * 2"#)
        .expect("compiles");
    assert_eq!(
        function.function().signature().params,
        vec![Type::Int, Type::String]
    );
    let result = function.call((21, "answer".to_string())).expect("run");
    assert_eq!(result, "answer:42");

    let maybe = engine()
        .compile_typed::<(Option<i32>,), i32>("x => x ?? -1")
        .expect("compiles");
    assert_eq!(maybe.call((None,)).expect("run"), -1);
    assert_eq!(maybe.call((Some(5),)).expect("run"), 5);
}

#[test]
fn compiled_functions_run_on_many_threads() {
    let function = compile(
        "(int n) => { var total = 0; for (var i = 1; i <= n; i++) total += i; total; }",
        &[Type::Int],
        Type::Int,
    );
    let handles: Vec<_> = (1..=8)
        .map(|n| {
            let function = function.clone();
            thread::spawn(move || function.invoke(&[Value::Int(n * 10)]).expect("run"))
        })
        .collect();
    for (n, handle) in (1..=8).zip(handles) {
        let limit = n * 10;
        let result = handle.join().expect("thread should not panic");
        assert_eq!(result, Value::Int(limit * (limit + 1) / 2));
    }
}

#[test]
fn invoke_checks_arity_and_argument_types() {
    let function = compile("(int a, string b) => b + a", &[Type::Int, Type::String], Type::String);
    let err = function.invoke(&[Value::Int(1)]).expect_err("too few");
    assert_eq!(err, VmError::ArgumentCount {
        expected: 2,
        got: 1
    });
    let err = function
        .invoke(&[text("1"), text("x")])
        .expect_err("wrong type");
    assert!(matches!(err, VmError::TypeMismatch { .. }));
    assert_eq!(
        function.invoke(&[Value::Int(1), Value::Null]).expect("null string"),
        text("1")
    );
}

#[test]
fn rendered_errors_point_at_the_token() {
    let source = "(int x) =>\n  x + missing";
    let err = parse_error(source, &[Type::Int], Type::Int);
    assert_eq!(err.kind, ParseErrorKind::UnknownSymbol);
    let rendered = render_source_error(source, "rule.cs", &err, false);
    assert!(rendered.starts_with("error[E_UNKNOWN_SYMBOL]:"), "{rendered}");
    assert!(rendered.contains(" --> rule.cs:2:7"), "{rendered}");
    assert!(rendered.contains("  2 |   x + missing"), "{rendered}");
    assert!(rendered.ends_with("      ^^^^^^^"), "{rendered}");
}

#[test]
fn nesting_depth_is_limited_when_configured() {
    let source = format!("(int x) => {}x{}", "(".repeat(12), ")".repeat(12));
    let limited = Engine::new(EngineOptions {
        max_nesting_depth: Some(8),
        ..EngineOptions::default()
    });
    let err = match limited.compile(&source, &signature(&[Type::Int], Type::Int)) {
        Err(SourceError::Parse(err)) => err,
        other => panic!("expected a nesting error, got {other:?}"),
    };
    assert_eq!(err.kind, ParseErrorKind::WrongSymbol);
    assert!(err.message.contains("nesting"));

    let result = eval(&source, &[Type::Int], Type::Int, &[Value::Int(3)]);
    assert_eq!(result, Value::Int(3));
}

#[test]
fn host_types_supply_constructors_properties_and_operators() {
    let engine = geometry_engine();
    let function = engine
        .compile_inferred("(int dx) => { var p = new Point(1, 2) + new Point(dx, 10); p.X * 100 + p.Y; }")
        .expect("compiles");
    assert_eq!(function.signature().ret, Type::Int);
    assert_eq!(
        function.invoke(&[Value::Int(4)]).expect("run"),
        Value::Int(512)
    );

    let text_form = engine
        .compile_inferred(r#"(Point p) => $"at {p}""#)
        .expect("compiles");
    let result = text_form
        .invoke(&[Value::object(Point { x: 3, y: 4 })])
        .expect("run");
    assert_eq!(result, text("at (3, 4)"));
}

#[test]
fn settable_properties_accept_assignment() {
    let engine = geometry_engine();
    let function = engine
        .compile(
            "(Counter c) => { c.Count += 2; c.Count++; c.Count; }",
            &signature(&[Type::named("Counter")], Type::Int),
        )
        .expect("compiles");
    let shared = Value::object(Counter::default());
    assert_eq!(
        function.invoke(std::slice::from_ref(&shared)).expect("run"),
        Value::Int(3)
    );
    assert_eq!(
        function.invoke(std::slice::from_ref(&shared)).expect("run"),
        Value::Int(6)
    );

    let err = match engine.compile(
        "(Point p) => p.X = 1",
        &signature(&[Type::named("Point")], Type::Int),
    ) {
        Err(SourceError::Parse(err)) => err,
        other => panic!("read-only property should be rejected, got {other:?}"),
    };
    assert_eq!(err.kind, ParseErrorKind::Type);
}

#[test]
fn compound_updates_evaluate_the_receiver_once() {
    let engine = geometry_engine();
    let function = engine
        .compile(
            "(Counter c) => { c.Touch().Count += 5; c.Touch().Count++; ++c.Touch().Count; c.Count; }",
            &signature(&[Type::named("Counter")], Type::Int),
        )
        .expect("compiles");
    let shared = Value::object(Counter::default());
    assert_eq!(
        function.invoke(std::slice::from_ref(&shared)).expect("run"),
        Value::Int(7)
    );
    let counter = shared.downcast_ref::<Counter>().expect("counter object");
    assert_eq!(counter.lookups.load(Ordering::SeqCst), 3);
}

#[test]
fn unknown_host_types_are_unknown_symbols() {
    let err = match engine().compile_inferred("(Point p) => p.X") {
        Err(SourceError::Parse(err)) => err,
        other => panic!("expected a parse error, got {other:?}"),
    };
    assert_eq!(err.kind, ParseErrorKind::UnknownSymbol);
    assert_eq!(err.offset, 1);
}

#[test]
fn engines_share_a_catalog() {
    let catalog: Arc<dyn expr::TypeCatalog> = Arc::new(StandardCatalog::new());
    let csharp = engine().with_shared_catalog(Arc::clone(&catalog));
    let formula = formula_engine().with_shared_catalog(catalog);
    let a = csharp.compile_inferred("(double x) => Math.Round(x)").expect("compiles");
    let b = formula.compile_inferred("(double x) => Math.Round(x)").expect("compiles");
    for x in [0.5, 1.5, 2.4] {
        assert_eq!(
            a.invoke(&[Value::Double(x)]).expect("run"),
            b.invoke(&[Value::Double(x)]).expect("run")
        );
    }
}
