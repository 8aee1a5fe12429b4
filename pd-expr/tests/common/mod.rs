#![allow(dead_code, unused_imports)]

pub use expr::{
    CompiledFunction, Engine, EngineOptions, ParseError, ParseErrorKind, Signature, SourceError,
    SourceFlavor, Type, Value, VmError,
};

pub fn engine() -> Engine {
    Engine::default()
}

pub fn formula_engine() -> Engine {
    Engine::new(EngineOptions {
        flavor: SourceFlavor::Formula,
        ..EngineOptions::default()
    })
}

pub fn signature(params: &[Type], ret: Type) -> Signature {
    Signature::new(params.to_vec(), ret)
}

pub fn compile(source: &str, params: &[Type], ret: Type) -> CompiledFunction {
    engine()
        .compile(source, &signature(params, ret))
        .unwrap_or_else(|err| panic!("'{source}' should compile: {err}"))
}

pub fn eval(source: &str, params: &[Type], ret: Type, args: &[Value]) -> Value {
    compile(source, params, ret)
        .invoke(args)
        .unwrap_or_else(|err| panic!("'{source}' should run: {err}"))
}

pub fn parse_error(source: &str, params: &[Type], ret: Type) -> ParseError {
    match engine().compile(source, &signature(params, ret)) {
        Ok(_) => panic!("'{source}' should not compile"),
        Err(SourceError::Parse(err)) => err,
        Err(other) => panic!("'{source}' failed outside the parser: {other}"),
    }
}

pub fn text(value: &str) -> Value {
    Value::from(value)
}
