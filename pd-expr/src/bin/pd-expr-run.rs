use std::io;
use std::process::ExitCode;

use expr::{
    CompiledFunction, Engine, EngineOptions, Signature, SourceError, SourceFlavor, Type,
    TypeCatalog, Value, logging, render_source_error, render_vm_error,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

const SOURCE_NAME: &str = "<input>";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CliConfig {
    source: Option<String>,
    args: Vec<String>,
    flavor: Option<SourceFlavor>,
    signature: Option<String>,
    dump: bool,
    repl: bool,
    help: bool,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli_args(&args).map_err(io::Error::other)?;
    if cli.help {
        print_usage();
        return Ok(ExitCode::SUCCESS);
    }
    expr::init_logging()?;

    let mut options = EngineOptions::from_env()?;
    if let Some(flavor) = cli.flavor {
        options.flavor = flavor;
    }
    let engine = Engine::new(options);
    if cli.repl {
        run_repl(&engine, cli.dump)?;
        return Ok(ExitCode::SUCCESS);
    }

    let source = match cli.source.as_deref() {
        Some(path) if path.starts_with('@') => std::fs::read_to_string(&path[1..])?,
        Some(text) => text.to_string(),
        None => {
            print_usage();
            return Ok(ExitCode::FAILURE);
        }
    };
    let signature = cli
        .signature
        .as_deref()
        .map(|raw| parse_signature(raw, engine.catalog()))
        .transpose()
        .map_err(io::Error::other)?;

    let compiled = match signature {
        Some(signature) => engine.compile(&source, &signature),
        None => engine.compile_inferred(&source),
    };
    let function = match compiled {
        Ok(function) => function,
        Err(err) => {
            eprintln!("{}", render_compile_error(&source, &err));
            return Ok(ExitCode::FAILURE);
        }
    };
    if cli.dump {
        println!("; {}", function.signature());
        print!("{}", function.disassemble());
    }

    let params = &function.signature().params;
    if params.len() != cli.args.len() {
        return Err(io::Error::other(format!(
            "expected {} argument(s), got {}",
            params.len(),
            cli.args.len()
        ))
        .into());
    }
    let values = params
        .iter()
        .zip(&cli.args)
        .map(|(ty, raw)| parse_argument(raw, ty))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io::Error::other)?;
    Ok(print_outcome(&function, &values))
}

fn parse_cli_args(args: &[String]) -> Result<CliConfig, String> {
    let mut cfg = CliConfig::default();
    if args.is_empty() {
        cfg.repl = true;
        return Ok(cfg);
    }
    let mut index = 0usize;
    if args.first().is_some_and(|first| first == "repl") {
        cfg.repl = true;
        index = 1;
    }

    while index < args.len() {
        match args[index].as_str() {
            "-h" | "--help" => {
                cfg.help = true;
                index += 1;
            }
            "--repl" => {
                cfg.repl = true;
                index += 1;
            }
            "--dump" => {
                cfg.dump = true;
                index += 1;
            }
            "--flavor" => {
                let raw = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --flavor".to_string())?;
                let flavor = SourceFlavor::from_name(raw)
                    .ok_or_else(|| format!("unknown flavor '{raw}'"))?;
                cfg.flavor = Some(flavor);
                index += 2;
            }
            "--sig" => {
                let raw = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --sig".to_string())?;
                cfg.signature = Some(raw.clone());
                index += 2;
            }
            value if value.starts_with("--") => {
                return Err(format!("unknown flag '{value}'"));
            }
            value => {
                if cfg.source.is_none() {
                    cfg.source = Some(value.to_string());
                } else {
                    cfg.args.push(value.to_string());
                }
                index += 1;
            }
        }
    }

    if cfg.repl && (cfg.source.is_some() || cfg.signature.is_some()) {
        return Err("repl mode does not accept a source or --sig".to_string());
    }
    Ok(cfg)
}

/// Parses `int,string->bool`. An empty parameter list is `->T`.
fn parse_signature(raw: &str, catalog: &dyn TypeCatalog) -> Result<Signature, String> {
    let (params, ret) = raw
        .split_once("->")
        .ok_or_else(|| format!("signature '{raw}' is missing '->'"))?;
    let params = params
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| parse_type_name(name, catalog))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Signature::new(params, parse_type_name(ret.trim(), catalog)?))
}

fn parse_type_name(name: &str, catalog: &dyn TypeCatalog) -> Result<Type, String> {
    if let Some(element) = name.strip_suffix("[]") {
        return Ok(Type::array(parse_type_name(element, catalog)?));
    }
    if let Some(inner) = name.strip_suffix('?') {
        return Ok(Type::nullable(parse_type_name(inner, catalog)?));
    }
    if name == "void" {
        return Ok(Type::Void);
    }
    catalog
        .resolve_type(name, &[])
        .ok_or_else(|| format!("unknown type '{name}'"))
}

fn parse_argument(raw: &str, ty: &Type) -> Result<Value, String> {
    let invalid = || format!("cannot read '{raw}' as {ty}");
    match ty {
        Type::Nullable(_) | Type::Object | Type::String if raw == "null" => Ok(Value::Null),
        Type::Nullable(inner) => parse_argument(raw, inner),
        Type::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(invalid()),
        },
        Type::Char => {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => Ok(Value::Char(ch)),
                _ => Err(invalid()),
            }
        }
        Type::Int => raw.parse().map(Value::Int).map_err(|_| invalid()),
        Type::Long => raw.parse().map(Value::Long).map_err(|_| invalid()),
        Type::Float => raw.parse().map(Value::Float).map_err(|_| invalid()),
        Type::Double => raw.parse().map(Value::Double).map_err(|_| invalid()),
        Type::String => Ok(Value::from(raw)),
        Type::Array(element) => {
            let inner = raw.trim().trim_start_matches('[').trim_end_matches(']');
            let items = inner
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| parse_argument(item, element))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::array(items))
        }
        Type::Object => Ok(raw
            .parse()
            .map(Value::Int)
            .or_else(|_| raw.parse().map(Value::Double))
            .unwrap_or_else(|_| Value::from(raw))),
        _ => Err(invalid()),
    }
}

fn render_compile_error(source: &str, err: &SourceError) -> String {
    match err {
        SourceError::Parse(parse) => {
            render_source_error(source, SOURCE_NAME, parse, logging::ansi_enabled())
        }
        other => other.to_string(),
    }
}

fn print_outcome(function: &CompiledFunction, args: &[Value]) -> ExitCode {
    match function.invoke(args) {
        Ok(value) => {
            if function.signature().ret != Type::Void {
                println!("{}", format_result(&value));
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", render_vm_error(&err, logging::ansi_enabled()));
            ExitCode::FAILURE
        }
    }
}

fn format_result(value: &Value) -> String {
    let text = match value {
        Value::Null => "null".to_string(),
        Value::String(text) => format!("{text:?}"),
        other => other.to_text(),
    };
    format!(
        "{} {text} : {}",
        logging::result_label(),
        logging::type_label(&value.type_name())
    )
}

fn print_usage() {
    println!("Usage:");
    println!("  pd-expr-run                                  (defaults to REPL)");
    println!("  pd-expr-run [--flavor <name>] [--dump] <declaration> [args...]");
    println!("  pd-expr-run --sig \"int,int->int\" \"(a, b) => a * b\" 6 7");
    println!("  pd-expr-run @path/to/file [args...]");
    println!("  pd-expr-run [--flavor <name>] --repl");
    println!();
    println!("Flavors: csharp (default), formula. Env: PD_EXPR_FLAVOR, PD_EXPR_MAX_DEPTH, RUST_LOG.");
}

fn run_repl(engine: &Engine, mut dump: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("pd-expr REPL ({})", engine.dialect().name());
    println!("history: up/down arrows, commands: .help, .dump, .quit");
    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("pd-expr> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match line {
                    ".quit" | ".exit" => break,
                    ".help" => {
                        println!("commands:");
                        println!("  .help      show commands");
                        println!("  .dump      toggle op listing");
                        println!("  .quit      quit repl");
                        continue;
                    }
                    ".dump" => {
                        dump = !dump;
                        println!("dump {}", if dump { "on" } else { "off" });
                        continue;
                    }
                    _ if line.starts_with('.') => {
                        println!("unknown command: {line}");
                        continue;
                    }
                    _ => {}
                }
                let _ = editor.add_history_entry(line);
                let source = format!("() {} {line}", engine.dialect().arrow());
                let function = match engine.compile_inferred(&source) {
                    Ok(function) => function,
                    Err(err) => {
                        println!("{}", render_compile_error(&source, &err));
                        continue;
                    }
                };
                if dump {
                    print!("{}", function.disassemble());
                }
                match function.invoke(&[]) {
                    Ok(_) if function.signature().ret == Type::Void => println!("=> <void>"),
                    Ok(value) => println!("{}", format_result(&value)),
                    Err(err) => println!("{}", render_vm_error(&err, logging::ansi_enabled())),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("bye");
                break;
            }
            Err(err) => {
                return Err(Box::new(io::Error::other(err.to_string())));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use expr::StandardCatalog;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    #[test]
    fn no_arguments_default_to_repl() {
        let cfg = parse_cli_args(&[]).expect("parse");
        assert!(cfg.repl);
    }

    #[test]
    fn source_and_arguments_are_positional() {
        let cfg = parse_cli_args(&strings(&[
            "--flavor",
            "excel",
            "--sig",
            "int,int->int",
            "(a, b) => a + b",
            "1",
            "2",
        ]))
        .expect("parse");
        assert_eq!(cfg.flavor, Some(SourceFlavor::Formula));
        assert_eq!(cfg.signature.as_deref(), Some("int,int->int"));
        assert_eq!(cfg.source.as_deref(), Some("(a, b) => a + b"));
        assert_eq!(cfg.args, strings(&["1", "2"]));
    }

    #[test]
    fn negative_numbers_are_arguments_not_flags() {
        let cfg = parse_cli_args(&strings(&["x => x", "-5"])).expect("parse");
        assert_eq!(cfg.args, strings(&["-5"]));
        let err = parse_cli_args(&strings(&["--bogus"])).expect_err("unknown flag");
        assert!(err.contains("--bogus"));
    }

    #[test]
    fn signatures_resolve_through_the_catalog() {
        let catalog = StandardCatalog::new();
        let signature = parse_signature("int, string[] -> double?", &catalog).expect("signature");
        assert_eq!(
            signature,
            Signature::new(
                vec![Type::Int, Type::array(Type::String)],
                Type::nullable(Type::Double)
            )
        );
        assert!(parse_signature("->void", &catalog).expect("void").params.is_empty());
        assert!(parse_signature("widget->int", &catalog).is_err());
    }

    #[test]
    fn arguments_follow_parameter_types() {
        assert!(matches!(
            parse_argument("42", &Type::Int),
            Ok(Value::Int(42))
        ));
        assert!(matches!(
            parse_argument("null", &Type::nullable(Type::Int)),
            Ok(Value::Null)
        ));
        let array = parse_argument("[1, 2, 3]", &Type::array(Type::Int)).expect("array");
        assert_eq!(array.as_array().expect("items").len(), 3);
        assert!(parse_argument("x", &Type::Int).is_err());
    }
}
