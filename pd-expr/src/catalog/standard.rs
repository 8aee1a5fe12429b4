use std::sync::Arc;

use regex::Regex;

use crate::catalog::format::{composite_format, format_value};
use crate::catalog::text::text_builder_type;
use crate::catalog::{Callable, Member, Method, Property, StandardCatalog, TypeDef};
use crate::types::Type;
use crate::value::Value;
use crate::vm::{VmError, VmResult};

pub(super) fn install(catalog: &mut StandardCatalog) {
    for (name, ty) in [
        ("bool", Type::Bool),
        ("Boolean", Type::Bool),
        ("char", Type::Char),
        ("Char", Type::Char),
        ("int", Type::Int),
        ("Int32", Type::Int),
        ("long", Type::Long),
        ("Int64", Type::Long),
        ("float", Type::Float),
        ("Single", Type::Float),
        ("double", Type::Double),
        ("Double", Type::Double),
        ("string", Type::String),
        ("String", Type::String),
        ("object", Type::Object),
        ("Object", Type::Object),
        ("IEnumerable", Type::Sequence),
    ] {
        catalog.alias(name, ty);
    }

    catalog.register(string_type());
    for (name, ty) in [
        ("int", Type::Int),
        ("long", Type::Long),
        ("float", Type::Float),
        ("double", Type::Double),
    ] {
        catalog.register(numeric_type(name, ty));
    }
    catalog.register(math_type());
    catalog.register(regex_type());
    catalog.register(enumerable_type());
    catalog.register(text_builder_type());
}

fn arg(args: &[Value], index: usize) -> VmResult<&Value> {
    args.get(index).ok_or(VmError::ArgumentCount {
        expected: index + 1,
        got: args.len(),
    })
}

fn str_arg(args: &[Value], index: usize) -> VmResult<&str> {
    arg(args, index)?.as_str()
}

fn int_arg(args: &[Value], index: usize) -> VmResult<i32> {
    arg(args, index)?.as_int()
}

fn double_arg(args: &[Value], index: usize) -> VmResult<f64> {
    arg(args, index)?.as_double()
}

fn char_range(text: &str, start: i32, length: Option<i32>) -> VmResult<String> {
    let total = text.chars().count();
    let out_of_range = |index: i32| VmError::IndexOutOfRange {
        index: index as i64,
        len: total,
    };
    let start = usize::try_from(start).map_err(|_| out_of_range(start))?;
    if start > total {
        return Err(out_of_range(start as i32));
    }
    let length = match length {
        Some(length) => {
            let length = usize::try_from(length).map_err(|_| out_of_range(length))?;
            if start + length > total {
                return Err(out_of_range((start + length) as i32));
            }
            length
        }
        None => total - start,
    };
    Ok(text.chars().skip(start).take(length).collect())
}

fn char_index(text: &str, byte_index: Option<usize>) -> Value {
    match byte_index {
        Some(at) => Value::Int(text[..at].chars().count() as i32),
        None => Value::Int(-1),
    }
}

fn pad(text: &str, width: i32, left: bool) -> String {
    let len = text.chars().count();
    let width = width.max(0) as usize;
    if len >= width {
        return text.to_string();
    }
    let padding = " ".repeat(width - len);
    if left {
        format!("{padding}{text}")
    } else {
        format!("{text}{padding}")
    }
}

fn string_type() -> TypeDef {
    use Type::{Bool, Char, Int, Object, String as Str};

    TypeDef::for_type("string", Str)
        .property("Length", Int, |args| {
            Ok(Value::Int(str_arg(args, 0)?.chars().count() as i32))
        })
        .method("Substring", vec![Int], Str, |args| {
            Ok(Value::from(char_range(str_arg(args, 0)?, int_arg(args, 1)?, None)?))
        })
        .method("Substring", vec![Int, Int], Str, |args| {
            let text = str_arg(args, 0)?;
            Ok(Value::from(char_range(text, int_arg(args, 1)?, Some(int_arg(args, 2)?))?))
        })
        .method("ToUpper", Vec::new(), Str, |args| {
            Ok(Value::from(str_arg(args, 0)?.to_uppercase()))
        })
        .method("ToLower", Vec::new(), Str, |args| {
            Ok(Value::from(str_arg(args, 0)?.to_lowercase()))
        })
        .method("Trim", Vec::new(), Str, |args| {
            Ok(Value::from(str_arg(args, 0)?.trim()))
        })
        .method("Contains", vec![Str], Bool, |args| {
            Ok(Value::Bool(str_arg(args, 0)?.contains(str_arg(args, 1)?)))
        })
        .method("StartsWith", vec![Str], Bool, |args| {
            Ok(Value::Bool(str_arg(args, 0)?.starts_with(str_arg(args, 1)?)))
        })
        .method("EndsWith", vec![Str], Bool, |args| {
            Ok(Value::Bool(str_arg(args, 0)?.ends_with(str_arg(args, 1)?)))
        })
        .method("IndexOf", vec![Str], Int, |args| {
            let text = str_arg(args, 0)?;
            Ok(char_index(text, text.find(str_arg(args, 1)?)))
        })
        .method("IndexOf", vec![Char], Int, |args| {
            let text = str_arg(args, 0)?;
            Ok(char_index(text, text.find(arg(args, 1)?.as_char()?)))
        })
        .method("Replace", vec![Str, Str], Str, |args| {
            let text = str_arg(args, 0)?;
            Ok(Value::from(text.replace(str_arg(args, 1)?, str_arg(args, 2)?)))
        })
        .method("Split", vec![Char], Type::array(Str), |args| {
            let separator = arg(args, 1)?.as_char()?;
            let parts: Vec<Value> = str_arg(args, 0)?.split(separator).map(Value::from).collect();
            Ok(Value::array(parts))
        })
        .method("PadLeft", vec![Int], Str, |args| {
            Ok(Value::from(pad(str_arg(args, 0)?, int_arg(args, 1)?, true)))
        })
        .method("PadRight", vec![Int], Str, |args| {
            Ok(Value::from(pad(str_arg(args, 0)?, int_arg(args, 1)?, false)))
        })
        .method("ToString", Vec::new(), Str, |args| Ok(arg(args, 0)?.clone()))
        .static_method("IsNullOrEmpty", vec![Str], Bool, |args| {
            Ok(Value::Bool(match arg(args, 0)? {
                Value::Null => true,
                value => value.as_str()?.is_empty(),
            }))
        })
        .static_variadic("Concat", Vec::new(), Object, Str, |args| {
            let parts = arg(args, 0)?.as_array()?;
            Ok(Value::from(parts.iter().map(Value::to_text).collect::<String>()))
        })
        .static_variadic("Join", vec![Str], Object, Str, |args| {
            let separator = str_arg(args, 0)?;
            let parts: Vec<String> = arg(args, 1)?.as_array()?.iter().map(Value::to_text).collect();
            Ok(Value::from(parts.join(separator)))
        })
        .static_variadic("Format", vec![Str], Object, Str, |args| {
            let template = str_arg(args, 0)?;
            Ok(Value::from(composite_format(template, arg(args, 1)?.as_array()?)?))
        })
}

fn numeric_type(name: &str, ty: Type) -> TypeDef {
    let parse_ty = ty.clone();
    TypeDef::for_type(name, ty.clone())
        .method("ToString", vec![Type::String], Type::String, |args| {
            let format = match arg(args, 1)? {
                Value::Null => None,
                spec => Some(spec.as_str()?),
            };
            Ok(Value::from(format_value(arg(args, 0)?, format)))
        })
        .static_method("Parse", vec![Type::String], ty, move |args| {
            let text = str_arg(args, 0)?.trim();
            let invalid = || VmError::Host(format!("'{text}' is not a valid {parse_ty}"));
            match parse_ty {
                Type::Int => text.parse().map(Value::Int).map_err(|_| invalid()),
                Type::Long => text.parse().map(Value::Long).map_err(|_| invalid()),
                Type::Float => text.parse().map(Value::Float).map_err(|_| invalid()),
                _ => text.parse().map(Value::Double).map_err(|_| invalid()),
            }
        })
}

fn math_type() -> TypeDef {
    use Type::{Double, Int, Long};

    TypeDef::new("Math")
        .static_property("PI", Double, |_| Ok(Value::Double(std::f64::consts::PI)))
        .static_method("Abs", vec![Int], Int, |args| {
            Ok(Value::Int(int_arg(args, 0)?.wrapping_abs()))
        })
        .static_method("Abs", vec![Long], Long, |args| {
            Ok(Value::Long(arg(args, 0)?.as_long()?.wrapping_abs()))
        })
        .static_method("Abs", vec![Double], Double, |args| {
            Ok(Value::Double(double_arg(args, 0)?.abs()))
        })
        .static_method("Max", vec![Int, Int], Int, |args| {
            Ok(Value::Int(int_arg(args, 0)?.max(int_arg(args, 1)?)))
        })
        .static_method("Max", vec![Long, Long], Long, |args| {
            Ok(Value::Long(arg(args, 0)?.as_long()?.max(arg(args, 1)?.as_long()?)))
        })
        .static_method("Max", vec![Double, Double], Double, |args| {
            Ok(Value::Double(double_arg(args, 0)?.max(double_arg(args, 1)?)))
        })
        .static_method("Min", vec![Int, Int], Int, |args| {
            Ok(Value::Int(int_arg(args, 0)?.min(int_arg(args, 1)?)))
        })
        .static_method("Min", vec![Long, Long], Long, |args| {
            Ok(Value::Long(arg(args, 0)?.as_long()?.min(arg(args, 1)?.as_long()?)))
        })
        .static_method("Min", vec![Double, Double], Double, |args| {
            Ok(Value::Double(double_arg(args, 0)?.min(double_arg(args, 1)?)))
        })
        .static_method("Pow", vec![Double, Double], Double, |args| {
            Ok(Value::Double(double_arg(args, 0)?.powf(double_arg(args, 1)?)))
        })
        .static_method("Sqrt", vec![Double], Double, |args| {
            Ok(Value::Double(double_arg(args, 0)?.sqrt()))
        })
        .static_method("Floor", vec![Double], Double, |args| {
            Ok(Value::Double(double_arg(args, 0)?.floor()))
        })
        .static_method("Ceiling", vec![Double], Double, |args| {
            Ok(Value::Double(double_arg(args, 0)?.ceil()))
        })
        .static_method("Round", vec![Double], Double, |args| {
            Ok(Value::Double(double_arg(args, 0)?.round_ties_even()))
        })
        .static_method("Round", vec![Double, Int], Double, |args| {
            let digits = int_arg(args, 1)?.clamp(0, 15);
            let scale = 10f64.powi(digits);
            Ok(Value::Double((double_arg(args, 0)? * scale).round_ties_even() / scale))
        })
}

fn regex_type() -> TypeDef {
    fn compile(pattern: &str) -> VmResult<Regex> {
        Regex::new(pattern).map_err(|err| VmError::Host(format!("invalid pattern: {err}")))
    }

    TypeDef::new("Regex")
        .static_method(
            "IsMatch",
            vec![Type::String, Type::String],
            Type::Bool,
            |args| Ok(Value::Bool(compile(str_arg(args, 1)?)?.is_match(str_arg(args, 0)?))),
        )
        .static_method(
            "Replace",
            vec![Type::String, Type::String, Type::String],
            Type::String,
            |args| {
                let pattern = compile(str_arg(args, 1)?)?;
                let replaced = pattern.replace_all(str_arg(args, 0)?, str_arg(args, 2)?);
                Ok(Value::from(replaced.into_owned()))
            },
        )
}

fn enumerable_type() -> TypeDef {
    TypeDef::new("Enumerable").static_method(
        "Range",
        vec![Type::Int, Type::Int],
        Type::Sequence,
        |args| {
            let start = int_arg(args, 0)?;
            let count = int_arg(args, 1)?;
            if count < 0 {
                return Err(VmError::Host("count must be non-negative".to_string()));
            }
            let items: Vec<Value> = (0..count)
                .map(|offset| Value::Int(start.wrapping_add(offset)))
                .collect();
            Ok(Value::array(items))
        },
    )
}

fn length_property(name: &str) -> Property {
    Property {
        name: Arc::from(name),
        ty: Type::Int,
        getter: Callable::new(format!("sequence.{name}"), |args: &[Value]| -> VmResult<Value> {
            Ok(Value::Int(arg(args, 0)?.as_array()?.len() as i32))
        }),
        setter: None,
    }
}

/// Members every array, sequence or nullable value exposes.
pub(super) fn structural_members(owner: &Type, name: &str) -> Vec<Member> {
    match (owner, name) {
        (Type::Array(_), "Length") => vec![Member::Property(length_property("Length"))],
        (Type::Array(_) | Type::Sequence, "Count") => {
            vec![Member::Property(length_property("Count"))]
        }
        (Type::Nullable(_), "HasValue") => vec![Member::Property(Property {
            name: Arc::from("HasValue"),
            ty: Type::Bool,
            getter: Callable::new("nullable.HasValue", |args: &[Value]| -> VmResult<Value> {
                Ok(Value::Bool(!arg(args, 0)?.is_null()))
            }),
            setter: None,
        })],
        (Type::Nullable(inner), "Value") => vec![Member::Property(Property {
            name: Arc::from("Value"),
            ty: (**inner).clone(),
            getter: Callable::new("nullable.Value", |args: &[Value]| -> VmResult<Value> {
                match arg(args, 0)? {
                    Value::Null => Err(VmError::NullReference),
                    value => Ok(value.clone()),
                }
            }),
            setter: None,
        })],
        _ => Vec::new(),
    }
}

pub(super) fn to_string_member() -> Member {
    Member::Method(Method {
        name: Arc::from("ToString"),
        params: Vec::new(),
        rest: None,
        ret: Type::String,
        function: Callable::new("object.ToString", |args: &[Value]| -> VmResult<Value> {
            match arg(args, 0)? {
                Value::Null => Err(VmError::NullReference),
                value => Ok(Value::from(value.to_text())),
            }
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemberScope, TypeCatalog};

    fn call_static(catalog: &StandardCatalog, owner: &Type, name: &str, args: &[Value]) -> Value {
        let members = catalog.members(owner, name, MemberScope::Static);
        let method = members
            .iter()
            .find_map(|member| match member {
                Member::Method(method) if method.params.len() == args.len() => Some(method),
                _ => None,
            })
            .expect("method should exist");
        method.function.call(args).expect("call should succeed")
    }

    #[test]
    fn substring_is_bounds_checked() {
        assert_eq!(char_range("hello", 1, Some(3)), Ok("ell".to_string()));
        assert_eq!(char_range("hello", 5, None), Ok(String::new()));
        assert!(matches!(
            char_range("hello", 4, Some(3)),
            Err(VmError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn regex_members_use_the_regex_engine() {
        let catalog = StandardCatalog::new();
        let regex = Type::named("Regex");
        let matched = call_static(
            &catalog,
            &regex,
            "IsMatch",
            &[Value::from("order-1234"), Value::from(r"^\w+-\d+$")],
        );
        assert_eq!(matched, Value::Bool(true));
        let replaced = call_static(
            &catalog,
            &regex,
            "Replace",
            &[Value::from("a1b22"), Value::from(r"\d+"), Value::from("#")],
        );
        assert_eq!(replaced, Value::from("a#b#"));
    }

    #[test]
    fn invalid_pattern_is_a_host_error() {
        let catalog = StandardCatalog::new();
        let members = catalog.members(&Type::named("Regex"), "IsMatch", MemberScope::Static);
        let Some(Member::Method(method)) = members.first() else {
            panic!("IsMatch should be a method");
        };
        let err = method
            .function
            .call(&[Value::from("x"), Value::from("(")])
            .expect_err("unbalanced group should fail");
        assert!(matches!(err, VmError::Host(_)));
    }

    #[test]
    fn parse_reports_bad_input() {
        let catalog = StandardCatalog::new();
        assert_eq!(
            call_static(&catalog, &Type::Int, "Parse", &[Value::from(" 42 ")]),
            Value::Int(42)
        );
        let members = catalog.members(&Type::Int, "Parse", MemberScope::Static);
        let Some(Member::Method(method)) = members.first() else {
            panic!("Parse should be a method");
        };
        assert!(method.function.call(&[Value::from("4x2")]).is_err());
    }

    #[test]
    fn math_round_uses_bankers_rounding() {
        let catalog = StandardCatalog::new();
        let math = Type::named("Math");
        assert_eq!(
            call_static(&catalog, &math, "Round", &[Value::Double(2.5)]),
            Value::Double(2.0)
        );
        assert_eq!(
            call_static(&catalog, &math, "Round", &[Value::Double(1.2345), Value::Int(2)]),
            Value::Double(1.23)
        );
    }
}
