use std::any::Any;
use std::sync::Mutex;

use crate::catalog::TypeDef;
use crate::catalog::format::{align, format_value};
use crate::types::Type;
use crate::value::{HostObject, Value};
use crate::vm::{VmError, VmResult};

/// Source name of the interpolation accumulator type.
pub const TEXT_BUILDER: &str = "TextBuilder";

/// Growable text accumulator behind interpolated strings.
#[derive(Debug, Default)]
pub struct TextBuilder {
    buffer: Mutex<String>,
}

impl TextBuilder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(String::with_capacity(capacity)),
        }
    }

    pub fn text(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn push_str(&self, text: &str) {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_str(text);
    }

    pub fn len(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .chars()
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HostObject for TextBuilder {
    fn type_name(&self) -> &str {
        TEXT_BUILDER
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn to_text(&self) -> String {
        self.text()
    }
}

fn receiver(args: &[Value]) -> VmResult<&TextBuilder> {
    match args.first() {
        Some(Value::Null) | None => Err(VmError::NullReference),
        Some(value) => value.downcast_ref::<TextBuilder>().ok_or_else(|| VmError::TypeMismatch {
            expected: TEXT_BUILDER.to_string(),
            got: value.type_name(),
        }),
    }
}

fn append(args: &[Value], alignment: Option<&Value>, format: Option<&Value>) -> VmResult<Value> {
    let builder = receiver(args)?;
    let value = args.get(1).cloned().unwrap_or(Value::Null);
    let format = match format {
        Some(Value::Null) | None => None,
        Some(spec) => Some(spec.as_str()?.to_string()),
    };
    let mut text = format_value(&value, format.as_deref());
    if let Some(width) = alignment {
        text = align(&text, width.as_int()?)?;
    }
    builder.push_str(&text);
    Ok(Value::Null)
}

pub(super) fn text_builder_type() -> TypeDef {
    let ty = Type::named(TEXT_BUILDER);
    TypeDef::for_type(TEXT_BUILDER, ty)
        .constructor(Vec::new(), |_| Ok(Value::object(TextBuilder::default())))
        .constructor(vec![Type::Int, Type::Int], |args| {
            let literal_length = args.first().map(Value::as_int).transpose()?.unwrap_or(0);
            let formatted_count = args.get(1).map(Value::as_int).transpose()?.unwrap_or(0);
            let capacity = literal_length.max(0) as usize + formatted_count.max(0) as usize * 11;
            Ok(Value::object(TextBuilder::with_capacity(capacity)))
        })
        .method("AppendLiteral", vec![Type::String], Type::Void, |args| {
            let builder = receiver(args)?;
            if let Some(Value::String(text)) = args.get(1) {
                builder.push_str(text);
            }
            Ok(Value::Null)
        })
        .method("AppendFormatted", vec![Type::Object], Type::Void, |args| {
            append(args, None, None)
        })
        .method("AppendFormatted", vec![Type::String], Type::Void, |args| {
            append(args, None, None)
        })
        .method(
            "AppendFormatted",
            vec![Type::Object, Type::Int],
            Type::Void,
            |args| append(args, args.get(2), None),
        )
        .method(
            "AppendFormatted",
            vec![Type::Object, Type::String],
            Type::Void,
            |args| append(args, None, args.get(2)),
        )
        .method(
            "AppendFormatted",
            vec![Type::Object, Type::Int, Type::String],
            Type::Void,
            |args| append(args, args.get(2), args.get(3)),
        )
        .property("Length", Type::Int, |args| {
            Ok(Value::Int(receiver(args)?.len() as i32))
        })
        .method("ToString", Vec::new(), Type::String, |args| {
            Ok(Value::from(receiver(args)?.text()))
        })
}
