use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::types::Type;
use crate::vm::{VmError, VmResult};

/// A host-defined object carried through the VM by reference.
pub trait HostObject: Any + Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    fn to_text(&self) -> String {
        self.type_name().to_string()
    }
}

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(Arc<str>),
    Array(Arc<[Value]>),
    Object(Arc<dyn HostObject>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl Value {
    pub fn string(text: impl Into<Arc<str>>) -> Self {
        Value::String(text.into())
    }

    pub fn array(items: impl Into<Vec<Value>>) -> Self {
        Value::Array(Arc::from(items.into()))
    }

    pub fn object(object: impl HostObject) -> Self {
        Value::Object(Arc::new(object))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Runtime type name used in diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(_) => "bool".to_string(),
            Value::Char(_) => "char".to_string(),
            Value::Int(_) => "int".to_string(),
            Value::Long(_) => "long".to_string(),
            Value::Float(_) => "float".to_string(),
            Value::Double(_) => "double".to_string(),
            Value::String(_) => "string".to_string(),
            Value::Array(_) => "array".to_string(),
            Value::Object(object) => object.type_name().to_string(),
        }
    }

    /// Whether this value can stand where `ty` is expected without conversion.
    pub fn is_instance_of(&self, ty: &Type) -> bool {
        match (self, ty) {
            (Value::Null, target) => target.accepts_null(),
            (_, Type::Object) => true,
            (value, Type::Nullable(inner)) => value.is_instance_of(inner),
            (Value::Bool(_), Type::Bool)
            | (Value::Char(_), Type::Char)
            | (Value::Int(_), Type::Int)
            | (Value::Long(_), Type::Long)
            | (Value::Float(_), Type::Float)
            | (Value::Double(_), Type::Double)
            | (Value::String(_), Type::String)
            | (Value::Array(_), Type::Sequence) => true,
            (Value::Array(items), Type::Array(element)) => {
                items.iter().all(|item| item.is_instance_of(element))
            }
            (Value::Object(object), Type::Named(name)) => object.type_name() == &**name,
            _ => false,
        }
    }

    /// Checked conversion performed by `Convert` ops.
    pub fn convert_to(&self, ty: &Type) -> VmResult<Value> {
        if self.is_instance_of(ty) {
            return Ok(self.clone());
        }
        let invalid = || VmError::InvalidCast {
            from: self.type_name(),
            to: ty.clone(),
        };
        match ty {
            Type::Nullable(inner) => self.convert_to(inner),
            Type::Int => Ok(Value::Int(match self {
                Value::Char(c) => *c as i32,
                Value::Long(v) => *v as i32,
                Value::Float(v) => *v as i32,
                Value::Double(v) => *v as i32,
                _ => return Err(invalid()),
            })),
            Type::Long => Ok(Value::Long(match self {
                Value::Char(c) => *c as i64,
                Value::Int(v) => *v as i64,
                Value::Float(v) => *v as i64,
                Value::Double(v) => *v as i64,
                _ => return Err(invalid()),
            })),
            Type::Float => Ok(Value::Float(match self {
                Value::Char(c) => *c as u32 as f32,
                Value::Int(v) => *v as f32,
                Value::Long(v) => *v as f32,
                Value::Double(v) => *v as f32,
                _ => return Err(invalid()),
            })),
            Type::Double => Ok(Value::Double(match self {
                Value::Char(c) => *c as u32 as f64,
                Value::Int(v) => *v as f64,
                Value::Long(v) => *v as f64,
                Value::Float(v) => *v as f64,
                _ => return Err(invalid()),
            })),
            Type::Char => {
                let code = match self {
                    Value::Int(v) => *v as i64,
                    Value::Long(v) => *v,
                    Value::Float(v) => *v as i64,
                    Value::Double(v) => *v as i64,
                    _ => return Err(invalid()),
                };
                u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .map(Value::Char)
                    .ok_or_else(invalid)
            }
            Type::Array(element) => match self {
                Value::Array(items) => {
                    let converted = items
                        .iter()
                        .map(|item| item.convert_to(element))
                        .collect::<VmResult<Vec<_>>>()?;
                    Ok(Value::array(converted))
                }
                _ => Err(invalid()),
            },
            _ => Err(invalid()),
        }
    }

    /// Text produced by `ToString()` and string concatenation.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Char(c) => c.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::Float(v) if v.is_finite() => v.to_string(),
            Value::Float(v) => float_text(*v as f64),
            Value::Double(v) => float_text(*v),
            Value::String(text) => text.to_string(),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_text).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Object(object) => object.to_text(),
        }
    }

    pub fn as_bool(&self) -> VmResult<bool> {
        match self {
            Value::Bool(value) => Ok(*value),
            other => Err(mismatch("bool", other)),
        }
    }

    pub fn as_char(&self) -> VmResult<char> {
        match self {
            Value::Char(value) => Ok(*value),
            other => Err(mismatch("char", other)),
        }
    }

    pub fn as_int(&self) -> VmResult<i32> {
        match self {
            Value::Int(value) => Ok(*value),
            Value::Char(value) => Ok(*value as i32),
            other => Err(mismatch("int", other)),
        }
    }

    pub fn as_long(&self) -> VmResult<i64> {
        match self {
            Value::Long(value) => Ok(*value),
            Value::Int(value) => Ok(*value as i64),
            Value::Char(value) => Ok(*value as i64),
            other => Err(mismatch("long", other)),
        }
    }

    pub fn as_float(&self) -> VmResult<f32> {
        match self {
            Value::Float(value) => Ok(*value),
            Value::Int(value) => Ok(*value as f32),
            Value::Long(value) => Ok(*value as f32),
            other => Err(mismatch("float", other)),
        }
    }

    pub fn as_double(&self) -> VmResult<f64> {
        match self {
            Value::Double(value) => Ok(*value),
            Value::Float(value) => Ok(*value as f64),
            Value::Int(value) => Ok(*value as f64),
            Value::Long(value) => Ok(*value as f64),
            Value::Char(value) => Ok(*value as u32 as f64),
            other => Err(mismatch("double", other)),
        }
    }

    pub fn as_str(&self) -> VmResult<&str> {
        match self {
            Value::String(text) => Ok(text),
            Value::Null => Err(VmError::NullReference),
            other => Err(mismatch("string", other)),
        }
    }

    pub fn as_array(&self) -> VmResult<&[Value]> {
        match self {
            Value::Array(items) => Ok(items),
            Value::Null => Err(VmError::NullReference),
            other => Err(mismatch("array", other)),
        }
    }

    pub fn downcast_ref<T: HostObject>(&self) -> Option<&T> {
        match self {
            Value::Object(object) => object.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }
}

fn mismatch(expected: &str, got: &Value) -> VmError {
    VmError::TypeMismatch {
        expected: expected.to_string(),
        got: got.type_name(),
    }
}

fn float_text(value: f64) -> String {
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    value.to_string()
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<char> for Value {
    fn from(value: char) -> Self {
        Value::Char(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Arc::from(value))
    }
}

/// Rust types that map onto a language type.
pub trait ValueType: Sized {
    fn value_type() -> Type;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> VmResult<Self>;
}

macro_rules! primitive_value_type {
    ($rust:ty, $ty:expr, $accessor:ident) => {
        impl ValueType for $rust {
            fn value_type() -> Type {
                $ty
            }

            fn into_value(self) -> Value {
                Value::from(self)
            }

            fn from_value(value: Value) -> VmResult<Self> {
                value.$accessor()
            }
        }
    };
}

primitive_value_type!(bool, Type::Bool, as_bool);
primitive_value_type!(char, Type::Char, as_char);
primitive_value_type!(i32, Type::Int, as_int);
primitive_value_type!(i64, Type::Long, as_long);
primitive_value_type!(f32, Type::Float, as_float);
primitive_value_type!(f64, Type::Double, as_double);

impl ValueType for String {
    fn value_type() -> Type {
        Type::String
    }

    fn into_value(self) -> Value {
        Value::from(self)
    }

    fn from_value(value: Value) -> VmResult<Self> {
        value.as_str().map(str::to_string)
    }
}

impl ValueType for Value {
    fn value_type() -> Type {
        Type::Object
    }

    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> VmResult<Self> {
        Ok(value)
    }
}

impl ValueType for () {
    fn value_type() -> Type {
        Type::Void
    }

    fn into_value(self) -> Value {
        Value::Null
    }

    fn from_value(_value: Value) -> VmResult<Self> {
        Ok(())
    }
}

impl<T: ValueType> ValueType for Vec<T> {
    fn value_type() -> Type {
        Type::array(T::value_type())
    }

    fn into_value(self) -> Value {
        Value::array(self.into_iter().map(T::into_value).collect::<Vec<_>>())
    }

    fn from_value(value: Value) -> VmResult<Self> {
        value
            .as_array()?
            .iter()
            .cloned()
            .map(T::from_value)
            .collect()
    }
}

impl<T: ValueType> ValueType for Option<T> {
    fn value_type() -> Type {
        Type::nullable(T::value_type())
    }

    fn into_value(self) -> Value {
        match self {
            Some(value) => value.into_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> VmResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_are_checked() {
        let boxed = Value::Long(5);
        assert_eq!(boxed.convert_to(&Type::Int), Ok(Value::Int(5)));
        let err = Value::from("5")
            .convert_to(&Type::Int)
            .expect_err("string to int should fail");
        assert!(matches!(err, VmError::InvalidCast { .. }));
        assert_eq!(Value::Null.convert_to(&Type::String), Ok(Value::Null));
        assert!(Value::Null.convert_to(&Type::Int).is_err());
    }

    #[test]
    fn text_rendering_matches_language_conventions() {
        assert_eq!(Value::Bool(true).to_text(), "True");
        assert_eq!(Value::Double(2.5).to_text(), "2.5");
        assert_eq!(Value::Double(3.0).to_text(), "3");
        assert_eq!(Value::Null.to_text(), "");
        assert_eq!(Value::array(vec![Value::Int(1), Value::Int(2)]).to_text(), "[1, 2]");
    }

    #[test]
    fn value_types_round_trip_through_options() {
        assert_eq!(Option::<i32>::value_type(), Type::Nullable(Box::new(Type::Int)));
        assert_eq!(Option::<String>::value_type(), Type::String);
        let value = Some(7).into_value();
        assert_eq!(Option::<i32>::from_value(value), Ok(Some(7)));
        assert_eq!(Option::<i32>::from_value(Value::Null), Ok(None));
    }
}
