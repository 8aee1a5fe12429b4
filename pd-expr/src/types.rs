use std::fmt;
use std::sync::Arc;

use crate::value::Value;

/// Cost of converting any value to `object`.
pub(crate) const BOXING_COST: u32 = 8;
/// Cost of narrowing a constant whose value fits the target type.
pub(crate) const CONSTANT_NARROWING_COST: u32 = 16;

/// Static type of an IR node or signature slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    /// Type of the `null` literal before it is converted.
    Null,
    Bool,
    Char,
    Int,
    Long,
    Float,
    Double,
    String,
    Object,
    Array(Box<Type>),
    /// Non-generic sequence of objects.
    Sequence,
    Nullable(Box<Type>),
    Named(Arc<str>),
}

impl Type {
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Type::Named(name.into())
    }

    pub fn array(element: Type) -> Self {
        Type::Array(Box::new(element))
    }

    /// `T?`; reference types already admit null and are returned unchanged.
    pub fn nullable(inner: Type) -> Self {
        if inner.accepts_null() || inner == Type::Void {
            inner
        } else {
            Type::Nullable(Box::new(inner))
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Type::Null
                | Type::String
                | Type::Object
                | Type::Array(_)
                | Type::Sequence
                | Type::Named(_)
        )
    }

    pub fn accepts_null(&self) -> bool {
        self.is_reference() || matches!(self, Type::Nullable(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Long | Type::Float | Type::Double)
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Type::Char | Type::Int | Type::Long)
    }

    /// Position on the widening ladder `char < int < long < float < double`.
    pub(crate) fn numeric_rank(&self) -> Option<u32> {
        match self {
            Type::Char => Some(0),
            Type::Int => Some(1),
            Type::Long => Some(2),
            Type::Float => Some(3),
            Type::Double => Some(4),
            _ => None,
        }
    }

    /// Strips one level of `Nullable`.
    pub fn underlying(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner,
            other => other,
        }
    }

    /// Element type produced when iterating or indexing a value of this type.
    pub fn element_type(&self) -> Option<Type> {
        match self {
            Type::Array(element) => Some((**element).clone()),
            Type::Sequence => Some(Type::Object),
            Type::String => Some(Type::Char),
            _ => None,
        }
    }

    pub fn default_value(&self) -> Value {
        match self {
            Type::Bool => Value::Bool(false),
            Type::Char => Value::Char('\0'),
            Type::Int => Value::Int(0),
            Type::Long => Value::Long(0),
            Type::Float => Value::Float(0.0),
            Type::Double => Value::Double(0.0),
            _ => Value::Null,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Null => write!(f, "null"),
            Type::Bool => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::Int => write!(f, "int"),
            Type::Long => write!(f, "long"),
            Type::Float => write!(f, "float"),
            Type::Double => write!(f, "double"),
            Type::String => write!(f, "string"),
            Type::Object => write!(f, "object"),
            Type::Array(element) => write!(f, "{element}[]"),
            Type::Sequence => write!(f, "IEnumerable"),
            Type::Nullable(inner) => write!(f, "{inner}?"),
            Type::Named(name) => write!(f, "{name}"),
        }
    }
}

/// Cost of an implicit conversion from `from` to `to`, or `None` when no
/// implicit conversion exists.
pub fn implicit_cost(from: &Type, to: &Type) -> Option<u32> {
    if from == to {
        return Some(0);
    }
    match (from, to) {
        (Type::Void, _) | (_, Type::Void) => None,
        (Type::Null, target) => target.accepts_null().then_some(1),
        (Type::Nullable(inner), Type::Nullable(target)) => implicit_cost(inner, target),
        (source, Type::Nullable(target)) => implicit_cost(source, target).map(|cost| cost + 1),
        (_, Type::Object) => Some(BOXING_COST),
        (Type::Array(_), Type::Sequence) => Some(2),
        (Type::Array(source), Type::Array(target))
            if source.is_reference() && target.is_reference() =>
        {
            implicit_cost(source, target)
        }
        (source, target) => {
            let (from_rank, to_rank) = (source.numeric_rank()?, target.numeric_rank()?);
            (from_rank < to_rank).then(|| to_rank - from_rank)
        }
    }
}

pub fn is_implicitly_convertible(from: &Type, to: &Type) -> bool {
    implicit_cost(from, to).is_some()
}

/// Whether a cast `(to)value` is accepted at compile time; the VM checks it.
pub fn explicit_allowed(from: &Type, to: &Type) -> bool {
    if is_implicitly_convertible(from, to) {
        return true;
    }
    match (from, to) {
        (Type::Void, _) | (_, Type::Void) => false,
        (Type::Object, _) => true,
        (Type::Nullable(inner), target) => explicit_allowed(inner, target),
        (source, Type::Nullable(target)) => explicit_allowed(source, target),
        (Type::Sequence, Type::Array(_)) => true,
        (Type::Array(source), Type::Array(target)) => explicit_allowed(source, target),
        (source, target) => source.numeric_rank().is_some() && target.numeric_rank().is_some(),
    }
}

/// Common type of two branches, preferring the one the other widens to.
pub fn unify_types(left: &Type, right: &Type) -> Option<Type> {
    if left == right {
        return Some(left.clone());
    }
    match (left, right) {
        (Type::Null, other) | (other, Type::Null) => Some(Type::nullable(other.clone())),
        _ => {
            let forward = implicit_cost(left, right);
            let backward = implicit_cost(right, left);
            match (forward, backward) {
                (Some(_), None) => Some(right.clone()),
                (None, Some(_)) => Some(left.clone()),
                (Some(a), Some(b)) if a <= b => Some(right.clone()),
                (Some(_), Some(_)) => Some(left.clone()),
                (None, None) => None,
            }
        }
    }
}

/// Parameter types and return type a compiled function must match.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Type,
}

impl Signature {
    pub fn new(params: Vec<Type>, ret: Type) -> Self {
        Self { params, ret }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_cost_follows_rank_distance() {
        assert_eq!(implicit_cost(&Type::Char, &Type::Int), Some(1));
        assert_eq!(implicit_cost(&Type::Int, &Type::Double), Some(3));
        assert_eq!(implicit_cost(&Type::Double, &Type::Int), None);
        assert_eq!(implicit_cost(&Type::Int, &Type::Object), Some(BOXING_COST));
        assert_eq!(
            implicit_cost(&Type::Int, &Type::nullable(Type::Long)),
            Some(2)
        );
    }

    #[test]
    fn narrowing_has_no_implicit_cost() {
        let ranked = [Type::Char, Type::Int, Type::Long, Type::Float, Type::Double];
        for (i, wide) in ranked.iter().enumerate() {
            for narrow in &ranked[..i] {
                assert_eq!(implicit_cost(wide, narrow), None, "{wide} -> {narrow}");
                assert!(explicit_allowed(wide, narrow), "({narrow}){wide}");
            }
        }
        assert_eq!(implicit_cost(&Type::Long, &Type::nullable(Type::Int)), None);
    }

    #[test]
    fn unify_picks_the_wider_branch() {
        assert_eq!(unify_types(&Type::Int, &Type::Double), Some(Type::Double));
        assert_eq!(unify_types(&Type::String, &Type::Object), Some(Type::Object));
        assert_eq!(
            unify_types(&Type::Null, &Type::Int),
            Some(Type::Nullable(Box::new(Type::Int)))
        );
        assert_eq!(unify_types(&Type::Bool, &Type::String), None);
    }

    #[test]
    fn display_uses_source_spelling() {
        assert_eq!(Type::array(Type::nullable(Type::Int)).to_string(), "int?[]");
        let signature = Signature::new(vec![Type::Int, Type::String], Type::Bool);
        assert_eq!(signature.to_string(), "(int, string) -> bool");
    }
}
