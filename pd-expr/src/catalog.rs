use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::types::Type;
use crate::value::Value;
use crate::vm::VmResult;

pub mod format;
mod standard;
mod text;

pub use text::{TEXT_BUILDER, TextBuilder};

/// Native implementation of a host member.
pub trait HostFunction: Send + Sync {
    fn call(&self, args: &[Value]) -> VmResult<Value>;
}

impl<F> HostFunction for F
where
    F: Fn(&[Value]) -> VmResult<Value> + Send + Sync,
{
    fn call(&self, args: &[Value]) -> VmResult<Value> {
        self(args)
    }
}

/// A named host function reference stored in a program's call table.
#[derive(Clone)]
pub struct Callable {
    name: Arc<str>,
    function: Arc<dyn HostFunction>,
}

impl Callable {
    pub fn new(name: impl Into<Arc<str>>, function: impl HostFunction + 'static) -> Self {
        Self {
            name: name.into(),
            function: Arc::new(function),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: &[Value]) -> VmResult<Value> {
        self.function.call(args)
    }

    pub(crate) fn same_as(&self, other: &Callable) -> bool {
        Arc::ptr_eq(&self.function, &other.function)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callable({})", self.name)
    }
}

/// A method or constructor overload. Instance methods receive the receiver
/// as argument 0; `params` does not include it.
#[derive(Clone, Debug)]
pub struct Method {
    pub name: Arc<str>,
    pub params: Vec<Type>,
    /// Element type of a trailing variable-arity parameter.
    pub rest: Option<Type>,
    pub ret: Type,
    pub function: Callable,
}

/// Setters receive `(receiver, value)` and return the stored value.
#[derive(Clone, Debug)]
pub struct Property {
    pub name: Arc<str>,
    pub ty: Type,
    pub getter: Callable,
    pub setter: Option<Callable>,
}

#[derive(Clone, Debug)]
pub enum Member {
    Method(Method),
    Property(Property),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberScope {
    Instance,
    Static,
}

/// Name and member lookup consulted by the parser and resolver.
pub trait TypeCatalog: Send + Sync {
    fn resolve_type(&self, name: &str, generic_args: &[Type]) -> Option<Type>;

    fn members(&self, owner: &Type, name: &str, scope: MemberScope) -> Vec<Member>;

    fn constructors(&self, owner: &Type) -> Vec<Method>;
}

/// A host type definition registered with a `StandardCatalog`.
#[derive(Clone, Debug)]
pub struct TypeDef {
    name: Arc<str>,
    ty: Type,
    constructors: Vec<Method>,
    members: Vec<(MemberScope, Member)>,
}

impl TypeDef {
    /// A new host type spelled `name` in source.
    pub fn new(name: &str) -> Self {
        Self::for_type(name, Type::named(name))
    }

    pub(crate) fn for_type(name: &str, ty: Type) -> Self {
        Self {
            name: Arc::from(name),
            ty,
            constructors: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn constructor<F>(mut self, params: Vec<Type>, function: F) -> Self
    where
        F: Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        let name = format!("{}..ctor", self.name);
        self.constructors.push(Method {
            name: Arc::from(name.as_str()),
            params,
            rest: None,
            ret: self.ty.clone(),
            function: Callable::new(name, function),
        });
        self
    }

    pub fn method<F>(self, name: &str, params: Vec<Type>, ret: Type, function: F) -> Self
    where
        F: Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.add_method(MemberScope::Instance, name, params, None, ret, function)
    }

    pub fn static_method<F>(self, name: &str, params: Vec<Type>, ret: Type, function: F) -> Self
    where
        F: Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.add_method(MemberScope::Static, name, params, None, ret, function)
    }

    /// Static method whose trailing arguments are packed into an array of `rest`.
    pub fn static_variadic<F>(
        self,
        name: &str,
        params: Vec<Type>,
        rest: Type,
        ret: Type,
        function: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.add_method(MemberScope::Static, name, params, Some(rest), ret, function)
    }

    pub fn property<F>(self, name: &str, ty: Type, getter: F) -> Self
    where
        F: Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.add_property(MemberScope::Instance, name, ty, getter)
    }

    pub fn static_property<F>(self, name: &str, ty: Type, getter: F) -> Self
    where
        F: Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.add_property(MemberScope::Static, name, ty, getter)
    }

    /// Instance property with a setter; the setter gets `(receiver, value)`.
    pub fn mutable_property<G, S>(mut self, name: &str, ty: Type, getter: G, setter: S) -> Self
    where
        G: Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static,
        S: Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        let qualified = format!("{}.{name}", self.name);
        self.members.push((
            MemberScope::Instance,
            Member::Property(Property {
                name: Arc::from(name),
                ty,
                getter: Callable::new(format!("{qualified}.get"), getter),
                setter: Some(Callable::new(format!("{qualified}.set"), setter)),
            }),
        ));
        self
    }

    fn add_method<F>(
        mut self,
        scope: MemberScope,
        name: &str,
        params: Vec<Type>,
        rest: Option<Type>,
        ret: Type,
        function: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        let qualified = format!("{}.{name}", self.name);
        self.members.push((
            scope,
            Member::Method(Method {
                name: Arc::from(name),
                params,
                rest,
                ret,
                function: Callable::new(qualified, function),
            }),
        ));
        self
    }

    fn add_property<F>(mut self, scope: MemberScope, name: &str, ty: Type, getter: F) -> Self
    where
        F: Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        let qualified = format!("{}.{name}", self.name);
        self.members.push((
            scope,
            Member::Property(Property {
                name: Arc::from(name),
                ty,
                getter: Callable::new(qualified, getter),
                setter: None,
            }),
        ));
        self
    }

    fn lookup(&self, name: &str, scope: MemberScope) -> Vec<Member> {
        self.members
            .iter()
            .filter(|(member_scope, member)| *member_scope == scope && member_name(member) == name)
            .map(|(_, member)| member.clone())
            .collect()
    }
}

fn member_name(member: &Member) -> &str {
    match member {
        Member::Method(method) => &method.name,
        Member::Property(property) => &property.name,
    }
}

/// Built-in catalog: primitive aliases, common generic collection names and a
/// small standard library. Embedders add their own types with `register`.
#[derive(Clone, Debug)]
pub struct StandardCatalog {
    aliases: HashMap<String, Type>,
    types: HashMap<Type, TypeDef>,
}

impl Default for StandardCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardCatalog {
    pub fn new() -> Self {
        let mut catalog = Self {
            aliases: HashMap::new(),
            types: HashMap::new(),
        };
        standard::install(&mut catalog);
        catalog
    }

    pub fn register(&mut self, def: TypeDef) {
        self.aliases.insert(def.name.to_string(), def.ty.clone());
        match self.types.get_mut(&def.ty) {
            Some(existing) => {
                existing.constructors.extend(def.constructors);
                existing.members.extend(def.members);
            }
            None => {
                self.types.insert(def.ty.clone(), def);
            }
        }
    }

    pub fn with_type(mut self, def: TypeDef) -> Self {
        self.register(def);
        self
    }

    pub(crate) fn alias(&mut self, name: &str, ty: Type) {
        self.aliases.insert(name.to_string(), ty);
    }
}

impl TypeCatalog for StandardCatalog {
    fn resolve_type(&self, name: &str, generic_args: &[Type]) -> Option<Type> {
        match (name, generic_args) {
            ("IEnumerable" | "List" | "IList" | "IReadOnlyList" | "ICollection", [element]) => {
                Some(Type::array(element.clone()))
            }
            ("Nullable", [inner]) => Some(Type::nullable(inner.clone())),
            (_, []) => self.aliases.get(name).cloned(),
            _ => None,
        }
    }

    fn members(&self, owner: &Type, name: &str, scope: MemberScope) -> Vec<Member> {
        let mut found: Vec<Member> = self
            .types
            .get(owner)
            .map(|def| def.lookup(name, scope))
            .unwrap_or_default();
        if scope == MemberScope::Instance {
            found.extend(standard::structural_members(owner, name));
            let has_plain_to_string = found
                .iter()
                .any(|member| matches!(member, Member::Method(method) if method.params.is_empty()));
            if name == "ToString" && !has_plain_to_string {
                found.push(standard::to_string_member());
            }
        }
        found
    }

    fn constructors(&self, owner: &Type) -> Vec<Method> {
        self.types
            .get(owner)
            .map(|def| def.constructors.clone())
            .unwrap_or_default()
    }
}
