//! Compiled declarations ready to be invoked.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::types::{Signature, Type};
use crate::value::ValueType;
#[cfg(feature = "runtime")]
use crate::value::Value;
#[cfg(feature = "runtime")]
use crate::vm::{Vm, VmError, VmResult};
use crate::vm::Program;

/// A declaration compiled against a signature. Cloning shares the program.
#[derive(Clone)]
pub struct CompiledFunction {
    signature: Signature,
    program: Arc<Program>,
}

impl CompiledFunction {
    pub(crate) fn new(signature: Signature, program: Program) -> Self {
        Self {
            signature,
            program: Arc::new(program),
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn disassemble(&self) -> String {
        self.program.disassemble()
    }

    /// Runs the function on a fresh VM. Arguments must match the parameter
    /// types exactly; no implicit conversion happens at this boundary.
    #[cfg(feature = "runtime")]
    pub fn invoke(&self, args: &[Value]) -> VmResult<Value> {
        if args.len() != self.signature.params.len() {
            return Err(VmError::ArgumentCount {
                expected: self.signature.params.len(),
                got: args.len(),
            });
        }
        for (arg, param) in args.iter().zip(&self.signature.params) {
            if !arg.is_instance_of(param) {
                return Err(VmError::TypeMismatch {
                    expected: param.to_string(),
                    got: arg.type_name(),
                });
            }
        }
        Vm::new(&self.program, args.to_vec()).run()
    }
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFunction")
            .field("signature", &self.signature.to_string())
            .field("ops", &self.program.ops.len())
            .field("locals", &self.program.locals)
            .finish()
    }
}

/// Rust argument tuples that map onto a parameter list.
pub trait FunctionArgs {
    fn types() -> Vec<Type>;

    fn into_values(self) -> Vec<crate::value::Value>;
}

macro_rules! tuple_args {
    ($($name:ident),*) => {
        impl<$($name: ValueType),*> FunctionArgs for ($($name,)*) {
            fn types() -> Vec<Type> {
                vec![$($name::value_type()),*]
            }

            #[allow(non_snake_case)]
            fn into_values(self) -> Vec<crate::value::Value> {
                let ($($name,)*) = self;
                vec![$($name.into_value()),*]
            }
        }
    };
}

tuple_args!();
tuple_args!(A);
tuple_args!(A, B);
tuple_args!(A, B, C);
tuple_args!(A, B, C, D);

/// Signature derived from Rust types.
pub fn signature_of<Args: FunctionArgs, Ret: ValueType>() -> Signature {
    Signature::new(Args::types(), Ret::value_type())
}

/// A `CompiledFunction` whose signature was derived from `Args` and `Ret`.
pub struct TypedFunction<Args, Ret> {
    function: CompiledFunction,
    _marker: PhantomData<fn(Args) -> Ret>,
}

impl<Args, Ret> Clone for TypedFunction<Args, Ret> {
    fn clone(&self) -> Self {
        Self {
            function: self.function.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Args: FunctionArgs, Ret: ValueType> TypedFunction<Args, Ret> {
    pub(crate) fn new(function: CompiledFunction) -> Self {
        Self {
            function,
            _marker: PhantomData,
        }
    }

    pub fn function(&self) -> &CompiledFunction {
        &self.function
    }

    #[cfg(feature = "runtime")]
    pub fn call(&self, args: Args) -> VmResult<Ret> {
        let value = self.function.invoke(&args.into_values())?;
        Ret::from_value(value)
    }
}
