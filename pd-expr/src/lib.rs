pub mod assembler;
pub mod catalog;
pub mod compiler;
pub mod engine;
pub mod function;
#[cfg(feature = "cli")]
pub mod logging;
pub mod types;
pub mod value;
pub mod vm;

pub use assembler::{Assembler, AssemblerError};
pub use catalog::{
    Callable, HostFunction, Member, MemberScope, Method, Property, StandardCatalog, TEXT_BUILDER,
    TextBuilder, TypeCatalog, TypeDef,
};
pub use compiler::diagnostics::render_source_error;
#[cfg(feature = "runtime")]
pub use compiler::diagnostics::render_vm_error;
pub use compiler::dialect::{Dialect, DialectBuilder, DialectError};
pub use compiler::{
    CompileError, ParseError, ParseErrorKind, SourceError, SourceFlavor, compile_source,
    lower_function,
};
pub use engine::{ConfigError, Engine, EngineOptions};
#[cfg(feature = "cli")]
pub use logging::init as init_logging;
pub use function::{CompiledFunction, FunctionArgs, TypedFunction, signature_of};
pub use types::{Signature, Type};
pub use value::{HostObject, Value, ValueType};
#[cfg(feature = "runtime")]
pub use vm::Vm;
pub use vm::{BinaryOp, Op, OperandKind, Program, UnaryOp, VmError, VmResult};
