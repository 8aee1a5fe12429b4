use std::fmt;
use std::sync::Arc;

use crate::catalog::Callable;
use crate::types::Type;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum VmError {
    StackUnderflow,
    DivisionByZero,
    NullReference,
    InvalidCast {
        from: String,
        to: Type,
    },
    IndexOutOfRange {
        index: i64,
        len: usize,
    },
    ArgumentCount {
        expected: usize,
        got: usize,
    },
    TypeMismatch {
        expected: String,
        got: String,
    },
    InvalidConstant(u32),
    InvalidLocal(u16),
    InvalidCall(u32),
    BytecodeBounds,
    Host(String),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::StackUnderflow => write!(f, "stack underflow"),
            VmError::DivisionByZero => write!(f, "division by zero"),
            VmError::NullReference => write!(f, "null reference"),
            VmError::InvalidCast { from, to } => {
                write!(f, "invalid cast from '{from}' to '{to}'")
            }
            VmError::IndexOutOfRange { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
            VmError::ArgumentCount { expected, got } => {
                write!(f, "expected {expected} argument(s), got {got}")
            }
            VmError::TypeMismatch { expected, got } => {
                write!(f, "type mismatch: expected {expected}, got {got}")
            }
            VmError::InvalidConstant(index) => write!(f, "invalid constant {index}"),
            VmError::InvalidLocal(index) => write!(f, "invalid local {index}"),
            VmError::InvalidCall(index) => write!(f, "invalid call target {index}"),
            VmError::BytecodeBounds => write!(f, "ran past the end of the program"),
            VmError::Host(message) => write!(f, "host error: {message}"),
        }
    }
}

impl std::error::Error for VmError {}

pub type VmResult<T> = Result<T, VmError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    /// Name of the static member a host type can define to overload this operator.
    pub fn method_name(self) -> Option<&'static str> {
        Some(match self {
            BinaryOp::Add => "op_Addition",
            BinaryOp::Sub => "op_Subtraction",
            BinaryOp::Mul => "op_Multiply",
            BinaryOp::Div => "op_Division",
            BinaryOp::Rem => "op_Modulus",
            BinaryOp::Shl => "op_LeftShift",
            BinaryOp::Shr => "op_RightShift",
            BinaryOp::BitAnd => "op_BitwiseAnd",
            BinaryOp::BitOr => "op_BitwiseOr",
            BinaryOp::BitXor => "op_ExclusiveOr",
            BinaryOp::Eq => "op_Equality",
            BinaryOp::Ne => "op_Inequality",
            BinaryOp::Lt => "op_LessThan",
            BinaryOp::Le => "op_LessThanOrEqual",
            BinaryOp::Gt => "op_GreaterThan",
            BinaryOp::Ge => "op_GreaterThanOrEqual",
            BinaryOp::Pow => return None,
        })
    }

    pub fn is_right_associative(self) -> bool {
        matches!(self, BinaryOp::Pow)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// Operand representation an arithmetic or comparison op was resolved for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperandKind {
    Bool,
    Int,
    Long,
    Float,
    Double,
    String,
    Ref,
}

#[derive(Clone, Debug)]
pub enum Op {
    Nop,
    Ret,
    Ldc(u32),
    Ldloc(u16),
    Stloc(u16),
    Dup,
    Pop,
    Unary(UnaryOp, OperandKind),
    Binary(BinaryOp, OperandKind),
    Concat(u16),
    Convert(Type),
    TypeIs(Type),
    TypeAs(Type),
    Call { function: u32, argc: u16 },
    Index,
    Len,
    NewArray(u16),
    Br(u32),
    Brfalse(u32),
    Brtrue(u32),
    Brnull(u32),
}

impl Op {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Nop => "nop",
            Op::Ret => "ret",
            Op::Ldc(_) => "ldc",
            Op::Ldloc(_) => "ldloc",
            Op::Stloc(_) => "stloc",
            Op::Dup => "dup",
            Op::Pop => "pop",
            Op::Unary(..) => "unary",
            Op::Binary(..) => "binary",
            Op::Concat(_) => "concat",
            Op::Convert(_) => "conv",
            Op::TypeIs(_) => "isinst",
            Op::TypeAs(_) => "as",
            Op::Call { .. } => "call",
            Op::Index => "ldelem",
            Op::Len => "ldlen",
            Op::NewArray(_) => "newarr",
            Op::Br(_) => "br",
            Op::Brfalse(_) => "brfalse",
            Op::Brtrue(_) => "brtrue",
            Op::Brnull(_) => "brnull",
        }
    }

    /// Net change in operand stack height.
    pub(crate) fn stack_effect(&self) -> isize {
        match self {
            Op::Nop | Op::Br(_) | Op::Unary(..) | Op::Convert(_) | Op::TypeIs(_) | Op::TypeAs(_) => 0,
            Op::Len => 0,
            Op::Ldc(_) | Op::Ldloc(_) | Op::Dup => 1,
            Op::Ret | Op::Stloc(_) | Op::Pop | Op::Brfalse(_) | Op::Brtrue(_) | Op::Brnull(_) => -1,
            Op::Binary(..) | Op::Index => -1,
            Op::Concat(n) | Op::NewArray(n) => 1 - *n as isize,
            Op::Call { argc, .. } => 1 - *argc as isize,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Program {
    pub ops: Vec<Op>,
    pub constants: Vec<Value>,
    pub functions: Vec<Callable>,
    pub locals: usize,
}

impl Program {
    pub fn new(ops: Vec<Op>, constants: Vec<Value>, functions: Vec<Callable>, locals: usize) -> Self {
        Self {
            ops,
            constants,
            functions,
            locals,
        }
    }

    pub fn disassemble(&self) -> String {
        let mut out = format!("; locals: {}\n", self.locals);
        for (offset, op) in self.ops.iter().enumerate() {
            let operand = match op {
                Op::Ldc(index) => match self.constants.get(*index as usize) {
                    Some(value) => format!("{index} ; {value:?}"),
                    None => index.to_string(),
                },
                Op::Ldloc(slot) | Op::Stloc(slot) => slot.to_string(),
                Op::Unary(op, kind) => format!("{} {kind:?}", op.symbol()),
                Op::Binary(op, kind) => format!("{} {kind:?}", op.symbol()),
                Op::Concat(n) | Op::NewArray(n) => n.to_string(),
                Op::Convert(ty) | Op::TypeIs(ty) | Op::TypeAs(ty) => ty.to_string(),
                Op::Call { function, argc } => match self.functions.get(*function as usize) {
                    Some(callable) => format!("{} ({argc})", callable.name()),
                    None => format!("{function} ({argc})"),
                },
                Op::Br(target) | Op::Brfalse(target) | Op::Brtrue(target) | Op::Brnull(target) => {
                    format!("{target:04}")
                }
                _ => String::new(),
            };
            out.push_str(&format!("{offset:04} {:<8} {operand}", op.mnemonic()).trim_end().to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(feature = "runtime")]
pub struct Vm<'p> {
    program: &'p Program,
    ip: usize,
    stack: Vec<Value>,
    locals: Vec<Value>,
}

#[cfg(feature = "runtime")]
impl<'p> Vm<'p> {
    pub fn new(program: &'p Program, args: Vec<Value>) -> Self {
        let mut locals = args;
        if locals.len() < program.locals {
            locals.resize(program.locals, Value::Null);
        }
        Self {
            program,
            ip: 0,
            stack: Vec::new(),
            locals,
        }
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn run(&mut self) -> VmResult<Value> {
        loop {
            let op = self
                .program
                .ops
                .get(self.ip)
                .ok_or(VmError::BytecodeBounds)?;
            self.ip += 1;
            match op {
                Op::Nop => {}
                Op::Ret => return Ok(self.stack.pop().unwrap_or(Value::Null)),
                Op::Ldc(index) => {
                    let value = self
                        .program
                        .constants
                        .get(*index as usize)
                        .cloned()
                        .ok_or(VmError::InvalidConstant(*index))?;
                    self.stack.push(value);
                }
                Op::Ldloc(slot) => {
                    let value = self
                        .locals
                        .get(*slot as usize)
                        .cloned()
                        .ok_or(VmError::InvalidLocal(*slot))?;
                    self.stack.push(value);
                }
                Op::Stloc(slot) => {
                    let value = self.pop()?;
                    let local = self
                        .locals
                        .get_mut(*slot as usize)
                        .ok_or(VmError::InvalidLocal(*slot))?;
                    *local = value;
                }
                Op::Dup => {
                    let value = self.stack.last().cloned().ok_or(VmError::StackUnderflow)?;
                    self.stack.push(value);
                }
                Op::Pop => {
                    self.pop()?;
                }
                Op::Unary(op, kind) => {
                    let operand = self.pop()?;
                    self.stack.push(eval_unary(*op, *kind, &operand)?);
                }
                Op::Binary(op, kind) => {
                    let rhs = self.pop()?;
                    let lhs = self.pop()?;
                    self.stack.push(eval_binary(*op, *kind, &lhs, &rhs)?);
                }
                Op::Concat(count) => {
                    let parts = self.pop_many(*count as usize)?;
                    let mut text = String::new();
                    for part in &parts {
                        text.push_str(&part.to_text());
                    }
                    self.stack.push(Value::from(text));
                }
                Op::Convert(ty) => {
                    let value = self.pop()?;
                    self.stack.push(value.convert_to(ty)?);
                }
                Op::TypeIs(ty) => {
                    let value = self.pop()?;
                    let matches = !matches!(value, Value::Null) && value.is_instance_of(ty);
                    self.stack.push(Value::Bool(matches));
                }
                Op::TypeAs(ty) => {
                    let value = self.pop()?;
                    if value.is_instance_of(ty) {
                        self.stack.push(value);
                    } else {
                        self.stack.push(Value::Null);
                    }
                }
                Op::Call { function, argc } => {
                    let callable = self
                        .program
                        .functions
                        .get(*function as usize)
                        .ok_or(VmError::InvalidCall(*function))?;
                    let args = self.pop_many(*argc as usize)?;
                    let result = callable.call(&args)?;
                    self.stack.push(result);
                }
                Op::Index => {
                    let index = self.pop()?.as_int()?;
                    let target = self.pop()?;
                    self.stack.push(index_value(&target, index)?);
                }
                Op::Len => {
                    let target = self.pop()?;
                    let len = match &target {
                        Value::Array(items) => items.len(),
                        Value::String(text) => text.chars().count(),
                        Value::Null => return Err(VmError::NullReference),
                        other => {
                            return Err(VmError::TypeMismatch {
                                expected: "sequence".to_string(),
                                got: other.type_name(),
                            });
                        }
                    };
                    self.stack.push(Value::Int(len as i32));
                }
                Op::NewArray(count) => {
                    let items = self.pop_many(*count as usize)?;
                    self.stack.push(Value::Array(Arc::from(items)));
                }
                Op::Br(target) => {
                    self.ip = *target as usize;
                }
                Op::Brfalse(target) => {
                    if !self.pop()?.as_bool()? {
                        self.ip = *target as usize;
                    }
                }
                Op::Brtrue(target) => {
                    if self.pop()?.as_bool()? {
                        self.ip = *target as usize;
                    }
                }
                Op::Brnull(target) => {
                    if matches!(self.pop()?, Value::Null) {
                        self.ip = *target as usize;
                    }
                }
            }
        }
    }

    fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn pop_many(&mut self, count: usize) -> VmResult<Vec<Value>> {
        if self.stack.len() < count {
            return Err(VmError::StackUnderflow);
        }
        let at = self.stack.len() - count;
        Ok(self.stack.split_off(at))
    }
}

#[cfg(feature = "runtime")]
fn index_value(target: &Value, index: i32) -> VmResult<Value> {
    match target {
        Value::Array(items) => usize::try_from(index)
            .ok()
            .and_then(|at| items.get(at))
            .cloned()
            .ok_or(VmError::IndexOutOfRange {
                index: index as i64,
                len: items.len(),
            }),
        Value::String(text) => usize::try_from(index)
            .ok()
            .and_then(|at| text.chars().nth(at))
            .map(Value::Char)
            .ok_or_else(|| VmError::IndexOutOfRange {
                index: index as i64,
                len: text.chars().count(),
            }),
        Value::Null => Err(VmError::NullReference),
        other => Err(VmError::TypeMismatch {
            expected: "indexable value".to_string(),
            got: other.type_name(),
        }),
    }
}

pub(crate) fn eval_unary(op: UnaryOp, kind: OperandKind, operand: &Value) -> VmResult<Value> {
    Ok(match (op, kind) {
        (UnaryOp::Neg, OperandKind::Int) => Value::Int(operand.as_int()?.wrapping_neg()),
        (UnaryOp::Neg, OperandKind::Long) => Value::Long(operand.as_long()?.wrapping_neg()),
        (UnaryOp::Neg, OperandKind::Float) => Value::Float(-operand.as_float()?),
        (UnaryOp::Neg, OperandKind::Double) => Value::Double(-operand.as_double()?),
        (UnaryOp::Not, OperandKind::Bool) => Value::Bool(!operand.as_bool()?),
        (UnaryOp::BitNot, OperandKind::Int) => Value::Int(!operand.as_int()?),
        (UnaryOp::BitNot, OperandKind::Long) => Value::Long(!operand.as_long()?),
        (op, kind) => {
            return Err(VmError::TypeMismatch {
                expected: format!("operand valid for '{}'", op.symbol()),
                got: format!("{kind:?}"),
            });
        }
    })
}

pub(crate) fn eval_binary(
    op: BinaryOp,
    kind: OperandKind,
    lhs: &Value,
    rhs: &Value,
) -> VmResult<Value> {
    match kind {
        OperandKind::Int => {
            let (a, b) = (lhs.as_int()?, rhs.as_int()?);
            Ok(match op {
                BinaryOp::Add => Value::Int(a.wrapping_add(b)),
                BinaryOp::Sub => Value::Int(a.wrapping_sub(b)),
                BinaryOp::Mul => Value::Int(a.wrapping_mul(b)),
                BinaryOp::Div => {
                    if b == 0 {
                        return Err(VmError::DivisionByZero);
                    }
                    Value::Int(a.wrapping_div(b))
                }
                BinaryOp::Rem => {
                    if b == 0 {
                        return Err(VmError::DivisionByZero);
                    }
                    Value::Int(a.wrapping_rem(b))
                }
                BinaryOp::Shl => Value::Int(a.wrapping_shl(b as u32 & 31)),
                BinaryOp::Shr => Value::Int(a.wrapping_shr(b as u32 & 31)),
                BinaryOp::BitAnd => Value::Int(a & b),
                BinaryOp::BitOr => Value::Int(a | b),
                BinaryOp::BitXor => Value::Int(a ^ b),
                op if op.is_comparison() => Value::Bool(compare(op, a.cmp(&b))),
                op => return Err(unsupported(op, kind)),
            })
        }
        OperandKind::Long => {
            let (a, b) = (lhs.as_long()?, rhs.as_long()?);
            Ok(match op {
                BinaryOp::Add => Value::Long(a.wrapping_add(b)),
                BinaryOp::Sub => Value::Long(a.wrapping_sub(b)),
                BinaryOp::Mul => Value::Long(a.wrapping_mul(b)),
                BinaryOp::Div => {
                    if b == 0 {
                        return Err(VmError::DivisionByZero);
                    }
                    Value::Long(a.wrapping_div(b))
                }
                BinaryOp::Rem => {
                    if b == 0 {
                        return Err(VmError::DivisionByZero);
                    }
                    Value::Long(a.wrapping_rem(b))
                }
                BinaryOp::Shl => Value::Long(a.wrapping_shl(rhs.as_int()? as u32 & 63)),
                BinaryOp::Shr => Value::Long(a.wrapping_shr(rhs.as_int()? as u32 & 63)),
                BinaryOp::BitAnd => Value::Long(a & b),
                BinaryOp::BitOr => Value::Long(a | b),
                BinaryOp::BitXor => Value::Long(a ^ b),
                op if op.is_comparison() => Value::Bool(compare(op, a.cmp(&b))),
                op => return Err(unsupported(op, kind)),
            })
        }
        OperandKind::Float => {
            let (a, b) = (lhs.as_float()?, rhs.as_float()?);
            Ok(match op {
                BinaryOp::Add => Value::Float(a + b),
                BinaryOp::Sub => Value::Float(a - b),
                BinaryOp::Mul => Value::Float(a * b),
                BinaryOp::Div => Value::Float(a / b),
                BinaryOp::Rem => Value::Float(a % b),
                BinaryOp::Pow => Value::Float(a.powf(b)),
                op if op.is_comparison() => Value::Bool(compare_partial(op, a.partial_cmp(&b))),
                op => return Err(unsupported(op, kind)),
            })
        }
        OperandKind::Double => {
            let (a, b) = (lhs.as_double()?, rhs.as_double()?);
            Ok(match op {
                BinaryOp::Add => Value::Double(a + b),
                BinaryOp::Sub => Value::Double(a - b),
                BinaryOp::Mul => Value::Double(a * b),
                BinaryOp::Div => Value::Double(a / b),
                BinaryOp::Rem => Value::Double(a % b),
                BinaryOp::Pow => Value::Double(a.powf(b)),
                op if op.is_comparison() => Value::Bool(compare_partial(op, a.partial_cmp(&b))),
                op => return Err(unsupported(op, kind)),
            })
        }
        OperandKind::Bool => {
            let (a, b) = (lhs.as_bool()?, rhs.as_bool()?);
            Ok(match op {
                BinaryOp::BitAnd => Value::Bool(a & b),
                BinaryOp::BitOr => Value::Bool(a | b),
                BinaryOp::BitXor | BinaryOp::Ne => Value::Bool(a ^ b),
                BinaryOp::Eq => Value::Bool(a == b),
                op => return Err(unsupported(op, kind)),
            })
        }
        OperandKind::String | OperandKind::Ref => match op {
            BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
            BinaryOp::Ne => Ok(Value::Bool(lhs != rhs)),
            op => Err(unsupported(op, kind)),
        },
    }
}

fn compare(op: BinaryOp, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        BinaryOp::Eq => ordering == Equal,
        BinaryOp::Ne => ordering != Equal,
        BinaryOp::Lt => ordering == Less,
        BinaryOp::Le => ordering != Greater,
        BinaryOp::Gt => ordering == Greater,
        BinaryOp::Ge => ordering != Less,
        _ => false,
    }
}

fn compare_partial(op: BinaryOp, ordering: Option<std::cmp::Ordering>) -> bool {
    match ordering {
        Some(ordering) => compare(op, ordering),
        // NaN compares unequal to everything, itself included.
        None => op == BinaryOp::Ne,
    }
}

fn unsupported(op: BinaryOp, kind: OperandKind) -> VmError {
    VmError::TypeMismatch {
        expected: format!("operands valid for '{}'", op.symbol()),
        got: format!("{kind:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_wraps_instead_of_panicking() {
        let result = eval_binary(
            BinaryOp::Add,
            OperandKind::Int,
            &Value::Int(i32::MAX),
            &Value::Int(1),
        )
        .expect("add should succeed");
        assert_eq!(result, Value::Int(i32::MIN));
    }

    #[test]
    fn integer_division_by_zero_is_an_error() {
        let err = eval_binary(BinaryOp::Rem, OperandKind::Long, &Value::Long(1), &Value::Long(0))
            .expect_err("remainder by zero should fail");
        assert_eq!(err, VmError::DivisionByZero);
    }

    #[test]
    fn nan_is_unordered() {
        let nan = Value::Double(f64::NAN);
        let lt = eval_binary(BinaryOp::Lt, OperandKind::Double, &nan, &Value::Double(1.0))
            .expect("compare should succeed");
        let ne = eval_binary(BinaryOp::Ne, OperandKind::Double, &nan, &nan)
            .expect("compare should succeed");
        assert_eq!(lt, Value::Bool(false));
        assert_eq!(ne, Value::Bool(true));
    }

    #[test]
    fn vm_runs_branching_program() {
        // if (arg0 > 1) 10 else 20
        let program = Program::new(
            vec![
                Op::Ldloc(0),
                Op::Ldc(0),
                Op::Binary(BinaryOp::Gt, OperandKind::Int),
                Op::Brfalse(6),
                Op::Ldc(1),
                Op::Ret,
                Op::Ldc(2),
                Op::Ret,
            ],
            vec![Value::Int(1), Value::Int(10), Value::Int(20)],
            Vec::new(),
            1,
        );
        let high = Vm::new(&program, vec![Value::Int(5)]).run().expect("vm should run");
        let low = Vm::new(&program, vec![Value::Int(0)]).run().expect("vm should run");
        assert_eq!(high, Value::Int(10));
        assert_eq!(low, Value::Int(20));
    }

    #[test]
    fn running_off_the_end_is_reported() {
        let program = Program::new(vec![Op::Nop], Vec::new(), Vec::new(), 0);
        let err = Vm::new(&program, Vec::new())
            .run()
            .expect_err("program without ret should fail");
        assert_eq!(err, VmError::BytecodeBounds);
    }
}
