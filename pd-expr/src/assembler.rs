use std::collections::HashMap;

use crate::catalog::Callable;
use crate::types::Type;
use crate::value::Value;
use crate::vm::{BinaryOp, Op, OperandKind, Program, UnaryOp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    DuplicateLabel(String),
    UnknownLabel(String),
}

impl std::fmt::Display for AssemblerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssemblerError::DuplicateLabel(label) => write!(f, "duplicate label '{label}'"),
            AssemblerError::UnknownLabel(label) => write!(f, "unknown label '{label}'"),
        }
    }
}

impl std::error::Error for AssemblerError {}

struct Fixup {
    at: usize,
    label: String,
}

/// Builds a `Program`, tracking the operand stack height statically so that
/// jumps out of nested constructs can restore it.
pub struct Assembler {
    ops: Vec<Op>,
    constants: Vec<Value>,
    int_constants: HashMap<i32, u32>,
    long_constants: HashMap<i64, u32>,
    double_constants: HashMap<u64, u32>,
    bool_constants: HashMap<bool, u32>,
    string_constants: HashMap<String, u32>,
    functions: Vec<Callable>,
    labels: HashMap<String, u32>,
    fixups: Vec<Fixup>,
    depth: usize,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            constants: Vec::new(),
            int_constants: HashMap::new(),
            long_constants: HashMap::new(),
            double_constants: HashMap::new(),
            bool_constants: HashMap::new(),
            string_constants: HashMap::new(),
            functions: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            depth: 0,
        }
    }

    pub fn position(&self) -> u32 {
        self.ops.len() as u32
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Resets the tracked height at a merge point.
    pub fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    pub fn label(&mut self, name: &str) -> Result<(), AssemblerError> {
        if self.labels.contains_key(name) {
            return Err(AssemblerError::DuplicateLabel(name.to_string()));
        }
        let pos = self.position();
        self.labels.insert(name.to_string(), pos);
        Ok(())
    }

    pub fn add_constant(&mut self, value: Value) -> u32 {
        fn intern<K: std::hash::Hash + Eq>(
            constants: &mut Vec<Value>,
            table: &mut HashMap<K, u32>,
            key: K,
            value: Value,
        ) -> u32 {
            if let Some(index) = table.get(&key).copied() {
                return index;
            }
            let index = constants.len() as u32;
            constants.push(value);
            table.insert(key, index);
            index
        }

        match value {
            Value::Int(number) => {
                intern(&mut self.constants, &mut self.int_constants, number, value)
            }
            Value::Long(number) => {
                intern(&mut self.constants, &mut self.long_constants, number, value)
            }
            Value::Double(number) => intern(
                &mut self.constants,
                &mut self.double_constants,
                number.to_bits(),
                value,
            ),
            Value::Bool(flag) => intern(&mut self.constants, &mut self.bool_constants, flag, value),
            Value::String(ref text) => {
                let key = text.to_string();
                intern(&mut self.constants, &mut self.string_constants, key, value)
            }
            other => {
                let index = self.constants.len() as u32;
                self.constants.push(other);
                index
            }
        }
    }

    pub fn add_function(&mut self, callable: &Callable) -> u32 {
        if let Some(index) = self.functions.iter().position(|known| known.same_as(callable)) {
            return index as u32;
        }
        self.functions.push(callable.clone());
        (self.functions.len() - 1) as u32
    }

    pub fn push_const(&mut self, value: Value) -> u32 {
        let index = self.add_constant(value);
        self.emit(Op::Ldc(index));
        index
    }

    pub fn finish_program(mut self, locals: usize) -> Result<Program, AssemblerError> {
        for fixup in self.fixups.drain(..) {
            let target = self
                .labels
                .get(&fixup.label)
                .copied()
                .ok_or_else(|| AssemblerError::UnknownLabel(fixup.label.clone()))?;
            match &mut self.ops[fixup.at] {
                Op::Br(slot) | Op::Brfalse(slot) | Op::Brtrue(slot) | Op::Brnull(slot) => {
                    *slot = target;
                }
                _ => return Err(AssemblerError::UnknownLabel(fixup.label)),
            }
        }
        Ok(Program::new(self.ops, self.constants, self.functions, locals))
    }

    fn emit(&mut self, op: Op) {
        let effect = op.stack_effect();
        self.depth = self.depth.saturating_add_signed(effect);
        self.ops.push(op);
    }

    fn emit_branch(&mut self, op: Op, label: &str) {
        self.fixups.push(Fixup {
            at: self.ops.len(),
            label: label.to_string(),
        });
        self.emit(op);
    }

    pub fn nop(&mut self) {
        self.emit(Op::Nop);
    }

    pub fn ret(&mut self) {
        self.emit(Op::Ret);
    }

    pub fn ldloc(&mut self, slot: u16) {
        self.emit(Op::Ldloc(slot));
    }

    pub fn stloc(&mut self, slot: u16) {
        self.emit(Op::Stloc(slot));
    }

    pub fn dup(&mut self) {
        self.emit(Op::Dup);
    }

    pub fn pop(&mut self) {
        self.emit(Op::Pop);
    }

    pub fn unary(&mut self, op: UnaryOp, kind: OperandKind) {
        self.emit(Op::Unary(op, kind));
    }

    pub fn binary(&mut self, op: BinaryOp, kind: OperandKind) {
        self.emit(Op::Binary(op, kind));
    }

    pub fn concat(&mut self, count: u16) {
        self.emit(Op::Concat(count));
    }

    pub fn convert(&mut self, ty: Type) {
        self.emit(Op::Convert(ty));
    }

    pub fn type_is(&mut self, ty: Type) {
        self.emit(Op::TypeIs(ty));
    }

    pub fn type_as(&mut self, ty: Type) {
        self.emit(Op::TypeAs(ty));
    }

    pub fn call(&mut self, function: u32, argc: u16) {
        self.emit(Op::Call { function, argc });
    }

    pub fn index(&mut self) {
        self.emit(Op::Index);
    }

    pub fn len(&mut self) {
        self.emit(Op::Len);
    }

    pub fn new_array(&mut self, count: u16) {
        self.emit(Op::NewArray(count));
    }

    pub fn br_label(&mut self, label: &str) {
        self.emit_branch(Op::Br(0), label);
    }

    pub fn brfalse_label(&mut self, label: &str) {
        self.emit_branch(Op::Brfalse(0), label);
    }

    pub fn brtrue_label(&mut self, label: &str) {
        self.emit_branch(Op::Brtrue(0), label);
    }

    pub fn brnull_label(&mut self, label: &str) {
        self.emit_branch(Op::Brnull(0), label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_deduplicated() {
        let mut asm = Assembler::new();
        let a = asm.add_constant(Value::Int(7));
        let b = asm.add_constant(Value::from("x"));
        let c = asm.add_constant(Value::Int(7));
        let d = asm.add_constant(Value::from("x"));
        assert_eq!(a, c);
        assert_eq!(b, d);
        assert_ne!(a, b);
    }

    #[test]
    fn depth_tracks_stack_effects() {
        let mut asm = Assembler::new();
        asm.push_const(Value::Int(1));
        asm.push_const(Value::Int(2));
        assert_eq!(asm.depth(), 2);
        asm.binary(BinaryOp::Add, OperandKind::Int);
        assert_eq!(asm.depth(), 1);
        asm.ret();
        assert_eq!(asm.depth(), 0);
    }

    #[test]
    fn unknown_label_is_reported() {
        let mut asm = Assembler::new();
        asm.br_label("missing");
        let err = asm.finish_program(0).expect_err("label was never placed");
        assert_eq!(err, AssemblerError::UnknownLabel("missing".to_string()));
    }

    #[test]
    fn duplicate_label_is_rejected() {
        let mut asm = Assembler::new();
        asm.label("top").expect("first label should be accepted");
        assert_eq!(
            asm.label("top"),
            Err(AssemblerError::DuplicateLabel("top".to_string()))
        );
    }
}
