use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::assembler::{Assembler, AssemblerError};
use crate::catalog::TypeCatalog;
use crate::types::{Signature, Type};
use crate::value::Value;
use crate::vm::Program;

pub mod builders;
pub mod dialect;
pub mod diagnostics;
pub mod frontends;
pub mod interpolation;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod scope;
pub mod source_map;
pub mod statements;

use ir::{AssignTarget, Expr, ExprKind, LabelId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    /// Malformed literal, comment or character.
    Lexical,
    /// Identifier, type or member that does not exist.
    UnknownSymbol,
    /// A known token in a position where it is not allowed.
    WrongSymbol,
    /// Closing bracket that does not match the innermost open one.
    UnmatchedScope,
    /// No applicable or no single best overload.
    Resolution,
    /// Types that do not convert or do not fit the construct.
    Type,
}

impl ParseErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ParseErrorKind::Lexical => "E_LEX",
            ParseErrorKind::UnknownSymbol => "E_UNKNOWN_SYMBOL",
            ParseErrorKind::WrongSymbol => "E_WRONG_SYMBOL",
            ParseErrorKind::UnmatchedScope => "E_UNMATCHED_SCOPE",
            ParseErrorKind::Resolution => "E_RESOLUTION",
            ParseErrorKind::Type => "E_TYPE",
        }
    }
}

/// Positioned compile-time diagnostic; `offset` is a byte offset into the
/// declaration text and `token` the offending token's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub token: String,
    pub offset: usize,
}

pub type ParseResult<T> = Result<T, ParseError>;

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        token: impl Into<String>,
        offset: usize,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            token: token.into(),
            offset,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// 1-based line and column of the error within `source`.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        source_map::SourceText::new("", source)
            .line_col(self.offset.min(source.len()))
            .unwrap_or((1, 1))
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (offset {})", self.code(), self.message, self.offset)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug)]
pub enum CompileError {
    Assembler(AssemblerError),
    /// A type name reached code generation without a member access.
    UnexpectedTypeName,
    UnknownJumpTarget(LabelId),
    TooManyOperands(usize),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Assembler(err) => write!(f, "{err}"),
            CompileError::UnexpectedTypeName => write!(f, "type name used as a value"),
            CompileError::UnknownJumpTarget(label) => write!(f, "jump to unknown target {label}"),
            CompileError::TooManyOperands(count) => {
                write!(f, "{count} operands exceed the per-op limit")
            }
        }
    }
}

impl std::error::Error for CompileError {}

impl From<AssemblerError> for CompileError {
    fn from(value: AssemblerError) -> Self {
        CompileError::Assembler(value)
    }
}

#[derive(Debug)]
pub enum SourceError {
    Parse(ParseError),
    Compile(CompileError),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Parse(err) => write!(f, "{err}"),
            SourceError::Compile(err) => write!(f, "compile error: {err}"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::Parse(err) => Some(err),
            SourceError::Compile(err) => Some(err),
        }
    }
}

impl From<ParseError> for SourceError {
    fn from(value: ParseError) -> Self {
        SourceError::Parse(value)
    }
}

impl From<CompileError> for SourceError {
    fn from(value: CompileError) -> Self {
        SourceError::Compile(value)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SourceFlavor {
    #[default]
    CSharp,
    Formula,
}

impl SourceFlavor {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cs" | "csharp" | "c#" => Some(Self::CSharp),
            "formula" | "excel" | "xl" => Some(Self::Formula),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SourceFlavor::CSharp => "csharp",
            SourceFlavor::Formula => "formula",
        }
    }
}

/// Parses a declaration into typed IR. With no signature, parameter types
/// must be written and the return type is inferred from the body.
pub fn lower_function(
    source: &str,
    dialect: &dialect::Dialect,
    catalog: &dyn TypeCatalog,
    signature: Option<&Signature>,
    max_nesting_depth: Option<usize>,
) -> ParseResult<ir::Function> {
    let mut parser = parser::Parser::new(source, dialect, catalog, max_nesting_depth);
    parser.parse_function(signature)
}

/// Lowers and assembles a declaration in one step.
pub fn compile_source(
    source: &str,
    dialect: &dialect::Dialect,
    catalog: &dyn TypeCatalog,
    signature: Option<&Signature>,
    max_nesting_depth: Option<usize>,
) -> Result<(Signature, Program), SourceError> {
    let function = lower_function(source, dialect, catalog, signature, max_nesting_depth)?;
    let program = Compiler::new().compile_function(&function)?;
    debug!(
        dialect = dialect.name(),
        signature = %function.signature,
        ops = program.ops.len(),
        locals = program.locals,
        "assembled declaration"
    );
    Ok((function.signature, program))
}

/// Walks typed IR and emits ops. `compile_expr` leaves exactly one value on
/// the stack for non-void nodes and none for void ones.
pub struct Compiler {
    assembler: Assembler,
    next_label_id: u32,
    jump_depths: HashMap<LabelId, usize>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            assembler: Assembler::new(),
            next_label_id: 0,
            jump_depths: HashMap::new(),
        }
    }

    pub fn compile_function(mut self, function: &ir::Function) -> Result<Program, CompileError> {
        let body = &function.body;
        if function.signature.ret == Type::Void {
            self.compile_discard(body)?;
            self.assembler.push_const(Value::Null);
        } else if body.ty == Type::Void {
            // Only reachable when every path returned explicitly.
            self.compile_discard(body)?;
            self.assembler.push_const(function.signature.ret.default_value());
        } else {
            self.compile_expr(body)?;
        }
        self.assembler.ret();
        Ok(self.assembler.finish_program(function.locals)?)
    }

    fn fresh_label(&mut self, prefix: &str) -> String {
        let id = self.next_label_id;
        self.next_label_id += 1;
        format!("{prefix}_{id}")
    }

    fn jump_label(label: LabelId) -> String {
        format!("jump_{label}")
    }

    fn operand_count(count: usize) -> Result<u16, CompileError> {
        u16::try_from(count).map_err(|_| CompileError::TooManyOperands(count))
    }

    /// Evaluates `expr` for its effects only.
    fn compile_discard(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::Assign {
                target: AssignTarget::Local(slot),
                value,
            } => {
                self.compile_expr(value)?;
                self.assembler.stloc(*slot);
                Ok(())
            }
            _ => {
                self.compile_expr(expr)?;
                if expr.ty != Type::Void {
                    self.assembler.pop();
                }
                Ok(())
            }
        }
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match &expr.kind {
            ExprKind::Constant(value) => {
                self.assembler.push_const(value.clone());
            }
            ExprKind::Local(slot) => self.assembler.ldloc(*slot),
            ExprKind::Default => {
                self.assembler.push_const(expr.ty.default_value());
            }
            ExprKind::TypeName => return Err(CompileError::UnexpectedTypeName),
            ExprKind::Property { target, getter, .. } => {
                let argc = match target {
                    Some(target) => {
                        self.compile_expr(target)?;
                        1
                    }
                    None => 0,
                };
                let function = self.assembler.add_function(getter);
                self.assembler.call(function, argc);
            }
            ExprKind::Call { function, args } => {
                for arg in args {
                    self.compile_expr(arg)?;
                }
                let argc = Self::operand_count(args.len())?;
                let function = self.assembler.add_function(function);
                self.assembler.call(function, argc);
                if expr.ty == Type::Void {
                    self.assembler.pop();
                }
            }
            ExprKind::Unary { op, kind, operand } => {
                self.compile_expr(operand)?;
                self.assembler.unary(*op, *kind);
            }
            ExprKind::Binary { op, kind, lhs, rhs } => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.assembler.binary(*op, *kind);
            }
            ExprKind::AndAlso(lhs, rhs) => self.compile_short_circuit(lhs, rhs, false)?,
            ExprKind::OrElse(lhs, rhs) => self.compile_short_circuit(lhs, rhs, true)?,
            ExprKind::Coalesce(lhs, rhs) => {
                let null_label = self.fresh_label("coalesce_null");
                let end_label = self.fresh_label("coalesce_end");
                self.compile_expr(lhs)?;
                self.assembler.dup();
                self.assembler.brnull_label(&null_label);
                let depth = self.assembler.depth();
                self.assembler.br_label(&end_label);
                self.assembler.label(&null_label)?;
                self.assembler.set_depth(depth);
                self.assembler.pop();
                self.compile_expr(rhs)?;
                self.assembler.label(&end_label)?;
            }
            ExprKind::Concat(parts) => {
                for part in parts {
                    self.compile_expr(part)?;
                }
                let count = Self::operand_count(parts.len())?;
                self.assembler.concat(count);
            }
            ExprKind::Convert(operand) => {
                self.compile_expr(operand)?;
                self.assembler.convert(expr.ty.clone());
            }
            ExprKind::TypeIs { operand, test } => {
                self.compile_expr(operand)?;
                self.assembler.type_is(test.clone());
            }
            ExprKind::TypeAs(operand) => {
                self.compile_expr(operand)?;
                self.assembler.type_as(expr.ty.clone());
            }
            ExprKind::Index { target, index } => {
                self.compile_expr(target)?;
                self.compile_expr(index)?;
                self.assembler.index();
            }
            ExprKind::Length(target) => {
                self.compile_expr(target)?;
                self.assembler.len();
            }
            ExprKind::NewArray(items) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                let count = Self::operand_count(items.len())?;
                self.assembler.new_array(count);
            }
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => self.compile_conditional(expr, condition, then_branch, else_branch.as_deref())?,
            ExprKind::Loop {
                body,
                step,
                break_label,
                continue_label,
            } => {
                let depth = self.assembler.depth();
                self.jump_depths.insert(*break_label, depth);
                self.jump_depths.insert(*continue_label, depth);
                let start_label = self.fresh_label("loop_start");
                self.assembler.label(&start_label)?;
                self.compile_discard(body)?;
                self.assembler.label(&Self::jump_label(*continue_label))?;
                for update in step {
                    self.compile_discard(update)?;
                }
                self.assembler.br_label(&start_label);
                self.assembler.label(&Self::jump_label(*break_label))?;
                self.assembler.set_depth(depth);
            }
            ExprKind::Labeled { body, label } => {
                let depth = self.assembler.depth();
                self.jump_depths.insert(*label, depth);
                self.compile_discard(body)?;
                self.assembler.label(&Self::jump_label(*label))?;
                self.assembler.set_depth(depth);
            }
            ExprKind::Block {
                variables,
                statements,
            } => {
                for variable in variables {
                    self.assembler.push_const(variable.ty.default_value());
                    self.assembler.stloc(variable.slot);
                }
                let Some((last, rest)) = statements.split_last() else {
                    return Ok(());
                };
                for statement in rest {
                    self.compile_discard(statement)?;
                }
                if expr.ty == Type::Void {
                    self.compile_discard(last)?;
                } else {
                    self.compile_expr(last)?;
                }
            }
            ExprKind::Assign { target, value } => match target {
                AssignTarget::Local(slot) => {
                    self.compile_expr(value)?;
                    if expr.ty != Type::Void {
                        self.assembler.dup();
                    }
                    self.assembler.stloc(*slot);
                }
                AssignTarget::Property { target, setter } => {
                    let mut argc = 1;
                    if let Some(target) = target {
                        self.compile_expr(target)?;
                        argc += 1;
                    }
                    self.compile_expr(value)?;
                    let function = self.assembler.add_function(setter);
                    self.assembler.call(function, argc);
                    if expr.ty == Type::Void {
                        self.assembler.pop();
                    }
                }
            },
            ExprKind::Jump(label) => {
                let target = *self
                    .jump_depths
                    .get(label)
                    .ok_or(CompileError::UnknownJumpTarget(*label))?;
                let depth = self.assembler.depth();
                for _ in target..depth {
                    self.assembler.pop();
                }
                self.assembler.br_label(&Self::jump_label(*label));
                self.assembler.set_depth(depth);
            }
            ExprKind::Return(value) => {
                let depth = self.assembler.depth();
                match value {
                    Some(value) => self.compile_expr(value)?,
                    None => {
                        self.assembler.push_const(Value::Null);
                    }
                }
                self.assembler.ret();
                self.assembler.set_depth(depth);
            }
        }
        Ok(())
    }

    fn compile_short_circuit(
        &mut self,
        lhs: &Expr,
        rhs: &Expr,
        branch_when: bool,
    ) -> Result<(), CompileError> {
        let end_label = self.fresh_label(if branch_when { "or_end" } else { "and_end" });
        self.compile_expr(lhs)?;
        self.assembler.dup();
        if branch_when {
            self.assembler.brtrue_label(&end_label);
        } else {
            self.assembler.brfalse_label(&end_label);
        }
        self.assembler.pop();
        self.compile_expr(rhs)?;
        self.assembler.label(&end_label)?;
        Ok(())
    }

    fn compile_conditional(
        &mut self,
        expr: &Expr,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: Option<&Expr>,
    ) -> Result<(), CompileError> {
        let else_label = self.fresh_label("else");
        let end_label = self.fresh_label("endif");
        self.compile_expr(condition)?;
        self.assembler.brfalse_label(&else_label);
        let depth = self.assembler.depth();
        let produces_value = expr.ty != Type::Void;
        if produces_value {
            self.compile_expr(then_branch)?;
        } else {
            self.compile_discard(then_branch)?;
        }
        let end_depth = self.assembler.depth();
        self.assembler.br_label(&end_label);
        self.assembler.label(&else_label)?;
        self.assembler.set_depth(depth);
        if let Some(else_branch) = else_branch {
            if produces_value {
                self.compile_expr(else_branch)?;
            } else {
                self.compile_discard(else_branch)?;
            }
        }
        self.assembler.label(&end_label)?;
        self.assembler.set_depth(end_depth);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StandardCatalog;
    use crate::vm::{Op, Vm};

    fn assemble(source: &str, signature: &Signature) -> Program {
        let dialect = frontends::dialect(SourceFlavor::CSharp);
        let catalog = StandardCatalog::new();
        let (_, program) = compile_source(source, &dialect, &catalog, Some(signature), None)
            .expect("source should compile");
        program
    }

    #[test]
    fn void_declarations_return_null() {
        let program = assemble("(int x) => x + 1", &Signature::new(vec![Type::Int], Type::Void));
        assert!(matches!(program.ops.last(), Some(Op::Ret)));
        let result = Vm::new(&program, vec![Value::Int(1)]).run().expect("run");
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn break_inside_nested_loops_keeps_the_stack_balanced() {
        let source = "(int n) => { int total = 0; \
            for (int i = 0; i < n; i++) { \
                for (int j = 0; j < n; j++) { if (j == 2) break; total += 1; } \
            } \
            total; }";
        let program = assemble(source, &Signature::new(vec![Type::Int], Type::Int));
        let mut vm = Vm::new(&program, vec![Value::Int(5)]);
        assert_eq!(vm.run().expect("run"), Value::Int(10));
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn parse_errors_carry_codes_and_positions() {
        let err = ParseError::new(ParseErrorKind::UnmatchedScope, "unexpected ']'", "]", 7);
        assert_eq!(err.code(), "E_UNMATCHED_SCOPE");
        assert_eq!(err.line_col("(x + 1\n]"), (2, 1));
        assert_eq!(
            err.to_string(),
            "E_UNMATCHED_SCOPE: unexpected ']' (offset 7)"
        );
    }

    #[test]
    fn flavor_names_accept_aliases() {
        assert_eq!(SourceFlavor::from_name("CS"), Some(SourceFlavor::CSharp));
        assert_eq!(SourceFlavor::from_name("excel"), Some(SourceFlavor::Formula));
        assert_eq!(SourceFlavor::from_name("lua"), None);
    }
}
