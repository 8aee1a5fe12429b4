//! Typed intermediate representation produced by the parser and consumed by
//! the code generator. Every node carries the concrete type of its result.

use crate::catalog::Callable;
use crate::types::{Signature, Type};
use crate::value::Value;
use crate::vm::{BinaryOp, OperandKind, UnaryOp};

pub type LabelId = u32;

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
}

#[derive(Clone, Debug)]
pub struct BlockVariable {
    pub name: String,
    pub slot: u16,
    pub ty: Type,
}

#[derive(Clone, Debug)]
pub enum AssignTarget {
    Local(u16),
    Property {
        target: Option<Box<Expr>>,
        setter: Callable,
    },
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Constant(Value),
    Local(u16),
    /// Default value of the node's type.
    Default,
    /// A type used as the receiver of a static member; never emitted.
    TypeName,
    Property {
        target: Option<Box<Expr>>,
        getter: Callable,
        setter: Option<Callable>,
    },
    /// Host call; instance receivers are the first argument.
    Call {
        function: Callable,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        kind: OperandKind,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        kind: OperandKind,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    AndAlso(Box<Expr>, Box<Expr>),
    OrElse(Box<Expr>, Box<Expr>),
    Coalesce(Box<Expr>, Box<Expr>),
    Concat(Vec<Expr>),
    /// Checked conversion to the node's type.
    Convert(Box<Expr>),
    TypeIs {
        operand: Box<Expr>,
        test: Type,
    },
    TypeAs(Box<Expr>),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Length(Box<Expr>),
    NewArray(Vec<Expr>),
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    /// Runs `body` then `step` until a jump leaves; `continue` lands on `step`.
    Loop {
        body: Box<Expr>,
        step: Vec<Expr>,
        break_label: LabelId,
        continue_label: LabelId,
    },
    /// Region a jump to `label` exits.
    Labeled {
        body: Box<Expr>,
        label: LabelId,
    },
    Block {
        variables: Vec<BlockVariable>,
        statements: Vec<Expr>,
    },
    Assign {
        target: AssignTarget,
        value: Box<Expr>,
    },
    Jump(LabelId),
    Return(Option<Box<Expr>>),
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Self { kind, ty }
    }

    pub fn constant(value: Value, ty: Type) -> Self {
        Self::new(ExprKind::Constant(value), ty)
    }

    pub fn void(kind: ExprKind) -> Self {
        Self::new(kind, Type::Void)
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.as_constant().is_some()
    }

    /// True when control never reaches the end of this node.
    pub fn diverges(&self) -> bool {
        match &self.kind {
            ExprKind::Jump(_) | ExprKind::Return(_) => true,
            ExprKind::Conditional {
                then_branch,
                else_branch: Some(else_branch),
                ..
            } => then_branch.diverges() && else_branch.diverges(),
            ExprKind::Block { statements, .. } => statements.iter().any(Expr::diverges),
            _ => false,
        }
    }

    /// Local slot or property receiving writes through this node.
    pub(crate) fn assign_target(&self) -> Option<AssignTarget> {
        match &self.kind {
            ExprKind::Local(slot) => Some(AssignTarget::Local(*slot)),
            ExprKind::Property {
                target,
                setter: Some(setter),
                ..
            } => Some(AssignTarget::Property {
                target: target.clone(),
                setter: setter.clone(),
            }),
            _ => None,
        }
    }
}

/// A lowered declaration: parameters occupy locals `0..signature.params.len()`.
#[derive(Clone, Debug)]
pub struct Function {
    pub signature: Signature,
    pub body: Expr,
    pub locals: usize,
}
