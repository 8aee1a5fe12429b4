//! Start and follow-up builders. A dialect maps token text to one of these
//! closed variants; `parser.rs` dispatches on them.

mod follow;
mod start;

use crate::vm::{BinaryOp, UnaryOp};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Increment,
    Decrement,
}

impl Step {
    pub(crate) fn op(self) -> BinaryOp {
        match self {
            Step::Increment => BinaryOp::Add,
            Step::Decrement => BinaryOp::Sub,
        }
    }
}

/// Builds an expression from a prefix token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartBuilder {
    /// Numeric, string or char literal token.
    Constant,
    /// `$"..."` literal token.
    Interpolation,
    /// Any unregistered name: a variable or a type used as a static receiver.
    Identifier,
    /// Anything else; always fails with a diagnostic.
    CatchAll,
    Bool(bool),
    Null,
    Group,
    Unary(UnaryOp),
    /// Unary plus.
    Identity,
    PrefixStep(Step),
    New,
    Default,
    Block,
    If,
    While,
    For,
    Foreach,
    Switch,
    Return,
    Break,
    Continue,
}

impl StartBuilder {
    /// Statement forms end themselves; no follow-up operator applies to them.
    pub(crate) fn is_statement_form(self) -> bool {
        matches!(
            self,
            StartBuilder::Block
                | StartBuilder::If
                | StartBuilder::While
                | StartBuilder::For
                | StartBuilder::Foreach
                | StartBuilder::Switch
                | StartBuilder::Return
                | StartBuilder::Break
                | StartBuilder::Continue
        )
    }
}

/// Extends an already-built expression with the next token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FollowBuilder {
    Binary(BinaryOp),
    AndAlso,
    OrElse,
    Coalesce,
    /// Text concatenation of any two operands.
    Concat,
    /// `=` or a compound assignment such as `+=`.
    Assign(Option<BinaryOp>),
    CoalesceAssign,
    Ternary,
    Member { null_safe: bool },
    Index { null_safe: bool },
    PostfixStep(Step),
    Is,
    As,
}
