use crate::compiler::builders::{FollowBuilder, StartBuilder};
use crate::compiler::dialect::{Dialect, DialectError, LiteralReader};
use crate::vm::{BinaryOp, UnaryOp};

// Brackets other than `(` only exist so the shared markers validate; the
// formula grammar has no blocks or indexing.
const SYMBOLS: &[&str] = &[
    "(", ")", "[", "]", "{", "}", ",", ";", ":", "?", ".", "=>", "+", "-", "*", "/", "%",
    "^", "&", "=", "==", "<>", "!=", "<", ">", "<=", ">=",
];

pub(super) fn dialect() -> Result<Dialect, DialectError> {
    Dialect::builder("formula")
        .symbols(SYMBOLS)
        .literal_reader(LiteralReader::QuotedString { quote: '"' })
        .literal_reader(LiteralReader::QuotedString { quote: '\'' })
        .radix_prefix("&H", 16)
        .closers(&[")"])
        .unary_priority(15)
        .start("TRUE", StartBuilder::Bool(true))
        .start("FALSE", StartBuilder::Bool(false))
        .start("true", StartBuilder::Bool(true))
        .start("false", StartBuilder::Bool(false))
        .start("null", StartBuilder::Null)
        .start("(", StartBuilder::Group)
        .start("-", StartBuilder::Unary(UnaryOp::Neg))
        .start("+", StartBuilder::Identity)
        .start("not", StartBuilder::Unary(UnaryOp::Not))
        .follow("or", 4, FollowBuilder::OrElse)
        .follow("and", 5, FollowBuilder::AndAlso)
        .follow("=", 9, FollowBuilder::Binary(BinaryOp::Eq))
        .follow("==", 9, FollowBuilder::Binary(BinaryOp::Eq))
        .follow("<>", 9, FollowBuilder::Binary(BinaryOp::Ne))
        .follow("!=", 9, FollowBuilder::Binary(BinaryOp::Ne))
        .follow("<", 10, FollowBuilder::Binary(BinaryOp::Lt))
        .follow(">", 10, FollowBuilder::Binary(BinaryOp::Gt))
        .follow("<=", 10, FollowBuilder::Binary(BinaryOp::Le))
        .follow(">=", 10, FollowBuilder::Binary(BinaryOp::Ge))
        .follow("&", 11, FollowBuilder::Concat)
        .follow("+", 12, FollowBuilder::Binary(BinaryOp::Add))
        .follow("-", 12, FollowBuilder::Binary(BinaryOp::Sub))
        .follow("*", 13, FollowBuilder::Binary(BinaryOp::Mul))
        .follow("/", 13, FollowBuilder::Binary(BinaryOp::Div))
        .follow("%", 13, FollowBuilder::Binary(BinaryOp::Rem))
        .follow("^", 14, FollowBuilder::Binary(BinaryOp::Pow))
        .follow(".", 15, FollowBuilder::Member { null_safe: false })
        .build()
}
