use crate::compiler::builders::{FollowBuilder, StartBuilder, Step};
use crate::compiler::dialect::{Dialect, DialectError, LiteralReader};
use crate::vm::{BinaryOp, UnaryOp};

const SYMBOLS: &[&str] = &[
    "(", ")", "[", "]", "{", "}", ",", ";", ":", "?", ".", "?.", "?[", "=>", "+", "-", "*",
    "/", "%", "!", "~", "&", "|", "^", "&&", "||", "??", "==", "!=", "<", ">", "<=", ">=",
    "<<", ">>", "++", "--", "=", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "<<=", ">>=",
    "??=",
];

const ASSIGNMENT: &[(&str, Option<BinaryOp>)] = &[
    ("=", None),
    ("+=", Some(BinaryOp::Add)),
    ("-=", Some(BinaryOp::Sub)),
    ("*=", Some(BinaryOp::Mul)),
    ("/=", Some(BinaryOp::Div)),
    ("%=", Some(BinaryOp::Rem)),
    ("&=", Some(BinaryOp::BitAnd)),
    ("|=", Some(BinaryOp::BitOr)),
    ("^=", Some(BinaryOp::BitXor)),
    ("<<=", Some(BinaryOp::Shl)),
    (">>=", Some(BinaryOp::Shr)),
];

const BINARY: &[(&str, u8, BinaryOp)] = &[
    ("|", 6, BinaryOp::BitOr),
    ("^", 7, BinaryOp::BitXor),
    ("&", 8, BinaryOp::BitAnd),
    ("==", 9, BinaryOp::Eq),
    ("!=", 9, BinaryOp::Ne),
    ("<", 10, BinaryOp::Lt),
    (">", 10, BinaryOp::Gt),
    ("<=", 10, BinaryOp::Le),
    (">=", 10, BinaryOp::Ge),
    ("<<", 11, BinaryOp::Shl),
    (">>", 11, BinaryOp::Shr),
    ("+", 12, BinaryOp::Add),
    ("-", 12, BinaryOp::Sub),
    ("*", 13, BinaryOp::Mul),
    ("/", 13, BinaryOp::Div),
    ("%", 13, BinaryOp::Rem),
];

pub(super) fn dialect() -> Result<Dialect, DialectError> {
    let mut builder = Dialect::builder("csharp")
        .symbols(SYMBOLS)
        .literal_reader(LiteralReader::RawString { delimiter: "\"\"\"" })
        .literal_reader(LiteralReader::InterpolatedString { prefix: "$\"" })
        .literal_reader(LiteralReader::VerbatimString { prefix: "@\"" })
        .literal_reader(LiteralReader::QuotedString { quote: '"' })
        .literal_reader(LiteralReader::CharLiteral { quote: '\'' })
        .radix_prefix("0x", 16)
        .radix_prefix("0b", 2)
        .line_comment("//")
        .block_comment("/*", "*/")
        .closers(&[")", "]", "}"])
        .unary_priority(14)
        .start("true", StartBuilder::Bool(true))
        .start("false", StartBuilder::Bool(false))
        .start("null", StartBuilder::Null)
        .start("(", StartBuilder::Group)
        .start("!", StartBuilder::Unary(UnaryOp::Not))
        .start("-", StartBuilder::Unary(UnaryOp::Neg))
        .start("~", StartBuilder::Unary(UnaryOp::BitNot))
        .start("+", StartBuilder::Identity)
        .start("++", StartBuilder::PrefixStep(Step::Increment))
        .start("--", StartBuilder::PrefixStep(Step::Decrement))
        .start("new", StartBuilder::New)
        .start("default", StartBuilder::Default)
        .start("{", StartBuilder::Block)
        .start("if", StartBuilder::If)
        .start("while", StartBuilder::While)
        .start("for", StartBuilder::For)
        .start("foreach", StartBuilder::Foreach)
        .start("switch", StartBuilder::Switch)
        .start("return", StartBuilder::Return)
        .start("break", StartBuilder::Break)
        .start("continue", StartBuilder::Continue);

    for &(text, op) in ASSIGNMENT {
        builder = builder.follow(text, 1, FollowBuilder::Assign(op));
    }
    for &(text, priority, op) in BINARY {
        builder = builder.follow(text, priority, FollowBuilder::Binary(op));
    }
    builder
        .follow("??=", 1, FollowBuilder::CoalesceAssign)
        .follow("?", 2, FollowBuilder::Ternary)
        .follow("??", 3, FollowBuilder::Coalesce)
        .follow("||", 4, FollowBuilder::OrElse)
        .follow("&&", 5, FollowBuilder::AndAlso)
        .follow("is", 10, FollowBuilder::Is)
        .follow("as", 10, FollowBuilder::As)
        .follow(".", 15, FollowBuilder::Member { null_safe: false })
        .follow("?.", 15, FollowBuilder::Member { null_safe: true })
        .follow("[", 15, FollowBuilder::Index { null_safe: false })
        .follow("?[", 15, FollowBuilder::Index { null_safe: true })
        .follow("++", 15, FollowBuilder::PostfixStep(Step::Increment))
        .follow("--", 15, FollowBuilder::PostfixStep(Step::Decrement))
        .build()
}
