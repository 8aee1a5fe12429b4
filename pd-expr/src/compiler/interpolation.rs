//! `$"..."` templates. A template is split into literal and formatted
//! segments and lowered to calls on a `TextBuilder` accumulator.

use super::ir::{AssignTarget, Expr, ExprKind};
use super::lexer::{Token, decode_escape};
use super::parser::Parser;
use super::{ParseError, ParseErrorKind, ParseResult};
use crate::catalog::format::MAX_ALIGNMENT;
use crate::catalog::{Member, MemberScope, Method, TEXT_BUILDER};
use crate::types::Type;
use crate::value::Value;

/// Embedded source slice with its absolute offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Embedded<'a> {
    pub(crate) text: &'a str,
    pub(crate) offset: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Literal(String),
    Formatted {
        value: Embedded<'a>,
        alignment: Option<Embedded<'a>>,
        format: Option<&'a str>,
    },
}

/// Splits a raw template (the text between the quotes, starting at
/// `offset`) into segments. Doubled braces are literal braces.
pub(crate) fn split_template(template: &str, offset: usize) -> ParseResult<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut index = 0;
    while index < template.len() {
        let rest = &template[index..];
        if rest.starts_with("{{") {
            literal.push('{');
            index += 2;
        } else if rest.starts_with("}}") {
            literal.push('}');
            index += 2;
        } else if rest.starts_with('}') {
            return Err(ParseError::new(
                ParseErrorKind::Lexical,
                "unbalanced '}' in interpolated string",
                "}",
                offset + index,
            ));
        } else if rest.starts_with('{') {
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            let (segment, used) = read_hole(template, index, offset)?;
            segments.push(segment);
            index += used;
        } else if rest.starts_with('\\') {
            let (ch, used) = decode_escape(rest).ok_or_else(|| {
                ParseError::new(
                    ParseErrorKind::Lexical,
                    "invalid escape sequence",
                    rest.get(..2).unwrap_or(rest),
                    offset + index,
                )
            })?;
            literal.push(ch);
            index += used;
        } else {
            let ch = rest.chars().next().unwrap_or_default();
            literal.push(ch);
            index += ch.len_utf8();
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Reads `{value[,alignment][:format]}` starting at `start`; returns the
/// segment and the bytes consumed.
fn read_hole(template: &str, start: usize, offset: usize) -> ParseResult<(Segment<'_>, usize)> {
    let bytes = template.as_bytes();
    let body = start + 1;
    let mut depth = 0usize;
    let mut comma = None;
    let mut colon = None;
    let mut index = body;
    while index < bytes.len() {
        match bytes[index] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b'}' if depth > 0 => depth -= 1,
            b'}' => {
                let value_end = comma.or(colon).unwrap_or(index);
                let value = Embedded {
                    text: &template[body..value_end],
                    offset: offset + body,
                };
                if value.text.trim().is_empty() {
                    return Err(ParseError::new(
                        ParseErrorKind::Lexical,
                        "empty interpolation hole",
                        &template[start..=index],
                        offset + start,
                    ));
                }
                let alignment = comma.map(|comma| Embedded {
                    text: &template[comma + 1..colon.unwrap_or(index)],
                    offset: offset + comma + 1,
                });
                let format = colon.map(|colon| &template[colon + 1..index]);
                let segment = Segment::Formatted {
                    value,
                    alignment,
                    format,
                };
                return Ok((segment, index + 1 - start));
            }
            quote @ (b'"' | b'\'') => {
                index += 1;
                while index < bytes.len() && bytes[index] != quote {
                    index += if bytes[index] == b'\\' { 2 } else { 1 };
                }
            }
            b',' if depth == 0 && comma.is_none() && colon.is_none() => comma = Some(index),
            b':' if depth == 0 && colon.is_none() => colon = Some(index),
            _ => {}
        }
        index += 1;
    }
    Err(ParseError::new(
        ParseErrorKind::Lexical,
        "unterminated interpolation hole",
        "{",
        offset + start,
    ))
}

fn methods_named(members: Vec<Member>) -> Vec<Method> {
    members
        .into_iter()
        .filter_map(|member| match member {
            Member::Method(method) => Some(method),
            Member::Property(_) => None,
        })
        .collect()
}

impl<'a> Parser<'a> {
    pub(crate) fn build_interpolation(
        &mut self,
        template: &'a str,
        offset: usize,
        token: &Token<'a>,
    ) -> ParseResult<Expr> {
        let segments = split_template(template, offset)?;
        let builder_ty = Type::named(TEXT_BUILDER);
        let wants_builder = self.declared_return() == Some(&builder_ty);
        let formatted_count = segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Formatted { .. }))
            .count();
        if formatted_count == 0 && !wants_builder {
            let text: String = segments
                .iter()
                .filter_map(|segment| match segment {
                    Segment::Literal(text) => Some(text.as_str()),
                    Segment::Formatted { .. } => None,
                })
                .collect();
            return Ok(Expr::constant(Value::from(text), Type::String));
        }

        let constructors = self.catalog.constructors(&builder_ty);
        if constructors.is_empty() {
            return Err(Self::error_at(
                ParseErrorKind::UnknownSymbol,
                format!("interpolated strings need the '{TEXT_BUILDER}' type"),
                token,
            ));
        }
        let literal_length: usize = segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.chars().count(),
                Segment::Formatted { .. } => 0,
            })
            .sum();
        let size_hint = |count: usize| {
            Expr::constant(Value::Int(i32::try_from(count).unwrap_or(i32::MAX)), Type::Int)
        };

        let (statements, variables) = self.with_scope(|parser| {
            let create = parser.resolve_call(
                &constructors,
                None,
                vec![size_hint(literal_length), size_hint(formatted_count)],
                TEXT_BUILDER,
                token,
            )?;
            let slot = parser.declare_synthetic("interp", builder_ty.clone(), token)?;
            let accumulator = || Expr::new(ExprKind::Local(slot), builder_ty.clone());
            let append_literal = methods_named(parser.catalog.members(
                &builder_ty,
                "AppendLiteral",
                MemberScope::Instance,
            ));
            let append_formatted = methods_named(parser.catalog.members(
                &builder_ty,
                "AppendFormatted",
                MemberScope::Instance,
            ));

            let mut statements = vec![Expr::void(ExprKind::Assign {
                target: AssignTarget::Local(slot),
                value: Box::new(create),
            })];
            for segment in segments {
                match segment {
                    Segment::Literal(text) => {
                        let text = Expr::constant(Value::from(text), Type::String);
                        statements.push(parser.resolve_call(
                            &append_literal,
                            Some(accumulator()),
                            vec![text],
                            "TextBuilder.AppendLiteral",
                            token,
                        )?);
                    }
                    Segment::Formatted {
                        value,
                        alignment,
                        format,
                    } => {
                        let mut args = vec![parser.read_hole_value(value)?];
                        if let Some(alignment) = alignment {
                            args.push(parser.read_alignment(alignment)?);
                        }
                        if let Some(format) = format {
                            args.push(Expr::constant(Value::string(format), Type::String));
                        }
                        statements.push(parser.resolve_call(
                            &append_formatted,
                            Some(accumulator()),
                            args,
                            "TextBuilder.AppendFormatted",
                            token,
                        )?);
                    }
                }
            }

            if wants_builder {
                statements.push(accumulator());
            } else {
                let to_string = methods_named(parser.catalog.members(
                    &builder_ty,
                    "ToString",
                    MemberScope::Instance,
                ));
                statements.push(parser.resolve_call(
                    &to_string,
                    Some(accumulator()),
                    Vec::new(),
                    "TextBuilder.ToString",
                    token,
                )?);
            }
            Ok(statements)
        })?;
        let ty = if wants_builder { builder_ty } else { Type::String };
        Ok(Expr::new(
            ExprKind::Block {
                variables,
                statements,
            },
            ty,
        ))
    }

    fn read_hole_value(&mut self, hole: Embedded<'a>) -> ParseResult<Expr> {
        let value = self.parse_embedded(hole.text, hole.offset, |parser| {
            Ok(parser.read_expression(1, None)?.expr)
        })?;
        if value.ty == Type::Void {
            return Err(ParseError::new(
                ParseErrorKind::Type,
                "an interpolation hole cannot be void",
                hole.text.trim(),
                hole.offset,
            ));
        }
        Ok(value)
    }

    fn read_alignment(&mut self, alignment: Embedded<'a>) -> ParseResult<Expr> {
        let value = self.parse_embedded(alignment.text, alignment.offset, |parser| {
            Ok(parser.read_expression(1, None)?.expr)
        })?;
        match value.as_constant() {
            Some(Value::Int(width)) if width.unsigned_abs() < MAX_ALIGNMENT => Ok(value),
            Some(Value::Int(_)) => Err(ParseError::new(
                ParseErrorKind::Type,
                format!("alignment must be less than {MAX_ALIGNMENT} in magnitude"),
                alignment.text.trim(),
                alignment.offset,
            )),
            _ => Err(ParseError::new(
                ParseErrorKind::Type,
                "alignment must be a constant of type 'int'",
                alignment.text.trim(),
                alignment.offset,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubled_braces_are_literal() {
        let segments = split_template("{{x}} and }}", 0).expect("splits");
        assert_eq!(segments, vec![Segment::Literal("{x} and }".to_string())]);
    }

    #[test]
    fn holes_carry_alignment_format_and_offsets() {
        let segments = split_template(r"n={n,-6:F2}\t{(a ? b : c)}", 10).expect("splits");
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], Segment::Literal("n=".to_string()));
        let Segment::Formatted {
            value,
            alignment,
            format,
        } = &segments[1]
        else {
            panic!("expected a formatted segment, got {:?}", segments[1]);
        };
        assert_eq!(value.text, "n");
        assert_eq!(value.offset, 13);
        assert_eq!(alignment.map(|a| a.text), Some("-6"));
        assert_eq!(*format, Some("F2"));
        assert_eq!(segments[2], Segment::Literal("\t".to_string()));
        let Segment::Formatted { value, format, .. } = &segments[3] else {
            panic!("expected a formatted segment");
        };
        assert_eq!(value.text, "(a ? b : c)");
        assert_eq!(*format, None);
    }

    #[test]
    fn string_literals_inside_holes_may_hold_braces() {
        let segments = split_template(r#"{"}" + x}"#, 0).expect("splits");
        let Segment::Formatted { value, .. } = &segments[0] else {
            panic!("expected a formatted segment");
        };
        assert_eq!(value.text, r#""}" + x"#);
    }

    #[test]
    fn unbalanced_braces_are_lexical_errors() {
        let err = split_template("a } b", 4).expect_err("stray close");
        assert_eq!(err.kind, ParseErrorKind::Lexical);
        assert_eq!(err.offset, 6);
        let err = split_template("a {b", 0).expect_err("unterminated hole");
        assert_eq!(err.kind, ParseErrorKind::Lexical);
        assert_eq!(err.offset, 2);
    }
}
