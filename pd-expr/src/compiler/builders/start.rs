use super::{StartBuilder, Step};
use crate::compiler::ir::{AssignTarget, Expr, ExprKind};
use crate::compiler::lexer::{Literal, Token, TokenKind};
use crate::compiler::parser::Parser;
use crate::compiler::resolver::{coerce, convert_explicit, unify_all};
use crate::compiler::{ParseError, ParseErrorKind, ParseResult};
use crate::types::Type;
use crate::value::Value;

impl<'a> Parser<'a> {
    pub(crate) fn build_start(
        &mut self,
        builder: StartBuilder,
        token: Token<'a>,
    ) -> ParseResult<Expr> {
        match builder {
            StartBuilder::Constant => Ok(literal_constant(&token)),
            StartBuilder::Interpolation => match token.kind {
                TokenKind::Literal(Literal::Interpolated { template, offset }) => {
                    self.build_interpolation(template, offset, &token)
                }
                _ => Err(self.catch_all(&token)),
            },
            StartBuilder::Identifier => self.build_identifier(&token),
            StartBuilder::CatchAll => Err(self.catch_all(&token)),
            StartBuilder::Bool(value) => Ok(Expr::constant(Value::Bool(value), Type::Bool)),
            StartBuilder::Null => Ok(Expr::constant(Value::Null, Type::Null)),
            StartBuilder::Group => self.build_group(),
            StartBuilder::Unary(op) => {
                let operand = self.read_operand()?;
                self.build_unary(op, operand, &token)
            }
            StartBuilder::Identity => {
                let operand = self.read_operand()?;
                if operand.ty == Type::Char {
                    Ok(coerce(operand, &Type::Int))
                } else if operand.ty.is_numeric() {
                    Ok(operand)
                } else {
                    Err(Self::error_at(
                        ParseErrorKind::Resolution,
                        format!(
                            "operator '+' cannot be applied to operand of type '{}'",
                            operand.ty
                        ),
                        &token,
                    ))
                }
            }
            StartBuilder::PrefixStep(step) => self.build_prefix_step(step, &token),
            StartBuilder::New => self.build_new(&token),
            StartBuilder::Default => self.build_default(),
            StartBuilder::Block => self.build_block(&token),
            StartBuilder::If => self.build_if(&token),
            StartBuilder::While => self.build_while(&token),
            StartBuilder::For => self.build_for(&token),
            StartBuilder::Foreach => self.build_foreach(&token),
            StartBuilder::Switch => self.build_switch(&token),
            StartBuilder::Return => self.build_return(&token),
            StartBuilder::Break => self.build_break(&token),
            StartBuilder::Continue => self.build_continue(&token),
        }
    }

    /// Operand of a prefix operator.
    fn read_operand(&mut self) -> ParseResult<Expr> {
        let priority = self.dialect.unary_priority();
        Ok(self.read_expression(priority, None)?.expr)
    }

    fn catch_all(&self, token: &Token<'_>) -> ParseError {
        if self.dialect.is_closer(token.text) {
            Self::error_at(
                ParseErrorKind::UnmatchedScope,
                format!("unexpected '{}'", token.text),
                token,
            )
        } else if self.dialect.has_symbol(token.text) {
            Self::error_at(
                ParseErrorKind::WrongSymbol,
                format!("'{}' cannot start an expression", token.text),
                token,
            )
        } else {
            Self::error_at(
                ParseErrorKind::UnknownSymbol,
                format!("unknown symbol '{}'", token.text),
                token,
            )
        }
    }

    fn build_identifier(&mut self, token: &Token<'a>) -> ParseResult<Expr> {
        if let Some((slot, ty)) = self
            .scopes
            .lookup(token.text)
            .map(|variable| (variable.slot, variable.ty.clone()))
        {
            return Ok(Expr::new(ExprKind::Local(slot), ty));
        }
        if let Some(ty) = self.catalog.resolve_type(token.text, &[])
            && self.peek()?.is(".")
        {
            return Ok(Expr::new(ExprKind::TypeName, ty));
        }
        Err(Self::error_at(
            ParseErrorKind::UnknownSymbol,
            format!("unknown identifier '{}'", token.text),
            token,
        ))
    }

    fn build_group(&mut self) -> ParseResult<Expr> {
        if let Some(target) = self.try_cast_type()? {
            let operand_token = self.peek()?;
            let operand = self.read_operand()?;
            let from = operand.ty.clone();
            return convert_explicit(operand, &target).ok_or_else(|| {
                Self::error_at(
                    ParseErrorKind::Type,
                    format!("cannot convert type '{from}' to '{target}'"),
                    &operand_token,
                )
            });
        }
        let paren = self.dialect.markers().paren;
        self.read_enclosed(paren)
    }

    /// `(T)` followed by something that can start an operand is a cast.
    fn try_cast_type(&mut self) -> ParseResult<Option<Type>> {
        let cursor = self.save();
        let paren = self.dialect.markers().paren;
        let Some(ty) = self.try_parse_type()? else {
            return Ok(None);
        };
        if !self.accept(paren.end)? {
            self.restore(cursor);
            return Ok(None);
        }
        let next = self.peek()?;
        let starts_operand = match next.kind {
            TokenKind::Literal(_) => true,
            TokenKind::Name => self.dialect.follow(next.text).is_none(),
            TokenKind::Symbol => {
                ["(", "!", "~"].iter().any(|text| next.is(text))
                    || (["-", "+"].iter().any(|text| next.is(text))
                        && (ty.is_numeric() || ty == Type::Char))
            }
            TokenKind::End => false,
        };
        if starts_operand {
            Ok(Some(ty))
        } else {
            self.restore(cursor);
            Ok(None)
        }
    }

    fn build_prefix_step(&mut self, step: Step, token: &Token<'a>) -> ParseResult<Expr> {
        let operand_token = self.peek()?;
        let operand = self.read_operand()?;
        self.step_target(&operand, &operand_token)?;
        self.read_modify_write(operand, &operand_token, |parser, operand| {
            let target = parser.step_target(&operand, &operand_token)?;
            let one = Expr::constant(Value::Int(1), Type::Int);
            let stepped = parser.build_binary(step.op(), operand.clone(), one, token)?;
            let value = convert_explicit(stepped, &operand.ty).ok_or_else(|| {
                Self::error_at(
                    ParseErrorKind::Type,
                    format!("cannot step a value of type '{}'", operand.ty),
                    &operand_token,
                )
            })?;
            Ok(Expr::new(
                ExprKind::Assign {
                    target,
                    value: Box::new(value),
                },
                operand.ty,
            ))
        })
    }

    /// Assignable numeric operand of `++`/`--`.
    pub(crate) fn step_target(
        &self,
        operand: &Expr,
        at: &Token<'_>,
    ) -> ParseResult<AssignTarget> {
        if !(operand.ty.is_numeric() || operand.ty == Type::Char) {
            return Err(Self::error_at(
                ParseErrorKind::Resolution,
                format!("cannot increment or decrement a value of type '{}'", operand.ty),
                at,
            ));
        }
        operand.assign_target().ok_or_else(|| {
            Self::error_at(
                ParseErrorKind::Type,
                "the operand of an increment or decrement must be a variable or property",
                at,
            )
        })
    }

    fn build_new(&mut self, token: &Token<'a>) -> ParseResult<Expr> {
        let bracket = self.dialect.markers().bracket;
        if self.accept(bracket.start)? {
            self.expect(bracket.end)?;
            return self.build_array_initializer(None, token);
        }
        let type_token = self.peek()?;
        let ty = self.read_type()?;
        if matches!(ty, Type::Array(_)) {
            return self.build_array_initializer(Some(ty), &type_token);
        }
        let paren = self.dialect.markers().paren;
        self.expect(paren.start)?;
        let args = self.read_expressions(paren)?;
        let constructors = self.catalog.constructors(&ty);
        if constructors.is_empty() {
            return Err(Self::error_at(
                ParseErrorKind::Resolution,
                format!("type '{ty}' has no constructors"),
                &type_token,
            ));
        }
        self.resolve_call(&constructors, None, args, &ty.to_string(), &type_token)
    }

    fn build_array_initializer(
        &mut self,
        declared: Option<Type>,
        at: &Token<'a>,
    ) -> ParseResult<Expr> {
        let initializer = self.dialect.markers().initializer;
        self.expect(initializer.start)?;
        let items = self.read_expressions(initializer)?;
        let element = match declared {
            Some(Type::Array(element)) => *element,
            _ => unify_all(items.iter().map(|item| &item.ty)).ok_or_else(|| {
                Self::error_at(
                    ParseErrorKind::Type,
                    "no best type found for implicitly-typed array",
                    at,
                )
            })?,
        };
        let items = items
            .into_iter()
            .map(|item| self.convert_to(item, &element, at))
            .collect::<ParseResult<Vec<_>>>()?;
        Ok(Expr::new(ExprKind::NewArray(items), Type::array(element)))
    }

    fn build_default(&mut self) -> ParseResult<Expr> {
        let paren = self.dialect.markers().paren;
        self.expect(paren.start)?;
        let ty = self.read_type()?;
        self.expect(paren.end)?;
        Ok(Expr::new(ExprKind::Default, ty))
    }
}

fn literal_constant(token: &Token<'_>) -> Expr {
    match &token.kind {
        TokenKind::Literal(Literal::Int(value)) => Expr::constant(Value::Int(*value), Type::Int),
        TokenKind::Literal(Literal::Long(value)) => Expr::constant(Value::Long(*value), Type::Long),
        TokenKind::Literal(Literal::Float(value)) => {
            Expr::constant(Value::Float(*value), Type::Float)
        }
        TokenKind::Literal(Literal::Double(value)) => {
            Expr::constant(Value::Double(*value), Type::Double)
        }
        TokenKind::Literal(Literal::String(text)) => {
            Expr::constant(Value::string(text.as_str()), Type::String)
        }
        TokenKind::Literal(Literal::Char(ch)) => Expr::constant(Value::Char(*ch), Type::Char),
        _ => Expr::constant(Value::Null, Type::Null),
    }
}
