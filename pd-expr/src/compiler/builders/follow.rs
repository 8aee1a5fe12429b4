use super::{FollowBuilder, Step};
use crate::catalog::{Member, MemberScope, Method};
use crate::compiler::ir::{AssignTarget, Expr, ExprKind};
use crate::compiler::lexer::Token;
use crate::compiler::parser::Parser;
use crate::compiler::resolver::{build_concat, coerce, convert_explicit};
use crate::compiler::{ParseErrorKind, ParseResult};
use crate::types::{Type, unify_types};
use crate::value::Value;
use crate::vm::{BinaryOp, OperandKind};

/// Priority of member access, indexing and postfix steps.
const POSTFIX_PRIORITY: u8 = 15;

impl<'a> Parser<'a> {
    pub(crate) fn build_follow(
        &mut self,
        builder: FollowBuilder,
        priority: u8,
        lhs: Expr,
        token: Token<'a>,
    ) -> ParseResult<Expr> {
        match builder {
            FollowBuilder::Binary(op) => {
                let rhs_priority = if op.is_right_associative() {
                    priority
                } else {
                    priority + 1
                };
                let rhs = self.read_expression(rhs_priority, None)?.expr;
                self.build_binary(op, lhs, rhs, &token)
            }
            FollowBuilder::AndAlso | FollowBuilder::OrElse => {
                let lhs = self.require_bool(lhs, &token)?;
                let rhs_token = self.peek()?;
                let rhs = self.read_expression(priority + 1, None)?.expr;
                let rhs = self.require_bool(rhs, &rhs_token)?;
                let kind = if builder == FollowBuilder::AndAlso {
                    ExprKind::AndAlso(Box::new(lhs), Box::new(rhs))
                } else {
                    ExprKind::OrElse(Box::new(lhs), Box::new(rhs))
                };
                Ok(Expr::new(kind, Type::Bool))
            }
            FollowBuilder::Coalesce => {
                let rhs = self.read_expression(priority, None)?.expr;
                self.build_coalesce(lhs, rhs, &token)
            }
            FollowBuilder::Concat => {
                let rhs = self.read_expression(priority + 1, None)?.expr;
                if lhs.ty == Type::Void || rhs.ty == Type::Void {
                    return Err(Self::error_at(
                        ParseErrorKind::Type,
                        "cannot concatenate a void expression",
                        &token,
                    ));
                }
                Ok(build_concat(vec![lhs, rhs]))
            }
            FollowBuilder::Assign(op) => self.build_assign(op, priority, lhs, &token),
            FollowBuilder::CoalesceAssign => {
                self.assign_target(&lhs, &token)?;
                self.read_modify_write(lhs, &token, |parser, lhs| {
                    let target = parser.assign_target(&lhs, &token)?;
                    let rhs = parser.read_expression(priority, None)?.expr;
                    let ty = lhs.ty.clone();
                    let value = parser.build_coalesce(lhs, rhs, &token)?;
                    let value = parser.convert_to(value, &ty, &token)?;
                    Ok(Expr::new(
                        ExprKind::Assign {
                            target,
                            value: Box::new(value),
                        },
                        ty,
                    ))
                })
            }
            FollowBuilder::Ternary => self.build_ternary(priority, lhs, &token),
            FollowBuilder::Member { null_safe: false } => {
                let name = self.member_name()?;
                self.build_member(lhs, &name)
            }
            FollowBuilder::Member { null_safe: true } => {
                let name = self.member_name()?;
                self.build_null_safe(lhs, &token, |parser, receiver| {
                    parser.build_member(receiver, &name)
                })
            }
            FollowBuilder::Index { null_safe: false } => self.build_index(lhs, &token),
            FollowBuilder::Index { null_safe: true } => {
                self.build_null_safe(lhs, &token, |parser, receiver| {
                    parser.build_index(receiver, &token)
                })
            }
            FollowBuilder::PostfixStep(step) => self.build_postfix_step(step, lhs, &token),
            FollowBuilder::Is => {
                if lhs.ty == Type::Void {
                    return Err(Self::error_at(
                        ParseErrorKind::Type,
                        "operator 'is' cannot be applied to a void expression",
                        &token,
                    ));
                }
                let test = self.read_type()?;
                Ok(Expr::new(
                    ExprKind::TypeIs {
                        operand: Box::new(lhs),
                        test,
                    },
                    Type::Bool,
                ))
            }
            FollowBuilder::As => {
                let type_token = self.peek()?;
                let ty = self.read_type()?;
                if !ty.accepts_null() {
                    return Err(Self::error_at(
                        ParseErrorKind::Type,
                        format!("operator 'as' needs a reference or nullable type, not '{ty}'"),
                        &type_token,
                    ));
                }
                Ok(Expr::new(ExprKind::TypeAs(Box::new(lhs)), ty))
            }
        }
    }

    fn assign_target(&self, lhs: &Expr, token: &Token<'_>) -> ParseResult<AssignTarget> {
        lhs.assign_target().ok_or_else(|| {
            Self::error_at(
                ParseErrorKind::Type,
                "the left-hand side of an assignment must be a variable or a settable property",
                token,
            )
        })
    }

    fn build_assign(
        &mut self,
        op: Option<BinaryOp>,
        priority: u8,
        lhs: Expr,
        token: &Token<'a>,
    ) -> ParseResult<Expr> {
        if op.is_none() {
            return self.assign_with(None, priority, lhs, token);
        }
        self.assign_target(&lhs, token)?;
        self.read_modify_write(lhs, token, |parser, lhs| {
            parser.assign_with(op, priority, lhs, token)
        })
    }

    fn assign_with(
        &mut self,
        op: Option<BinaryOp>,
        priority: u8,
        lhs: Expr,
        token: &Token<'a>,
    ) -> ParseResult<Expr> {
        let target = self.assign_target(&lhs, token)?;
        let rhs = self.read_expression(priority, None)?.expr;
        let ty = lhs.ty.clone();
        let value = match op {
            None => self.convert_to(rhs, &ty, token)?,
            Some(op) => {
                let combined = self.build_binary(op, lhs, rhs, token)?;
                let from = combined.ty.clone();
                convert_explicit(combined, &ty).ok_or_else(|| {
                    Self::error_at(
                        ParseErrorKind::Type,
                        format!("cannot convert type '{from}' to '{ty}'"),
                        token,
                    )
                })?
            }
        };
        Ok(Expr::new(
            ExprKind::Assign {
                target,
                value: Box::new(value),
            },
            ty,
        ))
    }

    /// Builds a read followed by a write of `lhs`. An instance property's
    /// receiver is stored in a temporary so it is evaluated once.
    pub(crate) fn read_modify_write(
        &mut self,
        lhs: Expr,
        token: &Token<'a>,
        build: impl FnOnce(&mut Self, Expr) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        match lhs {
            Expr {
                kind:
                    ExprKind::Property {
                        target: Some(receiver),
                        getter,
                        setter,
                    },
                ty,
            } if !matches!(receiver.kind, ExprKind::Local(_)) => {
                let (statements, variables) = self.with_scope(|parser| {
                    let receiver_ty = receiver.ty.clone();
                    let slot = parser.declare_synthetic("receiver", receiver_ty.clone(), token)?;
                    let save = Expr::void(ExprKind::Assign {
                        target: AssignTarget::Local(slot),
                        value: receiver,
                    });
                    let pinned = Expr::new(
                        ExprKind::Property {
                            target: Some(Box::new(Expr::new(ExprKind::Local(slot), receiver_ty))),
                            getter,
                            setter,
                        },
                        ty,
                    );
                    Ok(vec![save, build(parser, pinned)?])
                })?;
                let ty = statements.last().map_or(Type::Void, |last| last.ty.clone());
                Ok(Expr::new(
                    ExprKind::Block {
                        variables,
                        statements,
                    },
                    ty,
                ))
            }
            lhs => build(self, lhs),
        }
    }

    fn build_coalesce(&self, lhs: Expr, rhs: Expr, token: &Token<'_>) -> ParseResult<Expr> {
        if !lhs.ty.accepts_null() {
            return Err(Self::error_at(
                ParseErrorKind::Type,
                format!("operator '??' cannot be applied to operand of type '{}'", lhs.ty),
                token,
            ));
        }
        let ty = if rhs.ty == Type::Null {
            lhs.ty.clone()
        } else {
            unify_types(lhs.ty.underlying(), &rhs.ty).ok_or_else(|| {
                Self::error_at(
                    ParseErrorKind::Type,
                    format!(
                        "operator '??' cannot be applied to operands of type '{}' and '{}'",
                        lhs.ty, rhs.ty
                    ),
                    token,
                )
            })?
        };
        let lhs = self.convert_to(lhs, &Type::nullable(ty.clone()), token)?;
        let rhs = self.convert_to(rhs, &ty, token)?;
        Ok(Expr::new(
            ExprKind::Coalesce(Box::new(lhs), Box::new(rhs)),
            ty,
        ))
    }

    fn build_ternary(&mut self, priority: u8, lhs: Expr, token: &Token<'a>) -> ParseResult<Expr> {
        let condition = self.require_bool(lhs, token)?;
        let ternary = self.dialect.markers().ternary;
        let then_branch = self.read_enclosed(ternary)?;
        let else_token = self.peek()?;
        let else_branch = self.read_expression(priority, None)?.expr;
        let ty = unify_types(&then_branch.ty, &else_branch.ty).ok_or_else(|| {
            Self::error_at(
                ParseErrorKind::Type,
                format!(
                    "no implicit conversion between '{}' and '{}'",
                    then_branch.ty, else_branch.ty
                ),
                &else_token,
            )
        })?;
        let then_branch = self.convert_to(then_branch, &ty, token)?;
        let else_branch = self.convert_to(else_branch, &ty, &else_token)?;
        Ok(Expr::new(
            ExprKind::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Some(Box::new(else_branch)),
            },
            ty,
        ))
    }

    fn member_name(&mut self) -> ParseResult<Token<'a>> {
        let name = self.next()?;
        if name.is_name() {
            Ok(name)
        } else {
            Err(self.unexpected(&name, "expected a member name"))
        }
    }

    /// `receiver.name` or `receiver.name(args)`; a type receiver selects
    /// static members.
    fn build_member(&mut self, receiver: Expr, name: &Token<'a>) -> ParseResult<Expr> {
        let is_static = matches!(receiver.kind, ExprKind::TypeName);
        let scope = if is_static {
            MemberScope::Static
        } else {
            MemberScope::Instance
        };
        if receiver.ty == Type::Void || receiver.ty == Type::Null {
            return Err(Self::error_at(
                ParseErrorKind::Type,
                format!("cannot access member '{}' of a '{}' expression", name.text, receiver.ty),
                name,
            ));
        }
        let owner = receiver.ty.underlying().clone();
        let mut members = self.catalog.members(&owner, name.text, scope);
        if members.is_empty() && owner != receiver.ty {
            members = self.catalog.members(&receiver.ty, name.text, scope);
        }
        let display_name = format!("{owner}.{}", name.text);
        let receiver = (!is_static).then_some(receiver);

        let paren = self.dialect.markers().paren;
        if self.peek()?.is(paren.start) {
            let methods: Vec<Method> = members
                .into_iter()
                .filter_map(|member| match member {
                    Member::Method(method) => Some(method),
                    Member::Property(_) => None,
                })
                .collect();
            if methods.is_empty() {
                return Err(Self::error_at(
                    ParseErrorKind::UnknownSymbol,
                    format!("'{owner}' has no method named '{}'", name.text),
                    name,
                ));
            }
            self.next()?;
            let args = self.read_expressions(paren)?;
            return self.resolve_call(&methods, receiver, args, &display_name, name);
        }

        let property = members.into_iter().find_map(|member| match member {
            Member::Property(property) => Some(property),
            Member::Method(_) => None,
        });
        match property {
            Some(property) => Ok(Expr::new(
                ExprKind::Property {
                    target: receiver.map(Box::new),
                    getter: property.getter,
                    setter: property.setter,
                },
                property.ty,
            )),
            None => Err(Self::error_at(
                ParseErrorKind::UnknownSymbol,
                format!("'{owner}' has no property named '{}'", name.text),
                name,
            )),
        }
    }

    fn build_index(&mut self, target: Expr, token: &Token<'a>) -> ParseResult<Expr> {
        let bracket = self.dialect.markers().bracket;
        let index_token = self.peek()?;
        let mut indices = self.read_expressions(bracket)?;
        let index = match indices.pop() {
            Some(index) if indices.is_empty() => index,
            _ => {
                return Err(Self::error_at(
                    ParseErrorKind::WrongSymbol,
                    "expected exactly one index",
                    &index_token,
                ));
            }
        };
        let element = match target.ty.underlying() {
            Type::Array(element) => (**element).clone(),
            Type::String => Type::Char,
            other => {
                return Err(Self::error_at(
                    ParseErrorKind::Type,
                    format!("cannot apply indexing to an expression of type '{other}'"),
                    token,
                ));
            }
        };
        let index = self.convert_to(index, &Type::Int, &index_token)?;
        Ok(Expr::new(
            ExprKind::Index {
                target: Box::new(target),
                index: Box::new(index),
            },
            element,
        ))
    }

    /// Lowers `lhs?.rest` to a test of a temporary; the rest of the postfix
    /// chain only runs when `lhs` is not null.
    fn build_null_safe(
        &mut self,
        lhs: Expr,
        token: &Token<'a>,
        access: impl FnOnce(&mut Self, Expr) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        if !lhs.ty.accepts_null() {
            return Err(Self::error_at(
                ParseErrorKind::Type,
                format!("operator '{}' cannot be applied to operand of type '{}'", token.text, lhs.ty),
                token,
            ));
        }
        let (statements, variables) = self.with_scope(|parser| {
            let slot = parser.declare_synthetic("nullsafe", lhs.ty.clone(), token)?;
            let receiver = Expr::new(ExprKind::Local(slot), lhs.ty.underlying().clone());
            let accessed = access(parser, receiver)?;
            let accessed = parser.read_follow(accessed, POSTFIX_PRIORITY, None)?.expr;
            let is_null = Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::Eq,
                    kind: OperandKind::Ref,
                    lhs: Box::new(Expr::new(ExprKind::Local(slot), lhs.ty.clone())),
                    rhs: Box::new(Expr::constant(Value::Null, Type::Null)),
                },
                Type::Bool,
            );
            let save = Expr::void(ExprKind::Assign {
                target: AssignTarget::Local(slot),
                value: Box::new(lhs),
            });
            let test = if accessed.ty == Type::Void {
                Expr::void(ExprKind::Conditional {
                    condition: Box::new(is_null),
                    then_branch: Box::new(Expr::void(ExprKind::Block {
                        variables: Vec::new(),
                        statements: Vec::new(),
                    })),
                    else_branch: Some(Box::new(accessed)),
                })
            } else {
                let ty = Type::nullable(accessed.ty.clone());
                Expr::new(
                    ExprKind::Conditional {
                        condition: Box::new(is_null),
                        then_branch: Box::new(Expr::constant(Value::Null, ty.clone())),
                        else_branch: Some(Box::new(coerce(accessed, &ty))),
                    },
                    ty,
                )
            };
            Ok(vec![save, test])
        })?;
        let ty = statements.last().map_or(Type::Void, |test| test.ty.clone());
        Ok(Expr::new(
            ExprKind::Block {
                variables,
                statements,
            },
            ty,
        ))
    }

    /// `x++` yields the value before the step.
    fn build_postfix_step(&mut self, step: Step, lhs: Expr, token: &Token<'a>) -> ParseResult<Expr> {
        self.step_target(&lhs, token)?;
        self.read_modify_write(lhs, token, |parser, lhs| {
            parser.postfix_step(step, lhs, token)
        })
    }

    fn postfix_step(&mut self, step: Step, lhs: Expr, token: &Token<'a>) -> ParseResult<Expr> {
        let target = self.step_target(&lhs, token)?;
        let ty = lhs.ty.clone();
        let (statements, variables) = self.with_scope(|parser| {
            let slot = parser.declare_synthetic("step", ty.clone(), token)?;
            let previous = Expr::new(ExprKind::Local(slot), ty.clone());
            let one = Expr::constant(Value::Int(1), Type::Int);
            let stepped = parser.build_binary(step.op(), previous.clone(), one, token)?;
            let stepped = convert_explicit(stepped, &ty).ok_or_else(|| {
                Self::error_at(
                    ParseErrorKind::Type,
                    format!("cannot step a value of type '{ty}'"),
                    token,
                )
            })?;
            Ok(vec![
                Expr::void(ExprKind::Assign {
                    target: AssignTarget::Local(slot),
                    value: Box::new(lhs),
                }),
                Expr::void(ExprKind::Assign {
                    target,
                    value: Box::new(stepped),
                }),
                previous,
            ])
        })?;
        Ok(Expr::new(
            ExprKind::Block {
                variables,
                statements,
            },
            ty,
        ))
    }
}

