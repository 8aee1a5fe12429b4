//! Statement forms: blocks, declarations and control flow. Each lowers to
//! ordinary IR nodes; loops and switches become `Loop`/`Labeled` regions
//! addressed by `Jump`.

use super::dialect::ScopeMarker;
use super::ir::{AssignTarget, BlockVariable, Expr, ExprKind, LabelId};
use super::lexer::Token;
use super::parser::{Form, JumpTargets, Parser};
use super::resolver::{coerce, convert, convert_explicit};
use super::{ParseErrorKind, ParseResult};
use crate::types::{Type, is_implicitly_convertible, unify_types};
use crate::value::Value;
use crate::vm::{BinaryOp, OperandKind, UnaryOp};

/// One parsed statement. Declarations and compound forms never give their
/// enclosing block a value.
#[derive(Debug)]
pub(crate) struct Statement {
    pub(crate) expr: Expr,
    pub(crate) is_expression: bool,
}

/// One `case`/`default` group of a switch and its body.
struct Section<'a> {
    labels: Vec<Expr>,
    is_default: bool,
    at: Token<'a>,
    body: Vec<Statement>,
    variables: Vec<BlockVariable>,
}

impl<'a> Parser<'a> {
    /// Reads a declaration or an expression statement with its terminator.
    pub(crate) fn read_statement(&mut self) -> ParseResult<Statement> {
        if let Some(declaration) = self.read_declaration()? {
            self.expect_terminator()?;
            return Ok(Statement {
                expr: declaration,
                is_expression: false,
            });
        }
        let read = self.read_expression(1, None)?;
        match read.form {
            Form::Compound => Ok(Statement {
                expr: read.expr,
                is_expression: false,
            }),
            Form::Jump => {
                self.expect_terminator()?;
                Ok(Statement {
                    expr: read.expr,
                    is_expression: false,
                })
            }
            Form::Expression => {
                self.expect_terminator()?;
                Ok(Statement {
                    expr: read.expr,
                    is_expression: true,
                })
            }
        }
    }

    /// `;`, optional before `}` and at the end of input.
    fn expect_terminator(&mut self) -> ParseResult<()> {
        let terminator = self.dialect.markers().brace.separator.unwrap_or(";");
        let token = self.peek()?;
        if token.is(terminator) {
            self.next()?;
            return Ok(());
        }
        if token.is_end() || token.is(self.dialect.markers().brace.end) {
            return Ok(());
        }
        Err(self.unexpected(&token, &format!("expected '{terminator}'")))
    }

    /// Statement nested in a control-flow form; declarations it makes stay
    /// local to it.
    fn read_embedded_statement(&mut self) -> ParseResult<Expr> {
        self.statement_depth += 1;
        let result = self.with_scope(|parser| parser.read_statement());
        self.statement_depth -= 1;
        let (statement, variables) = result?;
        if variables.is_empty() {
            return Ok(statement.expr);
        }
        let ty = statement.expr.ty.clone();
        Ok(Expr::new(
            ExprKind::Block {
                variables,
                statements: vec![statement.expr],
            },
            ty,
        ))
    }

    /// `T a [= x], b [= y]` or `var a = x`, without the terminator.
    /// Returns `None` with the cursor untouched when the tokens do not start
    /// a declaration.
    fn read_declaration(&mut self) -> ParseResult<Option<Expr>> {
        let first = self.peek()?;
        if !first.is_name() || self.dialect.start(first.text).is_some() {
            return Ok(None);
        }
        let cursor = self.save();
        let declared = if first.is("var") {
            self.next()?;
            None
        } else {
            match self.try_parse_type()? {
                Some(ty) => Some(ty),
                None => return Ok(None),
            }
        };
        let names_start = self.save();
        let name = self.next()?;
        let opens_declaration = name.is_name() && self.dialect.start(name.text).is_none() && {
            let after = self.peek()?;
            let brace = self.dialect.markers().brace;
            after.is("=")
                || (declared.is_some()
                    && (after.is(brace.separator.unwrap_or(";"))
                        || after.is(",")
                        || after.is_end()
                        || after.is(brace.end)))
        };
        if !opens_declaration {
            self.restore(cursor);
            return Ok(None);
        }
        self.restore(names_start);

        let mut assignments = Vec::new();
        loop {
            let name = self.next()?;
            if !name.is_name() {
                return Err(self.unexpected(&name, "expected a variable name"));
            }
            let initializer = if self.accept("=")? {
                let at = self.peek()?;
                Some((self.read_expression(1, None)?.expr, at))
            } else {
                None
            };
            let ty = match (&declared, &initializer) {
                (Some(ty), _) => ty.clone(),
                (None, Some((value, at))) => {
                    if matches!(value.ty, Type::Null | Type::Void) {
                        return Err(Self::error_at(
                            ParseErrorKind::Type,
                            format!(
                                "cannot assign '{}' to an implicitly-typed variable",
                                value.ty
                            ),
                            at,
                        ));
                    }
                    value.ty.clone()
                }
                (None, None) => {
                    return Err(Self::error_at(
                        ParseErrorKind::Type,
                        "implicitly-typed variables must be initialized",
                        &name,
                    ));
                }
            };
            let slot = self.declare(&name, ty.clone())?;
            if let Some((value, at)) = initializer {
                let value = self.convert_to(value, &ty, &at)?;
                assignments.push(Expr::void(ExprKind::Assign {
                    target: AssignTarget::Local(slot),
                    value: Box::new(value),
                }));
            }
            if !self.accept(",")? {
                break;
            }
        }

        if assignments.len() == 1 {
            return Ok(assignments.pop());
        }
        Ok(Some(Expr::void(ExprKind::Block {
            variables: Vec::new(),
            statements: assignments,
        })))
    }

    /// `{ statements }`; the value is the last statement's when that is an
    /// expression statement.
    pub(crate) fn build_block(&mut self, _token: &Token<'a>) -> ParseResult<Expr> {
        let brace = self.dialect.markers().brace;
        self.statement_depth += 1;
        let result = self.with_scope(|parser| {
            let mut statements = Vec::new();
            loop {
                if parser.accept(brace.end)? {
                    return Ok(statements);
                }
                let token = parser.peek()?;
                if token.is_end() {
                    return Err(parser.unexpected(&token, &format!("expected '{}'", brace.end)));
                }
                if token.is(brace.separator.unwrap_or(";")) {
                    parser.next()?;
                    continue;
                }
                statements.push(parser.read_statement()?);
            }
        });
        self.statement_depth -= 1;
        let (statements, variables) = result?;
        let ty = match statements.last() {
            Some(last) if last.is_expression => last.expr.ty.clone(),
            _ => Type::Void,
        };
        Ok(Expr::new(
            ExprKind::Block {
                variables,
                statements: statements.into_iter().map(|statement| statement.expr).collect(),
            },
            ty,
        ))
    }

    fn read_condition(&mut self) -> ParseResult<Expr> {
        let paren = self.dialect.markers().paren;
        self.expect(paren.start)?;
        let at = self.peek()?;
        let condition = self.read_enclosed(paren)?;
        self.require_bool(condition, &at)
    }

    pub(crate) fn build_if(&mut self, _token: &Token<'a>) -> ParseResult<Expr> {
        let condition = self.read_condition()?;
        let then_branch = self.read_embedded_statement()?;
        let else_branch = if self.accept("else")? {
            Some(self.read_embedded_statement()?)
        } else {
            None
        };

        let Some(else_branch) = else_branch else {
            return Ok(Expr::void(ExprKind::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: None,
            }));
        };
        match unify_types(&then_branch.ty, &else_branch.ty).filter(|ty| *ty != Type::Void) {
            Some(ty) => Ok(Expr::new(
                ExprKind::Conditional {
                    condition: Box::new(condition),
                    then_branch: Box::new(coerce(then_branch, &ty)),
                    else_branch: Some(Box::new(coerce(else_branch, &ty))),
                },
                ty,
            )),
            None => Ok(Expr::void(ExprKind::Conditional {
                condition: Box::new(condition),
                then_branch: Box::new(then_branch),
                else_branch: Some(Box::new(else_branch)),
            })),
        }
    }

    /// Runs `f` with `targets` as the innermost `break`/`continue` pair.
    fn with_jump_targets<T>(
        &mut self,
        targets: JumpTargets,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        self.jump_targets.push(targets);
        let result = f(self);
        self.jump_targets.pop();
        result
    }

    /// `if (!condition) break;`, or nothing for a constant `true`.
    fn exit_unless(&mut self, condition: Expr, break_label: LabelId, at: &Token<'_>) -> ParseResult<Option<Expr>> {
        if matches!(condition.as_constant(), Some(Value::Bool(true))) {
            return Ok(None);
        }
        let negated = self.build_unary(UnaryOp::Not, condition, at)?;
        Ok(Some(Expr::void(ExprKind::Conditional {
            condition: Box::new(negated),
            then_branch: Box::new(Expr::void(ExprKind::Jump(break_label))),
            else_branch: None,
        })))
    }

    fn loop_node(body: Vec<Expr>, step: Vec<Expr>, targets: JumpTargets, continue_label: LabelId) -> Expr {
        Expr::void(ExprKind::Loop {
            body: Box::new(Expr::void(ExprKind::Block {
                variables: Vec::new(),
                statements: body,
            })),
            step,
            break_label: targets.break_label,
            continue_label,
        })
    }

    pub(crate) fn build_while(&mut self, token: &Token<'a>) -> ParseResult<Expr> {
        let condition = self.read_condition()?;
        let (break_label, continue_label) = (self.new_label(), self.new_label());
        let targets = JumpTargets {
            break_label,
            continue_label: Some(continue_label),
        };
        let body = self.with_jump_targets(targets, |parser| parser.read_embedded_statement())?;
        let mut statements: Vec<Expr> = self
            .exit_unless(condition, break_label, token)?
            .into_iter()
            .collect();
        statements.push(body);
        Ok(Self::loop_node(statements, Vec::new(), targets, continue_label))
    }

    pub(crate) fn build_for(&mut self, token: &Token<'a>) -> ParseResult<Expr> {
        let paren = self.dialect.markers().paren;
        self.expect(paren.start)?;
        let (statements, variables) = self.with_scope(|parser| {
            let mut statements = Vec::new();
            if !parser.accept(";")? {
                match parser.read_declaration()? {
                    Some(declaration) => statements.push(declaration),
                    None => loop {
                        statements.push(parser.read_expression(1, None)?.expr);
                        if !parser.accept(",")? {
                            break;
                        }
                    },
                }
                parser.expect(";")?;
            }
            let condition = if parser.accept(";")? {
                None
            } else {
                let at = parser.peek()?;
                let condition = parser.read_expression(1, None)?.expr;
                parser.expect(";")?;
                Some(parser.require_bool(condition, &at)?)
            };
            let step = parser.read_expressions(paren)?;

            let (break_label, continue_label) = (parser.new_label(), parser.new_label());
            let targets = JumpTargets {
                break_label,
                continue_label: Some(continue_label),
            };
            let body =
                parser.with_jump_targets(targets, |parser| parser.read_embedded_statement())?;
            let mut loop_body = Vec::new();
            if let Some(condition) = condition {
                loop_body.extend(parser.exit_unless(condition, break_label, token)?);
            }
            loop_body.push(body);
            statements.push(Self::loop_node(loop_body, step, targets, continue_label));
            Ok(statements)
        })?;
        Ok(Expr::void(ExprKind::Block {
            variables,
            statements,
        }))
    }

    /// Index-based iteration over arrays, sequences and strings.
    pub(crate) fn build_foreach(&mut self, token: &Token<'a>) -> ParseResult<Expr> {
        let paren = self.dialect.markers().paren;
        self.expect(paren.start)?;
        let declared = if self.accept("var")? {
            None
        } else {
            let type_token = self.peek()?;
            Some((self.read_type()?, type_token))
        };
        let name = self.next()?;
        if !name.is_name() {
            return Err(self.unexpected(&name, "expected a loop variable name"));
        }
        self.expect("in")?;
        let source_token = self.peek()?;
        let source = self.read_enclosed(paren)?;
        let Some(element) = source.ty.underlying().element_type() else {
            return Err(Self::error_at(
                ParseErrorKind::Type,
                format!("foreach cannot iterate over a value of type '{}'", source.ty),
                &source_token,
            ));
        };

        let (statements, variables) = self.with_scope(|parser| {
            let sequence_ty = source.ty.clone();
            let sequence = parser.declare_synthetic("seq", sequence_ty.clone(), token)?;
            let index = parser.declare_synthetic("index", Type::Int, token)?;
            let item_ty = match &declared {
                None => element.clone(),
                Some((ty, type_token)) => {
                    if !is_implicitly_convertible(&element, ty) && element != Type::Object {
                        return Err(Self::error_at(
                            ParseErrorKind::Type,
                            format!("cannot convert elements of type '{element}' to '{ty}'"),
                            type_token,
                        ));
                    }
                    ty.clone()
                }
            };
            let item = parser.declare(&name, item_ty.clone())?;

            let sequence_ref = || Expr::new(ExprKind::Local(sequence), sequence_ty.clone());
            let index_ref = || Expr::new(ExprKind::Local(index), Type::Int);
            let current = Expr::new(
                ExprKind::Index {
                    target: Box::new(sequence_ref()),
                    index: Box::new(index_ref()),
                },
                element.clone(),
            );
            let current = convert_explicit(current, &item_ty).ok_or_else(|| {
                Self::error_at(
                    ParseErrorKind::Type,
                    format!("cannot convert elements of type '{element}' to '{item_ty}'"),
                    &name,
                )
            })?;
            let in_range = Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::Lt,
                    kind: OperandKind::Int,
                    lhs: Box::new(index_ref()),
                    rhs: Box::new(Expr::new(
                        ExprKind::Length(Box::new(sequence_ref())),
                        Type::Int,
                    )),
                },
                Type::Bool,
            );

            let (break_label, continue_label) = (parser.new_label(), parser.new_label());
            let targets = JumpTargets {
                break_label,
                continue_label: Some(continue_label),
            };
            let body =
                parser.with_jump_targets(targets, |parser| parser.read_embedded_statement())?;

            let mut loop_body: Vec<Expr> = parser
                .exit_unless(in_range, break_label, token)?
                .into_iter()
                .collect();
            loop_body.push(Expr::void(ExprKind::Assign {
                target: AssignTarget::Local(item),
                value: Box::new(current),
            }));
            loop_body.push(body);
            let step = Expr::void(ExprKind::Assign {
                target: AssignTarget::Local(index),
                value: Box::new(Expr::new(
                    ExprKind::Binary {
                        op: BinaryOp::Add,
                        kind: OperandKind::Int,
                        lhs: Box::new(index_ref()),
                        rhs: Box::new(Expr::constant(Value::Int(1), Type::Int)),
                    },
                    Type::Int,
                )),
            });
            Ok(vec![
                Expr::void(ExprKind::Assign {
                    target: AssignTarget::Local(sequence),
                    value: Box::new(source),
                }),
                Expr::void(ExprKind::Assign {
                    target: AssignTarget::Local(index),
                    value: Box::new(Expr::constant(Value::Int(0), Type::Int)),
                }),
                Self::loop_node(loop_body, vec![step], targets, continue_label),
            ])
        })?;
        Ok(Expr::void(ExprKind::Block {
            variables,
            statements,
        }))
    }

    /// `switch (value) { case C: ... default: ... }`. Sections that all end
    /// in a jump form a statement; sections that are each one expression
    /// form a value.
    pub(crate) fn build_switch(&mut self, token: &Token<'a>) -> ParseResult<Expr> {
        let paren = self.dialect.markers().paren;
        let brace = self.dialect.markers().brace;
        let case = self.dialect.markers().case;
        self.expect(paren.start)?;
        let value = self.read_enclosed(paren)?;
        if value.ty == Type::Void {
            return Err(Self::error_at(
                ParseErrorKind::Type,
                "cannot switch on a void expression",
                token,
            ));
        }
        self.expect(brace.start)?;

        let break_label = self.new_label();
        let targets = JumpTargets {
            break_label,
            continue_label: self.jump_targets.last().and_then(|outer| outer.continue_label),
        };
        let value_ty = value.ty.clone();
        let ((sections, subject), variables) = self.with_scope(|parser| {
            let subject = parser.declare_synthetic("switch", value_ty.clone(), token)?;
            let subject_ref = Expr::new(ExprKind::Local(subject), value_ty.clone());
            let sections = parser.with_jump_targets(targets, |parser| {
                parser.read_sections(&subject_ref, case, brace.end)
            })?;
            Ok((sections, subject))
        })?;

        let save = Expr::void(ExprKind::Assign {
            target: AssignTarget::Local(subject),
            value: Box::new(value),
        });
        let is_statement = sections
            .iter()
            .all(|section| section.body.last().is_some_and(|last| last.expr.diverges()));
        if is_statement {
            let chain = Self::section_chain(sections, None)?;
            let body = Expr::void(ExprKind::Block {
                variables,
                statements: vec![save, chain],
            });
            return Ok(Expr::void(ExprKind::Labeled {
                body: Box::new(body),
                label: break_label,
            }));
        }

        for section in &sections {
            let single = match section.body.as_slice() {
                [only] => only.is_expression && only.expr.ty != Type::Void,
                _ => false,
            };
            if !single {
                return Err(Self::error_at(
                    ParseErrorKind::WrongSymbol,
                    "a switch section must end in 'break', 'return' or 'continue', or be a single value",
                    &section.at,
                ));
            }
        }
        if !sections.iter().any(|section| section.is_default) {
            return Err(Self::error_at(
                ParseErrorKind::Type,
                "switch expression is not exhaustive; add a 'default' section",
                token,
            ));
        }
        let mut types = sections.iter().map(|section| &section.body[0].expr.ty);
        let first = types.next().cloned().unwrap_or(Type::Void);
        let ty = types
            .try_fold(first, |common, ty| unify_types(&common, ty))
            .ok_or_else(|| {
                Self::error_at(
                    ParseErrorKind::Type,
                    "switch sections produce values with no common type",
                    token,
                )
            })?;
        let chain = Self::section_chain(sections, Some(&ty))?;
        Ok(Expr::new(
            ExprKind::Block {
                variables,
                statements: vec![save, chain],
            },
            ty,
        ))
    }

    fn read_sections(
        &mut self,
        subject: &Expr,
        case: ScopeMarker,
        close: &'static str,
    ) -> ParseResult<Vec<Section<'a>>> {
        let mut sections = Vec::new();
        let mut labels = Vec::new();
        let mut is_default = false;
        let mut first_label: Option<Token<'a>> = None;
        loop {
            let token = self.peek()?;
            if token.is(close) {
                self.next()?;
                break;
            }
            if token.is(case.start) {
                self.next()?;
                first_label.get_or_insert(token.clone());
                let label_token = self.peek()?;
                let label = self.read_enclosed(case)?;
                if !label.is_constant() {
                    return Err(Self::error_at(
                        ParseErrorKind::Type,
                        "a case label must be a constant",
                        &label_token,
                    ));
                }
                let label = self.convert_to(label, &subject.ty, &label_token)?;
                labels.push(self.build_binary(BinaryOp::Eq, subject.clone(), label, &label_token)?);
                continue;
            }
            if token.is("default") {
                self.next()?;
                first_label.get_or_insert(token.clone());
                self.expect(case.end)?;
                is_default = true;
                continue;
            }
            let Some(at) = first_label.take() else {
                return Err(self.unexpected(&token, &format!("expected '{}' or 'default'", case.start)));
            };

            self.statement_depth += 1;
            let result = self.with_scope(|parser| {
                let mut body = Vec::new();
                loop {
                    let next = parser.peek()?;
                    if next.is(case.start) || next.is("default") || next.is(close) {
                        return Ok(body);
                    }
                    if next.is_end() {
                        return Err(parser.unexpected(&next, &format!("expected '{close}'")));
                    }
                    body.push(parser.read_statement()?);
                }
            });
            self.statement_depth -= 1;
            let (body, variables) = result?;
            sections.push(Section {
                labels: std::mem::take(&mut labels),
                is_default: std::mem::replace(&mut is_default, false),
                at,
                body,
                variables,
            });
        }
        if let Some(at) = first_label {
            return Err(Self::error_at(
                ParseErrorKind::WrongSymbol,
                "a switch section needs a body",
                &at,
            ));
        }
        Ok(sections)
    }

    /// Nested conditionals testing each section's labels in order, with the
    /// default section last.
    fn section_chain(sections: Vec<Section<'a>>, value_ty: Option<&Type>) -> ParseResult<Expr> {
        let (defaults, cases): (Vec<_>, Vec<_>) =
            sections.into_iter().partition(|section| section.is_default);
        let ty = value_ty.cloned().unwrap_or(Type::Void);
        let section_body = |section: Section<'a>| -> ParseResult<Expr> {
            match value_ty {
                Some(value_ty) => {
                    let at = section.at.clone();
                    let value = section
                        .body
                        .into_iter()
                        .next()
                        .map(|statement| statement.expr)
                        .unwrap_or_else(|| Expr::constant(Value::Null, Type::Null));
                    let from = value.ty.clone();
                    let value = convert(value, value_ty).ok_or_else(|| {
                        Self::error_at(
                            ParseErrorKind::Type,
                            format!("cannot implicitly convert type '{from}' to '{value_ty}'"),
                            &at,
                        )
                    })?;
                    Ok(Expr::new(
                        ExprKind::Block {
                            variables: section.variables,
                            statements: vec![value],
                        },
                        value_ty.clone(),
                    ))
                }
                None => Ok(Expr::void(ExprKind::Block {
                    variables: section.variables,
                    statements: section.body.into_iter().map(|statement| statement.expr).collect(),
                })),
            }
        };

        let mut chain = match defaults.into_iter().next() {
            Some(default) => Some(section_body(default)?),
            None => None,
        };
        for section in cases.into_iter().rev() {
            let mut tests = section.labels.iter().cloned();
            let Some(first) = tests.next() else {
                continue;
            };
            let condition = tests.fold(first, |any, test| {
                Expr::new(ExprKind::OrElse(Box::new(any), Box::new(test)), Type::Bool)
            });
            let then_branch = section_body(section)?;
            chain = Some(Expr::new(
                ExprKind::Conditional {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch: chain.map(Box::new),
                },
                ty.clone(),
            ));
        }
        Ok(chain.unwrap_or_else(|| {
            Expr::void(ExprKind::Block {
                variables: Vec::new(),
                statements: Vec::new(),
            })
        }))
    }

    pub(crate) fn build_return(&mut self, token: &Token<'a>) -> ParseResult<Expr> {
        if self.statement_depth == 0 {
            return Err(Self::error_at(
                ParseErrorKind::WrongSymbol,
                "'return' is only allowed in a statement body",
                token,
            ));
        }
        let next = self.peek()?;
        let has_value = !(next.is_end()
            || next.is(self.dialect.markers().brace.separator.unwrap_or(";"))
            || next.is(self.dialect.markers().brace.end));
        let value = if has_value {
            Some(self.read_expression(1, None)?.expr)
        } else {
            None
        };
        let expected = self.return_slot(value.as_ref().map(|value| &value.ty));
        let value = match (value, expected) {
            (None, None | Some(Type::Void)) => None,
            (None, Some(ty)) => {
                return Err(Self::error_at(
                    ParseErrorKind::Type,
                    format!("a value of type '{ty}' must be returned"),
                    token,
                ));
            }
            (Some(_), Some(Type::Void)) => {
                return Err(Self::error_at(
                    ParseErrorKind::Type,
                    "a declaration returning void cannot return a value",
                    &next,
                ));
            }
            (Some(value), Some(ty)) => Some(self.convert_to(value, &ty, &next)?),
            (Some(value), None) => Some(value),
        };
        Ok(Expr::void(ExprKind::Return(value.map(Box::new))))
    }

    pub(crate) fn build_break(&mut self, token: &Token<'a>) -> ParseResult<Expr> {
        match self.jump_targets.last() {
            Some(targets) => Ok(Expr::void(ExprKind::Jump(targets.break_label))),
            None => Err(Self::error_at(
                ParseErrorKind::WrongSymbol,
                "no enclosing loop or switch to break out of",
                token,
            )),
        }
    }

    pub(crate) fn build_continue(&mut self, token: &Token<'a>) -> ParseResult<Expr> {
        match self.jump_targets.last().and_then(|targets| targets.continue_label) {
            Some(label) => Ok(Expr::void(ExprKind::Jump(label))),
            None => Err(Self::error_at(
                ParseErrorKind::WrongSymbol,
                "no enclosing loop to continue",
                token,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::StandardCatalog;
    use crate::compiler::frontends::dialect_for;
    use crate::compiler::ir::{ExprKind, Function};
    use crate::compiler::parser::Parser;
    use crate::compiler::{ParseErrorKind, ParseResult, SourceFlavor};
    use crate::types::{Signature, Type};

    fn lower(source: &str, signature: &Signature) -> ParseResult<Function> {
        let catalog = StandardCatalog::new();
        let mut parser = Parser::new(source, dialect_for(SourceFlavor::CSharp), &catalog, None);
        parser.parse_function(Some(signature))
    }

    #[test]
    fn block_value_comes_from_the_last_expression_statement() {
        let signature = Signature::new(vec![Type::String], Type::String);
        let function = lower(r#"(string s) => { string inner = "test"; inner + s; }"#, &signature)
            .expect("lowers");
        let ExprKind::Block { variables, statements } = &function.body.kind else {
            panic!("expected a block, got {:?}", function.body.kind);
        };
        assert_eq!(variables.len(), 1);
        assert_eq!(variables[0].name, "inner");
        assert_eq!(statements.len(), 2);
        assert_eq!(function.body.ty, Type::String);
    }

    #[test]
    fn unread_declarations_are_not_retained() {
        let signature = Signature::new(vec![], Type::Int);
        let function = lower("() => { int unused = 4; int kept = 2; kept; }", &signature)
            .expect("lowers");
        let ExprKind::Block { variables, .. } = &function.body.kind else {
            panic!("expected a block");
        };
        let names: Vec<_> = variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["kept"]);
    }

    #[test]
    fn block_locals_are_not_visible_after_the_block() {
        let signature = Signature::new(vec![], Type::Int);
        let source = "() => { { int y = 1; } y; }";
        let err = lower(source, &signature).expect_err("y is out of scope");
        assert_eq!(err.kind, ParseErrorKind::UnknownSymbol);
        assert_eq!(err.offset, source.rfind('y').expect("y"));
        assert_eq!(err.token, "y");
    }

    #[test]
    fn jumps_outside_loops_are_rejected() {
        let signature = Signature::new(vec![], Type::Void);
        let err = lower("() => { break; }", &signature).expect_err("no loop");
        assert_eq!(err.kind, ParseErrorKind::WrongSymbol);
        let err = lower("() => { switch (1) { case 1: continue; } }", &signature)
            .expect_err("switch is not a loop");
        assert_eq!(err.kind, ParseErrorKind::WrongSymbol);
    }

    #[test]
    fn return_needs_a_statement_body() {
        let signature = Signature::new(vec![Type::Int], Type::Int);
        let err = lower("(int x) => return x", &signature).expect_err("expression body");
        assert_eq!(err.kind, ParseErrorKind::WrongSymbol);
        assert_eq!(err.offset, 11);
        lower("(int x) => { return x; }", &signature).expect("statement body");
    }

    #[test]
    fn non_boolean_conditions_are_type_errors() {
        let signature = Signature::new(vec![Type::Int], Type::Void);
        let source = "(int x) => { if (x) x = 1; }";
        let err = lower(source, &signature).expect_err("int condition");
        assert_eq!(err.kind, ParseErrorKind::Type);
        assert_eq!(err.offset, source.find("(x)").expect("condition") + 1);
    }

    #[test]
    fn switch_expression_requires_default() {
        let signature = Signature::new(vec![Type::Int], Type::Int);
        let source = "(int i) => switch (i) { case 1: 10; case 2: 20; }";
        let err = lower(source, &signature).expect_err("not exhaustive");
        assert_eq!(err.kind, ParseErrorKind::Type);
        assert_eq!(err.offset, source.find("switch").expect("switch"));
    }

    #[test]
    fn var_needs_a_typed_initializer() {
        let signature = Signature::new(vec![], Type::Void);
        let err = lower("() => { var x = null; }", &signature).expect_err("null initializer");
        assert_eq!(err.kind, ParseErrorKind::Type);
        let err = lower("() => { int x = 1; int x = 2; }", &signature).expect_err("redeclared");
        assert_eq!(err.kind, ParseErrorKind::WrongSymbol);
    }
}
