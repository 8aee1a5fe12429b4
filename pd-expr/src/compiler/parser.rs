use super::builders::StartBuilder;
use super::dialect::{Dialect, ScopeMarker};
use super::ir::{BlockVariable, Expr, Function, LabelId};
use super::lexer::{Cursor, Literal, Token, TokenKind, TokenStream};
use super::resolver;
use super::scope::{DeclareError, ScopeStack};
use super::{ParseError, ParseErrorKind, ParseResult};
use crate::catalog::TypeCatalog;
use crate::types::{Signature, Type, is_implicitly_convertible};

/// How an expression ended, which decides whether a terminator follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Form {
    Expression,
    /// `return`, `break` and `continue`: no follow-ups, but need `;`.
    Jump,
    /// Forms that close themselves with a statement or `}`.
    Compound,
}

#[derive(Debug)]
pub(crate) struct Read {
    pub(crate) expr: Expr,
    /// The scope's end marker was consumed.
    pub(crate) closed: bool,
    pub(crate) form: Form,
}

/// Active `break`/`continue` destinations.
#[derive(Clone, Copy, Debug)]
pub(crate) struct JumpTargets {
    pub(crate) break_label: LabelId,
    pub(crate) continue_label: Option<LabelId>,
}

pub(crate) enum ReturnType {
    Declared(Type),
    /// Fixed by the first `return` or by the body when no signature is given.
    Inferred(Option<Type>),
}

pub struct Parser<'a> {
    pub(crate) dialect: &'a Dialect,
    pub(crate) catalog: &'a dyn TypeCatalog,
    tokens: TokenStream<'a>,
    pub(crate) scopes: ScopeStack,
    synthetic_counter: u32,
    label_counter: LabelId,
    pub(crate) jump_targets: Vec<JumpTargets>,
    pub(crate) statement_depth: usize,
    pub(crate) return_type: ReturnType,
    nesting: usize,
    max_nesting: Option<usize>,
    pending_angle: bool,
}

impl<'a> Parser<'a> {
    pub fn new(
        source: &'a str,
        dialect: &'a Dialect,
        catalog: &'a dyn TypeCatalog,
        max_nesting: Option<usize>,
    ) -> Self {
        Self {
            dialect,
            catalog,
            tokens: TokenStream::new(source, dialect),
            scopes: ScopeStack::new(),
            synthetic_counter: 0,
            label_counter: 0,
            jump_targets: Vec::new(),
            statement_depth: 0,
            return_type: ReturnType::Inferred(None),
            nesting: 0,
            max_nesting,
            pending_angle: false,
        }
    }

    pub(crate) fn peek(&mut self) -> ParseResult<Token<'a>> {
        self.tokens.peek_token()
    }

    pub(crate) fn next(&mut self) -> ParseResult<Token<'a>> {
        self.tokens.next_token()
    }

    pub(crate) fn save(&self) -> Cursor {
        self.tokens.save()
    }

    pub(crate) fn restore(&mut self, cursor: Cursor) {
        self.tokens.restore(cursor);
    }

    /// Consumes the next token when it is spelled `text`.
    pub(crate) fn accept(&mut self, text: &str) -> ParseResult<bool> {
        if self.peek()?.is(text) {
            self.next()?;
            return Ok(true);
        }
        Ok(false)
    }

    pub(crate) fn expect(&mut self, text: &str) -> ParseResult<Token<'a>> {
        let token = self.next()?;
        if token.is(text) {
            return Ok(token);
        }
        Err(self.unexpected(&token, &format!("expected '{text}'")))
    }

    /// Error for a token that cannot appear here; stray closers report an
    /// unmatched scope.
    pub(crate) fn unexpected(&self, token: &Token<'_>, message: &str) -> ParseError {
        let kind = if token.kind == TokenKind::Symbol && self.dialect.is_closer(token.text) {
            ParseErrorKind::UnmatchedScope
        } else {
            ParseErrorKind::WrongSymbol
        };
        let message = if token.is_end() {
            format!("{message}, found end of input")
        } else {
            format!("{message}, found '{}'", token.text)
        };
        ParseError::new(kind, message, token.text, token.offset)
    }

    pub(crate) fn error_at(
        kind: ParseErrorKind,
        message: impl Into<String>,
        token: &Token<'_>,
    ) -> ParseError {
        ParseError::new(kind, message, token.text, token.offset)
    }

    /// Unique name no source identifier can spell.
    pub(crate) fn synthetic_name(&mut self, kind: &str) -> String {
        self.synthetic_counter += 1;
        format!("<{kind}>{}", self.synthetic_counter)
    }

    pub(crate) fn new_label(&mut self) -> LabelId {
        self.label_counter += 1;
        self.label_counter
    }

    pub(crate) fn declare_synthetic(
        &mut self,
        kind: &str,
        ty: Type,
        at: &Token<'_>,
    ) -> ParseResult<u16> {
        let name = self.synthetic_name(kind);
        self.scopes
            .declare_synthetic(name, ty)
            .map_err(|_| Self::too_many_locals(at))
    }

    pub(crate) fn declare(&mut self, name: &Token<'_>, ty: Type) -> ParseResult<u16> {
        self.scopes.declare(name.text, ty).map_err(|err| match err {
            DeclareError::AlreadyDeclared => Self::error_at(
                ParseErrorKind::WrongSymbol,
                format!("a variable named '{}' is already declared in this scope", name.text),
                name,
            ),
            DeclareError::TooManyLocals => Self::too_many_locals(name),
        })
    }

    fn too_many_locals(at: &Token<'_>) -> ParseError {
        Self::error_at(ParseErrorKind::WrongSymbol, "too many local variables", at)
    }

    /// Runs `f` inside a fresh lexical frame and returns the variables the
    /// frame retained.
    pub(crate) fn with_scope<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<(T, Vec<BlockVariable>)> {
        self.scopes.push();
        let result = f(self);
        let variables = self.scopes.pop();
        Ok((result?, variables))
    }

    /// Parses `text` (located at `offset` in the source) with the current
    /// scopes, e.g. an interpolation hole.
    pub(crate) fn parse_embedded<T>(
        &mut self,
        text: &'a str,
        offset: usize,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        let inner = self.tokens.sub_stream(text, offset);
        let outer = std::mem::replace(&mut self.tokens, inner);
        let result = f(self).and_then(|value| {
            let token = self.peek()?;
            if token.is_end() {
                Ok(value)
            } else {
                Err(self.unexpected(&token, "expected end of interpolation hole"))
            }
        });
        self.tokens = outer;
        result
    }

    /// Reads an expression whose follow-ups bind at least as tightly as
    /// `min_priority`. With a scope, its end marker is consumed when reached.
    pub(crate) fn read_expression(
        &mut self,
        min_priority: u8,
        scope: Option<ScopeMarker>,
    ) -> ParseResult<Read> {
        self.nesting += 1;
        if let Some(limit) = self.max_nesting
            && self.nesting > limit
        {
            self.nesting -= 1;
            let token = self.peek()?;
            return Err(Self::error_at(
                ParseErrorKind::WrongSymbol,
                "maximum nesting depth exceeded",
                &token,
            ));
        }
        let result = self.read_start().and_then(|(expr, form)| {
            if form == Form::Expression {
                self.read_follow(expr, min_priority, scope)
            } else {
                Ok(Read {
                    expr,
                    closed: false,
                    form,
                })
            }
        });
        self.nesting -= 1;
        result
    }

    fn read_start(&mut self) -> ParseResult<(Expr, Form)> {
        let token = self.next()?;
        let builder = match &token.kind {
            TokenKind::End => {
                return Err(Self::error_at(
                    ParseErrorKind::WrongSymbol,
                    "expected an expression, found end of input",
                    &token,
                ));
            }
            TokenKind::Literal(Literal::Interpolated { .. }) => StartBuilder::Interpolation,
            TokenKind::Literal(_) => StartBuilder::Constant,
            TokenKind::Name => self
                .dialect
                .start(token.text)
                .unwrap_or(StartBuilder::Identifier),
            TokenKind::Symbol => self
                .dialect
                .start(token.text)
                .unwrap_or(StartBuilder::CatchAll),
        };
        let form = match builder {
            StartBuilder::Return | StartBuilder::Break | StartBuilder::Continue => Form::Jump,
            builder if builder.is_statement_form() => Form::Compound,
            _ => Form::Expression,
        };
        let expr = self.build_start(builder, token)?;
        Ok((expr, form))
    }

    /// Applies follow-up builders to `expr` until one binds too loosely.
    pub(crate) fn read_follow(
        &mut self,
        mut expr: Expr,
        min_priority: u8,
        scope: Option<ScopeMarker>,
    ) -> ParseResult<Read> {
        loop {
            let token = self.peek()?;
            if token.is_end() {
                break;
            }
            if let Some(scope) = scope {
                if token.is(scope.end) {
                    self.next()?;
                    return Ok(Read {
                        expr,
                        closed: true,
                        form: Form::Expression,
                    });
                }
                if scope.separator.is_some_and(|separator| token.is(separator)) {
                    break;
                }
            }
            if token.kind == TokenKind::Symbol && self.dialect.is_closer(token.text) {
                if scope.is_some() {
                    return Err(Self::error_at(
                        ParseErrorKind::UnmatchedScope,
                        format!("unexpected '{}'", token.text),
                        &token,
                    ));
                }
                break;
            }
            let entry = match token.kind {
                TokenKind::Name | TokenKind::Symbol => self.dialect.follow(token.text),
                _ => None,
            };
            let Some(entry) = entry.filter(|entry| entry.priority >= min_priority) else {
                break;
            };
            self.next()?;
            expr = self.build_follow(entry.builder, entry.priority, expr, token)?;
        }
        Ok(Read {
            expr,
            closed: false,
            form: Form::Expression,
        })
    }

    /// Reads an expression that must run up to `marker.end`, consuming it.
    pub(crate) fn read_enclosed(&mut self, marker: ScopeMarker) -> ParseResult<Expr> {
        let read = self.read_expression(1, Some(marker))?;
        if read.closed {
            return Ok(read.expr);
        }
        let token = self.peek()?;
        Err(self.unexpected(&token, &format!("expected '{}'", marker.end)))
    }

    /// Reads a separated list after `marker.start` up to and including
    /// `marker.end`.
    pub(crate) fn read_expressions(&mut self, marker: ScopeMarker) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        if self.accept(marker.end)? {
            return Ok(items);
        }
        loop {
            let token = self.peek()?;
            if !items.is_empty() && token.is(marker.end) {
                return Err(Self::error_at(
                    ParseErrorKind::WrongSymbol,
                    format!("expected an expression after '{}'", marker.separator.unwrap_or(",")),
                    &token,
                ));
            }
            let read = self.read_expression(1, Some(marker))?;
            items.push(read.expr);
            if read.closed {
                return Ok(items);
            }
            let token = self.next()?;
            if !marker.separator.is_some_and(|separator| token.is(separator)) {
                return Err(self.unexpected(&token, &format!("expected '{}'", marker.end)));
            }
        }
    }

    /// Reads a type name with optional generic arguments, `[]` and `?`
    /// suffixes. Restores the cursor and returns `None` when the tokens do
    /// not spell a known type.
    pub(crate) fn try_parse_type(&mut self) -> ParseResult<Option<Type>> {
        let cursor = self.tokens.save();
        match self.parse_type_inner()? {
            Some(ty) => Ok(Some(ty)),
            None => {
                self.tokens.restore(cursor);
                self.pending_angle = false;
                Ok(None)
            }
        }
    }

    /// Like `try_parse_type`, but an unknown name is an error.
    pub(crate) fn read_type(&mut self) -> ParseResult<Type> {
        let token = self.peek()?;
        match self.try_parse_type()? {
            Some(ty) => Ok(ty),
            None if token.is_name() => Err(Self::error_at(
                ParseErrorKind::UnknownSymbol,
                format!("unknown type '{}'", token.text),
                &token,
            )),
            None => Err(self.unexpected(&token, "expected a type")),
        }
    }

    fn parse_type_inner(&mut self) -> ParseResult<Option<Type>> {
        let name = self.next()?;
        if !name.is_name() || self.dialect.start(name.text).is_some() {
            return Ok(None);
        }
        let mut generic_args = Vec::new();
        if self.accept("<")? {
            loop {
                let Some(arg) = self.parse_type_inner()? else {
                    return Ok(None);
                };
                generic_args.push(arg);
                if self.pending_angle {
                    self.pending_angle = false;
                    break;
                }
                let token = self.next()?;
                if token.is(">") {
                    break;
                }
                if token.is(">>") {
                    self.pending_angle = true;
                    break;
                }
                if !token.is(",") {
                    return Ok(None);
                }
            }
        }
        let Some(mut ty) = self.catalog.resolve_type(name.text, &generic_args) else {
            return Ok(None);
        };
        if self.pending_angle {
            return Ok(Some(ty));
        }
        loop {
            let cursor = self.tokens.save();
            if self.accept("[")? {
                if self.accept("]")? {
                    ty = Type::array(ty);
                    continue;
                }
                self.tokens.restore(cursor);
                break;
            }
            if self.peek()?.is("?") && self.nullable_suffix_follows()? {
                self.next()?;
                ty = Type::nullable(ty);
                continue;
            }
            break;
        }
        Ok(Some(ty))
    }

    /// `?` after a type is a nullable suffix only before a closing token or
    /// a declared name; otherwise it starts a conditional.
    fn nullable_suffix_follows(&mut self) -> ParseResult<bool> {
        let cursor = self.tokens.save();
        self.next()?;
        let after = self.next()?;
        let result = if [")", ">", ",", "]"].iter().any(|text| after.is(text)) {
            true
        } else if after.is_name() {
            let next = self.next()?;
            ["=", ";", ",", "in", ")"].iter().any(|text| next.is(text))
        } else {
            false
        };
        self.tokens.restore(cursor);
        Ok(result)
    }

    /// Converts `expr` to `to` or reports a type error at `at`.
    pub(crate) fn convert_to(&self, expr: Expr, to: &Type, at: &Token<'_>) -> ParseResult<Expr> {
        let from = expr.ty.clone();
        resolver::convert(expr, to).ok_or_else(|| {
            Self::error_at(
                ParseErrorKind::Type,
                format!("cannot implicitly convert type '{from}' to '{to}'"),
                at,
            )
        })
    }

    pub(crate) fn require_bool(&self, expr: Expr, at: &Token<'_>) -> ParseResult<Expr> {
        if expr.ty == Type::Bool {
            return Ok(expr);
        }
        Err(Self::error_at(
            ParseErrorKind::Type,
            format!("condition must be of type 'bool', not '{}'", expr.ty),
            at,
        ))
    }

    /// Parses `(params) => body` against `signature`, or infers the return
    /// type when no signature is given.
    pub fn parse_function(&mut self, signature: Option<&Signature>) -> ParseResult<Function> {
        let params = self.read_parameters(signature)?;
        self.expect(self.dialect.arrow())?;
        self.return_type = match signature {
            Some(signature) => ReturnType::Declared(signature.ret.clone()),
            None => ReturnType::Inferred(None),
        };

        let body_token = self.peek()?;
        let read = self.read_expression(1, None)?;
        let trailing = self.peek()?;
        if !trailing.is_end() {
            return Err(self.unexpected(&trailing, "expected end of declaration"));
        }
        let is_block = body_token.is(self.dialect.markers().brace.start);
        let body = read.expr;

        let (body, ret) = match std::mem::replace(&mut self.return_type, ReturnType::Inferred(None)) {
            ReturnType::Declared(Type::Void) | ReturnType::Inferred(Some(Type::Void)) => {
                (body, Type::Void)
            }
            ReturnType::Declared(ret) => (self.finish_body(body, &ret, is_block, &body_token)?, ret),
            ReturnType::Inferred(Some(ret)) => {
                (self.finish_body(body, &ret, is_block, &body_token)?, ret)
            }
            ReturnType::Inferred(None) => {
                let ret = body.ty.clone();
                (body, ret)
            }
        };
        Ok(Function {
            signature: Signature::new(params, ret),
            body,
            locals: self.scopes.local_count(),
        })
    }

    fn finish_body(
        &self,
        body: Expr,
        ret: &Type,
        is_block: bool,
        at: &Token<'_>,
    ) -> ParseResult<Expr> {
        if body.ty == Type::Void {
            if is_block && body.diverges() {
                return Ok(body);
            }
            if is_block {
                return Err(Self::error_at(
                    ParseErrorKind::Type,
                    "not all code paths return a value",
                    at,
                ));
            }
        }
        self.convert_to(body, ret, at)
    }

    fn read_parameters(&mut self, signature: Option<&Signature>) -> ParseResult<Vec<Type>> {
        let paren = self.dialect.markers().paren;
        let start = self.peek()?;
        let mut declared: Vec<(Token<'a>, Option<(Type, Token<'a>)>)> = Vec::new();
        if self.accept(paren.start)? {
            if !self.accept(paren.end)? {
                loop {
                    let token = self.peek()?;
                    let cursor = self.tokens.save();
                    self.next()?;
                    let after = self.peek()?;
                    let untyped = token.is_name()
                        && (after.is(paren.end) || paren.separator.is_some_and(|s| after.is(s)));
                    self.tokens.restore(cursor);
                    if untyped {
                        declared.push((self.next()?, None));
                    } else {
                        let type_token = self.peek()?;
                        let ty = self.read_type()?;
                        let name = self.next()?;
                        if !name.is_name() {
                            return Err(self.unexpected(&name, "expected a parameter name"));
                        }
                        declared.push((name, Some((ty, type_token))));
                    }
                    let token = self.next()?;
                    if token.is(paren.end) {
                        break;
                    }
                    if !paren.separator.is_some_and(|s| token.is(s)) {
                        return Err(self.unexpected(&token, &format!("expected '{}'", paren.end)));
                    }
                }
            }
        } else if start.is_name() {
            declared.push((self.next()?, None));
        } else {
            return Err(self.unexpected(&start, "expected a parameter list"));
        }

        if let Some(signature) = signature
            && signature.params.len() != declared.len()
        {
            return Err(Self::error_at(
                ParseErrorKind::Type,
                format!(
                    "declaration has {} parameter(s) but the signature expects {}",
                    declared.len(),
                    signature.params.len()
                ),
                &start,
            ));
        }

        let mut params = Vec::with_capacity(declared.len());
        for (index, (name, written)) in declared.into_iter().enumerate() {
            let expected = signature.map(|signature| &signature.params[index]);
            let ty = match (written, expected) {
                (Some((ty, type_token)), Some(expected)) if ty != *expected => {
                    return Err(Self::error_at(
                        ParseErrorKind::Type,
                        format!("parameter '{}' is declared '{ty}' but the signature expects '{expected}'", name.text),
                        &type_token,
                    ));
                }
                (Some((ty, _)), _) => ty,
                (None, Some(expected)) => expected.clone(),
                (None, None) => {
                    return Err(Self::error_at(
                        ParseErrorKind::Type,
                        format!("parameter '{}' needs a type", name.text),
                        &name,
                    ));
                }
            };
            self.declare(&name, ty.clone())?;
            params.push(ty);
        }
        Ok(params)
    }

    /// Type the next `return` must produce, fixing it on first use when the
    /// declaration has no signature.
    pub(crate) fn return_slot(&mut self, value: Option<&Type>) -> Option<Type> {
        match &mut self.return_type {
            ReturnType::Declared(ty) => Some(ty.clone()),
            ReturnType::Inferred(fixed @ None) => {
                let ty = value.cloned().unwrap_or(Type::Void);
                *fixed = Some(ty.clone());
                Some(ty)
            }
            ReturnType::Inferred(Some(ty)) => Some(ty.clone()),
        }
    }

    pub(crate) fn declared_return(&self) -> Option<&Type> {
        match &self.return_type {
            ReturnType::Declared(ty) => Some(ty),
            ReturnType::Inferred(_) => None,
        }
    }

    pub(crate) fn is_implicit(&self, from: &Type, to: &Type) -> bool {
        is_implicitly_convertible(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StandardCatalog;
    use crate::compiler::SourceFlavor;
    use crate::compiler::frontends::dialect_for;
    use crate::compiler::ir::ExprKind;

    fn lower(source: &str, signature: Option<&Signature>) -> ParseResult<Function> {
        let catalog = StandardCatalog::new();
        let mut parser = Parser::new(source, dialect_for(SourceFlavor::CSharp), &catalog, None);
        parser.parse_function(signature)
    }

    #[test]
    fn precedence_groups_multiplication_first() {
        let function = lower("(int a, int b) => a + b * 2", None).expect("lowers");
        let ExprKind::Binary { rhs, .. } = &function.body.kind else {
            panic!("expected a binary node, got {:?}", function.body.kind);
        };
        assert!(matches!(rhs.kind, ExprKind::Binary { .. }));
        assert_eq!(function.signature.ret, Type::Int);
    }

    #[test]
    fn untyped_parameters_take_signature_types() {
        let signature = Signature::new(vec![Type::Long, Type::Long], Type::Long);
        let function = lower("(a, b) => a - b", Some(&signature)).expect("lowers");
        assert_eq!(function.signature, signature);
        let single = Signature::new(vec![Type::String], Type::Int);
        lower("s => s.Length", Some(&single)).expect("single bare parameter");
        let none = Signature::new(vec![], Type::Bool);
        lower("() => true", Some(&none)).expect("empty parameter list");
    }

    #[test]
    fn parameter_mismatches_are_type_errors() {
        let signature = Signature::new(vec![Type::Int], Type::Int);
        let err = lower("(long x) => 1", Some(&signature)).expect_err("type differs");
        assert_eq!(err.kind, ParseErrorKind::Type);
        assert_eq!(err.offset, 1);
        let err = lower("(a, b) => 1", Some(&signature)).expect_err("arity differs");
        assert_eq!(err.kind, ParseErrorKind::Type);
    }

    #[test]
    fn generic_and_nullable_types_parse() {
        let function = lower("(List<List<int>> xs, int? n) => n ?? xs.Length", None).expect("lowers");
        assert_eq!(
            function.signature.params,
            vec![Type::array(Type::array(Type::Int)), Type::nullable(Type::Int)]
        );
        assert_eq!(function.signature.ret, Type::Int);
    }

    #[test]
    fn trailing_tokens_are_rejected() {
        let err = lower("(int x) => x 1", None).expect_err("trailing literal");
        assert_eq!(err.kind, ParseErrorKind::WrongSymbol);
        assert_eq!(err.offset, 13);
        let err = lower("(int x) => x)", None).expect_err("stray closer");
        assert_eq!(err.kind, ParseErrorKind::UnmatchedScope);
    }

    #[test]
    fn nesting_limit_is_enforced() {
        let catalog = StandardCatalog::new();
        let source = format!("() => {}1{}", "(".repeat(40), ")".repeat(40));
        let mut parser = Parser::new(&source, dialect_for(SourceFlavor::CSharp), &catalog, Some(16));
        let err = parser.parse_function(None).expect_err("too deep");
        assert_eq!(err.kind, ParseErrorKind::WrongSymbol);
        assert!(err.message.contains("nesting"));
    }
}
