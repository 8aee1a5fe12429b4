//! Overload resolution shared by calls, constructors, interpolation appends
//! and operators.

use std::cmp::Ordering;

use super::ir::{Expr, ExprKind};
use super::lexer::Token;
use super::parser::Parser;
use super::{ParseErrorKind, ParseResult};
use crate::catalog::{Member, MemberScope, Method};
use crate::types::{CONSTANT_NARROWING_COST, Type, explicit_allowed, implicit_cost, unify_types};
use crate::value::Value;
use crate::vm::{self, BinaryOp, OperandKind, UnaryOp};

/// Something with a parameter list that arguments can be matched against.
pub(crate) trait Overload {
    fn parameters(&self) -> &[Type];

    /// Element type of a trailing variable-arity parameter.
    fn rest(&self) -> Option<&Type> {
        None
    }
}

impl Overload for Method {
    fn parameters(&self) -> &[Type] {
        &self.params
    }

    fn rest(&self) -> Option<&Type> {
        self.rest.as_ref()
    }
}

impl<const N: usize> Overload for [Type; N] {
    fn parameters(&self) -> &[Type] {
        self
    }
}

#[derive(Debug)]
pub(crate) struct Resolved {
    pub(crate) index: usize,
    /// Arguments converted to the chosen parameter types.
    pub(crate) args: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolveFailure {
    NoMatch,
    Ambiguous,
}

struct Applicable {
    index: usize,
    /// Parameter type each argument converts to.
    targets: Vec<Type>,
    costs: Vec<u32>,
    /// First argument packed into the rest array, in expanded form.
    packed_from: Option<usize>,
    rest: Option<Type>,
}

impl Applicable {
    fn total(&self) -> u32 {
        self.costs.iter().sum()
    }
}

/// Cost of passing `arg` where `to` is expected, including narrowing of
/// constants that fit the target.
pub(crate) fn argument_cost(arg: &Expr, to: &Type) -> Option<u32> {
    if let Some(cost) = implicit_cost(&arg.ty, to) {
        return Some(cost);
    }
    let nullable_step = u32::from(matches!(to, Type::Nullable(_)));
    let fits = match (arg.as_constant()?, to.underlying()) {
        (Value::Long(value), Type::Int) => i32::try_from(*value).is_ok(),
        (Value::Double(value), Type::Float) => {
            value.is_finite() && f64::from(*value as f32) == *value
        }
        _ => false,
    };
    fits.then_some(CONSTANT_NARROWING_COST + nullable_step)
}

/// Wraps `expr` in a conversion to `to`, folding constants.
pub(crate) fn coerce(expr: Expr, to: &Type) -> Expr {
    if expr.ty == *to {
        return expr;
    }
    if let ExprKind::Constant(value) = &expr.kind
        && let Ok(converted) = value.convert_to(to)
    {
        return Expr::constant(converted, to.clone());
    }
    Expr::new(ExprKind::Convert(Box::new(expr)), to.clone())
}

/// Implicit conversion, or `None` when none exists.
pub(crate) fn convert(expr: Expr, to: &Type) -> Option<Expr> {
    argument_cost(&expr, to)?;
    Some(coerce(expr, to))
}

/// Conversion written as a cast; checked again at run time.
pub(crate) fn convert_explicit(expr: Expr, to: &Type) -> Option<Expr> {
    if argument_cost(&expr, to).is_some() || explicit_allowed(&expr.ty, to) {
        return Some(coerce(expr, to));
    }
    None
}

/// Picks the single best candidate for `args`. Exact-arity candidates win
/// over expanded variable-arity ones.
pub(crate) fn resolve<O: Overload>(
    candidates: &[O],
    args: Vec<Expr>,
) -> Result<Resolved, ResolveFailure> {
    let normal: Vec<Applicable> = candidates
        .iter()
        .enumerate()
        .filter_map(|(index, candidate)| normal_form(index, candidate, &args))
        .collect();
    let chosen = if normal.is_empty() {
        let expanded: Vec<Applicable> = candidates
            .iter()
            .enumerate()
            .filter_map(|(index, candidate)| expanded_form(index, candidate, &args))
            .collect();
        pick(expanded)?
    } else {
        pick(normal)?
    };

    let mut converted: Vec<Expr> = args
        .into_iter()
        .zip(&chosen.targets)
        .map(|(arg, target)| coerce(arg, target))
        .collect();
    if let (Some(from), Some(rest)) = (chosen.packed_from, chosen.rest) {
        let packed = converted.split_off(from);
        converted.push(Expr::new(ExprKind::NewArray(packed), Type::array(rest)));
    }
    Ok(Resolved {
        index: chosen.index,
        args: converted,
    })
}

fn normal_form<O: Overload>(index: usize, candidate: &O, args: &[Expr]) -> Option<Applicable> {
    let mut targets = candidate.parameters().to_vec();
    if let Some(rest) = candidate.rest() {
        targets.push(Type::array(rest.clone()));
    }
    if targets.len() != args.len() {
        return None;
    }
    let costs = args
        .iter()
        .zip(&targets)
        .map(|(arg, target)| argument_cost(arg, target))
        .collect::<Option<Vec<_>>>()?;
    Some(Applicable {
        index,
        targets,
        costs,
        packed_from: None,
        rest: None,
    })
}

fn expanded_form<O: Overload>(index: usize, candidate: &O, args: &[Expr]) -> Option<Applicable> {
    let rest = candidate.rest()?;
    let fixed = candidate.parameters();
    if args.len() < fixed.len() {
        return None;
    }
    let mut targets = fixed.to_vec();
    targets.resize(args.len(), rest.clone());
    let costs = args
        .iter()
        .zip(&targets)
        .map(|(arg, target)| argument_cost(arg, target))
        .collect::<Option<Vec<_>>>()?;
    Some(Applicable {
        index,
        targets,
        costs,
        packed_from: Some(fixed.len()),
        rest: Some(rest.clone()),
    })
}

fn pick(applicable: Vec<Applicable>) -> Result<Applicable, ResolveFailure> {
    if applicable.is_empty() {
        return Err(ResolveFailure::NoMatch);
    }
    let best = (0..applicable.len()).find(|&i| {
        (0..applicable.len()).all(|j| i == j || is_better(&applicable[i], &applicable[j]))
    });
    match best {
        Some(index) => {
            let mut applicable = applicable;
            Ok(applicable.swap_remove(index))
        }
        None => Err(ResolveFailure::Ambiguous),
    }
}

/// `a` is better when it is no worse on every argument and better on one;
/// otherwise the lower total cost decides.
fn is_better(a: &Applicable, b: &Applicable) -> bool {
    let (mut a_wins, mut b_wins) = (false, false);
    for k in 0..a.costs.len() {
        match compare_argument(a.costs[k], &a.targets[k], b.costs[k], &b.targets[k]) {
            Ordering::Less => a_wins = true,
            Ordering::Greater => b_wins = true,
            Ordering::Equal => {}
        }
    }
    match (a_wins, b_wins) {
        (true, false) => true,
        (false, true) => false,
        _ => a.total() < b.total(),
    }
}

fn compare_argument(a_cost: u32, a_ty: &Type, b_cost: u32, b_ty: &Type) -> Ordering {
    match a_cost.cmp(&b_cost) {
        Ordering::Equal if a_ty != b_ty => {
            // Equal cost: the more specific parameter type wins.
            let a_to_b = implicit_cost(a_ty, b_ty).is_some();
            let b_to_a = implicit_cost(b_ty, a_ty).is_some();
            match (a_to_b, b_to_a) {
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ => Ordering::Equal,
            }
        }
        other => other,
    }
}

/// Common type of every item, e.g. for an implicitly-typed array.
pub(crate) fn unify_all<'t>(types: impl IntoIterator<Item = &'t Type>) -> Option<Type> {
    let mut types = types.into_iter();
    let first = types.next()?.clone();
    types.try_fold(first, |common, ty| unify_types(&common, ty))
}

pub(crate) fn operand_kind(ty: &Type) -> OperandKind {
    match ty {
        Type::Bool => OperandKind::Bool,
        Type::Int => OperandKind::Int,
        Type::Long => OperandKind::Long,
        Type::Float => OperandKind::Float,
        Type::Double => OperandKind::Double,
        Type::String => OperandKind::String,
        _ => OperandKind::Ref,
    }
}

fn numeric_types() -> [Type; 4] {
    [Type::Int, Type::Long, Type::Float, Type::Double]
}

fn binary_candidates(op: BinaryOp) -> Vec<[Type; 2]> {
    let numeric = || numeric_types().into_iter().map(|ty| [ty.clone(), ty]);
    match op {
        BinaryOp::Add => numeric()
            .chain([
                [Type::String, Type::String],
                [Type::String, Type::Object],
                [Type::Object, Type::String],
            ])
            .collect(),
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => numeric().collect(),
        BinaryOp::Pow => vec![[Type::Double, Type::Double]],
        BinaryOp::Shl | BinaryOp::Shr => vec![[Type::Int, Type::Int], [Type::Long, Type::Int]],
        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => vec![
            [Type::Bool, Type::Bool],
            [Type::Int, Type::Int],
            [Type::Long, Type::Long],
        ],
        BinaryOp::Eq | BinaryOp::Ne => std::iter::once([Type::Bool, Type::Bool])
            .chain(numeric())
            .chain([[Type::String, Type::String]])
            .collect(),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => numeric().collect(),
    }
}

fn unary_candidates(op: UnaryOp) -> Vec<[Type; 1]> {
    match op {
        UnaryOp::Neg => numeric_types().into_iter().map(|ty| [ty]).collect(),
        UnaryOp::Not => vec![[Type::Bool]],
        UnaryOp::BitNot => vec![[Type::Int], [Type::Long]],
    }
}

fn type_list(args: &[Expr]) -> String {
    args.iter()
        .map(|arg| arg.ty.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl<'a> Parser<'a> {
    pub(crate) fn build_unary(
        &mut self,
        op: UnaryOp,
        operand: Expr,
        token: &Token<'_>,
    ) -> ParseResult<Expr> {
        let operand_ty = operand.ty.clone();
        let candidates = unary_candidates(op);
        let resolved = resolve(&candidates, vec![operand]).map_err(|_| {
            Self::error_at(
                ParseErrorKind::Resolution,
                format!(
                    "operator '{}' cannot be applied to operand of type '{operand_ty}'",
                    op.symbol()
                ),
                token,
            )
        })?;
        let [ty] = candidates[resolved.index].clone();
        let kind = operand_kind(&ty);
        let Some(operand) = resolved.args.into_iter().next() else {
            unreachable!("unary candidates take one operand");
        };
        if let Some(value) = operand.as_constant()
            && let Ok(folded) = vm::eval_unary(op, kind, value)
        {
            return Ok(Expr::constant(folded, ty));
        }
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                kind,
                operand: Box::new(operand),
            },
            ty,
        ))
    }

    /// Binds a binary operator: host `op_*` methods first, then the built-in
    /// operand signatures, then reference equality.
    pub(crate) fn build_binary(
        &mut self,
        op: BinaryOp,
        lhs: Expr,
        rhs: Expr,
        token: &Token<'_>,
    ) -> ParseResult<Expr> {
        let (lhs_ty, rhs_ty) = (lhs.ty.clone(), rhs.ty.clone());
        if let Some(call) = self.host_operator(op, &lhs, &rhs, token)? {
            return Ok(call);
        }

        let candidates = binary_candidates(op);
        let failure = match resolve(&candidates, vec![lhs.clone(), rhs.clone()]) {
            Ok(resolved) => {
                let chosen = &candidates[resolved.index];
                if op == BinaryOp::Add && chosen.contains(&Type::String) {
                    return Ok(build_concat(resolved.args));
                }
                let left = &chosen[0];
                let kind = operand_kind(left);
                let ty = if op.is_comparison() {
                    Type::Bool
                } else {
                    left.clone()
                };
                return Ok(fold_binary(op, kind, resolved.args, ty));
            }
            Err(failure) => failure,
        };

        if matches!(op, BinaryOp::Eq | BinaryOp::Ne)
            && (lhs_ty.accepts_null() || rhs_ty.accepts_null())
            && let Some(common) = unify_types(&lhs_ty, &rhs_ty).or_else(|| {
                (lhs_ty == Type::Object || rhs_ty == Type::Object).then_some(Type::Object)
            })
        {
            let args = vec![coerce(lhs, &common), coerce(rhs, &common)];
            return Ok(fold_binary(op, OperandKind::Ref, args, Type::Bool));
        }

        let message = match failure {
            ResolveFailure::Ambiguous => format!(
                "operator '{}' is ambiguous on operands of type '{lhs_ty}' and '{rhs_ty}'",
                op.symbol()
            ),
            ResolveFailure::NoMatch => format!(
                "operator '{}' cannot be applied to operands of type '{lhs_ty}' and '{rhs_ty}'",
                op.symbol()
            ),
        };
        Err(Self::error_at(ParseErrorKind::Resolution, message, token))
    }

    fn host_operator(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        token: &Token<'_>,
    ) -> ParseResult<Option<Expr>> {
        let Some(name) = op.method_name() else {
            return Ok(None);
        };
        let mut owners = Vec::new();
        for ty in [lhs.ty.underlying(), rhs.ty.underlying()] {
            if matches!(ty, Type::Named(_)) && !owners.contains(&ty) {
                owners.push(ty);
            }
        }
        let methods: Vec<Method> = owners
            .into_iter()
            .flat_map(|owner| self.catalog.members(owner, name, MemberScope::Static))
            .filter_map(|member| match member {
                Member::Method(method) if method.params.len() == 2 => Some(method),
                _ => None,
            })
            .collect();
        if methods.is_empty() {
            return Ok(None);
        }
        match resolve(&methods, vec![lhs.clone(), rhs.clone()]) {
            Ok(resolved) => {
                let method = &methods[resolved.index];
                Ok(Some(Expr::new(
                    ExprKind::Call {
                        function: method.function.clone(),
                        args: resolved.args,
                    },
                    method.ret.clone(),
                )))
            }
            Err(ResolveFailure::NoMatch) => Ok(None),
            Err(ResolveFailure::Ambiguous) => Err(Self::error_at(
                ParseErrorKind::Resolution,
                format!(
                    "ambiguous call to '{name}' with operands of type '{}' and '{}'",
                    lhs.ty, rhs.ty
                ),
                token,
            )),
        }
    }

    /// Resolves a member or constructor call; instance receivers become the
    /// first argument.
    pub(crate) fn resolve_call(
        &self,
        methods: &[Method],
        receiver: Option<Expr>,
        args: Vec<Expr>,
        display_name: &str,
        token: &Token<'_>,
    ) -> ParseResult<Expr> {
        let arg_types = type_list(&args);
        let resolved = resolve(methods, args).map_err(|failure| {
            let message = match failure {
                ResolveFailure::NoMatch => {
                    format!("no overload of '{display_name}' accepts arguments ({arg_types})")
                }
                ResolveFailure::Ambiguous => {
                    format!("ambiguous call to '{display_name}' with arguments ({arg_types})")
                }
            };
            Self::error_at(ParseErrorKind::Resolution, message, token)
        })?;
        let method = &methods[resolved.index];
        let mut call_args: Vec<Expr> = receiver.into_iter().collect();
        call_args.extend(resolved.args);
        Ok(Expr::new(
            ExprKind::Call {
                function: method.function.clone(),
                args: call_args,
            },
            method.ret.clone(),
        ))
    }
}

fn fold_binary(op: BinaryOp, kind: OperandKind, args: Vec<Expr>, ty: Type) -> Expr {
    let mut args = args.into_iter();
    let (Some(lhs), Some(rhs)) = (args.next(), args.next()) else {
        unreachable!("binary candidates take two operands");
    };
    if let (Some(left), Some(right)) = (lhs.as_constant(), rhs.as_constant())
        && let Ok(folded) = vm::eval_binary(op, kind, left, right)
    {
        return Expr::constant(folded, ty);
    }
    Expr::new(
        ExprKind::Binary {
            op,
            kind,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty,
    )
}

/// Flattens nested concatenations and merges adjacent constants, so any
/// grouping of the same parts yields the same node.
pub(crate) fn build_concat(parts: Vec<Expr>) -> Expr {
    let mut flat: Vec<Expr> = Vec::with_capacity(parts.len());
    let mut pending = parts;
    pending.reverse();
    while let Some(part) = pending.pop() {
        match part.kind {
            ExprKind::Concat(inner) => pending.extend(inner.into_iter().rev()),
            ExprKind::Convert(inner) if part.ty == Type::Object => pending.push(*inner),
            kind => flat.push(Expr::new(kind, part.ty)),
        }
    }

    let mut merged: Vec<Expr> = Vec::with_capacity(flat.len());
    for part in flat {
        if let Some(value) = part.as_constant() {
            let text = value.to_text();
            if let Some(last) = merged.last_mut()
                && let ExprKind::Constant(previous) = &last.kind
            {
                let joined = format!("{}{text}", previous.to_text());
                *last = Expr::constant(Value::from(joined), Type::String);
                continue;
            }
            merged.push(Expr::constant(Value::from(text), Type::String));
            continue;
        }
        merged.push(part);
    }

    if let [single] = merged.as_slice()
        && single.is_constant()
    {
        return single.clone();
    }
    Expr::new(ExprKind::Concat(merged), Type::String)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(slot: u16, ty: Type) -> Expr {
        Expr::new(ExprKind::Local(slot), ty)
    }

    #[test]
    fn exact_match_beats_widening() {
        let candidates = [[Type::Long], [Type::Int], [Type::Double]];
        let resolved = resolve(&candidates, vec![local(0, Type::Int)]).expect("resolves");
        assert_eq!(resolved.index, 1);
        let resolved = resolve(&candidates, vec![local(0, Type::Char)]).expect("resolves");
        assert_eq!(resolved.index, 1, "char widens to int most cheaply");
    }

    #[test]
    fn crossed_costs_without_a_winner_are_ambiguous() {
        let candidates = [[Type::Int, Type::Double], [Type::Double, Type::Int]];
        let err = resolve(&candidates, vec![local(0, Type::Int), local(1, Type::Int)])
            .expect_err("neither dominates and totals tie");
        assert_eq!(err, ResolveFailure::Ambiguous);
    }

    #[test]
    fn null_prefers_the_more_specific_reference_type() {
        let candidates = [[Type::Object], [Type::String]];
        let null = Expr::constant(Value::Null, Type::Null);
        let resolved = resolve(&candidates, vec![null]).expect("resolves");
        assert_eq!(resolved.index, 1);
    }

    #[test]
    fn long_constants_narrow_only_when_they_fit() {
        let candidates = [[Type::Int]];
        let small = Expr::constant(Value::Long(7), Type::Long);
        let resolved = resolve(&candidates, vec![small]).expect("fits int");
        assert_eq!(resolved.args[0].as_constant(), Some(&Value::Int(7)));
        let big = Expr::constant(Value::Long(1 << 40), Type::Long);
        assert_eq!(
            resolve(&candidates, vec![big]).expect_err("does not fit"),
            ResolveFailure::NoMatch
        );
    }

    #[test]
    fn conversions_fold_constants_and_wrap_the_rest() {
        let folded = convert(Expr::constant(Value::Int(2), Type::Int), &Type::Double)
            .expect("int widens to double");
        assert_eq!(folded.as_constant(), Some(&Value::Double(2.0)));
        let wrapped = convert(local(0, Type::Int), &Type::Long).expect("int widens to long");
        assert!(matches!(wrapped.kind, ExprKind::Convert(_)));
        assert!(convert(local(0, Type::Double), &Type::Int).is_none());
        assert!(convert_explicit(local(0, Type::Double), &Type::Int).is_some());
    }

    #[test]
    fn concat_grouping_does_not_change_the_node() {
        let text = |s: &str| Expr::constant(Value::string(s), Type::String);
        let x = || local(0, Type::String);
        let left = build_concat(vec![
            build_concat(vec![build_concat(vec![text("a"), text("b")]), x()]),
            build_concat(vec![text("c"), text("d")]),
        ]);
        let right = build_concat(vec![text("ab"), x(), text("cd")]);
        assert_eq!(format!("{left:?}"), format!("{right:?}"));
        let ExprKind::Concat(parts) = &left.kind else {
            panic!("expected concat, got {:?}", left.kind);
        };
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn all_constant_concat_folds_to_text() {
        let parts = vec![
            Expr::constant(Value::string("n="), Type::String),
            Expr::constant(Value::Int(4), Type::Object),
        ];
        let folded = build_concat(parts);
        assert_eq!(folded.as_constant(), Some(&Value::string("n=4")));
    }
}
