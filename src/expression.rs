//! Template expressions.
//!
//! The expression forms that appear inside output statements and tag
//! arguments: primitives (literals, ranges and variable paths), filtered
//! expressions with optional inline conditions, boolean expressions, and
//! the loop expression of iteration tags. Parsing consumes the expression
//! tokens lexed into each markup token; evaluation is strictly synchronous
//! and reads the render context without mutating it, except for the loop
//! expression's `offset: continue` bookkeeping.

use core::fmt;

use crate::context::RenderContext;
use crate::environment::{FilterArgs, FilterState};
use crate::error::TemplateError;
use crate::query::{FilterExpression, Query, QueryConfig, parse::parse_query};
use crate::tokenizer::{ExprStream, ExprTokenKind, Span};
use crate::value::{Object, Value};

/// A bare name with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

/// A literal, range or variable path.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    True_ {
        span: Span,
    },
    False_ {
        span: Span,
    },
    Null {
        span: Span,
    },
    Integer {
        value: i64,
        span: Span,
    },
    Float {
        value: f64,
        span: Span,
    },
    StringLiteral {
        value: String,
        span: Span,
    },
    Range {
        start: Box<Primitive>,
        stop: Box<Primitive>,
        span: Span,
    },
    Query {
        path: Query,
    },
}

impl Primitive {
    pub fn span(&self) -> Span {
        match self {
            Self::True_ { span }
            | Self::False_ { span }
            | Self::Null { span }
            | Self::Integer { span, .. }
            | Self::Float { span, .. }
            | Self::StringLiteral { span, .. }
            | Self::Range { span, .. } => *span,
            Self::Query { path } => path.span,
        }
    }

    pub fn evaluate(&self, context: &RenderContext<'_>) -> Result<Value, TemplateError> {
        match self {
            Self::True_ { .. } => Ok(Value::Bool(true)),
            Self::False_ { .. } => Ok(Value::Bool(false)),
            Self::Null { .. } => Ok(Value::Null),
            Self::Integer { value, .. } => Ok(Value::Integer(*value)),
            Self::Float { value, .. } => Ok(Value::Float(*value)),
            Self::StringLiteral { value, .. } => Ok(Value::String(value.clone())),
            Self::Range { start, stop, .. } => {
                let begin = to_integer(&start.evaluate(context)?, start.span())?;
                let end = to_integer(&stop.evaluate(context)?, stop.span())?;
                if begin > end {
                    return Ok(Value::Array(Vec::new()));
                }
                Ok(Value::Array((begin..=end).map(Value::Integer).collect()))
            }
            Self::Query { path } => context.get(path, path.span, None),
        }
    }
}

fn to_integer(value: &Value, span: Span) -> Result<i64, TemplateError> {
    match value {
        Value::Integer(n) => Ok(*n),
        Value::Float(f) => Ok(*f as i64),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| TemplateError::Type {
            message: format!("'{s}' is not an integer"),
            span: Some(span),
        }),
        other => Err(TemplateError::Type {
            message: format!("expected an integer, found '{}'", other.render_str()),
            span: Some(span),
        }),
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True_ { .. } => f.write_str("true"),
            Self::False_ { .. } => f.write_str("false"),
            Self::Null { .. } => f.write_str("null"),
            Self::Integer { value, .. } => write!(f, "{value}"),
            Self::Float { value, .. } => write!(f, "{value}"),
            Self::StringLiteral { value, .. } => write!(f, "'{value}'"),
            Self::Range { start, stop, .. } => write!(f, "({start}..{stop})"),
            Self::Query { path } => write!(f, "{path}"),
        }
    }
}

/// One filter application in a chain, e.g. `append: suffix`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    pub name: String,
    pub span: Span,
    pub args: Vec<FilterArg>,
}

/// A positional or keyword filter/tag argument.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterArg {
    pub name: Option<Identifier>,
    pub value: Primitive,
}

/// A primitive piped through zero or more filters, with an optional inline
/// condition: `left | filters if cond else alt | alt-filters || tail`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredExpression {
    pub left: Primitive,
    pub filters: Vec<FilterCall>,
    pub condition: Option<InlineCondition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineCondition {
    pub expr: BooleanExpression,
    pub alternative: Option<Primitive>,
    pub alternative_filters: Vec<FilterCall>,
    pub tail_filters: Vec<FilterCall>,
}

impl FilteredExpression {
    pub fn span(&self) -> Span {
        self.left.span()
    }

    pub fn evaluate(&self, context: &RenderContext<'_>) -> Result<Value, TemplateError> {
        match &self.condition {
            None => {
                let value = self.left.evaluate(context)?;
                apply_filters(value, &self.filters, context)
            }
            Some(condition) => {
                let value = if condition.expr.evaluate(context)? {
                    let value = self.left.evaluate(context)?;
                    apply_filters(value, &self.filters, context)?
                } else {
                    let value = match &condition.alternative {
                        Some(alternative) => alternative.evaluate(context)?,
                        None => Value::Null,
                    };
                    apply_filters(value, &condition.alternative_filters, context)?
                };
                apply_filters(value, &condition.tail_filters, context)
            }
        }
    }
}

/// Run `value` through a filter chain, resolving each filter by name and
/// binding context state for filters that declare they want it.
pub fn apply_filters(
    value: Value,
    filters: &[FilterCall],
    context: &RenderContext<'_>,
) -> Result<Value, TemplateError> {
    let mut out = value;
    for call in filters {
        let filter = context.filter(&call.name, call.span)?;

        let mut positional = Vec::new();
        let mut keyword = Object::new();
        for arg in &call.args {
            let value = arg.value.evaluate(context)?;
            match &arg.name {
                Some(name) => {
                    keyword.insert(name.name.clone(), value);
                }
                None => positional.push(value),
            }
        }

        let args = FilterArgs {
            positional,
            keyword,
            name: call.name.clone(),
            span: call.span,
        };
        let state = FilterState {
            env: context.env,
            context: filter.wants_context().then_some(context),
            span: call.span,
        };
        out = filter.call(&out, &args, &state)?;
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum BooleanOperator {
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CompareOperator {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = "<")]
    Lt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum MembershipOperator {
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "not in")]
    NotIn,
    #[strum(serialize = "contains")]
    Contains,
    #[strum(serialize = "not contains")]
    NotContains,
}

/// A boolean expression of a conditional tag or inline condition.
#[derive(Debug, Clone, PartialEq)]
pub enum BooleanExpression {
    Primitive {
        expr: Primitive,
    },
    LogicalNot {
        expr: Box<BooleanExpression>,
        span: Span,
    },
    Logical {
        left: Box<BooleanExpression>,
        operator: BooleanOperator,
        right: Box<BooleanExpression>,
    },
    Comparison {
        left: Primitive,
        operator: CompareOperator,
        right: Primitive,
        span: Span,
    },
    Membership {
        left: Primitive,
        operator: MembershipOperator,
        right: Primitive,
        span: Span,
    },
}

impl BooleanExpression {
    pub fn span(&self) -> Span {
        match self {
            Self::Primitive { expr } => expr.span(),
            Self::LogicalNot { span, .. } => *span,
            Self::Logical { left, .. } => left.span(),
            Self::Comparison { span, .. } | Self::Membership { span, .. } => *span,
        }
    }

    pub fn evaluate(&self, context: &RenderContext<'_>) -> Result<bool, TemplateError> {
        match self {
            Self::Primitive { expr } => Ok(expr.evaluate(context)?.is_truthy()),
            Self::LogicalNot { expr, .. } => Ok(!expr.evaluate(context)?),
            Self::Logical {
                left,
                operator,
                right,
            } => match operator {
                BooleanOperator::And => Ok(left.evaluate(context)? && right.evaluate(context)?),
                BooleanOperator::Or => Ok(left.evaluate(context)? || right.evaluate(context)?),
            },
            Self::Comparison {
                left,
                operator,
                right,
                span,
            } => {
                let lhs = left.evaluate(context)?;
                let rhs = right.evaluate(context)?;
                compare(&lhs, *operator, &rhs, *span)
            }
            Self::Membership {
                left,
                operator,
                right,
                ..
            } => {
                let lhs = left.evaluate(context)?;
                let rhs = right.evaluate(context)?;
                Ok(membership(&lhs, *operator, &rhs))
            }
        }
    }
}

fn compare(
    left: &Value,
    operator: CompareOperator,
    right: &Value,
    span: Span,
) -> Result<bool, TemplateError> {
    match operator {
        CompareOperator::Eq => Ok(left == right),
        CompareOperator::Ne => Ok(left != right),
        _ => {
            let ordering = partial_order(left, right).ok_or_else(|| TemplateError::Type {
                message: format!(
                    "'{operator}' is not allowed between '{}' and '{}'",
                    left.render_str(),
                    right.render_str()
                ),
                span: Some(span),
            })?;
            Ok(match operator {
                CompareOperator::Gt => ordering.is_gt(),
                CompareOperator::Ge => ordering.is_ge(),
                CompareOperator::Lt => ordering.is_lt(),
                CompareOperator::Le => ordering.is_le(),
                CompareOperator::Eq | CompareOperator::Ne => unreachable!(),
            })
        }
    }
}

pub(crate) fn partial_order(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn membership(left: &Value, operator: MembershipOperator, right: &Value) -> bool {
    match operator {
        MembershipOperator::In => contains(right, left),
        MembershipOperator::NotIn => !contains(right, left),
        MembershipOperator::Contains => contains(left, right),
        MembershipOperator::NotContains => !contains(left, right),
    }
}

fn contains(collection: &Value, item: &Value) -> bool {
    match collection {
        Value::Array(items) => items.iter().any(|candidate| candidate == item),
        Value::Object(members) => item
            .as_str()
            .map(|key| members.contains_key(key))
            .unwrap_or(false),
        Value::String(s) => match item {
            Value::String(sub) => s.contains(sub.as_str()),
            Value::Integer(_) | Value::Float(_) => s.contains(&item.render_str()),
            _ => false,
        },
        _ => false,
    }
}

/// The `offset:` argument of a loop expression.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOffset {
    Expr(Primitive),
    /// `offset: continue`: resume where the previous loop over the same
    /// collection stopped.
    Continue(Span),
}

/// The expression of an iteration tag:
/// `item in collection limit: n offset: m reversed`.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopExpression {
    pub identifier: Identifier,
    pub iterable: Primitive,
    pub limit: Option<Primitive>,
    pub offset: Option<LoopOffset>,
    pub reversed: bool,
}

impl LoopExpression {
    /// The key stateful `offset: continue` bookkeeping is stored under.
    pub fn stop_index_key(&self) -> String {
        format!("{}-{}", self.identifier.name, self.iterable)
    }

    /// Evaluate to the concrete item sequence for this pass of the loop.
    pub fn evaluate(&self, context: &mut RenderContext<'_>) -> Result<Vec<Value>, TemplateError> {
        let iterable = self.iterable.evaluate(context)?;
        let mut items: Vec<Value> = match iterable {
            Value::Array(items) => items,
            // Objects iterate as [key, value] pairs.
            Value::Object(members) => members
                .into_iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k), v]))
                .collect(),
            Value::String(s) => vec![Value::String(s)],
            _ => Vec::new(),
        };

        let offset = match &self.offset {
            None => 0,
            Some(LoopOffset::Expr(expr)) => {
                let n = to_integer(&expr.evaluate(context)?, expr.span())?;
                n.max(0) as usize
            }
            Some(LoopOffset::Continue(_)) => context.stop_index(&self.stop_index_key()),
        };

        if offset >= items.len() {
            items.clear();
        } else {
            items.drain(..offset);
        }

        if let Some(limit) = &self.limit {
            let n = to_integer(&limit.evaluate(context)?, limit.span())?;
            items.truncate(n.max(0) as usize);
        }

        context.set_stop_index(&self.stop_index_key(), offset + items.len());

        if self.reversed {
            items.reverse();
        }
        Ok(items)
    }
}

impl fmt::Display for LoopExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.identifier.name, self.iterable)?;
        if let Some(limit) = &self.limit {
            write!(f, " limit: {limit}")?;
        }
        match &self.offset {
            Some(LoopOffset::Expr(offset)) => write!(f, " offset: {offset}")?,
            Some(LoopOffset::Continue(_)) => write!(f, " offset: continue")?,
            None => {}
        }
        if self.reversed {
            f.write_str(" reversed")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

pub fn parse_primitive(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<Primitive, TemplateError> {
    let span = stream.span();
    match stream.kind() {
        Some(ExprTokenKind::True_) => {
            stream.next();
            Ok(Primitive::True_ { span })
        }
        Some(ExprTokenKind::False_) => {
            stream.next();
            Ok(Primitive::False_ { span })
        }
        Some(ExprTokenKind::Null) => {
            stream.next();
            Ok(Primitive::Null { span })
        }
        Some(ExprTokenKind::IntegerLiteral(n)) => {
            let value = *n;
            stream.next();
            Ok(Primitive::Integer { value, span })
        }
        Some(ExprTokenKind::FloatLiteral(x)) => {
            let value = *x;
            stream.next();
            Ok(Primitive::Float { value, span })
        }
        Some(ExprTokenKind::StringLiteral(s)) => {
            let value = s.clone();
            stream.next();
            Ok(Primitive::StringLiteral { value, span })
        }
        Some(ExprTokenKind::LeftParen) => {
            stream.next();
            let start = parse_primitive(stream, config)?;
            stream.expect(&ExprTokenKind::DotDot)?;
            let stop = parse_primitive(stream, config)?;
            let close = stream.expect(&ExprTokenKind::RightParen)?;
            Ok(Primitive::Range {
                start: Box::new(start),
                stop: Box::new(stop),
                span: span.to(close.span),
            })
        }
        Some(ExprTokenKind::Word(_)) | Some(ExprTokenKind::LeftBracket) => {
            let path = parse_query(stream, config)?;
            Ok(Primitive::Query { path })
        }
        _ => Err(stream.syntax_error("expected an expression")),
    }
}

pub fn parse_identifier(stream: &mut ExprStream) -> Result<Identifier, TemplateError> {
    let (name, span) = stream.expect_word()?;
    Ok(Identifier { name, span })
}

/// Accept a bare word or a quoted string as a name.
pub fn parse_string_or_identifier(stream: &mut ExprStream) -> Result<Identifier, TemplateError> {
    match stream.kind() {
        Some(ExprTokenKind::StringLiteral(s)) => {
            let name = s.clone();
            let span = stream.span();
            stream.next();
            Ok(Identifier { name, span })
        }
        _ => parse_identifier(stream),
    }
}

pub fn parse_filtered_expression(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<FilteredExpression, TemplateError> {
    let left = parse_primitive(stream, config)?;
    let filters = parse_filters(stream, config)?;

    let condition = if stream.kind() == Some(&ExprTokenKind::If) {
        stream.next();
        let expr = parse_boolean_expression(stream, config)?;

        let mut alternative = None;
        let mut alternative_filters = Vec::new();
        if stream.eat(&ExprTokenKind::Else) {
            alternative = Some(parse_primitive(stream, config)?);
            alternative_filters = parse_filters(stream, config)?;
        }

        let mut tail_filters = Vec::new();
        if stream.eat(&ExprTokenKind::DoublePipe) {
            tail_filters.push(parse_one_filter(stream, config)?);
            while stream.eat(&ExprTokenKind::Pipe) {
                tail_filters.push(parse_one_filter(stream, config)?);
            }
        }

        Some(InlineCondition {
            expr,
            alternative,
            alternative_filters,
            tail_filters,
        })
    } else {
        None
    };

    Ok(FilteredExpression {
        left,
        filters,
        condition,
    })
}

pub fn parse_filters(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<Vec<FilterCall>, TemplateError> {
    let mut filters = Vec::new();
    while stream.eat(&ExprTokenKind::Pipe) {
        filters.push(parse_one_filter(stream, config)?);
    }
    Ok(filters)
}

fn parse_one_filter(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<FilterCall, TemplateError> {
    let (name, span) = stream.expect_word()?;
    let mut args = Vec::new();

    if stream.eat(&ExprTokenKind::Colon) {
        loop {
            args.push(parse_argument(stream, config)?);
            if !stream.eat(&ExprTokenKind::Comma) {
                break;
            }
        }
    }

    Ok(FilterCall { name, span, args })
}

/// Parse one `value` or `name: value` argument.
fn parse_argument(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<FilterArg, TemplateError> {
    if matches!(stream.kind(), Some(ExprTokenKind::Word(_)))
        && stream.peek() == Some(&ExprTokenKind::Colon)
    {
        let name = parse_identifier(stream)?;
        stream.next(); // :
        let value = parse_primitive(stream, config)?;
        return Ok(FilterArg {
            name: Some(name),
            value,
        });
    }
    Ok(FilterArg {
        name: None,
        value: parse_primitive(stream, config)?,
    })
}

/// Parse trailing `name: value` arguments, as used by include/render tags.
/// A leading comma after the target is optional, as are commas between
/// arguments.
pub fn parse_keyword_arguments(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<Vec<FilterArg>, TemplateError> {
    let mut args = Vec::new();
    stream.eat(&ExprTokenKind::Comma);
    while !stream.at_end() {
        let name = parse_identifier(stream)?;
        stream.expect(&ExprTokenKind::Colon)?;
        let value = parse_primitive(stream, config)?;
        args.push(FilterArg {
            name: Some(name),
            value,
        });
        stream.eat(&ExprTokenKind::Comma);
    }
    Ok(args)
}

pub fn parse_boolean_expression(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<BooleanExpression, TemplateError> {
    parse_bool_or(stream, config)
}

fn parse_bool_or(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<BooleanExpression, TemplateError> {
    let mut left = parse_bool_and(stream, config)?;
    while stream.eat(&ExprTokenKind::Or) {
        let right = parse_bool_and(stream, config)?;
        left = BooleanExpression::Logical {
            left: Box::new(left),
            operator: BooleanOperator::Or,
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_bool_and(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<BooleanExpression, TemplateError> {
    let mut left = parse_bool_not(stream, config)?;
    while stream.eat(&ExprTokenKind::And) {
        let right = parse_bool_not(stream, config)?;
        left = BooleanExpression::Logical {
            left: Box::new(left),
            operator: BooleanOperator::And,
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_bool_not(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<BooleanExpression, TemplateError> {
    let span = stream.span();
    if stream.eat(&ExprTokenKind::Not) {
        let expr = parse_bool_not(stream, config)?;
        return Ok(BooleanExpression::LogicalNot {
            span: span.to(expr.span()),
            expr: Box::new(expr),
        });
    }
    parse_bool_operand(stream, config)
}

fn parse_bool_operand(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<BooleanExpression, TemplateError> {
    if stream.eat(&ExprTokenKind::LeftParen) {
        let grouped = parse_bool_or(stream, config)?;
        stream.expect(&ExprTokenKind::RightParen)?;
        return Ok(grouped);
    }

    let left = parse_primitive(stream, config)?;

    let compare_operator = match stream.kind() {
        Some(ExprTokenKind::Eq) => Some(CompareOperator::Eq),
        Some(ExprTokenKind::Ne) => Some(CompareOperator::Ne),
        Some(ExprTokenKind::Ge) => Some(CompareOperator::Ge),
        Some(ExprTokenKind::Gt) => Some(CompareOperator::Gt),
        Some(ExprTokenKind::Le) => Some(CompareOperator::Le),
        Some(ExprTokenKind::Lt) => Some(CompareOperator::Lt),
        _ => None,
    };
    if let Some(operator) = compare_operator {
        stream.next();
        let right = parse_primitive(stream, config)?;
        return Ok(BooleanExpression::Comparison {
            span: left.span().to(right.span()),
            left,
            operator,
            right,
        });
    }

    let membership_operator = match stream.kind() {
        Some(ExprTokenKind::In) => Some(MembershipOperator::In),
        Some(ExprTokenKind::Contains) => Some(MembershipOperator::Contains),
        Some(ExprTokenKind::Not) => match stream.peek() {
            Some(ExprTokenKind::In) => Some(MembershipOperator::NotIn),
            Some(ExprTokenKind::Contains) => Some(MembershipOperator::NotContains),
            _ => None,
        },
        _ => None,
    };
    if let Some(operator) = membership_operator {
        stream.next();
        if matches!(operator, MembershipOperator::NotIn | MembershipOperator::NotContains) {
            stream.next();
        }
        let right = parse_primitive(stream, config)?;
        return Ok(BooleanExpression::Membership {
            span: left.span().to(right.span()),
            left,
            operator,
            right,
        });
    }

    Ok(BooleanExpression::Primitive { expr: left })
}

pub fn parse_loop_expression(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<LoopExpression, TemplateError> {
    let identifier = parse_identifier(stream)?;
    stream.expect(&ExprTokenKind::In)?;
    let iterable = parse_primitive(stream, config)?;

    let mut limit = None;
    let mut offset = None;
    let mut reversed = false;

    loop {
        // Commas between loop arguments are optional.
        stream.eat(&ExprTokenKind::Comma);
        match stream.kind() {
            Some(ExprTokenKind::Word(word)) if word == "limit" => {
                stream.next();
                stream.expect(&ExprTokenKind::Colon)?;
                limit = Some(parse_primitive(stream, config)?);
            }
            Some(ExprTokenKind::Word(word)) if word == "offset" => {
                stream.next();
                stream.expect(&ExprTokenKind::Colon)?;
                match stream.kind() {
                    Some(ExprTokenKind::Word(word)) if word == "continue" => {
                        let span = stream.span();
                        stream.next();
                        offset = Some(LoopOffset::Continue(span));
                    }
                    _ => offset = Some(LoopOffset::Expr(parse_primitive(stream, config)?)),
                }
            }
            Some(ExprTokenKind::Word(word)) if word == "reversed" => {
                stream.next();
                reversed = true;
            }
            _ => break,
        }
    }

    Ok(LoopExpression {
        identifier,
        iterable,
        limit,
        offset,
        reversed,
    })
}

// ---------------------------------------------------------------------------
// Introspection, used by static analysis
// ---------------------------------------------------------------------------

impl Primitive {
    /// Call `f` for every variable path referenced by this primitive,
    /// including queries nested inside selectors.
    pub fn visit_queries(&self, f: &mut dyn FnMut(&Query)) {
        match self {
            Self::Query { path } => visit_query(path, f),
            Self::Range { start, stop, .. } => {
                start.visit_queries(f);
                stop.visit_queries(f);
            }
            _ => {}
        }
    }
}

fn visit_query(query: &Query, f: &mut dyn FnMut(&Query)) {
    f(query);
    for selector in &query.selectors {
        match selector {
            crate::query::Selector::Nested { query, .. } => visit_query(query, f),
            crate::query::Selector::Filter { expression, .. } => {
                visit_filter_expression(expression, f)
            }
            _ => {}
        }
    }
}

fn visit_filter_expression(expression: &FilterExpression, f: &mut dyn FnMut(&Query)) {
    match expression {
        FilterExpression::Not { expression, .. } => visit_filter_expression(expression, f),
        FilterExpression::Logical { left, right, .. }
        | FilterExpression::Comparison { left, right, .. } => {
            visit_filter_expression(left, f);
            visit_filter_expression(right, f);
        }
        FilterExpression::RootQuery { query, .. } => visit_query(query, f),
        FilterExpression::Function { args, .. } => {
            for arg in args {
                visit_filter_expression(arg, f);
            }
        }
        // Relative queries resolve against the candidate node, not the
        // template scope.
        _ => {}
    }
}

impl FilteredExpression {
    pub fn visit_queries(&self, f: &mut dyn FnMut(&Query)) {
        self.left.visit_queries(f);
        for call in &self.filters {
            for arg in &call.args {
                arg.value.visit_queries(f);
            }
        }
        if let Some(condition) = &self.condition {
            condition.expr.visit_queries(f);
            if let Some(alternative) = &condition.alternative {
                alternative.visit_queries(f);
            }
            for call in condition
                .alternative_filters
                .iter()
                .chain(&condition.tail_filters)
            {
                for arg in &call.args {
                    arg.value.visit_queries(f);
                }
            }
        }
    }

    /// Call `f` for every filter applied anywhere in this expression.
    pub fn visit_filters(&self, f: &mut dyn FnMut(&FilterCall)) {
        for call in &self.filters {
            f(call);
        }
        if let Some(condition) = &self.condition {
            for call in condition
                .alternative_filters
                .iter()
                .chain(&condition.tail_filters)
            {
                f(call);
            }
        }
    }
}

impl BooleanExpression {
    pub fn visit_queries(&self, f: &mut dyn FnMut(&Query)) {
        match self {
            Self::Primitive { expr } => expr.visit_queries(f),
            Self::LogicalNot { expr, .. } => expr.visit_queries(f),
            Self::Logical { left, right, .. } => {
                left.visit_queries(f);
                right.visit_queries(f);
            }
            Self::Comparison { left, right, .. } | Self::Membership { left, right, .. } => {
                left.visit_queries(f);
                right.visit_queries(f);
            }
        }
    }
}

impl LoopExpression {
    pub fn visit_queries(&self, f: &mut dyn FnMut(&Query)) {
        self.iterable.visit_queries(f);
        if let Some(limit) = &self.limit {
            limit.visit_queries(f);
        }
        if let Some(LoopOffset::Expr(offset)) = &self.offset {
            offset.visit_queries(f);
        }
    }
}
