//! Filter-predicate expressions.
//!
//! The boolean expressions inside `[?...]` selectors. `@` is the candidate
//! member/element being tested and `$` is the document root. A bare query is
//! an existence test. Evaluation errors are never swallowed; type errors
//! raised here are annotated with the selector's token by the caller if they
//! carry no span of their own.

use core::fmt;

use super::QueryConfig;
use crate::error::TemplateError;
use crate::query::Query;
use crate::tokenizer::Span;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum LogicalOp {
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CompareOp {
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

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    True_ {
        span: Span,
    },
    False_ {
        span: Span,
    },
    Null {
        span: Span,
    },
    StringLiteral {
        value: String,
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
    Not {
        expression: Box<FilterExpression>,
        span: Span,
    },
    Logical {
        left: Box<FilterExpression>,
        operator: LogicalOp,
        right: Box<FilterExpression>,
        span: Span,
    },
    Comparison {
        left: Box<FilterExpression>,
        operator: CompareOp,
        right: Box<FilterExpression>,
        span: Span,
    },
    /// A query rooted at the candidate node, `@...`.
    RelativeQuery {
        query: Query,
        span: Span,
    },
    /// A query rooted at the document root, `$...`.
    RootQuery {
        query: Query,
        span: Span,
    },
    /// A function extension application, e.g. `length(@.items)`.
    Function {
        name: String,
        args: Vec<FilterExpression>,
        span: Span,
    },
}

/// An operand value: either nothing (an empty query result) or one value.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Nothing,
    Val(Value),
}

impl FilterExpression {
    pub fn span(&self) -> Span {
        match self {
            Self::True_ { span }
            | Self::False_ { span }
            | Self::Null { span }
            | Self::StringLiteral { span, .. }
            | Self::Integer { span, .. }
            | Self::Float { span, .. }
            | Self::Not { span, .. }
            | Self::Logical { span, .. }
            | Self::Comparison { span, .. }
            | Self::RelativeQuery { span, .. }
            | Self::RootQuery { span, .. }
            | Self::Function { span, .. } => *span,
        }
    }

    /// Decide whether the predicate holds for `current`.
    pub fn truth(
        &self,
        current: &Value,
        root: &Value,
        config: &QueryConfig,
    ) -> Result<bool, TemplateError> {
        match self {
            Self::Not { expression, .. } => Ok(!expression.truth(current, root, config)?),
            Self::Logical {
                left,
                operator,
                right,
                ..
            } => match operator {
                LogicalOp::And => {
                    Ok(left.truth(current, root, config)? && right.truth(current, root, config)?)
                }
                LogicalOp::Or => {
                    Ok(left.truth(current, root, config)? || right.truth(current, root, config)?)
                }
            },
            Self::Comparison {
                left,
                operator,
                right,
                ..
            } => {
                let lhs = left.operand(current, root, config)?;
                let rhs = right.operand(current, root, config)?;
                Ok(compare(&lhs, *operator, &rhs))
            }
            // A bare query is an existence test.
            Self::RelativeQuery { query, .. } => Ok(!query.find(current, config)?.is_empty()),
            Self::RootQuery { query, .. } => Ok(!query.find(root, config)?.is_empty()),
            other => match other.operand(current, root, config)? {
                Operand::Nothing => Ok(false),
                Operand::Val(value) => Ok(value.is_truthy()),
            },
        }
    }

    fn operand(
        &self,
        current: &Value,
        root: &Value,
        config: &QueryConfig,
    ) -> Result<Operand, TemplateError> {
        match self {
            Self::True_ { .. } => Ok(Operand::Val(Value::Bool(true))),
            Self::False_ { .. } => Ok(Operand::Val(Value::Bool(false))),
            Self::Null { .. } => Ok(Operand::Val(Value::Null)),
            Self::StringLiteral { value, .. } => Ok(Operand::Val(Value::String(value.clone()))),
            Self::Integer { value, .. } => Ok(Operand::Val(Value::Integer(*value))),
            Self::Float { value, .. } => Ok(Operand::Val(Value::Float(*value))),
            Self::RelativeQuery { query, .. } => Ok(single(query.find(current, config)?.values())),
            Self::RootQuery { query, .. } => Ok(single(query.find(root, config)?.values())),
            Self::Function { name, args, span } => {
                self.call_function(name, args, *span, current, root, config)
            }
            other => Ok(Operand::Val(Value::Bool(other.truth(current, root, config)?))),
        }
    }

    fn call_function(
        &self,
        name: &str,
        args: &[FilterExpression],
        span: Span,
        current: &Value,
        root: &Value,
        config: &QueryConfig,
    ) -> Result<Operand, TemplateError> {
        let arity = |n: usize| -> Result<(), TemplateError> {
            if args.len() == n {
                Ok(())
            } else {
                Err(TemplateError::Type {
                    message: format!("{name}() takes {n} argument(s), {} given", args.len()),
                    span: Some(span),
                })
            }
        };

        match name {
            "length" => {
                arity(1)?;
                match args[0].operand(current, root, config)? {
                    Operand::Val(value) => Ok(value
                        .size()
                        .map(|n| Operand::Val(Value::Integer(n as i64)))
                        .unwrap_or(Operand::Nothing)),
                    Operand::Nothing => Ok(Operand::Nothing),
                }
            }
            "count" => {
                arity(1)?;
                let nodes = match &args[0] {
                    Self::RelativeQuery { query, .. } => query.find(current, config)?,
                    Self::RootQuery { query, .. } => query.find(root, config)?,
                    other => {
                        return Err(TemplateError::Type {
                            message: "count() takes a query argument".to_string(),
                            span: Some(other.span()),
                        });
                    }
                };
                Ok(Operand::Val(Value::Integer(nodes.len() as i64)))
            }
            "value" => {
                arity(1)?;
                let nodes = match &args[0] {
                    Self::RelativeQuery { query, .. } => query.find(current, config)?,
                    Self::RootQuery { query, .. } => query.find(root, config)?,
                    other => {
                        return Err(TemplateError::Type {
                            message: "value() takes a query argument".to_string(),
                            span: Some(other.span()),
                        });
                    }
                };
                Ok(single(nodes.values()))
            }
            "match" => {
                arity(2)?;
                self.regex_test(args, span, current, root, config, true)
            }
            "search" => {
                arity(2)?;
                self.regex_test(args, span, current, root, config, false)
            }
            _ => Err(TemplateError::Type {
                message: format!("unknown filter function '{name}'"),
                span: None,
            }),
        }
    }

    fn regex_test(
        &self,
        args: &[FilterExpression],
        span: Span,
        current: &Value,
        root: &Value,
        config: &QueryConfig,
        full: bool,
    ) -> Result<Operand, TemplateError> {
        let subject = args[0].operand(current, root, config)?;
        let pattern = args[1].operand(current, root, config)?;
        let (Operand::Val(Value::String(subject)), Operand::Val(Value::String(pattern))) =
            (subject, pattern)
        else {
            return Ok(Operand::Val(Value::Bool(false)));
        };

        let pattern = if full {
            format!("^(?:{pattern})$")
        } else {
            pattern
        };
        let regex = regex::Regex::new(&pattern).map_err(|err| TemplateError::Type {
            message: format!("invalid pattern: {err}"),
            span: Some(span),
        })?;
        Ok(Operand::Val(Value::Bool(regex.is_match(&subject))))
    }
}

fn single(values: Vec<Value>) -> Operand {
    match values.into_iter().next() {
        Some(value) => Operand::Val(value),
        None => Operand::Nothing,
    }
}

fn compare(left: &Operand, operator: CompareOp, right: &Operand) -> bool {
    match operator {
        CompareOp::Eq => equals(left, right),
        CompareOp::Ne => !equals(left, right),
        CompareOp::Gt => less_than(right, left),
        CompareOp::Lt => less_than(left, right),
        CompareOp::Ge => equals(left, right) || less_than(right, left),
        CompareOp::Le => equals(left, right) || less_than(left, right),
    }
}

fn equals(left: &Operand, right: &Operand) -> bool {
    match (left, right) {
        (Operand::Nothing, Operand::Nothing) => true,
        (Operand::Val(a), Operand::Val(b)) => a == b,
        _ => false,
    }
}

/// Ordering is defined for numbers and for strings; everything else is
/// simply not less than anything.
fn less_than(left: &Operand, right: &Operand) -> bool {
    let (Operand::Val(a), Operand::Val(b)) = (left, right) else {
        return false;
    };
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => x < y,
        (Value::Float(x), Value::Float(y)) => x < y,
        (Value::Integer(x), Value::Float(y)) => (*x as f64) < *y,
        (Value::Float(x), Value::Integer(y)) => *x < (*y as f64),
        (Value::String(x), Value::String(y)) => x < y,
        _ => false,
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True_ { .. } => f.write_str("true"),
            Self::False_ { .. } => f.write_str("false"),
            Self::Null { .. } => f.write_str("null"),
            Self::StringLiteral { value, .. } => write!(f, "'{value}'"),
            Self::Integer { value, .. } => write!(f, "{value}"),
            Self::Float { value, .. } => write!(f, "{value}"),
            Self::Not { expression, .. } => write!(f, "!{expression}"),
            Self::Logical {
                left,
                operator,
                right,
                ..
            } => write!(f, "{left} {operator} {right}"),
            Self::Comparison {
                left,
                operator,
                right,
                ..
            } => write!(f, "{left} {operator} {right}"),
            Self::RelativeQuery { query, .. } => write!(f, "@{}", query.display_bracketed()),
            Self::RootQuery { query, .. } => write!(f, "${}", query.display_bracketed()),
            Self::Function { name, args, .. } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
