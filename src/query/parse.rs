//! Query parsing.
//!
//! Builds [`Query`] values from expression tokens. The same entry points
//! serve template variable paths (`a.b[0]`), standalone query strings, and
//! the `@`/`$` rooted queries inside filter predicates.

use super::filter::{CompareOp, FilterExpression, LogicalOp};
use super::selectors::Selector;
use super::{Query, QueryConfig};
use crate::error::TemplateError;
use crate::tokenizer::{ExprStream, ExprTokenKind, Span};

/// Parse a variable path starting at the current token, which must be a
/// bare name or a bracketed selector.
pub(crate) fn parse_query(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<Query, TemplateError> {
    let start = stream.span();
    let mut selectors = Vec::new();

    match stream.kind() {
        Some(ExprTokenKind::Word(_)) => {
            let (name, span) = stream.expect_word()?;
            selectors.push(Selector::Name { name, span });
        }
        Some(ExprTokenKind::LeftBracket) => selectors.push(parse_bracketed(stream, config)?),
        _ => return Err(stream.syntax_error("expected a variable path")),
    }

    let end = parse_trailing_segments(stream, config, &mut selectors)?.unwrap_or(start);
    Ok(Query {
        selectors,
        span: start.to(end),
    })
}

/// Parse zero or more `.name` / `[...]` segments, returning the span of the
/// last one consumed.
fn parse_trailing_segments(
    stream: &mut ExprStream,
    config: &QueryConfig,
    selectors: &mut Vec<Selector>,
) -> Result<Option<Span>, TemplateError> {
    let mut last = None;
    loop {
        match stream.kind() {
            Some(ExprTokenKind::Dot) => {
                stream.next();
                let (name, span) = stream.expect_word()?;
                last = Some(span);
                selectors.push(Selector::Name { name, span });
            }
            Some(ExprTokenKind::LeftBracket) => {
                let selector = parse_bracketed(stream, config)?;
                last = Some(selector.span());
                selectors.push(selector);
            }
            _ => return Ok(last),
        }
    }
}

/// Parse one bracketed selector, consuming from `[` through `]`.
fn parse_bracketed(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<Selector, TemplateError> {
    let open = stream.expect(&ExprTokenKind::LeftBracket)?;

    let selector = match stream.kind() {
        Some(ExprTokenKind::Star) => {
            let token = stream.next().expect("current token was just matched");
            Selector::Wildcard {
                span: open.span.to(token.span),
            }
        }
        Some(ExprTokenKind::Question) => {
            let token = stream.next().expect("current token was just matched");
            let expression = parse_filter_or(stream, config)?;
            Selector::Filter {
                span: token.span.to(expression.span()),
                expression,
            }
        }
        Some(ExprTokenKind::StringLiteral(name)) => {
            let token = stream.next().expect("current token was just matched");
            Selector::Name {
                name: name.clone(),
                span: token.span,
            }
        }
        Some(ExprTokenKind::IntegerLiteral(_)) | Some(ExprTokenKind::Colon) => {
            parse_index_or_slice(stream, config)?
        }
        Some(ExprTokenKind::Word(_)) | Some(ExprTokenKind::Root) => {
            let span = stream.span();
            if stream.eat(&ExprTokenKind::Root) {
                // `$` rooted nested query: segments follow.
                let mut selectors = Vec::new();
                let end = parse_trailing_segments(stream, config, &mut selectors)?.unwrap_or(span);
                Selector::Nested {
                    query: Box::new(Query {
                        selectors,
                        span: span.to(end),
                    }),
                    span,
                }
            } else {
                let query = parse_query(stream, config)?;
                Selector::Nested {
                    span: query.span,
                    query: Box::new(query),
                }
            }
        }
        _ => return Err(stream.syntax_error("expected a selector")),
    };

    stream.expect(&ExprTokenKind::RightBracket)?;
    Ok(selector)
}

fn parse_index_or_slice(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<Selector, TemplateError> {
    let start_span = stream.span();
    let mut start = None;

    if let Some(ExprTokenKind::IntegerLiteral(n)) = stream.kind() {
        let n = *n;
        let token = stream.next().expect("current token was just matched");
        config.check_index(n, token.span)?;
        if stream.kind() != Some(&ExprTokenKind::Colon) {
            return Ok(Selector::Index {
                index: n,
                span: token.span,
            });
        }
        start = Some(n);
    }

    stream.expect(&ExprTokenKind::Colon)?;
    let mut end_span = stream.span();

    let mut stop = None;
    if let Some(ExprTokenKind::IntegerLiteral(n)) = stream.kind() {
        let n = *n;
        let token = stream.next().expect("current token was just matched");
        config.check_index(n, token.span)?;
        stop = Some(n);
        end_span = token.span;
    }

    let mut step = None;
    if stream.eat(&ExprTokenKind::Colon) {
        if let Some(ExprTokenKind::IntegerLiteral(n)) = stream.kind() {
            let n = *n;
            let token = stream.next().expect("current token was just matched");
            config.check_index(n, token.span)?;
            step = Some(n);
            end_span = token.span;
        }
    }

    Ok(Selector::Slice {
        start,
        stop,
        step,
        span: start_span.to(end_span),
    })
}

pub(crate) fn parse_filter_or(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<FilterExpression, TemplateError> {
    let mut left = parse_filter_and(stream, config)?;
    while matches!(
        stream.kind(),
        Some(ExprTokenKind::Or) | Some(ExprTokenKind::DoublePipe)
    ) {
        stream.next();
        let right = parse_filter_and(stream, config)?;
        left = FilterExpression::Logical {
            span: left.span().to(right.span()),
            left: Box::new(left),
            operator: LogicalOp::Or,
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_filter_and(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<FilterExpression, TemplateError> {
    let mut left = parse_filter_comparison(stream, config)?;
    while matches!(
        stream.kind(),
        Some(ExprTokenKind::And) | Some(ExprTokenKind::AmpAmp)
    ) {
        stream.next();
        let right = parse_filter_comparison(stream, config)?;
        left = FilterExpression::Logical {
            span: left.span().to(right.span()),
            left: Box::new(left),
            operator: LogicalOp::And,
            right: Box::new(right),
        };
    }
    Ok(left)
}

fn parse_filter_comparison(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<FilterExpression, TemplateError> {
    let left = parse_filter_unary(stream, config)?;
    let operator = match stream.kind() {
        Some(ExprTokenKind::Eq) => CompareOp::Eq,
        Some(ExprTokenKind::Ne) => CompareOp::Ne,
        Some(ExprTokenKind::Ge) => CompareOp::Ge,
        Some(ExprTokenKind::Gt) => CompareOp::Gt,
        Some(ExprTokenKind::Le) => CompareOp::Le,
        Some(ExprTokenKind::Lt) => CompareOp::Lt,
        _ => return Ok(left),
    };
    stream.next();
    let right = parse_filter_unary(stream, config)?;
    Ok(FilterExpression::Comparison {
        span: left.span().to(right.span()),
        left: Box::new(left),
        operator,
        right: Box::new(right),
    })
}

fn parse_filter_unary(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<FilterExpression, TemplateError> {
    match stream.kind() {
        Some(ExprTokenKind::Bang) | Some(ExprTokenKind::Not) => {
            let token = stream.next().expect("current token was just matched");
            let expression = parse_filter_unary(stream, config)?;
            Ok(FilterExpression::Not {
                span: token.span.to(expression.span()),
                expression: Box::new(expression),
            })
        }
        Some(ExprTokenKind::LeftParen) => {
            stream.next();
            let expression = parse_filter_or(stream, config)?;
            stream.expect(&ExprTokenKind::RightParen)?;
            Ok(expression)
        }
        _ => parse_filter_primary(stream, config),
    }
}

fn parse_filter_primary(
    stream: &mut ExprStream,
    config: &QueryConfig,
) -> Result<FilterExpression, TemplateError> {
    let span = stream.span();
    match stream.kind() {
        Some(ExprTokenKind::True_) => {
            stream.next();
            Ok(FilterExpression::True_ { span })
        }
        Some(ExprTokenKind::False_) => {
            stream.next();
            Ok(FilterExpression::False_ { span })
        }
        Some(ExprTokenKind::Null) => {
            stream.next();
            Ok(FilterExpression::Null { span })
        }
        Some(ExprTokenKind::StringLiteral(s)) => {
            let value = s.clone();
            stream.next();
            Ok(FilterExpression::StringLiteral { value, span })
        }
        Some(ExprTokenKind::IntegerLiteral(n)) => {
            let value = *n;
            stream.next();
            Ok(FilterExpression::Integer { value, span })
        }
        Some(ExprTokenKind::FloatLiteral(x)) => {
            let value = *x;
            stream.next();
            Ok(FilterExpression::Float { value, span })
        }
        Some(ExprTokenKind::At) => {
            stream.next();
            let mut selectors = Vec::new();
            let end = parse_trailing_segments(stream, config, &mut selectors)?.unwrap_or(span);
            Ok(FilterExpression::RelativeQuery {
                query: Query {
                    selectors,
                    span: span.to(end),
                },
                span: span.to(end),
            })
        }
        Some(ExprTokenKind::Root) => {
            stream.next();
            let mut selectors = Vec::new();
            let end = parse_trailing_segments(stream, config, &mut selectors)?.unwrap_or(span);
            Ok(FilterExpression::RootQuery {
                query: Query {
                    selectors,
                    span: span.to(end),
                },
                span: span.to(end),
            })
        }
        Some(ExprTokenKind::Word(name)) => {
            let name = name.clone();
            stream.next();
            stream.expect(&ExprTokenKind::LeftParen)?;
            let mut args = Vec::new();
            if stream.kind() != Some(&ExprTokenKind::RightParen) {
                loop {
                    args.push(parse_filter_or(stream, config)?);
                    if !stream.eat(&ExprTokenKind::Comma) {
                        break;
                    }
                }
            }
            let close = stream.expect(&ExprTokenKind::RightParen)?;
            Ok(FilterExpression::Function {
                name,
                args,
                span: span.to(close.span),
            })
        }
        _ => Err(stream.syntax_error("expected a filter expression")),
    }
}
