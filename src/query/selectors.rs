//! Path selectors.
//!
//! Each selector is a pure function from a matched node to zero or more
//! child nodes. A selector that matches nothing yields an empty result,
//! never an error; only filter-predicate evaluation can fail.

use core::fmt;

use rand::seq::SliceRandom;

use super::QueryConfig;
use super::filter::FilterExpression;
use super::node::{PathKey, PathNode};
use crate::error::TemplateError;
use crate::query::Query;
use crate::tokenizer::Span;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Object member by key.
    Name { name: String, span: Span },
    /// Sequence element by signed index.
    Index { index: i64, span: Span },
    /// Sequence range with optional start/stop/step.
    Slice {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
        span: Span,
    },
    /// Every member of an object or element of a sequence.
    Wildcard { span: Span },
    /// Members/elements for which a boolean expression holds.
    Filter {
        expression: FilterExpression,
        span: Span,
    },
    /// An embedded query evaluated against the document root, applied as an
    /// index (one integer over a sequence) or a key (one string over an
    /// object).
    Nested { query: Box<Query>, span: Span },
}

impl Selector {
    pub fn span(&self) -> Span {
        match self {
            Self::Name { span, .. }
            | Self::Index { span, .. }
            | Self::Slice { span, .. }
            | Self::Wildcard { span }
            | Self::Filter { span, .. }
            | Self::Nested { span, .. } => *span,
        }
    }

    /// Apply this selector to `node`, yielding the matched children.
    pub fn resolve<'v>(
        &self,
        node: &PathNode<'v>,
        config: &QueryConfig,
    ) -> Result<Vec<PathNode<'v>>, TemplateError> {
        match self {
            Self::Name { name, .. } => Ok(resolve_name(node, name)),
            Self::Index { index, .. } => Ok(resolve_index(node, *index)),
            Self::Slice {
                start, stop, step, ..
            } => Ok(resolve_slice(node, *start, *stop, step.unwrap_or(1))),
            Self::Wildcard { .. } => Ok(resolve_wildcard(node, config)),
            Self::Filter { expression, span } => {
                resolve_filter(node, expression, config).map_err(|err| err.with_span(*span))
            }
            Self::Nested { query, .. } => resolve_nested(node, query, config),
        }
    }
}

fn resolve_name<'v>(node: &PathNode<'v>, name: &str) -> Vec<PathNode<'v>> {
    match node.value {
        Value::Object(members) => members
            .get(name)
            .map(|value| node.new_child(value, PathKey::Name(name.to_string())))
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

/// A negative index counts from the end only when its magnitude fits the
/// sequence length; anything out of bounds after normalization is a miss.
fn normalized_index(index: i64, len: usize) -> Option<usize> {
    if index < 0 {
        let magnitude = index.unsigned_abs() as usize;
        if magnitude <= len {
            Some(len - magnitude)
        } else {
            None
        }
    } else if (index as usize) < len {
        Some(index as usize)
    } else {
        None
    }
}

fn resolve_index<'v>(node: &PathNode<'v>, index: i64) -> Vec<PathNode<'v>> {
    match node.value {
        Value::Array(items) => normalized_index(index, items.len())
            .and_then(|i| items.get(i).map(|value| (i, value)))
            .map(|(i, value)| node.new_child(value, PathKey::Index(i)))
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

fn resolve_slice<'v>(
    node: &PathNode<'v>,
    start: Option<i64>,
    stop: Option<i64>,
    step: i64,
) -> Vec<PathNode<'v>> {
    let Value::Array(items) = node.value else {
        return Vec::new();
    };
    if step == 0 {
        return Vec::new();
    }

    let len = items.len() as i64;
    let normalize = |i: i64| if i >= 0 { i } else { len + i };

    let (lower, upper) = if step > 0 {
        let begin = normalize(start.unwrap_or(0)).clamp(0, len);
        let end = normalize(stop.unwrap_or(len)).clamp(0, len);
        (begin, end)
    } else {
        let begin = normalize(start.unwrap_or(len - 1)).clamp(-1, len - 1);
        let end = normalize(stop.unwrap_or(-len - 1)).clamp(-1, len - 1);
        (end, begin)
    };

    let mut out = Vec::new();
    if step > 0 {
        let mut i = lower;
        while i < upper {
            out.push(node.new_child(&items[i as usize], PathKey::Index(i as usize)));
            i += step;
        }
    } else {
        let mut i = upper;
        while i > lower {
            out.push(node.new_child(&items[i as usize], PathKey::Index(i as usize)));
            i += step;
        }
    }
    out
}

fn resolve_wildcard<'v>(node: &PathNode<'v>, config: &QueryConfig) -> Vec<PathNode<'v>> {
    match node.value {
        Value::Object(members) => {
            let mut entries: Vec<(&String, &Value)> = members.iter().collect();
            if config.nondeterministic {
                entries.shuffle(&mut rand::thread_rng());
            }
            entries
                .into_iter()
                .map(|(name, value)| node.new_child(value, PathKey::Name(name.clone())))
                .collect()
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, value)| node.new_child(value, PathKey::Index(i)))
            .collect(),
        _ => Vec::new(),
    }
}

fn resolve_filter<'v>(
    node: &PathNode<'v>,
    expression: &FilterExpression,
    config: &QueryConfig,
) -> Result<Vec<PathNode<'v>>, TemplateError> {
    let mut out = Vec::new();
    match node.value {
        Value::Object(members) => {
            let mut entries: Vec<(&String, &Value)> = members.iter().collect();
            if config.nondeterministic {
                entries.shuffle(&mut rand::thread_rng());
            }
            for (name, value) in entries {
                if expression.truth(value, node.root, config)? {
                    out.push(node.new_child(value, PathKey::Name(name.clone())));
                }
            }
        }
        Value::Array(items) => {
            for (i, value) in items.iter().enumerate() {
                if expression.truth(value, node.root, config)? {
                    out.push(node.new_child(value, PathKey::Index(i)));
                }
            }
        }
        _ => {}
    }
    Ok(out)
}

fn resolve_nested<'v>(
    node: &PathNode<'v>,
    query: &Query,
    config: &QueryConfig,
) -> Result<Vec<PathNode<'v>>, TemplateError> {
    let found = query.find(node.root, config)?;
    let Some(first) = found.iter().next() else {
        return Ok(Vec::new());
    };

    match (first.value, node.value) {
        (Value::Integer(index), Value::Array(_)) => Ok(resolve_index(node, *index)),
        (Value::String(name), Value::Object(_)) => Ok(resolve_name(node, name)),
        _ => Ok(Vec::new()),
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name { name, .. } => write!(f, "{name}"),
            Self::Index { index, .. } => write!(f, "{index}"),
            Self::Slice {
                start, stop, step, ..
            } => {
                if let Some(start) = start {
                    write!(f, "{start}")?;
                }
                f.write_str(":")?;
                if let Some(stop) = stop {
                    write!(f, "{stop}")?;
                }
                write!(f, ":{}", step.unwrap_or(1))
            }
            Self::Wildcard { .. } => f.write_str("*"),
            Self::Filter { expression, .. } => write!(f, "?{expression}"),
            Self::Nested { query, .. } => write!(f, "{query}"),
        }
    }
}
