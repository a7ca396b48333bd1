//! # Embedded path-query engine
//!
//! A JSONPath-like language used for both structured data access inside
//! templates and variable resolution against the render scope. A [`Query`]
//! is an immutable ordered sequence of [`Selector`]s, parsed once and shared
//! across concurrent renders.
//!
//! Resolution starts at a single root node and threads a growing frontier
//! through each selector in turn, flattening as it goes. A selector with no
//! match yields an empty result, never an error. Every matched node keeps
//! its full root-relative location, so its normalized path can be re-parsed
//! and re-resolved to find exactly the same value.

pub mod filter;
pub mod node;
pub mod parse;
pub mod selectors;

use core::fmt;

pub use filter::{CompareOp, FilterExpression, LogicalOp};
pub use node::{NodeList, PathKey, PathNode};
pub use selectors::Selector;

use crate::error::TemplateError;
use crate::tokenizer::{ExprStream, Span, lexer::lex_expr_str};
use crate::value::Value;

/// Bounds and modes the query engine consults at parse and resolve time.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Randomize object member visitation order on every resolve call.
    pub nondeterministic: bool,
    /// Largest literal index accepted at parse time.
    pub max_int_index: i64,
    /// Smallest literal index accepted at parse time.
    pub min_int_index: i64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            nondeterministic: false,
            max_int_index: (1 << 53) - 1,
            min_int_index: -(1 << 53) + 1,
        }
    }
}

impl QueryConfig {
    pub(crate) fn check_index(&self, value: i64, span: Span) -> Result<(), TemplateError> {
        if value < self.min_int_index || value > self.max_int_index {
            Err(TemplateError::Index {
                message: format!("index {value} is out of range"),
                span,
            })
        } else {
            Ok(())
        }
    }
}

/// A parsed path expression: an ordered, immutable selector sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub selectors: Vec<Selector>,
    pub span: Span,
}

impl Query {
    /// Parse a standalone query string.
    pub fn parse(path: &str, config: &QueryConfig) -> Result<Self, TemplateError> {
        let tokens = lex_expr_str(path, 0)?;
        let mut stream = ExprStream::new(&tokens, Span::new(path.len(), path.len()));
        let query = parse::parse_query(&mut stream, config)?;
        stream.expect_end()?;
        Ok(query)
    }

    /// Resolve this query against `root`, returning every matching node with
    /// its normalized location.
    pub fn find<'v>(
        &self,
        root: &'v Value,
        config: &QueryConfig,
    ) -> Result<NodeList<'v>, TemplateError> {
        let mut frontier = vec![PathNode::new_root(root)];
        for selector in &self.selectors {
            let mut next = Vec::new();
            for node in &frontier {
                next.extend(selector.resolve(node, config)?);
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }
        Ok(NodeList(frontier))
    }

    /// The name of the leading selector, when the query starts with one.
    /// This is the name scope resolution looks up first.
    pub fn head_name(&self) -> Option<&str> {
        match self.selectors.first() {
            Some(Selector::Name { name, .. }) => Some(name),
            _ => None,
        }
    }

    /// Render every selector in `.name` / `[...]` form, with no special
    /// casing of the leading segment. Used after `@` and `$` roots.
    pub(crate) fn display_bracketed(&self) -> String {
        let mut out = String::new();
        for selector in &self.selectors {
            push_segment(&mut out, selector);
        }
        out
    }
}

fn push_segment(out: &mut String, selector: &Selector) {
    match selector {
        Selector::Name { name, .. } if node::is_identifier(name) => {
            out.push('.');
            out.push_str(name);
        }
        Selector::Name { name, .. } => {
            out.push_str(&format!("['{name}']"));
        }
        other => out.push_str(&format!("[{other}]")),
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for (i, selector) in self.selectors.iter().enumerate() {
            match selector {
                Selector::Name { name, .. } if i == 0 && node::is_identifier(name) => {
                    out.push_str(name);
                }
                other => push_segment(&mut out, other),
            }
        }
        f.write_str(&out)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn find(path: &str, data: &Value) -> Vec<Value> {
        Query::parse(path, &QueryConfig::default())
            .unwrap()
            .find(data, &QueryConfig::default())
            .unwrap()
            .values()
    }

    #[test]
    fn test_dotted_and_bracketed_access_agree() {
        let data = Value::from(json!({"a": {"b": {"c": 42}}}));
        assert_eq!(find("a.b.c", &data), vec![Value::Integer(42)]);
        assert_eq!(find("a['b'].c", &data), vec![Value::Integer(42)]);
        assert_eq!(find("['a']['b']['c']", &data), vec![Value::Integer(42)]);
    }

    #[test]
    fn test_miss_is_empty_never_an_error() {
        let data = Value::from(json!({"a": [1, 2]}));
        assert_eq!(find("a.b", &data), Vec::<Value>::new());
        assert_eq!(find("a[9]", &data), Vec::<Value>::new());
        assert_eq!(find("nope[*]", &data), Vec::<Value>::new());
    }

    #[test]
    fn test_negative_index_normalization() {
        let data = Value::from(json!({"a": [10, 11, 12, 13, 14]}));
        assert_eq!(find("a[-1]", &data), vec![Value::Integer(14)]);
        assert_eq!(find("a[-5]", &data), vec![Value::Integer(10)]);
        // Magnitude exceeds the sequence length: a miss, not a wrap.
        assert_eq!(find("a[-6]", &data), Vec::<Value>::new());
    }

    #[test]
    fn test_slice_end_relative_normalization() {
        let data = Value::from(json!({"a": [0, 1, 2, 3, 4]}));
        assert_eq!(
            find("a[1:-1]", &data),
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );
        assert_eq!(
            find("a[::2]", &data),
            vec![Value::Integer(0), Value::Integer(2), Value::Integer(4)]
        );
        assert_eq!(
            find("a[::-1]", &data),
            vec![
                Value::Integer(4),
                Value::Integer(3),
                Value::Integer(2),
                Value::Integer(1),
                Value::Integer(0)
            ]
        );
        assert_eq!(find("a[1:3:0]", &data), Vec::<Value>::new());
    }

    #[test]
    fn test_wildcard_preserves_insertion_order() {
        let data = Value::from(json!({"m": {"z": 1, "a": 2, "k": 3}}));
        assert_eq!(
            find("m[*]", &data),
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );
    }

    #[test]
    fn test_filter_predicate() {
        let data = Value::from(json!({"items": [{"x": 1}, {"x": 5}, {"y": 9}]}));
        assert_eq!(
            find("items[?@.x > 1]", &data),
            vec![Value::from(json!({"x": 5}))]
        );
        // Bare query: existence test.
        assert_eq!(
            find("items[?@.y]", &data),
            vec![Value::from(json!({"y": 9}))]
        );
    }

    #[test]
    fn test_nested_query_selector() {
        let data = Value::from(json!({"a": [10, 20, 30], "b": {"c": 1}, "k": "c"}));
        assert_eq!(find("a[b.c]", &data), vec![Value::Integer(20)]);
        assert_eq!(find("b[k]", &data), vec![Value::Integer(1)]);
    }

    #[test]
    fn test_literal_index_bounds_fail_at_parse_time() {
        let config = QueryConfig::default();
        let err = Query::parse("a[9007199254740992]", &config).unwrap_err();
        assert!(matches!(err, TemplateError::Index { .. }));
        let err = Query::parse("a[0:9007199254740992]", &config).unwrap_err();
        assert!(matches!(err, TemplateError::Index { .. }));
    }

    #[test]
    fn test_path_round_trip() {
        let config = QueryConfig::default();
        let data = Value::from(json!({"a": {"b c": [{"d": 1}, {"d": 2}]}}));
        let query = Query::parse("a['b c'][*].d", &config).unwrap();
        let nodes = query.find(&data, &config).unwrap();
        assert_eq!(nodes.len(), 2);
        for node in nodes.iter() {
            let normalized = Query::parse(&node.path(), &config).unwrap();
            let again = normalized.find(&data, &config).unwrap();
            assert_eq!(again.len(), 1);
            assert_eq!(again.values(), vec![node.value.clone()]);
        }
    }

    #[test]
    fn test_display_is_normalized() {
        let config = QueryConfig::default();
        let query = Query::parse("a['b'].c[0][1:2]", &config).unwrap();
        assert_eq!(query.to_string(), "a.b.c[0][1:2:1]");
    }
}
