//! Render-time state.
//!
//! A [`RenderContext`] is created for one top-level render, mutated
//! throughout, and discarded afterwards; it is never shared across
//! concurrent renders. It owns the layered scope chain, the render-lifetime
//! counters, the stateful tag namespace, the loop stack, and the
//! recursion-depth guard.
//!
//! Scope resolution order is fixed: the most recently pushed extension
//! layer first, then older extension layers, then locals, then the
//! read-only globals supplied at render entry, then builtin dynamic names,
//! then counters. All lookups go through query resolution, so dotted and
//! bracketed access and plain name resolution are one mechanism.

use std::borrow::Cow;
use std::collections::HashMap;

use chrono::Local;
use tracing::debug;

use crate::environment::{Environment, Filter, UndefinedPolicy};
use crate::error::TemplateError;
use crate::query::{PathNode, Query, Selector};
use crate::tokenizer::Span;
use crate::value::{Object, Value};

pub struct RenderContext<'env> {
    pub env: &'env Environment,
    /// The name of the template currently rendering, for diagnostics.
    /// Include tags swap this while a partial renders.
    pub template_name: String,
    globals: Object,
    locals: Object,
    counters: HashMap<String, i64>,
    extensions: Vec<Object>,
    cycles: HashMap<u64, usize>,
    stop_indexes: HashMap<String, usize>,
    loops: Vec<Value>,
    /// Depth inherited from a parent context, so isolated partial renders
    /// still count against the recursion guard.
    base_depth: usize,
}

impl<'env> RenderContext<'env> {
    pub fn new(env: &'env Environment, template_name: impl Into<String>, globals: Object) -> Self {
        Self {
            env,
            template_name: template_name.into(),
            globals,
            locals: Object::new(),
            counters: HashMap::new(),
            extensions: Vec::new(),
            cycles: HashMap::new(),
            stop_indexes: HashMap::new(),
            loops: Vec::new(),
            base_depth: 0,
        }
    }

    /// A fresh context for an isolated partial render, inheriting only the
    /// depth guard. Fails immediately if the guard is already exhausted.
    pub fn child(
        &self,
        template_name: impl Into<String>,
        globals: Object,
        span: Span,
    ) -> Result<RenderContext<'env>, TemplateError> {
        let base_depth = self.depth() + 1;
        if base_depth >= self.env.options.context_depth_limit {
            return Err(TemplateError::ContextDepth { span });
        }
        Ok(RenderContext {
            env: self.env,
            template_name: template_name.into(),
            globals,
            locals: Object::new(),
            counters: HashMap::new(),
            extensions: Vec::new(),
            cycles: HashMap::new(),
            stop_indexes: HashMap::new(),
            loops: Vec::new(),
            base_depth,
        })
    }

    /// Write into the innermost writable layer.
    pub fn assign(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    /// Resolve a query against the scope chain. Exactly one match returns
    /// that value; several matches return the full value list; no match
    /// returns the supplied default, or the undefined sentinel carrying the
    /// query and token.
    pub fn get(
        &self,
        path: &Query,
        span: Span,
        default: Option<Value>,
    ) -> Result<Value, TemplateError> {
        let mut values = self.resolve_query(path)?;
        match values.len() {
            0 => match default {
                Some(value) => Ok(value),
                None => match self.env.options.undefined {
                    UndefinedPolicy::Lenient => Ok(Value::undefined(path.to_string(), span)),
                    UndefinedPolicy::Strict => Err(TemplateError::Undefined {
                        path: path.to_string(),
                        span,
                    }),
                },
            },
            1 => Ok(values.pop().expect("length was checked")),
            _ => Ok(Value::Array(values)),
        }
    }

    fn resolve_query(&self, path: &Query) -> Result<Vec<Value>, TemplateError> {
        let mut selectors = path.selectors.iter();
        let Some(first) = selectors.next() else {
            return Ok(Vec::new());
        };

        // The leading selector resolves against the scope chain itself.
        let root: Cow<'_, Value> = match first {
            Selector::Name { name, .. } => match self.scope_value(name) {
                Some(value) => value,
                None => return Ok(Vec::new()),
            },
            Selector::Nested { query, .. } => {
                let keys = self.resolve_query(query)?;
                match keys.as_slice() {
                    [Value::String(name)] => match self.scope_value(name) {
                        Some(value) => value,
                        None => return Ok(Vec::new()),
                    },
                    _ => return Ok(Vec::new()),
                }
            }
            _ => return Ok(Vec::new()),
        };

        let config = self.env.query_config();
        let root_ref: &Value = root.as_ref();
        let mut frontier = vec![PathNode::new_root(root_ref)];

        for selector in selectors {
            let mut next = Vec::new();
            match selector {
                // Nested queries inside a scope-rooted path resolve against
                // the scope, then apply as an index or key.
                Selector::Nested { query, span } => {
                    let keys = self.resolve_query(query)?;
                    let adhoc = match keys.as_slice() {
                        [Value::Integer(index)] => Some(Selector::Index {
                            index: *index,
                            span: *span,
                        }),
                        [Value::String(name)] => Some(Selector::Name {
                            name: name.clone(),
                            span: *span,
                        }),
                        _ => None,
                    };
                    if let Some(selector) = adhoc {
                        for node in &frontier {
                            next.extend(selector.resolve(node, &config)?);
                        }
                    }
                }
                _ => {
                    for node in &frontier {
                        next.extend(selector.resolve(node, &config)?);
                    }
                }
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }

        Ok(frontier.into_iter().map(|node| node.value.clone()).collect())
    }

    /// Search the scope chain for a top-level name.
    fn scope_value(&self, name: &str) -> Option<Cow<'_, Value>> {
        for layer in self.extensions.iter().rev() {
            if let Some(value) = layer.get(name) {
                return Some(Cow::Borrowed(value));
            }
        }
        if let Some(value) = self.locals.get(name) {
            return Some(Cow::Borrowed(value));
        }
        if let Some(value) = self.globals.get(name) {
            return Some(Cow::Borrowed(value));
        }
        match name {
            "now" => Some(Cow::Owned(Value::String(
                Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            ))),
            "today" => Some(Cow::Owned(Value::String(
                Local::now().format("%Y-%m-%d").to_string(),
            ))),
            _ => self
                .counters
                .get(name)
                .map(|count| Cow::Owned(Value::Integer(*count))),
        }
    }

    /// Resolve a registered filter, failing with an unknown-filter error.
    pub fn filter(&self, name: &str, span: Span) -> Result<&'env dyn Filter, TemplateError> {
        self.env
            .filters
            .get(name)
            .map(|filter| filter.as_ref())
            .ok_or_else(|| TemplateError::NoSuchFilter {
                name: name.to_string(),
                span,
            })
    }

    /// Scoped acquisition of a read-only namespace layer: pushed for the
    /// duration of `f` and popped on every exit path, including errors.
    pub fn extend<T>(
        &mut self,
        namespace: Object,
        span: Span,
        f: impl FnOnce(&mut Self) -> Result<T, TemplateError>,
    ) -> Result<T, TemplateError> {
        self.push_scope(namespace, span)?;
        let result = f(self);
        self.pop_scope();
        result
    }

    /// Push a read-only scope layer, enforcing the extension depth guard.
    /// Callers using this directly must pair it with [`Self::pop_scope`] on
    /// every exit path.
    pub fn push_scope(&mut self, namespace: Object, span: Span) -> Result<(), TemplateError> {
        if self.depth() >= self.env.options.context_depth_limit {
            return Err(TemplateError::ContextDepth { span });
        }
        debug!(depth = self.extensions.len() + 1, "pushing scope layer");
        self.extensions.push(namespace);
        Ok(())
    }

    pub fn pop_scope(&mut self) {
        debug!(depth = self.extensions.len(), "popping scope layer");
        self.extensions.pop();
    }

    /// Total extension depth, counting layers inherited from parent
    /// contexts of isolated partial renders.
    pub fn depth(&self) -> usize {
        self.base_depth + self.extensions.len()
    }

    /// Push a slot on the loop stack. Paired with [`Self::pop_loop`] on all
    /// exit paths; the current iteration's loop object is filled in with
    /// [`Self::set_current_loop`].
    pub fn push_loop(&mut self) {
        self.loops.push(Value::Null);
    }

    pub fn pop_loop(&mut self) {
        self.loops.pop();
    }

    pub fn set_current_loop(&mut self, forloop: Value) {
        if let Some(slot) = self.loops.last_mut() {
            *slot = forloop;
        }
    }

    /// The loop object of the nearest enclosing loop, if any.
    pub fn parentloop(&self) -> Option<&Value> {
        self.loops.last().filter(|value| !matches!(value, Value::Null))
    }

    /// The current loop-stack depth. Exposed for balance assertions.
    pub fn loop_depth(&self) -> usize {
        self.loops.len()
    }

    /// The next position of the cycle with the given caller-computed
    /// identity.
    pub fn cycle(&mut self, identity: u64, length: usize) -> usize {
        let position = self.cycles.entry(identity).or_insert(0);
        let current = *position;
        *position = (current + 1) % length.max(1);
        current
    }

    /// Increment the named counter, returning its value before the
    /// increment. Counters are shared across the whole render.
    pub fn increment(&mut self, name: &str) -> i64 {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        let before = *counter;
        *counter += 1;
        before
    }

    /// Decrement the named counter, returning its new value.
    pub fn decrement(&mut self, name: &str) -> i64 {
        let counter = self.counters.entry(name.to_string()).or_insert(0);
        *counter -= 1;
        *counter
    }

    /// Where a `for` loop over the keyed collection stopped last time.
    pub fn stop_index(&self, key: &str) -> usize {
        self.stop_indexes.get(key).copied().unwrap_or(0)
    }

    pub fn set_stop_index(&mut self, key: &str, index: usize) {
        self.stop_indexes.insert(key.to_string(), index);
    }

    /// Escape for output if the environment enables auto-escaping.
    pub fn markup(&self, text: &str) -> String {
        if self.env.options.auto_escape {
            crate::value::html_escape(text)
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::query::QueryConfig;

    fn query(path: &str) -> Query {
        Query::parse(path, &QueryConfig::default()).unwrap()
    }

    fn globals() -> Object {
        Value::from(json!({"a": {"b": [1, 2, 3]}, "name": "World"}))
            .into_object()
            .expect("test globals are an object")
    }

    #[test]
    fn test_scope_priority() {
        let env = Environment::new();
        let mut context = RenderContext::new(&env, "test", globals());

        assert_eq!(
            context.get(&query("name"), Span::default(), None).unwrap(),
            Value::from("World")
        );

        context.assign("name", Value::from("local"));
        assert_eq!(
            context.get(&query("name"), Span::default(), None).unwrap(),
            Value::from("local")
        );

        let mut layer = Object::new();
        layer.insert("name".to_string(), Value::from("layered"));
        context
            .extend(layer, Span::default(), |context| {
                assert_eq!(
                    context.get(&query("name"), Span::default(), None).unwrap(),
                    Value::from("layered")
                );
                Ok(())
            })
            .unwrap();

        // Popped again on exit.
        assert_eq!(
            context.get(&query("name"), Span::default(), None).unwrap(),
            Value::from("local")
        );
    }

    #[test]
    fn test_get_miss_returns_undefined_sentinel() {
        let env = Environment::new();
        let context = RenderContext::new(&env, "test", globals());
        let value = context
            .get(&query("missing.thing"), Span::new(3, 9), None)
            .unwrap();
        match value {
            Value::Undefined(undefined) => {
                assert_eq!(undefined.path, "missing.thing");
                assert_eq!(undefined.span, Span::new(3, 9));
            }
            other => panic!("expected the undefined sentinel, found {other:?}"),
        }
    }

    #[test]
    fn test_get_miss_with_default() {
        let env = Environment::new();
        let context = RenderContext::new(&env, "test", globals());
        let value = context
            .get(&query("missing"), Span::default(), Some(Value::Integer(7)))
            .unwrap();
        assert_eq!(value, Value::Integer(7));
    }

    #[test]
    fn test_query_resolution_through_scope() {
        let env = Environment::new();
        let context = RenderContext::new(&env, "test", globals());
        assert_eq!(
            context.get(&query("a.b[1]"), Span::default(), None).unwrap(),
            Value::Integer(2)
        );
        assert_eq!(
            context.get(&query("a.b[*]"), Span::default(), None).unwrap(),
            Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        );
    }

    #[test]
    fn test_extend_depth_guard() {
        let env = Environment::new();
        let mut context = RenderContext::new(&env, "test", Object::new());
        let limit = env.options.context_depth_limit;

        for _ in 0..limit {
            context.push_scope(Object::new(), Span::default()).unwrap();
        }
        let err = context.push_scope(Object::new(), Span::default()).unwrap_err();
        assert!(matches!(err, TemplateError::ContextDepth { .. }));
    }

    #[test]
    fn test_extend_pops_on_error() {
        let env = Environment::new();
        let mut context = RenderContext::new(&env, "test", Object::new());
        let result: Result<(), TemplateError> =
            context.extend(Object::new(), Span::default(), |_| {
                Err(TemplateError::syntax("boom", Span::default()))
            });
        assert!(result.is_err());
        assert_eq!(context.depth(), 0);
    }

    #[test]
    fn test_counters() {
        let env = Environment::new();
        let mut context = RenderContext::new(&env, "test", Object::new());
        assert_eq!(context.increment("n"), 0);
        assert_eq!(context.increment("n"), 1);
        assert_eq!(context.decrement("n"), 1);
        assert_eq!(context.decrement("other"), -1);

        // Counters resolve as variables, at lowest priority.
        assert_eq!(
            context.get(&query("n"), Span::default(), None).unwrap(),
            Value::Integer(1)
        );
    }

    #[test]
    fn test_cycle_positions_keyed_by_identity() {
        let env = Environment::new();
        let mut context = RenderContext::new(&env, "test", Object::new());
        assert_eq!(context.cycle(1, 3), 0);
        assert_eq!(context.cycle(1, 3), 1);
        assert_eq!(context.cycle(2, 3), 0);
        assert_eq!(context.cycle(1, 3), 2);
        assert_eq!(context.cycle(1, 3), 0);
    }

    #[test]
    fn test_builtin_dynamic_names() {
        let env = Environment::new();
        let context = RenderContext::new(&env, "test", Object::new());
        let today = context.get(&query("today"), Span::default(), None).unwrap();
        match today {
            Value::String(s) => assert_eq!(s.len(), 10),
            other => panic!("expected a date string, found {other:?}"),
        }
    }
}
