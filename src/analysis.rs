//! Static template analysis.
//!
//! Walks the syntax tree through each node's `children()` listing and each
//! expression's own introspection, collecting variable, tag and filter
//! references with their source spans, without evaluating anything.
//!
//! A variable is classified "local" when an assignment-capable tag assigns
//! its root name anywhere in the template. Classification is template-wide,
//! not control-flow-ordered: a name assigned on line ten is local on line
//! one too. Unknown filters and unloadable partial templates are collected
//! as span-tagged findings rather than raised, unless strict mode is
//! requested.

use std::collections::{HashMap, HashSet};

use async_recursion::async_recursion;
use tracing::debug;

use crate::ast::{ChildNode, ExpressionRef, Node};
use crate::environment::Environment;
use crate::error::TemplateError;
use crate::expression::Primitive;
use crate::query::Query;
use crate::template::Template;
use crate::tokenizer::Span;

/// The result of analyzing a template: reference-string to source-span
/// mappings, plus non-fatal findings.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TemplateAnalysis {
    /// Every variable use, keyed by normalized path.
    pub variables: HashMap<String, Vec<Span>>,
    /// Names assigned by assignment-capable tags, keyed by name, with the
    /// assignment sites.
    pub local_variables: HashMap<String, Vec<Span>>,
    /// Variable uses whose root name is never assigned and not bound by an
    /// enclosing block.
    pub global_variables: HashMap<String, Vec<Span>>,
    /// Filter applications, keyed by filter name.
    pub filters: HashMap<String, Vec<Span>>,
    /// Tag usage, keyed by tag name.
    pub tags: HashMap<String, Vec<Span>>,
    /// References that could not be fully visited, such as filters with no
    /// registered implementation.
    pub failed_visits: HashMap<String, Vec<Span>>,
    /// Partial templates that could not be loaded or whose names are not
    /// literal.
    pub unloadable_partials: HashMap<String, Vec<Span>>,
}

impl Template<'_> {
    /// Analyze this template, following include and render targets through
    /// the blocking loader path.
    pub fn analyze(&self, strict: bool) -> Result<TemplateAnalysis, TemplateError> {
        let mut analyzer = Analyzer::new(self.env, strict);
        let partials = analyzer.walk_nodes(&self.nodes)?;
        analyzer.follow(partials)?;
        Ok(analyzer.finish())
    }

    /// The suspension-capable twin of [`Template::analyze`]; results are
    /// identical, only the loader may suspend.
    pub async fn analyze_async(&self, strict: bool) -> Result<TemplateAnalysis, TemplateError> {
        let mut analyzer = Analyzer::new(self.env, strict);
        let partials = analyzer.walk_nodes(&self.nodes)?;
        analyzer.follow_async(partials).await?;
        Ok(analyzer.finish())
    }
}

/// A partial template reference discovered during the walk.
struct PartialRef {
    /// Display form of the target expression, used as the finding key when
    /// the target cannot be loaded.
    key: String,
    /// The literal template name, when the target is a string literal.
    literal: Option<String>,
    span: Span,
}

/// One variable use, classified after the whole tree has been walked.
struct VariableUse {
    path: String,
    root: String,
    span: Span,
    /// True when the root name was bound by an enclosing block (loop
    /// variables, include aliases) at the point of use.
    block_scoped: bool,
}

struct Analyzer<'env> {
    env: &'env Environment,
    strict: bool,
    analysis: TemplateAnalysis,
    assigned: HashSet<String>,
    uses: Vec<VariableUse>,
    scope_stack: Vec<Vec<String>>,
    visited_partials: HashSet<String>,
}

impl<'env> Analyzer<'env> {
    fn new(env: &'env Environment, strict: bool) -> Self {
        Self {
            env,
            strict,
            analysis: TemplateAnalysis::default(),
            assigned: HashSet::new(),
            uses: Vec::new(),
            scope_stack: Vec::new(),
            visited_partials: HashSet::new(),
        }
    }

    fn walk_nodes(
        &mut self,
        nodes: &[Box<dyn Node>],
    ) -> Result<Vec<PartialRef>, TemplateError> {
        let mut partials = Vec::new();
        for node in nodes {
            self.visit_node(node.as_ref(), &mut partials)?;
        }
        Ok(partials)
    }

    fn visit_node(
        &mut self,
        node: &dyn Node,
        partials: &mut Vec<PartialRef>,
    ) -> Result<(), TemplateError> {
        if let Some(name) = node.token().name() {
            self.analysis
                .tags
                .entry(name.to_string())
                .or_default()
                .push(node.token().span());
        }

        for child in node.children() {
            self.visit_child(child, partials)?;
        }
        Ok(())
    }

    fn visit_child(
        &mut self,
        child: ChildNode<'_>,
        partials: &mut Vec<PartialRef>,
    ) -> Result<(), TemplateError> {
        for identifier in &child.template_scope {
            self.assigned.insert(identifier.name.clone());
            self.analysis
                .local_variables
                .entry(identifier.name.clone())
                .or_default()
                .push(identifier.span);
        }

        if let Some(expression) = child.expression {
            if child.load_mode.is_some() {
                partials.push(partial_ref(expression, child.span));
            }
            self.visit_expression(expression)?;
        }

        if let Some(node) = child.node {
            let scoped: Vec<String> = child
                .block_scope
                .iter()
                .map(|identifier| identifier.name.clone())
                .collect();
            let pushed = !scoped.is_empty();
            if pushed {
                self.scope_stack.push(scoped);
            }
            let result = self.visit_node(node, partials);
            if pushed {
                self.scope_stack.pop();
            }
            result?;
        }
        Ok(())
    }

    fn visit_expression(&mut self, expression: ExpressionRef<'_>) -> Result<(), TemplateError> {
        let mut queries: Vec<Query> = Vec::new();
        let mut record = |query: &Query| queries.push(query.clone());
        match expression {
            ExpressionRef::Filtered(expr) => {
                expr.visit_queries(&mut record);
                let mut calls = Vec::new();
                expr.visit_filters(&mut |call| calls.push((call.name.clone(), call.span)));
                for (name, span) in calls {
                    self.record_filter(name, span)?;
                }
            }
            ExpressionRef::Boolean(expr) => expr.visit_queries(&mut record),
            ExpressionRef::Primitive(expr) => expr.visit_queries(&mut record),
            ExpressionRef::Loop(expr) => expr.visit_queries(&mut record),
        }

        for query in queries {
            self.record_query(&query);
        }
        Ok(())
    }

    fn record_filter(&mut self, name: String, span: Span) -> Result<(), TemplateError> {
        if !self.env.filters.contains_key(&name) {
            if self.strict {
                return Err(TemplateError::NoSuchFilter { name, span });
            }
            self.analysis
                .failed_visits
                .entry(name.clone())
                .or_default()
                .push(span);
        }
        self.analysis.filters.entry(name).or_default().push(span);
        Ok(())
    }

    fn record_query(&mut self, query: &Query) {
        let Some(root) = query.head_name() else {
            return;
        };
        let path = query.to_string();
        self.analysis
            .variables
            .entry(path.clone())
            .or_default()
            .push(query.span);

        let block_scoped = self
            .scope_stack
            .iter()
            .any(|scope| scope.iter().any(|name| name == root));
        self.uses.push(VariableUse {
            path,
            root: root.to_string(),
            span: query.span,
            block_scoped,
        });
    }

    fn record_unloadable(&mut self, key: String, span: Span) -> Result<(), TemplateError> {
        if self.strict {
            return Err(TemplateError::NotFound { name: key, span });
        }
        self.analysis
            .unloadable_partials
            .entry(key)
            .or_default()
            .push(span);
        Ok(())
    }

    fn follow(&mut self, partials: Vec<PartialRef>) -> Result<(), TemplateError> {
        for partial in partials {
            let Some(name) = partial.literal.clone() else {
                self.record_unloadable(partial.key, partial.span)?;
                continue;
            };
            if !self.visited_partials.insert(name.clone()) {
                continue;
            }
            debug!(partial = %name, "analyzing partial");
            match self.env.get_template(&name, partial.span) {
                Ok(template) => {
                    let nested = self.walk_nodes(&template.nodes)?;
                    self.follow(nested)?;
                }
                Err(_) => self.record_unloadable(name, partial.span)?,
            }
        }
        Ok(())
    }

    #[async_recursion]
    async fn follow_async(&mut self, partials: Vec<PartialRef>) -> Result<(), TemplateError> {
        for partial in partials {
            let Some(name) = partial.literal.clone() else {
                self.record_unloadable(partial.key, partial.span)?;
                continue;
            };
            if !self.visited_partials.insert(name.clone()) {
                continue;
            }
            debug!(partial = %name, "analyzing partial");
            match self.env.get_template_async(&name, partial.span).await {
                Ok(template) => {
                    let nested = self.walk_nodes(&template.nodes)?;
                    self.follow_async(nested).await?;
                }
                Err(_) => self.record_unloadable(name, partial.span)?,
            }
        }
        Ok(())
    }

    fn finish(mut self) -> TemplateAnalysis {
        for usage in &self.uses {
            if !usage.block_scoped && !self.assigned.contains(&usage.root) {
                self.analysis
                    .global_variables
                    .entry(usage.path.clone())
                    .or_default()
                    .push(usage.span);
            }
        }
        self.analysis
    }
}

fn partial_ref(expression: ExpressionRef<'_>, span: Span) -> PartialRef {
    match expression {
        ExpressionRef::Primitive(Primitive::StringLiteral { value, .. }) => PartialRef {
            key: value.clone(),
            literal: Some(value.clone()),
            span,
        },
        ExpressionRef::Primitive(primitive) => PartialRef {
            key: primitive.to_string(),
            literal: None,
            span,
        },
        ExpressionRef::Filtered(expr) => PartialRef {
            key: expr.left.to_string(),
            literal: match &expr.left {
                Primitive::StringLiteral { value, .. } => Some(value.clone()),
                _ => None,
            },
            span,
        },
        other => PartialRef {
            key: format!("{other:?}"),
            literal: None,
            span,
        },
    }
}
