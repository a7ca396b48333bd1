//! A parsed template, ready to be rendered.
//!
//! A [`Template`] binds a parsed node sequence to its environment and the
//! template-level global and overlay data. The parsed tree is immutable
//! after construction and safely shared read-only across concurrent
//! renders; each render gets its own context.

use tracing::debug;

use crate::ast::{Flow, Node, RenderResult, Signal, render_nodes, render_nodes_async};
use crate::context::RenderContext;
use crate::environment::Environment;
use crate::error::TemplateError;
use crate::value::{Object, Value};

pub struct Template<'env> {
    pub env: &'env Environment,
    pub nodes: Vec<Box<dyn Node>>,
    pub name: String,
    /// Read-only defaults layered beneath caller arguments.
    pub global_data: Object,
    /// Read-only defaults layered beneath `global_data`.
    pub overlay_data: Object,
}

impl<'env> Template<'env> {
    pub fn new(env: &'env Environment, nodes: Vec<Box<dyn Node>>, name: impl Into<String>) -> Self {
        Self {
            env,
            nodes,
            name: name.into(),
            global_data: Object::new(),
            overlay_data: Object::new(),
        }
    }

    pub fn with_globals(mut self, global_data: Object) -> Self {
        self.global_data = global_data;
        self
    }

    pub fn with_overlay(mut self, overlay_data: Object) -> Self {
        self.overlay_data = overlay_data;
        self
    }

    /// Merge caller arguments over template globals over overlay data.
    /// Later layers win.
    fn make_globals(&self, args: Object) -> Object {
        let mut globals = self.overlay_data.clone();
        for (key, value) in &self.global_data {
            globals.insert(key.clone(), value.clone());
        }
        for (key, value) in args {
            globals.insert(key, value);
        }
        globals
    }

    fn args_object(args: Value) -> Result<Object, TemplateError> {
        match args {
            Value::Null => Ok(Object::new()),
            Value::Object(members) => Ok(members),
            other => Err(TemplateError::Type {
                message: format!(
                    "render arguments must be an object, found '{}'",
                    other.render_str()
                ),
                span: None,
            }),
        }
    }

    /// Render with `args` layered over the template's global data.
    #[tracing::instrument(skip_all, fields(template = %self.name), level = "debug")]
    pub fn render(&self, args: Value) -> Result<String, TemplateError> {
        let globals = self.make_globals(Self::args_object(args)?);
        let mut context = RenderContext::new(self.env, self.name.clone(), globals);
        let mut buffer = String::new();
        self.render_with_context(&mut context, &mut buffer)?;
        Ok(buffer)
    }

    /// The suspension-capable twin of [`Template::render`]; output is
    /// byte-identical.
    #[tracing::instrument(skip_all, fields(template = %self.name), level = "debug")]
    pub async fn render_async(&self, args: Value) -> Result<String, TemplateError> {
        let globals = self.make_globals(Self::args_object(args)?);
        let mut context = RenderContext::new(self.env, self.name.clone(), globals);
        let mut buffer = String::new();
        self.render_with_context_async(&mut context, &mut buffer)
            .await?;
        Ok(buffer)
    }

    /// Render into an existing context and buffer with top-level interrupt
    /// semantics: stop-render halts and returns the count written so far; a
    /// break or continue reaching this boundary is a syntax error at the
    /// offending token.
    pub fn render_with_context(
        &self,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
    ) -> Result<usize, TemplateError> {
        interpret_flow(render_nodes(&self.nodes, context, buffer)?)
    }

    pub async fn render_with_context_async(
        &self,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
    ) -> Result<usize, TemplateError> {
        interpret_flow(render_nodes_async(&self.nodes, context, buffer).await?)
    }

    /// Render as an included partial: every signal, including break and
    /// continue, propagates to the including template.
    pub(crate) fn render_partial_with_context(
        &self,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
    ) -> RenderResult {
        debug!(template = %self.name, "rendering partial");
        render_nodes(&self.nodes, context, buffer)
    }

    pub(crate) async fn render_partial_with_context_async(
        &self,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
    ) -> RenderResult {
        debug!(template = %self.name, "rendering partial");
        render_nodes_async(&self.nodes, context, buffer).await
    }

    /// True if the loader still agrees with the source this template came
    /// from. Always true for templates parsed directly from strings.
    pub fn is_up_to_date(&self) -> bool {
        match self.env.loader.load(&self.name) {
            Ok(source) => self.env.loader.is_up_to_date(&source),
            Err(_) => self.name == "<string>",
        }
    }
}

/// Apply top-level interrupt semantics to a flow outcome.
fn interpret_flow(flow: Flow) -> Result<usize, TemplateError> {
    match flow {
        Flow::Done(count) => Ok(count),
        Flow::Signal {
            kind: Signal::Stop,
            written,
            ..
        } => Ok(written),
        Flow::Signal { kind, span, .. } => Err(TemplateError::syntax(
            format!("unexpected '{kind}' outside of a loop"),
            span,
        )),
    }
}

impl std::fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
