//! The `include` tag.
//!
//! Renders a partial template within the including template's scope: the
//! partial sees the includer's locals, and interrupts raised inside the
//! partial propagate to the includer, so a partial can break an enclosing
//! loop.

use async_trait::async_trait;

use crate::ast::{ChildNode, ExpressionRef, Flow, LoadMode, Node, RenderResult};
use crate::context::RenderContext;
use crate::environment::Tag;
use crate::error::TemplateError;
use crate::expression::{
    FilterArg, Identifier, Primitive, parse_keyword_arguments, parse_primitive,
    parse_string_or_identifier,
};
use crate::parser::Parser;
use crate::query::QueryConfig;
use crate::template::Template;
use crate::tokenizer::{ExprStream, ExprTokenKind, Markup, Span, TokenStream};
use crate::value::{Object, Value};

/// The parsed arguments shared by `include` and `render`:
/// `'name' [with|for expr [as alias]] [, key: value ...]`.
#[derive(Debug)]
pub struct PartialArgs {
    pub name: Primitive,
    pub repeat: bool,
    pub var: Option<Primitive>,
    pub alias: Option<Identifier>,
    pub args: Vec<FilterArg>,
}

pub(crate) fn parse_partial_args(
    token: &Markup,
    config: &QueryConfig,
) -> Result<PartialArgs, TemplateError> {
    let mut expr = ExprStream::of(token);
    if expr.at_end() {
        return Err(TemplateError::syntax(
            "expected the name of a template",
            token.span(),
        ));
    }

    let name = parse_primitive(&mut expr, config)?;

    let mut repeat = false;
    let mut var = None;
    let mut alias = None;

    match expr.kind() {
        Some(ExprTokenKind::For) => {
            expr.next();
            repeat = true;
            var = Some(parse_primitive(&mut expr, config)?);
        }
        Some(ExprTokenKind::With) => {
            expr.next();
            var = Some(parse_primitive(&mut expr, config)?);
        }
        _ => {}
    }
    if var.is_some() && expr.eat(&ExprTokenKind::As) {
        alias = Some(parse_string_or_identifier(&mut expr)?);
    }

    let args = parse_keyword_arguments(&mut expr, config)?;
    expr.expect_end()?;

    Ok(PartialArgs {
        name,
        repeat,
        var,
        alias,
        args,
    })
}

/// The name the bound variable takes inside the partial: the alias when
/// given, else the template name up to its first dot.
pub(crate) fn bound_key(alias: &Option<Identifier>, template_name: &str) -> String {
    match alias {
        Some(alias) => alias.name.clone(),
        None => template_name
            .split('.')
            .next()
            .unwrap_or(template_name)
            .to_string(),
    }
}

pub(crate) fn evaluate_args(
    args: &[FilterArg],
    context: &RenderContext<'_>,
) -> Result<Object, TemplateError> {
    let mut namespace = Object::new();
    for arg in args {
        let name = arg
            .name
            .as_ref()
            .expect("keyword arguments always carry a name");
        namespace.insert(name.name.clone(), arg.value.evaluate(context)?);
    }
    Ok(namespace)
}

pub(crate) fn partial_children<'a>(
    token: &'a Markup,
    partial: &'a PartialArgs,
    mode: LoadMode,
) -> Vec<ChildNode<'a>> {
    let mut block_scope: Vec<Identifier> = partial
        .args
        .iter()
        .filter_map(|arg| arg.name.clone())
        .collect();
    if partial.var.is_some() {
        if let Some(alias) = &partial.alias {
            block_scope.push(alias.clone());
        } else if let Primitive::StringLiteral { value, span } = &partial.name {
            block_scope.push(Identifier {
                name: value.split('.').next().unwrap_or(value).to_string(),
                span: *span,
            });
        }
    }

    let mut children = vec![
        ChildNode::new(token.span())
            .with_expression(ExpressionRef::Primitive(&partial.name))
            .with_block_scope(block_scope)
            .with_load_mode(mode),
    ];
    if let Some(var) = &partial.var {
        children.push(ChildNode::new(var.span()).with_expression(ExpressionRef::Primitive(var)));
    }
    for arg in &partial.args {
        children.push(
            ChildNode::new(arg.value.span()).with_expression(ExpressionRef::Primitive(&arg.value)),
        );
    }
    children
}

pub struct IncludeTag;

impl Tag for IncludeTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        let token = stream.current().clone();
        let partial = parse_partial_args(&token, &parser.env.query_config())?;
        Ok(Box::new(IncludeNode { token, partial }))
    }
}

#[derive(Debug)]
pub struct IncludeNode {
    pub token: Markup,
    pub partial: PartialArgs,
}

impl IncludeNode {
    fn render_bound(
        &self,
        template: &Template<'_>,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
        span: Span,
    ) -> RenderResult {
        match &self.partial.var {
            Some(var) => {
                let value = var.evaluate(context)?;
                let key = bound_key(&self.partial.alias, &template.name);

                match value {
                    Value::Array(items) if self.partial.repeat => {
                        let mut count = 0;
                        for item in items {
                            let mut namespace = Object::new();
                            namespace.insert(key.clone(), item);
                            context.push_scope(namespace, span)?;
                            let flow = template.render_partial_with_context(context, buffer);
                            context.pop_scope();
                            match flow? {
                                Flow::Done(written) => count += written,
                                Flow::Signal {
                                    kind,
                                    span,
                                    written,
                                } => {
                                    return Ok(Flow::Signal {
                                        kind,
                                        span,
                                        written: count + written,
                                    });
                                }
                            }
                        }
                        Ok(Flow::Done(count))
                    }
                    value => {
                        let mut namespace = Object::new();
                        namespace.insert(key, value);
                        context.push_scope(namespace, span)?;
                        let flow = template.render_partial_with_context(context, buffer);
                        context.pop_scope();
                        flow
                    }
                }
            }
            None => template.render_partial_with_context(context, buffer),
        }
    }

    async fn render_bound_async(
        &self,
        template: &Template<'_>,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
        span: Span,
    ) -> RenderResult {
        match &self.partial.var {
            Some(var) => {
                let value = var.evaluate(context)?;
                let key = bound_key(&self.partial.alias, &template.name);

                match value {
                    Value::Array(items) if self.partial.repeat => {
                        let mut count = 0;
                        for item in items {
                            let mut namespace = Object::new();
                            namespace.insert(key.clone(), item);
                            context.push_scope(namespace, span)?;
                            let flow = template
                                .render_partial_with_context_async(context, buffer)
                                .await;
                            context.pop_scope();
                            match flow? {
                                Flow::Done(written) => count += written,
                                Flow::Signal {
                                    kind,
                                    span,
                                    written,
                                } => {
                                    return Ok(Flow::Signal {
                                        kind,
                                        span,
                                        written: count + written,
                                    });
                                }
                            }
                        }
                        Ok(Flow::Done(count))
                    }
                    value => {
                        let mut namespace = Object::new();
                        namespace.insert(key, value);
                        context.push_scope(namespace, span)?;
                        let flow = template
                            .render_partial_with_context_async(context, buffer)
                            .await;
                        context.pop_scope();
                        flow
                    }
                }
            }
            None => {
                template
                    .render_partial_with_context_async(context, buffer)
                    .await
            }
        }
    }
}

#[async_trait]
impl Node for IncludeNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, context: &mut RenderContext<'_>, buffer: &mut String) -> RenderResult {
        let span = self.token.span();
        let name = self.partial.name.evaluate(context)?.render_str();
        let env = context.env;
        let template = env.get_template(&name, span)?;

        let namespace = evaluate_args(&self.partial.args, context)?;
        let previous = std::mem::replace(&mut context.template_name, template.name.clone());
        if let Err(err) = context.push_scope(namespace, span) {
            context.template_name = previous;
            return Err(err);
        }

        let flow = self.render_bound(&template, context, buffer, span);

        context.pop_scope();
        context.template_name = previous;
        flow
    }

    async fn render_async(
        &self,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
    ) -> RenderResult {
        let span = self.token.span();
        let name = self.partial.name.evaluate(context)?.render_str();
        let env = context.env;
        let template = env.get_template_async(&name, span).await?;

        let namespace = evaluate_args(&self.partial.args, context)?;
        let previous = std::mem::replace(&mut context.template_name, template.name.clone());
        if let Err(err) = context.push_scope(namespace, span) {
            context.template_name = previous;
            return Err(err);
        }

        let flow = self
            .render_bound_async(&template, context, buffer, span)
            .await;

        context.pop_scope();
        context.template_name = previous;
        flow
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        partial_children(&self.token, &self.partial, LoadMode::Include)
    }
}
