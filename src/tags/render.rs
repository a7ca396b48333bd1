//! The `render` tag.
//!
//! Renders a partial template in an isolated namespace: only the tag's own
//! arguments and bound variable are visible inside, the includer's locals
//! are not. The partial behaves like a top-level render for interrupts: a
//! stop signal halts the partial alone, and a break or continue escaping it
//! is a syntax error.

use async_trait::async_trait;

use crate::ast::{ChildNode, Flow, LoadMode, Node, RenderResult};
use crate::context::RenderContext;
use crate::environment::Tag;
use crate::error::TemplateError;
use crate::parser::Parser;
use crate::tokenizer::{Markup, TokenStream};
use crate::value::Value;

use super::include::{PartialArgs, bound_key, evaluate_args, parse_partial_args, partial_children};

pub struct RenderTag;

impl Tag for RenderTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        let token = stream.current().clone();
        let partial = parse_partial_args(&token, &parser.env.query_config())?;
        Ok(Box::new(RenderNode { token, partial }))
    }
}

#[derive(Debug)]
pub struct RenderNode {
    pub token: Markup,
    pub partial: PartialArgs,
}

#[async_trait]
impl Node for RenderNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, context: &mut RenderContext<'_>, buffer: &mut String) -> RenderResult {
        let span = self.token.span();
        let name = self.partial.name.evaluate(context)?.render_str();
        let env = context.env;
        let template = env.get_template(&name, span)?;

        let namespace = evaluate_args(&self.partial.args, context)?;
        let mut count = 0;

        match &self.partial.var {
            Some(var) => {
                let value = var.evaluate(context)?;
                let key = bound_key(&self.partial.alias, &template.name);

                match value {
                    Value::Array(items) if self.partial.repeat => {
                        for item in items {
                            let mut globals = namespace.clone();
                            globals.insert(key.clone(), item);
                            let mut child = context.child(template.name.clone(), globals, span)?;
                            count += template.render_with_context(&mut child, buffer)?;
                        }
                    }
                    value => {
                        let mut globals = namespace;
                        globals.insert(key, value);
                        let mut child = context.child(template.name.clone(), globals, span)?;
                        count += template.render_with_context(&mut child, buffer)?;
                    }
                }
            }
            None => {
                let mut child = context.child(template.name.clone(), namespace, span)?;
                count += template.render_with_context(&mut child, buffer)?;
            }
        }

        Ok(Flow::Done(count))
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
        let mut count = 0;

        match &self.partial.var {
            Some(var) => {
                let value = var.evaluate(context)?;
                let key = bound_key(&self.partial.alias, &template.name);

                match value {
                    Value::Array(items) if self.partial.repeat => {
                        for item in items {
                            let mut globals = namespace.clone();
                            globals.insert(key.clone(), item);
                            let mut child = context.child(template.name.clone(), globals, span)?;
                            count += template
                                .render_with_context_async(&mut child, buffer)
                                .await?;
                        }
                    }
                    value => {
                        let mut globals = namespace;
                        globals.insert(key, value);
                        let mut child = context.child(template.name.clone(), globals, span)?;
                        count += template.render_with_context_async(&mut child, buffer).await?;
                    }
                }
            }
            None => {
                let mut child = context.child(template.name.clone(), namespace, span)?;
                count += template.render_with_context_async(&mut child, buffer).await?;
            }
        }

        Ok(Flow::Done(count))
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        partial_children(&self.token, &self.partial, LoadMode::Render)
    }
}
