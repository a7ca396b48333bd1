//! The `for` tag, its `else` branch, and the `break`/`continue` tags.

use async_trait::async_trait;

use crate::ast::{BlockNode, ChildNode, ExpressionRef, Flow, Node, RenderResult, Signal};
use crate::context::RenderContext;
use crate::environment::Tag;
use crate::error::TemplateError;
use crate::expression::{Identifier, LoopExpression, parse_loop_expression};
use crate::parser::Parser;
use crate::tokenizer::{ExprStream, Markup, Span, TokenStream};
use crate::value::{Object, Value};

pub struct ForTag;

const END: &[&str] = &["endfor", "else"];

impl Tag for ForTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        let token = stream.next();
        let mut expr = ExprStream::of(&token);
        let expression = parse_loop_expression(&mut expr, &parser.env.query_config())?;
        expr.expect_end()?;

        let block = BlockNode {
            token: stream.current().clone(),
            nodes: parser.parse_block(stream, END)?,
        };

        let mut default = None;
        if stream.is_tag("else") {
            let else_token = stream.next();
            default = Some(BlockNode {
                token: else_token,
                nodes: parser.parse_block(stream, &["endfor"])?,
            });
        }

        if !stream.is_tag("endfor") {
            return Err(TemplateError::syntax(
                "expected 'endfor'",
                stream.current().span(),
            ));
        }

        Ok(Box::new(ForNode {
            token,
            expression,
            block,
            default,
        }))
    }

    fn end_names(&self) -> &'static [&'static str] {
        END
    }
}

#[derive(Debug)]
pub struct ForNode {
    pub token: Markup,
    pub expression: LoopExpression,
    pub block: BlockNode,
    pub default: Option<BlockNode>,
}

/// Build the `forloop` helper object for one iteration.
fn forloop_object(
    name: &str,
    length: usize,
    index: usize,
    parent: Option<&Value>,
    span: Span,
) -> Value {
    let mut members = Object::new();
    members.insert("name".to_string(), Value::from(name));
    members.insert("length".to_string(), Value::Integer(length as i64));
    members.insert("index".to_string(), Value::Integer(index as i64 + 1));
    members.insert("index0".to_string(), Value::Integer(index as i64));
    members.insert(
        "rindex".to_string(),
        Value::Integer((length - index) as i64),
    );
    members.insert(
        "rindex0".to_string(),
        Value::Integer((length - index) as i64 - 1),
    );
    members.insert("first".to_string(), Value::Bool(index == 0));
    members.insert("last".to_string(), Value::Bool(index == length - 1));
    members.insert(
        "parentloop".to_string(),
        parent
            .cloned()
            .unwrap_or_else(|| Value::undefined("parentloop", span)),
    );
    Value::Object(members)
}

impl ForNode {
    fn render_iterations(
        &self,
        items: &[Value],
        parent: Option<Value>,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
    ) -> RenderResult {
        let mut count = 0;
        let length = items.len();
        let name = &self.expression.identifier.name;
        let loop_name = self.expression.stop_index_key();
        let span = self.token.span();

        for (index, item) in items.iter().enumerate() {
            let forloop = forloop_object(&loop_name, length, index, parent.as_ref(), span);
            context.set_current_loop(forloop.clone());

            let mut namespace = Object::new();
            namespace.insert("forloop".to_string(), forloop);
            namespace.insert(name.clone(), item.clone());

            context.push_scope(namespace, span)?;
            let flow = self.block.render(context, buffer);
            context.pop_scope();

            match flow? {
                Flow::Done(written) => count += written,
                Flow::Signal {
                    kind: Signal::Continue,
                    written,
                    ..
                } => count += written,
                Flow::Signal {
                    kind: Signal::Break,
                    written,
                    ..
                } => {
                    count += written;
                    break;
                }
                Flow::Signal {
                    kind: Signal::Stop,
                    span,
                    written,
                } => {
                    return Ok(Flow::Signal {
                        kind: Signal::Stop,
                        span,
                        written: count + written,
                    });
                }
            }
        }
        Ok(Flow::Done(count))
    }

    async fn render_iterations_async(
        &self,
        items: &[Value],
        parent: Option<Value>,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
    ) -> RenderResult {
        let mut count = 0;
        let length = items.len();
        let name = &self.expression.identifier.name;
        let loop_name = self.expression.stop_index_key();
        let span = self.token.span();

        for (index, item) in items.iter().enumerate() {
            let forloop = forloop_object(&loop_name, length, index, parent.as_ref(), span);
            context.set_current_loop(forloop.clone());

            let mut namespace = Object::new();
            namespace.insert("forloop".to_string(), forloop);
            namespace.insert(name.clone(), item.clone());

            context.push_scope(namespace, span)?;
            let flow = self.block.render_async(context, buffer).await;
            context.pop_scope();

            match flow? {
                Flow::Done(written) => count += written,
                Flow::Signal {
                    kind: Signal::Continue,
                    written,
                    ..
                } => count += written,
                Flow::Signal {
                    kind: Signal::Break,
                    written,
                    ..
                } => {
                    count += written;
                    break;
                }
                Flow::Signal {
                    kind: Signal::Stop,
                    span,
                    written,
                } => {
                    return Ok(Flow::Signal {
                        kind: Signal::Stop,
                        span,
                        written: count + written,
                    });
                }
            }
        }
        Ok(Flow::Done(count))
    }
}

#[async_trait]
impl Node for ForNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, context: &mut RenderContext<'_>, buffer: &mut String) -> RenderResult {
        let items = self.expression.evaluate(context)?;
        if items.is_empty() {
            return match &self.default {
                Some(default) => default.render(context, buffer),
                None => Ok(Flow::Done(0)),
            };
        }

        let parent = context.parentloop().cloned();
        context.push_loop();
        let result = self.render_iterations(&items, parent, context, buffer);
        context.pop_loop();
        result
    }

    async fn render_async(
        &self,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
    ) -> RenderResult {
        let items = self.expression.evaluate(context)?;
        if items.is_empty() {
            return match &self.default {
                Some(default) => default.render_async(context, buffer).await,
                None => Ok(Flow::Done(0)),
            };
        }

        let parent = context.parentloop().cloned();
        context.push_loop();
        let result = self
            .render_iterations_async(&items, parent, context, buffer)
            .await;
        context.pop_loop();
        result
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        let span = self.token.span();
        let block_scope = vec![
            self.expression.identifier.clone(),
            Identifier {
                name: "forloop".to_string(),
                span,
            },
        ];

        let mut children = vec![
            ChildNode::new(span)
                .with_expression(ExpressionRef::Loop(&self.expression))
                .with_node(&self.block)
                .with_block_scope(block_scope),
        ];
        if let Some(default) = &self.default {
            children.push(ChildNode::new(default.token.span()).with_node(default as &dyn Node));
        }
        children
    }
}

pub struct BreakTag;

impl Tag for BreakTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        _parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        Ok(Box::new(InterruptNode {
            token: stream.current().clone(),
            signal: Signal::Break,
        }))
    }
}

pub struct ContinueTag;

impl Tag for ContinueTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        _parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        Ok(Box::new(InterruptNode {
            token: stream.current().clone(),
            signal: Signal::Continue,
        }))
    }
}

/// A node that raises a non-local control signal when rendered.
#[derive(Debug)]
pub struct InterruptNode {
    pub token: Markup,
    pub signal: Signal,
}

#[async_trait]
impl Node for InterruptNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, _context: &mut RenderContext<'_>, _buffer: &mut String) -> RenderResult {
        Ok(Flow::Signal {
            kind: self.signal,
            span: self.token.span(),
            written: 0,
        })
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        Vec::new()
    }
}
