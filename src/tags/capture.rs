//! The `capture` tag: renders its block into a string and assigns it.

use async_trait::async_trait;

use crate::ast::{BlockNode, ChildNode, Flow, Node, RenderResult};
use crate::context::RenderContext;
use crate::environment::Tag;
use crate::error::TemplateError;
use crate::expression::{Identifier, parse_string_or_identifier};
use crate::parser::Parser;
use crate::tokenizer::{ExprStream, Markup, TokenStream};
use crate::value::Value;

pub struct CaptureTag;

const END: &[&str] = &["endcapture"];

impl Tag for CaptureTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        let token = stream.next();
        let mut expr = ExprStream::of(&token);
        let name = parse_string_or_identifier(&mut expr)?;
        expr.expect_end()?;

        let block_token = stream.current().clone();
        let nodes = parser.parse_block(stream, END)?;

        Ok(Box::new(CaptureNode {
            token,
            name,
            block: BlockNode {
                token: block_token,
                nodes,
            },
        }))
    }

    fn end_names(&self) -> &'static [&'static str] {
        END
    }
}

#[derive(Debug)]
pub struct CaptureNode {
    pub token: Markup,
    pub name: Identifier,
    pub block: BlockNode,
}

#[async_trait]
impl Node for CaptureNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, context: &mut RenderContext<'_>, _buffer: &mut String) -> RenderResult {
        let mut captured = String::new();
        match self.block.render(context, &mut captured)? {
            Flow::Done(_) => {
                context.assign(self.name.name.clone(), Value::String(captured));
                Ok(Flow::Done(0))
            }
            // A signal abandons the capture and travels on. Nothing reached
            // the real output buffer.
            Flow::Signal { kind, span, .. } => Ok(Flow::Signal {
                kind,
                span,
                written: 0,
            }),
        }
    }

    async fn render_async(
        &self,
        context: &mut RenderContext<'_>,
        _buffer: &mut String,
    ) -> RenderResult {
        let mut captured = String::new();
        match self.block.render_async(context, &mut captured).await? {
            Flow::Done(_) => {
                context.assign(self.name.name.clone(), Value::String(captured));
                Ok(Flow::Done(0))
            }
            Flow::Signal { kind, span, .. } => Ok(Flow::Signal {
                kind,
                span,
                written: 0,
            }),
        }
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        vec![
            ChildNode::new(self.token.span())
                .with_node(&self.block)
                .with_template_scope(vec![self.name.clone()]),
        ]
    }
}
