//! The `increment` and `decrement` tags.
//!
//! Named counters live for the whole render, shared across blocks, and
//! resolve as variables at the lowest scope priority.

use async_trait::async_trait;

use crate::ast::{ChildNode, Flow, Node, RenderResult, write_str};
use crate::context::RenderContext;
use crate::environment::Tag;
use crate::error::TemplateError;
use crate::expression::{Identifier, parse_string_or_identifier};
use crate::parser::Parser;
use crate::tokenizer::{ExprStream, Markup, TokenStream};

pub struct IncrementTag;

impl Tag for IncrementTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        _parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        let token = stream.current().clone();
        let mut expr = ExprStream::of(&token);
        let name = parse_string_or_identifier(&mut expr)?;
        expr.expect_end()?;
        Ok(Box::new(CounterNode {
            token,
            name,
            decrement: false,
        }))
    }
}

pub struct DecrementTag;

impl Tag for DecrementTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        _parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        let token = stream.current().clone();
        let mut expr = ExprStream::of(&token);
        let name = parse_string_or_identifier(&mut expr)?;
        expr.expect_end()?;
        Ok(Box::new(CounterNode {
            token,
            name,
            decrement: true,
        }))
    }
}

#[derive(Debug)]
pub struct CounterNode {
    pub token: Markup,
    pub name: Identifier,
    pub decrement: bool,
}

#[async_trait]
impl Node for CounterNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, context: &mut RenderContext<'_>, buffer: &mut String) -> RenderResult {
        let value = if self.decrement {
            context.decrement(&self.name.name)
        } else {
            context.increment(&self.name.name)
        };
        Ok(Flow::Done(write_str(buffer, &value.to_string())))
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        vec![ChildNode::new(self.token.span()).with_template_scope(vec![self.name.clone()])]
    }
}
