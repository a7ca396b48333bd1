//! The `echo` tag: an output statement in tag form, for `{% liquid %}`
//! blocks.

use async_trait::async_trait;

use crate::ast::{ChildNode, ExpressionRef, Flow, Node, RenderResult, write_str};
use crate::context::RenderContext;
use crate::environment::Tag;
use crate::error::TemplateError;
use crate::expression::{FilteredExpression, parse_filtered_expression};
use crate::parser::Parser;
use crate::tokenizer::{ExprStream, Markup, TokenStream};

pub struct EchoTag;

impl Tag for EchoTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        let token = stream.current().clone();
        let mut expr = ExprStream::of(&token);
        let expression = parse_filtered_expression(&mut expr, &parser.env.query_config())?;
        expr.expect_end()?;
        Ok(Box::new(EchoNode { token, expression }))
    }
}

#[derive(Debug)]
pub struct EchoNode {
    pub token: Markup,
    pub expression: FilteredExpression,
}

#[async_trait]
impl Node for EchoNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, context: &mut RenderContext<'_>, buffer: &mut String) -> RenderResult {
        let value = self.expression.evaluate(context)?;
        let text = context.markup(&value.render_str());
        Ok(Flow::Done(write_str(buffer, &text)))
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        vec![
            ChildNode::new(self.token.span())
                .with_expression(ExpressionRef::Filtered(&self.expression)),
        ]
    }
}
