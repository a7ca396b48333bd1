//! The `assign` tag.

use async_trait::async_trait;

use crate::ast::{ChildNode, ExpressionRef, Flow, Node, RenderResult};
use crate::context::RenderContext;
use crate::environment::Tag;
use crate::error::TemplateError;
use crate::expression::{
    FilteredExpression, Identifier, parse_filtered_expression, parse_identifier,
};
use crate::parser::Parser;
use crate::tokenizer::{ExprStream, ExprTokenKind, Markup, TokenStream};

pub struct AssignTag;

impl Tag for AssignTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        let token = stream.current().clone();
        let mut expr = ExprStream::of(&token);
        let name = parse_identifier(&mut expr)?;
        expr.expect(&ExprTokenKind::Assign)?;
        let expression = parse_filtered_expression(&mut expr, &parser.env.query_config())?;
        expr.expect_end()?;
        Ok(Box::new(AssignNode {
            token,
            name,
            expression,
        }))
    }
}

#[derive(Debug)]
pub struct AssignNode {
    pub token: Markup,
    pub name: Identifier,
    pub expression: FilteredExpression,
}

#[async_trait]
impl Node for AssignNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, context: &mut RenderContext<'_>, _buffer: &mut String) -> RenderResult {
        let value = self.expression.evaluate(context)?;
        context.assign(self.name.name.clone(), value);
        Ok(Flow::Done(0))
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        vec![
            ChildNode::new(self.token.span())
                .with_expression(ExpressionRef::Filtered(&self.expression))
                .with_template_scope(vec![self.name.clone()]),
        ]
    }
}
