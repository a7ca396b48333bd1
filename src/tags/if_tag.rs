//! The `if` and `unless` tags.
//!
//! Ordered (expression, body) branches plus an optional default. Branches
//! evaluate in order, short-circuit at the first truthy one, fall through
//! to the default, and otherwise write nothing.

use async_trait::async_trait;

use crate::ast::{
    BlockNode, ChildNode, ConditionalBlockNode, ExpressionRef, Flow, Node, RenderResult,
};
use crate::context::RenderContext;
use crate::environment::Tag;
use crate::error::TemplateError;
use crate::expression::{BooleanExpression, parse_boolean_expression};
use crate::parser::Parser;
use crate::tokenizer::{ExprStream, Markup, TokenStream};

const END: &[&str] = &["elsif", "else", "endif"];
const END_UNLESS: &[&str] = &["elsif", "else", "endunless"];

fn parse_conditional(
    stream: &mut TokenStream,
    parser: &Parser<'_>,
    end: &'static [&'static str],
    closing: &str,
) -> Result<IfNode, TemplateError> {
    let token = stream.next();
    let mut expr = ExprStream::of(&token);
    let condition = parse_boolean_expression(&mut expr, &parser.env.query_config())?;
    expr.expect_end()?;

    let block_token = stream.current().clone();
    let block = BlockNode {
        token: block_token,
        nodes: parser.parse_block(stream, end)?,
    };

    let mut alternatives = Vec::new();
    while stream.is_tag("elsif") {
        let alt_token = stream.next();
        let mut alt_expr = ExprStream::of(&alt_token);
        let alt_condition = parse_boolean_expression(&mut alt_expr, &parser.env.query_config())?;
        alt_expr.expect_end()?;
        let alt_block = BlockNode {
            token: stream.current().clone(),
            nodes: parser.parse_block(stream, end)?,
        };
        alternatives.push(ConditionalBlockNode {
            token: alt_token,
            expression: alt_condition,
            block: alt_block,
        });
    }

    let mut default = None;
    if stream.is_tag("else") {
        let else_token = stream.next();
        default = Some(BlockNode {
            token: else_token,
            nodes: parser.parse_block(stream, end)?,
        });
    }

    if !stream.is_tag(closing) {
        return Err(TemplateError::syntax(
            format!(
                "unexpected tag '{}', expected '{closing}'",
                stream.current().name().unwrap_or("end of template")
            ),
            stream.current().span(),
        ));
    }

    Ok(IfNode {
        token,
        condition,
        negate: false,
        block,
        alternatives,
        default,
    })
}

pub struct IfTag;

impl Tag for IfTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        Ok(Box::new(parse_conditional(stream, parser, END, "endif")?))
    }

    fn end_names(&self) -> &'static [&'static str] {
        END
    }
}

pub struct UnlessTag;

impl Tag for UnlessTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        let mut node = parse_conditional(stream, parser, END_UNLESS, "endunless")?;
        node.negate = true;
        Ok(Box::new(node))
    }

    fn end_names(&self) -> &'static [&'static str] {
        END_UNLESS
    }
}

#[derive(Debug)]
pub struct IfNode {
    pub token: Markup,
    pub condition: BooleanExpression,
    /// True for `unless`: the leading condition is inverted. `elsif` and
    /// `else` branches behave exactly as in `if`.
    pub negate: bool,
    pub block: BlockNode,
    pub alternatives: Vec<ConditionalBlockNode>,
    pub default: Option<BlockNode>,
}

impl IfNode {
    fn first_branch_taken(&self, context: &RenderContext<'_>) -> Result<bool, TemplateError> {
        let truthy = self.condition.evaluate(context)?;
        Ok(truthy != self.negate)
    }
}

#[async_trait]
impl Node for IfNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, context: &mut RenderContext<'_>, buffer: &mut String) -> RenderResult {
        if self.first_branch_taken(context)? {
            return self.block.render(context, buffer);
        }
        for alternative in &self.alternatives {
            if alternative.expression.evaluate(context)? {
                return alternative.block.render(context, buffer);
            }
        }
        match &self.default {
            Some(default) => default.render(context, buffer),
            None => Ok(Flow::Done(0)),
        }
    }

    async fn render_async(
        &self,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
    ) -> RenderResult {
        if self.first_branch_taken(context)? {
            return self.block.render_async(context, buffer).await;
        }
        for alternative in &self.alternatives {
            if alternative.expression.evaluate(context)? {
                return alternative.block.render_async(context, buffer).await;
            }
        }
        match &self.default {
            Some(default) => default.render_async(context, buffer).await,
            None => Ok(Flow::Done(0)),
        }
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        let mut children = vec![
            ChildNode::new(self.token.span())
                .with_expression(ExpressionRef::Boolean(&self.condition))
                .with_node(&self.block),
        ];
        for alternative in &self.alternatives {
            children.push(
                ChildNode::new(alternative.token.span()).with_node(alternative as &dyn Node),
            );
        }
        if let Some(default) = &self.default {
            children.push(ChildNode::new(default.token.span()).with_node(default as &dyn Node));
        }
        children
    }
}
