//! The `case`/`when` tag.

use async_trait::async_trait;

use crate::ast::{BlockNode, ChildNode, ExpressionRef, Flow, Node, RenderResult};
use crate::context::RenderContext;
use crate::environment::Tag;
use crate::error::TemplateError;
use crate::expression::{Primitive, parse_primitive};
use crate::parser::Parser;
use crate::tokenizer::{ExprStream, ExprTokenKind, Markup, TokenStream};

pub struct CaseTag;

const END: &[&str] = &["when", "else", "endcase"];

impl Tag for CaseTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        let config = parser.env.query_config();
        let token = stream.next();
        let mut expr = ExprStream::of(&token);
        let arg = parse_primitive(&mut expr, &config)?;
        expr.expect_end()?;

        // Anything between `case` and the first `when` renders nothing.
        let _ = parser.parse_block(stream, END)?;

        let mut whens = Vec::new();
        while stream.is_tag("when") {
            let when_token = stream.next();
            let mut when_expr = ExprStream::of(&when_token);
            let mut args = vec![parse_primitive(&mut when_expr, &config)?];
            // `when` alternatives separated by commas or `or`.
            while when_expr.eat(&ExprTokenKind::Comma) || when_expr.eat(&ExprTokenKind::Or) {
                args.push(parse_primitive(&mut when_expr, &config)?);
            }
            when_expr.expect_end()?;

            let block = BlockNode {
                token: stream.current().clone(),
                nodes: parser.parse_block(stream, END)?,
            };
            whens.push(WhenBlock {
                token: when_token,
                args,
                block,
            });
        }

        let mut default = None;
        if stream.is_tag("else") {
            let else_token = stream.next();
            default = Some(BlockNode {
                token: else_token,
                nodes: parser.parse_block(stream, &["endcase"])?,
            });
        }

        if !stream.is_tag("endcase") {
            return Err(TemplateError::syntax(
                "expected 'endcase'",
                stream.current().span(),
            ));
        }

        Ok(Box::new(CaseNode {
            token,
            arg,
            whens,
            default,
        }))
    }

    fn end_names(&self) -> &'static [&'static str] {
        END
    }
}

#[derive(Debug)]
pub struct WhenBlock {
    pub token: Markup,
    pub args: Vec<Primitive>,
    pub block: BlockNode,
}

#[derive(Debug)]
pub struct CaseNode {
    pub token: Markup,
    pub arg: Primitive,
    pub whens: Vec<WhenBlock>,
    pub default: Option<BlockNode>,
}

#[async_trait]
impl Node for CaseNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, context: &mut RenderContext<'_>, buffer: &mut String) -> RenderResult {
        let value = self.arg.evaluate(context)?;
        let mut count = 0;
        let mut matched = false;

        // Every matching `when` block renders, in order.
        for when in &self.whens {
            let mut hit = false;
            for arg in &when.args {
                if arg.evaluate(context)? == value {
                    hit = true;
                    break;
                }
            }
            if hit {
                matched = true;
                match when.block.render(context, buffer)? {
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
        }

        if !matched {
            if let Some(default) = &self.default {
                match default.render(context, buffer)? {
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
        }

        Ok(Flow::Done(count))
    }

    async fn render_async(
        &self,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
    ) -> RenderResult {
        let value = self.arg.evaluate(context)?;
        let mut count = 0;
        let mut matched = false;

        for when in &self.whens {
            let mut hit = false;
            for arg in &when.args {
                if arg.evaluate(context)? == value {
                    hit = true;
                    break;
                }
            }
            if hit {
                matched = true;
                match when.block.render_async(context, buffer).await? {
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
        }

        if !matched {
            if let Some(default) = &self.default {
                match default.render_async(context, buffer).await? {
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
        }

        Ok(Flow::Done(count))
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        let mut children = vec![
            ChildNode::new(self.token.span()).with_expression(ExpressionRef::Primitive(&self.arg)),
        ];
        for when in &self.whens {
            let mut child = ChildNode::new(when.token.span()).with_node(&when.block);
            // Expose the first alternative for analysis; the rest are
            // reachable through the same child list.
            if let Some(first) = when.args.first() {
                child = child.with_expression(ExpressionRef::Primitive(first));
            }
            children.push(child);
            for arg in when.args.iter().skip(1) {
                children
                    .push(ChildNode::new(arg.span()).with_expression(ExpressionRef::Primitive(arg)));
            }
        }
        if let Some(default) = &self.default {
            children.push(ChildNode::new(default.token.span()).with_node(default as &dyn Node));
        }
        children
    }
}
