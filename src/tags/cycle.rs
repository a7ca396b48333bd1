//! The `cycle` tag.
//!
//! Cycle state is keyed by caller-computed identity: the group name when
//! one is given, the argument list otherwise. Two identical unnamed cycle
//! tags therefore share a position; a named cycle never collides with an
//! unnamed one.

use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use crate::ast::{ChildNode, ExpressionRef, Flow, Node, RenderResult, write_str};
use crate::context::RenderContext;
use crate::environment::Tag;
use crate::error::TemplateError;
use crate::expression::{Primitive, parse_primitive};
use crate::parser::Parser;
use crate::tokenizer::{ExprStream, ExprTokenKind, Markup, TokenStream};

pub struct CycleTag;

impl Tag for CycleTag {
    fn parse(
        &self,
        stream: &mut TokenStream,
        parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError> {
        let config = parser.env.query_config();
        let token = stream.current().clone();
        let mut expr = ExprStream::of(&token);

        let first = parse_primitive(&mut expr, &config)?;
        let mut name = None;
        let mut args = Vec::new();

        if expr.eat(&ExprTokenKind::Colon) {
            name = Some(first);
        } else {
            args.push(first);
            expr.eat(&ExprTokenKind::Comma);
        }

        while !expr.at_end() {
            args.push(parse_primitive(&mut expr, &config)?);
            if !expr.eat(&ExprTokenKind::Comma) {
                break;
            }
        }
        expr.expect_end()?;

        if args.is_empty() {
            return Err(TemplateError::syntax(
                "cycle needs at least one argument",
                token.span(),
            ));
        }

        Ok(Box::new(CycleNode { token, name, args }))
    }
}

#[derive(Debug)]
pub struct CycleNode {
    pub token: Markup,
    pub name: Option<Primitive>,
    pub args: Vec<Primitive>,
}

impl CycleNode {
    fn identity(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        match &self.name {
            Some(name) => {
                "named".hash(&mut hasher);
                name.to_string().hash(&mut hasher);
            }
            None => {
                for arg in &self.args {
                    arg.to_string().hash(&mut hasher);
                }
            }
        }
        hasher.finish()
    }
}

#[async_trait]
impl Node for CycleNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, context: &mut RenderContext<'_>, buffer: &mut String) -> RenderResult {
        let index = context.cycle(self.identity(), self.args.len());
        match self.args.get(index) {
            Some(arg) => {
                let value = arg.evaluate(context)?;
                let text = context.markup(&value.render_str());
                Ok(Flow::Done(write_str(buffer, &text)))
            }
            None => Ok(Flow::Done(0)),
        }
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        self.args
            .iter()
            .map(|arg| ChildNode::new(arg.span()).with_expression(ExpressionRef::Primitive(arg)))
            .collect()
    }
}
