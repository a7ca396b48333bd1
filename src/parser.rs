//! The token-stream parser.
//!
//! Consumes markup tokens, dispatches tag tokens to registered tag parsers
//! by name, and builds the node tree. Whitespace-trim decisions are made
//! here, at parse time: a running `left_trim` value threads each token's
//! trailing flag to the next content token, and the stream's one-slot
//! `trim_carry` threads that state across recursive block parses.

use tracing::debug;

use crate::ast::{
    BlockNode, CommentNode, ContentNode, LinesNode, Node, OutputNode, RawNode, trim_end,
    trim_start,
};
use crate::environment::Environment;
use crate::error::TemplateError;
use crate::expression::parse_filtered_expression;
use crate::tokenizer::{ExprStream, Markup, TokenStream, Whitespace};

pub struct Parser<'env> {
    pub env: &'env Environment,
}

impl<'env> Parser<'env> {
    pub fn new(env: &'env Environment) -> Self {
        Self { env }
    }

    /// Parse a whole template's tokens into a node sequence.
    #[tracing::instrument(skip_all, level = "debug")]
    pub fn parse(&self, tokens: Vec<Markup>) -> Result<Vec<Box<dyn Node>>, TemplateError> {
        let mut stream = TokenStream::new(tokens);
        self.parse_stream(&mut stream, None)
    }

    /// Parse a region bounded by a set of terminating tag names. Stops with
    /// the terminator tag still current and its trailing trim flag written
    /// back into the stream's trim-carry for the caller.
    pub fn parse_block(
        &self,
        stream: &mut TokenStream,
        end: &[&str],
    ) -> Result<Vec<Box<dyn Node>>, TemplateError> {
        self.parse_stream(stream, Some(end))
    }

    fn parse_stream(
        &self,
        stream: &mut TokenStream,
        end: Option<&[&str]>,
    ) -> Result<Vec<Box<dyn Node>>, TemplateError> {
        let default_trim = self.env.options.trim;
        let mut left_trim = stream.trim_carry.or_default(default_trim);
        stream.trim_carry = default_trim;

        let mut nodes: Vec<Box<dyn Node>> = Vec::new();

        loop {
            let token = stream.current().clone();
            match &token {
                Markup::Content { text, .. } => {
                    let right_trim = stream.peek().leading_whitespace().or_default(default_trim);
                    let text = trim_end(trim_start(text, left_trim), right_trim).to_string();
                    nodes.push(Box::new(ContentNode { token, text }));
                    left_trim = default_trim;
                }
                Markup::Comment { .. } => {
                    left_trim = token.trailing_whitespace().or_default(default_trim);
                    nodes.push(Box::new(CommentNode { token }));
                }
                Markup::Raw { text, .. } => {
                    left_trim = token.trailing_whitespace().or_default(default_trim);
                    let text = text.clone();
                    nodes.push(Box::new(RawNode { token, text }));
                }
                Markup::Output { .. } => {
                    left_trim = token.trailing_whitespace().or_default(default_trim);
                    let mut expr = ExprStream::of(&token);
                    let expression =
                        parse_filtered_expression(&mut expr, &self.env.query_config())?;
                    expr.expect_end()?;
                    nodes.push(Box::new(OutputNode { token, expression }));
                }
                Markup::Lines { statements, .. } => {
                    left_trim = token.trailing_whitespace().or_default(default_trim);
                    let mut inner = statements.clone();
                    inner.push(Markup::Eoi);
                    let mut substream = TokenStream::new(inner);
                    let block = BlockNode {
                        token: token.clone(),
                        nodes: self.parse_stream(&mut substream, None)?,
                    };
                    nodes.push(Box::new(LinesNode { token, block }));
                }
                Markup::Tag { name, span, .. } => {
                    left_trim = token.trailing_whitespace().or_default(default_trim);

                    if let Some(end_names) = end {
                        if end_names.contains(&name.as_str()) {
                            stream.trim_carry = left_trim;
                            return Ok(nodes);
                        }
                    }

                    stream.trim_carry = left_trim;
                    debug!(tag = %name, "dispatching tag parser");
                    match self.env.tags.get(name.as_str()) {
                        Some(tag) => nodes.push(tag.parse(stream, self)?),
                        None => {
                            return Err(TemplateError::syntax(
                                format!("unknown tag '{name}'"),
                                *span,
                            ));
                        }
                    }
                    // A block tag's parse leaves its terminator's trailing
                    // flag in the carry slot; pick it up for the content
                    // that follows the construct.
                    left_trim = stream.trim_carry.or_default(default_trim);
                    stream.trim_carry = default_trim;
                }
                Markup::Eoi => {
                    if let Some(end_names) = end {
                        return Err(TemplateError::syntax(
                            format!(
                                "unexpected end of template, expected {}",
                                end_names
                                    .iter()
                                    .map(|name| format!("'{name}'"))
                                    .collect::<Vec<_>>()
                                    .join(" or ")
                            ),
                            stream.current().span(),
                        ));
                    }
                    return Ok(nodes);
                }
            }
            stream.next();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::environment::Environment;
    use crate::error::TemplateError;

    #[test]
    fn test_unknown_tag_is_a_syntax_error() {
        let env = Environment::new();
        let err = env.parse("{% nope %}").unwrap_err();
        match err {
            TemplateError::Syntax { message, .. } => {
                assert_eq!(message, "unknown tag 'nope'");
            }
            other => panic!("expected a syntax error, found {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_block_is_a_syntax_error() {
        let env = Environment::new();
        let err = env.parse("{% if true %}a").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { .. }));
    }

    #[test]
    fn test_terminator_without_opening_is_a_syntax_error() {
        let env = Environment::new();
        assert!(env.parse("{% endif %}").is_err());
    }

    #[test]
    fn test_node_count() {
        let env = Environment::new();
        let nodes = env.parse("a{{ b }}c{# d #}").unwrap();
        assert_eq!(nodes.len(), 4);
    }
}
