//! The syntax tree and its render protocol.
//!
//! Every parsed construct satisfies the [`Node`] contract: a synchronous
//! `render`, a behaviorally identical `render_async`, and a `children()`
//! listing used by static analysis. Rendering returns a [`Flow`] rather
//! than a bare count so that non-local control signals (`break`,
//! `continue`, stop-render) travel up the call stack as values with the
//! span of the tag that raised them. Sibling nodes always render left to
//! right, in both modes.

use core::fmt;

use async_trait::async_trait;

use crate::context::RenderContext;
use crate::error::TemplateError;
use crate::expression::{
    BooleanExpression, FilteredExpression, Identifier, LoopExpression, Primitive,
};
use crate::tokenizer::{Markup, Span, Whitespace};

/// A non-local control signal raised during rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Signal {
    #[strum(serialize = "break")]
    Break,
    #[strum(serialize = "continue")]
    Continue,
    #[strum(serialize = "stop")]
    Stop,
}

/// The result of rendering one node: either it ran to completion, or a
/// signal is travelling to its handler. Both variants carry the number of
/// characters written so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Flow {
    Done(usize),
    Signal {
        kind: Signal,
        span: Span,
        written: usize,
    },
}

impl Flow {
    pub fn written(&self) -> usize {
        match self {
            Self::Done(n) | Self::Signal { written: n, .. } => *n,
        }
    }
}

pub type RenderResult = Result<Flow, TemplateError>;

/// How a node loads a partial template, if it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Shared scope; interrupts propagate to the including template.
    Include,
    /// Isolated namespace.
    Render,
}

/// A borrowed reference to one of the expression forms a node may hold.
#[derive(Debug, Clone, Copy)]
pub enum ExpressionRef<'a> {
    Filtered(&'a FilteredExpression),
    Boolean(&'a BooleanExpression),
    Primitive(&'a Primitive),
    Loop(&'a LoopExpression),
}

/// One (token, child node, child expression) triple of a node's
/// introspectable structure, plus the scope information static analysis
/// needs.
pub struct ChildNode<'a> {
    pub span: Span,
    pub node: Option<&'a dyn Node>,
    pub expression: Option<ExpressionRef<'a>>,
    /// Names this node adds to the template-local scope (assignments).
    pub template_scope: Vec<Identifier>,
    /// Names visible only inside the child block (loop variables, aliases).
    pub block_scope: Vec<Identifier>,
    /// Present when `expression` names a partial template to load.
    pub load_mode: Option<LoadMode>,
}

impl<'a> ChildNode<'a> {
    pub fn new(span: Span) -> Self {
        Self {
            span,
            node: None,
            expression: None,
            template_scope: Vec::new(),
            block_scope: Vec::new(),
            load_mode: None,
        }
    }

    pub fn with_node(mut self, node: &'a dyn Node) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_expression(mut self, expression: ExpressionRef<'a>) -> Self {
        self.expression = Some(expression);
        self
    }

    pub fn with_template_scope(mut self, names: Vec<Identifier>) -> Self {
        self.template_scope = names;
        self
    }

    pub fn with_block_scope(mut self, names: Vec<Identifier>) -> Self {
        self.block_scope = names;
        self
    }

    pub fn with_load_mode(mut self, mode: LoadMode) -> Self {
        self.load_mode = Some(mode);
        self
    }
}

/// The uniform render contract satisfied by every parsed construct.
#[async_trait]
pub trait Node: fmt::Debug + Send + Sync {
    /// The token this node was parsed from.
    fn token(&self) -> &Markup;

    /// Write this node's output to `buffer`, returning the flow outcome.
    fn render(&self, context: &mut RenderContext<'_>, buffer: &mut String) -> RenderResult;

    /// Behaviorally identical to [`Node::render`]; may suspend only where a
    /// nested operation (such as fetching a partial template) suspends.
    async fn render_async(
        &self,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
    ) -> RenderResult {
        self.render(context, buffer)
    }

    /// The introspectable structure of this node, without rendering it.
    fn children(&self) -> Vec<ChildNode<'_>>;
}

/// Append `text` to the buffer, returning the number of characters written.
pub(crate) fn write_str(buffer: &mut String, text: &str) -> usize {
    buffer.push_str(text);
    text.chars().count()
}

/// Render a node sequence left to right, accumulating the character count
/// and propagating the first signal together with the count written so far.
pub fn render_nodes(
    nodes: &[Box<dyn Node>],
    context: &mut RenderContext<'_>,
    buffer: &mut String,
) -> RenderResult {
    let mut count = 0;
    for node in nodes {
        match node.render(context, buffer)? {
            Flow::Done(n) => count += n,
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
    Ok(Flow::Done(count))
}

/// The asynchronous twin of [`render_nodes`]; identical output, identical
/// ordering.
pub async fn render_nodes_async(
    nodes: &[Box<dyn Node>],
    context: &mut RenderContext<'_>,
    buffer: &mut String,
) -> RenderResult {
    let mut count = 0;
    for node in nodes {
        match node.render_async(context, buffer).await? {
            Flow::Done(n) => count += n,
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
    Ok(Flow::Done(count))
}

/// A sequence of nodes rendered in order.
#[derive(Debug)]
pub struct BlockNode {
    pub token: Markup,
    pub nodes: Vec<Box<dyn Node>>,
}

#[async_trait]
impl Node for BlockNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, context: &mut RenderContext<'_>, buffer: &mut String) -> RenderResult {
        render_nodes(&self.nodes, context, buffer)
    }

    async fn render_async(
        &self,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
    ) -> RenderResult {
        render_nodes_async(&self.nodes, context, buffer).await
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        self.nodes
            .iter()
            .map(|node| ChildNode::new(node.token().span()).with_node(node.as_ref()))
            .collect()
    }
}

/// A node sequence guarded by a boolean expression, as used for `elsif`
/// branches.
#[derive(Debug)]
pub struct ConditionalBlockNode {
    pub token: Markup,
    pub expression: BooleanExpression,
    pub block: BlockNode,
}

#[async_trait]
impl Node for ConditionalBlockNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, context: &mut RenderContext<'_>, buffer: &mut String) -> RenderResult {
        if self.expression.evaluate(context)? {
            self.block.render(context, buffer)
        } else {
            Ok(Flow::Done(0))
        }
    }

    async fn render_async(
        &self,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
    ) -> RenderResult {
        if self.expression.evaluate(context)? {
            self.block.render_async(context, buffer).await
        } else {
            Ok(Flow::Done(0))
        }
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        vec![
            ChildNode::new(self.token.span())
                .with_expression(ExpressionRef::Boolean(&self.expression))
                .with_node(&self.block),
        ]
    }
}

/// Literal template text. Whitespace trimming is decided at parse time.
#[derive(Debug)]
pub struct ContentNode {
    pub token: Markup,
    pub text: String,
}

#[async_trait]
impl Node for ContentNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, _context: &mut RenderContext<'_>, buffer: &mut String) -> RenderResult {
        Ok(Flow::Done(write_str(buffer, &self.text)))
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        Vec::new()
    }
}

/// An output statement: a single filtered expression, auto-escaped when the
/// environment enables it.
#[derive(Debug)]
pub struct OutputNode {
    pub token: Markup,
    pub expression: FilteredExpression,
}

#[async_trait]
impl Node for OutputNode {
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

/// A comment. Never evaluates expressions, renders nothing.
#[derive(Debug)]
pub struct CommentNode {
    pub token: Markup,
}

#[async_trait]
impl Node for CommentNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, _context: &mut RenderContext<'_>, _buffer: &mut String) -> RenderResult {
        Ok(Flow::Done(0))
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        Vec::new()
    }
}

/// A raw block: literal output, never lexed as template markup.
#[derive(Debug)]
pub struct RawNode {
    pub token: Markup,
    pub text: String,
}

#[async_trait]
impl Node for RawNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, _context: &mut RenderContext<'_>, buffer: &mut String) -> RenderResult {
        Ok(Flow::Done(write_str(buffer, &self.text)))
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        Vec::new()
    }
}

/// The block of statements inside a `{% liquid %}` tag.
#[derive(Debug)]
pub struct LinesNode {
    pub token: Markup,
    pub block: BlockNode,
}

#[async_trait]
impl Node for LinesNode {
    fn token(&self) -> &Markup {
        &self.token
    }

    fn render(&self, context: &mut RenderContext<'_>, buffer: &mut String) -> RenderResult {
        self.block.render(context, buffer)
    }

    async fn render_async(
        &self,
        context: &mut RenderContext<'_>,
        buffer: &mut String,
    ) -> RenderResult {
        self.block.render_async(context, buffer).await
    }

    fn children(&self) -> Vec<ChildNode<'_>> {
        vec![ChildNode::new(self.token.span()).with_node(&self.block)]
    }
}

/// Apply a parse-time whitespace-trim decision to one side of a content
/// span.
pub(crate) fn trim_start(text: &str, trim: Whitespace) -> &str {
    match trim {
        Whitespace::Strip => text.trim_start_matches([' ', '\t', '\r', '\n']),
        Whitespace::StripNewlines => text.trim_start_matches(['\r', '\n']),
        _ => text,
    }
}

pub(crate) fn trim_end(text: &str, trim: Whitespace) -> &str {
    match trim {
        Whitespace::Strip => text.trim_end_matches([' ', '\t', '\r', '\n']),
        Whitespace::StripNewlines => text.trim_end_matches(['\r', '\n']),
        _ => text,
    }
}
