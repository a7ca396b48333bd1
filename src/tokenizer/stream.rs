//! Cursors over lexed tokens.
//!
//! [`TokenStream`] steps through markup tokens and carries the one-slot
//! `trim_carry` used to thread whitespace-control state across recursive
//! block parses. [`ExprStream`] is the equivalent cursor over the expression
//! tokens inside a single output or tag markup.

use super::markup::{ExprToken, ExprTokenKind, Markup, MarkupKind, Span, Whitespace};
use crate::error::TemplateError;

static EOI: Markup = Markup::Eoi;

/// A peekable, push-back cursor over markup tokens.
#[derive(Debug)]
pub struct TokenStream {
    tokens: Vec<Markup>,
    pos: usize,
    /// Whitespace-control state handed from an outer parse to an inner one,
    /// or back, across a block boundary.
    pub trim_carry: Whitespace,
}

impl TokenStream {
    pub fn new(tokens: Vec<Markup>) -> Self {
        Self {
            tokens,
            pos: 0,
            trim_carry: Whitespace::Default,
        }
    }

    /// The current token, or end-of-input when the stream is exhausted.
    pub fn current(&self) -> &Markup {
        self.tokens.get(self.pos).unwrap_or(&EOI)
    }

    /// Lookahead without consuming.
    pub fn peek(&self) -> &Markup {
        self.tokens.get(self.pos + 1).unwrap_or(&EOI)
    }

    /// Return the current token and advance past it.
    pub fn next(&mut self) -> Markup {
        let token = self.tokens.get(self.pos).cloned().unwrap_or(Markup::Eoi);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Push a token back onto the stream, making it current again.
    pub fn push(&mut self, token: Markup) {
        self.tokens.insert(self.pos, token);
    }

    /// Fail with a syntax error if the current token is not of `kind`.
    pub fn expect(&self, kind: MarkupKind) -> Result<(), TemplateError> {
        let current = self.current();
        if current.kind() == kind {
            Ok(())
        } else {
            Err(TemplateError::syntax(
                format!("expected {kind}, found {}", current.kind()),
                current.span(),
            ))
        }
    }

    /// Fail with a syntax error if the next token is not of `kind`.
    pub fn expect_peek(&self, kind: MarkupKind) -> Result<(), TemplateError> {
        let next = self.peek();
        if next.kind() == kind {
            Ok(())
        } else {
            Err(TemplateError::syntax(
                format!("expected {kind}, found {}", next.kind()),
                next.span(),
            ))
        }
    }

    /// True if the current token is a tag named `name`.
    pub fn is_tag(&self, name: &str) -> bool {
        self.current().name() == Some(name)
    }

    /// True if the current token is a tag with a name in `names`.
    pub fn is_one_of(&self, names: &[&str]) -> bool {
        match self.current().name() {
            Some(name) => names.contains(&name),
            None => false,
        }
    }
}

/// A cursor over the expression tokens of one output or tag markup.
#[derive(Debug)]
pub struct ExprStream<'a> {
    tokens: &'a [ExprToken],
    pos: usize,
    /// Span reported for errors at end of expression.
    end: Span,
}

impl<'a> ExprStream<'a> {
    pub fn new(tokens: &'a [ExprToken], end: Span) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
        }
    }

    /// A stream over the expression of an output or tag markup.
    pub fn of(markup: &'a Markup) -> Self {
        Self::new(markup.expression(), markup.span())
    }

    pub fn current(&self) -> Option<&'a ExprToken> {
        self.tokens.get(self.pos)
    }

    pub fn kind(&self) -> Option<&'a ExprTokenKind> {
        self.current().map(|t| &t.kind)
    }

    pub fn peek(&self) -> Option<&'a ExprTokenKind> {
        self.tokens.get(self.pos + 1).map(|t| &t.kind)
    }

    pub fn next(&mut self) -> Option<ExprToken> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// The span of the current token, or of the enclosing markup at end.
    pub fn span(&self) -> Span {
        self.current().map(|t| t.span).unwrap_or(self.end)
    }

    /// Consume the current token if it matches `kind`.
    pub fn eat(&mut self, kind: &ExprTokenKind) -> bool {
        if self.kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume the current token, failing unless it matches `kind`.
    pub fn expect(&mut self, kind: &ExprTokenKind) -> Result<ExprToken, TemplateError> {
        match self.current() {
            Some(token) if token.kind == *kind => Ok(self.next().unwrap_or_else(|| token.clone())),
            Some(token) => Err(TemplateError::syntax(
                format!("expected '{kind}', found '{}'", token.kind),
                token.span,
            )),
            None => Err(TemplateError::syntax(
                format!("expected '{kind}', found end of expression"),
                self.end,
            )),
        }
    }

    /// Consume a bare word, returning its text and span.
    pub fn expect_word(&mut self) -> Result<(String, Span), TemplateError> {
        match self.current() {
            Some(ExprToken {
                kind: ExprTokenKind::Word(word),
                span,
            }) => {
                let out = (word.clone(), *span);
                self.pos += 1;
                Ok(out)
            }
            Some(token) => Err(TemplateError::syntax(
                format!("expected an identifier, found '{}'", token.kind),
                token.span,
            )),
            None => Err(TemplateError::syntax(
                "expected an identifier, found end of expression",
                self.end,
            )),
        }
    }

    /// Fail if any tokens remain unconsumed.
    pub fn expect_end(&self) -> Result<(), TemplateError> {
        match self.current() {
            None => Ok(()),
            Some(token) => Err(TemplateError::syntax(
                format!("unexpected '{}'", token.kind),
                token.span,
            )),
        }
    }

    pub(crate) fn syntax_error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::syntax(message, self.span())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tokenizer::tokenize;

    fn stream(source: &str) -> TokenStream {
        TokenStream::new(tokenize(source).unwrap())
    }

    #[test]
    fn test_step_and_peek() {
        let mut s = stream("a{{ b }}c");
        assert_eq!(s.current().kind(), MarkupKind::Content);
        assert_eq!(s.peek().kind(), MarkupKind::Output);
        let first = s.next();
        assert_eq!(first.kind(), MarkupKind::Content);
        assert_eq!(s.current().kind(), MarkupKind::Output);
    }

    #[test]
    fn test_exhaustion_yields_eoi() {
        let mut s = stream("a");
        s.next();
        s.next();
        assert_eq!(s.current().kind(), MarkupKind::Eoi);
        assert_eq!(s.next().kind(), MarkupKind::Eoi);
    }

    #[test]
    fn test_push_back() {
        let mut s = stream("a{{ b }}");
        let first = s.next();
        s.push(first);
        assert_eq!(s.current().kind(), MarkupKind::Content);
    }

    #[test]
    fn test_expect_mismatch_carries_offending_token() {
        let s = stream("{{ b }}");
        let err = s.expect(MarkupKind::Tag).unwrap_err();
        match err {
            TemplateError::Syntax { span, .. } => assert_eq!(span, Span::new(0, 7)),
            other => panic!("expected a syntax error, found {other:?}"),
        }
    }

    #[test]
    fn test_is_tag() {
        let s = stream("{% assign x = 1 %}");
        assert!(s.is_tag("assign"));
        assert!(s.is_one_of(&["for", "assign"]));
        assert!(!s.is_one_of(&["for", "if"]));
    }
}
