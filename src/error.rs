//! Engine wide error types.
//!
//! Every fatal condition carries a [`Span`] pointing back into the template
//! source, so callers can produce template-name + byte-offset diagnostics.
//! Loop interrupts are not errors; they travel as [`crate::ast::Flow`]
//! values and only become a [`TemplateError::Syntax`] when they escape the
//! construct that should have handled them.

use thiserror::Error;

use crate::tokenizer::Span;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// Malformed template source. Fatal to parsing, never recovered locally.
    #[error("syntax error: {message} (offset {})", .span.start)]
    Syntax { message: String, span: Span },

    /// The scope extension guard tripped. Fatal to the render.
    #[error("maximum context depth reached, possible recursive include (offset {})", .span.start)]
    ContextDepth { span: Span },

    /// A filter name with no registered implementation.
    #[error("unknown filter '{name}' (offset {})", .span.start)]
    NoSuchFilter { name: String, span: Span },

    /// A literal index or slice bound outside the configured signed range.
    #[error("query index error: {message} (offset {})", .span.start)]
    Index { message: String, span: Span },

    /// A value of the wrong shape reached an operator, selector or filter
    /// predicate. The span is filled in by the nearest enclosing selector
    /// when the site that raised it had none.
    #[error("type error: {message}")]
    Type { message: String, span: Option<Span> },

    /// The loader could not supply the named partial template.
    #[error("template not found '{name}' (offset {})", .span.start)]
    NotFound { name: String, span: Span },

    /// An unresolvable variable was used under the strict undefined policy.
    #[error("'{path}' is undefined (offset {})", .span.start)]
    Undefined { path: String, span: Span },

    /// A filter was invoked with arguments it cannot work with.
    #[error("filter '{name}': {message} (offset {})", .span.start)]
    Filter {
        name: String,
        message: String,
        span: Span,
    },
}

impl TemplateError {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::Syntax {
            message: message.into(),
            span,
        }
    }

    /// The source span this error points at, if it carries one.
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Syntax { span, .. }
            | Self::ContextDepth { span }
            | Self::NoSuchFilter { span, .. }
            | Self::Index { span, .. }
            | Self::NotFound { span, .. }
            | Self::Undefined { span, .. }
            | Self::Filter { span, .. } => Some(*span),
            Self::Type { span, .. } => *span,
        }
    }

    /// Attach _span_ to a [`TemplateError::Type`] that has none. Everything
    /// else is returned unchanged, so it is safe to call at every enclosing
    /// selector on the way out.
    pub fn with_span(self, span: Span) -> Self {
        match self {
            Self::Type {
                message,
                span: None,
            } => Self::Type {
                message,
                span: Some(span),
            },
            other => other,
        }
    }

    /// Replace a placeholder span, used when a loader reports a missing
    /// template before the requesting tag's position is known.
    pub(crate) fn at(self, span: Span) -> Self {
        match self {
            Self::NotFound { name, .. } => Self::NotFound { name, span },
            other => other,
        }
    }
}
