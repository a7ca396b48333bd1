//! Lexical token definitions.
//!
//! The lexer produces a flat sequence of [`Markup`] tokens, one per template
//! construct, each carrying its byte-offset [`Span`] and whitespace-control
//! flags. Output and tag markup additionally carry the already-lexed
//! expression tokens for their inner text, ready for the expression parser.

use core::fmt;

use serde::{Deserialize, Serialize};

/// A half-open byte-offset range into the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A whitespace-control flag attached to one side of a markup delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Whitespace {
    /// `+`: keep adjacent whitespace.
    Preserve,
    /// `-`: strip all adjacent whitespace.
    Strip,
    /// `~`: strip adjacent newlines, keep spaces and tabs.
    StripNewlines,
    /// No marker: defer to the environment's default trim policy.
    #[default]
    Default,
}

impl fmt::Display for Whitespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preserve => f.write_str("+"),
            Self::Strip => f.write_str("-"),
            Self::StripNewlines => f.write_str("~"),
            Self::Default => Ok(()),
        }
    }
}

impl Whitespace {
    pub(crate) fn from_marker(marker: Option<char>) -> Self {
        match marker {
            Some('+') => Self::Preserve,
            Some('-') => Self::Strip,
            Some('~') => Self::StripNewlines,
            _ => Self::Default,
        }
    }

    /// Resolve `Default` against the environment policy.
    pub fn or_default(self, default: Whitespace) -> Whitespace {
        match self {
            Self::Default => default,
            other => other,
        }
    }
}

/// One token of an output or tag expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ExprToken {
    pub kind: ExprTokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprTokenKind {
    Word(String),
    StringLiteral(String),
    IntegerLiteral(i64),
    FloatLiteral(f64),
    // Reserved words
    True_,
    False_,
    Null,
    And,
    Or,
    Not,
    In,
    Contains,
    If,
    Else,
    With,
    As,
    For,
    // Operators and punctuation
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
    Colon,
    Pipe,
    DoublePipe,
    AmpAmp,
    Bang,
    Comma,
    LeftParen,
    RightParen,
    Assign,
    Dot,
    DotDot,
    LeftBracket,
    RightBracket,
    Star,
    Question,
    At,
    Root,
}

impl fmt::Display for ExprTokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(w) => write!(f, "{w}"),
            Self::StringLiteral(s) => write!(f, "'{s}'"),
            Self::IntegerLiteral(n) => write!(f, "{n}"),
            Self::FloatLiteral(x) => write!(f, "{x}"),
            Self::True_ => f.write_str("true"),
            Self::False_ => f.write_str("false"),
            Self::Null => f.write_str("null"),
            Self::And => f.write_str("and"),
            Self::Or => f.write_str("or"),
            Self::Not => f.write_str("not"),
            Self::In => f.write_str("in"),
            Self::Contains => f.write_str("contains"),
            Self::If => f.write_str("if"),
            Self::Else => f.write_str("else"),
            Self::With => f.write_str("with"),
            Self::As => f.write_str("as"),
            Self::For => f.write_str("for"),
            Self::Eq => f.write_str("=="),
            Self::Ne => f.write_str("!="),
            Self::Ge => f.write_str(">="),
            Self::Le => f.write_str("<="),
            Self::Gt => f.write_str(">"),
            Self::Lt => f.write_str("<"),
            Self::Colon => f.write_str(":"),
            Self::Pipe => f.write_str("|"),
            Self::DoublePipe => f.write_str("||"),
            Self::AmpAmp => f.write_str("&&"),
            Self::Bang => f.write_str("!"),
            Self::Comma => f.write_str(","),
            Self::LeftParen => f.write_str("("),
            Self::RightParen => f.write_str(")"),
            Self::Assign => f.write_str("="),
            Self::Dot => f.write_str("."),
            Self::DotDot => f.write_str(".."),
            Self::LeftBracket => f.write_str("["),
            Self::RightBracket => f.write_str("]"),
            Self::Star => f.write_str("*"),
            Self::Question => f.write_str("?"),
            Self::At => f.write_str("@"),
            Self::Root => f.write_str("$"),
        }
    }
}

/// The kind of a [`Markup`] token, used by stream expectations and error
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum MarkupKind {
    Content,
    Output,
    Tag,
    Comment,
    Raw,
    Lines,
    Eoi,
}

/// One lexical unit of a template: literal text, an output statement, a tag,
/// a comment, a raw block, a run of line statements, or end of input.
#[derive(Debug, Clone, PartialEq)]
pub enum Markup {
    Content {
        span: Span,
        text: String,
    },
    Output {
        span: Span,
        wc: (Whitespace, Whitespace),
        expression: Vec<ExprToken>,
    },
    Tag {
        span: Span,
        wc: (Whitespace, Whitespace),
        name: String,
        expression: Vec<ExprToken>,
    },
    Comment {
        span: Span,
        wc: (Whitespace, Whitespace),
        text: String,
    },
    Raw {
        span: Span,
        /// Left/right flags of the opening tag, then of the closing tag.
        wc: (Whitespace, Whitespace, Whitespace, Whitespace),
        text: String,
    },
    Lines {
        span: Span,
        wc: (Whitespace, Whitespace),
        statements: Vec<Markup>,
    },
    Eoi,
}

impl Markup {
    pub fn span(&self) -> Span {
        match self {
            Self::Content { span, .. }
            | Self::Output { span, .. }
            | Self::Tag { span, .. }
            | Self::Comment { span, .. }
            | Self::Raw { span, .. }
            | Self::Lines { span, .. } => *span,
            Self::Eoi => Span::default(),
        }
    }

    pub fn kind(&self) -> MarkupKind {
        match self {
            Self::Content { .. } => MarkupKind::Content,
            Self::Output { .. } => MarkupKind::Output,
            Self::Tag { .. } => MarkupKind::Tag,
            Self::Comment { .. } => MarkupKind::Comment,
            Self::Raw { .. } => MarkupKind::Raw,
            Self::Lines { .. } => MarkupKind::Lines,
            Self::Eoi => MarkupKind::Eoi,
        }
    }

    /// The tag name, for tag markup.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Tag { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The lexed expression tokens, for output and tag markup.
    pub fn expression(&self) -> &[ExprToken] {
        match self {
            Self::Output { expression, .. } | Self::Tag { expression, .. } => expression,
            _ => &[],
        }
    }

    /// The whitespace flag controlling trimming of the *following* content,
    /// i.e. this token's trailing flag.
    pub fn trailing_whitespace(&self) -> Whitespace {
        match self {
            Self::Output { wc, .. }
            | Self::Tag { wc, .. }
            | Self::Comment { wc, .. }
            | Self::Lines { wc, .. } => wc.1,
            Self::Raw { wc, .. } => wc.3,
            Self::Content { .. } | Self::Eoi => Whitespace::Default,
        }
    }

    /// The whitespace flag controlling trimming of the *preceding* content,
    /// i.e. this token's leading flag.
    pub fn leading_whitespace(&self) -> Whitespace {
        match self {
            Self::Output { wc, .. }
            | Self::Tag { wc, .. }
            | Self::Comment { wc, .. }
            | Self::Lines { wc, .. } => wc.0,
            Self::Raw { wc, .. } => wc.0,
            Self::Content { .. } | Self::Eoi => Whitespace::Default,
        }
    }
}
