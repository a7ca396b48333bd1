//! # Lexing and token streams
//!
//! The tokenizer turns raw template source into typed [`Markup`] tokens and
//! provides the cursors the parser consumes them through:
//!
//! ```text
//! Source text → tokenize() → Vec<Markup> → TokenStream → Parser
//! ```
//!
//! Expression text inside `{{ ... }}` and `{% ... %}` is lexed in the same
//! pass into [`ExprToken`]s, so downstream parsers only ever deal with typed
//! tokens, each carrying a byte-offset [`Span`] back into the source.

pub mod lexer;
pub mod markup;
pub mod stream;

pub use lexer::tokenize;
pub use markup::{ExprToken, ExprTokenKind, Markup, MarkupKind, Span, Whitespace};
pub use stream::{ExprStream, TokenStream};
