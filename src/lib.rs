//! # molten: a Liquid-dialect template engine
//!
//! molten turns template source into an executable syntax tree, renders
//! that tree against layered data scopes, and embeds a JSONPath-like query
//! language for structured variable access.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Source text → Tokenizer → Parser → Syntax tree → Render context → Output
//! ```
//!
//! ### Stage 1: Tokenization ([`tokenizer`])
//!
//! The lexer turns raw source into typed markup tokens, each carrying
//! whitespace-control flags and a byte-offset span. Expression text inside
//! output and tag markers is lexed in the same pass.
//!
//! ### Stage 2: Parsing ([`parser`], [`tags`])
//!
//! The parser steps through the token stream, dispatching tag tokens to
//! registered tag implementations by name and threading whitespace-trim
//! state across recursive block parses.
//!
//! ### Stage 3: The syntax tree ([`ast`], [`expression`], [`query`])
//!
//! Every construct satisfies one render contract, with synchronous and
//! suspension-capable paths that produce byte-identical output, and
//! non-local control signals (`break`, `continue`, stop) travelling as
//! values. Variable paths are [`query::Query`] values, resolved by the same
//! engine that serves in-template structured access.
//!
//! ### Stage 4: Rendering ([`template`], [`context`], [`filters`])
//!
//! A [`template::Template`] binds a parsed tree to its environment; each
//! render gets a fresh [`context::RenderContext`] owning the scope chain,
//! counters, stateful tag namespace, loop stack and recursion guard.
//!
//! ### Static analysis ([`analysis`])
//!
//! Templates can be analyzed without rendering: every variable, tag and
//! filter reference is reported with its source span, and include/render
//! targets are followed through the loader.
//!
//! ## Example
//!
//! ```
//! use molten::{Environment, Value};
//! use serde_json::json;
//!
//! let env = Environment::new();
//! let template = env.from_string("Hello, {{ you | default: 'World' }}!").unwrap();
//! let out = template.render(Value::from(json!({}))).unwrap();
//! assert_eq!(out, "Hello, World!");
//! ```

pub mod analysis;
pub mod ast;
pub mod context;
pub mod environment;
pub mod error;
pub mod expression;
pub mod filters;
pub mod loader;
pub mod parser;
pub mod query;
pub mod tags;
pub mod template;
pub mod tokenizer;
pub mod value;

// Re-exports
pub use analysis::TemplateAnalysis;
pub use ast::{ChildNode, Flow, Node, Signal};
pub use context::RenderContext;
pub use environment::{Environment, Filter, FilterArgs, FilterState, Options, Tag, UndefinedPolicy};
pub use error::TemplateError;
pub use loader::{FileSystemLoader, InMemoryLoader, Loader, TemplateSource};
pub use parser::Parser;
pub use query::{NodeList, PathNode, Query, QueryConfig, Selector};
pub use template::Template;
pub use tokenizer::{Markup, Span, TokenStream, Whitespace, tokenize};
pub use value::{Object, Value};

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}
