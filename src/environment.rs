//! Template parsing and rendering configuration.
//!
//! An [`Environment`] owns the tag and filter registries, the template
//! loader, and the options shared by every template parsed through it.
//! Registries are plain name-to-implementation maps populated at setup and
//! dispatched by string key.

use core::fmt;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ast::Node;
use crate::context::RenderContext;
use crate::error::TemplateError;
use crate::loader::{InMemoryLoader, Loader};
use crate::parser::Parser;
use crate::query::QueryConfig;
use crate::template::Template;
use crate::tokenizer::{Span, TokenStream, Whitespace, tokenize};
use crate::value::{Object, Value};

/// What happens when a variable lookup finds nothing and no default was
/// supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndefinedPolicy {
    /// Produce the undefined sentinel: renders empty, falsy, iterates empty.
    #[default]
    Lenient,
    /// Fail the render with an undefined-variable error.
    Strict,
}

/// Environment options, deserializable from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// HTML-escape rendered output expressions.
    pub auto_escape: bool,
    /// Default whitespace-control policy for markers that carry none.
    pub trim: Whitespace,
    /// Maximum number of scope extension layers before a render fails.
    pub context_depth_limit: usize,
    pub undefined: UndefinedPolicy,
    /// Randomize object member order in wildcard and filter selectors.
    pub nondeterministic: bool,
    pub max_int_index: i64,
    pub min_int_index: i64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            auto_escape: false,
            trim: Whitespace::Preserve,
            context_depth_limit: 30,
            undefined: UndefinedPolicy::default(),
            nondeterministic: false,
            max_int_index: (1 << 53) - 1,
            min_int_index: -(1 << 53) + 1,
        }
    }
}

// Serde support for the whitespace flag, so options files can say "+"/"-"/"~".
impl Serialize for Whitespace {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Whitespace {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "+" => Ok(Self::Preserve),
            "-" => Ok(Self::Strip),
            "~" => Ok(Self::StripNewlines),
            "" => Ok(Self::Default),
            other => Err(serde::de::Error::custom(format!(
                "invalid whitespace flag '{other}'"
            ))),
        }
    }
}

/// A tag implementation: parses the tokens of one tag construct into a
/// node. Block tags also declare the tag names that terminate their body.
pub trait Tag: Send + Sync {
    /// Parse this tag's construct. The stream is positioned at the tag
    /// token; implementations must leave the stream at the last token of
    /// their construct.
    fn parse(
        &self,
        stream: &mut TokenStream,
        parser: &Parser<'_>,
    ) -> Result<Box<dyn Node>, TemplateError>;

    /// Terminator tag names, for block tags.
    fn end_names(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Evaluated arguments of one filter application.
#[derive(Debug, Clone)]
pub struct FilterArgs {
    pub positional: Vec<Value>,
    pub keyword: Object,
    pub(crate) name: String,
    pub(crate) span: Span,
}

impl FilterArgs {
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.keyword.get(name)
    }

    /// The positional argument at `index`, or an invalid-arguments error.
    pub fn expect(&self, index: usize) -> Result<&Value, TemplateError> {
        self.positional.get(index).ok_or_else(|| self.error(format!(
            "missing argument {}",
            index + 1
        )))
    }

    pub fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::Filter {
            name: self.name.clone(),
            message: message.into(),
            span: self.span,
        }
    }
}

/// State handed to a filter call. `context` is bound only for filters that
/// declare they want it.
pub struct FilterState<'a, 'env> {
    pub env: &'env Environment,
    pub context: Option<&'a RenderContext<'env>>,
    pub span: Span,
}

/// A filter implementation: transforms one value into another.
pub trait Filter: Send + Sync + fmt::Debug {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError>;

    /// True if this filter needs access to render-time state.
    fn wants_context(&self) -> bool {
        false
    }
}

/// Shared parsing and rendering configuration: registries, loader, options.
pub struct Environment {
    pub tags: HashMap<String, Box<dyn Tag>>,
    pub filters: HashMap<String, Box<dyn Filter>>,
    pub loader: Box<dyn Loader>,
    pub options: Options,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// An environment with the standard tags and filters registered and an
    /// empty in-memory loader.
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        Self {
            tags: crate::tags::standard_tags(),
            filters: crate::filters::standard_filters(),
            loader: Box::new(InMemoryLoader::new()),
            options,
        }
    }

    pub fn set_loader(&mut self, loader: impl Loader + 'static) {
        self.loader = Box::new(loader);
    }

    pub fn register_tag(&mut self, name: impl Into<String>, tag: impl Tag + 'static) {
        self.tags.insert(name.into(), Box::new(tag));
    }

    pub fn register_filter(&mut self, name: impl Into<String>, filter: impl Filter + 'static) {
        self.filters.insert(name.into(), Box::new(filter));
    }

    pub fn query_config(&self) -> QueryConfig {
        QueryConfig {
            nondeterministic: self.options.nondeterministic,
            max_int_index: self.options.max_int_index,
            min_int_index: self.options.min_int_index,
        }
    }

    /// Compile template source text into a node sequence.
    pub fn parse(&self, source: &str) -> Result<Vec<Box<dyn Node>>, TemplateError> {
        Parser::new(self).parse(tokenize(source)?)
    }

    /// Create a template from a string.
    pub fn from_string(&self, source: &str) -> Result<Template<'_>, TemplateError> {
        self.from_named_string("<string>", source)
    }

    pub fn from_named_string(
        &self,
        name: &str,
        source: &str,
    ) -> Result<Template<'_>, TemplateError> {
        Ok(Template::new(self, self.parse(source)?, name))
    }

    /// Load and parse a named partial template through the blocking loader
    /// path.
    pub fn get_template(&self, name: &str, span: Span) -> Result<Template<'_>, TemplateError> {
        let source = self.loader.load(name).map_err(|err| err.at(span))?;
        self.from_named_string(&source.name, &source.source)
    }

    /// Load and parse a named partial template, suspending while the loader
    /// fetches it.
    pub async fn get_template_async(
        &self,
        name: &str,
        span: Span,
    ) -> Result<Template<'_>, TemplateError> {
        let source = self.loader.load_async(name).await.map_err(|err| err.at(span))?;
        self.from_named_string(&source.name, &source.source)
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("tags", &self.tags.keys().collect::<Vec<_>>())
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}
