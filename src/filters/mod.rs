//! # The standard filter catalog
//!
//! Filters satisfy the [`Filter`] registration contract: plain callables
//! keyed by name, optionally flagged as wanting render-context access. The
//! catalog here covers the common string, sequence and arithmetic
//! transforms templates lean on.

pub mod array;
pub mod math;
pub mod string;

use std::collections::HashMap;

use crate::environment::{Filter, FilterArgs, FilterState};
use crate::error::TemplateError;
use crate::value::{Value, html_escape};

/// `size`: item count of a collection, character count of a string, zero
/// otherwise.
#[derive(Debug)]
pub struct Size;

impl Filter for Size {
    fn call(
        &self,
        left: &Value,
        _args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        Ok(Value::Integer(left.size().unwrap_or(0) as i64))
    }
}

/// `default: fallback[, allow_false: true]`: replace nil, undefined, false
/// and empty strings/arrays with the fallback.
#[derive(Debug)]
pub struct Default;

impl Filter for Default {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let allow_false = args
            .keyword("allow_false")
            .map(Value::is_truthy)
            .unwrap_or(false);

        let use_default = match left {
            Value::Null | Value::Undefined(_) => true,
            Value::Bool(false) => !allow_false,
            Value::String(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        };

        if use_default {
            Ok(args.expect(0)?.clone())
        } else {
            Ok(left.clone())
        }
    }
}

/// `escape`: HTML-escape the rendered value.
#[derive(Debug)]
pub struct Escape;

impl Filter for Escape {
    fn call(
        &self,
        left: &Value,
        _args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        Ok(Value::String(html_escape(&left.render_str())))
    }
}

/// The standard filter set, registered by
/// [`crate::environment::Environment::new`].
pub fn standard_filters() -> HashMap<String, Box<dyn Filter>> {
    let mut filters: HashMap<String, Box<dyn Filter>> = HashMap::new();

    filters.insert("abs".to_string(), Box::new(math::Abs));
    filters.insert("append".to_string(), Box::new(string::Append));
    filters.insert("capitalize".to_string(), Box::new(string::Capitalize));
    filters.insert("ceil".to_string(), Box::new(math::Ceil));
    filters.insert("compact".to_string(), Box::new(array::Compact));
    filters.insert("default".to_string(), Box::new(Default));
    filters.insert("divided_by".to_string(), Box::new(math::DividedBy));
    filters.insert("downcase".to_string(), Box::new(string::Downcase));
    filters.insert("escape".to_string(), Box::new(Escape));
    filters.insert("first".to_string(), Box::new(array::First));
    filters.insert("floor".to_string(), Box::new(math::Floor));
    filters.insert("join".to_string(), Box::new(array::Join));
    filters.insert("last".to_string(), Box::new(array::Last));
    filters.insert("lstrip".to_string(), Box::new(string::Lstrip));
    filters.insert("map".to_string(), Box::new(array::Map));
    filters.insert("minus".to_string(), Box::new(math::Minus));
    filters.insert("modulo".to_string(), Box::new(math::Modulo));
    filters.insert("plus".to_string(), Box::new(math::Plus));
    filters.insert("prepend".to_string(), Box::new(string::Prepend));
    filters.insert("remove".to_string(), Box::new(string::Remove));
    filters.insert("replace".to_string(), Box::new(string::Replace));
    filters.insert("reverse".to_string(), Box::new(array::Reverse));
    filters.insert("round".to_string(), Box::new(math::Round));
    filters.insert("rstrip".to_string(), Box::new(string::Rstrip));
    filters.insert("size".to_string(), Box::new(Size));
    filters.insert("slice".to_string(), Box::new(string::Slice));
    filters.insert("sort".to_string(), Box::new(array::Sort));
    filters.insert("split".to_string(), Box::new(string::Split));
    filters.insert("strip".to_string(), Box::new(string::Strip));
    filters.insert("times".to_string(), Box::new(math::Times));
    filters.insert("uniq".to_string(), Box::new(array::Uniq));
    filters.insert("upcase".to_string(), Box::new(string::Upcase));

    filters
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::environment::Environment;
    use crate::value::Value;

    fn render(source: &str) -> String {
        let env = Environment::new();
        env.from_string(source).unwrap().render(Value::Null).unwrap()
    }

    #[test]
    fn test_string_filters() {
        assert_eq!(render("{{ 'ab' | append: 'c' | upcase }}"), "ABC");
        assert_eq!(render("{{ 'World' | prepend: 'Hello, ' }}"), "Hello, World");
        assert_eq!(render("{{ 'hELLO' | capitalize }}"), "Hello");
        assert_eq!(render("{{ '  x  ' | strip }}"), "x");
        assert_eq!(render("{{ 'a,b,c' | split: ',' | join: '-' }}"), "a-b-c");
        assert_eq!(render("{{ 'banana' | replace: 'a', 'o' }}"), "bonono");
        assert_eq!(render("{{ 'Liquid' | slice: -5, 3 }}"), "iqu");
    }

    #[test]
    fn test_math_filters() {
        assert_eq!(render("{{ 1 | plus: 2 }}"), "3");
        assert_eq!(render("{{ 10 | minus: 2.5 }}"), "7.5");
        assert_eq!(render("{{ 3 | times: 4 }}"), "12");
        assert_eq!(render("{{ 20 | divided_by: 7 }}"), "2");
        assert_eq!(render("{{ 20 | divided_by: 7.0 | round: 2 }}"), "2.86");
        assert_eq!(render("{{ 7 | modulo: 3 }}"), "1");
        assert_eq!(render("{{ -3 | abs }}"), "3");
        assert_eq!(render("{{ 1.4 | ceil }}"), "2");
    }

    #[test]
    fn test_division_by_zero_is_a_filter_error() {
        let env = Environment::new();
        let template = env.from_string("{{ 1 | divided_by: 0 }}").unwrap();
        assert!(template.render(Value::Null).is_err());
    }

    #[test]
    fn test_array_filters() {
        assert_eq!(render("{{ (1..5) | size }}"), "5");
        assert_eq!(render("{{ (1..3) | reverse | join: ',' }}"), "3,2,1");
        assert_eq!(
            render("{{ 'b,a,c' | split: ',' | sort | join: '' }}"),
            "abc"
        );
        assert_eq!(
            render("{{ 'a,b,a' | split: ',' | uniq | join: '' }}"),
            "ab"
        );
        assert_eq!(render("{{ (1..3) | first }}"), "1");
        assert_eq!(render("{{ (1..3) | last }}"), "3");
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(render("{{ nosuch | default: 'fallback' }}"), "fallback");
        assert_eq!(render("{{ '' | default: 'fallback' }}"), "fallback");
        assert_eq!(render("{{ false | default: 'fallback' }}"), "fallback");
        assert_eq!(
            render("{{ false | default: 'fallback', allow_false: true }}"),
            "false"
        );
        assert_eq!(render("{{ 'keep' | default: 'fallback' }}"), "keep");
    }

    #[test]
    fn test_escape_filter() {
        assert_eq!(
            render("{{ '<b>&</b>' | escape }}"),
            "&lt;b&gt;&amp;&lt;/b&gt;"
        );
    }
}
