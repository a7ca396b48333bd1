//! String transform filters.

use crate::environment::{Filter, FilterArgs, FilterState};
use crate::error::TemplateError;
use crate::value::Value;

use super::math::{Num, to_number};

#[derive(Debug)]
pub struct Append;

impl Filter for Append {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let mut out = left.render_str();
        out.push_str(&args.expect(0)?.render_str());
        Ok(Value::String(out))
    }
}

#[derive(Debug)]
pub struct Prepend;

impl Filter for Prepend {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let mut out = args.expect(0)?.render_str();
        out.push_str(&left.render_str());
        Ok(Value::String(out))
    }
}

#[derive(Debug)]
pub struct Upcase;

impl Filter for Upcase {
    fn call(
        &self,
        left: &Value,
        _args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        Ok(Value::String(left.render_str().to_uppercase()))
    }
}

#[derive(Debug)]
pub struct Downcase;

impl Filter for Downcase {
    fn call(
        &self,
        left: &Value,
        _args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        Ok(Value::String(left.render_str().to_lowercase()))
    }
}

#[derive(Debug)]
pub struct Capitalize;

impl Filter for Capitalize {
    fn call(
        &self,
        left: &Value,
        _args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let text = left.render_str();
        let mut chars = text.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
            None => String::new(),
        };
        Ok(Value::String(capitalized))
    }
}

#[derive(Debug)]
pub struct Strip;

impl Filter for Strip {
    fn call(
        &self,
        left: &Value,
        _args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        Ok(Value::String(left.render_str().trim().to_string()))
    }
}

#[derive(Debug)]
pub struct Lstrip;

impl Filter for Lstrip {
    fn call(
        &self,
        left: &Value,
        _args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        Ok(Value::String(left.render_str().trim_start().to_string()))
    }
}

#[derive(Debug)]
pub struct Rstrip;

impl Filter for Rstrip {
    fn call(
        &self,
        left: &Value,
        _args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        Ok(Value::String(left.render_str().trim_end().to_string()))
    }
}

#[derive(Debug)]
pub struct Split;

impl Filter for Split {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let text = left.render_str();
        let separator = args.expect(0)?.render_str();
        if text.is_empty() {
            return Ok(Value::Array(Vec::new()));
        }
        let parts: Vec<Value> = if separator.is_empty() {
            text.chars().map(|c| Value::String(c.to_string())).collect()
        } else {
            text.split(separator.as_str())
                .map(|part| Value::String(part.to_string()))
                .collect()
        };
        Ok(Value::Array(parts))
    }
}

#[derive(Debug)]
pub struct Replace;

impl Filter for Replace {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let from = args.expect(0)?.render_str();
        let to = args.get(1).map(Value::render_str).unwrap_or_default();
        Ok(Value::String(left.render_str().replace(&from, &to)))
    }
}

#[derive(Debug)]
pub struct Remove;

impl Filter for Remove {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let from = args.expect(0)?.render_str();
        Ok(Value::String(left.render_str().replace(&from, "")))
    }
}

/// `slice: start[, length]` over strings and arrays, with negative start
/// counting from the end.
#[derive(Debug)]
pub struct Slice;

fn slice_bounds(start: i64, length: i64, len: usize) -> (usize, usize) {
    let len = len as i64;
    let begin = if start < 0 {
        (len + start).max(0)
    } else {
        start.min(len)
    };
    let take = length.max(0);
    (begin as usize, take as usize)
}

impl Filter for Slice {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let start = match to_number(args.expect(0)?, args)? {
            Num::Int(n) => n,
            Num::Float(f) => f as i64,
        };
        let length = match args.get(1) {
            Some(value) => match to_number(value, args)? {
                Num::Int(n) => n,
                Num::Float(f) => f as i64,
            },
            None => 1,
        };

        match left {
            Value::Array(items) => {
                let (begin, take) = slice_bounds(start, length, items.len());
                Ok(Value::Array(
                    items.iter().skip(begin).take(take).cloned().collect(),
                ))
            }
            other => {
                let text = other.render_str();
                let chars: Vec<char> = text.chars().collect();
                let (begin, take) = slice_bounds(start, length, chars.len());
                Ok(Value::String(
                    chars.iter().skip(begin).take(take).collect(),
                ))
            }
        }
    }
}
