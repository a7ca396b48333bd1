//! Sequence transform filters.

use crate::environment::{Filter, FilterArgs, FilterState};
use crate::error::TemplateError;
use crate::expression::partial_order;
use crate::value::Value;

#[derive(Debug)]
pub struct First;

impl Filter for First {
    fn call(
        &self,
        left: &Value,
        _args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        Ok(match left {
            Value::Array(items) => items.first().cloned().unwrap_or_default(),
            Value::String(s) => s
                .chars()
                .next()
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_default(),
            _ => Value::Null,
        })
    }
}

#[derive(Debug)]
pub struct Last;

impl Filter for Last {
    fn call(
        &self,
        left: &Value,
        _args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        Ok(match left {
            Value::Array(items) => items.last().cloned().unwrap_or_default(),
            Value::String(s) => s
                .chars()
                .last()
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_default(),
            _ => Value::Null,
        })
    }
}

#[derive(Debug)]
pub struct Join;

impl Filter for Join {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let separator = args
            .get(0)
            .map(Value::render_str)
            .unwrap_or_else(|| " ".to_string());
        match left {
            Value::Array(items) => Ok(Value::String(
                items
                    .iter()
                    .map(Value::render_str)
                    .collect::<Vec<_>>()
                    .join(&separator),
            )),
            other => Ok(other.clone()),
        }
    }
}

#[derive(Debug)]
pub struct Reverse;

impl Filter for Reverse {
    fn call(
        &self,
        left: &Value,
        _args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        match left {
            Value::Array(items) => {
                let mut reversed = items.clone();
                reversed.reverse();
                Ok(Value::Array(reversed))
            }
            other => Ok(other.clone()),
        }
    }
}

/// `sort` / `sort: key`. Values order numerically or lexicographically;
/// anything incomparable orders by its rendered string.
#[derive(Debug)]
pub struct Sort;

fn sort_key<'v>(value: &'v Value, key: Option<&str>) -> &'v Value {
    match (value, key) {
        (Value::Object(members), Some(key)) => members.get(key).unwrap_or(&Value::Null),
        _ => value,
    }
}

impl Filter for Sort {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let key = args.get(0).map(Value::render_str);
        match left {
            Value::Array(items) => {
                let mut sorted = items.clone();
                sorted.sort_by(|a, b| {
                    let a = sort_key(a, key.as_deref());
                    let b = sort_key(b, key.as_deref());
                    partial_order(a, b)
                        .unwrap_or_else(|| a.render_str().cmp(&b.render_str()))
                });
                Ok(Value::Array(sorted))
            }
            other => Ok(other.clone()),
        }
    }
}

#[derive(Debug)]
pub struct Uniq;

impl Filter for Uniq {
    fn call(
        &self,
        left: &Value,
        _args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        match left {
            Value::Array(items) => {
                let mut unique: Vec<Value> = Vec::new();
                for item in items {
                    if !unique.iter().any(|seen| seen == item) {
                        unique.push(item.clone());
                    }
                }
                Ok(Value::Array(unique))
            }
            other => Ok(other.clone()),
        }
    }
}

#[derive(Debug)]
pub struct Compact;

impl Filter for Compact {
    fn call(
        &self,
        left: &Value,
        _args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        match left {
            Value::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .filter(|item| !matches!(item, Value::Null | Value::Undefined(_)))
                    .cloned()
                    .collect(),
            )),
            other => Ok(other.clone()),
        }
    }
}

/// `map: key`: project an object member out of each element.
#[derive(Debug)]
pub struct Map;

impl Filter for Map {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let key = args.expect(0)?.render_str();
        match left {
            Value::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Value::Object(members) => {
                            members.get(&key).cloned().unwrap_or(Value::Null)
                        }
                        _ => Value::Null,
                    })
                    .collect(),
            )),
            other => Ok(other.clone()),
        }
    }
}
