//! Arithmetic filters.
//!
//! Numbers coerce liberally: numeric strings parse, nil and undefined
//! count as zero. Integer arithmetic stays integral; any float operand
//! makes the result a float. Division and modulo by zero are filter
//! errors.

use crate::environment::{Filter, FilterArgs, FilterState};
use crate::error::TemplateError;
use crate::value::Value;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(n) => n as f64,
            Self::Float(f) => f,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Self::Int(n) => Value::Integer(n),
            Self::Float(f) => Value::Float(f),
        }
    }
}

pub(crate) fn to_number(value: &Value, args: &FilterArgs) -> Result<Num, TemplateError> {
    match value {
        Value::Integer(n) => Ok(Num::Int(*n)),
        Value::Float(f) => Ok(Num::Float(*f)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .map(Num::Int)
                .or_else(|_| trimmed.parse::<f64>().map(Num::Float))
                .map_err(|_| args.error(format!("'{s}' is not a number")))
        }
        Value::Null | Value::Undefined(_) => Ok(Num::Int(0)),
        other => Err(args.error(format!("'{}' is not a number", other.render_str()))),
    }
}

fn is_zero(n: Num) -> bool {
    match n {
        Num::Int(n) => n == 0,
        Num::Float(f) => f == 0.0,
    }
}

#[derive(Debug)]
pub struct Plus;

impl Filter for Plus {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let a = to_number(left, args)?;
        let b = to_number(args.expect(0)?, args)?;
        Ok(match (a, b) {
            (Num::Int(a), Num::Int(b)) => Value::Integer(a.wrapping_add(b)),
            _ => Value::Float(a.as_f64() + b.as_f64()),
        })
    }
}

#[derive(Debug)]
pub struct Minus;

impl Filter for Minus {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let a = to_number(left, args)?;
        let b = to_number(args.expect(0)?, args)?;
        Ok(match (a, b) {
            (Num::Int(a), Num::Int(b)) => Value::Integer(a.wrapping_sub(b)),
            _ => Value::Float(a.as_f64() - b.as_f64()),
        })
    }
}

#[derive(Debug)]
pub struct Times;

impl Filter for Times {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let a = to_number(left, args)?;
        let b = to_number(args.expect(0)?, args)?;
        Ok(match (a, b) {
            (Num::Int(a), Num::Int(b)) => Value::Integer(a.wrapping_mul(b)),
            _ => Value::Float(a.as_f64() * b.as_f64()),
        })
    }
}

#[derive(Debug)]
pub struct DividedBy;

impl Filter for DividedBy {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let a = to_number(left, args)?;
        let b = to_number(args.expect(0)?, args)?;
        if is_zero(b) {
            return Err(args.error("division by zero"));
        }
        Ok(match (a, b) {
            // Integer division floors, like the reference dialect.
            (Num::Int(a), Num::Int(b)) => Value::Integer((a as f64 / b as f64).floor() as i64),
            _ => Value::Float(a.as_f64() / b.as_f64()),
        })
    }
}

#[derive(Debug)]
pub struct Modulo;

impl Filter for Modulo {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let a = to_number(left, args)?;
        let b = to_number(args.expect(0)?, args)?;
        if is_zero(b) {
            return Err(args.error("division by zero"));
        }
        Ok(match (a, b) {
            (Num::Int(a), Num::Int(b)) => {
                Value::Integer(a - b * (a as f64 / b as f64).floor() as i64)
            }
            _ => {
                let (a, b) = (a.as_f64(), b.as_f64());
                Value::Float(a - b * (a / b).floor())
            }
        })
    }
}

#[derive(Debug)]
pub struct Abs;

impl Filter for Abs {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        Ok(match to_number(left, args)? {
            Num::Int(n) => Value::Integer(n.abs()),
            Num::Float(f) => Value::Float(f.abs()),
        })
    }
}

#[derive(Debug)]
pub struct Ceil;

impl Filter for Ceil {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        Ok(match to_number(left, args)? {
            Num::Int(n) => Value::Integer(n),
            Num::Float(f) => Value::Integer(f.ceil() as i64),
        })
    }
}

#[derive(Debug)]
pub struct Floor;

impl Filter for Floor {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        Ok(match to_number(left, args)? {
            Num::Int(n) => Value::Integer(n),
            Num::Float(f) => Value::Integer(f.floor() as i64),
        })
    }
}

#[derive(Debug)]
pub struct Round;

impl Filter for Round {
    fn call(
        &self,
        left: &Value,
        args: &FilterArgs,
        _state: &FilterState<'_, '_>,
    ) -> Result<Value, TemplateError> {
        let digits = match args.get(0) {
            Some(value) => match to_number(value, args)? {
                Num::Int(n) => n,
                Num::Float(f) => f as i64,
            },
            None => 0,
        };
        Ok(match to_number(left, args)? {
            Num::Int(n) => Value::Integer(n),
            Num::Float(f) if digits <= 0 => Value::Integer(f.round() as i64),
            Num::Float(f) => {
                let scale = 10f64.powi(digits.min(i32::MAX as i64) as i32);
                Value::Float((f * scale).round() / scale)
            }
        })
    }
}
