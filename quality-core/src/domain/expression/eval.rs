// quality-core/src/domain/expression/eval.rs

use super::error::ExpressionError;
use super::parser::{BinaryOp, Expr, Function, Method, compile_pattern};
use super::value::{NULL, Value, mismatch};
use super::{Bindings, EvalEnv};
use chrono::{Duration, NaiveDate};
use regex::Regex;
use std::borrow::Cow;
use std::cmp::Ordering;

pub(crate) struct Interpreter<'a> {
    bindings: &'a dyn Bindings,
    env: &'a EvalEnv,
}

impl<'a> Interpreter<'a> {
    pub fn new(bindings: &'a dyn Bindings, env: &'a EvalEnv) -> Self {
        Self { bindings, env }
    }

    pub fn eval(&self, expr: &'a Expr) -> Result<Cow<'a, Value>, ExpressionError> {
        match expr {
            Expr::Literal(value) => Ok(Cow::Borrowed(value)),
            // Undefined variables read as null
            Expr::Variable(name) => Ok(Cow::Borrowed(self.bindings.resolve(name).unwrap_or(&NULL))),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item).map(Cow::into_owned))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Cow::Owned(Value::List(values)))
            }
            Expr::Not(inner) => Ok(Cow::Owned(Value::Bool(!self.eval(inner)?.truthy()))),
            Expr::Negate(inner) => match self.eval(inner)?.as_ref() {
                Value::Null => Ok(Cow::Borrowed(&NULL)),
                Value::Number(n) => Ok(Cow::Owned(Value::Number(-n))),
                other => Err(ExpressionError::Type(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            },
            Expr::Binary { op, left, right } => self.binary(*op, left, right).map(Cow::Owned),
            Expr::Call { function, args } => self.call(*function, args).map(Cow::Owned),
            Expr::Method {
                receiver,
                method,
                args,
            } => {
                let target = self.eval(receiver)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                invoke(*method, &target, &args).map(Cow::Owned)
            }
            Expr::Matches { receiver, regex } => {
                let target = self.eval(receiver)?;
                full_match(&target, regex).map(Cow::Owned)
            }
        }
    }

    fn binary(&self, op: BinaryOp, left: &'a Expr, right: &'a Expr) -> Result<Value, ExpressionError> {
        // Short-circuit connectives first: `#x == null || #x.trim()...` must not touch the right side
        match op {
            BinaryOp::Or => {
                if self.eval(left)?.truthy() {
                    return Ok(Value::Bool(true));
                }
                return Ok(Value::Bool(self.eval(right)?.truthy()));
            }
            BinaryOp::And => {
                if !self.eval(left)?.truthy() {
                    return Ok(Value::Bool(false));
                }
                return Ok(Value::Bool(self.eval(right)?.truthy()));
            }
            _ => {}
        }

        let l = self.eval(left)?;
        let r = self.eval(right)?;
        let (l, r) = (l.as_ref(), r.as_ref());

        match op {
            BinaryOp::Equal => Ok(Value::Bool(l.loose_eq(r))),
            BinaryOp::NotEqual => Ok(Value::Bool(!l.loose_eq(r))),
            BinaryOp::Less => ordered(l, r, Ordering::is_lt),
            BinaryOp::LessEqual => ordered(l, r, Ordering::is_le),
            BinaryOp::Greater => ordered(l, r, Ordering::is_gt),
            BinaryOp::GreaterEqual => ordered(l, r, Ordering::is_ge),
            BinaryOp::In => membership(l, r).map(Value::Bool),
            BinaryOp::NotIn => membership(l, r).map(|found| Value::Bool(!found)),
            BinaryOp::Add
            | BinaryOp::Subtract
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::Modulo => arithmetic(op, l, r),
            BinaryOp::Or | BinaryOp::And => Ok(Value::Null),
        }
    }

    fn call(&self, function: Function, args: &'a [Expr]) -> Result<Value, ExpressionError> {
        let values = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>, _>>()?;

        match function {
            Function::Today => Ok(Value::Date(self.env.today)),
            Function::DaysBetween => {
                let (from, to) = (values[0].as_ref(), values[1].as_ref());
                if from.is_null() || to.is_null() {
                    return Ok(Value::Null);
                }
                let from = expect_date("DAYS_BETWEEN", from)?;
                let to = expect_date("DAYS_BETWEEN", to)?;
                Ok(Value::Number((to - from).num_days() as f64))
            }
            Function::Date => match values[0].as_ref() {
                Value::Null => Ok(Value::Null),
                other => expect_date("DATE", other).map(Value::Date),
            },
            Function::Abs => match values[0].as_ref() {
                Value::Null => Ok(Value::Null),
                Value::Number(n) => Ok(Value::Number(n.abs())),
                other => Err(ExpressionError::Type(format!(
                    "ABS expects a number, got {}",
                    other.type_name()
                ))),
            },
            Function::Min | Function::Max => {
                let wanted = if function == Function::Min {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
                let mut best: Option<&Value> = None;
                for value in values.iter().map(|v| v.as_ref()).filter(|v| !v.is_null()) {
                    best = match best {
                        Some(current) if value.compare(current)? != Some(wanted) => Some(current),
                        _ => Some(value),
                    };
                }
                Ok(best.cloned().unwrap_or(Value::Null))
            }
            Function::Coalesce => Ok(values
                .iter()
                .map(|v| v.as_ref())
                .find(|v| !v.is_null())
                .cloned()
                .unwrap_or(Value::Null)),
        }
    }
}

fn ordered(l: &Value, r: &Value, test: fn(Ordering) -> bool) -> Result<Value, ExpressionError> {
    // Any comparison against null is false
    Ok(Value::Bool(l.compare(r)?.is_some_and(test)))
}

fn membership(needle: &Value, haystack: &Value) -> Result<bool, ExpressionError> {
    match haystack {
        Value::Null => Ok(false),
        Value::List(items) => Ok(items.iter().any(|item| item.loose_eq(needle))),
        Value::Text(text) => match needle {
            Value::Null => Ok(false),
            Value::Text(part) => Ok(text.contains(part.as_str())),
            other => Ok(text.contains(&other.to_string())),
        },
        other => Err(ExpressionError::Type(format!(
            "'in' expects a list or string, got {}",
            other.type_name()
        ))),
    }
}

fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, ExpressionError> {
    match (op, l, r) {
        (_, Value::Null, _) | (_, _, Value::Null) => Ok(Value::Null),
        (BinaryOp::Add, Value::Text(a), b) => Ok(Value::Text(format!("{a}{b}"))),
        (BinaryOp::Add, a, Value::Text(b)) => Ok(Value::Text(format!("{a}{b}"))),
        (BinaryOp::Add, Value::Date(d), Value::Number(n)) => shift(*d, *n).map(Value::Date),
        (BinaryOp::Subtract, Value::Date(d), Value::Number(n)) => shift(*d, -n).map(Value::Date),
        (BinaryOp::Subtract, Value::Date(a), Value::Date(b)) => {
            Ok(Value::Number((*a - *b).num_days() as f64))
        }
        (_, Value::Number(a), Value::Number(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Subtract => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide | BinaryOp::Modulo if b == 0.0 => {
                    return Err(ExpressionError::Evaluation("division by zero".into()));
                }
                BinaryOp::Divide => a / b,
                BinaryOp::Modulo => a % b,
                _ => return Err(mismatch("combine", l, r)),
            };
            Ok(Value::Number(result))
        }
        _ => Err(mismatch("combine", l, r)),
    }
}

fn shift(date: NaiveDate, days: f64) -> Result<NaiveDate, ExpressionError> {
    if days.fract() != 0.0 || !days.is_finite() {
        return Err(ExpressionError::Type(format!(
            "day offset must be a whole number, got {days}"
        )));
    }
    Duration::try_days(days as i64)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or_else(|| ExpressionError::Evaluation(format!("date out of range: {date} + {days}")))
}

fn expect_date(context: &str, value: &Value) -> Result<NaiveDate, ExpressionError> {
    value.as_date().ok_or_else(|| {
        ExpressionError::Type(format!(
            "{context} expects a date, got {} '{value}'",
            value.type_name()
        ))
    })
}

fn expect_text<'v>(method: Method, value: &'v Value) -> Result<&'v str, ExpressionError> {
    match value {
        Value::Text(s) => Ok(s),
        Value::Null => Err(ExpressionError::NullReceiver(method.name().to_string())),
        other => Err(ExpressionError::Type(format!(
            "{}() expects a string, got {}",
            method.name(),
            other.type_name()
        ))),
    }
}

fn full_match(target: &Value, regex: &Regex) -> Result<Value, ExpressionError> {
    let text = expect_text(Method::Matches, target)?;
    Ok(Value::Bool(regex.is_match(text)))
}

fn invoke(method: Method, target: &Value, args: &[Cow<'_, Value>]) -> Result<Value, ExpressionError> {
    if target.is_null() {
        return Err(ExpressionError::NullReceiver(method.name().to_string()));
    }
    let arg = |i: usize| args.get(i).map_or(&NULL, |a| a.as_ref());

    match method {
        Method::Trim => Ok(Value::Text(expect_text(method, target)?.trim().to_string())),
        Method::ToUpperCase => Ok(Value::Text(expect_text(method, target)?.to_uppercase())),
        Method::ToLowerCase => Ok(Value::Text(expect_text(method, target)?.to_lowercase())),
        Method::IsBlank => Ok(Value::Bool(expect_text(method, target)?.trim().is_empty())),
        Method::IsEmpty => match target {
            Value::List(items) => Ok(Value::Bool(items.is_empty())),
            other => Ok(Value::Bool(expect_text(method, other)?.is_empty())),
        },
        Method::Length => match target {
            Value::List(items) => Ok(Value::Number(items.len() as f64)),
            other => Ok(Value::Number(
                expect_text(method, other)?.chars().count() as f64
            )),
        },
        Method::Contains => match target {
            Value::List(items) => Ok(Value::Bool(items.iter().any(|i| i.loose_eq(arg(0))))),
            other => {
                let text = expect_text(method, other)?;
                Ok(Value::Bool(match arg(0) {
                    Value::Null => false,
                    needle => text.contains(&needle.to_string()),
                }))
            }
        },
        Method::StartsWith | Method::EndsWith | Method::EqualsIgnoreCase => {
            let text = expect_text(method, target)?;
            let Value::Text(other) = arg(0) else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match method {
                Method::StartsWith => text.starts_with(other.as_str()),
                Method::EndsWith => text.ends_with(other.as_str()),
                _ => text.eq_ignore_ascii_case(other),
            }))
        }
        Method::Matches => {
            let pattern = expect_text(method, arg(0))?;
            full_match(target, &compile_pattern(pattern)?)
        }
        Method::IsBefore | Method::IsAfter | Method::IsEqual => {
            let date = expect_date(method.name(), target)?;
            let other = match arg(0) {
                Value::Null => {
                    return Err(ExpressionError::Evaluation(format!(
                        "{}() called with a null date",
                        method.name()
                    )));
                }
                other => expect_date(method.name(), other)?,
            };
            Ok(Value::Bool(match method {
                Method::IsBefore => date < other,
                Method::IsAfter => date > other,
                _ => date == other,
            }))
        }
        Method::PlusDays | Method::MinusDays => {
            let date = expect_date(method.name(), target)?;
            let days = arg(0).as_number().ok_or_else(|| {
                ExpressionError::Type(format!("{}() expects a number of days", method.name()))
            })?;
            let days = if method == Method::MinusDays { -days } else { days };
            shift(date, days).map(Value::Date)
        }
    }
}
