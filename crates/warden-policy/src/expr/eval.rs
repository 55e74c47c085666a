use std::cmp::Ordering;

use serde_json::Value;

use super::parser::{CompareOp, Function, Node, PathSegment};
use crate::error::{PolicyError, PolicyResult};

/// `false`, `null`, `""`, `[]` and `{}` are falsy; everything else is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    }
}

pub(crate) fn evaluate(node: &Node, root: &Value) -> PolicyResult<Value> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Path(segments) => Ok(lookup(root, segments).cloned().unwrap_or(Value::Null)),
        Node::Not(inner) => Ok(Value::Bool(!is_truthy(&evaluate(inner, root)?))),
        Node::And(left, right) => {
            let left = evaluate(left, root)?;
            if is_truthy(&left) {
                evaluate(right, root)
            } else {
                Ok(left)
            }
        }
        Node::Or(left, right) => {
            let left = evaluate(left, root)?;
            if is_truthy(&left) {
                Ok(left)
            } else {
                evaluate(right, root)
            }
        }
        Node::Compare(op, left, right) => {
            let left = evaluate(left, root)?;
            let right = evaluate(right, root)?;
            Ok(compare(*op, &left, &right))
        }
        Node::Call(function, args) => {
            let args = args
                .iter()
                .map(|arg| evaluate(arg, root))
                .collect::<PolicyResult<Vec<_>>>()?;
            call(*function, &args)
        }
    }
}

pub(crate) fn lookup<'a>(root: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    segments.iter().try_fold(root, |current, segment| match segment {
        PathSegment::Field(name) => current.as_object().and_then(|obj| obj.get(name)),
        PathSegment::Index(index) => {
            let items = current.as_array()?;
            let idx = if *index < 0 {
                items.len().checked_sub(index.unsigned_abs() as usize)?
            } else {
                *index as usize
            };
            items.get(idx)
        }
    })
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Value {
    match op {
        CompareOp::Eq => Value::Bool(values_equal(left, right)),
        CompareOp::Ne => Value::Bool(!values_equal(left, right)),
        _ => match order(left, right) {
            Some(ordering) => Value::Bool(match op {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Ge => ordering != Ordering::Less,
                CompareOp::Eq | CompareOp::Ne => false,
            }),
            // Ordering between incomparable types yields null.
            None => Value::Null,
        },
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => left == right,
    }
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn call(function: Function, args: &[Value]) -> PolicyResult<Value> {
    match function {
        Function::Contains => match (&args[0], &args[1]) {
            (Value::Array(items), needle) => {
                Ok(Value::Bool(items.iter().any(|item| values_equal(item, needle))))
            }
            (Value::String(haystack), Value::String(needle)) => {
                Ok(Value::Bool(haystack.contains(needle.as_str())))
            }
            (Value::Null, _) => Ok(Value::Bool(false)),
            (subject, _) => Err(invalid(function, format!("cannot search in {}", kind(subject)))),
        },
        Function::StartsWith | Function::EndsWith => match (&args[0], &args[1]) {
            (Value::String(subject), Value::String(affix)) => Ok(Value::Bool(
                if function == Function::StartsWith {
                    subject.starts_with(affix.as_str())
                } else {
                    subject.ends_with(affix.as_str())
                },
            )),
            (Value::Null, _) => Ok(Value::Bool(false)),
            (subject, affix) => Err(invalid(
                function,
                format!("expected strings, got {} and {}", kind(subject), kind(affix)),
            )),
        },
        Function::Length => match &args[0] {
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::Array(a) => Ok(Value::from(a.len())),
            Value::Object(o) => Ok(Value::from(o.len())),
            other => Err(invalid(function, format!("no length for {}", kind(other)))),
        },
        Function::NotNull => Ok(args
            .iter()
            .find(|value| !value.is_null())
            .cloned()
            .unwrap_or(Value::Null)),
    }
}

fn invalid(function: Function, message: String) -> PolicyError {
    PolicyError::InvalidArgument {
        function: function.name().to_string(),
        message,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
