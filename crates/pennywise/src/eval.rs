//! Attribute evaluation
//!
//! An attribute's expression is evaluated with [hcl::eval] against the context of the
//! current pass and then decoded into a [Value].
//!
//! Decoding rules:
//! - strings, booleans and integral numbers decode directly
//! - `null` decodes to [Value::Absent]
//! - objects decode field by field into a [Value::Record]
//! - lists take the kind of their first element and coerce every other element to it.
//!   A first element that is not a string, integer or boolean makes the whole list absent.
//!
//! References the context cannot satisfy yet are not failures: they are reported as
//! [EvalError::Unresolved] and the caller treats the attribute as absent for this pass.
use crate::block::Attribute;
use crate::value::{Record, Value};
use hcl::eval::{ErrorKind, Evaluate};

#[derive(thiserror::Error, Debug)]
pub enum EvalError {
    #[error(transparent)]
    Unresolved(hcl::eval::Error),
    #[error(transparent)]
    Expression(hcl::eval::Error),
    #[error("unsupported value kind: {0}")]
    UnsupportedKind(String),
    #[error("list element {index} cannot be decoded as {expected}")]
    ListElement { index: usize, expected: &'static str },
}

impl EvalError {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, EvalError::Unresolved(_))
    }
}

impl From<hcl::eval::Error> for EvalError {
    fn from(error: hcl::eval::Error) -> Self {
        match error.kind() {
            ErrorKind::UndefinedVar(_) | ErrorKind::NoSuchKey(_) => EvalError::Unresolved(error),
            _ => EvalError::Expression(error),
        }
    }
}

/// Evaluates an attribute against `ctx`
#[tracing::instrument(level = "trace", skip_all, fields(attribute = %attribute.name))]
pub fn evaluate_attribute(
    attribute: &Attribute,
    ctx: &hcl::eval::Context,
) -> Result<Value, EvalError> {
    evaluate_expression(&attribute.expr, ctx)
}

pub fn evaluate_expression(
    expr: &hcl::Expression,
    ctx: &hcl::eval::Context,
) -> Result<Value, EvalError> {
    let value = expr.evaluate(ctx)?;
    decode(value)
}

/// Decodes an evaluated value
pub fn decode(value: hcl::Value) -> Result<Value, EvalError> {
    match value {
        hcl::Value::Null => Ok(Value::Absent),
        hcl::Value::Bool(b) => Ok(Value::Boolean(b)),
        hcl::Value::String(s) => Ok(Value::String(s)),
        hcl::Value::Number(n) => integer(&n)
            .map(Value::Integer)
            .ok_or_else(|| EvalError::UnsupportedKind(format!("fractional number {n}"))),
        hcl::Value::Array(elements) => decode_list(elements),
        hcl::Value::Object(object) => object
            .into_iter()
            .map(|(key, value)| decode(value).map(|value| (key, value)))
            .collect::<Result<Record, _>>()
            .map(Value::Record),
    }
}

fn integer(n: &hcl::Number) -> Option<i64> {
    if let Some(int) = n.as_i64() {
        return Some(int);
    }

    n.as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
        .map(|f| f as i64)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ElementKind {
    String,
    Integer,
    Boolean,
}

impl ElementKind {
    fn of(value: &hcl::Value) -> Option<Self> {
        match value {
            hcl::Value::String(_) => Some(ElementKind::String),
            hcl::Value::Number(n) if integer(n).is_some() => Some(ElementKind::Integer),
            hcl::Value::Bool(_) => Some(ElementKind::Boolean),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ElementKind::String => "string",
            ElementKind::Integer => "integer",
            ElementKind::Boolean => "boolean",
        }
    }

    /// Converts an element to this kind, following the usual primitive conversions
    fn coerce(&self, value: &hcl::Value) -> Option<Value> {
        match (self, value) {
            (ElementKind::String, hcl::Value::String(s)) => Some(Value::String(s.clone())),
            (ElementKind::String, hcl::Value::Number(n)) => Some(Value::String(n.to_string())),
            (ElementKind::String, hcl::Value::Bool(b)) => Some(Value::String(b.to_string())),
            (ElementKind::Integer, hcl::Value::Number(n)) => integer(n).map(Value::Integer),
            (ElementKind::Integer, hcl::Value::String(s)) => s.parse().ok().map(Value::Integer),
            (ElementKind::Boolean, hcl::Value::Bool(b)) => Some(Value::Boolean(*b)),
            (ElementKind::Boolean, hcl::Value::String(s)) => match s.as_str() {
                "true" => Some(Value::Boolean(true)),
                "false" => Some(Value::Boolean(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

fn decode_list(elements: Vec<hcl::Value>) -> Result<Value, EvalError> {
    let Some(first) = elements.first() else {
        return Ok(Value::List(vec![]));
    };

    let Some(kind) = ElementKind::of(first) else {
        tracing::trace!(?first, "list of unsupported element kind");
        return Ok(Value::Absent);
    };

    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            kind.coerce(element).ok_or(EvalError::ListElement {
                index,
                expected: kind.name(),
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn expression(expr: &str) -> hcl::Expression {
        let expr: hcl_edit::expr::Expression = expr.parse().expect("valid expression");
        expr.into()
    }

    fn eval(expr: &str) -> Result<Value, EvalError> {
        let mut ctx = hcl::eval::Context::new();
        let mut var = hcl::value::Map::new();
        var.insert("region".to_string(), hcl::Value::from("us-east-1"));
        ctx.declare_var(hcl::Identifier::unchecked("var"), hcl::Value::Object(var));
        evaluate_expression(&expression(expr), &ctx)
    }

    #[test]
    fn scalars() {
        assert_eq!(eval(r#""text""#).unwrap(), Value::from("text"));
        assert_eq!(eval("42").unwrap(), Value::from(42i64));
        assert_eq!(eval("true").unwrap(), Value::from(true));
        assert_eq!(eval("null").unwrap(), Value::Absent);
        assert_eq!(eval("var.region").unwrap(), Value::from("us-east-1"));
        assert_eq!(eval(r#""${var.region}-a""#).unwrap(), Value::from("us-east-1-a"));
    }

    #[test]
    fn fractional_numbers_are_unsupported() {
        assert!(matches!(eval("1.5"), Err(EvalError::UnsupportedKind(_))));
        assert_eq!(eval("2.0").unwrap(), Value::from(2i64));
    }

    #[test]
    fn string_lists_keep_length_and_order() {
        assert_eq!(
            eval(r#"["c", "a", "b"]"#).unwrap(),
            Value::from(vec!["c", "a", "b"])
        );
        assert_eq!(eval("[]").unwrap(), Value::List(vec![]));
    }

    #[test]
    fn list_elements_follow_the_first_kind() {
        assert_eq!(
            eval(r#"["a", 1, true]"#).unwrap(),
            Value::from(vec!["a", "1", "true"])
        );
        assert_eq!(eval(r#"[1, "2"]"#).unwrap(), Value::from(vec![1i64, 2]));
        assert!(matches!(
            eval(r#"[1, "two"]"#),
            Err(EvalError::ListElement {
                index: 1,
                expected: "integer"
            })
        ));
    }

    #[test]
    fn list_of_unsupported_first_kind_is_absent() {
        assert_eq!(eval(r#"[{ a = 1 }, "b"]"#).unwrap(), Value::Absent);
        assert_eq!(eval(r#"[["nested"]]"#).unwrap(), Value::Absent);
    }

    #[test]
    fn objects_decode_to_records() {
        let value = eval(r#"{ name = "web", size = 2, tags = ["a"] }"#).unwrap();
        let expected: Record = [
            ("name".to_string(), Value::from("web")),
            ("size".to_string(), Value::from(2i64)),
            ("tags".to_string(), Value::from(vec!["a"])),
        ]
        .into_iter()
        .collect();
        assert_eq!(value, Value::Record(expected));
    }

    #[test]
    fn missing_references_are_unresolved() {
        assert!(eval("local.missing").unwrap_err().is_unresolved());
        assert!(eval("var.missing").unwrap_err().is_unresolved());
        assert!(eval(r#""${aws_vpc.main.id}-x""#).unwrap_err().is_unresolved());
    }

    #[test]
    fn error_kinds_are_classified() {
        let missing_key = hcl::eval::Error::from(ErrorKind::NoSuchKey("n".to_string()));
        assert!(EvalError::from(missing_key).is_unresolved());

        let message = hcl::eval::Error::from(ErrorKind::Message("boom".to_string()));
        assert!(matches!(EvalError::from(message), EvalError::Expression(_)));
    }

    #[test]
    fn unresolved_message_names_the_reference_once() {
        let message = eval("local.missing").unwrap_err().to_string();
        assert!(!message.starts_with("unresolved reference"), "{message}");
        assert!(message.contains("local"), "{message}");
    }

    #[test]
    fn operator_errors_are_not_unresolved() {
        let err = eval("true + 1").unwrap_err();
        assert!(matches!(err, EvalError::Expression(_)));
    }
}
