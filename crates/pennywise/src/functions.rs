//! Function table available to expressions
//!
//! The engine does not define the expression language's functions. Callers hand a
//! [Functions] table to the resolver; [Functions::builtin] is a small default set of
//! string, collection and numeric helpers.
use hcl::eval::{FuncArgs, FuncDef, ParamType};
use hcl::Value;
use indexmap::IndexMap;

#[derive(Debug, Clone, Default)]
pub struct Functions {
    funcs: IndexMap<String, FuncDef>,
}

impl Functions {
    /// A table without any function
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut functions = Self::empty();

        // strings
        functions.insert("lower", lower());
        functions.insert("upper", upper());
        functions.insert("join", join());
        functions.insert("split", split());
        functions.insert("tostring", tostring());

        // collections
        functions.insert("length", length());
        functions.insert("lookup", lookup());
        functions.insert("concat", concat());
        functions.insert("coalesce", coalesce());
        functions.insert("merge", merge());
        functions.insert("keys", keys());
        functions.insert("values", values());
        functions.insert("contains", contains());
        functions.insert("element", element());
        functions.insert("toset", toset());
        functions.insert("tolist", tolist());

        // numbers
        functions.insert("max", max());
        functions.insert("min", min());

        functions
    }

    /// Adds or replaces a function
    pub fn insert(&mut self, name: impl Into<String>, func: FuncDef) {
        self.funcs.insert(name.into(), func);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FuncDef)> {
        self.funcs.iter().map(|(name, func)| (name.as_str(), func))
    }
}

fn str_arg(args: &FuncArgs, index: usize) -> Result<&str, String> {
    args[index]
        .as_str()
        .ok_or_else(|| format!("argument {index} must be a string"))
}

fn array_arg(args: &FuncArgs, index: usize) -> Result<&Vec<Value>, String> {
    args[index]
        .as_array()
        .ok_or_else(|| format!("argument {index} must be a list"))
}

fn number(n: usize) -> Value {
    Value::Number(hcl::Number::from(i64::try_from(n).unwrap_or(i64::MAX)))
}

fn lower() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.to_lowercase())))
}

fn upper() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .build(|args: FuncArgs| Ok(Value::from(str_arg(&args, 0)?.to_uppercase())))
}

fn join() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::array_of(ParamType::String))
        .build(|args: FuncArgs| {
            let separator = str_arg(&args, 0)?;
            let parts: Vec<&str> = array_arg(&args, 1)?
                .iter()
                .filter_map(Value::as_str)
                .collect();
            Ok(Value::from(parts.join(separator)))
        })
}

fn split() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::String)
        .param(ParamType::String)
        .build(|args: FuncArgs| {
            let separator = str_arg(&args, 0)?;
            let parts = str_arg(&args, 1)?
                .split(separator)
                .map(Value::from)
                .collect();
            Ok(Value::Array(parts))
        })
}

fn tostring() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| match &args[0] {
            Value::String(s) => Ok(Value::from(s.as_str())),
            Value::Number(n) => Ok(Value::from(n.to_string())),
            Value::Bool(b) => Ok(Value::from(b.to_string())),
            Value::Null => Ok(Value::Null),
            other => Err(format!("cannot convert {other:?} to string")),
        })
}

fn length() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::Any)
        .build(|args: FuncArgs| match &args[0] {
            Value::String(s) => Ok(number(s.chars().count())),
            Value::Array(array) => Ok(number(array.len())),
            Value::Object(object) => Ok(number(object.len())),
            other => Err(format!("cannot take length of {other:?}")),
        })
}

fn lookup() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::object_of(ParamType::Any))
        .param(ParamType::String)
        .param(ParamType::Any)
        .build(|args: FuncArgs| {
            let key = str_arg(&args, 1)?;
            let found = args[0].as_object().and_then(|object| object.get(key));
            Ok(found.cloned().unwrap_or_else(|| args[2].clone()))
        })
}

fn concat() -> FuncDef {
    FuncDef::builder()
        .variadic_param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let mut result = vec![];
            for arg in args.iter() {
                if let Some(array) = arg.as_array() {
                    result.extend(array.iter().cloned());
                }
            }
            Ok(Value::Array(result))
        })
}

fn coalesce() -> FuncDef {
    FuncDef::builder()
        .variadic_param(ParamType::Any)
        .build(|args: FuncArgs| {
            args.iter()
                .find(|value| !matches!(value, Value::Null) && value.as_str() != Some(""))
                .cloned()
                .ok_or_else(|| "no non-null, non-empty argument".to_string())
        })
}

fn merge() -> FuncDef {
    FuncDef::builder()
        .variadic_param(ParamType::object_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let mut result = hcl::value::Map::new();
            for arg in args.iter() {
                if let Some(object) = arg.as_object() {
                    for (key, value) in object {
                        result.insert(key.clone(), value.clone());
                    }
                }
            }
            Ok(Value::Object(result))
        })
}

fn keys() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::object_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let keys = args[0]
                .as_object()
                .map(|object| object.keys().map(|key| Value::from(key.as_str())).collect())
                .unwrap_or_default();
            Ok(Value::Array(keys))
        })
}

fn values() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::object_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let values = args[0]
                .as_object()
                .map(|object| object.values().cloned().collect())
                .unwrap_or_default();
            Ok(Value::Array(values))
        })
}

fn contains() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .param(ParamType::Any)
        .build(|args: FuncArgs| Ok(Value::Bool(array_arg(&args, 0)?.contains(&args[1]))))
}

fn element() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .param(ParamType::Number)
        .build(|args: FuncArgs| {
            let array = array_arg(&args, 0)?;
            if array.is_empty() {
                return Err("cannot use element function with an empty list".to_string());
            }
            let index = args[1]
                .as_u64()
                .ok_or_else(|| "index must be a non-negative integer".to_string())?;
            let index = usize::try_from(index).map_err(|e| e.to_string())? % array.len();
            Ok(array[index].clone())
        })
}

fn toset() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| {
            let mut result: Vec<Value> = vec![];
            for value in array_arg(&args, 0)? {
                if !result.contains(value) {
                    result.push(value.clone());
                }
            }
            Ok(Value::Array(result))
        })
}

fn tolist() -> FuncDef {
    FuncDef::builder()
        .param(ParamType::array_of(ParamType::Any))
        .build(|args: FuncArgs| Ok(Value::Array(array_arg(&args, 0)?.clone())))
}

fn max() -> FuncDef {
    FuncDef::builder()
        .variadic_param(ParamType::Number)
        .build(|args: FuncArgs| extremum(&args, |candidate, best| candidate > best))
}

fn min() -> FuncDef {
    FuncDef::builder()
        .variadic_param(ParamType::Number)
        .build(|args: FuncArgs| extremum(&args, |candidate, best| candidate < best))
}

fn extremum(args: &FuncArgs, better: fn(f64, f64) -> bool) -> Result<Value, String> {
    let mut best: Option<(f64, &Value)> = None;
    for arg in args.iter() {
        let Some(candidate) = arg.as_f64() else {
            return Err("arguments must be numbers".to_string());
        };
        match best {
            Some((current, _)) if !better(candidate, current) => {}
            _ => best = Some((candidate, arg)),
        }
    }

    best.map(|(_, value)| value.clone())
        .ok_or_else(|| "at least one argument is required".to_string())
}

#[cfg(test)]
mod test {
    use super::*;
    use hcl::eval::{Context, Evaluate};
    use pretty_assertions::assert_eq;

    fn eval(expr: &str) -> Value {
        let mut ctx = Context::new();
        for (name, func) in Functions::builtin().iter() {
            ctx.declare_func(hcl::Identifier::unchecked(name), func.clone());
        }

        let expr: hcl_edit::expr::Expression = expr.parse().expect("valid expression");
        hcl::Expression::from(expr)
            .evaluate(&ctx)
            .expect("evaluates")
    }

    #[test]
    fn strings() {
        assert_eq!(eval(r#"upper("eu")"#), Value::from("EU"));
        assert_eq!(eval(r#"join("-", ["a", "b"])"#), Value::from("a-b"));
        assert_eq!(
            eval(r#"split(",", "a,b")"#),
            Value::Array(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(eval("tostring(42)"), Value::from("42"));
    }

    #[test]
    fn collections() {
        assert_eq!(eval(r#"length(["a", "b", "c"])"#), number(3));
        assert_eq!(eval(r#"lookup({ a = "x" }, "a", "y")"#), Value::from("x"));
        assert_eq!(eval(r#"lookup({ a = "x" }, "b", "y")"#), Value::from("y"));
        assert_eq!(
            eval(r#"toset(["a", "b", "a"])"#),
            Value::Array(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(eval(r#"coalesce("", "x")"#), Value::from("x"));
        assert_eq!(eval(r#"contains(["a"], "a")"#), Value::Bool(true));
        assert_eq!(eval(r#"element(["a", "b"], 3)"#), Value::from("b"));
    }

    #[test]
    fn numbers() {
        assert_eq!(eval("max(1, 5, 3)"), number(5));
        assert_eq!(eval("min(4, 2, 3)"), number(2));
    }
}
