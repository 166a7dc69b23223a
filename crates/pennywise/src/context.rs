//! Evaluation context
//!
//! The [EvalContext] is the symbol table expressions are evaluated against. It is a tree of
//! [Value]s keyed by reference path, rebuilt from scratch after every pass:
//!
//! | block                          | reference              | projected value          |
//! |--------------------------------|------------------------|--------------------------|
//! | `resource "aws_instance" "web"`| `aws_instance.web`     | instance record          |
//! | `data "aws_ami" "ubuntu"`      | `data.aws_ami.ubuntu`  | instance record          |
//! | `variable "region"`            | `var.region`           | override or `default`    |
//! | `locals { env = "prod" }`      | `local.env`            | each attribute           |
//! | `output "ip"`                  | `output.ip`            | `value`                  |
//! | `module "vpc"`                 | `module.vpc`           | instance record          |
//! | `provider "aws"`               | `provider.aws`         | instance record          |
//! | `terraform`                    | `terraform`            | instance record          |
//!
//! Instances expanded with `for_each` sit one level deeper, under their key
//! (`aws_instance.web["a"]`). Instances expanded with `count` form a list (`aws_instance.web[0]`).
use crate::block::BlockKind;
use crate::functions::Functions;
use crate::resolver::{InstanceKey, Instances, ResolvedInstance};
use crate::value::{Record, Value};
use indexmap::IndexMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalContext {
    roots: Record,
}

impl EvalContext {
    /// Builds the context the next pass evaluates against
    ///
    /// `variables` are input overrides and win over a variable's `default`.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn build(instances: &Instances, variables: &IndexMap<String, Value>) -> Self {
        let mut context = EvalContext::default();

        for instance in instances.values() {
            let Some(value) = project(instance, variables) else {
                continue;
            };

            let mut path: Vec<String> = instance
                .kind
                .context_root()
                .map(String::from)
                .into_iter()
                .collect();
            path.extend(instance.labels.iter().cloned());

            match &instance.key {
                InstanceKey::Single => context.insert(&path, value),
                InstanceKey::Key(key) => {
                    path.push(key.clone());
                    context.insert(&path, value);
                }
                InstanceKey::Index(index) => context.insert_indexed(&path, *index, value),
            }
        }

        context
    }

    /// Looks up a value by reference path, e.g. `["var", "region"]`
    pub fn get(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        let mut current = self.roots.get(*first)?;
        for segment in rest {
            current = current.as_record()?.get(*segment)?;
        }
        Some(current)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Inserts `value` at `path`, merging records key-wise
    ///
    /// Intermediate segments become records. When both the existing and the new value are
    /// records their keys are merged, otherwise (and for colliding keys) the new value wins.
    pub fn insert(&mut self, path: &[String], value: Value) {
        let Some(slot) = self.slot(path) else {
            return;
        };

        match (slot, value) {
            (Value::Record(existing), Value::Record(new)) => {
                for (key, value) in new {
                    existing.insert(key, value);
                }
            }
            (slot, value) => *slot = value,
        }
    }

    /// Stores `value` at position `index` of the list at `path`
    fn insert_indexed(&mut self, path: &[String], index: usize, value: Value) {
        let Some(slot) = self.slot(path) else {
            return;
        };

        if !matches!(slot, Value::List(_)) {
            *slot = Value::List(vec![]);
        }

        if let Value::List(list) = slot {
            if list.len() <= index {
                list.resize(index + 1, Value::Absent);
            }
            list[index] = value;
        }
    }

    /// Walks to the value at `path`, creating records along the way
    fn slot(&mut self, path: &[String]) -> Option<&mut Value> {
        slot(&mut self.roots, path)
    }

    /// Turns the context into an evaluator context with the given function table
    pub fn to_hcl(&self, functions: &Functions) -> hcl::eval::Context<'static> {
        let mut ctx = hcl::eval::Context::new();

        for (name, func) in functions.iter() {
            ctx.declare_func(hcl::Identifier::unchecked(name), func.clone());
        }

        for (root, value) in &self.roots {
            if let Some(value) = value.to_hcl() {
                ctx.declare_var(hcl::Identifier::unchecked(root.as_str()), value);
            }
        }

        ctx
    }
}

fn slot<'a>(record: &'a mut Record, path: &[String]) -> Option<&'a mut Value> {
    let (first, rest) = path.split_first()?;
    let entry = record.entry(first.clone()).or_insert(Value::Absent);
    if rest.is_empty() {
        return Some(entry);
    }

    if !matches!(entry, Value::Record(_)) {
        *entry = Value::Record(Record::new());
    }

    match entry {
        Value::Record(nested) => slot(nested, rest),
        _ => None,
    }
}

/// The value an instance contributes to the context, `None` when it has nothing to offer
fn project(instance: &ResolvedInstance, variables: &IndexMap<String, Value>) -> Option<Value> {
    let value = match instance.kind {
        BlockKind::Variable => instance
            .labels
            .first()
            .and_then(|name| variables.get(name))
            .or_else(|| instance.attributes.get("default"))
            .cloned()?,
        BlockKind::Output => instance.attributes.get("value").cloned()?,
        BlockKind::Locals => Value::Record(
            instance
                .attributes
                .iter()
                .filter(|(name, _)| name.as_str() != "id")
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        ),
        BlockKind::Terraform
        | BlockKind::Provider
        | BlockKind::Module
        | BlockKind::Resource
        | BlockKind::Data => Value::Record(instance.attributes.clone()),
    };

    (!value.is_absent()).then_some(value)
}
