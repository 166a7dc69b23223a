//! Fixed-point resolution of a block model
//!
//! Blocks may reference each other in any order, so there is no single evaluation order to
//! follow. Instead every pass evaluates *all* blocks against the context built from the
//! previous pass:
//!
//! ```text
//! context_0 = {}
//! pass n:   instances_n = evaluate(blocks, context_{n-1})
//!           context_n   = build(instances_n)
//! stop when instances_n == instances_{n-1}      -> Converged
//!        or n == max_passes                     -> Exhausted
//! ```
//!
//! Each pass only ever reads the previous pass's context. A reference to a value that is not
//! known yet evaluates to [Value::Absent] and gets filled in by a later pass. Chains of
//! references therefore need one pass per link, plus one pass to confirm nothing changed.
use crate::block::{Block, BlockBody, BlockKind};
use crate::context::EvalContext;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::eval::{self, EvalError};
use crate::functions::Functions;
use crate::value::{Record, Value};
use indexmap::IndexMap;
use std::fmt::{Display, Formatter};

/// Passes after which resolution gives up on reaching a fixed point
pub const DEFAULT_MAX_PASSES: usize = 50;

/// Meta-arguments that control expansion and are not part of an instance's attributes
const FOR_EACH: &str = "for_each";
const COUNT: &str = "count";

/// All instances of one pass, keyed by address, in block order
pub type Instances = IndexMap<String, ResolvedInstance>;

/// How an instance was derived from its block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceKey {
    /// The block has no `for_each` or `count`
    Single,
    /// One key of a `for_each` collection
    Key(String),
    /// One index of a `count`
    Index(usize),
}

impl Display for InstanceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceKey::Single => Ok(()),
            InstanceKey::Key(key) => write!(f, "[{key:?}]"),
            InstanceKey::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Attributes of one block instance after a pass
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedInstance {
    /// Identity name plus instance key, e.g. `aws_instance.web["a"]`
    pub address: String,
    pub kind: BlockKind,
    pub labels: Vec<String>,
    pub key: InstanceKey,
    /// Attribute values, nested blocks and the synthetic `id`
    pub attributes: Record,
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub max_passes: usize,
    /// Input variable values, these win over a variable's `default`
    pub variables: IndexMap<String, Value>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
            variables: IndexMap::new(),
        }
    }
}

impl ResolveOptions {
    /// Sets an input variable from a `name=value` assignment, see [parse_variable]
    pub fn set_variable(&mut self, assignment: &str) -> Result<(), InvalidVariable> {
        let (name, value) = parse_variable(assignment)?;
        self.variables.insert(name, value);
        Ok(())
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("Variable must be given as NAME=VALUE, got {0:?}")]
pub struct InvalidVariable(pub String);

/// Parses a `name=value` variable assignment
///
/// The value is read as an expression, so `zones=["a", "b"]` is a list and `n=3` an integer.
/// A value that does not evaluate on its own (`region=eu-west-1`) is taken as a plain string.
pub fn parse_variable(assignment: &str) -> Result<(String, Value), InvalidVariable> {
    let Some((name, raw)) = assignment.split_once('=') else {
        return Err(InvalidVariable(assignment.to_string()));
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(InvalidVariable(assignment.to_string()));
    }

    let value = raw
        .parse::<hcl_edit::expr::Expression>()
        .ok()
        .and_then(|expr| {
            let ctx = hcl::eval::Context::new();
            eval::evaluate_expression(&expr.into(), &ctx).ok()
        })
        .unwrap_or_else(|| Value::from(raw));

    Ok((name.to_string(), value))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Two consecutive passes produced the same instances
    Converged,
    /// The pass limit was hit first, the result may still contain unresolved values
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub instances: Instances,
    /// Diagnostics of the final pass
    pub diagnostics: Diagnostics,
    pub passes: usize,
    pub outcome: Outcome,
}

impl Resolution {
    pub fn converged(&self) -> bool {
        self.outcome == Outcome::Converged
    }

    pub fn get(&self, address: &str) -> Option<&ResolvedInstance> {
        self.instances.get(address)
    }

    /// Instances of `resource` blocks, in block order
    pub fn resources(&self) -> impl Iterator<Item = &ResolvedInstance> {
        self.instances
            .values()
            .filter(|instance| instance.kind == BlockKind::Resource)
    }
}

#[derive(derive_new::new, Debug)]
pub struct Resolver<'f> {
    functions: &'f Functions,
    #[new(default)]
    options: ResolveOptions,
}

impl<'f> Resolver<'f> {
    pub fn with_options(functions: &'f Functions, options: ResolveOptions) -> Self {
        Self { functions, options }
    }

    /// Resolves `blocks` until a fixed point or the pass limit is reached
    #[tracing::instrument(level = "debug", skip_all, fields(blocks = blocks.len()))]
    pub fn resolve(&self, blocks: &[Block]) -> Resolution {
        let max_passes = self.options.max_passes.max(1);
        let mut context = EvalContext::default();
        let mut previous: Option<(Instances, Diagnostics)> = None;

        for pass in 1..=max_passes {
            let (instances, diagnostics) = self.run_pass(blocks, &context);
            tracing::debug!(
                pass,
                instances = instances.len(),
                diagnostics = diagnostics.count(),
                "pass finished"
            );

            if matches!(&previous, Some((last, _)) if *last == instances) {
                tracing::info!(passes = pass, "resolution converged");
                return Resolution {
                    instances,
                    diagnostics,
                    passes: pass,
                    outcome: Outcome::Converged,
                };
            }

            context = EvalContext::build(&instances, &self.options.variables);
            previous = Some((instances, diagnostics));
        }

        tracing::warn!(passes = max_passes, "resolution did not converge");
        let (instances, diagnostics) =
            previous.unwrap_or_else(|| (Instances::new(), Diagnostics::project()));
        Resolution {
            instances,
            diagnostics,
            passes: max_passes,
            outcome: Outcome::Exhausted,
        }
    }

    /// Evaluates every block once against `context`
    ///
    /// Nothing evaluated in this pass is visible to the rest of the pass.
    pub fn run_pass(&self, blocks: &[Block], context: &EvalContext) -> (Instances, Diagnostics) {
        let ambient = context.to_hcl(self.functions);
        let mut instances = Instances::new();
        let mut diagnostics = Diagnostics::project();

        for block in blocks {
            let identity = block.identity_name();
            let node = diagnostics.child(&identity, block.kind.as_str());

            for (key, ctx) in expand(block, &ambient, node) {
                let address = format!("{identity}{key}");
                let node = match key {
                    InstanceKey::Single => &mut *node,
                    _ => node.child(&address, "instance"),
                };

                let mut attributes = evaluate_body(&block.body, &ctx, node, true);
                attributes.insert("id".to_string(), Value::String(address.clone()));

                match instances.get_mut(&address) {
                    // unlabeled blocks such as `locals` share their address, later ones add to it
                    Some(existing) => existing.attributes.extend(attributes),
                    None => {
                        instances.insert(
                            address.clone(),
                            ResolvedInstance {
                                address,
                                kind: block.kind,
                                labels: block.labels.clone(),
                                key,
                                attributes,
                            },
                        );
                    }
                }
            }
        }

        (instances, diagnostics)
    }
}

/// Expands a block into its instances, each with its own evaluator context
///
/// The context of an expanded instance is a copy of the ambient one with `each` (or `count`)
/// bound, so no instance can observe another one's binding.
fn expand(
    block: &Block,
    ambient: &hcl::eval::Context<'static>,
    node: &mut Diagnostics,
) -> Vec<(InstanceKey, hcl::eval::Context<'static>)> {
    let for_each = block.body.attribute(FOR_EACH);
    let count = block.body.attribute(COUNT);

    let keys = match (for_each, count) {
        (None, None) => return vec![(InstanceKey::Single, ambient.clone())],
        (Some(_), Some(_)) => Err(ExpandError::ForEachAndCount),
        (Some(for_each), None) => evaluate(&for_each.expr, ambient)
            .and_then(for_each_entries)
            .map(|entries| {
                entries
                    .into_iter()
                    .map(|(key, value)| {
                        let mut each = hcl::value::Map::new();
                        each.insert("key".to_string(), hcl::Value::String(key.clone()));
                        each.insert("value".to_string(), value);
                        (InstanceKey::Key(key), ("each", each))
                    })
                    .collect::<Vec<_>>()
            }),
        (None, Some(count)) => evaluate(&count.expr, ambient)
            .and_then(count_value)
            .map(|count| {
                (0..count)
                    .map(|index| {
                        let mut binding = hcl::value::Map::new();
                        let index_value = hcl::Value::Number(hcl::Number::from(index as u64));
                        binding.insert("index".to_string(), index_value);
                        (InstanceKey::Index(index), ("count", binding))
                    })
                    .collect()
            }),
    };

    match keys {
        Ok(keys) => keys
            .into_iter()
            .map(|(key, (name, binding))| {
                let mut ctx = ambient.clone();
                ctx.declare_var(hcl::Identifier::unchecked(name), hcl::Value::Object(binding));
                (key, ctx)
            })
            .collect(),
        Err(error) => {
            // an expansion that is still unresolved when resolution ends drops the block
            node.record(DiagnosticKind::ForEachEvaluation, error.to_string());
            vec![]
        }
    }
}

fn evaluate(expr: &hcl::Expression, ctx: &hcl::eval::Context) -> Result<hcl::Value, ExpandError> {
    use hcl::eval::Evaluate;
    expr.evaluate(ctx)
        .map_err(|error| ExpandError::Evaluation(EvalError::from(error)))
}

#[derive(thiserror::Error, Debug)]
enum ExpandError {
    #[error("expansion cannot be evaluated: {0}")]
    Evaluation(EvalError),
    #[error("for_each and count cannot be used on the same block")]
    ForEachAndCount,
    #[error("for_each must be a map or a set of strings, got {0}")]
    ForEachKind(&'static str),
    #[error("count must be a non-negative whole number, got {0}")]
    CountKind(String),
}

/// Keys and `each.value`s of a `for_each` collection
///
/// Maps use their keys. Sets (lists) of strings use each string as key and value.
/// `null` means the collection is not known yet and yields no instances.
fn for_each_entries(collection: hcl::Value) -> Result<Vec<(String, hcl::Value)>, ExpandError> {
    match collection {
        hcl::Value::Null => Ok(vec![]),
        hcl::Value::Object(object) => Ok(object.into_iter().collect()),
        hcl::Value::Array(array) => {
            let mut entries: Vec<(String, hcl::Value)> = vec![];
            for element in array {
                let hcl::Value::String(key) = element else {
                    return Err(ExpandError::ForEachKind("a list with non-string elements"));
                };
                if !entries.iter().any(|(existing, _)| *existing == key) {
                    entries.push((key.clone(), hcl::Value::String(key)));
                }
            }
            Ok(entries)
        }
        hcl::Value::Bool(_) => Err(ExpandError::ForEachKind("a boolean")),
        hcl::Value::Number(_) => Err(ExpandError::ForEachKind("a number")),
        hcl::Value::String(_) => Err(ExpandError::ForEachKind("a string")),
    }
}

fn count_value(value: hcl::Value) -> Result<usize, ExpandError> {
    match &value {
        hcl::Value::Null => Ok(0),
        hcl::Value::Number(n) => n
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| ExpandError::CountKind(n.to_string())),
        other => Err(ExpandError::CountKind(format!("{other:?}"))),
    }
}

/// Evaluates attributes and nested blocks of a body
///
/// A nested block becomes a record under its type name. Repeated nested blocks of the same
/// type become a list of records.
fn evaluate_body(
    body: &BlockBody,
    ctx: &hcl::eval::Context,
    node: &mut Diagnostics,
    top_level: bool,
) -> Record {
    let mut attributes = Record::new();

    for attribute in &body.attributes {
        if top_level && (attribute.name == FOR_EACH || attribute.name == COUNT) {
            continue;
        }

        let value = match eval::evaluate_attribute(attribute, ctx) {
            Ok(value) => value,
            Err(error) => {
                let kind = if error.is_unresolved() {
                    DiagnosticKind::UnresolvedReference
                } else {
                    DiagnosticKind::AttributeEvaluation
                };
                node.child(&attribute.name, "attribute")
                    .record(kind, error.to_string());
                Value::Absent
            }
        };

        attributes.insert(attribute.name.clone(), value);
    }

    for nested in &body.blocks {
        let nested_node = node.child(&nested.ident, "block");
        let value = Value::Record(evaluate_body(&nested.body, ctx, nested_node, false));

        match attributes.get_mut(&nested.ident) {
            Some(Value::List(list)) => list.push(value),
            Some(existing @ Value::Record(_)) => {
                let first = std::mem::replace(existing, Value::Absent);
                *existing = Value::List(vec![first, value]);
            }
            _ => {
                attributes.insert(nested.ident.clone(), value);
            }
        }
    }

    attributes
}
