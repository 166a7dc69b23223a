//! Uniform block model built from parsed files
//!
//! Both syntaxes end up in the same owned tree: a [Block] has a [BlockKind], its labels and
//! a [BlockBody] holding attributes (unevaluated expressions) and nested blocks.
//! The model is built once per project and never changes during resolution.
use crate::config_files::{ConfigFiles, Source, Syntax};
use std::fmt::{Display, Formatter};

/// Recognized top-level block categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Terraform,
    Provider,
    Variable,
    Locals,
    Output,
    Module,
    Resource,
    Data,
}

impl BlockKind {
    pub fn parse(ident: &str) -> Option<Self> {
        let kind = match ident {
            "terraform" => BlockKind::Terraform,
            "provider" => BlockKind::Provider,
            "variable" => BlockKind::Variable,
            "locals" => BlockKind::Locals,
            "output" => BlockKind::Output,
            "module" => BlockKind::Module,
            "resource" => BlockKind::Resource,
            "data" => BlockKind::Data,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Terraform => "terraform",
            BlockKind::Provider => "provider",
            BlockKind::Variable => "variable",
            BlockKind::Locals => "locals",
            BlockKind::Output => "output",
            BlockKind::Module => "module",
            BlockKind::Resource => "resource",
            BlockKind::Data => "data",
        }
    }

    /// Number of labels a block of this kind must carry
    pub fn label_count(&self) -> usize {
        match self {
            BlockKind::Terraform | BlockKind::Locals => 0,
            BlockKind::Provider | BlockKind::Variable | BlockKind::Output | BlockKind::Module => 1,
            BlockKind::Resource | BlockKind::Data => 2,
        }
    }

    /// Key that groups blocks of this kind in the evaluation context
    ///
    /// Resources have none: `aws_instance.web` is referenced without a prefix.
    pub fn context_root(&self) -> Option<&'static str> {
        match self {
            BlockKind::Terraform => Some("terraform"),
            BlockKind::Provider => Some("provider"),
            BlockKind::Variable => Some("var"),
            BlockKind::Locals => Some("local"),
            BlockKind::Output => Some("output"),
            BlockKind::Module => Some("module"),
            BlockKind::Resource => None,
            BlockKind::Data => Some("data"),
        }
    }
}

impl Display for BlockKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub expr: hcl::Expression,
}

#[derive(Debug, Clone, Default)]
pub struct BlockBody {
    pub attributes: Vec<Attribute>,
    pub blocks: Vec<NestedBlock>,
}

impl BlockBody {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attribute| attribute.name == name)
    }

    fn from_hcl(body: hcl::Body) -> Self {
        let mut result = BlockBody::default();
        for structure in body.into_iter() {
            match structure {
                hcl::Structure::Attribute(attribute) => result.attributes.push(Attribute {
                    name: attribute.key.to_string(),
                    expr: attribute.expr,
                }),
                hcl::Structure::Block(block) => result.blocks.push(NestedBlock {
                    ident: block.identifier.to_string(),
                    labels: block.labels.iter().map(|l| l.as_str().to_string()).collect(),
                    body: BlockBody::from_hcl(block.body),
                }),
            }
        }
        result
    }

    /// JSON bodies have no way to tell nested blocks from object attributes without a
    /// provider schema, so every key becomes an attribute.
    fn from_json(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        BlockBody {
            attributes: object
                .iter()
                .map(|(key, value)| Attribute {
                    name: key.clone(),
                    expr: json_expression(value),
                })
                .collect(),
            blocks: vec![],
        }
    }
}

/// A block below a top-level block, such as `root_block_device { ... }`
#[derive(Debug, Clone)]
pub struct NestedBlock {
    pub ident: String,
    pub labels: Vec<String>,
    pub body: BlockBody,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub kind: BlockKind,
    pub labels: Vec<String>,
    pub body: BlockBody,
    pub source: Source,
}

impl Block {
    /// Name other blocks use to refer to this one
    ///
    /// `resource "aws_instance" "web"` is `aws_instance.web`, `variable "region"` is
    /// `variable.region` and `locals` is just `locals`.
    pub fn identity_name(&self) -> String {
        if self.kind == BlockKind::Resource {
            return self.labels.join(".");
        }

        std::iter::once(self.kind.as_str())
            .chain(self.labels.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Builds the block model of all files
///
/// Unknown block types and top-level attributes are dropped. Blocks of a recognized kind
/// with the wrong shape are collected as [Issue]s and fail the whole build.
#[tracing::instrument(level = "debug", skip_all)]
pub fn build_blocks(files: &ConfigFiles) -> Result<Vec<Block>, SchemaError> {
    let mut blocks = vec![];
    let mut e = SchemaError::new();

    for file in files.files() {
        match &file.syntax {
            Syntax::Native(body) => native_blocks(body, &file.source, &mut blocks, &mut e),
            Syntax::Json(value) => json_blocks(value, &file.source, &mut blocks, &mut e),
        }
    }

    if !e.issues.is_empty() {
        return Err(e);
    }

    tracing::debug!(count = blocks.len(), "block model built");
    Ok(blocks)
}

fn native_blocks(body: &hcl::Body, source: &Source, blocks: &mut Vec<Block>, e: &mut SchemaError) {
    for structure in body.iter() {
        let block = match structure {
            hcl::Structure::Block(block) => block,
            hcl::Structure::Attribute(attribute) => {
                tracing::debug!(key = %attribute.key, "dropping top-level attribute");
                continue;
            }
        };

        let Some(kind) = BlockKind::parse(block.identifier.as_str()) else {
            tracing::debug!(ident = %block.identifier, "dropping unknown block type");
            continue;
        };

        if block.labels.len() != kind.label_count() {
            e.log(Issue::LabelCount {
                source: source.clone(),
                kind,
                expected: kind.label_count(),
                found: block.labels.len(),
            });
            continue;
        }

        blocks.push(Block {
            kind,
            labels: block.labels.iter().map(|l| l.as_str().to_string()).collect(),
            body: BlockBody::from_hcl(block.body.clone()),
            source: source.clone(),
        });
    }
}

fn json_blocks(
    value: &serde_json::Value,
    source: &Source,
    blocks: &mut Vec<Block>,
    e: &mut SchemaError,
) {
    let Some(root) = value.as_object() else {
        e.log(Issue::JsonRootNotObject(source.clone()));
        return;
    };

    for (ident, content) in root {
        let Some(kind) = BlockKind::parse(ident) else {
            tracing::debug!(%ident, "dropping unknown block type");
            continue;
        };

        json_labelled(kind, content, &mut vec![], source, blocks, e);
    }
}

/// Descends one object level per label until the block body is reached
///
/// An array at any level stands for several blocks sharing the labels collected so far.
fn json_labelled(
    kind: BlockKind,
    content: &serde_json::Value,
    labels: &mut Vec<String>,
    source: &Source,
    blocks: &mut Vec<Block>,
    e: &mut SchemaError,
) {
    match content {
        serde_json::Value::Array(items) => {
            for item in items {
                json_labelled(kind, item, labels, source, blocks, e);
            }
        }
        serde_json::Value::Object(object) if labels.len() == kind.label_count() => {
            blocks.push(Block {
                kind,
                labels: labels.clone(),
                body: BlockBody::from_json(object),
                source: source.clone(),
            });
        }
        serde_json::Value::Object(object) => {
            for (label, nested) in object {
                labels.push(label.clone());
                json_labelled(kind, nested, labels, source, blocks, e);
                labels.pop();
            }
        }
        _ => e.log(Issue::JsonShape {
            source: source.clone(),
            kind,
            labels: labels.clone(),
        }),
    }
}

/// Converts a JSON value into an expression
///
/// Strings may carry template sequences. A string that is a single interpolation such as
/// `"${var.names}"` evaluates to the raw value, like in native syntax.
fn json_expression(value: &serde_json::Value) -> hcl::Expression {
    match value {
        serde_json::Value::Null => hcl::Expression::Null,
        serde_json::Value::Bool(b) => hcl::Expression::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                hcl::Expression::Number(hcl::Number::from(int))
            } else {
                n.as_f64()
                    .and_then(hcl::Number::from_f64)
                    .map_or(hcl::Expression::Null, hcl::Expression::Number)
            }
        }
        serde_json::Value::String(s) => json_string_expression(s),
        serde_json::Value::Array(items) => {
            hcl::Expression::Array(items.iter().map(json_expression).collect())
        }
        serde_json::Value::Object(object) => hcl::Expression::Object(
            object
                .iter()
                .map(|(key, value)| {
                    (
                        hcl::ObjectKey::Expression(hcl::Expression::String(key.clone())),
                        json_expression(value),
                    )
                })
                .collect(),
        ),
    }
}

fn json_string_expression(s: &str) -> hcl::Expression {
    if !s.contains("${") && !s.contains("%{") {
        return hcl::Expression::String(s.to_string());
    }

    let single_interpolation = s
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .filter(|inner| !inner.contains("${"));

    if let Some(inner) = single_interpolation {
        if let Ok(expr) = inner.trim().parse::<hcl_edit::expr::Expression>() {
            return expr.into();
        }
    }

    hcl::Expression::TemplateExpr(Box::new(hcl::TemplateExpr::QuotedString(s.to_string())))
}

#[derive(derive_new::new, Debug)]
pub struct SchemaError {
    #[new(default)]
    issues: Vec<Issue>,
}

impl SchemaError {
    pub fn log(&mut self, issue: Issue) {
        tracing::trace!(?issue, "issue found");
        self.issues.push(issue);
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }
}

impl std::error::Error for SchemaError {}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut issues = self.issues.iter();
        if let Some(first) = issues.next() {
            write!(f, "{first}")?;
        }
        for issue in issues {
            write!(f, "\n{issue}")?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
pub enum Issue {
    LabelCount {
        source: Source,
        kind: BlockKind,
        expected: usize,
        found: usize,
    },
    JsonRootNotObject(Source),
    JsonShape {
        source: Source,
        kind: BlockKind,
        labels: Vec<String>,
    },
}

impl Display for Issue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let location = |source: &Source| {
            source
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<input>".to_string())
        };

        match self {
            Issue::LabelCount {
                source,
                kind,
                expected,
                found,
            } => write!(
                f,
                "{}: {kind} block expects {expected} label(s), found {found}",
                location(source)
            ),
            Issue::JsonRootNotObject(source) => {
                write!(f, "{}: top-level value must be an object", location(source))
            }
            Issue::JsonShape {
                source,
                kind,
                labels,
            } => write!(
                f,
                "{}: {kind} block {labels:?} must be an object nested {} level(s) deep",
                location(source),
                kind.label_count()
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config_files;
    use pretty_assertions::assert_eq;

    fn schema_error_for(files: ConfigFiles) -> SchemaError {
        build_blocks(&files).expect_err("must error")
    }

    fn json_files(json: &str) -> ConfigFiles {
        let mut files = ConfigFiles::default();
        files.insert(
            Syntax::Json(serde_json::from_str(json).expect("valid json")),
            Some(std::path::PathBuf::from("main.tf.json")),
        );
        files
    }

    #[test]
    fn identity_names() {
        let blocks = build_blocks(&config_files! {r#"
        terraform {}
        variable "region" {}
        locals {}
        resource "aws_instance" "web" {}
        data "aws_ami" "ubuntu" {}
        "#})
        .unwrap();

        let names: Vec<_> = blocks.iter().map(Block::identity_name).collect();
        assert_eq!(
            names,
            vec![
                "terraform",
                "variable.region",
                "locals",
                "aws_instance.web",
                "data.aws_ami.ubuntu"
            ]
        );
    }

    #[test]
    fn unknown_blocks_and_root_attributes_are_dropped() {
        let blocks = build_blocks(&config_files! {r#"
        root_attr = 1
        moved {}
        check "health" {}
        output "ip" { value = 1 }
        "#})
        .unwrap();

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Output);
    }

    #[test]
    fn nested_blocks_stay_attached() {
        let blocks = build_blocks(&config_files! {r#"
        resource "aws_instance" "web" {
          ami = "ami-123"
          root_block_device {
            volume_size = 10
            ebs { iops = 3000 }
          }
        }
        "#})
        .unwrap();

        assert_eq!(blocks.len(), 1);
        let body = &blocks[0].body;
        assert_eq!(body.attributes.len(), 1);
        assert_eq!(body.blocks.len(), 1);
        assert_eq!(body.blocks[0].ident, "root_block_device");
        assert_eq!(body.blocks[0].body.blocks[0].ident, "ebs");
    }

    #[test]
    fn label_count_mismatch() {
        let errors = schema_error_for(config_files! {r#"
        resource "aws_instance" {}
        variable {}
        locals "named" {}
        "#});

        assert_eq!(
            errors.issues(),
            &[
                Issue::LabelCount {
                    source: None,
                    kind: BlockKind::Resource,
                    expected: 2,
                    found: 1
                },
                Issue::LabelCount {
                    source: None,
                    kind: BlockKind::Variable,
                    expected: 1,
                    found: 0
                },
                Issue::LabelCount {
                    source: None,
                    kind: BlockKind::Locals,
                    expected: 0,
                    found: 1
                },
            ]
        );
    }

    #[test]
    fn json_blocks_nest_by_label() {
        let blocks = build_blocks(&json_files(
            r#"{
              "variable": { "region": { "default": "us-east-1" } },
              "resource": {
                "aws_instance": {
                  "web": { "instance_type": "t3.micro", "region": "${var.region}" },
                  "db": [{ "instance_type": "t3.large" }]
                }
              },
              "locals": { "env": "prod" },
              "unknown": { "ignored": true }
            }"#,
        ))
        .unwrap();

        let names: Vec<_> = blocks.iter().map(Block::identity_name).collect();
        assert_eq!(
            names,
            vec!["variable.region", "aws_instance.web", "aws_instance.db", "locals"]
        );

        let region = blocks[1].body.attribute("region").unwrap();
        assert!(matches!(region.expr, hcl::Expression::Traversal(_)));
    }

    #[test]
    fn json_shape_mismatch() {
        let errors = schema_error_for(json_files(r#"{ "resource": { "aws_instance": "web" } }"#));
        assert_eq!(
            errors.issues(),
            &[Issue::JsonShape {
                source: Some("main.tf.json".into()),
                kind: BlockKind::Resource,
                labels: vec!["aws_instance".to_string()],
            }]
        );

        let errors = schema_error_for(json_files("[]"));
        assert_eq!(
            errors.issues(),
            &[Issue::JsonRootNotObject(Some("main.tf.json".into()))]
        );
    }
}
