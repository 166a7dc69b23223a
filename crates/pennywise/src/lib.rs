//! # pennywise - configuration resolution engine
//!
//! Turns a directory of Terraform-style configuration into fully resolved resource instances.
//!
//! ## Introduction for developers
//!
//! Read this to understand how `pennywise` works internally.
//!
//! ### Loading files
//!
//! A directory is walked recursively ([config_files::ConfigFiles::load_directory]). Every
//! `*.tf` file is parsed as native syntax, every `*.tf.json` file as JSON. Hidden directories
//! (`.terraform`, `.git`, ...) are skipped. At this point the files only have to be
//! syntactically valid.
//!
//! ### Building the block model
//!
//! see [block::build_blocks]
//!
//! Top-level blocks of a known kind become [block::Block]s:
//!
//! | kind        | labels | identity name          | referenced as          |
//! |-------------|--------|------------------------|------------------------|
//! | `terraform` | 0      | `terraform`            | `terraform`            |
//! | `provider`  | 1      | `provider.aws`         | `provider.aws`         |
//! | `variable`  | 1      | `variable.region`      | `var.region`           |
//! | `locals`    | 0      | `locals`               | `local.<name>`         |
//! | `output`    | 1      | `output.ip`            | `output.ip`            |
//! | `module`    | 1      | `module.vpc`           | `module.vpc`           |
//! | `resource`  | 2      | `aws_instance.web`     | `aws_instance.web`     |
//! | `data`      | 2      | `data.aws_ami.ubuntu`  | `data.aws_ami.ubuntu`  |
//!
//! Anything else at the top level is dropped. A known block with the wrong number of labels
//! fails the build.
//!
//! ### Resolving
//!
//! see [resolver::Resolver::resolve]
//!
//! Blocks reference each other freely and in any file order. Rather than sorting them by
//! dependency the resolver evaluates every block again and again, each pass against the
//! [context::EvalContext] built from the pass before, until two passes agree.
//!
//! ```hcl
//! variable "region" { default = "us-east-1" }
//! resource "aws_instance" "web" { region = var.region }
//! ```
//!
//! | pass | `var.region` in context | `aws_instance.web.region` |
//! |------|-------------------------|---------------------------|
//! | 1    | -                       | absent                    |
//! | 2    | `"us-east-1"`           | `"us-east-1"`             |
//! | 3    | `"us-east-1"`           | `"us-east-1"` (converged) |
//!
//! Reference cycles never agree, so resolution stops after a fixed number of passes and says
//! so ([resolver::Outcome::Exhausted]).
//!
//! ### Evaluation
//!
//! We use [hcl::eval] to evaluate expressions. The context of a pass is handed over as
//! variables (`var`, `local`, `data`, ... and one per resource type) together with the
//! [functions::Functions] table. Results are decoded into [value::Value].
//!
//! Attribute failures never abort a pass. They are collected in a
//! [diagnostics::Diagnostics] tree and the attribute is [value::Value::Absent].
//!
//! ### Output
//!
//! [resources::extract_resources] flattens a resolution into [resources::ResourceSet], which
//! gets serialized via [serde].
//!
pub mod block;
pub mod config_files;
pub mod context;
pub mod diagnostics;
pub mod eval;
pub mod functions;
pub mod resolver;
pub mod resources;
pub mod value;

use std::path::Path;

/// Errors that stop a project from being resolved at all
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] config_files::LoadError),
    #[error("Invalid configuration\n{0}")]
    Schema(#[from] block::SchemaError),
}

/// Loads, builds and resolves the project in `dir`
pub fn resolve_directory(
    dir: &Path,
    functions: &functions::Functions,
    options: resolver::ResolveOptions,
) -> Result<resolver::Resolution, Error> {
    let mut files = config_files::ConfigFiles::default();
    files.load_directory(dir)?;

    let blocks = block::build_blocks(&files)?;
    Ok(resolver::Resolver::with_options(functions, options).resolve(&blocks))
}
