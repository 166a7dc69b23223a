//! pennywise cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; pennywise ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve a project and print every instance
    Resolve(ResolveCommand),

    /// Resolve a project and print its resources
    Resources(ResolveCommand),

    /// Print debug information for development
    Dev(DevCommand),
}

#[derive(Parser, Debug)]
pub struct ResolveCommand {
    #[clap(flatten)]
    pub input: InputArgs,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct InputArgs {
    /// Project directory, defaults to the work directory
    pub path: Option<PathBuf>,

    /// Set an input variable
    ///
    /// The value is read as an expression (`--var 'zones=["a", "b"]'`).
    /// When that fails it is taken as a plain string (`--var region=eu-west-1`).
    #[clap(long = "var", value_name = "NAME=VALUE")]
    pub variables: Vec<String>,

    /// Give up after this many passes
    #[clap(long = "max-passes", default_value_t = pennywise::resolver::DEFAULT_MAX_PASSES)]
    pub max_passes: usize,

    /// Print diagnostics of the final pass to stderr
    #[clap(long = "diagnostics")]
    pub diagnostics: bool,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DevCommand {
    #[command(subcommand)]
    pub command: DevSubCommand,
}

#[derive(Subcommand, Debug)]
pub enum DevSubCommand {
    /// Parsed files
    Files,
    /// Block model
    Blocks,
}
