mod cli;

use pennywise::functions::Functions;
use pennywise::resolver::{ResolveOptions, Resolution, Resolver};
use std::path::PathBuf;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("PENNYWISE_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err,);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Resolve(resolve_cli) => resolve(resolve_cli),
        cli::Command::Resources(resolve_cli) => resources(resolve_cli),
        cli::Command::Dev(dev_cli) => dev(dev_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn resolve(cli: cli::ResolveCommand) -> anyhow::Result<()> {
    let resolution = run(&cli.input)?;

    let instances: indexmap::IndexMap<&str, &pennywise::value::Record> = resolution
        .instances
        .iter()
        .map(|(address, instance)| (address.as_str(), &instance.attributes))
        .collect();

    output(&cli.output, &instances)
}

pub fn resources(cli: cli::ResolveCommand) -> anyhow::Result<()> {
    let resolution = run(&cli.input)?;
    output(&cli.output, &pennywise::resources::extract_resources(&resolution))
}

fn run(input: &cli::InputArgs) -> anyhow::Result<Resolution> {
    let mut options = ResolveOptions {
        max_passes: input.max_passes,
        ..Default::default()
    };
    for assignment in &input.variables {
        options.set_variable(assignment)?;
    }

    let blocks = load_blocks(input.path.as_ref())?;
    let functions = Functions::builtin();
    let resolution = Resolver::with_options(&functions, options).resolve(&blocks);

    if !resolution.converged() {
        eprintln!(
            "Resolution did not converge after {} passes, some values may be unresolved",
            resolution.passes
        );
    }

    if input.diagnostics {
        eprint!("{}", resolution.diagnostics);
    }

    Ok(resolution)
}

fn load_blocks(path: Option<&PathBuf>) -> anyhow::Result<Vec<pennywise::block::Block>> {
    let files = load(path)?;
    Ok(pennywise::block::build_blocks(&files)?)
}

fn load(path: Option<&PathBuf>) -> anyhow::Result<pennywise::config_files::ConfigFiles> {
    let dir = match path {
        Some(path) => path.clone(),
        None => std::env::current_dir()?,
    };

    let mut files = pennywise::config_files::ConfigFiles::default();
    files.load_directory(&dir)?;
    Ok(files)
}

fn output(output: &cli::OutputArgs, value: &impl serde::Serialize) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}

/// (pennywise-)developer utilities
///
/// A quick way to expose internal structures for debugging purposes.
/// Works on the work directory, combine with `-C` to point elsewhere.
pub fn dev(cli: cli::DevCommand) -> anyhow::Result<()> {
    use cli::DevSubCommand::*;

    match cli.command {
        Files => println!("{:#?}", load(None)?),
        Blocks => println!("{:#?}", load_blocks(None)?),
    }

    Ok(())
}
