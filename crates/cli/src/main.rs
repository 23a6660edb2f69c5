//! Nimbus CLI - synthesize the GPU service stack template.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use nimbus_synth::{stack, SynthContext};

/// Nimbus CLI - declarative stack synthesis for the GPU container service.
#[derive(Parser)]
#[command(name = "nimbus")]
#[command(about = "Synthesize the GPU service deployment template")]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Emit the deployment template.
    Synth {
        /// Context overrides as `key=value` (e.g. `-c autoScaleDown=false`).
        #[arg(short = 'c', long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,

        /// YAML file of context overrides, applied before `-c` pairs.
        #[arg(long, value_name = "PATH")]
        context_file: Option<PathBuf>,

        /// Output format.
        #[arg(long, value_enum, default_value = "json")]
        format: Format,

        /// Write the template here instead of stdout.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Print the fully resolved context parameters.
    Context {
        /// Context overrides as `key=value`.
        #[arg(short = 'c', long = "context", value_name = "KEY=VALUE")]
        context: Vec<String>,

        /// YAML file of context overrides, applied before `-c` pairs.
        #[arg(long, value_name = "PATH")]
        context_file: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Yaml,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Synth {
            context,
            context_file,
            format,
            output,
        } => {
            let ctx = resolve_context(context_file.as_deref(), &context)?;
            let template = stack::synthesize(&ctx).context("Failed to synthesize stack")?;
            let rendered = match format {
                Format::Json => template.to_json(),
                Format::Yaml => template.to_yaml(),
            }
            .context("Failed to render template")?;

            match output {
                Some(path) => {
                    fs::write(&path, rendered)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), "template written");
                }
                None => println!("{rendered}"),
            }
        }
        Commands::Context {
            context,
            context_file,
        } => {
            let ctx = resolve_context(context_file.as_deref(), &context)?;
            println!("{}", render_context(&ctx)?);
        }
    }

    Ok(())
}

/// Defaults, then the context file, then `key=value` pairs.
fn resolve_context(file: Option<&std::path::Path>, pairs: &[String]) -> Result<SynthContext> {
    let mut ctx = SynthContext::default();
    if let Some(path) = file {
        let document = fs::read_to_string(path)
            .with_context(|| format!("Failed to read context file {}", path.display()))?;
        ctx.merge_yaml(&document)
            .with_context(|| format!("Invalid context file {}", path.display()))?;
    }
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Expected KEY=VALUE, got {pair:?}"))?;
        ctx.set(key.trim(), value.trim())
            .with_context(|| format!("Invalid context override {pair:?}"))?;
    }
    Ok(ctx)
}

/// Context pretty-printed under its external camelCase keys.
fn render_context(ctx: &SynthContext) -> Result<String> {
    serde_json::to_string_pretty(ctx).context("Failed to render context")
}
