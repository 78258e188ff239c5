//! pgexplain - Analyze PostgreSQL EXPLAIN plans from the command line

mod config;
mod logging;
mod output;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use config::{Config, OutputFormat};
use output::RenderOptions;
use pgexplain_analyzer::Explained;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pgexplain", version, about = "Analyze PostgreSQL EXPLAIN (ANALYZE, FORMAT JSON) plans")]
struct Cli {
    /// Configuration file (default: <config dir>/pgexplain/config.toml)
    #[arg(long, global = true, env = "PGEXPLAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter directives, e.g. `debug` or `pgexplain_analyzer=trace`
    #[arg(long, global = true, env = "PGEXPLAIN_LOG")]
    log: Option<String>,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze one plan
    Explain {
        /// EXPLAIN JSON file, or `-` for stdin
        plan: String,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Compare two plans (raw EXPLAIN JSON or previously explained output)
    Compare {
        before: String,
        after: String,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct OutputArgs {
    /// Output format (overrides the config file)
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Write the result to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl OutputArgs {
    fn options(&self, config: &Config) -> RenderOptions {
        RenderOptions {
            format: self.format.unwrap_or(config.output.format),
            pretty: self.pretty || config.output.pretty,
            top_nodes: config.output.top_nodes,
        }
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let mut logging = if cli.verbose {
        logging::LoggingConfig::verbose()
    } else {
        logging::LoggingConfig::from_section(&config.logging)
    };
    if let Some(filter) = &cli.log {
        logging = logging.with_filter(filter);
    }
    logging::init(logging)?;

    match &cli.command {
        Command::Explain { plan, output } => {
            let explained = load_explained(plan)?;
            let rendered = output::render_explained(&explained, output.options(&config))?;
            write_output(&rendered, output.output.as_deref())
        }
        Command::Compare {
            before,
            after,
            output,
        } => {
            let before = load_explained(before)?;
            let after = load_explained(after)?;
            let comparison = pgexplain_analyzer::compare(&before, &after)?;
            let rendered = output::render_comparison(&comparison, output.options(&config))?;
            write_output(&rendered, output.output.as_deref())
        }
    }
}

fn read_input(source: &str) -> Result<String> {
    if source == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read plan from stdin")?;
        return Ok(buffer);
    }
    std::fs::read_to_string(source).with_context(|| format!("Failed to read {source:?}"))
}

/// Reads a raw EXPLAIN document or an already explained result
fn load_explained(source: &str) -> Result<Explained> {
    let text = read_input(source)?;
    let explained = parse_input(&text).with_context(|| format!("Failed to analyze {source:?}"))?;
    tracing::info!(
        source,
        nodes = explained.stats.nodes_count,
        execution_time = explained.stats.execution_time,
        "Plan loaded"
    );
    Ok(explained)
}

fn parse_input(text: &str) -> Result<Explained> {
    if is_explained(text) {
        return Ok(Explained::from_json(text)?);
    }
    Ok(pgexplain_analyzer::explain(text)?)
}

/// An explained result is an object carrying the envelope keys; raw plans
/// are arrays or objects with a `Plan` key
fn is_explained(text: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(text.trim()) {
        Ok(serde_json::Value::Object(map)) => {
            !map.contains_key("Plan") && (map.contains_key("summary") || map.contains_key("stats"))
        }
        _ => false,
    }
}

fn write_output(rendered: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, format!("{rendered}\n"))
            .with_context(|| format!("Failed to write {:?}", path)),
        None => {
            println!("{rendered}");
            Ok(())
        }
    }
}
