//! RouteScope CLI
//!
//! Command-line interface for inspecting and simulating Alertmanager routing
//! configurations.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};

use routescope::assemble::Assembler;
use routescope::display;
use routescope::models::{parse_alert, Document};
use routescope::routing::{evaluate, render_static, validate, RouteTree};
use routescope::{Error, Settings};

/// RouteScope - see where your alerts go
#[derive(Parser)]
#[command(name = "routescope")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Settings file path
    #[arg(short, long, global = true, env = "ROUTESCOPE_SETTINGS")]
    settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the routing tree of a configuration
    Tree {
        /// Alertmanager configuration file
        config: PathBuf,
    },

    /// Show where an alert would be routed
    Eval {
        /// Alertmanager configuration file
        config: PathBuf,

        /// Alert labels as JSON, or @file with the JSON
        #[arg(short, long)]
        alert: String,

        /// Evaluate time intervals at this instant (RFC 3339, default now)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Validate a configuration and list every problem found
    Check {
        /// Alertmanager configuration file
        config: PathBuf,
    },

    /// Assemble a configuration directory into a single file
    Render {
        /// Directory holding the base document and fragments
        dir: PathBuf,

        /// Output file (relative to the directory unless absolute)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load settings
    let settings = match Settings::load(cli.settings.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading settings: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&settings, cli.verbose);

    // Execute command
    let result = match cli.command {
        Commands::Tree { config } => run_tree(&settings, &config, cli.format),
        Commands::Eval { config, alert, at } => {
            run_eval(&settings, &config, &alert, at, cli.format)
        }
        Commands::Check { config } => run_check(&settings, &config, cli.format),
        Commands::Render { dir, output } => run_render(&settings, &dir, output, cli.format),
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e, cli.format);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(settings: &Settings, verbose: bool) {
    let log_level = if verbose {
        "debug"
    } else {
        settings.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    // stdout is reserved for command output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if settings.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load a document, filling in the configured fallback root receiver
fn load_document(path: &Path, settings: &Settings) -> anyhow::Result<Document> {
    let mut document = Document::from_path(path)
        .with_context(|| format!("failed to load {}", path.display()))?;

    if let (Some(route), Some(fallback)) = (
        document.route.as_mut(),
        settings.evaluation.default_receiver.as_ref(),
    ) {
        if route.receiver.as_deref().map_or(true, |r| r.trim().is_empty()) {
            warn!(receiver = %fallback, "Root route has no receiver, using the configured default");
            route.receiver = Some(fallback.clone());
        }
    }

    Ok(document)
}

fn load_tree(path: &Path, settings: &Settings) -> anyhow::Result<RouteTree> {
    let document = load_document(path, settings)?;
    let tree = RouteTree::build(&document)?;
    info!(path = %path.display(), routes = tree.len(), "Loaded routing tree");
    Ok(tree)
}

fn run_tree(settings: &Settings, config: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let tree = load_tree(config, settings)?;
    let trace = render_static(&tree);

    match format {
        OutputFormat::Text => print!("{}", display::render_tree(&tree, &trace)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&trace.visits)?),
    }
    Ok(())
}

fn run_eval(
    settings: &Settings,
    config: &Path,
    alert: &str,
    at: Option<DateTime<Utc>>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let tree = load_tree(config, settings)?;
    let labels = parse_alert(alert)?;
    let trace = evaluate(&tree, &labels, at.unwrap_or_else(Utc::now));

    match format {
        OutputFormat::Text => print!("{}", display::render_evaluation(&tree, &trace, &labels)),
        OutputFormat::Json => {
            let output = json!({
                "labels": labels,
                "receivers": trace.receivers(),
                "notified_receivers": trace.notified_receivers(),
                "trace": trace,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn run_check(settings: &Settings, config: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let document = load_document(config, settings)?;
    let findings = validate(&document);
    if !findings.is_empty() {
        return Err(Error::InvalidConfig(findings).into());
    }

    match format {
        OutputFormat::Text => print!("{}", display::render_findings(&findings)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "valid": true, "findings": findings }))?
        ),
    }
    Ok(())
}

fn run_render(
    settings: &Settings,
    dir: &Path,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let assembler = match output {
        Some(output) => Assembler::new(settings.render.base_file.clone(), output),
        None => Assembler::from_settings(&settings.render),
    };
    let written = assembler.render(dir)?;

    match format {
        OutputFormat::Text => println!("Wrote {}", written.display()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "output": written }))?
        ),
    }
    Ok(())
}

/// Findings are command output; anything else is an error message
fn report(error: &anyhow::Error, format: OutputFormat) {
    let findings = error
        .downcast_ref::<Error>()
        .map(Error::findings)
        .unwrap_or_default();
    if findings.is_empty() {
        eprintln!("Error: {error:#}");
        return;
    }

    match format {
        OutputFormat::Text => print!("{}", display::render_findings(findings)),
        OutputFormat::Json => {
            match serde_json::to_string_pretty(&json!({ "valid": false, "findings": findings })) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Error: {e}"),
            }
        }
    }
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "routescope", &mut io::stdout());
}
