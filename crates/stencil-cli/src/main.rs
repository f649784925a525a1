/*
 * main.rs
 * Copyright (c) 2025 Stencil contributors
 *
 * Command-line driver for rendering and checking template files.
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;
use stencil_core::{
    PromptReply, PromptSource, ReferenceExecutor, RenderPipeline, TagVocabulary, repair,
};

#[derive(Parser, Debug)]
#[command(name = "stencil")]
#[command(about = "Render and check template documents")]
struct Args {
    /// Verbose output (can be used multiple times: -v, -vv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a template file with the bundled reference executor
    Render {
        /// Input template file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// JSON file with template data
        #[arg(long, value_name = "FILE")]
        data: Option<PathBuf>,
    },

    /// Check a template file for repairable and critical literal problems
    Check {
        /// Input template file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

/// Non-interactive prompt source: accepts the seeded default or the first
/// choice, so unattended renders never hang on a placeholder.
struct Defaulting;

#[async_trait]
impl PromptSource for Defaulting {
    async fn prompt_text(&self, _message: &str, default: &str) -> PromptReply {
        PromptReply::Value(default.to_string())
    }
    async fn prompt_choice(&self, _message: &str, options: &[String]) -> PromptReply {
        match options.first() {
            Some(first) => PromptReply::Value(first.clone()),
            None => PromptReply::Cancelled,
        }
    }
    async fn prompt_date(&self, _message: &str) -> PromptReply {
        PromptReply::Cancelled
    }
    async fn prompt_date_interval(&self, _message: &str) -> PromptReply {
        PromptReply::Cancelled
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Render { file, data } => render_file(&file, data.as_deref(), args.verbose),
        Command::Check { file } => check_file(&file),
    }
}

fn render_file(file: &std::path::Path, data: Option<&std::path::Path>, verbose: u8) -> Result<()> {
    let document =
        fs::read_to_string(file).context(format!("Failed to read template: {:?}", file))?;

    let user_data: Map<String, Value> = match data {
        Some(path) => {
            let raw =
                fs::read_to_string(path).context(format!("Failed to read data: {:?}", path))?;
            let value: Value =
                serde_json::from_str(&raw).context(format!("Invalid JSON in {:?}", path))?;
            value
                .as_object()
                .cloned()
                .context("Data file must contain a JSON object")?
        }
        None => Map::new(),
    };

    if verbose >= 1 {
        eprintln!("Rendering {:?}", file);
    }

    let executor = ReferenceExecutor::new();
    let prompts = Defaulting;
    let pipeline = RenderPipeline::new(&executor, &prompts);
    let output = pollster::block_on(pipeline.render(&document, &user_data));

    print!("{}", output);
    Ok(())
}

fn check_file(file: &std::path::Path) -> Result<()> {
    let document =
        fs::read_to_string(file).context(format!("Failed to read template: {:?}", file))?;

    if let Some(header) = stencil_frontmatter::split(&document) {
        eprintln!("Header: {} attribute(s)", header.attributes.len());
    }

    let outcome = repair(&document, &TagVocabulary::default());
    if outcome.errors.is_empty() {
        eprintln!("No literal problems found");
        return Ok(());
    }

    for error in &outcome.errors {
        eprintln!("✗ [{}] {}", error.phase, error.error);
        if let Some(context) = &error.context {
            eprintln!("    {}", context);
        }
    }
    if outcome.critical {
        std::process::exit(1);
    }
    Ok(())
}
