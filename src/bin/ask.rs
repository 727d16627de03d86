//! medassist-ask：无界面单次问答
//!
//! 用法：medassist-ask [--image <path|url>] [--no-guard] [--json] <question>...

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use medassist::agent::{build_agent, QueryOptions};
use medassist::config::{load_config, Secrets};
use medassist::observability;
use medassist::services::ImageSource;

/// Ask the medical assistant a single question
#[derive(Debug, Parser)]
#[command(name = "medassist-ask", version)]
struct Cli {
    /// Medical image to upload before asking (path or http(s) URL)
    #[arg(long)]
    image: Option<String>,
    /// Skip the medical-relevance check
    #[arg(long)]
    no_guard: bool,
    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
    /// Extra TOML config file layered over config/default.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// The question
    #[arg(required = true, trailing_var_arg = true)]
    question: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    observability::init();

    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    let mut agent = build_agent(&cfg, &Secrets::from_env()).context("Failed to build agent")?;

    if let Some(src) = cli.image.as_deref() {
        let meta = agent
            .upload_image(ImageSource::parse(src), None)
            .await
            .context("Image upload failed")?;
        eprintln!("Uploaded {} {} {}", meta.filename, meta.size_label(), meta.format);
    }

    let question = cli.question.join(" ");
    let result = agent
        .query_with(
            &question,
            QueryOptions {
                skip_guard: cli.no_guard,
                ..Default::default()
            },
        )
        .await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.response);
        if !result.tool_call_counts.is_empty() {
            let usage: Vec<String> = result
                .tool_call_counts
                .iter()
                .map(|(tool, n)| format!("{} ×{}", tool, n))
                .collect();
            eprintln!("\nTools used: {}", usage.join(", "));
        }
    }

    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
