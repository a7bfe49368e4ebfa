// query-router - classify a query and hand it to the matching agent

use anyhow::Context;
use clap::{Parser, Subcommand};
use ollama::OllamaClient;
use query_router::routing::{OllamaDispatcher, QueryOutcome, ToolCaller, ToolRegistry, clarify};
use query_router::{RouterConfig, RouterContext};
use std::path::PathBuf;
use std::sync::Arc;
use termimad::{MadSkin, crossterm::style::Color};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ollama API host (overrides config)
    #[arg(long)]
    ollama_host: Option<String>,

    /// Classifier weight artifact (overrides config)
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify a query, route it and print the agent's answer
    Ask { query: Vec<String> },

    /// Print the category of a query
    Classify { query: Vec<String> },

    /// Ask multiple-choice questions that narrow down a vague query
    Clarify { query: Vec<String> },

    /// Let a model pick an arithmetic tool for the input and run it
    Tool {
        input: Vec<String>,

        /// Model that selects the tool (overrides config)
        #[arg(long)]
        model: Option<String>,
    },

    /// Print the route table
    Routes,
}

fn create_markdown_skin() -> MadSkin {
    let mut skin = MadSkin::default();

    skin.headers[0].set_fg(Color::Cyan);
    skin.headers[1].set_fg(Color::Blue);
    skin.headers[2].set_fg(Color::Green);

    skin.code_block.set_fg(Color::Yellow);
    skin.inline_code.set_fg(Color::Yellow);

    skin
}

fn join(words: &[String]) -> anyhow::Result<String> {
    let text = words.join(" ");
    if text.trim().is_empty() {
        anyhow::bail!("no query given");
    }
    Ok(text)
}

fn print_outcome(outcome: &QueryOutcome, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    println!("Category: {}", outcome.category);
    if let Some(agent) = &outcome.agent {
        println!("Agent: {}", agent);
    }
    println!();

    match (&outcome.response, &outcome.error) {
        (Some(response), _) => create_markdown_skin().print_text(&response.content),
        (None, Some(error)) => eprintln!("Error: {}", error),
        (None, None) => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = RouterConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(host) = args.ollama_host {
        config.ollama.host = host;
    }
    if let Some(weights) = args.weights {
        config.classifier.weights = weights;
    }

    match args.command {
        Command::Ask { query } => {
            let query = join(&query)?;
            let context = RouterContext::from_config(&config).context("initializing router")?;
            let outcome = context.process(&query).await;
            print_outcome(&outcome, args.json)?;
            if !outcome.is_success() {
                std::process::exit(1);
            }
        }
        Command::Classify { query } => {
            let query = join(&query)?;
            let context = RouterContext::from_config(&config).context("initializing router")?;
            let category = context.classify(&query).await;
            if args.json {
                println!("{}", serde_json::json!({ "query": query, "category": category }));
            } else {
                println!("{}", category);
            }
        }
        Command::Clarify { query } => {
            let query = join(&query)?;
            let client = OllamaClient::with_timeout(&config.ollama.host, config.timeout())?;
            let dispatcher = OllamaDispatcher::new(client);

            let questions = clarify(&dispatcher, &config.clarifier, &query).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&questions)?);
            } else {
                create_markdown_skin().print_text(&questions.render());
            }
        }
        Command::Tool { input, model } => {
            let input = join(&input)?;
            let model = model.unwrap_or_else(|| config.tools.model.clone());
            let client = OllamaClient::with_timeout(&config.ollama.host, config.timeout())?;
            let caller = ToolCaller::new(client, model, Arc::new(ToolRegistry::arithmetic()?));

            let outcome = caller.call(&input).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{} -> {}", outcome.call.name, outcome.output_text());
            }
        }
        Command::Routes => {
            let table = config.route_table()?;
            for (category, agent) in table.entries() {
                println!("{:<10} {} ({})", category.as_str(), agent.name, agent.model);
            }
        }
    }

    Ok(())
}
