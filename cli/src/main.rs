//! GraphQA CLI: ask questions of a Cypher graph database in plain language
//!
//! Reads connection and model settings from a YAML config file; secrets can
//! be supplied through `GRAPHQA_API_KEY` and `GRAPHQA_GRAPH_PASSWORD`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use graphqa::{AppConfig, AskOptions, HttpServer, NLQPipeline, QueryRecord};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "graphqa", version, about = "Natural language questions over a graph database")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "graphqa.yaml", global = true, env = "GRAPHQA_CONFIG")]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question from the graph
    Ask {
        /// The question in natural language
        question: String,

        /// Also print the generated Cypher and the records it returned
        #[arg(long)]
        raw: bool,

        /// Accepted for compatibility; answers are never cached
        #[arg(long)]
        skip_cache: bool,
    },
    /// Print the introspected schema
    Schema,
    /// Vector similarity search over the configured index
    Search {
        /// Text to search for
        question: String,

        /// Number of nodes to return
        #[arg(short, long, default_value_t = 4)]
        k: usize,
    },
    /// Execute a Cypher statement and print the normalized records
    Cypher {
        /// The Cypher statement
        statement: String,
    },
    /// Serve the HTTP API
    Serve {
        /// Bind address, overriding the config file
        #[arg(long)]
        host: Option<String>,

        /// Port, overriding the config file
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::from_yaml_file(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    config.apply_env();

    let pipeline = Arc::new(NLQPipeline::from_config(&config)?);
    pipeline
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", config.graph.url))?;

    match cli.command {
        Commands::Ask { question, raw, skip_cache } => {
            let options = AskOptions {
                skip_cache,
                include_raw_results: raw,
            };
            let result = pipeline.ask(&question, options).await?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
                _ => {
                    println!("{}", result.answer);
                    if let Some(cypher) = &result.cypher {
                        println!("\nCypher:\n{}", cypher);
                    }
                    if let Some(records) = &result.raw_results {
                        println!();
                        print_records(records, &cli.format)?;
                    }
                }
            }
        }
        Commands::Schema => {
            let schema = pipeline.schema().await?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&schema)?),
                _ if schema.is_empty() => println!("(empty schema)"),
                _ => print!("{}", schema),
            }
        }
        Commands::Search { question, k } => {
            let hits = pipeline.similarity_search(&question, k).await?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&hits)?),
                _ => {
                    let mut table = Table::new();
                    table.set_content_arrangement(ContentArrangement::Dynamic);
                    table.set_header(vec!["score", "text", "metadata"]);
                    for hit in &hits {
                        table.add_row(vec![
                            format!("{:.4}", hit.score),
                            hit.text.trim().to_string(),
                            serde_json::to_string(&hit.metadata)?,
                        ]);
                    }
                    println!("{}", table);
                    println!("{} hit(s)", hits.len());
                }
            }
        }
        Commands::Cypher { statement } => {
            let records = pipeline.execute(&statement).await?;
            print_records(&records, &cli.format)?;
        }
        Commands::Serve { host, port } => {
            let mut server_config = config.server.clone();
            if let Some(host) = host {
                server_config.host = host;
            }
            if let Some(port) = port {
                server_config.port = port;
            }
            HttpServer::new(Arc::clone(&pipeline), server_config).start().await?;
        }
    }

    pipeline.disconnect().await;
    Ok(())
}

/// Column names across all records, in first-seen order
fn columns(records: &[QueryRecord]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn print_records(records: &[QueryRecord], format: &OutputFormat) -> anyhow::Result<()> {
    let columns = columns(records);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(records)?);
        }
        OutputFormat::Csv => {
            if !columns.is_empty() {
                println!("{}", columns.join(","));
                for record in records {
                    let cells: Vec<String> = columns
                        .iter()
                        .map(|c| format_csv_value(record.get(c).unwrap_or(&Value::Null)))
                        .collect();
                    println!("{}", cells.join(","));
                }
            }
        }
        OutputFormat::Table => {
            if columns.is_empty() {
                println!("(no results)");
                return Ok(());
            }

            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(&columns);

            for record in records {
                let cells: Vec<String> = columns
                    .iter()
                    .map(|c| format_table_value(record.get(c).unwrap_or(&Value::Null)))
                    .collect();
                table.add_row(cells);
            }

            println!("{}", table);
            println!("{} row(s)", records.len());
        }
    }

    Ok(())
}

fn format_table_value(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Object(map) => {
            // Normalized nodes and relationships get a compact form
            if let Some(id) = map.get("id") {
                if let Some(labels) = map.get("labels") {
                    return format!("({}:{})", id, labels);
                }
                if let Some(t) = map.get("type") {
                    return format!("[{}:{}]", id, t);
                }
            }
            serde_json::to_string(v).unwrap_or_default()
        }
        Value::Array(_) => serde_json::to_string(v).unwrap_or_default(),
    }
}

fn format_csv_value(v: &Value) -> String {
    match v {
        Value::Null => "".to_string(),
        Value::String(s) => {
            if s.contains(',') || s.contains('"') || s.contains('\n') {
                format!("\"{}\"", s.replace('"', "\"\""))
            } else {
                s.clone()
            }
        }
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => {
            let json = serde_json::to_string(v).unwrap_or_default();
            format!("\"{}\"", json.replace('"', "\"\""))
        }
    }
}
