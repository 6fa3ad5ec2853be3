use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Query and manage a running llm-relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin token, required by `reload` when the relay sets one.
    #[arg(short, long, env = "RELAY_ADMIN_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check relay liveness and persistence status
    Health,
    /// Per-agent telemetry summary
    Stats {
        #[arg(short, long)]
        period_minutes: Option<i64>,
        #[arg(short, long)]
        agent: Option<String>,
    },
    /// Download raw telemetry records as CSV
    Export {
        #[arg(short, long)]
        period_minutes: Option<i64>,
        #[arg(short, long)]
        agent: Option<String>,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Re-read token warning thresholds from the relay's config file
    Reload,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            print_response(res).await?;
        }
        Commands::Stats {
            period_minutes,
            agent,
        } => {
            let res = client
                .get(format!("{}/stats", cli.url))
                .query(&filter_query(period_minutes, agent))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Export {
            period_minutes,
            agent,
            output,
        } => {
            let res = client
                .get(format!("{}/stats/export", cli.url))
                .query(&filter_query(period_minutes, agent))
                .send()
                .await?;
            if !res.status().is_success() {
                return print_response(res).await;
            }
            let csv = res.text().await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, csv)?;
                    eprintln!("Wrote {}", path.display());
                }
                None => print!("{csv}"),
            }
        }
        Commands::Reload => {
            let mut headers = HeaderMap::new();
            if let Some(token) = &cli.token {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {token}"))?,
                );
            }
            let res = client
                .post(format!("{}/admin/reload", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

fn filter_query(period_minutes: Option<i64>, agent: Option<String>) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(minutes) = period_minutes {
        query.push(("periodMinutes", minutes.to_string()));
    }
    if let Some(agent) = agent {
        query.push(("agent", agent));
    }
    query
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
