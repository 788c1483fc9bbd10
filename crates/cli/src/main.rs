use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crisis_agents::PlanQaAgent;
use crisis_core::{aggregate_zones, classify_intent, normalize_query, rank_zones};
use crisis_observability::{init_tracing, AppMetrics};
use crisis_storage::{read_state_file, MemoryStore, PlanningStateRepository};

#[derive(Debug, Parser)]
#[command(name = "crisis-qa")]
#[command(about = "Ask questions about the current crisis-response plan")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer a single question.
    Ask {
        query: String,
        #[arg(long, env = "CRISIS_STATE_FILE")]
        state: PathBuf,
    },
    /// Interactive question loop; `exit` or `quit` leaves.
    Chat {
        #[arg(long, env = "CRISIS_STATE_FILE")]
        state: PathBuf,
    },
    /// Print zone aggregates in priority order as JSON.
    Zones {
        #[arg(long, env = "CRISIS_STATE_FILE")]
        state: PathBuf,
    },
    /// Show which intent a question classifies as.
    Intent { query: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("crisis_cli");
    let cli = Cli::parse();

    match cli.command {
        Command::Ask { query, state } => {
            let agent = load_agent(&state).await?;
            let response = agent.handle_query(&query).await?;
            println!("{}", response.answer);
        }
        Command::Chat { state } => {
            let agent = load_agent(&state).await?;
            run_chat(agent).await?;
        }
        Command::Zones { state } => {
            let outputs = read_state_file(&state)?;
            let zones = rank_zones(aggregate_zones(outputs.demand.as_ref()));
            println!("{}", serde_json::to_string_pretty(&zones)?);
        }
        Command::Intent { query } => {
            let intent = classify_intent(&normalize_query(&query));
            println!("{}", intent.as_tag());
        }
    }

    Ok(())
}

async fn run_chat(agent: PlanQaAgent<MemoryStore>) -> Result<()> {
    println!("Ask about zones, evacuees, priorities, routes, shelters, or impact. type 'exit' to quit.");

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            break;
        }

        let message = line.trim();
        if message.eq_ignore_ascii_case("exit") || message.eq_ignore_ascii_case("quit") {
            break;
        }

        if message.is_empty() {
            continue;
        }

        let response = agent.handle_query(message).await?;
        println!("\n{}\n", response.answer);
    }

    Ok(())
}

async fn load_agent(state_path: &Path) -> Result<PlanQaAgent<MemoryStore>> {
    let outputs = read_state_file(state_path)?;
    let store = MemoryStore::new();
    store
        .replace(outputs)
        .await
        .with_context(|| format!("failed loading {}", state_path.display()))?;

    Ok(PlanQaAgent::new(Arc::new(store), AppMetrics::shared()))
}
