//! sqlgate-cli - Command-line interface for sqlgate
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use sqlgate_client::{Client, ConnectionConfig};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqlgate-cli")]
#[command(about = "Command-line interface for the sqlgate SQL gateway")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:10980", env = "SQLGATE_SERVER")]
    server: SocketAddr,

    /// Database target to open (:memory: or a path under the server's root)
    #[arg(short, long, env = "SQLGATE_DATABASE")]
    database: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL
    Repl,

    /// Run a query and print the result rows
    Query {
        /// SQL text
        sql: String,
    },

    /// Run a query and print the first row
    Single {
        /// SQL text
        sql: String,
    },

    /// Run a query and print the first value of the first row
    Value {
        /// SQL text
        sql: String,
    },

    /// Run a statement and print the affected row count
    Exec {
        /// SQL text
        sql: String,
    },

    /// Run a query and print rows plus table metadata
    Table {
        /// SQL text
        sql: String,
    },

    /// Apply a change-set to the database
    Postback {
        /// Change-set JSON (or @file.json to read from file)
        changes: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = ConnectionConfig::new(cli.server);

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(config, cli.database).await?;
        }
        Some(cmd) => {
            // Connect for one-shot command
            let mut client = Client::connect(config).await.map_err(|e| {
                eprintln!("{}: {}", "Connection failed".red(), e);
                e
            })?;

            // One-shot commands run against an opened database.
            let target = cli.database.unwrap_or_else(|| ":memory:".to_string());
            if let Err(e) = client.open(&target).await {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }

            let result = commands::execute(&mut client, cmd).await;

            match result {
                Ok(output) => {
                    println!("{}", output);
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }

            client.close().await?;
        }
    }

    Ok(())
}
