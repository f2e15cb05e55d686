//! Interactive REPL.

use crate::commands::{format_query, format_row, format_table, render_value};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use sqlgate_client::{Client, ConnectionConfig};

const HELP_TEXT: &str = r#"
Commands start with a dot; any other line is sent as a query.

  .open <target>    Open a database (:memory: or a path under the server root)
  .close            Close the current database
  .exec <sql>       Run a statement, print the affected row count
  .value <sql>      Run a query, print the first value of the first row
  .single <sql>     Run a query, print the first row
  .table <sql>      Run a query, print rows plus table metadata
  .help             Show this help
  .quit             Exit the REPL

  <sql>             Run a query, print the result rows
"#;

pub async fn run(
    config: ConnectionConfig,
    database: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "sqlgate CLI".bold().cyan());
    println!("Connecting to {}...", config.addr);

    let mut client = Client::connect(config.clone()).await?;
    println!("{}", "Connected!".green());

    if let Some(target) = database {
        match client.open(&target).await {
            Ok(()) => println!("{} {}", "Opened".green(), target.cyan()),
            Err(e) => println!("{}: {}", "Error".red(), e),
        }
    }

    // Create readline editor
    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(rl_config)?;

    // Load history
    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".sqlgate_history"))
        .unwrap_or_else(|_| ".sqlgate_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type '.help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "sqlgate>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                // A close ends the whole session on the server side, so
                // start a fresh one to keep the REPL usable.
                if line == ".close" {
                    if let Err(e) = client.close().await {
                        println!("{}: {}", "Error".red(), e);
                    }
                    client = match Client::connect(config.clone()).await {
                        Ok(c) => c,
                        Err(e) => {
                            println!("{}: {}", "Reconnect failed".red(), e);
                            let _ = rl.save_history(&history_path);
                            return Err(e.into());
                        }
                    };
                    println!("{}\n", "Closed.".dimmed());
                    continue;
                }

                match run_line(&mut client, line).await {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break, // Exit command
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);

    let _ = client.close().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

async fn run_line(
    client: &mut Client,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let Some(rest) = line.strip_prefix('.') else {
        // Bare lines are queries.
        let data = client.query(line).await?;
        return Ok(Some(format_query(&data)));
    };

    let (cmd, args) = match rest.split_once(char::is_whitespace) {
        Some((cmd, args)) => (cmd, args.trim()),
        None => (rest, ""),
    };

    match cmd {
        "help" | "h" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "open" => {
            if args.is_empty() {
                return Ok(Some("Usage: .open <target>".to_string()));
            }
            client.open(args).await?;
            Ok(Some(format!("{} {}", "Opened".green(), args.cyan())))
        }

        "exec" => {
            if args.is_empty() {
                return Ok(Some("Usage: .exec <sql>".to_string()));
            }
            let affected = client.execute(args).await?;
            Ok(Some(format!("{} row(s) affected", affected)))
        }

        "value" => {
            if args.is_empty() {
                return Ok(Some("Usage: .value <sql>".to_string()));
            }
            let value = client.query_value(args).await?;
            Ok(Some(render_value(&value)))
        }

        "single" => {
            if args.is_empty() {
                return Ok(Some("Usage: .single <sql>".to_string()));
            }
            match client.query_single(args).await? {
                Some(row) => Ok(Some(format_row(&row))),
                None => Ok(Some("No rows".yellow().to_string())),
            }
        }

        "table" => {
            if args.is_empty() {
                return Ok(Some("Usage: .table <sql>".to_string()));
            }
            let data = client.table(args).await?;
            Ok(Some(format_table(&data)))
        }

        _ => Ok(Some(format!(
            "Unknown command: .{}. Type '.help' for help.",
            cmd
        ))),
    }
}
