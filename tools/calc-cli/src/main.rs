//! Calc Exchange CLI
//!
//! Command-line client with three modes:
//! - submit: Evaluate one expression
//! - history: Print the stored history
//! - watch: Follow the live history feed until Ctrl+C

use anyhow::{bail, Context, Result};
use calc_protocol::{HistoryMessage, RecordMessage};
use clap::{Parser, Subcommand};
use colored::*;
use history_subscriber::{ConnectionState, FeedEvent, ReconnectingSubscriber, SubscriberConfig};
use serde::Deserialize;
use std::process::ExitCode;
use std::time::Duration;

/// Time allowed for a submission before giving up
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "calc-cli")]
#[command(about = "Command-line client for the calculation service")]
#[command(version)]
struct Cli {
    /// Base URL of the calculation service
    #[arg(long, global = true, default_value = "http://127.0.0.1:8000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an expression and print the result
    Submit {
        /// Expression to evaluate, e.g. "3 + 2"
        expression: String,

        /// Evaluate in floating-point mode
        #[arg(long)]
        float: bool,
    },

    /// Print the stored history
    History,

    /// Follow the live history feed until Ctrl+C
    Watch {
        /// Delay between reconnect attempts in milliseconds
        #[arg(long, default_value = "2000")]
        reconnect_ms: u64,
    },
}

/// Error body returned by the service
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    category: Option<String>,
}

/// How a submission ended
#[derive(Debug, PartialEq)]
enum SubmitOutcome {
    Evaluated(String),
    Rejected { status: u16, message: String, category: Option<String> },
    Unavailable,
    TimedOut,
    Failed(String),
}

impl SubmitOutcome {
    fn is_success(&self) -> bool {
        matches!(self, SubmitOutcome::Evaluated(_))
    }

    fn describe(&self) -> String {
        match self {
            SubmitOutcome::Evaluated(result) => result.clone(),
            SubmitOutcome::Rejected { status, message, category } => match category {
                Some(category) => format!("error: {message} ({category}, HTTP {status})"),
                None => format!("error: {message} (HTTP {status})"),
            },
            SubmitOutcome::Unavailable => "error: server unavailable".to_string(),
            SubmitOutcome::TimedOut => "error: server did not respond in time".to_string(),
            SubmitOutcome::Failed(message) => format!("error: {message}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    match cli.command {
        Commands::Submit { expression, float } => {
            let client = reqwest::Client::builder()
                .timeout(SUBMIT_TIMEOUT)
                .build()
                .context("Failed to build HTTP client")?;

            let outcome = submit(&client, &server, &expression, float).await;
            if outcome.is_success() {
                println!("{}", outcome.describe().green().bold());
                Ok(ExitCode::SUCCESS)
            } else {
                eprintln!("{}", outcome.describe().red());
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::History => {
            let history = fetch_history(&server).await?;
            println!("{}", format!("📜 History ({} records)", history.history.len()).cyan().bold());
            for record in &history.history {
                println!("  {}", format_record(record));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Watch { reconnect_ms } => {
            let mut config = SubscriberConfig::new(feed_url(&server)?);
            config.reconnect_delay_ms = reconnect_ms;
            watch(config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn submit(
    client: &reqwest::Client,
    server: &str,
    expression: &str,
    float: bool,
) -> SubmitOutcome {
    let response = match client
        .post(format!("{server}/calc"))
        .query(&[("float", float)])
        .json(&expression)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => return classify_transport_error(&e),
    };

    let status = response.status();
    if status.is_success() {
        return match response.json::<String>().await {
            Ok(result) => SubmitOutcome::Evaluated(result),
            Err(e) if e.is_timeout() => SubmitOutcome::TimedOut,
            Err(e) => SubmitOutcome::Failed(format!("unreadable response: {e}")),
        };
    }

    match response.json::<ErrorBody>().await {
        Ok(body) => SubmitOutcome::Rejected {
            status: status.as_u16(),
            message: body.error,
            category: body.category,
        },
        Err(_) => SubmitOutcome::Rejected {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("request failed").to_string(),
            category: None,
        },
    }
}

fn classify_transport_error(error: &reqwest::Error) -> SubmitOutcome {
    if error.is_timeout() {
        SubmitOutcome::TimedOut
    } else if error.is_connect() {
        SubmitOutcome::Unavailable
    } else {
        SubmitOutcome::Failed(error.to_string())
    }
}

async fn fetch_history(server: &str) -> Result<HistoryMessage> {
    let response = reqwest::get(format!("{server}/history"))
        .await
        .with_context(|| format!("Failed to reach {server}"))?;

    if !response.status().is_success() {
        bail!("History request failed with HTTP {}", response.status());
    }

    response.json().await.context("Failed to parse history response")
}

async fn watch(config: SubscriberConfig) -> Result<()> {
    println!("{}", format!("📡 Watching {}", config.url).cyan().bold());
    println!("{}", "Press Ctrl+C to exit".yellow());

    let (subscriber, mut events) =
        ReconnectingSubscriber::spawn(config).context("Failed to start subscriber")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            event = events.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
        }
    }

    subscriber.close().await;
    println!("{}", "👋 Goodbye!".green());
    Ok(())
}

fn print_event(event: &FeedEvent) {
    match event {
        FeedEvent::StateChanged(state) => {
            let label = format!("[{state}]");
            let label = match state {
                ConnectionState::Connected => label.green(),
                ConnectionState::Connecting => label.yellow(),
                ConnectionState::Disconnected | ConnectionState::Closed => label.red(),
            };
            println!("{label}");
        }
        FeedEvent::SnapshotReplaced(records) => {
            println!("{}", format!("📜 Snapshot ({} records)", records.len()).cyan().bold());
            for record in records {
                println!("  {}", format_record(record));
            }
        }
        FeedEvent::RecordAppended(record) => {
            println!("{} {}", "+".green().bold(), format_record(record));
        }
        FeedEvent::Failure(failure) => {
            println!("{}", format!("❌ {failure}").red());
        }
    }
}

fn format_record(record: &RecordMessage) -> String {
    let mode = if record.float_mode { " (float)" } else { "" };
    format!("#{:<4} {} = {}{}", record.sequence, record.expression, record.result, mode)
}

/// WebSocket feed URL for an HTTP base URL
fn feed_url(server: &str) -> Result<String> {
    let ws_base = if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if server.starts_with("ws://") || server.starts_with("wss://") {
        server.to_string()
    } else {
        bail!("Unsupported server URL: {server}");
    };
    Ok(format!("{}/ws", ws_base.trim_end_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_url() {
        assert_eq!(feed_url("http://127.0.0.1:8000").unwrap(), "ws://127.0.0.1:8000/ws");
        assert_eq!(feed_url("https://calc.example.com/").unwrap(), "wss://calc.example.com/ws");
        assert_eq!(feed_url("ws://localhost:9000").unwrap(), "ws://localhost:9000/ws");
        assert!(feed_url("localhost:8000").is_err());
    }

    #[test]
    fn test_format_record() {
        let record = RecordMessage {
            sequence: 3,
            expression: "3 / 2".to_string(),
            result: "1.5".to_string(),
            float_mode: true,
            timestamp: None,
        };
        assert_eq!(format_record(&record), "#3    3 / 2 = 1.5 (float)");
    }

    #[test]
    fn test_outcome_descriptions() {
        assert_eq!(SubmitOutcome::Evaluated("5".to_string()).describe(), "5");
        assert_eq!(SubmitOutcome::Unavailable.describe(), "error: server unavailable");
        assert_eq!(SubmitOutcome::TimedOut.describe(), "error: server did not respond in time");

        let rejected = SubmitOutcome::Rejected {
            status: 500,
            message: "division by zero".to_string(),
            category: Some("evaluation".to_string()),
        };
        assert_eq!(rejected.describe(), "error: division by zero (evaluation, HTTP 500)");
        assert!(!rejected.is_success());
    }

    #[tokio::test]
    async fn test_submit_to_closed_port_is_unavailable() {
        // Bind then release a port so nothing is listening on it
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = reqwest::Client::builder().timeout(SUBMIT_TIMEOUT).build().unwrap();
        let outcome = submit(&client, &format!("http://{addr}"), "1 + 1", false).await;
        assert_eq!(outcome, SubmitOutcome::Unavailable);
    }
}
