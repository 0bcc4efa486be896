//! fourd: operator tool for the legacy 4D ERP REST endpoint
//!
//! Fetches tables and records, pushes single fields, and inspects or clears
//! the persisted session cookies. Uses the same session pool, retry policy
//! and session-limit breaker as the library.

use std::path::Path;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use fourd_client::{FetchOptions, LegacyConfig, LegacyContext, StoredCookie};
use serde_json::{json, Value};
use tracing::info;

#[derive(Parser)]
#[command(name = "fourd")]
#[command(about = "Talk to the legacy 4D ERP REST endpoint")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "FOURD_CONFIG", default_value = "fourd.toml")]
    config: String,

    /// Environment to use (overrides config file)
    #[arg(short, long, env = "FOURD_ENV")]
    env: Option<String>,

    /// Base URL for the selected environment (overrides config file)
    #[arg(long, env = "FOURD_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch all rows of a table
    Fetch {
        table: String,

        /// Page size
        #[arg(long)]
        top: Option<u32>,

        /// Starting offset
        #[arg(long, default_value_t = 0)]
        skip: u32,

        /// Only rows not yet synchronized
        #[arg(long)]
        new_only: bool,

        /// Only rows created on or after this date (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,

        /// Raw $filter expression
        #[arg(long)]
        filter: Option<String>,

        /// Print an empty result instead of failing when the server is down
        #[arg(long)]
        lenient: bool,
    },

    /// Fetch one record
    Record { table: String, id: String },

    /// Write one field of a record
    Push {
        table: String,
        id: String,
        field: String,
        /// JSON value; bare words are sent as strings
        value: String,
    },

    /// Inspect or clear the persisted session
    #[command(subcommand)]
    Session(SessionCommand),
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Show whether a session cookie is persisted
    Status,
    /// Forget the session cookie
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fourd=info".parse()?)
                .add_directive("fourd_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let environment = config.default_environment.clone();
    let ctx = LegacyContext::new(config)?;

    match cli.command {
        Command::Fetch {
            table,
            top,
            skip,
            new_only,
            since,
            filter,
            lenient,
        } => {
            let options = FetchOptions {
                top,
                skip,
                new_data_only: new_only,
                date_created_start: since,
                filter_query: filter,
            };
            let client = ctx.client(&environment)?;
            let result = if lenient {
                client.fetch_table_or_empty(&table, &options).await?
            } else {
                client.fetch_table(&table, &options).await?
            };
            info!(table = %table, rows = result.len(), total = result.total_count, "Fetched");
            print_json(&serde_json::to_value(&result.records)?)?;
        }
        Command::Record { table, id } => {
            let record = ctx.client(&environment)?.fetch_record(&table, &id).await?;
            print_json(&Value::Object(record))?;
        }
        Command::Push {
            table,
            id,
            field,
            value,
        } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let accepted = ctx
                .client(&environment)?
                .push_field(&table, &id, &field, value)
                .await?;
            print_json(&json!({ "accepted": accepted }))?;
        }
        Command::Session(SessionCommand::Status) => {
            let session = ctx.pool().get_session(&environment)?;
            let stored = session.load_persisted().await?;
            let path = ctx.pool().store().path_for(&environment);
            print_json(&session_status(&environment, stored.as_ref(), &path))?;
        }
        Command::Session(SessionCommand::Clear) => {
            ctx.pool().invalidate_session(&environment).await?;
            info!(environment = %environment, "Session cleared");
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<LegacyConfig> {
    let mut config = if Path::new(&cli.config).exists() {
        info!("Config file: {}", cli.config);
        LegacyConfig::from_file(&cli.config)?
    } else {
        info!("Config file not found, using defaults");
        LegacyConfig::default()
    };

    if let Some(env) = &cli.env {
        config.default_environment = env.clone();
    }
    if let Some(base_url) = &cli.base_url {
        let environment = config.default_environment.clone();
        config = config.with_environment(environment, base_url.clone());
    }

    Ok(config)
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn session_status(environment: &str, stored: Option<&StoredCookie>, path: &Path) -> Value {
    match stored {
        Some(stored) => json!({
            "environment": environment,
            "persisted": true,
            "cookie_name": stored.name,
            "created_at": stored.created_at,
            "path": path.display().to_string(),
        }),
        None => json!({
            "environment": environment,
            "persisted": false,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stored() -> StoredCookie {
        StoredCookie {
            name: "WASID4D".to_string(),
            value: "secret".to_string(),
            created_at: Utc::now(),
            environment: "live".to_string(),
        }
    }

    #[test]
    fn test_status_never_prints_cookie_value() {
        let status = session_status("live", Some(&stored()), Path::new("/tmp/live.session.json"));
        assert_eq!(status["persisted"], true);
        assert_eq!(status["path"], "/tmp/live.session.json");
        assert!(!status.to_string().contains("secret"));

        let status = session_status("test", None, Path::new("/tmp/test.session.json"));
        assert_eq!(status["persisted"], false);
    }

    #[cfg(unix)]
    #[test]
    fn test_status_with_non_utf8_path() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"/tmp/sessions-\xff/live.session.json"));
        let status = session_status("live", Some(&stored()), path);
        assert!(status["path"].as_str().unwrap().starts_with("/tmp/sessions-"));
    }
}
