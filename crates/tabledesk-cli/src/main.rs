//! tabledesk command-line client
//!
//! Administers the tables of a database file through the tabledesk engine:
//! role-checked browsing and editing with every change audited.

mod commands;
mod executor;
mod formatter;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use commands::Command;
use formatter::OutputFormat;
use tabledesk_core::{Engine, EngineConfig};
use tracing_subscriber::EnvFilter;

/// tabledesk command-line client
#[derive(Parser, Debug)]
#[command(name = "tabledesk")]
#[command(version, about = "Schema-agnostic table administration")]
pub struct Args {
    /// Database file
    #[arg(short, long, default_value = "tabledesk.db")]
    pub database: PathBuf,

    /// Create the database file when it does not exist
    #[arg(long)]
    pub create: bool,

    /// Acting subject; empty means anonymous
    #[arg(short = 'u', long, default_value = "")]
    pub subject: String,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Rows per page when a command does not say
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Largest batch accepted by import and truncate
    #[arg(long)]
    pub max_batch: Option<usize>,

    /// Comma-separated table name patterns to hide
    #[arg(long)]
    pub blocklist: Option<String>,

    /// Seconds to wait on a locked database
    #[arg(long, default_value_t = 5)]
    pub busy_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Engine configuration for these arguments.
    pub fn into_config(&self) -> EngineConfig {
        let mut config = EngineConfig::file(&self.database)
            .with_create_if_missing(self.create)
            .with_busy_timeout(Duration::from_secs(self.busy_timeout));
        if let Some(size) = self.page_size {
            config = config.with_default_page_size(size);
        }
        if let Some(limit) = self.max_batch {
            config = config.with_max_batch_size(limit);
        }
        if let Some(patterns) = &self.blocklist {
            config = config.with_table_blocklist(patterns);
        }
        config
    }
}

fn main() {
    // Logs go to stderr so stdout stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tabledesk=info,tabledesk_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let formatter = formatter::create_formatter(args.format);

    let result = Engine::open(args.into_config())
        .map_err(executor::CliError::from)
        .and_then(|engine| executor::execute(&engine, &args.subject, args.command, &*formatter));

    match result {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            eprintln!("{}", formatter.format_error(&e.to_string()));
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabledesk_core::DatabaseLocation;

    #[test]
    fn test_args_into_config() {
        let args = Args::parse_from([
            "tabledesk",
            "--database",
            "/tmp/shop.db",
            "--create",
            "--page-size",
            "20",
            "--blocklist",
            "tmp_,secret",
            "browse",
            "orders",
            "--where",
            "total:gte:100",
            "--sort",
            "created_at:desc",
        ]);
        let config = args.into_config();
        assert_eq!(config.location, DatabaseLocation::File("/tmp/shop.db".into()));
        assert!(config.create_if_missing);
        assert_eq!(config.default_page_size, 20);
        assert!(config.is_blocked("tmp_orders"));
        assert!(matches!(args.command, Command::Browse { .. }));
    }

    #[test]
    fn test_key_is_required() {
        assert!(Args::try_parse_from(["tabledesk", "view", "orders"]).is_err());
        assert!(Args::try_parse_from(["tabledesk", "view", "orders", "-k", "id=1"]).is_ok());
    }
}
