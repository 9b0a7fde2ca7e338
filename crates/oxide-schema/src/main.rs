//! oxide-schema CLI
//!
//! Command-line tool that replays schema change scripts and prints the
//! planned migration SQL.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_schema::{load_dialect, plan_file};
use oxide_schema_core::DialectKind;

/// Plans schema changes into dialect-specific DDL.
#[derive(Parser)]
#[command(name = "oxide-schema")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Target dialect.
    #[arg(short, long, value_enum, default_value_t = DialectArg::Sqlite)]
    dialect: DialectArg,

    /// JSON dialect configuration overriding built-in capabilities.
    #[arg(long)]
    dialect_config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Sqlite,
    Postgres,
}

impl From<DialectArg> for DialectKind {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Sqlite => Self::Sqlite,
            DialectArg::Postgres => Self::Postgres,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a change script and print the planned SQL.
    Plan {
        /// Path to the JSON script.
        script: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let dialect = load_dialect(cli.dialect.into(), cli.dialect_config.as_deref())?;
    info!(dialect = dialect.kind().name(), "Using dialect");

    match cli.command {
        Commands::Plan { script } => {
            let sql = plan_file(&script, dialect)?;
            if sql.is_empty() {
                info!("No changes to apply.");
            } else {
                print!("{sql}");
            }
        }
    }

    Ok(())
}
