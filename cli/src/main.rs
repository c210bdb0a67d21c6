use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use qr_core::config::ResponderConfig;
use qr_core::error::AppError;
use tracing_subscriber::EnvFilter;

mod commands;
mod render;

#[derive(Parser)]
#[command(name = "qresponder")]
#[command(about = "Answer security questionnaires from your policy documents, with citations")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (default: ./qresponder.toml when present)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Output as JSON")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Load, chunk, embed and index policy documents")]
    Ingest {
        #[arg(long, help = "Directory of documents (default: data_dir from config)")]
        data_dir: Option<PathBuf>,

        #[arg(long = "url", help = "Web page to fetch and index; repeatable")]
        urls: Vec<String>,

        #[arg(long, help = "Discard the existing index before ingesting")]
        rebuild: bool,

        #[arg(long, help = "Parallel document workers (default: batch.workers)")]
        workers: Option<usize>,
    },

    #[command(about = "Answer a single question")]
    Ask {
        #[arg(help = "Question text")]
        question: String,
    },

    #[command(about = "Answer every question in a CSV/XLSX questionnaire")]
    Batch {
        #[arg(long, help = "Questionnaire file (.csv or .xlsx)")]
        input: PathBuf,

        #[arg(long, help = "Answer CSV to write")]
        output: PathBuf,

        #[arg(long, help = "Question column header (default: batch.question_column)")]
        column: Option<String>,

        #[arg(long, help = "Concurrent questions (default: batch.workers)")]
        workers: Option<usize>,
    },

    #[command(about = "Show index status and resolved providers")]
    Status,

    #[command(about = "Check that configured providers are reachable")]
    Health,

    #[command(about = "Manage the verified answer bank")]
    Bank {
        #[command(subcommand)]
        command: BankCommands,
    },
}

#[derive(Subcommand)]
pub enum BankCommands {
    #[command(about = "Import verified answers from CSV (question, answer, product, verified_by, date_added)")]
    Import {
        #[arg(help = "CSV file")]
        csv: PathBuf,
    },

    #[command(about = "List verified answers")]
    List,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: &Cli) -> Result<(), AppError> {
    let cfg = ResponderConfig::load(cli.config.as_deref())?;
    let json = cli.json;
    match &cli.command {
        Commands::Ingest {
            data_dir,
            urls,
            rebuild,
            workers,
        } => {
            let report = commands::ingest(&cfg, data_dir.as_deref(), urls, *rebuild, *workers)?;
            render::ingest(&report, json)
        }
        Commands::Ask { question } => {
            let synthesis = commands::ask(&cfg, question)?;
            render::ask(&synthesis, json)
        }
        Commands::Batch {
            input,
            output,
            column,
            workers,
        } => {
            let report = commands::batch(&cfg, input, output, column.as_deref(), *workers)?;
            render::batch(&report, output, json)
        }
        Commands::Status => render::status(&commands::status(&cfg)?, json),
        Commands::Health => render::health(&commands::health(&cfg), json),
        Commands::Bank { command } => match command {
            BankCommands::Import { csv } => {
                render::bank_import(&commands::bank_import(&cfg, csv)?, json)
            }
            BankCommands::List => render::bank_list(&commands::bank_list(&cfg)?, json),
        },
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(class = ?e.class(), retryable = e.retryable, "command failed");
            render::error(&e, cli.json);
            ExitCode::FAILURE
        }
    }
}
