use anyhow::{bail, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use shared::domain::{
    AchFileId, BatchId, EntryId, NewReturn, ReturnId, ReturnStatus, ReturnType,
};
use storage::{Storage, TransitionOutcome};
use tracing::info;

mod daemon;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/achdesk.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Registers a received ACH file.
    CreateFile { filename: String },
    CreateBatch {
        file_id: i64,
        batch_number: String,
        company_name: String,
    },
    CreateEntry {
        batch_id: i64,
        trace_number: String,
        amount_cents: i64,
    },
    /// Records a return or NOC handed over by the file parser.
    Ingest {
        return_code: String,
        /// `return` or `noc`
        return_type: String,
        trace_number: String,
        individual_name: String,
        #[arg(long)]
        amount_cents: Option<i64>,
        #[arg(long)]
        return_date: Option<NaiveDate>,
        #[arg(long)]
        entry_id: Option<i64>,
        #[arg(long)]
        file_id: Option<i64>,
    },
    /// Moves a return along its lifecycle.
    Advance { return_id: i64, status: String },
    /// Runs the maintenance tasks once.
    Daemon {
        #[arg(long, default_value_t = 30)]
        retention_days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateFile { filename } => {
            let file_id = storage.create_ach_file(&filename, Utc::now()).await?;
            println!("created file_id={}", file_id.0);
        }
        Command::CreateBatch {
            file_id,
            batch_number,
            company_name,
        } => {
            let batch_id = storage
                .create_batch(AchFileId(file_id), &batch_number, &company_name)
                .await?;
            println!("created batch_id={}", batch_id.0);
        }
        Command::CreateEntry {
            batch_id,
            trace_number,
            amount_cents,
        } => {
            let entry_id = storage
                .create_entry(BatchId(batch_id), &trace_number, amount_cents)
                .await?;
            println!("created entry_id={}", entry_id.0);
        }
        Command::Ingest {
            return_code,
            return_type,
            trace_number,
            individual_name,
            amount_cents,
            return_date,
            entry_id,
            file_id,
        } => {
            let record = storage
                .insert_return(&NewReturn {
                    return_code,
                    return_type: return_type.parse::<ReturnType>()?,
                    original_trace_number: trace_number,
                    original_amount_cents: amount_cents,
                    individual_name,
                    return_date,
                    entry_id: entry_id.map(EntryId),
                    file_id: file_id.map(AchFileId),
                    created_at: Utc::now(),
                })
                .await?;
            info!(return_id = %record.id, code = %record.return_code, "return ingested");
            println!("created return_id={}", record.id.0);
        }
        Command::Advance { return_id, status } => {
            let to = status.parse::<ReturnStatus>()?;
            match storage.advance_status(ReturnId(return_id), to).await? {
                TransitionOutcome::Applied(record) | TransitionOutcome::Unchanged(record) => {
                    println!("return_id={} status={}", record.id.0, record.status);
                }
                TransitionOutcome::Rejected { error, .. } => bail!(error),
                TransitionOutcome::NotFound => bail!("return {return_id} not found"),
            }
        }
        Command::Daemon { retention_days } => {
            let reports =
                daemon::run_once(&storage, &daemon::default_tasks(retention_days), Utc::now())
                    .await;
            let failed = reports.iter().filter(|r| !r.succeeded()).count();
            for report in &reports {
                match &report.outcome {
                    Ok(summary) => println!("{}: ok ({summary})", report.name),
                    Err(err) => println!("{}: failed ({err})", report.name),
                }
            }
            if failed > 0 {
                bail!("{failed} maintenance task(s) failed");
            }
        }
    }

    Ok(())
}
