//! `rapina`: drives updates of the local store

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rapina::codec::{dates, Clock, SystemClock};
use rapina::{Config, Error, Orchestrator, Store};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download and ingest public sources
    Get(GetArgs),
    /// Fetch dividend reports of real-estate funds
    Fii {
        /// Trading codes, e.g. ALMI11
        #[arg(required = true)]
        codes: Vec<String>,

        /// Months of reports to fetch
        #[arg(short, long, default_value_t = 1)]
        months: usize,
    },
    /// Closing price of a ticker on a date (YYYY-MM-DD)
    Quote { ticker: String, date: String },
    /// Row counts per table
    Status,
}

#[derive(Args, Debug)]
struct GetArgs {
    /// Everything below
    #[arg(short, long)]
    all: bool,
    /// Annual statements (DFP)
    #[arg(long)]
    annual: bool,
    /// Quarterly statements (ITR)
    #[arg(long)]
    quarterly: bool,
    /// Reference form (FRE)
    #[arg(long)]
    reference: bool,
    /// B3 instrument catalog
    #[arg(long)]
    catalog: bool,
    /// B3 sector classification
    #[arg(long)]
    sectors: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rapina=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            println!("[x] {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:?}", e);
            println!("[x] {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env();
    let store = Store::open(&config.database_path()).await?;
    let orchestrator = Orchestrator::new(store, config, Arc::new(SystemClock))?;

    // Dropping the command future rolls back the open transaction
    tokio::select! {
        outcome = execute(&orchestrator, cli.command) => outcome,
        _ = tokio::signal::ctrl_c() => Err(Error::Cancelled.into()),
    }
}

async fn execute(orchestrator: &Orchestrator, command: Command) -> Result<()> {
    match command {
        Command::Get(args) => get(orchestrator, args).await,
        Command::Fii { codes, months } => {
            let fii = orchestrator.fii();
            for code in codes {
                let stats = fii.dividends(&code, months).await?;
                println!("[✓] {}: {} proventos novos", code.to_uppercase(), stats.inserted);
            }
            Ok(())
        }
        Command::Quote { ticker, date } => {
            let day: NaiveDate = dates::parse_iso(&date)
                .ok_or_else(|| Error::InvalidInput(format!("data {}", date)))?;
            let close = orchestrator.quotes().quote(&ticker, day).await?;
            println!("{} {} {:.2}", ticker.to_uppercase(), day, close);
            Ok(())
        }
        Command::Status => {
            for (table, rows) in orchestrator.store().counts().await? {
                println!("{:<16} {:>12}", table, rows);
            }
            Ok(())
        }
    }
}

async fn get(orchestrator: &Orchestrator, args: GetArgs) -> Result<()> {
    if args.all {
        let report = orchestrator.update_all().await?;
        info!(
            "✅ DFP {:?}, ITR {:?}, FRE {:?}",
            report.annual.ingested, report.quarterly.ingested, report.reference.ingested
        );
        return Ok(());
    }

    let nothing_selected =
        !(args.annual || args.quarterly || args.reference || args.catalog || args.sectors);
    if nothing_selected {
        return Err(Error::InvalidInput("escolha --all ou uma das fontes".into()).into());
    }

    if args.annual {
        orchestrator.update_annual().await?;
    }
    if args.quarterly {
        orchestrator.update_quarterly().await?;
    }
    if args.reference {
        orchestrator.update_reference_form().await?;
    }
    if args.catalog {
        orchestrator.update_catalog(SystemClock.today()).await?;
    }
    if args.sectors {
        let path = orchestrator.update_sectors().await?;
        println!("[✓] {}", path.display());
    }
    Ok(())
}
