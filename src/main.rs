// 🚀 roster-sync - run one CSV import against the roster service
// Reads the config, sets up logging, executes the run, prints the summary.

use anyhow::Result;
use clap::Parser;
use roster_sync::config::DEFAULT_CONFIG_FILE;
use roster_sync::{logging, CsvRecordSource, HttpRemote, ImportConfig, ImportError, ImportRun, Reporter, RunSummary};
use std::path::PathBuf;
use tracing::{error, info_span};

#[derive(Debug, Parser)]
#[command(name = "roster-sync", version, about = "Import CSV records into the roster service")]
struct Cli {
    /// Config file (JSON)
    #[arg(default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Print the run summary as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Directory for the log file (overrides `log_dir` in the config)
    #[arg(long, env = "ROSTER_SYNC_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("❌ {:#}", err);
        if let Some(body) = err
            .downcast_ref::<ImportError>()
            .and_then(ImportError::response_body)
        {
            eprintln!("Response:");
            eprintln!("{}", body);
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = ImportConfig::from_file(&cli.config)?;

    let log_dir = cli.log_dir.clone().unwrap_or_else(|| config.log_dir());
    let _guard = logging::init(&log_dir)?;

    let reporter = if cli.json {
        Reporter::log_only(config.identifier.clone())
    } else {
        Reporter::new(config.identifier.clone())
    };

    let run = ImportRun::new(config.plan()?);
    let span = info_span!("csv_import", operation_id = %run.operation_id());
    let _enter = span.enter();

    reporter.line("------ Begin csv_import ------");

    let summary = match import(&config, run, &reporter) {
        Ok(summary) => summary,
        Err(err) => {
            error!(kind = %err.kind(), "{}", err);
            if let Some(body) = err.response_body() {
                error!("response body: {}", body);
            }
            return Err(err.into());
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    reporter.lines(summary.render());
    reporter.line("------ End csv_import ------");

    Ok(())
}

fn import(config: &ImportConfig, run: ImportRun, reporter: &Reporter) -> Result<RunSummary, ImportError> {
    let mut remote = HttpRemote::new(&config.uri, config.timeout())?;
    let mut source = CsvRecordSource::from_path(&config.import_csv, config.import_csv_header)?;
    run.execute(&mut source, &mut remote, reporter)
}
