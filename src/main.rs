use clap::{Parser, ValueEnum};
use intentflow::application::collect_data::CollectDataFlow;
use intentflow::application::orchestrator::{TerminalOutcome, TransactionOrchestrator};
use intentflow::application::run_handle::RunHandle;
use intentflow::domain::audit::AuditLog;
use intentflow::domain::cancellation::CancellationToken;
use intentflow::domain::ports::{BackendClientArc, OfflineLogStoreArc, TerminalClientArc};
use intentflow::infrastructure::in_memory::InMemoryOfflineLog;
use intentflow::infrastructure::json_lines::JsonLinesOfflineLog;
#[cfg(feature = "storage-rocksdb")]
use intentflow::infrastructure::rocksdb::RocksDbOfflineLog;
use intentflow::infrastructure::scripted::{ScriptedBackend, ScriptedDelegate, ScriptedTerminal};
use intentflow::interfaces::csv::audit_writer::AuditWriter;
use intentflow::interfaces::json::scenario_reader::ScenarioReader;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario file (JSON) describing the transaction and the scripted reader
    scenario: PathBuf,

    /// Append offline authorizations to this JSON-lines file (optional).
    #[arg(long)]
    offline_log: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, offline records go to RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Output format of the audit trail
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Log level for diagnostics written to stderr
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level when it is set and valid
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("intentflow={}", cli.log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let file = File::open(&cli.scenario).into_diagnostic()?;
    let scenario = ScenarioReader::new(file).scenario().into_diagnostic()?;

    let offline_log = open_offline_log(&cli)?;
    let terminal: TerminalClientArc = Arc::new(ScriptedTerminal::new(scenario.terminal));
    let backend: BackendClientArc = Arc::new(ScriptedBackend::new(scenario.backend));
    let audit = AuditLog::new();

    let mut outcome = None;
    if let Some(params) = scenario.parameters {
        let orchestrator = TransactionOrchestrator::builder()
            .terminal(Arc::clone(&terminal))
            .backend(Arc::clone(&backend))
            .offline_log(Arc::clone(&offline_log))
            .delegate(Arc::new(ScriptedDelegate::new(scenario.delegate)))
            .offline_limits(scenario.offline_limits)
            .audit_log(audit.clone())
            .build()
            .into_diagnostic()?;

        let handle = orchestrator
            .start(params, scenario.config)
            .into_diagnostic()?;
        let cancel_after = scenario.cancel_after_ms.map(Duration::from_millis);
        outcome = Some(wait_for(handle, cancel_after).await.into_diagnostic()?);
    }

    if let Some(config) = scenario.collect_data {
        let flow = CollectDataFlow::new(terminal, backend, audit.clone());
        match flow.run(&config, &CancellationToken::new()).await {
            Ok(collected) => eprintln!("Collected data: {:?}", collected.data),
            Err(e) => eprintln!("Error collecting data: {}", e),
        }
    }

    // Output the audit trail
    let events = audit.snapshot();
    let stdout = io::stdout();
    match cli.format {
        OutputFormat::Csv => {
            let mut writer = AuditWriter::new(stdout.lock());
            writer.write_events(&events).into_diagnostic()?;
        }
        OutputFormat::Json => {
            let mut out = stdout.lock();
            serde_json::to_writer_pretty(&mut out, &events).into_diagnostic()?;
            writeln!(out).into_diagnostic()?;
        }
    }

    if let Some(outcome) = outcome {
        eprintln!("Outcome: {}", outcome);
    }
    let pending = offline_log.records().await.into_diagnostic()?;
    if !pending.is_empty() {
        eprintln!("Offline records pending upload: {}", pending.len());
    }

    Ok(())
}

async fn wait_for(
    handle: RunHandle,
    cancel_after: Option<Duration>,
) -> intentflow::error::Result<TerminalOutcome> {
    if let Some(delay) = cancel_after {
        tokio::time::sleep(delay).await;
        handle.cancel();
    }
    handle.wait().await
}

fn open_offline_log(cli: &Cli) -> Result<OfflineLogStoreArc> {
    if let Some(db_path) = &cli.db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            let store: OfflineLogStoreArc =
                Arc::new(RocksDbOfflineLog::open(db_path).into_diagnostic()?);
            return Ok(store);
        }

        #[cfg(not(feature = "storage-rocksdb"))]
        {
            let _ = db_path;
            let fallback = if cli.offline_log.is_some() {
                "the JSON-lines offline log"
            } else {
                "In-Memory storage"
            };
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to {}.",
                fallback
            );
        }
    }

    let store: OfflineLogStoreArc = match &cli.offline_log {
        Some(path) => Arc::new(JsonLinesOfflineLog::new(path)),
        None => Arc::new(InMemoryOfflineLog::new()),
    };
    Ok(store)
}
