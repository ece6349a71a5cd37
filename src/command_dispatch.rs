//! Purpose: Hold top-level CLI command dispatch for `tradinghours`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Reports go to stdout, one line per fact, in a stable order.
//! Invariants: Ingestion never starts before the download has completed.

use super::*;

use tradinghours::api::{Catalog, IngestReport, format_timestamp};

pub(super) fn dispatch_command(
    command: Command,
    config: CatalogConfig,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Status { bare } => {
            let source = config.data_source()?;
            let remote = format_timestamp(source.remote_timestamp()?)?;
            let local = match source.local_timestamp()? {
                Some(stamp) => format_timestamp(stamp)?,
                None => "none".to_string(),
            };
            if bare {
                println!("remote: {remote}");
                println!("local: {local}");
            } else {
                println!("TradingHours Data Status:");
                println!("  Remote Timestamp:   {remote}");
                println!("  Local Timestamp:    {local}");
            }
            Ok(RunOutcome::ok())
        }
        Command::Import { force } => {
            let mut catalog = Catalog::open(&config)?;
            if !force && !catalog.source()?.needs_download()? {
                println!("Local data is up-to-date.");
                return Ok(RunOutcome::ok());
            }
            println!("Downloading...");
            catalog.download()?;
            println!("Ingesting...");
            let report = catalog.ingest_all(None)?;
            emit_ingest_summary(&report);
            Ok(RunOutcome::ok())
        }
    }
}

fn emit_ingest_summary(report: &IngestReport) {
    for outcome in &report.outcomes {
        println!("  {}: {} records", outcome.descriptor, outcome.records);
    }
}
