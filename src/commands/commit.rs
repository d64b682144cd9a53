use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;
use rostersync_core::commit::{CommitStats, Selection};
use rostersync_core::diff::{DiffField, SyncProposal};
use rostersync_core::sync::SkippedRow;
use serde::Serialize;

use super::Session;
use crate::render::{PreviewRender, Render};
use crate::utils::response::Response;
use crate::utils::tui::create_spinner;

#[derive(Serialize)]
struct CommitReport<'a> {
    proposals: &'a [SyncProposal],
    skipped: &'a [SkippedRow],
    stats: &'a CommitStats,
}

pub fn run(
    config_path: Option<&Path>,
    only: Vec<String>,
    skip: Vec<String>,
    verbose: bool,
    json: bool,
) -> Result<()> {
    let skip = skip
        .iter()
        .map(|s| s.parse::<DiffField>())
        .collect::<Result<Vec<_>, _>>()?;
    let selection = if only.is_empty() {
        Selection::All
    } else {
        Selection::rows(only)
    };

    let mut session = Session::open(config_path)?;
    let mut calendar = session.sync_calendar()?;

    let spinner = create_spinner("Syncing".to_string(), json);
    let result = session.syncer.sync_skipping(
        &mut session.workbook,
        &mut calendar,
        &selection,
        &skip,
    );
    spinner.finish_and_clear();
    let (preview, stats) = result?;

    if json {
        let report = CommitReport {
            proposals: &preview.proposals,
            skipped: &preview.skipped,
            stats: &stats,
        };
        println!("{}", Response::success(&report)?);
        return Ok(());
    }

    println!("{}", preview.render(verbose));
    println!("\n{}", stats.render());
    if stats.errors > 0 {
        println!(
            "{}",
            "Failed rows are left as they were; run commit again to retry.".dimmed()
        );
    }

    Ok(())
}
