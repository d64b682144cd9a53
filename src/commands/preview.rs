use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;

use super::Session;
use crate::render::PreviewRender;
use crate::utils::response::Response;
use crate::utils::tui::create_spinner;

pub fn run(config_path: Option<&Path>, verbose: bool, json: bool) -> Result<()> {
    let mut session = Session::open(config_path)?;
    let calendar = session.sync_calendar()?;

    let tab = session.syncer.config().source_tab.clone();
    let spinner = create_spinner(format!("Reading {tab}"), json);
    let result = session.syncer.preview(&mut session.workbook, &calendar);
    spinner.finish_and_clear();
    let preview = result?;

    if json {
        println!("{}", Response::success(&preview)?);
        return Ok(());
    }

    println!("📅 {}", tab.bold());
    println!("{}", preview.render(verbose));

    if !preview.is_synced() {
        println!("\nRun `rostersync commit` to apply these changes.");
    }

    Ok(())
}
