use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;
use rostersync_core::exam::{ExamSheet, check_exam_on_calendar, read_exam_sheet, sync_exams};
use serde::Serialize;

use super::Session;
use crate::render::Render;
use crate::utils::response::Response;
use crate::utils::tui::create_spinner;

#[derive(Serialize)]
struct ExamCheck {
    tab: String,
    title: String,
    on_calendar: bool,
}

pub fn run(config_path: Option<&Path>, check: bool, json: bool) -> Result<()> {
    let session = Session::open(config_path)?;
    let config = session.syncer.config();

    if config.exams.tabs.is_empty() {
        anyhow::bail!(
            "No exam tabs configured. Add tab names to `exams.tabs` in the sync settings."
        );
    }
    let Some(calendar_id) = config.exams.calendar_id.as_deref() else {
        anyhow::bail!("No exam calendar configured. Set `exams.calendar_id` in the sync settings.");
    };

    let mut sheets: Vec<ExamSheet> = Vec::new();
    for tab in &config.exams.tabs {
        if let Some(sheet) = read_exam_sheet(&session.workbook, tab)? {
            sheets.push(sheet);
        }
    }

    let tz = config.tz()?;
    let mut calendar = session.calendar(calendar_id)?;

    if check {
        let mut checks = Vec::new();
        for sheet in &sheets {
            for exam in &sheet.exams {
                checks.push(ExamCheck {
                    tab: sheet.tab.clone(),
                    title: exam.title(&sheet.course),
                    on_calendar: check_exam_on_calendar(&calendar, &sheet.course, exam, &tz)?,
                });
            }
        }

        if json {
            println!("{}", Response::success(&checks)?);
            return Ok(());
        }
        for item in &checks {
            let mark = if item.on_calendar {
                "=".dimmed().to_string()
            } else {
                "+".green().to_string()
            };
            println!("{} {} {}", mark, item.title, item.tab.dimmed());
        }
        return Ok(());
    }

    let spinner = create_spinner("Syncing exams".to_string(), json);
    let result = sync_exams(&sheets, &mut calendar, &config.exams, &tz);
    spinner.finish_and_clear();
    let stats = result?;

    if json {
        println!("{}", Response::success(&stats)?);
    } else {
        println!("{}", stats.render());
    }

    Ok(())
}
