use std::path::Path;

use anyhow::Result;
use rostersync_core::calendar::{CalendarService, IcsDirCalendar};
use rostersync_core::inspect::{ScanFailure, read_event_types, scan_calendars, scan_window};

use super::Session;
use crate::render::Render;
use crate::utils::response::Response;
use crate::utils::tui::create_spinner;

pub fn run(
    config_path: Option<&Path>,
    from: &str,
    to: &str,
    calendar_ids: Vec<String>,
    json: bool,
) -> Result<()> {
    let session = Session::open(config_path)?;
    let config = session.syncer.config();
    let tz = config.tz()?;
    let window = scan_window(from, to, &tz)?;

    let calendar_ids = if !calendar_ids.is_empty() {
        calendar_ids
    } else if !config.inspect.calendars.is_empty() {
        config.inspect.calendars.clone()
    } else {
        vec![config.calendar_id.clone()]
    };

    let mut opened: Vec<IcsDirCalendar> = Vec::new();
    let mut unopened = Vec::new();
    for id in &calendar_ids {
        match session.calendar(id) {
            Ok(calendar) => opened.push(calendar),
            Err(e) => {
                tracing::warn!(calendar = %id, error = %e, "could not open calendar");
                unopened.push(ScanFailure {
                    calendar: id.clone(),
                    message: format!("{e:#}"),
                });
            }
        }
    }
    if opened.is_empty() {
        anyhow::bail!("None of the calendars could be opened: {}", calendar_ids.join(", "));
    }

    let types = read_event_types(&session.workbook, &config.inspect.event_types_tab)?;
    let calendars: Vec<&dyn CalendarService> =
        opened.iter().map(|c| c as &dyn CalendarService).collect();

    let spinner = create_spinner("Scanning calendars".to_string(), json);
    let result = scan_calendars(&calendars, &window, &types, &tz);
    spinner.finish_and_clear();
    let mut scan = result?;
    scan.failed.extend(unopened);

    if json {
        println!("{}", Response::success(&scan)?);
    } else {
        println!("{}", scan.render());
    }

    Ok(())
}
