//! Colored terminal rendering for rostersync-core types.

use owo_colors::OwoColorize;
use rostersync_core::commit::CommitStats;
use rostersync_core::diff::{DiffField, FieldDiff, SyncProposal, SyncStatus};
use rostersync_core::exam::ExamStats;
use rostersync_core::inspect::{CalendarScan, InspectedEvent};
use rostersync_core::sync::{Preview, SkippedRow};

pub trait Render {
    fn render(&self) -> String;
}

impl Render for SyncStatus {
    fn render(&self) -> String {
        let symbol = self.to_string();
        match self {
            SyncStatus::New => symbol.green().to_string(),
            SyncStatus::Update => symbol.yellow().to_string(),
            SyncStatus::Synced => symbol.dimmed().to_string(),
        }
    }
}

fn colorize_status(status: SyncStatus, text: &str) -> String {
    match status {
        SyncStatus::New => text.green().to_string(),
        SyncStatus::Update => text.yellow().to_string(),
        SyncStatus::Synced => text.to_string(),
    }
}

impl Render for SyncProposal {
    fn render(&self) -> String {
        let title = colorize_status(self.status, self.title());
        format!("{} {} {}", self.status.render(), title, self.row_id.dimmed())
    }
}

impl Render for FieldDiff {
    fn render(&self) -> String {
        match self.field {
            DiffField::AddGuest => self.description.green().to_string(),
            DiffField::RemoveGuest => self.description.red().to_string(),
            _ => self.description.dimmed().to_string(),
        }
    }
}

impl Render for SkippedRow {
    fn render(&self) -> String {
        let id = self.row_id.as_deref().unwrap_or("no id");
        format!(
            "{} row {} ({}): {}",
            "!".red(),
            self.sheet_row + 1,
            id,
            self.reason.red()
        )
    }
}

/// Above this many pending rows, show counts unless verbose.
const COMPACT_THRESHOLD: usize = 5;

fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

fn render_proposal_list(proposals: &[&SyncProposal], verbose: bool, lines: &mut Vec<String>) {
    if verbose || proposals.len() <= COMPACT_THRESHOLD {
        for proposal in proposals {
            lines.push(format!("   {}", proposal.render()));
            lines.extend(proposal.diffs.iter().map(|d| format!("      {}", d.render())));
        }
    } else {
        let count = |status: SyncStatus| proposals.iter().filter(|p| p.status == status).count();
        let (new, update) = (count(SyncStatus::New), count(SyncStatus::Update));

        if new > 0 {
            let label = format!("({} new {})", new, pluralize("row", new));
            lines.push(format!("   {} {}", "+".green(), label.green()));
        }
        if update > 0 {
            let label = format!("({} changed {})", update, pluralize("row", update));
            lines.push(format!("   {} {}", "~".yellow(), label.yellow()));
        }
    }
}

pub trait PreviewRender {
    fn render(&self, verbose: bool) -> String;
}

impl PreviewRender for Preview {
    fn render(&self, verbose: bool) -> String {
        let pending: Vec<&SyncProposal> = self
            .proposals
            .iter()
            .filter(|p| p.status != SyncStatus::Synced)
            .collect();
        let synced = self.count(SyncStatus::Synced);

        let mut lines = Vec::new();
        if pending.is_empty() {
            lines.push("   No changes".dimmed().to_string());
        } else {
            render_proposal_list(&pending, verbose, &mut lines);
        }

        if synced > 0 {
            let label = format!("   {} {} in step", synced, pluralize("row", synced));
            lines.push(label.dimmed().to_string());
            if verbose {
                let notes = self
                    .proposals
                    .iter()
                    .filter(|p| p.status == SyncStatus::Synced && !p.diffs.is_empty());
                for proposal in notes {
                    lines.push(format!("   {}", proposal.render()));
                    lines.extend(proposal.diffs.iter().map(|d| format!("      {}", d.render())));
                }
            }
        }

        if !self.skipped.is_empty() {
            lines.push(String::new());
            lines.extend(self.skipped.iter().map(|s| format!("   {}", s.render())));
        }

        lines.join("\n")
    }
}

impl Render for CommitStats {
    fn render(&self) -> String {
        let mut lines = vec![format!(
            "Committed: {} created, {} updated, {} rebuilt, {} unchanged",
            self.created, self.updated, self.rebuilt, self.unchanged
        )];
        if self.errors > 0 {
            lines.push(
                format!("{} {} failed", self.errors, pluralize("row", self.errors))
                    .red()
                    .to_string(),
            );
            lines.extend(
                self.failures
                    .iter()
                    .map(|f| format!("   {} {}: {}", "!".red(), f.row_id, f.message)),
            );
        }
        lines.join("\n")
    }
}

impl Render for ExamStats {
    fn render(&self) -> String {
        let mut line = format!(
            "Exams: {} created, {} updated, {} skipped",
            self.created, self.updated, self.skipped
        );
        if self.errors > 0 {
            let failed = format!(", {} failed", self.errors);
            line.push_str(&failed.red().to_string());
        }
        line
    }
}

impl Render for InspectedEvent {
    fn render(&self) -> String {
        format!(
            "{} {} {} {}",
            self.local_time,
            self.title,
            format!("[{}]", self.category).cyan(),
            self.calendar.dimmed()
        )
    }
}

impl Render for CalendarScan {
    fn render(&self) -> String {
        let mut lines: Vec<String> =
            self.events.iter().map(|e| format!("   {}", e.render())).collect();
        if lines.is_empty() {
            lines.push("   No events".dimmed().to_string());
        }

        lines.push(String::new());
        let count = self.events.len();
        lines.push(format!("{} {}", count, pluralize("event", count)).bold().to_string());
        for (category, minutes) in self.minutes_by_category() {
            lines.push(format!("   {category}: {:.1} h", minutes as f64 / 60.0));
        }

        lines.extend(
            self.failed
                .iter()
                .map(|f| format!("{} {}: {}", "!".red(), f.calendar, f.message.red())),
        );
        lines.join("\n")
    }
}
