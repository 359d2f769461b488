//! Reconciliation run output.

use crate::cli::presentation::shared::format_section_heading;
use crate::reconcile::{EntryOutcome, ReconcileResult, ReconcileSummary};
use comfy_table::Table;
use owo_colors::OwoColorize;

/// One-line, user-facing description of a run.
pub fn summary_message(result: &ReconcileResult) -> String {
    match result.summary {
        ReconcileSummary::NoOp | ReconcileSummary::AllAlreadyOpen => {
            "All tabs are already open and pinned".to_string()
        }
        ReconcileSummary::Mixed => format!(
            "{} tab(s) pinned, {} new tab(s) created",
            result.pinned_now, result.opened
        ),
        ReconcileSummary::SomePinned => format!("{} tab(s) were pinned", result.pinned_now),
        ReconcileSummary::SomeOpened if result.already_open_or_skipped > 0 => format!(
            "{} tab(s) already open, {} new tab(s) created",
            result.already_open_or_skipped, result.opened
        ),
        ReconcileSummary::SomeOpened => "Tabs opened successfully".to_string(),
    }
}

fn outcome_label(outcome: EntryOutcome) -> String {
    match outcome {
        EntryOutcome::Opened => format!("{}", "opened".green()),
        EntryOutcome::Pinned => format!("{}", "pinned".green()),
        EntryOutcome::AlreadyOpen => "already open".to_string(),
        EntryOutcome::RecentlyHandled => format!("{}", "recently handled".dimmed()),
        EntryOutcome::Duplicate => format!("{}", "duplicate".dimmed()),
        EntryOutcome::PinFailed => format!("{}", "pin failed".yellow()),
        EntryOutcome::OpenFailed => format!("{}", "open failed".red()),
    }
}

pub fn format_reconcile_text(result: &ReconcileResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", format_section_heading("Open Tabs")));

    if !result.entries.is_empty() {
        let mut table = Table::new();
        table.load_preset(comfy_table::presets::UTF8_FULL);
        table.set_header(vec!["Tab", "Outcome", "Live Tab", "Error"]);
        for entry in &result.entries {
            let label = if entry.title.is_empty() {
                entry.url.clone()
            } else {
                entry.title.clone()
            };
            let live = entry
                .live_tab_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            table.add_row(vec![
                label,
                outcome_label(entry.outcome),
                live,
                entry.error.clone().unwrap_or_default(),
            ]);
        }
        out.push_str(&format!("{}\n", table));
    }

    out.push_str(&format!(
        "Opened: {}  Pinned: {}  Already open/skipped: {}  Failed: {}\n",
        result.opened, result.pinned_now, result.already_open_or_skipped, result.failed
    ));
    if result.failed > 0 {
        out.push_str(&format!("{}", summary_message(result).yellow()));
    } else {
        out.push_str(&format!("{}", summary_message(result).green()));
    }
    if !result.last_opened_persisted {
        out.push_str(&format!(
            "\n{}",
            "Warning: could not record the last-opened time".yellow()
        ));
    }
    out
}
