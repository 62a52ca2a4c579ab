use anyhow::Result;

use crate::commands::{CommandReport, Wiring};
use crate::keep::evaluate::{self, CompletenessReason};
use crate::keep::ledger;

/// Offline audit: re-verify every ledger record against the files on disk.
/// Touches no network and writes nothing.
pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("verify");
    let wiring = Wiring::build()?;

    let mut checked = 0usize;
    let mut complete = 0usize;
    let mut incomplete = 0usize;

    for owner_id in ledger::scan_all_owners(&wiring.paths.ledger_dir)? {
        for record in ledger::read_records(&wiring.paths.ledger_dir, &owner_id)? {
            checked += 1;
            let verdict = evaluate::evaluate(
                &record.note_id,
                Some(&owner_id),
                &wiring.paths.ledger_dir,
                &wiring.paths.media_dir,
                wiring.config.live_video_rule,
            )?;
            if verdict.is_complete {
                complete += 1;
                continue;
            }
            incomplete += 1;
            match verdict.reason {
                CompletenessReason::RecordIncomplete => {
                    // The ledger already says so; nothing to flag.
                }
                CompletenessReason::LedgerFilesystemMismatch => {
                    let missing: Vec<String> =
                        verdict.missing.iter().map(|m| m.to_string()).collect();
                    report.issue(format!(
                        "note {} ({owner_id}): recorded complete but missing {}",
                        record.note_id,
                        missing.join(", ")
                    ));
                }
                reason => {
                    report.issue(format!(
                        "note {} ({owner_id}): recorded complete but {reason:?}",
                        record.note_id
                    ));
                }
            }
        }
    }

    report.detail(format!(
        "{checked} ledger records checked: {complete} verified complete, {incomplete} incomplete"
    ));
    Ok(report)
}
