use std::collections::BTreeSet;

use anyhow::Result;

use crate::commands::{CommandReport, Wiring, parse_user_id};
use crate::keep::{batch, ledger};
use crate::platform::MetadataSource;

/// Archive every note a user has posted, announcing the ones that were not
/// in the ledger before this run.
pub fn run(user_url: &str) -> Result<CommandReport> {
    let mut report = CommandReport::new("archive-user");
    let wiring = Wiring::build()?;
    let source = wiring.metadata_source()?;

    let user_id = parse_user_id(user_url)?;
    // Display-name lookup is cosmetic; a failure falls back to the id.
    let display_name = source
        .user_display_name(&user_id)
        .ok()
        .flatten()
        .unwrap_or_else(|| user_id.clone());
    let label = format!("user {display_name}");
    wiring.notifier.startup(&format!("archiving {label}"));

    let refs = source
        .user_notes(&user_id)
        .map_err(|err| anyhow::anyhow!("failed to list notes for {user_id}: {err}"))?;
    report.detail(format!("{} posted notes found for {display_name}", refs.len()));

    // Snapshot which ids the ledger has never seen, before the batch writes.
    let mut new_ids = BTreeSet::new();
    for note_ref in &refs {
        if ledger::lookup(&wiring.paths.ledger_dir, &user_id, &note_ref.note_id)?.is_none() {
            new_ids.insert(note_ref.note_id.clone());
        }
    }

    let outcome = batch::archive_batch(
        &refs,
        |r| source.note_metadata(r),
        &wiring.fetcher,
        wiring.notifier.as_ref(),
        &wiring.cancel,
        &wiring.paths,
        &wiring.config,
        &label,
    );

    let newly_archived: Vec<_> = outcome
        .archived
        .iter()
        .filter(|note| new_ids.contains(&note.note_id))
        .cloned()
        .collect();
    if !newly_archived.is_empty() {
        wiring.notifier.new_notes(&label, &newly_archived);
    }

    report.detail(format!(
        "{} archived ({} new), {} already complete",
        outcome.archived.len(),
        newly_archived.len(),
        outcome.skipped
    ));
    for failed in &outcome.failed {
        report.issue(format!("note {}: {}", failed.note_ref.note_id, failed.error));
    }
    if outcome.cancelled {
        report.issue("run cancelled before all notes were processed");
    }
    Ok(report)
}
