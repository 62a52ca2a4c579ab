use anyhow::Result;

use crate::commands::{CommandReport, Wiring, parse_note_ref};
use crate::keep::batch;
use crate::platform::MetadataSource;

/// Archive an explicit list of note URLs.
pub fn run(urls: &[String]) -> Result<CommandReport> {
    let mut report = CommandReport::new("archive-notes");
    let wiring = Wiring::build()?;
    let source = wiring.metadata_source()?;

    let mut refs = Vec::new();
    for url in urls {
        match parse_note_ref(url) {
            Ok(note_ref) => refs.push(note_ref),
            Err(err) => report.issue(format!("{err:#}")),
        }
    }
    if refs.is_empty() {
        report.issue("no usable note urls given");
        return Ok(report);
    }

    let outcome = batch::archive_batch(
        &refs,
        |r| source.note_metadata(r),
        &wiring.fetcher,
        wiring.notifier.as_ref(),
        &wiring.cancel,
        &wiring.paths,
        &wiring.config,
        "notes",
    );

    report.detail(format!(
        "{} archived, {} already complete, {} metadata fetches",
        outcome.archived.len(),
        outcome.skipped,
        outcome.metadata_fetches
    ));
    for failed in &outcome.failed {
        report.issue(format!("note {}: {}", failed.note_ref.note_id, failed.error));
    }
    if outcome.cancelled {
        report.issue("run cancelled before all notes were processed");
    }
    Ok(report)
}
