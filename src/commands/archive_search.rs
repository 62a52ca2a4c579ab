use anyhow::Result;

use crate::commands::{CommandReport, Wiring};
use crate::keep::batch;
use crate::platform::{MetadataSource, SearchKindFilter, SearchSort};

/// Archive the top results of a search query.
pub fn run(
    query: &str,
    count: usize,
    sort: SearchSort,
    kind: SearchKindFilter,
) -> Result<CommandReport> {
    let mut report = CommandReport::new("archive-search");
    let wiring = Wiring::build()?;
    let source = wiring.metadata_source()?;

    let refs = source
        .search_notes(query, count, sort, kind)
        .map_err(|err| anyhow::anyhow!("search for {query:?} failed: {err}"))?;
    report.detail(format!("{} results for {query:?}", refs.len()));
    if refs.is_empty() {
        return Ok(report);
    }

    let label = format!("search {query:?}");
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
