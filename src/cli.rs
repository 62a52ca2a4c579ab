use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};

use crate::commands::{self, CommandReport};
use crate::platform::{SearchKindFilter, SearchSort};

#[derive(Parser)]
#[command(name = "notekeep", version, about = "Idempotent, resumable archival of multi-media notes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Archive an explicit list of note URLs
    ArchiveNotes {
        /// Note page URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Archive every note a user has posted
    ArchiveUser {
        /// User profile URL
        user_url: String,
    },
    /// Archive the top results of a search query
    ArchiveSearch {
        query: String,
        /// How many results to archive
        #[arg(long, default_value_t = 20)]
        count: usize,
        /// Result ordering: general, time, or popularity
        #[arg(long, default_value = "general")]
        sort: String,
        /// Result kind: all, video, or image
        #[arg(long, default_value = "all")]
        kind: String,
    },
    /// Re-verify every ledger record against the files on disk, offline
    Verify,
}

fn print_report(report: &CommandReport) -> Result<()> {
    for line in &report.details {
        println!("{line}");
    }
    for line in &report.issues {
        eprintln!("{line}");
    }
    if report.ok {
        println!("{}: ok", report.command);
        Ok(())
    } else {
        bail!("{} finished with {} issue(s)", report.command, report.issues.len());
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let report = match cli.command {
        Command::ArchiveNotes { urls } => commands::archive_notes::run(&urls)?,
        Command::ArchiveUser { user_url } => commands::archive_user::run(&user_url)?,
        Command::ArchiveSearch {
            query,
            count,
            sort,
            kind,
        } => {
            let sort = SearchSort::parse(&sort)
                .ok_or_else(|| anyhow!("--sort must be general, time, or popularity"))?;
            let kind = SearchKindFilter::parse(&kind)
                .ok_or_else(|| anyhow!("--kind must be all, video, or image"))?;
            commands::archive_search::run(&query, count, sort, kind)?
        }
        Command::Verify => commands::verify::run()?,
    };
    print_report(&report)
}
