//! Watch mode - re-index when markdown files change

use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use docsearch::search::{IndexOptions, SearchContext};
use docsearch::{MarkdownCorpus, SearchError};

use super::index::print_report;

const DEBOUNCE: Duration = Duration::from_millis(500);

fn is_relevant(event: &Event) -> bool {
    !matches!(event.kind, EventKind::Access(_))
        && event
            .paths
            .iter()
            .any(|p| p.extension().map(|e| e == "md").unwrap_or(false))
}

/// Block until cancelled, running an incremental index after each burst of changes.
pub async fn run(
    context: &SearchContext,
    corpus: &MarkdownCorpus,
    cancel: &CancellationToken,
    json: bool,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<Event>(256);

    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.blocking_send(event);
            }
        },
        Config::default(),
    )
    .context("Failed to create file watcher")?;
    watcher
        .watch(corpus.root(), RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", corpus.root().display()))?;

    info!(root = %corpus.root().display(), "watching for changes");
    if !json {
        println!();
        println!("{} Watching {} (Ctrl-C to stop)", "→".dimmed(), corpus.root().display());
    }

    let pipeline = context.pipeline();
    let options = IndexOptions::default();

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        if !is_relevant(&event) {
            continue;
        }
        debug!(paths = ?event.paths, "change detected");

        // Let a burst of saves settle, then coalesce it into one run.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(DEBOUNCE) => {}
        }
        while rx.try_recv().is_ok() {}

        match pipeline.run(corpus, &options, cancel).await {
            Ok(report) => {
                if report.indexed > 0 || report.deleted > 0 || !report.is_complete() {
                    print_report(&report, context.config(), json)?;
                }
            }
            Err(e) if matches!(e.root_cause(), SearchError::Cancelled) => break,
            Err(e) if stops_watching(&e) => return Err(e).context("Re-indexing failed"),
            Err(e) => warn!(error = %e, "re-indexing failed, waiting for next change"),
        }
    }

    info!("watch stopped");
    Ok(())
}

/// Errors that the next file change cannot fix.
fn stops_watching(e: &SearchError) -> bool {
    matches!(
        e.root_cause(),
        SearchError::ProviderAuthError { .. }
            | SearchError::ProviderMismatch { .. }
            | SearchError::DimensionConflict { .. }
            | SearchError::Config(_)
    )
}
