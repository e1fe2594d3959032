//! Index command - Build or update the semantic search index

use anyhow::{Context, Result};
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use docsearch::config::{EngineConfig, StoreLocation};
use docsearch::search::{IndexOptions, IndexReport, SearchContext};
use docsearch::MarkdownCorpus;

use super::{cancel_on_ctrl_c, format_timestamp, runtime};

pub struct IndexArgs {
    pub status: bool,
    pub rebuild: bool,
    pub force: bool,
    pub watch: bool,
    pub json: bool,
}

/// Run index command
pub fn run(config: EngineConfig, args: IndexArgs) -> Result<()> {
    if args.status {
        return show_status(&config, args.json);
    }

    if args.watch && !cfg!(feature = "watch") {
        anyhow::bail!("--watch requires docsearch to be built with the `watch` feature");
    }

    runtime()?.block_on(async move {
        let context = SearchContext::open(config.clone()).context("Failed to open search context")?;
        let cancel = cancel_on_ctrl_c();

        if args.rebuild {
            context.clear()?;
            if !args.json {
                println!("{} Removed existing index", "→".dimmed());
            }
        }

        let corpus = MarkdownCorpus::new(&config.content_dir);
        if !args.json {
            println!(
                "{} Indexing {} with {}",
                "→".dimmed(),
                config.content_dir.display(),
                context.provider().provider_tag().cyan()
            );
        }

        let options = IndexOptions {
            force: args.force,
            ..IndexOptions::default()
        };
        let report = context
            .pipeline()
            .run(&corpus, &options, &cancel)
            .await
            .context("Indexing failed")?;
        print_report(&report, &config, args.json)?;

        if args.watch {
            watch(&context, &corpus, &cancel, args.json).await?;
        }

        context.close()?;
        anyhow::Ok(())
    })
}

#[cfg(feature = "watch")]
async fn watch(
    context: &SearchContext,
    corpus: &MarkdownCorpus,
    cancel: &CancellationToken,
    json: bool,
) -> Result<()> {
    super::watch::run(context, corpus, cancel, json).await
}

#[cfg(not(feature = "watch"))]
async fn watch(
    _context: &SearchContext,
    _corpus: &MarkdownCorpus,
    _cancel: &CancellationToken,
    _json: bool,
) -> Result<()> {
    Ok(())
}

pub(crate) fn print_report(report: &IndexReport, config: &EngineConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }

    println!();
    println!(
        "{} Indexed {} documents in {:.2}s",
        if report.is_complete() {
            "✓".green().bold()
        } else {
            "!".yellow().bold()
        },
        report.indexed.to_string().cyan(),
        report.duration_ms as f64 / 1000.0
    );
    if report.unchanged > 0 {
        println!("  {} {} unchanged", "→".dimmed(), report.unchanged);
    }
    if report.deleted > 0 {
        println!("  {} {} removed from index", "→".dimmed(), report.deleted);
    }
    for skipped in &report.skipped {
        println!("  {} skipped {}: {}", "→".dimmed(), skipped.id, skipped.reason.dimmed());
    }
    for failed in &report.failed_batches {
        println!(
            "  {} batch failed ({} documents): {}",
            "✗".red(),
            failed.ids.len(),
            failed.error
        );
        println!("    {}", failed.ids.join(", ").dimmed());
    }
    if let StoreLocation::File(path) = &config.store {
        println!("  {} Index saved to: {}", "→".dimmed(), path.display());
    }
    Ok(())
}

/// Show index status
fn show_status(config: &EngineConfig, json: bool) -> Result<()> {
    if let StoreLocation::File(path) = &config.store {
        if !path.exists() {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "exists": false,
                        "error": "Index not found"
                    })
                );
            } else {
                println!(
                    "{} Index not found. Run {} first.",
                    "!".yellow().bold(),
                    "docsearch index".cyan()
                );
            }
            return Ok(());
        }
    }

    let store = SearchContext::open_store(config)?;
    let stats = store.stats()?;
    let file_size = match &config.store {
        StoreLocation::File(path) => std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        StoreLocation::Memory => 0,
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "exists": true,
                "record_count": stats.record_count,
                "dimension": stats.dimension,
                "provider_tag": stats.provider_tag,
                "configured_provider": config.provider.as_str(),
                "folder_count": stats.folder_count,
                "last_indexed": stats.last_indexed,
                "file_size_bytes": file_size,
            })
        );
        return Ok(());
    }

    println!("{}", "Index Status".bold());
    println!();
    println!(
        "  {} {} documents indexed in {} folders",
        "→".dimmed(),
        stats.record_count.to_string().cyan(),
        stats.folder_count
    );
    if let Some(tag) = &stats.provider_tag {
        println!("  {} Provider: {}", "→".dimmed(), tag);
    }
    if let Some(dimension) = stats.dimension {
        println!("  {} Dimension: {}", "→".dimmed(), dimension);
    }
    println!("  {} Size: {:.2} KB", "→".dimmed(), file_size as f64 / 1024.0);
    if let Some(ts) = stats.last_indexed {
        println!("  {} Last indexed: {}", "→".dimmed(), format_timestamp(ts));
    }
    Ok(())
}
