//! Search command - semantic search over the index

use anyhow::{Context, Result};
use colored::Colorize;

use docsearch::config::EngineConfig;
use docsearch::search::{MatchKind, SearchContext, SearchFilter, SearchMode, SearchRequest, SearchResult};

use super::{cancel_on_ctrl_c, runtime, truncate};

const DEFAULT_LIMIT: usize = 5;
const PREVIEW_CHARS: usize = 100;

pub struct SearchArgs {
    pub query: String,
    pub limit: Option<usize>,
    pub folder: Option<String>,
    pub tags: Vec<String>,
    pub hybrid: bool,
    pub json: bool,
}

/// Run search command
pub fn run(config: EngineConfig, args: SearchArgs) -> Result<()> {
    let limit = args.limit.unwrap_or(DEFAULT_LIMIT);
    let filter = SearchFilter {
        folder: args.folder.clone(),
        tags: args.tags.clone(),
    };
    let mode = if args.hybrid {
        SearchMode::Hybrid
    } else {
        SearchMode::Vector
    };
    let request = SearchRequest::new(args.query.clone(), limit)
        .with_filter(filter)
        .with_mode(mode);

    let (results, record_count) = runtime()?.block_on(async {
        let context = SearchContext::open(config).context("Failed to open search context")?;
        let cancel = cancel_on_ctrl_c();
        let results = context
            .query_engine()
            .search_with(&request, &cancel)
            .await
            .context("Search failed")?;
        let record_count = context.stats()?.record_count;
        context.close()?;
        anyhow::Ok((results, record_count))
    })?;

    if args.json {
        let rows: Vec<_> = results.iter().map(SearchResult::to_json_row).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    print_results(&args.query, &results, record_count);
    Ok(())
}

fn print_results(query: &str, results: &[SearchResult], record_count: usize) {
    if results.is_empty() {
        if record_count == 0 {
            println!(
                "{} Index is empty. Run {} first.",
                "!".yellow().bold(),
                "docsearch index".cyan()
            );
        } else {
            println!("{} No results found for: {}", "→".dimmed(), query.cyan());
        }
        return;
    }

    println!("{} {} results for: {}", "→".dimmed(), results.len(), query.cyan());
    println!();

    for (i, result) in results.iter().enumerate() {
        let score_str = format!("{:.4}", result.similarity);
        let score_colored = if result.similarity > 0.8 {
            score_str.green()
        } else if result.similarity > 0.6 {
            score_str.yellow()
        } else {
            score_str.dimmed()
        };
        let marker = match result.match_kind {
            MatchKind::Vector => String::new(),
            MatchKind::Keyword => format!(" {}", "(keyword)".dimmed()),
        };

        println!(
            "{}. [{}] {}{}",
            (i + 1).to_string().bold(),
            score_colored,
            result.document.title.cyan(),
            marker
        );
        println!("   {}", result.id().dimmed());

        let preview = truncate(&result.document.body, PREVIEW_CHARS);
        if !preview.is_empty() {
            println!("   {}", preview);
        }
        if !result.document.tags.is_empty() {
            println!("   #{}", result.document.tags.join(" #").dimmed());
        }
        println!();
    }
}
