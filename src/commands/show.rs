//! Show command - print one indexed document

use anyhow::Result;
use colored::Colorize;

use docsearch::config::EngineConfig;
use docsearch::search::SearchContext;

pub fn run(config: &EngineConfig, id: &str, json: bool) -> Result<()> {
    let store = SearchContext::open_store(config)?;
    let document = store.require_by_id(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!("{}", document.title.bold().cyan());
    println!("{} {}", "id:".dimmed(), document.id);
    if let Some(folder) = &document.folder {
        println!("{} {}", "folder:".dimmed(), folder);
    }
    if !document.tags.is_empty() {
        println!("{} {}", "tags:".dimmed(), document.tags.join(", "));
    }
    println!();
    println!("{}", document.body);
    Ok(())
}
