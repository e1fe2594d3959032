//! List and folders commands

use anyhow::Result;
use colored::Colorize;

use docsearch::config::EngineConfig;
use docsearch::search::SearchContext;

/// List indexed documents, optionally restricted to one folder.
pub fn run(config: &EngineConfig, folder: Option<&str>, json: bool) -> Result<()> {
    let store = SearchContext::open_store(config)?;
    let documents: Vec<_> = store
        .list_all()?
        .into_iter()
        .filter(|d| folder.map_or(true, |f| d.folder.as_deref() == Some(f)))
        .collect();

    if json {
        let rows: Vec<_> = documents
            .iter()
            .map(|d| {
                serde_json::json!({
                    "id": d.id,
                    "title": d.title,
                    "folder": d.folder,
                    "tags": d.tags,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if documents.is_empty() {
        println!("{} No documents indexed", "→".dimmed());
        return Ok(());
    }
    for doc in &documents {
        println!("{}  {}", doc.id.cyan(), doc.title);
    }
    println!();
    println!("{} {} documents", "→".dimmed(), documents.len());
    Ok(())
}

pub fn folders(config: &EngineConfig, json: bool) -> Result<()> {
    let store = SearchContext::open_store(config)?;
    let folders = store.list_folders()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&folders)?);
        return Ok(());
    }
    for folder in &folders {
        println!("{}", folder);
    }
    Ok(())
}
