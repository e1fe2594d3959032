mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use docsearch::config::{EngineConfig, StoreLocation};

#[derive(Parser)]
#[command(name = "docsearch")]
#[command(about = "Semantic search over markdown document collections", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, global = true, help = "Verbose logging to stderr")]
    verbose: bool,
    #[arg(long, global = true, help = "Content directory (overrides DOCSEARCH_CONTENT_DIR)")]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Index database path or :memory: (overrides DOCSEARCH_DB_PATH)")]
    db: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or update the semantic search index
    Index {
        #[arg(long, help = "Show index status only")]
        status: bool,
        #[arg(long, help = "Drop the existing index before indexing")]
        rebuild: bool,
        #[arg(long, help = "Re-embed unchanged documents")]
        force: bool,
        #[arg(long, help = "Keep running and re-index on file changes")]
        watch: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Semantic search using embeddings
    #[command(alias = "s")]
    Search {
        query: String,
        #[arg(long, short, help = "Limit results")]
        limit: Option<usize>,
        #[arg(long, help = "Only documents in this folder")]
        folder: Option<String>,
        #[arg(long = "tag", help = "Only documents carrying this tag (repeatable)")]
        tags: Vec<String>,
        #[arg(long, help = "Fill remaining slots with keyword matches")]
        hybrid: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// Print an indexed document
    Show {
        id: String,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// List indexed documents
    List {
        #[arg(long, help = "Filter by folder")]
        folder: Option<String>,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
    /// List folders present in the index
    Folders {
        #[arg(long, help = "JSON output")]
        json: bool,
    },

    // ===== MCP Server =====
    /// Start MCP server for AI assistant integration
    #[cfg(feature = "mcp")]
    Mcp {
        #[arg(long, help = "Show client configuration instructions")]
        install: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    docsearch::logging::init(cli.verbose);

    let mut config = EngineConfig::from_env()?;
    if let Some(dir) = cli.dir {
        config.content_dir = dir;
    }
    if let Some(db) = cli.db.as_deref() {
        config.store = StoreLocation::parse(db);
    }

    match cli.command {
        Commands::Index {
            status,
            rebuild,
            force,
            watch,
            json,
        } => commands::index::run(
            config,
            commands::index::IndexArgs {
                status,
                rebuild,
                force,
                watch,
                json,
            },
        ),
        Commands::Search {
            query,
            limit,
            folder,
            tags,
            hybrid,
            json,
        } => commands::search::run(
            config,
            commands::search::SearchArgs {
                query,
                limit,
                folder,
                tags,
                hybrid,
                json,
            },
        ),
        Commands::Show { id, json } => commands::show::run(&config, &id, json),
        Commands::List { folder, json } => commands::list::run(&config, folder.as_deref(), json),
        Commands::Folders { json } => commands::list::folders(&config, json),

        #[cfg(feature = "mcp")]
        Commands::Mcp { install } => {
            if install {
                print_mcp_install_instructions();
                Ok(())
            } else {
                commands::runtime()?.block_on(docsearch::mcp::run_mcp_server(config))
            }
        }
    }
}

#[cfg(feature = "mcp")]
fn print_mcp_install_instructions() {
    use colored::Colorize;

    let docs_path = std::env::current_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "/path/to/your/docs".to_string());

    let binary_path = std::env::current_exe()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| "docsearch".to_string());

    println!("{}", "MCP Server Installation Guide".bold().cyan());
    println!();
    println!("Add the following to your MCP client configuration:");
    println!();
    println!(r#"{{
  "mcpServers": {{
    "docsearch": {{
      "command": "{}",
      "args": ["mcp"],
      "cwd": "{}",
      "env": {{
        "DOCSEARCH_PROVIDER": "local"
      }}
    }}
  }}
}}"#, binary_path, docs_path);
    println!();
    println!("{}", "Run `docsearch index` in the same directory first.".dimmed());
    println!();
    println!("{}", "Available tools:".bold());
    println!("  • {} - Semantic search with folder/tag filters", "docs_search".green());
    println!("  • {} - Get full document content", "docs_get".green());
    println!("  • {} - List indexed documents", "docs_list".green());
    println!("  • {} - List folders", "docs_folders".green());
    println!("  • {} - Index status", "docs_status".green());
}
