//! docsearch MCP server implementation

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::EngineConfig;
use crate::core::document::Document;
use crate::error::SearchError;
use crate::search::{SearchContext, SearchFilter, SearchMode, SearchRequest, SearchResultRow};

const DEFAULT_SEARCH_LIMIT: usize = 5;
const MAX_SEARCH_LIMIT: usize = 100;
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

/// Parameters for docs_search tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Natural language search query (e.g., "how do I rotate credentials")
    #[schemars(description = "Natural language search query")]
    pub query: String,
    #[schemars(description = "Maximum number of results (default: 5, max: 100)")]
    #[serde(default)]
    pub limit: Option<usize>,
    #[schemars(description = "Only return documents in this folder")]
    #[serde(default)]
    pub folder: Option<String>,
    #[schemars(description = "Only return documents carrying all of these tags")]
    #[serde(default)]
    pub tags: Vec<String>,
    #[schemars(description = "Fill remaining slots with keyword matches")]
    #[serde(default)]
    pub hybrid: bool,
}

/// Parameters for docs_get tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetParams {
    #[schemars(description = "Document id, e.g. \"guides/setup\"")]
    pub id: String,
}

/// Parameters for docs_list tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListParams {
    #[schemars(description = "Filter by folder")]
    #[serde(default)]
    pub folder: Option<String>,
    #[schemars(description = "Maximum results (default: 50, max: 500)")]
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Document summary for JSON output
#[derive(Debug, Serialize, PartialEq)]
struct DocumentInfoJson {
    id: String,
    title: String,
    folder: Option<String>,
    tags: Vec<String>,
}

impl From<Document> for DocumentInfoJson {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            folder: doc.folder,
            tags: doc.tags,
        }
    }
}

fn clamp_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    match requested {
        None | Some(0) => default,
        Some(n) => n.min(max),
    }
}

fn internal(context: &str, err: impl std::fmt::Display) -> McpError {
    McpError::internal_error(format!("{}: {}", context, err), None)
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let output = serde_json::to_string_pretty(value)
        .map_err(|e| internal("JSON serialization failed", e))?;
    Ok(CallToolResult::success(vec![Content::text(output)]))
}

/// docsearch MCP Service
#[derive(Clone)]
pub struct DocsService {
    context: Arc<SearchContext>,
    tool_router: ToolRouter<Self>,
}

impl DocsService {
    pub fn new(context: Arc<SearchContext>) -> Self {
        Self {
            context,
            tool_router: Self::tool_router(),
        }
    }

    async fn search_rows(&self, params: SearchParams) -> Result<Vec<SearchResultRow>, SearchError> {
        let filter = SearchFilter {
            folder: params.folder,
            tags: params.tags,
        };
        let mode = if params.hybrid {
            SearchMode::Hybrid
        } else {
            SearchMode::Vector
        };
        let request = SearchRequest::new(
            params.query,
            clamp_limit(params.limit, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT),
        )
        .with_filter(filter)
        .with_mode(mode);

        let results = self
            .context
            .query_engine()
            .search_with(&request, &CancellationToken::new())
            .await?;
        Ok(results.iter().map(|r| r.to_json_row()).collect())
    }

    fn list_documents(&self, params: ListParams) -> Result<Vec<DocumentInfoJson>, SearchError> {
        let limit = clamp_limit(params.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
        Ok(self
            .context
            .store()
            .list_all()?
            .into_iter()
            .filter(|d| {
                params
                    .folder
                    .as_ref()
                    .map_or(true, |f| d.folder.as_ref() == Some(f))
            })
            .take(limit)
            .map(DocumentInfoJson::from)
            .collect())
    }
}

#[tool_router]
impl DocsService {
    #[tool(description = "Semantic search over the indexed documents. Returns id, title, folder, tags and cosine similarity (4 decimals) for each hit, best first.")]
    async fn docs_search(&self, params: Parameters<SearchParams>) -> Result<CallToolResult, McpError> {
        let rows = self
            .search_rows(params.0)
            .await
            .map_err(|e| internal("Search failed", e))?;
        json_result(&rows)
    }

    #[tool(description = "Get the full content and metadata of a document by id.")]
    async fn docs_get(&self, params: Parameters<GetParams>) -> Result<CallToolResult, McpError> {
        let id = &params.0.id;
        match self
            .context
            .store()
            .get_by_id(id)
            .map_err(|e| internal("Lookup failed", e))?
        {
            Some(doc) => json_result(&doc),
            None => Ok(CallToolResult::success(vec![Content::text(format!(
                "Document not found: {}",
                id
            ))])),
        }
    }

    #[tool(description = "List indexed documents, optionally restricted to one folder.")]
    async fn docs_list(&self, params: Parameters<ListParams>) -> Result<CallToolResult, McpError> {
        let docs = self
            .list_documents(params.0)
            .map_err(|e| internal("Listing failed", e))?;
        json_result(&docs)
    }

    #[tool(description = "List the folders present in the index.")]
    async fn docs_folders(&self) -> Result<CallToolResult, McpError> {
        let folders = self
            .context
            .store()
            .list_folders()
            .map_err(|e| internal("Listing folders failed", e))?;
        json_result(&folders)
    }

    #[tool(description = "Index status: record count, dimension, provider tag and last full index time.")]
    async fn docs_status(&self) -> Result<CallToolResult, McpError> {
        let stats = self
            .context
            .stats()
            .map_err(|e| internal("Reading index stats failed", e))?;
        let output = serde_json::json!({
            "record_count": stats.record_count,
            "dimension": stats.dimension,
            "provider_tag": stats.provider_tag,
            "active_provider": self.context.provider().provider_tag(),
            "folder_count": stats.folder_count,
            "last_indexed": stats.last_indexed,
        });
        json_result(&output)
    }
}

#[tool_handler]
impl ServerHandler for DocsService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "docsearch MCP Server. Provides semantic search and document access over an indexed markdown collection.".to_string()
            ),
            ..Default::default()
        }
    }
}

/// Run the MCP server on stdio until the client disconnects.
pub async fn run_mcp_server(config: EngineConfig) -> Result<()> {
    use tokio::io::{stdin, stdout};

    let context = SearchContext::open(config).context("Failed to open search context")?;
    let context = Arc::new(context);
    info!("starting MCP server on stdio");

    let service = DocsService::new(context.clone());
    let transport = (stdin(), stdout());
    let server = service.serve(transport).await?;
    server.waiting().await?;

    context.store().close()?;
    Ok(())
}
