//! MCP server for docsearch
//!
//! Exposes the query engine and index metadata as tools over stdio.

mod server;

pub use server::{run_mcp_server, DocsService};
