//! MCP Gateway
//!
//! A host-embedded gateway that exposes registered procedures (tools,
//! prompts, resources) over the Model Context Protocol: a JSON-RPC 2.0
//! dispatcher behind a Streamable HTTP transport with session management
//! and `Last-Event-ID` SSE replay, a WebSocket transport for bidirectional
//! text and binary streaming, and transport-aware capability filtering.
//!
//! # Example
//!
//! ```no_run
//! use mcp_gateway::{Config, GatewayServer, catalog::builtin};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let catalog = builtin::sample_catalog();
//!     let server = GatewayServer::new(catalog, Config::from_env());
//!     server.run_http(8000).await
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod pagination;
pub mod protocol;
pub mod server;
pub mod session;
pub mod streaming;

pub use catalog::Catalog;
pub use config::Config;
pub use error::{CatalogError, HandlerError};
pub use server::GatewayServer;
