//! Stdio transport.
//!
//! Line-delimited JSON-RPC over stdin/stdout for desktop clients. Reuses
//! the dispatcher with no session; only `STANDARD` tools are visible here.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::catalog::{CallContext, TransportKind};
use crate::protocol::jsonrpc::{JsonRpcRequest, JsonRpcResponse, code};

use super::dispatcher::Dispatcher;

/// Serve the MCP protocol over stdin/stdout until EOF.
pub async fn run_stdio(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();

    tracing::info!("MCP stdio server ready, waiting for requests...");

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            // EOF
            tracing::info!("Stdin closed, shutting down");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
            Ok(request) => request,
            Err(error) => {
                let response = JsonRpcResponse::error(
                    None,
                    code::PARSE_ERROR,
                    format!("Parse error: {error}"),
                );
                write_response(&mut stdout, &response).await?;
                continue;
            }
        };

        tracing::debug!(method = %request.method, "Received request");

        let ctx = CallContext::for_transport(TransportKind::Stdio);
        if let Some(response) = dispatcher.dispatch(request, &ctx).await {
            write_response(&mut stdout, &response).await?;
        }
    }

    Ok(())
}

async fn write_response(
    stdout: &mut tokio::io::Stdout,
    response: &JsonRpcResponse,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(response)?;
    stdout.write_all(json.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
