use std::error::Error;
use std::sync::Arc;

use tracing::info;

use crate::core::config::Config;
use crate::mcp::server::McpServer;
use crate::mcp::tools::NsoTools;
use crate::nso::{Devices, NsoClient};

/// Run the MCP server on stdin/stdout until the client closes stdin.
pub async fn run_serve(config: &Config) -> Result<(), Box<dyn Error>> {
    let client = NsoClient::new(&config.nso)?;
    info!(url = %client.data_root(), "NSO RESTCONF client initialized");

    let tools = NsoTools::new(Arc::new(Devices::new(client)))?;
    let server = Arc::new(McpServer::new(tools));

    info!("Starting MCP NSO server on stdio");
    server.serve(tokio::io::stdin(), tokio::io::stdout()).await?;
    info!("MCP NSO server stopped");
    Ok(())
}
