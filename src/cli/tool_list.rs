use std::error::Error;
use std::io::Write;

use rust_mcp_schema::Tool;

use crate::cli::session::{connect_tools, resolve_launch, LaunchOverrides};
use crate::core::config::Config;

/// Connect to the MCP server and print what it advertises. Needs no API key.
pub async fn list_tools(config: &Config, overrides: &LaunchOverrides) -> Result<(), Box<dyn Error>> {
    let launch = resolve_launch(config, overrides, std::env::current_exe)?;
    let client = connect_tools(config, &launch).await?;
    let tools = client.list_tools().await;
    client.shutdown().await;

    let mut stdout = std::io::stdout();
    write_tool_list(&mut stdout, &tools?)?;
    Ok(())
}

pub fn write_tool_list<W: Write>(out: &mut W, tools: &[Tool]) -> std::io::Result<()> {
    if tools.is_empty() {
        writeln!(out, "The MCP server advertises no tools.")?;
        return Ok(());
    }
    for tool in tools {
        let description = tool.description.as_deref().unwrap_or("(no description)");
        writeln!(out, "{}: {}", tool.name, description)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prints_name_and_description() {
        let tools: Vec<Tool> = serde_json::from_value(json!([
            {"name": "get_device_ned_ids", "description": "List NED IDs", "inputSchema": {"type": "object"}},
            {"name": "mystery", "inputSchema": {"type": "object"}}
        ]))
        .expect("tools");

        let mut out = Vec::new();
        write_tool_list(&mut out, &tools).expect("write");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "get_device_ned_ids: List NED IDs\nmystery: (no description)\n"
        );
    }
}
